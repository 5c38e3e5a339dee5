//! End-to-end settlement tests
//!
//! One network per test: a lending pool listing WETH and USDC, an ETH2x set
//! token (2 aWETH collateral and 2000 USDC debt per unit, WETH at 2000
//! USDC), a stETH loop token (2 aWETH collateral and 1 stETH debt per
//! unit), two constant-product venues, concentrated-liquidity pools and an
//! ETH/stETH stable-swap pool.

use std::sync::{Arc, Once};

use proptest::prelude::*;
use tracing_subscriber::EnvFilter;

use flashmint_common::{
    constants::{fee_tiers, precision::PRECISE_UNIT, token::{MAX_ALLOWANCE, ONE}},
    errors::{FlashMintError, FlashMintResult, SettlementStage},
    events::{EventType, FlashMintEvent},
    interfaces::{
        ComponentUnits, FlashLoanProvider, FlashLoanReceiver, FlashLoanRequest, IssuanceModule, LendingMarket,
        WrappedNative,
    },
    ledger::Ledger,
    types::{Address, Amount, ETH_ADDRESS},
    weth::Weth9,
};
use flashmint_debt_issuance::{DebtIssuanceModule, LeveragedPosition, SetTokenController};
use flashmint_dex_adapter::{CurveRegistry, DexAdapter, SwapData, SwapRouters, UniswapV2Router, UniswapV3Router};
use flashmint_lending_pool::LendingPool;

use crate::{Collaborators, ExchangeIssuanceConfig, ExchangeIssuanceLeveraged, LoanPhase, RouterConfig, Settings};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============ Addresses ============

fn weth() -> Address {
    Address::derive("weth")
}

fn usdc() -> Address {
    Address::derive("usdc")
}

fn dai() -> Address {
    Address::derive("dai")
}

fn steth() -> Address {
    Address::derive("steth")
}

fn eth2x() -> Address {
    Address::derive("eth2x")
}

/// WETH collateral levered against stETH debt
fn steth_loop() -> Address {
    Address::derive("steth-loop")
}

fn alice() -> Address {
    Address::derive("alice")
}

fn operator() -> Address {
    Address::derive("operator")
}

fn provider() -> Address {
    Address::derive("liquidity-provider")
}

fn zap_address() -> Address {
    Address::derive("zap")
}

fn pool_address() -> Address {
    Address::derive("lending-pool")
}

fn module_address() -> Address {
    Address::derive("debt-issuance")
}

fn controller_address() -> Address {
    Address::derive("set-controller")
}

fn v2_address() -> Address {
    Address::derive("v2-router")
}

fn v2b_address() -> Address {
    Address::derive("v2b-router")
}

fn v3_address() -> Address {
    Address::derive("v3-router")
}

fn curve_address() -> Address {
    Address::derive("curve-registry")
}

fn steth_pool() -> Address {
    Address::derive("curve-steth-pool")
}

// ============ Routes ============

fn v2_usdc_to_weth() -> SwapData {
    SwapData::constant_product_a(vec![usdc(), weth()])
}

fn v2_weth_to_usdc() -> SwapData {
    SwapData::constant_product_a(vec![weth(), usdc()])
}

fn v3_usdc_to_weth() -> SwapData {
    SwapData::concentrated_liquidity(vec![usdc(), weth()], vec![fee_tiers::LOW])
}

fn v3_weth_to_usdc() -> SwapData {
    SwapData::concentrated_liquidity(vec![weth(), usdc()], vec![fee_tiers::LOW])
}

fn v3_dai_to_weth() -> SwapData {
    SwapData::concentrated_liquidity(vec![dai(), weth()], vec![fee_tiers::MEDIUM])
}

fn v3_weth_to_dai() -> SwapData {
    SwapData::concentrated_liquidity(vec![weth(), dai()], vec![fee_tiers::MEDIUM])
}

// ============ Fixture ============

struct Fixture {
    ledger: Ledger,
    zap: ExchangeIssuanceLeveraged,
    module: DebtIssuanceModule,
    lending: Arc<LendingPool>,
    collaborators: Collaborators,
    config: ExchangeIssuanceConfig,
    a_weth: Address,
    v2: Arc<UniswapV2Router>,
    v2b: Arc<UniswapV2Router>,
}

impl Fixture {
    fn balance(&self, token: Address, holder: Address) -> Amount {
        self.ledger.balance_of(token, holder)
    }

    /// Same collaborators with a different issuance module
    fn settings_with(&self, module: Arc<dyn IssuanceModule>) -> Settings {
        let collaborators = Collaborators {
            issuance_module: module,
            ..self.collaborators.clone()
        };
        Settings::new(self.config.clone(), collaborators).unwrap()
    }

    /// Alice mints `amount` ETH2x paying with WETH
    fn mint_with_weth(&mut self, amount: Amount) -> FlashMintResult<Amount> {
        self.zap.issue_exact_set_from_erc20(
            &mut self.ledger,
            alice(),
            eth2x(),
            amount,
            weth(),
            2 * amount,
            v2_usdc_to_weth(),
            SwapData::none(),
        )
    }
}

fn setup() -> Fixture {
    init_tracing();
    let mut ledger = Ledger::new();
    let weth_token = Weth9::new(weth()).unwrap();

    // 1. Liquidity provider funds, WETH fully backed by ETH
    ledger.mint(ETH_ADDRESS, provider(), 50_000 * ONE).unwrap();
    weth_token.deposit(&mut ledger, provider(), 40_000 * ONE).unwrap();
    ledger.mint(usdc(), provider(), 50_000_000 * ONE).unwrap();
    ledger.mint(dai(), provider(), 50_000_000 * ONE).unwrap();
    ledger.mint(steth(), provider(), 20_000 * ONE).unwrap();

    // 2. Lending pool
    let mut pool = LendingPool::new(pool_address()).unwrap();
    let a_weth = pool.init_reserve(weth()).unwrap().a_token;
    pool.init_reserve(usdc()).unwrap();
    pool.init_reserve(steth()).unwrap();
    for token in [weth(), usdc(), steth()] {
        ledger.approve(token, provider(), pool_address(), MAX_ALLOWANCE);
    }
    pool.deposit(&mut ledger, provider(), weth(), 1_000 * ONE, provider()).unwrap();
    pool.deposit(&mut ledger, provider(), usdc(), 10_000_000 * ONE, provider()).unwrap();
    pool.deposit(&mut ledger, provider(), steth(), 5_000 * ONE, provider()).unwrap();
    let lending = Arc::new(pool);

    // 3. Venues, all priced at 2000 USDC or DAI per WETH
    let mut v2 = UniswapV2Router::new(v2_address(), Address::derive("v2-factory"));
    v2.create_pair(usdc(), weth()).unwrap();
    v2.add_liquidity(&mut ledger, provider(), usdc(), weth(), 20_000_000 * ONE, 10_000 * ONE)
        .unwrap();
    let v2 = Arc::new(v2);

    let mut v2b = UniswapV2Router::new(v2b_address(), Address::derive("v2b-factory"));
    v2b.create_pair(usdc(), weth()).unwrap();
    v2b.add_liquidity(&mut ledger, provider(), usdc(), weth(), 10_000_000 * ONE, 5_000 * ONE)
        .unwrap();
    let v2b = Arc::new(v2b);

    let mut v3 = UniswapV3Router::new(v3_address(), Address::derive("v3-factory"));
    v3.create_pool(usdc(), weth(), fee_tiers::LOW).unwrap();
    v3.create_pool(dai(), weth(), fee_tiers::MEDIUM).unwrap();
    v3.add_liquidity(&mut ledger, provider(), usdc(), weth(), fee_tiers::LOW, 20_000_000 * ONE, 10_000 * ONE)
        .unwrap();
    v3.add_liquidity(&mut ledger, provider(), dai(), weth(), fee_tiers::MEDIUM, 10_000_000 * ONE, 5_000 * ONE)
        .unwrap();

    let mut curve = CurveRegistry::new(curve_address());
    curve.add_pool(steth_pool(), [ETH_ADDRESS, steth()], 100, 4_000_000).unwrap();
    curve
        .add_liquidity(&mut ledger, provider(), steth_pool(), [10_000 * ONE, 10_000 * ONE])
        .unwrap();

    // 4. Set token
    let mut controller = SetTokenController::new(controller_address());
    controller.add_set(eth2x()).unwrap();
    controller.add_set(steth_loop()).unwrap();
    let mut module = DebtIssuanceModule::new(module_address(), lending.clone());
    module
        .initialize(
            eth2x(),
            LeveragedPosition {
                collateral_a_token: a_weth,
                collateral_unit: 2 * PRECISE_UNIT,
                debt_asset: usdc(),
                debt_unit: 2_000 * ONE,
            },
        )
        .unwrap();
    module
        .initialize(
            steth_loop(),
            LeveragedPosition {
                collateral_a_token: a_weth,
                collateral_unit: 2 * PRECISE_UNIT,
                debt_asset: steth(),
                debt_unit: ONE,
            },
        )
        .unwrap();

    // 5. Zap
    let routers = SwapRouters {
        constant_product_a: Some(v2.clone()),
        constant_product_b: Some(v2b.clone()),
        concentrated_liquidity: Some(Arc::new(v3)),
        stable_swap: Some(Arc::new(curve)),
    };
    let collaborators = Collaborators {
        set_controller: Arc::new(controller),
        issuance_module: Arc::new(module.clone()),
        lending_market: lending.clone(),
        flash_loan_provider: lending.clone(),
        dex: DexAdapter::new(routers, Arc::new(weth_token.clone())),
    };
    let config = ExchangeIssuanceConfig {
        set_controller: controller_address(),
        debt_issuance_module: module_address(),
        lending_pool: pool_address(),
        weth: weth(),
        operator: operator(),
        routers: RouterConfig {
            constant_product_a: Some(v2_address()),
            constant_product_b: Some(v2b_address()),
            concentrated_liquidity: Some(v3_address()),
            stable_swap: Some(curve_address()),
        },
    };
    let settings = Settings::new(config.clone(), collaborators.clone()).unwrap();
    let zap = ExchangeIssuanceLeveraged::new(zap_address(), settings).unwrap();
    zap.approve_set_token(&mut ledger, eth2x()).unwrap();
    zap.approve_set_token(&mut ledger, steth_loop()).unwrap();

    // 6. Alice
    ledger.mint(ETH_ADDRESS, alice(), 120 * ONE).unwrap();
    weth_token.deposit(&mut ledger, alice(), 20 * ONE).unwrap();
    ledger.mint(dai(), alice(), 100_000 * ONE).unwrap();
    ledger.mint(steth(), alice(), 100 * ONE).unwrap();
    for token in [weth(), usdc(), dai(), steth(), eth2x(), steth_loop()] {
        ledger.approve(token, alice(), zap_address(), MAX_ALLOWANCE);
    }

    Fixture {
        ledger,
        zap,
        module,
        lending,
        collaborators,
        config,
        a_weth,
        v2,
        v2b,
    }
}

/// Nothing a settlement touches may stay behind in the zap
fn assert_zap_empty(fx: &Fixture) {
    for token in [weth(), usdc(), dai(), steth(), eth2x(), steth_loop(), fx.a_weth, ETH_ADDRESS] {
        assert_eq!(fx.balance(token, zap_address()), 0, "zap holds {token}");
    }
}

// ============ Issue ============

#[test]
fn test_mint_two_x_with_collateral_input() {
    let mut fx = setup();
    let weth_before = fx.balance(weth(), alice());

    let spent = fx.mint_with_weth(ONE).unwrap();

    assert_eq!(fx.balance(eth2x(), alice()), ONE);
    assert!(spent > 0 && spent <= 2 * ONE);
    assert_eq!(fx.balance(weth(), alice()), weth_before - spent);
    // Roughly one unit of equity at 2x
    assert!(spent > ONE && spent < ONE + ONE / 50);
    assert_zap_empty(&fx);

    let issues = fx.ledger.events().filter_by_type(EventType::ExchangeIssue);
    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues[0],
        &FlashMintEvent::ExchangeIssue {
            caller: alice(),
            set_token: eth2x(),
            input_token: weth(),
            amount_spent: spent,
            set_amount: ONE,
        }
    );
}

#[test]
fn test_mint_positions_match_sizing() {
    let mut fx = setup();
    let data = fx.zap.get_leveraged_token_data(&fx.ledger, eth2x(), ONE, true).unwrap();
    assert_eq!(data.collateral_token, weth());
    assert_eq!(data.collateral_a_token, fx.a_weth);
    assert_eq!(data.collateral_amount, 2 * ONE);
    assert_eq!(data.debt_token, usdc());
    assert_eq!(data.debt_amount, 2_000 * ONE);

    fx.mint_with_weth(ONE).unwrap();

    assert_eq!(fx.balance(fx.a_weth, eth2x()), data.collateral_amount);
    assert_eq!(fx.lending.debt_of(&fx.ledger, usdc(), eth2x()).unwrap(), data.debt_amount);
}

#[test]
fn test_mint_with_erc20_through_concentrated_legs() {
    let mut fx = setup();
    let dai_before = fx.balance(dai(), alice());

    let spent = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            dai(),
            3_000 * ONE,
            v3_usdc_to_weth(),
            v3_dai_to_weth(),
        )
        .unwrap();

    assert_eq!(fx.balance(eth2x(), alice()), ONE);
    assert!(spent <= 3_000 * ONE);
    // Unspent DAI came back
    assert_eq!(fx.balance(dai(), alice()), dai_before - spent);
    assert_zap_empty(&fx);
}

#[test]
fn test_issue_quote_matches_execution() {
    let mut fx = setup();
    let quote = fx
        .zap
        .get_issue_exact_set(&fx.ledger, eth2x(), ONE, dai(), &v2_usdc_to_weth(), &v3_dai_to_weth())
        .unwrap();

    let spent = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            dai(),
            3_000 * ONE,
            v2_usdc_to_weth(),
            v3_dai_to_weth(),
        )
        .unwrap();

    assert_eq!(spent, quote);
}

#[test]
fn test_mint_from_eth_refunds_unspent_value() {
    let mut fx = setup();
    let eth_before = fx.ledger.native_balance(alice());

    let spent = fx
        .zap
        .issue_exact_set_from_eth(&mut fx.ledger, alice(), 2 * ONE, eth2x(), ONE, v2_usdc_to_weth(), SwapData::none())
        .unwrap();

    assert_eq!(fx.balance(eth2x(), alice()), ONE);
    assert!(spent < 2 * ONE);
    assert_eq!(fx.ledger.native_balance(alice()), eth_before - spent);
    assert_zap_empty(&fx);
}

#[test]
fn test_mint_with_steth_through_stable_swap() {
    let mut fx = setup();
    let steth_before = fx.balance(steth(), alice());

    let spent = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            steth(),
            2 * ONE,
            v2_usdc_to_weth(),
            SwapData::stable_swap(steth_pool(), steth(), ETH_ADDRESS),
        )
        .unwrap();

    assert_eq!(fx.balance(eth2x(), alice()), ONE);
    assert_eq!(fx.balance(steth(), alice()), steth_before - spent);
    assert!(spent > ONE && spent < 2 * ONE);
    assert_zap_empty(&fx);
}

#[test]
fn test_mint_through_second_constant_product_venue() {
    let mut fx = setup();
    let a_before = fx.v2.get_reserves(&fx.ledger, usdc(), weth()).unwrap();
    let (usdc_b, weth_b) = fx.v2b.get_reserves(&fx.ledger, usdc(), weth()).unwrap();

    fx.zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            2 * ONE,
            SwapData::constant_product_b(vec![usdc(), weth()]),
            SwapData::none(),
        )
        .unwrap();

    assert_eq!(fx.v2.get_reserves(&fx.ledger, usdc(), weth()).unwrap(), a_before);
    let (usdc_after, weth_after) = fx.v2b.get_reserves(&fx.ledger, usdc(), weth()).unwrap();
    assert_eq!(usdc_after, usdc_b + 2_000 * ONE);
    assert!(weth_after < weth_b);
    assert_eq!(fx.balance(eth2x(), alice()), ONE);
    assert_zap_empty(&fx);
}

#[test]
fn test_redeem_through_second_constant_product_venue() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let a_before = fx.v2.get_reserves(&fx.ledger, usdc(), weth()).unwrap();
    let (usdc_b, _) = fx.v2b.get_reserves(&fx.ledger, usdc(), weth()).unwrap();

    let received = fx
        .zap
        .redeem_exact_set_for_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            ONE / 2,
            SwapData::constant_product_b(vec![weth(), usdc()]),
            SwapData::none(),
        )
        .unwrap();

    assert!(received > ONE / 2 && received < ONE);
    assert_eq!(fx.v2.get_reserves(&fx.ledger, usdc(), weth()).unwrap(), a_before);
    let (usdc_after, _) = fx.v2b.get_reserves(&fx.ledger, usdc(), weth()).unwrap();
    assert!(usdc_after < usdc_b);
    assert_zap_empty(&fx);
}

#[test]
fn test_mint_with_stable_swap_debt_leg() {
    let mut fx = setup();
    let weth_before = fx.balance(weth(), alice());

    let spent = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            steth_loop(),
            ONE,
            weth(),
            2 * ONE,
            SwapData::stable_swap(steth_pool(), steth(), ETH_ADDRESS),
            SwapData::none(),
        )
        .unwrap();

    // One stETH sold near par leaves a little over one WETH of equity to fund
    assert!(spent > ONE && spent < ONE + ONE / 100, "spent {spent}");
    assert_eq!(fx.balance(weth(), alice()), weth_before - spent);
    assert_eq!(fx.balance(steth_loop(), alice()), ONE);
    assert_eq!(fx.lending.debt_of(&fx.ledger, steth(), steth_loop()).unwrap(), ONE);
    assert_zap_empty(&fx);
}

#[test]
fn test_redeem_with_stable_swap_debt_leg() {
    let mut fx = setup();
    fx.zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            steth_loop(),
            ONE,
            weth(),
            2 * ONE,
            SwapData::stable_swap(steth_pool(), steth(), ETH_ADDRESS),
            SwapData::none(),
        )
        .unwrap();
    let eth_before = fx.ledger.native_balance(alice());

    let received = fx
        .zap
        .redeem_exact_set_for_eth(
            &mut fx.ledger,
            alice(),
            steth_loop(),
            ONE,
            ONE * 9 / 10,
            SwapData::stable_swap(steth_pool(), ETH_ADDRESS, steth()),
            SwapData::none(),
        )
        .unwrap();

    assert!(received >= ONE * 9 / 10 && received < ONE, "received {received}");
    assert_eq!(fx.ledger.native_balance(alice()), eth_before + received);
    assert_eq!(fx.balance(steth_loop(), alice()), 0);
    assert_eq!(fx.lending.debt_of(&fx.ledger, steth(), steth_loop()).unwrap(), 0);
    assert_zap_empty(&fx);
}

#[test]
fn test_mint_max_input_violation_rolls_back() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            ONE / 2,
            v2_usdc_to_weth(),
            SwapData::none(),
        )
        .unwrap_err();

    assert!(matches!(err, FlashMintError::InsufficientInputAmount { max, .. } if max == ONE / 2));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_mint_erc20_max_input_violation_surfaces_verbatim() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            dai(),
            100 * ONE,
            v2_usdc_to_weth(),
            v3_dai_to_weth(),
        )
        .unwrap_err();

    assert!(matches!(err, FlashMintError::InsufficientInputAmount { max, .. } if max == 100 * ONE));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_eth_sentinel_rejected_as_erc20() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            ETH_ADDRESS,
            2 * ONE,
            v2_usdc_to_weth(),
            SwapData::none(),
        )
        .unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidInput { param: "token", .. }));

    let err = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, ETH_ADDRESS, 0, v2_weth_to_usdc(), SwapData::none())
        .unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidInput { param: "token", .. }));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_zero_amounts_rejected() {
    let mut fx = setup();
    let err = fx.mint_with_weth(0).unwrap_err();
    assert_eq!(err.root_cause(), &FlashMintError::ZeroAmount);

    let err = fx
        .zap
        .issue_exact_set_from_eth(&mut fx.ledger, alice(), 0, eth2x(), ONE, v2_usdc_to_weth(), SwapData::none())
        .unwrap_err();
    assert_eq!(err, FlashMintError::ZeroAmount);
}

// ============ Redeem ============

#[test]
fn test_redeem_for_third_erc20() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let dai_before = fx.balance(dai(), alice());
    let min = 1_900 * ONE;

    let received = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, dai(), min, v2_weth_to_usdc(), v3_weth_to_dai())
        .unwrap();

    assert!(received >= min);
    assert_eq!(fx.balance(dai(), alice()), dai_before + received);
    assert_eq!(fx.balance(eth2x(), alice()), 0);
    assert_eq!(fx.ledger.total_supply(eth2x()), 0);
    assert_eq!(fx.lending.debt_of(&fx.ledger, usdc(), eth2x()).unwrap(), 0);
    assert_zap_empty(&fx);

    let redeems = fx.ledger.events().filter_by_type(EventType::ExchangeRedeem);
    assert_eq!(
        redeems,
        vec![&FlashMintEvent::ExchangeRedeem {
            caller: alice(),
            set_token: eth2x(),
            output_token: dai(),
            set_amount: ONE,
            amount_received: received,
        }]
    );
}

#[test]
fn test_redeem_quote_matches_execution() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let quote = fx
        .zap
        .get_redeem_exact_set(&fx.ledger, eth2x(), ONE, dai(), &v2_weth_to_usdc(), &v3_weth_to_dai())
        .unwrap();

    let received = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, dai(), 0, v2_weth_to_usdc(), v3_weth_to_dai())
        .unwrap();

    assert_eq!(received, quote);
}

#[test]
fn test_redeem_for_eth() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let eth_before = fx.ledger.native_balance(alice());

    let received = fx
        .zap
        .redeem_exact_set_for_eth(&mut fx.ledger, alice(), eth2x(), ONE, ONE * 9 / 10, v3_weth_to_usdc(), SwapData::none())
        .unwrap();

    assert!(received >= ONE * 9 / 10 && received < ONE);
    assert_eq!(fx.ledger.native_balance(alice()), eth_before + received);
    assert_zap_empty(&fx);
}

#[test]
fn test_redeem_for_debt_token_through_constant_product() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();

    let received = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, usdc(), 1_900 * ONE, v3_weth_to_usdc(), v2_weth_to_usdc())
        .unwrap();

    assert_eq!(fx.balance(usdc(), alice()), received);
    assert_zap_empty(&fx);
}

#[test]
fn test_redeem_for_steth_through_stable_swap() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();

    let received = fx
        .zap
        .redeem_exact_set_for_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            steth(),
            ONE * 9 / 10,
            v2_weth_to_usdc(),
            SwapData::stable_swap(steth_pool(), ETH_ADDRESS, steth()),
        )
        .unwrap();

    assert_eq!(fx.balance(steth(), alice()), 100 * ONE + received);
    assert_zap_empty(&fx);
}

#[test]
fn test_redeem_min_output_violation_rolls_back() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, dai(), 10_000 * ONE, v2_weth_to_usdc(), v3_weth_to_dai())
        .unwrap_err();

    assert!(matches!(err, FlashMintError::InsufficientOutputAmount { min, .. } if min == 10_000 * ONE));
    assert_eq!(fx.ledger, before);
    assert_eq!(fx.balance(eth2x(), alice()), ONE);
}

// ============ Approvals ============

#[test]
fn test_approve_set_token_is_idempotent() {
    let mut fx = setup();
    let allowances = |ledger: &Ledger, a_weth: Address| {
        [
            ledger.allowance(a_weth, zap_address(), module_address()),
            ledger.allowance(usdc(), zap_address(), module_address()),
            ledger.allowance(weth(), zap_address(), pool_address()),
            ledger.allowance(usdc(), zap_address(), pool_address()),
        ]
    };
    let first = allowances(&fx.ledger, fx.a_weth);
    assert_eq!(first, [MAX_ALLOWANCE; 4]);

    fx.zap.approve_set_token(&mut fx.ledger, eth2x()).unwrap();

    assert_eq!(allowances(&fx.ledger, fx.a_weth), first);
    // Once per set token in setup, once here
    assert_eq!(fx.ledger.events().count(EventType::SetTokenApproved), 3);
}

#[test]
fn test_unapproved_set_token_rejected_before_loan() {
    let mut fx = setup();
    let settings = fx.zap.settings().clone();
    let fresh = ExchangeIssuanceLeveraged::new(Address::derive("fresh-zap"), settings).unwrap();
    fx.ledger.approve(weth(), alice(), fresh.address(), MAX_ALLOWANCE);
    let before = fx.ledger.clone();

    let err = fresh
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 2 * ONE, v2_usdc_to_weth(), SwapData::none())
        .unwrap_err();
    assert_eq!(err, FlashMintError::SetTokenNotApproved { set_token: eth2x() });
    assert_eq!(err.stage(), None);

    let err = fresh
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 0, v2_weth_to_usdc(), SwapData::none())
        .unwrap_err();
    assert_eq!(err, FlashMintError::SetTokenNotApproved { set_token: eth2x() });
    assert_eq!(fx.ledger, before);

    fresh.approve_set_token(&mut fx.ledger, eth2x()).unwrap();
    assert!(fresh
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 2 * ONE, v2_usdc_to_weth(), SwapData::none())
        .is_ok());
}

#[test]
fn test_partial_approval_rejected_before_loan() {
    let mut fx = setup();
    // Revoke the pool's pull of the debt token only
    fx.ledger.approve(usdc(), zap_address(), pool_address(), 0);
    let before = fx.ledger.clone();

    let err = fx.mint_with_weth(ONE).unwrap_err();

    assert_eq!(err, FlashMintError::SetTokenNotApproved { set_token: eth2x() });
    assert!(err.is_recoverable());
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_approve_tokens_rejects_native() {
    let mut fx = setup();
    let before = fx.ledger.clone();
    let err = fx
        .zap
        .approve_tokens(&mut fx.ledger, &[dai(), ETH_ADDRESS], v2_address())
        .unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidAddress { .. }));
    assert_eq!(fx.ledger, before);
}

// ============ Routing ============

#[test]
fn test_malformed_swap_data_leaves_ledger_untouched() {
    let mut fx = setup();
    let before = fx.ledger.clone();
    let malformed = SwapData::concentrated_liquidity(vec![usdc(), weth()], vec![]);

    let err = fx
        .zap
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 2 * ONE, malformed, SwapData::none())
        .unwrap_err();

    assert!(matches!(err, FlashMintError::InvalidSwapData { .. }));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_swap_path_must_connect_the_leg() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 2 * ONE, v2_weth_to_usdc(), SwapData::none())
        .unwrap_err();

    assert!(matches!(err, FlashMintError::SwapPathMismatch { .. }));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_round_trip_payment_leg_rejected_before_loan() {
    let mut fx = setup();
    fx.mint_with_weth(ONE).unwrap();
    let before = fx.ledger.clone();
    let round_trip = || SwapData::stable_swap(steth_pool(), ETH_ADDRESS, weth());
    let expected = FlashMintError::InvalidSwapData {
        exchange: "StableSwap",
        reason: "routed leg must change asset",
    };

    let err = fx
        .zap
        .issue_exact_set_from_eth(&mut fx.ledger, alice(), 2 * ONE, eth2x(), ONE, v2_usdc_to_weth(), round_trip())
        .unwrap_err();
    assert_eq!(err, expected);

    let err = fx
        .zap
        .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), 0, v2_weth_to_usdc(), round_trip())
        .unwrap_err();
    assert_eq!(err, expected);
    assert_eq!(err.stage(), None);

    let cyclic = SwapData::constant_product_a(vec![weth(), usdc(), weth()]);
    let err = fx
        .zap
        .redeem_exact_set_for_eth(&mut fx.ledger, alice(), eth2x(), ONE, 0, v2_weth_to_usdc(), cyclic)
        .unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidSwapData { reason: "routed leg must change asset", .. }));
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_collateral_payment_takes_no_routed_leg() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            2 * ONE,
            v2_usdc_to_weth(),
            SwapData::constant_product_a(vec![weth(), usdc(), weth()]),
        )
        .unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidSwapData { .. }));
    assert_eq!(fx.ledger, before);

    // A no-op leg naming the collateral is still accepted
    let spent = fx
        .zap
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            2 * ONE,
            v2_usdc_to_weth(),
            SwapData { path: vec![weth()], ..SwapData::none() },
        )
        .unwrap();
    assert!(spent > 0 && spent <= 2 * ONE);
}

#[test]
fn test_unconfigured_venue_rejected() {
    let mut fx = setup();
    let routers = SwapRouters {
        constant_product_b: None,
        ..fx.collaborators.dex.routers().clone()
    };
    let collaborators = Collaborators {
        dex: DexAdapter::new(routers, Arc::new(Weth9::new(weth()).unwrap())),
        ..fx.collaborators.clone()
    };
    let mut config = fx.config.clone();
    config.routers.constant_product_b = None;
    let narrow = ExchangeIssuanceLeveraged::new(zap_address(), Settings::new(config, collaborators).unwrap()).unwrap();

    let err = narrow
        .issue_exact_set_from_erc20(
            &mut fx.ledger,
            alice(),
            eth2x(),
            ONE,
            weth(),
            2 * ONE,
            SwapData::constant_product_b(vec![usdc(), weth()]),
            SwapData::none(),
        )
        .unwrap_err();

    assert_eq!(err, FlashMintError::RouterNotConfigured { exchange: "ConstantProductB" });
}

// ============ Callback Authorization ============

#[test]
fn test_callback_rejects_foreign_caller() {
    let mut fx = setup();
    let before = fx.ledger.clone();

    let err = fx
        .zap
        .execute_operation(&mut fx.ledger, alice(), &[weth()], &[ONE], &[0], zap_address(), &[])
        .unwrap_err();

    assert_eq!(err, FlashMintError::LendingPoolOnly { caller: alice() });
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_callback_rejects_foreign_initiator() {
    let mut fx = setup();
    let before = fx.ledger.clone();
    let attacker = Address::derive("attacker");
    let request = FlashLoanRequest {
        assets: vec![weth()],
        amounts: vec![ONE],
        modes: vec![0],
        on_behalf_of: zap_address(),
        params: vec![],
        referral_code: 0,
    };
    let lending = fx.lending.clone();
    let zap = &fx.zap;

    let err = fx
        .ledger
        .transact(|ledger| lending.flash_loan(ledger, attacker, zap, request))
        .unwrap_err();

    assert_eq!(err, FlashMintError::InvalidFlashLoanInitiator { initiator: attacker });
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_callback_without_pending_loan() {
    let mut fx = setup();
    let err = fx
        .zap
        .execute_operation(&mut fx.ledger, pool_address(), &[weth()], &[ONE], &[0], zap_address(), &[])
        .unwrap_err();
    assert_eq!(err, FlashMintError::UnexpectedCallback);
}

#[test]
fn test_callback_reentry_while_settling_rejected() {
    let mut fx = setup();
    let before = fx.ledger.clone();
    let context = crate::FlashLoanContext {
        is_issuance: true,
        set_token: eth2x(),
        set_amount: ONE,
        original_sender: alice(),
        limit_amount: 2 * ONE,
        payment_token: weth(),
        swap_data_debt_collateral: v2_usdc_to_weth(),
        swap_data_input_output: SwapData::none(),
    };
    let params = context.encode().unwrap();
    fx.zap.phase.set(LoanPhase::Settling);

    let err = fx
        .zap
        .execute_operation(&mut fx.ledger, pool_address(), &[weth()], &[2 * ONE], &[0], zap_address(), &params)
        .unwrap_err();

    assert_eq!(err, FlashMintError::UnexpectedCallback);
    assert_eq!(fx.zap.phase.get(), LoanPhase::Settling);
    assert_eq!(fx.ledger, before);
}

#[test]
fn test_nested_flash_loan_rejected() {
    let mut fx = setup();
    let before = fx.ledger.clone();
    fx.zap.phase.set(LoanPhase::LoanRequested);

    let err = fx.mint_with_weth(ONE).unwrap_err();

    assert_eq!(err, FlashMintError::NestedFlashLoan);
    assert_eq!(fx.ledger, before);
    fx.zap.phase.set(LoanPhase::Idle);
    assert!(fx.mint_with_weth(ONE).is_ok());
}

#[test]
fn test_phase_returns_to_idle_after_failure() {
    let mut fx = setup();
    fx.zap
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), eth2x(), ONE, weth(), ONE / 2, v2_usdc_to_weth(), SwapData::none())
        .unwrap_err();
    assert_eq!(fx.zap.phase.get(), LoanPhase::Idle);
}

// ============ Sizing ============

#[test]
fn test_unknown_set_token_rejected() {
    let mut fx = setup();
    let token = Address::derive("not-a-set");
    let err = fx
        .zap
        .issue_exact_set_from_erc20(&mut fx.ledger, alice(), token, ONE, weth(), 2 * ONE, v2_usdc_to_weth(), SwapData::none())
        .unwrap_err();

    assert_eq!(err.stage(), Some(SettlementStage::Sizing));
    assert_eq!(err.root_cause(), &FlashMintError::InvalidSetToken { token });
}

#[test]
fn test_leverage_drift_changes_sizing() {
    let mut fx = setup();
    let before = fx.zap.get_leveraged_token_data(&fx.ledger, eth2x(), ONE, true).unwrap();

    let mut drifted = fx.module.clone();
    drifted.set_position_units(eth2x(), 3 * PRECISE_UNIT, 4_000 * ONE).unwrap();
    let settings = fx.settings_with(Arc::new(drifted));
    fx.zap.reconfigure(&mut fx.ledger, operator(), settings).unwrap();

    let after = fx.zap.get_leveraged_token_data(&fx.ledger, eth2x(), ONE, true).unwrap();
    assert_eq!(before.collateral_amount, 2 * ONE);
    assert_eq!(after.collateral_amount, 3 * ONE);
    assert_eq!(after.debt_amount, 4_000 * ONE);

    fx.mint_with_weth(ONE).unwrap();
    assert_eq!(fx.balance(fx.a_weth, eth2x()), 3 * ONE);
}

#[test]
fn test_downstream_failure_is_stage_tagged() {
    let mut fx = setup();
    let mut paused = fx.module.clone();
    paused.set_paused(true);
    let settings = fx.settings_with(Arc::new(paused));
    fx.zap.reconfigure(&mut fx.ledger, operator(), settings).unwrap();
    let before = fx.ledger.clone();

    let err = fx.mint_with_weth(ONE).unwrap_err();

    assert_eq!(err.stage(), Some(SettlementStage::Issue));
    assert!(matches!(err.root_cause(), FlashMintError::IssuanceRejected { .. }));
    assert_eq!(fx.ledger, before);
}

/// Issuance module reporting fixed units, for shapes the real module never produces
struct FixedUnitsModule {
    units: ComponentUnits,
}

impl IssuanceModule for FixedUnitsModule {
    fn address(&self) -> Address {
        module_address()
    }

    fn required_component_issuance_units(&self, _: &Ledger, _: Address, _: Amount) -> FlashMintResult<ComponentUnits> {
        Ok(self.units.clone())
    }

    fn required_component_redemption_units(&self, _: &Ledger, _: Address, _: Amount) -> FlashMintResult<ComponentUnits> {
        Ok(self.units.clone())
    }

    fn issue(&self, _: &mut Ledger, _: Address, _: Address, _: Amount, _: Address) -> FlashMintResult<()> {
        Err(FlashMintError::IssuanceRejected { reason: "fixed units" })
    }

    fn redeem(&self, _: &mut Ledger, _: Address, _: Address, _: Amount, _: Address) -> FlashMintResult<()> {
        Err(FlashMintError::IssuanceRejected { reason: "fixed units" })
    }
}

#[test]
fn test_calculator_rejects_unsupported_shapes() {
    let fx = setup();

    let three = fx.settings_with(Arc::new(FixedUnitsModule {
        units: ComponentUnits {
            components: vec![fx.a_weth, usdc(), dai()],
            equity_units: vec![ONE, 0, 0],
            debt_units: vec![0, ONE, 0],
        },
    }));
    let err = crate::get_leveraged_token_data(&three, &fx.ledger, eth2x(), ONE, true).unwrap_err();
    assert_eq!(err, FlashMintError::UnsupportedComponents { count: 3 });

    let two_debts = fx.settings_with(Arc::new(FixedUnitsModule {
        units: ComponentUnits {
            components: vec![fx.a_weth, usdc()],
            equity_units: vec![ONE, 0],
            debt_units: vec![ONE, ONE],
        },
    }));
    let err = crate::get_leveraged_token_data(&two_debts, &fx.ledger, eth2x(), ONE, false).unwrap_err();
    assert_eq!(err, FlashMintError::TooManyDebtPositions);

    let no_debt = fx.settings_with(Arc::new(FixedUnitsModule {
        units: ComponentUnits {
            components: vec![fx.a_weth, usdc()],
            equity_units: vec![ONE, 0],
            debt_units: vec![0, 0],
        },
    }));
    let err = crate::get_leveraged_token_data(&no_debt, &fx.ledger, eth2x(), ONE, true).unwrap_err();
    assert!(matches!(err, FlashMintError::InvalidInput { param: "set_token", .. }));
}

// ============ Administration ============

#[test]
fn test_reconfigure_requires_operator() {
    let mut fx = setup();
    let stranger = Address::derive("stranger");
    let settings = fx.zap.settings().clone();

    let err = fx
        .zap
        .reconfigure(&mut fx.ledger, stranger, settings.clone())
        .unwrap_err();
    assert!(matches!(err, FlashMintError::Unauthorized { .. }));
    assert_eq!(fx.ledger.events().count(EventType::ConfigUpdated), 0);

    fx.zap.grant_operator(operator(), stranger).unwrap();
    fx.zap.reconfigure(&mut fx.ledger, stranger, settings).unwrap();
    assert_eq!(
        fx.ledger.events().last(),
        Some(&FlashMintEvent::ConfigUpdated { operator: stranger })
    );

    fx.zap.revoke_operator(operator(), stranger).unwrap();
    let settings = fx.zap.settings().clone();
    assert!(fx.zap.reconfigure(&mut fx.ledger, stranger, settings).is_err());
}

#[test]
fn test_operator_cannot_transfer_ownership() {
    let mut fx = setup();
    let delegate = Address::derive("delegate");
    fx.zap.grant_operator(operator(), delegate).unwrap();

    let mut config = fx.config.clone();
    config.operator = delegate;
    let settings = Settings::new(config.clone(), fx.collaborators.clone()).unwrap();
    let err = fx.zap.reconfigure(&mut fx.ledger, delegate, settings.clone()).unwrap_err();
    assert!(matches!(err, FlashMintError::Unauthorized { .. }));

    fx.zap.reconfigure(&mut fx.ledger, operator(), settings).unwrap();
    assert_eq!(fx.zap.access().owner, delegate);
    assert_eq!(fx.zap.config().operator, delegate);
}

// ============ Properties ============

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_sizing_scales_with_amount(units in 1u128..1_000u128) {
        let fx = setup();
        let amount = units * ONE;
        let issue = fx.zap.get_leveraged_token_data(&fx.ledger, eth2x(), amount, true).unwrap();
        let redeem = fx.zap.get_leveraged_token_data(&fx.ledger, eth2x(), amount, false).unwrap();

        prop_assert_eq!(issue.collateral_amount, 2 * amount);
        prop_assert_eq!(issue.debt_amount, 2_000 * amount);
        prop_assert_eq!(redeem.collateral_amount, issue.collateral_amount);
        prop_assert_eq!(redeem.debt_amount, issue.debt_amount);
    }

    #[test]
    fn prop_mint_then_redeem_conserves_supply(tenths in 1u128..20u128) {
        let mut fx = setup();
        let amount = tenths * ONE / 10;
        fx.mint_with_weth(amount).unwrap();
        prop_assert_eq!(fx.balance(eth2x(), alice()), amount);

        fx.zap
            .redeem_exact_set_for_erc20(&mut fx.ledger, alice(), eth2x(), amount, weth(), 0, v2_weth_to_usdc(), SwapData::none())
            .unwrap();
        prop_assert_eq!(fx.ledger.total_supply(eth2x()), 0);
        prop_assert_eq!(fx.lending.debt_of(&fx.ledger, usdc(), eth2x()).unwrap(), 0);
        assert_zap_empty(&fx);
    }
}
