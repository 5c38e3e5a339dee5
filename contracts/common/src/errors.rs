//! Error Types for Flash-Mint Exchange Issuance
//!
//! One error enum covers the whole workspace so an error raised deep inside
//! a collaborator reaches the caller unchanged. Every variant carries a
//! stable code for logs and off-chain tooling.

use core::fmt;

use thiserror::Error;

use crate::types::{Address, Amount};

/// Result type alias for flash-mint operations
pub type FlashMintResult<T> = Result<T, FlashMintError>;

/// Main error enum for all flash-mint errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashMintError {
    // ============ Caller Input Errors ============
    /// Zero amount not allowed
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// `SwapData` shape does not match its exchange tag
    #[error("invalid swap data for {exchange}: {reason}")]
    InvalidSwapData {
        exchange: &'static str,
        reason: &'static str,
    },

    /// Swap path endpoints do not match the assets the leg converts
    #[error("swap path must run {expected_in} -> {expected_out}, got {actual_in} -> {actual_out}")]
    SwapPathMismatch {
        expected_in: Address,
        expected_out: Address,
        actual_in: Address,
        actual_out: Address,
    },

    /// Exchange tag outside the known set
    #[error("unsupported exchange tag {tag}")]
    UnsupportedExchange { tag: u8 },

    /// Exchange tag is known but no router is configured for it
    #[error("no router configured for {exchange}")]
    RouterNotConfigured { exchange: &'static str },

    /// Token is not registered with the set controller
    #[error("ExchangeIssuance: INVALID SET {token}")]
    InvalidSetToken { token: Address },

    /// Leveraged tokens must hold exactly one collateral and one debt component
    #[error("ExchangeIssuance: TOO MANY COMPONENTS ({count})")]
    UnsupportedComponents { count: usize },

    /// More than one component carries a debt position
    #[error("ExchangeIssuance: TOO MANY DEBT POSITIONS")]
    TooManyDebtPositions,

    /// The zap has not granted the allowances a settlement of this set needs
    #[error("ExchangeIssuance: SET TOKEN NOT APPROVED {set_token}")]
    SetTokenNotApproved { set_token: Address },

    /// Invalid address (e.g., zero address)
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Description of why the address is invalid
        reason: &'static str,
    },

    /// Invalid input parameter
    #[error("invalid {param}: {reason}")]
    InvalidInput {
        param: &'static str,
        reason: &'static str,
    },

    // ============ Bound Errors ============
    /// Issuance consumed more input than the caller allowed
    #[error("ExchangeIssuance: INSUFFICIENT INPUT AMOUNT (spent {spent}, max {max})")]
    InsufficientInputAmount { spent: Amount, max: Amount },

    /// Redemption produced less output than the caller required
    #[error("ExchangeIssuance: INSUFFICIENT OUTPUT AMOUNT (received {received}, min {min})")]
    InsufficientOutputAmount { received: Amount, min: Amount },

    /// Exact-input swap returned less than its minimum
    #[error("INSUFFICIENT_OUTPUT_AMOUNT ({amount_out} < {min_out})")]
    InsufficientSwapOutput { amount_out: Amount, min_out: Amount },

    /// Exact-output swap needed more than its maximum
    #[error("EXCESSIVE_INPUT_AMOUNT ({amount_in} > {max_in})")]
    ExcessiveSwapInput { amount_in: Amount, max_in: Amount },

    // ============ Authorization Errors ============
    /// Flash loan callback not invoked by the configured lending pool
    #[error("ExchangeIssuance: LENDING POOL ONLY (caller {caller})")]
    LendingPoolOnly { caller: Address },

    /// Flash loan was not initiated by this contract
    #[error("ExchangeIssuance: INVALID FLASHLOAN INITIATOR ({initiator})")]
    InvalidFlashLoanInitiator { initiator: Address },

    /// Caller is not authorized for this operation
    #[error("unauthorized: expected {expected}, got {actual}")]
    Unauthorized { expected: Address, actual: Address },

    /// A flash loan was requested while another one is in flight
    #[error("nested flash loan not allowed")]
    NestedFlashLoan,

    /// Callback arrived without a pending loan request
    #[error("flash loan callback without a pending request")]
    UnexpectedCallback,

    // ============ Downstream Errors ============
    /// Insufficient balance for operation
    #[error("insufficient {token} balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        available: Amount,
        requested: Amount,
    },

    /// Spender allowance too small for a pull
    #[error("insufficient {token} allowance from {owner} to {spender}: available {available}, requested {requested}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        available: Amount,
        requested: Amount,
    },

    /// Pool reserves cannot cover the trade
    #[error("INSUFFICIENT_LIQUIDITY in {pool}")]
    InsufficientLiquidity { pool: Address },

    /// No pool exists for the requested hop
    #[error("no pool for {token_in} -> {token_out}")]
    PoolNotFound { token_in: Address, token_out: Address },

    /// Stable-swap solver did not converge
    #[error("stable swap invariant did not converge")]
    NoConvergence,

    /// Issuance module refused the mint or redeem
    #[error("issuance rejected: {reason}")]
    IssuanceRejected { reason: &'static str },

    /// Flash loan provider refused or could not complete the loan
    #[error("flash loan failed: {reason}")]
    FlashLoanFailed { reason: &'static str },

    /// Callback parameters could not be decoded
    #[error("invalid flash loan params: {reason}")]
    CallbackDecode { reason: String },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,

    // ============ Configuration Errors ============
    /// Configuration could not be parsed or failed validation
    #[error("configuration error: {0}")]
    Config(String),

    // ============ Settlement ============
    /// Downstream failure tagged with the settlement stage it happened in
    #[error("{stage} failed: {source}")]
    Settlement {
        stage: SettlementStage,
        source: Box<FlashMintError>,
    },
}

/// Stages of a leveraged issue or redeem, used to tag downstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStage {
    /// Reading positions and computing loan size
    Sizing,
    /// Requesting the flash loan
    FlashLoan,
    /// Moving collateral in or out of the lending market
    Collateralize,
    /// Issuance module mint
    Issue,
    /// Issuance module redeem
    Redeem,
    /// Debt <-> collateral swap leg
    DebtCollateralSwap,
    /// Input/output token swap leg
    InputOutputSwap,
    /// Refunds, sweeps and payouts to the caller
    Reconciliation,
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sizing => "sizing",
            Self::FlashLoan => "flash loan",
            Self::Collateralize => "collateral wrap",
            Self::Issue => "issue",
            Self::Redeem => "redeem",
            Self::DebtCollateralSwap => "debt/collateral swap",
            Self::InputOutputSwap => "input/output swap",
            Self::Reconciliation => "reconciliation",
        };
        f.write_str(name)
    }
}

impl FlashMintError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "E001_ZERO_AMOUNT",
            Self::InvalidSwapData { .. } => "E002_INVALID_SWAP_DATA",
            Self::SwapPathMismatch { .. } => "E003_SWAP_PATH_MISMATCH",
            Self::UnsupportedExchange { .. } => "E004_UNSUPPORTED_EXCHANGE",
            Self::RouterNotConfigured { .. } => "E005_ROUTER_NOT_CONFIGURED",
            Self::InvalidSetToken { .. } => "E006_INVALID_SET",
            Self::UnsupportedComponents { .. } => "E007_TOO_MANY_COMPONENTS",
            Self::TooManyDebtPositions => "E008_TOO_MANY_DEBT_POSITIONS",
            Self::InvalidAddress { .. } => "E009_INVALID_ADDRESS",
            Self::InvalidInput { .. } => "E010_INVALID_INPUT",
            Self::SetTokenNotApproved { .. } => "E011_SET_NOT_APPROVED",
            Self::InsufficientInputAmount { .. } => "E020_INSUFFICIENT_INPUT",
            Self::InsufficientOutputAmount { .. } => "E021_INSUFFICIENT_OUTPUT",
            Self::InsufficientSwapOutput { .. } => "E022_SWAP_OUTPUT_BELOW_MIN",
            Self::ExcessiveSwapInput { .. } => "E023_SWAP_INPUT_ABOVE_MAX",
            Self::LendingPoolOnly { .. } => "E030_LENDING_POOL_ONLY",
            Self::InvalidFlashLoanInitiator { .. } => "E031_INVALID_INITIATOR",
            Self::Unauthorized { .. } => "E032_UNAUTHORIZED",
            Self::NestedFlashLoan => "E033_NESTED_FLASH_LOAN",
            Self::UnexpectedCallback => "E034_UNEXPECTED_CALLBACK",
            Self::InsufficientBalance { .. } => "E040_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E041_INSUFFICIENT_ALLOWANCE",
            Self::InsufficientLiquidity { .. } => "E042_INSUFFICIENT_LIQUIDITY",
            Self::PoolNotFound { .. } => "E043_POOL_NOT_FOUND",
            Self::NoConvergence => "E044_NO_CONVERGENCE",
            Self::IssuanceRejected { .. } => "E045_ISSUANCE_REJECTED",
            Self::FlashLoanFailed { .. } => "E046_FLASH_LOAN_FAILED",
            Self::CallbackDecode { .. } => "E047_CALLBACK_DECODE",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::Config(_) => "E090_CONFIG",
            Self::Settlement { .. } => "E100_SETTLEMENT",
        }
    }

    /// Returns true if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientInputAmount { .. } => true, // Raise max input
            Self::InsufficientOutputAmount { .. } => true, // Lower min output
            Self::InsufficientBalance { .. } => true,     // Get more funds
            Self::InsufficientAllowance { .. } => true,   // Approve first
            Self::SetTokenNotApproved { .. } => true,     // approve_set_token
            Self::Settlement { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Tags a downstream error with the stage it surfaced in
    ///
    /// An error that already carries a stage keeps the innermost one. The
    /// caller's own input and output bounds are never tagged.
    pub fn in_stage(self, stage: SettlementStage) -> Self {
        match self {
            Self::Settlement { .. }
            | Self::InsufficientInputAmount { .. }
            | Self::InsufficientOutputAmount { .. } => self,
            other => Self::Settlement {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The error that started the unwind, with stage tags stripped
    pub fn root_cause(&self) -> &FlashMintError {
        match self {
            Self::Settlement { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stage the error was raised in, if it was tagged
    pub fn stage(&self) -> Option<SettlementStage> {
        match self {
            Self::Settlement { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
