use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the routing and execution core
#[derive(Error, Debug)]
pub enum SluiceError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Price feed errors
    #[error(transparent)]
    Price(#[from] PriceError),

    // Vault bookkeeping errors
    #[error(transparent)]
    Vault(#[from] VaultError),

    // Safety layer rejections
    #[error(transparent)]
    Safety(#[from] SafetyError),

    // Structural request errors (rejected at Accepted)
    #[error("Trade amount must be non-zero")]
    ZeroAmount,

    #[error("Trade size {amount} outside bounds [{min}, {max}]")]
    SizeOutOfBounds {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Deadline {deadline} has passed (now {now})")]
    DeadlineExpired {
        deadline: chrono::DateTime<chrono::Utc>,
        now: chrono::DateTime<chrono::Utc>,
    },

    #[error("Invalid route plan: {0}")]
    InvalidPlan(String),

    // Aggregate outcome
    #[error("Slippage exceeded: minimum output {min_output}, actual {actual_output}")]
    SlippageExceeded {
        min_output: Decimal,
        actual_output: Decimal,
    },

    // Ledger errors
    #[error("Insufficient balance for {account} ({asset}): required {required}, available {available}")]
    InsufficientBalance {
        account: String,
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    // Source fill errors (caught per source during Filling)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    // Authorization errors (admin console)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for SluiceError
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Errors raised by the price feed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PriceError {
    #[error("Stale price: age {age_secs}s exceeds {max_staleness_secs}s")]
    StalePrice {
        age_secs: i64,
        max_staleness_secs: i64,
    },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),
}

/// Errors raised by vault bookkeeping
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    #[error("Vault {0} not found")]
    NotFound(u64),

    #[error("Vault {0} is not listed for routing")]
    NotListed(u64),

    #[error("Unauthorized caller {caller} for {operation}")]
    Unauthorized { caller: String, operation: String },

    #[error("Utilization exceeded: requested {requested}, allowed {allowed}")]
    UtilizationExceeded { requested: Decimal, allowed: Decimal },

    #[error("Vault operations halted")]
    Halted,

    #[error("Insufficient vault liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Deposit cap exceeded: balance after deposit {after}, cap {cap}")]
    DepositCapExceeded { after: Decimal, cap: Decimal },

    #[error("Price {price} below vault minimum {minimum}")]
    PriceBelowMinimum { price: Decimal, minimum: Decimal },

    #[error("Invalid vault parameters: {0}")]
    InvalidParameters(String),
}

/// Pre-execution rejections from the safety layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    #[error("Execution halted by administrator")]
    Halted,

    #[error("Commitment token already consumed: {0}")]
    CommitmentReused(String),

    #[error("Insufficient standing capital: required {required}, held {held}")]
    InsufficientStandingCapital { required: Decimal, held: Decimal },

    #[error("Fee price {actual} exceeds ceiling {ceiling}")]
    FeePriceTooHigh { actual: Decimal, ceiling: Decimal },

    #[error("Daily volume cap exceeded: {accumulated} + {requested} > {limit}")]
    VolumeCapExceeded {
        accumulated: Decimal,
        requested: Decimal,
        limit: Decimal,
    },

    #[error("Spot price {spot} deviates {deviation_bps} bps from TWAP {twap} (max {max_bps} bps)")]
    PriceDeviation {
        spot: Decimal,
        twap: Decimal,
        deviation_bps: Decimal,
        max_bps: u32,
    },
}

impl SluiceError {
    /// True for rejections that happen before any balance is touched.
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self,
            SluiceError::Safety(_)
                | SluiceError::Price(_)
                | SluiceError::ZeroAmount
                | SluiceError::SizeOutOfBounds { .. }
                | SluiceError::DeadlineExpired { .. }
                | SluiceError::InvalidPlan(_)
                | SluiceError::Unauthorized(_)
        )
    }
}
