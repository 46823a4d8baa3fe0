pub mod aggregator;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod price;
pub mod routing;
pub mod safety;
pub mod sources;
pub mod validation;

pub use aggregator::Aggregator;
pub use config::AppConfig;
pub use domain::{
    AccountId, AssetId, CallContext, CommitmentToken, ExecutionState, RoutePlan, RouterEvent,
    SourceId, SourceKind, SourceQuote, TradeRequest, TradingPair, Vault, VaultId, VaultParams,
};
pub use engine::{ExecutionEngine, ExecutionReport, FillOutcome};
pub use error::{PriceError, Result, SafetyError, SluiceError, VaultError};
pub use ledger::{AdminParams, LedgerState, LedgerTx, RouterStats};
pub use price::{ManualOracle, PriceFeed, PriceOracle, PriceSample};
pub use routing::RouteOptimizer;
pub use safety::{PriceDecision, SafetyLayer};
