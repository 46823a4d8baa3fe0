//! Price feed and TWAP reference
//!
//! - `PriceFeed` wraps an external oracle and fails closed on stale, incomplete
//!   or non-positive readings
//! - `TwapTracker` keeps a smoothed reference for the large-trade sanity gate

pub mod feed;
pub mod twap;

pub use feed::{within_bps, ManualOracle, OracleRound, PriceFeed, PriceOracle, PriceSample};
pub use twap::TwapTracker;
