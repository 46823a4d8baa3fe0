pub mod optimizer;

pub use optimizer::RouteOptimizer;
