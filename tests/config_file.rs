use std::path::Path;

use sluice::config::{AppConfig, DeviationPolicy};

/// The shipped `config/default.toml` must parse, validate, and agree with
/// the built-in defaults the CLI falls back to.
#[test]
fn shipped_default_config_matches_builtin() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let loaded = AppConfig::load_from(&dir).expect("config/default.toml should parse");
    loaded
        .validate()
        .unwrap_or_else(|errors| panic!("shipped config invalid: {}", errors.join("; ")));

    let builtin = AppConfig::default_config();
    let loaded_json = serde_json::to_value(&loaded).expect("serialize loaded");
    let builtin_json = serde_json::to_value(&builtin).expect("serialize builtin");
    assert_eq!(
        loaded_json, builtin_json,
        "config/default.toml drifted from AppConfig::default_config()"
    );
    assert_eq!(loaded.safety.deviation_policy, DeviationPolicy::Reject);
    assert_eq!(loaded.logging.level, "info");
}

/// Every validation problem is reported at once, not just the first.
#[test]
fn validation_reports_all_problems() {
    let mut config = AppConfig::default_config();
    config.router.min_trade_size = rust_decimal::Decimal::ZERO;
    config.price_feed.max_staleness_secs = 0;
    config.router.output_asset = config.router.input_asset.clone();

    let errors = config.validate().expect_err("broken config should fail");
    assert!(
        errors.len() >= 3,
        "expected every problem reported, got: {:?}",
        errors
    );
}
