//! Invariants that must hold for every trade, checked across trade sizes and
//! ledger shapes.

mod common;

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{config_with, trader, usdc, vault, Fixture, ESCROW};
use sluice::config::DeviationPolicy;
use sluice::{
    AccountId, CallContext, CommitmentToken, PriceDecision, SafetyError, SluiceError, SourceId,
    VaultError, VaultId,
};

fn three_vaults() -> Vec<sluice::config::SeedVault> {
    vec![
        vault(1, 10, dec!(2)),
        vault(2, 12, dec!(4)),
        vault(3, 15, dec!(6)),
    ]
}

/// Every unit of input is either spent on a leg or refunded, and escrow
/// never keeps anything.
#[tokio::test]
async fn input_is_conserved_across_sizes() {
    for amount in [dec!(500), dec!(5000), dec!(15019.75), dec!(40000), dec!(120000)] {
        let fx = Fixture::new(config_with(three_vaults()));
        let request = fx.request(amount, Decimal::ZERO);
        let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
        let (usdc_before, weth_before) = fx.trader_balances().await;

        let report = fx
            .aggregator
            .execute(&request, &plan, &fx.trader_ctx())
            .await
            .unwrap();

        let (usdc_after, weth_after) = fx.trader_balances().await;
        assert_eq!(
            report.input_spent() + report.refunded,
            amount,
            "spent + refunded must equal input at size {}",
            amount
        );
        assert_eq!(usdc_before - usdc_after, report.input_spent());
        assert_eq!(weth_after - weth_before, report.actual_output);
        assert_eq!(
            fx.aggregator
                .balance(&AccountId::new(ESCROW), &usdc())
                .await,
            Decimal::ZERO
        );
    }
}

/// The split never quotes less than routing everything to the fallback.
#[tokio::test]
async fn plan_never_underperforms_fallback_baseline() {
    let fx = Fixture::new(config_with(vec![
        vault(1, 10, dec!(2)),
        vault(2, 45, dec!(40)),
        vault(3, 100, dec!(400)),
    ]));
    for amount in [
        dec!(10),
        dec!(999.99),
        dec!(2502.5),
        dec!(2502.6),
        dec!(50000),
        dec!(50001),
        dec!(300000),
        dec!(2000000),
    ] {
        let request = fx.request(amount, Decimal::ZERO);
        let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
        assert!(
            plan.total_output >= plan.baseline_output,
            "size {}: plan {} < baseline {}",
            amount,
            plan.total_output,
            plan.baseline_output
        );
        assert_eq!(plan.total_input, amount, "plan must spend exactly the input");
        assert_eq!(
            plan.legs.iter().map(|l| l.output_amount).sum::<Decimal>(),
            plan.total_output
        );
    }
}

/// Quoting twice against an unchanged ledger gives the same plan.
#[tokio::test]
async fn quotes_are_idempotent() {
    let fx = Fixture::new(config_with(three_vaults()));
    let request = fx.request(dec!(40000), Decimal::ZERO);

    let first = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let second = fx.aggregator.quote(&request, fx.now).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    assert_eq!(
        fx.aggregator.stats().await.trade_count,
        0,
        "quoting must not record trades"
    );
}

/// A vault fill never exceeds the utilization bound at settlement time, even
/// when the plan assumed more and the drift was within tolerance.
#[tokio::test]
async fn vault_fills_respect_live_utilization() {
    let fx = Fixture::new(config_with(vec![vault(1, 10, dec!(20))]));
    let request = fx.request(dec!(10000), dec!(3.9));
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    assert_eq!(plan.legs[0].output_amount, dec!(3.996003996003));

    // max fill becomes 3.99, about 15 bps under the plan
    fx.aggregator
        .withdraw(&fx.owner_ctx(1), VaultId(1), dec!(12.02))
        .await
        .unwrap();

    let report = fx
        .aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .unwrap();
    let vault_fill = report
        .filled()
        .find(|r| r.source == SourceId::Vault(VaultId(1)))
        .expect("vault filled within tolerance");
    assert_eq!(vault_fill.output_received, dec!(3.99));
    assert_eq!(vault_fill.input_spent, dec!(3.99) * dec!(2502.5));
    assert_eq!(report.skipped_count(), 0);
}

/// Structural rejections happen before any balance moves.
#[tokio::test]
async fn rejections_leave_ledger_untouched() {
    let fx = Fixture::new(config_with(three_vaults()));
    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let before = fx.aggregator.snapshot().await;

    let mut expired = request.clone();
    expired.deadline = fx.now - Duration::seconds(1);
    let err = fx
        .aggregator
        .execute(&expired, &plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::DeadlineExpired { .. }));

    let mut zero = request.clone();
    zero.input_amount = Decimal::ZERO;
    let err = fx
        .aggregator
        .execute(&zero, &plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::ZeroAmount));

    let tiny = fx.request(dec!(1), Decimal::ZERO);
    let tiny_plan = fx.aggregator.quote(&tiny, fx.now).await.unwrap();
    let err = fx
        .aggregator
        .execute(&tiny, &tiny_plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::SizeOutOfBounds { .. }));

    let stranger = CallContext::direct(AccountId::new("stranger"), dec!(1), dec!(30), fx.now);
    let err = fx
        .aggregator
        .execute(&request, &plan, &stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::Unauthorized(_)));

    let bigger = fx.request(dec!(20000), Decimal::ZERO);
    let err = fx
        .aggregator
        .execute(&bigger, &plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::InvalidPlan(_)));

    assert_eq!(fx.aggregator.snapshot().await, before);
}

/// Owner console calls with absurd amounts fail with typed errors.
#[tokio::test]
async fn oversized_owner_deposit_is_rejected() {
    let fx = Fixture::new(config_with(three_vaults()));
    let before = fx.aggregator.snapshot().await;

    let err = fx
        .aggregator
        .deposit(&fx.owner_ctx(1), VaultId(1), Decimal::MAX)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SluiceError::Vault(VaultError::DepositCapExceeded { .. })
    ));
    assert_eq!(fx.aggregator.snapshot().await, before);
}

/// Halting blocks execution and deposits, but quotes and withdrawals go on.
#[tokio::test]
async fn halt_blocks_execution_only() {
    let fx = Fixture::new(config_with(three_vaults()));
    fx.aggregator.set_halted(&fx.admin_ctx(), true).await.unwrap();

    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let err = fx
        .aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, SluiceError::Safety(SafetyError::Halted)));

    assert!(fx
        .aggregator
        .withdraw(&fx.owner_ctx(1), VaultId(1), dec!(1))
        .await
        .is_ok());
    assert!(fx
        .aggregator
        .deposit(&fx.owner_ctx(1), VaultId(1), dec!(1))
        .await
        .is_err());

    fx.aggregator.set_halted(&fx.admin_ctx(), false).await.unwrap();
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    assert!(fx
        .aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .is_ok());
}

/// Standing capital, fee price and daily volume gates each reject on their own.
#[tokio::test]
async fn validated_stage_gates_reject() {
    let fx = Fixture::new(config_with(three_vaults()));
    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();

    let poor = CallContext::direct(trader(), dec!(0.001), dec!(30), fx.now);
    assert!(matches!(
        fx.aggregator.execute(&request, &plan, &poor).await,
        Err(SluiceError::Safety(
            SafetyError::InsufficientStandingCapital { .. }
        ))
    ));

    let pricey = CallContext::direct(trader(), dec!(1), dec!(600), fx.now);
    assert!(matches!(
        fx.aggregator.execute(&request, &plan, &pricey).await,
        Err(SluiceError::Safety(SafetyError::FeePriceTooHigh { .. }))
    ));

    fx.aggregator
        .set_volume_cap(&fx.admin_ctx(), dec!(15000))
        .await
        .unwrap();
    fx.aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .unwrap();
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    assert!(matches!(
        fx.aggregator
            .execute(&request, &plan, &fx.trader_ctx())
            .await,
        Err(SluiceError::Safety(SafetyError::VolumeCapExceeded { .. }))
    ));
}

/// A plan quoted at a price the market has since left is refused.
#[tokio::test]
async fn plan_priced_away_from_market_is_refused() {
    let fx = Fixture::new(config_with(three_vaults()));
    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();

    // 100 bps move against a 50 bps plan tolerance
    fx.oracle.set_price(dec!(2525), fx.now);
    assert!(matches!(
        fx.aggregator
            .execute(&request, &plan, &fx.trader_ctx())
            .await,
        Err(SluiceError::InvalidPlan(_))
    ));
}

/// A submitted plan carrying out-of-range values is refused with a typed
/// error and moves nothing.
#[tokio::test]
async fn tampered_plan_values_are_refused() {
    let fx = Fixture::new(config_with(three_vaults()));
    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let before = fx.aggregator.snapshot().await;

    let mut tampered = Vec::new();
    for price in [Decimal::MAX, Decimal::MIN, Decimal::ZERO] {
        let mut p = plan.clone();
        p.price = price;
        tampered.push(p);
    }
    let mut p = plan.clone();
    p.legs[0].output_amount = Decimal::MAX;
    p.total_output = Decimal::MAX;
    tampered.push(p);
    let mut p = plan.clone();
    p.baseline_output = Decimal::MIN;
    tampered.push(p);

    for p in &tampered {
        let err = fx
            .aggregator
            .execute(&request, p, &fx.trader_ctx())
            .await
            .unwrap_err();
        assert!(
            matches!(err, SluiceError::InvalidPlan(_)),
            "unexpected error {:?}",
            err
        );
    }
    assert_eq!(fx.aggregator.snapshot().await, before);
}

fn large_trade_fixture(policy: DeviationPolicy) -> Fixture {
    let mut config = config_with(vec![vault(1, 10, dec!(20))]);
    config.safety.large_trade_threshold = dec!(1000);
    config.safety.deviation_policy = policy;
    Fixture::new(config)
}

/// Large trades whose spot price strays from the TWAP are rejected under the
/// reject policy.
#[tokio::test]
async fn large_trade_spot_deviation_rejected() {
    let fx = large_trade_fixture(DeviationPolicy::Reject);
    let earlier = fx.now - Duration::minutes(20);
    fx.oracle.set_price(dec!(2500), earlier);
    fx.aggregator.record_price(earlier).await.unwrap();
    fx.oracle.set_price(dec!(2600), fx.now);

    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let err = fx
        .aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .unwrap_err();
    assert!(
        matches!(err, SluiceError::Safety(SafetyError::PriceDeviation { .. })),
        "got {:?}",
        err
    );
}

/// Under the substitute policy the TWAP becomes the settlement price.
#[tokio::test]
async fn large_trade_spot_deviation_substitutes_twap() {
    let fx = large_trade_fixture(DeviationPolicy::Substitute);
    let earlier = fx.now - Duration::minutes(20);
    fx.oracle.set_price(dec!(2500), earlier);
    fx.aggregator.record_price(earlier).await.unwrap();
    fx.oracle.set_price(dec!(2600), fx.now);

    let request = fx.request(dec!(10000), Decimal::ZERO);
    let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
    let report = fx
        .aggregator
        .execute(&request, &plan, &fx.trader_ctx())
        .await
        .unwrap();

    assert_eq!(
        report.price,
        PriceDecision::Substituted {
            spot: dec!(2600),
            twap: dec!(2500),
        }
    );
    let vault_fill = report
        .filled()
        .find(|r| r.source == SourceId::Vault(VaultId(1)))
        .expect("vault filled");
    assert_eq!(vault_fill.output_received, plan.legs[0].output_amount);
    assert_eq!(
        vault_fill.input_spent,
        plan.legs[0].output_amount * dec!(2502.5),
        "vault paid at the TWAP"
    );
}

/// Tokens derived from the same trader and nonce collide; different nonces do not.
#[tokio::test]
async fn commitments_are_per_nonce() {
    let fx = Fixture::new(config_with(three_vaults()));
    for nonce in 1..=3 {
        let request = fx
            .request(dec!(1000), Decimal::ZERO)
            .with_commitment(CommitmentToken::derive(&trader(), nonce));
        let plan = fx.aggregator.quote(&request, fx.now).await.unwrap();
        fx.aggregator
            .execute(&request, &plan, &fx.trader_ctx())
            .await
            .unwrap();
    }
    let state = fx.aggregator.snapshot().await;
    assert_eq!(state.commitments().len(), 3);
    assert_eq!(state.stats().trade_count, 3);
}
