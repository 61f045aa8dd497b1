mod common;

use common::{bars_from_closes, bars_from_lows, hour, long_position, v_path};
use neckline_core::config::{
    CoreConfig, GuardConfig, IndicatorConfig, PatternConfig, RecoveryConfig,
};
use neckline_core::domain::{Bar, ExitReason, ReasonCode, Ticket};
use neckline_core::execution::{ExecutionRequest, PaperGateway};
use neckline_core::store::StateSnapshot;
use neckline_core::tp::TpOutcome;
use neckline_core::{CoreError, Phase, Trader};

fn small_config() -> CoreConfig {
    CoreConfig {
        indicators: IndicatorConfig {
            fast_period: 2,
            medium_period: 3,
            slow_period: 4,
            volatility_period: 2,
            warmup_buffer: 1,
        },
        pattern: PatternConfig {
            left_bars: 2,
            right_bars: 2,
            min_bar_gap: 4,
            equality_tolerance_pct: 2.0,
        },
        guard: GuardConfig {
            min_quality_score: 0.0,
            ..GuardConfig::default()
        },
        recovery: RecoveryConfig {
            history_bars: 10,
            max_bar_interval_secs: None,
        },
        ..CoreConfig::default()
    }
}

/// Double bottom at 6 and 14 with a neckline at 10, rising afterwards.
fn setup_bars() -> Vec<Bar> {
    let lows = v_path(&[(0, 110.0), (6, 100.0), (10, 108.0), (14, 100.5), (22, 116.0)]);
    bars_from_lows(&lows, 4.0)
}

/// Flat at 2500, then sliding through 2490.
fn falling_bars() -> Vec<Bar> {
    let mut closes = vec![2500.0; 10];
    closes.extend([2495.0, 2485.0, 2485.0, 2480.0]);
    bars_from_closes(&closes)
}

fn restored_with_position(config: CoreConfig) -> Trader<PaperGateway> {
    let snapshot = StateSnapshot {
        positions: vec![long_position(1, 2500.0, 2490.0, [2514.0, 2519.0, 2520.0], hour(0))],
        ..StateSnapshot::default()
    };
    Trader::restore(config, PaperGateway::starting_after(Ticket(100)), snapshot).unwrap()
}

#[test]
fn live_bars_are_refused_until_recovery_completes() {
    let mut trader = Trader::new(CoreConfig::default(), PaperGateway::new()).unwrap();
    assert_eq!(trader.phase(), Phase::Recovering);
    assert_eq!(trader.on_bars(&falling_bars()), Err(CoreError::RecoveryPending));

    trader.startup(&falling_bars()[..11]);
    assert_eq!(trader.phase(), Phase::Live);
    assert_eq!(trader.last_closed(), Some(hour(9)));
}

#[test]
fn entry_is_opened_then_cooldown_holds() {
    let bars = setup_bars();
    let mut trader = Trader::new(small_config(), PaperGateway::new()).unwrap();
    trader.startup(&bars[..15]);

    let mut reports = Vec::new();
    for end in 16..=19 {
        reports.push(trader.on_bars(&bars[..end]).unwrap());
    }

    // closed indices 14, 15 see no confirmed right low yet
    assert_eq!(reports[0].entry.as_ref().unwrap().reason, ReasonCode::NoSetup);
    assert_eq!(reports[1].entry.as_ref().unwrap().reason, ReasonCode::NoSetup);

    let entered = &reports[2];
    assert_eq!(entered.entry.as_ref().unwrap().reason, ReasonCode::Approved);
    let position = entered.opened.as_ref().expect("position opened");
    assert_eq!(position.ticket, Ticket(1));
    assert!(position.stop_loss < 100.5);
    assert!(position.targets.is_monotonic(position.side));

    let next = &reports[3];
    assert_eq!(next.entry.as_ref().unwrap().reason, ReasonCode::CooldownActive);
    assert_eq!(next.tp_outcomes, vec![(Ticket(1), TpOutcome::Hold)]);

    assert_eq!(trader.book().len(), 1);
    assert!(matches!(trader.gateway().requests()[0], ExecutionRequest::Open { .. }));
}

#[test]
fn refused_open_leaves_no_position_and_no_cooldown() {
    let bars = setup_bars();
    let mut trader = Trader::new(small_config(), PaperGateway::new()).unwrap();
    trader.startup(&bars[..15]);
    trader.on_bars(&bars[..16]).unwrap();
    trader.on_bars(&bars[..17]).unwrap();

    trader.gateway_mut().reject_next(1);
    let report = trader.on_bars(&bars[..18]).unwrap();
    assert!(report.opened.is_none());
    assert!(trader.book().is_empty());

    // the next bar may enter again
    let report = trader.on_bars(&bars[..19]).unwrap();
    assert_eq!(report.entry.unwrap().reason, ReasonCode::Approved);
    assert!(report.opened.is_some());
}

#[test]
fn open_position_blocks_a_second_entry_on_the_same_pattern() {
    let mut config = small_config();
    config.guard.cooldown_bars = 1;
    let bars = setup_bars();
    let mut trader = Trader::new(config, PaperGateway::new()).unwrap();
    trader.startup(&bars[..15]);
    for end in 16..=18 {
        trader.on_bars(&bars[..end]).unwrap();
    }
    assert_eq!(trader.book().len(), 1);

    // cooldown has run out, the pattern is still there
    let report = trader.on_bars(&bars[..19]).unwrap();
    assert_eq!(report.entry.unwrap().reason, ReasonCode::PyramidingLimit);
    assert!(report.opened.is_none());
    assert_eq!(trader.book().len(), 1);
    let opens = trader
        .gateway()
        .requests()
        .iter()
        .filter(|r| matches!(r, ExecutionRequest::Open { .. }))
        .count();
    assert_eq!(opens, 1);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = small_config();
    config.indicators.fast_period = 0;
    assert!(matches!(
        Trader::new(config.clone(), PaperGateway::new()),
        Err(CoreError::Config(_))
    ));
    assert!(Trader::restore(config, PaperGateway::new(), StateSnapshot::default()).is_err());
}

#[test]
fn stop_exit_survives_a_refused_close() {
    let bars = falling_bars();
    let mut trader = restored_with_position(CoreConfig::default());
    let recovery = trader.startup(&bars[..11]);
    assert_eq!(recovery.closes().count(), 0);

    let report = trader.on_bars(&bars[..12]).unwrap();
    assert_eq!(report.tp_outcomes, vec![(Ticket(1), TpOutcome::Hold)]);

    trader.gateway_mut().reject_next(1);
    let report = trader.on_bars(&bars[..13]).unwrap();
    assert_eq!(report.refused, vec![Ticket(1)]);
    assert_eq!(trader.book().len(), 1);

    let report = trader.on_bars(&bars[..14]).unwrap();
    assert_eq!(
        report.tp_outcomes,
        vec![(
            Ticket(1),
            TpOutcome::Exit {
                price: 2490.0,
                reason: ExitReason::StopLoss,
            }
        )]
    );
    assert!(trader.book().is_empty());
}

#[test]
fn repeated_bar_is_stale() {
    let bars = falling_bars();
    let mut trader = restored_with_position(CoreConfig::default());
    trader.startup(&bars[..11]);
    assert!(matches!(
        trader.on_bars(&bars[..11]),
        Err(CoreError::StaleBar { .. })
    ));
}

#[test]
fn skipped_bars_trigger_recovery() {
    let bars = falling_bars();
    let mut trader = restored_with_position(CoreConfig::default());
    trader.startup(&bars[..11]);

    let report = trader.on_bars(&bars[..14]).unwrap();
    let recovery = report.recovery.expect("gap recovery");
    // closed bar 12 at 2485 is beyond the 2490 stop
    assert_eq!(recovery.closes().count(), 1);
    assert!(trader.book().is_empty());
    assert_eq!(trader.last_closed(), Some(hour(12)));
    assert_eq!(trader.phase(), Phase::Live);
}

#[test]
fn long_interval_triggers_recovery() {
    let bars = falling_bars();
    let config = CoreConfig {
        recovery: RecoveryConfig {
            max_bar_interval_secs: Some(1800),
            ..RecoveryConfig::default()
        },
        ..CoreConfig::default()
    };
    let mut trader = restored_with_position(config);
    trader.startup(&bars[..11]);
    let report = trader.on_bars(&bars[..12]).unwrap();
    assert!(report.recovery.is_some());
    assert!(report.tp_outcomes.is_empty());
}

#[test]
fn startup_price_check_closes_on_forming_bar() {
    let bars = falling_bars();
    let mut trader = restored_with_position(CoreConfig::default());
    // closed bar 10 at 2495 keeps it open; the forming bar at 2485 does not
    let report = trader.startup(&bars[..12]);
    assert_eq!(report.closes().count(), 0);
    assert!(trader.book().is_empty());
    assert!(trader
        .gateway()
        .requests()
        .iter()
        .any(|r| matches!(r, ExecutionRequest::Close { price, .. } if *price == 2490.0)));
}

#[test]
fn snapshot_restores_book_and_cooldown() {
    let bars = setup_bars();
    let mut trader = Trader::new(small_config(), PaperGateway::new()).unwrap();
    trader.startup(&bars[..15]);
    for end in 16..=18 {
        trader.on_bars(&bars[..end]).unwrap();
    }
    let snapshot = trader.snapshot();
    assert_eq!(snapshot.positions.len(), 1);
    assert_eq!(snapshot.last_entry_time, Some(hour(16)));

    let restored = Trader::restore(small_config(), PaperGateway::new(), snapshot.clone()).unwrap();
    assert_eq!(restored.snapshot(), snapshot);
    assert!(!trader.audit().to_jsonl().unwrap().is_empty());
}
