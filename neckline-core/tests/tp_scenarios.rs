mod common;

use chrono::Duration;
use common::base_time;
use neckline_core::audit::AuditLog;
use neckline_core::config::TargetConfig;
use neckline_core::domain::{Bar, ConfigFingerprint, Side, Ticket, TpState};
use neckline_core::tp::{compute_targets, NewPosition, PositionBook, TpEngine, TpInput, TpOutcome};
use neckline_core::CoreError;

fn approx(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

#[test]
fn default_multiples_for_4500_4400() {
    let t = compute_targets(4500.0, 4400.0, Side::Long, &TargetConfig::default()).unwrap();
    approx(t.tp1, 4640.0);
    approx(t.tp2, 4690.0);
    approx(t.tp3, 4700.0);
}

#[test]
fn zero_distance_gives_no_targets() {
    for side in [Side::Long, Side::Short] {
        assert_eq!(
            compute_targets(4500.0, 4500.0, side, &TargetConfig::default()),
            Err(CoreError::ZeroRisk {
                entry: 4500.0,
                stop: 4500.0,
            })
        );
    }
}

/// TP1 at 0.7R puts it at 4570; a close of 4575 above a fast average of
/// 4560 advances the position.
#[test]
fn close_above_tp1_and_fast_average_advances() {
    let config = TargetConfig {
        tp1_rr: 0.7,
        ..TargetConfig::default()
    };
    let engine = TpEngine::new(config);
    let mut book = PositionBook::new();
    let mut audit = AuditLog::new(ConfigFingerprint::from_bytes(b"scenario"));
    let opened_at = base_time();
    let order = NewPosition {
        side: Side::Long,
        entry_price: 4500.0,
        stop_loss: 4400.0,
        size: 1.0,
        opened_at,
    };
    let pos = engine.open(&mut book, Ticket(1), &order, &mut audit).unwrap();
    approx(pos.targets.tp1, 4570.0);
    approx(pos.targets.tp2, 4690.0);
    approx(pos.targets.tp3, 4700.0);

    let bar = Bar::new(opened_at + Duration::hours(1), 4550.0, 4580.0, 4545.0, 4575.0);
    let input = TpInput {
        bar,
        previous: None,
        fast: Some(4560.0),
        volatility: Some(40.0),
        volatility_reference: Some(40.0),
    };
    let decision = engine.evaluate(&pos, &input);
    assert!(matches!(
        decision.outcome,
        TpOutcome::Advance {
            from: TpState::AtTp1,
            to: TpState::AtTp2,
            ..
        }
    ));
    engine.commit(&mut book, decision, &mut audit).unwrap();

    let live = book.get(Ticket(1)).unwrap();
    assert_eq!(live.state, TpState::AtTp2);
    assert_eq!(live.stop_loss, 4500.0);
    // open + transition
    assert_eq!(audit.len(), 2);
}

#[test]
fn same_bar_never_drives_two_actions() {
    let engine = TpEngine::new(TargetConfig {
        tp1_rr: 0.7,
        ..TargetConfig::default()
    });
    let mut book = PositionBook::new();
    let mut audit = AuditLog::new(ConfigFingerprint::from_bytes(b"scenario"));
    let order = NewPosition {
        side: Side::Long,
        entry_price: 4500.0,
        stop_loss: 4400.0,
        size: 1.0,
        opened_at: base_time(),
    };
    engine.open(&mut book, Ticket(1), &order, &mut audit).unwrap();

    // this bar also blows through TP2 with an impulsive body
    let bar = Bar::new(base_time() + Duration::hours(1), 4550.0, 4700.0, 4545.0, 4695.0);
    let input = TpInput {
        bar,
        previous: None,
        fast: Some(4560.0),
        volatility: Some(40.0),
        volatility_reference: Some(40.0),
    };
    for _ in 0..3 {
        let pos = book.get(Ticket(1)).unwrap().clone();
        let decision = engine.evaluate(&pos, &input);
        engine.commit(&mut book, decision, &mut audit).unwrap();
    }
    assert_eq!(book.get(Ticket(1)).unwrap().state, TpState::AtTp2);
}
