#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use neckline_core::domain::{Bar, Position, Side, TargetLevels, Ticket, TpState};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

pub fn hour(i: usize) -> DateTime<Utc> {
    base_time() + Duration::hours(i as i64)
}

/// Hourly bars from closes: open = previous close, high/low one point outside.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(hour(i), open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect()
}

/// Hourly bars whose lows follow `lows`, with highs `height` above and a flat body mid-range.
pub fn bars_from_lows(lows: &[f64], height: f64) -> Vec<Bar> {
    lows.iter()
        .enumerate()
        .map(|(i, &l)| Bar::new(hour(i), l + height / 2.0, l + height, l, l + height / 2.0))
        .collect()
}

/// Piecewise-linear path through `(index, value)` vertices.
pub fn v_path(points: &[(usize, f64)]) -> Vec<f64> {
    let mut out = Vec::new();
    for w in points.windows(2) {
        let (i0, p0) = w[0];
        let (i1, p1) = w[1];
        for i in i0..i1 {
            let t = (i - i0) as f64 / (i1 - i0) as f64;
            out.push(p0 + (p1 - p0) * t);
        }
    }
    out.push(points[points.len() - 1].1);
    out
}

pub fn long_position(
    ticket: u64,
    entry: f64,
    stop: f64,
    targets: [f64; 3],
    opened_at: DateTime<Utc>,
) -> Position {
    Position {
        ticket: Ticket(ticket),
        side: Side::Long,
        entry_price: entry,
        initial_stop: stop,
        stop_loss: stop,
        targets: TargetLevels {
            tp1: targets[0],
            tp2: targets[1],
            tp3: targets[2],
        },
        state: TpState::AtTp1,
        moved_to_breakeven: false,
        moved_to_fixed_profit: false,
        size: 1.0,
        opened_at,
        last_bar_time: Some(opened_at),
    }
}
