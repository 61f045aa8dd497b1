//! Append-only decision/audit log.
//!
//! Every guard decision, TP transition, exit, recovery decision and failed
//! execution request lands here as a typed record stamped with the config
//! fingerprint in force. Records are never mutated once appended.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConfigFingerprint, ExitReason, Side, TargetLevels, Ticket, TpState};
use crate::execution::ExecutionRequest;
use crate::guard::GuardDecision;
use crate::recovery::RecoveryAction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Guard(GuardDecision),
    PositionOpened {
        ticket: Ticket,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        targets: TargetLevels,
    },
    TpTransition {
        ticket: Ticket,
        from: TpState,
        to: TpState,
        stop_before: f64,
        stop_after: f64,
    },
    PositionClosed {
        ticket: Ticket,
        price: f64,
        reason: ExitReason,
    },
    Recovery {
        ticket: Ticket,
        action: RecoveryAction,
    },
    /// The execution collaborator refused a request; the intended change was not applied.
    ExecutionFailed {
        request: ExecutionRequest,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    /// Bar the event belongs to.
    pub bar_time: DateTime<Utc>,
    pub fingerprint: ConfigFingerprint,
    #[serde(flatten)]
    pub event: AuditEvent,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    fingerprint: ConfigFingerprint,
    records: Vec<AuditRecord>,
    next_seq: u64,
}

impl AuditLog {
    pub fn new(fingerprint: ConfigFingerprint) -> Self {
        Self {
            fingerprint,
            records: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>, event: AuditEvent) {
        self.records.push(AuditRecord {
            seq: self.next_seq,
            bar_time: timestamp,
            fingerprint: self.fingerprint.clone(),
            event,
        });
        self.next_seq += 1;
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Guard decisions in the order they were made.
    pub fn guard_decisions(&self) -> impl Iterator<Item = &GuardDecision> {
        self.records.iter().filter_map(|r| match &r.event {
            AuditEvent::Guard(d) => Some(d),
            _ => None,
        })
    }

    /// Remove and return every record so far. Sequence numbers keep counting.
    pub fn drain(&mut self) -> Vec<AuditRecord> {
        std::mem::take(&mut self.records)
    }

    /// One JSON object per line.
    pub fn to_jsonl(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}
