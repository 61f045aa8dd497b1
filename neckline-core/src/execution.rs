//! Execution collaborator seam.
//!
//! The core only issues requests and reads back what the collaborator
//! reports. It never assumes a request succeeded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ExitReason, Side, Ticket};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionRequest {
    Open {
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    },
    Close {
        ticket: Ticket,
        price: f64,
        reason: ExitReason,
    },
    MoveStop {
        ticket: Ticket,
        stop_loss: f64,
    },
}

/// What the collaborator says happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionReport {
    Accepted { ticket: Ticket },
    Rejected { message: String },
}

impl ExecutionReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ExecutionReport::Accepted { .. })
    }
}

pub trait ExecutionGateway: Send {
    fn open(&mut self, side: Side, entry_price: f64, stop_loss: f64, take_profit: f64, size: f64)
        -> ExecutionReport;

    fn close(&mut self, ticket: Ticket, price: f64, reason: ExitReason) -> ExecutionReport;

    fn move_stop(&mut self, ticket: Ticket, stop_loss: f64) -> ExecutionReport;
}

/// Accepts every request (unless told to refuse) and keeps a log of what it saw.
#[derive(Debug, Clone, Default)]
pub struct PaperGateway {
    next_ticket: u64,
    requests: Vec<ExecutionRequest>,
    reject_remaining: usize,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets are handed out from `first + 1` upward.
    pub fn starting_after(first: Ticket) -> Self {
        Self {
            next_ticket: first.0,
            ..Self::default()
        }
    }

    /// Refuse the next `count` requests.
    pub fn reject_next(&mut self, count: usize) {
        self.reject_remaining = count;
    }

    pub fn requests(&self) -> &[ExecutionRequest] {
        &self.requests
    }

    fn respond(&mut self, request: ExecutionRequest, ticket: Option<Ticket>) -> ExecutionReport {
        debug!(?request, "paper execution request");
        self.requests.push(request);
        if self.reject_remaining > 0 {
            self.reject_remaining -= 1;
            return ExecutionReport::Rejected {
                message: "paper gateway rejection".into(),
            };
        }
        let ticket = ticket.unwrap_or_else(|| {
            self.next_ticket += 1;
            Ticket(self.next_ticket)
        });
        ExecutionReport::Accepted { ticket }
    }
}

impl ExecutionGateway for PaperGateway {
    fn open(
        &mut self,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    ) -> ExecutionReport {
        self.respond(
            ExecutionRequest::Open {
                side,
                entry_price,
                stop_loss,
                take_profit,
                size,
            },
            None,
        )
    }

    fn close(&mut self, ticket: Ticket, price: f64, reason: ExitReason) -> ExecutionReport {
        self.respond(
            ExecutionRequest::Close {
                ticket,
                price,
                reason,
            },
            Some(ticket),
        )
    }

    fn move_stop(&mut self, ticket: Ticket, stop_loss: f64) -> ExecutionReport {
        self.respond(ExecutionRequest::MoveStop { ticket, stop_loss }, Some(ticket))
    }
}
