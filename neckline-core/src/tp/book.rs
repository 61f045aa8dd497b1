//! Open positions keyed by ticket.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{Position, Ticket};
use crate::error::{CoreError, Result};

/// One live record per ticket. Closing removes the record outright.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionBook {
    positions: BTreeMap<Ticket, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted positions, rejecting duplicate tickets.
    pub fn from_positions(positions: impl IntoIterator<Item = Position>) -> Result<Self> {
        let mut book = Self::new();
        for pos in positions {
            book.insert(pos)?;
        }
        Ok(book)
    }

    pub fn insert(&mut self, position: Position) -> Result<()> {
        if self.positions.contains_key(&position.ticket) {
            return Err(CoreError::DuplicateTicket(position.ticket));
        }
        self.positions.insert(position.ticket, position);
        Ok(())
    }

    /// Swap in a new value for a live ticket.
    pub fn replace(&mut self, position: Position) -> Result<Position> {
        match self.positions.get_mut(&position.ticket) {
            Some(slot) => Ok(std::mem::replace(slot, position)),
            None => Err(CoreError::UnknownTicket(position.ticket)),
        }
    }

    pub fn remove(&mut self, ticket: Ticket) -> Result<Position> {
        self.positions
            .remove(&ticket)
            .ok_or(CoreError::UnknownTicket(ticket))
    }

    pub fn get(&self, ticket: Ticket) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    pub fn contains(&self, ticket: Ticket) -> bool {
        self.positions.contains_key(&ticket)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in ticket order.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }
}

/// Book shared between the evaluation cycle (sole writer) and display readers.
///
/// Writers hold the lock for a whole decision, so readers only ever see a
/// position before or after a transition.
#[derive(Debug, Clone, Default)]
pub struct SharedBook {
    inner: Arc<RwLock<PositionBook>>,
}

impl SharedBook {
    pub fn new(book: PositionBook) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PositionBook> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PositionBook> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
