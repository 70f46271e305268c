//! Fixed-capacity per-symbol price snapshot.
//!
//! A snapshot has exactly one slot per configured exchange. Slots start as
//! `Pending`, are filled once by the fetch that owns them, and every slot that
//! is still pending when the snapshot is frozen becomes an explicit absence.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PriceQuote;

/// Why an exchange has no quote in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceReason {
    /// The fetch did not finish within the per-fetch timeout.
    Timeout,
    /// The exchange returned an error.
    Error,
    /// The exchange has no book for the symbol.
    NoQuote,
    /// The quote failed validation.
    Invalid,
    /// The quote was older than one already accepted from the same exchange.
    Stale,
    /// The slot was never filled before the snapshot was frozen.
    NoResponse,
}

impl std::fmt::Display for AbsenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbsenceReason::Timeout => "timeout",
            AbsenceReason::Error => "error",
            AbsenceReason::NoQuote => "no_quote",
            AbsenceReason::Invalid => "invalid",
            AbsenceReason::Stale => "stale",
            AbsenceReason::NoResponse => "no_response",
        };
        write!(f, "{}", s)
    }
}

/// Content of one exchange slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum QuoteSlot {
    Pending,
    Present(PriceQuote),
    Absent(AbsenceReason),
}

/// One exchange slot in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub exchange: String,
    pub slot: QuoteSlot,
}

/// Mutable, fixed-size snapshot under construction.
#[derive(Debug)]
pub struct SnapshotBuilder {
    symbol: String,
    taken_at: DateTime<Utc>,
    entries: Box<[SnapshotEntry]>,
}

impl SnapshotBuilder {
    /// Creates a builder with one pending slot per exchange.
    pub fn new(symbol: impl Into<String>, exchanges: &[String], taken_at: DateTime<Utc>) -> Self {
        let entries = exchanges
            .iter()
            .map(|exchange| SnapshotEntry {
                exchange: exchange.clone(),
                slot: QuoteSlot::Pending,
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            symbol: symbol.into(),
            taken_at,
            entries,
        }
    }

    /// Fills a pending slot. Returns false if the index is out of range or the
    /// slot was already filled; a filled slot is never overwritten.
    pub fn fill(&mut self, index: usize, slot: QuoteSlot) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.slot == QuoteSlot::Pending && slot != QuoteSlot::Pending => {
                entry.slot = slot;
                true
            }
            _ => false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Freezes the snapshot. Slots that were never filled become absent.
    pub fn freeze(mut self) -> PriceSnapshot {
        for entry in self.entries.iter_mut() {
            if entry.slot == QuoteSlot::Pending {
                entry.slot = QuoteSlot::Absent(AbsenceReason::NoResponse);
            }
        }
        PriceSnapshot {
            symbol: self.symbol,
            taken_at: self.taken_at,
            entries: self.entries,
        }
    }
}

/// Frozen, read-only snapshot of one symbol across all configured exchanges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    symbol: String,
    taken_at: DateTime<Utc>,
    entries: Box<[SnapshotEntry]>,
}

impl PriceSnapshot {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Instant the snapshot was started.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Number of slots (equals the configured exchange count).
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Iterates over present quotes in exchange order.
    pub fn present(&self) -> impl Iterator<Item = &PriceQuote> {
        self.entries.iter().filter_map(|e| match &e.slot {
            QuoteSlot::Present(q) => Some(q),
            _ => None,
        })
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    /// Returns the absence reason for an exchange, if its slot is absent.
    pub fn absence(&self, exchange: &str) -> Option<AbsenceReason> {
        self.entries
            .iter()
            .find(|e| e.exchange == exchange)
            .and_then(|e| match e.slot {
                QuoteSlot::Absent(reason) => Some(reason),
                _ => None,
            })
    }
}
