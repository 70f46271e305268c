//! Domain models shared by the fetch, scan and execute stages.

mod cycle;
mod fees;
mod opportunity;
mod order;
mod quote;
mod snapshot;
mod trade;

pub use cycle::{CycleResult, CycleStatus, ErrorKind, ErrorRecord};
pub use fees::FeeTable;
pub use opportunity::Opportunity;
pub use order::{OrderReport, OrderRef, OrderRequest, OrderSide, OrderStatus};
pub use quote::{PriceQuote, QuoteError};
pub use snapshot::{AbsenceReason, PriceSnapshot, QuoteSlot, SnapshotBuilder, SnapshotEntry};
pub use trade::{ExecutionPhase, LegRecord, TradeAttempt, TradeOutcome};

use rust_decimal::Decimal;

/// Number of basis points in one unit.
pub const BPS_PER_UNIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
