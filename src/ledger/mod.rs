//! Ledger-driven delivery.
//!
//! The ledger is a shared spreadsheet: an intake process appends rows, and
//! the [`DeliveryLoop`] sends each row's reply to its recipient and then
//! marks the row's status cell. The status cell is the only durable record
//! of delivery, so a crash between send and mark re-sends the row once.

pub mod payload;
mod record;
mod scanner;
mod store;

pub use payload::{
    ATTACHMENT_EXTENSIONS, AssembledPayload, LINK_FETCH_CONCURRENCY, PayloadLine, classify_line,
    split_payload,
};
pub use record::{ColumnMap, LedgerLayout, LedgerRecord, RowClass, classify};
pub use scanner::{DeliveryLoop, ScanConfig, StatusSlot, TickCounts, TickReport, TickStatus};
pub use store::LedgerStore;
