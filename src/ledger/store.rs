//! Ledger store seam.

use async_trait::async_trait;

use crate::error::LedgerError;

/// A spreadsheet-like grid whose first row is the header.
///
/// The relay only reads whole grids and writes single cells. Rows are never
/// rewritten wholesale, so concurrent appenders are never clobbered.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Store name for logs.
    fn name(&self) -> &str;

    /// Read every row, header included. Trailing empty cells may be omitted.
    async fn read_all(&self) -> Result<Vec<Vec<String>>, LedgerError>;

    /// Write one cell. `row` and `column` are 1-based sheet coordinates.
    async fn update_cell(&self, row: usize, column: usize, value: &str)
    -> Result<(), LedgerError>;
}
