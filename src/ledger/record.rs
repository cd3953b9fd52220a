//! Typed ledger rows.
//!
//! A raw row is a list of cell strings. It is parsed once, against a
//! [`ColumnMap`] built from the header row, into a [`LedgerRecord`] or
//! classified as already done, empty, or malformed.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Column names and status column settings of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLayout {
    /// Header of the recipient id column.
    pub recipient_column: String,
    /// Header of the free-text payload column.
    pub payload_column: String,
    /// Header of the timestamp column. Optional in the sheet.
    pub timestamp_column: String,
    /// 1-based offset of the status column.
    pub status_column: usize,
    /// Value written to the status column on commit.
    pub fulfilled_marker: String,
}

impl Default for LedgerLayout {
    fn default() -> Self {
        Self {
            recipient_column: "User Id".to_string(),
            payload_column: "Revert".to_string(),
            timestamp_column: "Timestamp".to_string(),
            status_column: 9,
            fulfilled_marker: "Yes".to_string(),
        }
    }
}

impl LedgerLayout {
    /// Whether a status cell marks the row fulfilled.
    pub fn is_fulfilled(&self, status: &str) -> bool {
        status.trim().eq_ignore_ascii_case(self.fulfilled_marker.trim())
    }
}

/// 0-based indices of the columns the relay reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub recipient: usize,
    pub payload: usize,
    pub timestamp: Option<usize>,
    pub status: usize,
}

impl ColumnMap {
    /// Locate columns by header name (trimmed, case-insensitive).
    pub fn from_header(header: &[String], layout: &LedgerLayout) -> Result<Self, LedgerError> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        };
        let required = |name: &str| {
            find(name).ok_or_else(|| LedgerError::MissingColumn {
                name: name.to_string(),
            })
        };

        if layout.status_column == 0 {
            return Err(LedgerError::MissingColumn {
                name: "status (column offset 0)".to_string(),
            });
        }

        Ok(Self {
            recipient: required(&layout.recipient_column)?,
            payload: required(&layout.payload_column)?,
            timestamp: find(&layout.timestamp_column),
            status: layout.status_column - 1,
        })
    }
}

/// One pending ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    /// 1-based data row number, header excluded.
    pub row: usize,
    pub recipient_id: u64,
    pub payload: String,
    pub timestamp: Option<String>,
    pub status: String,
}

impl LedgerRecord {
    /// 1-based row in the sheet, counting the header.
    pub fn sheet_row(&self) -> usize {
        self.row + 1
    }
}

/// Outcome of classifying one raw row.
#[derive(Debug)]
pub enum RowClass {
    Fulfilled,
    EmptyPayload,
    Pending(LedgerRecord),
    Malformed(LedgerError),
}

/// Classify the data row `row` (1-based, header excluded).
///
/// Fulfilled rows and rows with an empty payload are skipped before the
/// recipient is validated, so a finished row with a bad id is never reported.
pub fn classify(row: usize, cells: &[String], columns: &ColumnMap, layout: &LedgerLayout) -> RowClass {
    let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

    let status = cell(columns.status);
    if layout.is_fulfilled(status) {
        return RowClass::Fulfilled;
    }

    let payload = cell(columns.payload);
    if payload.trim().is_empty() {
        return RowClass::EmptyPayload;
    }

    let raw_recipient = cell(columns.recipient).trim();
    let recipient_id = match parse_recipient(raw_recipient) {
        Some(id) => id,
        None => {
            return RowClass::Malformed(LedgerError::MalformedRow {
                row,
                reason: if raw_recipient.is_empty() {
                    "recipient id is empty".to_string()
                } else {
                    format!("recipient id '{}' is not numeric", raw_recipient)
                },
            });
        }
    };

    RowClass::Pending(LedgerRecord {
        row,
        recipient_id,
        payload: payload.to_string(),
        timestamp: columns
            .timestamp
            .map(|i| cell(i).trim().to_string())
            .filter(|t| !t.is_empty()),
        status: status.to_string(),
    })
}

fn parse_recipient(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|id| *id > 0)
}
