//! Sheets v4 ledger store.

use async_trait::async_trait;
use serde::Deserialize;

use super::GoogleClient;
use crate::error::LedgerError;
use crate::ledger::LedgerStore;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// One worksheet of a spreadsheet used as the ledger.
#[derive(Debug, Clone)]
pub struct SheetsLedger {
    client: GoogleClient,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
}

impl SheetsLedger {
    pub fn new(
        client: GoogleClient,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: SHEETS_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// The sheet name as an A1 range prefix: `'Name'`.
    fn quoted_sheet(&self) -> String {
        format!("'{}'", self.sheet_name.replace('\'', "''"))
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id),
            urlencoding::encode(range)
        )
    }
}

#[async_trait]
impl LedgerStore for SheetsLedger {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn read_all(&self) -> Result<Vec<Vec<String>>, LedgerError> {
        let request = self
            .client
            .http()
            .get(self.values_url(&self.quoted_sheet()))
            .query(&[("majorDimension", "ROWS")]);

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| LedgerError::Unavailable {
                reason: e.to_string(),
            })?;
        let range: ValueRange = response.json().await.map_err(|e| LedgerError::Unavailable {
            reason: format!("unexpected values response: {}", e),
        })?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_cell(&self, row: usize, column: usize, value: &str) -> Result<(), LedgerError> {
        let range = format!("{}!{}{}", self.quoted_sheet(), column_letter(column), row);
        let request = self
            .client
            .http()
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [[value]],
            }));

        self.client
            .send(request)
            .await
            .map_err(|e| LedgerError::CommitFailed {
                row,
                reason: e.to_string(),
            })?;

        tracing::debug!(range = %range, "Updated ledger cell");
        Ok(())
    }
}

/// A1 column letters for a 1-based column index: 1 → A, 27 → AA.
pub fn column_letter(column: usize) -> String {
    let mut n = column.max(1);
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}
