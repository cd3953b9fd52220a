//! `scan-once` subcommand.

use crate::ledger::TickStatus;
use crate::relay::Relay;

/// Run one delivery tick, print the report as JSON, and return whether the
/// tick completed.
pub async fn run_scan_once_command(relay: &Relay) -> anyhow::Result<bool> {
    let report = relay.delivery().tick().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.status == TickStatus::Completed)
}
