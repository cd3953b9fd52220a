//! Herald: announcements and ledger replies relayed into Discord.
//!
//! Two flows share one set of collaborators:
//!
//! - **Announce**: a Google Doc is read, flattened (tables included), its
//!   images resolved through Drive, mention tokens rewritten against the
//!   target channel's roster, and the result sent as one or more messages.
//! - **Deliver**: a recurring tick reads a Google Sheet ledger, sends every
//!   pending reply to its recipient by direct message, and marks the row
//!   fulfilled only after a successful send (at-least-once).

pub mod announce;
pub mod channels;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod google;
pub mod ledger;
pub mod media;
pub mod relay;
pub mod safety;
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
