//! Access control for the command path.

mod access;

pub use access::{AccessPolicy, Invoker, RateLimit};
