//! Progress and wrong-answer storage for both identity modes.
//!
//! Registered learners go through the durable repositories; anonymous callers
//! keep the same data in their `AnonymousSession`.

pub mod ledger;
pub mod progress;

pub use ledger::{DurableLedger, MissLedger, SessionLedger};
pub use progress::{DurableProgress, ProgressBackend, SessionProgress};
