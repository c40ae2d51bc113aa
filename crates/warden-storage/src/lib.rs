//! Warden storage crate - flat-file roster and moderation audit log.
//!
//! The roster is a whole-file text store: loaded wholesale, appended to on
//! addition and rewritten on removal. The audit log is append-only.

pub mod audit;
pub mod error;
pub mod roster;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use error::RosterError;
pub use roster::{format_record, parse_record, RosterStore};
