pub mod audit;
pub mod entry;
pub mod verification;

pub use audit::{AuditEntity, AuditEvent, NewAuditEvent};
pub use entry::{Entry, EntryOutcome, EntryStatus, EntryTransition, NewEntry};
pub use verification::{
    DocumentRef, Evidence, ReviewAction, ReviewStatus, ReviewTransition, VerificationRecord,
    Witness,
};
