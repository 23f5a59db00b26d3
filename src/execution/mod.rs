// Order sizing, entry placement and lifecycle reconciliation
pub mod entry;
pub mod outbox;
pub mod reconcile;
pub mod sizing;

pub use entry::{free_balance, EntryMode, EntryPlanner, PlacedEntry};
pub use outbox::OutboxReport;
pub use reconcile::{ExitReason, ReconcileReport, Reconciler, Transition};
pub use sizing::size_entry;
