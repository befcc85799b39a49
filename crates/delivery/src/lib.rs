//! Popup delivery — frequency ledger over browser storage, targeting
//! evaluation, trigger scheduling, and single-slot display arbitration.

pub mod arbiter;
pub mod frequency;
pub mod scheduler;
pub mod targeting;

pub use arbiter::{DisplayArbiter, DisplayOutcome};
pub use frequency::FrequencyLedger;
pub use scheduler::{PageEvent, TriggerScheduler};
pub use targeting::is_eligible;
