pub mod delivery;
pub mod diff;
pub mod event;
pub mod identity;
pub mod retry;
pub mod run;
pub mod zone;

pub use delivery::{DeliveryRecord, DeliveryStatus};
pub use diff::{Candidate, Classified};
pub use event::{Classification, Event, EventDraft};
pub use retry::RetryPolicy;
pub use run::{PipelineRun, RunCounts, RunError, RunOutcome, RunStage, RunTrigger};
pub use zone::LocalZone;
