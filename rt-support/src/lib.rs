//! Shared runtime support used by every layer: the process-wide handle map,
//! an injectable clock, and the single-threaded cooperative scheduler that
//! each `ws-connection` owns.

pub mod clock;
pub mod handle_map;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handle_map::{HandleMap, INVALID_HANDLE};
pub use scheduler::{Scheduler, TaskTag};
