//! Modelos neutrales (TraceContext, Clock).

pub mod clock;
pub mod context;

pub use clock::{add_duration, Clock, ManualClock, SystemClock};
pub use context::TraceContext;
