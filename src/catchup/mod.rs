//! Catch-up processes (C9, §4.7): replay a projection's missed history from
//! the event store, then hand off to live inbox delivery once the
//! turbulence window has closed.

mod process;
mod state;

pub use process::CatchUpProcess;
pub use state::{CatchUpEvent, CatchUpId, CatchUpRequest, CatchUpState, CatchUpStatus};
