//! Handler model and signature checker (C5).
//!
//! Classifies an entity's handler entry points by kind, parameter shape, and
//! return shape, and checks a registration-time table of those
//! classifications for the invariants §4.3 names — without any runtime
//! reflection (see `signature.rs` for why).

mod kind;
mod signature;

pub use kind::{HandlerKind, ParamSpec, ReturnSpec};
pub use signature::{Severity, SignatureChecker, SignatureDescriptor, SignatureMismatch};
