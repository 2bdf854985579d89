//! Signature descriptor table and checker (§4.3, §9 REDESIGN FLAGS).
//!
//! The source reflectively inspected each handler method at runtime. Per the
//! REDESIGN FLAGS, this is replaced with a plain descriptor assembled once
//! at entity registration (by the host application or a derive macro it
//! supplies) and a checker that is a pure predicate over that table — no
//! reflection anywhere in this crate.

use std::collections::HashSet;

use super::kind::{HandlerKind, ParamSpec, ReturnSpec};

/// One handler entry point on an entity class, as declared at registration.
#[derive(Debug, Clone)]
pub struct SignatureDescriptor {
    pub name: &'static str,
    pub kind: HandlerKind,
    pub params: ParamSpec,
    pub returns: ReturnSpec,
    /// The message class this handler consumes, by `type_url`.
    pub consumes: &'static str,
    /// The message class(es) this handler may produce, by `type_url`. Used
    /// to enforce "a handler must not return the same message type it
    /// consumes" (§4.3).
    pub produces: &'static [&'static str],
    /// An optional filter-field discriminant, for entities that register
    /// more than one handler for the same message class distinguished by a
    /// field value (§4.3: "same (message_class, filter_field_value?)").
    pub filter_field_value: Option<&'static str>,
}

/// Severity of a detected mismatch (§4.3): `Error` prevents registration,
/// `Warn` is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct SignatureMismatch {
    pub handler: &'static str,
    pub severity: Severity,
    pub reason: String,
}

/// A pure, stateless predicate over a `&[SignatureDescriptor]` table.
pub struct SignatureChecker;

impl SignatureChecker {
    /// Walk `descriptors` and report every mismatch found. `Error`-severity
    /// entries must block registration of the whole table by the caller;
    /// `Warn`-severity entries are advisory.
    pub fn check(descriptors: &[SignatureDescriptor]) -> Vec<SignatureMismatch> {
        let mut mismatches = Vec::new();
        let mut seen: HashSet<(&'static str, Option<&'static str>)> = HashSet::new();

        for d in descriptors {
            if d.produces.contains(&d.consumes) {
                mismatches.push(SignatureMismatch {
                    handler: d.name,
                    severity: Severity::Error,
                    reason: format!(
                        "handler '{}' returns the same message type it consumes ({}); this would loop back into the event store",
                        d.name, d.consumes
                    ),
                });
            }

            if d.kind == HandlerKind::EventApplier && !matches!(d.params, ParamSpec::EventMsgEventCtx) {
                mismatches.push(SignatureMismatch {
                    handler: d.name,
                    severity: Severity::Error,
                    reason: format!(
                        "event applier '{}' must take (event_msg, event_ctx)",
                        d.name
                    ),
                });
            }

            if d.kind == HandlerKind::RejectionReactor
                && !matches!(
                    d.params,
                    ParamSpec::RejectionMsgCommandCtx | ParamSpec::RejectionMsgCommandCtxCommandMsg
                )
            {
                mismatches.push(SignatureMismatch {
                    handler: d.name,
                    severity: Severity::Warn,
                    reason: format!(
                        "rejection reactor '{}' has an unusual parameter shape for its kind",
                        d.name
                    ),
                });
            }

            if !d.kind.may_produce_commands() && d.returns != ReturnSpec::Nothing && d.kind != HandlerKind::EventApplier
            {
                // Event appliers return the applied event's derived state
                // implicitly; everything else that can't produce commands
                // returning something is merely unusual, not fatal.
                mismatches.push(SignatureMismatch {
                    handler: d.name,
                    severity: Severity::Warn,
                    reason: format!(
                        "handler '{}' of kind {:?} returns a value but cannot produce follow-up messages",
                        d.name, d.kind
                    ),
                });
            }

            let key = (d.consumes, d.filter_field_value);
            if !seen.insert(key) {
                mismatches.push(SignatureMismatch {
                    handler: d.name,
                    severity: Severity::Error,
                    reason: format!(
                        "duplicate handler for message class {} (filter={:?})",
                        d.consumes, d.filter_field_value
                    ),
                });
            }
        }

        mismatches
    }

    /// `true` if any mismatch in `mismatches` is `Error`-severity.
    pub fn has_blocking_errors(mismatches: &[SignatureMismatch]) -> bool {
        mismatches.iter().any(|m| m.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &'static str, kind: HandlerKind, consumes: &'static str, produces: &'static [&'static str]) -> SignatureDescriptor {
        SignatureDescriptor {
            name,
            kind,
            params: ParamSpec::MsgCtx,
            returns: ReturnSpec::IterableOfMessages,
            consumes,
            produces,
            filter_field_value: None,
        }
    }

    #[test]
    fn handler_returning_its_own_input_type_is_blocked() {
        let descriptors = vec![descriptor(
            "on_number_added",
            HandlerKind::EventReactor,
            "NumberAdded",
            &["NumberAdded"],
        )];
        let mismatches = SignatureChecker::check(&descriptors);
        assert!(SignatureChecker::has_blocking_errors(&mismatches));
    }

    #[test]
    fn duplicate_handlers_for_same_class_are_blocked() {
        let descriptors = vec![
            descriptor("a", HandlerKind::CommandHandler, "PlaceOrder", &[]),
            descriptor("b", HandlerKind::CommandHandler, "PlaceOrder", &[]),
        ];
        let mismatches = SignatureChecker::check(&descriptors);
        assert!(SignatureChecker::has_blocking_errors(&mismatches));
    }

    #[test]
    fn well_formed_handlers_produce_no_mismatches() {
        let descriptors = vec![SignatureDescriptor {
            name: "apply_number_added",
            kind: HandlerKind::EventApplier,
            params: ParamSpec::EventMsgEventCtx,
            returns: ReturnSpec::Nothing,
            consumes: "NumberAdded",
            produces: &[],
            filter_field_value: None,
        }];
        assert!(SignatureChecker::check(&descriptors).is_empty());
    }
}
