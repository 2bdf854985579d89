//! The orthogonal classification tags a handler entry point carries (§4.3).

/// What role a handler plays for its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Handles a command and mutates the entity.
    CommandHandler,
    /// Command-in → command-out: translates one command into another
    /// without itself mutating state.
    CommandSubstitute,
    /// Folds an event into an aggregate's state (aggregates only).
    EventApplier,
    /// Reacts to an event, possibly producing commands or events.
    EventReactor,
    /// Reacts to a rejection, possibly producing commands.
    RejectionReactor,
    /// Observes an event without mutating the entity (read-only side effect).
    EventSubscriber,
}

impl HandlerKind {
    /// Event appliers are the only kind allowed to mutate aggregate state
    /// directly from an event (§4.3, §4.5).
    pub fn is_event_applier(self) -> bool {
        matches!(self, HandlerKind::EventApplier)
    }

    /// Kinds that are permitted to emit follow-up commands.
    pub fn may_produce_commands(self) -> bool {
        matches!(
            self,
            HandlerKind::CommandSubstitute | HandlerKind::EventReactor | HandlerKind::RejectionReactor
        )
    }
}

/// The shape of a handler's parameter list (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSpec {
    Msg,
    MsgCtx,
    EventMsgEventCtx,
    RejectionMsgCommandCtx,
    RejectionMsgCommandCtxCommandMsg,
}

/// The shape of a handler's return value (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnSpec {
    SingleMessage,
    IterableOfMessages,
    OptionalMessage,
    Tuple,
    Nothing,
}
