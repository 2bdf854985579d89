use std::fmt;

use serde_json;

use super::context::Context;
use super::id::{ProducerId, SignalId};
use super::payload::Payload;
use super::version::Version;
use crate::error::Error;

/// The three message families this crate routes (§1, §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Command,
    Event,
    Rejection,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Command => write!(f, "command"),
            MessageKind::Event => write!(f, "event"),
            MessageKind::Rejection => write!(f, "rejection"),
        }
    }
}

/// A message class: the (kind, type_url) pair used to key dispatcher
/// registries, routing tables, and signature descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageClass {
    pub kind: MessageKind,
    pub type_url: &'static str,
}

impl MessageClass {
    pub fn new(kind: MessageKind, type_url: &'static str) -> Self {
        Self { kind, type_url }
    }

    pub fn command<P: Payload>() -> Self {
        Self::new(MessageKind::Command, P::TYPE_URL)
    }

    pub fn event<P: Payload>() -> Self {
        Self::new(MessageKind::Event, P::TYPE_URL)
    }

    pub fn rejection<P: Payload>() -> Self {
        Self::new(MessageKind::Rejection, P::TYPE_URL)
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.type_url)
    }
}

/// A schema-agnostic signal in transit (§6 wire format): `{ id,
/// payload_type_url, payload_bytes, context }`, plus the event-only
/// producer/version fields from §3.
///
/// This is the single concrete type the bus, registry, routing tables, and
/// inbox all operate over. Concrete Rust payload types never flow through
/// those components directly — they are encoded into `Envelope` at the
/// edges (`Envelope::command`/`event`/`rejection`) and decoded back out only
/// where a handler needs the typed value (`Envelope::decode`). This mirrors
/// the out-of-process reality every bus implementation in this space
/// eventually has (Kafka, NATS, Postgres outbox, ...), and keeps the core
/// free of a type parameter per payload variant.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: SignalId,
    pub class: MessageClass,
    pub payload_bytes: Vec<u8>,
    pub is_default_payload: bool,
    pub context: Context,
    /// Set only for events (§3: "for events: producer_id, version").
    pub producer_id: Option<ProducerId>,
    pub version: Option<Version>,
}

impl Envelope {
    pub fn command<P: Payload>(payload: &P, context: Context) -> Self {
        Self::new(MessageClass::command::<P>(), payload, context, None, None)
    }

    pub fn event<P: Payload>(
        payload: &P,
        context: Context,
        producer_id: ProducerId,
        version: Version,
    ) -> Self {
        Self::new(
            MessageClass::event::<P>(),
            payload,
            context,
            Some(producer_id),
            Some(version),
        )
    }

    pub fn rejection<P: Payload>(payload: &P, context: Context) -> Self {
        Self::new(MessageClass::rejection::<P>(), payload, context, None, None)
    }

    fn new<P: Payload>(
        class: MessageClass,
        payload: &P,
        context: Context,
        producer_id: Option<ProducerId>,
        version: Option<Version>,
    ) -> Self {
        let payload_bytes =
            serde_json::to_vec(payload).expect("payload types must be JSON-serializable");
        Self {
            id: SignalId::new(),
            class,
            payload_bytes,
            is_default_payload: payload.is_default(),
            context,
            producer_id,
            version,
        }
    }

    /// Decode `payload_bytes` back into a concrete payload type.
    ///
    /// Callers are expected to already know (from `self.class`) which type
    /// to decode into — the dispatcher/handler resolved from the registry
    /// for this class is exactly the one that knows this.
    pub fn decode<P: Payload>(&self) -> Result<P, Error> {
        serde_json::from_slice(&self.payload_bytes).map_err(|e| Error::SchemaViolation {
            class: self.class.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.context.tenant_id.as_deref()
    }

    pub fn origin_id(&self) -> Option<SignalId> {
        self.context.parent_signal_id
    }

    pub fn external(&self) -> bool {
        self.context.external
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct AddNumber(i64);
    impl Payload for AddNumber {
        const TYPE_URL: &'static str = "test.AddNumber";
    }

    #[test]
    fn default_command_payload_is_flagged() {
        let envelope = Envelope::command(&AddNumber::default(), Context::root("tester"));
        assert!(envelope.is_default_payload);
    }

    #[test]
    fn roundtrips_through_bytes() {
        let envelope = Envelope::command(&AddNumber(42), Context::root("tester"));
        let decoded: AddNumber = envelope.decode().unwrap();
        assert_eq!(decoded, AddNumber(42));
    }

    #[test]
    fn message_class_reflects_kind_and_type() {
        let envelope = Envelope::event(
            &AddNumber(3),
            Context::root("tester"),
            ProducerId::new("calc-1"),
            Version::none(),
        );
        assert_eq!(envelope.class.kind, MessageKind::Event);
        assert_eq!(envelope.class.type_url, "test.AddNumber");
    }
}
