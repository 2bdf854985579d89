use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed message carried by a signal.
///
/// Every command, event, and rejection payload implements this trait. The
/// `Default` bound exists solely so the bus can reject a default-valued
/// payload before it is ever enqueued or stored (§3: "a default message of
/// any payload type is rejected"). `Serialize`/`DeserializeOwned` let the
/// bus carry payloads as the schema-agnostic `payload_bytes` the wire format
/// in §6 describes, decoding back to a concrete type only at the handler
/// boundary.
pub trait Payload: Debug + Clone + PartialEq + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// A stable identifier for this payload's schema, analogous to a
    /// protobuf `type_url`. Used as the key into dispatcher registries and
    /// routing tables.
    const TYPE_URL: &'static str;

    /// `true` if this value is indistinguishable from `Self::default()`.
    fn is_default(&self) -> bool {
        *self == Self::default()
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
    fn default_payload_is_detected() {
        assert!(AddNumber::default().is_default());
        assert!(!AddNumber(3).is_default());
    }
}
