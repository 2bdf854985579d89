//! Class-keyed routing tables (C4): `message_class → (signal, context) → set<entity_id>`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::signal::{Context, EntityId, Envelope, MessageClass, MessageKind};

/// A routing function for one message class.
pub type RouteFn = Arc<dyn Fn(&Envelope, &Context) -> Vec<EntityId> + Send + Sync>;

/// The default route used when no class-specific function is set (§4.2):
/// "producer id from context" for events, "first id-typed field of message"
/// otherwise. Since payloads are schema-agnostic bytes at this layer, the
/// core cannot discover an arbitrary id-typed field by itself — the default
/// for commands/rejections instead reads `context.actor_id`, and
/// applications that need field-derived routing register a class-specific
/// function via `set`.
fn default_route(envelope: &Envelope, ctx: &Context) -> Vec<EntityId> {
    match envelope.class.kind {
        MessageKind::Event => envelope
            .producer_id
            .as_ref()
            .map(|p| vec![EntityId::new(envelope.class.type_url, p.as_str().as_bytes().to_vec())])
            .unwrap_or_default(),
        MessageKind::Command | MessageKind::Rejection => ctx
            .actor_id
            .as_ref()
            .map(|a| vec![EntityId::new(envelope.class.type_url, a.as_bytes().to_vec())])
            .unwrap_or_default(),
    }
}

/// A class-keyed mapping from a signal to its target entity id(s), with a
/// default fallback route (§4.2). Reads are frequent (every dispatch);
/// writes happen only at repository construction, so a `RwLock` is
/// sufficient (§4.8).
pub struct RoutingTable {
    routes: RwLock<HashMap<MessageClass, RouteFn>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Set the routing function for `class`. Fails with `DuplicateRoute` if
    /// one is already set.
    pub fn set(&self, class: MessageClass, route: RouteFn) -> Result<(), Error> {
        let mut routes = self.routes.write().expect("routing table lock poisoned");
        if routes.contains_key(&class) {
            return Err(Error::DuplicateRoute {
                class: class.to_string(),
            });
        }
        routes.insert(class, route);
        Ok(())
    }

    /// Remove the routing function for `class`. Fails with `RouteNotFound`
    /// if none is set.
    pub fn remove(&self, class: &MessageClass) -> Result<(), Error> {
        let mut routes = self.routes.write().expect("routing table lock poisoned");
        if routes.remove(class).is_none() {
            return Err(Error::RouteNotFound {
                class: class.to_string(),
            });
        }
        Ok(())
    }

    /// Apply the class-specific function if set, else the default route.
    pub fn apply(&self, envelope: &Envelope) -> Vec<EntityId> {
        let routes = self.routes.read().expect("routing table lock poisoned");
        match routes.get(&envelope.class) {
            Some(route) => route(envelope, &envelope.context),
            None => default_route(envelope, &envelope.context),
        }
    }

    /// Apply routing for a command, enforcing the "exactly one id" rule of
    /// §4.2 / §8 P6. Any other arity is a routing failure.
    pub fn apply_command(&self, envelope: &Envelope) -> Result<EntityId, Error> {
        let targets = self.apply(envelope);
        match targets.len() {
            1 => Ok(targets.into_iter().next().unwrap()),
            found => Err(Error::RoutingFailed {
                class: envelope.class.to_string(),
                found,
            }),
        }
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Payload, ProducerId, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct PlaceOrder {
        customer: String,
    }
    impl Payload for PlaceOrder {
        const TYPE_URL: &'static str = "test.PlaceOrder";
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct NumberImported(i64);
    impl Payload for NumberImported {
        const TYPE_URL: &'static str = "test.NumberImported";
    }

    #[test]
    fn default_event_route_uses_producer_id() {
        let table = RoutingTable::new();
        let envelope = Envelope::event(
            &NumberImported(1),
            Context::root("actor"),
            ProducerId::new("calc-1"),
            Version::none(),
        );
        let targets = table.apply(&envelope);
        assert_eq!(targets, vec![EntityId::new("test.NumberImported", b"calc-1".to_vec())]);
    }

    #[test]
    fn command_routing_requires_exactly_one_target() {
        let table = RoutingTable::new();
        table
            .set(
                MessageClass::command::<PlaceOrder>(),
                Arc::new(|_env: &Envelope, _ctx: &Context| Vec::new()),
            )
            .unwrap();
        let envelope = Envelope::command(
            &PlaceOrder {
                customer: "c-1".into(),
            },
            Context::root("actor"),
        );
        let err = table.apply_command(&envelope).unwrap_err();
        assert!(matches!(err, Error::RoutingFailed { found: 0, .. }));
    }

    #[test]
    fn setting_a_route_twice_fails() {
        let table = RoutingTable::new();
        let class = MessageClass::command::<PlaceOrder>();
        table
            .set(class.clone(), Arc::new(|_: &Envelope, _: &Context| Vec::new()))
            .unwrap();
        let err = table
            .set(class, Arc::new(|_: &Envelope, _: &Context| Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));
    }

    #[test]
    fn removing_unset_route_fails() {
        let table = RoutingTable::new();
        let err = table.remove(&MessageClass::command::<PlaceOrder>()).unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
    }
}
