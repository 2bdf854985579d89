//! Per-bus dispatcher registry (C2).
//!
//! A registry indexes `Arc<dyn Dispatcher<M>>` by `MessageClass`. Unicast
//! buses (commands) enforce at most one dispatcher per class; multicast
//! buses (events, rejections, integration) fan a message out to every
//! registered dispatcher for its class.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Ack, Error};
use crate::signal::MessageClass;

/// An object that consumes one or more message classes and directs them to
/// one or more targets.
///
/// `async_trait` is used here (rather than the teacher's native
/// `impl Future` associated-type style) because dispatchers are stored as
/// trait objects in the registry and must be dyn-dispatchable.
#[async_trait]
pub trait Dispatcher<M>: Send + Sync {
    /// The message classes this dispatcher handles. Must be non-empty
    /// (§4.1: "class set must be non-empty; otherwise `InvalidDispatcher`").
    fn message_classes(&self) -> &[MessageClass];

    async fn dispatch(&self, message: M) -> Ack;
}

/// Whether a bus requires exactly one dispatcher per class or fans out to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most (and, once registered, exactly) one dispatcher per class.
    Unicast,
    /// Any number of dispatchers per class; all of them receive the message.
    Multicast,
}

/// The per-class-to-dispatcher index described in §4.1.
pub struct DispatcherRegistry<M> {
    cardinality: Cardinality,
    dispatchers: HashMap<MessageClass, Vec<Arc<dyn Dispatcher<M>>>>,
}

impl<M> DispatcherRegistry<M> {
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            dispatchers: HashMap::new(),
        }
    }

    /// Register a dispatcher.
    ///
    /// Fails with `InvalidDispatcher` if it exposes no classes, or with
    /// `DuplicateHandler` if this is a `Unicast` registry and any exposed
    /// class already has a dispatcher.
    pub fn register(&mut self, dispatcher: Arc<dyn Dispatcher<M>>) -> Result<(), Error> {
        let classes = dispatcher.message_classes();
        if classes.is_empty() {
            return Err(Error::InvalidDispatcher);
        }
        if self.cardinality == Cardinality::Unicast {
            for class in classes {
                if self.dispatchers.contains_key(class) {
                    return Err(Error::DuplicateHandler {
                        class: class.to_string(),
                    });
                }
            }
        }
        for class in classes {
            self.dispatchers
                .entry(class.clone())
                .or_default()
                .push(dispatcher.clone());
        }
        Ok(())
    }

    /// Remove every association for `dispatcher`, comparing by pointer
    /// identity (`Arc::ptr_eq`) since dispatchers are not required to be
    /// otherwise comparable.
    pub fn unregister(&mut self, dispatcher: &Arc<dyn Dispatcher<M>>) {
        self.dispatchers.retain(|_, handlers| {
            handlers.retain(|d| !Arc::ptr_eq(d, dispatcher));
            !handlers.is_empty()
        });
    }

    /// Look up the dispatchers registered for `class`, if any.
    pub fn lookup(&self, class: &MessageClass) -> &[Arc<dyn Dispatcher<M>>] {
        self.dispatchers
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::MessageKind;

    struct Echo(Vec<MessageClass>);

    #[async_trait]
    impl Dispatcher<u32> for Echo {
        fn message_classes(&self) -> &[MessageClass] {
            &self.0
        }

        async fn dispatch(&self, _message: u32) -> Ack {
            Ack::ok(crate::signal::SignalId::new())
        }
    }

    fn class(type_url: &'static str) -> MessageClass {
        MessageClass::new(MessageKind::Command, type_url)
    }

    #[test]
    fn unicast_rejects_second_dispatcher_for_same_class() {
        let mut registry: DispatcherRegistry<u32> = DispatcherRegistry::new(Cardinality::Unicast);
        registry
            .register(Arc::new(Echo(vec![class("test.Cmd")])))
            .unwrap();
        let err = registry
            .register(Arc::new(Echo(vec![class("test.Cmd")])))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler { .. }));
    }

    #[test]
    fn multicast_accepts_many_dispatchers_for_same_class() {
        let mut registry: DispatcherRegistry<u32> =
            DispatcherRegistry::new(Cardinality::Multicast);
        registry
            .register(Arc::new(Echo(vec![class("test.Evt")])))
            .unwrap();
        registry
            .register(Arc::new(Echo(vec![class("test.Evt")])))
            .unwrap();
        assert_eq!(registry.lookup(&class("test.Evt")).len(), 2);
    }

    #[test]
    fn empty_class_set_is_rejected() {
        let mut registry: DispatcherRegistry<u32> = DispatcherRegistry::new(Cardinality::Multicast);
        let err = registry.register(Arc::new(Echo(vec![]))).unwrap_err();
        assert!(matches!(err, Error::InvalidDispatcher));
    }

    #[test]
    fn unregister_removes_all_associations() {
        let mut registry: DispatcherRegistry<u32> = DispatcherRegistry::new(Cardinality::Multicast);
        let dispatcher: Arc<dyn Dispatcher<u32>> = Arc::new(Echo(vec![class("test.Evt")]));
        registry.register(dispatcher.clone()).unwrap();
        registry.unregister(&dispatcher);
        assert!(registry.lookup(&class("test.Evt")).is_empty());
    }
}
