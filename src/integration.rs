//! Integration bus adapters (C10, §4.1, §6): bridges between an internal
//! `Bus` and the outside world, built on the `TransportFactory` trait a
//! host application supplies.
//!
//! An `OutboundBridge` is itself a `Dispatcher<Envelope>` and registers with
//! an internal bus the same way a `Repository` does — whichever signal
//! classes it subscribes to get forwarded to an external channel's
//! `Publisher`. An `InboundBridge` runs the opposite direction: it polls a
//! channel's `Subscriber` on a loop and republishes whatever arrives onto an
//! internal bus, same pipeline (schema, filters, routing) as any other
//! producer.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::bus::Bus;
use crate::error::{Ack, Error};
use crate::external::TransportFactory;
use crate::registry::Dispatcher;
use crate::signal::{Envelope, MessageClass};

/// Forwards every signal of its subscribed classes to one external channel.
pub struct OutboundBridge {
    classes: Vec<MessageClass>,
    channel_id: String,
    transport: Arc<dyn TransportFactory<Envelope>>,
}

impl OutboundBridge {
    pub fn new(classes: Vec<MessageClass>, channel_id: impl Into<String>, transport: Arc<dyn TransportFactory<Envelope>>) -> Self {
        Self { classes, channel_id: channel_id.into(), transport }
    }
}

#[async_trait]
impl Dispatcher<Envelope> for OutboundBridge {
    fn message_classes(&self) -> &[MessageClass] {
        &self.classes
    }

    async fn dispatch(&self, message: Envelope) -> Ack {
        let signal_id = message.id;
        let publisher = self.transport.create_publisher(&self.channel_id);
        match publisher.publish(message).await {
            Ok(()) => Ack::ok(signal_id),
            Err(e) => {
                tracing::warn!(signal = %signal_id, channel = %self.channel_id, error = %e, "failed to publish to external channel");
                Ack::error(signal_id, &e)
            }
        }
    }
}

/// Polls one external channel and republishes whatever it yields onto an
/// internal bus. Runs on its own task, backing off between empty polls.
pub struct InboundBridge {
    channel_id: String,
    transport: Arc<dyn TransportFactory<Envelope>>,
    target_bus: Arc<Bus>,
    poll_interval: StdDuration,
}

impl InboundBridge {
    pub fn new(channel_id: impl Into<String>, transport: Arc<dyn TransportFactory<Envelope>>, target_bus: Arc<Bus>) -> Self {
        Self {
            channel_id: channel_id.into(),
            transport,
            target_bus,
            poll_interval: StdDuration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, interval: StdDuration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Pull and republish exactly one message, if the channel has one ready.
    /// Exposed separately from `spawn` so tests can drive a single poll
    /// deterministically.
    pub async fn poll_once(&self) -> Result<bool, Error> {
        let subscriber = self.transport.create_subscriber(&self.channel_id);
        match subscriber.poll().await? {
            Some(envelope) => {
                let ack = self.target_bus.publish(envelope).await;
                if !ack.is_ok() {
                    tracing::warn!(channel = %self.channel_id, "internal bus rejected a message bridged from an external channel");
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.poll_once().await {
                    Ok(true) => {}
                    Ok(false) => tokio::time::sleep(self.poll_interval).await,
                    Err(e) => {
                        tracing::error!(channel = %self.channel_id, error = %e, "failed to poll external channel");
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        })
    }
}
