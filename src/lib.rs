//! # Signal dispatch and delivery substrate
//!
//! A CQRS/event-sourcing runtime built around one type-erased [`signal::Envelope`]
//! that flows through every layer: a [`bus::Bus`] dispatches it to registered
//! [`registry::Dispatcher`]s, a [`routing::RoutingTable`] maps it onto an
//! [`signal::EntityId`], and a [`repository::Repository`] loads the addressed
//! entity, runs it through an aggregate, process manager, or projection, and
//! commits the result as an atomic [`entity::Transaction`].
//!
//! Delivery to entities goes through a sharded inbox rather than straight
//! in-process dispatch: [`inbox::InboxDispatcher`] writes an envelope into a
//! shard's queue, and a [`inbox::DeliveryWorkerPool`] leases shards via a
//! [`inbox::ShardedWorkRegistry`] and dispatches pages of messages to
//! registered entity endpoints, deduplicating by signal id. A
//! [`catchup::CatchUpProcess`] drains historical events from an
//! [`external::EventStore`] into a projection before handing off to live
//! delivery, sharing the inbox's delivered-id ledger so replay and live
//! traffic never double-apply an event.
//!
//! ## Core features
//! - One wire format (`Envelope`) for commands, events, and rejections alike
//! - Full separation of write-side entities (aggregates, process managers)
//!   from read-side projections
//! - Async-safe, `Send + Sync` collaborator traits for multi-threaded use
//! - Storage- and transport-agnostic: plug in any `RecordStorage`,
//!   `InboxStorage`, `EventStore`, or `TransportFactory`
//!
//! ## Example
//! ```rust,ignore
//! use std::sync::Arc;
//! use my_app::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let schema = Arc::new(PermissiveSchemaRegistry);
//!     let command_bus = Bus::new(Cardinality::Unicast, schema.clone());
//!     let event_bus = Arc::new(Bus::new(Cardinality::Multicast, schema));
//!
//!     // Build entity repositories, register them on the buses, and drive
//!     // signals through `command_bus.publish(envelope)`.
//! }
//! ```
//!
//! ## When to use
//! Reach for this crate when you want a strongly typed, signal-oriented
//! runtime that:
//! - Enforces a clear command → event → projection flow
//! - Separates write-side entities (aggregates, process managers) from
//!   read-side projections
//! - Delivers signals to entities through a sharded, leased inbox instead of
//!   calling handlers inline

pub mod bus;
pub mod catchup;
pub mod config;
pub mod entity;
pub mod error;
pub mod external;
pub mod filter;
pub mod handler;
pub mod inbox;
pub mod integration;
pub mod prelude;
pub mod registry;
pub mod repository;
pub mod routing;
pub mod signal;
