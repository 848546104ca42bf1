#![allow(clippy::doc_markdown)] // Allow technical terms like FIFO, QoS in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Persistent Receiver
//!
//! Guaranteed-delivery message receiver for broker-backed messaging clients.
//!
//! ## Overview
//!
//! A persistent receiver binds to a durable or temporary broker-side queue,
//! buffers messages pushed by the native transport thread, applies
//! backpressure to the transport, dispatches messages in strict order
//! (synchronously on demand or asynchronously to a handler), tracks
//! acknowledgment, and shuts down without losing in-flight work.
//!
//! Delivery is at-least-once: a message that is never acknowledged is
//! redelivered by the broker.
//!
//! ## Architecture
//!
//! All receiver logic is written against the [`messaging::NativeTransport`]
//! trait. A production adapter wraps the native client library; tests use
//! [`test_helpers::MockTransport`].
//!
//! ## Module Organization
//!
//! - [`receiver`] - Receiver handle, builder, queueing, dispatch and shutdown
//! - [`messaging`] - Inbound message model and the native transport interface
//! - [`state_machine`] - Lifecycle states and transition table
//! - [`config`] - Receiver configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use persistent_receiver::config::EndpointConfig;
//! use persistent_receiver::messaging::InboundMessage;
//! use persistent_receiver::test_helpers::MockTransport;
//! use persistent_receiver::PersistentReceiverBuilder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let receiver = PersistentReceiverBuilder::new(Arc::new(MockTransport::new()))
//!     .with_endpoint(EndpointConfig::durable_exclusive("Q1"))
//!     .with_auto_ack(true)
//!     .build()?;
//!
//! receiver.start()?;
//! receiver.receive_async(|message: InboundMessage| -> anyhow::Result<()> {
//!     println!("processing {}", message.message_id());
//!     Ok(())
//! })?;
//!
//! receiver.terminate(Duration::from_secs(10));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod receiver;
pub mod state_machine;
pub mod test_helpers;

pub use config::{EndpointConfig, FlowControlConfig, MissingResourcesStrategy, ReceiverConfig};
pub use error::{ReceiverError, ReceiverResult};
pub use messaging::{
    FlowEvent, FlowHandle, FlowListener, InboundMessage, MessageId, NativeTransport, SubCode,
    TransportError, TransportResult,
};
pub use receiver::{
    MessageHandler, PersistentReceiver, PersistentReceiverBuilder, ReceiverFuture, ReceiverInfo,
    ReceiverStats, StateChangeListener,
};
pub use state_machine::{LifecycleState, ReceiverState, StateChangeEvent};
