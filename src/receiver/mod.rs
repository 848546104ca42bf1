//! # Persistent Receiver
//!
//! Guaranteed-delivery consumption from a broker endpoint.
//!
//! Three kinds of thread meet here: the transport's callback thread, which
//! only ever enqueues and must never block; at most one dispatch consumer per
//! receiver; and at most one state-change notifier per receiver. Application
//! threads call the public API on [`PersistentReceiver`].
//!
//! ```text
//! transport thread ──push──▶ InboundQueue ──▶ dispatch consumer ──▶ handler ──▶ ack
//!                               │   ▲                 or
//!                  pause/resume │   └──── receive_message (application thread)
//!                               ▼
//!                         FlowController
//! ```

mod ack;
mod builder;
mod dispatch;
mod executor;
mod flow_control;
mod inbound_queue;
mod lifecycle;
mod notifier;
mod persistent_receiver;
mod receiver_core;
mod stats;
mod subscriptions;
mod termination;

pub use builder::PersistentReceiverBuilder;
pub use dispatch::MessageHandler;
pub use executor::ReceiverFuture;
pub use notifier::StateChangeListener;
pub use persistent_receiver::{PersistentReceiver, ReceiverInfo};
pub use stats::ReceiverStats;
