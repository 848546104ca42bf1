//! # Messaging Module
//!
//! Message types and the native transport seam the receiver is built on.

pub mod message;
pub mod transport;

pub use message::*;
pub use transport::*;
