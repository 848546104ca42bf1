// Receiver lifecycle state machine
//
// The lifecycle gates every public receiver operation. States and the
// transition table live here; the receiver owns the atomic cell and the
// transition lock.

pub mod events;
pub mod states;

pub use events::{determine_target_state, LifecycleEvent, StateChangeEvent};
pub use states::{LifecycleState, ReceiverState};
