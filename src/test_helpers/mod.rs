// Test Helpers Module - In-Process Transport Doubles
//
// Provides a scriptable NativeTransport so receiver behavior can be exercised
// without a broker: unit tests inside the crate and the integration tests
// under tests/ both drive receivers through it.

pub mod mock_transport;

pub use mock_transport::{MockTransport, MockTransportCalls};
