//! Mock Transport Implementation for Testing
//!
//! Records every native call, lets tests inject failures by operation name,
//! and plays the part of the transport I/O thread through [`MockTransport::deliver`]
//! and [`MockTransport::emit`].
//!
//! Like a native client, the mock serializes flow start/stop calls and
//! callback delivery on one reentrant context lock, so a receiver that calls
//! into the transport while holding its own lock deadlocks here too.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::messaging::{
    EndpointProperties, FlowEvent, FlowHandle, FlowListener, FlowProperties, InboundMessage,
    MessageId, NativeTransport, SubCode, TransportError, TransportResult,
};

/// Native calls observed by the mock; only successful calls are recorded
#[derive(Debug, Default, Clone)]
pub struct MockTransportCalls {
    pub created_flows: Vec<FlowProperties>,
    pub destroyed_flows: Vec<FlowHandle>,
    pub pauses: usize,
    pub resumes: usize,
    pub flow_subscribes: Vec<String>,
    pub flow_unsubscribes: Vec<String>,
    pub endpoint_subscribes: Vec<String>,
    pub endpoint_unsubscribes: Vec<String>,
    pub provisioned: Vec<EndpointProperties>,
    pub acks: Vec<MessageId>,
    pub destination_queries: usize,
}

struct MockTransportState {
    calls: MockTransportCalls,
    listener: Option<(FlowHandle, Arc<dyn FlowListener>)>,
    next_flow: u64,
    failures: HashMap<String, VecDeque<SubCode>>,
    connected: bool,
    ingress_paused: bool,
    bound_name: String,
    backlog: VecDeque<InboundMessage>,
}

/// Scriptable in-process stand-in for the native session layer
pub struct MockTransport {
    context: ReentrantMutex<()>,
    state: Mutex<MockTransportState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a connected transport with no flows
    pub fn new() -> Self {
        Self {
            context: ReentrantMutex::new(()),
            state: Mutex::new(MockTransportState {
                calls: MockTransportCalls::default(),
                listener: None,
                next_flow: 1,
                failures: HashMap::new(),
                connected: true,
                ingress_paused: false,
                bound_name: "#P2P/QTMP/mock-temporary".to_string(),
                backlog: VecDeque::new(),
            }),
        }
    }

    /// Name reported for broker-named temporary endpoints
    pub fn with_bound_name(self, name: impl Into<String>) -> Self {
        self.state.lock().bound_name = name.into();
        self
    }

    /// Fail the next call to `operation` (the trait method name) with `sub_code`
    pub fn fail_next(&self, operation: &str, sub_code: SubCode) {
        self.state
            .lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(sub_code);
    }

    /// Messages already spooled on the endpoint, delivered while the next flow is created
    pub fn preload(&self, messages: impl IntoIterator<Item = InboundMessage>) {
        self.state.lock().backlog.extend(messages);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Snapshot of recorded calls for assertions
    pub fn calls(&self) -> MockTransportCalls {
        self.state.lock().calls.clone()
    }

    pub fn active_flow(&self) -> Option<FlowHandle> {
        self.state.lock().listener.as_ref().map(|(flow, _)| *flow)
    }

    pub fn is_ingress_paused(&self) -> bool {
        self.state.lock().ingress_paused
    }

    /// Push a message up the active flow the way the transport I/O thread would.
    /// Returns `false` when no flow is bound.
    pub fn deliver(&self, message: InboundMessage) -> bool {
        self.deliver_batch([message]) == 1
    }

    /// Deliver several messages in one callback burst, holding the context lock throughout.
    /// Returns how many reached a listener.
    pub fn deliver_batch(&self, messages: impl IntoIterator<Item = InboundMessage>) -> usize {
        let _context = self.context.lock();
        // The listener may call back into the transport, so never hold the state lock across it
        let listener = self.state.lock().listener.as_ref().map(|(_, l)| Arc::clone(l));
        let Some(listener) = listener else {
            return 0;
        };
        let mut delivered = 0;
        for message in messages {
            listener.on_message(message);
            delivered += 1;
        }
        delivered
    }

    /// Raise a flow event on the active flow; `Down` also marks the transport disconnected
    pub fn emit(&self, event: FlowEvent) -> bool {
        let _context = self.context.lock();
        let listener = {
            let mut state = self.state.lock();
            if event == FlowEvent::Down {
                state.connected = false;
            }
            state.listener.as_ref().map(|(_, l)| Arc::clone(l))
        };
        match listener {
            Some(listener) => {
                listener.on_event(event);
                true
            }
            None => false,
        }
    }

    fn check(state: &mut MockTransportState, operation: &str) -> TransportResult<()> {
        if let Some(sub_code) = state
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
        {
            return Err(TransportError::new(
                sub_code,
                format!("injected {operation} failure"),
            ));
        }
        if !state.connected {
            return Err(TransportError::new(
                SubCode::NotConnected,
                "session is not connected",
            ));
        }
        Ok(())
    }

    /// Destroyed flows reject further calls
    fn check_flow(state: &MockTransportState, flow: FlowHandle) -> TransportResult<()> {
        if state.calls.destroyed_flows.contains(&flow) {
            return Err(TransportError::new(
                SubCode::InvalidFlow,
                format!("{flow} has been destroyed"),
            ));
        }
        Ok(())
    }
}

impl NativeTransport for MockTransport {
    fn create_flow(
        &self,
        properties: &FlowProperties,
        listener: Arc<dyn FlowListener>,
    ) -> TransportResult<FlowHandle> {
        let _context = self.context.lock();
        let mut state = self.state.lock();
        Self::check(&mut state, "create_flow")?;
        let flow = FlowHandle::new(state.next_flow);
        state.next_flow += 1;
        state.listener = Some((flow, Arc::clone(&listener)));
        state.ingress_paused = false;
        state.calls.created_flows.push(properties.clone());
        let backlog: Vec<InboundMessage> = state.backlog.drain(..).collect();
        drop(state);

        // Spooled messages start flowing before the bind call returns
        for message in backlog {
            listener.on_message(message);
        }
        Ok(flow)
    }

    fn destroy_flow(&self, flow: FlowHandle) {
        let _context = self.context.lock();
        let mut state = self.state.lock();
        if matches!(&state.listener, Some((active, _)) if *active == flow) {
            state.listener = None;
        }
        state.calls.destroyed_flows.push(flow);
    }

    fn pause_ingress(&self, flow: FlowHandle) -> TransportResult<()> {
        let _context = self.context.lock();
        let mut state = self.state.lock();
        Self::check(&mut state, "pause_ingress")?;
        Self::check_flow(&state, flow)?;
        state.ingress_paused = true;
        state.calls.pauses += 1;
        Ok(())
    }

    fn resume_ingress(&self, flow: FlowHandle) -> TransportResult<()> {
        let _context = self.context.lock();
        let mut state = self.state.lock();
        Self::check(&mut state, "resume_ingress")?;
        Self::check_flow(&state, flow)?;
        state.ingress_paused = false;
        state.calls.resumes += 1;
        Ok(())
    }

    fn subscribe_topic(&self, flow: FlowHandle, topic: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "subscribe_topic")?;
        Self::check_flow(&state, flow)?;
        state.calls.flow_subscribes.push(topic.to_string());
        Ok(())
    }

    fn unsubscribe_topic(&self, flow: FlowHandle, topic: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "unsubscribe_topic")?;
        Self::check_flow(&state, flow)?;
        state.calls.flow_unsubscribes.push(topic.to_string());
        Ok(())
    }

    fn subscribe_endpoint_topic(
        &self,
        _endpoint: &EndpointProperties,
        topic: &str,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "subscribe_endpoint_topic")?;
        state.calls.endpoint_subscribes.push(topic.to_string());
        Ok(())
    }

    fn unsubscribe_endpoint_topic(
        &self,
        _endpoint: &EndpointProperties,
        topic: &str,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "unsubscribe_endpoint_topic")?;
        state.calls.endpoint_unsubscribes.push(topic.to_string());
        Ok(())
    }

    fn provision_endpoint(&self, endpoint: &EndpointProperties) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "provision_endpoint")?;
        state.calls.provisioned.push(endpoint.clone());
        Ok(())
    }

    fn acknowledge(&self, flow: FlowHandle, message_id: MessageId) -> TransportResult<()> {
        let mut state = self.state.lock();
        Self::check(&mut state, "acknowledge")?;
        Self::check_flow(&state, flow)?;
        state.calls.acks.push(message_id);
        Ok(())
    }

    fn query_bound_destination_name(&self, flow: FlowHandle) -> TransportResult<String> {
        let mut state = self.state.lock();
        Self::check(&mut state, "query_bound_destination_name")?;
        Self::check_flow(&state, flow)?;
        state.calls.destination_queries += 1;
        Ok(state.bound_name.clone())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}
