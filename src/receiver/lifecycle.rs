use std::sync::Arc;
use tracing::{info, warn};

use super::receiver_core::ReceiverCore;
use crate::config::MissingResourcesStrategy;
use crate::error::{ReceiverError, ReceiverResult};
use crate::logging::log_receiver_operation;
use crate::messaging::{FlowGuard, FlowHandle, SubCode, TransportError};
use crate::state_machine::{LifecycleEvent, LifecycleState};

impl ReceiverCore {
    /// Bind the receiver to its endpoint
    ///
    /// Idempotent once started. A failed start rolls back to `NotStarted`
    /// so the caller may retry.
    pub fn start(&self) -> ReceiverResult<()> {
        if self.lifecycle.current() == LifecycleState::Started {
            return Ok(());
        }

        let guard = self.lifecycle.lock();
        match self.lifecycle.current() {
            LifecycleState::Started => return Ok(()),
            LifecycleState::NotStarted => {}
            state => return Err(ReceiverError::illegal_state("start", state)),
        }

        self.lifecycle.apply(&guard, LifecycleEvent::Start)?;
        let endpoint = self.config.endpoint.name.as_deref();
        log_receiver_operation("start", &self.id, endpoint, "starting", None);

        match self.bind() {
            Ok(()) => {
                self.lifecycle.apply(&guard, LifecycleEvent::Bound)?;
                self.queue.set_can_consume(true);
                let bound = self.endpoint_label();
                log_receiver_operation("start", &self.id, Some(&bound), "started", None);
                Ok(())
            }
            Err(e) => {
                self.rollback_start();
                self.lifecycle.apply(&guard, LifecycleEvent::StartFailed)?;
                let details = e.to_string();
                log_receiver_operation("start", &self.id, endpoint, "failed", Some(&details));
                Err(e)
            }
        }
    }

    fn bind(&self) -> ReceiverResult<()> {
        if !self.transport.is_connected() {
            return Err(ReceiverError::client(
                "start",
                self.endpoint_label(),
                TransportError::new(SubCode::NotConnected, "transport is not connected"),
            ));
        }

        self.provision_if_missing()?;
        self.subscriptions.prepare_endpoint()?;

        if self.notifier.has_listener() {
            self.notifier.start()?;
        }

        let properties = self.config.flow_properties();
        let flow = self
            .transport
            .create_flow(&properties, self.listener())
            .map_err(|e| ReceiverError::client("create flow", self.endpoint_label(), e))?;
        *self.flow.lock() = Some(FlowGuard::new(flow, Arc::clone(&self.transport)));
        self.queue.attach_flow(flow);

        self.subscriptions.bind_flow(flow)?;
        self.resolve_bound_name(flow);
        Ok(())
    }

    fn provision_if_missing(&self) -> ReceiverResult<()> {
        if self.config.missing_resource_strategy != MissingResourcesStrategy::CreateOnStart
            || !self.config.endpoint.durable
        {
            return Ok(());
        }
        let Some(endpoint) = self.config.endpoint_properties() else {
            return Ok(());
        };

        match self.transport.provision_endpoint(&endpoint) {
            Ok(()) => {
                info!(receiver_id = %self.id, endpoint = %endpoint.name, "🏗️ Endpoint provisioned");
                Ok(())
            }
            Err(e) if e.sub_code == SubCode::EndpointAlreadyExists => {
                info!(
                    receiver_id = %self.id,
                    endpoint = %endpoint.name,
                    "Endpoint already exists; continuing"
                );
                Ok(())
            }
            Err(e) => Err(ReceiverError::client(
                "provision endpoint",
                endpoint.name.as_str(),
                e,
            )),
        }
    }

    /// Record the destination the flow is bound to; temporary endpoints are named by the broker
    fn resolve_bound_name(&self, flow: FlowHandle) {
        let name = match &self.config.endpoint.name {
            Some(name) => Some(name.clone()),
            None => match self.transport.query_bound_destination_name(flow) {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!(
                        receiver_id = %self.id,
                        error = %e,
                        "Could not resolve broker-assigned endpoint name"
                    );
                    None
                }
            },
        };
        *self.bound_name.write() = name;
    }

    /// Undo a partial bind so `start` can be retried from scratch
    fn rollback_start(&self) {
        self.queue.set_can_consume(false);
        self.queue.detach_flow();
        let flow = self.flow.lock().take();
        drop(flow);

        // Anything that arrived before the failure was never delivered or acknowledged
        let discarded = self.queue.discard_all();
        if discarded > 0 {
            warn!(
                receiver_id = %self.id,
                discarded = discarded,
                "Discarded messages received during failed start"
            );
        }
        self.queue.reset();
        self.subscriptions.unbind();
        self.notifier.stop();
        *self.bound_name.write() = None;
    }
}
