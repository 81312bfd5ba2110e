//! Per-session subscription lifecycle.
//!
//! A [`Session`] is the state one client connection owns: the last device set
//! it asked for, the queue bindings and consumers it holds, and its optional
//! admin binding. The connection task owns the session and drives it one
//! request at a time; delivery forwarders only write to the outbound channel.

use std::sync::Arc;

use broker_gateway::{BrokerGateway, ConsumerHandle, GatewayError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::binding::{binding_plan, validate_device_id};
use crate::cleanup::CancelTrigger;
use crate::command;
use crate::config::StreamConfig;
use crate::error::{Result, SessionError};
use crate::event::{ClientEvent, SessionEvent};
use crate::forward::{spawn_forwarder, Route};
use crate::types::{AdminBinding, DeviceSet, LifecycleState, QueueBinding, SessionId};

/// One client's subscriptions.
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) gateway: Arc<BrokerGateway>,
    pub(crate) config: StreamConfig,
    pub(crate) outbound: mpsc::Sender<SessionEvent>,
    pub(crate) device_set: Option<DeviceSet>,
    pub(crate) bindings: Vec<QueueBinding>,
    pub(crate) consumers: Vec<ConsumerHandle>,
    pub(crate) admin_binding: Option<AdminBinding>,
    pub(crate) forwarders: Vec<JoinHandle<()>>,
    pub(crate) state: LifecycleState,
}

impl Session {
    /// Create an idle session.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique session identifier, used in queue names
    /// * `gateway` - The process-wide broker gateway
    /// * `config` - Stream configuration
    /// * `outbound` - Channel events for the client are pushed on
    pub fn new(
        id: SessionId,
        gateway: Arc<BrokerGateway>,
        config: StreamConfig,
        outbound: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            id,
            gateway,
            config,
            outbound,
            device_set: None,
            bindings: Vec::new(),
            consumers: Vec::new(),
            admin_binding: None,
            forwarders: Vec::new(),
            state: LifecycleState::Idle,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The device set of the most recent subscribe request.
    pub fn device_set(&self) -> Option<&DeviceSet> {
        self.device_set.as_ref()
    }

    /// Device queue bindings in creation order.
    pub fn bindings(&self) -> &[QueueBinding] {
        &self.bindings
    }

    /// Every consumer handle held, device and admin, in creation order.
    pub fn consumers(&self) -> &[ConsumerHandle] {
        &self.consumers
    }

    pub fn admin_binding(&self) -> Option<&AdminBinding> {
        self.admin_binding.as_ref()
    }

    /// Dispatch one client request.
    pub async fn handle(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Subscribe(devices) => self.subscribe(devices).await.map(|_| ()),
            ClientEvent::AdminSubscribe => self.subscribe_admin().await,
            ClientEvent::SendCommand(cmd) => command::send_command(&self.gateway, &cmd).await,
            ClientEvent::SendSignaling(data) => {
                command::send_signaling(&self.gateway, self.device_set.as_ref(), &data).await
            }
            ClientEvent::CancelSubscription => {
                self.cancel_all(CancelTrigger::Request).await;
                Ok(())
            }
        }
    }

    /// Subscribe to the telemetry and signaling streams of every device.
    ///
    /// Returns the number of bindings created by this call.
    ///
    /// # Process
    ///
    /// 1. Validate the device set and remember it for signaling. A rejected
    ///    set leaves the previous one in place
    /// 2. Assert the shared exchange
    /// 3. For each planned binding, skipping queues this session already
    ///    holds: declare the queue, emit `queue-created`, bind, consume and
    ///    start forwarding
    ///
    /// A failure stops the batch. Bindings created before it stay on the
    /// session until it is cancelled or disconnects.
    pub async fn subscribe(&mut self, devices: DeviceSet) -> Result<usize> {
        if devices.is_empty() {
            return Err(SessionError::MalformedRequest(
                "device set must not be empty".to_string(),
            ));
        }
        for device in devices.devices() {
            validate_device_id(device)?;
        }
        if let Some(device) = devices.repeated_device() {
            return Err(SessionError::MalformedRequest(format!(
                "device {device} appears more than once"
            )));
        }

        let plan = binding_plan(&self.id, &devices);
        let planned = plan.len();
        self.device_set = Some(devices);
        self.state = LifecycleState::Subscribing;
        tracing::debug!(session = %self.id, bindings = planned, "Subscribing");

        if let Err(e) = self.gateway.ensure_exchange().await {
            self.settle();
            return Err(e.into());
        }

        let mut completed = 0;
        for binding in plan {
            if self.holds_queue(&binding.queue_name) {
                tracing::debug!(
                    session = %self.id,
                    queue = %binding.queue_name,
                    "Queue already held, skipping"
                );
                continue;
            }

            if let Err(source) = self.open_binding(binding).await {
                self.settle();
                tracing::warn!(
                    session = %self.id,
                    completed,
                    planned,
                    error = %source,
                    "Subscribe batch aborted"
                );
                return Err(batch_error(completed, planned, source));
            }
            completed += 1;
        }

        self.settle();
        tracing::debug!(session = %self.id, created = completed, "Subscribe complete");
        Ok(completed)
    }

    async fn open_binding(&mut self, binding: QueueBinding) -> broker_gateway::Result<()> {
        let queue = self.gateway.declare_queue(&binding.queue_name).await?;
        self.emit(SessionEvent::QueueCreated(queue.clone())).await;
        self.gateway.bind(&queue, &binding.routing_key).await?;
        let consumer = self.gateway.consume(&queue).await?;

        self.consumers.push(consumer.handle.clone());
        self.forwarders.push(spawn_forwarder(
            self.id.clone(),
            consumer,
            Route::Device(binding.kind),
            self.outbound.clone(),
        ));
        self.bindings.push(binding);
        Ok(())
    }

    fn holds_queue(&self, queue_name: &str) -> bool {
        self.bindings.iter().any(|b| b.queue_name == queue_name)
    }

    /// Push an event to the client. A closed channel means the connection
    /// is going away and cleanup will follow.
    pub(crate) async fn emit(&self, event: SessionEvent) {
        if self.outbound.send(event).await.is_err() {
            tracing::debug!(session = %self.id, "Outbound channel closed, event dropped");
        }
    }

    /// Return to the resting state that matches what the session holds.
    pub(crate) fn settle(&mut self) {
        self.state = if self.consumers.is_empty() {
            LifecycleState::Idle
        } else {
            LifecycleState::Active
        };
    }
}

fn batch_error(completed: usize, planned: usize, source: GatewayError) -> SessionError {
    if completed == 0 {
        SessionError::Broker(source)
    } else {
        SessionError::PartialBatch {
            completed,
            planned,
            source,
        }
    }
}
