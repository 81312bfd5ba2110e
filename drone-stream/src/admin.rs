//! Admin fan-in subscription.
//!
//! Admin sessions consume one shared, fixed-name queue bound to every
//! device's telemetry. Each message on it reaches exactly one attached admin
//! session.

use crate::binding::{admin_binding, ADMIN_CHANNEL};
use crate::error::Result;
use crate::forward::{spawn_forwarder, Route};
use crate::session::Session;

impl Session {
    /// Attach this session to the shared admin queue.
    ///
    /// Does nothing if the session already holds the admin binding. The
    /// admin consumer joins the session's consumer list and is released by
    /// the same cleanup as device consumers.
    pub async fn subscribe_admin(&mut self) -> Result<()> {
        if self.admin_binding.is_some() {
            tracing::debug!(session = %self.id, "Admin queue already consumed");
            return Ok(());
        }

        let binding = admin_binding(&self.config.admin_queue_name);
        self.gateway.ensure_exchange().await?;
        let queue = self.gateway.declare_queue(&binding.queue_name).await?;
        self.gateway.bind(&queue, &binding.routing_key).await?;
        let consumer = self.gateway.consume(&queue).await?;

        self.consumers.push(consumer.handle.clone());
        self.forwarders.push(spawn_forwarder(
            self.id.clone(),
            consumer,
            Route::Admin,
            self.outbound.clone(),
        ));
        self.admin_binding = Some(binding);
        self.settle();

        tracing::info!(
            session = %self.id,
            queue = %queue,
            channel = ADMIN_CHANNEL,
            "Admin session attached"
        );
        Ok(())
    }
}
