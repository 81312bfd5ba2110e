//! Broker backend selection.

use std::sync::Arc;

use broker_gateway::{Broker, MemoryBroker};

use crate::config::BrokerBackend;
use crate::error::Result;

/// Create the broker the gateway will share between sessions.
pub async fn connect(backend: &BrokerBackend) -> Result<Arc<dyn Broker>> {
    match backend {
        BrokerBackend::Memory => {
            tracing::info!("Using in-process broker");
            Ok(Arc::new(MemoryBroker::new()))
        }
        #[cfg(feature = "amqp")]
        BrokerBackend::Amqp { url } => {
            let broker = broker_gateway::AmqpBroker::connect(url).await?;
            Ok(Arc::new(broker))
        }
        #[cfg(not(feature = "amqp"))]
        BrokerBackend::Amqp { .. } => Err(crate::error::ServerError::Config(
            "AMQP broker requested but drone-bridge was built without the `amqp` feature"
                .to_string(),
        )),
    }
}
