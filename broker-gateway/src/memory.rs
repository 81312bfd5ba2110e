//! In-process topic broker.
//!
//! `MemoryBroker` keeps exchanges, queues, bindings and consumers in a single
//! lock and routes published messages to consumers over channels. Semantics
//! follow a RabbitMQ topic exchange closely enough for the bridge:
//!
//! - a message is copied once into every queue with a matching binding
//! - a queue with several consumers hands each message to exactly one of
//!   them, round robin
//! - a queue with no consumer buffers messages until one attaches
//! - an auto-delete queue is removed, with its bindings, when its last
//!   consumer is cancelled

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::broker::{Broker, Consumer, ConsumerHandle, Delivery, ExchangeOptions, QueueOptions};
use crate::error::{GatewayError, Result};
use crate::topic;

/// Broker operations, used to inject failures in tests.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Operation {
    DeclareExchange,
    DeclareQueue,
    Bind,
    Consume,
    Cancel,
    Publish,
}

struct QueueState {
    options: QueueOptions,
    consumers: Vec<(ConsumerHandle, mpsc::UnboundedSender<Delivery>)>,
    next_consumer: usize,
    backlog: VecDeque<Delivery>,
}

impl QueueState {
    fn new(options: QueueOptions) -> Self {
        Self {
            options,
            consumers: Vec::new(),
            next_consumer: 0,
            backlog: VecDeque::new(),
        }
    }

    /// Hand a message to the next live consumer, or buffer it.
    ///
    /// Returns the consumers found with a closed receiver; they are already
    /// detached from this queue.
    fn dispatch(&mut self, delivery: Delivery) -> Vec<ConsumerHandle> {
        let mut delivery = delivery;
        let mut dead = Vec::new();
        while !self.consumers.is_empty() {
            let index = self.next_consumer % self.consumers.len();
            match self.consumers[index].1.send(delivery) {
                Ok(()) => {
                    self.next_consumer = index + 1;
                    return dead;
                }
                Err(mpsc::error::SendError(returned)) => {
                    // Receiver dropped without cancel; the slot is dead
                    let (handle, _) = self.consumers.remove(index);
                    tracing::debug!("Dropping consumer {} with closed receiver", handle);
                    dead.push(handle);
                    delivery = returned;
                }
            }
        }
        self.backlog.push_back(delivery);
        dead
    }

    fn is_unused(&self) -> bool {
        self.consumers.is_empty() && self.options.auto_delete
    }
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, ExchangeOptions>,
    /// exchange name -> (queue name, binding key)
    bindings: HashMap<String, Vec<(String, String)>>,
    queues: HashMap<String, QueueState>,
    /// consumer tag -> queue name
    consumers: HashMap<ConsumerHandle, String>,
    next_tag: u64,
    /// operation -> calls to let through before failing once
    failures: HashMap<Operation, VecDeque<usize>>,
    exchange_declarations: usize,
}

impl State {
    fn check_failure(&mut self, op: Operation) -> Result<()> {
        let Some(plan) = self.failures.get_mut(&op) else {
            return Ok(());
        };
        match plan.front().copied() {
            Some(0) => {
                plan.pop_front();
                Err(GatewayError::Unavailable(format!("injected {op:?} failure")))
            }
            Some(remaining) => {
                plan[0] = remaining - 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Forget consumers that vanished without a cancel, deleting the queue
    /// if that left it unused.
    fn reap(&mut self, queue: &str, dead: Vec<ConsumerHandle>) {
        if dead.is_empty() {
            return;
        }
        for handle in &dead {
            self.consumers.remove(handle);
        }
        if self.queues.get(queue).is_some_and(QueueState::is_unused) {
            tracing::debug!("Auto-deleting queue {} after its consumers went away", queue);
            self.remove_queue(queue);
        }
    }

    fn remove_queue(&mut self, queue: &str) {
        self.queues.remove(queue);
        for bindings in self.bindings.values_mut() {
            bindings.retain(|(bound, _)| bound != queue);
        }
    }
}

/// In-process topic broker.
///
/// Cloning is cheap and every clone shares the same state, so a test can keep
/// one handle for inspection while the gateway owns another.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with [`GatewayError::Unavailable`].
    pub async fn fail_next(&self, op: Operation) {
        self.fail_after(op, 0).await;
    }

    /// Let `successes` calls of `op` through, then fail the following one.
    pub async fn fail_after(&self, op: Operation, successes: usize) {
        let mut state = self.state.lock().await;
        state.failures.entry(op).or_default().push_back(successes);
    }

    /// Names of all currently declared queues, sorted.
    pub async fn queue_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a queue is currently declared.
    pub async fn has_queue(&self, queue: &str) -> bool {
        self.state.lock().await.queues.contains_key(queue)
    }

    /// Number of consumers attached to a queue (0 if the queue does not exist).
    pub async fn consumer_count(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.consumers.len())
    }

    /// Total number of active consumers across all queues.
    pub async fn total_consumers(&self) -> usize {
        self.state.lock().await.consumers.len()
    }

    /// Binding keys attached to a queue on the given exchange.
    pub async fn bindings_for(&self, exchange: &str, queue: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .bindings
            .get(exchange)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|(bound, _)| bound == queue)
                    .map(|(_, key)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// How many times `declare_exchange` reached the broker.
    pub async fn exchange_declarations(&self) -> usize {
        self.state.lock().await.exchange_declarations
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_exchange(&self, name: &str, options: ExchangeOptions) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::DeclareExchange)?;
        state.exchange_declarations += 1;
        state.exchanges.entry(name.to_string()).or_insert(options);
        state.bindings.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::DeclareQueue)?;
        state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| QueueState::new(options));
        Ok(name.to_string())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::Bind)?;
        if !state.queues.contains_key(queue) {
            return Err(GatewayError::QueueNotFound(queue.to_string()));
        }
        let bindings = state
            .bindings
            .get_mut(exchange)
            .ok_or_else(|| GatewayError::ExchangeNotFound(exchange.to_string()))?;
        let binding = (queue.to_string(), routing_key.to_string());
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Consumer> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::Consume)?;
        state.next_tag += 1;
        let handle = ConsumerHandle::new(format!("ctag-{}", state.next_tag));

        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| GatewayError::QueueNotFound(queue.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        queue_state.consumers.push((handle.clone(), tx));
        let backlog: Vec<Delivery> = queue_state.backlog.drain(..).collect();
        let mut dead = Vec::new();
        for delivery in backlog {
            dead.extend(queue_state.dispatch(delivery));
        }

        state.consumers.insert(handle.clone(), queue.to_string());
        state.reap(queue, dead);
        Ok(Consumer {
            handle,
            deliveries: rx,
        })
    }

    async fn cancel(&self, handle: &ConsumerHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::Cancel)?;
        let queue = state
            .consumers
            .remove(handle)
            .ok_or_else(|| GatewayError::ConsumerNotFound(handle.to_string()))?;

        let now_idle = match state.queues.get_mut(&queue) {
            Some(queue_state) => {
                queue_state.consumers.retain(|(h, _)| h != handle);
                queue_state.is_unused()
            }
            None => false,
        };

        if now_idle {
            tracing::debug!("Auto-deleting queue {} after last consumer left", queue);
            state.remove_queue(&queue);
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_failure(Operation::Publish)?;
        let bindings = state
            .bindings
            .get(exchange)
            .ok_or_else(|| GatewayError::ExchangeNotFound(exchange.to_string()))?;

        // One copy per queue, however many of its bindings match
        let mut targets: Vec<String> = Vec::new();
        for (queue, binding_key) in bindings {
            if topic::matches(binding_key, routing_key) && !targets.contains(queue) {
                targets.push(queue.clone());
            }
        }

        for queue in targets {
            let dead = match state.queues.get_mut(&queue) {
                Some(queue_state) => queue_state.dispatch(Delivery {
                    routing_key: routing_key.to_string(),
                    payload: payload.clone(),
                }),
                None => continue,
            };
            state.reap(&queue, dead);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn broker_with_exchange() -> MemoryBroker {
        let broker = MemoryBroker::new();
        broker
            .declare_exchange("drone", ExchangeOptions::default())
            .await
            .unwrap();
        broker
    }

    #[tokio::test]
    async fn test_publish_routes_to_bound_queue() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        let mut consumer = broker.consume("q1").await.unwrap();

        broker
            .publish("drone", "d1.phone.drone", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        broker
            .publish("drone", "d2.phone.drone", Bytes::from_static(b"ignored"))
            .await
            .unwrap();

        let delivery = consumer.deliveries.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "d1.phone.drone");
        assert_eq!(&delivery.payload[..], b"hello");
        assert!(consumer.deliveries.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_competing_consumers_round_robin() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("shared", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("shared", "drone", "*.phone.drone").await.unwrap();
        let mut first = broker.consume("shared").await.unwrap();
        let mut second = broker.consume("shared").await.unwrap();

        for i in 0..4 {
            let payload = Bytes::from(format!("m{i}"));
            broker.publish("drone", "d1.phone.drone", payload).await.unwrap();
        }

        let mut seen_first = Vec::new();
        while let Ok(d) = first.deliveries.try_recv() {
            seen_first.push(d.payload);
        }
        let mut seen_second = Vec::new();
        while let Ok(d) = second.deliveries.try_recv() {
            seen_second.push(d.payload);
        }

        assert_eq!(seen_first.len(), 2);
        assert_eq!(seen_second.len(), 2);
        assert!(seen_first.iter().all(|p| !seen_second.contains(p)));
    }

    #[tokio::test]
    async fn test_backlog_flushed_to_first_consumer() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.#").await.unwrap();
        broker
            .publish("drone", "d1.phone.drone", Bytes::from_static(b"early"))
            .await
            .unwrap();

        let mut consumer = broker.consume("q1").await.unwrap();
        let delivery = consumer.deliveries.recv().await.unwrap();
        assert_eq!(&delivery.payload[..], b"early");
    }

    #[tokio::test]
    async fn test_auto_delete_on_last_cancel() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        let a = broker.consume("q1").await.unwrap();
        let b = broker.consume("q1").await.unwrap();

        broker.cancel(&a.handle).await.unwrap();
        assert!(broker.has_queue("q1").await);
        assert_eq!(broker.consumer_count("q1").await, 1);

        broker.cancel(&b.handle).await.unwrap();
        assert!(!broker.has_queue("q1").await);
        assert!(broker.bindings_for("drone", "q1").await.is_empty());
    }

    #[tokio::test]
    async fn test_durable_queue_survives_cancel() {
        let broker = broker_with_exchange().await;
        let options = QueueOptions {
            auto_delete: false,
            durable: true,
        };
        broker.declare_queue("keep", options).await.unwrap();
        let consumer = broker.consume("keep").await.unwrap();
        broker.cancel(&consumer.handle).await.unwrap();
        assert!(broker.has_queue("keep").await);
    }

    #[tokio::test]
    async fn test_cancel_closes_delivery_channel() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        let mut consumer = broker.consume("q1").await.unwrap();
        broker.cancel(&consumer.handle).await.unwrap();
        assert!(consumer.deliveries.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_resources() {
        let broker = MemoryBroker::new();
        let err = broker
            .publish("missing", "a.b.c", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ExchangeNotFound(_)));

        broker
            .declare_exchange("drone", ExchangeOptions::default())
            .await
            .unwrap();
        let err = broker.bind_queue("nope", "drone", "a.b.c").await.unwrap_err();
        assert!(matches!(err, GatewayError::QueueNotFound(_)));

        let err = broker.consume("nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::QueueNotFound(_)));

        let err = broker
            .cancel(&ConsumerHandle::new("ctag-404"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ConsumerNotFound(_)));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let broker = MemoryBroker::new();
        broker.fail_after(Operation::DeclareQueue, 1).await;

        assert!(broker.declare_queue("a", QueueOptions::ephemeral()).await.is_ok());
        let err = broker
            .declare_queue("b", QueueOptions::ephemeral())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(broker.declare_queue("c", QueueOptions::ephemeral()).await.is_ok());
        assert_eq!(broker.queue_names().await, vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_redeclare_is_idempotent() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        broker
            .declare_exchange("drone", ExchangeOptions::default())
            .await
            .unwrap();

        assert_eq!(broker.queue_names().await, vec!["q1".to_string()]);
        assert_eq!(broker.bindings_for("drone", "q1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_reaped_on_publish() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        let gone = broker.consume("q1").await.unwrap();
        let mut kept = broker.consume("q1").await.unwrap();
        drop(gone.deliveries);

        for _ in 0..2 {
            broker
                .publish("drone", "d1.phone.drone", Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        assert_eq!(broker.total_consumers().await, 1);
        assert_eq!(broker.consumer_count("q1").await, 1);
        assert_eq!(kept.deliveries.try_recv().unwrap().payload, Bytes::from_static(b"x"));
        assert_eq!(kept.deliveries.try_recv().unwrap().payload, Bytes::from_static(b"x"));
        assert!(matches!(
            broker.cancel(&gone.handle).await,
            Err(GatewayError::ConsumerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_dropped_receiver_deletes_queue() {
        let broker = broker_with_exchange().await;
        broker.declare_queue("q1", QueueOptions::ephemeral()).await.unwrap();
        broker.bind_queue("q1", "drone", "d1.phone.drone").await.unwrap();
        let consumer = broker.consume("q1").await.unwrap();
        drop(consumer.deliveries);

        broker
            .publish("drone", "d1.phone.drone", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert_eq!(broker.total_consumers().await, 0);
        assert!(!broker.has_queue("q1").await);
        assert!(broker.bindings_for("drone", "q1").await.is_empty());
    }
}
