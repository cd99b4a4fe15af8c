//! In-process publish/subscribe broker for replication events.
//!
//! Every `(topic, handler)` pair gets its own bounded queue and its own
//! listener task. Messages travel as JSON so the wire contract is exercised
//! even without a network hop. Delivery is at-least-once: a handler error
//! that [`Error::is_retryable`] reports as transient is put back on the queue
//! after a delay, up to a configured number of redeliveries. Anything else
//! is logged and dropped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::Instrument;

use recycling_core::config::BrokerConfig;
use recycling_core::observability::replication_span;
use recycling_core::{Error, EventEnvelope, EventHandler, EventPublisher, HandlerRegistry, PublishError, Topic};

/// One queued message.
#[derive(Debug, Clone)]
struct Delivery {
    body: Arc<[u8]>,
    attempt: u32,
}

/// Broker keeping all queues in process memory.
pub struct LocalBroker {
    config: BrokerConfig,
    subscribers: RwLock<BTreeMap<Topic, Vec<mpsc::Sender<Delivery>>>>,
    closed: AtomicBool,
}

impl LocalBroker {
    /// Create a broker with no subscriptions.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Start one listener for `handler` on `topic`.
    pub async fn spawn_listener(&self, topic: Topic, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
        let requeue = sender.downgrade();
        self.subscribers.write().await.entry(topic).or_default().push(sender);

        tracing::debug!(%topic, handler = handler.name(), "listener subscribed");
        tokio::spawn(listen(topic, handler, receiver, requeue, self.config.clone()))
    }

    /// Start a listener for every subscription in the registry.
    pub async fn spawn_listeners(&self, registry: &HandlerRegistry) -> Vec<JoinHandle<()>> {
        let mut listeners = Vec::new();
        for (topic, handler) in registry.subscriptions() {
            listeners.push(self.spawn_listener(topic, Arc::clone(handler)).await);
        }
        listeners
    }

    /// Stop accepting messages. Listeners finish what is already queued and exit.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.write().await.clear();
        tracing::info!("broker closed");
    }
}

#[async_trait]
impl EventPublisher for LocalBroker {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PublishError::Closed);
        }

        let topic = envelope.topic();
        let body: Arc<[u8]> = serde_json::to_vec(&envelope)?.into();
        let senders = self
            .subscribers
            .read()
            .await
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        if senders.is_empty() {
            tracing::debug!(%topic, event_id = %envelope.event_id, "no subscribers, message dropped");
        }
        for sender in senders {
            sender
                .send(Delivery {
                    body: Arc::clone(&body),
                    attempt: 1,
                })
                .await
                .map_err(|err| {
                    tracing::debug!(%topic, error = %err, "subscription queue closed");
                    PublishError::Closed
                })?;
        }
        Ok(())
    }
}

async fn listen(
    topic: Topic,
    handler: Arc<dyn EventHandler>,
    mut receiver: mpsc::Receiver<Delivery>,
    requeue: mpsc::WeakSender<Delivery>,
    config: BrokerConfig,
) {
    while let Some(delivery) = receiver.recv().await {
        let envelope: EventEnvelope = match serde_json::from_slice(&delivery.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(%topic, handler = handler.name(), error = %err, "undecodable message dropped");
                continue;
            }
        };

        let span = replication_span(handler.name(), &envelope, delivery.attempt);
        async {
            match handler.handle(&envelope).await {
                Ok(()) => tracing::debug!("delivery handled"),
                Err(err) if err.is_retryable() && delivery.attempt <= config.max_redeliveries => {
                    tracing::info!(error = %err, "delivery failed, scheduling redelivery");
                    schedule_redelivery(&requeue, &delivery, &config);
                }
                Err(err) => report_dropped(&err),
            }
        }
        .instrument(span)
        .await;
    }
    tracing::debug!(%topic, handler = handler.name(), "listener stopped");
}

fn schedule_redelivery(requeue: &mpsc::WeakSender<Delivery>, delivery: &Delivery, config: &BrokerConfig) {
    let requeue = requeue.clone();
    let delay = config.redelivery_delay;
    let next = Delivery {
        body: Arc::clone(&delivery.body),
        attempt: delivery.attempt + 1,
    };

    drop(tokio::spawn(
        async move {
            tokio::time::sleep(delay).await;
            let delivered = match requeue.upgrade() {
                Some(sender) => sender.send(next).await.is_ok(),
                None => false,
            };
            if !delivered {
                tracing::warn!("broker closed before redelivery");
            }
        }
        .in_current_span(),
    ));
}

fn report_dropped(err: &Error) {
    if err.is_retryable() {
        tracing::warn!(error = %err, kind = ?err.kind(), "redeliveries exhausted, message dropped");
    } else {
        tracing::warn!(error = %err, kind = ?err.kind(), "delivery rejected, message dropped");
    }
}
