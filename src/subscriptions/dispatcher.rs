//! Routing of live events to a handler set.

use crate::backend::{Backend, LiveEvent, LiveSubscription, SubscriptionId};
use crate::error::{ProxyError, Result};
use crate::types::RecordSchema;
use crossbeam_channel::Receiver;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::handlers::HandlerSet;

/// Counters kept by a dispatcher over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to a handler.
    pub delivered: u64,
    /// Created objects dropped for missing required keys.
    pub discarded: u64,
}

/// Routes the events of one subscription to its handlers.
///
/// Created objects must carry every key of the record schema to reach
/// `on_create`; anything else is dropped. Other events are forwarded as-is
/// to their handler when one is set.
pub struct Dispatcher {
    schema: RecordSchema,
    handlers: HandlerSet,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(schema: RecordSchema, handlers: HandlerSet) -> Self {
        Self {
            schema,
            handlers,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Handle one event. Breaks after `Closed`.
    pub fn dispatch(&mut self, event: LiveEvent) -> ControlFlow<()> {
        let class_name = self.schema.class_name.as_str();
        match event {
            LiveEvent::Opened => {
                debug!(class_name, "subscription opened");
            }
            LiveEvent::Created(object) => {
                debug!(class_name, %object, "onCreate");
                let missing = self.schema.missing_keys(&object.to_json());
                if missing.is_empty() {
                    self.stats.delivered += 1;
                    (self.handlers.on_create)(object);
                } else {
                    self.stats.discarded += 1;
                    debug!(class_name, ?missing, %object, "discarding created object");
                }
            }
            LiveEvent::Updated(object) => {
                debug!(class_name, %object, "onUpdate");
                if let Some(handler) = self.handlers.on_update.as_mut() {
                    self.stats.delivered += 1;
                    handler(object);
                }
            }
            LiveEvent::Entered(object) => {
                debug!(class_name, %object, "onEnter");
                if let Some(handler) = self.handlers.on_enter.as_mut() {
                    self.stats.delivered += 1;
                    handler(object);
                }
            }
            LiveEvent::Deleted(object) => {
                debug!(class_name, %object, "onDelete");
                if let Some(handler) = self.handlers.on_delete.as_mut() {
                    self.stats.delivered += 1;
                    handler(object);
                }
            }
            LiveEvent::Error(reason) => {
                warn!(class_name, %reason, "live subscription transport error");
                if let Some(handler) = self.handlers.on_error.as_mut() {
                    self.stats.delivered += 1;
                    handler(reason.as_str());
                }
            }
            LiveEvent::Closed => {
                debug!(class_name, "onClose");
                if let Some(handler) = self.handlers.on_close.as_mut() {
                    self.stats.delivered += 1;
                    handler();
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Consume events in order until `Closed` or until the stream
    /// disconnects.
    pub fn run(mut self, receiver: Receiver<LiveEvent>) -> DispatchStats {
        for event in receiver.iter() {
            if self.dispatch(event).is_break() {
                return self.stats;
            }
        }
        warn!(
            class_name = %self.schema.class_name,
            "live stream disconnected without close"
        );
        self.stats
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle detaches the dispatcher thread; it keeps running
/// until the backend closes the stream.
pub struct SubscriptionHandle<B: Backend> {
    id: SubscriptionId,
    backend: Arc<B>,
    worker: Option<JoinHandle<DispatchStats>>,
}

impl<B: Backend> SubscriptionHandle<B> {
    /// Start a dispatcher thread consuming `live`.
    pub(crate) fn spawn(
        backend: Arc<B>,
        live: LiveSubscription,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        let LiveSubscription { id, receiver } = live;
        let spawned = std::thread::Builder::new()
            .name(format!("live-{}-{}", dispatcher.schema.class_name, id))
            .spawn(move || dispatcher.run(receiver));

        match spawned {
            Ok(worker) => Ok(Self {
                id,
                backend,
                worker: Some(worker),
            }),
            Err(e) => {
                backend.unsubscribe(id);
                Err(ProxyError::Dispatch(e.to_string()))
            }
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Close the subscription and wait for the dispatcher to drain.
    pub fn close(mut self) -> Result<DispatchStats> {
        self.backend.unsubscribe(self.id);
        self.join()
    }

    /// Wait for the backend to close the subscription.
    pub fn wait(mut self) -> Result<DispatchStats> {
        self.join()
    }

    fn join(&mut self) -> Result<DispatchStats> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| ProxyError::Dispatch("handler panicked".to_string())),
            None => Ok(DispatchStats::default()),
        }
    }
}
