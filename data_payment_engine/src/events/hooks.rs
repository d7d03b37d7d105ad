use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCompletedEvent,
    OrderFailedEvent,
    TransitionConflictEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub order_failed_producer: Vec<EventProducer<OrderFailedEvent>>,
    pub transition_conflict_producer: Vec<EventProducer<TransitionConflictEvent>>,
}

pub struct EventHandlers {
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_order_failed: Option<EventHandler<OrderFailedEvent>>,
    pub on_transition_conflict: Option<EventHandler<TransitionConflictEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_order_failed = hooks.on_order_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_transition_conflict = hooks.on_transition_conflict.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_completed, on_order_failed, on_transition_conflict }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_failed {
            result.order_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_transition_conflict {
            result.transition_conflict_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(async move {
                handler.run().await;
            });
        }
        if let Some(handler) = self.on_order_failed {
            tokio::spawn(async move {
                handler.run().await;
            });
        }
        if let Some(handler) = self.on_transition_conflict {
            tokio::spawn(async move {
                handler.run().await;
            });
        }
        debug!("📬️ Event handlers started");
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_order_failed: Option<Handler<OrderFailedEvent>>,
    pub on_transition_conflict: Option<Handler<TransitionConflictEvent>>,
}

impl EventHooks {
    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_order_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_failed = Some(Arc::new(f));
        self
    }

    pub fn on_transition_conflict<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransitionConflictEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_transition_conflict = Some(Arc::new(f));
        self
    }
}
