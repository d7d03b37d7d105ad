//! One mpsc channel per hook. Any number of [`EventProducer`]s feed a single [`EventHandler`], which runs the hook
//! on a fresh task for every event it receives. Hooks get the event by value and nothing else.
use std::{any::type_name, future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    rx: mpsc::Receiver<E>,
    tx: mpsc::Sender<E>,
    hook: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    /// `buffer_size` events may be queued before publishers start waiting.
    pub fn new(buffer_size: usize, hook: Handler<E>) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        Self { rx, tx, hook }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { tx: self.tx.clone() }
    }

    /// Dispatches events until the last producer is dropped. Returns once every dispatched hook has finished.
    pub async fn run(self) {
        let Self { mut rx, tx, hook } = self;
        drop(tx);
        let name = type_name::<E>();
        debug!("📬️ {name} handler running");
        let mut jobs = JoinSet::new();
        while let Some(event) = rx.recv().await {
            let hook = Arc::clone(&hook);
            jobs.spawn(async move { hook(event).await });
            // Reap finished hooks so the set does not grow with the lifetime of the server
            while let Some(done) = jobs.try_join_next() {
                if let Err(e) = done {
                    warn!("📬️ A {name} hook did not finish. {e}");
                }
            }
        }
        trace!("📬️ All {name} producers are gone. Waiting on {} hooks", jobs.len());
        while let Some(done) = jobs.join_next().await {
            if let Err(e) = done {
                warn!("📬️ A {name} hook did not finish. {e}");
            }
        }
        debug!("📬️ {name} handler stopped");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    tx: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    /// Waits for room in the channel. If the handler has stopped, the event is dropped and logged.
    pub async fn publish_event(&self, event: E) {
        if self.tx.send(event).await.is_err() {
            error!("📬️ The {} handler has stopped. Event dropped", type_name::<E>());
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use super::*;

    fn summing_hook(total: Arc<AtomicU64>, delay_ms: u64) -> Handler<u64> {
        Arc::new(move |v| {
            let total = Arc::clone(&total);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                total.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    #[tokio::test]
    async fn every_published_event_is_handled() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let handler = EventHandler::new(1, summing_hook(Arc::clone(&total), 20));
        for i in 0..3u64 {
            let producer = handler.subscribe();
            tokio::spawn(async move {
                for v in 0..4u64 {
                    producer.publish_event(10 * i + v).await;
                }
            });
        }
        handler.run().await;
        // (0+1+2+3) * 3 + 10 * 4 + 20 * 4
        assert_eq!(total.load(Ordering::SeqCst), 138);
    }

    #[tokio::test]
    async fn slow_hooks_finish_before_the_handler_returns() {
        let total = Arc::new(AtomicU64::new(0));
        let handler = EventHandler::new(8, summing_hook(Arc::clone(&total), 200));
        let producer = handler.subscribe();
        producer.publish_event(5).await;
        producer.publish_event(7).await;
        drop(producer);
        handler.run().await;
        assert_eq!(total.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn publishing_to_a_stopped_handler_is_harmless() {
        let total = Arc::new(AtomicU64::new(0));
        let handler = EventHandler::new(1, summing_hook(Arc::clone(&total), 0));
        let producer = handler.subscribe();
        drop(handler);
        producer.publish_event(1).await;
        assert_eq!(total.load(Ordering::SeqCst), 0);
    }
}
