//! Periodic container-status polling.
//!
//! A single background task fetches status immediately and then on a fixed
//! interval. Each result is stored as the latest snapshot and offered to the
//! consumer's channel; a full channel drops the update instead of stalling. Starting again replaces the running task, so there is
//! never more than one timer.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::containers::{Container, ContainerSupervisor};
use crate::errors::Result;
use crate::events::StatusUpdate;

const UPDATE_CHANNEL_CAPACITY: usize = 16;

#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<Container>>;
}

#[async_trait]
impl StatusSource for ContainerSupervisor {
    async fn fetch(&self) -> Result<Vec<Container>> {
        self.list_containers().await
    }
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    task: Mutex<Option<JoinHandle<()>>>,
    snapshot: Arc<watch::Sender<StatusUpdate>>,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        let (snapshot, _) = watch::channel(StatusUpdate::default());
        Self {
            source,
            task: Mutex::new(None),
            snapshot: Arc::new(snapshot),
        }
    }

    /// Start polling, cancelling any previous poll task first. Updates stop
    /// when the returned receiver is dropped or `stop` is called.
    pub fn start(&self, interval: Duration) -> mpsc::Receiver<StatusUpdate> {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let source = self.source.clone();
        let snapshot = self.snapshot.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let update = match source.fetch().await {
                    Ok(containers) => StatusUpdate {
                        containers,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "container status check failed");
                        StatusUpdate {
                            containers: snapshot.borrow().containers.clone(),
                            error: Some(e.to_string()),
                        }
                    }
                };
                snapshot.send_replace(update.clone());
                match tx.try_send(update) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!("status consumer is behind, update dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!("status consumer dropped, polling stopped");
                        break;
                    }
                }
            }
        });

        if let Ok(mut task) = self.task.lock() {
            if let Some(previous) = task.replace(handle) {
                previous.abort();
            }
        }
        rx
    }

    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|t| t.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Latest status; replaced wholesale on every tick.
    pub fn latest(&self) -> StatusUpdate {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusUpdate> {
        self.snapshot.subscribe()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DevwpError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_millis(5000);

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl StatusSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<Container>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(DevwpError::Other(anyhow::anyhow!("daemon not running")));
            }
            Ok(vec![Container {
                id: format!("id{}", n),
                name: "devwp-redis-1".into(),
                service: "redis".into(),
                state: "running".into(),
                image: "redis:7".into(),
                version: None,
            }])
        }
    }

    fn calls(source: &CountingSource) -> usize {
        source.calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn first_check_is_immediate_then_periodic() {
        let source = Arc::new(CountingSource::default());
        let poller = StatusPoller::new(source.clone());
        let _rx = poller.start(INTERVAL);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls(&source), 1);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(calls(&source), 2);
        assert!(poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_fetching() {
        let source = Arc::new(CountingSource::default());
        let poller = StatusPoller::new(source.clone());
        let _rx = poller.start(INTERVAL);
        tokio::time::sleep(Duration::from_millis(10)).await;
        poller.stop();

        tokio::time::sleep(INTERVAL * 4).await;
        assert_eq!(calls(&source), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_duplicate_timers() {
        let source = Arc::new(CountingSource::default());
        let poller = StatusPoller::new(source.clone());
        let _first = poller.start(INTERVAL);
        let _second = poller.start(INTERVAL);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_start = calls(&source);
        assert_eq!(after_start, 1);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(calls(&source), after_start + 1);
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(calls(&source), after_start + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_does_not_stop_polling() {
        let source = Arc::new(CountingSource {
            fail_first: true,
            ..Default::default()
        });
        let poller = StatusPoller::new(source.clone());
        let mut rx = poller.start(INTERVAL);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.error.as_deref(), Some("daemon not running"));
        assert!(first.containers.is_empty());

        let second = rx.recv().await.unwrap();
        assert!(second.error.is_none());
        assert_eq!(second.containers.len(), 1);
        assert_eq!(poller.latest(), second);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_receiver_ends_task() {
        let source = Arc::new(CountingSource::default());
        let poller = StatusPoller::new(source.clone());
        let rx = poller.start(INTERVAL);
        drop(rx);

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(calls(&source), 1);
        assert!(!poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_does_not_stall_polling() {
        let source = Arc::new(CountingSource::default());
        let poller = StatusPoller::new(source.clone());
        let _rx = poller.start(INTERVAL);

        let ticks = UPDATE_CHANNEL_CAPACITY + 4;
        tokio::time::sleep(INTERVAL * ticks as u32 + Duration::from_millis(10)).await;
        assert_eq!(calls(&source), ticks + 1);
        assert_eq!(poller.latest().containers[0].id, format!("id{}", ticks));
        assert!(poller.is_running());
    }
}
