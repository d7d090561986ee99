// Dashboard state publisher: the single read model consumers see.
// The state loop is the only writer; each mutation publishes one complete, immutable
// DashboardState.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::models::{AggregateSnapshot, DashboardState, Sample};

/// Write side, owned by the aggregator's state loop.
pub struct StatePublisher {
    current: watch::Sender<Arc<DashboardState>>,
    events: Option<broadcast::Sender<Arc<DashboardState>>>,
}

/// Read side: point reads and subscriptions. Cheap to clone.
#[derive(Clone)]
pub struct DashboardReader {
    current: watch::Receiver<Arc<DashboardState>>,
    // Never read; only used to hand out fresh receivers after the publisher
    // went away, so subscribers see `Closed` once it is closed.
    seed: Arc<broadcast::Receiver<Arc<DashboardState>>>,
}

/// Creates a publisher/reader pair. `capacity` bounds how many notifications a slow
/// subscriber may fall behind.
pub fn channel(capacity: usize) -> (StatePublisher, DashboardReader) {
    let initial = Arc::new(DashboardState::initial());
    let (current_tx, current_rx) = watch::channel(initial);
    let (events_tx, seed) = broadcast::channel(capacity.max(1));
    (
        StatePublisher {
            current: current_tx,
            events: Some(events_tx),
        },
        DashboardReader {
            current: current_rx,
            seed: Arc::new(seed),
        },
    )
}

impl StatePublisher {
    /// Swaps in `state` for point reads, then notifies subscribers once.
    /// Returns false once the publisher is closed; nothing is published then.
    pub fn publish(&mut self, state: DashboardState) -> bool {
        let Some(events) = self.events.as_ref() else {
            return false;
        };
        let state = Arc::new(state);
        self.current.send_replace(state.clone());
        // Err only means nobody is subscribed right now.
        let _ = events.send(state);
        true
    }

    /// Stops all further notifications. Subscribers drain what they have, then see `Closed`.
    pub fn close(&mut self) {
        if self.events.take().is_some() {
            debug!("state publisher closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }

    /// Active subscribers (the internal seed receiver is not counted).
    pub fn subscriber_count(&self) -> usize {
        self.events
            .as_ref()
            .map(|tx| tx.receiver_count().saturating_sub(1))
            .unwrap_or(0)
    }

    pub fn current(&self) -> Arc<DashboardState> {
        self.current.borrow().clone()
    }
}

impl DashboardReader {
    /// The whole read model as last published.
    pub fn current(&self) -> Arc<DashboardState> {
        self.current.borrow().clone()
    }

    pub fn aggregate_snapshot(&self) -> AggregateSnapshot {
        self.current.borrow().aggregate.clone()
    }

    pub fn rolling_window(&self) -> Vec<Sample> {
        self.current.borrow().window.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.current.borrow().is_connected()
    }

    /// One message per published mutation, in publish order.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DashboardState>> {
        self.seed.resubscribe()
    }

    /// Runs `callback` on a background task for every published state.
    /// Delivery stops when the returned guard is dropped or the publisher closes.
    pub fn subscribe_with<F>(&self, mut callback: F) -> SubscriptionGuard
    where
        F: FnMut(Arc<DashboardState>) + Send + 'static,
    {
        let mut rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(state) => callback(state),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "dashboard subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard { handle }
    }
}

/// Aborts the callback task on drop.
pub struct SubscriptionGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl SubscriptionGuard {
    /// True once the subscription task ended (publisher closed).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
