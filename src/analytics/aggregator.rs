//! In-memory view aggregation with per-identity deduplication
//!
//! A view of page `P` by identity `I` is counted only if `I` has not had a
//! counted view of `P` within the cooldown window. This collapses reload
//! storms into one view; it is a heuristic, not a unique-visitor count.
//!
//! Counters and dedup timestamps share one mutex so a counted view updates
//! every counter atomically. Enrichment (country lookup may hit the network)
//! runs between two short critical sections, never under the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::analytics::engine::classify;
use crate::analytics::geoip::CountryResolver;
use crate::analytics::models::{AnalyticsSnapshot, ViewKey};

/// Default cooldown between counted views of one page by one identity
pub const DEFAULT_VIEW_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Default)]
struct AggregatorState {
    counters: AnalyticsSnapshot,
    last_view: HashMap<ViewKey, Instant>,
}

impl AggregatorState {
    fn within_cooldown(&self, key: &ViewKey, now: Instant, cooldown: Duration) -> bool {
        self.last_view
            .get(key)
            .is_some_and(|last| now.saturating_duration_since(*last) <= cooldown)
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

/// In-memory analytics aggregator
pub struct AnalyticsAggregator {
    state: Arc<Mutex<AggregatorState>>,
    resolver: Arc<CountryResolver>,
    cooldown: Duration,
    hash_identities: bool,
    shutdown_tx: watch::Sender<bool>,
}

impl AnalyticsAggregator {
    pub fn new(resolver: Arc<CountryResolver>, cooldown: Duration, hash_identities: bool) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(AggregatorState::default())),
            resolver,
            cooldown,
            hash_identities,
            shutdown_tx,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        // Counters stay internally consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn view_key(&self, identity: &str, path: &str) -> ViewKey {
        if self.hash_identities {
            ViewKey::hashed(identity, path)
        } else {
            ViewKey::new(identity, path)
        }
    }

    /// Record a page view. Returns `true` if it was counted, `false` if it
    /// fell inside the cooldown window of an earlier counted view.
    pub async fn record_view(&self, identity: &str, path: &str, user_agent: &str) -> bool {
        let key = self.view_key(identity, path);
        // The window starts when the request arrived, not when enrichment finished
        let now = Instant::now();

        if self.lock().within_cooldown(&key, now, self.cooldown) {
            debug!(path, "view suppressed by cooldown");
            return false;
        }

        let engine = classify(user_agent);
        let country = self.resolver.resolve(identity).await;

        let mut state = self.lock();
        // A concurrent request for the same key may have been counted while we resolved
        if state.within_cooldown(&key, now, self.cooldown) {
            debug!(path, "view suppressed by cooldown");
            return false;
        }
        state.last_view.insert(key, now);

        let counters = &mut state.counters;
        counters.total_views += 1;
        bump(&mut counters.page_views, path);
        bump(&mut counters.browser_engines, engine.as_str());
        bump(&mut counters.countries, &country);

        debug!(path, engine = %engine, country = %country, "view recorded");
        true
    }

    /// Read-only copy of the current counters
    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.lock().counters.clone()
    }

    /// Drop dedup entries whose cooldown has elapsed. Returns how many were removed.
    ///
    /// An expired entry would admit the next view anyway, so pruning never
    /// changes what gets counted.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let cooldown = self.cooldown;
        let mut state = self.lock();
        let before = state.last_view.len();
        state
            .last_view
            .retain(|_, last| now.saturating_duration_since(*last) <= cooldown);
        before - state.last_view.len()
    }

    /// Number of (identity, page) pairs currently tracked for deduplication
    pub fn tracked_keys(&self) -> usize {
        self.lock().last_view.len()
    }

    /// Start the background task that periodically prunes expired dedup entries.
    ///
    /// The task exits after [`AnalyticsAggregator::shutdown`].
    pub fn start_prune_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let aggregator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = aggregator.prune_expired();
                        if removed > 0 {
                            debug!("Pruned {} expired view keys", removed);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Analytics prune task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Signal background tasks to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
