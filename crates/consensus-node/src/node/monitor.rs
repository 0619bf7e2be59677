//! One clock for every periodic routine of a node.
use super::errors::NodeResult;
use super::processor::Processor;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[async_trait]
pub trait TickerRoutine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> NodeResult<()>;
}

struct Entry {
    routine: Arc<dyn TickerRoutine>,
    every: u64,
    running: AtomicBool,
    triggered: AtomicBool,
}

/// Runs each registered routine every `every` ticks. A routine still running
/// from an earlier tick is skipped.
pub struct GlobalTicker {
    interval: Duration,
    ticks: AtomicU64,
    entries: RwLock<BTreeMap<&'static str, Arc<Entry>>>,
}

impl GlobalTicker {
    pub fn new(interval_ms: u64) -> Self {
        GlobalTicker {
            interval: Duration::from_millis(interval_ms.max(1)),
            ticks: AtomicU64::new(0),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns `false` when a routine with the same name is registered.
    pub fn register(&self, routine: Arc<dyn TickerRoutine>, every: u64) -> bool {
        let name = routine.name();

        let mut entries = self.entries.write();

        if entries.contains_key(name) {
            return false;
        }

        entries.insert(
            name,
            Arc::new(Entry {
                routine,
                every: every.max(1),
                running: AtomicBool::new(false),
                triggered: AtomicBool::new(false),
            }),
        );

        true
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    /// Runs the routine on the next tick regardless of its interval.
    pub fn trigger_next_tick(&self, name: &str) -> bool {
        match self.entries.read().get(name) {
            Some(entry) => {
                entry.triggered.store(true, Ordering::SeqCst);

                true
            }
            None => false,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advances one tick and spawns every routine due at it.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        let entries: Vec<Arc<Entry>> = self.entries.read().values().cloned().collect();

        let mut handles = vec![];

        for entry in entries {
            let triggered = entry.triggered.swap(false, Ordering::SeqCst);

            if !triggered && tick % entry.every != 0 {
                continue;
            }

            if entry.running.swap(true, Ordering::SeqCst) {
                debug!(routine = entry.routine.name(), tick, "routine still running, skipped");

                if triggered {
                    entry.triggered.store(true, Ordering::SeqCst);
                }

                continue;
            }

            handles.push(tokio::spawn(async move {
                if let Err(e) = entry.routine.run().await {
                    warn!(routine = entry.routine.name(), "routine failed: {}", e);
                }

                entry.running.store(false, Ordering::SeqCst);
            }));
        }

        handles
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                self.tick();
            }
        })
    }
}

pub struct ProposeRoutine {
    processor: Arc<Processor>,
}

impl ProposeRoutine {
    pub fn new(processor: Arc<Processor>) -> Self {
        ProposeRoutine { processor }
    }
}

#[async_trait]
impl TickerRoutine for ProposeRoutine {
    fn name(&self) -> &'static str {
        "propose"
    }

    async fn run(&self) -> NodeResult<()> {
        self.processor.try_propose()?;

        Ok(())
    }
}

/// Group release and context sweeping.
pub struct ReleaseRoutine {
    processor: Arc<Processor>,
}

impl ReleaseRoutine {
    pub fn new(processor: Arc<Processor>) -> Self {
        ReleaseRoutine { processor }
    }
}

#[async_trait]
impl TickerRoutine for ReleaseRoutine {
    fn name(&self) -> &'static str {
        "release"
    }

    async fn run(&self) -> NodeResult<()> {
        self.processor.release_and_sweep()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tokio::sync::Notify;

    struct Counter {
        name: &'static str,
        runs: AtomicU64,
        gate: Option<Arc<Notify>>,
    }

    impl Counter {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Counter {
                name,
                runs: AtomicU64::new(0),
                gate: None,
            })
        }

        fn runs(&self) -> u64 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TickerRoutine for Counter {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) -> NodeResult<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.runs.fetch_add(1, Ordering::SeqCst);

            Ok(())
        }
    }

    async fn tick(ticker: &GlobalTicker) -> usize {
        let handles = ticker.tick();

        let spawned = handles.len();

        for handle in handles {
            handle.await.unwrap();
        }

        spawned
    }

    #[tokio::test]
    async fn test_routines_run_at_their_interval() {
        let ticker = GlobalTicker::new(10);

        let every_tick = Counter::new("every");
        let every_third = Counter::new("third");

        assert!(ticker.register(every_tick.clone(), 1));
        assert!(ticker.register(every_third.clone(), 3));
        assert!(!ticker.register(Counter::new("every"), 2));

        for _ in 0..6 {
            tick(&ticker).await;
        }

        assert_eq!(ticker.ticks(), 6);
        assert_eq!(every_tick.runs(), 6);
        assert_eq!(every_third.runs(), 2);
    }

    #[tokio::test]
    async fn test_trigger_and_remove() {
        let ticker = GlobalTicker::new(10);

        let routine = Counter::new("slow");

        ticker.register(routine.clone(), 100);

        assert_eq!(tick(&ticker).await, 0);

        assert!(ticker.trigger_next_tick("slow"));
        assert_eq!(tick(&ticker).await, 1);
        assert_eq!(tick(&ticker).await, 0);
        assert_eq!(routine.runs(), 1);

        assert!(ticker.remove("slow"));
        assert!(!ticker.trigger_next_tick("slow"));
    }

    #[tokio::test]
    async fn test_running_routine_is_not_started_twice() {
        let ticker = GlobalTicker::new(10);

        let gate = Arc::new(Notify::new());

        let routine = Arc::new(Counter {
            name: "gated",
            runs: AtomicU64::new(0),
            gate: Some(gate.clone()),
        });

        ticker.register(routine.clone(), 1);

        let first = ticker.tick();
        assert_eq!(first.len(), 1);

        assert!(ticker.tick().is_empty());

        gate.notify_one();

        for handle in first {
            handle.await.unwrap();
        }

        assert_eq!(routine.runs(), 1);

        gate.notify_one();

        assert_eq!(tick(&ticker).await, 1);
        assert_eq!(routine.runs(), 2);
    }
}
