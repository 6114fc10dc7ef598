#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use loader::{
    DataRequest, DeviceClass, Fetcher, LoaderConfig, NetworkConditions, NetworkQuality, Priority,
    PriorityHint, Scheduler, SharedNetworkConditions, Stage,
};

pub type Sched = Scheduler<Arc<MockFetcher>>;
pub type Req = DataRequest<String, String>;

/// Batching layer stand-in. Params are the request id; output is `data:<id>`.
///
/// Records dispatch and completion order, per-id start and finish times on
/// the tokio clock, and the in-flight high-water mark.
#[derive(Default)]
pub struct MockFetcher {
    delays_ms: Mutex<HashMap<String, u64>>,
    failures_left: Mutex<HashMap<String, u32>>,
    pub dispatched: Mutex<Vec<String>>,
    pub completed: Mutex<Vec<String>>,
    started_at: Mutex<HashMap<String, Instant>>,
    finished_at: Mutex<HashMap<String, Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, id: &str, ms: u64) {
        self.delays_ms.lock().insert(id.to_string(), ms);
    }

    /// The next `n` calls for `id` fail.
    pub fn fail(&self, id: &str, n: u32) {
        self.failures_left.lock().insert(id.to_string(), n);
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    pub fn dispatch_count(&self, id: &str) -> usize {
        self.dispatched.lock().iter().filter(|d| *d == id).count()
    }

    /// Start of the first attempt for `id`.
    pub fn started_at(&self, id: &str) -> Option<Instant> {
        self.started_at.lock().get(id).copied()
    }

    /// End of the latest attempt for `id`.
    pub fn finished_at(&self, id: &str) -> Option<Instant> {
        self.finished_at.lock().get(id).copied()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight count even when the fetch future is dropped by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    type Params = String;
    type Output = String;

    async fn fetch(&self, _endpoint: &str, id: &String, _hint: PriorityHint) -> anyhow::Result<String> {
        let delay = self.delays_ms.lock().get(id).copied().unwrap_or(10);
        let fail = match self.failures_left.lock().get_mut(id) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };

        self.dispatched.lock().push(id.clone());
        self.started_at
            .lock()
            .entry(id.clone())
            .or_insert_with(Instant::now);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _slot = InFlight(&self.in_flight);

        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.finished_at.lock().insert(id.clone(), Instant::now());

        if fail {
            anyhow::bail!("scripted failure for {id}");
        }
        self.completed.lock().push(id.clone());
        Ok(format!("data:{id}"))
    }
}

pub fn network(quality: NetworkQuality) -> SharedNetworkConditions {
    let rtt_ms = match quality {
        NetworkQuality::Fast => 40,
        NetworkQuality::Moderate => 300,
        NetworkQuality::Slow => 1_500,
    };
    SharedNetworkConditions::new(Some(NetworkConditions { quality, rtt_ms }))
}

pub fn scheduler_with(
    mock: &Arc<MockFetcher>,
    device: DeviceClass,
    net: SharedNetworkConditions,
) -> Sched {
    common::logger::init_logger("loader-tests", false);

    let config = LoaderConfig {
        device_class: device,
        ..LoaderConfig::default()
    };
    Scheduler::new(mock.clone(), Arc::new(net), config)
}

/// Desktop on a fast network.
pub fn scheduler(mock: &Arc<MockFetcher>) -> Sched {
    scheduler_with(mock, DeviceClass::Desktop, network(NetworkQuality::Fast))
}

pub fn req(id: &str, priority: Priority, stage: Stage) -> Req {
    DataRequest::new(id, format!("/api/{id}"), id.to_string())
        .with_priority(priority)
        .with_stage(stage)
}
