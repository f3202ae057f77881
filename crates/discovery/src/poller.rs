//! Timer-driven poll loop
//!
//! Each tick runs one fetch → validate → persist cycle. Cycles run inline in
//! the loop, so they never overlap; ticks that come due while a cycle is still
//! running are skipped rather than queued. No error inside a cycle ends the
//! loop, only cancellation of the shutdown token does.

use crate::error::PollerError;
use crate::fetcher::DiscoverySource;
use crate::model::Labels;
use crate::persister::Persister;
use crate::validator;
use sdpoller_common::{MetricsSink, PollOutcome};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Poll loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PollerState {
    /// Waiting for the next tick
    Idle,
    /// A cycle is in progress
    Polling,
    /// The loop has exited; terminal
    Stopped,
}

pub struct Poller<S> {
    source: S,
    persister: Persister,
    metrics: Arc<dyn MetricsSink>,
    interval: Duration,
    static_labels: Option<Labels>,
    state: watch::Sender<PollerState>,
}

impl<S: DiscoverySource> Poller<S> {
    pub fn new(
        source: S,
        persister: Persister,
        metrics: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Result<Self, PollerError> {
        if interval.is_zero() {
            return Err(PollerError::ZeroInterval);
        }
        // 第一次 tick 在 now + interval，必须能表示
        if Instant::now().checked_add(interval).is_none() {
            return Err(PollerError::IntervalTooLarge { interval });
        }

        let (state, _) = watch::channel(PollerState::Idle);
        Ok(Self {
            source,
            persister,
            metrics,
            interval,
            static_labels: None,
            state,
        })
    }

    /// Merge `labels` into every target group before writing. An empty set
    /// keeps the fetched bytes verbatim.
    pub fn with_static_labels(mut self, labels: Labels) -> Self {
        self.static_labels = (!labels.is_empty()).then_some(labels);
        self
    }

    /// Watch the loop state.
    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Run exactly one cycle and report its outcome.
    pub async fn poll_once(&self) -> PollOutcome {
        self.state.send_replace(PollerState::Polling);
        let outcome = self.cycle().await;
        self.metrics.record_outcome(outcome);
        self.state.send_replace(PollerState::Idle);
        outcome
    }

    async fn cycle(&self) -> PollOutcome {
        let url = self.source.url();

        let body = match self.source.fetch().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    "Fetching {} failed, keeping the current target file: {}",
                    url, e
                );
                return PollOutcome::FetchFailed;
            }
        };

        let response = match validator::validate(&body) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Validation of the response from {} failed, not saving it: {}",
                    url, e
                );
                return PollOutcome::ValidationFailed;
            }
        };
        let groups = response.len();

        let payload = match &self.static_labels {
            Some(labels) => match response.with_static_labels(labels).to_json() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode target groups from {}: {}", url, e);
                    self.metrics.record_write(false);
                    return PollOutcome::Persisted;
                }
            },
            None => body,
        };

        match self.persister.persist(payload).await {
            Ok(()) => {
                info!(
                    "Saved {} target groups from {} to {:?}",
                    groups,
                    url,
                    self.persister.path()
                );
                self.metrics.record_write(true);
            }
            Err(e) => {
                error!("An error occurred while saving the targets to file: {}", e);
                self.metrics.record_write(false);
            }
        }

        PollOutcome::Persisted
    }

    /// Poll on every tick until `shutdown` is cancelled.
    ///
    /// The first tick fires one interval after start. A cycle already in
    /// progress when shutdown is requested runs to completion (bounded by the
    /// fetch timeout); no new cycle starts afterwards.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), PollerError> {
        let Some(first_tick) = Instant::now().checked_add(self.interval) else {
            self.state.send_replace(PollerState::Stopped);
            return Err(PollerError::IntervalTooLarge {
                interval: self.interval,
            });
        };
        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Polling {} every {:?}, writing to {:?}",
            self.source.url(),
            self.interval,
            self.persister.path()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = self.poll_once().await;
            debug!("Poll cycle finished: {}", outcome);
        }

        self.state.send_replace(PollerState::Stopped);
        info!("Poller stopped");
        Ok(())
    }
}

impl<S: DiscoverySource + 'static> Poller<S> {
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<(), PollerError>> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use sdpoller_common::DiscoveryMetrics;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ONE_GROUP: &[u8] = br#"[{"targets":["a:9100"],"labels":{}}]"#;
    const TWO_GROUPS: &[u8] =
        br#"[{"targets":["a:9100"],"labels":{}},{"targets":["b:9100"],"labels":{}}]"#;

    /// Replays scripted responses, then keeps returning `repeat` (or a 503).
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        repeat: Option<Vec<u8>>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn scripted(bodies: &[&[u8]]) -> Self {
            Self {
                script: Mutex::new(bodies.iter().map(|b| Ok(b.to_vec())).collect()),
                ..Default::default()
            }
        }

        fn repeating(body: &[u8], delay: Duration) -> Self {
            Self {
                repeat: Some(body.to_vec()),
                delay,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl DiscoverySource for Arc<ScriptedSource> {
        fn url(&self) -> &str {
            "http://scripted/discovery"
        }

        async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let next = self.script.lock().unwrap().pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match next {
                Some(result) => result,
                None => match &self.repeat {
                    Some(body) => Ok(body.clone()),
                    None => Err(FetchError::Status {
                        url: self.url().to_string(),
                        status: 503,
                    }),
                },
            }
        }
    }

    fn poller(
        source: &Arc<ScriptedSource>,
        path: &Path,
        interval: Duration,
    ) -> (Poller<Arc<ScriptedSource>>, Arc<DiscoveryMetrics>) {
        let metrics = Arc::new(DiscoveryMetrics::new("test").unwrap());
        let poller = Poller::new(
            source.clone(),
            Persister::new(path, true),
            metrics.clone(),
            interval,
        )
        .unwrap();
        (poller, metrics)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let source = Arc::new(ScriptedSource::failing());
        let metrics = Arc::new(DiscoveryMetrics::new("test").unwrap());
        let result = Poller::new(
            source,
            Persister::new("targets.json", true),
            metrics,
            Duration::ZERO,
        );
        assert!(matches!(result, Err(PollerError::ZeroInterval)));
    }

    #[test]
    fn test_unrepresentable_interval_is_rejected() {
        let source = Arc::new(ScriptedSource::failing());
        let metrics = Arc::new(DiscoveryMetrics::new("test").unwrap());
        let result = Poller::new(
            source,
            Persister::new("targets.json", true),
            metrics,
            Duration::from_secs(u64::MAX),
        );
        assert!(matches!(result, Err(PollerError::IntervalTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_single_group_keeps_file_then_two_groups_replace_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, b"previous").unwrap();

        let source = Arc::new(ScriptedSource::scripted(&[ONE_GROUP, TWO_GROUPS]));
        let (poller, metrics) = poller(&source, &path, Duration::from_secs(5));

        assert_eq!(poller.poll_once().await, PollOutcome::ValidationFailed);
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");

        assert_eq!(poller.poll_once().await, PollOutcome::Persisted);
        assert_eq!(std::fs::read(&path).unwrap(), TWO_GROUPS);

        assert_eq!(metrics.outcome_count(PollOutcome::ValidationFailed), 1);
        assert_eq!(metrics.outcome_count(PollOutcome::Persisted), 1);
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn test_malformed_and_empty_bodies_leave_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, TWO_GROUPS).unwrap();

        let source = Arc::new(ScriptedSource::scripted(&[b"<html>oops</html>", b"[]"]));
        let (poller, _) = poller(&source, &path, Duration::from_secs(5));

        assert_eq!(poller.poll_once().await, PollOutcome::ValidationFailed);
        assert_eq!(poller.poll_once().await, PollOutcome::ValidationFailed);
        assert_eq!(std::fs::read(&path).unwrap(), TWO_GROUPS);
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::failing());
        let (poller, metrics) = poller(&source, &path, Duration::from_secs(5));

        assert_eq!(poller.poll_once().await, PollOutcome::FetchFailed);
        assert!(!path.exists());
        assert_eq!(metrics.outcome_count(PollOutcome::FetchFailed), 1);
    }

    #[tokio::test]
    async fn test_static_labels_are_merged_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::repeating(TWO_GROUPS, Duration::ZERO));
        let (poller, _) = poller(&source, &path, Duration::from_secs(5));
        let poller = poller.with_static_labels(Labels::from([
            ("env".to_string(), "prod".to_string()),
            ("team".to_string(), "core".to_string()),
        ]));

        assert_eq!(poller.poll_once().await, PollOutcome::Persisted);
        let first = std::fs::read(&path).unwrap();
        assert_eq!(
            String::from_utf8(first.clone()).unwrap(),
            r#"[{"targets":["a:9100"],"labels":{"env":"prod","team":"core"}},{"targets":["b:9100"],"labels":{"env":"prod","team":"core"}}]"#
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Persisted);
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[tokio::test]
    async fn test_empty_static_labels_keep_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        let body: &[u8] = b"[ {\"targets\": [\"b:1\"]},\n {\"targets\": [\"a:1\"]} ]";

        let source = Arc::new(ScriptedSource::scripted(&[body]));
        let (poller, _) = poller(&source, &path, Duration::from_secs(5));
        let poller = poller.with_static_labels(Labels::new());

        assert_eq!(poller.poll_once().await, PollOutcome::Persisted);
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_write_failure_still_completes_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("targets.json");

        let source = Arc::new(ScriptedSource::scripted(&[TWO_GROUPS]));
        let (poller, metrics) = poller(&source, &path, Duration::from_secs(5));

        assert_eq!(poller.poll_once().await, PollOutcome::Persisted);
        assert_eq!(metrics.write_failures(), 1);
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn test_first_tick_waits_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::repeating(TWO_GROUPS, Duration::ZERO));
        let (poller, _) = poller(&source, &path, Duration::from_millis(500));
        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_ticking_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::repeating(TWO_GROUPS, Duration::ZERO));
        let (poller, metrics) = poller(&source, &path, Duration::from_millis(20));
        let mut state = poller.subscribe();
        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());

        wait_for(|| source.calls.load(Ordering::SeqCst) >= 2).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(*state.borrow_and_update(), PollerState::Stopped);
        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        assert!(metrics.outcome_count(PollOutcome::Persisted) >= 2);
        assert_eq!(std::fs::read(&path).unwrap(), TWO_GROUPS);
    }

    #[tokio::test]
    async fn test_overrunning_cycles_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::repeating(
            TWO_GROUPS,
            Duration::from_millis(50),
        ));
        let (poller, _) = poller(&source, &path, Duration::from_millis(10));
        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());

        wait_for(|| source.calls.load(Ordering::SeqCst) >= 4).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_inflight_fetch_lets_cycle_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let source = Arc::new(ScriptedSource::repeating(
            TWO_GROUPS,
            Duration::from_millis(300),
        ));
        let (poller, _) = poller(&source, &path, Duration::from_millis(20));
        let shutdown = CancellationToken::new();
        let handle = poller.spawn(shutdown.clone());

        wait_for(|| source.in_flight.load(Ordering::SeqCst) == 1).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&path).unwrap(), TWO_GROUPS);
    }
}
