use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::alert::{AlertDispatcher, AlertEvent};
use crate::error::Error;
use crate::fingerprint::{self, Extraction, Fingerprint, FingerprintRecord};
use crate::retry::{RetryPolicy, fetch_with_retry};
use crate::snapshot::{ResourceIdentity, SnapshotFetcher};
use crate::store::StateStore;

/// Classification of one completed check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// First observation: the baseline was persisted and no alert fired.
    InitialState,
    NoChange,
    Changed {
        previous_hash: String,
        current_hash: String,
    },
    /// The target content was absent; prior persisted state is untouched.
    NotFound,
    /// Acquisition or an internal step failed; no state was written.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Initializing,
    Checking,
    Idle,
}

/// Process-lifetime state of one monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorRunState {
    pub phase: MonitorPhase,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl MonitorRunState {
    fn new() -> Self {
        Self {
            phase: MonitorPhase::Initializing,
            last_run_at: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorOptions {
    pub ignore_minor_changes: bool,
    pub debug: bool,
}

/// Compares each fresh observation against the persisted fingerprint and
/// classifies the outcome, alerting where the classification calls for it.
pub struct ChangeDetector {
    identity: ResourceIdentity,
    fetcher: Arc<dyn SnapshotFetcher>,
    store: StateStore,
    dispatcher: AlertDispatcher,
    retry: RetryPolicy,
    options: DetectorOptions,
    run_state: MonitorRunState,
}

impl ChangeDetector {
    pub fn new(
        identity: ResourceIdentity,
        fetcher: Arc<dyn SnapshotFetcher>,
        store: StateStore,
        dispatcher: AlertDispatcher,
        retry: RetryPolicy,
        options: DetectorOptions,
    ) -> Self {
        Self {
            identity,
            fetcher,
            store,
            dispatcher,
            retry,
            options,
            run_state: MonitorRunState::new(),
        }
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    pub fn run_state(&self) -> &MonitorRunState {
        &self.run_state
    }

    /// Runs one check cycle: acquire, fingerprint, compare, persist, alert.
    ///
    /// Never returns an error to the scheduler; every failure path is folded
    /// into [`CycleOutcome::Error`].
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.run_state.phase = MonitorPhase::Checking;
        self.run_state.last_run_at = Some(Utc::now());

        let outcome = self.check().await;

        if outcome == CycleOutcome::Error {
            self.run_state.consecutive_failures += 1;
        } else {
            self.run_state.consecutive_failures = 0;
        }
        self.run_state.phase = MonitorPhase::Idle;

        outcome
    }

    async fn check(&mut self) -> CycleOutcome {
        let snapshot =
            match fetch_with_retry(self.fetcher.as_ref(), &self.identity, &self.retry).await {
                Ok(snapshot) => snapshot,
                Err(e) => return self.fail(e).await,
            };

        if self.options.debug {
            if let Err(e) = self.store.save_debug_snapshot(&self.identity, &snapshot) {
                warn!("failed to write debug snapshot for {}: {e}", self.identity.url);
            }
        }

        let fingerprint =
            match fingerprint::extract(&snapshot, self.options.ignore_minor_changes) {
                Ok(Extraction::Content(fingerprint)) => fingerprint,
                Ok(Extraction::Empty) => {
                    warn!(
                        "nothing matched '{}' at {}",
                        self.identity.selector, self.identity.url
                    );
                    let event = AlertEvent::not_found(&self.identity);
                    self.dispatcher.dispatch(&event).await;
                    return CycleOutcome::NotFound;
                }
                Err(e) => return self.fail(e).await,
            };

        let Some(previous) = self.store.load(&self.identity) else {
            info!(
                "first observation of {}, recording baseline {}",
                self.identity.url,
                short(&fingerprint.hash)
            );
            self.persist(&fingerprint);
            return CycleOutcome::InitialState;
        };

        if previous.hash == fingerprint.hash {
            debug!(
                "no change for {} ({})",
                self.identity.url,
                short(&fingerprint.hash)
            );
            return CycleOutcome::NoChange;
        }

        let deltas = fingerprint::describe_changes(&previous.summary, &fingerprint.summary);
        info!(
            "change detected for {}: {} -> {}",
            self.identity.url,
            short(&previous.hash),
            short(&fingerprint.hash)
        );

        self.persist(&fingerprint);
        let event = AlertEvent::changed(
            &self.identity,
            previous.hash.clone(),
            fingerprint.hash.clone(),
            deltas,
        );
        self.dispatcher.dispatch(&event).await;

        CycleOutcome::Changed {
            previous_hash: previous.hash,
            current_hash: fingerprint.hash,
        }
    }

    async fn fail(&mut self, cause: Error) -> CycleOutcome {
        error!("check cycle for {} failed: {cause}", self.identity.url);
        let event = AlertEvent::monitoring_error(&self.identity, cause.to_string());
        self.dispatcher.dispatch(&event).await;
        CycleOutcome::Error
    }

    // A write failure after the comparison has completed is logged, not fatal
    // to the cycle.
    fn persist(&self, fingerprint: &Fingerprint) {
        let record = FingerprintRecord::new(&self.identity, fingerprint);
        if let Err(e) = self.store.save(&self.identity, &record) {
            error!("failed to persist state for {}: {e}", self.identity.url);
        }
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
