use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::alert::{AlertDispatcher, LampChannel, NotificationChannel, WebhookChannel};
use crate::config::Config;
use crate::detector::{ChangeDetector, DetectorOptions};
use crate::retry::RetryPolicy;
use crate::snapshot::{HttpSnapshotFetcher, ResourceIdentity};
use crate::store::StateStore;

/// Drives a change detector on a fixed interval until the token is cancelled.
///
/// The first check runs immediately. The interval is measured from the start
/// of one check to the start of the next; when a check overruns one or more
/// interval boundaries, the overrun ticks are skipped (and logged), never
/// queued. Cycles run inline on this task, so at most one check is ever
/// active. Cancellation is observed between checks and during the sleep, so
/// an in-flight check always runs to completion.
pub async fn run_poll_loop(
    mut detector: ChangeDetector,
    period: Duration,
    token: CancellationToken,
    checking: Arc<AtomicBool>,
) {
    let period = period.max(Duration::from_millis(1));

    loop {
        if token.is_cancelled() {
            info!("Shutdown requested, stopping monitor");
            break;
        }

        let started = Instant::now();

        // check-and-set around each cycle; `stop()` and `is_checking()` read
        // this to observe an in-flight check
        if checking.swap(true, Ordering::SeqCst) {
            warn!("previous check still running, skipping tick");
        } else {
            let outcome = detector.run_cycle().await;
            checking.store(false, Ordering::SeqCst);
            debug!("check finished: {outcome:?}");
        }

        let elapsed = started.elapsed();
        let mut behind = elapsed;
        let mut skipped = 0u32;
        while behind >= period {
            behind -= period;
            skipped += 1;
        }
        if skipped > 0 {
            warn!(
                "check took {} ms, skipping {skipped} tick(s)",
                elapsed.as_millis()
            );
        }

        // Interruptible sleep until the next interval boundary
        select! {
            () = sleep(period - behind) => {},
            () = token.cancelled() => {
                info!("Shutdown requested during sleep");
                break;
            }
        }
    }

    info!("Monitoring stopped gracefully");
}

/// Handle to a spawned polling loop.
pub struct MonitorHandle {
    token: CancellationToken,
    checking: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Spawns the polling loop. The first check runs immediately.
    pub fn start(detector: ChangeDetector, period: Duration) -> Self {
        let token = CancellationToken::new();
        let checking = Arc::new(AtomicBool::new(false));
        let join = tokio::spawn(run_poll_loop(
            detector,
            period,
            token.clone(),
            Arc::clone(&checking),
        ));
        Self {
            token,
            checking,
            join: Some(join),
        }
    }

    /// Whether a check cycle is currently in flight.
    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::SeqCst)
    }

    /// Cancels the schedule and waits for any in-flight check to finish.
    /// Calling `stop` again after the monitor has stopped is a no-op.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!("monitor task ended abnormally: {e}");
            }
        }
    }
}

/// Continuously monitors the configured resource for content changes.
///
/// This function runs until the token is cancelled, checking the configured
/// target at regular intervals and fanning alerts out to the configured
/// channels when the observed content changes.
///
/// # Behavior
///
/// - Loads configuration from the default config file location
/// - Fingerprints the target content on every check
/// - Persists the fingerprint and compares it across checks
/// - Dispatches alerts for changes, vanished content, and check failures
/// - Sleeps for the configured interval between checks
///
/// # Panics
///
/// Panics if the configuration cannot be loaded or the state directory cannot
/// be created at startup.
pub async fn monitor_resource(token: CancellationToken) {
    let config = Config::load_default().expect("Failed to load configuration");

    // Initial configuration logging
    info!("Starting content monitoring...");
    info!("Watching {} ({})", config.target.url, config.target.selector);
    info!("Check interval: {} ms", config.config.check_interval_ms);
    info!("Timeout: {} ms", config.config.timeout_ms);
    info!(
        "Retries: {} with {} ms base delay",
        config.config.max_retries, config.config.retry_delay_ms
    );

    let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();
    if let Some(url) = &config.config.alert_webhook_url {
        info!("Webhook is set, alerts will be posted on change");
        channels.push(Box::new(WebhookChannel::new(url.clone())));
    }
    if let Some(url) = &config.config.lamp_url {
        info!("Lamp is set, alerts will actuate it as a visual signal");
        channels.push(Box::new(LampChannel::new(url.clone())));
    }
    if channels.is_empty() {
        warn!("No channels are set, changes will only be logged");
    }

    let state_dir = config
        .config
        .state_dir
        .clone()
        .unwrap_or_else(StateStore::default_dir);
    let store = StateStore::new(state_dir).expect("Failed to create state directory");

    let detector = ChangeDetector::new(
        ResourceIdentity::new(config.target.url.clone(), config.target.selector.clone()),
        Arc::new(HttpSnapshotFetcher::new()),
        store,
        AlertDispatcher::new(channels),
        RetryPolicy {
            max_retries: config.config.max_retries,
            base_delay: config.config.retry_delay(),
            attempt_timeout: config.config.timeout(),
        },
        DetectorOptions {
            ignore_minor_changes: config.config.ignore_minor_changes,
            debug: config.config.debug,
        },
    );

    let checking = Arc::new(AtomicBool::new(false));
    run_poll_loop(detector, config.config.check_interval(), token, checking).await;
}
