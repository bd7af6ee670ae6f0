pub mod alert;
pub mod config;
pub mod detector;
pub mod error;
pub mod fingerprint;
pub mod retry;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use alert::{
    AlertDispatcher, AlertEvent, CallbackChannel, ChannelOutcome, LampChannel,
    NotificationChannel, WebhookChannel,
};
pub use config::Config;
pub use detector::{ChangeDetector, CycleOutcome, DetectorOptions, MonitorPhase, MonitorRunState};
pub use error::Error;
pub use fingerprint::{Extraction, Fingerprint, FingerprintRecord, SnapshotSummary};
pub use retry::RetryPolicy;
pub use scheduler::{MonitorHandle, monitor_resource};
pub use snapshot::{
    ElementCapture, HttpSnapshotFetcher, ResourceIdentity, Snapshot, SnapshotFetcher,
};
pub use store::StateStore;
