use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::error::Error;
use crate::snapshot::ResourceIdentity;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lamp hue convention: 240 signals a confirmed content change, 120 signals
/// that the resource state could not be determined.
const HUE_CHANGED: u16 = 240;
const HUE_INDETERMINATE: u16 = 120;

/// One alert, created once per triggering condition and fanned out to every
/// channel without mutation.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub selector: String,
    pub previous_hash: Option<String>,
    pub current_hash: Option<String>,
    pub deltas: Vec<String>,
}

impl AlertEvent {
    pub fn changed(
        identity: &ResourceIdentity,
        previous_hash: String,
        current_hash: String,
        deltas: Vec<String>,
    ) -> Self {
        Self {
            reason: "content changed".to_string(),
            timestamp: Utc::now(),
            url: identity.url.clone(),
            selector: identity.selector.clone(),
            previous_hash: Some(previous_hash),
            current_hash: Some(current_hash),
            deltas,
        }
    }

    pub fn not_found(identity: &ResourceIdentity) -> Self {
        Self {
            reason: "element not found".to_string(),
            timestamp: Utc::now(),
            url: identity.url.clone(),
            selector: identity.selector.clone(),
            previous_hash: None,
            current_hash: None,
            deltas: Vec::new(),
        }
    }

    /// The failure description rides in `deltas` so every channel renders it.
    pub fn monitoring_error(identity: &ResourceIdentity, detail: String) -> Self {
        Self {
            reason: "monitoring error".to_string(),
            timestamp: Utc::now(),
            url: identity.url.clone(),
            selector: identity.selector.clone(),
            previous_hash: None,
            current_hash: None,
            deltas: vec![detail],
        }
    }

    /// Whether this event reports a confirmed content change, as opposed to a
    /// not-found or error condition.
    pub fn confirmed_change(&self) -> bool {
        self.previous_hash.is_some() && self.current_hash.is_some()
    }
}

/// The delivery capability; each configured channel implements it.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, event: &AlertEvent) -> Result<(), Error>;
}

/// POSTs the alert event as JSON to a configured endpoint.
pub struct WebhookChannel {
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), Error> {
        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Actuates a smart lamp as a visual alert signal, keying the hue to whether
/// the change was confirmed.
pub struct LampChannel {
    url: String,
}

impl LampChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl NotificationChannel for LampChannel {
    fn name(&self) -> &str {
        "lamp"
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), Error> {
        let hue = if event.confirmed_change() {
            HUE_CHANGED
        } else {
            HUE_INDETERMINATE
        };

        let client = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        client
            .put(&self.url)
            .json(&json!({ "on": true, "hue": hue }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Operator-supplied callback, treated like any other channel.
pub struct CallbackChannel {
    name: String,
    callback: Box<dyn Fn(&AlertEvent) -> Result<(), String> + Send + Sync>,
}

impl CallbackChannel {
    pub fn new(
        name: impl Into<String>,
        callback: impl Fn(&AlertEvent) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl NotificationChannel for CallbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, event: &AlertEvent) -> Result<(), Error> {
        (self.callback)(event).map_err(Error::Callback)
    }
}

/// Per-channel result of one dispatch.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: String,
    pub result: Result<(), Error>,
}

impl ChannelOutcome {
    pub fn delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fans one alert event out to every configured channel. Channel failures are
/// isolated: each one is caught and logged, and never prevents delivery to
/// the others. `dispatch` itself never fails.
pub struct AlertDispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn dispatch(&self, event: &AlertEvent) -> Vec<ChannelOutcome> {
        let mut outcomes = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let result = channel
                .deliver(event)
                .await
                .map_err(|cause| Error::Delivery {
                    channel: channel.name().to_string(),
                    cause: Box::new(cause),
                });

            match &result {
                Ok(()) => info!("alert '{}' delivered via {}", event.reason, channel.name()),
                Err(e) => error!("{e}"),
            }

            outcomes.push(ChannelOutcome {
                channel: channel.name().to_string(),
                result,
            });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn identity() -> ResourceIdentity {
        ResourceIdentity::new("https://example.com", "#price")
    }

    fn collecting_channel(
        name: &str,
        sink: Arc<Mutex<Vec<AlertEvent>>>,
    ) -> Box<dyn NotificationChannel> {
        Box::new(CallbackChannel::new(name, move |event: &AlertEvent| {
            sink.lock().expect("poisoned").push(event.clone());
            Ok(())
        }))
    }

    fn failing_channel(name: &str) -> Box<dyn NotificationChannel> {
        Box::new(CallbackChannel::new(name, |_: &AlertEvent| {
            Err("channel is broken".to_string())
        }))
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::new(vec![
            failing_channel("broken"),
            collecting_channel("working", Arc::clone(&delivered)),
        ]);

        let event = AlertEvent::changed(
            &identity(),
            "aaa".to_string(),
            "bbb".to_string(),
            vec!["text content changed".to_string()],
        );
        let outcomes = dispatcher.dispatch(&event).await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].delivered());
        assert!(outcomes[1].delivered());
        assert_eq!(delivered.lock().expect("poisoned").len(), 1);

        // the failure is wrapped with the channel it came from
        match &outcomes[0].result {
            Err(Error::Delivery { channel, .. }) => assert_eq!(channel, "broken"),
            other => panic!("expected delivery failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_event_reaches_the_working_channel() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::new(vec![
            failing_channel("broken"),
            collecting_channel("working", Arc::clone(&delivered)),
        ]);

        for _ in 0..3 {
            let outcomes = dispatcher.dispatch(&AlertEvent::not_found(&identity())).await;
            assert!(outcomes[1].delivered());
        }

        assert_eq!(delivered.lock().expect("poisoned").len(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_with_no_channels_is_a_noop() {
        let dispatcher = AlertDispatcher::new(Vec::new());
        let outcomes = dispatcher.dispatch(&AlertEvent::not_found(&identity())).await;
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_event_kinds_carry_expected_fields() {
        let changed = AlertEvent::changed(
            &identity(),
            "aaa".to_string(),
            "bbb".to_string(),
            vec!["element count changed from 1 to 2".to_string()],
        );
        assert!(changed.confirmed_change());
        assert_eq!(changed.reason, "content changed");
        assert_eq!(changed.previous_hash.as_deref(), Some("aaa"));
        assert_eq!(changed.current_hash.as_deref(), Some("bbb"));

        let not_found = AlertEvent::not_found(&identity());
        assert!(!not_found.confirmed_change());
        assert_eq!(not_found.reason, "element not found");
        assert!(not_found.previous_hash.is_none());

        let failed = AlertEvent::monitoring_error(&identity(), "boom".to_string());
        assert!(!failed.confirmed_change());
        assert_eq!(failed.reason, "monitoring error");
        assert_eq!(failed.deltas, vec!["boom".to_string()]);
    }
}
