use std::time::Duration;

/// Tunables for the service clients and the status tracker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the analysis server, without a trailing slash.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Total timeout for request/response calls. The push subscription uses
    /// its own client without this bound, since the stream is long-lived.
    pub request_timeout: Duration,
    /// Queue-mode pull fallback interval.
    pub poll_interval: Duration,
    /// Debounce before `executing_queue` locks in its results view. Absorbs
    /// late push events after the last task goes terminal.
    pub queue_settle_delay: Duration,
}

impl EngineConfig {
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            queue_settle_delay: Duration::from_millis(1500),
        }
    }
}
