//! Centralized configuration for netretry.
//!
//! Constants live on unit structs; tunable behaviour is carried by plain
//! config structs with builder-style setters.

use crate::error::{NetRetryError, Result};
use rand::Rng;
use std::time::Duration;

/// Network-related constants.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
    /// Endpoint answering `204 No Content` when the internet is reachable.
    pub const WALLED_GARDEN_URL: &'static str = "https://clients3.google.com/generate_204";
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
    pub const PROBE_INTERVAL: Duration = Duration::from_secs(2);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = concat!("netretry/", env!("CARGO_PKG_VERSION"));
}

/// Configuration for the network retry controller.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of producer invocations before giving up.
    pub max_attempts: u32,
    /// Require a successful reachability probe, not just a network link.
    pub check_internet: bool,
    /// Wait for the network before the very first invocation too.
    pub check_before_first_attempt: bool,
    /// Optional delay between connectivity returning and re-invoking.
    pub backoff: Option<Backoff>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RECONNECT_ATTEMPTS,
            check_internet: true,
            check_before_first_attempt: false,
            backoff: None,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Enable or disable the internet reachability check.
    pub fn with_check_internet(mut self, check: bool) -> Self {
        self.check_internet = check;
        self
    }

    /// Wait for connectivity before the first invocation.
    pub fn with_check_before_first_attempt(mut self, check: bool) -> Self {
        self.check_before_first_attempt = check;
        self
    }

    /// Sleep a backoff delay after connectivity is restored.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(NetRetryError::validation(
                "max_attempts",
                "must be at least 1",
            ));
        }
        if let Some(backoff) = &self.backoff {
            backoff.validate()?;
        }
        Ok(())
    }
}

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (1-indexed, as reported
    /// by the retry controller).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = self.exponential_base.powi(exponent);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Factor between 0.5 and 1.5 keeps the mean delay and never
            // collapses to zero.
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.exponential_base < 1.0 || !self.exponential_base.is_finite() {
            return Err(NetRetryError::validation(
                "backoff.exponential_base",
                "must be a finite number >= 1.0",
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(NetRetryError::validation(
                "backoff.base_delay",
                "must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// How an HTTP reachability probe decides the internet is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// GET a URL that answers `204 No Content` outside a captive portal.
    WalledGarden { url: String },
    /// HEAD each URL in order; any success, redirect or 403 counts.
    Head { urls: Vec<String> },
}

impl ProbeStrategy {
    pub fn urls(&self) -> Vec<&str> {
        match self {
            ProbeStrategy::WalledGarden { url } => vec![url.as_str()],
            ProbeStrategy::Head { urls } => urls.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for ProbeStrategy {
    fn default() -> Self {
        ProbeStrategy::WalledGarden {
            url: NetworkConfig::WALLED_GARDEN_URL.to_string(),
        }
    }
}

/// Configuration for internet reachability probing.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub strategy: ProbeStrategy,
    /// Timeout for a single probe request.
    pub timeout: Duration,
    /// Time between probes while reachability is being observed.
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            strategy: ProbeStrategy::default(),
            timeout: NetworkConfig::PROBE_TIMEOUT,
            interval: NetworkConfig::PROBE_INTERVAL,
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Check that every probe URL parses and uses http(s), and that the
    /// timings are non-zero.
    pub fn validate(&self) -> Result<()> {
        let urls = self.strategy.urls();
        if urls.is_empty() {
            return Err(NetRetryError::validation(
                "probe.strategy",
                "at least one probe URL is required",
            ));
        }
        for raw in urls {
            let parsed = url::Url::parse(raw).map_err(|e| {
                NetRetryError::validation("probe.url", format!("{}: {}", raw, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(NetRetryError::validation(
                    "probe.url",
                    format!("{}: unsupported scheme {}", raw, parsed.scheme()),
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err(NetRetryError::validation("probe.timeout", "must be non-zero"));
        }
        if self.interval.is_zero() {
            return Err(NetRetryError::validation("probe.interval", "must be non-zero"));
        }
        Ok(())
    }
}
