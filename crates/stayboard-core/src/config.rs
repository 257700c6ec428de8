// ── Runtime configuration ──
//
// These types describe how the core talks to the backend and how its
// background loops are paced. They never touch disk; the CLI builds
// them from the config file and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// Where the hosted backend lives and how to reach it.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project URL (e.g. `https://abc.supabase.co`).
    pub url: Url,
    /// Publishable project key sent with every request.
    pub api_key: SecretString,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Realtime channel tuning.
    pub realtime: RealtimeTuning,
}

/// Timers for a single realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeTuning {
    /// How long to wait for the join acknowledgement.
    pub join_timeout: Duration,
    /// Keepalive cadence.
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeTuning {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// How a live view recovers from a lost subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubscribePolicy {
    /// Pause before re-opening a timed-out or failed channel.
    pub delay: Duration,
    /// Reconnect attempts after an error or close before the view is
    /// marked stale. Join timeouts do not count against this budget.
    pub max_error_retries: u32,
}

impl Default for ResubscribePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_error_retries: 1,
        }
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBackoff {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on the delay. Default: 5 minutes.
    pub max_delay: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryBackoff {
    /// `delay = min(initial * 2^attempt, max)` scaled by +-25% jitter.
    ///
    /// The jitter is seeded from the attempt number, so a given attempt
    /// always waits the same amount.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

/// Pacing for a display terminal.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Liveness ping cadence while displaying. Default: 60s.
    pub heartbeat_interval: Duration,
    /// Full configuration refetch cadence while displaying. Default: 30min.
    pub refresh_interval: Duration,
    /// Automatic retry pacing after a failed fetch.
    pub retry: RetryBackoff,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(30 * 60),
            retry: RetryBackoff::default(),
        }
    }
}

/// Weather cache sizing and lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherCacheConfig {
    /// Lifetime of a successful lookup. Default: 30min.
    pub ttl: Duration,
    /// Lifetime of a cached fallback after a failed lookup. Default: 5min.
    pub failure_ttl: Duration,
    /// Maximum number of `(city, units)` entries kept.
    pub max_entries: usize,
}

impl Default for WeatherCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            failure_ttl: Duration::from_secs(5 * 60),
            max_entries: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_exponentially() {
        let backoff = RetryBackoff::default();
        let d0 = backoff.delay(0);
        let d1 = backoff.delay(1);
        let d2 = backoff.delay(2);

        assert!(d0 <= Duration::from_millis(1250));
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let backoff = RetryBackoff::default();
        let ceiling = Duration::from_secs_f64(300.0 * 1.25);
        assert!(backoff.delay(20) <= ceiling);
        assert!(backoff.delay(u32::MAX) <= ceiling);
    }

    #[test]
    fn defaults_match_documented_values() {
        let terminal = TerminalConfig::default();
        assert_eq!(terminal.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(terminal.refresh_interval, Duration::from_secs(1800));

        let policy = ResubscribePolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.max_error_retries, 1);
    }
}
