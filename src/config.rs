use std::env;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Process inside the create handler.
    Inline,
    /// Hand request ids to the background worker.
    Queued,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub request_max_bytes: usize,
    pub rate_limit_max_requests: u64,
    pub rate_limit_window_secs: u64,
    pub lockout_max_attempts: u64,
    pub lockout_window_secs: u64,
    pub processing_mode: ProcessingMode,
    pub queue_capacity: usize,
    pub require_platform_credentials: bool,
    pub idempotency_ttl_secs: u64,
    pub publisher: PublisherSettings,
}

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub failure_rate: f64,
    pub delay_ms: u64,
    pub seed: Option<u64>,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            failure_rate: 0.05,
            delay_ms: 250,
            seed: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            request_max_bytes: 256 * 1024,
            rate_limit_max_requests: 60,
            rate_limit_window_secs: 60,
            lockout_max_attempts: 5,
            lockout_window_secs: 900,
            processing_mode: ProcessingMode::Inline,
            queue_capacity: 64,
            require_platform_credentials: true,
            idempotency_ttl_secs: 3600,
            publisher: PublisherSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let processing_mode = match env::var("PROCESSING_MODE") {
            Ok(value) => match value.trim().to_lowercase().as_str() {
                "queued" | "queue" => ProcessingMode::Queued,
                "inline" | "" => ProcessingMode::Inline,
                other => {
                    warn!(target = "crosslist.api", mode = other, "unknown PROCESSING_MODE; using inline");
                    ProcessingMode::Inline
                }
            },
            Err(_) => defaults.processing_mode,
        };
        Self {
            port: parse_env("PORT").unwrap_or(defaults.port),
            request_max_bytes: parse_env::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.request_max_bytes),
            rate_limit_max_requests: parse_env::<u64>("RATE_LIMIT_MAX_REQUESTS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.rate_limit_max_requests),
            rate_limit_window_secs: parse_env::<u64>("RATE_LIMIT_WINDOW_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.rate_limit_window_secs),
            lockout_max_attempts: parse_env::<u64>("LOCKOUT_MAX_ATTEMPTS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.lockout_max_attempts),
            lockout_window_secs: parse_env::<u64>("LOCKOUT_WINDOW_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.lockout_window_secs),
            processing_mode,
            queue_capacity: parse_env::<usize>("QUEUE_CAPACITY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.queue_capacity),
            require_platform_credentials: flag_env(
                "REQUIRE_PLATFORM_CREDENTIALS",
                defaults.require_platform_credentials,
            ),
            idempotency_ttl_secs: parse_env::<u64>("IDEMPOTENCY_TTL_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.idempotency_ttl_secs),
            publisher: PublisherSettings {
                failure_rate: parse_env::<f64>("SIMULATED_FAILURE_RATE")
                    .filter(|v| v.is_finite())
                    .map(|v| v.clamp(0.0, 1.0))
                    .unwrap_or(defaults.publisher.failure_rate),
                delay_ms: parse_env("SIMULATED_PUBLISH_DELAY_MS")
                    .unwrap_or(defaults.publisher.delay_ms),
                seed: parse_env("SIMULATED_SEED"),
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean env flag; unset or unrecognised values keep `default`.
fn flag_env(key: &str, default: bool) -> bool {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    parse_bool(&raw).unwrap_or_else(|| {
        warn!(target = "crosslist.api", key, value = %raw, default, "unrecognised boolean; using default");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("ture"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn misspelled_credential_flag_keeps_the_check_on() {
        // SAFETY: no other test reads this variable.
        unsafe { env::set_var("CROSSLIST_TEST_FLAG_TYPO", "ture") };
        assert!(flag_env("CROSSLIST_TEST_FLAG_TYPO", true));
        unsafe { env::set_var("CROSSLIST_TEST_FLAG_TYPO", "false") };
        assert!(!flag_env("CROSSLIST_TEST_FLAG_TYPO", true));
        unsafe { env::remove_var("CROSSLIST_TEST_FLAG_TYPO") };
        assert!(flag_env("CROSSLIST_TEST_FLAG_TYPO", true));
    }

    #[test]
    fn defaults_are_inline_with_credentials_required() {
        let config = AppConfig::default();
        assert_eq!(config.processing_mode, ProcessingMode::Inline);
        assert!(config.require_platform_credentials);
        assert_eq!(config.publisher.failure_rate, 0.05);
    }
}
