/// Sliding-window rate limiting kept in memory (DashMap).
///
/// Suitable for a single instance. Limits come from the `rate_limit`
/// section of the application config and can be swapped at runtime.
///
/// ```rust,ignore
/// use oris::rate_limit::check_login_rate_limit;
///
/// check_login_rate_limit("192.168.1.1", "ana@example.com")?;
/// ```
use crate::app_config;
use crate::error::ServiceError;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global rate limiter instance
pub static RATE_LIMITER: Lazy<Arc<RateLimiter>> = Lazy::new(|| Arc::new(RateLimiter::new()));

static LIMITS: Lazy<ArcSwap<Limits>> = Lazy::new(|| ArcSwap::from_pointee(Limits::default()));

/// Resolved limits, one (max, window) pair per action.
#[derive(Debug, Clone)]
pub struct Limits {
    pub login_max: usize,
    pub login_window: Duration,
    pub registration_max: usize,
    pub registration_window: Duration,
    pub upload_max: usize,
    pub upload_window: Duration,
    pub api_max: usize,
    pub api_window: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from_config(&app_config::RateLimitConfig::default())
    }
}

impl Limits {
    pub fn from_config(config: &app_config::RateLimitConfig) -> Self {
        Self {
            login_max: config.login_max_attempts as usize,
            login_window: Duration::from_secs(config.login_window_seconds as u64),
            registration_max: config.registration_per_hour as usize,
            registration_window: Duration::from_secs(3600),
            upload_max: config.upload_max_requests as usize,
            upload_window: Duration::from_secs(config.upload_window_seconds as u64),
            api_max: config.api_max_requests as usize,
            api_window: Duration::from_secs(config.api_window_seconds as u64),
        }
    }

    fn longest_window(&self) -> Duration {
        [
            self.login_window,
            self.registration_window,
            self.upload_window,
            self.api_window,
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

/// Load limits from the application config (startup and reload).
pub fn init_rate_limits(config: &app_config::RateLimitConfig) {
    LIMITS.store(Arc::new(Limits::from_config(config)));
    log::info!("Rate limit configuration initialized");
}

pub fn get_limits() -> Arc<Limits> {
    LIMITS.load_full()
}

/// Rate limiter using in-memory storage
pub struct RateLimiter {
    /// Map of (action:identifier) -> request timestamps
    requests: DashMap<String, Vec<Instant>>,
}

/// Error returned when rate limit is exceeded
#[derive(Debug, Clone)]
pub struct RateLimitError {
    /// Number of seconds until the rate limit resets
    pub retry_after_seconds: u64,
}

impl From<RateLimitError> for ServiceError {
    fn from(e: RateLimitError) -> Self {
        ServiceError::TooManyRequests(e.retry_after_seconds)
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    /// Records a request for `action`/`identifier` unless `max_requests`
    /// were already seen within `window`.
    pub fn check_rate_limit(
        &self,
        action: &str,
        identifier: &str,
        max_requests: usize,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let key = format!("{}:{}", action, identifier);
        let now = Instant::now();

        let mut entry = self.requests.entry(key).or_default();
        entry.retain(|&timestamp| now.duration_since(timestamp) < window);

        if entry.len() >= max_requests {
            let oldest = entry[0];
            let retry_after = window.saturating_sub(now.duration_since(oldest));
            return Err(RateLimitError {
                retry_after_seconds: retry_after.as_secs() + 1, // Round up
            });
        }

        entry.push(now);
        Ok(())
    }

    /// Drops timestamps older than `max_age` and keys left empty.
    pub fn cleanup_old_entries(&self, max_age: Duration) {
        let now = Instant::now();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.duration_since(t) < max_age);
            !timestamps.is_empty()
        });
    }

    pub fn get_request_count(&self, action: &str, identifier: &str, window: Duration) -> u32 {
        let key = format!("{}:{}", action, identifier);
        let now = Instant::now();

        self.requests.get(&key).map_or(0, |entry| {
            entry
                .iter()
                .filter(|&&timestamp| now.duration_since(timestamp) < window)
                .count() as u32
        })
    }

    pub fn clear_requests(&self, action: &str, identifier: &str) {
        let key = format!("{}:{}", action, identifier);
        self.requests.remove(&key);
    }

    /// Number of tracked keys, for monitoring.
    pub fn tracked_keys_count(&self) -> usize {
        self.requests.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Called from the scheduler tick.
pub fn cleanup() {
    RATE_LIMITER.cleanup_old_entries(get_limits().longest_window());
}

/// Login attempts per IP+email.
pub fn check_login_rate_limit(ip: &str, email: &str) -> Result<(), RateLimitError> {
    let limits = get_limits();
    RATE_LIMITER.check_rate_limit(
        "login",
        &format!("{}:{}", ip, email.to_lowercase()),
        limits.login_max,
        limits.login_window,
    )
}

/// Forget failed attempts after a successful login.
pub fn clear_login_attempts(ip: &str, email: &str) {
    RATE_LIMITER.clear_requests("login", &format!("{}:{}", ip, email.to_lowercase()));
}

/// Registrations per IP.
pub fn check_registration_rate_limit(ip: &str) -> Result<(), RateLimitError> {
    let limits = get_limits();
    RATE_LIMITER.check_rate_limit(
        "register",
        ip,
        limits.registration_max,
        limits.registration_window,
    )
}

/// Uploads per user.
pub fn check_upload_rate_limit(user_id: i32) -> Result<(), RateLimitError> {
    let limits = get_limits();
    RATE_LIMITER.check_rate_limit(
        "upload",
        &user_id.to_string(),
        limits.upload_max,
        limits.upload_window,
    )
}

/// General API calls per IP or user.
pub fn check_api_rate_limit(identifier: &str) -> Result<(), RateLimitError> {
    let limits = get_limits();
    RATE_LIMITER.check_rate_limit("api", identifier, limits.api_max, limits.api_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_allows_up_to_max_then_blocks() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            assert!(limiter.check_rate_limit("test", "user1", 3, window).is_ok());
        }

        let err = limiter
            .check_rate_limit("test", "user1", 3, window)
            .unwrap_err();
        assert!(err.retry_after_seconds > 0 && err.retry_after_seconds <= 61);
        assert_eq!(limiter.get_request_count("test", "user1", window), 3);
    }

    #[test]
    fn test_identifiers_and_actions_are_independent() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        assert!(limiter.check_rate_limit("login", "a", 1, window).is_ok());
        assert!(limiter.check_rate_limit("login", "a", 1, window).is_err());
        assert!(limiter.check_rate_limit("login", "b", 1, window).is_ok());
        assert!(limiter.check_rate_limit("upload", "a", 1, window).is_ok());
    }

    #[test]
    fn test_window_expiry() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(50);

        assert!(limiter.check_rate_limit("test", "user", 1, window).is_ok());
        assert!(limiter.check_rate_limit("test", "user", 1, window).is_err());
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check_rate_limit("test", "user", 1, window).is_ok());
    }

    #[test]
    fn test_cleanup_drops_stale_keys() {
        let limiter = RateLimiter::new();
        limiter
            .check_rate_limit("test", "stale", 5, Duration::from_secs(60))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        limiter.cleanup_old_entries(Duration::from_millis(10));
        assert_eq!(limiter.tracked_keys_count(), 0);
    }

    #[test]
    fn test_clear_requests() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);
        limiter.check_rate_limit("login", "ip:mail", 1, window).unwrap();
        limiter.clear_requests("login", "ip:mail");
        assert!(limiter.check_rate_limit("login", "ip:mail", 1, window).is_ok());
    }

    #[test]
    fn test_limits_follow_config() {
        let config = app_config::RateLimitConfig {
            login_max_attempts: 2,
            login_window_seconds: 10,
            ..Default::default()
        };
        let limits = Limits::from_config(&config);
        assert_eq!(limits.login_max, 2);
        assert_eq!(limits.login_window, Duration::from_secs(10));
        assert_eq!(limits.registration_window, Duration::from_secs(3600));
        assert_eq!(limits.longest_window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_error_maps_to_too_many_requests() {
        let err: ServiceError = RateLimitError { retry_after_seconds: 9 }.into();
        assert!(matches!(err, ServiceError::TooManyRequests(9)));
    }

    #[test]
    #[serial]
    fn test_login_limit_follows_loaded_config() {
        init_rate_limits(&app_config::RateLimitConfig {
            login_max_attempts: 1,
            ..Default::default()
        });
        let (ip, email) = ("10.0.0.7", "Limit.Check@example.com");

        assert!(check_login_rate_limit(ip, email).is_ok());
        assert!(check_login_rate_limit(ip, &email.to_lowercase()).is_err());
        clear_login_attempts(ip, email);
        assert!(check_login_rate_limit(ip, email).is_ok());

        clear_login_attempts(ip, email);
        init_rate_limits(&app_config::RateLimitConfig::default());
    }

    #[test]
    #[serial]
    fn test_api_limit_counts_per_identifier() {
        init_rate_limits(&app_config::RateLimitConfig {
            api_max_requests: 2,
            ..Default::default()
        });

        assert!(check_api_rate_limit("user:9001").is_ok());
        assert!(check_api_rate_limit("user:9001").is_ok());
        assert!(check_api_rate_limit("user:9001").is_err());
        assert!(check_api_rate_limit("user:9002").is_ok());

        init_rate_limits(&app_config::RateLimitConfig::default());
    }
}
