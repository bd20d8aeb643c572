//! 재시도 정책 - per-item retry policy and state
//!
//! Backoff is linear (`base × n`). Three independent budgets apply to one
//! item fetch:
//! - `attempt`: HTTP attempts, consumed by retryable statuses and non-JSON bodies
//! - `non_json_attempts`: 2xx responses that were not JSON
//! - `cooldowns`: redirects to a maintenance/login/challenge page
//!
//! Pacing, backoff and cooldown waits all go through [`Pacer`] so tests can
//! record them instead of sleeping.

use async_trait::async_trait;
use std::time::Duration;

use crate::infrastructure::config::FetchConfig;

/// Why the fetcher is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseKind {
    /// Random delay before every attempt
    Pacing,
    /// Backoff after a retryable status
    Backoff,
    /// Backoff after a 2xx that was not JSON
    NonJsonBackoff,
    /// Cooldown after a block/maintenance redirect
    RateLimitCooldown,
    /// Pause between two batches
    BatchDelay,
}

/// Sleeps on behalf of the crawler
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, kind: PauseKind, duration: Duration);
}

/// Pacer backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, _kind: PauseKind, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Retry policy for one item fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_non_json_attempts: u32,
    pub base_delay: Duration,
    pub retryable_statuses: Vec<u16>,
    pub rate_limit_cooldown: Duration,
    pub max_rate_limit_cooldowns: u32,
    pub block_redirect_markers: Vec<String>,
    pub pacing_min: Duration,
    pub pacing_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        let (pacing_min, pacing_max) = config.pacing_range();
        Self {
            max_attempts: config.max_attempts,
            max_non_json_attempts: config.max_non_json_attempts,
            base_delay: config.base_delay(),
            retryable_statuses: config.retryable_statuses.clone(),
            rate_limit_cooldown: config.rate_limit_cooldown(),
            max_rate_limit_cooldowns: config.max_rate_limit_cooldowns,
            block_redirect_markers: config
                .block_redirect_markers
                .iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            pacing_min,
            pacing_max,
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// A redirect whose Location points at a maintenance, login or challenge page.
    /// Markers are stored lowercased, the Location is compared case-insensitively.
    pub fn is_block_redirect(&self, location: Option<&str>) -> bool {
        location.is_some_and(|loc| {
            let loc = loc.to_lowercase();
            self.block_redirect_markers.iter().any(|m| loc.contains(m.as_str()))
        })
    }

    /// Uniform random delay in `[pacing_min, pacing_max]`
    pub fn pacing_delay(&self) -> Duration {
        if self.pacing_max <= self.pacing_min {
            return self.pacing_min;
        }
        let spread = self.pacing_max - self.pacing_min;
        self.pacing_min + spread.mul_f64(fastrand::f64())
    }
}

/// What the fetcher does next after a non-terminal response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then issue another request
    RetryAfter { kind: PauseKind, delay: Duration },
    /// Budget exhausted
    GiveUp,
}

/// Mutable per-item counters, owned by exactly one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Current attempt, 1-based
    pub attempt: u32,
    pub non_json_attempts: u32,
    pub cooldowns: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub const fn new() -> Self {
        Self {
            attempt: 1,
            non_json_attempts: 0,
            cooldowns: 0,
        }
    }

    /// True while another HTTP attempt is allowed
    pub const fn has_attempts_left(&self, policy: &RetryPolicy) -> bool {
        self.attempt <= policy.max_attempts
    }

    /// Retryable status seen on the current attempt.
    ///
    /// Retries only if this is not the last attempt; the delay is
    /// `base × attempt` and the attempt counter advances.
    pub fn on_retryable_status(&mut self, policy: &RetryPolicy) -> RetryDecision {
        if self.attempt >= policy.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = policy.base_delay * self.attempt;
        self.attempt += 1;
        RetryDecision::RetryAfter {
            kind: PauseKind::Backoff,
            delay,
        }
    }

    /// 2xx response that was not JSON.
    ///
    /// The delay is `base × non_json_attempts`. The attempt counter also
    /// advances, so a run of HTML bodies can end in `max_attempts_exceeded`.
    pub fn on_non_json(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.non_json_attempts += 1;
        if self.non_json_attempts > policy.max_non_json_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = policy.base_delay * self.non_json_attempts;
        self.attempt += 1;
        RetryDecision::RetryAfter {
            kind: PauseKind::NonJsonBackoff,
            delay,
        }
    }

    /// Redirect to a block page. Retries the same attempt slot after the cooldown.
    pub fn on_block_redirect(&mut self, policy: &RetryPolicy) -> RetryDecision {
        self.cooldowns += 1;
        if self.cooldowns > policy.max_rate_limit_cooldowns {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter {
            kind: PauseKind::RateLimitCooldown,
            delay: policy.rate_limit_cooldown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            max_non_json_attempts: 2,
            base_delay: Duration::from_millis(100),
            retryable_statuses: vec![429, 500, 502, 503, 504, 302],
            rate_limit_cooldown: Duration::from_secs(30),
            max_rate_limit_cooldowns: 2,
            block_redirect_markers: vec!["maintenance".into(), "login".into(), "challenge".into()],
            pacing_min: Duration::from_millis(1000),
            pacing_max: Duration::from_millis(2000),
        }
    }

    #[rstest]
    #[case(429, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(504, true)]
    #[case(302, true)]
    #[case(404, false)]
    #[case(403, false)]
    #[case(301, false)]
    fn retryable_statuses(#[case] status: u16, #[case] retryable: bool) {
        assert_eq!(policy().is_retryable_status(status), retryable);
    }

    #[rstest]
    #[case(Some("https://tiki.vn/maintenance?from=api"), true)]
    #[case(Some("https://tiki.vn/customer/LOGIN"), true)]
    #[case(Some("/challenge/captcha"), true)]
    #[case(Some("https://tiki.vn/p/123"), false)]
    #[case(None, false)]
    fn block_redirects(#[case] location: Option<&str>, #[case] blocked: bool) {
        assert_eq!(policy().is_block_redirect(location), blocked);
    }

    #[test]
    fn configured_markers_match_case_insensitively() {
        let config = FetchConfig {
            block_redirect_markers: vec!["Login".into(), "CAPTCHA".into(), String::new()],
            ..FetchConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.block_redirect_markers, vec!["login", "captcha"]);
        assert!(policy.is_block_redirect(Some("https://tiki.vn/customer/login")));
        assert!(policy.is_block_redirect(Some("https://tiki.vn/Captcha?next=/p/1")));
        assert!(!policy.is_block_redirect(Some("https://tiki.vn/p/1")));
    }

    #[test]
    fn linear_backoff_until_last_attempt() {
        let policy = policy();
        let mut state = RetryState::new();

        assert_eq!(
            state.on_retryable_status(&policy),
            RetryDecision::RetryAfter { kind: PauseKind::Backoff, delay: Duration::from_millis(100) }
        );
        assert_eq!(
            state.on_retryable_status(&policy),
            RetryDecision::RetryAfter { kind: PauseKind::Backoff, delay: Duration::from_millis(200) }
        );
        assert_eq!(state.attempt, 3);
        assert_eq!(state.on_retryable_status(&policy), RetryDecision::GiveUp);
    }

    #[test]
    fn non_json_budget_is_separate_but_consumes_attempts() {
        let policy = policy();
        let mut state = RetryState::new();

        assert_eq!(
            state.on_non_json(&policy),
            RetryDecision::RetryAfter { kind: PauseKind::NonJsonBackoff, delay: Duration::from_millis(100) }
        );
        assert_eq!(
            state.on_non_json(&policy),
            RetryDecision::RetryAfter { kind: PauseKind::NonJsonBackoff, delay: Duration::from_millis(200) }
        );
        assert_eq!(state.attempt, 3);
        assert_eq!(state.on_non_json(&policy), RetryDecision::GiveUp);
    }

    #[test]
    fn cooldowns_do_not_consume_attempts() {
        let policy = policy();
        let mut state = RetryState::new();

        for _ in 0..2 {
            assert_eq!(
                state.on_block_redirect(&policy),
                RetryDecision::RetryAfter {
                    kind: PauseKind::RateLimitCooldown,
                    delay: Duration::from_secs(30)
                }
            );
        }
        assert_eq!(state.attempt, 1);
        assert_eq!(state.on_block_redirect(&policy), RetryDecision::GiveUp);
    }

    #[test]
    fn pacing_delay_stays_in_range() {
        let policy = policy();
        for _ in 0..200 {
            let delay = policy.pacing_delay();
            assert!(delay >= policy.pacing_min && delay <= policy.pacing_max);
        }

        let fixed = RetryPolicy {
            pacing_min: Duration::ZERO,
            pacing_max: Duration::ZERO,
            ..policy
        };
        assert_eq!(fixed.pacing_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn tokio_pacer_skips_zero_waits() {
        TokioPacer.pause(PauseKind::Pacing, Duration::ZERO).await;
    }
}
