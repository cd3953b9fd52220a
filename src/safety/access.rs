//! Who may trigger an announcement, and how often.
//!
//! Two checks, applied in order:
//! - a role allow-list (role ids or role names; an empty list admits everyone)
//! - a per-user sliding-window rate limit

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{AccessError, ConfigError};

/// At most `max` invocations per user within `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }
}

impl FromStr for RateLimit {
    type Err = ConfigError;

    /// Parses `<max>/<window_secs>`, e.g. `3/60`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "rate limit".to_string(),
            message: format!("'{}': {}", s, message),
        };

        let (max, window) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <max>/<window_secs>"))?;
        let max: u32 = max
            .trim()
            .parse()
            .map_err(|_| invalid("max must be a positive integer"))?;
        let window: u64 = window
            .trim()
            .parse()
            .map_err(|_| invalid("window must be a number of seconds"))?;
        if max == 0 || window == 0 {
            return Err(invalid("max and window must both be greater than zero"));
        }
        Ok(Self::new(max, Duration::from_secs(window)))
    }
}

/// The user invoking a command, with the roles they hold in the guild.
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
    pub role_names: Vec<String>,
}

impl Invoker {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn with_role(mut self, id: u64, name: impl Into<String>) -> Self {
        self.role_ids.push(id);
        self.role_names.push(name.into());
        self
    }
}

/// Access policy for the announce command.
#[derive(Debug, Default)]
pub struct AccessPolicy {
    allowed_roles: Vec<String>,
    rate_limit: Option<RateLimit>,
    history: Mutex<HashMap<u64, VecDeque<Instant>>>,
}

impl AccessPolicy {
    /// A policy that admits everyone without limit.
    pub fn open() -> Self {
        Self::default()
    }

    /// Restrict to holders of any of these roles (ids or names).
    pub fn with_allowed_roles(mut self, roles: Vec<String>) -> Self {
        self.allowed_roles = roles
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    pub fn with_rate_limit(mut self, limit: Option<RateLimit>) -> Self {
        self.rate_limit = limit;
        self
    }

    pub fn allowed_roles(&self) -> &[String] {
        &self.allowed_roles
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    /// Whether the invoker holds an allowed role. Role names compare
    /// case-insensitively.
    pub fn is_allowed(&self, invoker: &Invoker) -> bool {
        if self.allowed_roles.is_empty() {
            return true;
        }
        self.allowed_roles.iter().any(|allowed| {
            allowed
                .parse::<u64>()
                .is_ok_and(|id| invoker.role_ids.contains(&id))
                || invoker
                    .role_names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(allowed))
        })
    }

    /// Check the allow-list, then record the invocation against the rate
    /// limit. Denied invocations are not recorded.
    pub async fn check(&self, invoker: &Invoker) -> Result<(), AccessError> {
        self.check_at(invoker, Instant::now()).await
    }

    async fn check_at(&self, invoker: &Invoker, now: Instant) -> Result<(), AccessError> {
        if !self.is_allowed(invoker) {
            tracing::info!(user_id = invoker.user_id, "Announce denied: missing allowed role");
            return Err(AccessError::Unauthorized {
                user_id: invoker.user_id,
            });
        }

        let Some(limit) = self.rate_limit else {
            return Ok(());
        };

        let mut history = self.history.lock().await;
        // Drop invocations that fell out of the window, and users left with none
        history.retain(|_, calls| {
            while calls
                .front()
                .is_some_and(|&at| now.saturating_duration_since(at) >= limit.window)
            {
                calls.pop_front();
            }
            !calls.is_empty()
        });
        let calls = history.entry(invoker.user_id).or_default();

        if calls.len() >= limit.max as usize {
            let retry_after = calls
                .front()
                .map(|&oldest| limit.window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or(limit.window);
            tracing::info!(
                user_id = invoker.user_id,
                retry_after_secs = retry_after.as_secs(),
                "Announce denied: rate limited"
            );
            return Err(AccessError::RateLimited {
                user_id: invoker.user_id,
                retry_after,
            });
        }

        calls.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_rate_limit() {
        assert_eq!(
            "3/60".parse::<RateLimit>().unwrap(),
            RateLimit::new(3, Duration::from_secs(60))
        );
        assert_eq!(
            " 1 / 5 ".parse::<RateLimit>().unwrap(),
            RateLimit::new(1, Duration::from_secs(5))
        );
        assert!("3".parse::<RateLimit>().is_err());
        assert!("x/60".parse::<RateLimit>().is_err());
        assert!("0/60".parse::<RateLimit>().is_err());
        assert!("3/0".parse::<RateLimit>().is_err());
    }

    #[tokio::test]
    async fn test_open_policy_admits_everyone() {
        let policy = AccessPolicy::open();
        for _ in 0..10 {
            policy.check(&Invoker::new(1)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_role_allow_list_by_id_and_name() {
        let policy =
            AccessPolicy::open().with_allowed_roles(vec!["555".to_string(), "Moderators".to_string()]);

        assert!(policy.is_allowed(&Invoker::new(1).with_role(555, "Staff")));
        assert!(policy.is_allowed(&Invoker::new(2).with_role(7, "moderators")));
        assert!(!policy.is_allowed(&Invoker::new(3).with_role(7, "Members")));

        match policy.check(&Invoker::new(3)).await.unwrap_err() {
            AccessError::Unauthorized { user_id } => assert_eq!(user_id, 3),
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_roles_are_ignored() {
        let policy = AccessPolicy::open().with_allowed_roles(vec![" ".to_string(), String::new()]);
        assert!(policy.allowed_roles().is_empty());
        assert!(policy.is_allowed(&Invoker::new(1)));
    }

    #[tokio::test]
    async fn test_sliding_window() {
        let policy = AccessPolicy::open()
            .with_rate_limit(Some(RateLimit::new(2, Duration::from_secs(60))));
        let user = Invoker::new(42);
        let start = Instant::now();

        policy.check_at(&user, start).await.unwrap();
        policy
            .check_at(&user, start + Duration::from_secs(10))
            .await
            .unwrap();

        match policy
            .check_at(&user, start + Duration::from_secs(20))
            .await
            .unwrap_err()
        {
            AccessError::RateLimited { user_id, retry_after } => {
                assert_eq!(user_id, 42);
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }

        // The first call ages out of the window
        policy
            .check_at(&user, start + Duration::from_secs(61))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_limits_are_per_user() {
        let policy = AccessPolicy::open()
            .with_rate_limit(Some(RateLimit::new(1, Duration::from_secs(60))));
        policy.check(&Invoker::new(1)).await.unwrap();
        policy.check(&Invoker::new(2)).await.unwrap();
        assert!(policy.check(&Invoker::new(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_unauthorized_calls_do_not_consume_quota() {
        let policy = AccessPolicy::open()
            .with_allowed_roles(vec!["Staff".to_string()])
            .with_rate_limit(Some(RateLimit::new(1, Duration::from_secs(60))));

        assert!(policy.check(&Invoker::new(9)).await.is_err());
        policy
            .check(&Invoker::new(9).with_role(1, "Staff"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_users_are_forgotten() {
        let policy = AccessPolicy::open()
            .with_rate_limit(Some(RateLimit::new(1, Duration::from_secs(60))));
        let start = Instant::now();
        for user_id in 1..=5 {
            policy.check_at(&Invoker::new(user_id), start).await.unwrap();
        }
        assert_eq!(policy.history.lock().await.len(), 5);

        policy
            .check_at(&Invoker::new(6), start + Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(policy.history.lock().await.len(), 6);

        policy
            .check_at(&Invoker::new(6), start + Duration::from_secs(91))
            .await
            .unwrap();
        assert_eq!(policy.history.lock().await.len(), 1);
        policy
            .check_at(&Invoker::new(1), start + Duration::from_secs(91))
            .await
            .unwrap();
    }
}
