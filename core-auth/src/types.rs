use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The customer's token set.
///
/// This is the in-memory session. An access token is only ever held together
/// with its absolute expiry (epoch milliseconds).
///
/// # Examples
///
/// ```
/// use core_auth::TokenSet;
///
/// let tokens = TokenSet::new("access", Some("refresh".to_string()), None, 1_000_000);
/// assert!(tokens.has_valid_access_token(900_000, 60_000));
/// assert!(!tokens.has_valid_access_token(940_000, 60_000));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_at: Option<i64>,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            id_token,
            expires_at: Some(expires_at),
        }
    }

    /// Rebuild from persisted parts. An access token without an expiry is
    /// dropped.
    pub(crate) fn from_parts(
        access_token: Option<String>,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_at: Option<i64>,
    ) -> Self {
        let (access_token, expires_at) = match (access_token, expires_at) {
            (Some(token), Some(expiry)) => (Some(token), Some(expiry)),
            _ => (None, None),
        };

        Self {
            access_token,
            refresh_token,
            id_token,
            expires_at,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Access token expiry in Unix epoch milliseconds.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.id_token.is_none()
    }

    /// True while `now < expires_at - buffer`.
    pub fn has_valid_access_token(&self, now_millis: i64, buffer_millis: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now_millis < expires_at.saturating_sub(buffer_millis),
            _ => false,
        }
    }

    /// The access token, if it passes [`has_valid_access_token`](Self::has_valid_access_token).
    pub fn valid_access_token(&self, now_millis: i64, buffer_millis: i64) -> Option<&str> {
        if self.has_valid_access_token(now_millis, buffer_millis) {
            self.access_token()
        } else {
            None
        }
    }

    /// Whether a refresh could restore a usable access token.
    pub fn is_recoverable(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");

        f.debug_struct("TokenSet")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("id_token", &redact(&self.id_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session-level authentication state.
///
/// ```text
/// LoggedOut -> LoginPending -> Exchanging -> LoggedIn <-> RefreshPending
///     ^                                         |              |
///     +-----------------------------------------+--------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthState {
    /// No tokens and no live login attempt.
    LoggedOut,
    /// An authorization URL was built and its attempt is live.
    LoginPending,
    /// A redirect is being exchanged for tokens.
    Exchanging,
    /// Holding a valid access token, or a refresh token that can mint one.
    LoggedIn,
    /// A refresh is in flight.
    RefreshPending,
}

impl AuthState {
    /// Whether the UI should present the customer as signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::LoggedIn | AuthState::RefreshPending)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthState::LoggedOut => "logged out",
            AuthState::LoginPending => "login pending",
            AuthState::Exchanging => "exchanging",
            AuthState::LoggedIn => "logged in",
            AuthState::RefreshPending => "refresh pending",
        };
        f.write_str(label)
    }
}

/// Redacted view of the session, safe to hand to UI code or logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: AuthState,
    pub is_logged_in: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub has_id_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub(crate) fn new(tokens: &TokenSet, state: AuthState, is_logged_in: bool) -> Self {
        Self {
            state,
            is_logged_in,
            has_access_token: tokens.access_token.is_some(),
            has_refresh_token: tokens.refresh_token.is_some(),
            has_id_token: tokens.id_token.is_some(),
            expires_at: tokens
                .expires_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_respects_buffer_boundary() {
        let tokens = TokenSet::new("a", None, None, 100_000);

        assert!(tokens.has_valid_access_token(39_999, 60_000));
        assert!(!tokens.has_valid_access_token(40_000, 60_000));
        assert!(!tokens.has_valid_access_token(200_000, 60_000));
        assert_eq!(tokens.valid_access_token(0, 60_000), Some("a"));
        assert_eq!(tokens.valid_access_token(40_000, 60_000), None);
    }

    #[test]
    fn test_from_parts_drops_access_token_without_expiry() {
        let tokens = TokenSet::from_parts(
            Some("a".to_string()),
            Some("r".to_string()),
            None,
            None,
        );

        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.expires_at(), None);
        assert_eq!(tokens.refresh_token(), Some("r"));
        assert!(tokens.is_recoverable());
    }

    #[test]
    fn test_default_is_empty() {
        let tokens = TokenSet::default();
        assert!(tokens.is_empty());
        assert!(!tokens.has_valid_access_token(0, 0));
        assert!(!tokens.is_recoverable());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = TokenSet::new(
            "access-secret",
            Some("refresh-secret".to_string()),
            Some("id-secret".to_string()),
            42,
        );
        let rendered = format!("{:?}", tokens);

        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("expires_at: Some(42)"));
    }

    #[test]
    fn test_auth_state_authenticated() {
        assert!(AuthState::LoggedIn.is_authenticated());
        assert!(AuthState::RefreshPending.is_authenticated());
        assert!(!AuthState::LoginPending.is_authenticated());
        assert!(!AuthState::Exchanging.is_authenticated());
        assert_eq!(AuthState::LoggedOut.to_string(), "logged out");
    }

    #[test]
    fn test_snapshot_converts_expiry() {
        let tokens = TokenSet::new("a", Some("r".to_string()), None, 1_700_000_000_000);
        let snapshot = SessionSnapshot::new(&tokens, AuthState::LoggedIn, true);

        assert!(snapshot.has_access_token);
        assert!(!snapshot.has_id_token);
        assert_eq!(
            snapshot.expires_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }
}
