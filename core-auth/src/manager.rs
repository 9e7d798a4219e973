//! # Authentication Session Manager
//!
//! Owns the customer's session and drives the OAuth 2.0 PKCE lifecycle.
//!
//! ## Overview
//!
//! The `AuthSessionManager` is the single entry point UI code uses for
//! authentication. It:
//!
//! - Builds the authorization URL for the embedded browser (`login`)
//! - Validates the provider redirect and exchanges the code (`handle_redirect`)
//! - Persists tokens through the host key-value store
//! - Hands out valid access tokens, refreshing transparently
//!   (`get_valid_access_token`)
//! - Signs the customer out locally and at the provider (`logout`)
//! - Emits [`AuthEvent`]s on the runtime event bus
//!
//! ## Concurrency
//!
//! Clones share one session. Token mutations from `handle_redirect`, refresh
//! and `logout` are serialized by an operation lock. Concurrent refresh
//! requests attach to one shared in-flight future, so at most one refresh
//! request is on the wire at a time. Readers always observe a fully written
//! [`TokenSet`].
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::AuthSessionManager;
//! use core_runtime::config::{CoreConfig, CustomerAccountConfig};
//! use core_runtime::events::EventBus;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::builder()
//!     .customer_account(CustomerAccountConfig::from_env()?)
//!     .build()?;
//! let manager = AuthSessionManager::new(&config, EventBus::default());
//!
//! let url = manager.login()?;
//! // Show `url` in the embedded browser; when it lands on the redirect URI:
//! # let final_url = String::new();
//! manager.handle_redirect(&final_url).await?;
//!
//! if let Some(token) = manager.get_valid_access_token().await {
//!     // call the customer account API with `token`
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::oauth::{self, RedirectResponse, TokenClient, TokenGrant};
use crate::pkce::PkceAttempt;
use crate::token_store::TokenStore;
use crate::types::{AuthState, SessionSnapshot, TokenSet};
use bridge_traits::http::HttpRequest;
use bridge_traits::time::Clock;
use core_runtime::config::{CoreConfig, CustomerAccountConfig};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus, SignOutReason};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// The live login attempt and the URL built for it.
struct PendingLogin {
    attempt: PkceAttempt,
    authorization_url: String,
}

/// Clears a flag when dropped, including on cancellation.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    config: CustomerAccountConfig,
    token_client: TokenClient,
    token_store: TokenStore,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    /// Never held across an await.
    session: StdRwLock<TokenSet>,
    /// Never held across an await.
    pending_login: StdMutex<Option<PendingLogin>>,
    exchanging: AtomicBool,
    refresh_in_flight: AtomicBool,
    refresh: Mutex<Option<SharedRefresh>>,
    /// Serializes every read-modify-write of the session.
    operation: Mutex<()>,
}

/// Process-wide customer session.
///
/// Cheap to clone; all clones share the same session.
#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<Inner>,
}

impl AuthSessionManager {
    /// Create a manager and hydrate the session from the persistent store.
    ///
    /// A store that cannot be read is logged and the manager starts logged
    /// out; it never fails construction.
    pub fn new(config: &CoreConfig, event_bus: EventBus) -> Self {
        let token_store = TokenStore::new(Arc::clone(&config.key_value_store));

        let session = match token_store.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Could not hydrate session, starting logged out");
                TokenSet::default()
            }
        };

        info!(
            restored = !session.is_empty(),
            "Authentication session manager initialized"
        );

        Self {
            inner: Arc::new(Inner {
                config: config.customer_account.clone(),
                token_client: TokenClient::new(
                    config.customer_account.clone(),
                    Arc::clone(&config.http_client),
                ),
                token_store,
                clock: Arc::clone(&config.clock),
                event_bus,
                session: StdRwLock::new(session),
                pending_login: StdMutex::new(None),
                exchanging: AtomicBool::new(false),
                refresh_in_flight: AtomicBool::new(false),
                refresh: Mutex::new(None),
                operation: Mutex::new(()),
            }),
        }
    }

    /// Reload the session from the persistent store, replacing memory.
    ///
    /// Returns whether anything was restored.
    ///
    /// # Errors
    ///
    /// `AuthError::Storage` if the store cannot be read; the in-memory session
    /// is left untouched.
    #[instrument(skip(self))]
    pub async fn restore_session(&self) -> Result<bool> {
        let _op = self.inner.operation.lock().await;

        let tokens = self.inner.token_store.load()?;
        let restored = !tokens.is_empty();
        self.inner.replace_session(tokens);

        debug!(restored, "Session restored from store");
        Ok(restored)
    }

    /// Start a login attempt and return the authorization URL.
    ///
    /// Any earlier attempt is discarded, so a late redirect for it will fail
    /// the state check.
    ///
    /// # Errors
    ///
    /// - `AuthError::CryptoUnavailable` if no secure random source exists
    /// - `AuthError::InvalidConfig` if the authorization endpoint is unusable
    #[instrument(skip(self))]
    pub fn login(&self) -> Result<String> {
        let inner = &self.inner;

        let pending = PkceAttempt::generate(inner.clock.unix_timestamp_millis())
            .and_then(|attempt| {
                let url = oauth::build_authorization_url(&inner.config, &attempt)?;
                Ok(PendingLogin {
                    attempt,
                    authorization_url: url,
                })
            })
            .map_err(|e| {
                warn!(error = %e, "Could not start login");
                inner.emit_error(&e);
                e
            })?;

        let url = pending.authorization_url.clone();
        *inner.lock_pending_login() = Some(pending);

        info!("Login attempt started");
        inner.emit(AuthEvent::LoginStarted);
        Ok(url)
    }

    /// Authorization URL of the live attempt, if any.
    pub fn authorization_url(&self) -> Option<String> {
        self.inner
            .lock_pending_login()
            .as_ref()
            .map(|pending| pending.authorization_url.clone())
    }

    /// Complete a login from the URL the embedded browser landed on.
    ///
    /// The live attempt is consumed by this call whatever the outcome, so a
    /// second redirect for the same attempt fails with
    /// `NoPendingAuthAttempt`.
    ///
    /// # Errors
    ///
    /// - `NoPendingAuthAttempt` - no login is in progress (no network call)
    /// - `AuthorizationDenied` - the provider returned `error`
    /// - `MalformedRedirect` - `code` or `state` missing
    /// - `StateMismatch` - `state` differs from the attempt (no network call)
    /// - `TokenExchangeFailed` - the token endpoint rejected the code; the
    ///   session is cleared
    #[instrument(skip(self, incoming_url))]
    pub async fn handle_redirect(&self, incoming_url: &str) -> Result<()> {
        let inner = &self.inner;

        let pending = inner
            .lock_pending_login()
            .take()
            .ok_or(AuthError::NoPendingAuthAttempt)?;

        let _exchanging = FlagGuard::raise(&inner.exchanging);

        let result = inner.complete_login(pending.attempt, incoming_url).await;
        if let Err(e) = &result {
            inner.emit_error(e);
        }
        result
    }

    /// A currently valid access token, refreshing first if needed.
    ///
    /// Returns `None` when there is no session or a refresh failed, in which
    /// case the session has been cleared.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        let inner = &self.inner;

        if let Some(token) = inner.valid_access_token() {
            return Some(token);
        }

        if !inner.read_session().is_recoverable() && !inner.refresh_in_flight() {
            debug!("No access token and no refresh token");
            return None;
        }

        self.join_refresh(false).await
    }

    /// Force a refresh with the stored refresh token.
    ///
    /// Concurrent callers share a single request. On any failure, or with no
    /// refresh token, the session is cleared and `None` is returned.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.join_refresh(true).await
    }

    /// Derived signed-in flag.
    ///
    /// True with an unexpired access token, while a refresh is in flight, or while
    /// a refresh token could restore the session.
    pub fn is_logged_in(&self) -> bool {
        self.inner.is_logged_in()
    }

    /// Current position in the session state machine.
    pub fn auth_state(&self) -> AuthState {
        self.inner.auth_state()
    }

    /// Redacted copy of the session.
    pub fn session(&self) -> SessionSnapshot {
        let inner = &self.inner;
        let tokens = inner.read_session().clone();
        SessionSnapshot::new(&tokens, inner.auth_state(), inner.is_logged_in())
    }

    /// Sign out locally and, best effort, at the provider.
    ///
    /// The provider call is awaited but its outcome never blocks local
    /// cleanup. Safe to call when already signed out.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let inner = &self.inner;
        let _op = inner.operation.lock().await;

        let id_token = inner.read_session().id_token().map(str::to_string);
        match id_token {
            Some(id_token) => {
                if let Err(e) = inner.token_client.logout(&id_token).await {
                    warn!(error = %e, "Provider logout failed, continuing locally");
                }
            }
            None => debug!("No id token, skipping provider logout"),
        }

        inner.clear_session(SignOutReason::UserInitiated);
        info!("Customer signed out");
    }

    /// Abandon the live login attempt without touching tokens.
    ///
    /// Returns whether an attempt was discarded.
    pub fn clear_auth_attempt(&self) -> bool {
        let discarded = self.inner.lock_pending_login().take().is_some();
        if discarded {
            debug!("Login attempt discarded");
            self.inner.emit(AuthEvent::LoginCancelled);
        }
        discarded
    }

    /// Attach a valid bearer token to a customer-account API request.
    ///
    /// # Errors
    ///
    /// `AuthError::NotAuthenticated` when no valid token can be obtained.
    pub async fn authorize(&self, request: HttpRequest) -> Result<HttpRequest> {
        let token = self
            .get_valid_access_token()
            .await
            .ok_or(AuthError::NotAuthenticated)?;
        Ok(request.bearer_token(token))
    }

    async fn join_refresh(&self, force: bool) -> Option<String> {
        let refresh = {
            let mut slot = self.inner.refresh.lock().await;

            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight refresh");
                    in_flight.clone()
                }
                None => {
                    // A refresh may have finished while we waited for the slot
                    if !force {
                        if let Some(token) = self.inner.valid_access_token() {
                            return Some(token);
                        }
                    }

                    let inner = Arc::clone(&self.inner);
                    inner.refresh_in_flight.store(true, Ordering::SeqCst);

                    // Runs to completion even if every caller is dropped
                    let task = tokio::spawn(async move {
                        let token = inner.run_refresh().await;
                        *inner.refresh.lock().await = None;
                        inner.refresh_in_flight.store(false, Ordering::SeqCst);
                        token
                    });

                    let refresh = task
                        .map(|joined| match joined {
                            Ok(token) => token,
                            Err(e) => {
                                warn!(error = %e, "Refresh task did not complete");
                                None
                            }
                        })
                        .boxed()
                        .shared();

                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }
}

impl Inner {
    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, TokenSet> {
        self.session.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace_session(&self, tokens: TokenSet) {
        let mut session = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *session = tokens;
    }

    fn lock_pending_login(&self) -> std::sync::MutexGuard<'_, Option<PendingLogin>> {
        self.pending_login
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn buffer_millis(&self) -> i64 {
        i64::try_from(self.config.refresh_buffer.as_millis()).unwrap_or(i64::MAX)
    }

    fn valid_access_token(&self) -> Option<String> {
        let now = self.clock.unix_timestamp_millis();
        self.read_session()
            .valid_access_token(now, self.buffer_millis())
            .map(str::to_string)
    }

    fn refresh_in_flight(&self) -> bool {
        self.refresh_in_flight.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        let now = self.clock.unix_timestamp_millis();
        let session = self.read_session();
        // Unexpired is enough here; the refresh buffer only gates token hand-out
        session.has_valid_access_token(now, 0)
            || session.is_recoverable()
            || self.refresh_in_flight()
    }

    fn auth_state(&self) -> AuthState {
        if self.exchanging.load(Ordering::SeqCst) {
            AuthState::Exchanging
        } else if self.refresh_in_flight() {
            AuthState::RefreshPending
        } else if self.lock_pending_login().is_some() {
            AuthState::LoginPending
        } else if self.is_logged_in() {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }

    fn emit_error(&self, error: &AuthError) {
        self.emit(AuthEvent::AuthError {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        });
    }

    async fn complete_login(&self, attempt: PkceAttempt, incoming_url: &str) -> Result<()> {
        let (code, state) = match oauth::parse_redirect(incoming_url)? {
            RedirectResponse::Denied { error, description } => {
                warn!(error = %error, "Provider denied authorization");
                return Err(AuthError::AuthorizationDenied { error, description });
            }
            RedirectResponse::Code { code, state } => (code, state),
        };

        if !attempt.matches_state(&state) {
            warn!("Redirect state does not match the login attempt, rejecting");
            return Err(AuthError::StateMismatch);
        }

        let _op = self.operation.lock().await;

        match self
            .token_client
            .exchange_code(&code, attempt.code_verifier())
            .await
        {
            Ok(grant) => {
                let tokens = self.token_set_from_grant(grant, None);
                self.store_session(tokens);
                info!("Customer signed in");
                self.emit(AuthEvent::SignedIn);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Authorization code exchange failed");
                self.clear_session(SignOutReason::ExchangeFailed);
                Err(e)
            }
        }
    }

    async fn run_refresh(&self) -> Option<String> {
        let _op = self.operation.lock().await;

        let refresh_token = self.read_session().refresh_token().map(str::to_string);
        let Some(refresh_token) = refresh_token else {
            warn!("Refresh requested without a refresh token, signing out");
            self.clear_session(SignOutReason::RefreshFailed);
            return None;
        };

        self.emit(AuthEvent::TokenRefreshing);

        match self.token_client.refresh(&refresh_token).await {
            Ok(grant) => {
                let previous = self.read_session().clone();
                let tokens = self.token_set_from_grant(grant, Some(&previous));
                let access_token = tokens.access_token().map(str::to_string);
                let expires_at = tokens.expires_at().unwrap_or_default();

                self.store_session(tokens);
                self.emit(AuthEvent::TokenRefreshed { expires_at });
                access_token
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, signing out");
                self.emit_error(&e);
                self.clear_session(SignOutReason::RefreshFailed);
                None
            }
        }
    }

    /// `expires_at = now + expires_in * 1000`. Missing refresh and id tokens
    /// fall back to `previous`.
    fn token_set_from_grant(&self, grant: TokenGrant, previous: Option<&TokenSet>) -> TokenSet {
        let now = self.clock.unix_timestamp_millis();
        let expires_at = now.saturating_add(grant.expires_in.saturating_mul(1000));

        let refresh_token = grant
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token().map(str::to_string)));
        let id_token = grant
            .id_token
            .or_else(|| previous.and_then(|p| p.id_token().map(str::to_string)));

        TokenSet::new(grant.access_token, refresh_token, id_token, expires_at)
    }

    /// Persist, then publish to memory. A storage failure leaves the session
    /// memory-only.
    fn store_session(&self, tokens: TokenSet) {
        if let Err(e) = self.token_store.save(&tokens) {
            warn!(error = %e, "Session not persisted, continuing in memory");
        }
        self.replace_session(tokens);
    }

    fn clear_session(&self, reason: SignOutReason) {
        if let Err(e) = self.token_store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.replace_session(TokenSet::default());
        self.emit(AuthEvent::SignedOut { reason });
    }
}
