//! OAuth 2.0 Authorization Code Flow with PKCE
//!
//! Implements the wire side of RFC 6749 and RFC 7636 for the customer-account
//! provider:
//! - Building the authorization URL
//! - Parsing the provider redirect
//! - Exchanging codes and refresh tokens at the token endpoint
//! - Best-effort logout at the provider
//!
//! # Security
//!
//! - The raw verifier only ever leaves the device in the token request body
//! - Codes, verifiers and tokens are never logged
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{build_authorization_url, parse_redirect, RedirectResponse};
//! use core_auth::pkce::PkceAttempt;
//! use core_runtime::config::CustomerAccountConfig;
//!
//! # fn example() -> core_auth::Result<()> {
//! let config = CustomerAccountConfig::for_authentication_base(
//!     "https://shop.example.com/authentication/42",
//!     "client-id",
//!     "shop.42.app://callback",
//! );
//! let attempt = PkceAttempt::generate(1_700_000_000_000)?;
//! let url = build_authorization_url(&config, &attempt)?;
//! // Render `url` in the embedded browser, then:
//! match parse_redirect("shop.42.app://callback?code=abc&state=xyz")? {
//!     RedirectResponse::Code { code, state } => { /* exchange */ }
//!     RedirectResponse::Denied { .. } => { /* surface to the customer */ }
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::pkce::PkceAttempt;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::CustomerAccountConfig;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// `error` code used when the token endpoint answered with something that is
/// not a usable token response.
pub const INVALID_RESPONSE: &str = "invalid_response";

/// `error` code used when the token request never got an answer.
pub const REQUEST_FAILED: &str = "request_failed";

/// Build the authorization endpoint URL for `attempt`.
///
/// Pure construction: `client_id`, `scope`, `response_type=code`,
/// `redirect_uri`, `state`, `code_challenge` and `code_challenge_method=S256`
/// are appended to the configured endpoint, form-encoded.
pub fn build_authorization_url(
    config: &CustomerAccountConfig,
    attempt: &PkceAttempt,
) -> Result<String> {
    let mut url = Url::parse(&config.authorization_endpoint).map_err(|e| {
        AuthError::InvalidConfig(format!("Invalid authorization endpoint: {}", e))
    })?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("scope", &config.scope_string())
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("state", attempt.state())
        .append_pair("code_challenge", attempt.code_challenge())
        .append_pair("code_challenge_method", "S256");

    Ok(url.into())
}

/// Build the provider logout URL carrying `id_token_hint`.
pub fn build_logout_url(config: &CustomerAccountConfig, id_token: &str) -> Result<String> {
    let mut url = Url::parse(&config.logout_endpoint)
        .map_err(|e| AuthError::InvalidConfig(format!("Invalid logout endpoint: {}", e)))?;

    url.query_pairs_mut().append_pair("id_token_hint", id_token);

    Ok(url.into())
}

/// What the provider sent back to the redirect URI.
#[derive(Clone, PartialEq, Eq)]
pub enum RedirectResponse {
    /// The customer approved; `code` is single-use.
    Code { code: String, state: String },
    /// The provider reported `error` (and optionally `error_description`).
    Denied {
        error: String,
        description: Option<String>,
    },
}

impl fmt::Debug for RedirectResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectResponse::Code { state, .. } => f
                .debug_struct("Code")
                .field("code", &"[REDACTED]")
                .field("state", state)
                .finish(),
            RedirectResponse::Denied { error, description } => f
                .debug_struct("Denied")
                .field("error", error)
                .field("description", description)
                .finish(),
        }
    }
}

/// Parse the query of a redirect URL.
///
/// `error` wins over `code`. Empty values count as missing.
///
/// # Errors
///
/// `AuthError::MalformedRedirect` if the URL does not parse or lacks `code`
/// or `state`.
pub fn parse_redirect(incoming_url: &str) -> Result<RedirectResponse> {
    let url = Url::parse(incoming_url)
        .map_err(|e| AuthError::MalformedRedirect(format!("unparsable URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Ok(RedirectResponse::Denied { error, description });
    }

    match (code, state) {
        (Some(code), Some(state)) => Ok(RedirectResponse::Code { code, state }),
        (None, _) => Err(AuthError::MalformedRedirect(
            "missing `code` parameter".to_string(),
        )),
        (_, None) => Err(AuthError::MalformedRedirect(
            "missing `state` parameter".to_string(),
        )),
    }
}

/// A successful token endpoint response.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Lifetime of `access_token` in seconds, always positive.
    pub expires_in: i64,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint outcome, validated right after the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEndpointResponse {
    Success(TokenGrant),
    Failure {
        error: String,
        description: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawTokenBody {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenEndpointResponse {
    /// Classify an HTTP response from the token endpoint.
    ///
    /// A 2xx with a missing access token or a missing, non-numeric or
    /// non-positive `expires_in` becomes a failure with
    /// [`INVALID_RESPONSE`]. A non-2xx without a JSON error body becomes
    /// `http_<status>`.
    pub fn from_http(response: &HttpResponse) -> Self {
        if response.is_success() {
            return Self::parse_success(response).unwrap_or_else(|reason| Self::Failure {
                error: INVALID_RESPONSE.to_string(),
                description: Some(reason),
            });
        }

        match response.json::<RawErrorBody>() {
            Ok(RawErrorBody {
                error: Some(error),
                error_description,
            }) => Self::Failure {
                error,
                description: error_description,
            },
            _ => Self::Failure {
                error: format!("http_{}", response.status),
                description: response.text().ok().filter(|body| !body.trim().is_empty()),
            },
        }
    }

    fn parse_success(response: &HttpResponse) -> std::result::Result<Self, String> {
        let body: RawTokenBody = response
            .json()
            .map_err(|_| "token response is not valid JSON".to_string())?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "token response has no access_token".to_string())?;

        let expires_in = body
            .expires_in
            .as_ref()
            .and_then(expires_in_seconds)
            .filter(|secs| *secs > 0)
            .ok_or_else(|| "token response has no valid expires_in".to_string())?;

        Ok(Self::Success(TokenGrant {
            access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            id_token: body.id_token.filter(|t| !t.is_empty()),
            expires_in,
        }))
    }

    fn into_result(self) -> Result<TokenGrant> {
        match self {
            Self::Success(grant) => Ok(grant),
            Self::Failure { error, description } => {
                Err(AuthError::TokenExchangeFailed { error, description })
            }
        }
    }
}

/// Accepts `3600` and `"3600"`; some providers quote the number.
fn expires_in_seconds(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Client for the token and logout endpoints.
///
/// Requests are made exactly once; token calls are never retried here.
#[derive(Clone)]
pub struct TokenClient {
    config: CustomerAccountConfig,
    http_client: Arc<dyn HttpClient>,
}

impl TokenClient {
    pub fn new(config: CustomerAccountConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Exchange an authorization code (`grant_type=authorization_code`).
    #[instrument(skip(self, code, code_verifier))]
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenGrant> {
        debug!("Exchanging authorization code for tokens");

        let grant = self
            .request_tokens(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
            ])
            .await?;

        info!(expires_in = grant.expires_in, "Authorization code exchanged");
        Ok(grant)
    }

    /// Mint a new access token (`grant_type=refresh_token`).
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        debug!("Refreshing access token");

        let grant = self
            .request_tokens(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .await?;

        info!(
            expires_in = grant.expires_in,
            rotated_refresh_token = grant.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(grant)
    }

    /// Best-effort GET to the provider logout endpoint.
    ///
    /// Any answer from the server counts as done; only transport failures
    /// are reported.
    #[instrument(skip(self, id_token))]
    pub async fn logout(&self, id_token: &str) -> Result<()> {
        let url = build_logout_url(&self.config, id_token)?;
        let request = HttpRequest::new(HttpMethod::Get, url);

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| AuthError::TokenExchangeFailed {
                error: REQUEST_FAILED.to_string(),
                description: Some(e.to_string()),
            })?;

        debug!(status = response.status, "Provider logout answered");
        Ok(())
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenGrant> {
        let request = HttpRequest::new(HttpMethod::Post, self.config.token_endpoint.clone())
            .header("Accept", "application/json")
            .form(&params)
            .map_err(|e| AuthError::TokenExchangeFailed {
                error: REQUEST_FAILED.to_string(),
                description: Some(format!("Failed to encode token request: {}", e)),
            })?;

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| {
                warn!(error = %e, "Token endpoint unreachable");
                AuthError::TokenExchangeFailed {
                    error: REQUEST_FAILED.to_string(),
                    description: Some(e.to_string()),
                }
            })?;

        let outcome = TokenEndpointResponse::from_http(&response);
        if let TokenEndpointResponse::Failure { error, .. } = &outcome {
            warn!(status = response.status, error = %error, "Token endpoint rejected request");
        }
        outcome.into_result()
    }
}
