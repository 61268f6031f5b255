pub mod error;
pub mod types;

pub use error::{RedditError, Result};
pub use types::{ListingData, Post, Thing, TokenResponse, UserAbout};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use creatorsignal_common::{Credentials, Endpoints, RateLimiter};
use reqwest::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tokens are dropped this long before their declared expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Declared lifetimes beyond this are treated as this.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// A bearer credential from the client-credential exchange.
#[derive(Debug, Clone)]
pub struct AuthToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AuthToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

/// Reddit client. Every outbound call, token exchanges included, first takes a
/// token from the shared [`RateLimiter`].
pub struct RedditClient {
    http: reqwest::Client,
    credentials: Credentials,
    endpoints: Endpoints,
    limiter: Arc<RateLimiter>,
    // Held across the exchange, so at most one exchange is ever in flight.
    token: Mutex<Option<AuthToken>>,
    exchanges: AtomicU64,
}

impl RedditClient {
    pub fn new(
        credentials: Credentials,
        endpoints: Endpoints,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(credentials.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            credentials,
            endpoints,
            limiter,
            token: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Number of credential exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    /// Return a bearer token, exchanging credentials only when the cached one
    /// is missing or within a minute of expiry.
    pub async fn authenticate(&self) -> Result<String> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
            debug!("reddit: cached token near expiry, discarding");
            *slot = None;
        }

        let token = self.exchange().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token if it is still the one that was rejected.
    pub async fn invalidate_token(&self, rejected: &str) {
        let mut slot = self.token.lock().await;
        if slot.as_ref().is_some_and(|t| t.value == rejected) {
            *slot = None;
        }
    }

    async fn exchange(&self) -> Result<AuthToken> {
        self.limiter.acquire(1).await;
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        info!(token_url = %self.endpoints.token_url, "reddit: exchanging client credentials");

        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| RedditError::Auth {
                status: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RedditError::Auth {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let token: TokenResponse = resp.json().await.map_err(|e| RedditError::Auth {
            status: Some(status.as_u16()),
            message: format!("malformed token response: {e}"),
        })?;
        if token.access_token.is_empty() {
            return Err(RedditError::Auth {
                status: Some(status.as_u16()),
                message: "token response carried an empty access_token".to_string(),
            });
        }

        Ok(AuthToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in).min(MAX_TOKEN_LIFETIME),
        })
    }

    /// Authenticated GET. A 401 discards the token, re-exchanges once and
    /// retries once; a second 401 is returned as [`RedditError::Unauthorized`].
    pub async fn request(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let token = self.authenticate().await?;
        let resp = self.send_authenticated(url, query, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }

        warn!(url, "reddit: 401 with cached token, re-authenticating once");
        self.invalidate_token(&token).await;
        let token = self.authenticate().await?;
        let resp = self.send_authenticated(url, query, &token).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            return Err(RedditError::Unauthorized(body));
        }
        check_status(resp).await
    }

    async fn send_authenticated(
        &self,
        url: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Response> {
        self.limiter.acquire(1).await;
        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(resp)
    }

    /// Authenticated GET decoded as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.request(url, &[]).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Unauthenticated GET of a public `.json` endpoint.
    pub async fn public_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.public_get(url).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Unauthenticated GET returning the raw body (HTML pages).
    pub async fn public_text(&self, url: &str) -> Result<String> {
        let resp = self.public_get(url).await?;
        Ok(resp.text().await?)
    }

    async fn public_get(&self, url: &str) -> Result<Response> {
        self.limiter.acquire(1).await;
        let resp = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json, text/html;q=0.9")
            .send()
            .await?;
        check_status(resp).await
    }

    /// Fetch a listing, authenticated or via the public endpoint.
    pub async fn listing(&self, url: &str, authenticated: bool) -> Result<Vec<Post>> {
        let value: serde_json::Value = if authenticated {
            self.get_json(url).await?
        } else {
            self.public_json(url).await?
        };
        let posts = types::listing_posts(value)?;
        debug!(url, count = posts.len(), authenticated, "reddit: listing fetched");
        Ok(posts)
    }

    /// Fetch a user's public profile.
    pub async fn user_about(&self, username: &str) -> Result<UserAbout> {
        let url = format!(
            "{}/user/{}/about?raw_json=1",
            self.endpoints.oauth_base.trim_end_matches('/'),
            username
        );
        let value: serde_json::Value = self.get_json(&url).await?;
        types::user_about(value)
    }
}

/// Map non-success responses onto the error taxonomy; 429 keeps its retry hint.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(resp.headers());
        warn!(?retry_after, url = %resp.url(), "reddit: rate limited");
        return Err(RedditError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RedditError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

/// `Retry-After` in seconds, falling back to Reddit's `x-ratelimit-reset`.
fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    [header::RETRY_AFTER.as_str(), "x-ratelimit-reset"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .find_map(|secs| Duration::try_from_secs_f64(secs).ok())
}
