//! Rate-limit–aware client for the Discord REST API.
//!
//! All outbound HTTP calls go through [`DiscordHttpClient`] so that auth
//! headers, rate-limit back-off, and error handling live in one place. The
//! client implements [`ChatApi`], which is all the plugins ever see.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::Mutex;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::framework::{ChatApi, MessageQuery};
use crate::types::*;

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!(
    "DiscordBot (yami, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
const MAX_RETRIES: u32 = 5;
/// Longest we ever sleep for a single rate-limit back-off.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct RateLimiter {
    /// Route-key → bucket id mapping.
    route_buckets: HashMap<String, String>,
    /// Bucket id → state.
    buckets: HashMap<String, BucketState>,
    /// No request may be sent before this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    /// How long to wait before sending on `route_key`, if at all.
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until {
            if until > now {
                return Some(until - now);
            }
        }

        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;
        if state.remaining == 0 && state.resets_at > now {
            return Some(state.resets_at - now);
        }
        None
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_after = info.reset_after.and_then(|s| Duration::try_from_secs_f64(s).ok());
        if info.is_global {
            if let Some(reset_after) = reset_after {
                self.global_until = Some(now + reset_after);
            }
        }

        if let Some(bucket) = &info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: now + reset_after.unwrap_or(Duration::from_secs(1)),
                },
            );
        }
    }
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RateLimitInfo {
        remaining: header("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: header("x-ratelimit-reset-after").and_then(|s| s.parse().ok()),
        bucket: header("x-ratelimit-bucket").map(str::to_string),
        is_global: header("x-ratelimit-global") == Some("true"),
    }
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

#[derive(Debug, Deserialize)]
struct GatewayBot {
    url: String,
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self {
            token: token.into(),
            client,
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        })
    }

    /// Send a request to `{BASE_URL}/{path}`.
    ///
    /// `route_key` is a template like `POST /channels/{id}/messages` used for
    /// per-route rate-limit bucketing. Returns the raw response body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{BASE_URL}/{}", path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            let delay = self.limiter.lock().await.delay_for(route_key, Instant::now());
            if let Some(delay) = delay {
                let delay = delay.min(MAX_BACKOFF);
                debug!(
                    route = route_key,
                    delay_ms = delay.as_millis() as u64,
                    "rate-limit pre-emptive backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("authorization", format!("Bot {}", self.token));
            if let Some(json) = body {
                req = req.json(json);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            let status = resp.status();
            let info = parse_rate_limit_headers(resp.headers());
            self.limiter
                .lock()
                .await
                .update(route_key, &info, Instant::now());

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                let limited: Option<RateLimitBody> = serde_json::from_slice(&bytes).ok();
                let retry_after = limited
                    .as_ref()
                    .and_then(|b| b.retry_after)
                    .or(info.reset_after)
                    .unwrap_or(1.0);
                let global = info.is_global || limited.is_some_and(|b| b.global);
                let delay = Duration::try_from_secs_f64(retry_after).map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF));
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global,
                    "rate-limited by Discord, backing off"
                );

                if global {
                    self.limiter.lock().await.global_until = Some(Instant::now() + delay);
                }
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            if status.is_success() {
                return Ok(bytes.to_vec());
            }
            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    /// Like [`request`](Self::request) but deserialises the response body.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let raw = String::from_utf8_lossy(&bytes);
            let cut = raw.char_indices().nth(200).map_or(raw.len(), |(i, _)| i);
            HttpError::Serde(format!("{e}: {}", &raw[..cut]))
        })
    }

    fn to_body<T: serde::Serialize>(body: &T) -> Result<serde_json::Value, HttpError> {
        serde_json::to_value(body).map_err(|e| HttpError::Serde(e.to_string()))
    }

    /// The bot's own user. A 401 here means the token is invalid.
    pub async fn current_user(&self) -> Result<User, HttpError> {
        self.request_json(Method::GET, "/users/@me", "GET /users/@me", None)
            .await
    }

    pub async fn current_application(&self) -> Result<CurrentApplication, HttpError> {
        self.request_json(
            Method::GET,
            "/oauth2/applications/@me",
            "GET /oauth2/applications/@me",
            None,
        )
        .await
    }

    /// WebSocket URL to connect the gateway to.
    pub async fn gateway_url(&self) -> Result<String, HttpError> {
        let gateway: GatewayBot = self
            .request_json(Method::GET, "/gateway/bot", "GET /gateway/bot", None)
            .await?;
        Ok(gateway.url)
    }
}

#[async_trait]
impl ChatApi for DiscordHttpClient {
    async fn create_message(
        &self,
        channel_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError> {
        let body = Self::to_body(body)?;
        self.request_json(
            Method::POST,
            &format!("/channels/{channel_id}/messages"),
            "POST /channels/{channel_id}/messages",
            Some(&body),
        )
        .await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &MessagePayload,
    ) -> Result<Message, HttpError> {
        let body = Self::to_body(body)?;
        self.request_json(
            Method::PATCH,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            "PATCH /channels/{channel_id}/messages/{message_id}",
            Some(&body),
        )
        .await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            "DELETE /channels/{channel_id}/messages/{message_id}",
            None,
        )
        .await?;
        Ok(())
    }

    async fn bulk_delete_messages(
        &self,
        channel_id: &str,
        message_ids: &[Snowflake],
    ) -> Result<(), HttpError> {
        let body = json!({ "messages": message_ids });
        self.request(
            Method::POST,
            &format!("/channels/{channel_id}/messages/bulk-delete"),
            "POST /channels/{channel_id}/messages/bulk-delete",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError> {
        self.request_json(
            Method::GET,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            "GET /channels/{channel_id}/messages/{message_id}",
            None,
        )
        .await
    }

    async fn get_messages(
        &self,
        channel_id: &str,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, HttpError> {
        self.request_json(
            Method::GET,
            &format!("/channels/{channel_id}/messages?{}", query.to_query_string()),
            "GET /channels/{channel_id}/messages",
            None,
        )
        .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError> {
        self.request_json(
            Method::GET,
            &format!("/channels/{channel_id}"),
            "GET /channels/{channel_id}",
            None,
        )
        .await
    }

    async fn get_guild(&self, guild_id: &str) -> Result<Guild, HttpError> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{guild_id}"),
            "GET /guilds/{guild_id}",
            None,
        )
        .await
    }

    async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let body = Self::to_body(response)?;
        self.request(
            Method::POST,
            &format!("/interactions/{interaction_id}/{interaction_token}/callback"),
            "POST /interactions/{interaction_id}/{interaction_token}/callback",
            Some(&body),
        )
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn info(remaining: u32, reset_after: f64, bucket: &str, is_global: bool) -> RateLimitInfo {
        RateLimitInfo {
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            bucket: Some(bucket.to_string()),
            is_global,
        }
    }

    #[test]
    fn unknown_route_is_not_delayed() {
        let limiter = RateLimiter::default();
        assert!(limiter.delay_for("GET /x", Instant::now()).is_none());
    }

    #[test]
    fn exhausted_bucket_delays_until_reset() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        limiter.update("POST /m", &info(0, 2.0, "abc", false), now);
        let delay = limiter.delay_for("POST /m", now).unwrap();
        assert_eq!(delay, Duration::from_secs(2));
        assert!(limiter
            .delay_for("POST /m", now + Duration::from_secs(3))
            .is_none());
    }

    #[test]
    fn remaining_requests_are_not_delayed() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        limiter.update("POST /m", &info(3, 2.0, "abc", false), now);
        assert!(limiter.delay_for("POST /m", now).is_none());
    }

    #[test]
    fn global_limit_applies_to_every_route() {
        let mut limiter = RateLimiter::default();
        let now = Instant::now();
        limiter.update("POST /m", &info(5, 1.5, "abc", true), now);
        assert_eq!(
            limiter.delay_for("GET /other", now),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn parses_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4"));
        headers.insert("x-ratelimit-reset-after", HeaderValue::from_static("0.5"));
        headers.insert("x-ratelimit-bucket", HeaderValue::from_static("bkt"));
        let info = parse_rate_limit_headers(&headers);
        assert_eq!(info.remaining, Some(4));
        assert_eq!(info.reset_after, Some(0.5));
        assert_eq!(info.bucket.as_deref(), Some("bkt"));
        assert!(!info.is_global);
    }

    #[test]
    fn user_agent_names_the_crate() {
        assert!(USER_AGENT.starts_with("DiscordBot ("));
        assert!(USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
