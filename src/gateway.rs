//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect → receive HELLO → send IDENTIFY (or RESUME)
//!   - background heartbeat task
//!   - sequence number + session id tracking
//!   - reconnect with back-off on disconnect
//!   - gateway send rate limiting (120 events / 60s)
//!
//! The rest of the crate consumes an `async_channel` of [`GatewayEvent`]s
//! and never touches `tokio_tungstenite` directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::GatewayPayload;

const GATEWAY_QUERY: &str = "v=10&encoding=json";
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: usize = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

const MAX_RECONNECT_ATTEMPTS: u32 = 8;
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

bitflags! {
    /// Gateway intents the bot identifies with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Intents: u32 {
        const GUILDS = 1 << 0;
        const GUILD_MESSAGES = 1 << 9;
        const DIRECT_MESSAGES = 1 << 12;
        const MESSAGE_CONTENT = 1 << 15;
    }
}

impl Default for Intents {
    /// Messages in guilds and DMs, with their content.
    fn default() -> Self {
        Intents::GUILDS
            | Intents::GUILD_MESSAGES
            | Intents::DIRECT_MESSAGES
            | Intents::MESSAGE_CONTENT
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: Intents,
    /// Base URL from `GET /gateway/bot`, without query parameters.
    pub url: Option<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("url", &self.url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window limiter for outbound gateway messages.
#[derive(Debug)]
struct SendRateLimiter {
    sent: Vec<Instant>,
    budget: usize,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: usize, window: Duration) -> Self {
        Self {
            sent: Vec::with_capacity(budget),
            budget,
            window,
        }
    }

    /// How long to wait before the next send. Does not record anything.
    fn delay(&self, now: Instant) -> Option<Duration> {
        let mut in_window = self
            .sent
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window);
        let oldest = in_window.next()?;
        if in_window.count() + 1 < self.budget {
            return None;
        }
        (*oldest + self.window).checked_duration_since(now)
    }

    fn record(&mut self, now: Instant) {
        let window = self.window;
        self.sent.retain(|&t| now.duration_since(t) < window);
        self.sent.push(now);
    }
}

// ---------------------------------------------------------------------------
// Connection bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
}

impl SessionState {
    fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }
}

/// What to do after a connection ends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disconnect {
    Resume,
    Reidentify,
    /// Unrecoverable; carries the reason.
    Fatal(String),
    /// Nobody is listening for events any more.
    Closed,
}

/// Map a gateway close code to the follow-up action.
fn classify_close(code: u16) -> Disconnect {
    match code {
        4004 => Disconnect::Fatal("authentication failed".to_string()),
        4010 => Disconnect::Fatal("invalid shard".to_string()),
        4011 => Disconnect::Fatal("sharding required".to_string()),
        4012 => Disconnect::Fatal("invalid API version".to_string()),
        4013 => Disconnect::Fatal("invalid intents".to_string()),
        4014 => Disconnect::Fatal("disallowed intents".to_string()),
        4007 | 4009 => Disconnect::Reidentify,
        _ => Disconnect::Resume,
    }
}

/// Exponential back-off with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jitter = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jitter.min(60_000.0) as u64)
}

fn with_query(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{url}&{GATEWAY_QUERY}")
    } else {
        format!("{url}/?{GATEWAY_QUERY}")
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsSink = futures_util::stream::SplitSink<WsStream, WsMessage>;
type WsRead = futures_util::stream::SplitStream<WsStream>;

/// Shared writer half with its send budget.
#[derive(Clone)]
struct Writer {
    sink: Arc<Mutex<WsSink>>,
    limiter: Arc<Mutex<SendRateLimiter>>,
}

impl Writer {
    fn new(sink: WsSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            limiter: Arc::new(Mutex::new(SendRateLimiter::new(
                SEND_BUDGET_MAX,
                SEND_BUDGET_WINDOW,
            ))),
        }
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<(), String> {
        loop {
            let delay = self.limiter.lock().await.delay(Instant::now());
            let Some(delay) = delay else { break };
            debug!(delay_ms = delay.as_millis() as u64, "gateway send rate-limited, waiting");
            tokio::time::sleep(delay).await;
        }
        self.limiter.lock().await.record(Instant::now());

        let text = serde_json::to_string(payload).map_err(|e| e.to_string())?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| format!("WS send error: {e}"))
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.send(WsMessage::Close(None)).await;
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A running gateway connection.
pub struct GatewayHandle {
    pub events: async_channel::Receiver<GatewayEvent>,
    /// Ends with `Err` on an unrecoverable gateway failure.
    pub driver: JoinHandle<Result<(), String>>,
}

/// Spawn the gateway driver. Events arrive on the returned handle until the
/// receiver is dropped or the driver gives up.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, events) = async_channel::bounded(EVENT_BUFFER);
    let driver = tokio::spawn(drive(config, event_tx));
    GatewayHandle { events, driver }
}

async fn drive(
    config: GatewayConfig,
    event_tx: async_channel::Sender<GatewayEvent>,
) -> Result<(), String> {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut attempts: u32 = 0;

    loop {
        let base = session
            .lock()
            .await
            .resume_gateway_url
            .clone()
            .or_else(|| config.url.clone())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let url = with_query(&base);
        info!(url = %url, "connecting to Discord gateway");

        let outcome = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempts = 0;
                run_connection(stream, &config, &session, &event_tx).await
            }
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                Disconnect::Resume
            }
        };

        match outcome {
            Disconnect::Resume => info!("will attempt RESUME"),
            Disconnect::Reidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
            }
            Disconnect::Fatal(reason) => {
                error!(reason = %reason, "fatal gateway error");
                return Err(reason);
            }
            Disconnect::Closed => {
                info!("event channel closed, stopping gateway driver");
                return Ok(());
            }
        }

        attempts += 1;
        if attempts > MAX_RECONNECT_ATTEMPTS {
            return Err("exceeded max reconnect attempts".to_string());
        }
        let backoff = backoff_delay(attempts);
        warn!(
            delay_ms = backoff.as_millis() as u64,
            attempt = attempts,
            "reconnecting after backoff"
        );
        tokio::time::sleep(backoff).await;
    }
}

/// Drive one WebSocket connection from HELLO until it ends.
async fn run_connection(
    stream: WsStream,
    config: &GatewayConfig,
    session: &Arc<Mutex<SessionState>>,
    event_tx: &async_channel::Sender<GatewayEvent>,
) -> Disconnect {
    let (sink, mut read) = stream.split();
    let writer = Writer::new(sink);

    let interval = match read_hello(&mut read).await {
        Ok(interval) => interval,
        Err(e) => {
            error!(error = %e, "failed to read HELLO from gateway");
            return Disconnect::Resume;
        }
    };
    info!(interval_ms = interval, "received HELLO");

    let handshake = {
        let s = session.lock().await;
        match (&s.session_id, s.sequence) {
            (Some(session_id), Some(seq)) if s.can_resume() => json!({
                "op": 6,
                "d": { "token": config.token, "session_id": session_id, "seq": seq }
            }),
            _ => json!({
                "op": 2,
                "d": {
                    "token": config.token,
                    "intents": config.intents.bits(),
                    "properties": {
                        "os": std::env::consts::OS,
                        "browser": "yami",
                        "device": "yami"
                    }
                }
            }),
        }
    };
    if let Err(e) = writer.send(&handshake).await {
        error!(error = %e, "failed to send handshake");
        return Disconnect::Resume;
    }
    debug!(op = handshake["op"].as_u64(), "sent handshake");

    let heartbeat = tokio::spawn(heartbeat(writer.clone(), Arc::clone(session), interval));
    let outcome = read_loop(&mut read, &writer, session, event_tx).await;
    heartbeat.abort();
    writer.close().await;
    outcome
}

async fn heartbeat(writer: Writer, session: Arc<Mutex<SessionState>>, interval_ms: u64) {
    // The first beat is due after `interval * jitter`.
    let jitter = rand::random::<f64>();
    tokio::time::sleep(Duration::from_millis((interval_ms as f64 * jitter) as u64)).await;

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        ticker.tick().await;
        let seq = session.lock().await.sequence;
        if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
            warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
            return;
        }
        debug!(seq, "sent heartbeat");
    }
}

async fn read_loop(
    read: &mut WsRead,
    writer: &Writer,
    session: &Arc<Mutex<SessionState>>,
    event_tx: &async_channel::Sender<GatewayEvent>,
) -> Disconnect {
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map_or(Disconnect::Resume, classify_close);
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                return Disconnect::Resume;
            }
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };
        if let Some(seq) = payload.s {
            session.lock().await.sequence = Some(seq);
        }

        let event = GatewayEvent::from_payload(payload);
        match &event {
            GatewayEvent::Ready(ready) => {
                let mut s = session.lock().await;
                s.session_id = Some(ready.session_id.clone());
                s.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                info!(session_id = %ready.session_id, user = %ready.user.tag(), "gateway READY");
            }
            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                continue;
            }
            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
                continue;
            }
            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect (op 7)");
                return Disconnect::Resume;
            }
            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated (op 9)");
                tokio::time::sleep(Duration::from_secs(if *resumable { 2 } else { 3 })).await;
                return if *resumable {
                    Disconnect::Resume
                } else {
                    Disconnect::Reidentify
                };
            }
            _ => {}
        }

        if event_tx.send(event).await.is_err() {
            return Disconnect::Closed;
        }
    }

    info!("WebSocket stream ended");
    Disconnect::Resume
}

async fn read_hello(read: &mut WsRead) -> Result<u64, String> {
    let message = tokio::time::timeout(HELLO_TIMEOUT, read.next())
        .await
        .map_err(|_| "timed out waiting for HELLO".to_string())?
        .ok_or_else(|| "stream ended before HELLO".to_string())?
        .map_err(|e| format!("WS error reading HELLO: {e}"))?;

    let WsMessage::Text(text) = message else {
        return Err(format!("expected text message for HELLO, got {message:?}"));
    };
    hello_interval(&text)
}

/// Heartbeat interval from a HELLO payload.
fn hello_interval(text: &str) -> Result<u64, String> {
    let payload: GatewayPayload =
        serde_json::from_str(text).map_err(|e| format!("failed to parse HELLO: {e}"))?;
    if payload.op != 10 {
        return Err(format!("expected op 10 (HELLO), got op {}", payload.op));
    }
    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| "HELLO missing heartbeat_interval".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intents_cover_messages() {
        assert_eq!(Intents::default().bits(), 1 | 512 | 4096 | 32768);
    }

    #[test]
    fn close_codes() {
        assert!(matches!(classify_close(4004), Disconnect::Fatal(_)));
        assert!(matches!(classify_close(4014), Disconnect::Fatal(_)));
        assert_eq!(classify_close(4009), Disconnect::Reidentify);
        assert_eq!(classify_close(1001), Disconnect::Resume);
    }

    #[test]
    fn backoff_is_capped() {
        for attempt in 0..20 {
            assert!(backoff_delay(attempt) <= Duration::from_secs(60));
        }
        assert!(backoff_delay(1) >= Duration::from_millis(1500));
    }

    #[test]
    fn query_is_appended_once() {
        assert_eq!(
            with_query("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(
            with_query("wss://resume.discord.gg/?v=10&encoding=json"),
            "wss://resume.discord.gg/?v=10&encoding=json"
        );
        assert_eq!(with_query("wss://x?compress=no"), "wss://x?compress=no&v=10&encoding=json");
    }

    #[test]
    fn send_limiter_waits_when_budget_is_spent() {
        let mut limiter = SendRateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.delay(start).is_none());
        limiter.record(start);
        assert!(limiter.delay(start).is_none());
        limiter.record(start + Duration::from_secs(10));

        let now = start + Duration::from_secs(20);
        assert_eq!(limiter.delay(now), Some(Duration::from_secs(40)));
        assert!(limiter.delay(start + Duration::from_secs(61)).is_none());
    }

    #[test]
    fn hello_parsing() {
        assert_eq!(
            hello_interval(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#),
            Ok(41250)
        );
        assert!(hello_interval(r#"{"op":0,"d":{},"s":1,"t":"READY"}"#).is_err());
    }
}
