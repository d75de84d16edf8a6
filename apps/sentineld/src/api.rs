use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use parking_lot::Mutex;
use sentinel_engine::{LoggedEvent, Seq, SharedEngine, ToolStats};
use sentinel_events::{BroadcastFeed, EventFeed, EventStreamHub, FrameDecoder};
use sentinel_protocol::{
    Direction, EventFilter, EventStatus, LatencySummary, McpEvent, MetricsSnapshot,
    SentinelError, TimelineBucket, TopologyView,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const DEFAULT_EVENT_LIMIT: usize = 500;
const MAX_EVENT_LIMIT: usize = 5000;
const DEFAULT_BUCKET_MS: u64 = 1000;

#[derive(Clone)]
pub struct AppState {
    pub engine: SharedEngine,
    /// Producer side of the single-writer queue.
    pub ingest: mpsc::Sender<McpEvent>,
    pub hub: EventStreamHub,
    pub decoder: Arc<Mutex<FrameDecoder>>,
    /// Flips to true once shutdown starts; ends live streams so the server
    /// can drain.
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/topology", get(topology))
        .route("/metrics", get(metrics))
        .route("/metrics/timeline", get(timeline))
        .route("/tools", get(list_tools))
        .route("/requests/{request_id}", get(request_detail))
        .route("/events", get(list_events).post(ingest_events))
        .route("/events/stream", get(stream_events))
        .route("/frames/{direction}", post(ingest_frames))
        .route("/ws", get(stream_ws))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SentinelError> for ApiError {
    fn from(error: SentinelError) -> Self {
        let status = match error {
            SentinelError::FeedClosed => StatusCode::SERVICE_UNAVAILABLE,
            SentinelError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize, Default)]
struct EventQuery {
    search: Option<String>,
    direction: Option<String>,
    status: Option<String>,
    method: Option<String>,
    latency_min: Option<u64>,
    latency_max: Option<u64>,
    limit: Option<usize>,
}

impl EventQuery {
    fn to_filter(&self) -> ApiResult<EventFilter> {
        let mut filter = EventFilter {
            search: self.search.clone().unwrap_or_default(),
            latency_min: self.latency_min,
            latency_max: self.latency_max,
            ..EventFilter::default()
        };
        for raw in split_list(self.direction.as_deref()) {
            let direction = Direction::parse(raw)
                .ok_or_else(|| SentinelError::UnknownDirection(raw.to_owned()))?;
            filter.directions.insert(direction);
        }
        for raw in split_list(self.status.as_deref()) {
            let status = EventStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?;
            filter.statuses.insert(status);
        }
        for method in split_list(self.method.as_deref()) {
            filter.methods.insert(method.to_owned());
        }
        Ok(filter)
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

/// A logged event as listed: sequence, derived status, then the record.
#[derive(Debug, Serialize)]
struct EventRow {
    seq: Seq,
    status: EventStatus,
    #[serde(flatten)]
    event: McpEvent,
}

impl From<&LoggedEvent> for EventRow {
    fn from(entry: &LoggedEvent) -> Self {
        Self {
            seq: entry.seq,
            status: entry.status(),
            event: entry.event.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventListResponse {
    total: usize,
    matched: usize,
    events: Vec<EventRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolRow {
    method: String,
    status: EventStatus,
    avg_latency: f64,
    /// Log position of the response that decided `status`.
    last_response_seq: Option<Seq>,
    #[serde(flatten)]
    stats: ToolStats,
}

#[derive(Debug, Deserialize, Default)]
struct MetricsQuery {
    window_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    window_secs: u64,
    #[serde(flatten)]
    snapshot: MetricsSnapshot,
    latency: LatencySummary,
}

#[derive(Debug, Deserialize, Default)]
struct TimelineQuery {
    bucket_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RequestDetail {
    event: EventRow,
    related: Vec<EventRow>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestBody {
    Many(Vec<McpEvent>),
    One(McpEvent),
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let (events, tools) = {
        let engine = state.engine.read();
        (engine.log().len(), engine.tools().len())
    };
    Json(json!({
        "status": "ok",
        "service": "sentineld",
        "events": events,
        "tools": tools,
        "subscribers": state.hub.subscriber_count(),
    }))
}

async fn topology(State(state): State<AppState>) -> Json<TopologyView> {
    Json(state.engine.read().topology())
}

async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let engine = state.engine.read();
    let window = match query.window_secs {
        Some(0) => return Err(ApiError::bad_request("window_secs must be >= 1")),
        Some(secs) => Duration::from_secs(secs),
        None => engine.config().metrics_window,
    };
    let now = McpEvent::now_millis();
    Ok(Json(MetricsResponse {
        window_secs: window.as_secs(),
        snapshot: engine.metrics_with_window(window, now),
        latency: engine.latency_summary(),
    }))
}

async fn timeline(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<Vec<TimelineBucket>>> {
    let bucket_ms = query.bucket_ms.unwrap_or(DEFAULT_BUCKET_MS);
    if bucket_ms == 0 {
        return Err(ApiError::bad_request("bucket_ms must be >= 1"));
    }
    Ok(Json(
        state.engine.read().timeline(Duration::from_millis(bucket_ms)),
    ))
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolRow>> {
    let engine = state.engine.read();
    let rows = engine
        .tools()
        .iter()
        .map(|(method, stats)| {
            let last = engine.tools().last_inbound(method);
            ToolRow {
                method: method.to_owned(),
                status: last.map(|last| last.status).unwrap_or_default(),
                avg_latency: stats.avg_latency(),
                last_response_seq: last.map(|last| last.seq),
                stats: *stats,
            }
        })
        .collect();
    Json(rows)
}

async fn request_detail(
    Path(request_id): Path<u64>,
    State(state): State<AppState>,
) -> ApiResult<Json<RequestDetail>> {
    let engine = state.engine.read();
    let event = engine
        .event_for_request(request_id)
        .map(EventRow::from)
        .ok_or_else(|| ApiError::not_found(format!("no event for request {request_id}")))?;
    let related = engine
        .events_for_request(request_id)
        .skip(1)
        .map(EventRow::from)
        .collect();
    Ok(Json(RequestDetail { event, related }))
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<EventListResponse>> {
    let filter = query.to_filter()?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);

    let engine = state.engine.read();
    let matched: Vec<&LoggedEvent> = engine.filter(&filter).collect();
    let newest = matched.len().saturating_sub(limit);
    Ok(Json(EventListResponse {
        total: engine.log().len(),
        matched: matched.len(),
        events: matched[newest..].iter().map(|entry| EventRow::from(*entry)).collect(),
    }))
}

async fn ingest_events(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let events = match body {
        IngestBody::Many(events) => events,
        IngestBody::One(event) => vec![event],
    };
    let accepted = events.len();
    for event in events {
        enqueue(&state, event).await?;
    }
    debug!(accepted, "events queued");
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": accepted }))))
}

/// Raw JSON-RPC bytes observed on one side of the proxy.
///
/// The body is a chunk of a newline-delimited stream: complete lines are
/// decoded, a trailing partial line waits for the next chunk in the same
/// direction.
async fn ingest_frames(
    Path(direction): Path<String>,
    State(state): State<AppState>,
    body: String,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let direction =
        Direction::parse(&direction).ok_or(SentinelError::UnknownDirection(direction))?;

    let (decoded, buffered) = {
        let mut decoder = state.decoder.lock();
        let decoded = decoder.push_bytes(direction, body.as_bytes());
        (decoded, decoder.buffered(direction))
    };

    let mut accepted = 0;
    let mut rejected = Vec::new();
    for result in decoded {
        match result {
            Ok(event) => {
                enqueue(&state, event).await?;
                accepted += 1;
            }
            Err(error) => {
                warn!(direction = direction.as_str(), %error, "rejected frame");
                rejected.push(error.to_string());
            }
        }
    }

    if accepted == 0
        && let Some(first) = rejected.first()
    {
        return Err(ApiError::bad_request(first.clone()));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": accepted, "rejected": rejected, "buffered": buffered })),
    ))
}

async fn enqueue(state: &AppState, event: McpEvent) -> ApiResult<()> {
    state
        .ingest
        .send(event)
        .await
        .map_err(|_| ApiError::from(SentinelError::FeedClosed))
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = sse_events(state.hub.subscribe_stream(), state.shutdown.clone());
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Committed events as SSE frames until the hub closes or shutdown starts.
fn sse_events(
    mut events: BroadcastStream<McpEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream! {
        loop {
            let next = tokio::select! {
                _ = shutdown.wait_for(|stopping| *stopping) => None,
                next = events.next() => next,
            };
            match next {
                Some(Ok(event)) => yield Ok(as_sse_event(&event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    let lag_payload = json!({ "skipped": skipped }).to_string();
                    yield Ok(Event::default().event("stream.lagged").data(lag_payload));
                }
                None => break,
            }
        }
    }
}

fn as_sse_event(event: &McpEvent) -> Event {
    let payload = serde_json::to_string(event)
        .unwrap_or_else(|error| json!({ "error": error.to_string() }).to_string());
    Event::default().event("mcp.event").data(payload)
}

async fn stream_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = BroadcastFeed::new(state.hub.subscribe());
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| forward_to_socket(socket, events, shutdown))
}

async fn forward_to_socket(
    mut socket: WebSocket,
    mut events: BroadcastFeed,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            next = events.next_event() => match next {
                Ok(Some(event)) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("websocket subscriber disconnected");
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
