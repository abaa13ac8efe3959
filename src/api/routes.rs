use crate::analyzer::categorizer::{self, CategoryBreakdown};
use crate::analyzer::report::{self, ActivityStats};
use crate::analyzer;
use crate::collector::input::{MIN_TEXT_LENGTH, TextInputEvent, record_text_input};
use crate::config::{Config, SummaryProvider};
use crate::db::{EventStore, IntervalKind, IntervalRecord, NewInterval, StoreError};
use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

const EVENTS_LIMIT: usize = 5000;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: Arc<EventStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/events", get(events))
        .route("/api/export_markdown", get(export_markdown))
        .route("/api/log_event", post(log_event))
        .route("/api/text_input", post(text_input))
        .route("/api/stats", get(stats))
        .route("/api/categories", get(categories))
        .route("/api/summary", get(summary))
        .route("/api/status", get(status))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    start: Option<i64>,
    end: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryQuery {
    date: Option<String>,
    provider: Option<String>,
}

/// Event posted by the browser extension or any other client.
#[derive(Debug, Default, Deserialize)]
struct LogEventPayload {
    ts: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    detail: Option<String>,
    duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TextInputPayload {
    ts: Option<i64>,
    #[serde(default)]
    window: String,
    text: String,
    #[serde(default)]
    duration: i64,
}

#[derive(Debug, Serialize)]
struct LoggedPayload {
    success: bool,
    event_id: i64,
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    last_collected_at: Option<i64>,
    api_port: u16,
    db_path: String,
    summary_time: String,
    summary_provider: &'static str,
}

async fn events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<IntervalRecord>>> {
    let records = state.store.query(query.start, query.end, EVENTS_LIMIT)?;
    Ok(Json(records))
}

async fn export_markdown(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Response> {
    let date = resolve_date(query.date.as_deref())?;
    let records = state.store.intervals_for_date(date)?;

    markdown_response(report::render_logbook(date, &records))
}

async fn log_event(
    State(state): State<ApiState>,
    Json(payload): Json<LogEventPayload>,
) -> ApiResult<Json<LoggedPayload>> {
    let interval = NewInterval {
        started_at: payload.ts.unwrap_or_else(|| Utc::now().timestamp()),
        kind: IntervalKind::from(payload.kind.unwrap_or_else(|| "unknown".to_string())),
        label: payload.title.unwrap_or_default(),
        detail: payload.detail.unwrap_or_default(),
        duration_seconds: payload.duration.unwrap_or_default(),
    };

    let event_id = state.store.append(&interval)?;
    info!(kind = %interval.kind, title = %interval.label, "event logged");

    Ok(Json(LoggedPayload {
        success: true,
        event_id,
    }))
}

async fn text_input(
    State(state): State<ApiState>,
    Json(payload): Json<TextInputPayload>,
) -> ApiResult<Json<LoggedPayload>> {
    if payload.text.chars().count() < MIN_TEXT_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "text must be at least {MIN_TEXT_LENGTH} characters"
        )));
    }

    let event = TextInputEvent {
        ts: payload.ts.unwrap_or_else(|| Utc::now().timestamp()),
        window: payload.window,
        text: payload.text,
        duration_seconds: payload.duration,
    };
    let event_id = record_text_input(state.store.as_ref(), &event)?;

    Ok(Json(LoggedPayload {
        success: true,
        event_id,
    }))
}

async fn stats(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<ActivityStats>> {
    let date = resolve_date(query.date.as_deref())?;
    let records = state.store.intervals_for_date(date)?;

    Ok(Json(report::build_stats(&records)))
}

async fn categories(
    State(state): State<ApiState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<CategoryBreakdown>> {
    let date = resolve_date(query.date.as_deref())?;
    let records = state.store.intervals_for_date(date)?;

    Ok(Json(categorizer::categorize(&records)))
}

async fn summary(
    State(state): State<ApiState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Response> {
    let date = resolve_date(query.date.as_deref())?;
    let provider = query
        .provider
        .as_deref()
        .map(str::parse::<SummaryProvider>)
        .transpose()
        .map_err(|error| ApiError::BadRequest(error.to_string()))?
        .unwrap_or(state.config.summary_provider);

    let config = Arc::clone(&state.config);
    let store = Arc::clone(&state.store);
    let (markdown, _renderer) = tokio::task::spawn_blocking(move || {
        analyzer::generate_daily_summary(&config, &store, date, provider)
    })
    .await
    .context("Summary task panicked")??;

    markdown_response(markdown)
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    Ok(Json(StatusPayload {
        last_collected_at: state.store.latest_timestamp()?,
        api_port: state.config.api_port,
        db_path: state.store.path().display().to_string(),
        summary_time: state.config.summary_time.clone(),
        summary_provider: state.config.summary_provider.as_str(),
    }))
}

fn resolve_date(input: Option<&str>) -> ApiResult<NaiveDate> {
    match input {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::BadRequest(format!("Invalid date format: {raw}. Example: 2026-02-18"))
        }),
        None => Ok(Local::now().date_naive()),
    }
}

fn markdown_response(markdown: String) -> ApiResult<Response> {
    let mut response = Response::new(markdown.into_response().into_body());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );

    Ok(response)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NegativeDuration(_) => Self::BadRequest(value.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(error) => {
                error!(error = %error, "API request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ApiError, ApiState, DateQuery, EventsQuery, LogEventPayload, SummaryQuery,
        TextInputPayload, categories, events, export_markdown, log_event, stats, status, summary,
        text_input,
    };
    use crate::config::{Config, SummaryProvider};
    use crate::db::{EventStore, IntervalKind, NewInterval, StoreError, local_day_bounds};
    use axum::Json;
    use axum::extract::{Query, State};
    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Response};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn state() -> (tempfile::TempDir, ApiState) {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            db_path: dir.path().join("activity.db"),
            summary_dir: dir.path().join("summaries"),
            summary_provider: SummaryProvider::Template,
            ..Config::default()
        };
        let store = EventStore::open(&config.db_path).expect("store");

        (
            dir,
            ApiState {
                config: Arc::new(config),
                store: Arc::new(store),
            },
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).expect("date")
    }

    fn seed(state: &ApiState) -> i64 {
        let (start, _) = local_day_bounds(day()).expect("bounds");
        let rows = [
            (start + 100, IntervalKind::Window, "main.rs - VSCode", "pid:7", 600),
            (start + 700, IntervalKind::Idle, "Idle", "idle_seconds:61", 120),
            (start + 820, IntervalKind::Window, "YouTube - Firefox", "pid:9", 300),
            (start + 900, IntervalKind::TextInput, "gedit", "hello world", 4),
        ];
        for (started_at, kind, label, detail, duration_seconds) in rows {
            state
                .store
                .append(&NewInterval {
                    started_at,
                    kind,
                    label: label.to_string(),
                    detail: detail.to_string(),
                    duration_seconds,
                })
                .expect("append");
        }
        start
    }

    fn date_query() -> Query<DateQuery> {
        Query(DateQuery {
            date: Some("2026-05-20".to_string()),
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn events_honours_bounds() {
        let (_dir, state) = state();
        let start = seed(&state);

        let Json(all) = events(State(state.clone()), Query(EventsQuery::default()))
            .await
            .expect("events");
        assert_eq!(all.len(), 4);

        let Json(window) = events(
            State(state),
            Query(EventsQuery {
                start: Some(start + 700),
                end: Some(start + 820),
            }),
        )
        .await
        .expect("events");
        let labels = window.iter().map(|row| row.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["Idle", "YouTube - Firefox"]);
    }

    #[tokio::test]
    async fn export_is_markdown_logbook() {
        let (_dir, state) = state();
        seed(&state);

        let response = export_markdown(State(state), date_query())
            .await
            .expect("export");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            "text/markdown; charset=utf-8"
        );

        let body = body_text(response).await;
        assert!(body.starts_with("# Daily logbook - 2026-05-20"));
        assert_eq!(body.lines().filter(|line| line.starts_with("- **")).count(), 4);
        assert!(body.contains("[idle] Idle — idle_seconds:61 — 120s"));
    }

    #[tokio::test]
    async fn log_event_fills_defaults() {
        let (_dir, state) = state();

        let Json(logged) = log_event(
            State(state.clone()),
            Json(LogEventPayload {
                kind: Some("website".to_string()),
                title: Some("docs.rs".to_string()),
                ..LogEventPayload::default()
            }),
        )
        .await
        .expect("log event");
        assert!(logged.success);

        let rows = state.store.query(None, None, 10).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, logged.event_id);
        assert_eq!(rows[0].kind, IntervalKind::Other("website".to_string()));
        assert_eq!(rows[0].detail, "");
        assert_eq!(rows[0].duration_seconds, 0);
        assert!(rows[0].started_at > 0);
    }

    #[tokio::test]
    async fn log_event_rejects_negative_duration() {
        let (_dir, state) = state();

        let result = log_event(
            State(state.clone()),
            Json(LogEventPayload {
                duration: Some(-3),
                ..LogEventPayload::default()
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert!(state.store.query(None, None, 10).expect("query").is_empty());
    }

    #[tokio::test]
    async fn text_input_is_classified_and_short_bursts_rejected() {
        let (_dir, state) = state();

        let short = text_input(
            State(state.clone()),
            Json(TextInputPayload {
                ts: Some(1_000),
                window: "Slack | general".to_string(),
                text: "ok".to_string(),
                duration: 1,
            }),
        )
        .await;
        assert!(matches!(short, Err(ApiError::BadRequest(_))));

        let Json(logged) = text_input(
            State(state.clone()),
            Json(TextInputPayload {
                ts: Some(1_000),
                window: "Slack | general".to_string(),
                text: "deploy is done".to_string(),
                duration: 3,
            }),
        )
        .await
        .expect("text input");

        let rows = state.store.query(None, None, 10).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, logged.event_id);
        assert_eq!(rows[0].kind, IntervalKind::Slack);
        assert_eq!(rows[0].detail, "deploy is done");
    }

    #[tokio::test]
    async fn stats_and_categories_cover_the_day() {
        let (_dir, state) = state();
        seed(&state);

        let Json(day_stats) = stats(State(state.clone()), date_query()).await.expect("stats");
        assert_eq!(day_stats.total_seconds, 1_024);
        assert_eq!(day_stats.by_kind.get("idle"), Some(&120));
        assert_eq!(day_stats.top_activities[0].title, "main.rs - VSCode");
        assert_eq!(day_stats.top_activities.len(), 2);

        let Json(breakdown) = categories(State(state), date_query())
            .await
            .expect("categories");
        assert_eq!(breakdown.interval_count, 4);
        assert_eq!(breakdown.seconds("development"), 600);
        assert_eq!(breakdown.seconds("entertainment"), 300);
        assert_eq!(breakdown.idle_seconds(), 120);
    }

    #[tokio::test]
    async fn bad_date_is_a_client_error() {
        let (_dir, state) = state();

        let result = stats(
            State(state),
            Query(DateQuery {
                date: Some("20-05-2026".to_string()),
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn summary_uses_template_and_rejects_unknown_provider() {
        let (_dir, state) = state();
        seed(&state);

        let response = summary(
            State(state.clone()),
            Query(SummaryQuery {
                date: Some("2026-05-20".to_string()),
                provider: None,
            }),
        )
        .await
        .expect("summary");
        let body = body_text(response).await;
        assert!(body.starts_with("# Daily Summary - 2026-05-20"));

        let unknown = summary(
            State(state),
            Query(SummaryQuery {
                date: None,
                provider: Some("gpt-banana".to_string()),
            }),
        )
        .await;
        assert!(matches!(unknown, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn status_reports_last_collection() {
        let (_dir, state) = state();

        let Json(empty) = status(State(state.clone())).await.expect("status");
        assert_eq!(empty.last_collected_at, None);
        assert_eq!(empty.api_port, 5001);

        let start = seed(&state);
        let Json(seeded) = status(State(state)).await.expect("status");
        assert_eq!(seeded.last_collected_at, Some(start + 900));
        assert_eq!(seeded.summary_provider, "template");
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        let negative = ApiError::from(StoreError::NegativeDuration(-1)).into_response();
        assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

        // no route addresses an interval by id, so a missing row is a server fault
        let missing = ApiError::from(StoreError::NotFound(7)).into_response();
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
