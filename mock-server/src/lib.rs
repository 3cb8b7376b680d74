use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub const MAX_PER_PAGE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub status: String,
}

#[derive(Deserialize)]
pub struct CreateExperiment {
    pub project_id: u64,
    pub name: String,
    #[serde(default = "default_status")]
    pub status: String,
}

#[derive(Deserialize)]
pub struct UpdateExperiment {
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub project_id: Option<u64>,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "first_page")]
    pub page: usize,
}

fn default_status() -> String {
    "not_started".to_string()
}

fn default_per_page() -> usize {
    25
}

fn first_page() -> usize {
    1
}

/// Server state: the accepted token, the experiment store, and a throttle
/// that answers the next N requests with 429.
#[derive(Debug)]
pub struct MockState {
    token: String,
    experiments: RwLock<BTreeMap<u64, Experiment>>,
    next_id: AtomicU64,
    throttle: AtomicU32,
    reset: String,
    hits: AtomicU32,
}

pub type Shared = Arc<MockState>;

impl MockState {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            experiments: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            throttle: AtomicU32::new(0),
            reset: "0".to_string(),
            hits: AtomicU32::new(0),
        }
    }

    /// Answer the next `count` requests with 429 and `X-RATELIMIT-RESET: reset`.
    pub fn with_throttle(mut self, count: u32, reset: impl Into<String>) -> Self {
        self.throttle = AtomicU32::new(count);
        self.reset = reset.into();
        self
    }

    /// Seed `count` experiments under `project_id`.
    pub fn with_experiments(mut self, project_id: u64, count: u64) -> Self {
        {
            let store = self.experiments.get_mut();
            for _ in 0..count {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                store.insert(
                    id,
                    Experiment {
                        id,
                        project_id,
                        name: format!("Experiment {id}"),
                        status: default_status(),
                    },
                );
            }
        }
        self
    }

    /// Requests seen so far, including throttled and unauthorized ones.
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn app() -> Router {
    app_with(Arc::new(MockState::new("test-token")))
}

pub fn app_with(state: Shared) -> Router {
    Router::new()
        .route("/v2/experiments", get(list_experiments).post(create_experiment))
        .route(
            "/v2/experiments/{id}",
            get(get_experiment)
                .patch(update_experiment)
                .delete(delete_experiment),
        )
        .layer(middleware::from_fn_with_state(state.clone(), guard))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: Shared) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "code": status.as_u16(), "message": message })),
    )
        .into_response()
}

/// Throttle first, then the bearer check.
async fn guard(State(state): State<Shared>, req: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let throttled = state
        .throttle
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if throttled {
        debug!(uri = %req.uri(), "throttling request");
        let mut response = api_error(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
        if let Ok(value) = HeaderValue::from_str(&state.reset) {
            response.headers_mut().insert("x-ratelimit-reset", value);
        }
        return response;
    }

    let expected = format!("Bearer {}", state.token);
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return api_error(StatusCode::UNAUTHORIZED, "Authentication failed");
    }

    next.run(req).await
}

fn link_header(headers: &HeaderMap, query: &ListQuery, page: usize, last: usize) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let project = query
        .project_id
        .map(|p| format!("project_id={p}&"))
        .unwrap_or_default();
    let url = |p: usize| {
        format!(
            "http://{host}/v2/experiments?{project}per_page={}&page={p}",
            query.per_page
        )
    };

    let mut links = vec![format!("<{}>; rel=first", url(1))];
    if page > 1 {
        links.push(format!("<{}>; rel=prev", url(page - 1)));
    }
    if page < last {
        links.push(format!("<{}>; rel=next", url(page + 1)));
    }
    links.push(format!("<{}>; rel=last", url(last)));
    links.join(", ")
}

async fn list_experiments(
    State(state): State<Shared>,
    Query(mut query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    query.per_page = query.per_page.clamp(1, MAX_PER_PAGE);
    let page = query.page.max(1);

    let store = state.experiments.read().await;
    let matching: Vec<&Experiment> = store
        .values()
        .filter(|e| query.project_id.is_none_or(|p| e.project_id == p))
        .collect();
    let last = matching.len().div_ceil(query.per_page).max(1);
    let items: Vec<Experiment> = matching
        .into_iter()
        .skip((page - 1).saturating_mul(query.per_page))
        .take(query.per_page)
        .cloned()
        .collect();
    info!(page, last, items = items.len(), "listing experiments");

    let link = link_header(&headers, &query, page, last);
    let mut response = Json(items).into_response();
    if let Ok(value) = HeaderValue::from_str(&link) {
        response.headers_mut().insert(header::LINK, value);
    }
    response
}

async fn create_experiment(
    State(state): State<Shared>,
    Json(input): Json<CreateExperiment>,
) -> (StatusCode, Json<Experiment>) {
    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let experiment = Experiment {
        id,
        project_id: input.project_id,
        name: input.name,
        status: input.status,
    };
    state
        .experiments
        .write()
        .await
        .insert(id, experiment.clone());
    (StatusCode::CREATED, Json(experiment))
}

async fn get_experiment(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    match state.experiments.read().await.get(&id) {
        Some(e) => Json(e.clone()).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Experiment not found"),
    }
}

async fn update_experiment(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateExperiment>,
) -> Response {
    let mut store = state.experiments.write().await;
    let Some(experiment) = store.get_mut(&id) else {
        return api_error(StatusCode::NOT_FOUND, "Experiment not found");
    };
    if let Some(name) = input.name {
        experiment.name = name;
    }
    if let Some(status) = input.status {
        experiment.status = status;
    }
    Json(experiment.clone()).into_response()
}

async fn delete_experiment(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    match state.experiments.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Experiment not found"),
    }
}
