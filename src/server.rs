use crate::aggregate;
use crate::config::{AppConfig, MarkerConfig};
use crate::error::DataError;
use crate::narrative;
use crate::state::{Dashboard, Datasets};
use crate::types::{AdoptionRecord, AreaPoint, LocalitySummary, RankEntry, YearTotal};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use geo::{BoundingRect, Centroid, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Wrapper for RTree indexing
pub struct BoundaryIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for BoundaryIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// A loaded dataset plus the spatial index over its boundaries.
pub struct Snapshot {
    pub data: Arc<Datasets>,
    pub tree: RTree<BoundaryIndex>,
}

impl Snapshot {
    pub fn new(data: Arc<Datasets>) -> Self {
        let items: Vec<BoundaryIndex> = data
            .boundaries
            .iter()
            .enumerate()
            .filter_map(|(i, b)| {
                let rect = b.geometry.bounding_rect()?;
                Some(BoundaryIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        Self {
            data,
            tree: RTree::bulk_load(items),
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    /// Replaced wholesale by an explicit reload; sessions keep the `Arc`
    /// they were created with.
    pub snapshot: RwLock<Arc<Snapshot>>,
    pub sessions: RwLock<HashMap<Uuid, Session>>,
}

pub struct Session {
    dashboard: Dashboard,
    last_touched: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, data: Arc<Datasets>) -> Self {
        Self {
            config,
            snapshot: RwLock::new(Arc::new(Snapshot::new(data))),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.server.session_ttl_secs)
    }

    /// Drops sessions idle for longer than the configured TTL, releasing
    /// their hold on the dataset they were created with.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = self.session_ttl();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_touched.elapsed() < ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Expired {} idle sessions", removed);
        }
        removed
    }
}

/// Looks up a session that has not outlived `ttl` and marks it as used.
/// An expired entry is removed on the spot.
fn live_session(
    sessions: &mut HashMap<Uuid, Session>,
    id: Uuid,
    ttl: Duration,
) -> Result<&mut Dashboard, ApiError> {
    let live = sessions
        .get(&id)
        .is_some_and(|s| s.last_touched.elapsed() < ttl);
    if !live {
        sessions.remove(&id);
        return Err(ApiError::NotFound(format!("unknown session: {}", id)));
    }
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {}", id)))?;
    session.last_touched = Instant::now();
    Ok(&mut session.dashboard)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<DataError> for ApiError {
    fn from(e: DataError) -> Self {
        match e {
            DataError::UnknownLocality(_) => ApiError::NotFound(e.to_string()),
            DataError::Format { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Deserialize)]
pub struct RankingParams {
    top_n: Option<usize>,
}

#[derive(Deserialize)]
pub struct LocalityParams {
    locality: String,
}

#[derive(Deserialize)]
pub struct PointParams {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
pub struct SelectionBody {
    locality: String,
}

#[derive(Serialize)]
pub struct BoundaryView {
    name: String,
    fill_color: Option<[u8; 4]>,
    label: Option<[f64; 2]>,
    coordinates: Vec<Vec<Vec<[f64; 2]>>>,
}

#[derive(Serialize)]
pub struct RegionHit {
    name: String,
    fill_color: Option<[u8; 4]>,
}

#[derive(Serialize)]
pub struct MapView {
    longitude: f64,
    latitude: f64,
    zoom: f64,
    marker: MarkerConfig,
}

#[derive(Serialize)]
pub struct SessionCreated {
    id: Uuid,
}

#[derive(Serialize)]
pub struct SessionView {
    id: Uuid,
    ranking: Vec<RankEntry>,
    selected: Option<String>,
    summary: Option<LocalitySummary>,
    narrative: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/localities", get(localities_handler))
        .route("/api/ranking", get(ranking_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/series", get(series_handler))
        .route("/api/scatter", get(scatter_handler))
        .route("/api/records", get(records_handler))
        .route("/api/boundaries", get(boundaries_handler))
        .route("/api/routes", get(routes_handler))
        .route("/api/view", get(view_handler))
        .route("/api/region", get(region_handler))
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/{id}",
            get(session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/{id}/selection", put(select_handler))
        .route("/api/reload", post(reload_handler))
        .fallback_service(static_dir)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, data: Arc<Datasets>) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState::new(config, data));
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.sweep_expired().await;
        }
    });

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn localities_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.current().await.data.localities.clone())
}

async fn ranking_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RankingParams>,
) -> Json<Vec<RankEntry>> {
    let top_n = params.top_n.unwrap_or(state.config.dashboard.top_n);
    let snapshot = state.current().await;
    Json(aggregate::rank(&snapshot.data.records, top_n))
}

async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocalityParams>,
) -> ApiResult<LocalitySummary> {
    let snapshot = state.current().await;
    Ok(Json(aggregate::summarize(&snapshot.data.records, &params.locality)?))
}

async fn series_handler(State(state): State<Arc<AppState>>) -> Json<Vec<YearTotal>> {
    Json(aggregate::yearly_totals(&state.current().await.data.records))
}

async fn scatter_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocalityParams>,
) -> ApiResult<Vec<AreaPoint>> {
    let snapshot = state.current().await;
    if !snapshot.data.localities.contains(&params.locality) {
        return Err(DataError::UnknownLocality(params.locality).into());
    }
    Ok(Json(aggregate::area_points(&snapshot.data.records, &params.locality)))
}

async fn records_handler(State(state): State<Arc<AppState>>) -> Json<Vec<AdoptionRecord>> {
    Json(state.current().await.data.records.clone())
}

async fn boundaries_handler(State(state): State<Arc<AppState>>) -> Json<Vec<BoundaryView>> {
    let snapshot = state.current().await;
    let views = snapshot
        .data
        .targets()
        .into_iter()
        .map(|b| BoundaryView {
            name: b.name.clone(),
            fill_color: b.fill_color(),
            label: b.geometry.centroid().map(|p| [p.x(), p.y()]),
            coordinates: b.coordinates(),
        })
        .collect();
    Json(views)
}

async fn routes_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Vec<[f64; 2]>>> {
    let snapshot = state.current().await;
    Json(snapshot.data.routes.iter().flat_map(|r| r.paths()).collect())
}

async fn view_handler(State(state): State<Arc<AppState>>) -> Json<MapView> {
    let map = &state.config.map;
    Json(MapView {
        longitude: map.center_lon,
        latitude: map.center_lat,
        zoom: map.zoom,
        marker: map.marker.clone(),
    })
}

async fn region_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointParams>,
) -> Json<Option<RegionHit>> {
    let snapshot = state.current().await;
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    for candidate in snapshot.tree.locate_in_envelope_intersecting(&envelope) {
        if let Some(boundary) = snapshot.data.boundaries.get(candidate.index) {
            if boundary.geometry.contains(&point) {
                return Json(Some(RegionHit {
                    name: boundary.name.clone(),
                    fill_color: boundary.fill_color(),
                }));
            }
        }
    }

    Json(None)
}

async fn create_session_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionCreated>) {
    let snapshot = state.current().await;
    let mut dashboard = Dashboard::new(Arc::clone(&snapshot.data), state.config.dashboard.top_n);
    if let Some(locality) = &state.config.dashboard.default_locality {
        if let Err(e) = dashboard.select(locality) {
            warn!("Ignoring default locality: {}", e);
        }
    }

    state.sweep_expired().await;
    let id = Uuid::new_v4();
    let session = Session {
        dashboard,
        last_touched: Instant::now(),
    };
    state.sessions.write().await.insert(id, session);
    info!("Created session {}", id);
    (StatusCode::CREATED, Json(SessionCreated { id }))
}

async fn session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionView> {
    let mut sessions = state.sessions.write().await;
    let dashboard = live_session(&mut sessions, id, state.session_ttl())?;
    Ok(Json(session_view(id, dashboard)))
}

async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> std::result::Result<StatusCode, ApiError> {
    match state.sessions.write().await.remove(&id) {
        Some(_) => {
            info!("Closed session {}", id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::NotFound(format!("unknown session: {}", id))),
    }
}

async fn select_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectionBody>,
) -> ApiResult<SessionView> {
    if body.locality.is_empty() {
        return Err(ApiError::BadRequest("locality must not be empty".to_string()));
    }
    let mut sessions = state.sessions.write().await;
    let dashboard = live_session(&mut sessions, id, state.session_ttl())?;
    dashboard.select(&body.locality)?;
    Ok(Json(session_view(id, dashboard)))
}

async fn reload_handler(State(state): State<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let config = state.config.clone();
    let data = tokio::task::spawn_blocking(move || Datasets::load(&config))
        .await
        .map_err(|e| ApiError::Internal(format!("reload task failed: {}", e)))??;

    let records = data.records.len();
    *state.snapshot.write().await = Arc::new(Snapshot::new(Arc::new(data)));
    info!("Reloaded datasets: {} records", records);
    Ok(Json(serde_json::json!({ "records": records })))
}

fn session_view(id: Uuid, dashboard: &Dashboard) -> SessionView {
    SessionView {
        id,
        ranking: dashboard.ranking().to_vec(),
        selected: dashboard.selected().map(str::to_string),
        summary: dashboard.summary().cloned(),
        narrative: dashboard.summary().map(narrative::render_panel),
    }
}
