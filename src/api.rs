//! REST API for the case picking service.
//!
//! Accepts a problem instance (order lines, routing edges, distance matrix),
//! runs the search driver or the sequential baseline on a blocking worker
//! thread and returns the pallets with their picking tours.

use std::sync::OnceLock;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, SolverConfig};
use crate::cost::pallet_cost;
use crate::error::SolverError;
use crate::model::{
    Case, DistanceMatrix, Edge, Location, OrderLine, PalletSpec, Problem, ValidationError,
};
use crate::packing::{LayerPacker, PackingConfig};
use crate::pallet::Pallet;
use crate::solver::{BetaRange, Solver};

#[derive(Clone)]
struct ApiState {
    solver: SolverConfig,
    packing: PackingConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>case-picking API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// A physical case of an order line.
#[derive(Deserialize, Clone, ToSchema)]
pub struct CaseRequest {
    pub id: usize,
    #[schema(value_type = [f64; 3], example = json!([30.0, 20.0, 15.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    /// Stackability rank; stronger cases end up lower.
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_strength() -> f64 {
    1.0
}

#[derive(Deserialize, Clone, ToSchema)]
pub struct OrderLineRequest {
    pub id: usize,
    /// Index into the distance matrix; 0 is the depot.
    pub location: usize,
    pub cases: Vec<CaseRequest>,
}

#[derive(Deserialize, Clone, ToSchema)]
pub struct EdgeRequest {
    pub origin: usize,
    pub end: usize,
    pub saving: f64,
}

/// Pallet capacity; overrides the configured default.
#[derive(Deserialize, Clone, ToSchema)]
pub struct PalletRequest {
    #[schema(value_type = [f64; 3], example = json!([120.0, 80.0, 150.0]))]
    pub dims: (f64, f64, f64),
    pub max_weight: f64,
}

#[derive(Deserialize, Clone, Copy, ToSchema)]
pub struct BetaRangeRequest {
    pub low: f64,
    pub high: f64,
}

/// Problem instance shared by all endpoints.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "order_lines": [
            { "id": 1, "location": 1, "cases": [{ "id": 1, "dims": [30.0, 20.0, 15.0], "weight": 4.0, "strength": 2.0 }] },
            { "id": 2, "location": 2, "cases": [{ "id": 2, "dims": [40.0, 30.0, 20.0], "weight": 9.0, "strength": 3.0 }] }
        ],
        "edges": [
            { "origin": 1, "end": 2, "saving": 12.0 },
            { "origin": 2, "end": 1, "saving": 10.0 }
        ],
        "distances": [[0.0, 10.0, 14.0], [10.0, 0.0, 8.0], [14.0, 8.0, 0.0]]
    })
)]
pub struct ProblemRequest {
    pub order_lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub edges: Vec<EdgeRequest>,
    pub distances: Vec<Vec<f64>>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub pallet: Option<PalletRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub allow_rotations: Option<bool>,
}

impl ProblemRequest {
    fn into_problem(self, default_pallet: PalletSpec) -> Result<Problem, ValidationError> {
        let pallet = match self.pallet {
            Some(p) => PalletSpec::new(p.dims, p.max_weight)?,
            None => default_pallet,
        };

        let order_lines = self
            .order_lines
            .into_iter()
            .map(|line| {
                let cases = line
                    .cases
                    .into_iter()
                    .map(|c| Case::new(c.id, c.dims, c.weight, c.strength))
                    .collect::<Result<Vec<_>, ValidationError>>()?;
                OrderLine::new(line.id, Location(line.location), cases)
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        let edges = self
            .edges
            .into_iter()
            .map(|e| Edge::new(Location(e.origin), Location(e.end), e.saving))
            .collect();

        let distances = DistanceMatrix::from_rows(self.distances)?;
        Problem::new(order_lines, edges, distances, pallet)
    }
}

/// Request of the search endpoints: a problem plus optional search parameters.
#[derive(Deserialize, Clone, ToSchema)]
pub struct SolveRequest {
    #[serde(flatten)]
    pub problem: ProblemRequest,
    /// Time budget in seconds; the configured default applies when omitted.
    #[serde(default)]
    #[schema(nullable = true)]
    pub max_time_secs: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub beta_range: Option<BetaRangeRequest>,
    /// Fixed seed for a reproducible run.
    #[serde(default)]
    #[schema(nullable = true)]
    pub seed: Option<u64>,
}

/// A validated search job, ready to run on a worker thread.
struct SolveJob {
    problem: Problem,
    packer: LayerPacker,
    max_time: Duration,
    beta_range: BetaRange,
    seed: Option<u64>,
}

impl SolveJob {
    fn order_line_count(&self) -> usize {
        self.problem.order_lines().len()
    }

    fn solver(self) -> (Solver<LayerPacker>, Duration, BetaRange) {
        (
            Solver::new(self.problem, self.packer, self.seed),
            self.max_time,
            self.beta_range,
        )
    }

    fn run(self) -> Result<SolveResponse, SolverError> {
        let (mut solver, max_time, beta_range) = self.solver();
        let outcome = solver.run(max_time, beta_range)?;
        Ok(SolveResponse {
            cost: outcome.best_cost,
            iterations: outcome.iterations,
            pallet_count: outcome.best.len(),
            pallets: pallet_bodies(&outcome.best, solver.problem().distances()),
            history: solver.history().to_vec(),
        })
    }
}

#[derive(Debug)]
enum SolveRequestError {
    InvalidProblem(ValidationError),
    InvalidParameters(String),
}

impl SolveRequest {
    fn into_job(self, state: &ApiState) -> Result<SolveJob, SolveRequestError> {
        let max_time = match self.max_time_secs {
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|err| {
                SolveRequestError::InvalidParameters(format!(
                    "max_time_secs must be a non-negative number of seconds, got {}: {}",
                    secs, err
                ))
            })?,
            None => state.solver.max_time(),
        };
        let beta_range = match self.beta_range {
            Some(range) => BetaRange::new(range.low, range.high)
                .map_err(|err| SolveRequestError::InvalidParameters(err.to_string()))?,
            None => state.solver.beta_range(),
        };
        let packer = packer_for(state, self.problem.allow_rotations);
        let problem = self
            .problem
            .into_problem(state.solver.pallet())
            .map_err(SolveRequestError::InvalidProblem)?;

        Ok(SolveJob {
            problem,
            packer,
            max_time,
            beta_range,
            seed: self.seed.or(state.solver.seed()),
        })
    }
}

fn packer_for(state: &ApiState, allow_rotations: Option<bool>) -> LayerPacker {
    let mut packing_config = state.packing;
    if let Some(allow_rotations) = allow_rotations {
        packing_config.allow_item_rotation = allow_rotations;
    }
    LayerPacker::new(packing_config)
}

/// Best solution of a search run.
#[derive(Serialize, ToSchema)]
pub struct SolveResponse {
    /// Total walking distance of all picking tours.
    pub cost: f64,
    pub iterations: usize,
    pub pallet_count: usize,
    pub pallets: Vec<PalletBody>,
    /// Best cost after every iteration.
    pub history: Vec<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct SequentialResponse {
    pub cost: f64,
    pub pallet_count: usize,
    pub pallets: Vec<PalletBody>,
}

/// A single pallet with its picking tour.
///
/// # Fields
/// * `id` - Pallet number (1-based)
/// * `visiting_order` - Locations in the order the picker visits them
/// * `cost` - Length of the tour from the depot and back
#[derive(Serialize, ToSchema)]
pub struct PalletBody {
    pub id: usize,
    pub order_lines: Vec<usize>,
    pub visiting_order: Vec<usize>,
    pub weight: f64,
    pub volume: f64,
    pub cost: f64,
    pub cases: Vec<PackedCaseBody>,
}

#[derive(Serialize, ToSchema)]
pub struct PackedCaseBody {
    pub id: usize,
    pub order_line: usize,
    #[schema(value_type = [f64; 3], example = json!([0.0, 0.0, 0.0]))]
    pub pos: (f64, f64, f64),
    #[schema(value_type = [f64; 3], example = json!([30.0, 20.0, 15.0]))]
    pub dims: (f64, f64, f64),
    pub weight: f64,
    pub strength: f64,
    pub layer: usize,
}

fn pallet_bodies(pallets: &[Pallet], distances: &DistanceMatrix) -> Vec<PalletBody> {
    pallets
        .iter()
        .enumerate()
        .map(|(i, pallet)| PalletBody {
            id: i + 1,
            order_lines: pallet.lines_in_visiting_order(),
            visiting_order: pallet.visiting_order().iter().map(|l| l.index()).collect(),
            weight: pallet.weight,
            volume: pallet.volume,
            cost: pallet_cost(pallet, distances),
            cases: pallet
                .cases
                .iter()
                .map(|p| PackedCaseBody {
                    id: p.case.id,
                    order_line: p.order_line,
                    pos: p.position,
                    dims: p.dims,
                    weight: p.case.weight,
                    strength: p.case.strength,
                    layer: p.layer,
                })
                .collect(),
        })
        .collect()
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn parameter_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid search parameters",
        details,
    )
}

fn solver_error(err: SolverError) -> Response {
    match err {
        SolverError::OrderLineDoesNotFit { .. } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Order line does not fit an empty pallet",
            err.to_string(),
        ),
        SolverError::InvalidBeta(_) | SolverError::InvalidBetaRange { .. } => {
            parameter_error(err.to_string())
        }
    }
}

fn task_error(err: tokio::task::JoinError) -> Response {
    error!("❌ Search task failed: {err}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Search task failed",
        err.to_string(),
    )
}

fn parse_solve_request(
    payload: Result<Json<SolveRequest>, JsonRejection>,
    state: &ApiState,
) -> Result<SolveJob, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_job(state) {
        Ok(job) => Ok(job),
        Err(SolveRequestError::InvalidProblem(err)) => Err(validation_error(err.to_string())),
        Err(SolveRequestError::InvalidParameters(details)) => Err(parameter_error(details)),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_solve, handle_solve_stream, handle_sequential),
    components(
        schemas(
            SolveRequest,
            ProblemRequest,
            OrderLineRequest,
            CaseRequest,
            EdgeRequest,
            PalletRequest,
            BetaRangeRequest,
            SolveResponse,
            SequentialResponse,
            PalletBody,
            PackedCaseBody,
            ErrorResponse
        )
    ),
    tags((name = "picking", description = "Endpoints for combined pallet building and picker routing"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // API endpoints
        .route("/solve", post(handle_solve))
        .route("/solve_stream", post(handle_solve_stream))
        .route("/sequential", post(handle_sequential))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and serves until it is terminated.
///
/// Configures CORS for cross-origin requests.
pub async fn start_api_server(
    config: ApiConfig,
    solver: SolverConfig,
    packing: PackingConfig,
) -> std::io::Result<()> {
    let app = router(ApiState { solver, packing });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.inspect_err(|err| {
        error!("❌ Could not bind API server to {}: {}", addr, err);
    })?;

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints:");
    info!("   - POST /solve");
    info!("   - POST /solve_stream");
    info!("   - POST /sequential");
    info!("📑 Documentation:");
    info!("   - GET /docs");
    info!("   - GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /solve endpoint.
///
/// Runs the multistart search for the requested time budget and returns the
/// cheapest solution found.
#[utoipa::path(
    post,
    path = "/solve",
    request_body = SolveRequest,
    responses(
        (status = 200, description = "Best solution found within the time budget", body = SolveResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid problem, invalid parameters or an order line that fits no pallet",
            body = ErrorResponse
        )
    ),
    tag = "picking"
)]
async fn handle_solve(
    State(state): State<ApiState>,
    payload: Result<Json<SolveRequest>, JsonRejection>,
) -> Response {
    let job = match parse_solve_request(payload, &state) {
        Ok(job) => job,
        Err(response) => return response,
    };

    info!(
        "📥 New solve request: {} order lines, {} edges, budget {:?}",
        job.order_line_count(),
        job.problem.edges().len(),
        job.max_time
    );

    match tokio::task::spawn_blocking(move || job.run()).await {
        Ok(Ok(response)) => {
            info!(
                "📦 Result: {} pallets, cost {:.2} after {} iterations",
                response.pallet_count, response.cost, response.iterations
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Err(err)) => solver_error(err),
        Err(err) => task_error(err),
    }
}

/// Handler for POST /solve_stream endpoint (SSE).
///
/// Streams search events (`Seeded`, `Improved`, `Finished`) as Server-Sent
/// Events while the search is running.
#[utoipa::path(
    post,
    path = "/solve_stream",
    request_body = SolveRequest,
    responses(
        (
            status = 200,
            description = "Streams search events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid problem or invalid parameters",
            body = ErrorResponse
        )
    ),
    tag = "picking"
)]
async fn handle_solve_stream(
    State(state): State<ApiState>,
    payload: Result<Json<SolveRequest>, JsonRejection>,
) -> Response {
    let job = match parse_solve_request(payload, &state) {
        Ok(job) => job,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let (mut solver, max_time, beta_range) = job.solver();
        // Stop searching once the client has gone away.
        let result = solver.run_until(
            max_time,
            beta_range,
            |evt| {
                if let Ok(json) = serde_json::to_string(evt) {
                    let _ = tx.blocking_send(json);
                }
            },
            || tx.is_closed(),
        );
        if let Err(err) = result {
            let _ = tx.blocking_send(
                json!({ "type": "Error", "details": err.to_string() }).to_string(),
            );
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /sequential endpoint.
///
/// Builds the baseline solution that merges pallets by case strength only.
/// Search parameters in the request are ignored.
#[utoipa::path(
    post,
    path = "/sequential",
    request_body = ProblemRequest,
    responses(
        (status = 200, description = "Baseline solution", body = SequentialResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid problem or an order line that fits no pallet",
            body = ErrorResponse
        )
    ),
    tag = "picking"
)]
async fn handle_sequential(
    State(state): State<ApiState>,
    payload: Result<Json<ProblemRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    let packer = packer_for(&state, request.allow_rotations);
    let problem = match request.into_problem(state.solver.pallet()) {
        Ok(problem) => problem,
        Err(err) => return validation_error(err.to_string()),
    };

    info!(
        "📥 New sequential request: {} order lines",
        problem.order_lines().len()
    );

    let result = tokio::task::spawn_blocking(move || {
        let solver = Solver::new(problem, packer, None);
        let pallets = solver.sequential()?;
        Ok::<_, SolverError>(SequentialResponse {
            cost: solver.cost(&pallets),
            pallet_count: pallets.len(),
            pallets: pallet_bodies(&pallets, solver.problem().distances()),
        })
    })
    .await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(err)) => solver_error(err),
        Err(err) => task_error(err),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}
