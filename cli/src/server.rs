use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use thali_core::catalog::{self, CatalogEntry, Category};
use thali_core::error::PlanError;
use thali_core::models::{IngredientChoice, Meal, NewMeal, Selection, Tag, validate_meal_name};
use thali_core::plan::MealPlan;
use thali_core::service::Planner;
use thali_core::session::{MemoryScratch, PlanScratch, new_session_id};
use thali_core::store::SavedPlan;

const BODY_LIMIT: usize = 5 * 1024 * 1024; // 5 MB
const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Clone)]
struct AppState {
    planner: Arc<Mutex<Planner>>,
    scratch: Arc<dyn PlanScratch>,
    api_key: Option<String>,
}

impl AppState {
    fn planner(&self) -> MutexGuard<'_, Planner> {
        self.planner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreatePlanRequest {
    #[serde(default)]
    meals: Vec<String>,
    /// Servings per meal, parallel to `meals`. Numbers or numeric strings.
    #[serde(default)]
    quantities: Vec<serde_json::Value>,
    #[serde(default)]
    extras: Vec<String>,
    #[serde(default)]
    save: bool,
    name: Option<String>,
}

#[derive(Deserialize)]
struct SavePlanRequest {
    name: Option<String>,
    /// Plan document to save; the session's current plan when absent.
    plan: Option<MealPlan>,
}

#[derive(Deserialize)]
struct DeletePlansRequest {
    names: Vec<String>,
}

#[derive(Deserialize)]
struct LoadQuery {
    selected: String,
}

#[derive(Deserialize)]
struct MadeRequest {
    /// Saved plan or meal; the session's current plan when absent.
    selected: Option<String>,
    date: Option<String>,
}

#[derive(Deserialize)]
struct SearchQuery {
    ingredient: String,
    category: Option<String>,
}

#[derive(Deserialize)]
struct TagQuery {
    tag: String,
}

#[derive(Deserialize)]
struct CatalogQuery {
    category: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<PlanError>() {
            Some(plan_err) => Self::BadRequest(plan_err.to_string()),
            None => Self::Internal(err),
        }
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Sessions ---

/// The caller's session id, if it sent a usable one.
fn existing_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_SESSION_ID_LEN)
        .map(str::to_string)
}

fn with_session(session: &str, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Ok(value) = HeaderValue::from_str(session) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn quantity_field(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(match n.as_f64() {
            Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
            _ => n.to_string(),
        }),
        serde_json::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn plan_payload(planner: &Planner, plan: &MealPlan) -> Result<serde_json::Value, ApiError> {
    let view = planner.plan_view(plan)?;
    Ok(serde_json::json!({ "plan": plan, "view": view }))
}

// --- Meal handlers ---

async fn list_meals(State(state): State<AppState>) -> Result<Json<Vec<Meal>>, ApiError> {
    let meals = state.planner().db().list_meals()?;
    Ok(Json(meals))
}

async fn meals_by_staple(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let grouped = state.planner().db().meals_by_staple()?;
    let value = serde_json::to_value(grouped).context("failed to serialize staples")?;
    Ok(Json(value))
}

async fn create_meal(
    State(state): State<AppState>,
    Json(req): Json<NewMeal>,
) -> Result<(StatusCode, Json<Meal>), ApiError> {
    let name = validate_meal_name(&req.name).map_err(|e| bad_request(&e))?;
    let planner = state.planner();
    if planner.db().meal_exists(&name)? {
        return Err(ApiError::BadRequest(format!(
            "A meal named '{name}' already exists"
        )));
    }
    let meal = planner.db().insert_meal(&req)?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn get_meal(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let view = state
        .planner()
        .meal_view(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("Meal '{name}' not found")))?;
    let value = serde_json::to_value(view).context("failed to serialize meal")?;
    Ok(Json(value))
}

async fn update_meal(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<NewMeal>,
) -> Result<Json<Meal>, ApiError> {
    let new_name = validate_meal_name(&req.name).map_err(|e| bad_request(&e))?;
    let planner = state.planner();
    if new_name != name && planner.db().meal_exists(&new_name)? {
        return Err(ApiError::BadRequest(format!(
            "A meal named '{new_name}' already exists"
        )));
    }
    let meal = planner
        .db()
        .update_meal(&name, &req)?
        .ok_or_else(|| ApiError::NotFound(format!("Meal '{name}' not found")))?;
    Ok(Json(meal))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.planner().db().delete_meals(&[name.clone()])?;
    if removed == 0 {
        return Err(ApiError::NotFound(format!("Meal '{name}' not found")));
    }
    Ok(Json(serde_json::json!({ "deleted": name })))
}

async fn search_meals(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let ingredient = query.ingredient.trim();
    if ingredient.is_empty() {
        return Err(ApiError::BadRequest("ingredient is required".to_string()));
    }
    let planner = state.planner();
    let names = match query.category.as_deref() {
        Some(c) => {
            let category = Category::parse(c).map_err(|e| bad_request(&e))?;
            planner
                .db()
                .search_by_ingredient(&IngredientChoice::new(category, ingredient))?
        }
        None => planner.db().search_any_category(ingredient)?,
    };
    Ok(Json(names))
}

async fn inspire(
    State(state): State<AppState>,
    Query(query): Query<TagQuery>,
) -> Result<Json<Vec<Meal>>, ApiError> {
    let tag = Tag::parse(&query.tag).map_err(|e| bad_request(&e))?;
    let meals = state.planner().db().meals_with_tag(tag)?;
    Ok(Json(meals))
}

// --- Catalog handlers ---

async fn get_catalog(
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<CatalogEntry>>, ApiError> {
    let category = query
        .category
        .as_deref()
        .map(Category::parse)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    let entries = catalog::entries()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .collect();
    Ok(Json(entries))
}

async fn refresh_catalog(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.planner().db().refresh_catalog()?;
    let value = serde_json::to_value(summary).context("failed to serialize summary")?;
    Ok(Json(value))
}

// --- Plan handlers ---

async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Response, ApiError> {
    let session = existing_session(&headers).unwrap_or_else(new_session_id);
    let quantities: Vec<Option<String>> = req.quantities.iter().map(quantity_field).collect();
    let selection = Selection::from_form(&req.meals, &quantities);

    let (plan, payload, saved) = {
        let planner = state.planner();
        let plan = planner.create_plan(&selection, &req.extras)?;
        let saved: Option<SavedPlan> = if req.save {
            Some(planner.save_plan(&plan, req.name.as_deref())?)
        } else {
            None
        };
        let payload = plan_payload(&planner, &plan)?;
        (plan, payload, saved)
    };
    state.scratch.set(&session, plan);

    let mut body = payload;
    body["saved"] = serde_json::to_value(saved).context("failed to serialize saved plan")?;
    Ok(with_session(&session, (StatusCode::CREATED, Json(body))))
}

fn no_plan_in_progress() -> ApiError {
    ApiError::NotFound("No plan in progress. Create one first".to_string())
}

/// The session's plan stays put until it is saved or discarded.
async fn current_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = existing_session(&headers).ok_or_else(no_plan_in_progress)?;
    let plan = state
        .scratch
        .get(&session)
        .ok_or_else(no_plan_in_progress)?;
    let payload = plan_payload(&state.planner(), &plan)?;
    Ok(with_session(&session, Json(payload)))
}

async fn discard_current_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session = existing_session(&headers).ok_or_else(no_plan_in_progress)?;
    state
        .scratch
        .pop(&session)
        .ok_or_else(no_plan_in_progress)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_saved_plans(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let names = state.planner().list_saved_plans()?;
    Ok(Json(names))
}

async fn save_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SavePlanRequest>,
) -> Result<(StatusCode, Json<SavedPlan>), ApiError> {
    if let Some(plan) = req.plan {
        let saved = state.planner().save_plan(&plan, req.name.as_deref())?;
        return Ok((StatusCode::CREATED, Json(saved)));
    }

    let no_plan = || ApiError::BadRequest("No plan given and none in progress".to_string());
    let session = existing_session(&headers).ok_or_else(no_plan)?;
    let plan = state.scratch.get(&session).ok_or_else(no_plan)?;
    let saved = state.planner().save_plan(&plan, req.name.as_deref())?;
    state.scratch.pop(&session);
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn get_saved_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let planner = state.planner();
    let plan = planner
        .load_plan(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("Saved plan '{name}' not found")))?;
    Ok(Json(plan_payload(&planner, &plan)?))
}

async fn delete_saved_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.planner().delete_plans(&[name])?;
    Ok(Json(serde_json::json!({ "deleted": removed })))
}

async fn delete_saved_plans(
    State(state): State<AppState>,
    Json(req): Json<DeletePlansRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.planner().delete_plans(&req.names)?;
    Ok(Json(serde_json::json!({ "deleted": removed })))
}

async fn load_plan(
    State(state): State<AppState>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let planner = state.planner();
    let (target, plan) = planner
        .load(&query.selected)?
        .ok_or_else(|| ApiError::NotFound(format!("Nothing named '{}'", query.selected)))?;
    let mut payload = plan_payload(&planner, &plan)?;
    payload["source"] = serde_json::to_value(target).context("failed to serialize target")?;
    Ok(Json(payload))
}

async fn mark_made(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MadeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let date = match req.date.as_deref() {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{d}'. Use YYYY-MM-DD")))?,
        None => Local::now().date_naive(),
    };
    let plan = match req.selected.as_deref() {
        Some(selected) => state
            .planner()
            .load(selected)?
            .map(|(_, plan)| plan)
            .ok_or_else(|| ApiError::NotFound(format!("Nothing named '{selected}'")))?,
        None => existing_session(&headers)
            .and_then(|session| state.scratch.get(&session))
            .ok_or_else(no_plan_in_progress)?,
    };
    let updated = state.planner().mark_made(&plan, date)?;
    Ok(Json(serde_json::json!({
        "updated": updated,
        "date": date.format("%Y-%m-%d").to_string(),
    })))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/catalog", get(get_catalog))
        .route("/api/catalog/refresh", post(refresh_catalog))
        .route("/api/meals", get(list_meals).post(create_meal))
        .route(
            "/api/meals/{name}",
            get(get_meal).put(update_meal).delete(delete_meal),
        )
        .route("/api/staples", get(meals_by_staple))
        .route("/api/search", get(search_meals))
        .route("/api/inspire", get(inspire))
        .route("/api/plans", post(create_plan))
        .route(
            "/api/plans/current",
            get(current_plan).delete(discard_current_plan),
        )
        .route(
            "/api/plans/saved",
            get(list_saved_plans)
                .post(save_plan)
                .delete(delete_saved_plans),
        )
        .route(
            "/api/plans/saved/{name}",
            get(get_saved_plan).delete(delete_saved_plan),
        )
        .route("/api/plans/load", get(load_plan))
        .route("/api/plans/made", post(mark_made))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key. Short keys are not shown at all.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    planner: Planner,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        planner: Arc::new(Mutex::new(planner)),
        scratch: Arc::new(MemoryScratch::new()),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            mask_key(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use thali_core::models::{Ingredients, Quantity};
    use tower::ServiceExt;

    fn seeded_planner() -> Planner {
        let planner = Planner::new_in_memory().unwrap();
        for (name, tomatoes, chickpeas) in [("A", 100.0, Some("1")), ("B", 50.0, None)] {
            let mut ingredients = Ingredients::default();
            ingredients
                .fresh
                .insert("Tomatoes".to_string(), Quantity::Number(tomatoes));
            if let Some(c) = chickpeas {
                ingredients
                    .tinned
                    .insert("Chickpeas".to_string(), Quantity::from(c));
            }
            planner
                .db()
                .insert_meal(&NewMeal {
                    name: name.to_string(),
                    book: Some("Home".to_string()),
                    page: Some("3".to_string()),
                    ingredients,
                    tags: vec![Tag::QuickEasy],
                    ..NewMeal::default()
                })
                .unwrap();
        }
        planner
    }

    fn test_state(api_key: Option<String>) -> AppState {
        AppState {
            planner: Arc::new(Mutex::new(seeded_planner())),
            scratch: Arc::new(MemoryScratch::new()),
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/catalog")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app(None);

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/plans")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/thali.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn create_plan_merges_and_sets_session() {
        let app = test_app(None);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/plans",
                &serde_json::json!({
                    "meals": ["A", "B"],
                    "quantities": [2, "1"],
                    "extras": ["Salt", ""]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get(SESSION_HEADER).is_some());
        let json = body_json(response).await;
        assert_eq!(json["plan"]["Fresh_Ingredients"]["Tomatoes"], 250);
        assert_eq!(json["plan"]["Tinned_Ingredients"]["Chickpeas"], 2);
        assert_eq!(json["plan"]["Extra_Ingredients"], serde_json::json!(["Salt"]));
        assert_eq!(json["view"]["totals"][0]["lines"][0]["amount"], "250 g");
        assert!(json["saved"].is_null());
    }

    #[tokio::test]
    async fn empty_selection_is_bad_request() {
        let app = test_app(None);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/plans",
                &serde_json::json!({ "meals": ["", "null"] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("No meals selected"));
    }

    fn session_request(
        method: &str,
        uri: &str,
        session: &str,
        body: Option<&serde_json::Value>,
    ) -> axum::http::Request<Body> {
        let builder = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(SESSION_HEADER, session);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn session_plan_survives_display_until_saved() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(session_request(
                "POST",
                "/api/plans",
                "session-one",
                Some(&serde_json::json!({ "meals": ["A"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(SESSION_HEADER).unwrap(), "session-one");

        let other = app
            .clone()
            .oneshot(session_request("GET", "/api/plans/current", "session-two", None))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let shown = app
                .clone()
                .oneshot(session_request("GET", "/api/plans/current", "session-one", None))
                .await
                .unwrap();
            assert_eq!(shown.status(), StatusCode::OK);
            let json = body_json(shown).await;
            assert_eq!(json["plan"]["Meal_List"], serde_json::json!(["A"]));
        }

        let saved = app
            .clone()
            .oneshot(session_request(
                "POST",
                "/api/plans/saved",
                "session-one",
                Some(&serde_json::json!({ "name": "Week" })),
            ))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::CREATED);
        let json = body_json(saved).await;
        assert_eq!(json["name"], "Week");
        assert!(state.planner().load_plan("Week").unwrap().is_some());

        let after = app
            .oneshot(session_request("GET", "/api/plans/current", "session-one", None))
            .await
            .unwrap();
        assert_eq!(after.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn discarding_the_session_plan_clears_it() {
        let app = test_app(None);

        app.clone()
            .oneshot(session_request(
                "POST",
                "/api/plans",
                "s1",
                Some(&serde_json::json!({ "meals": ["B"] })),
            ))
            .await
            .unwrap();

        let discarded = app
            .clone()
            .oneshot(session_request("DELETE", "/api/plans/current", "s1", None))
            .await
            .unwrap();
        assert_eq!(discarded.status(), StatusCode::NO_CONTENT);

        let again = app
            .clone()
            .oneshot(session_request("DELETE", "/api/plans/current", "s1", None))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);

        let save = app
            .oneshot(session_request(
                "POST",
                "/api/plans/saved",
                "s1",
                Some(&serde_json::json!({ "name": "Gone" })),
            ))
            .await
            .unwrap();
        assert_eq!(save.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_plan_can_be_marked_made() {
        let state = test_state(None);
        let app = build_router(state.clone());

        app.clone()
            .oneshot(session_request(
                "POST",
                "/api/plans",
                "s1",
                Some(&serde_json::json!({ "meals": ["A", "B"] })),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(session_request(
                "POST",
                "/api/plans/made",
                "s1",
                Some(&serde_json::json!({ "date": "2024-03-02" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["updated"], 2);
        let meal = state.planner().db().get_meal("B").unwrap().unwrap();
        assert_eq!(meal.last_made.unwrap().to_string(), "2024-03-02");

        // Still there to be saved afterwards.
        assert!(state.scratch.get("s1").is_some());

        let unknown = app
            .oneshot(session_request(
                "POST",
                "/api/plans/made",
                "s2",
                Some(&serde_json::json!({})),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn whole_number_floats_count_as_servings() {
        let app = test_app(None);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/plans",
                &serde_json::json!({ "meals": ["A"], "quantities": [2.0] }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["plan"]["Fresh_Ingredients"]["Tomatoes"], 200);
    }

    #[test]
    fn quantity_field_normalizes_numbers() {
        assert_eq!(quantity_field(&serde_json::json!(2.0)).as_deref(), Some("2"));
        assert_eq!(quantity_field(&serde_json::json!(3)).as_deref(), Some("3"));
        assert_eq!(quantity_field(&serde_json::json!(1.5)).as_deref(), Some("1.5"));
        assert_eq!(quantity_field(&serde_json::json!("4")).as_deref(), Some("4"));
        assert_eq!(quantity_field(&serde_json::Value::Null), None);
    }

    #[test]
    fn mask_key_handles_short_and_multibyte_keys() {
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key(""), "****");
        assert_eq!(mask_key("0123456789abcdef"), "0123...cdef");
        assert_eq!(mask_key("ééééxxxxüüüü"), "éééé...üüüü");
    }

    #[tokio::test]
    async fn save_list_load_and_delete_plans() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/plans",
                &serde_json::json!({ "meals": ["B"], "save": true, "name": "Week 1: Shopping" }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["saved"]["name"], "Week 1_ Shopping");

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/plans/saved")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!(["Week 1_ Shopping"]));

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/plans/load?selected=plan:Week%201_%20Shopping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["source"]["kind"], "plan");
        assert_eq!(json["plan"]["Fresh_Ingredients"]["Tomatoes"], 50);

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                "/api/plans/saved",
                &serde_json::json!({ "names": ["Week 1_ Shopping", "Ghost"] }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["deleted"], 1);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/plans/saved/Week%201_%20Shopping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn save_explicit_plan_document() {
        let app = test_app(None);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/plans/saved",
                &serde_json::json!({
                    "name": "Legacy",
                    "plan": {"Fresh_Ingredients": {"Okra": 200}, "Meal_List": "oops"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["name"], "Legacy");
    }

    #[tokio::test]
    async fn load_meal_as_plan_and_mark_made() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/plans/load?selected=A")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["source"]["kind"], "meal");
        assert_eq!(json["view"]["sections"][0]["source"], "Home, page 3");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/plans/made",
                &serde_json::json!({ "selected": "meal:A", "date": "2024-06-01" }),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["updated"], 1);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals/A")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["last_made"], "2024-06-01");
    }

    #[tokio::test]
    async fn meal_crud_and_search() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/meals",
                &serde_json::json!({
                    "name": "Chana Masala",
                    "staple": "Rice",
                    "Tinned_Ingredients": {"Chickpeas": 2},
                    "tags": ["Special"]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let duplicate = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/meals",
                &serde_json::json!({ "name": "Chana Masala" }),
            ))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/search?ingredient=Chickpeas&category=tinned")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!(["A", "Chana Masala"]));

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/inspire?tag=special")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete("/api/meals/Chana%20Masala")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals/Chana%20Masala")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_category_and_tag_are_bad_requests() {
        let app = test_app(None);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/api/catalog?category=frozen")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/inspire?tag=brunch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
