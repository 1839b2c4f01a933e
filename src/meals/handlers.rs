use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::analysis::strategy::AnalysisStrategy;
use crate::error::CoreError;
use crate::meals::dto::{
    DailySummaryQuery, DailySummaryResponse, EditMealRequest, EditMealResponse, MealResponse,
    Pagination, ReanalyzeRequest,
};
use crate::meals::services::{IdentifiedIngredient, MAX_UPLOAD_BYTES};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/summary/daily", get(daily_summary))
        .route("/meals/:id", get(get_meal))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", post(upload_meal))
        .route("/meals/:id", delete(delete_meal))
        .route("/meals/:id/reanalyze", post(reanalyze_meal))
        .route("/meals/:id/ingredients", patch(edit_ingredients))
        .route("/ingredients/identify", post(identify_ingredient))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
}

type ApiError = (StatusCode, String);

fn reject(e: CoreError) -> ApiError {
    match &e {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        CoreError::Parsing(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
        CoreError::External(inner) => {
            error!(error = %inner, "internal error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
        }
    }
}

fn user_id_of(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or((StatusCode::BAD_REQUEST, "x-user-id header required".into()))
}

struct UploadedImage {
    body: Bytes,
    content_type: String,
    description: Option<String>,
}

async fn read_upload(mp: &mut Multipart) -> Result<UploadedImage, ApiError> {
    let mut body: Option<(Bytes, String)> = None;
    let mut description = None;
    while let Ok(Some(field)) = mp.next_field().await {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                body = Some((data, content_type));
            }
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                if !text.trim().is_empty() {
                    description = Some(text);
                }
            }
            _ => {}
        }
    }
    let (body, content_type) =
        body.ok_or((StatusCode::BAD_REQUEST, "file field is required".to_string()))?;
    Ok(UploadedImage { body, content_type, description })
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    #[serde(default)]
    mode: Option<String>,
}

/// POST /meals (multipart: file, optional description; ?mode=background)
#[instrument(skip(state, mp))]
async fn upload_meal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<UploadQuery>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<MealResponse>), ApiError> {
    let user_id = user_id_of(&headers)?;
    let upload = read_upload(&mut mp).await?;

    let strategy = match upload.description {
        Some(text) => AnalysisStrategy::user_context_aware(text).map_err(reject)?,
        None => AnalysisStrategy::Basic,
    };

    let meal = match q.mode.as_deref() {
        Some("background") => state
            .meals
            .upload_for_background(user_id, upload.body, &upload.content_type, strategy)
            .await
            .map_err(reject)?,
        _ => state
            .meals
            .upload_and_analyze(user_id, upload.body, &upload.content_type, strategy)
            .await
            .map_err(reject)?,
    };

    Ok((StatusCode::CREATED, Json(meal.into())))
}

#[instrument(skip(state))]
async fn list_meals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<MealResponse>>, ApiError> {
    let user_id = user_id_of(&headers)?;
    let meals = state
        .meals
        .list_meals(p.offset, p.limit)
        .await
        .map_err(reject)?;
    Ok(Json(
        meals
            .into_iter()
            .filter(|m| m.user_id == user_id)
            .map(Into::into)
            .collect(),
    ))
}

#[instrument(skip(state))]
async fn get_meal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MealResponse>, ApiError> {
    let user_id = user_id_of(&headers)?;
    let meal = state.meals.get_meal(id, user_id).await.map_err(reject)?;
    Ok(Json(meal.into()))
}

#[instrument(skip(state))]
async fn delete_meal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_of(&headers)?;
    state.meals.delete_meal(id, user_id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /meals/:id/reanalyze with portion/ingredient/weight/description context.
#[instrument(skip(state, body))]
async fn reanalyze_meal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ReanalyzeRequest>,
) -> Result<Json<MealResponse>, ApiError> {
    user_id_of(&headers)?;
    let strategy = match body {
        ReanalyzeRequest::Portion { size, unit } => AnalysisStrategy::portion_aware(size, unit),
        ReanalyzeRequest::Ingredients { ingredients } => {
            AnalysisStrategy::ingredient_aware(ingredients)
        }
        ReanalyzeRequest::Weight { grams } => AnalysisStrategy::weight_aware(grams),
        ReanalyzeRequest::Description { text } => AnalysisStrategy::user_context_aware(text),
    }
    .map_err(reject)?;
    let meal = state.meals.reanalyze(id, strategy).await.map_err(reject)?;
    Ok(Json(meal.into()))
}

/// PATCH /meals/:id/ingredients applies an ordered batch of changes.
#[instrument(skip(state, body))]
async fn edit_ingredients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<EditMealRequest>,
) -> Result<Json<EditMealResponse>, ApiError> {
    let user_id = user_id_of(&headers)?;
    let outcome = state
        .meals
        .edit_meal(id, user_id, &body.changes)
        .await
        .map_err(reject)?;
    let edit_count = outcome.meal.edit_count;
    Ok(Json(EditMealResponse {
        meal: outcome.meal.into(),
        delta: outcome.delta,
        change_summary: outcome.change_summary,
        edit_count,
    }))
}

/// POST /ingredients/identify (multipart: file) — single-ingredient recognition.
#[instrument(skip(state, mp))]
async fn identify_ingredient(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut mp: Multipart,
) -> Result<Json<IdentifiedIngredient>, ApiError> {
    user_id_of(&headers)?;
    let upload = read_upload(&mut mp).await?;
    let hit = state
        .meals
        .identify_ingredient(upload.body)
        .await
        .map_err(reject)?;
    Ok(Json(hit))
}

#[instrument(skip(state))]
async fn daily_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<DailySummaryQuery>,
) -> Result<Json<DailySummaryResponse>, ApiError> {
    let user_id = user_id_of(&headers)?;
    let summary = state
        .meals
        .daily_summary(user_id, q.date)
        .await
        .map_err(reject)?;
    Ok(Json(summary))
}
