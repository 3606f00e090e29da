//! Tour endpoints: list with filtering/sorting/projection/pagination, the
//! top-5-cheap preset, the difficulty report, and CRUD by id.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{
    query, tours, validation, CreateTourRequest, TourResponse, TourStats, UpdateTourRequest,
};
use crate::AppState;

use super::auth::{restrict_to, CurrentUser};
use super::error::ApiError;

#[derive(Debug, Serialize)]
pub struct TourListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: TourListData,
}

#[derive(Debug, Serialize)]
pub struct TourListData {
    pub tours: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct TourEnvelope {
    pub status: &'static str,
    pub data: TourData,
}

#[derive(Debug, Serialize)]
pub struct TourData {
    pub tour: TourResponse,
}

#[derive(Debug, Serialize)]
pub struct StatsEnvelope {
    pub status: &'static str,
    pub data: StatsData,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    #[serde(rename = "tourStats")]
    pub tour_stats: Vec<TourStats>,
}

/// Run the composed list query and serialize with the requested projection.
async fn run_list_query(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<TourListResponse, ApiError> {
    let tour_query = query::parse(params)?;
    let tours = tours::find_by_query(&state.db, &tour_query).await?;

    let documents = tours
        .into_iter()
        .map(|tour| {
            let document = serde_json::to_value(TourResponse::from(tour))
                .map_err(|e| ApiError::unexpected(e.to_string()))?;
            Ok(match &tour_query.fields {
                Some(fields) => query::apply_projection(document, fields),
                None => document,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(TourListResponse {
        status: "success",
        results: documents.len(),
        data: TourListData { tours: documents },
    })
}

/// GET /api/v1/tours
pub async fn list_tours(
    _user: CurrentUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<TourListResponse>, ApiError> {
    Ok(Json(run_list_query(&state, &params).await?))
}

/// GET /api/v1/tours/top-5-cheap
///
/// Preset alias over the list query: cheapest five, best-rated first among
/// equals, trimmed to the headline fields.
pub async fn top_five_cheap(
    State(state): State<Arc<AppState>>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<Json<TourListResponse>, ApiError> {
    params.insert("sort".to_string(), "price,-ratingsAverage".to_string());
    params.insert("limit".to_string(), "5".to_string());
    params.insert(
        "field".to_string(),
        "name,price,ratingsAverage,duration,difficulty".to_string(),
    );
    Ok(Json(run_list_query(&state, &params).await?))
}

/// GET /api/v1/tours/tour-stats
pub async fn tour_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsEnvelope>, ApiError> {
    let report = tours::stats(&state.db).await?;
    Ok(Json(StatsEnvelope {
        status: "success",
        data: StatsData { tour_stats: report },
    }))
}

/// POST /api/v1/tours
pub async fn create_tour(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTourRequest>,
) -> Result<(StatusCode, Json<TourEnvelope>), ApiError> {
    let tour = tours::create(&state.db, req).await?;

    tracing::info!(name = %tour.name, "Tour created");

    Ok((
        StatusCode::CREATED,
        Json(TourEnvelope {
            status: "success",
            data: TourData {
                tour: TourResponse::from(tour),
            },
        }),
    ))
}

/// GET /api/v1/tours/:id
pub async fn get_tour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TourEnvelope>, ApiError> {
    if let Err(e) = validation::validate_id(&id) {
        return Err(ApiError::bad_request(e));
    }

    let tour = tours::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("No tour found with that ID"))?;

    Ok(Json(TourEnvelope {
        status: "success",
        data: TourData {
            tour: TourResponse::from(tour),
        },
    }))
}

/// PATCH /api/v1/tours/:id
pub async fn update_tour(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTourRequest>,
) -> Result<Json<TourEnvelope>, ApiError> {
    if let Err(e) = validation::validate_id(&id) {
        return Err(ApiError::bad_request(e));
    }

    let tour = tours::update(&state.db, &id, req)
        .await?
        .ok_or_else(|| ApiError::not_found("No tour found with that ID"))?;

    Ok(Json(TourEnvelope {
        status: "success",
        data: TourData {
            tour: TourResponse::from(tour),
        },
    }))
}

/// DELETE /api/v1/tours/:id (admin only)
pub async fn delete_tour(
    user: CurrentUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    restrict_to(&user.0, &["admin"])?;

    if let Err(e) = validation::validate_id(&id) {
        return Err(ApiError::bad_request(e));
    }

    if !tours::delete(&state.db, &id).await? {
        return Err(ApiError::not_found("No tour found with that ID"));
    }

    tracing::info!(id = %id, "Tour deleted");
    Ok(StatusCode::NO_CONTENT)
}
