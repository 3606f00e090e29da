//! Tour models and DTOs.
//!
//! The row struct keeps list and geo fields as JSON stored in TEXT columns;
//! the response DTO parses them back into structured values.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tour {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub duration: i64,
    pub difficulty: String,
    pub price: f64,
    pub max_group_size: i64,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub ratings_average: f64,
    pub ratings_quantity: i64,
    /// JSON array of image references
    pub images: Option<String>,
    /// JSON array of RFC 3339 timestamps
    pub start_dates: Option<String>,
    /// JSON GeoPoint object
    pub start_location: Option<String>,
    /// JSON array of GeoPoint objects
    pub locations: Option<String>,
    /// JSON array of guide references
    pub guides: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A geospatial point with an optional itinerary day offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "default_point_type")]
    pub point_type: String,
    #[serde(default)]
    pub coordinates: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
}

fn default_point_type() -> String {
    "Point".to_string()
}

/// Response DTO with the JSON columns expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub duration: i64,
    pub difficulty: String,
    pub price: f64,
    pub max_group_size: i64,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    pub ratings_average: f64,
    pub ratings_quantity: i64,
    pub images: Vec<String>,
    pub start_dates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<GeoPoint>,
    pub locations: Vec<GeoPoint>,
    pub guides: Vec<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_json_column<T: serde::de::DeserializeOwned + Default>(raw: &Option<String>) -> T {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

impl From<Tour> for TourResponse {
    fn from(tour: Tour) -> Self {
        Self {
            images: parse_json_column(&tour.images),
            start_dates: parse_json_column(&tour.start_dates),
            start_location: tour
                .start_location
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            locations: parse_json_column(&tour.locations),
            guides: parse_json_column(&tour.guides),
            id: tour.id,
            name: tour.name,
            slug: tour.slug,
            duration: tour.duration,
            difficulty: tour.difficulty,
            price: tour.price,
            max_group_size: tour.max_group_size,
            summary: tour.summary,
            description: tour.description,
            image_cover: tour.image_cover,
            ratings_average: tour.ratings_average,
            ratings_quantity: tour.ratings_quantity,
            created_at: tour.created_at,
            updated_at: tour.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    pub name: String,
    pub duration: i64,
    pub difficulty: String,
    pub price: f64,
    pub max_group_size: i64,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<GeoPoint>>,
    pub guides: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTourRequest {
    pub name: Option<String>,
    pub duration: Option<i64>,
    pub difficulty: Option<String>,
    pub price: Option<f64>,
    pub max_group_size: Option<i64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: Option<i64>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<String>>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<GeoPoint>>,
    pub guides: Option<Vec<serde_json::Value>>,
}

/// One row of the difficulty report.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub min_price: f64,
    pub max_price: f64,
    pub avg_price: f64,
}
