//! Tour store.
//!
//! CRUD plus the composed list query and the fixed difficulty report. The
//! slug is derived from the name on every write, so it can never drift from
//! the most recently saved name.

use sqlx::QueryBuilder;
use uuid::Uuid;

use super::models::{CreateTourRequest, Tour, TourStats, UpdateTourRequest};
use super::query::{FilterValue, TourQuery};
use super::validation;
use super::{now_timestamp, DbPool, StoreError};

/// Derive a URL-safe slug: lowercase, alphanumeric runs joined by dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn to_json_column<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v))
        .transpose()
        .map_err(|e| StoreError::Database(sqlx::Error::Protocol(e.to_string())))
}

pub async fn create(pool: &DbPool, req: CreateTourRequest) -> Result<Tour, StoreError> {
    let errors = validation::validate_tour(&req);
    if !errors.is_empty() {
        return Err(StoreError::Validation(errors));
    }

    let id = Uuid::new_v4().to_string();
    let slug = slugify(&req.name);
    let now = now_timestamp();

    sqlx::query(
        "INSERT INTO tours (
            id, name, slug, duration, difficulty, price, max_group_size,
            summary, description, image_cover, ratings_average,
            ratings_quantity, images, start_dates, start_location, locations,
            guides, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&slug)
    .bind(req.duration)
    .bind(&req.difficulty)
    .bind(req.price)
    .bind(req.max_group_size)
    .bind(req.summary.trim())
    .bind(&req.description)
    .bind(&req.image_cover)
    .bind(req.ratings_average.unwrap_or(4.5))
    .bind(req.ratings_quantity.unwrap_or(0))
    .bind(to_json_column(&req.images)?)
    .bind(to_json_column(&req.start_dates)?)
    .bind(to_json_column(&req.start_location)?)
    .bind(to_json_column(&req.locations)?)
    .bind(to_json_column(&req.guides)?)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_sqlx(e, "name"))?;

    find_by_id(pool, &id).await?.ok_or(StoreError::NotFound)
}

pub async fn find_by_id(pool: &DbPool, id: &str) -> Result<Option<Tour>, StoreError> {
    let tour = sqlx::query_as::<_, Tour>("SELECT * FROM tours WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(tour)
}

/// Execute a composed list query. Column names in the descriptor come from
/// the builder's allow-list; every request value is a bind parameter.
pub async fn find_by_query(pool: &DbPool, q: &TourQuery) -> Result<Vec<Tour>, StoreError> {
    let mut qb = QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM tours");

    for (i, filter) in q.filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(filter.column);
        qb.push(" ");
        qb.push(filter.op.as_sql());
        qb.push(" ");
        match &filter.value {
            FilterValue::Number(n) => {
                qb.push_bind(*n);
            }
            FilterValue::Text(s) => {
                qb.push_bind(s.clone());
            }
        }
    }

    qb.push(" ORDER BY ");
    for (i, (column, direction)) in q.sort.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column);
        qb.push(" ");
        qb.push(direction.as_sql());
    }

    qb.push(" LIMIT ");
    qb.push_bind(q.limit);
    qb.push(" OFFSET ");
    qb.push_bind(q.offset);

    let tours = qb.build_query_as::<Tour>().fetch_all(pool).await?;
    Ok(tours)
}

/// Apply a partial update. The merged document is re-validated and the slug
/// recomputed before anything is persisted. Returns `None` when no tour has
/// the given id.
pub async fn update(
    pool: &DbPool,
    id: &str,
    patch: UpdateTourRequest,
) -> Result<Option<Tour>, StoreError> {
    let Some(existing) = find_by_id(pool, id).await? else {
        return Ok(None);
    };

    let merged = CreateTourRequest {
        name: patch.name.unwrap_or(existing.name),
        duration: patch.duration.unwrap_or(existing.duration),
        difficulty: patch.difficulty.unwrap_or(existing.difficulty),
        price: patch.price.unwrap_or(existing.price),
        max_group_size: patch.max_group_size.unwrap_or(existing.max_group_size),
        summary: patch.summary.unwrap_or(existing.summary),
        description: patch.description.or(existing.description),
        image_cover: patch.image_cover.unwrap_or(existing.image_cover),
        ratings_average: patch.ratings_average.or(Some(existing.ratings_average)),
        ratings_quantity: patch.ratings_quantity.or(Some(existing.ratings_quantity)),
        images: patch.images.or_else(|| {
            existing
                .images
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
        }),
        start_dates: patch.start_dates.or_else(|| {
            existing
                .start_dates
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
        }),
        start_location: patch.start_location.or_else(|| {
            existing
                .start_location
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
        }),
        locations: patch.locations.or_else(|| {
            existing
                .locations
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
        }),
        guides: patch.guides.or_else(|| {
            existing
                .guides
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
        }),
    };

    let errors = validation::validate_tour(&merged);
    if !errors.is_empty() {
        return Err(StoreError::Validation(errors));
    }

    let slug = slugify(&merged.name);
    let now = now_timestamp();

    sqlx::query(
        "UPDATE tours SET
            name = ?, slug = ?, duration = ?, difficulty = ?, price = ?,
            max_group_size = ?, summary = ?, description = ?, image_cover = ?,
            ratings_average = ?, ratings_quantity = ?, images = ?,
            start_dates = ?, start_location = ?, locations = ?, guides = ?,
            updated_at = ?
         WHERE id = ?",
    )
    .bind(merged.name.trim())
    .bind(&slug)
    .bind(merged.duration)
    .bind(&merged.difficulty)
    .bind(merged.price)
    .bind(merged.max_group_size)
    .bind(merged.summary.trim())
    .bind(&merged.description)
    .bind(&merged.image_cover)
    .bind(merged.ratings_average.unwrap_or(4.5))
    .bind(merged.ratings_quantity.unwrap_or(0))
    .bind(to_json_column(&merged.images)?)
    .bind(to_json_column(&merged.start_dates)?)
    .bind(to_json_column(&merged.start_location)?)
    .bind(to_json_column(&merged.locations)?)
    .bind(to_json_column(&merged.guides)?)
    .bind(&now)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_sqlx(e, "name"))?;

    find_by_id(pool, id).await
}

/// Delete a tour. Returns whether a row was actually removed.
pub async fn delete(pool: &DbPool, id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM tours WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Fixed report: tours priced under 1500, grouped by uppercased difficulty,
/// ordered by ascending average price.
pub async fn stats(pool: &DbPool) -> Result<Vec<TourStats>, StoreError> {
    let rows = sqlx::query_as::<_, TourStats>(
        "SELECT UPPER(difficulty) AS difficulty,
                COUNT(*) AS num_tours,
                MIN(price) AS min_price,
                MAX(price) AS max_price,
                AVG(price) AS avg_price
         FROM tours
         WHERE price < 1500
         GROUP BY UPPER(difficulty)
         ORDER BY avg_price ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
