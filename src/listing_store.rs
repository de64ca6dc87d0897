use crate::config::DatabaseConfig;
use crate::media_library::{extract_public_id, ResolvedImage};
use crate::sync::{replace_associations, ResolvedAssociations};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

use crate::lookup_store::FeatureType;

/// Open a connection pool from the database configuration
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!("Connected to PostgreSQL database");

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;

    info!("Database migrations completed");
    Ok(())
}

/// Pets policy of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "pets_policy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetsPolicy {
    Allowed,
    NotAllowed,
    CatsOnly,
    DogsOnly,
    CaseByCase,
}

impl PetsPolicy {
    /// Parse the wire spelling (e.g. `CATS_ONLY`)
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALLOWED" => Some(Self::Allowed),
            "NOT_ALLOWED" => Some(Self::NotAllowed),
            "CATS_ONLY" => Some(Self::CatsOnly),
            "DOGS_ONLY" => Some(Self::DogsOnly),
            "CASE_BY_CASE" => Some(Self::CaseByCase),
            _ => None,
        }
    }
}

/// One image slot: delivery URL plus media-host asset id, set together or
/// both absent
#[derive(Debug, Clone, Default)]
pub struct ImageRef {
    pub url: Option<String>,
    pub public_id: Option<String>,
}

impl From<ResolvedImage> for ImageRef {
    fn from(resolved: ResolvedImage) -> Self {
        Self {
            url: resolved.url,
            public_id: resolved.public_id,
        }
    }
}

/// Field set written on listing create/update
#[derive(Debug, Clone)]
pub struct ListingWrite {
    pub title: String,
    pub address: Option<String>,
    pub image: ImageRef,
    pub floorplan_image: ImageRef,
    pub map_image: ImageRef,
    pub price: i32,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub borough_id: i32,
    pub neighborhood_id: i32,
    pub pets_policy: PetsPolicy,
    pub is_active: bool,
}

/// Public search constraints, compiled into a single predicate
#[derive(Debug, Clone, Default)]
pub struct ListingFilters {
    pub min_price: Option<i32>,
    pub max_price: Option<i32>,
    pub min_beds: Option<f64>,
    pub min_baths: Option<f64>,
    /// Case-insensitive exact borough names (any-of)
    pub boroughs: Vec<String>,
    /// Case-insensitive exact neighborhood names (any-of)
    pub neighborhoods: Vec<String>,
    /// Feature names the listing must all carry (conjunctive)
    pub features: Vec<String>,
    /// Upper-cased line codes, at least one of which must match (disjunctive)
    pub subway_lines: Vec<String>,
    pub pets_policy: Option<PetsPolicy>,
}

/// Full listing projection with related display names and association sets
#[derive(Debug, Clone)]
pub struct ListingDetail {
    pub id: i32,
    pub title: String,
    pub address: Option<String>,
    pub image_url: Option<String>,
    pub floorplan_image_url: Option<String>,
    pub map_image_url: Option<String>,
    pub price: i32,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub borough: String,
    pub neighborhood: String,
    pub pets_policy: PetsPolicy,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    pub unit_features: Vec<String>,
    pub building_features: Vec<String>,
    pub subway_lines: Vec<String>,
}

/// Admin listing summary row
#[derive(Debug, Clone, FromRow)]
pub struct ListingSummary {
    pub id: i32,
    pub title: String,
    pub address: Option<String>,
    pub price: i32,
    pub is_active: bool,
    pub borough: String,
    pub neighborhood: String,
    pub updated_at: DateTime<Utc>,
}

/// The six image columns of one listing
#[derive(Debug, Clone, Default, FromRow)]
pub struct ImageRefs {
    pub image_url: Option<String>,
    pub image_public_id: Option<String>,
    pub floorplan_image_url: Option<String>,
    pub floorplan_image_public_id: Option<String>,
    pub map_image_url: Option<String>,
    pub map_image_public_id: Option<String>,
}

impl ImageRefs {
    /// Every media-host asset id referenced by these slots, falling back to
    /// deriving the id from the stored URL when the id column is empty
    pub fn public_ids(&self, host_suffix: &str) -> Vec<String> {
        let slots = [
            (&self.image_public_id, &self.image_url),
            (&self.floorplan_image_public_id, &self.floorplan_image_url),
            (&self.map_image_public_id, &self.map_image_url),
        ];

        let mut ids = Vec::new();
        for (public_id, url) in slots {
            let candidate = public_id.clone().or_else(|| {
                url.as_deref()
                    .and_then(|value| extract_public_id(value, host_suffix))
            });
            if let Some(id) = candidate {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

#[derive(Debug, FromRow)]
struct ListingRowDb {
    id: i32,
    title: String,
    address: Option<String>,
    image_url: Option<String>,
    floorplan_image_url: Option<String>,
    map_image_url: Option<String>,
    price: i32,
    beds: Option<f64>,
    baths: Option<f64>,
    borough: String,
    neighborhood: String,
    pets_policy: PetsPolicy,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

const LISTING_SELECT: &str = "SELECT l.id, l.title, l.address, l.image_url, \
     l.floorplan_image_url, l.map_image_url, l.price, l.beds, l.baths, \
     b.name AS borough, n.name AS neighborhood, l.pets_policy, l.is_active, l.updated_at \
     FROM listings l \
     JOIN boroughs b ON b.id = l.borough_id \
     JOIN neighborhoods n ON n.id = l.neighborhood_id";

const LISTING_COUNT: &str = "SELECT COUNT(*) FROM listings l \
     JOIN boroughs b ON b.id = l.borough_id \
     JOIN neighborhoods n ON n.id = l.neighborhood_id";

/// Listing persistence: CRUD, the compiled filter query, and projections
#[derive(Clone)]
pub struct ListingStore {
    pool: PgPool,
}

impl ListingStore {
    /// Create a listing store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a listing and its association rows in one transaction
    #[instrument(skip(self, write, resolved))]
    pub async fn create_with_associations(
        &self,
        write: &ListingWrite,
        resolved: &ResolvedAssociations,
    ) -> Result<i32> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin listing create transaction")?;

        let listing_id: i32 = sqlx::query_scalar(
            "INSERT INTO listings (title, address, image_url, image_public_id, \
             floorplan_image_url, floorplan_image_public_id, map_image_url, \
             map_image_public_id, price, beds, baths, borough_id, neighborhood_id, \
             pets_policy, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING id",
        )
        .bind(&write.title)
        .bind(&write.address)
        .bind(&write.image.url)
        .bind(&write.image.public_id)
        .bind(&write.floorplan_image.url)
        .bind(&write.floorplan_image.public_id)
        .bind(&write.map_image.url)
        .bind(&write.map_image.public_id)
        .bind(write.price)
        .bind(write.beds)
        .bind(write.baths)
        .bind(write.borough_id)
        .bind(write.neighborhood_id)
        .bind(write.pets_policy)
        .bind(write.is_active)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert listing")?;

        replace_associations(&mut tx, listing_id, resolved).await?;

        tx.commit()
            .await
            .context("Failed to commit listing create")?;

        metrics::counter!("listings.created").increment(1);
        Ok(listing_id)
    }

    /// Full replace of a listing's fields plus association rows.
    /// Returns false when the listing does not exist.
    #[instrument(skip(self, write, resolved))]
    pub async fn update_with_associations(
        &self,
        listing_id: i32,
        write: &ListingWrite,
        resolved: &ResolvedAssociations,
    ) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for listing update")?;

        let result = sqlx::query(
            "UPDATE listings SET title = $1, address = $2, image_url = $3, \
             image_public_id = $4, floorplan_image_url = $5, floorplan_image_public_id = $6, \
             map_image_url = $7, map_image_public_id = $8, price = $9, beds = $10, \
             baths = $11, borough_id = $12, neighborhood_id = $13, pets_policy = $14, \
             is_active = $15, updated_at = NOW() \
             WHERE id = $16",
        )
        .bind(&write.title)
        .bind(&write.address)
        .bind(&write.image.url)
        .bind(&write.image.public_id)
        .bind(&write.floorplan_image.url)
        .bind(&write.floorplan_image.public_id)
        .bind(&write.map_image.url)
        .bind(&write.map_image.public_id)
        .bind(write.price)
        .bind(write.beds)
        .bind(write.baths)
        .bind(write.borough_id)
        .bind(write.neighborhood_id)
        .bind(write.pets_policy)
        .bind(write.is_active)
        .bind(listing_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update listing")?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        replace_associations(&mut conn, listing_id, resolved).await?;

        metrics::counter!("listings.updated").increment(1);
        Ok(true)
    }

    /// Toggle only the active flag. Returns false when absent.
    #[instrument(skip(self))]
    pub async fn set_active(&self, listing_id: i32, is_active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE listings SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(listing_id)
        .bind(is_active)
        .execute(&self.pool)
        .await
        .context("Failed to update listing status")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a listing row; join rows cascade. Returns false when absent.
    #[instrument(skip(self))]
    pub async fn delete(&self, listing_id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(listing_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete listing")?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            metrics::counter!("listings.deleted").increment(1);
        }
        Ok(deleted)
    }

    /// Full projection of one listing
    pub async fn get_detail(&self, listing_id: i32) -> Result<Option<ListingDetail>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(LISTING_SELECT);
        qb.push(" WHERE l.id = ").push_bind(listing_id);

        let row: Option<ListingRowDb> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query listing")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut details = self.attach_associations(vec![row]).await?;
        Ok(details.pop())
    }

    /// Compiled public search: total count plus one page of projections.
    /// Only active listings are visible; `page` is 1-indexed.
    #[instrument(skip(self, filters))]
    pub async fn search_public(
        &self,
        filters: &ListingFilters,
        page: i64,
        limit: i64,
    ) -> Result<(i64, Vec<ListingDetail>)> {
        let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new(LISTING_COUNT);
        count_qb.push(" WHERE l.is_active = TRUE");
        apply_filters(&mut count_qb, filters);

        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count listings")?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(LISTING_SELECT);
        qb.push(" WHERE l.is_active = TRUE");
        apply_filters(&mut qb, filters);
        qb.push(" ORDER BY l.price ASC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);

        let rows: Vec<ListingRowDb> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query listings")?;

        let details = self.attach_associations(rows).await?;
        Ok((total, details))
    }

    /// Admin free-text search over summaries, most recently updated first
    #[instrument(skip(self))]
    pub async fn search_admin(
        &self,
        query: &str,
        page: i64,
        limit: i64,
    ) -> Result<(i64, Vec<ListingSummary>)> {
        let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new(LISTING_COUNT);
        count_qb.push(" WHERE TRUE");
        apply_search(&mut count_qb, query);

        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count admin listings")?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT l.id, l.title, l.address, l.price, l.is_active, \
             b.name AS borough, n.name AS neighborhood, l.updated_at \
             FROM listings l \
             JOIN boroughs b ON b.id = l.borough_id \
             JOIN neighborhoods n ON n.id = l.neighborhood_id",
        );
        qb.push(" WHERE TRUE");
        apply_search(&mut qb, query);
        qb.push(" ORDER BY l.updated_at DESC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);

        let rows: Vec<ListingSummary> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query admin listings")?;

        Ok((total, rows))
    }

    /// Image columns of one listing
    pub async fn image_refs(&self, listing_id: i32) -> Result<Option<ImageRefs>> {
        sqlx::query_as(
            "SELECT image_url, image_public_id, floorplan_image_url, \
             floorplan_image_public_id, map_image_url, map_image_public_id \
             FROM listings WHERE id = $1",
        )
        .bind(listing_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query listing image refs")
    }

    /// Image columns of every listing, for the garbage collector
    pub async fn all_image_refs(&self) -> Result<Vec<ImageRefs>> {
        sqlx::query_as(
            "SELECT image_url, image_public_id, floorplan_image_url, \
             floorplan_image_public_id, map_image_url, map_image_public_id \
             FROM listings",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query listing image refs")
    }

    async fn attach_associations(&self, rows: Vec<ListingRowDb>) -> Result<Vec<ListingDetail>> {
        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();

        let mut unit_features: HashMap<i32, Vec<String>> = HashMap::new();
        let mut building_features: HashMap<i32, Vec<String>> = HashMap::new();
        let mut subway_lines: HashMap<i32, Vec<String>> = HashMap::new();

        if !ids.is_empty() {
            let feature_rows: Vec<(i32, FeatureType, String)> = sqlx::query_as(
                "SELECT lf.listing_id, f.feature_type, f.name \
                 FROM listing_features lf \
                 JOIN features f ON f.id = lf.feature_id \
                 WHERE lf.listing_id = ANY($1) \
                 ORDER BY f.name",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query listing features")?;

            for (listing_id, feature_type, name) in feature_rows {
                match feature_type {
                    FeatureType::Unit => unit_features.entry(listing_id).or_default().push(name),
                    FeatureType::Building => {
                        building_features.entry(listing_id).or_default().push(name)
                    }
                }
            }

            let line_rows: Vec<(i32, String)> = sqlx::query_as(
                "SELECT ls.listing_id, s.line_code \
                 FROM listing_subway_lines ls \
                 JOIN subway_lines s ON s.id = ls.subway_line_id \
                 WHERE ls.listing_id = ANY($1) \
                 ORDER BY s.line_code",
            )
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query listing subway lines")?;

            for (listing_id, line_code) in line_rows {
                subway_lines.entry(listing_id).or_default().push(line_code);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| ListingDetail {
                unit_features: unit_features.remove(&row.id).unwrap_or_default(),
                building_features: building_features.remove(&row.id).unwrap_or_default(),
                subway_lines: subway_lines.remove(&row.id).unwrap_or_default(),
                id: row.id,
                title: row.title,
                address: row.address,
                image_url: row.image_url,
                floorplan_image_url: row.floorplan_image_url,
                map_image_url: row.map_image_url,
                price: row.price,
                beds: row.beds,
                baths: row.baths,
                borough: row.borough,
                neighborhood: row.neighborhood,
                pets_policy: row.pets_policy,
                is_active: row.is_active,
                updated_at: row.updated_at,
            })
            .collect())
    }
}

/// Total page count for a result set: `ceil(total / limit)`, at least 1
pub fn total_pages(total: i64, limit: i64) -> i64 {
    ((total + limit - 1) / limit).max(1)
}

/// Append the public filter predicate to a query that already has a WHERE
fn apply_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &ListingFilters) {
    if let Some(min_price) = filters.min_price {
        qb.push(" AND l.price >= ").push_bind(min_price);
    }
    if let Some(max_price) = filters.max_price {
        qb.push(" AND l.price <= ").push_bind(max_price);
    }
    if let Some(min_beds) = filters.min_beds {
        qb.push(" AND l.beds >= ").push_bind(min_beds);
    }
    if let Some(min_baths) = filters.min_baths {
        qb.push(" AND l.baths >= ").push_bind(min_baths);
    }

    if !filters.boroughs.is_empty() {
        let lowered: Vec<String> = filters.boroughs.iter().map(|b| b.to_lowercase()).collect();
        qb.push(" AND lower(b.name) = ANY(").push_bind(lowered).push(")");
    }

    if !filters.neighborhoods.is_empty() {
        let lowered: Vec<String> = filters
            .neighborhoods
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        qb.push(" AND lower(n.name) = ANY(").push_bind(lowered).push(")");
    }

    if let Some(pets_policy) = filters.pets_policy {
        qb.push(" AND l.pets_policy = ").push_bind(pets_policy);
    }

    // Conjunctive: one existence check per requested feature.
    for feature in &filters.features {
        qb.push(
            " AND EXISTS (SELECT 1 FROM listing_features lf \
             JOIN features f ON f.id = lf.feature_id \
             WHERE lf.listing_id = l.id AND lower(f.name) = ",
        )
        .push_bind(feature.to_lowercase())
        .push(")");
    }

    // Disjunctive: any requested line qualifies.
    if !filters.subway_lines.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM listing_subway_lines ls \
             JOIN subway_lines s ON s.id = ls.subway_line_id \
             WHERE ls.listing_id = l.id AND s.line_code = ANY(",
        )
        .push_bind(filters.subway_lines.clone())
        .push("))");
    }
}

/// Append the admin free-text predicate: substring match on title, address,
/// neighborhood and borough names for the whole phrase and each of at most
/// six terms, plus an exact id match for positive integer queries
fn apply_search(qb: &mut QueryBuilder<'_, Postgres>, query: &str) {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return;
    }

    let mut needles: Vec<&str> = vec![trimmed];
    needles.extend(trimmed.split_whitespace().take(6));

    qb.push(" AND (");
    let mut first = true;
    for needle in &needles {
        let pattern = format!("%{needle}%");
        for column in ["l.address", "l.title", "n.name", "b.name"] {
            if !first {
                qb.push(" OR ");
            }
            first = false;
            qb.push(column).push(" ILIKE ").push_bind(pattern.clone());
        }
    }

    if let Ok(id) = trimmed.parse::<i32>() {
        if id > 0 {
            qb.push(" OR l.id = ").push_bind(id);
        }
    }

    qb.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(total_pages(0, 12), 1);
        assert_eq!(total_pages(1, 12), 1);
        assert_eq!(total_pages(12, 12), 1);
        assert_eq!(total_pages(13, 12), 2);
        assert_eq!(total_pages(100, 25), 4);
        assert_eq!(total_pages(101, 25), 5);
    }

    #[test]
    fn test_apply_filters_is_conjunctive_over_features() {
        let filters = ListingFilters {
            features: vec!["Elevator".to_string(), "Gym".to_string()],
            ..Default::default()
        };

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_filters(&mut qb, &filters);
        let sql = qb.sql();

        assert_eq!(sql.matches("EXISTS (SELECT 1 FROM listing_features").count(), 2);
    }

    #[test]
    fn test_apply_filters_is_disjunctive_over_subway_lines() {
        let filters = ListingFilters {
            subway_lines: vec!["L".to_string(), "G".to_string()],
            ..Default::default()
        };

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_filters(&mut qb, &filters);
        let sql = qb.sql();

        // One existence check total, with an any-of match inside.
        assert_eq!(
            sql.matches("EXISTS (SELECT 1 FROM listing_subway_lines").count(),
            1
        );
        assert!(sql.contains("s.line_code = ANY("));
    }

    #[test]
    fn test_apply_filters_empty_adds_nothing() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_filters(&mut qb, &ListingFilters::default());
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn test_apply_search_caps_terms_and_matches_ids() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_search(&mut qb, "a b c d e f g h");
        let sql = qb.sql();

        // Whole phrase plus six terms, four columns each.
        assert_eq!(sql.matches("ILIKE").count(), 4 * 7);
        assert!(!sql.contains("l.id ="));

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_search(&mut qb, "42");
        assert!(qb.sql().contains("l.id ="));

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_search(&mut qb, "-42");
        assert!(!qb.sql().contains("l.id ="));
    }

    #[test]
    fn test_apply_search_blank_adds_nothing() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 WHERE TRUE");
        apply_search(&mut qb, "   ");
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn test_pets_policy_parse() {
        assert_eq!(PetsPolicy::parse("ALLOWED"), Some(PetsPolicy::Allowed));
        assert_eq!(PetsPolicy::parse("CATS_ONLY"), Some(PetsPolicy::CatsOnly));
        assert_eq!(PetsPolicy::parse("cats_only"), None);
        assert_eq!(PetsPolicy::parse(""), None);
    }

    #[test]
    fn test_image_refs_public_ids_fall_back_to_urls() {
        let refs = ImageRefs {
            image_url: Some(
                "https://res.cloudinary.com/demo/image/upload/v1/listings/main.jpg".to_string(),
            ),
            image_public_id: None,
            floorplan_image_url: Some("https://elsewhere.example.org/plan.png".to_string()),
            floorplan_image_public_id: None,
            map_image_url: None,
            map_image_public_id: Some("listings/map".to_string()),
        };

        let ids = refs.public_ids("cloudinary.com");
        assert_eq!(ids, vec!["listings/main".to_string(), "listings/map".to_string()]);
    }

    #[test]
    fn test_image_refs_prefer_stored_public_id() {
        let refs = ImageRefs {
            image_url: Some(
                "https://res.cloudinary.com/demo/image/upload/v1/listings/from-url.jpg".to_string(),
            ),
            image_public_id: Some("listings/stored".to_string()),
            ..Default::default()
        };

        assert_eq!(refs.public_ids("cloudinary.com"), vec!["listings/stored".to_string()]);
    }
}
