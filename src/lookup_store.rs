use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, instrument};

/// Scope of a feature: the unit itself or the building around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "feature_type", rename_all = "UPPERCASE")]
pub enum FeatureType {
    Unit,
    Building,
}

/// Borough row
#[derive(Debug, Clone, FromRow)]
pub struct Borough {
    pub id: i32,
    pub name: String,
}

/// Neighborhood row
#[derive(Debug, Clone, FromRow)]
pub struct Neighborhood {
    pub id: i32,
    pub borough_id: i32,
    pub name: String,
}

/// Feature row
#[derive(Debug, Clone, FromRow)]
pub struct Feature {
    pub id: i32,
    pub feature_type: FeatureType,
    pub name: String,
}

/// Subway line row
#[derive(Debug, Clone, FromRow)]
pub struct SubwayLine {
    pub id: i32,
    pub line_code: String,
}

/// Neighborhood name paired with its borough name, for the filter vocabulary
#[derive(Debug, Clone, FromRow)]
pub struct NeighborhoodEntry {
    pub borough: String,
    pub name: String,
}

/// Line code observed on an active listing in a borough
#[derive(Debug, Clone, FromRow)]
pub struct BoroughLine {
    pub borough: String,
    pub line_code: String,
}

/// Reference tables resolved by name: boroughs, neighborhoods, features,
/// subway lines. Rows are created lazily on first reference and never
/// updated or deleted here.
#[derive(Clone)]
pub struct LookupStore {
    pool: PgPool,
}

impl LookupStore {
    /// Create a lookup store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a borough by name (case-insensitive) or create it.
    ///
    /// Two requests can race past the SELECT and both attempt the INSERT;
    /// the loser hits the uniqueness constraint and re-reads the winner's row.
    #[instrument(skip(self))]
    pub async fn resolve_borough(&self, name: &str) -> Result<Borough> {
        let select = "SELECT id, name FROM boroughs WHERE lower(name) = lower($1)";

        if let Some(existing) = sqlx::query_as::<_, Borough>(select)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query borough")?
        {
            return Ok(existing);
        }

        match sqlx::query_as::<_, Borough>("INSERT INTO boroughs (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
        {
            Ok(created) => {
                debug!(borough = %created.name, "Created borough");
                Ok(created)
            }
            Err(err) if is_unique_violation(&err) => sqlx::query_as::<_, Borough>(select)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .context("Failed to re-read borough after losing creation race"),
            Err(err) => Err(err).context("Failed to create borough"),
        }
    }

    /// Find a neighborhood by name within a borough (case-insensitive) or create it
    #[instrument(skip(self))]
    pub async fn resolve_neighborhood(&self, borough_id: i32, name: &str) -> Result<Neighborhood> {
        let select = "SELECT id, borough_id, name FROM neighborhoods \
                      WHERE borough_id = $1 AND lower(name) = lower($2)";

        if let Some(existing) = sqlx::query_as::<_, Neighborhood>(select)
            .bind(borough_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query neighborhood")?
        {
            return Ok(existing);
        }

        match sqlx::query_as::<_, Neighborhood>(
            "INSERT INTO neighborhoods (borough_id, name) VALUES ($1, $2) \
             RETURNING id, borough_id, name",
        )
        .bind(borough_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        {
            Ok(created) => {
                debug!(neighborhood = %created.name, "Created neighborhood");
                Ok(created)
            }
            Err(err) if is_unique_violation(&err) => sqlx::query_as::<_, Neighborhood>(select)
                .bind(borough_id)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .context("Failed to re-read neighborhood after losing creation race"),
            Err(err) => Err(err).context("Failed to create neighborhood"),
        }
    }

    /// Find a feature by scoped name (case-insensitive) or create it
    #[instrument(skip(self))]
    pub async fn resolve_feature(&self, feature_type: FeatureType, name: &str) -> Result<Feature> {
        let select = "SELECT id, feature_type, name FROM features \
                      WHERE feature_type = $1 AND lower(name) = lower($2)";

        if let Some(existing) = sqlx::query_as::<_, Feature>(select)
            .bind(feature_type)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query feature")?
        {
            return Ok(existing);
        }

        match sqlx::query_as::<_, Feature>(
            "INSERT INTO features (feature_type, name) VALUES ($1, $2) \
             RETURNING id, feature_type, name",
        )
        .bind(feature_type)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        {
            Ok(created) => {
                debug!(feature = %created.name, "Created feature");
                Ok(created)
            }
            Err(err) if is_unique_violation(&err) => sqlx::query_as::<_, Feature>(select)
                .bind(feature_type)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .context("Failed to re-read feature after losing creation race"),
            Err(err) => Err(err).context("Failed to create feature"),
        }
    }

    /// Find a subway line by upper-cased code or create it
    #[instrument(skip(self))]
    pub async fn resolve_subway_line(&self, line_code: &str) -> Result<SubwayLine> {
        let select = "SELECT id, line_code FROM subway_lines WHERE line_code = $1";

        if let Some(existing) = sqlx::query_as::<_, SubwayLine>(select)
            .bind(line_code)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query subway line")?
        {
            return Ok(existing);
        }

        match sqlx::query_as::<_, SubwayLine>(
            "INSERT INTO subway_lines (line_code) VALUES ($1) RETURNING id, line_code",
        )
        .bind(line_code)
        .fetch_one(&self.pool)
        .await
        {
            Ok(created) => {
                debug!(line_code = %created.line_code, "Created subway line");
                Ok(created)
            }
            Err(err) if is_unique_violation(&err) => sqlx::query_as::<_, SubwayLine>(select)
                .bind(line_code)
                .fetch_one(&self.pool)
                .await
                .context("Failed to re-read subway line after losing creation race"),
            Err(err) => Err(err).context("Failed to create subway line"),
        }
    }

    /// All borough names, alphabetical
    pub async fn list_borough_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM boroughs ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list boroughs")
    }

    /// All neighborhoods with their borough names, alphabetical within borough
    pub async fn list_neighborhoods(&self) -> Result<Vec<NeighborhoodEntry>> {
        sqlx::query_as(
            "SELECT b.name AS borough, n.name AS name \
             FROM neighborhoods n \
             JOIN boroughs b ON b.id = n.borough_id \
             ORDER BY b.name, n.name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list neighborhoods")
    }

    /// Feature names of one scope, alphabetical
    pub async fn list_feature_names(&self, feature_type: FeatureType) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT name FROM features WHERE feature_type = $1 ORDER BY name")
            .bind(feature_type)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list features")
    }

    /// Every known transit line code
    pub async fn list_line_codes(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT line_code FROM subway_lines ORDER BY line_code")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list subway lines")
    }

    /// Line codes actually attached to active listings, per borough name
    pub async fn observed_lines_by_borough(&self) -> Result<Vec<BoroughLine>> {
        sqlx::query_as(
            "SELECT DISTINCT b.name AS borough, s.line_code AS line_code \
             FROM listings l \
             JOIN boroughs b ON b.id = l.borough_id \
             JOIN listing_subway_lines ls ON ls.listing_id = l.id \
             JOIN subway_lines s ON s.id = ls.subway_line_id \
             WHERE l.is_active",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list observed subway lines")
    }
}

/// Postgres unique_violation, the signal that another request won a
/// find-or-create race
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}
