use crate::lookup_store::{FeatureType, LookupStore};
use anyhow::{Context, Result};
use sqlx::postgres::PgPool;
use sqlx::PgConnection;
use tracing::{debug, instrument};

/// Desired final association sets for one listing, already normalized
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredAssociations {
    pub unit_features: Vec<String>,
    pub building_features: Vec<String>,
    pub subway_lines: Vec<String>,
}

impl DesiredAssociations {
    /// Normalize raw input lists: trim, drop empties, de-duplicate
    /// case-insensitively keeping first-seen casing; upper-case line codes.
    pub fn normalized(
        unit_features: &[String],
        building_features: &[String],
        subway_lines: &[String],
    ) -> Self {
        Self {
            unit_features: normalize_names(unit_features),
            building_features: normalize_names(building_features),
            subway_lines: normalize_names(subway_lines)
                .into_iter()
                .map(|code| code.to_uppercase())
                .collect(),
        }
    }
}

/// Lookup row ids backing a `DesiredAssociations`
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssociations {
    pub feature_ids: Vec<i32>,
    pub subway_line_ids: Vec<i32>,
}

/// Reconciles listing many-to-many rows to a desired final state.
///
/// The strategy is replace-all: delete every join row for the listing, then
/// insert the resolved id set. Calling twice with the same input yields the
/// same final state, so a partially failed sync heals on retry.
#[derive(Clone)]
pub struct AssociationSynchronizer {
    pool: PgPool,
    lookups: LookupStore,
}

impl AssociationSynchronizer {
    /// Create a synchronizer over an existing pool
    pub fn new(pool: PgPool, lookups: LookupStore) -> Self {
        Self { pool, lookups }
    }

    /// Resolve desired names/codes into lookup row ids, creating lookup
    /// rows on first reference
    #[instrument(skip(self, desired))]
    pub async fn resolve(&self, desired: &DesiredAssociations) -> Result<ResolvedAssociations> {
        let mut feature_ids = Vec::new();
        for name in &desired.unit_features {
            feature_ids.push(self.lookups.resolve_feature(FeatureType::Unit, name).await?.id);
        }
        for name in &desired.building_features {
            feature_ids.push(
                self.lookups
                    .resolve_feature(FeatureType::Building, name)
                    .await?
                    .id,
            );
        }
        feature_ids.sort_unstable();
        feature_ids.dedup();

        let mut subway_line_ids = Vec::new();
        for code in &desired.subway_lines {
            subway_line_ids.push(self.lookups.resolve_subway_line(code).await?.id);
        }
        subway_line_ids.sort_unstable();
        subway_line_ids.dedup();

        Ok(ResolvedAssociations {
            feature_ids,
            subway_line_ids,
        })
    }

    /// Resolve and replace a listing's association rows on a pool connection
    #[instrument(skip(self, desired))]
    pub async fn sync_listing(&self, listing_id: i32, desired: &DesiredAssociations) -> Result<()> {
        let resolved = self.resolve(desired).await?;

        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for association sync")?;

        replace_associations(&mut conn, listing_id, &resolved).await
    }
}

/// Swap a listing's join rows for exactly the resolved id sets.
///
/// Runs on `&mut PgConnection` so the listing-creation path can execute it
/// inside the same transaction as the listing INSERT.
pub async fn replace_associations(
    conn: &mut PgConnection,
    listing_id: i32,
    resolved: &ResolvedAssociations,
) -> Result<()> {
    sqlx::query("DELETE FROM listing_features WHERE listing_id = $1")
        .bind(listing_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear listing features")?;

    if !resolved.feature_ids.is_empty() {
        sqlx::query(
            "INSERT INTO listing_features (listing_id, feature_id) \
             SELECT $1, unnest($2::int4[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(listing_id)
        .bind(&resolved.feature_ids)
        .execute(&mut *conn)
        .await
        .context("Failed to insert listing features")?;
    }

    sqlx::query("DELETE FROM listing_subway_lines WHERE listing_id = $1")
        .bind(listing_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear listing subway lines")?;

    if !resolved.subway_line_ids.is_empty() {
        sqlx::query(
            "INSERT INTO listing_subway_lines (listing_id, subway_line_id) \
             SELECT $1, unnest($2::int4[]) \
             ON CONFLICT DO NOTHING",
        )
        .bind(listing_id)
        .bind(&resolved.subway_line_ids)
        .execute(&mut *conn)
        .await
        .context("Failed to insert listing subway lines")?;
    }

    debug!(
        listing_id,
        features = resolved.feature_ids.len(),
        subway_lines = resolved.subway_line_ids.len(),
        "Replaced listing associations"
    );

    Ok(())
}

fn normalize_names(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_lowercase()) {
            out.push(value.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_keeps_first_seen_casing() {
        let normalized = normalize_names(&strings(&["Balcony", "balcony", " BALCONY ", "Gym"]));
        assert_eq!(normalized, strings(&["Balcony", "Gym"]));
    }

    #[test]
    fn test_normalize_drops_blank_entries() {
        let normalized = normalize_names(&strings(&["", "  ", "Doorman"]));
        assert_eq!(normalized, strings(&["Doorman"]));
    }

    #[test]
    fn test_desired_associations_uppercase_line_codes() {
        let desired = DesiredAssociations::normalized(
            &strings(&["Balcony"]),
            &[],
            &strings(&["n", "w", "N "]),
        );

        assert_eq!(desired.subway_lines, strings(&["N", "W"]));
        assert_eq!(desired.unit_features, strings(&["Balcony"]));
        assert!(desired.building_features.is_empty());
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let first = DesiredAssociations::normalized(
            &strings(&["Balcony", "balcony"]),
            &strings(&["Gym"]),
            &strings(&["l", "g"]),
        );
        let second = DesiredAssociations::normalized(
            &first.unit_features,
            &first.building_features,
            &first.subway_lines,
        );

        assert_eq!(first, second);
    }
}
