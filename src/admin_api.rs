use crate::api::{
    admin_not_configured, internal_error, media_error, not_found, unauthorized, validation_error,
    ApiError, AppState, FieldIssue,
};
use crate::listing_store::{
    total_pages, ImageRef, ListingDetail, ListingSummary, ListingWrite, PetsPolicy,
};
use crate::listings_api::{parse_limit, parse_page};
use crate::media_library::{resolve_image, ResolvedImage};
use crate::sync::DesiredAssociations;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{error, instrument, warn};

/// Largest page the admin surface serves
pub const ADMIN_MAX_LIMIT: i64 = 100;
/// Default admin page size
pub const ADMIN_DEFAULT_LIMIT: i64 = 25;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Generic `{ data: ... }` envelope
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Full admin projection of a listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListing {
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

impl From<ListingDetail> for AdminListing {
    fn from(detail: ListingDetail) -> Self {
        Self {
            id: detail.id,
            title: detail.title,
            address: detail.address,
            image_url: detail.image_url,
            floorplan_image_url: detail.floorplan_image_url,
            map_image_url: detail.map_image_url,
            price: detail.price,
            beds: detail.beds,
            baths: detail.baths,
            borough: detail.borough,
            neighborhood: detail.neighborhood,
            pets_policy: detail.pets_policy,
            is_active: detail.is_active,
            updated_at: detail.updated_at,
            unit_features: detail.unit_features,
            building_features: detail.building_features,
            subway_lines: detail.subway_lines,
        }
    }
}

/// Admin listing summary row
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub id: i32,
    pub title: String,
    pub address: Option<String>,
    pub price: i32,
    pub is_active: bool,
    pub borough: String,
    pub neighborhood: String,
    pub updated_at: DateTime<Utc>,
}

impl From<ListingSummary> for AdminSummary {
    fn from(summary: ListingSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            address: summary.address,
            price: summary.price,
            is_active: summary.is_active,
            borough: summary.borough,
            neighborhood: summary.neighborhood,
            updated_at: summary.updated_at,
        }
    }
}

/// Paginated admin list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub data: Vec<AdminSummary>,
}

/// Deletion acknowledgement
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u32,
    pub id: i32,
}

/// Raw admin list query, validated before use
#[derive(Debug, Default, Deserialize)]
pub struct AdminListQuery {
    q: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

/// Listing write payload as received; `validate` produces the typed form
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPayload {
    title: Option<String>,
    address: Option<String>,
    image_url: Option<String>,
    floorplan_image_url: Option<String>,
    map_image_url: Option<String>,
    price: Option<i64>,
    beds: Option<f64>,
    baths: Option<f64>,
    borough: Option<String>,
    neighborhood: Option<String>,
    pets_policy: Option<String>,
    is_active: Option<bool>,
    #[serde(default)]
    unit_features: Vec<String>,
    #[serde(default)]
    building_features: Vec<String>,
    #[serde(default)]
    subway_lines: Vec<String>,
}

/// Validated listing write payload
#[derive(Debug)]
pub struct ValidatedListing {
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
    pub associations: DesiredAssociations,
}

impl ListingPayload {
    /// Check every constraint, producing either a typed payload or the full
    /// list of field problems. Nothing is mutated on failure.
    pub fn validate(&self) -> Result<ValidatedListing, Vec<FieldIssue>> {
        let mut issues = Vec::new();

        let title = required_trimmed(self.title.as_deref(), "title", &mut issues);
        let borough = required_trimmed(self.borough.as_deref(), "borough", &mut issues);
        let neighborhood = required_trimmed(self.neighborhood.as_deref(), "neighborhood", &mut issues);

        let price = match self.price {
            Some(value) if (0..=i32::MAX as i64).contains(&value) => value as i32,
            Some(_) => {
                issues.push(FieldIssue::new("price", "must be a non-negative integer"));
                0
            }
            None => {
                issues.push(FieldIssue::new("price", "is required"));
                0
            }
        };

        let beds = bounded_count(self.beds, "beds", &mut issues);
        let baths = bounded_count(self.baths, "baths", &mut issues);

        let pets_policy = match self.pets_policy.as_deref().map(str::trim) {
            None | Some("") => PetsPolicy::CaseByCase,
            Some(raw) => match PetsPolicy::parse(raw) {
                Some(policy) => policy,
                None => {
                    issues.push(FieldIssue::new("petsPolicy", "is not a known pets policy"));
                    PetsPolicy::CaseByCase
                }
            },
        };

        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(ValidatedListing {
            title,
            address: optional_trimmed(self.address.as_deref()),
            image_url: optional_trimmed(self.image_url.as_deref()),
            floorplan_image_url: optional_trimmed(self.floorplan_image_url.as_deref()),
            map_image_url: optional_trimmed(self.map_image_url.as_deref()),
            price,
            beds,
            baths,
            borough,
            neighborhood,
            pets_policy,
            is_active: self.is_active.unwrap_or(true),
            associations: DesiredAssociations::normalized(
                &self.unit_features,
                &self.building_features,
                &self.subway_lines,
            ),
        })
    }
}

/// Status toggle payload
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    is_active: Option<bool>,
}

fn required_trimmed(raw: Option<&str>, field: &str, issues: &mut Vec<FieldIssue>) -> String {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_string(),
        None => {
            issues.push(FieldIssue::new(field, "is required"));
            String::new()
        }
    }
}

fn optional_trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn bounded_count(value: Option<f64>, field: &str, issues: &mut Vec<FieldIssue>) -> Option<f64> {
    match value {
        Some(count) if (0.0..=20.0).contains(&count) => Some(count),
        Some(_) => {
            issues.push(FieldIssue::new(field, "must be between 0 and 20"));
            None
        }
        None => None,
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let secret = state
        .admin_secret
        .as_deref()
        .ok_or_else(admin_not_configured)?;

    let supplied = headers.get(ADMIN_KEY_HEADER).and_then(|value| value.to_str().ok());
    if supplied != Some(secret) {
        return Err(unauthorized());
    }

    Ok(())
}

fn parse_listing_id(raw: &str) -> Result<i32, ApiError> {
    match raw.trim().parse::<i32>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(validation_error(
            "Invalid listing id",
            vec![FieldIssue::new("id", "must be a positive integer")],
        )),
    }
}

/// The three image slots of a write, after resolution
struct ResolvedImages {
    image: ResolvedImage,
    floorplan: ResolvedImage,
    map: ResolvedImage,
}

impl ResolvedImages {
    /// Asset ids this request freshly uploaded, for rollback on failure
    fn uploaded_ids(&self) -> Vec<String> {
        [&self.image, &self.floorplan, &self.map]
            .into_iter()
            .filter(|slot| slot.uploaded)
            .filter_map(|slot| slot.public_id.clone())
            .collect()
    }

    /// Every asset id the write will reference
    fn public_ids(&self) -> HashSet<String> {
        [&self.image, &self.floorplan, &self.map]
            .into_iter()
            .filter_map(|slot| slot.public_id.clone())
            .collect()
    }
}

/// Resolve all three image slots, rolling back any fresh upload when a
/// later slot fails
async fn resolve_images(state: &AppState, payload: &ValidatedListing) -> Result<ResolvedImages, ApiError> {
    let media = state.media.as_deref();
    let inputs = [
        payload.image_url.as_deref(),
        payload.floorplan_image_url.as_deref(),
        payload.map_image_url.as_deref(),
    ];

    let mut resolved: Vec<ResolvedImage> = Vec::with_capacity(inputs.len());
    for input in inputs {
        match resolve_image(input, media, &state.delivery_host_suffix).await {
            Ok(image) => resolved.push(image),
            Err(err) => {
                let uploaded: Vec<String> = resolved
                    .iter()
                    .filter(|slot| slot.uploaded)
                    .filter_map(|slot| slot.public_id.clone())
                    .collect();
                discard_assets(state, &uploaded, "upload rollback").await;

                error!(error = %err, "Failed to resolve listing image");
                return Err(media_error(&err));
            }
        }
    }

    let map = resolved.pop().unwrap_or_default();
    let floorplan = resolved.pop().unwrap_or_default();
    let image = resolved.pop().unwrap_or_default();

    Ok(ResolvedImages { image, floorplan, map })
}

/// Best-effort asset deletion: failures are logged and swallowed so they
/// never block the primary write path
async fn discard_assets(state: &AppState, public_ids: &[String], reason: &str) {
    if public_ids.is_empty() {
        return;
    }
    let Some(media) = state.media.as_deref() else {
        return;
    };

    if let Err(err) = media.delete_assets(public_ids).await {
        warn!(
            error = %err,
            count = public_ids.len(),
            reason,
            "Failed to delete media assets"
        );
    }
}

fn listing_write(payload: &ValidatedListing, images: &ResolvedImages, borough_id: i32, neighborhood_id: i32) -> ListingWrite {
    ListingWrite {
        title: payload.title.clone(),
        address: payload.address.clone(),
        image: ImageRef::from(images.image.clone()),
        floorplan_image: ImageRef::from(images.floorplan.clone()),
        map_image: ImageRef::from(images.map.clone()),
        price: payload.price,
        beds: payload.beds,
        baths: payload.baths,
        borough_id,
        neighborhood_id,
        pets_policy: payload.pets_policy,
        is_active: payload.is_active,
    }
}

/// Search/list admin summaries
#[instrument(skip(state, headers))]
pub async fn list_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(raw): Query<AdminListQuery>,
) -> Result<Json<AdminListResponse>, ApiError> {
    require_admin(&state, &headers)?;

    let mut issues = Vec::new();
    let page = parse_page(raw.page.as_deref(), &mut issues);
    let limit = parse_limit(raw.limit.as_deref(), ADMIN_DEFAULT_LIMIT, ADMIN_MAX_LIMIT, &mut issues);
    if !issues.is_empty() {
        return Err(validation_error("Invalid query params", issues));
    }

    let query = raw.q.as_deref().unwrap_or("");
    let (total, rows) = state
        .listings
        .search_admin(query, page, limit)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to fetch admin listings");
            internal_error("Failed to fetch admin listings")
        })?;

    Ok(Json(AdminListResponse {
        page,
        limit,
        total,
        total_pages: total_pages(total, limit),
        data: rows.into_iter().map(AdminSummary::from).collect(),
    }))
}

/// Full detail for one listing
#[instrument(skip(state, headers))]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<AdminListing>>, ApiError> {
    require_admin(&state, &headers)?;
    let listing_id = parse_listing_id(&raw_id)?;

    let detail = state
        .listings
        .get_detail(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to fetch listing");
            internal_error("Failed to fetch listing")
        })?
        .ok_or_else(not_found)?;

    Ok(Json(DataResponse {
        data: AdminListing::from(detail),
    }))
}

/// Create a listing: resolve assets, resolve location lookups, insert with
/// associations in one transaction, read the projection back
#[instrument(skip(state, headers, payload))]
pub async fn create_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ListingPayload>,
) -> Result<(StatusCode, Json<DataResponse<AdminListing>>), ApiError> {
    require_admin(&state, &headers)?;

    let valid = payload
        .validate()
        .map_err(|issues| validation_error("Invalid body", issues))?;

    let images = resolve_images(&state, &valid).await?;
    let uploaded = images.uploaded_ids();

    let listing_id = match persist_listing(&state, &valid, &images, None).await {
        Ok(id) => id,
        Err(err) => {
            // The write failed after the media host accepted new assets.
            discard_assets(&state, &uploaded, "create rollback").await;
            return Err(err);
        }
    };

    let detail = state
        .listings
        .get_detail(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to read back created listing");
            internal_error("Failed to create listing")
        })?
        .ok_or_else(|| internal_error("Listing create readback returned empty result"))?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: AdminListing::from(detail),
        }),
    ))
}

/// Full replace of fields, image slots, and associations
#[instrument(skip(state, headers, payload))]
pub async fn update_listing(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ListingPayload>,
) -> Result<Json<DataResponse<AdminListing>>, ApiError> {
    require_admin(&state, &headers)?;
    let listing_id = parse_listing_id(&raw_id)?;

    let valid = payload
        .validate()
        .map_err(|issues| validation_error("Invalid body", issues))?;

    let previous = state
        .listings
        .image_refs(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to fetch listing image refs");
            internal_error("Failed to update listing")
        })?
        .ok_or_else(not_found)?;

    let images = resolve_images(&state, &valid).await?;
    let uploaded = images.uploaded_ids();

    if let Err(err) = persist_listing(&state, &valid, &images, Some(listing_id)).await {
        discard_assets(&state, &uploaded, "update rollback").await;
        return Err(err);
    }

    // The update committed; previous assets the new payload no longer
    // references are orphans now.
    let kept = images.public_ids();
    let stale: Vec<String> = previous
        .public_ids(&state.delivery_host_suffix)
        .into_iter()
        .filter(|id| !kept.contains(id))
        .collect();
    discard_assets(&state, &stale, "replaced assets").await;

    let detail = state
        .listings
        .get_detail(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to read back updated listing");
            internal_error("Failed to update listing")
        })?
        .ok_or_else(not_found)?;

    Ok(Json(DataResponse {
        data: AdminListing::from(detail),
    }))
}

/// Resolve location lookups and association ids, then insert or update.
/// `existing_id` selects the transactional create path or the update path.
async fn persist_listing(
    state: &AppState,
    valid: &ValidatedListing,
    images: &ResolvedImages,
    existing_id: Option<i32>,
) -> Result<i32, ApiError> {
    let borough = state.lookups.resolve_borough(&valid.borough).await.map_err(|err| {
        error!(error = %err, "Failed to resolve borough");
        internal_error("Failed to save listing")
    })?;

    let neighborhood = state
        .lookups
        .resolve_neighborhood(borough.id, &valid.neighborhood)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to resolve neighborhood");
            internal_error("Failed to save listing")
        })?;

    let resolved = state.sync.resolve(&valid.associations).await.map_err(|err| {
        error!(error = %err, "Failed to resolve listing associations");
        internal_error("Failed to save listing")
    })?;

    let write = listing_write(valid, images, borough.id, neighborhood.id);

    match existing_id {
        None => state
            .listings
            .create_with_associations(&write, &resolved)
            .await
            .map_err(|err| {
                error!(error = %err, "Failed to create listing");
                internal_error("Failed to create listing")
            }),
        Some(listing_id) => {
            let found = state
                .listings
                .update_with_associations(listing_id, &write, &resolved)
                .await
                .map_err(|err| {
                    error!(error = %err, "Failed to update listing");
                    internal_error("Failed to update listing")
                })?;

            if !found {
                return Err(not_found());
            }
            Ok(listing_id)
        }
    }
}

/// Toggle only the active flag
#[instrument(skip(state, headers))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<DataResponse<AdminListing>>, ApiError> {
    require_admin(&state, &headers)?;
    let listing_id = parse_listing_id(&raw_id)?;

    let is_active = payload.is_active.ok_or_else(|| {
        validation_error(
            "Invalid body",
            vec![FieldIssue::new("isActive", "is required")],
        )
    })?;

    let found = state
        .listings
        .set_active(listing_id, is_active)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to update listing status");
            internal_error("Failed to update listing status")
        })?;

    if !found {
        return Err(not_found());
    }

    let detail = state
        .listings
        .get_detail(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to read back listing");
            internal_error("Failed to update listing status")
        })?
        .ok_or_else(not_found)?;

    Ok(Json(DataResponse {
        data: AdminListing::from(detail),
    }))
}

/// Delete a listing row, then its referenced assets (best effort)
#[instrument(skip(state, headers))]
pub async fn delete_listing(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let listing_id = parse_listing_id(&raw_id)?;

    let refs = state
        .listings
        .image_refs(listing_id)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to fetch listing image refs");
            internal_error("Failed to delete listing")
        })?
        .ok_or_else(not_found)?;

    let deleted = state.listings.delete(listing_id).await.map_err(|err| {
        error!(error = %err, "Failed to delete listing");
        internal_error("Failed to delete listing")
    })?;

    if !deleted {
        return Err(not_found());
    }

    let assets = refs.public_ids(&state.delivery_host_suffix);
    discard_assets(&state, &assets, "listing deleted").await;

    Ok(Json(DeleteResponse {
        deleted: 1,
        id: listing_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_payload() -> ListingPayload {
        ListingPayload {
            title: Some("Test".to_string()),
            price: Some(2000),
            borough: Some("Queens".to_string()),
            neighborhood: Some("Astoria".to_string()),
            unit_features: vec!["Balcony".to_string()],
            subway_lines: vec!["n".to_string(), "w".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_applies_defaults_and_normalizes() {
        let valid = base_payload().validate().unwrap();

        assert_eq!(valid.title, "Test");
        assert_eq!(valid.price, 2000);
        assert_eq!(valid.pets_policy, PetsPolicy::CaseByCase);
        assert!(valid.is_active);
        assert_eq!(valid.associations.subway_lines, vec!["N", "W"]);
        assert_eq!(valid.associations.unit_features, vec!["Balcony"]);
    }

    #[test]
    fn test_validate_requires_title_price_location() {
        let issues = ListingPayload::default().validate().unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|issue| issue.field.as_str()).collect();

        assert!(fields.contains(&"title"));
        assert!(fields.contains(&"price"));
        assert!(fields.contains(&"borough"));
        assert!(fields.contains(&"neighborhood"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut payload = base_payload();
        payload.price = Some(-1);
        payload.beds = Some(25.0);
        payload.baths = Some(-0.5);
        payload.pets_policy = Some("MAYBE".to_string());

        let issues = payload.validate().unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|issue| issue.field.as_str()).collect();

        assert!(fields.contains(&"price"));
        assert!(fields.contains(&"beds"));
        assert!(fields.contains(&"baths"));
        assert!(fields.contains(&"petsPolicy"));
    }

    #[test]
    fn test_validate_trims_and_blanks_optional_strings() {
        let mut payload = base_payload();
        payload.address = Some("  148 Bleecker Street  ".to_string());
        payload.image_url = Some("   ".to_string());

        let valid = payload.validate().unwrap();
        assert_eq!(valid.address.as_deref(), Some("148 Bleecker Street"));
        assert!(valid.image_url.is_none());
    }

    #[test]
    fn test_parse_listing_id() {
        assert_eq!(parse_listing_id("7").unwrap(), 7);
        assert!(parse_listing_id("0").is_err());
        assert!(parse_listing_id("-3").is_err());
        assert!(parse_listing_id("abc").is_err());
    }

    #[test]
    fn test_resolved_images_rollback_set_is_uploads_only() {
        let images = ResolvedImages {
            image: ResolvedImage {
                url: Some("https://res.cloudinary.com/demo/image/upload/v1/listings/a.jpg".into()),
                public_id: Some("listings/a".to_string()),
                uploaded: true,
            },
            floorplan: ResolvedImage {
                url: Some("https://res.cloudinary.com/demo/image/upload/v1/listings/b.jpg".into()),
                public_id: Some("listings/b".to_string()),
                uploaded: false,
            },
            map: ResolvedImage::default(),
        };

        assert_eq!(images.uploaded_ids(), vec!["listings/a".to_string()]);
        let referenced = images.public_ids();
        assert!(referenced.contains("listings/a"));
        assert!(referenced.contains("listings/b"));
        assert_eq!(referenced.len(), 2);
    }
}
