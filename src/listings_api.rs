use crate::api::{internal_error, validation_error, ApiError, AppState, FieldIssue};
use crate::listing_store::{total_pages, ListingDetail, ListingFilters, PetsPolicy};
use crate::lookup_store::{BoroughLine, FeatureType};
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, instrument};

/// Largest page the public surface serves
pub const PUBLIC_MAX_LIMIT: i64 = 50;
/// Default public page size
pub const PUBLIC_DEFAULT_LIMIT: i64 = 12;

/// Static borough → typical transit lines reference, merged with the lines
/// observed on active listings for the filters endpoint
const BOROUGH_TYPICAL_LINES: &[(&str, &[&str])] = &[
    (
        "Manhattan",
        &[
            "1", "2", "3", "4", "5", "6", "7", "A", "B", "C", "D", "E", "F", "J", "L", "M", "N",
            "Q", "R", "S", "W", "Z",
        ],
    ),
    (
        "Brooklyn",
        &[
            "2", "3", "4", "5", "A", "B", "C", "D", "F", "G", "J", "L", "M", "N", "Q", "R", "S",
            "Z",
        ],
    ),
    (
        "Queens",
        &["7", "A", "E", "F", "G", "J", "M", "N", "R", "W", "Z"],
    ),
    ("Bronx", &["1", "2", "4", "5", "6", "B", "D"]),
    ("Staten Island", &["SI"]),
];

/// Raw public search query, validated before use
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSearchQuery {
    min_price: Option<String>,
    max_price: Option<String>,
    min_beds: Option<String>,
    min_baths: Option<String>,
    borough: Option<String>,
    boroughs: Option<String>,
    neighborhoods: Option<String>,
    features: Option<String>,
    subway: Option<String>,
    pets_policy: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

/// Validated public search parameters
#[derive(Debug)]
pub struct PublicSearchParams {
    pub filters: ListingFilters,
    pub page: i64,
    pub limit: i64,
}

impl PublicSearchQuery {
    /// Check every constraint, producing either typed parameters or the
    /// full list of field problems
    pub fn validate(&self) -> Result<PublicSearchParams, Vec<FieldIssue>> {
        let mut issues = Vec::new();

        let min_price = parse_non_negative_int(self.min_price.as_deref(), "minPrice", &mut issues);
        let max_price = parse_non_negative_int(self.max_price.as_deref(), "maxPrice", &mut issues);
        let min_beds = parse_non_negative_int(self.min_beds.as_deref(), "minBeds", &mut issues);
        let min_baths = parse_non_negative_int(self.min_baths.as_deref(), "minBaths", &mut issues);

        let mut boroughs = csv_to_list(self.boroughs.as_deref());
        if let Some(single) = self.borough.as_deref() {
            let single = single.trim();
            if !single.is_empty() && !boroughs.iter().any(|b| b.eq_ignore_ascii_case(single)) {
                boroughs.push(single.to_string());
            }
        }

        let pets_policy = match self.pets_policy.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match PetsPolicy::parse(raw) {
                Some(policy) => Some(policy),
                None => {
                    issues.push(FieldIssue::new("petsPolicy", "is not a known pets policy"));
                    None
                }
            },
        };

        let page = parse_page(self.page.as_deref(), &mut issues);
        let limit = parse_limit(
            self.limit.as_deref(),
            PUBLIC_DEFAULT_LIMIT,
            PUBLIC_MAX_LIMIT,
            &mut issues,
        );

        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(PublicSearchParams {
            filters: ListingFilters {
                min_price: min_price.map(|v| v as i32),
                max_price: max_price.map(|v| v as i32),
                min_beds: min_beds.map(|v| v as f64),
                min_baths: min_baths.map(|v| v as f64),
                boroughs,
                neighborhoods: csv_to_list(self.neighborhoods.as_deref()),
                features: csv_to_list(self.features.as_deref()),
                subway_lines: csv_to_list(self.subway.as_deref())
                    .into_iter()
                    .map(|code| code.to_uppercase())
                    .collect(),
                pets_policy,
            },
            page,
            limit,
        })
    }
}

/// Public listing projection: related entities appear as display names only
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicListing {
    pub id: i32,
    pub title: String,
    pub address: Option<String>,
    pub image_url: Option<String>,
    pub map_image_url: Option<String>,
    pub price: i32,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub borough: String,
    pub neighborhood: String,
    pub pets_policy: PetsPolicy,
    pub unit_features: Vec<String>,
    pub building_features: Vec<String>,
    pub subway_lines: Vec<String>,
}

impl From<ListingDetail> for PublicListing {
    fn from(detail: ListingDetail) -> Self {
        Self {
            id: detail.id,
            title: detail.title,
            address: detail.address,
            image_url: detail.image_url,
            map_image_url: detail.map_image_url,
            price: detail.price,
            beds: detail.beds,
            baths: detail.baths,
            borough: detail.borough,
            neighborhood: detail.neighborhood,
            pets_policy: detail.pets_policy,
            unit_features: detail.unit_features,
            building_features: detail.building_features,
            subway_lines: detail.subway_lines,
        }
    }
}

/// Paginated public search response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub data: Vec<PublicListing>,
}

/// The full enumerated filter vocabulary
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterVocabulary {
    pub boroughs: Vec<String>,
    pub neighborhoods_by_borough: BTreeMap<String, Vec<String>>,
    pub unit_features: Vec<String>,
    pub building_features: Vec<String>,
    pub subway_lines: Vec<String>,
    pub subway_lines_by_borough: BTreeMap<String, Vec<String>>,
}

/// Search active listings with the compiled filter predicate
#[instrument(skip(state))]
pub async fn search_listings(
    State(state): State<AppState>,
    Query(raw): Query<PublicSearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = raw
        .validate()
        .map_err(|issues| validation_error("Invalid query params", issues))?;

    let (total, listings) = state
        .listings
        .search_public(&params.filters, params.page, params.limit)
        .await
        .map_err(|err| {
            error!(error = %err, "Failed to fetch listings");
            internal_error("Failed to fetch listings")
        })?;

    Ok(Json(SearchResponse {
        page: params.page,
        limit: params.limit,
        total,
        total_pages: total_pages(total, params.limit),
        data: listings.into_iter().map(PublicListing::from).collect(),
    }))
}

/// Enumerate every filter value the public search accepts
#[instrument(skip(state))]
pub async fn filter_vocabulary(
    State(state): State<AppState>,
) -> Result<Json<FilterVocabulary>, ApiError> {
    let lookups = &state.lookups;

    let (boroughs, neighborhoods, unit_features, building_features, line_codes, observed) = tokio::try_join!(
        lookups.list_borough_names(),
        lookups.list_neighborhoods(),
        lookups.list_feature_names(FeatureType::Unit),
        lookups.list_feature_names(FeatureType::Building),
        lookups.list_line_codes(),
        lookups.observed_lines_by_borough(),
    )
    .map_err(|err| {
        error!(error = %err, "Failed to fetch filter vocabulary");
        internal_error("Failed to fetch filters")
    })?;

    let mut neighborhoods_by_borough: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in neighborhoods {
        neighborhoods_by_borough
            .entry(entry.borough)
            .or_default()
            .push(entry.name);
    }

    let mut subway_lines = line_codes;
    sort_line_codes(&mut subway_lines);

    Ok(Json(FilterVocabulary {
        subway_lines_by_borough: merge_borough_lines(&boroughs, &observed),
        boroughs,
        neighborhoods_by_borough,
        unit_features,
        building_features,
        subway_lines,
    }))
}

/// Split a comma-separated parameter into trimmed, non-empty values
pub fn csv_to_list(value: Option<&str>) -> Vec<String> {
    match value {
        None => Vec::new(),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Sort line codes numerically first (ascending by value), then the
/// remaining codes lexicographically
pub fn sort_line_codes(codes: &mut [String]) {
    codes.sort_by_key(|code| line_sort_key(code));
}

fn line_sort_key(code: &str) -> (u8, u32, String) {
    match code.parse::<u32>() {
        Ok(value) => (0, value, String::new()),
        Err(_) => (1, 0, code.to_string()),
    }
}

/// Union of the static typical-lines table and the observed lines, per
/// borough, de-duplicated and sorted
fn merge_borough_lines(
    boroughs: &[String],
    observed: &[BoroughLine],
) -> BTreeMap<String, Vec<String>> {
    let mut merged = BTreeMap::new();

    for borough in boroughs {
        let mut lines: Vec<String> = BOROUGH_TYPICAL_LINES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(borough))
            .map(|(_, lines)| lines.iter().map(|line| line.to_string()).collect())
            .unwrap_or_default();

        for entry in observed {
            if entry.borough == *borough && !lines.contains(&entry.line_code) {
                lines.push(entry.line_code.clone());
            }
        }

        sort_line_codes(&mut lines);
        merged.insert(borough.clone(), lines);
    }

    merged
}

fn parse_non_negative_int(
    raw: Option<&str>,
    field: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;

    match raw.parse::<i64>() {
        Ok(value) if value >= 0 => Some(value),
        _ => {
            issues.push(FieldIssue::new(field, "must be a non-negative integer"));
            None
        }
    }
}

pub(crate) fn parse_page(raw: Option<&str>, issues: &mut Vec<FieldIssue>) -> i64 {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => 1,
        Some(value) => match value.parse::<i64>() {
            Ok(page) if page >= 1 => page,
            _ => {
                issues.push(FieldIssue::new("page", "must be a positive integer"));
                1
            }
        },
    }
}

pub(crate) fn parse_limit(
    raw: Option<&str>,
    default: i64,
    max: i64,
    issues: &mut Vec<FieldIssue>,
) -> i64 {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => default,
        Some(value) => match value.parse::<i64>() {
            Ok(limit) if (1..=max).contains(&limit) => limit,
            _ => {
                issues.push(FieldIssue::new(
                    "limit",
                    &format!("must be an integer between 1 and {max}"),
                ));
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> PublicSearchQuery {
        let mut query = PublicSearchQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "minPrice" => query.min_price = value,
                "maxPrice" => query.max_price = value,
                "minBeds" => query.min_beds = value,
                "minBaths" => query.min_baths = value,
                "borough" => query.borough = value,
                "boroughs" => query.boroughs = value,
                "neighborhoods" => query.neighborhoods = value,
                "features" => query.features = value,
                "subway" => query.subway = value,
                "petsPolicy" => query.pets_policy = value,
                "page" => query.page = value,
                "limit" => query.limit = value,
                other => panic!("unknown key {other}"),
            }
        }
        query
    }

    #[test]
    fn test_validate_defaults() {
        let params = query(&[]).validate().unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, PUBLIC_DEFAULT_LIMIT);
        assert!(params.filters.boroughs.is_empty());
        assert!(params.filters.pets_policy.is_none());
    }

    #[test]
    fn test_validate_parses_filters() {
        let params = query(&[
            ("minPrice", "1000"),
            ("maxPrice", "3000"),
            ("features", "Elevator, Gym ,"),
            ("subway", "l,g"),
            ("petsPolicy", "CATS_ONLY"),
        ])
        .validate()
        .unwrap();

        assert_eq!(params.filters.min_price, Some(1000));
        assert_eq!(params.filters.max_price, Some(3000));
        assert_eq!(params.filters.features, vec!["Elevator", "Gym"]);
        assert_eq!(params.filters.subway_lines, vec!["L", "G"]);
        assert_eq!(params.filters.pets_policy, Some(PetsPolicy::CatsOnly));
    }

    #[test]
    fn test_validate_merges_borough_params() {
        let params = query(&[("borough", "Queens"), ("boroughs", "Brooklyn,queens")])
            .validate()
            .unwrap();

        // The single-select value is folded in without duplicating.
        assert_eq!(params.filters.boroughs, vec!["Brooklyn", "queens"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let issues = query(&[
            ("minPrice", "-5"),
            ("petsPolicy", "MAYBE"),
            ("limit", "0"),
            ("page", "zero"),
        ])
        .validate()
        .unwrap_err();

        let fields: Vec<&str> = issues.iter().map(|issue| issue.field.as_str()).collect();
        assert!(fields.contains(&"minPrice"));
        assert!(fields.contains(&"petsPolicy"));
        assert!(fields.contains(&"limit"));
        assert!(fields.contains(&"page"));
    }

    #[test]
    fn test_validate_rejects_limit_above_max() {
        let issues = query(&[("limit", "51")]).validate().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "limit");
    }

    #[test]
    fn test_sort_line_codes_numeric_before_alpha() {
        let mut codes = vec![
            "W".to_string(),
            "2".to_string(),
            "SI".to_string(),
            "10".to_string(),
            "A".to_string(),
            "1".to_string(),
        ];
        sort_line_codes(&mut codes);
        assert_eq!(codes, vec!["1", "2", "10", "A", "SI", "W"]);
    }

    #[test]
    fn test_merge_borough_lines_unions_observed() {
        let boroughs = vec!["Staten Island".to_string()];
        let observed = vec![BoroughLine {
            borough: "Staten Island".to_string(),
            line_code: "SIR".to_string(),
        }];

        let merged = merge_borough_lines(&boroughs, &observed);
        assert_eq!(merged["Staten Island"], vec!["SI", "SIR"]);
    }

    #[test]
    fn test_merge_borough_lines_dedupes() {
        let boroughs = vec!["Bronx".to_string()];
        let observed = vec![BoroughLine {
            borough: "Bronx".to_string(),
            line_code: "6".to_string(),
        }];

        let merged = merge_borough_lines(&boroughs, &observed);
        assert_eq!(merged["Bronx"], vec!["1", "2", "4", "5", "6", "B", "D"]);
    }

    #[test]
    fn test_csv_to_list() {
        assert!(csv_to_list(None).is_empty());
        assert!(csv_to_list(Some(" , ,")).is_empty());
        assert_eq!(csv_to_list(Some("a, b,c ")), vec!["a", "b", "c"]);
    }
}
