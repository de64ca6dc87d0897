use crate::listing_store::{ImageRefs, ListingStore};
use crate::media_library::MediaStore;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument};

/// How many orphan ids a report includes verbatim
pub const ORPHAN_SAMPLE_LIMIT: usize = 25;

/// Outcome of one garbage-collection sweep
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// "dry-run" or "apply"
    pub mode: String,
    /// Folder swept on the media host
    pub folder: String,
    /// Distinct asset ids referenced by listings
    pub referenced_count: usize,
    /// Assets present under the folder on the media host
    pub remote_asset_count: usize,
    /// Remote assets no listing references
    pub orphaned_count: usize,
    /// First orphan ids, bounded by `ORPHAN_SAMPLE_LIMIT`
    pub orphaned_sample: Vec<String>,
    /// Deletions the media host acknowledged (apply mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
}

/// Diff all asset ids referenced by listings against the media host folder
/// and report the difference; in apply mode, also delete it.
#[instrument(skip(store, media))]
pub async fn sweep(
    store: &ListingStore,
    media: &dyn MediaStore,
    host_suffix: &str,
    folder: &str,
    apply: bool,
) -> Result<SweepReport> {
    let refs = store
        .all_image_refs()
        .await
        .context("Failed to collect referenced asset ids")?;
    let referenced = referenced_ids(&refs, host_suffix);

    sweep_with_referenced(referenced, media, folder, apply).await
}

/// Every asset id referenced by the given image columns, falling back to
/// URL derivation where the id column is empty
pub fn referenced_ids(refs: &[ImageRefs], host_suffix: &str) -> HashSet<String> {
    refs.iter()
        .flat_map(|row| row.public_ids(host_suffix))
        .collect()
}

/// Remote assets that no listing references, in remote listing order
pub fn compute_orphans(referenced: &HashSet<String>, remote: &[String]) -> Vec<String> {
    remote
        .iter()
        .filter(|id| !referenced.contains(*id))
        .cloned()
        .collect()
}

async fn sweep_with_referenced(
    referenced: HashSet<String>,
    media: &dyn MediaStore,
    folder: &str,
    apply: bool,
) -> Result<SweepReport> {
    let remote = media
        .list_assets()
        .await
        .context("Failed to list media host folder")?;

    let orphaned = compute_orphans(&referenced, &remote);

    let mut report = SweepReport {
        mode: if apply { "apply" } else { "dry-run" }.to_string(),
        folder: folder.to_string(),
        referenced_count: referenced.len(),
        remote_asset_count: remote.len(),
        orphaned_count: orphaned.len(),
        orphaned_sample: orphaned.iter().take(ORPHAN_SAMPLE_LIMIT).cloned().collect(),
        deleted: None,
    };

    info!(
        referenced = report.referenced_count,
        remote = report.remote_asset_count,
        orphaned = report.orphaned_count,
        mode = %report.mode,
        "Asset sweep computed"
    );

    if apply && !orphaned.is_empty() {
        let deleted = media
            .delete_assets(&orphaned)
            .await
            .context("Failed to delete orphaned assets")?;

        metrics::counter!("gc.orphans_deleted").increment(deleted as u64);
        report.deleted = Some(deleted);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_library::MockMediaStore;

    fn id_set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn id_list(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compute_orphans_is_exact_difference() {
        let referenced = id_set(&["listings/a", "listings/b"]);
        let remote = id_list(&["listings/a", "listings/b", "listings/c"]);

        assert_eq!(compute_orphans(&referenced, &remote), id_list(&["listings/c"]));
    }

    #[test]
    fn test_compute_orphans_empty_remote() {
        let referenced = id_set(&["listings/a"]);
        assert!(compute_orphans(&referenced, &[]).is_empty());
    }

    #[test]
    fn test_referenced_ids_uses_url_fallback() {
        let refs = vec![ImageRefs {
            image_url: Some(
                "https://res.cloudinary.com/demo/image/upload/v1/listings/a.jpg".to_string(),
            ),
            image_public_id: None,
            map_image_public_id: Some("listings/b".to_string()),
            ..Default::default()
        }];

        assert_eq!(
            referenced_ids(&refs, "cloudinary.com"),
            id_set(&["listings/a", "listings/b"])
        );
    }

    #[test]
    fn test_dry_run_reports_without_deleting() {
        let mut media = MockMediaStore::new();
        media
            .expect_list_assets()
            .times(1)
            .returning(|| Ok(id_list(&["listings/a", "listings/c"])));
        media.expect_delete_assets().times(0);

        let report = tokio_test::block_on(sweep_with_referenced(
            id_set(&["listings/a"]),
            &media,
            "listings",
            false,
        ))
        .unwrap();

        assert_eq!(report.mode, "dry-run");
        assert_eq!(report.orphaned_count, 1);
        assert_eq!(report.orphaned_sample, id_list(&["listings/c"]));
        assert_eq!(report.deleted, None);
    }

    #[test]
    fn test_apply_deletes_exactly_the_orphans() {
        let mut media = MockMediaStore::new();
        media
            .expect_list_assets()
            .times(1)
            .returning(|| Ok(id_list(&["listings/a", "listings/b", "listings/c"])));
        media
            .expect_delete_assets()
            .withf(|ids| ids == ["listings/c".to_string()])
            .times(1)
            .returning(|ids| Ok(ids.len()));

        let report = tokio_test::block_on(sweep_with_referenced(
            id_set(&["listings/a", "listings/b"]),
            &media,
            "listings",
            true,
        ))
        .unwrap();

        assert_eq!(report.mode, "apply");
        assert_eq!(report.orphaned_count, 1);
        assert_eq!(report.deleted, Some(1));
    }

    #[test]
    fn test_apply_with_no_orphans_skips_deletion() {
        let mut media = MockMediaStore::new();
        media
            .expect_list_assets()
            .times(1)
            .returning(|| Ok(id_list(&["listings/a"])));
        media.expect_delete_assets().times(0);

        let report = tokio_test::block_on(sweep_with_referenced(
            id_set(&["listings/a"]),
            &media,
            "listings",
            true,
        ))
        .unwrap();

        assert_eq!(report.orphaned_count, 0);
        assert_eq!(report.deleted, None);
    }
}
