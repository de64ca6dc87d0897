//! Listings Service
//!
//! Marketplace backend for rental listings: a PostgreSQL-backed catalog of
//! listings tagged with location, amenities, and transit access, exposed
//! through a filterable public search API and a key-gated administrative
//! CRUD API with media-hosting side effects.
//!
//! ## Features
//!
//! - **Compiled Filter Queries**: price range, bed/bath minimums,
//!   borough/neighborhood sets, conjunctive feature filters, disjunctive
//!   transit filters, and stable pagination in a single predicate
//! - **Lazy Lookup Vocabulary**: boroughs, neighborhoods, features, and
//!   subway lines created on first reference with race-safe find-or-create
//! - **Idempotent Association Sync**: replace-all reconciliation of the
//!   feature and transit join tables on every write
//! - **Media Lifecycle**: inline image payloads uploaded to the media host,
//!   replaced or deleted assets cleaned up, and an orphan sweep for anything
//!   left behind
//!
//! ## Architecture
//!
//! ```text
//! Public API                 PostgreSQL                Media Host
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ GET /listings│─────────▶│ listings     │          │ listings/    │
//! │ GET /filters │          │ boroughs     │          │   {asset}    │
//! └──────────────┘          │ features     │          └──────────────┘
//!                           │ subway_lines │                 ▲
//! Admin API                 └──────────────┘                 │
//! ┌──────────────┐                 ▲                         │
//! │ CRUD          │                │                         │
//! │ x-admin-key   │──┬─────────────┘                         │
//! └──────────────┘  │                                        │
//!                   ▼                                        │
//!            ┌──────────────┐                         ┌──────────────┐
//!            │ Association  │                         │ Asset        │
//!            │ Synchronizer │                         │ GC Sweep     │
//!            └──────────────┘                         └──────────────┘
//! ```

pub mod admin_api;
pub mod api;
pub mod asset_gc;
pub mod config;
pub mod listing_store;
pub mod listings_api;
pub mod lookup_store;
pub mod media_library;
pub mod sync;

pub use api::AppState;
pub use asset_gc::{sweep, SweepReport};
pub use config::Config;
pub use listing_store::{
    connect_pool, run_migrations, ListingDetail, ListingFilters, ListingStore, PetsPolicy,
};
pub use lookup_store::{FeatureType, LookupStore};
pub use media_library::{extract_public_id, resolve_image, MediaLibrary, MediaStore};
pub use sync::{AssociationSynchronizer, DesiredAssociations};
