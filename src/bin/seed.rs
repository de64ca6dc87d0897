//! Idempotent seeding of the lookup vocabulary and a set of sample
//! listings. Safe to re-run: lookups are find-or-create and listing
//! associations are replace-all.

use anyhow::{Context, Result};
use listings_service::listing_store::{ImageRef, ListingWrite};
use listings_service::{
    connect_pool, run_migrations, AssociationSynchronizer, Config, DesiredAssociations,
    FeatureType, ListingStore, LookupStore, PetsPolicy,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BOROUGH_NEIGHBORHOODS: &[(&str, &[&str])] = &[
    (
        "Manhattan",
        &[
            "Battery Park City",
            "Bowery",
            "Chelsea",
            "Chinatown",
            "East Harlem",
            "East Village",
            "Financial District",
            "Flatiron",
            "Gramercy",
            "Greenwich Village",
            "Hamilton Heights",
            "Harlem",
            "Hell's Kitchen",
            "Inwood",
            "Kips Bay",
            "Lenox Hill",
            "Little Italy",
            "Lower East Side",
            "Morningside Heights",
            "Murray Hill",
            "NoHo",
            "NoMad",
            "SoHo",
            "Tribeca",
            "Two Bridges",
            "Upper East Side",
            "Upper West Side",
            "Washington Heights",
            "West Village",
        ],
    ),
    (
        "Brooklyn",
        &[
            "Bushwick",
            "Bedford-Stuyvesant",
            "Boerum Hill",
            "Brooklyn Heights",
            "Carroll Gardens",
            "Clinton Hill",
            "Cobble Hill",
            "Crown Heights",
            "Downtown Brooklyn",
            "DUMBO",
            "East New York",
            "Flatbush",
            "Fort Greene",
            "Gowanus",
            "Greenpoint",
            "Kensington",
            "Midwood",
            "Park Slope",
            "Prospect Heights",
            "Prospect Lefferts Gardens",
            "Red Hook",
            "Sunset Park",
            "Williamsburg",
        ],
    ),
    (
        "Queens",
        &[
            "Astoria",
            "Bayside",
            "Bellerose",
            "Briarwood",
            "College Point",
            "Corona",
            "Elmhurst",
            "Far Rockaway",
            "Flushing",
            "Forest Hills",
            "Fresh Meadows",
            "Jackson Heights",
            "Jamaica",
            "Kew Gardens",
            "Long Island City",
            "Maspeth",
            "Middle Village",
            "Rego Park",
            "Ridgewood",
            "Sunnyside",
            "Woodside",
        ],
    ),
    (
        "Bronx",
        &[
            "Allerton",
            "Belmont",
            "Concourse",
            "Fordham",
            "Kingsbridge",
            "Morris Park",
            "Mott Haven",
            "Parkchester",
            "Pelham Bay",
            "Riverdale",
            "Soundview",
            "Throgs Neck",
            "University Heights",
            "Wakefield",
            "Woodlawn",
        ],
    ),
    (
        "Staten Island",
        &[
            "Arrochar",
            "Clifton",
            "Grant City",
            "Great Kills",
            "New Dorp",
            "Port Richmond",
            "Rosebank",
            "St. George",
            "Stapleton",
            "Tottenville",
            "West Brighton",
            "Westerleigh",
        ],
    ),
];

const UNIT_FEATURES: &[&str] = &[
    "Balcony",
    "City View",
    "Private Patio",
    "Storage",
    "Terrace",
    "Dishwasher",
    "Washer/Dryer",
    "Hardwood Floors",
    "Central Air",
    "Stainless Steel Appliances",
    "Microwave",
    "Renovated Kitchen",
    "Renovated Bathroom",
    "High Ceilings",
    "Floor-to-Ceiling Windows",
    "Smart Thermostat",
    "Walk-in Closet",
    "Home Office Nook",
];

const BUILDING_FEATURES: &[&str] = &[
    "Doorman",
    "Elevator",
    "Gym",
    "Roof Deck",
    "Package Room",
    "Bike Storage",
    "Parking",
    "Laundry Room",
    "Concierge",
    "Resident Lounge",
    "Children's Playroom",
    "Co-working Space",
    "Pet Spa",
    "Pool",
    "Sauna",
    "Virtual Doorman",
];

const SUBWAY_LINES: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "A", "B", "C", "D", "E", "F", "G", "J", "L", "M", "N", "Q",
    "R", "S", "W", "Z", "SI",
];

struct ListingSeed {
    title: &'static str,
    address: Option<&'static str>,
    price: i32,
    beds: f64,
    baths: f64,
    borough: &'static str,
    neighborhood: &'static str,
    pets_policy: PetsPolicy,
    unit_features: &'static [&'static str],
    building_features: &'static [&'static str],
    subway_lines: &'static [&'static str],
}

const LISTING_SEEDS: &[ListingSeed] = &[
    ListingSeed {
        title: "Bright 1BR near Jefferson L",
        address: Some("148 Bleecker Street"),
        price: 2650,
        beds: 1.0,
        baths: 1.0,
        borough: "Brooklyn",
        neighborhood: "Bushwick",
        pets_policy: PetsPolicy::Allowed,
        unit_features: &["Dishwasher", "Hardwood Floors"],
        building_features: &["Roof Deck", "Bike Storage"],
        subway_lines: &["L", "M"],
    },
    ListingSeed {
        title: "Ridgewood 2BR with natural light",
        address: None,
        price: 2780,
        beds: 2.0,
        baths: 1.0,
        borough: "Queens",
        neighborhood: "Ridgewood",
        pets_policy: PetsPolicy::CaseByCase,
        unit_features: &["Dishwasher", "Washer/Dryer"],
        building_features: &["Package Room"],
        subway_lines: &["M", "L"],
    },
    ListingSeed {
        title: "Williamsburg 1BR with gym access",
        address: None,
        price: 2800,
        beds: 1.0,
        baths: 1.0,
        borough: "Brooklyn",
        neighborhood: "Williamsburg",
        pets_policy: PetsPolicy::Allowed,
        unit_features: &["Balcony", "Hardwood Floors"],
        building_features: &["Gym", "Doorman", "Elevator"],
        subway_lines: &["L", "G"],
    },
    ListingSeed {
        title: "Astoria studio with balcony",
        address: None,
        price: 2300,
        beds: 0.0,
        baths: 1.0,
        borough: "Queens",
        neighborhood: "Astoria",
        pets_policy: PetsPolicy::CatsOnly,
        unit_features: &["Balcony", "Dishwasher"],
        building_features: &["Elevator"],
        subway_lines: &["N", "W"],
    },
    ListingSeed {
        title: "Chelsea 1BR full-service building",
        address: None,
        price: 3950,
        beds: 1.0,
        baths: 1.0,
        borough: "Manhattan",
        neighborhood: "Chelsea",
        pets_policy: PetsPolicy::DogsOnly,
        unit_features: &["Washer/Dryer", "Central Air"],
        building_features: &["Doorman", "Gym", "Package Room"],
        subway_lines: &["A", "C", "E"],
    },
    ListingSeed {
        title: "Riverdale 2BR with parking",
        address: None,
        price: 2450,
        beds: 2.0,
        baths: 1.0,
        borough: "Bronx",
        neighborhood: "Riverdale",
        pets_policy: PetsPolicy::NotAllowed,
        unit_features: &["Hardwood Floors", "Walk-in Closet"],
        building_features: &["Parking", "Elevator"],
        subway_lines: &["1"],
    },
    ListingSeed {
        title: "Greenpoint 1BR with rooftop lounge",
        address: Some("77 Eagle Street"),
        price: 3325,
        beds: 1.0,
        baths: 1.0,
        borough: "Brooklyn",
        neighborhood: "Greenpoint",
        pets_policy: PetsPolicy::Allowed,
        unit_features: &["Dishwasher", "High Ceilings"],
        building_features: &["Roof Deck", "Resident Lounge", "Elevator"],
        subway_lines: &["G"],
    },
    ListingSeed {
        title: "Long Island City studio corner unit",
        address: Some("23 Jackson Avenue"),
        price: 2990,
        beds: 0.0,
        baths: 1.0,
        borough: "Queens",
        neighborhood: "Long Island City",
        pets_policy: PetsPolicy::CatsOnly,
        unit_features: &["City View", "Stainless Steel Appliances"],
        building_features: &["Doorman", "Gym", "Package Room"],
        subway_lines: &["7", "E"],
    },
    ListingSeed {
        title: "Upper West Side 2BR classic",
        address: Some("215 West 84th Street"),
        price: 4650,
        beds: 2.0,
        baths: 1.0,
        borough: "Manhattan",
        neighborhood: "Upper West Side",
        pets_policy: PetsPolicy::CaseByCase,
        unit_features: &["Hardwood Floors", "Dishwasher"],
        building_features: &["Elevator", "Laundry Room"],
        subway_lines: &["1", "B", "C"],
    },
    ListingSeed {
        title: "Astoria 1BR with terrace",
        address: Some("31-44 29th Street"),
        price: 2875,
        beds: 1.0,
        baths: 1.0,
        borough: "Queens",
        neighborhood: "Astoria",
        pets_policy: PetsPolicy::Allowed,
        unit_features: &["Terrace", "Washer/Dryer"],
        building_features: &["Bike Storage", "Virtual Doorman"],
        subway_lines: &["N", "W"],
    },
    ListingSeed {
        title: "Park Slope 2BR near Prospect Park",
        address: Some("512 7th Avenue"),
        price: 3890,
        beds: 2.0,
        baths: 2.0,
        borough: "Brooklyn",
        neighborhood: "Park Slope",
        pets_policy: PetsPolicy::DogsOnly,
        unit_features: &["Dishwasher", "Walk-in Closet"],
        building_features: &["Elevator", "Package Room", "Gym"],
        subway_lines: &["F", "G", "R"],
    },
    ListingSeed {
        title: "Murray Hill 1BR renovated",
        address: Some("140 East 39th Street"),
        price: 3520,
        beds: 1.0,
        baths: 1.0,
        borough: "Manhattan",
        neighborhood: "Murray Hill",
        pets_policy: PetsPolicy::Allowed,
        unit_features: &["Renovated Kitchen", "Central Air"],
        building_features: &["Doorman", "Laundry Room", "Concierge"],
        subway_lines: &["4", "5", "6"],
    },
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    let pool = connect_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool).await?;

    let lookups = LookupStore::new(pool.clone());
    let listings = ListingStore::new(pool.clone());
    let sync = AssociationSynchronizer::new(pool.clone(), lookups.clone());

    seed_lookups(&lookups).await?;
    seed_listings(&pool, &lookups, &listings, &sync).await?;

    info!("Seed completed");
    println!("Seed completed.");

    Ok(())
}

async fn seed_lookups(lookups: &LookupStore) -> Result<()> {
    for (borough_name, neighborhoods) in BOROUGH_NEIGHBORHOODS {
        let borough = lookups.resolve_borough(borough_name).await?;
        for neighborhood in *neighborhoods {
            lookups.resolve_neighborhood(borough.id, neighborhood).await?;
        }
    }

    for name in UNIT_FEATURES {
        lookups.resolve_feature(FeatureType::Unit, name).await?;
    }
    for name in BUILDING_FEATURES {
        lookups.resolve_feature(FeatureType::Building, name).await?;
    }
    for line_code in SUBWAY_LINES {
        lookups.resolve_subway_line(line_code).await?;
    }

    info!("Lookup vocabulary seeded");
    Ok(())
}

async fn seed_listings(
    pool: &sqlx::PgPool,
    lookups: &LookupStore,
    listings: &ListingStore,
    sync: &AssociationSynchronizer,
) -> Result<()> {
    for seed in LISTING_SEEDS {
        let borough = lookups.resolve_borough(seed.borough).await?;
        let neighborhood = lookups
            .resolve_neighborhood(borough.id, seed.neighborhood)
            .await?;

        let desired = DesiredAssociations::normalized(
            &owned(seed.unit_features),
            &owned(seed.building_features),
            &owned(seed.subway_lines),
        );

        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT id FROM listings WHERE title = $1 AND borough_id = $2 AND neighborhood_id = $3",
        )
        .bind(seed.title)
        .bind(borough.id)
        .bind(neighborhood.id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up existing seed listing")?;

        match existing {
            Some(listing_id) => {
                sqlx::query("UPDATE listings SET address = $2, updated_at = NOW() WHERE id = $1")
                    .bind(listing_id)
                    .bind(seed.address)
                    .execute(pool)
                    .await
                    .context("Failed to refresh seed listing")?;

                sync.sync_listing(listing_id, &desired).await?;
            }
            None => {
                let write = ListingWrite {
                    title: seed.title.to_string(),
                    address: seed.address.map(str::to_string),
                    image: ImageRef::default(),
                    floorplan_image: ImageRef::default(),
                    map_image: ImageRef::default(),
                    price: seed.price,
                    beds: Some(seed.beds),
                    baths: Some(seed.baths),
                    borough_id: borough.id,
                    neighborhood_id: neighborhood.id,
                    pets_policy: seed.pets_policy,
                    is_active: true,
                };

                let resolved = sync.resolve(&desired).await?;
                listings.create_with_associations(&write, &resolved).await?;
            }
        }
    }

    info!(count = LISTING_SEEDS.len(), "Sample listings seeded");
    Ok(())
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
