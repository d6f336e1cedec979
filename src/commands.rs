use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::cache::GeocodeCache;
use crate::errors::{AppError, AppResult};
use crate::ingestion::{run_ingestion, IngestionOptions, IngestionSummary};
use crate::model::DatasetMetadata;
use crate::pipeline::GeocodeScope;
use crate::query::{
    load_dataset, prefecture_counts, search, GeoPoint, PharmacyMatch, PharmacyQuery,
};
use crate::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "pharmacy-locator",
    version,
    about = "Emergency contraception pharmacy dataset builder"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download the published list, geocode it and publish the dataset.
    Ingest(IngestArgs),
    /// Search the published dataset.
    Query(QueryArgs),
    /// Record counts per prefecture.
    Prefectures,
    /// Metadata of the last ingestion run.
    Meta,
    /// Drop expired cache entries.
    PurgeCache,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Geocode every record instead of the configured limit.
    #[arg(long)]
    pub all: bool,
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[arg(long)]
    pub skip_geocode: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(long)]
    pub prefecture: Option<String>,
    /// Case-insensitive match against name and address.
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long, requires = "lng", allow_hyphen_values = true)]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    pub lng: Option<f64>,
    /// Search radius in kilometres.
    #[arg(long)]
    pub radius: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub count: usize,
    pub pharmacies: Vec<PharmacyMatch>,
}

#[derive(Debug, Serialize)]
pub struct MetaResponse {
    pub meta: Option<DatasetMetadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeSummary {
    pub purged: usize,
    pub remaining_geocode_entries: usize,
}

impl QueryArgs {
    fn into_query(self) -> AppResult<PharmacyQuery> {
        if let Some(radius) = self.radius {
            if !(radius.is_finite() && radius > 0.0) {
                return Err(AppError::Config(format!("invalid radius: {radius}")));
            }
        }
        let near = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        Ok(PharmacyQuery {
            prefecture: self.prefecture.filter(|p| !p.trim().is_empty()),
            text: self.text,
            near,
            radius_km: self.radius,
        })
    }
}

pub async fn ingest(state: &AppState, args: IngestArgs) -> AppResult<IngestionSummary> {
    let mut options = IngestionOptions::from_config(&state.config);
    if args.all {
        options.scope = GeocodeScope::All;
    }
    if let Some(dir) = args.output_dir {
        options.output_dir = dir;
    }
    options.skip_geocode = args.skip_geocode;
    run_ingestion(&state.config, &state.store, &options).await
}

pub fn query(state: &AppState, args: QueryArgs) -> AppResult<QueryResponse> {
    let query = args.into_query()?;
    let dataset = load_dataset(&state.store, Some(&state.config.output_dir))?;
    let pharmacies = search(&dataset.pharmacies, &query);
    Ok(QueryResponse {
        count: pharmacies.len(),
        pharmacies,
    })
}

pub fn prefectures(state: &AppState) -> AppResult<BTreeMap<String, usize>> {
    let dataset = load_dataset(&state.store, Some(&state.config.output_dir))?;
    Ok(prefecture_counts(&dataset.pharmacies))
}

/// `meta` is `null` until the first ingestion run has published.
pub fn meta(state: &AppState) -> AppResult<MetaResponse> {
    let dataset = load_dataset(&state.store, Some(&state.config.output_dir))?;
    Ok(MetaResponse { meta: dataset.meta })
}

pub fn purge_cache(state: &AppState) -> AppResult<PurgeSummary> {
    let purged = state.store.purge_expired()?;
    let cache = GeocodeCache::new(state.store.clone(), state.config.cache_ttl());
    let remaining_geocode_entries = cache.entry_count()?;
    Ok(PurgeSummary {
        purged,
        remaining_geocode_entries,
    })
}
