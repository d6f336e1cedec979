mod address;
mod cache;
mod commands;
mod config;
mod db;
mod errors;
mod extractor;
mod geocoder;
mod ingestion;
mod model;
mod pipeline;
mod prefecture;
mod query;
mod source;
mod spreadsheet;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::commands::{Cli, Command};
use crate::db::{bootstrap, DatabaseContext};

pub use address::{normalize_address, shorten_address};
pub use cache::{cache_key, GeocodeCache};
pub use config::AppConfig;
pub use db::bootstrap_in_memory;
pub use errors::{AppError, AppResult};
pub use extractor::{extract_records, format_phone, parse_count};
pub use geocoder::{AddressLookup, GeocodeOutcome, Geocoder};
pub use ingestion::{map_rows, publish, run_ingestion, IngestionOptions, IngestionSummary};
pub use model::{Coordinates, DatasetMetadata, PharmacyRecord};
pub use pipeline::{BatchGeocoder, GeocodeReport, GeocodeScope, GeocodeStats};
pub use prefecture::{is_within_prefecture, latitude_range, PREFECTURE_LAT_RANGES};
pub use query::{haversine_km, load_dataset, prefecture_counts, search, GeoPoint, PharmacyQuery};
pub use source::{
    build_http_client, find_spreadsheet_link, DownloadedSpreadsheet, SpreadsheetSource,
};
pub use spreadsheet::{detect_header, read_first_sheet, ColumnMapping, HeaderDetection, Row};
pub use store::{keys, KvStore};

pub struct AppState {
    store: KvStore,
    db_path: PathBuf,
    config: AppConfig,
}

impl AppState {
    fn initialize() -> AppResult<Self> {
        let config = AppConfig::from_env();
        let DatabaseContext { connection, path } =
            bootstrap(&config.data_dir, &config.database_file_name)?;
        let store = KvStore::new(Arc::new(Mutex::new(connection)));
        Ok(Self {
            store,
            db_path: path,
            config,
        })
    }
}

fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,pharmacy_locator_lib=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

async fn dispatch(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ingest(args) => {
            let summary = commands::ingest(state, args)
                .await
                .context("ingestion run failed")?;
            print_json(&summary)
        }
        Command::Query(args) => {
            print_json(&commands::query(state, args).context("query failed")?)
        }
        Command::Prefectures => print_json(
            &commands::prefectures(state).context("failed to count prefectures")?,
        ),
        Command::Meta => print_json(&commands::meta(state).context("failed to read metadata")?),
        Command::PurgeCache => print_json(
            &commands::purge_cache(state).context("failed to purge cache")?,
        ),
    }
}

fn try_run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::initialize().context("failed to open the key-value store")?;
    info!(db = %state.db_path.display(), "store opened");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(&state, cli.command))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    match try_run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
