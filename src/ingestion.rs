use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::GeocodeCache;
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::extractor::extract_records;
use crate::geocoder::Geocoder;
use crate::model::{DatasetMetadata, PharmacyRecord};
use crate::pipeline::{BatchGeocoder, GeocodeScope, GeocodeStats};
use crate::source::{build_http_client, SpreadsheetSource};
use crate::spreadsheet::{detect_header, read_first_sheet, ColumnMapping, HeaderDetection, Row};
use crate::store::{keys, KvStore};

pub const PHARMACIES_FILE: &str = "pharmacies.json";
pub const META_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub scope: GeocodeScope,
    pub output_dir: PathBuf,
    pub skip_geocode: bool,
}

impl IngestionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scope: GeocodeScope::from_config(config),
            output_dir: config.output_dir.clone(),
            skip_geocode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub meta: DatasetMetadata,
    pub header_row: Option<usize>,
    pub record_count: usize,
    pub geocoding: Option<GeocodeStats>,
    pub output_dir: String,
}

/// Rows and mapping chosen for extraction. Without a recognizable header the
/// first row is treated as the header and the fixed fallback layout applies.
pub fn map_rows(rows: &[Row]) -> (Option<usize>, HeaderDetection) {
    match detect_header(rows) {
        Some(detection) => {
            info!(
                target: "ingestion",
                header_row = detection.row_index,
                mapping = ?detection.mapping,
                "header row detected"
            );
            (Some(detection.row_index), detection)
        }
        None => {
            warn!(target: "ingestion", "no header row found; using fallback column layout");
            (
                None,
                HeaderDetection {
                    row_index: 0,
                    mapping: ColumnMapping::fallback(),
                },
            )
        }
    }
}

/// Fetches the published spreadsheet, extracts and geocodes records, then
/// publishes the dataset to the store and the output directory.
pub async fn run_ingestion(
    config: &AppConfig,
    store: &KvStore,
    options: &IngestionOptions,
) -> AppResult<IngestionSummary> {
    let http = build_http_client(config)?;
    let source = SpreadsheetSource::new(http.clone(), config.source_page_url.clone());
    let download = source.fetch().await?;
    info!(
        target: "ingestion",
        file = %download.file_name,
        bytes = download.bytes.len(),
        "spreadsheet fetched"
    );

    let rows = read_first_sheet(download.bytes)?;
    let (header_row, detection) = map_rows(&rows);
    let records = extract_records(&rows, detection.row_index, &detection.mapping);
    info!(target: "ingestion", rows = rows.len(), records = records.len(), "records extracted");

    let (records, geocoding) = if options.skip_geocode {
        info!(target: "ingestion", "geocoding skipped");
        (records, None)
    } else {
        let cache = GeocodeCache::new(store.clone(), config.cache_ttl());
        let geocoder = Geocoder::new(http, config.geocode_endpoint.clone());
        let report = BatchGeocoder::new(cache, geocoder, config)
            .run(records, options.scope)
            .await;
        (report.records, Some(report.stats))
    };

    let meta = DatasetMetadata {
        last_updated: Utc::now(),
        total_count: records.len(),
        source_url: download.source_url,
        file_name: download.file_name,
    };
    publish(store, &options.output_dir, &records, &meta)?;

    Ok(IngestionSummary {
        record_count: records.len(),
        meta,
        header_row,
        geocoding,
        output_dir: options.output_dir.to_string_lossy().to_string(),
    })
}

/// Replaces the stored dataset wholesale.
pub fn publish(
    store: &KvStore,
    output_dir: &Path,
    records: &[PharmacyRecord],
    meta: &DatasetMetadata,
) -> AppResult<()> {
    store.put_json(keys::PHARMACIES, &records, None)?;
    store.put_json(keys::META, meta, None)?;

    write_json(&output_dir.join(PHARMACIES_FILE), &records)?;
    write_json(&output_dir.join(META_FILE), meta)?;
    info!(
        target: "ingestion",
        records = records.len(),
        output_dir = %output_dir.display(),
        "dataset published"
    );
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_string_pretty(value)?;
    fs::write(path, serialized)?;
    Ok(())
}
