use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cache::GeocodeCache;
use crate::config::AppConfig;
use crate::geocoder::{GeocodeOutcome, Geocoder};
use crate::model::{Coordinates, PharmacyRecord};
use crate::prefecture::is_within_prefecture;

/// How much of the record set a run geocodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodeScope {
    Limited(usize),
    All,
}

impl GeocodeScope {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.geocode_all {
            GeocodeScope::All
        } else {
            GeocodeScope::Limited(config.geocode_limit)
        }
    }

    fn limit(&self, total: usize) -> usize {
        match self {
            GeocodeScope::Limited(limit) => (*limit).min(total),
            GeocodeScope::All => total,
        }
    }
}

impl Default for GeocodeScope {
    fn default() -> Self {
        GeocodeScope::Limited(500)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeocodeStats {
    pub total: usize,
    pub processed: usize,
    pub geocoded: usize,
    pub cache_hits: usize,
    pub invalid_coordinates: usize,
    pub not_found: usize,
}

#[derive(Debug, Clone)]
pub struct GeocodeReport {
    pub records: Vec<PharmacyRecord>,
    pub stats: GeocodeStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Resolution {
    Cached(Coordinates),
    Geocoded(Coordinates),
    Rejected(Coordinates),
    NotFound,
}

pub struct BatchGeocoder {
    cache: GeocodeCache,
    geocoder: Geocoder,
    batch_size: usize,
    batch_delay: Duration,
    progress_interval: usize,
}

impl BatchGeocoder {
    pub fn new(cache: GeocodeCache, geocoder: Geocoder, config: &AppConfig) -> Self {
        Self {
            cache,
            geocoder,
            batch_size: config.geocode_batch_size.max(1),
            batch_delay: config.batch_delay(),
            progress_interval: config.progress_interval.max(1),
        }
    }

    /// Geocodes the records covered by `scope`, in order, batch by batch.
    /// Records beyond the scope are returned untouched.
    pub async fn run(
        &self,
        mut records: Vec<PharmacyRecord>,
        scope: GeocodeScope,
    ) -> GeocodeReport {
        let total = records.len();
        let limit = scope.limit(total);
        let mut stats = GeocodeStats {
            total,
            ..GeocodeStats::default()
        };
        info!(target: "geocoding", limit, total, "starting geocoding");

        let mut start = 0;
        while start < limit {
            let end = (start + self.batch_size).min(limit);
            let resolutions =
                join_all(records[start..end].iter().map(|record| self.resolve(record))).await;

            for (slot, resolution) in resolutions.into_iter().enumerate() {
                let record = &mut records[start + slot];
                match resolution {
                    Resolution::Cached(coords) => {
                        stats.cache_hits += 1;
                        record.apply_coordinates(coords);
                    }
                    Resolution::Geocoded(coords) => record.apply_coordinates(coords),
                    Resolution::Rejected(coords) => {
                        warn!(
                            target: "geocoding",
                            name = %record.name,
                            prefecture = %record.prefecture,
                            lat = coords.lat,
                            "coordinate outside prefecture range; discarded"
                        );
                        stats.invalid_coordinates += 1;
                    }
                    Resolution::NotFound => stats.not_found += 1,
                }
            }

            let previous = start;
            start = end;
            stats.processed = start;
            let crossed = start / self.progress_interval > previous / self.progress_interval;
            if crossed || start == limit {
                info!(target: "geocoding", processed = start, limit, "geocoding progress");
            }
            if start < limit && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }
        }

        stats.geocoded = records.iter().filter(|r| r.is_geocoded()).count();
        info!(
            target: "geocoding",
            geocoded = stats.geocoded,
            cache_hits = stats.cache_hits,
            invalid = stats.invalid_coordinates,
            not_found = stats.not_found,
            total,
            "geocoding complete"
        );
        GeocodeReport { records, stats }
    }

    async fn resolve(&self, record: &PharmacyRecord) -> Resolution {
        match self.cache.lookup(&record.address) {
            Ok(Some(coords)) => return Resolution::Cached(coords),
            Ok(None) => {}
            Err(err) => warn!(?err, address = %record.address, "geocode cache read failed"),
        }

        let coords = match self.geocoder.geocode(&record.address).await {
            GeocodeOutcome::Found(coords) => coords,
            GeocodeOutcome::NotFound => return Resolution::NotFound,
        };
        if !is_within_prefecture(coords.lat, &record.prefecture) {
            return Resolution::Rejected(coords);
        }
        if let Err(err) = self.cache.remember(&record.address, coords) {
            warn!(?err, address = %record.address, "geocode cache write failed");
        }
        Resolution::Geocoded(coords)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::db::bootstrap_in_memory;
    use crate::geocoder::testing::ScriptedLookup;
    use crate::store::KvStore;

    fn record(index: usize, prefecture: &str, address: &str) -> PharmacyRecord {
        PharmacyRecord {
            id: format!("pharmacy-{index}"),
            pharmacy_number: None,
            prefecture: prefecture.into(),
            name: format!("薬局{index}"),
            address: address.into(),
            phone: String::new(),
            lat: None,
            lng: None,
            pharmacist_female: None,
            pharmacist_male: None,
            pharmacist_other: None,
            website: None,
            business_hours: None,
            after_hours_service: None,
            after_hours_phone: None,
            privacy_measures: None,
            advance_call_required: None,
            notes: None,
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            source_page_url: "http://localhost/page".into(),
            geocode_endpoint: "http://localhost/geocode".into(),
            user_agent: "test".into(),
            http_timeout_secs: 5,
            data_dir: "data".into(),
            database_file_name: "test.db".into(),
            output_dir: "out".into(),
            geocode_batch_size: 3,
            geocode_batch_delay_ms: 0,
            geocode_limit: 500,
            geocode_all: false,
            geocode_cache_ttl_days: 30,
            progress_interval: 2,
        }
    }

    fn orchestrator(lookup: Arc<ScriptedLookup>) -> (BatchGeocoder, GeocodeCache) {
        let store = KvStore::new(Arc::new(Mutex::new(bootstrap_in_memory().unwrap())));
        let cache = GeocodeCache::new(store, chrono::Duration::days(30));
        let geocoder = Geocoder::from_lookup(lookup);
        (
            BatchGeocoder::new(cache.clone(), geocoder, &test_config()),
            cache,
        )
    }

    #[tokio::test]
    async fn cache_hit_skips_geocoder() {
        let lookup = Arc::new(ScriptedLookup::default());
        let (batch, cache) = orchestrator(lookup.clone());
        let coords = Coordinates {
            lat: 35.68,
            lng: 139.76,
        };
        cache.remember("東京都千代田区1-2-3", coords).unwrap();

        let report = batch
            .run(vec![record(1, "東京都", "東京都千代田区1-2-3")], GeocodeScope::All)
            .await;

        assert_eq!(report.records[0].coordinates(), Some(coords));
        assert_eq!(report.stats.cache_hits, 1);
        assert_eq!(report.stats.geocoded, 1);
        assert_eq!(lookup.call_count(), 0);
    }

    #[tokio::test]
    async fn rejects_out_of_band_latitude() {
        // Sapporo coordinates for a Tokyo pharmacy.
        let lookup = Arc::new(ScriptedLookup::default().answer("東京都中央区1-1", 43.06, 141.35));
        let (batch, cache) = orchestrator(lookup);

        let report = batch
            .run(vec![record(1, "東京都", "東京都中央区1-1")], GeocodeScope::All)
            .await;

        assert_eq!(report.records[0].lat, None);
        assert_eq!(report.records[0].lng, None);
        assert_eq!(report.stats.invalid_coordinates, 1);
        assert_eq!(report.stats.geocoded, 0);
        assert_eq!(cache.lookup("東京都中央区1-1").unwrap(), None);
    }

    #[tokio::test]
    async fn valid_result_is_cached_under_original_address() {
        let lookup = Arc::new(
            ScriptedLookup::default().answer("大阪府大阪市北区梅田1-1-3", 34.70, 135.49),
        );
        let (batch, cache) = orchestrator(lookup);

        let report = batch
            .run(
                vec![record(1, "大阪府", "大阪府大阪市北区梅田１丁目１番３号")],
                GeocodeScope::All,
            )
            .await;

        let expected = Coordinates {
            lat: 34.70,
            lng: 135.49,
        };
        assert_eq!(report.records[0].coordinates(), Some(expected));
        assert_eq!(
            cache.lookup("大阪府大阪市北区梅田１丁目１番３号").unwrap(),
            Some(expected)
        );
    }

    #[tokio::test]
    async fn preserves_order_and_respects_limit() {
        let mut lookup = ScriptedLookup::default();
        for i in 0..7 {
            lookup = lookup.answer(&format!("東京都港区{i}"), 35.6 + i as f64 * 0.01, 139.7);
        }
        let lookup = Arc::new(lookup);
        let (batch, _) = orchestrator(lookup.clone());

        let records = (0..7)
            .map(|i| record(i, "東京都", &format!("東京都港区{i}")))
            .collect::<Vec<_>>();
        let report = batch.run(records, GeocodeScope::Limited(5)).await;

        let ids = report.records.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            (0..7).map(|i| format!("pharmacy-{i}")).collect::<Vec<_>>()
        );
        for (i, r) in report.records.iter().enumerate().take(5) {
            assert_eq!(r.lat, Some(35.6 + i as f64 * 0.01));
        }
        assert!(report.records[5..].iter().all(|r| r.lat.is_none()));
        assert_eq!(report.stats.processed, 5);
        assert_eq!(report.stats.total, 7);
        assert_eq!(report.stats.geocoded, 5);
        assert_eq!(lookup.call_count(), 5);
    }

    #[tokio::test]
    async fn lookup_failures_leave_records_ungeocoded() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .fail_on("福岡県福岡市博多区1")
                .answer("福岡県福岡市中央区2", 33.58, 130.39),
        );
        let (batch, _) = orchestrator(lookup);

        let report = batch
            .run(
                vec![
                    record(0, "福岡県", "福岡県福岡市博多区1"),
                    record(1, "福岡県", "福岡県福岡市中央区2"),
                ],
                GeocodeScope::All,
            )
            .await;

        assert_eq!(report.records[0].lat, None);
        assert_eq!(report.records[1].lat, Some(33.58));
        assert_eq!(report.stats.not_found, 1);
        assert_eq!(report.stats.geocoded, 1);
    }

    #[test]
    fn scope_follows_config() {
        let mut config = test_config();
        assert_eq!(GeocodeScope::from_config(&config), GeocodeScope::Limited(500));
        config.geocode_all = true;
        assert_eq!(GeocodeScope::from_config(&config), GeocodeScope::All);
        assert_eq!(GeocodeScope::Limited(500).limit(20), 20);
    }
}
