use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::model::{DatasetMetadata, PharmacyRecord};
use crate::store::{keys, KvStore};

const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct PharmacyQuery {
    pub prefecture: Option<String>,
    pub text: Option<String>,
    pub near: Option<GeoPoint>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PharmacyMatch {
    #[serde(flatten)]
    pub record: PharmacyRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub pharmacies: Vec<PharmacyRecord>,
    pub meta: Option<DatasetMetadata>,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Applies the prefecture, text and location filters in that order. With a
/// location, only geocoded records within the radius are kept, nearest first.
pub fn search(records: &[PharmacyRecord], query: &PharmacyQuery) -> Vec<PharmacyMatch> {
    let needle = query
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let filtered = records.iter().filter(|record| {
        query
            .prefecture
            .as_deref()
            .map_or(true, |pref| record.prefecture == pref)
    });
    let filtered = filtered.filter(|record| match &needle {
        Some(needle) => {
            record.name.to_lowercase().contains(needle.as_str())
                || record.address.to_lowercase().contains(needle.as_str())
        }
        None => true,
    });

    let Some(origin) = query.near else {
        return filtered
            .map(|record| PharmacyMatch {
                record: record.clone(),
                distance: None,
            })
            .collect();
    };

    let radius = query.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    let mut matches: Vec<PharmacyMatch> = filtered
        .filter_map(|record| {
            let coords = record.coordinates()?;
            let distance = haversine_km(
                origin,
                GeoPoint {
                    lat: coords.lat,
                    lng: coords.lng,
                },
            );
            (distance <= radius).then(|| PharmacyMatch {
                record: record.clone(),
                distance: Some(distance),
            })
        })
        .collect();
    matches.sort_by(|a, b| {
        a.distance
            .unwrap_or(f64::INFINITY)
            .total_cmp(&b.distance.unwrap_or(f64::INFINITY))
    });
    matches
}

pub fn prefecture_counts(records: &[PharmacyRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.prefecture.clone()).or_insert(0) += 1;
    }
    counts
}

/// Reads the published dataset from the store, falling back to the JSON files
/// in `fallback_dir` when the store has no entry.
pub fn load_dataset(store: &KvStore, fallback_dir: Option<&Path>) -> AppResult<Dataset> {
    let pharmacies = match store.get_json::<Vec<PharmacyRecord>>(keys::PHARMACIES)? {
        Some(records) => Some(records),
        None => read_json_file(fallback_dir, "pharmacies.json")?,
    };
    let meta = match store.get_json::<DatasetMetadata>(keys::META)? {
        Some(meta) => Some(meta),
        None => read_json_file(fallback_dir, "meta.json")?,
    };
    Ok(Dataset {
        pharmacies: pharmacies.unwrap_or_default(),
        meta,
    })
}

fn read_json_file<T: serde::de::DeserializeOwned>(
    dir: Option<&Path>,
    file_name: &str,
) -> AppResult<Option<T>> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    let path = dir.join(file_name);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "dataset file not found");
            Ok(None)
        }
        Err(err) => Err(AppError::Io(err)),
    }
}
