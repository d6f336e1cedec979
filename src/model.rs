use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One pharmacy location as published in the dataset.
///
/// `lat`/`lng` are `None` until a validated geocode is applied. Pharmacist
/// counts are `None` when the source did not disclose them, which is distinct
/// from a disclosed zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacy_number: Option<String>,
    pub prefecture: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacist_female: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacist_male: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacist_other: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_hours_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_hours_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_measures: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance_call_required: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PharmacyRecord {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
            _ => None,
        }
    }

    pub fn apply_coordinates(&mut self, coords: Coordinates) {
        self.lat = Some(coords.lat);
        self.lng = Some(coords.lng);
    }

    pub fn is_geocoded(&self) -> bool {
        self.coordinates().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub last_updated: DateTime<Utc>,
    pub total_count: usize,
    pub source_url: String,
    pub file_name: String,
}
