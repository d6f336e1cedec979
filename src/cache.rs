use chrono::Duration;

use crate::errors::AppResult;
use crate::model::Coordinates;
use crate::store::{keys, KvStore};

/// Geocode results keyed by the address exactly as it appears in the record.
#[derive(Clone)]
pub struct GeocodeCache {
    store: KvStore,
    ttl: Duration,
}

impl GeocodeCache {
    pub fn new(store: KvStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn lookup(&self, address: &str) -> AppResult<Option<Coordinates>> {
        self.store.get_json(&cache_key(address))
    }

    pub fn remember(&self, address: &str, coords: Coordinates) -> AppResult<()> {
        self.store.put_json(&cache_key(address), &coords, Some(self.ttl))
    }

    pub fn entry_count(&self) -> AppResult<usize> {
        self.store.count_prefixed(keys::GEOCODE_PREFIX)
    }
}

pub fn cache_key(address: &str) -> String {
    format!("{}{}", keys::GEOCODE_PREFIX, address)
}
