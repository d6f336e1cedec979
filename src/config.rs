use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use tracing::debug;

const DEFAULT_SOURCE_PAGE_URL: &str = "https://www.mhlw.go.jp/stf/kinnkyuuhininnyaku_00005.html";
const DEFAULT_GEOCODE_ENDPOINT: &str = "https://msearch.gsi.go.jp/address-search/AddressSearch";
const DEFAULT_USER_AGENT: &str = "pharmacy-locator/0.1.0";
const DEFAULT_GEOCODE_LIMIT: usize = 500;
const DEFAULT_CACHE_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub source_page_url: String,
    pub geocode_endpoint: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub database_file_name: String,
    pub output_dir: PathBuf,
    pub geocode_batch_size: usize,
    pub geocode_batch_delay_ms: u64,
    pub geocode_limit: usize,
    pub geocode_all: bool,
    pub geocode_cache_ttl_days: i64,
    pub progress_interval: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            source_page_url: env::var("SOURCE_PAGE_URL")
                .unwrap_or_else(|_| DEFAULT_SOURCE_PAGE_URL.to_string()),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            user_agent: env::var("HTTP_USER_AGENT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 30).max(1),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "pharmacy-locator.db".to_string()),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public").join("data")),
            geocode_batch_size: parse_usize("GEOCODE_BATCH_SIZE", 10).max(1),
            geocode_batch_delay_ms: parse_u64("GEOCODE_BATCH_DELAY_MS", 100),
            geocode_limit: parse_usize("GEOCODE_LIMIT", DEFAULT_GEOCODE_LIMIT),
            geocode_all: parse_bool("GEOCODE_ALL", false),
            geocode_cache_ttl_days: parse_i64("GEOCODE_CACHE_TTL_DAYS", DEFAULT_CACHE_TTL_DAYS)
                .max(1),
            progress_interval: parse_usize("PROGRESS_INTERVAL", 100).max(1),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_batch_delay_ms)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.geocode_cache_ttl_days)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
