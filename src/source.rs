use futures_util::StreamExt;
use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const SPREADSHEET_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];
const PREFERRED_LINK_MARKERS: [&str; 2] = ["一覧", "薬局"];
const FALLBACK_FILE_NAME: &str = "unknown.xlsx";

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

pub fn build_http_client(config: &AppConfig) -> AppResult<Client> {
    let http = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.http_timeout())
        .build()?;
    Ok(http)
}

#[derive(Debug, Clone)]
pub struct DownloadedSpreadsheet {
    pub source_url: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Locates and downloads the published spreadsheet.
#[derive(Clone)]
pub struct SpreadsheetSource {
    http: Client,
    page_url: String,
}

impl SpreadsheetSource {
    pub fn new(http: Client, page_url: impl Into<String>) -> Self {
        Self {
            http,
            page_url: page_url.into(),
        }
    }

    pub async fn discover(&self) -> AppResult<Url> {
        let base = Url::parse(&self.page_url)
            .map_err(|err| AppError::Config(format!("invalid source page URL: {err}")))?;
        info!(target: "source", page = %base, "fetching landing page");

        let response = self.http.get(base.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Source(format!(
                "landing page returned {status}"
            )));
        }
        let html = response.text().await?;

        let url = find_spreadsheet_link(&html, &base)
            .ok_or_else(|| AppError::Source("no spreadsheet link on landing page".into()))?;
        info!(target: "source", url = %url, "spreadsheet located");
        Ok(url)
    }

    pub async fn download<F>(&self, url: Url, mut progress: F) -> AppResult<DownloadedSpreadsheet>
    where
        F: FnMut(u64, Option<u64>) + Send,
    {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Source(format!(
                "spreadsheet download returned {status}"
            )));
        }

        let total = response.content_length();
        progress(0, total);

        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            downloaded += chunk.len() as u64;
            bytes.extend_from_slice(&chunk);
            progress(downloaded, total);
        }
        debug!(target: "source", bytes = downloaded, "spreadsheet downloaded");

        Ok(DownloadedSpreadsheet {
            file_name: file_name_of(&url),
            source_url: url.to_string(),
            bytes,
        })
    }

    pub async fn fetch(&self) -> AppResult<DownloadedSpreadsheet> {
        let url = self.discover().await?;
        let mut last_logged = 0_u64;
        self.download(url, |received, total| {
            // Log roughly every 256 KiB.
            if received - last_logged >= 256 * 1024 || Some(received) == total {
                debug!(target: "source", received, ?total, "download progress");
                last_logged = received;
            }
        })
        .await
    }
}

/// First spreadsheet link whose anchor text names the pharmacy list, else the
/// first spreadsheet link at all. Relative links resolve against `base`.
pub fn find_spreadsheet_link(html: &str, base: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    let mut fallback: Option<Url> = None;

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            continue;
        };
        if !is_spreadsheet(&url) {
            continue;
        }

        let text = anchor.text().collect::<String>();
        if PREFERRED_LINK_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Some(url);
        }
        if fallback.is_none() {
            fallback = Some(url);
        }
    }

    fallback
}

fn is_spreadsheet(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn file_name_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
