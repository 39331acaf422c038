use crate::download::{fetch_all, notify};
use crate::link::{build_listing_url_with_scheme, get_resolution_links, resolve_link};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc::Sender;
use tracing::instrument;
use url::Url;

pub use crate::errors::SwError;
pub use crate::month::MonthSpec;
pub use crate::resolution::ResolutionSpec;

pub mod download;
mod errors;
pub mod link;
mod month;
mod resolution;

pub const HOST: &str = "www.smashingmagazine.com";
pub const MAX_CONCURRENT_DOWNLOADS: usize = 5;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Size of each write when streaming an image to disk
pub const CHUNK_SIZE: usize = 1024;
pub const DIRECTORY_PREFIX: &str = "Smashing_wallpaper";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// Everything needed for one run. Month and resolution are raw user input,
/// they're validated by [`init_download`].
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub resolution: String,
    pub month: String,
    pub year: u16,
    /// Directory the dated wallpaper folder is created in
    pub base_dir: PathBuf,
    pub host: String,
    pub scheme: String,
    /// Applies to every single request, listing page and images alike
    pub timeout: Duration,
}

impl DownloadRequest {
    pub fn new(resolution: &str, month: &str, year: u16, base_dir: PathBuf) -> Self {
        Self {
            resolution: resolution.to_string(),
            month: month.to_string(),
            year,
            base_dir,
            host: HOST.to_string(),
            scheme: "https".to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum Update {
    MessageUpdate(Message),
    ProgressUpdate(Progress),
}

#[derive(Debug)]
pub struct Message {
    pub content: String,
    pub resource_name: String,
    pub is_error: bool,
}

#[derive(Debug)]
pub struct Progress {
    pub bytes_written: u64,
    pub file_size: u64,
    pub resource_name: String,
}

#[derive(Debug, PartialEq)]
pub struct Summary {
    pub directory: PathBuf,
    /// Number of links found for the resolution
    pub candidates: usize,
    pub downloaded: usize,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// The listing page has no link for the requested resolution
    NoResults { listing_url: String },
    Completed(Summary),
}

/// Name of the folder a month's wallpapers are saved to. E.g Smashing_wallpaper_May_2015
pub fn destination_dir_name(month: &MonthSpec, year: u16) -> String {
    format!("{DIRECTORY_PREFIX}_{}_{year}", month.name())
}

#[instrument(skip(update_tx))]
pub async fn init_download(
    request: DownloadRequest,
    update_tx: Sender<Update>,
) -> Result<Outcome, SwError> {
    let month = MonthSpec::parse(&request.month)?;
    let resolution = ResolutionSpec::parse(&request.resolution)?;

    let listing_url =
        build_listing_url_with_scheme(&request.scheme, &request.host, &month, request.year);

    let client = Arc::new(
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request.timeout)
            .build()
            .map_err(|e| SwError::UnknownError(e.to_string()))?,
    );

    notify(
        &update_tx,
        Update::MessageUpdate(Message {
            content: "Trying to establish connection...".into(),
            resource_name: listing_url.clone(),
            is_error: false,
        }),
    );
    let html = fetch_listing_page(&client, &listing_url).await?;

    let dest_dir = request
        .base_dir
        .join(destination_dir_name(&month, request.year));
    if let Err(e) = fs::create_dir_all(&dest_dir).await {
        tracing::error!("Failed to create destination directory\nError : {}", e);
        return Err(SwError::ErrorCreatingDestinationDirectory(format!(
            "{} | {}",
            dest_dir.display(),
            e
        )));
    };

    let page_url = Url::parse(&listing_url).map_err(|_| SwError::InvalidUrl(listing_url.clone()))?;
    let links: Vec<String> = get_resolution_links(&html, &resolution)
        .iter()
        .map(|link| resolve_link(link, &page_url))
        .collect();
    if links.is_empty() {
        tracing::debug!("No {} links on {}", resolution, listing_url);
        return Ok(Outcome::NoResults { listing_url });
    }

    notify(
        &update_tx,
        Update::MessageUpdate(Message {
            content: "Connection established, start downloading...".into(),
            resource_name: dest_dir.to_string_lossy().to_string(),
            is_error: false,
        }),
    );
    let downloaded = fetch_all(
        &client,
        &dest_dir,
        &links,
        MAX_CONCURRENT_DOWNLOADS,
        update_tx,
    )
    .await;

    Ok(Outcome::Completed(Summary {
        directory: dest_dir,
        candidates: links.len(),
        downloaded,
    }))
}

#[instrument(skip(client))]
async fn fetch_listing_page(client: &Client, listing_url: &str) -> Result<String, SwError> {
    let response = client
        .get(listing_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("Error fetching listing page {}", listing_url);
            tracing::error!("{}", e);
            SwError::from_request_error(e, listing_url)
        })?;
    response
        .text()
        .await
        .map_err(|e| SwError::from_request_error(e, listing_url))
}
