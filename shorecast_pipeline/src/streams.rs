//! Live stream resolution.
//!
//! Cam pages embed an ipcamlive player in an iframe. The player page carries
//! a `var streamid = '…';` assignment in its last script, and that id maps
//! onto a stable HLS endpoint. This module scrapes the id for every
//! configured cam and maintains the stream directory the renderer reads.
//!
//! Resolution is best-effort per cam: a cam that stops resolving keeps its
//! previous directory entry, so a flaky upstream degrades to a stale player
//! instead of a missing one.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::config::CamSource;
use crate::error::{PipelineError, Result};
use crate::http;

/// Player host whose embeds we know how to resolve.
const IPCAMLIVE_HOST: &str = "ipcamlive.com";

static STREAM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var streamid = '([^']+)';").unwrap());
static IFRAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("iframe").unwrap());
static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").unwrap());

/// Cam name -> direct HLS URL. A `BTreeMap` keeps the persisted JSON stable
/// across runs, so an unchanged directory produces an unchanged file.
pub type StreamDirectory = BTreeMap<String, String>;

/// What happened to each configured cam during one resolution pass.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Cams resolved to a fresh URL this pass.
    pub resolved: Vec<String>,
    /// Cams that failed but kept their previous URL.
    pub kept: Vec<String>,
    /// Cams that failed with no previous URL to fall back on.
    pub failed: Vec<String>,
}

impl ResolveReport {
    pub fn summary(&self) -> String {
        format!(
            "{} resolved, {} kept previous, {} unavailable",
            self.resolved.len(),
            self.kept.len(),
            self.failed.len()
        )
    }
}

/// Resolves one cam page to a direct HLS URL.
pub async fn resolve_stream(client: &reqwest::Client, cam: &CamSource) -> Result<String> {
    let page = http::fetch_text(client, &cam.page, &format!("cam page '{}'", cam.name)).await?;
    let iframe_src = find_iframe_src(&page).ok_or_else(|| {
        PipelineError::parse(format!("no iframe on cam page for '{}'", cam.name))
    })?;
    let embed_url = resolve_embed_url(&cam.page, &iframe_src)?;
    if !embed_url.contains(IPCAMLIVE_HOST) {
        return Err(PipelineError::parse(format!(
            "unsupported player host in iframe src '{embed_url}' for '{}'",
            cam.name
        )));
    }
    let player = http::fetch_text(client, &embed_url, &format!("player page '{}'", cam.name)).await?;
    let stream_id = extract_stream_id(&player).ok_or_else(|| {
        PipelineError::parse(format!("no streamid in player page for '{}'", cam.name))
    })?;
    Ok(hls_url(&stream_id))
}

/// Resolves every configured cam, starting from the previous directory.
/// Never fails as a whole; per-cam outcomes land in the report.
pub async fn resolve_all(
    client: &reqwest::Client,
    cams: &[CamSource],
    previous: &StreamDirectory,
) -> (StreamDirectory, ResolveReport) {
    let mut directory = previous.clone();
    let mut report = ResolveReport::default();
    for cam in cams {
        debug!(cam = %cam.name, page = %cam.page, "Resolving cam stream");
        let outcome = resolve_stream(client, cam).await;
        record_outcome(&mut directory, &mut report, &cam.name, outcome);
    }
    (directory, report)
}

fn record_outcome(
    directory: &mut StreamDirectory,
    report: &mut ResolveReport,
    name: &str,
    outcome: Result<String>,
) {
    match outcome {
        Ok(url) => {
            debug!(cam = name, url = %url, "Resolved stream");
            directory.insert(name.to_string(), url);
            report.resolved.push(name.to_string());
        }
        Err(e) if directory.contains_key(name) => {
            warn!(cam = name, error = %e, "Stream resolution failed, keeping previous URL");
            report.kept.push(name.to_string());
        }
        Err(e) => {
            warn!(cam = name, error = %e, "Stream resolution failed, cam unavailable");
            report.failed.push(name.to_string());
        }
    }
}

/// `src` of the first iframe on the page, if any.
fn find_iframe_src(page_html: &str) -> Option<String> {
    let doc = Html::parse_document(page_html);
    doc.select(&IFRAME_SELECTOR)
        .next()
        .and_then(|iframe| iframe.value().attr("src"))
        .map(str::to_string)
}

/// Pulls `var streamid = '…';` out of the last script on the player page.
/// Only the last script is consulted; the player keeps the assignment there.
fn extract_stream_id(player_html: &str) -> Option<String> {
    let doc = Html::parse_document(player_html);
    let script = doc.select(&SCRIPT_SELECTOR).last()?;
    let text: String = script.text().collect();
    STREAM_ID_RE
        .captures(&text)
        .map(|caps| caps[1].to_string())
}

/// Joins an iframe `src` against its page URL, so scheme-relative and
/// path-relative embeds come out absolute.
fn resolve_embed_url(page_url: &str, src: &str) -> Result<String> {
    let base = reqwest::Url::parse(page_url)
        .map_err(|e| PipelineError::parse(format!("bad cam page url '{page_url}': {e}")))?;
    let joined = base
        .join(src)
        .map_err(|e| PipelineError::parse(format!("bad iframe src '{src}': {e}")))?;
    Ok(joined.to_string())
}

/// Direct HLS endpoint for a resolved ipcamlive stream id.
fn hls_url(stream_id: &str) -> String {
    format!("https://s5.ipcamlive.com/streams/{stream_id}/stream.m3u8")
}

/// Reads the persisted stream directory. A missing file is an empty
/// directory, not an error; first runs start from nothing.
pub fn load_directory(path: &Path) -> Result<StreamDirectory> {
    if !path.exists() {
        return Ok(StreamDirectory::new());
    }
    let raw = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| PipelineError::Json {
        context: path.display().to_string(),
        source: e,
    })
}

/// Persists the stream directory atomically (write-then-rename), so a
/// crashed run never leaves a truncated file for the next one.
pub fn save_directory(path: &Path, directory: &StreamDirectory) -> Result<()> {
    let raw = serde_json::to_string_pretty(directory).map_err(|e| PipelineError::Json {
        context: path.display().to_string(),
        source: e,
    })?;
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp, raw).map_err(|e| PipelineError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        PipelineError::io(path, e)
    })
}
