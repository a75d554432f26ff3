//! Site definition — which cams, sections, and data sources make up the page,
//! and how the result gets published.
//!
//! The definition lives in a JSON file (`shorecast.json` by default) next to
//! the work tree. Every field has a default, so a missing or partial file
//! still yields the stock site.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// A cam page the streams stage knows how to resolve into a direct HLS URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamSource {
    /// Short identifier, also the key in the stream directory.
    pub name: String,
    /// Public page embedding the player iframe.
    pub page: String,
}

/// One entry inside a cam section of the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CamEntry {
    /// Embedded third-party player, included as-is.
    Iframe { src: String },
    /// Direct HLS stream looked up in the stream directory by name.
    Stream { name: String },
}

/// A named group of cams rendered into one grid slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamSection {
    /// Slot key: the template token `{{<key>_cams}}` receives this grid.
    pub key: String,
    pub entries: Vec<CamEntry>,
}

/// A wave-model grid point the forecast is fetched for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Slot key: the template token `{{<key>_swell_card}}` receives the card.
    pub key: String,
    /// Human-readable name, used in logs.
    pub label: String,
    pub lon: f64,
    pub lat: f64,
    /// Canvas element id the forecast chart draws into.
    pub canvas_id: String,
}

/// Live buoy observation source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuoyConfig {
    #[serde(default = "default_buoy_url")]
    pub url: String,
    #[serde(default = "default_buoy_label")]
    pub label: String,
}

impl Default for BuoyConfig {
    fn default() -> Self {
        Self {
            url: default_buoy_url(),
            label: default_buoy_label(),
        }
    }
}

/// How the rendered site is committed and pushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_commit_message")]
    pub message: String,
    /// Commit even when the work tree is unchanged. Keeps the published
    /// history ticking as a heartbeat on scheduled runs.
    #[serde(default = "default_allow_empty")]
    pub allow_empty: bool,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    /// Environment variable holding the push token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// `owner/repo` slug. When set together with a token, pushes go to an
    /// authenticated HTTPS URL instead of the named remote.
    #[serde(default)]
    pub github_repo: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            remote: default_remote(),
            message: default_commit_message(),
            allow_empty: default_allow_empty(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            token_env: default_token_env(),
            github_repo: None,
        }
    }
}

/// The full site definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Template file, relative to the work tree.
    #[serde(default = "default_template")]
    pub template: String,
    /// Rendered page, relative to the work tree.
    #[serde(default = "default_output")]
    pub output: String,
    /// Stream directory state file, relative to the work tree.
    #[serde(default = "default_stream_state")]
    pub stream_state: String,
    #[serde(default = "default_cams")]
    pub cams: Vec<CamSource>,
    #[serde(default = "default_sections")]
    pub sections: Vec<CamSection>,
    #[serde(default = "default_forecast_points")]
    pub forecast_points: Vec<ForecastPoint>,
    #[serde(default)]
    pub buoy: BuoyConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            output: default_output(),
            stream_state: default_stream_state(),
            cams: default_cams(),
            sections: default_sections(),
            forecast_points: default_forecast_points(),
            buoy: BuoyConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Loads and validates a site definition from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| PipelineError::Json {
            context: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise falls back to the stock site.
    /// The boolean reports whether a file was actually read.
    pub fn load_or_default(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            Ok((Self::load(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }

    /// Writes the definition as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).map_err(|e| PipelineError::Json {
            context: path.display().to_string(),
            source: e,
        })?;
        fs::write(path, raw).map_err(|e| PipelineError::io(path, e))
    }

    /// Rejects definitions that would render a broken page or silently
    /// shadow one another (duplicate keys win by last write). Names and keys
    /// end up as DOM ids and inside generated scripts, so they are held to
    /// slug characters.
    pub fn validate(&self) -> Result<()> {
        if self.template.is_empty() {
            return Err(PipelineError::Config("template path is empty".into()));
        }
        if self.output.is_empty() {
            return Err(PipelineError::Config("output path is empty".into()));
        }
        if self.stream_state.is_empty() {
            return Err(PipelineError::Config("stream_state path is empty".into()));
        }
        unique(self.cams.iter().map(|c| c.name.as_str()), "cam name")?;
        unique(self.sections.iter().map(|s| s.key.as_str()), "section key")?;
        unique(
            self.forecast_points.iter().map(|p| p.key.as_str()),
            "forecast point key",
        )?;
        unique(
            self.forecast_points.iter().map(|p| p.canvas_id.as_str()),
            "forecast canvas id",
        )?;
        for section in &self.sections {
            for entry in &section.entries {
                if let CamEntry::Stream { name } = entry {
                    slug(name, "stream entry name")?;
                }
            }
        }
        Ok(())
    }
}

fn unique<'a>(values: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for value in values {
        slug(value, what)?;
        if !seen.insert(value) {
            return Err(PipelineError::Config(format!("duplicate {what} '{value}'")));
        }
    }
    Ok(())
}

fn slug(value: &str, what: &str) -> Result<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "{what} '{value}' must be non-empty and use only letters, digits, '-' or '_'"
        )))
    }
}

fn default_template() -> String {
    "template.html".to_string()
}

fn default_output() -> String {
    "index.html".to_string()
}

fn default_stream_state() -> String {
    "stream_url.json".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_commit_message() -> String {
    "Update beach cams".to_string()
}

fn default_allow_empty() -> bool {
    true
}

fn default_author_name() -> String {
    "shorecast-bot".to_string()
}

fn default_author_email() -> String {
    "shorecast-bot@users.noreply.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_buoy_url() -> String {
    "https://isramar.ocean.org.il/isramar2009/station/data/Hadera_Hs_Per.json".to_string()
}

fn default_buoy_label() -> String {
    "Hadera Buoy".to_string()
}

fn default_cams() -> Vec<CamSource> {
    vec![CamSource {
        name: "dolphinarium".to_string(),
        page: "https://beachcam.co.il/dolfinarium.html".to_string(),
    }]
}

fn default_sections() -> Vec<CamSection> {
    let iframe = |src: &str| CamEntry::Iframe {
        src: src.to_string(),
    };
    let stream = |name: &str| CamEntry::Stream {
        name: name.to_string(),
    };
    vec![
        CamSection {
            key: "haifa".to_string(),
            entries: vec![
                iframe("https://g2.ipcamlive.com/player/player.php?alias=5ffd9eb29b665"),
                iframe("https://g0.ipcamlive.com/player/player.php?alias=60acaa1aeee83"),
                stream("bat-galim"),
                stream("meridian"),
            ],
        },
        CamSection {
            key: "tlv".to_string(),
            entries: vec![
                stream("dolphinarium"),
                stream("hilton"),
                stream("yafo"),
                // Tel Aviv municipality live beach cameras.
                iframe("https://streaming.therdteam.com/live/play.html?id=10006"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10004"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10005"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10007"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10001"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10000"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10002"),
                iframe("https://streaming.therdteam.com/live/play.html?id=10003"),
            ],
        },
    ]
}

fn default_forecast_points() -> Vec<ForecastPoint> {
    vec![
        ForecastPoint {
            key: "haifa".to_string(),
            label: "Haifa".to_string(),
            lon: 35.0368,
            lat: 32.9151,
            canvas_id: "isramarHaifaChart".to_string(),
        },
        ForecastPoint {
            key: "tlv".to_string(),
            label: "Tel Aviv".to_string(),
            lon: 34.70,
            lat: 32.08,
            canvas_id: "isramarTlvChart".to_string(),
        },
    ]
}
