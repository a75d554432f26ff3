//! Marine data sources: the ISRAMAR wave model and the Hadera buoy.
//!
//! The wave model is scraped from the `InfoLabel.aspx` endpoint, which
//! returns an HTML fragment with one `wav{i}`/`wnd{i}` row pair per 3-hour
//! forecast step, anchored at midnight UTC of the current model day. The
//! buoy endpoint is plain JSON with named parameters.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::config::ForecastPoint;
use crate::error::Result;
use crate::http;

pub const ISRAMAR_MODEL_URL: &str =
    "https://isramar.ocean.org.il/isramar2009/wave_model/InfoLabel.aspx";

/// The model publishes at most 41 steps (five days at 3-hour intervals).
const FORECAST_ROWS: usize = 41;

/// Step labels as shown on cards and chart axes, e.g. `Thu 07/03 15:00`.
const TIME_LABEL_FORMAT: &str = "%a %d/%m %H:%M";

const BUOY_TIMEOUT: StdDuration = StdDuration::from_secs(15);

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[id]").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// One 3-hour forecast step.
#[derive(Debug, Clone)]
pub struct ForecastEntry {
    pub dt: DateTime<Utc>,
    pub label: String,
    pub wave_height: f64,
    pub wave_dir: f64,
    pub wave_period: f64,
    pub wind_speed_kts: f64,
    pub wind_dir: f64,
}

/// The model run the forecast is requested against.
#[derive(Debug, Clone)]
pub struct ModelRun {
    /// `yymmdd0000` — today's midnight run, as the endpoint expects it.
    pub modeldate: String,
    /// Timestamp of step 0.
    pub base: DateTime<Utc>,
}

pub fn model_run(now: DateTime<Utc>) -> ModelRun {
    ModelRun {
        modeldate: now.format("%y%m%d0000").to_string(),
        base: now.date_naive().and_time(NaiveTime::MIN).and_utc(),
    }
}

pub fn forecast_url(point: &ForecastPoint, modeldate: &str) -> String {
    format!(
        "{ISRAMAR_MODEL_URL}?x={}&y={}&model=wam&modeldate={modeldate}&region=fine",
        point.lon, point.lat
    )
}

/// Fetches the forecast for one grid point. An empty vec means the model
/// returned no rows; callers treat that the same as a fetch failure.
pub async fn fetch_forecast(
    client: &reqwest::Client,
    point: &ForecastPoint,
    now: DateTime<Utc>,
) -> Result<Vec<ForecastEntry>> {
    let run = model_run(now);
    let url = forecast_url(point, &run.modeldate);
    let html = http::fetch_text(client, &url, &format!("forecast for {}", point.label)).await?;
    Ok(parse_forecast(&html, run.base))
}

/// Parses `wav{i}`/`wnd{i}` rows out of the InfoLabel fragment. Rows are
/// consumed in step order and parsing stops at the first missing `wav` row.
/// A missing `wnd` row or a malformed cell reads as zero rather than
/// discarding the step.
pub fn parse_forecast(html: &str, base: DateTime<Utc>) -> Vec<ForecastEntry> {
    let rows = collect_rows(html);
    let mut entries = Vec::new();
    for i in 0..FORECAST_ROWS {
        let Some(wav) = rows.get(&format!("wav{i}")) else {
            break;
        };
        let wnd = rows.get(&format!("wnd{i}"));
        let dt = base + Duration::hours(3 * i as i64);
        entries.push(ForecastEntry {
            dt,
            label: dt.format(TIME_LABEL_FORMAT).to_string(),
            wave_height: cell(wav, 2),
            wave_dir: cell(wav, 5),
            wave_period: cell(wav, 8),
            wind_speed_kts: wnd.map_or(0.0, |cells| cell(cells, 5)),
            wind_dir: wnd.map_or(0.0, |cells| cell(cells, 8)),
        });
    }
    entries
}

/// Entry closest in time to `now`, on either side.
pub fn closest_entry(entries: &[ForecastEntry], now: DateTime<Utc>) -> Option<&ForecastEntry> {
    entries
        .iter()
        .min_by_key(|entry| (entry.dt - now).num_seconds().abs())
}

fn collect_rows(html: &str) -> HashMap<String, Vec<String>> {
    let doc = Html::parse_document(html);
    let mut rows = HashMap::new();
    for element in doc.select(&ROW_SELECTOR) {
        let Some(id) = element.value().id() else {
            continue;
        };
        let cells: Vec<String> = element
            .select(&CELL_SELECTOR)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();
        rows.insert(id.to_string(), cells);
    }
    rows
}

fn cell(cells: &[String], idx: usize) -> f64 {
    cells
        .get(idx)
        .and_then(|c| c.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Raw shape of the buoy endpoint. `parameters` is required; a payload
/// without it means the station is down and the card shows unavailable.
#[derive(Debug, Clone, Deserialize)]
pub struct BuoyReport {
    #[serde(default)]
    pub datetime: String,
    pub parameters: Vec<BuoyParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuoyParameter {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

/// The latest observation, flattened for rendering.
#[derive(Debug, Clone)]
pub struct BuoyObservation {
    pub time: String,
    pub significant_height: f64,
    pub peak_period: f64,
    pub max_height: f64,
}

impl BuoyReport {
    pub fn observation(&self) -> BuoyObservation {
        let value = |name: &str| {
            self.parameters
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.values.get(0))
                .copied()
                .unwrap_or(0.0)
        };
        BuoyObservation {
            time: self.datetime.clone(),
            significant_height: value("Significant wave height"),
            peak_period: value("Peak wave period"),
            max_height: value("Maximal wave height"),
        }
    }
}

pub async fn fetch_buoy(client: &reqwest::Client, url: &str) -> Result<BuoyObservation> {
    let report: BuoyReport =
        http::fetch_json(client, url, BUOY_TIMEOUT, "buoy observations").await?;
    Ok(report.observation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wave_row(id: &str, height: &str, dir: &str, period: &str) -> String {
        format!(
            "<tr id=\"{id}\"><td>Hs</td><td></td><td>{height}</td>\
             <td>Dir</td><td></td><td>{dir}</td>\
             <td>Tp</td><td></td><td>{period}</td></tr>"
        )
    }

    #[test]
    fn model_run_uses_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 0).unwrap();
        let run = model_run(now);
        assert_eq!(run.modeldate, "2403070000");
        assert_eq!(run.base, Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap());
    }

    #[test]
    fn forecast_url_carries_point_and_run() {
        let point = ForecastPoint {
            key: "haifa".to_string(),
            label: "Haifa".to_string(),
            lon: 35.0368,
            lat: 32.9151,
            canvas_id: "isramarHaifaChart".to_string(),
        };
        assert_eq!(
            forecast_url(&point, "2403070000"),
            "https://isramar.ocean.org.il/isramar2009/wave_model/InfoLabel.aspx\
             ?x=35.0368&y=32.9151&model=wam&modeldate=2403070000&region=fine"
        );
    }

    #[test]
    fn parses_rows_until_first_gap() {
        let html = format!(
            "<table>{}{}{}{}</table>",
            wave_row("wav0", "0.62", "245", "5.8"),
            wave_row("wnd0", "x", "12", "270"),
            wave_row("wav1", "0.71", "250", "6.1"),
            // wav2 missing: wav3 must not be reached.
            wave_row("wav3", "9.99", "0", "0"),
        );
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let entries = parse_forecast(&html, base);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].wave_height, 0.62);
        assert_eq!(entries[0].wave_dir, 245.0);
        assert_eq!(entries[0].wave_period, 5.8);
        assert_eq!(entries[0].wind_speed_kts, 12.0);
        assert_eq!(entries[0].wind_dir, 270.0);
        assert_eq!(entries[0].dt, base);
        assert_eq!(entries[0].label, "Thu 07/03 00:00");

        // Second step: three hours later, no wnd row.
        assert_eq!(entries[1].dt, base + Duration::hours(3));
        assert_eq!(entries[1].label, "Thu 07/03 03:00");
        assert_eq!(entries[1].wind_speed_kts, 0.0);
        assert_eq!(entries[1].wind_dir, 0.0);
    }

    #[test]
    fn short_or_malformed_cells_read_zero() {
        let html = "<table><tr id=\"wav0\"><td>only</td><td>two</td></tr></table>";
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let entries = parse_forecast(html, base);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].wave_height, 0.0);
        assert_eq!(entries[0].wave_period, 0.0);

        let html = format!("<table>{}</table>", wave_row("wav0", "n/a", "245", "5.8"));
        let entries = parse_forecast(&html, base);
        assert_eq!(entries[0].wave_height, 0.0);
        assert_eq!(entries[0].wave_dir, 245.0);
    }

    #[test]
    fn fragment_without_rows_is_empty() {
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        assert!(parse_forecast("<html><body>maintenance</body></html>", base).is_empty());
    }

    #[test]
    fn closest_entry_picks_nearest_step() {
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let html = format!(
            "<table>{}{}{}</table>",
            wave_row("wav0", "0.5", "240", "5.0"),
            wave_row("wav1", "0.6", "240", "5.0"),
            wave_row("wav2", "0.7", "240", "5.0"),
        );
        let entries = parse_forecast(&html, base);

        // 04:10 is closer to 03:00 than to 06:00.
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 4, 10, 0).unwrap();
        let nearest = closest_entry(&entries, now).unwrap();
        assert_eq!(nearest.dt, base + Duration::hours(3));

        assert!(closest_entry(&[], now).is_none());
    }

    #[test]
    fn buoy_observation_reads_named_parameters() {
        let raw = r#"{
            "datetime": "07/03/2024 14:30",
            "parameters": [
                {"name": "Significant wave height", "values": [0.62, 0.60]},
                {"name": "Peak wave period", "values": [5.9]},
                {"name": "Maximal wave height", "values": [1.04]}
            ]
        }"#;
        let report: BuoyReport = serde_json::from_str(raw).unwrap();
        let obs = report.observation();
        assert_eq!(obs.time, "07/03/2024 14:30");
        assert_eq!(obs.significant_height, 0.62);
        assert_eq!(obs.peak_period, 5.9);
        assert_eq!(obs.max_height, 1.04);
    }

    #[test]
    fn buoy_missing_parameter_reads_zero() {
        let raw = r#"{"parameters": [{"name": "Peak wave period", "values": [6.2]}]}"#;
        let report: BuoyReport = serde_json::from_str(raw).unwrap();
        let obs = report.observation();
        assert_eq!(obs.significant_height, 0.0);
        assert_eq!(obs.peak_period, 6.2);
        assert_eq!(obs.time, "");
    }

    #[test]
    fn buoy_payload_without_parameters_is_rejected() {
        assert!(serde_json::from_str::<BuoyReport>(r#"{"datetime": "x"}"#).is_err());
    }
}
