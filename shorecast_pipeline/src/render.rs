//! Page rendering.
//!
//! The template carries `{{slot}}` tokens; each configured forecast point
//! owns `{{<key>_swell_card}}`, each cam section owns `{{<key>_cams}}`, and
//! the buoy card fills `{{buoy_card}}`. Generated chart and autoplay scripts
//! are inserted just before `</body>`.
//!
//! Rendering is deterministic: the same inputs produce byte-identical
//! output, so an unchanged upstream leaves the work tree clean.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{CamEntry, CamSection, ForecastPoint, SiteConfig};
use crate::error::{PipelineError, Result};
use crate::marine::{self, BuoyObservation, ForecastEntry};
use crate::streams::StreamDirectory;

const FORECAST_UNAVAILABLE: &str = "Forecast Unavailable";
const BUOY_UNAVAILABLE: &str = "Buoy Unavailable";

/// Forecast entries for one configured point. Empty entries mean the model
/// was unreachable or returned nothing; the card renders as unavailable.
#[derive(Debug, Clone)]
pub struct PointForecast {
    pub point: ForecastPoint,
    pub entries: Vec<ForecastEntry>,
}

/// Everything the renderer needs for one pass.
#[derive(Debug, Clone)]
pub struct RenderData {
    pub forecasts: Vec<PointForecast>,
    pub buoy: Option<BuoyObservation>,
    pub streams: StreamDirectory,
}

/// A written page.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Fetches forecast and buoy data for the whole site. Individual source
/// failures degrade to unavailable cards instead of failing the stage.
pub async fn gather(
    client: &reqwest::Client,
    site: &SiteConfig,
    streams: StreamDirectory,
    now: DateTime<Utc>,
) -> RenderData {
    let mut forecasts = Vec::new();
    for point in &site.forecast_points {
        info!(point = %point.label, "Fetching wave forecast");
        let entries = match marine::fetch_forecast(client, point, now).await {
            Ok(entries) => {
                if entries.is_empty() {
                    warn!(point = %point.label, "Forecast returned no rows");
                }
                entries
            }
            Err(e) => {
                warn!(point = %point.label, error = %e, "Forecast fetch failed");
                Vec::new()
            }
        };
        forecasts.push(PointForecast {
            point: point.clone(),
            entries,
        });
    }

    info!("Fetching buoy observations");
    let buoy = match marine::fetch_buoy(client, &site.buoy.url).await {
        Ok(observation) => Some(observation),
        Err(e) => {
            warn!(error = %e, "Buoy fetch failed");
            None
        }
    };

    RenderData {
        forecasts,
        buoy,
        streams,
    }
}

/// Renders the template into a full page.
pub fn render_page(
    template: &str,
    site: &SiteConfig,
    data: &RenderData,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut page = template.to_string();

    for forecast in &data.forecasts {
        fill_slot(
            &mut page,
            &format!("{}_swell_card", forecast.point.key),
            &swell_card(&forecast.entries, now),
        );
    }
    fill_slot(
        &mut page,
        "buoy_card",
        &buoy_card(&site.buoy.label, data.buoy.as_ref()),
    );

    let mut video_ids = Vec::new();
    for section in &site.sections {
        let grid = cam_grid(section, &data.streams, &mut video_ids);
        fill_slot(&mut page, &format!("{}_cams", section.key), &grid);
    }

    insert_before_body_end(&mut page, &script_tag(&chart_script(&data.forecasts)))?;
    if let Some(script) = autoplay_script(&video_ids) {
        insert_before_body_end(&mut page, &script_tag(&script))?;
    }
    Ok(page)
}

/// Reads the template from the work tree, renders, and writes the output.
pub fn render_to_file(
    work_dir: &Path,
    site: &SiteConfig,
    data: &RenderData,
    now: DateTime<Utc>,
) -> Result<Rendered> {
    let template_path = work_dir.join(&site.template);
    let template =
        fs::read_to_string(&template_path).map_err(|e| PipelineError::io(&template_path, e))?;
    let page = render_page(&template, site, data, now)?;
    let output_path = work_dir.join(&site.output);
    fs::write(&output_path, &page).map_err(|e| PipelineError::io(&output_path, e))?;
    info!(path = %output_path.display(), bytes = page.len(), "Rendered page");
    Ok(Rendered {
        path: output_path,
        bytes: page.len(),
    })
}

/// Replaces the first `{{name}}` token. A template without the slot is
/// fine; the content is simply dropped.
fn fill_slot(page: &mut String, name: &str, content: &str) -> bool {
    let token = format!("{{{{{name}}}}}");
    match page.find(&token) {
        Some(at) => {
            page.replace_range(at..at + token.len(), content);
            true
        }
        None => {
            debug!(slot = name, "Template has no slot, skipping");
            false
        }
    }
}

fn insert_before_body_end(page: &mut String, fragment: &str) -> Result<()> {
    let at = page.rfind("</body>").ok_or_else(|| PipelineError::Template {
        context: "missing </body> marker".to_string(),
    })?;
    page.insert_str(at, fragment);
    Ok(())
}

fn script_tag(content: &str) -> String {
    format!("<script>\n{content}\n</script>\n")
}

/// Summary card for the forecast entry closest to now.
fn swell_card(entries: &[ForecastEntry], now: DateTime<Utc>) -> String {
    let Some(current) = marine::closest_entry(entries, now) else {
        return FORECAST_UNAVAILABLE.to_string();
    };
    let mut items = String::new();
    swell_item(&mut items, "Wave Height", &format!("{}m", display_float(current.wave_height)));
    swell_item(&mut items, "Period", &format!("{}s", display_float(current.wave_period)));
    swell_item(&mut items, "Dir", &format!("{}\u{b0}", current.wave_dir as i64));
    swell_item(&mut items, "Wind", &format!("{}kt", current.wind_speed_kts as i64));
    format!(
        "<div class=\"swell-card-wrapper\"><div class=\"swell-time\">{}</div>\
         <div class=\"swell-data-container\" style=\"display: flex; gap: 15px;\">{items}</div></div>",
        escape_text(&current.label)
    )
}

/// Live observation card, or the unavailable marker when the buoy is down.
fn buoy_card(label: &str, observation: Option<&BuoyObservation>) -> String {
    let Some(obs) = observation else {
        return BUOY_UNAVAILABLE.to_string();
    };
    let mut items = String::new();
    swell_item(&mut items, "Hs", &format!("{:.1}m", obs.significant_height));
    swell_item(&mut items, "Period", &format!("{:.1}s", obs.peak_period));
    swell_item(&mut items, "Hmax", &format!("{:.1}m", obs.max_height));
    format!(
        "<div style=\"display: flex; gap: 15px; align-items: center;\">\
         <div><div class=\"buoy-title\">{}</div><div class=\"buoy-time\">{}</div></div>{items}</div>",
        escape_text(label),
        escape_text(&obs.time)
    )
}

fn swell_item(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(
        "<div class=\"swell-item\"><div class=\"swell-label\">{label}</div>\
         <div class=\"swell-value\">{value}</div></div>"
    ));
}

/// One cam grid. Stream entries with no directory URL are skipped; iframe
/// entries are always included. Video element ids are collected for the
/// autoplay script.
fn cam_grid(section: &CamSection, streams: &StreamDirectory, video_ids: &mut Vec<String>) -> String {
    let mut items = String::new();
    for entry in &section.entries {
        match entry {
            CamEntry::Iframe { src } => items.push_str(&iframe_tag(src)),
            CamEntry::Stream { name } => match streams.get(name) {
                Some(url) => {
                    debug!(cam = %name, "Adding dynamic stream");
                    let id = format!("{name}-cam");
                    items.push_str(&video_tag(&id, url));
                    video_ids.push(id);
                }
                None => debug!(cam = %name, "No stream URL, skipping cam"),
            },
        }
    }
    format!("<div class=\"grid-container\">{items}</div>")
}

fn video_tag(id: &str, stream_url: &str) -> String {
    format!(
        "<div class=\"grid-item\"><video id=\"{id}\" \
         class=\"video-js vjs-default-skin vjs-big-play-centered\" \
         controls preload=\"auto\" playsinline>\
         <source src=\"{}\" type=\"application/x-mpegURL\"></video></div>",
        escape_attr(stream_url)
    )
}

fn iframe_tag(src: &str) -> String {
    format!(
        "<div class=\"grid-item\"><iframe src=\"{}\" allowfullscreen autoplay></iframe></div>",
        escape_attr(src)
    )
}

/// Chart bootstrap: the shared draw helper plus one call per forecast
/// point. Points without data still get a call with empty arrays, so the
/// canvas stays blank instead of holding stale data.
fn chart_script(forecasts: &[PointForecast]) -> String {
    let mut script = String::from(CHART_HELPER_JS);
    for forecast in forecasts {
        let labels: Vec<&str> = forecast.entries.iter().map(|e| e.label.as_str()).collect();
        let heights: Vec<f64> = forecast.entries.iter().map(|e| e.wave_height).collect();
        let periods: Vec<f64> = forecast.entries.iter().map(|e| e.wave_period).collect();
        let winds: Vec<f64> = forecast.entries.iter().map(|e| e.wind_speed_kts).collect();
        script.push_str(&format!(
            "\n        createIsramarChart('{}', {}, {}, {}, {});",
            forecast.point.canvas_id,
            json_array(&labels),
            json_array(&heights),
            json_array(&periods),
            json_array(&winds)
        ));
    }
    script.push_str("\n    });");
    script
}

/// Kicks every rendered video element once the page loads.
fn autoplay_script(video_ids: &[String]) -> Option<String> {
    if video_ids.is_empty() {
        return None;
    }
    let mut script = String::from("window.addEventListener('load', function() {\n");
    for id in video_ids {
        script.push_str(&format!(
            "  if(document.getElementById('{id}')) {{ videojs('{id}').play(); }}\n"
        ));
    }
    script.push_str("});");
    Some(script)
}

fn json_array<T: Serialize>(values: &[T]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Float display that keeps a trailing `.0` on whole numbers, so heights
/// read as `1.0m` rather than `1m`.
fn display_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}

const CHART_HELPER_JS: &str = r#"
    document.addEventListener('DOMContentLoaded', function() {
        function createIsramarChart(ctxId, labels, heights, periods, winds) {
            const ctx = document.getElementById(ctxId);
            if (!ctx) return;

            new Chart(ctx, {
                type: 'line',
                data: {
                    labels: labels,
                    datasets: [
                        {
                            label: 'Wave Height (m)',
                            data: heights,
                            borderColor: 'rgba(0, 123, 255, 1)',
                            backgroundColor: 'rgba(0, 123, 255, 0.15)',
                            borderWidth: 2,
                            fill: true,
                            tension: 0.4,
                            yAxisID: 'y'
                        },
                        {
                            label: 'Period (s)',
                            data: periods,
                            borderColor: 'rgba(255, 159, 64, 1)',
                            backgroundColor: 'rgba(255, 159, 64, 0.05)',
                            borderWidth: 2,
                            borderDash: [5, 5],
                            fill: false,
                            tension: 0.4,
                            yAxisID: 'y1'
                        },
                        {
                            label: 'Wind (kt)',
                            data: winds,
                            borderColor: 'rgba(150, 150, 150, 0.7)',
                            backgroundColor: 'rgba(150, 150, 150, 0.1)',
                            borderWidth: 1,
                            fill: true,
                            tension: 0.4,
                            yAxisID: 'y'
                        }
                    ]
                },
                options: {
                    responsive: true,
                    maintainAspectRatio: false,
                    interaction: { mode: 'index', intersect: false },
                    plugins: {
                        legend: { position: 'top' },
                        tooltip: { mode: 'index', intersect: false }
                    },
                    scales: {
                        y: {
                            beginAtZero: true,
                            position: 'left',
                            title: { display: true, text: 'Height (m) / Wind (kt)' }
                        },
                        y1: {
                            beginAtZero: true,
                            position: 'right',
                            title: { display: true, text: 'Period (s)' },
                            grid: { drawOnChartArea: false }
                        },
                        x: {
                            ticks: {
                                maxTicksLimit: 10,
                                autoSkip: true,
                                maxRotation: 45,
                                minRotation: 45
                            }
                        }
                    }
                }
            });
        }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(dt: DateTime<Utc>, height: f64, period: f64, dir: f64, wind: f64) -> ForecastEntry {
        ForecastEntry {
            dt,
            label: dt.format("%a %d/%m %H:%M").to_string(),
            wave_height: height,
            wave_dir: dir,
            wave_period: period,
            wind_speed_kts: wind,
            wind_dir: 270.0,
        }
    }

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 4, 0, 0).unwrap()
    }

    #[test]
    fn float_display_keeps_trailing_zero() {
        assert_eq!(display_float(0.62), "0.62");
        assert_eq!(display_float(1.0), "1.0");
        assert_eq!(display_float(12.0), "12.0");
    }

    #[test]
    fn swell_card_uses_closest_entry() {
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let entries = vec![
            entry(base, 0.5, 5.0, 240.0, 8.0),
            entry(base + chrono::Duration::hours(3), 0.62, 5.8, 245.7, 12.9),
            entry(base + chrono::Duration::hours(6), 0.7, 6.0, 250.0, 14.0),
        ];
        let card = swell_card(&entries, test_now());
        assert!(card.contains("swell-card-wrapper"));
        assert!(card.contains("Thu 07/03 03:00"));
        assert!(card.contains("0.62m"));
        assert!(card.contains("5.8s"));
        // Directions and wind are truncated to whole numbers.
        assert!(card.contains("245\u{b0}"));
        assert!(card.contains("12kt"));
    }

    #[test]
    fn swell_card_without_entries_is_unavailable() {
        assert_eq!(swell_card(&[], test_now()), "Forecast Unavailable");
    }

    #[test]
    fn buoy_card_formats_one_decimal() {
        let obs = BuoyObservation {
            time: "07/03/2024 14:30".to_string(),
            significant_height: 0.62,
            peak_period: 5.94,
            max_height: 1.0,
        };
        let card = buoy_card("Hadera Buoy", Some(&obs));
        assert!(card.contains("Hadera Buoy"));
        assert!(card.contains("07/03/2024 14:30"));
        assert!(card.contains("0.6m"));
        assert!(card.contains("5.9s"));
        assert!(card.contains("1.0m"));
    }

    #[test]
    fn buoy_card_without_observation_is_unavailable() {
        assert_eq!(buoy_card("Hadera Buoy", None), "Buoy Unavailable");
    }

    #[test]
    fn video_tag_shape() {
        let tag = video_tag("meridian-cam", "https://s5.ipcamlive.com/streams/abc/stream.m3u8");
        assert!(tag.contains("id=\"meridian-cam\""));
        assert!(tag.contains("video-js vjs-default-skin vjs-big-play-centered"));
        assert!(tag.contains("type=\"application/x-mpegURL\""));
        assert!(tag.starts_with("<div class=\"grid-item\">"));
    }

    #[test]
    fn iframe_tag_escapes_attributes() {
        let tag = iframe_tag("https://example.com/play.html?id=1&x=\"2\"");
        assert!(tag.contains("src=\"https://example.com/play.html?id=1&amp;x=&quot;2&quot;\""));
        assert!(tag.contains("allowfullscreen autoplay"));
    }

    #[test]
    fn cam_grid_skips_unresolved_streams() {
        let section = CamSection {
            key: "tlv".to_string(),
            entries: vec![
                CamEntry::Stream {
                    name: "dolphinarium".to_string(),
                },
                CamEntry::Stream {
                    name: "hilton".to_string(),
                },
                CamEntry::Iframe {
                    src: "https://streaming.therdteam.com/live/play.html?id=10006".to_string(),
                },
            ],
        };
        let mut streams = StreamDirectory::new();
        streams.insert(
            "dolphinarium".to_string(),
            "https://s5.ipcamlive.com/streams/abc/stream.m3u8".to_string(),
        );
        let mut ids = Vec::new();
        let grid = cam_grid(&section, &streams, &mut ids);

        assert!(grid.starts_with("<div class=\"grid-container\">"));
        assert!(grid.contains("dolphinarium-cam"));
        assert!(!grid.contains("hilton-cam"));
        assert!(grid.contains("therdteam.com"));
        assert_eq!(ids, vec!["dolphinarium-cam"]);
    }

    #[test]
    fn fill_slot_replaces_token() {
        let mut page = "<div id=\"buoy-card\">{{buoy_card}}</div>".to_string();
        assert!(fill_slot(&mut page, "buoy_card", "CONTENT"));
        assert_eq!(page, "<div id=\"buoy-card\">CONTENT</div>");
    }

    #[test]
    fn fill_slot_missing_token_is_noop() {
        let mut page = "<div></div>".to_string();
        assert!(!fill_slot(&mut page, "buoy_card", "CONTENT"));
        assert_eq!(page, "<div></div>");
    }

    #[test]
    fn scripts_land_before_body_end() {
        let mut page = "<html><body><p>x</p></body></html>".to_string();
        insert_before_body_end(&mut page, "<script>s</script>").unwrap();
        assert_eq!(page, "<html><body><p>x</p><script>s</script></body></html>");
    }

    #[test]
    fn missing_body_end_is_an_error() {
        let mut page = "<html><p>x</p></html>".to_string();
        assert!(insert_before_body_end(&mut page, "<script></script>").is_err());
    }

    #[test]
    fn chart_script_emits_one_call_per_point() {
        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let haifa = ForecastPoint {
            key: "haifa".to_string(),
            label: "Haifa".to_string(),
            lon: 35.0368,
            lat: 32.9151,
            canvas_id: "isramarHaifaChart".to_string(),
        };
        let tlv = ForecastPoint {
            key: "tlv".to_string(),
            label: "Tel Aviv".to_string(),
            lon: 34.70,
            lat: 32.08,
            canvas_id: "isramarTlvChart".to_string(),
        };
        let forecasts = vec![
            PointForecast {
                point: haifa,
                entries: vec![entry(base, 0.5, 5.0, 240.0, 8.0)],
            },
            PointForecast {
                point: tlv,
                entries: Vec::new(),
            },
        ];
        let script = chart_script(&forecasts);
        assert!(script.contains("function createIsramarChart"));
        assert!(script.contains("createIsramarChart('isramarHaifaChart', [\"Thu 07/03 00:00\"], [0.5], [5.0], [8.0]);"));
        assert!(script.contains("createIsramarChart('isramarTlvChart', [], [], [], []);"));
        assert!(script.trim_end().ends_with("});"));
    }

    #[test]
    fn autoplay_script_only_with_videos() {
        assert!(autoplay_script(&[]).is_none());
        let script = autoplay_script(&["meridian-cam".to_string()]).unwrap();
        assert!(script.contains("videojs('meridian-cam').play();"));
        assert!(script.starts_with("window.addEventListener('load'"));
    }

    #[test]
    fn render_page_fills_everything() {
        let template = "<html><body>\
            <div id=\"buoy-card\">{{buoy_card}}</div>\
            <div id=\"haifa-swell-card\">{{haifa_swell_card}}</div>\
            <div id=\"haifa-cams-container\">{{haifa_cams}}</div>\
            </body></html>";
        let mut site = SiteConfig::default();
        site.sections.truncate(1);
        site.forecast_points.truncate(1);

        let base = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap();
        let mut streams = StreamDirectory::new();
        streams.insert(
            "meridian".to_string(),
            "https://s5.ipcamlive.com/streams/abc/stream.m3u8".to_string(),
        );
        let data = RenderData {
            forecasts: vec![PointForecast {
                point: site.forecast_points[0].clone(),
                entries: vec![entry(base, 0.5, 5.0, 240.0, 8.0)],
            }],
            buoy: None,
            streams,
        };

        let page = render_page(template, &site, &data, test_now()).unwrap();
        assert!(!page.contains("{{"));
        assert!(page.contains("Buoy Unavailable"));
        assert!(page.contains("swell-card-wrapper"));
        assert!(page.contains("meridian-cam"));
        assert!(page.contains("createIsramarChart('isramarHaifaChart'"));
        assert!(page.contains("videojs('meridian-cam')"));
        // Scripts sit inside the body.
        assert!(page.ends_with("</body></html>"));

        // Same inputs, same bytes.
        let again = render_page(template, &site, &data, test_now()).unwrap();
        assert_eq!(page, again);
    }
}
