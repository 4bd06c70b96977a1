use serde_json::json;
use serde_json::Value as JSValue;

use survey_view::detail::{MediaItem, MediaKind, RecordDetail};
use survey_view::map::{MapLayer, Marker};
use survey_view::{Dashboard, FilteredView, MapMode, ALL_SURVEYORS};

use crate::dash::io_notes::NoteRecord;

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const CLUSTER_JS: &str =
    "https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js";
const CLUSTER_CSS: &str = "https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css";
const TILES: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

const STYLE: &str = "
body { font-family: sans-serif; margin: 1.5em; color: #222; }
.tiles { display: flex; gap: 1em; flex-wrap: wrap; }
.tile { border: 1px solid #ddd; border-radius: 6px; padding: 0.8em 1.2em; min-width: 10em; }
.tile .value { font-size: 1.8em; font-weight: bold; }
.notice { background: #fff4e0; border-left: 4px solid #f0a020; padding: 0.5em 1em; margin: 0.5em 0; }
.chart { width: 100%; max-width: 60em; height: 24em; }
#map { width: 100%; height: 32em; }
table { border-collapse: collapse; font-size: 0.85em; }
td, th { border: 1px solid #ddd; padding: 0.2em 0.5em; }
.media img { max-width: 30em; }
.seq { background: white; border: 2px solid; border-radius: 50%; text-align: center; font-size: 0.8em; }
";

pub fn escape_html(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => res.push_str("&amp;"),
            '<' => res.push_str("&lt;"),
            '>' => res.push_str("&gt;"),
            '"' => res.push_str("&quot;"),
            '\'' => res.push_str("&#39;"),
            _ => res.push(c),
        }
    }
    res
}

/// Serializes a value to be embedded in a script tag.
fn script_json(js: &JSValue) -> String {
    js.to_string().replace("</", "<\\/")
}

pub fn surveyor_bar_spec(dash: &Dashboard) -> JSValue {
    let x: Vec<&str> = dash.by_surveyor.iter().map(|c| c.surveyor.as_str()).collect();
    let y: Vec<usize> = dash.by_surveyor.iter().map(|c| c.count).collect();
    json!({
        "data": [{"type": "bar", "x": x, "y": y, "text": y, "textposition": "auto"}],
        "layout": {
            "title": "Submissions per Surveyor",
            "xaxis": {"title": "Surveyor", "tickangle": -45},
            "yaxis": {"title": "Number of Submissions"},
        }
    })
}

pub fn verification_pie_spec(dash: &Dashboard) -> JSValue {
    let labels: Vec<&str> = dash.verification.iter().map(|c| c.label.as_str()).collect();
    let values: Vec<usize> = dash.verification.iter().map(|c| c.count).collect();
    json!({
        "data": [{"type": "pie", "labels": labels, "values": values}],
        "layout": {"title": "External Verification Status"}
    })
}

/// The verification split of one surveyor, as horizontal bars.
pub fn profile_bar_spec(dash: &Dashboard) -> JSValue {
    let labels: Vec<&str> = dash.verification.iter().map(|c| c.label.as_str()).collect();
    let values: Vec<usize> = dash.verification.iter().map(|c| c.count).collect();
    json!({
        "data": [{
            "type": "bar",
            "orientation": "h",
            "x": values,
            "y": labels,
            "text": values,
            "textposition": "auto",
            "marker": {"color": ["green", "red"]},
        }],
        "layout": {
            "title": "Verification Breakdown",
            "xaxis": {"title": "Number of Submissions"},
        }
    })
}

pub fn timeline_spec(dash: &Dashboard) -> JSValue {
    let x: Vec<String> = dash.by_date.iter().map(|c| c.date.to_string()).collect();
    let y: Vec<usize> = dash.by_date.iter().map(|c| c.count).collect();
    json!({
        "data": [{"type": "scatter", "mode": "lines+markers", "x": x, "y": y}],
        "layout": {
            "title": "Submissions Over Time",
            "xaxis": {"title": "Date"},
            "yaxis": {"title": "Submissions"},
        }
    })
}

fn popup_html(m: &Marker) -> String {
    let p = &m.popup;
    format!(
        "<b>KEY:</b> {}<br><b>SubmissionDate:</b> {}<br><b>Surveyor:</b> {}<br>\
         <b>Province:</b> {}<br><b>District:</b> {}<br><b>Village:</b> {}<br>\
         <b>Duration (min):</b> {}",
        escape_html(&p.key),
        escape_html(&p.submitted_at),
        escape_html(&p.surveyor),
        escape_html(&p.province),
        escape_html(&p.district),
        escape_html(&p.village),
        escape_html(&p.duration_min),
    )
}

/// The data read by the map script.
pub fn map_spec(layer: &MapLayer) -> JSValue {
    let markers: Vec<JSValue> = layer
        .markers
        .iter()
        .map(|m| {
            json!({
                "order": m.order,
                "lat": m.position.lat,
                "lon": m.position.lon,
                "color": m.color,
                "popup": popup_html(m),
            })
        })
        .collect();
    let route: Vec<[f64; 2]> = layer.route.iter().map(|p| [p.lat, p.lon]).collect();
    json!({
        "mode": layer.mode.name(),
        "center": [layer.center.lat, layer.center.lon],
        "zoom": layer.zoom,
        "markers": markers,
        "route": route,
    })
}

const MAP_SCRIPT: &str = "
(function () {
  var spec = JSON.parse(document.getElementById('map-data').textContent);
  var map = L.map('map').setView(spec.center, spec.zoom);
  L.tileLayer('TILES', {attribution: '&copy; OpenStreetMap contributors'}).addTo(map);
  var group = spec.mode === 'cluster' ? L.markerClusterGroup() : L.featureGroup();
  spec.markers.forEach(function (m) {
    var marker;
    if (spec.mode === 'cluster') {
      marker = L.circleMarker([m.lat, m.lon], {radius: 7, color: m.color, fillColor: m.color, fillOpacity: 0.8});
    } else {
      marker = L.marker([m.lat, m.lon], {icon: L.divIcon({
        className: 'seq', html: '<div style=\"color:' + m.color + '\">' + m.order + '</div>', iconSize: [24, 24]})});
    }
    marker.bindPopup(m.popup);
    group.addLayer(marker);
  });
  group.addTo(map);
  if (spec.route.length > 1) {
    L.polyline(spec.route, {color: 'blue', weight: 3}).addTo(map);
  }
})();
";

fn chart(page: &mut String, id: &str, spec: &JSValue) {
    page.push_str(&format!("<div id=\"{}\" class=\"chart\"></div>\n", id));
    page.push_str(&format!(
        "<script>(function () {{ var s = {}; Plotly.newPlot('{}', s.data, s.layout); }})();</script>\n",
        script_json(spec),
        id
    ));
}

fn tile(page: &mut String, label: &str, value: &str) {
    page.push_str(&format!(
        "<div class=\"tile\"><div>{}</div><div class=\"value\">{}</div></div>\n",
        escape_html(label),
        escape_html(value)
    ));
}

fn media_html(m: &MediaItem) -> String {
    let url = escape_html(&m.url);
    let link = format!(
        "<a href=\"{}\" target=\"_blank\">{}</a>",
        url,
        escape_html(&m.column)
    );
    match m.kind {
        MediaKind::Image => format!(
            "<div class=\"media\">{}<br><img src=\"{}\" alt=\"{}\"></div>\n",
            link,
            url,
            escape_html(&m.column)
        ),
        MediaKind::Audio => format!(
            "<div class=\"media\">{}<br><audio controls src=\"{}\"></audio></div>\n",
            link, url
        ),
        MediaKind::Other => format!("<div class=\"media\">{}</div>\n", link),
    }
}

/// The details of one submission: summary, elder verification, attachments and every field.
pub fn record_html(detail: &RecordDetail) -> String {
    let mut res = format!(
        "<div class=\"record\">\n<h3>Record {}</h3>\n",
        escape_html(&detail.key)
    );
    res.push_str(&format!(
        "<p><b>Surveyor:</b> {}<br><b>Beneficiary:</b> {}<br><b>Duration (min):</b> {}<br>\
         <b>Surveyor comments:</b> {}</p>\n",
        escape_html(&detail.surveyor),
        escape_html(&detail.beneficiary_name),
        escape_html(&detail.duration_min),
        escape_html(&detail.surveyor_comments),
    ));
    if let Some(elder) = &detail.elder {
        res.push_str(&format!(
            "<h4>Community Elder Verification</h4>\n<p><b>Name:</b> {}<br>\
             <b>Relationship:</b> {}<br><b>Phone:</b> {}<br><b>Comments:</b> {}</p>\n",
            escape_html(&elder.name),
            escape_html(&elder.relationship),
            escape_html(&elder.phone),
            escape_html(&elder.comments),
        ));
    }
    for m in detail.media.iter() {
        res.push_str(&media_html(m));
    }
    res.push_str("<table>\n");
    for (k, v) in detail.fields.iter() {
        res.push_str(&format!(
            "<tr><th>{}</th><td>{}</td></tr>\n",
            escape_html(k),
            escape_html(v)
        ));
    }
    res.push_str("</table>\n</div>\n");
    res
}

/// Writes the dashboard as a standalone HTML page.
///
/// The notes are only shown on a surveyor profile. The records, if any, are
/// appended after the map.
pub fn render_page(
    dash: &Dashboard,
    view: &FilteredView,
    notes: &[NoteRecord],
    records: &[RecordDetail],
    title: Option<&str>,
) -> String {
    let single = dash.filters.surveyor.as_option();
    let mut page = String::new();
    let page_title = title.unwrap_or(dash.title.as_str());

    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str(&format!("<title>{}</title>\n", escape_html(page_title)));
    page.push_str(&format!("<script src=\"{}\"></script>\n", PLOTLY_JS));
    if dash.map.is_some() {
        page.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\">\n", LEAFLET_CSS));
        page.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\">\n", CLUSTER_CSS));
        page.push_str(&format!("<script src=\"{}\"></script>\n", LEAFLET_JS));
        page.push_str(&format!("<script src=\"{}\"></script>\n", CLUSTER_JS));
    }
    page.push_str(&format!("<style>{}</style>\n</head>\n<body>\n", STYLE));
    if let Some(t) = title {
        page.push_str(&format!("<p>{}</p>\n", escape_html(t)));
    }
    page.push_str(&format!("<h1>{}</h1>\n", escape_html(&dash.title)));

    // Filters
    let range = match dash.filters.date_range {
        Some((s, e)) => format!("{} to {}", s, e),
        None => "all dates".to_string(),
    };
    page.push_str(&format!(
        "<p>Surveyor: {} | Dates: {} | Province: {} | District: {} | Village: {}</p>\n",
        escape_html(single.unwrap_or(ALL_SURVEYORS)),
        range,
        escape_html(dash.filters.province.as_option().unwrap_or("all")),
        escape_html(dash.filters.district.as_option().unwrap_or("all")),
        escape_html(dash.filters.village.as_option().unwrap_or("all")),
    ));

    // Metrics
    page.push_str("<div class=\"tiles\">\n");
    tile(&mut page, "Total Submissions", &dash.metrics.total.to_string());
    tile(
        &mut page,
        "Externally Verified",
        &format!(
            "{} ({}%)",
            dash.metrics.verified, dash.metrics.percent_verified
        ),
    );
    tile(
        &mut page,
        "Unique Provinces",
        &dash.metrics.unique_provinces.to_string(),
    );
    tile(
        &mut page,
        "Unique Villages",
        &dash.metrics.unique_villages.to_string(),
    );
    page.push_str("</div>\n");

    for n in dash.notices.iter() {
        page.push_str(&format!("<div class=\"notice\">{}</div>\n", escape_html(n)));
    }

    // Charts
    if single.is_some() {
        chart(&mut page, "chart-profile", &profile_bar_spec(dash));
    } else {
        chart(&mut page, "chart-surveyors", &surveyor_bar_spec(dash));
    }
    chart(&mut page, "chart-verification", &verification_pie_spec(dash));
    if !dash.by_date.is_empty() {
        chart(&mut page, "chart-timeline", &timeline_spec(dash));
    }

    // Map
    if let Some(layer) = &dash.map {
        let mode_title = match layer.mode {
            MapMode::Route => "Surveyor Route",
            MapMode::Sequence => "Submission Sequence",
            MapMode::Cluster => "Submission Locations",
        };
        page.push_str(&format!("<h2>{}</h2>\n<div id=\"map\"></div>\n", mode_title));
        page.push_str(&format!(
            "<script type=\"application/json\" id=\"map-data\">{}</script>\n",
            script_json(&map_spec(layer))
        ));
        page.push_str(&format!(
            "<script>{}</script>\n",
            MAP_SCRIPT.replace("TILES", TILES)
        ));
    }

    if !records.is_empty() {
        page.push_str("<h2>Record Details</h2>\n");
        for r in records.iter() {
            page.push_str(&record_html(r));
        }
    }

    // Profile: raw data and notes
    if let Some(name) = single {
        page.push_str(&format!(
            "<h2>Raw Data for {}</h2>\n<table>\n<tr>",
            escape_html(name)
        ));
        for c in view.dataset.columns.iter() {
            page.push_str(&format!("<th>{}</th>", escape_html(c)));
        }
        page.push_str("</tr>\n");
        for s in view.rows.iter() {
            page.push_str("<tr>");
            for (_, v) in s.fields.iter() {
                page.push_str(&format!("<td>{}</td>", escape_html(v)));
            }
            page.push_str("</tr>\n");
        }
        page.push_str("</table>\n");

        page.push_str(&format!("<h2>Notes on {}</h2>\n", escape_html(name)));
        if notes.is_empty() {
            page.push_str("<p>No notes yet.</p>\n");
        } else {
            page.push_str("<ul>\n");
            for n in notes.iter() {
                page.push_str(&format!(
                    "<li><i>{}</i>: {}</li>\n",
                    escape_html(&n.timestamp),
                    escape_html(&n.notes)
                ));
            }
            page.push_str("</ul>\n");
        }
    }

    page.push_str("</body>\n</html>\n");
    page
}
