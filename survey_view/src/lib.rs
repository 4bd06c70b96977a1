mod config;
pub mod builder;
pub mod detail;
pub mod filter;
pub mod manual;
pub mod map;
pub mod metrics;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use log::{debug, info};
use serde::Serialize;

pub use crate::builder::RawTable;
pub use crate::config::*;
use crate::detail::record_keys;
use crate::filter::{date_bounds, surveyor_options, LocationOptions};
use crate::map::MapLayer;
use crate::metrics::{DateCount, Metrics, SurveyorCount, VerificationCount};

/// The extra columns holding the resolved coordinates.
pub const COL_LAT: &str = "lat";
pub const COL_LON: &str = "lon";

// Formats seen in the exports of the data collection platforms, tried in order.
const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%b %d, %Y %I:%M:%S %p",
    "%b %d, %Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

static EMPTY_CELL: RawCell = RawCell::Empty;

fn cell_at(row: &[RawCell], idx: Option<usize>) -> &RawCell {
    idx.and_then(|i| row.get(i)).unwrap_or(&EMPTY_CELL)
}

/// Converts a date stored as an Excel serial number (days since 1899-12-30).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 9999-12-31 is the last date that Excel accepts.
    if !serial.is_finite() || !(0.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// Parses a submission timestamp. Anything that cannot be understood is absent.
pub fn parse_timestamp(cell: &RawCell) -> Option<NaiveDateTime> {
    match cell {
        RawCell::DateTime(dt) => Some(*dt),
        RawCell::Number(f) => excel_serial_to_datetime(*f),
        RawCell::Text(s) => parse_timestamp_str(s.trim()),
        RawCell::Bool(_) | RawCell::Empty => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Reads a number out of a cell. Booleans are not numbers here.
pub fn parse_number(cell: &RawCell) -> Option<f64> {
    let x = match cell {
        RawCell::Number(f) => Some(*f),
        RawCell::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    x.filter(|f| f.is_finite())
}

/// The verification flag: an integer, 0 when it cannot be read.
pub fn parse_flag(cell: &RawCell) -> i64 {
    match cell {
        RawCell::Bool(b) => *b as i64,
        _ => parse_number(cell).map(|f| f.trunc() as i64).unwrap_or(0),
    }
}

/// Picks the coordinates of a row.
///
/// The primary pair is used when both of its values are present, then the
/// fallback pair under the same condition. Values of the two pairs are never mixed.
pub fn resolve_coordinates(
    primary: (&RawCell, &RawCell),
    fallback: (&RawCell, &RawCell),
) -> Option<GeoPoint> {
    for (lat_c, lon_c) in [primary, fallback] {
        if let (Some(lat), Some(lon)) = (parse_number(lat_c), parse_number(lon_c)) {
            return Some(GeoPoint { lat, lon });
        }
    }
    None
}

/// The text shown for a cell, or None if the cell is missing.
pub fn display_cell(cell: &RawCell) -> Option<String> {
    if cell.is_empty() {
        return None;
    }
    let s = match cell {
        RawCell::Text(s) => s.clone(),
        RawCell::Number(f) => format_number(*f),
        RawCell::Bool(b) => b.to_string(),
        RawCell::DateTime(dt) => format_timestamp(dt),
        RawCell::Empty => return None,
    };
    Some(s)
}

pub fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn or_not_provided(s: Option<String>) -> String {
    s.unwrap_or_else(|| NOT_PROVIDED.to_string())
}

/// Turns the aligned raw table into typed submissions.
///
/// The typed columns (timestamp, coordinates, verification flag, duration) are
/// coerced first. All the other columns get the `NOT_PROVIDED` sentinel when missing.
pub fn normalize(table: &RawTable) -> Dataset {
    let idx = |name: &str| table.column_index(name);
    let key_idx = idx(COL_KEY);
    let review_idx = idx(COL_REVIEW_STATUS);
    let date_idx = idx(COL_SUBMISSION_DATE);
    let plat_idx = idx(COL_PRIMARY_LAT);
    let plon_idx = idx(COL_PRIMARY_LON);
    let flat_idx = idx(COL_FALLBACK_LAT);
    let flon_idx = idx(COL_FALLBACK_LON);
    let sid_idx = idx(COL_SURVEYOR_ID);
    let sname_idx = idx(COL_SURVEYOR_NAME);
    let province_idx = idx(COL_PROVINCE);
    let district_idx = idx(COL_DISTRICT);
    let village_idx = idx(COL_VILLAGE);
    let verif_idx = idx(COL_EXTERNAL_VERIFICATION);
    let duration_idx = idx(COL_DURATION);
    let beneficiary_idx = idx(COL_BENEFICIARY_NAME);
    let comments_idx = idx(COL_SURVEYOR_COMMENTS);
    let elder_name_idx = idx(COL_ELDER_NAME);
    let elder_rel_idx = idx(COL_ELDER_RELATIONSHIP);
    let elder_phone_idx = idx(COL_ELDER_PHONE);
    let elder_comments_idx = idx(COL_ELDER_COMMENTS);
    let media_idxs: Vec<(&str, Option<usize>)> =
        MEDIA_COLUMNS.iter().map(|c| (*c, idx(*c))).collect();

    let mut submissions: Vec<Submission> = Vec::with_capacity(table.rows.len());
    for row in table.rows.iter() {
        let cell = |i: Option<usize>| cell_at(row, i);
        let text = |i: Option<usize>| or_not_provided(display_cell(cell(i)));

        let submitted_at = parse_timestamp(cell(date_idx));
        let location = resolve_coordinates(
            (cell(plat_idx), cell(plon_idx)),
            (cell(flat_idx), cell(flon_idx)),
        );
        let external_verification = parse_flag(cell(verif_idx));
        let duration_secs = parse_number(cell(duration_idx));

        let mut fields: Vec<(String, String)> = Vec::with_capacity(table.columns.len() + 2);
        for (col, c) in table.columns.iter().zip(row.iter()) {
            let v = match col.as_str() {
                COL_SUBMISSION_DATE => or_not_provided(submitted_at.as_ref().map(format_timestamp)),
                COL_EXTERNAL_VERIFICATION => external_verification.to_string(),
                COL_DURATION => or_not_provided(duration_secs.map(format_number)),
                _ => or_not_provided(display_cell(c)),
            };
            fields.push((col.clone(), v));
        }
        fields.push((
            COL_LAT.to_string(),
            or_not_provided(location.map(|p| p.lat.to_string())),
        ));
        fields.push((
            COL_LON.to_string(),
            or_not_provided(location.map(|p| p.lon.to_string())),
        ));

        let media: Vec<MediaLink> = media_idxs
            .iter()
            .filter_map(|(name, i)| {
                display_cell(cell(*i)).map(|url| MediaLink {
                    column: name.to_string(),
                    url: url.trim().to_string(),
                })
            })
            .collect();

        submissions.push(Submission {
            key: text(key_idx),
            review_status: text(review_idx),
            submitted_at,
            surveyor_id: text(sid_idx),
            surveyor_name: text(sname_idx),
            province: text(province_idx),
            district: text(district_idx),
            village: text(village_idx),
            location,
            duration_secs,
            external_verification,
            beneficiary_name: text(beneficiary_idx),
            surveyor_comments: text(comments_idx),
            elder: ElderVerification {
                name: text(elder_name_idx),
                relationship: text(elder_rel_idx),
                phone: text(elder_phone_idx),
                comments: text(elder_comments_idx),
            },
            media,
            fields,
        });
    }

    let has_coordinates = GPS_COLUMNS.iter().any(|c| table.is_observed(c));
    let mut columns = table.columns.clone();
    columns.push(COL_LAT.to_string());
    columns.push(COL_LON.to_string());

    info!(
        "normalize: {} submissions from {} sources, {} located",
        submissions.len(),
        table.sources.len(),
        submissions.iter().filter(|s| s.location.is_some()).count()
    );

    Dataset {
        submissions,
        columns,
        has_coordinates,
        sources: table.sources.clone(),
    }
}

/// The submissions left after filtering, with the dataset they come from.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    pub dataset: &'a Dataset,
    pub filters: Filters,
    pub rows: Vec<&'a Submission>,
}

impl<'a> FilteredView<'a> {
    pub fn new(dataset: &'a Dataset, filters: &Filters) -> FilteredView<'a> {
        let rows = filter::apply(&dataset.submissions, filters);
        debug!(
            "FilteredView: {} of {} submissions kept with {:?}",
            rows.len(),
            dataset.submissions.len(),
            filters
        );
        FilteredView {
            dataset,
            filters: filters.clone(),
            rows,
        }
    }
}

/// Everything that is displayed for one state of the filters.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Dashboard {
    pub title: String,
    pub filters: Filters,
    pub metrics: Metrics,
    pub by_surveyor: Vec<SurveyorCount>,
    pub by_date: Vec<DateCount>,
    pub verification: [VerificationCount; 2],
    pub surveyors: Vec<String>,
    pub date_bounds: Option<(NaiveDate, NaiveDate)>,
    pub locations: LocationOptions,
    pub map_modes: Vec<MapMode>,
    pub map: Option<MapLayer>,
    pub record_keys: Vec<String>,
    /// Messages for the parts of the page that could not be shown.
    pub notices: Vec<String>,
}

/// Computes the dashboard for a filtered view.
///
/// Arguments:
/// * `view` the filtered submissions
/// * `requested_mode` the map presentation. The route is only drawn when a
/// single surveyor is selected; otherwise the clustered view is used.
pub fn render(view: &FilteredView, requested_mode: MapMode) -> Result<Dashboard, ViewError> {
    if view.dataset.is_empty() {
        return Err(ViewError::EmptyDataset);
    }
    let rows = view.rows.as_slice();
    let mut notices: Vec<String> = Vec::new();

    let by_date = metrics::submissions_by_date(rows);
    if by_date.is_empty() {
        notices.push("No valid SubmissionDate values to plot timeline.".to_string());
    }

    let mode = map::resolve_mode(requested_mode, &view.filters.surveyor);
    if mode != requested_mode {
        notices.push(
            "Select a specific surveyor to show their route based on submission date."
                .to_string(),
        );
    }
    let map = match map::build_layer(view, mode) {
        Ok(layer) if layer.markers.is_empty() => {
            notices.push("No GPS points available for the current filters.".to_string());
            None
        }
        Ok(layer) => Some(layer),
        Err(e) => {
            notices.push(format!("Map skipped: {}.", e));
            None
        }
    };

    let title = match &view.filters.surveyor {
        Selection::All => "Surveyor Submissions Dashboard".to_string(),
        Selection::Only(name) => format!("Surveyor Profile: {}", name),
    };

    Ok(Dashboard {
        title,
        filters: view.filters.clone(),
        metrics: Metrics::compute(rows),
        by_surveyor: metrics::submissions_by_surveyor(rows),
        by_date,
        verification: metrics::verification_breakdown(rows),
        surveyors: surveyor_options(view.dataset),
        date_bounds: date_bounds(view.dataset),
        locations: LocationOptions::cascade(&view.dataset.submissions, &view.filters),
        map_modes: MapMode::available(&view.filters.surveyor),
        map,
        record_keys: record_keys(rows),
        notices,
    })
}

#[cfg(test)]
mod test_utils {
    use crate::builder::TableBuilder;
    use crate::*;

    /// A small table in the format of the form exports.
    pub fn sample_table() -> RawTable {
        let header: Vec<String> = [
            COL_KEY,
            COL_SUBMISSION_DATE,
            COL_SURVEYOR_NAME,
            COL_PROVINCE,
            COL_DISTRICT,
            COL_VILLAGE,
            COL_PRIMARY_LAT,
            COL_PRIMARY_LON,
            COL_FALLBACK_LAT,
            COL_FALLBACK_LON,
            COL_EXTERNAL_VERIFICATION,
            COL_DURATION,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let t = |s: &str| RawCell::Text(s.to_string());
        let n = RawCell::Number;
        let e = RawCell::Empty;
        let rows = vec![
            vec![
                t("uuid:1"),
                t("2024-03-02 10:00:00"),
                t("Amina"),
                t("North"),
                t("Hill"),
                t("Ba"),
                n(-1.5),
                n(30.1),
                e.clone(),
                e.clone(),
                n(1.0),
                n(600.0),
            ],
            vec![
                t("uuid:2"),
                t("2024-03-01 09:00:00"),
                t("Amina"),
                t("North"),
                t("Lake"),
                t("Ca"),
                e.clone(),
                e.clone(),
                n(-1.6),
                n(30.2),
                n(0.0),
                n(90.0),
            ],
            vec![
                t("uuid:3"),
                t("not a date"),
                t("Joseph"),
                t("South"),
                t("Plain"),
                t("Da"),
                e.clone(),
                e.clone(),
                e.clone(),
                e.clone(),
                t("yes"),
                e.clone(),
            ],
            vec![
                t("uuid:4"),
                t("2024-03-05 16:30:00"),
                t("Joseph"),
                t("South"),
                t("Plain"),
                e.clone(),
                n(-2.0),
                n(29.0),
                n(-3.0),
                n(28.0),
                n(1.0),
                n(150.0),
            ],
        ];
        let mut b = TableBuilder::new();
        b.add_source("sample.xlsx", &header, rows);
        b.build()
    }

    pub fn sample_dataset() -> Dataset {
        normalize(&sample_table())
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn t(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    #[test]
    fn primary_pair_wins() {
        let p = resolve_coordinates(
            (&RawCell::Number(1.0), &RawCell::Number(2.0)),
            (&RawCell::Number(3.0), &RawCell::Number(4.0)),
        );
        assert_eq!(p, Some(GeoPoint { lat: 1.0, lon: 2.0 }));
    }

    #[test]
    fn partial_primary_uses_fallback() {
        let p = resolve_coordinates(
            (&RawCell::Number(1.0), &RawCell::Empty),
            (&t("3.5"), &t(" 4.25 ")),
        );
        assert_eq!(p, Some(GeoPoint { lat: 3.5, lon: 4.25 }));
    }

    #[test]
    fn no_complete_pair_is_absent() {
        let p = resolve_coordinates(
            (&RawCell::Number(1.0), &t("n/a")),
            (&RawCell::Empty, &RawCell::Number(4.0)),
        );
        assert_eq!(p, None);
    }

    #[test]
    fn timestamps() {
        assert_eq!(
            parse_timestamp(&t("2024-03-02 10:00:00")),
            NaiveDate::from_ymd_opt(2024, 3, 2).and_then(|d| d.and_hms_opt(10, 0, 0))
        );
        assert_eq!(
            parse_timestamp(&t("Mar 2, 2024 10:15:30 AM")),
            NaiveDate::from_ymd_opt(2024, 3, 2).and_then(|d| d.and_hms_opt(10, 15, 30))
        );
        assert_eq!(
            parse_timestamp(&t("2024-03-02T10:00:00.250+02:00")).map(|d| d.date()),
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
        assert_eq!(
            parse_timestamp(&t("2024-03-02")),
            NaiveDate::from_ymd_opt(2024, 3, 2).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        // 45353.5 is 2024-03-02 at noon.
        assert_eq!(
            parse_timestamp(&RawCell::Number(45353.5)),
            NaiveDate::from_ymd_opt(2024, 3, 2).and_then(|d| d.and_hms_opt(12, 0, 0))
        );
        assert_eq!(parse_timestamp(&t("yesterday")), None);
        assert_eq!(parse_timestamp(&RawCell::Bool(true)), None);
        assert_eq!(parse_timestamp(&RawCell::Empty), None);
    }

    #[test]
    fn verification_flag_coercion() {
        assert_eq!(parse_flag(&RawCell::Number(1.0)), 1);
        assert_eq!(parse_flag(&t("1")), 1);
        assert_eq!(parse_flag(&RawCell::Bool(true)), 1);
        assert_eq!(parse_flag(&t("verified")), 0);
        assert_eq!(parse_flag(&RawCell::Empty), 0);
        assert_eq!(parse_flag(&RawCell::Number(f64::NAN)), 0);
    }

    #[test]
    fn normalize_sample() {
        init();
        let ds = sample_dataset();
        assert_eq!(ds.submissions.len(), 4);
        assert!(ds.has_coordinates);
        for c in EXPECTED_COLUMNS.iter() {
            assert!(ds.columns.iter().any(|x| x == c));
        }

        let s1 = &ds.submissions[0];
        assert_eq!(s1.location, Some(GeoPoint { lat: -1.5, lon: 30.1 }));
        assert_eq!(s1.external_verification, 1);
        assert_eq!(s1.duration_secs, Some(600.0));

        let s2 = &ds.submissions[1];
        assert_eq!(s2.location, Some(GeoPoint { lat: -1.6, lon: 30.2 }));

        let s3 = &ds.submissions[2];
        assert_eq!(s3.submitted_at, None);
        assert_eq!(s3.location, None);
        assert_eq!(s3.external_verification, 0);
        assert_eq!(s3.duration_secs, None);
        // Display columns get the sentinel, typed ones stay absent.
        assert_eq!(s3.review_status, NOT_PROVIDED);
        assert_eq!(s3.field(COL_PRIMARY_LAT), Some(NOT_PROVIDED));
        assert_eq!(s3.field(COL_EXTERNAL_VERIFICATION), Some("0"));

        let s4 = &ds.submissions[3];
        assert_eq!(s4.location, Some(GeoPoint { lat: -2.0, lon: 29.0 }));
        assert_eq!(s4.village, NOT_PROVIDED);
        assert_eq!(s4.field(COL_LAT), Some("-2"));
    }

    #[test]
    fn missing_gps_columns() {
        let mut b = builder::TableBuilder::new();
        b.add_source(
            "nogps.xlsx",
            &[COL_KEY.to_string()],
            vec![vec![t("uuid:9")]],
        );
        let ds = normalize(&b.build());
        assert!(!ds.has_coordinates);
        assert_eq!(ds.submissions[0].location, None);
    }

    #[test]
    fn render_all_surveyors() {
        init();
        let ds = sample_dataset();
        let view = FilteredView::new(&ds, &Filters::NONE);
        let dash = render(&view, MapMode::Route).unwrap();
        assert_eq!(dash.title, "Surveyor Submissions Dashboard");
        assert_eq!(dash.metrics.total, 4);
        assert!(!dash.map_modes.contains(&MapMode::Route));
        let map = dash.map.unwrap();
        // Route is not available across surveyors.
        assert_eq!(map.mode, MapMode::Cluster);
        assert_eq!(map.markers.len(), 3);
        assert!(dash.notices.iter().any(|n| n.contains("specific surveyor")));
        assert_eq!(dash.record_keys.len(), 4);
    }

    #[test]
    fn render_single_surveyor_route() {
        let ds = sample_dataset();
        let filters = Filters {
            surveyor: Selection::Only("Amina".to_string()),
            ..Filters::default()
        };
        let view = FilteredView::new(&ds, &filters);
        let dash = render(&view, MapMode::Route).unwrap();
        assert_eq!(dash.title, "Surveyor Profile: Amina");
        let map = dash.map.unwrap();
        assert_eq!(map.mode, MapMode::Route);
        // Ordered by timestamp: uuid:2 happened first.
        assert_eq!(map.markers[0].key, "uuid:2");
        assert_eq!(map.markers[0].order, 1);
        assert_eq!(map.route.len(), 2);
        assert!(dash.notices.is_empty());
    }

    #[test]
    fn render_empty_dataset() {
        let ds = normalize(&builder::TableBuilder::new().build());
        let view = FilteredView::new(&ds, &Filters::NONE);
        assert_eq!(
            render(&view, MapMode::Cluster),
            Err(ViewError::EmptyDataset)
        );
    }

    #[test]
    fn render_without_gps_columns() {
        let mut b = builder::TableBuilder::new();
        b.add_source(
            "nogps.xlsx",
            &[COL_KEY.to_string(), COL_SURVEYOR_NAME.to_string()],
            vec![vec![t("uuid:9"), t("Amina")]],
        );
        let ds = normalize(&b.build());
        let view = FilteredView::new(&ds, &Filters::NONE);
        let dash = render(&view, MapMode::Cluster).unwrap();
        assert!(dash.map.is_none());
        assert!(dash.notices.iter().any(|n| n.contains("GPS")));
        assert_eq!(dash.metrics.total, 1);
    }
}
