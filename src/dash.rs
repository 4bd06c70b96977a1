use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use serde_json::Value as JSValue;
use survey_view::detail::{lookup, RecordDetail};
use survey_view::filter::{date_bounds, LocationOptions};
use survey_view::*;
use text_diff::print_diff;

use crate::args::{Args, Command, FilterArgs};
use crate::dash::cache::IngestCache;
use crate::dash::io_xlsx::Loaded;
use crate::dash::config_reader::*;

pub mod cache;
pub mod config_reader;
mod io_common;
pub mod io_notes;
pub mod io_xlsx;
pub mod render_html;
pub mod session;

#[derive(Debug, Snafu)]
pub enum DashError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The file {path} does not have any worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Error listing directory {path}"))]
    ReadingDirectory {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening notes file {path}"))]
    OpeningNotes {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing to notes file {path}"))]
    WritingNotes {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading notes file {path}"))]
    ReadingNotes { source: csv::Error, path: String },
    #[snafu(display("Error formatting CSV"))]
    WritingCsv { source: csv::Error },
    #[snafu(display("Error reading the standard input"))]
    ReadingInput { source: std::io::Error },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Cannot understand the date {value:?} (expected YYYY-MM-DD)"))]
    InvalidDate {
        source: chrono::ParseError,
        value: String,
    },
    #[snafu(display("Unknown map mode {value:?} (expected cluster, sequence or route)"))]
    UnknownMapMode { value: String },
    #[snafu(display("Unknown source {value:?} (expected file, folder or glob)"))]
    UnknownSource { value: String },
    #[snafu(display("{source}"))]
    View { source: ViewError },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashResult<T> = Result<T, DashError>;

pub type BDashResult<T> = Result<T, Box<DashError>>;

/// The default name of the workbook read in folder mode.
pub const DEFAULT_DATA_FILE: &str = "EFSP_Dashboard_Data.xlsx";

pub const DEFAULT_PAGE_NAME: &str = "dashboard.html";

/// How the input path is turned into a list of workbooks.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum SourceKind {
    /// A single workbook.
    File,
    /// A workbook with a known name inside a directory.
    Folder { file_name: String },
    /// All the workbooks of a directory.
    Glob,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct DataSource {
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl DataSource {
    pub fn display(&self) -> String {
        match &self.kind {
            SourceKind::Folder { file_name } => self.path.join(file_name).display().to_string(),
            _ => self.path.display().to_string(),
        }
    }
}

pub fn parse_map_mode(s: &str) -> DashResult<MapMode> {
    match s.trim().to_lowercase().as_str() {
        "cluster" | "default" => Ok(MapMode::Cluster),
        "sequence" | "numbered" => Ok(MapMode::Sequence),
        "route" => Ok(MapMode::Route),
        _ => UnknownMapModeSnafu { value: s }.fail(),
    }
}

fn parse_day(s: &str) -> DashResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").context(InvalidDateSnafu { value: s })
}

/// Builds the filters from the command line selections.
///
/// A missing end of the date range defaults to the first or last day found in the data.
pub fn build_filters(fa: &FilterArgs, dataset: &Dataset) -> DashResult<Filters> {
    let selection = |o: &Option<String>| o.as_deref().map(Selection::parse).unwrap_or_default();
    let from = fa.from.as_deref().map(parse_day).transpose()?;
    let to = fa.to.as_deref().map(parse_day).transpose()?;
    let date_range = match (from, to) {
        (None, None) => None,
        (f, t) => {
            let bounds = date_bounds(dataset);
            let start = f.or(bounds.map(|b| b.0)).unwrap_or(NaiveDate::MIN);
            let end = t.or(bounds.map(|b| b.1)).unwrap_or(NaiveDate::MAX);
            if start > end {
                warn!(
                    "build_filters: the date range {} - {} is empty, only undated submissions are kept",
                    start, end
                );
            }
            Some((start, end))
        }
    };
    Ok(Filters {
        surveyor: selection(&fa.surveyor),
        date_range,
        province: selection(&fa.province),
        district: selection(&fa.district),
        village: selection(&fa.village),
    })
}

pub fn build_summary_js(dash: &Dashboard) -> JSValue {
    let by_surveyor: Vec<JSValue> = dash
        .by_surveyor
        .iter()
        .map(|c| json!({"surveyor": c.surveyor, "count": c.count}))
        .collect();
    let by_date: Vec<JSValue> = dash
        .by_date
        .iter()
        .map(|c| json!({"date": c.date.to_string(), "count": c.count}))
        .collect();
    let verification: Vec<JSValue> = dash
        .verification
        .iter()
        .map(|c| json!({"verified": c.verified, "label": c.label, "count": c.count}))
        .collect();
    let date_range = dash
        .filters
        .date_range
        .map(|(s, e)| json!([s.to_string(), e.to_string()]));
    json!({
        "filters": {
            "surveyor": dash.filters.surveyor.as_option().unwrap_or(ALL_SURVEYORS),
            "dateRange": date_range,
            "province": dash.filters.province.as_option(),
            "district": dash.filters.district.as_option(),
            "village": dash.filters.village.as_option(),
        },
        "metrics": {
            "totalSubmissions": dash.metrics.total,
            "externallyVerified": dash.metrics.verified,
            "percentVerified": dash.metrics.percent_verified,
            "uniqueProvinces": dash.metrics.unique_provinces,
            "uniqueVillages": dash.metrics.unique_villages,
        },
        "bySurveyor": by_surveyor,
        "byDate": by_date,
        "verification": verification,
    })
}

/// Compares a computed summary with a reference file and prints the differences.
pub fn check_summary(computed: &JSValue, reference_path: &str) -> BDashResult<()> {
    let contents = fs::read_to_string(reference_path).context(OpeningJsonSnafu {
        path: reference_path,
    })?;
    let reference: JSValue = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("check_summary: reference: {:?}", reference);
    let pretty_ref = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    let pretty_computed = serde_json::to_string_pretty(computed).context(ParsingJsonSnafu {})?;
    if pretty_ref != pretty_computed {
        warn!("Found differences with the reference summary");
        print_diff(pretty_ref.as_str(), pretty_computed.as_str(), "\n");
        return Err(Box::new(DashError::ReferenceMismatch {}));
    }
    info!("check_summary: the summary matches {}", reference_path);
    Ok(())
}

/// Writes the dashboard as plain text.
pub fn write_dashboard_text(dash: &Dashboard, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "# {}", dash.title)?;
    writeln!(out)?;
    writeln!(out, "Total submissions: {}", dash.metrics.total)?;
    writeln!(
        out,
        "Externally verified: {} ({}%)",
        dash.metrics.verified, dash.metrics.percent_verified
    )?;
    writeln!(out, "Unique provinces: {}", dash.metrics.unique_provinces)?;
    writeln!(out, "Unique villages: {}", dash.metrics.unique_villages)?;
    writeln!(out)?;
    writeln!(out, "## Submissions per surveyor")?;
    for c in dash.by_surveyor.iter() {
        writeln!(out, "- {}: {}", c.surveyor, c.count)?;
    }
    writeln!(out)?;
    writeln!(out, "## Verification")?;
    for c in dash.verification.iter() {
        writeln!(out, "- {}: {}", c.label, c.count)?;
    }
    if !dash.by_date.is_empty() {
        writeln!(out)?;
        writeln!(out, "## Submissions over time")?;
        for c in dash.by_date.iter() {
            writeln!(out, "- {}: {}", c.date, c.count)?;
        }
    }
    if let Some(map) = &dash.map {
        writeln!(out)?;
        writeln!(
            out,
            "## Map ({}, {} points)",
            map.mode.name(),
            map.markers.len()
        )?;
    }
    for n in dash.notices.iter() {
        writeln!(out, "Note: {}", n)?;
    }
    Ok(())
}

pub fn write_options(dash: &Dashboard, out: &mut dyn Write) -> std::io::Result<()> {
    let LocationOptions {
        provinces,
        districts,
        villages,
    } = &dash.locations;
    writeln!(
        out,
        "surveyors: {}, {}",
        ALL_SURVEYORS,
        dash.surveyors.join(", ")
    )?;
    if let Some((s, e)) = dash.date_bounds {
        writeln!(out, "dates: {} to {}", s, e)?;
    }
    writeln!(out, "provinces: {}", provinces.join(", "))?;
    writeln!(out, "districts: {}", districts.join(", "))?;
    writeln!(out, "villages: {}", villages.join(", "))?;
    let modes: Vec<&str> = dash.map_modes.iter().map(|m| m.name()).collect();
    writeln!(out, "map modes: {}", modes.join(", "))?;
    Ok(())
}

pub fn write_record(detail: &RecordDetail, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "## Record {}", detail.key)?;
    writeln!(out, "Surveyor: {}", detail.surveyor)?;
    writeln!(out, "Beneficiary: {}", detail.beneficiary_name)?;
    writeln!(out, "Duration (min): {}", detail.duration_min)?;
    writeln!(out, "Surveyor comments: {}", detail.surveyor_comments)?;
    if let Some(elder) = &detail.elder {
        writeln!(out, "Community elder verification:")?;
        writeln!(out, "  Name: {}", elder.name)?;
        writeln!(out, "  Relationship: {}", elder.relationship)?;
        writeln!(out, "  Phone: {}", elder.phone)?;
        writeln!(out, "  Comments: {}", elder.comments)?;
    }
    for m in detail.media.iter() {
        writeln!(out, "{} ({:?}): {}", m.column, m.kind, m.url)?;
    }
    writeln!(out, "Fields:")?;
    for (k, v) in detail.fields.iter() {
        writeln!(out, "  {}: {}", k, v)?;
    }
    Ok(())
}

/// Writes the selected rows, with all their columns, in CSV format.
pub fn export_rows(dataset: &Dataset, rows: &[&Submission], out: &mut dyn Write) -> BDashResult<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(&dataset.columns).context(WritingCsvSnafu {})?;
    for s in rows.iter() {
        wtr.write_record(s.fields.iter().map(|(_, v)| v.as_str()))
            .context(WritingCsvSnafu {})?;
    }
    wtr.flush().context(WritingOutputSnafu { path: "export" })?;
    Ok(())
}

fn check_export_target(p: &str) -> DashResult<()> {
    if Path::new(p).is_dir() {
        whatever!("Cannot export to {}: it is a directory", p);
    }
    Ok(())
}

fn write_output(path: &Path, contents: &str) -> BDashResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context(WritingOutputSnafu {
                path: parent.display().to_string(),
            })?;
        }
    }
    fs::write(path, contents).context(WritingOutputSnafu {
        path: path.display().to_string(),
    })?;
    Ok(())
}

/// Renders the dashboard of the filtered data to an HTML file.
pub fn write_dashboard_page(
    settings: &Settings,
    dataset: &Dataset,
    filters: &Filters,
    mode: MapMode,
    key: Option<&str>,
    out_path: &Path,
) -> BDashResult<Dashboard> {
    let view = FilteredView::new(dataset, filters);
    let dash = render(&view, mode).context(ViewSnafu {})?;
    let notes = match filters.surveyor.as_option() {
        Some(s) => io_notes::read_notes(&settings.notes_file, Some(s))?,
        None => Vec::new(),
    };
    let records = match key {
        Some(k) => lookup(&view.rows, k).context(ViewSnafu {})?,
        None => Vec::new(),
    };
    let page = render_html::render_page(
        &dash,
        &view,
        &notes,
        &records,
        settings.title.as_deref(),
    );
    write_output(out_path, &page)?;
    Ok(dash)
}

/// Loads the data, and reports the empty state. Returns None when there is nothing to show.
pub fn load_non_empty(
    cache: &mut IngestCache,
    settings: &Settings,
    out: &mut dyn Write,
) -> BDashResult<Option<Arc<Loaded>>> {
    let loaded = cache.load(&settings.source)?;
    for (path, reason) in loaded.skipped.iter() {
        writeln!(out, "Could not read {}: {}", path, reason)
            .context(WritingOutputSnafu { path: "output" })?;
    }
    if loaded.dataset.is_empty() {
        writeln!(out, "No data found in `{}`.", settings.source.display())
            .context(WritingOutputSnafu { path: "output" })?;
        return Ok(None);
    }
    Ok(Some(loaded))
}

pub fn run(args: &Args) -> BDashResult<()> {
    let settings = resolve_settings(args)?;
    info!("run: settings: {:?}", settings);
    let mut cache = IngestCache::new();
    let stdout = std::io::stdout();

    match &args.command {
        Command::Note { surveyor, text } => {
            let outcome = io_notes::append_note_now(&settings.notes_file, surveyor, text)?;
            match outcome {
                io_notes::NoteOutcome::Appended => println!("Notes saved successfully!"),
                io_notes::NoteOutcome::Discarded => println!("Empty note, nothing saved."),
            }
        }
        Command::Session => {
            let stdin = std::io::stdin();
            let mut session = session::Session::new(settings, cache);
            session.run(&mut stdin.lock(), &mut stdout.lock())?;
        }
        Command::Render {
            filters,
            map_mode,
            out,
            key,
        } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let mode = match map_mode {
                Some(m) => parse_map_mode(m)?,
                None => settings.map_mode,
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let out_path = match out {
                Some(p) => PathBuf::from(p),
                None => settings.output_directory.join(DEFAULT_PAGE_NAME),
            };
            let dash = write_dashboard_page(
                &settings,
                &loaded.dataset,
                &f,
                mode,
                key.as_deref(),
                &out_path,
            )?;
            write_dashboard_text(&dash, &mut stdout.lock())
                .context(WritingOutputSnafu { path: "stdout" })?;
            println!("Dashboard written to {}.", out_path.display());
        }
        Command::Summary { filters, reference } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let view = FilteredView::new(&loaded.dataset, &f);
            let dash = render(&view, settings.map_mode).context(ViewSnafu {})?;
            let js = build_summary_js(&dash);
            let pretty = serde_json::to_string_pretty(&js).context(ParsingJsonSnafu {})?;
            println!("{}", pretty);
            if let Some(r) = reference {
                check_summary(&js, r)?;
            }
        }
        Command::Record { filters, key } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let view = FilteredView::new(&loaded.dataset, &f);
            match lookup(&view.rows, key) {
                Ok(details) => {
                    for d in details.iter() {
                        write_record(d, &mut stdout.lock())
                            .context(WritingOutputSnafu { path: "stdout" })?;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
        Command::Keys { filters } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let view = FilteredView::new(&loaded.dataset, &f);
            for k in survey_view::detail::record_keys(&view.rows) {
                println!("{}", k);
            }
        }
        Command::Options { filters } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let view = FilteredView::new(&loaded.dataset, &f);
            let dash = render(&view, settings.map_mode).context(ViewSnafu {})?;
            write_options(&dash, &mut stdout.lock())
                .context(WritingOutputSnafu { path: "stdout" })?;
        }
        Command::Export { filters, out } => {
            let loaded = match load_non_empty(&mut cache, &settings, &mut stdout.lock())? {
                Some(l) => l,
                None => return Ok(()),
            };
            let f = build_filters(filters, &loaded.dataset)?;
            let view = FilteredView::new(&loaded.dataset, &f);
            match out.as_deref() {
                None | Some("stdout") => {
                    export_rows(&loaded.dataset, &view.rows, &mut stdout.lock())?
                }
                Some(p) => {
                    check_export_target(p)?;
                    let mut file = fs::File::create(p).context(WritingOutputSnafu { path: p })?;
                    export_rows(&loaded.dataset, &view.rows, &mut file)?;
                    println!("{} submissions written to {}.", view.rows.len(), p);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_view::builder::TableBuilder;

    fn dataset() -> Dataset {
        let header: Vec<String> = [COL_KEY, COL_SUBMISSION_DATE, COL_SURVEYOR_NAME, COL_VILLAGE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let t = |s: &str| RawCell::Text(s.to_string());
        let mut b = TableBuilder::new();
        b.add_source(
            "test.xlsx",
            &header,
            vec![
                vec![t("uuid:1"), t("2024-01-10 08:00:00"), t("Amina"), t("Ba")],
                vec![t("uuid:2"), t("2024-01-20 08:00:00"), t("Joseph"), t("Ca")],
            ],
        );
        normalize(&b.build())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn map_modes() {
        assert_eq!(parse_map_mode("Route").unwrap(), MapMode::Route);
        assert_eq!(parse_map_mode("default").unwrap(), MapMode::Cluster);
        assert!(parse_map_mode("satellite").is_err());
    }

    #[test]
    fn filters_from_arguments() {
        let ds = dataset();
        let fa = FilterArgs {
            surveyor: Some("All Surveyors".to_string()),
            from: Some("2024-01-15".to_string()),
            village: Some("Ca".to_string()),
            ..FilterArgs::default()
        };
        let f = build_filters(&fa, &ds).unwrap();
        assert_eq!(f.surveyor, Selection::All);
        assert_eq!(f.village, Selection::Only("Ca".to_string()));
        // The end of the range comes from the data.
        assert_eq!(f.date_range, Some((day(2024, 1, 15), day(2024, 1, 20))));

        let f = build_filters(&FilterArgs::default(), &ds).unwrap();
        assert_eq!(f, Filters::NONE);
    }

    #[test]
    fn bad_date_argument() {
        let ds = dataset();
        let fa = FilterArgs {
            to: Some("20/01/2024".to_string()),
            ..FilterArgs::default()
        };
        let err = build_filters(&fa, &ds).unwrap_err();
        assert!(matches!(err, DashError::InvalidDate { .. }));
    }

    #[test]
    fn summary_json() {
        let ds = dataset();
        let view = FilteredView::new(&ds, &Filters::NONE);
        let dash = render(&view, MapMode::Cluster).unwrap();
        let js = build_summary_js(&dash);
        assert_eq!(js["metrics"]["totalSubmissions"], json!(2));
        assert_eq!(js["metrics"]["percentVerified"], json!(0.0));
        assert_eq!(js["filters"]["surveyor"], json!("All Surveyors"));
        assert_eq!(js["verification"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(js["byDate"][0]["date"], json!("2024-01-10"));
    }

    #[test]
    fn summary_reference_check() {
        let ds = dataset();
        let view = FilteredView::new(&ds, &Filters::NONE);
        let dash = render(&view, MapMode::Cluster).unwrap();
        let js = build_summary_js(&dash);

        let dir = tempfile::tempdir().unwrap();
        let same = dir.path().join("same.json");
        fs::write(&same, serde_json::to_string(&js).unwrap()).unwrap();
        assert!(check_summary(&js, same.to_str().unwrap()).is_ok());

        let other = dir.path().join("other.json");
        fs::write(&other, "{\"metrics\": {}}").unwrap();
        let err = check_summary(&js, other.to_str().unwrap()).unwrap_err();
        assert!(matches!(*err, DashError::ReferenceMismatch {}));
    }

    #[test]
    fn text_outputs() {
        let ds = dataset();
        let view = FilteredView::new(&ds, &Filters::NONE);
        let dash = render(&view, MapMode::Cluster).unwrap();

        let mut buf: Vec<u8> = Vec::new();
        write_dashboard_text(&dash, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Total submissions: 2"));
        assert!(text.contains("Externally verified: 0 (0%)"));
        assert!(text.contains("Beneficiary Verified: 2"));

        let mut buf: Vec<u8> = Vec::new();
        write_options(&dash, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("surveyors: All Surveyors, Amina, Joseph"));
        assert!(text.contains("map modes: cluster, sequence"));
    }

    #[test]
    fn export_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_export_target(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DashError::Whatever { .. }));
        let file = dir.path().join("out.csv");
        assert!(check_export_target(file.to_str().unwrap()).is_ok());
    }

    #[test]
    fn export_csv() {
        let ds = dataset();
        let view = FilteredView::new(&ds, &Filters::NONE);
        let mut buf: Vec<u8> = Vec::new();
        export_rows(&ds, &view.rows, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("KEY,review_status,SubmissionDate"));
        assert!(lines[1].starts_with("uuid:1,Not provided,2024-01-10 08:00:00"));
    }
}
