// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// The value substituted for missing display fields.
pub const NOT_PROVIDED: &str = "Not provided";

/// The label of the "no surveyor filter" choice.
pub const ALL_SURVEYORS: &str = "All Surveyors";

pub const COL_KEY: &str = "KEY";
pub const COL_REVIEW_STATUS: &str = "review_status";
pub const COL_SUBMISSION_DATE: &str = "SubmissionDate";
pub const COL_PRIMARY_LAT: &str = "Geopoint1-Latitude";
pub const COL_PRIMARY_LON: &str = "Geopoint1-Longitude";
pub const COL_FALLBACK_LAT: &str = "geopoint-Latitude";
pub const COL_FALLBACK_LON: &str = "geopoint-Longitude";
pub const COL_SURVEYOR_ID: &str = "Surveyor_Id";
pub const COL_SURVEYOR_NAME: &str = "Surveyor_Name";
pub const COL_PROVINCE: &str = "Province";
pub const COL_DISTRICT: &str = "District";
pub const COL_VILLAGE: &str = "Village";
pub const COL_EXTERNAL_VERIFICATION: &str = "external_verification";
pub const COL_DURATION: &str = "duration";
pub const COL_BENEFICIARY_NAME: &str = "Beneficiary_Name";
pub const COL_SURVEYOR_COMMENTS: &str = "Surveyor_Comments";
pub const COL_ELDER_NAME: &str = "Elder_Name";
pub const COL_ELDER_RELATIONSHIP: &str = "Elder_Relationship";
pub const COL_ELDER_PHONE: &str = "Elder_Phone";
pub const COL_ELDER_COMMENTS: &str = "Elder_Comments";
pub const COL_PHOTO_URL: &str = "Photo_URL";
pub const COL_AUDIO_URL: &str = "Audio_URL";
pub const COL_DOCUMENT_URL: &str = "Document_URL";

/// The columns that are guaranteed to be present in a normalized table,
/// whether or not the source spreadsheets contain them.
pub const EXPECTED_COLUMNS: [&str; 23] = [
    COL_KEY,
    COL_REVIEW_STATUS,
    COL_SUBMISSION_DATE,
    COL_PRIMARY_LAT,
    COL_PRIMARY_LON,
    COL_FALLBACK_LAT,
    COL_FALLBACK_LON,
    COL_SURVEYOR_ID,
    COL_SURVEYOR_NAME,
    COL_PROVINCE,
    COL_DISTRICT,
    COL_VILLAGE,
    COL_EXTERNAL_VERIFICATION,
    COL_DURATION,
    COL_BENEFICIARY_NAME,
    COL_SURVEYOR_COMMENTS,
    COL_ELDER_NAME,
    COL_ELDER_RELATIONSHIP,
    COL_ELDER_PHONE,
    COL_ELDER_COMMENTS,
    COL_PHOTO_URL,
    COL_AUDIO_URL,
    COL_DOCUMENT_URL,
];

/// The GPS columns. When none of them shows up in any source, the map is skipped.
pub const GPS_COLUMNS: [&str; 4] = [
    COL_PRIMARY_LAT,
    COL_PRIMARY_LON,
    COL_FALLBACK_LAT,
    COL_FALLBACK_LON,
];

/// Columns holding links to media attachments.
pub const MEDIA_COLUMNS: [&str; 3] = [COL_PHOTO_URL, COL_AUDIO_URL, COL_DOCUMENT_URL];

/// A cell, as decoded by the spreadsheet readers.
///
/// The readers are responsible for turning their own cell types into this
/// representation. Everything past this point is independent of the file format.
#[derive(PartialEq, Debug, Clone)]
pub enum RawCell {
    /// A missing value. Also used for columns that a source file does not have.
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            RawCell::Number(f) => f.is_nan(),
            _ => false,
        }
    }
}

// ******** Output data structures *********

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// The community-elder confirmation attached to an externally verified submission.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct ElderVerification {
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub comments: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct MediaLink {
    pub column: String,
    pub url: String,
}

/// One survey submission, after normalization.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct Submission {
    pub key: String,
    pub review_status: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub surveyor_id: String,
    pub surveyor_name: String,
    pub province: String,
    pub district: String,
    pub village: String,
    /// The resolved coordinates.
    pub location: Option<GeoPoint>,
    pub duration_secs: Option<f64>,
    pub external_verification: i64,
    pub beneficiary_name: String,
    pub surveyor_comments: String,
    pub elder: ElderVerification,
    pub media: Vec<MediaLink>,
    /// All the columns of the table, in order, as displayed.
    pub fields: Vec<(String, String)>,
}

impl Submission {
    pub fn is_verified(&self) -> bool {
        self.external_verification == 1
    }

    pub fn submitted_on(&self) -> Option<NaiveDate> {
        self.submitted_at.map(|ts| ts.date())
    }

    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }
}

/// The normalized table.
#[derive(PartialEq, Debug, Clone)]
pub struct Dataset {
    pub submissions: Vec<Submission>,
    /// The aligned column names, expected columns first.
    pub columns: Vec<String>,
    /// False if none of the GPS columns was found in any of the sources.
    pub has_coordinates: bool,
    pub sources: Vec<String>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }
}

/// Errors that prevent a view from being produced.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ViewError {
    EmptyDataset,
    RecordNotFound(String),
    NoCoordinates,
}

impl Error for ViewError {}

impl Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViewError::EmptyDataset => write!(f, "no submissions to display"),
            ViewError::RecordNotFound(key) => write!(f, "record {} not found", key),
            ViewError::NoCoordinates => write!(f, "no GPS columns in the source data"),
        }
    }
}

// ********* Configuration **********

/// A filter value for one dimension.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default, Serialize)]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    /// Builds a selection from user input. The "all" labels and blank input mean no filter.
    pub fn parse(s: &str) -> Selection {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("all") || t == ALL_SURVEYORS {
            Selection::All
        } else {
            Selection::Only(t.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(s) => s == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn as_option(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Only(s) => Some(s.as_str()),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize)]
pub struct Filters {
    pub surveyor: Selection,
    /// Inclusive on both ends.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub province: Selection,
    pub district: Selection,
    pub village: Selection,
}

impl Filters {
    pub const NONE: Filters = Filters {
        surveyor: Selection::All,
        date_range: None,
        province: Selection::All,
        district: Selection::All,
        village: Selection::All,
    };
}

/// The presentation of the map.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
pub enum MapMode {
    /// Clustered point markers with popups.
    Cluster,
    /// Individual markers labelled with their position in the sequence.
    Sequence,
    /// The path of a single surveyor. Not defined across several surveyors.
    Route,
}

impl MapMode {
    pub fn available(surveyor: &Selection) -> Vec<MapMode> {
        if surveyor.is_all() {
            vec![MapMode::Cluster, MapMode::Sequence]
        } else {
            vec![MapMode::Cluster, MapMode::Sequence, MapMode::Route]
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MapMode::Cluster => "cluster",
            MapMode::Sequence => "sequence",
            MapMode::Route => "route",
        }
    }
}
