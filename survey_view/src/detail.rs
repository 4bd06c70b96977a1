use std::collections::HashSet;

use serde::Serialize;

use crate::config::*;
use crate::map::duration_minutes;

/// How a media attachment can be previewed.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize)]
pub enum MediaKind {
    Image,
    Audio,
    Other,
}

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const AUDIO_EXTENSIONS: [&str; 8] = ["mp3", "wav", "ogg", "oga", "m4a", "aac", "amr", "flac"];

impl MediaKind {
    /// Guesses the kind of a link from the extension of its path.
    pub fn from_url(url: &str) -> MediaKind {
        let path = url.split(['?', '#']).next().unwrap_or("");
        let last_segment = path.rsplit('/').next().unwrap_or("");
        let ext = match last_segment.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return MediaKind::Other,
        };
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Audio
        } else {
            MediaKind::Other
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct MediaItem {
    pub column: String,
    pub url: String,
    pub kind: MediaKind,
}

/// All that is shown for one submission.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct RecordDetail {
    pub key: String,
    pub surveyor: String,
    pub beneficiary_name: String,
    pub surveyor_comments: String,
    pub duration_min: String,
    pub verified: bool,
    /// Only disclosed for externally verified submissions.
    pub elder: Option<ElderVerification>,
    pub media: Vec<MediaItem>,
    pub fields: Vec<(String, String)>,
}

impl RecordDetail {
    pub fn new(s: &Submission) -> RecordDetail {
        RecordDetail {
            key: s.key.clone(),
            surveyor: s.surveyor_name.clone(),
            beneficiary_name: s.beneficiary_name.clone(),
            surveyor_comments: s.surveyor_comments.clone(),
            duration_min: duration_minutes(s.duration_secs)
                .map(|m| m.to_string())
                .unwrap_or_else(|| NOT_PROVIDED.to_string()),
            verified: s.is_verified(),
            elder: if s.is_verified() {
                Some(s.elder.clone())
            } else {
                None
            },
            media: s
                .media
                .iter()
                .map(|m| MediaItem {
                    column: m.column.clone(),
                    url: m.url.clone(),
                    kind: MediaKind::from_url(&m.url),
                })
                .collect(),
            fields: s.fields.clone(),
        }
    }
}

/// The identifiers that can be looked up, in table order, without repetition.
pub fn record_keys(rows: &[&Submission]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keys: Vec<String> = Vec::new();
    for s in rows.iter() {
        if seen.insert(s.key.as_str()) {
            keys.push(s.key.clone());
        }
    }
    keys
}

/// Finds the submissions with the given identifier.
///
/// Identifiers are not guaranteed to be unique in the exports: all the matches are returned.
pub fn lookup(rows: &[&Submission], key: &str) -> Result<Vec<RecordDetail>, ViewError> {
    let res: Vec<RecordDetail> = rows
        .iter()
        .filter(|s| s.key == key)
        .map(|s| RecordDetail::new(s))
        .collect();
    if res.is_empty() {
        Err(ViewError::RecordNotFound(key.to_string()))
    } else {
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;
    use crate::normalize;

    fn rich_dataset() -> Dataset {
        let header: Vec<String> = [
            COL_KEY,
            COL_SURVEYOR_NAME,
            COL_EXTERNAL_VERIFICATION,
            COL_ELDER_NAME,
            COL_ELDER_PHONE,
            COL_PHOTO_URL,
            COL_AUDIO_URL,
            COL_DURATION,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let t = |s: &str| RawCell::Text(s.to_string());
        let rows = vec![
            vec![
                t("uuid:a"),
                t("Amina"),
                RawCell::Number(1.0),
                t("Mzee Juma"),
                t("+255 700 000 000"),
                t("https://forms.example.org/view/photo.JPG?id=3"),
                t("https://forms.example.org/view/voice.m4a"),
                RawCell::Number(330.0),
            ],
            vec![
                t("uuid:b"),
                t("Amina"),
                RawCell::Number(0.0),
                t("Mzee Juma"),
                RawCell::Empty,
                RawCell::Empty,
                t("https://forms.example.org/view/attachment"),
                RawCell::Empty,
            ],
            vec![
                t("uuid:a"),
                t("Joseph"),
                RawCell::Number(0.0),
                RawCell::Empty,
                RawCell::Empty,
                RawCell::Empty,
                RawCell::Empty,
                RawCell::Empty,
            ],
        ];
        let mut b = TableBuilder::new();
        b.add_source("rich.xlsx", &header, rows);
        normalize(&b.build())
    }

    #[test]
    fn media_kinds() {
        assert_eq!(MediaKind::from_url("http://x/y/a.png"), MediaKind::Image);
        assert_eq!(MediaKind::from_url("http://x/y/a.JPEG#top"), MediaKind::Image);
        assert_eq!(MediaKind::from_url("http://x/y/a.mp3?dl=1"), MediaKind::Audio);
        assert_eq!(MediaKind::from_url("http://x/y/a.pdf"), MediaKind::Other);
        assert_eq!(MediaKind::from_url("http://x.org/y/a"), MediaKind::Other);
    }

    #[test]
    fn keys_are_unique() {
        let ds = rich_dataset();
        let rows: Vec<&Submission> = ds.submissions.iter().collect();
        assert_eq!(record_keys(&rows), vec!["uuid:a", "uuid:b"]);
    }

    #[test]
    fn lookup_returns_all_matches() {
        let ds = rich_dataset();
        let rows: Vec<&Submission> = ds.submissions.iter().collect();
        let found = lookup(&rows, "uuid:a").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].surveyor, "Amina");
        assert_eq!(found[1].surveyor, "Joseph");
    }

    #[test]
    fn lookup_miss() {
        let ds = rich_dataset();
        let rows: Vec<&Submission> = ds.submissions.iter().collect();
        assert_eq!(
            lookup(&rows, "uuid:zz"),
            Err(ViewError::RecordNotFound("uuid:zz".to_string()))
        );
    }

    #[test]
    fn elder_section_only_when_verified() {
        let ds = rich_dataset();
        let rows: Vec<&Submission> = ds.submissions.iter().collect();
        let a = &lookup(&rows, "uuid:a").unwrap()[0];
        let elder = a.elder.as_ref().unwrap();
        assert_eq!(elder.name, "Mzee Juma");
        assert_eq!(elder.relationship, NOT_PROVIDED);
        assert_eq!(a.duration_min, "6");

        let b = &lookup(&rows, "uuid:b").unwrap()[0];
        assert!(b.elder.is_none());
        assert_eq!(b.duration_min, NOT_PROVIDED);
    }

    #[test]
    fn media_links() {
        let ds = rich_dataset();
        let rows: Vec<&Submission> = ds.submissions.iter().collect();
        let a = &lookup(&rows, "uuid:a").unwrap()[0];
        let kinds: Vec<MediaKind> = a.media.iter().map(|m| m.kind).collect();
        assert_eq!(kinds, vec![MediaKind::Image, MediaKind::Audio]);

        let b = &lookup(&rows, "uuid:b").unwrap()[0];
        assert_eq!(b.media.len(), 1);
        assert_eq!(b.media[0].kind, MediaKind::Other);
        assert_eq!(b.media[0].column, COL_AUDIO_URL);
    }
}
