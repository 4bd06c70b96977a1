use log::debug;
use snafu::prelude::*;

use crate::args::Args;
use crate::dash::*;

use serde::{Deserialize, Serialize};

/// The name of the notes log when none is configured.
pub const DEFAULT_NOTES_FILE: &str = "surveyor_notes.csv";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub path: String,
    /// file, folder or glob. Guessed from the path when missing.
    pub kind: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DashConfig {
    #[serde(rename = "dataSource")]
    pub data_source: Option<DataSourceConfig>,
    #[serde(rename = "notesFile")]
    pub notes_file: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "mapMode")]
    pub map_mode: Option<String>,
}

/// The configuration once the command line and the configuration file have been merged.
#[derive(PartialEq, Debug, Clone)]
pub struct Settings {
    pub source: DataSource,
    pub notes_file: PathBuf,
    pub output_directory: PathBuf,
    pub title: Option<String>,
    pub map_mode: MapMode,
}

pub fn read_config(path: &str) -> BDashResult<DashConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: DashConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// Resolves a path of the configuration file against the directory of that file.
fn relative_to(root: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() {
        pb
    } else {
        root.join(pb)
    }
}

pub fn source_kind(kind: Option<&str>, file_name: Option<&str>, path: &Path) -> DashResult<SourceKind> {
    let folder = || SourceKind::Folder {
        file_name: file_name.unwrap_or(DEFAULT_DATA_FILE).to_string(),
    };
    match kind.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("file") => Ok(SourceKind::File),
        Some("folder") => Ok(folder()),
        Some("glob") => Ok(SourceKind::Glob),
        Some(other) => UnknownSourceSnafu { value: other }.fail(),
        // A file name only makes sense inside a folder.
        None if file_name.is_some() => Ok(folder()),
        None if path.is_dir() => Ok(SourceKind::Glob),
        None => Ok(SourceKind::File),
    }
}

/// Merges the configuration file (if any) with the command line. The command line wins.
pub fn resolve_settings(args: &Args) -> BDashResult<Settings> {
    let (config, root) = match &args.config {
        Some(p) => {
            let config = read_config(p)?;
            let root = Path::new(p)
                .parent()
                .map(|x| x.to_path_buf())
                .unwrap_or_default();
            (Some(config), root)
        }
        None => (None, PathBuf::new()),
    };
    let cfg_source = config.as_ref().and_then(|c| c.data_source.clone());

    let path: PathBuf = match (&args.input, &cfg_source) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(ds)) => relative_to(&root, &ds.path),
        (None, None) => PathBuf::from("."),
    };
    let kind_s = args
        .source
        .clone()
        .or_else(|| cfg_source.as_ref().and_then(|ds| ds.kind.clone()));
    let file_name = args
        .file_name
        .clone()
        .or_else(|| cfg_source.as_ref().and_then(|ds| ds.file_name.clone()));
    // Without any input, the known file is looked up in the working directory.
    let kind = if args.input.is_none() && cfg_source.is_none() && kind_s.is_none() {
        SourceKind::Folder {
            file_name: file_name.unwrap_or_else(|| DEFAULT_DATA_FILE.to_string()),
        }
    } else {
        source_kind(kind_s.as_deref(), file_name.as_deref(), &path)?
    };

    let notes_file = match (&args.notes, config.as_ref().and_then(|c| c.notes_file.clone())) {
        (Some(p), _) => PathBuf::from(p),
        (None, Some(p)) => relative_to(&root, &p),
        (None, None) => PathBuf::from(DEFAULT_NOTES_FILE),
    };
    let output_directory = config
        .as_ref()
        .and_then(|c| c.output_directory.clone())
        .map(|p| relative_to(&root, &p))
        .unwrap_or_else(|| PathBuf::from("."));
    let map_mode = match config.as_ref().and_then(|c| c.map_mode.clone()) {
        Some(m) => parse_map_mode(&m)?,
        None => MapMode::Cluster,
    };

    Ok(Settings {
        source: DataSource { path, kind },
        notes_file,
        output_directory,
        title: config.and_then(|c| c.title),
        map_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Command;

    fn args() -> Args {
        Args {
            input: None,
            source: None,
            file_name: None,
            config: None,
            notes: None,
            verbose: false,
            command: Command::Session,
        }
    }

    #[test]
    fn defaults() {
        let s = resolve_settings(&args()).unwrap();
        assert_eq!(
            s.source,
            DataSource {
                path: PathBuf::from("."),
                kind: SourceKind::Folder {
                    file_name: DEFAULT_DATA_FILE.to_string()
                }
            }
        );
        assert_eq!(s.notes_file, PathBuf::from(DEFAULT_NOTES_FILE));
        assert_eq!(s.map_mode, MapMode::Cluster);
    }

    #[test]
    fn kinds_from_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            source_kind(None, None, dir.path()).unwrap(),
            SourceKind::Glob
        );
        assert_eq!(
            source_kind(None, None, &dir.path().join("data.xlsx")).unwrap(),
            SourceKind::File
        );
        assert_eq!(
            source_kind(Some("Folder"), Some("x.xlsx"), dir.path()).unwrap(),
            SourceKind::Folder {
                file_name: "x.xlsx".to_string()
            }
        );
        assert!(source_kind(Some("zip"), None, dir.path()).is_err());
    }

    #[test]
    fn config_file_is_relative_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("dash.json");
        fs::write(
            &cfg,
            r#"{
                "dataSource": {"path": "exports", "kind": "glob"},
                "notesFile": "notes/log.csv",
                "outputDirectory": "out",
                "title": "Round 2",
                "mapMode": "sequence"
            }"#,
        )
        .unwrap();
        let mut a = args();
        a.config = Some(cfg.to_str().unwrap().to_string());
        let s = resolve_settings(&a).unwrap();
        assert_eq!(s.source.path, dir.path().join("exports"));
        assert_eq!(s.source.kind, SourceKind::Glob);
        assert_eq!(s.notes_file, dir.path().join("notes/log.csv"));
        assert_eq!(s.output_directory, dir.path().join("out"));
        assert_eq!(s.title.as_deref(), Some("Round 2"));
        assert_eq!(s.map_mode, MapMode::Sequence);

        // The command line wins.
        a.input = Some("/data/one.xlsx".to_string());
        a.source = Some("file".to_string());
        a.notes = Some("mine.csv".to_string());
        let s = resolve_settings(&a).unwrap();
        assert_eq!(s.source.path, PathBuf::from("/data/one.xlsx"));
        assert_eq!(s.source.kind, SourceKind::File);
        assert_eq!(s.notes_file, PathBuf::from("mine.csv"));
    }

    #[test]
    fn bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("dash.json");
        fs::write(&cfg, "{ not json").unwrap();
        let err = read_config(cfg.to_str().unwrap()).unwrap_err();
        assert!(matches!(*err, DashError::ParsingJson { .. }));
        let err = read_config("/does/not/exist.json").unwrap_err();
        assert!(matches!(*err, DashError::OpeningJson { .. }));
    }
}
