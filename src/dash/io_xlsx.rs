use log::{debug, info, warn};
use snafu::prelude::*;

use calamine::{open_workbook, Reader, Xlsx};

use survey_view::builder::TableBuilder;

use crate::dash::io_common::*;
use crate::dash::*;

/// A dataset, and the files that could not be read to build it.
#[derive(PartialEq, Debug, Clone)]
pub struct Loaded {
    pub dataset: Dataset,
    /// (path, reason)
    pub skipped: Vec<(String, String)>,
}

fn is_workbook(p: &Path) -> bool {
    let name = simplify_file_name(p);
    // Office keeps lock files such as ~$data.xlsx next to the open workbooks.
    !name.starts_with("~$")
        && p
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case("xlsx"))
            .unwrap_or(false)
}

/// The workbooks to read for a source, sorted by name.
pub fn list_source_files(source: &DataSource) -> BDashResult<Vec<PathBuf>> {
    match &source.kind {
        SourceKind::File => Ok(vec![source.path.clone()]),
        SourceKind::Folder { file_name } => Ok(vec![source.path.join(file_name)]),
        SourceKind::Glob => {
            let path_s = source.path.display().to_string();
            let entries = fs::read_dir(&source.path).context(ReadingDirectorySnafu {
                path: path_s.clone(),
            })?;
            let mut res: Vec<PathBuf> = Vec::new();
            for entry in entries {
                let entry = entry.context(ReadingDirectorySnafu {
                    path: path_s.clone(),
                })?;
                let p = entry.path();
                if p.is_file() && is_workbook(&p) {
                    res.push(p);
                }
            }
            res.sort();
            debug!("list_source_files: {:?}", res);
            Ok(res)
        }
    }
}

/// Reads the header and the rows of the first sheet of a workbook.
pub fn read_sheet(path: &Path) -> BDashResult<(Vec<String>, Vec<Vec<RawCell>>)> {
    let path_s = path.display().to_string();
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
        path: path_s.clone(),
    })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu {
            path: path_s.clone(),
        })?
        .context(OpeningExcelSnafu { path: path_s })?;

    let mut iter = wrange.rows();
    let header: Vec<String> = match iter.next() {
        Some(row) => row.iter().map(header_name).collect(),
        // An empty sheet has no columns and no rows.
        None => return Ok((Vec::new(), Vec::new())),
    };
    debug!("read_sheet: header: {:?}", header);
    let rows: Vec<Vec<RawCell>> = iter
        .map(|row| row.iter().map(cell_to_raw).collect())
        .collect();
    Ok((header, rows))
}

/// Reads all the files into one dataset. The files that cannot be read are skipped.
pub fn load_dataset(files: &[PathBuf]) -> Loaded {
    let mut builder = TableBuilder::new();
    let mut skipped: Vec<(String, String)> = Vec::new();
    for p in files.iter() {
        match read_sheet(p) {
            Ok((header, rows)) => {
                info!("load_dataset: {} rows in {}", rows.len(), p.display());
                builder.add_source(&simplify_file_name(p), &header, rows);
            }
            Err(e) => {
                warn!("load_dataset: skipping {}: {}", p.display(), e);
                skipped.push((p.display().to_string(), e.to_string()));
            }
        }
    }
    let dataset = normalize(&builder.build());
    Loaded { dataset, skipped }
}

pub fn load_source(source: &DataSource) -> BDashResult<Loaded> {
    let files = list_source_files(source)?;
    if files.is_empty() {
        warn!("load_source: no workbook found in {}", source.display());
    }
    Ok(load_dataset(&files))
}
