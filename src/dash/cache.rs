use log::{debug, info};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::dash::io_xlsx::{list_source_files, load_dataset, Loaded};
use crate::dash::*;

/// What identifies the content of a file without reading it.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct FileSignature {
    pub path: PathBuf,
    pub len: Option<u64>,
    pub modified: Option<SystemTime>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct CacheKey {
    pub source: DataSource,
    pub files: Vec<FileSignature>,
}

fn signature(path: &Path) -> FileSignature {
    let meta = fs::metadata(path).ok();
    FileSignature {
        path: path.to_path_buf(),
        len: meta.as_ref().map(|m| m.len()),
        modified: meta.and_then(|m| m.modified().ok()),
    }
}

/// The key of a source, as it currently is on disk.
pub fn cache_key(source: &DataSource) -> BDashResult<CacheKey> {
    let files = list_source_files(source)?;
    Ok(CacheKey {
        source: source.clone(),
        files: files.iter().map(|p| signature(p)).collect(),
    })
}

/// Keeps the loaded datasets around between two interactions.
///
/// A dataset is read again when the set of files of its source changes, or when
/// one of them changes size or modification time.
#[derive(Debug, Default)]
pub struct IngestCache {
    entries: HashMap<CacheKey, Arc<Loaded>>,
}

impl IngestCache {
    pub fn new() -> IngestCache {
        IngestCache::default()
    }

    pub fn load(&mut self, source: &DataSource) -> BDashResult<Arc<Loaded>> {
        let key = cache_key(source)?;
        if let Some(l) = self.entries.get(&key) {
            debug!("IngestCache: hit for {}", source.display());
            return Ok(l.clone());
        }
        // Older versions of the same source are not needed anymore.
        self.invalidate(source);
        info!(
            "IngestCache: reading {} ({} files)",
            source.display(),
            key.files.len()
        );
        let paths: Vec<PathBuf> = key.files.iter().map(|s| s.path.clone()).collect();
        let loaded = Arc::new(load_dataset(&paths));
        self.entries.insert(key, loaded.clone());
        Ok(loaded)
    }

    /// Stores data read elsewhere for the current state of a source.
    pub fn insert(&mut self, source: &DataSource, loaded: Loaded) -> BDashResult<Arc<Loaded>> {
        let key = cache_key(source)?;
        self.invalidate(source);
        let loaded = Arc::new(loaded);
        self.entries.insert(key, loaded.clone());
        Ok(loaded)
    }

    /// Drops the cached data of a source and reads it again.
    pub fn reload(&mut self, source: &DataSource) -> BDashResult<Arc<Loaded>> {
        self.invalidate(source);
        self.load(source)
    }

    pub fn invalidate(&mut self, source: &DataSource) {
        self.entries.retain(|k, _| &k.source != source);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
