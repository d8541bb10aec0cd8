// src/plan/hashes.rs

//! Content hashing of job inputs and the on-disk hash store.
//!
//! When hash-based staleness is enabled, the aggregate blake3 hash of a job's
//! input contents is stored under the job key after each successful run, and
//! compared against a fresh computation on the next run.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, info};

/// Relative path (from the working directory) to the hashes file.
pub const HASH_FILE_PATH: &str = ".dagrun/hashes";

fn hash_file_path(root: &Path) -> PathBuf {
    root.join(HASH_FILE_PATH)
}

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute a deterministic hash over the contents of the given files.
///
/// Order of `paths` does not matter; they are sorted before hashing to keep
/// the result stable. Paths that are not regular files are skipped.
pub fn compute_hash_for_paths<I, P>(paths: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut hasher = Hasher::new();

    let mut paths_vec: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    paths_vec.sort();

    for path in paths_vec {
        if path.is_file() {
            debug!("hashing file {:?}", path);
            let file_hash = compute_file_hash(&path)?;
            hasher.update(file_hash.as_bytes());
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Abstract storage for per-job input hashes.
pub trait HashStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&mut self, key: &str, hash: &str) -> Result<()>;
}

/// Stores hashes in a file (`.dagrun/hashes`), one `key\thash` line per job.
pub struct FileHashStore {
    root: PathBuf,
}

impl FileHashStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl HashStore for FileHashStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let map = load_all_hashes(&self.root)?;
        Ok(map.get(key).cloned())
    }

    fn save(&mut self, key: &str, hash: &str) -> Result<()> {
        let mut map = load_all_hashes(&self.root)?;
        map.insert(key.to_string(), hash.to_string());
        save_all_hashes(&self.root, &map)?;
        info!(job = %key, hash = %hash, "stored input hash");
        Ok(())
    }
}

/// In-memory store used by tests.
#[derive(Default)]
pub struct MemoryHashStore {
    map: HashMap<String, String>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, key: &str, hash: &str) -> Result<()> {
        self.map.insert(key.to_string(), hash.to_string());
        Ok(())
    }
}

fn load_all_hashes(root: &Path) -> Result<HashMap<String, String>> {
    let path = hash_file_path(root);
    let mut map = HashMap::new();

    if !path.is_file() {
        return Ok(map);
    }

    let file = File::open(&path).with_context(|| format!("opening hash file {:?}", path))?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Some((key, hash)) = line.rsplit_once('\t') {
            map.insert(key.to_string(), hash.to_string());
        }
    }

    Ok(map)
}

fn save_all_hashes(root: &Path, map: &HashMap<String, String>) -> Result<()> {
    let path = hash_file_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
    }

    let file = File::create(&path).with_context(|| format!("creating hash file {:?}", path))?;
    let mut writer = BufWriter::new(file);
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort();
    for (key, hash) in entries {
        writeln!(writer, "{key}\t{hash}")?;
    }
    writer.flush()?;

    Ok(())
}
