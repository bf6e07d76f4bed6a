//! Commit points.
//!
//! Each commit writes `segments_N.json` listing the live segments and their
//! deletion generations. The manifest is written under a temporary name,
//! synced and renamed into place, so a commit becomes visible atomically.
//! On open the newest manifest that parses and whose files all exist wins.
//! Files it does not reference are removed, except those belonging to newer
//! manifests that could not be used: they stay until the next commit.

use std::collections::HashSet;
use std::io::Write;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::segment::SegmentMeta;
use crate::storage::Storage;

const MANIFEST_PREFIX: &str = "segments_";
const MANIFEST_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";
const SEGMENT_PREFIX: &str = "seg_";

/// Name of the write lock file.
pub const WRITE_LOCK: &str = "write.lock";

pub const FORMAT_VERSION: u32 = 1;

/// File name of the manifest for `generation`.
pub fn manifest_file_name(generation: u64) -> String {
    format!("{MANIFEST_PREFIX}{generation}{MANIFEST_SUFFIX}")
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(MANIFEST_PREFIX)?
        .strip_suffix(MANIFEST_SUFFIX)?
        .parse()
        .ok()
}

/// Segment number of any segment or deletion file (`seg_000004.post`,
/// `seg_000004_7.del`).
fn parse_segment_number(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(SEGMENT_PREFIX)?;
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

fn parse_deletion_generation(name: &str) -> Option<u64> {
    let (_, generation) = name.strip_suffix(".del")?.rsplit_once('_')?;
    generation.parse().ok()
}

/// Highest numbers present in storage, whether or not a usable manifest
/// references them. New commits and segments are numbered past these so
/// they never overwrite files left by an unreadable commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredNumbers {
    /// Newest `segments_N.json` on disk, 0 if there is none.
    pub newest_generation: u64,

    /// One past the highest segment number on disk.
    pub next_segment: u64,
}

impl StoredNumbers {
    pub fn scan(storage: &dyn Storage) -> Result<Self> {
        let mut numbers = StoredNumbers::default();
        for name in storage.list_files()? {
            if let Some(generation) = parse_generation(&name) {
                numbers.newest_generation = numbers.newest_generation.max(generation);
            }
            if let Some(segment) = parse_segment_number(&name) {
                numbers.next_segment = numbers.next_segment.max(segment + 1);
            }
        }
        Ok(numbers)
    }
}

/// The set of segments making up one committed version of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,

    /// Increases by one with every commit. 0 means nothing was committed yet.
    pub generation: u64,

    /// Number used to name the next segment.
    pub next_segment: u64,

    pub segments: Vec<SegmentMeta>,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            format_version: FORMAT_VERSION,
            generation: 0,
            next_segment: 1,
            segments: Vec::new(),
        }
    }
}

impl Manifest {
    pub fn file_name(&self) -> String {
        manifest_file_name(self.generation)
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_count() as u64).sum()
    }

    /// Every file this manifest needs, including itself.
    pub fn referenced_files(&self) -> HashSet<String> {
        let mut files: HashSet<String> = self.segments.iter().flat_map(|s| s.files()).collect();
        if self.generation > 0 {
            files.insert(self.file_name());
        }
        files
    }

    /// Write this manifest and make it the current commit point.
    pub fn publish(&self, storage: &dyn Storage) -> Result<()> {
        let final_name = self.file_name();
        let temp_name = format!("{final_name}{TEMP_SUFFIX}");
        let json = serde_json::to_vec_pretty(self)?;

        let mut output = storage.create_output(&temp_name)?;
        let written = output
            .write_all(&json)
            .map_err(QuarryError::from)
            .and_then(|_| output.close());
        if let Err(e) = written {
            let _ = storage.delete_file(&temp_name);
            return Err(e);
        }
        if let Err(e) = storage.rename(&temp_name, &final_name) {
            let _ = storage.delete_file(&temp_name);
            return Err(e);
        }
        storage.sync()?;
        debug!(
            "published {final_name} with {} segments",
            self.segments.len()
        );
        Ok(())
    }

    fn read(storage: &dyn Storage, name: &str) -> Result<Manifest> {
        let bytes = storage.open_input(name)?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(QuarryError::index(format!(
                "{name} has unsupported format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    /// Find the newest usable manifest, or an empty one for a fresh index.
    ///
    /// A manifest that is not valid JSON, or that references missing files,
    /// is left over from a failed commit and skipped. Any other failure,
    /// such as an I/O error or an unsupported format version, is returned
    /// so that the index is not mistaken for an older or empty one.
    pub fn load_latest(storage: &dyn Storage) -> Result<Manifest> {
        let mut generations: Vec<u64> = storage
            .list_files()?
            .iter()
            .filter_map(|name| parse_generation(name))
            .collect();
        generations.sort_unstable_by(|a, b| b.cmp(a));

        for generation in generations {
            let name = manifest_file_name(generation);
            match Manifest::read(storage, &name) {
                Ok(manifest) => {
                    let missing: Vec<String> = manifest
                        .referenced_files()
                        .into_iter()
                        .filter(|f| !storage.file_exists(f))
                        .collect();
                    if missing.is_empty() {
                        return Ok(manifest);
                    }
                    warn!("skipping {name}: missing files {missing:?}");
                }
                Err(e @ (QuarryError::Serialization(_) | QuarryError::NotFound(_))) => {
                    warn!("skipping unreadable {name}: {e}")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Manifest::default())
    }

    /// Whether `name` was written by a commit after this one.
    fn belongs_to_newer(&self, name: &str) -> bool {
        if let Some(generation) = parse_generation(name) {
            return generation > self.generation;
        }
        if let Some(generation) = parse_deletion_generation(name) {
            if generation > self.generation {
                return true;
            }
        }
        parse_segment_number(name).is_some_and(|segment| segment >= self.next_segment)
    }

    /// Delete index files not referenced by this manifest.
    ///
    /// Only names this crate produces are touched. While a newer manifest
    /// exists on disk, files of newer commits are kept. Failures are logged
    /// and left for the next cleanup.
    pub fn remove_unreferenced(&self, storage: &dyn Storage) -> Result<Vec<String>> {
        let referenced = self.referenced_files();
        let keep_newer = StoredNumbers::scan(storage)?.newest_generation > self.generation;
        let mut removed = Vec::new();
        for name in storage.list_files()? {
            let ours = name.starts_with(SEGMENT_PREFIX) || name.starts_with(MANIFEST_PREFIX);
            if !ours || referenced.contains(&name) {
                continue;
            }
            let temporary = name.ends_with(TEMP_SUFFIX);
            if keep_newer && !temporary && self.belongs_to_newer(&name) {
                continue;
            }
            match storage.delete_file(&name) {
                Ok(()) => removed.push(name),
                Err(e) => warn!("failed to remove stale file {name}: {e}"),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn touch(storage: &MemoryStorage, name: &str) {
        let mut out = storage.create_output(name).unwrap();
        out.write_all(b"x").unwrap();
        out.close().unwrap();
    }

    fn segment(name: &str) -> SegmentMeta {
        SegmentMeta {
            name: name.to_string(),
            doc_count: 4,
            deletion_generation: 0,
            deleted_count: 0,
        }
    }

    fn touch_segment(storage: &MemoryStorage, meta: &SegmentMeta) {
        for file in meta.files() {
            touch(storage, &file);
        }
    }

    #[test]
    fn test_fresh_storage_has_empty_manifest() {
        let storage = MemoryStorage::new();
        let manifest = Manifest::load_latest(&storage).unwrap();
        assert_eq!(manifest, Manifest::default());
        assert!(manifest.referenced_files().is_empty());
    }

    #[test]
    fn test_publish_and_load() {
        let storage = MemoryStorage::new();
        let seg = segment("seg_000001");
        touch_segment(&storage, &seg);

        let manifest = Manifest {
            generation: 1,
            next_segment: 2,
            segments: vec![seg],
            ..Manifest::default()
        };
        manifest.publish(&storage).unwrap();
        assert!(storage.file_exists("segments_1.json"));
        assert!(!storage.file_exists("segments_1.json.tmp"));

        assert_eq!(Manifest::load_latest(&storage).unwrap(), manifest);
    }

    #[test]
    fn test_recovery_skips_broken_manifests_and_cleans_up() {
        let storage = MemoryStorage::new();
        let seg1 = segment("seg_000001");
        touch_segment(&storage, &seg1);
        let good = Manifest {
            generation: 1,
            next_segment: 2,
            segments: vec![seg1],
            ..Manifest::default()
        };
        good.publish(&storage).unwrap();

        // A crashed commit: segment 2 only half written, manifest 2 still
        // under its temporary name, manifest 3 truncated.
        touch(&storage, "seg_000002.post");
        touch(&storage, "segments_2.json.tmp");
        touch(&storage, "segments_3.json");
        touch(&storage, "unrelated.txt");

        let recovered = Manifest::load_latest(&storage).unwrap();
        assert_eq!(recovered, good);

        // Manifest 3 exists, so files of commits after 1 are kept for now.
        let removed = recovered.remove_unreferenced(&storage).unwrap();
        assert_eq!(removed, vec!["segments_2.json.tmp"]);
        assert!(storage.file_exists("seg_000002.post"));
        assert!(storage.file_exists("segments_3.json"));
        assert!(storage.file_exists("unrelated.txt"));
        assert!(storage.file_exists("seg_000001.dict"));

        // A later commit supersedes them.
        let seg4 = segment("seg_000004");
        touch_segment(&storage, &seg4);
        let later = Manifest {
            generation: 4,
            next_segment: 5,
            segments: vec![segment("seg_000001"), seg4],
            ..Manifest::default()
        };
        later.publish(&storage).unwrap();
        let mut removed = later.remove_unreferenced(&storage).unwrap();
        removed.sort();
        assert_eq!(
            removed,
            vec!["seg_000002.post", "segments_1.json", "segments_3.json"]
        );
    }

    #[test]
    fn test_unsupported_version_is_an_error() {
        let storage = MemoryStorage::new();
        let seg1 = segment("seg_000001");
        touch_segment(&storage, &seg1);
        let manifest = Manifest {
            format_version: FORMAT_VERSION + 1,
            generation: 1,
            next_segment: 2,
            segments: vec![seg1],
        };
        manifest.publish(&storage).unwrap();

        assert!(matches!(
            Manifest::load_latest(&storage),
            Err(QuarryError::Index(_))
        ));
        assert!(storage.file_exists("segments_1.json"));
        assert!(storage.file_exists("seg_000001.post"));
    }

    #[test]
    fn test_stored_numbers() {
        let storage = MemoryStorage::new();
        assert_eq!(StoredNumbers::scan(&storage).unwrap(), StoredNumbers::default());

        touch(&storage, "seg_000007.post");
        touch(&storage, "seg_000003_12.del");
        touch(&storage, "segments_5.json");
        touch(&storage, "segments_9.json.tmp");
        assert_eq!(
            StoredNumbers::scan(&storage).unwrap(),
            StoredNumbers {
                newest_generation: 5,
                next_segment: 8,
            }
        );
    }

    #[test]
    fn test_manifest_with_missing_segment_is_skipped() {
        let storage = MemoryStorage::new();
        let seg1 = segment("seg_000001");
        touch_segment(&storage, &seg1);
        let first = Manifest {
            generation: 1,
            next_segment: 2,
            segments: vec![seg1.clone()],
            ..Manifest::default()
        };
        first.publish(&storage).unwrap();

        let second = Manifest {
            generation: 2,
            next_segment: 3,
            segments: vec![seg1, segment("seg_000002")],
            ..Manifest::default()
        };
        second.publish(&storage).unwrap();

        assert_eq!(Manifest::load_latest(&storage).unwrap(), first);
    }
}
