use crate::exif_reader::read_exif_fields;
use chrono::{DateTime, Local, TimeZone};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

const BLOCK_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeAttr {
    Modified,
    Changed,
    Birth,
    Accessed,
    Now,
}

impl TimeAttr {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "mtime" => Some(TimeAttr::Modified),
            "ctime" => Some(TimeAttr::Changed),
            "btime" => Some(TimeAttr::Birth),
            "atime" => Some(TimeAttr::Accessed),
            "now" => Some(TimeAttr::Now),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sha224" => Some(HashAlgorithm::Sha224),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha512" => Some(HashAlgorithm::Sha512),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }
}

pub trait MetadataProvider {
    fn file_time(&self, path: &Path, attr: TimeAttr) -> Option<DateTime<Local>>;

    fn file_size(&self, path: &Path) -> Option<u64>;

    fn exif(&self, path: &Path, attr: &str) -> Option<String>;

    fn exiftool(&self, _path: &Path, _tag: &str) -> Option<String> {
        None
    }

    fn id3(&self, _path: &Path, _tag: &str) -> Option<String> {
        None
    }

    fn hash(&self, path: &Path, algorithm: HashAlgorithm) -> io::Result<String>;
}

#[derive(Debug, Default)]
pub struct FsMetadata {
    exif_cache: RefCell<HashMap<PathBuf, HashMap<String, String>>>,
    hash_cache: RefCell<HashMap<(PathBuf, HashAlgorithm), String>>,
}

impl FsMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefetch_hashes(&self, paths: &[PathBuf], algorithms: &[HashAlgorithm]) -> usize {
        let jobs: Vec<(PathBuf, HashAlgorithm)> = {
            let cache = self.hash_cache.borrow();
            paths
                .iter()
                .filter(|path| path.is_file())
                .flat_map(|path| algorithms.iter().map(move |alg| (path.clone(), *alg)))
                .filter(|key| !cache.contains_key(key))
                .collect()
        };

        let computed: Vec<((PathBuf, HashAlgorithm), String)> = jobs
            .into_par_iter()
            .filter_map(|(path, alg)| {
                let digest = hash_file(&path, alg).ok()?;
                Some(((path, alg), digest))
            })
            .collect();

        let count = computed.len();
        self.hash_cache.borrow_mut().extend(computed);
        debug!("prefetched {} hashes", count);
        count
    }
}

impl MetadataProvider for FsMetadata {
    fn file_time(&self, path: &Path, attr: TimeAttr) -> Option<DateTime<Local>> {
        let meta = fs::symlink_metadata(path).ok()?;
        match attr {
            TimeAttr::Modified => meta.modified().ok().map(DateTime::from),
            TimeAttr::Accessed => meta.accessed().ok().map(DateTime::from),
            TimeAttr::Birth => meta.created().ok().map(DateTime::from),
            TimeAttr::Changed => changed_time(&meta),
            TimeAttr::Now => Some(Local::now()),
        }
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        fs::symlink_metadata(path).ok().map(|meta| meta.len())
    }

    fn exif(&self, path: &Path, attr: &str) -> Option<String> {
        let mut cache = self.exif_cache.borrow_mut();
        let fields = cache
            .entry(path.to_path_buf())
            .or_insert_with(|| read_exif_fields(path).unwrap_or_default());
        fields.get(&attr.to_ascii_lowercase()).cloned()
    }

    fn hash(&self, path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
        let key = (path.to_path_buf(), algorithm);
        if let Some(hit) = self.hash_cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let digest = hash_file(path, algorithm)?;
        self.hash_cache.borrow_mut().insert(key, digest.clone());
        Ok(digest)
    }
}

#[cfg(unix)]
fn changed_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    use std::os::unix::fs::MetadataExt;
    Local
        .timestamp_opt(meta.ctime(), meta.ctime_nsec().clamp(0, 999_999_999) as u32)
        .single()
}

#[cfg(not(unix))]
fn changed_time(meta: &fs::Metadata) -> Option<DateTime<Local>> {
    meta.modified().ok().map(DateTime::from)
}

pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut reader = File::open(path)?;
    let mut buffer = vec![0u8; BLOCK_LEN].into_boxed_slice();
    match algorithm {
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            stream(&mut reader, &mut buffer, |chunk| {
                hasher.update(chunk);
            })?;
            Ok(hasher.finalize().to_hex().to_string())
        }
        HashAlgorithm::Sha224 => digest_hex::<Sha224>(&mut reader, &mut buffer),
        HashAlgorithm::Sha256 => digest_hex::<Sha256>(&mut reader, &mut buffer),
        HashAlgorithm::Sha384 => digest_hex::<Sha384>(&mut reader, &mut buffer),
        HashAlgorithm::Sha512 => digest_hex::<Sha512>(&mut reader, &mut buffer),
    }
}

fn digest_hex<D: Digest>(reader: &mut File, buffer: &mut [u8]) -> io::Result<String> {
    let mut hasher = D::new();
    stream(reader, buffer, |chunk| hasher.update(chunk))?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

fn stream(reader: &mut File, buffer: &mut [u8], mut sink: impl FnMut(&[u8])) -> io::Result<()> {
    loop {
        let read_count = reader.read(buffer)?;
        if read_count == 0 {
            return Ok(());
        }
        sink(&buffer[..read_count]);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Default)]
    pub struct StaticMetadata {
        pub exif: HashMap<String, String>,
        pub times: HashMap<PathBuf, DateTime<Local>>,
        pub sizes: HashMap<PathBuf, u64>,
    }

    impl MetadataProvider for StaticMetadata {
        fn file_time(&self, path: &Path, _attr: TimeAttr) -> Option<DateTime<Local>> {
            self.times.get(path).copied()
        }

        fn file_size(&self, path: &Path) -> Option<u64> {
            self.sizes.get(path).copied()
        }

        fn exif(&self, _path: &Path, attr: &str) -> Option<String> {
            self.exif.get(attr).cloned()
        }

        fn hash(&self, path: &Path, _algorithm: HashAlgorithm) -> io::Result<String> {
            Ok(format!("hash-of-{}", path.display()))
        }
    }

    #[test]
    fn hashes_known_content() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("abc.txt");
        fs::write(&path, b"abc").expect("write file");

        let provider = FsMetadata::new();
        assert_eq!(
            provider
                .hash(&path, HashAlgorithm::Sha256)
                .expect("hash must succeed"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            provider
                .hash(&path, HashAlgorithm::Blake3)
                .expect("hash must succeed"),
            blake3::hash(b"abc").to_hex().to_string()
        );
    }

    #[test]
    fn prefetch_fills_cache_and_skips_missing_files() {
        let temp = tempdir().expect("tempdir");
        let present = temp.path().join("a.bin");
        fs::write(&present, b"data").expect("write file");
        let missing = temp.path().join("missing.bin");

        let provider = FsMetadata::new();
        let count = provider.prefetch_hashes(
            &[present.clone(), missing.clone()],
            &[HashAlgorithm::Sha512, HashAlgorithm::Blake3],
        );
        assert_eq!(count, 2);
        assert!(provider.hash(&missing, HashAlgorithm::Sha512).is_err());
    }

    #[test]
    fn missing_exif_is_not_available() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("plain.txt");
        fs::write(&path, b"no exif here").expect("write file");

        let provider = FsMetadata::new();
        assert_eq!(provider.exif(&path, "make"), None);
        assert!(provider.file_time(&path, TimeAttr::Modified).is_some());
        assert_eq!(provider.file_size(&path), Some(12));
    }
}
