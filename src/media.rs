//! Content-addressed media storage
//!
//! Stores uploaded images and attachments under a local directory using
//! SHA-256 hashes as filenames, and hands back a stable `media://` URL to
//! attach to a taxonomy node or business record. The engine never interprets
//! file contents; hosted object storage plugs in behind the same trait.
//!
//! Media files are never deleted when a node or business goes away: storage
//! is content-addressed and the same bytes may back several references.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::CatalogError;

/// URL scheme for stored media
pub const MEDIA_URL_SCHEME: &str = "media://";

/// The single capability the engine consumes from object storage.
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a caller-chosen path hint, returning a stable URL.
    fn store(&self, data: &[u8], path: &str) -> Result<String, CatalogError>;
}

/// Result of storing a media object
#[derive(Debug, Clone)]
pub struct StoreResult {
    /// SHA-256 hash of the object
    pub hash: String,
    /// Stable URL for attaching to nodes and records
    pub url: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether identical bytes were already stored
    pub already_existed: bool,
}

/// Filesystem-backed media store
pub struct MediaStore {
    /// Root directory for media storage
    root_dir: PathBuf,
}

impl MediaStore {
    /// Create a media store at the given directory
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, CatalogError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;

        info!(path = %root_dir.display(), "Initialized media store");

        Ok(Self { root_dir })
    }

    /// Compute SHA-256 hash of data
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        format!("sha256-{}", hex::encode(result))
    }

    /// Get path for an object by hash
    fn object_path(&self, hash: &str) -> PathBuf {
        // First 4 hash chars as a subdirectory for filesystem distribution
        let hash_part = hash.strip_prefix("sha256-").unwrap_or(hash);
        let subdir = &hash_part[..4.min(hash_part.len())];
        self.root_dir.join("objects").join(subdir).join(hash)
    }

    /// Store media bytes, returning the full result
    pub fn store_bytes(&self, data: &[u8], path: &str) -> Result<StoreResult, CatalogError> {
        let hash = Self::compute_hash(data);
        let file_name = sanitize_file_name(path);
        let url = format!("{}{}/{}", MEDIA_URL_SCHEME, hash, file_name);
        let object_path = self.object_path(&hash);

        if object_path.exists() {
            debug!(hash = %hash, "Media object already exists");
            return Ok(StoreResult {
                hash,
                url,
                size_bytes: data.len() as u64,
                already_existed: true,
            });
        }

        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&object_path, data)?;

        info!(hash = %hash, size = data.len(), "Stored media object");

        Ok(StoreResult {
            hash,
            url,
            size_bytes: data.len() as u64,
            already_existed: false,
        })
    }

    /// Retrieve media bytes by URL
    pub fn get(&self, url: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let Some(hash) = parse_media_url(url) else {
            return Ok(None);
        };
        let path = self.object_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    /// Check whether a media URL resolves to a stored object
    pub fn exists(&self, url: &str) -> bool {
        parse_media_url(url)
            .map(|hash| self.object_path(hash).exists())
            .unwrap_or(false)
    }
}

impl ObjectStore for MediaStore {
    fn store(&self, data: &[u8], path: &str) -> Result<String, CatalogError> {
        Ok(self.store_bytes(data, path)?.url)
    }
}

/// Parse a media URL to extract the object hash.
pub fn parse_media_url(url: &str) -> Option<&str> {
    let rest = url.strip_prefix(MEDIA_URL_SCHEME)?;
    let hash = rest.split('/').next()?;
    if hash.is_empty() {
        None
    } else {
        Some(hash)
    }
}

/// Keep only the final path segment and strip characters that do not belong
/// in a URL tail.
fn sanitize_file_name(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
