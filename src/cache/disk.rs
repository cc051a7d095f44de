//! Disk-backed cache storage
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<hex(cache name)>/<sha256(key)>.json                entry metadata
//! <root>/<hex(cache name)>/<sha256(key)>-<sha256(body)>.body  response body
//! ```
//!
//! Bodies are named by their content and never rewritten in place. Both
//! files are written to a temporary name and renamed into position, body
//! first, so a reader always sees a metadata file paired with the body it
//! names. The previous body is removed only after the metadata swap.

use crate::cache::{CacheStorage, CachedResponse, NamedCache};
use crate::error::{ShelfError, ShelfResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// Hex chars of the body digest used in body file names
const BODY_DIGEST_LEN: usize = 16;

/// Times a read retries when its body was replaced under it
const READ_ATTEMPTS: usize = 3;

/// Storage rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    /// Serializes entry writes across every cache opened from this storage
    writes: Arc<Mutex<()>>,
}

impl DiskStorage {
    /// Open storage rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> ShelfResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            ShelfError::io(format!("creating cache root {}", root.display()), e)
        })?;
        Ok(Self {
            root,
            writes: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> ShelfResult<Arc<dyn NamedCache>> {
        let dir = self.cache_dir(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ShelfError::io(format!("creating cache {}", name), e))?;

        Ok(Arc::new(DiskCache {
            name: name.to_string(),
            dir,
            writes: self.writes.clone(),
        }))
    }

    async fn has(&self, name: &str) -> ShelfResult<bool> {
        fs::try_exists(self.cache_dir(name))
            .await
            .map_err(|e| ShelfError::io(format!("checking cache {}", name), e))
    }

    async fn delete(&self, name: &str) -> ShelfResult<bool> {
        match fs::remove_dir_all(self.cache_dir(name)).await {
            Ok(()) => {
                debug!("Deleted cache directory for {}", name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ShelfError::io(format!("deleting cache {}", name), e)),
        }
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| ShelfError::io("reading cache root", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShelfError::io("reading cache root entry", e))?
        {
            let file_name = entry.file_name();
            let decoded = file_name
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());

            match decoded {
                Some(name) => names.push(name),
                None => warn!("Ignoring foreign entry in cache root: {:?}", file_name),
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Metadata persisted next to each body file
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// File name of the body within the cache directory
    body: String,
    stored_at: DateTime<Utc>,
}

/// One named cache directory
#[derive(Debug)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
    writes: Arc<Mutex<()>>,
}

impl DiskCache {
    fn key_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::key_stem(key), META_EXT))
    }

    fn body_name(key: &str, body: &[u8]) -> String {
        let digest = hex::encode(Sha256::digest(body));
        format!("{}-{}.{}", Self::key_stem(key), &digest[..BODY_DIGEST_LEN], BODY_EXT)
    }

    async fn read_meta(path: &Path) -> ShelfResult<Option<EntryMeta>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShelfError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Write `contents` to a temporary sibling, then rename it over `path`
    async fn write_atomic(&self, key: &str, path: &Path, contents: &[u8]) -> ShelfResult<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, contents)
            .await
            .map_err(|e| ShelfError::cache_write(&self.name, key, e))?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ShelfError::cache_write(&self.name, key, e));
        }
        Ok(())
    }

    async fn remove_body(&self, name: &str) {
        let path = self.dir.join(name);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Orphaned body file {}: {}", path.display(), e);
            }
        }
    }
}

#[async_trait]
impl NamedCache for DiskCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> ShelfResult<Option<CachedResponse>> {
        let meta_path = self.meta_path(key);

        for _ in 0..READ_ATTEMPTS {
            let Some(meta) = Self::read_meta(&meta_path).await? else {
                return Ok(None);
            };

            let body_path = self.dir.join(&meta.body);
            match fs::read(&body_path).await {
                Ok(body) => {
                    return Ok(Some(
                        CachedResponse::new(meta.status, body).with_headers(meta.headers),
                    ))
                }
                // Replaced or deleted since the metadata was read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ShelfError::io(format!("reading {}", body_path.display()), e))
                }
            }
        }

        debug!("Entry {} in {} kept changing, treating as absent", key, self.name);
        Ok(None)
    }

    async fn put(&self, key: &str, response: CachedResponse) -> ShelfResult<()> {
        let _guard = self.writes.lock().await;
        let meta_path = self.meta_path(key);

        // A deleted cache is not resurrected by late writers
        if !fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Err(ShelfError::cache_write(&self.name, key, "cache was deleted"));
        }

        let previous = match Self::read_meta(&meta_path).await {
            Ok(meta) => meta.map(|m| m.body),
            Err(e) => {
                warn!("Overwriting unreadable entry {} in {}: {}", key, self.name, e);
                None
            }
        };

        let body_name = Self::body_name(key, response.body());
        self.write_atomic(key, &self.dir.join(&body_name), response.body()).await?;

        let meta = EntryMeta {
            key: key.to_string(),
            status: response.status(),
            headers: response.headers().to_vec(),
            body: body_name.clone(),
            stored_at: Utc::now(),
        };
        self.write_atomic(key, &meta_path, &serde_json::to_vec(&meta)?).await?;

        if let Some(old) = previous.filter(|old| *old != body_name) {
            self.remove_body(&old).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> ShelfResult<bool> {
        let _guard = self.writes.lock().await;
        let meta_path = self.meta_path(key);
        let meta = Self::read_meta(&meta_path).await.ok().flatten();

        match fs::remove_file(&meta_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(ShelfError::io(format!("deleting {}", meta_path.display()), e))
            }
        }

        if let Some(meta) = meta {
            self.remove_body(&meta.body).await;
        }
        Ok(true)
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(ShelfError::io(format!("listing cache {}", self.name), e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShelfError::io(format!("listing cache {}", self.name), e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == META_EXT) {
                if let Some(meta) = Self::read_meta(&path).await? {
                    keys.push(meta.key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
