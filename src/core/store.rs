//! Per-fingerprint artifact directories.
//!
//! Layout of `<root>/<fingerprint>/`:
//! - `teaser_content.json`, `audio.<ext>`, `video.<ext>`, `final.<ext>`
//! - `metadata.json`: run parameters, force flags, provider per stage
//! - `events.jsonl`: append-only run events
//!
//! Artifacts are always written to a temporary sibling and renamed into place,
//! so a half-written file is never visible under its canonical name. Store
//! operations are not locked against a second writer of the same artifact;
//! callers serialize same-fingerprint work through the run registry.

use std::fs::File as StdFile;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::artifact::{EVENTS_FILE, LOCK_FILE, METADATA_FILE};
use crate::domain::{Event, Fingerprint, RunMetadata, Stage};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Prefix of in-progress files inside a fingerprint directory
pub const STAGING_PREFIX: &str = ".partial-";

/// File-based artifact cache keyed by fingerprint
pub struct ArtifactStore {
    root: PathBuf,
    audio_ext: String,
    video_ext: String,

    /// Serializes event appends from concurrent stages
    events_lock: Mutex<()>,

    /// Serializes metadata read-modify-write from concurrent stages
    metadata_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, audio_ext: &str, video_ext: &str) -> Self {
        Self {
            root: root.into(),
            audio_ext: audio_ext.to_string(),
            video_ext: video_ext.to_string(),
            events_lock: Mutex::new(()),
            metadata_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a fingerprint (not created)
    pub fn dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Directory of a fingerprint, created on first use
    pub async fn resolve(&self, fingerprint: &Fingerprint) -> StoreResult<PathBuf> {
        let dir = self.dir(fingerprint);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        Ok(dir)
    }

    /// Canonical path of a stage artifact
    pub fn path(&self, fingerprint: &Fingerprint, stage: Stage) -> PathBuf {
        self.dir(fingerprint)
            .join(stage.file_name(&self.audio_ext, &self.video_ext))
    }

    /// Whether a valid artifact exists: present and larger than the stage floor
    pub async fn has(&self, fingerprint: &Fingerprint, stage: Stage) -> bool {
        match fs::metadata(self.path(fingerprint, stage)).await {
            Ok(meta) => meta.is_file() && meta.len() > stage.size_floor(),
            Err(_) => false,
        }
    }

    /// Atomically replace a stage artifact with `data`
    pub async fn write(
        &self,
        fingerprint: &Fingerprint,
        stage: Stage,
        data: &[u8],
    ) -> StoreResult<PathBuf> {
        let staged = self.staging_path(fingerprint, stage).await?;
        if let Err(e) = fs::write(&staged, data).await {
            let _ = fs::remove_file(&staged).await;
            return Err(StoreError::io(&staged, e));
        }
        self.commit(fingerprint, stage, &staged).await
    }

    /// Fresh temporary path next to a stage artifact.
    ///
    /// The name keeps the artifact's extension so tools that infer the
    /// container from it (ffmpeg) can write here directly. Providers write
    /// here and then call [`commit`](Self::commit).
    pub async fn staging_path(
        &self,
        fingerprint: &Fingerprint,
        stage: Stage,
    ) -> StoreResult<PathBuf> {
        let dir = self.resolve(fingerprint).await?;
        let name = stage.file_name(&self.audio_ext, &self.video_ext);
        Ok(dir.join(format!("{}{}-{}", STAGING_PREFIX, Uuid::new_v4().simple(), name)))
    }

    /// Rename a staged file into the canonical artifact path
    pub async fn commit(
        &self,
        fingerprint: &Fingerprint,
        stage: Stage,
        staged: &Path,
    ) -> StoreResult<PathBuf> {
        let target = self.path(fingerprint, stage);
        fs::rename(staged, &target)
            .await
            .map_err(|e| StoreError::io(&target, e))?;
        debug!(path = %target.display(), %stage, "Artifact committed");
        Ok(target)
    }

    /// Read a stage artifact
    pub async fn read(&self, fingerprint: &Fingerprint, stage: Stage) -> StoreResult<Vec<u8>> {
        let path = self.path(fingerprint, stage);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound { path })
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Load `metadata.json`, or a fresh record if none exists yet
    pub async fn read_metadata(&self, fingerprint: &Fingerprint) -> StoreResult<RunMetadata> {
        let path = self.dir(fingerprint).join(METADATA_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(RunMetadata::new(fingerprint.as_str()))
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Read-modify-write `metadata.json`.
    ///
    /// The file is only rewritten when `update` actually changed it.
    /// Returns whether a write happened.
    pub async fn update_metadata<F>(&self, fingerprint: &Fingerprint, update: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut RunMetadata),
    {
        let _guard = self.metadata_lock.lock().await;
        let current = self.read_metadata(fingerprint).await?;
        let mut next = current.clone();
        update(&mut next);
        if next == current && fs::try_exists(self.dir(fingerprint).join(METADATA_FILE)).await.unwrap_or(false) {
            return Ok(false);
        }

        let dir = self.resolve(fingerprint).await?;
        let path = dir.join(METADATA_FILE);
        let staged = dir.join(format!("{}{}-{}", STAGING_PREFIX, Uuid::new_v4().simple(), METADATA_FILE));
        let json = serde_json::to_vec_pretty(&next)?;
        fs::write(&staged, json)
            .await
            .map_err(|e| StoreError::io(&staged, e))?;
        fs::rename(&staged, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(true)
    }

    /// Append an event to the fingerprint's log
    pub async fn append_event(&self, event: &Event) -> StoreResult<()> {
        let _guard = self.events_lock.lock().await;
        let dir = self.resolve(&event.fingerprint).await?;
        let path = dir.join(EVENTS_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&path, e))?;

        Ok(())
    }

    /// Replay all events of a fingerprint in order
    pub async fn replay(&self, fingerprint: &Fingerprint) -> StoreResult<Vec<Event>> {
        let path = self.dir(fingerprint).join(EVENTS_FILE);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }

        Ok(events)
    }

    /// All fingerprints with a directory under the root
    pub async fn list_fingerprints(&self) -> StoreResult<Vec<Fingerprint>> {
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            if let Some(fp) = entry.file_name().to_str().and_then(Fingerprint::parse) {
                found.push(fp);
            }
        }

        found.sort();
        Ok(found)
    }

    /// Take the cross-process advisory lock of a fingerprint directory.
    ///
    /// Blocks (off the async worker) until the lock is free.
    pub async fn lock(&self, fingerprint: &Fingerprint) -> StoreResult<DirLock> {
        let dir = self.resolve(fingerprint).await?;
        let path = dir.join(LOCK_FILE);

        let file = tokio::task::spawn_blocking({
            let path = path.clone();
            move || -> std::io::Result<StdFile> {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)?;
                file.lock_exclusive()?;
                Ok(file)
            }
        })
        .await
        .map_err(|e| StoreError::Lock {
            path: path.clone(),
            reason: e.to_string(),
        })?
        .map_err(|e| StoreError::Lock {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        Ok(DirLock { file, path })
    }
}

/// Held advisory lock on a fingerprint directory; released on drop
#[derive(Debug)]
pub struct DirLock {
    file: StdFile,
    path: PathBuf,
}

impl DirLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
