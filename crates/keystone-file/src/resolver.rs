//! File resolver: change detection, staging and the atomic rename.
//!
//! The resolver occupies four slots of a file backend: on the get side it
//! reports whether the file changed since the last read; on the set side
//! it stages writes into a sibling `.tmp` file, detects concurrent
//! modification, commits by renaming the temp file over the real one,
//! and cleans the temp file up on rollback.

use keystone_core::{Key, KeySet, KeystoneError, Plugin, Result, SyncVerdict, UpdateVerdict};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification-time plus size signature of the storage file. `None`
/// means the file does not exist.
type FileSignature = Option<(SystemTime, u64)>;

fn signature(path: &Path) -> io::Result<FileSignature> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some((meta.modified()?, meta.len()))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct FileResolver {
    file_path: PathBuf,
    temp_path: PathBuf,
    resolved: bool,
    seen: FileSignature,
}

impl FileResolver {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let mut temp_name = file_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = file_path.with_file_name(temp_name);
        Self {
            file_path,
            temp_path,
            resolved: false,
            seen: None,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn path_string(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }
}

impl Plugin for FileResolver {
    fn name(&self) -> &str {
        "file-resolver"
    }

    /// Report whether the file changed since the last read. The first
    /// call after construction always reports a change so the initial
    /// read loads the file.
    fn get(&mut self, _keyset: &mut KeySet, parent: &mut Key) -> Result<UpdateVerdict> {
        parent.set_string(Self::path_string(&self.file_path));
        let current = signature(&self.file_path)?;
        if self.resolved && current == self.seen {
            return Ok(UpdateVerdict::Unchanged);
        }
        self.resolved = true;
        self.seen = current;
        Ok(UpdateVerdict::Changed)
    }

    /// Detect concurrent modification and stage the write: the parent's
    /// value is pointed at the temp file for the storage plugin to write
    /// into. Nothing durable happens here.
    fn set(&mut self, _keyset: &mut KeySet, parent: &mut Key) -> Result<SyncVerdict> {
        let current = signature(&self.file_path)?;
        if current != self.seen {
            return Err(KeystoneError::Other(anyhow::anyhow!(
                "\"{}\" was modified since it was last read",
                self.file_path.display()
            )));
        }
        parent.set_string(Self::path_string(&self.temp_path));
        Ok(SyncVerdict::NeedsSync)
    }

    /// The atomic step: rename the staged temp file over the real one
    /// and refresh the remembered signature.
    fn commit(&mut self, _keyset: &mut KeySet, parent: &mut Key) -> Result<()> {
        fs::rename(&self.temp_path, &self.file_path)?;
        self.seen = signature(&self.file_path)?;
        self.resolved = true;
        parent.set_string(Self::path_string(&self.file_path));
        tracing::debug!(file = %self.file_path.display(), "committed");
        Ok(())
    }

    /// Remove the staged temp file, if any.
    fn error(&mut self, _keyset: &mut KeySet, parent: &mut Key) -> Result<()> {
        parent.set_string(Self::path_string(&self.file_path));
        match fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
