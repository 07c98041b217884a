use std::fs;
use std::io::{self, ErrorKind as IoErrorKind, Read};
use std::path::Path;

use filetime::FileTime;
use log::{info, warn};
use tempfile::NamedTempFile;

use super::DrivePath;
use crate::error::{Error, Result};
use crate::object::{is_dir, modified_date, RemoteObject};
use crate::store::{Query, RemoteStore};

impl<S: RemoteStore> DrivePath<S> {
    /// Returns the objects under `path` matching `filter` (Google Drive query
    /// syntax). Without a filter, trashed objects are left out. A file at
    /// `path` is an error.
    pub fn list_dir(&self, path: &str, filter: Option<&str>) -> Result<Vec<RemoteObject>> {
        let dir = self.stat(path)?;
        let ctx = |e: Error| e.context(format!("listing \"{path}\""));
        if !is_dir(&dir) {
            return Err(ctx(Error::NotADirectory(format!(
                "\"{}\" is a file",
                dir.title
            ))));
        }

        let query = match filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(filter) => Query::parse(filter),
            None => Query::new().not_trashed(),
        };
        let children = self.store.list_children(&dir.id, &query).map_err(ctx)?;

        children
            .iter()
            .map(|child| self.store.get_object(&child.id).map_err(ctx))
            .collect()
    }

    /// Opens the contents of the file at `path` for reading.
    pub fn download(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let object = self.stat(path)?;
        self.open(path, &object)
    }

    /// Downloads the file at `path` into `local`, replacing it if it exists.
    /// The data goes to a temporary file next to `local` which is then
    /// renamed over it, and the local modification time is set to the
    /// remote one. Returns the number of bytes written.
    pub fn download_to_file(&self, path: &str, local: impl AsRef<Path>) -> Result<u64> {
        let local = local.as_ref();
        if local.as_os_str().is_empty() {
            return Err(Error::Invalid("download: empty local file".into()));
        }
        match fs::metadata(local) {
            Ok(m) if !m.is_file() => {
                return Err(Error::Invalid(format!(
                    "download: local file \"{}\" exists and is not a regular file",
                    local.display()
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let object = self.stat(path)?;
        let mut reader = self.open(path, &object)?;

        let dir = match local.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        let written = io::copy(&mut reader, &mut tmp)?;
        tmp.persist(local).map_err(|e| Error::Io(e.error))?;

        match modified_date(&object) {
            Ok(modified) => {
                let mtime = FileTime::from_unix_time(modified.timestamp(), 0);
                filetime::set_file_mtime(local, mtime)?;
            }
            Err(e) => warn!("download {}: keeping local mtime: {}", path, e),
        }

        info!("download {} -> {} ({} bytes)", path, local.display(), written);
        Ok(written)
    }

    fn open(&self, path: &str, object: &RemoteObject) -> Result<Box<dyn Read + Send>> {
        if is_dir(object) {
            return Err(Error::IsADirectory(format!("download: \"{path}\" is a directory")));
        }
        if object.download_url.is_none() {
            return Err(Error::Invalid(format!(
                "download: \"{path}\" is not downloadable (no body?)"
            )));
        }
        self.store
            .open_content(object)
            .map_err(|e| e.context(format!("download \"{path}\"")))
    }
}
