use std::path::{Component, Path};
use std::time::SystemTime;

use chrono::{DateTime, SubsecRound, Utc};
use log::{info, warn};
use walkdir::WalkDir;

use crate::drive_path::DrivePath;
use crate::error::{Error, Result};
use crate::object::{is_dir, modified_date};
use crate::path::{join, split_path};
use crate::store::RemoteStore;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Upload straight to the destination instead of going through the
    /// temporary folder.
    pub in_place: bool,
}

#[derive(Debug, Default)]
pub struct SyncResult {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub directories_created: usize,
    pub errors: Vec<String>,
}

/// Mirrors a local directory tree into a remote directory, uploading files
/// whose local copy is newer than the remote one.
pub struct TreeSyncer<'a, S: RemoteStore> {
    drive: &'a DrivePath<S>,
}

impl<'a, S: RemoteStore> TreeSyncer<'a, S> {
    pub fn new(drive: &'a DrivePath<S>) -> Self {
        Self { drive }
    }

    pub fn sync(
        &self,
        local_root: &Path,
        remote_root: &str,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::default();

        if !local_root.is_dir() {
            return Err(Error::Invalid(format!(
                "sync: \"{}\" is not a directory",
                local_root.display()
            )));
        }

        let remote_root = split_path(remote_root).canonical;
        if !remote_root.is_empty() {
            self.ensure_directory(&remote_root, options, &mut result)?;
        }

        for entry in WalkDir::new(local_root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    result.errors.push(format!("Error walking {}: {}", local_root.display(), e));
                    continue;
                }
            };
            log::debug!("Processing entry: {}", entry.path().display());

            let relative = match entry.path().strip_prefix(local_root) {
                Ok(r) => r,
                Err(e) => {
                    result.errors.push(format!(
                        "Error resolving {}: {}",
                        entry.path().display(),
                        e
                    ));
                    continue;
                }
            };
            let remote_path = match remote_path_for(&remote_root, relative) {
                Some(p) => p,
                None => {
                    result.errors.push(format!(
                        "Skipping {}: path is not valid UTF-8",
                        entry.path().display()
                    ));
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if let Err(e) = self.ensure_directory(&remote_path, options, &mut result) {
                    result.errors.push(format!("Error creating {}: {}", remote_path, e));
                }
            } else if entry.file_type().is_file() {
                match self.should_upload(entry.path(), &remote_path) {
                    Ok(true) => {
                        if !options.dry_run {
                            if let Err(e) =
                                self.drive
                                    .insert_file(&remote_path, entry.path(), options.in_place)
                            {
                                result.errors.push(format!(
                                    "Error uploading {}: {}",
                                    entry.path().display(),
                                    e
                                ));
                                continue;
                            }
                        }
                        result.files_copied += 1;
                        info!("Copied: {} -> {}", entry.path().display(), remote_path);
                    }
                    Ok(false) => {
                        result.files_skipped += 1;
                        info!("Skipped (up to date): {}", entry.path().display());
                    }
                    Err(e) => {
                        result.errors.push(format!(
                            "Error checking file {}: {}",
                            entry.path().display(),
                            e
                        ));
                    }
                }
            } else {
                warn!("Skipping non-regular entry: {}", entry.path().display());
            }
        }

        Ok(result)
    }

    fn ensure_directory(
        &self,
        remote_path: &str,
        options: &SyncOptions,
        result: &mut SyncResult,
    ) -> Result<()> {
        match self.drive.stat(remote_path) {
            Ok(existing) if is_dir(&existing) => return Ok(()),
            Ok(_) => {
                return Err(Error::NotADirectory(format!(
                    "\"{remote_path}\" exists and is a file"
                )))
            }
            Err(e) if e.is_object_not_found() => {}
            Err(e) => return Err(e),
        }

        if !options.dry_run {
            self.drive.mkdir_all(remote_path)?;
        }
        result.directories_created += 1;
        info!("Created directory: {}", remote_path);
        Ok(())
    }

    fn should_upload(&self, local: &Path, remote_path: &str) -> Result<bool> {
        let remote = match self.drive.stat(remote_path) {
            Ok(remote) => remote,
            Err(e) if e.is_object_not_found() => return Ok(true),
            Err(e) => return Err(e),
        };
        if is_dir(&remote) {
            return Err(Error::IsADirectory(format!(
                "\"{remote_path}\" is a directory on the drive"
            )));
        }

        let local_modified = local_mtime(local)?;
        let remote_modified = modified_date(&remote)?;

        // Upload if local is newer than remote
        Ok(local_modified > remote_modified)
    }
}

fn local_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let modified: SystemTime = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).trunc_subsecs(0))
}

fn remote_path_for(remote_root: &str, relative: &Path) -> Option<String> {
    let mut path = remote_root.to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            path = join(&path, part.to_str()?);
        }
    }
    Some(path)
}
