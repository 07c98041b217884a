//! Unix-like paths over the remote store.
//!
//! Google Drive allows more than one object with the same name under one
//! folder and Unix filesystems do not. Every operation here refuses to guess:
//! a duplicate anywhere in a path is reported as [`Error::Duplicate`] and
//! needs to be cleaned up by hand. Duplicates never appear if only these
//! routines are used to create objects.

mod list;
mod mutate;

use std::time::Duration;

use log::debug;

use crate::cache::{ObjectCache, DEFAULT_TTL};
use crate::error::{Error, Result};
use crate::object::{is_dir, ChildRef, RemoteObject, ROOT_ID};
use crate::path::{is_root, join, split_path, ROOT_KEY};
use crate::retry::RetryPolicy;
use crate::store::{Query, RemoteStore, RetryingStore};

/// Folder holding temporary copies of files during safe inserts.
pub const DRIVE_TMP_FOLDER: &str = "tmp";

#[derive(Debug, Clone)]
pub struct Options {
    /// How long a resolved path is trusted without asking the store again.
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
    pub tmp_folder: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            retry: RetryPolicy::default(),
            tmp_folder: DRIVE_TMP_FOLDER.to_string(),
        }
    }
}

/// Path-level access to a [`RemoteStore`].
///
/// Holds two caches: complete objects keyed by canonical path, and folder
/// references keyed by every directory prefix walked so far, so resolving
/// `a/b/c/x` after `a/b/c/y` only lists the last folder.
pub struct DrivePath<S: RemoteStore> {
    store: RetryingStore<S>,
    files: ObjectCache<RemoteObject>,
    children: ObjectCache<ChildRef>,
    tmp_folder: String,
}

impl<S: RemoteStore> DrivePath<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, Options::default())
    }

    pub fn with_options(store: S, options: Options) -> Self {
        let tmp_folder = split_path(&options.tmp_folder).canonical;
        Self {
            store: RetryingStore::new(store, options.retry),
            files: ObjectCache::new(options.cache_ttl),
            children: ObjectCache::new(options.cache_ttl),
            tmp_folder: if tmp_folder.is_empty() {
                DRIVE_TMP_FOLDER.to_string()
            } else {
                tmp_folder
            },
        }
    }

    pub fn store(&self) -> &S {
        self.store.inner()
    }

    /// Returns the object at `path`.
    ///
    /// Every directory element must exist, be a folder and be unique among
    /// its siblings; the last element may be a file or a folder but must also
    /// be unique. A missing element yields an error for which
    /// [`Error::is_object_not_found`] holds.
    pub fn stat(&self, path: &str) -> Result<RemoteObject> {
        let key = cache_key(path, "stat")?;
        if let Some(object) = self.files.get(&key) {
            debug!("stat {}: cached", key);
            return Ok(object);
        }

        if key == ROOT_KEY {
            let root = self.store.get_object(ROOT_ID)?;
            self.files.put(ROOT_KEY, root.clone());
            return Ok(root);
        }

        let split = split_path(&key);
        let mut parent = ROOT_ID.to_string();
        let mut prefix = String::new();

        for elem in split.dir.split('/').filter(|e| !e.is_empty()) {
            prefix = join(&prefix, elem);

            if let Some(child) = self.children.get(&prefix) {
                debug!("stat {}: prefix {} cached", key, prefix);
                parent = child.id;
                continue;
            }

            let files = self
                .store
                .list_children(&parent, &Query::new().title(elem).not_trashed().non_folders())?;
            if !files.is_empty() {
                return Err(Error::NotADirectory(format!(
                    "element \"{elem}\" in path \"{key}\" is a file, not a directory"
                )));
            }

            let mut dirs = self
                .store
                .list_children(&parent, &Query::new().title(elem).not_trashed().folders())?;
            let child = match dirs.len() {
                0 => {
                    return Err(Error::NotFound(format!(
                        "missing directory \"{elem}\" in path \"{key}\""
                    )))
                }
                1 => dirs.remove(0),
                _ => {
                    return Err(Error::Duplicate(format!(
                        "more than one directory named \"{elem}\" exists in path \"{key}\""
                    )))
                }
            };
            parent = child.id.clone();
            self.children.put(&prefix, child);
        }

        // The leaf may be a file or a folder, but still has to be unique.
        let mut found = self
            .store
            .list_children(&parent, &Query::new().title(&split.leaf).not_trashed())?;
        let leaf = match found.len() {
            0 => return Err(Error::NotFound(format!("object \"{key}\" not found"))),
            1 => found.remove(0),
            _ => {
                return Err(Error::Duplicate(format!(
                    "more than one file/directory named \"{}\" exists in path \"{}\"",
                    split.leaf, key
                )))
            }
        };

        let object = self.store.get_object(&leaf.id)?;
        self.files.put(&key, object.clone());
        Ok(object)
    }

    /// Resolves a directory part as produced by [`split_path`]; empty means
    /// the root.
    fn stat_dir(&self, dir: &str) -> Result<RemoteObject> {
        let object = if dir.is_empty() {
            self.stat(ROOT_KEY)?
        } else {
            self.stat(dir)?
        };
        if !is_dir(&object) {
            return Err(Error::NotADirectory(format!("\"{dir}\" is a file")));
        }
        Ok(object)
    }

    /// Records `object` as living at `key`.
    fn remember(&self, key: &str, object: &RemoteObject) {
        self.files.put(key, object.clone());
        if is_dir(object) {
            self.children.put(
                key,
                ChildRef {
                    id: object.id.clone(),
                },
            );
        }
    }

    /// Drops `key` and everything cached below it.
    fn forget(&self, key: &str) {
        self.files.delete_tree(key);
        self.children.delete_tree(key);
    }
}

/// Canonical cache key for `path`. The root maps to [`ROOT_KEY`].
fn cache_key(path: &str, op: &str) -> Result<String> {
    if is_root(path) {
        return Ok(ROOT_KEY.to_string());
    }
    let canonical = split_path(path).canonical;
    if canonical.is_empty() {
        return Err(Error::Invalid(format!("{op}: blank path")));
    }
    Ok(canonical)
}
