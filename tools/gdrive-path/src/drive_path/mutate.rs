use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use log::info;

use super::{cache_key, DrivePath};
use crate::error::{Error, Result};
use crate::object::{is_dir, RemoteObject, MIMETYPE_FOLDER};
use crate::path::{join, split_path};
use crate::store::{ObjectPatch, RemoteStore};

impl<S: RemoteStore> DrivePath<S> {
    /// Creates the folder at `path` and returns it. If the path already
    /// exists the existing object is returned untouched, which saves callers
    /// a `stat` when they only need the folder to be there.
    pub fn mkdir(&self, path: &str) -> Result<RemoteObject> {
        let split = split_path(path);
        if split.canonical.is_empty() {
            return Err(Error::Invalid(
                "mkdir: attempting to create a blank directory".into(),
            ));
        }
        let ctx = |e: Error| e.context(format!("mkdir \"{}\"", split.canonical));

        match self.stat(&split.canonical) {
            Ok(existing) => return Ok(existing),
            Err(e) if e.is_object_not_found() => {}
            Err(e) => return Err(ctx(e)),
        }

        let parent = self.stat_dir(&split.dir).map_err(ctx)?;
        let folder = self
            .store
            .insert_object(None, &split.leaf, &parent.id, Some(MIMETYPE_FOLDER))
            .map_err(ctx)?;
        info!("mkdir {}: created folder {}", split.canonical, folder.id);

        self.remember(&split.canonical, &folder);
        Ok(folder)
    }

    /// Like [`DrivePath::mkdir`], creating missing parents as well.
    pub fn mkdir_all(&self, path: &str) -> Result<RemoteObject> {
        let split = split_path(path);
        if split.canonical.is_empty() {
            return Err(Error::Invalid(
                "mkdir: attempting to create a blank directory".into(),
            ));
        }

        let mut current = String::new();
        let mut folder = None;
        for elem in split.canonical.split('/') {
            current = join(&current, elem);
            folder = Some(self.mkdir(&current)?);
        }
        folder.ok_or_else(|| Error::Invalid(format!("mkdir: nothing to create in \"{path}\"")))
    }

    /// Renames and/or moves the object at `src` (file or folder) to `dst`.
    ///
    /// A file already at `dst` is moved to the trash first; a folder there
    /// makes the move fail. Title and parents are changed with a single
    /// patch. Returns the object in its new location.
    pub fn move_to(&self, src: &str, dst: &str) -> Result<RemoteObject> {
        let src = split_path(src);
        let dst = split_path(dst);
        if src.canonical.is_empty() || dst.canonical.is_empty() {
            return Err(Error::Invalid(
                "move: source and destination paths must be set".into(),
            ));
        }
        let ctx = |e: Error| {
            e.context(format!(
                "move \"{}\" to \"{}\"",
                src.canonical, dst.canonical
            ))
        };
        if dst.canonical.starts_with(&format!("{}/", src.canonical)) {
            return Err(ctx(Error::Invalid(format!(
                "cannot move \"{}\" into its own subtree",
                src.canonical
            ))));
        }

        let src_parent = self.stat_dir(&src.dir).map_err(ctx)?;
        let src_object = self.stat(&src.canonical).map_err(ctx)?;
        let dst_parent = self.stat_dir(&dst.dir).map_err(ctx)?;

        match self.stat(&dst.canonical) {
            Ok(existing) if existing.id == src_object.id => return Ok(src_object),
            Ok(existing) if is_dir(&existing) => {
                return Err(ctx(Error::IsADirectory(format!(
                    "cannot overwrite directory \"{}\"",
                    dst.canonical
                ))))
            }
            Ok(existing) => {
                self.store.trash_object(&existing.id).map_err(ctx)?;
                self.forget(&dst.canonical);
                info!("move: trashed existing {} ({})", dst.canonical, existing.id);
            }
            Err(e) if e.is_object_not_found() => {}
            Err(e) => return Err(ctx(e)),
        }

        let mut patch = ObjectPatch {
            title: Some(dst.leaf.clone()),
            ..Default::default()
        };
        if src_parent.id != dst_parent.id {
            patch.add_parents.push(dst_parent.id.clone());
            patch.remove_parents.push(src_parent.id.clone());
        }

        let moved = self.store.patch_object(&src_object.id, &patch);
        self.forget(&src.canonical);
        let moved = moved.map_err(ctx)?;
        info!("move {} -> {} ({})", src.canonical, dst.canonical, moved.id);

        self.remember(&dst.canonical, &moved);
        Ok(moved)
    }

    /// Uploads the contents of `reader` to `dst`.
    ///
    /// The file is first written under the temporary folder with a random
    /// name and then moved into place, so `dst` never shows a half-placed
    /// object. Slower than [`DrivePath::insert_in_place`] but safer.
    pub fn insert<R: Read>(&self, dst: &str, reader: R) -> Result<RemoteObject> {
        self.insert_with(dst, reader, false)
    }

    /// Uploads the contents of `reader` straight to `dst`, trashing whatever
    /// is there first. `dst` does not exist for the duration of the upload.
    pub fn insert_in_place<R: Read>(&self, dst: &str, reader: R) -> Result<RemoteObject> {
        self.insert_with(dst, reader, true)
    }

    /// Uploads a local file and copies its modification time to the remote
    /// object.
    pub fn insert_file(
        &self,
        dst: &str,
        local: impl AsRef<Path>,
        in_place: bool,
    ) -> Result<RemoteObject> {
        let local = local.as_ref();
        let io_ctx = |e: std::io::Error| {
            Error::from(e).context(format!("reading \"{}\"", local.display()))
        };

        let metadata = fs::metadata(local).map_err(io_ctx)?;
        if !metadata.is_file() {
            return Err(Error::Invalid(format!(
                "\"{}\" is not a regular file",
                local.display()
            )));
        }
        let modified: DateTime<Utc> = metadata.modified().map_err(io_ctx)?.into();

        let file = File::open(local).map_err(io_ctx)?;
        self.insert_with(dst, file, in_place)?;
        self.set_modified_date(dst, modified)
    }

    /// Sets the modification date of the object at `path`.
    pub fn set_modified_date(&self, path: &str, modified: DateTime<Utc>) -> Result<RemoteObject> {
        let key = cache_key(path, "set_modified_date")?;
        let ctx = |e: Error| e.context(format!("setting modified date of \"{key}\""));
        let object = self.stat(&key).map_err(ctx)?;

        // Drive only keeps sub-second precision if the date carries it, and
        // formatting drops a zero fraction. Truncate and add 1ns.
        let stamp = modified.trunc_subsecs(0) + TimeDelta::nanoseconds(1);
        let patch = ObjectPatch {
            modified_date: Some(stamp.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            ..Default::default()
        };

        let patched = self.store.patch_object(&object.id, &patch).map_err(ctx)?;
        self.files.put(&key, patched.clone());
        Ok(patched)
    }

    fn insert_with<R: Read>(
        &self,
        dst: &str,
        mut reader: R,
        in_place: bool,
    ) -> Result<RemoteObject> {
        let dst = split_path(dst);
        if dst.canonical.is_empty() {
            return Err(Error::Invalid(
                "insert: attempting to upload to a blank path".into(),
            ));
        }
        let ctx = |e: Error| e.context(format!("insert \"{}\"", dst.canonical));

        // Buffered so a retried upload sends the same bytes again.
        let mut content = Vec::new();
        reader
            .read_to_end(&mut content)
            .map_err(|e| ctx(Error::from(e)))?;

        let (parent, out_title, out_path) = if in_place {
            let parent = self.stat_dir(&dst.dir).map_err(ctx)?;
            (parent, dst.leaf.clone(), dst.canonical.clone())
        } else {
            let parent = self.mkdir_all(&self.tmp_folder).map_err(ctx)?;
            let title = temp_name();
            let path = join(&self.tmp_folder, &title);
            (parent, title, path)
        };

        // Leftovers from an earlier attempt (file or folder) go first.
        match self.stat(&out_path) {
            Ok(existing) => {
                self.store.trash_object(&existing.id).map_err(ctx)?;
                self.forget(&out_path);
                info!("insert: trashed existing {} ({})", out_path, existing.id);
            }
            Err(e) if e.is_object_not_found() => {}
            Err(e) => return Err(ctx(e)),
        }

        let object = self
            .store
            .insert_object(Some(&content), &out_title, &parent.id, None)
            .map_err(ctx)?;
        info!(
            "insert {}: uploaded {} bytes as {}",
            out_path,
            content.len(),
            object.id
        );
        self.remember(&out_path, &object);

        if in_place {
            return Ok(object);
        }
        self.move_to(&out_path, &dst.canonical)
    }
}

fn temp_name() -> String {
    format!("temp-{}-{}", rand::random::<u32>(), rand::random::<u32>())
}
