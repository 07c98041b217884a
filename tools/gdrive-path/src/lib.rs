pub mod cache;
pub mod drive_path;
pub mod error;
pub mod object;
pub mod path;
pub mod retry;
pub mod store;
pub mod sync;

pub mod mock;

pub use drive_path::{DrivePath, Options, DRIVE_TMP_FOLDER};
pub use error::{Error, ErrorKind, Result};
pub use object::{
    create_date, is_dir, modified_date, ChildRef, RemoteObject, MIMETYPE_FOLDER, ROOT_ID,
};
pub use path::{split_path, SplitPath};
pub use retry::{Backoff, RetryPolicy};
pub use store::{DriveV2Store, ObjectPatch, Query, RemoteStore};
pub use sync::{SyncOptions, SyncResult, TreeSyncer};
