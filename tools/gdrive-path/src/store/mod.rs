mod drive;
mod query;
mod retrying;

pub use drive::{DriveV2Store, DEFAULT_API_URL, DEFAULT_UPLOAD_URL};
pub use query::{escape_quotes, Op, Predicate, Query};
pub use retrying::RetryingStore;

use std::io::Read;

use crate::error::Result;
use crate::object::{ChildRef, RemoteObject};

/// One page of a child listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildPage {
    pub items: Vec<ChildRef>,
    pub next_page_token: Option<String>,
}

/// Metadata update. `None` and empty vectors leave the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPatch {
    pub title: Option<String>,
    /// RFC 3339 with sub-second precision.
    pub modified_date: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

/// The flat, parent-referenced object store everything else is built on.
///
/// Implementations perform exactly one remote operation per call and report
/// HTTP failures as [`crate::Error::Remote`] with the status code set, so the
/// retry layer can tell transient failures apart.
pub trait RemoteStore: Send + Sync {
    fn get_object(&self, id: &str) -> Result<RemoteObject>;

    fn list_children(
        &self,
        parent_id: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<ChildPage>;

    /// Creates an object under `parent_id`. `content` is `None` for folders.
    fn insert_object(
        &self,
        content: Option<&[u8]>,
        title: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<RemoteObject>;

    fn patch_object(&self, id: &str, patch: &ObjectPatch) -> Result<RemoteObject>;

    fn trash_object(&self, id: &str) -> Result<RemoteObject>;

    fn open_content(&self, object: &RemoteObject) -> Result<Box<dyn Read + Send>>;
}
