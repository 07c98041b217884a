use std::io::Read;

use log::debug;

use super::{ObjectPatch, Query, RemoteStore};
use crate::error::Result;
use crate::object::{ChildRef, RemoteObject};
use crate::retry::RetryPolicy;

/// Routes every call to the underlying store through a [`RetryPolicy`] and
/// drains paginated listings.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn get_object(&self, id: &str) -> Result<RemoteObject> {
        debug!("get_object id={}", id);
        self.policy
            .call("get_object", || self.inner.get_object(id))
            .map_err(|e| e.context(format!("retrieving metadata for id \"{id}\"")))
    }

    /// Every child of `parent_id` matching `query`, across all pages.
    pub fn list_children(&self, parent_id: &str, query: &Query) -> Result<Vec<ChildRef>> {
        let mut children = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            debug!(
                "list_children parent={} query=[{}] page={:?}",
                parent_id, query, page_token
            );
            let page = self
                .policy
                .call("list_children", || {
                    self.inner
                        .list_children(parent_id, query, page_token.as_deref())
                })
                .map_err(|e| {
                    e.context(format!(
                        "listing children of \"{parent_id}\", query=\"{query}\""
                    ))
                })?;
            children.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(children)
    }

    pub fn insert_object(
        &self,
        content: Option<&[u8]>,
        title: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<RemoteObject> {
        debug!(
            "insert_object title={} parent={} bytes={:?}",
            title,
            parent_id,
            content.map(<[u8]>::len)
        );
        self.policy.call("insert_object", || {
            self.inner.insert_object(content, title, parent_id, mime_type)
        })
    }

    pub fn patch_object(&self, id: &str, patch: &ObjectPatch) -> Result<RemoteObject> {
        debug!("patch_object id={} {:?}", id, patch);
        self.policy
            .call("patch_object", || self.inner.patch_object(id, patch))
    }

    pub fn trash_object(&self, id: &str) -> Result<RemoteObject> {
        debug!("trash_object id={}", id);
        self.policy
            .call("trash_object", || self.inner.trash_object(id))
    }

    pub fn open_content(&self, object: &RemoteObject) -> Result<Box<dyn Read + Send>> {
        debug!("open_content id={}", object.id);
        self.policy
            .call("open_content", || self.inner.open_content(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockOp, MockStore};
    use crate::object::ROOT_ID;

    #[test]
    fn test_list_children_follows_pages() {
        let store = MockStore::new();
        for name in ["a", "b", "c", "d", "e"] {
            store.add_folder(ROOT_ID, name);
        }
        store.set_page_size(2);

        let retrying = RetryingStore::new(store.clone(), RetryPolicy::no_delay(3));
        let children = retrying
            .list_children(ROOT_ID, &Query::new().not_trashed())
            .unwrap();

        assert_eq!(children.len(), 5);
        assert_eq!(store.calls().list, 3);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let store = MockStore::new();
        store.fail_next(MockOp::Get, 500);
        store.fail_next(MockOp::Get, 502);

        let retrying = RetryingStore::new(store.clone(), RetryPolicy::no_delay(3));
        let root = retrying.get_object(ROOT_ID).unwrap();

        assert_eq!(root.id, ROOT_ID);
        assert_eq!(store.calls().get, 3);
    }

    #[test]
    fn test_errors_carry_call_context() {
        let store = MockStore::new();
        let retrying = RetryingStore::new(store, RetryPolicy::no_delay(3));
        let err = retrying.get_object("missing").unwrap_err();
        assert!(err.to_string().contains("retrieving metadata for id \"missing\""));
    }
}
