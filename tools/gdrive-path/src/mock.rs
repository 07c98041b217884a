use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::object::{ChildRef, RemoteObject, MIMETYPE_FOLDER, ROOT_ID};
use crate::store::{ChildPage, ObjectPatch, Predicate, Query, RemoteStore};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Get,
    List,
    Insert,
    Patch,
    Trash,
    Open,
}

/// Number of calls received per operation, failed ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub list: usize,
    pub insert: usize,
    pub patch: usize,
    pub trash: usize,
    pub open: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.get + self.list + self.insert + self.patch + self.trash + self.open
    }
}

#[derive(Debug, Clone)]
struct MockObject {
    object: RemoteObject,
    content: Vec<u8>,
    trashed: bool,
}

#[derive(Debug)]
struct MockState {
    objects: BTreeMap<String, MockObject>,
    next_id: u64,
    calls: CallCounts,
    failures: Vec<(MockOp, u16)>,
    page_size: usize,
}

/// In-memory [`RemoteStore`] with call counting and failure injection.
///
/// Like the real service it allows duplicate titles under one parent.
#[derive(Debug, Clone)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn not_found(id: &str) -> Error {
    Error::Remote {
        status: Some(404),
        message: format!("HTTP 404 Not Found: File not found: {id}"),
    }
}

impl MockStore {
    pub fn new() -> Self {
        let mut objects = BTreeMap::new();
        let stamp = now();
        objects.insert(
            ROOT_ID.to_string(),
            MockObject {
                object: RemoteObject {
                    id: ROOT_ID.to_string(),
                    title: "My Drive".to_string(),
                    mime_type: MIMETYPE_FOLDER.to_string(),
                    created_date: stamp.clone(),
                    modified_date: stamp,
                    parents: Vec::new(),
                    download_url: None,
                },
                content: Vec::new(),
                trashed: false,
            },
        );

        Self {
            state: Arc::new(Mutex::new(MockState {
                objects,
                next_id: 1,
                calls: CallCounts::default(),
                failures: Vec::new(),
                page_size: DEFAULT_PAGE_SIZE,
            })),
        }
    }

    pub fn add_folder(&self, parent_id: &str, title: &str) -> RemoteObject {
        let mut state = self.state.lock().unwrap();
        Self::create(&mut state, parent_id, title, MIMETYPE_FOLDER, Vec::new())
    }

    pub fn add_file(&self, parent_id: &str, title: &str, content: Vec<u8>) -> RemoteObject {
        let mut state = self.state.lock().unwrap();
        Self::create(&mut state, parent_id, title, "text/plain", content)
    }

    pub fn object(&self, id: &str) -> Option<RemoteObject> {
        let state = self.state.lock().unwrap();
        state.objects.get(id).map(|o| o.object.clone())
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.objects.get(id).map(|o| o.content.clone())
    }

    pub fn is_trashed(&self, id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.objects.get(id).is_some_and(|o| o.trashed)
    }

    /// Untrashed children of `parent_id`, in creation order.
    pub fn children(&self, parent_id: &str) -> Vec<RemoteObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .values()
            .filter(|o| !o.trashed && o.object.parents.iter().any(|p| p == parent_id))
            .map(|o| o.object.clone())
            .collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = CallCounts::default();
    }

    /// Makes the next call of `op` fail with HTTP `status`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, op: MockOp, status: u16) {
        self.state.lock().unwrap().failures.push((op, status));
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size.max(1);
    }

    fn create(
        state: &mut MockState,
        parent_id: &str,
        title: &str,
        mime_type: &str,
        content: Vec<u8>,
    ) -> RemoteObject {
        let id = format!("obj-{:06}", state.next_id);
        state.next_id += 1;

        let stamp = now();
        let download_url = (mime_type != MIMETYPE_FOLDER).then(|| format!("mock://{id}"));
        let object = RemoteObject {
            id: id.clone(),
            title: title.to_string(),
            mime_type: mime_type.to_string(),
            created_date: stamp.clone(),
            modified_date: stamp,
            parents: vec![parent_id.to_string()],
            download_url,
        };
        state.objects.insert(
            id,
            MockObject {
                object: object.clone(),
                content,
                trashed: false,
            },
        );
        object
    }

    /// Counts the call and pops the first queued failure for `op`, if any.
    fn enter(state: &mut MockState, op: MockOp) -> Result<()> {
        let calls = &mut state.calls;
        match op {
            MockOp::Get => calls.get += 1,
            MockOp::List => calls.list += 1,
            MockOp::Insert => calls.insert += 1,
            MockOp::Patch => calls.patch += 1,
            MockOp::Trash => calls.trash += 1,
            MockOp::Open => calls.open += 1,
        }

        match state.failures.iter().position(|(o, _)| *o == op) {
            Some(idx) => {
                let (_, status) = state.failures.remove(idx);
                Err(Error::Remote {
                    status: Some(status),
                    message: format!("HTTP {status}: injected failure"),
                })
            }
            None => Ok(()),
        }
    }

    fn matches(entry: &MockObject, query: &Query) -> Result<bool> {
        for predicate in query.predicates() {
            let ok = match predicate {
                Predicate::Title(op, title) => op.apply(entry.object.title == *title),
                Predicate::MimeType(op, mime) => op.apply(entry.object.mime_type == *mime),
                Predicate::Trashed(trashed) => entry.trashed == *trashed,
                Predicate::Raw(clause) => {
                    return Err(Error::Remote {
                        status: Some(400),
                        message: format!("HTTP 400: unsupported query clause \"{clause}\""),
                    })
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MockStore {
    fn get_object(&self, id: &str) -> Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::Get)?;
        state
            .objects
            .get(id)
            .map(|o| o.object.clone())
            .ok_or_else(|| not_found(id))
    }

    fn list_children(
        &self,
        parent_id: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<ChildPage> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::List)?;
        if !state.objects.contains_key(parent_id) {
            return Err(not_found(parent_id));
        }

        let mut matching = Vec::new();
        for entry in state.objects.values() {
            if entry.object.parents.iter().any(|p| p == parent_id) && Self::matches(entry, query)? {
                matching.push(ChildRef {
                    id: entry.object.id.clone(),
                });
            }
        }

        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| Error::Remote {
                status: Some(400),
                message: format!("HTTP 400: bad page token \"{token}\""),
            })?,
        };
        let end = (offset + state.page_size).min(matching.len());
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(ChildPage {
            items: matching.get(offset..end).unwrap_or_default().to_vec(),
            next_page_token,
        })
    }

    fn insert_object(
        &self,
        content: Option<&[u8]>,
        title: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::Insert)?;
        if !state.objects.contains_key(parent_id) {
            return Err(not_found(parent_id));
        }
        let mime_type = mime_type.unwrap_or("application/octet-stream");
        let content = content.map(<[u8]>::to_vec).unwrap_or_default();
        Ok(Self::create(&mut state, parent_id, title, mime_type, content))
    }

    fn patch_object(&self, id: &str, patch: &ObjectPatch) -> Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::Patch)?;
        let entry = state.objects.get_mut(id).ok_or_else(|| not_found(id))?;
        let object = &mut entry.object;

        if let Some(title) = &patch.title {
            object.title = title.clone();
        }
        if let Some(modified) = &patch.modified_date {
            object.modified_date = modified.clone();
        }
        object.parents.retain(|p| !patch.remove_parents.contains(p));
        for parent in &patch.add_parents {
            if !object.parents.contains(parent) {
                object.parents.push(parent.clone());
            }
        }
        Ok(object.clone())
    }

    fn trash_object(&self, id: &str) -> Result<RemoteObject> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::Trash)?;
        let entry = state.objects.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.trashed = true;
        Ok(entry.object.clone())
    }

    fn open_content(&self, object: &RemoteObject) -> Result<Box<dyn Read + Send>> {
        let mut state = self.state.lock().unwrap();
        Self::enter(&mut state, MockOp::Open)?;
        let entry = state
            .objects
            .get(&object.id)
            .ok_or_else(|| not_found(&object.id))?;
        Ok(Box::new(Cursor::new(entry.content.clone())))
    }
}
