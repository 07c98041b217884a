use std::io::Read;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ChildPage, ObjectPatch, Query, RemoteStore};
use crate::error::{Error, Result};
use crate::object::{ChildRef, RemoteObject};

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v2";
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v2";

const BOUNDARY_PREFIX: &str = "gdrive-path-";

#[derive(Debug, Serialize, Deserialize)]
struct ParentReference {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    created_date: String,
    #[serde(default)]
    modified_date: String,
    #[serde(default)]
    parents: Vec<ParentReference>,
    download_url: Option<String>,
}

impl From<FileResource> for RemoteObject {
    fn from(file: FileResource) -> Self {
        RemoteObject {
            id: file.id,
            title: file.title,
            mime_type: file.mime_type,
            created_date: file.created_date,
            modified_date: file.modified_date,
            parents: file.parents.into_iter().map(|p| p.id).collect(),
            download_url: file.download_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChildReference {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildList {
    #[serde(default)]
    items: Vec<ChildReference>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<ParentReference>,
}

/// [`RemoteStore`] backed by the Google Drive v2 REST API.
///
/// Token acquisition is left to the caller: the store only sends the bearer
/// token it was built with.
#[derive(Debug, Clone)]
pub struct DriveV2Store {
    client: Client,
    api_url: String,
    upload_url: String,
}

impl DriveV2Store {
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_urls(access_token, DEFAULT_API_URL, DEFAULT_UPLOAD_URL)
    }

    pub fn with_urls(access_token: &str, api_url: &str, upload_url: &str) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", access_token.trim()))
            .map_err(|e| Error::Invalid(format!("access token is not a valid header value: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            upload_url: upload_url.trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.api_url, id)
    }

    fn fetch<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        Ok(Self::execute(builder)?.json()?)
    }

    /// Sends the request, turning any non-2xx answer into [`Error::Remote`].
    fn execute(builder: RequestBuilder) -> Result<Response> {
        let response = builder.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(Error::Remote {
            status: Some(status.as_u16()),
            message: format!("HTTP {}: {}", status, body.trim()),
        })
    }
}

/// Picks a multipart boundary that occurs in none of `parts`.
fn multipart_boundary(parts: &[&[u8]]) -> String {
    loop {
        let boundary = format!("{BOUNDARY_PREFIX}{:016x}", rand::random::<u64>());
        let needle = boundary.as_bytes();
        if !parts
            .iter()
            .any(|part| part.windows(needle.len()).any(|w| w == needle))
        {
            return boundary;
        }
    }
}

fn multipart_body(boundary: &str, metadata: &[u8], content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(metadata);
    body.extend_from_slice(
        format!("\r\n--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

impl RemoteStore for DriveV2Store {
    fn get_object(&self, id: &str) -> Result<RemoteObject> {
        let file: FileResource = Self::fetch(self.client.get(self.file_url(id)))?;
        Ok(file.into())
    }

    fn list_children(
        &self,
        parent_id: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<ChildPage> {
        let mut request = self
            .client
            .get(format!("{}/children", self.file_url(parent_id)));
        if !query.is_empty() {
            request = request.query(&[("q", query.to_string())]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let list: ChildList = Self::fetch(request)?;
        Ok(ChildPage {
            items: list
                .items
                .into_iter()
                .map(|c| ChildRef { id: c.id })
                .collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    fn insert_object(
        &self,
        content: Option<&[u8]>,
        title: &str,
        parent_id: &str,
        mime_type: Option<&str>,
    ) -> Result<RemoteObject> {
        let metadata = FileMetadata {
            title: Some(title),
            mime_type,
            parents: vec![ParentReference {
                id: parent_id.to_string(),
            }],
            ..Default::default()
        };

        let request = match content {
            None => self
                .client
                .post(format!("{}/files", self.api_url))
                .json(&metadata),
            Some(bytes) => {
                let metadata = serde_json::to_vec(&metadata)?;
                let boundary = multipart_boundary(&[&metadata, bytes]);
                let body = multipart_body(&boundary, &metadata, bytes);
                self.client
                    .post(format!("{}/files", self.upload_url))
                    .query(&[("uploadType", "multipart")])
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/related; boundary={boundary}"),
                    )
                    .body(body)
            }
        };

        let file: FileResource = Self::fetch(request)?;
        Ok(file.into())
    }

    fn patch_object(&self, id: &str, patch: &ObjectPatch) -> Result<RemoteObject> {
        let metadata = FileMetadata {
            title: patch.title.as_deref(),
            modified_date: patch.modified_date.as_deref(),
            ..Default::default()
        };

        let mut request = self.client.patch(self.file_url(id)).json(&metadata);
        if !patch.add_parents.is_empty() {
            request = request.query(&[("addParents", patch.add_parents.join(","))]);
        }
        if !patch.remove_parents.is_empty() {
            request = request.query(&[("removeParents", patch.remove_parents.join(","))]);
        }
        if patch.modified_date.is_some() {
            request = request.query(&[("setModifiedDate", "true")]);
        }

        let file: FileResource = Self::fetch(request)?;
        Ok(file.into())
    }

    fn trash_object(&self, id: &str) -> Result<RemoteObject> {
        let file: FileResource =
            Self::fetch(self.client.post(format!("{}/trash", self.file_url(id))))?;
        Ok(file.into())
    }

    fn open_content(&self, object: &RemoteObject) -> Result<Box<dyn Read + Send>> {
        let url = object.download_url.as_deref().ok_or_else(|| {
            Error::Invalid(format!("object \"{}\" has no downloadable body", object.id))
        })?;
        let response = Self::execute(self.client.get(url))?;
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::store::RetryingStore;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;

    const FILE_JSON: &str = r#"{"id": "obj1", "title": "a.txt", "mimeType": "text/plain"}"#;

    /// Answers one connection per canned `(status, body)` reply and hands
    /// every request it saw (head, blank line, body) back over the channel.
    fn serve(replies: Vec<(u16, &'static str)>) -> (String, Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for (status, body) in replies {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);
                let mut head = String::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    let lower = line.to_ascii_lowercase();
                    if let Some(value) = lower.strip_prefix("content-length:") {
                        content_length = value.trim().parse().unwrap();
                    }
                    head.push_str(&line);
                }
                let mut payload = vec![0; content_length];
                reader.read_exact(&mut payload).unwrap();
                tx.send(format!("{head}\r\n{}", String::from_utf8_lossy(&payload)))
                    .unwrap();

                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                reader.get_mut().write_all(reply.as_bytes()).unwrap();
            }
        });

        (url, rx)
    }

    fn store(url: &str) -> DriveV2Store {
        DriveV2Store::with_urls("secret", url, &format!("{url}/upload")).unwrap()
    }

    fn request_line(request: &str) -> &str {
        request.lines().next().unwrap()
    }

    #[test]
    fn test_file_resource_conversion() {
        let json = r#"{
            "kind": "drive#file",
            "id": "0B1",
            "title": "report.txt",
            "mimeType": "text/plain",
            "createdDate": "2014-10-01T10:20:30.123Z",
            "modifiedDate": "2014-10-02T11:22:33.000Z",
            "parents": [{"kind": "drive#parentReference", "id": "0Bparent", "isRoot": false}],
            "downloadUrl": "https://example.invalid/download/0B1"
        }"#;
        let file: FileResource = serde_json::from_str(json).unwrap();
        let object = RemoteObject::from(file);

        assert_eq!(object.id, "0B1");
        assert_eq!(object.title, "report.txt");
        assert_eq!(object.mime_type, "text/plain");
        assert_eq!(object.parents, vec!["0Bparent".to_string()]);
        assert_eq!(
            object.download_url.as_deref(),
            Some("https://example.invalid/download/0B1")
        );
    }

    #[test]
    fn test_folder_resource_without_optional_fields() {
        let json =
            r#"{"id": "0Bdir", "title": "docs", "mimeType": "application/vnd.google-apps.folder"}"#;
        let object = RemoteObject::from(serde_json::from_str::<FileResource>(json).unwrap());
        assert!(object.parents.is_empty());
        assert_eq!(object.download_url, None);
    }

    #[test]
    fn test_child_list_page_token() {
        let json = r#"{"items": [{"id": "a"}, {"id": "b"}], "nextPageToken": "p2"}"#;
        let list: ChildList = serde_json::from_str(json).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.next_page_token.as_deref(), Some("p2"));

        let last: ChildList = serde_json::from_str("{}").unwrap();
        assert!(last.items.is_empty());
        assert_eq!(last.next_page_token, None);
    }

    #[test]
    fn test_patch_metadata_skips_unset_fields() {
        let metadata = FileMetadata {
            modified_date: Some("2014-10-02T11:22:33.000000001Z"),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"modifiedDate":"2014-10-02T11:22:33.000000001Z"}"#
        );
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("b0undary", br#"{"title":"a"}"#, b"hello");
        let text = String::from_utf8(body).unwrap();

        assert!(text.starts_with("--b0undary\r\n"));
        assert!(text.contains("\r\n\r\n{\"title\":\"a\"}\r\n"));
        assert!(text.contains("application/octet-stream\r\n\r\nhello\r\n"));
        assert!(text.ends_with("--b0undary--\r\n"));
    }

    #[test]
    fn test_boundary_never_occurs_in_content() {
        let content = b"line1\r\n--gdrive-path-7f3c2a9e51d04b86--\r\ntrailing data";
        let metadata = br#"{"title":"drive.rs"}"#;

        let boundary = multipart_boundary(&[metadata, content]);
        assert!(boundary.starts_with(BOUNDARY_PREFIX));
        assert_ne!(boundary, "gdrive-path-7f3c2a9e51d04b86");

        // the media part runs up to the first delimiter line
        let body = multipart_body(&boundary, metadata, content);
        let delimiter = format!("\r\n--{boundary}");
        let text = String::from_utf8(body).unwrap();
        let media_start = text.find("application/octet-stream\r\n\r\n").unwrap()
            + "application/octet-stream\r\n\r\n".len();
        let media_len = text[media_start..].find(&delimiter).unwrap();
        assert_eq!(
            &text.as_bytes()[media_start..media_start + media_len],
            &content[..]
        );
    }

    #[test]
    fn test_rejects_unprintable_token() {
        let err = DriveV2Store::new("bad\ntoken").unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn test_get_object_sends_bearer_token() {
        let (url, requests) = serve(vec![(200, FILE_JSON)]);

        let object = store(&url).get_object("obj1").unwrap();

        assert_eq!(object.id, "obj1");
        let request = requests.recv().unwrap();
        assert!(request_line(&request).starts_with("GET /files/obj1 "));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret"));
    }

    #[test]
    fn test_server_error_is_transient() {
        let (url, _requests) = serve(vec![(503, r#"{"error": "backend"}"#)]);

        let err = store(&url).get_object("obj1").unwrap_err();

        assert!(err.is_transient());
        assert!(matches!(err, Error::Remote { status: Some(503), .. }));
    }

    #[test]
    fn test_not_found_is_not_transient() {
        let (url, _requests) = serve(vec![(404, r#"{"error": "notFound"}"#)]);

        let err = store(&url).get_object("missing").unwrap_err();

        assert!(!err.is_transient());
        assert!(matches!(err, Error::Remote { status: Some(404), .. }));
    }

    #[test]
    fn test_retrying_store_recovers_from_server_error() {
        let (url, requests) = serve(vec![(500, "{}"), (200, FILE_JSON)]);
        let retrying = RetryingStore::new(store(&url), RetryPolicy::no_delay(3));

        let object = retrying.get_object("obj1").unwrap();

        assert_eq!(object.id, "obj1");
        assert_eq!(requests.try_iter().count(), 2);
    }

    #[test]
    fn test_list_children_sends_query_and_page_token() {
        let (url, requests) = serve(vec![
            (200, r#"{"items": [{"id": "a"}], "nextPageToken": "p2"}"#),
            (200, r#"{"items": [{"id": "b"}]}"#),
        ]);
        let retrying = RetryingStore::new(store(&url), RetryPolicy::no_delay(1));

        let children = retrying
            .list_children("root", &Query::new().not_trashed())
            .unwrap();

        let ids: Vec<_> = children.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let first = requests.recv().unwrap();
        assert!(request_line(&first).starts_with("GET /files/root/children?"));
        assert!(request_line(&first).contains("q=trashed+%3D+false"));
        assert!(!request_line(&first).contains("pageToken"));

        let second = requests.recv().unwrap();
        assert!(request_line(&second).contains("pageToken=p2"));
    }

    #[test]
    fn test_patch_object_sets_parents_and_date() {
        let (url, requests) = serve(vec![(200, FILE_JSON)]);
        let patch = ObjectPatch {
            title: Some("b.txt".into()),
            modified_date: Some("2014-10-02T11:22:33.000000001Z".into()),
            add_parents: vec!["new".into()],
            remove_parents: vec!["old".into()],
        };

        store(&url).patch_object("obj1", &patch).unwrap();

        let request = requests.recv().unwrap();
        let line = request_line(&request);
        assert!(line.starts_with("PATCH /files/obj1?"));
        assert!(line.contains("addParents=new"));
        assert!(line.contains("removeParents=old"));
        assert!(line.contains("setModifiedDate=true"));
        assert!(request.ends_with(
            r#"{"title":"b.txt","modifiedDate":"2014-10-02T11:22:33.000000001Z"}"#
        ));
    }

    #[test]
    fn test_trash_object_posts_to_trash() {
        let (url, requests) = serve(vec![(200, FILE_JSON)]);

        store(&url).trash_object("obj1").unwrap();

        let request = requests.recv().unwrap();
        assert!(request_line(&request).starts_with("POST /files/obj1/trash "));
    }

    #[test]
    fn test_insert_with_content_uploads_multipart() {
        let (url, requests) = serve(vec![(200, FILE_JSON)]);

        store(&url)
            .insert_object(Some(&b"payload"[..]), "a.txt", "root", None)
            .unwrap();

        let request = requests.recv().unwrap();
        assert!(request_line(&request).starts_with("POST /upload/files?uploadType=multipart "));

        let lower = request.to_ascii_lowercase();
        let marker = "content-type: multipart/related; boundary=";
        let start = lower.find(marker).unwrap() + marker.len();
        let boundary = request[start..].lines().next().unwrap().trim();
        assert!(request.contains(&format!("--{boundary}\r\n")));
        assert!(request.contains("\r\n\r\npayload\r\n"));
        assert!(request.contains(r#""parents":[{"id":"root"}]"#));
    }

    #[test]
    fn test_insert_folder_posts_metadata_only() {
        let (url, requests) = serve(vec![(200, FILE_JSON)]);

        store(&url)
            .insert_object(None, "docs", "root", Some(crate::object::MIMETYPE_FOLDER))
            .unwrap();

        let request = requests.recv().unwrap();
        assert!(request_line(&request).starts_with("POST /files "));
        assert!(request.contains(r#""mimeType":"application/vnd.google-apps.folder""#));
    }
}
