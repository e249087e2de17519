//! HTTP remote store.
//!
//! Talks to a file API that supports entity tags: `GET` returns the body
//! with an `ETag` header, a conditional `PUT` carries `If-Match`, and the
//! server answers `412 Precondition Failed` when the tag is stale. The
//! actual HTTP client is abstracted via [`HttpClient`] so any library can be
//! plugged in (or a fake in tests).

use crate::error::{StorageError, StorageResult};
use crate::store::{
    RemoteLogStore, VersionToken, VersionedLog, WriteOutcome, LOG_FILE_NAME, SNAPSHOT_FILE_NAME,
};

/// A request handed to an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method (`GET`, `PUT`, `DELETE`).
    pub method: &'static str,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    fn new(method: &'static str, url: String) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    fn body(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }

    /// Returns the first header with this name, ignoring case.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response returned by an [`HttpClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with a status and body.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Returns the first header with this name, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Any status
/// code is a successful `send`; `Err` means no response was received.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A remote store reached over HTTP.
pub struct HttpRemoteStore<C: HttpClient> {
    /// Base URL of the folder holding the runlog and snapshot.
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Bearer token sent with every request.
    access_token: Option<String>,
}

impl<C: HttpClient> HttpRemoteStore<C> {
    /// Creates a new HTTP store.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            access_token: None,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url, file)
    }

    fn send(&self, mut request: HttpRequest) -> StorageResult<HttpResponse> {
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let method = request.method;
        let url = request.url.clone();

        let response = self
            .client
            .send(request)
            .map_err(StorageError::Transport)?;
        tracing::debug!(method, url = %url, status = response.status, "remote store request");

        if matches!(response.status, 401 | 403) {
            return Err(StorageError::Unauthorized(format!(
                "{method} {url} returned {}",
                response.status
            )));
        }
        Ok(response)
    }

    fn read_file(&self, file: &str) -> StorageResult<Option<HttpResponse>> {
        let response = self.send(HttpRequest::new("GET", self.url(file)))?;
        match response.status {
            404 => Ok(None),
            _ if response.is_success() => Ok(Some(response)),
            status => Err(http_error(status, &response)),
        }
    }

    fn delete_file(&self, file: &str) -> StorageResult<()> {
        let response = self.send(HttpRequest::new("DELETE", self.url(file)))?;
        match response.status {
            404 => Ok(()),
            _ if response.is_success() => Ok(()),
            status => Err(http_error(status, &response)),
        }
    }
}

fn http_error(status: u16, response: &HttpResponse) -> StorageError {
    StorageError::Http {
        status,
        message: String::from_utf8_lossy(&response.body).into_owned(),
    }
}

impl<C: HttpClient> RemoteLogStore for HttpRemoteStore<C> {
    fn read_log_with_version(&self) -> StorageResult<VersionedLog> {
        let Some(response) = self.read_file(LOG_FILE_NAME)? else {
            return Ok(VersionedLog::default());
        };
        // Without a tag every conditional write would be rejected.
        let version = response
            .header("ETag")
            .map(VersionToken::new)
            .ok_or_else(|| StorageError::Corrupted("runlog response has no ETag".into()))?;
        Ok(VersionedLog {
            version: Some(version),
            content: response.body,
        })
    }

    fn write_if_version_matches(
        &self,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StorageResult<WriteOutcome> {
        let request = HttpRequest::new("PUT", self.url(LOG_FILE_NAME)).body(content);
        let request = match expected {
            Some(version) => request.header("If-Match", version.as_str()),
            None => request.header("If-None-Match", "*"),
        };

        let response = self.send(request)?;
        match response.status {
            412 => Ok(WriteOutcome::Conflict),
            _ if response.is_success() => Ok(WriteOutcome::Written(VersionToken::new(
                response.header("ETag").unwrap_or_default(),
            ))),
            status => Err(http_error(status, &response)),
        }
    }

    fn read_snapshot(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.read_file(SNAPSHOT_FILE_NAME)?.map(|r| r.body))
    }

    fn write_snapshot(&self, content: &[u8]) -> StorageResult<()> {
        let request = HttpRequest::new("PUT", self.url(SNAPSHOT_FILE_NAME))
            .header("Content-Type", "application/json")
            .body(content);
        let response = self.send(request)?;
        if response.is_success() {
            Ok(())
        } else {
            Err(http_error(response.status, &response))
        }
    }

    fn delete_log(&self) -> StorageResult<()> {
        self.delete_file(LOG_FILE_NAME)
    }

    fn delete_snapshot(&self) -> StorageResult<()> {
        self.delete_file(SNAPSHOT_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// A file server honouring ETag preconditions.
    #[derive(Default)]
    struct FakeFileServer {
        files: Mutex<HashMap<String, (Vec<u8>, u64)>>,
        next_tag: Mutex<u64>,
        status_override: Mutex<Option<u16>>,
        omit_etag: Mutex<bool>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeFileServer {
        fn fail_with(&self, status: u16) {
            *self.status_override.lock() = Some(status);
        }
    }

    impl HttpClient for FakeFileServer {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request.clone());
            if let Some(status) = *self.status_override.lock() {
                return Ok(HttpResponse::new(status, "nope"));
            }

            let mut files = self.files.lock();
            let etag = |n: u64| format!("\"{n}\"");
            match request.method {
                "GET" => Ok(match files.get(&request.url) {
                    Some((body, _)) if *self.omit_etag.lock() => {
                        HttpResponse::new(200, body.clone())
                    }
                    Some((body, tag)) => {
                        HttpResponse::new(200, body.clone()).with_header("etag", etag(*tag))
                    }
                    None => HttpResponse::new(404, ""),
                }),
                "PUT" => {
                    let current = files.get(&request.url).map(|(_, tag)| etag(*tag));
                    let precondition_ok = match (
                        request.header_value("If-Match"),
                        request.header_value("If-None-Match"),
                    ) {
                        (Some(want), _) => current.as_deref() == Some(want),
                        (None, Some("*")) => current.is_none(),
                        _ => true,
                    };
                    if !precondition_ok {
                        return Ok(HttpResponse::new(412, "precondition failed"));
                    }
                    let mut next = self.next_tag.lock();
                    *next += 1;
                    files.insert(request.url.clone(), (request.body.unwrap_or_default(), *next));
                    Ok(HttpResponse::new(200, "").with_header("ETag", etag(*next)))
                }
                "DELETE" => Ok(match files.remove(&request.url) {
                    Some(_) => HttpResponse::new(204, ""),
                    None => HttpResponse::new(404, ""),
                }),
                other => Err(format!("unsupported method {other}")),
            }
        }
    }

    fn store() -> HttpRemoteStore<FakeFileServer> {
        HttpRemoteStore::new(
            "https://files.example.com/apps/tickernotes/",
            FakeFileServer::default(),
        )
    }

    #[test]
    fn http_missing_files() {
        let store = store();
        assert_eq!(store.base_url(), "https://files.example.com/apps/tickernotes");

        let log = store.read_log_with_version().unwrap();
        assert!(log.content.is_empty());
        assert!(log.version.is_none());
        assert!(store.read_snapshot().unwrap().is_none());
        store.delete_log().unwrap();
    }

    #[test]
    fn http_conditional_put_uses_etag() {
        let store = store();
        let WriteOutcome::Written(v1) = store.write_if_version_matches(b"a\n", None).unwrap() else {
            panic!("expected write");
        };
        assert_eq!(v1.as_str(), "\"1\"");

        let read = store.read_log_with_version().unwrap();
        assert_eq!(read.version.as_ref(), Some(&v1));
        assert_eq!(read.content, b"a\n");

        store.write_if_version_matches(b"a\nb\n", Some(&v1)).unwrap();
        let stale = store.write_if_version_matches(b"a\nc\n", Some(&v1)).unwrap();
        assert!(stale.is_conflict());

        let requests = store.client.requests.lock();
        let last = requests.last().unwrap();
        assert_eq!(last.header_value("if-match"), Some("\"1\""));
    }

    #[test]
    fn http_auth_failures_are_distinct() {
        let store = store().with_access_token("secret");
        store.client.fail_with(401);
        let err = store.read_log_with_version().unwrap_err();
        assert!(err.is_unauthorized());

        store.client.fail_with(403);
        assert!(store.write_snapshot(b"{}").unwrap_err().is_unauthorized());

        let requests = store.client.requests.lock();
        assert_eq!(requests[0].header_value("authorization"), Some("Bearer secret"));
    }

    #[test]
    fn http_server_errors_surface_status() {
        let store = store();
        store.client.fail_with(503);
        match store.read_snapshot() {
            Err(StorageError::Http { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn http_log_without_etag_is_rejected() {
        let store = store();
        store.write_if_version_matches(b"line", None).unwrap();
        *store.client.omit_etag.lock() = true;

        match store.read_log_with_version() {
            Err(StorageError::Corrupted(message)) => assert!(message.contains("ETag")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn http_snapshot_round_trip() {
        let store = store();
        store.write_snapshot(b"{\"version\":\"1.0\"}").unwrap();
        assert_eq!(
            store.read_snapshot().unwrap().unwrap(),
            b"{\"version\":\"1.0\"}"
        );
        store.delete_snapshot().unwrap();
        assert!(store.read_snapshot().unwrap().is_none());
    }
}
