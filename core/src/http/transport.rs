//! The wire side of HTTP transfers.
//!
//! The engine builds a [`PreparedRequest`] and hands it to an
//! [`HttpTransport`]. [`ReqwestTransport`] is the production implementation;
//! tests substitute their own.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::DriverError;
use crate::http::options::Authentication;

/// Size of the chunks an in-memory body is streamed in.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// The file part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        file: Option<UploadPart>,
    },
}

/// A fully resolved request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub gzip: bool,
    pub timeout: Option<Duration>,
    pub auth: Option<Authentication>,
    /// Request body bytes handed to the connection so far. Transports must
    /// keep this current while the body is streamed.
    pub sent: Arc<AtomicU64>,
}

impl PreparedRequest {
    /// Size of the body used for upload progress: the file size for
    /// uploads, the body length for in-memory bodies, unknown otherwise.
    pub fn upload_total(&self) -> Option<u64> {
        match &self.body {
            RequestBody::Bytes(data) => Some(data.len() as u64),
            RequestBody::Multipart {
                file: Some(part), ..
            } => Some(part.size),
            _ => None,
        }
    }
}

/// A response whose body has not been read yet.
pub struct TransportResponse {
    pub status: u16,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    pub body: BoxStream<'static, Result<Bytes, DriverError>>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    pub fn content_length(&self) -> Option<u64> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

/// Sends prepared requests. Dropping the returned future aborts the request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, DriverError>;
}

/// [`HttpTransport`] backed by `reqwest`. A client is built per request so
/// that gzip and timeout follow the request's options.
#[derive(Debug, Default, Clone)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn client(gzip: bool, timeout: Option<Duration>) -> Result<reqwest::Client, DriverError> {
        let mut builder = reqwest::Client::builder().gzip(gzip);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, DriverError> {
        let client = Self::client(request.gzip, request.timeout)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            DriverError::invalid(format!("Invalid HTTP method '{}'", request.method))
        })?;
        debug!("{} {}", method, request.url);

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(auth) = &request.auth {
            if let Some(token) = &auth.bearer {
                builder = builder.bearer_auth(token);
            } else if let Some(user) = &auth.username {
                builder = builder.basic_auth(user, auth.password.as_ref());
            }
        }

        let sent = request.sent.clone();
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(data) => {
                let len = data.len() as u64;
                builder
                    .header(CONTENT_LENGTH, len)
                    .body(reqwest::Body::wrap_stream(counted_chunks(data, sent)))
            }
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart { fields, file } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                if let Some(upload) = file {
                    form = form.part(upload.field.clone(), upload_part(upload, sent).await?);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes_stream().map_err(DriverError::from).boxed();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// Stream `data` in fixed-size chunks, counting each chunk as it is taken.
fn counted_chunks(
    data: Vec<u8>,
    sent: Arc<AtomicU64>,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let data = Bytes::from(data);
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(BODY_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + BODY_CHUNK_SIZE).min(data.len())))
        .collect();
    stream::iter(chunks).map(move |chunk| {
        sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok(chunk)
    })
}

async fn upload_part(upload: UploadPart, sent: Arc<AtomicU64>) -> Result<Part, DriverError> {
    let handle = tokio::fs::File::open(&upload.path).await?;
    let stream = ReaderStream::new(handle).inspect_ok(move |chunk| {
        sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    });
    let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), upload.size)
        .file_name(upload.file_name);
    if let Some(content_type) = upload.content_type {
        part = part
            .mime_str(&content_type)
            .map_err(|e| DriverError::invalid(format!("Invalid file content type: {e}")))?;
    }
    Ok(part)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(url: String, method: &str, body: RequestBody) -> PreparedRequest {
        PreparedRequest {
            url,
            method: method.to_string(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body,
            gzip: true,
            timeout: Some(Duration::from_secs(10)),
            auth: None,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Accept one connection, capture the raw request, answer with `reply`.
    async fn one_shot_server(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= head_end + 4 + length
    }

    async fn collect_body(response: TransportResponse) -> Vec<u8> {
        let mut body = response.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[test]
    fn upload_total_depends_on_body() {
        let r = request("http://x".into(), "POST", RequestBody::Bytes(vec![0; 10]));
        assert_eq!(r.upload_total(), Some(10));
        let r = request("http://x".into(), "GET", RequestBody::Empty);
        assert_eq!(r.upload_total(), None);
        let r = request(
            "http://x".into(),
            "POST",
            RequestBody::Multipart {
                fields: vec![],
                file: Some(UploadPart {
                    field: "file".into(),
                    file_name: "a".into(),
                    content_type: None,
                    path: PathBuf::from("/tmp/a"),
                    size: 77,
                }),
            },
        );
        assert_eq!(r.upload_total(), Some(77));
    }

    #[tokio::test]
    async fn reqwest_transport_reads_status_headers_and_body() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 201 Created\r\nContent-Length: 5\r\nX-Reply: yes\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let mut req = request(format!("{url}/items"), "GET", RequestBody::Empty);
        req.query = vec![("q".into(), "a b".into())];
        req.headers.insert("x-custom".into(), "1".into());

        let response = ReqwestTransport::new().send(req).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.headers.get("x-reply").map(String::as_str), Some("yes"));
        assert_eq!(response.content_length(), Some(5));
        assert_eq!(collect_body(response).await, b"hello");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /items?q=a+b HTTP/1.1\r\n"));
        assert!(raw.to_lowercase().contains("x-custom: 1"));
    }

    #[tokio::test]
    async fn reqwest_transport_streams_bytes_and_counts_them() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let payload = vec![b'z'; BODY_CHUNK_SIZE + 10];
        let mut req = request(url, "PUT", RequestBody::Bytes(payload.clone()));
        req.headers
            .insert("content-type".into(), "application/octet-stream".into());
        let sent = req.sent.clone();

        let response = ReqwestTransport::new().send(req).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(sent.load(Ordering::Relaxed), payload.len() as u64);

        let raw = server.await.unwrap();
        assert!(raw
            .to_lowercase()
            .contains(&format!("content-length: {}", payload.len())));
        assert!(raw.ends_with(&"z".repeat(16)));
    }

    #[tokio::test]
    async fn reqwest_transport_sends_form_fields() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        )
        .await;
        let req = request(
            url,
            "POST",
            RequestBody::Form(vec![("name".into(), "x y".into())]),
        );
        ReqwestTransport::new().send(req).await.unwrap();
        let raw = server.await.unwrap();
        assert!(raw.contains("application/x-www-form-urlencoded"));
        assert!(raw.ends_with("name=x+y"));
    }

    #[tokio::test]
    async fn reqwest_transport_rejects_bad_method() {
        let req = request("http://127.0.0.1:9".into(), "BAD METHOD", RequestBody::Empty);
        let err = ReqwestTransport::new().send(req).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn reqwest_transport_reports_connection_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let req = request(format!("http://{addr}"), "GET", RequestBody::Empty);
        let err = ReqwestTransport::new().send(req).await.unwrap_err();
        assert!(matches!(err, DriverError::Http(_)));
    }
}
