//! `httpRequest`: request shaping, progress reporting and downloads.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::errors::DriverError;
use crate::files::local::io_context;
use crate::http::options::{CustomBody, HttpOptions, ResponseType};
use crate::http::progress::ProgressListener;
use crate::http::transport::{PreparedRequest, RequestBody, TransportResponse, UploadPart};
use crate::resource::{File, Url};

/// How often upload progress is sampled.
pub const UPLOAD_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body of an HTTP response, when it was buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// `None` when the body was streamed into the download file.
    pub body: Option<HttpBody>,
}

/// What a method token turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestPlan {
    method: String,
    multipart: bool,
    download: bool,
    upload: bool,
}

impl RequestPlan {
    fn new(token: &str, options: &HttpOptions) -> Self {
        match token {
            "POST" => Self {
                method: "POST".to_string(),
                multipart: true,
                download: false,
                upload: false,
            },
            "DOWNLOAD" => Self {
                method: options.method.clone().unwrap_or_else(|| "GET".to_string()),
                multipart: false,
                download: true,
                upload: false,
            },
            "UPLOAD" => Self {
                method: "POST".to_string(),
                multipart: true,
                download: false,
                upload: true,
            },
            other => Self {
                method: other.to_string(),
                multipart: false,
                download: false,
                upload: false,
            },
        }
    }
}

impl Driver {
    /// Perform an HTTP request against `url`.
    ///
    /// `method` is an HTTP verb or one of the tokens `DOWNLOAD` (stream the
    /// body into `options.file`) and `UPLOAD` (multipart POST of
    /// `options.file`). Progress goes to the listener attached to `url`.
    pub async fn http_request(
        &self,
        url: &Url,
        method: &str,
        options: HttpOptions,
    ) -> Result<HttpResponse, DriverError> {
        let plan = RequestPlan::new(method, &options);
        if plan.download {
            self.check_mutation("httpRequest")?;
        }
        let file = match (&options.file, plan.download || plan.upload) {
            (Some(file), _) => Some(file.clone()),
            (None, true) => {
                return Err(DriverError::invalid(
                    "The provided parameter 'options.file' must be a file",
                ))
            }
            (None, false) => None,
        };

        let request = self.prepare_request(url, &plan, &options, file.as_ref()).await?;
        let download = if plan.download { file } else { None };

        let mut partial = None;
        match self
            .transfer(url, request, download.as_ref(), options.response_type, &mut partial)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => fail_transfer(e, partial).await,
        }
    }

    async fn prepare_request(
        &self,
        url: &Url,
        plan: &RequestPlan,
        options: &HttpOptions,
        file: Option<&File>,
    ) -> Result<PreparedRequest, DriverError> {
        let mut headers: BTreeMap<String, String> =
            options.normalized_headers().into_iter().collect();
        let mut multipart = plan.multipart;
        // An explicit content-type only overrides the POST default; the
        // file part of an UPLOAD is its payload.
        if !plan.upload && headers.contains_key("content-type") {
            multipart = false;
        }

        let mut query = Vec::new();
        let body = if let Some(custom) = options.custom_body()? {
            let content_type = match (&options.body_type, headers.get("content-type")) {
                (Some(body_type), _) => body_type.clone(),
                (None, Some(existing)) => existing.clone(),
                (None, None) => "application/octet-stream".to_string(),
            };
            headers.insert("content-type".to_string(), content_type);
            match custom {
                CustomBody::Raw(data) => RequestBody::Bytes(data),
                CustomBody::Json(data) => {
                    headers.insert("content-type".to_string(), "application/json".to_string());
                    RequestBody::Bytes(data)
                }
            }
        } else if multipart {
            headers.remove("content-type");
            let part = match (plan.upload, file) {
                (true, Some(file)) => Some(upload_part(options, file).await?),
                _ => None,
            };
            RequestBody::Multipart {
                fields: options.param_pairs(),
                file: part,
            }
        } else if headers.get("content-type").map(String::as_str) == Some(FORM_CONTENT_TYPE) {
            RequestBody::Form(options.param_pairs())
        } else {
            query = options.param_pairs();
            RequestBody::Empty
        };

        Ok(PreparedRequest {
            url: url.url().to_string(),
            method: plan.method.clone(),
            headers,
            query,
            body,
            gzip: options.gzip,
            timeout: options.timeout.map(Duration::from_millis),
            auth: options.authentication.clone(),
            sent: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn transfer(
        &self,
        url: &Url,
        request: PreparedRequest,
        download: Option<&File>,
        response_type: ResponseType,
        partial: &mut Option<PathBuf>,
    ) -> Result<HttpResponse, DriverError> {
        let listener = url.listener().cloned();
        let sent = request.sent.clone();
        let total = request.upload_total();
        debug!("HTTP {} {}", request.method, request.url);

        let send = self.transport().send(request);
        let response = send_with_upload_progress(send, sent, total, listener.clone()).await?;

        let status = response.status;
        let headers = response.headers.clone();
        let body = match download {
            Some(file) if status == 200 => {
                *partial = Some(file.absolute_path().to_path_buf());
                stream_to_file(response, file, listener.as_deref()).await?;
                None
            }
            _ => {
                let bytes = buffer_body(response, listener.as_deref()).await?;
                if download.is_some() || response_type == ResponseType::ArrayBuffer {
                    Some(HttpBody::Binary(bytes))
                } else {
                    Some(HttpBody::Text(decode_text(bytes)))
                }
            }
        };
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

async fn upload_part(options: &HttpOptions, file: &File) -> Result<UploadPart, DriverError> {
    let metadata = tokio::fs::metadata(file.absolute_path())
        .await
        .map_err(|e| io_context(e, file.path()))?;
    Ok(UploadPart {
        field: options.name_field.clone(),
        file_name: options
            .file_name
            .clone()
            .unwrap_or_else(|| file.name().to_string()),
        content_type: options.file_content_type.clone(),
        path: file.absolute_path().to_path_buf(),
        size: metadata.len(),
    })
}

/// Drive `send` while sampling upload progress every
/// [`UPLOAD_SAMPLE_INTERVAL`].
///
/// Samples that did not move are not reported. Sampling stops once the
/// total is reached; without a total or a listener there is nothing to
/// sample. A listener returning `false` drops `send`, aborting the request.
async fn send_with_upload_progress<F>(
    send: F,
    sent: Arc<AtomicU64>,
    total: Option<u64>,
    listener: Option<Arc<dyn ProgressListener>>,
) -> Result<TransportResponse, DriverError>
where
    F: Future<Output = Result<TransportResponse, DriverError>>,
{
    tokio::pin!(send);
    let (Some(listener), Some(total)) = (listener, total) else {
        return send.await;
    };

    let mut ticker = interval_at(Instant::now() + UPLOAD_SAMPLE_INTERVAL, UPLOAD_SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_sent = 0;
    let mut sampling = true;

    loop {
        tokio::select! {
            result = &mut send => return result,
            _ = ticker.tick(), if sampling => {
                let current = sent.load(Ordering::Relaxed).min(total);
                if current == last_sent {
                    continue;
                }
                last_sent = current;
                if !listener.on_upload_progress(current, total) {
                    debug!("Upload aborted by listener at {}/{} bytes", current, total);
                    return Err(DriverError::TransferAborted);
                }
                if current >= total {
                    sampling = false;
                }
            }
        }
    }
}

/// Report one received chunk; `false` from the listener aborts.
fn report_download(
    listener: Option<&dyn ProgressListener>,
    received: u64,
    total: Option<u64>,
) -> Result<(), DriverError> {
    match listener {
        Some(listener) if !listener.on_download_progress(received, total) => {
            debug!("Download aborted by listener at {} bytes", received);
            Err(DriverError::TransferAborted)
        }
        _ => Ok(()),
    }
}

async fn stream_to_file(
    response: TransportResponse,
    file: &File,
    listener: Option<&dyn ProgressListener>,
) -> Result<(), DriverError> {
    let total = response.content_length();
    let mut out = tokio::fs::File::create(file.absolute_path())
        .await
        .map_err(|e| io_context(e, file.path()))?;
    let mut body = response.body;
    let mut received = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        received += chunk.len() as u64;
        report_download(listener, received, total)?;
    }
    out.flush().await?;
    debug!("Downloaded {} bytes into {}", received, file.path());
    Ok(())
}

async fn buffer_body(
    response: TransportResponse,
    listener: Option<&dyn ProgressListener>,
) -> Result<Vec<u8>, DriverError> {
    let total = response.content_length();
    let mut body = response.body;
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        buf.extend_from_slice(&chunk);
        report_download(listener, buf.len() as u64, total)?;
    }
    Ok(buf)
}

/// Decode a buffered text body, dropping a leading byte order mark.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Single exit for failed transfers: drop the partial download, if any.
async fn fail_transfer(
    error: DriverError,
    partial: Option<PathBuf>,
) -> Result<HttpResponse, DriverError> {
    if let Some(path) = partial {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove partial download {}: {}", path.display(), e);
            }
        }
    }
    debug!("HTTP transfer failed: {}", error);
    Err(error)
}
