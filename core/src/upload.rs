//! Multipart uploads with progress reporting and cancellation.
//!
//! # Design
//! Every `upload` call builds its own exchange and runs it on a spawned Tokio
//! task, so no two uploads ever share handlers. A manager admits one active
//! upload at a time: a second call while one is running is rejected with
//! `ApiError::UploadInProgress` instead of taking over the first upload.
//!
//! An upload can be observed two ways. The returned `UploadHandle` is a
//! future resolving to the same `Result<Value, ApiError>` that
//! `RequestExecutor` returns, and the task's callbacks fire from the spawned
//! task. Exactly one of done, error or abort fires per upload.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ClientOptions;
use crate::envelope;
use crate::error::ApiError;
use crate::size::{human_size, round2};

pub type ProgressCallback = Box<dyn FnMut(f64) + Send + Sync + 'static>;
pub type DoneCallback = Box<dyn FnOnce(Value) + Send + 'static>;
pub type ErrorCallback = Box<dyn FnOnce(ApiError) + Send + 'static>;
pub type AbortCallback = Box<dyn FnOnce() + Send + 'static>;

/// The file carried by an upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    field_name: String,
    file_name: String,
    mime: Option<String>,
    bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk. The form file name is the path's last component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Form field the file is sent under. Defaults to `"file"`.
    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Form payload of an upload. Always contains a file.
#[derive(Debug, Clone)]
pub struct UploadForm {
    file: UploadFile,
    fields: Vec<(String, String)>,
}

impl UploadForm {
    pub fn new(file: UploadFile) -> Self {
        Self {
            file,
            fields: Vec::new(),
        }
    }

    /// Add a text field sent alongside the file.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(&self) -> &UploadFile {
        &self.file
    }

    /// Build the multipart body. The file is streamed in `chunk_size` pieces
    /// and `progress` is called as the transport pulls each one.
    fn into_multipart(self, progress: Option<ProgressCallback>, chunk_size: usize) -> Result<Form, ApiError> {
        let UploadForm { file, fields } = self;
        let total = file.bytes.len();
        let chunks: Vec<Bytes> = (0..total)
            .step_by(chunk_size)
            .map(|start| file.bytes.slice(start..(start + chunk_size).min(total)))
            .collect();

        let mut loaded = 0usize;
        let mut progress = progress;
        let body = stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len();
            trace!(loaded, total, "upload progress");
            if let Some(report) = progress.as_mut() {
                report(percentage(loaded as u64, total as u64));
            }
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total as u64)
            .file_name(file.file_name);
        if let Some(mime) = &file.mime {
            part = part.mime_str(mime).map_err(|e| ApiError::InvalidForm(e.to_string()))?;
        }

        let form = fields
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        Ok(form.part(file.field_name, part))
    }
}

/// `loaded / total * 100`, rounded to two decimals and capped at 100.
pub fn percentage(loaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    round2(loaded as f64 / total as f64 * 100.0).min(100.0)
}

/// One upload: the form plus the callbacks observing it.
pub struct UploadTask {
    form: UploadForm,
    on_progress: Option<ProgressCallback>,
    on_done: Option<DoneCallback>,
    on_error: Option<ErrorCallback>,
    on_abort: Option<AbortCallback>,
}

impl UploadTask {
    pub fn new(form: UploadForm) -> Self {
        Self {
            form,
            on_progress: None,
            on_done: None,
            on_error: None,
            on_abort: None,
        }
    }

    /// Called with the upload percentage, non-decreasing, in `[0, 100]`.
    pub fn on_progress(mut self, callback: impl FnMut(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Called with the envelope's `data` on success.
    pub fn on_done(mut self, callback: impl FnOnce(Value) + Send + 'static) -> Self {
        self.on_done = Some(Box::new(callback));
        self
    }

    /// Called on transport failure, malformed envelope or `success: false`.
    /// Without it those failures are only visible through the handle.
    pub fn on_error(mut self, callback: impl FnOnce(ApiError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn on_abort(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_abort = Some(Box::new(callback));
        self
    }
}

struct Callbacks {
    on_done: Option<DoneCallback>,
    on_error: Option<ErrorCallback>,
    on_abort: Option<AbortCallback>,
}

impl Callbacks {
    fn dispatch(self, outcome: &Result<Value, ApiError>) {
        match outcome {
            Ok(data) => {
                if let Some(done) = self.on_done {
                    done(data.clone());
                }
            }
            Err(ApiError::Aborted) => {
                if let Some(abort) = self.on_abort {
                    abort();
                }
            }
            Err(err) => {
                if let Some(error) = self.on_error {
                    error(err.clone());
                }
            }
        }
    }
}

#[derive(Debug)]
struct ActiveUpload {
    id: Uuid,
    cancel: CancellationToken,
}

type ActiveSlot = Arc<Mutex<Option<ActiveUpload>>>;

fn lock(slot: &Mutex<Option<ActiveUpload>>) -> MutexGuard<'_, Option<ActiveUpload>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Uploads files to a single endpoint, one at a time.
#[derive(Debug)]
pub struct UploadManager {
    endpoint: String,
    options: ClientOptions,
    http: reqwest::Client,
    active: ActiveSlot,
}

impl UploadManager {
    pub fn new(endpoint: &str) -> Self {
        Self::with_client(endpoint, ClientOptions::default(), reqwest::Client::new())
    }

    pub fn with_options(endpoint: &str, options: ClientOptions) -> Result<Self, ApiError> {
        let http = options.build_http_client()?;
        Ok(Self::with_client(endpoint, options, http))
    }

    pub fn with_client(endpoint: &str, options: ClientOptions, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            options,
            http,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether an upload started by this manager is still running.
    pub fn is_busy(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Start an upload on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn upload(&self, task: UploadTask) -> Result<UploadHandle, ApiError> {
        let mut active = lock(&self.active);
        if active.is_some() {
            warn!(url = %self.endpoint, "upload rejected, another upload is active");
            return Err(ApiError::UploadInProgress);
        }

        let UploadTask {
            form,
            on_progress,
            on_done,
            on_error,
            on_abort,
        } = task;
        let id = Uuid::new_v4();
        debug!(
            %id,
            url = %self.endpoint,
            file = form.file().file_name(),
            size = %human_size(form.file().len()),
            "starting upload"
        );
        let multipart = form.into_multipart(on_progress, self.options.chunk_size())?;

        let cancel = CancellationToken::new();
        *active = Some(ActiveUpload {
            id,
            cancel: cancel.clone(),
        });
        drop(active);

        let exchange = Exchange {
            http: self.http.clone(),
            url: self.endpoint.clone(),
            form: multipart,
        };
        let callbacks = Callbacks {
            on_done,
            on_error,
            on_abort,
        };
        let slot = Arc::clone(&self.active);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let outcome = exchange.run(&token).await;
            release(&slot, id);
            debug!(%id, ok = outcome.is_ok(), "upload finished");
            callbacks.dispatch(&outcome);
            outcome
        });

        Ok(UploadHandle { id, cancel, join })
    }

    /// Cancel the active upload, if any. Its abort callback fires from the
    /// upload's task; done and error callbacks will not fire.
    pub fn abort(&self) {
        if let Some(active) = lock(&self.active).take() {
            debug!(id = %active.id, "aborting upload");
            active.cancel.cancel();
        }
    }
}

fn release(slot: &Mutex<Option<ActiveUpload>>, id: Uuid) {
    let mut active = lock(slot);
    if active.as_ref().is_some_and(|upload| upload.id == id) {
        *active = None;
    }
}

struct Exchange {
    http: reqwest::Client,
    url: String,
    form: Form,
}

impl Exchange {
    async fn run(self, cancel: &CancellationToken) -> Result<Value, ApiError> {
        let Exchange { http, url, form } = self;
        let response = async {
            let response = http.post(&url).multipart(form).send().await.map_err(|e| {
                warn!(url = %url, error = %e, "upload transport error");
                ApiError::Transport { status: None }
            })?;
            let status = response.status().as_u16();
            if status != 200 {
                warn!(url = %url, status, "upload failed");
                return Err(ApiError::Transport { status: Some(status) });
            }
            let body = response
                .bytes()
                .await
                .map_err(|_| ApiError::Transport { status: Some(status) })?;
            envelope::decode_body(&url, &body)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Aborted),
            result = response => result,
        }
    }
}

/// A running upload. Await it for the outcome.
///
/// Dropping the handle does not cancel the upload; call `abort` for that.
#[derive(Debug)]
pub struct UploadHandle {
    id: Uuid,
    cancel: CancellationToken,
    join: JoinHandle<Result<Value, ApiError>>,
}

impl UploadHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Future for UploadHandle {
    type Output = Result<Value, ApiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(ApiError::Aborted),
        })
    }
}
