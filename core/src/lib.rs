//! Client for servers that wrap every response in a
//! `{ success, data, errors }` envelope.
//!
//! # Overview
//! - `RequestExecutor` issues JSON GET/POST requests and resolves to the
//!   envelope's `data`.
//! - `UploadManager` sends a multipart file upload with progress reporting
//!   and cancellation.
//! - `envelope::decode` is the single decoding rule both of them apply.
//!
//! # Design
//! - Both components resolve to `Result<serde_json::Value, ApiError>`;
//!   `ApiError` keeps transport failures, malformed envelopes and
//!   application errors apart so callers can match on them.
//! - `RequestExecutor` keeps the request/response halves public
//!   (`build_*` / `parse_response`) so a host can bring its own HTTP stack.
//! - Upload tasks are independent: a manager runs one at a time and rejects
//!   overlapping calls.

pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod http;
pub mod query;
pub mod size;
pub mod upload;

pub use config::ClientOptions;
pub use error::{ApiError, ErrorKind};
pub use executor::RequestExecutor;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use query::{QueryEncoding, QueryParams, QueryValue};
pub use size::human_size;
pub use upload::{UploadFile, UploadForm, UploadHandle, UploadManager, UploadTask};
