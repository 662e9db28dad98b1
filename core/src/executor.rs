//! Generic GET/POST requests against an envelope endpoint.
//!
//! # Design
//! `RequestExecutor` holds the endpoint, the options and a reqwest client,
//! and nothing mutable. Each call is split the same way for both transports:
//! `build_*` produces an `HttpRequest`, something executes it, and
//! `parse_response` turns the `HttpResponse` into the envelope's `data` or an
//! `ApiError`. The async methods execute with reqwest; a host with its own
//! HTTP stack can call the two halves directly.
//!
//! Every call owns its own exchange. Concurrent calls share no state and
//! complete in whatever order the server answers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientOptions;
use crate::envelope;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::{with_query, QueryParams};

/// Executes envelope requests against a single endpoint.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    endpoint: String,
    options: ClientOptions,
    http: reqwest::Client,
}

impl RequestExecutor {
    pub fn new(endpoint: &str) -> Self {
        Self::with_client(endpoint, ClientOptions::default(), reqwest::Client::new())
    }

    pub fn with_options(endpoint: &str, options: ClientOptions) -> Result<Self, ApiError> {
        let http = options.build_http_client()?;
        Ok(Self::with_client(endpoint, options, http))
    }

    /// Use an existing reqwest client, e.g. to share its connection pool.
    /// `options.user_agent` is ignored; configure it on `http` instead.
    pub fn with_client(endpoint: &str, options: ClientOptions, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            options,
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_get(&self, params: &QueryParams) -> HttpRequest {
        self.build_request(HttpMethod::Get, None, params)
    }

    pub fn build_post<B: Serialize + ?Sized>(
        &self,
        body: &B,
        params: &QueryParams,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.build_request(HttpMethod::Post, Some(body), params))
    }

    /// Build a request with an already-serialized JSON body.
    pub fn build_request(&self, method: HttpMethod, body: Option<String>, params: &QueryParams) -> HttpRequest {
        let headers = match body {
            Some(_) => vec![("content-type".to_string(), "application/json".to_string())],
            None => Vec::new(),
        };
        HttpRequest {
            method,
            url: with_query(&self.endpoint, params, self.options.query_encoding),
            headers,
            body,
        }
    }

    /// Apply the status and envelope rules to a response for `url`.
    ///
    /// Any status other than 200 is a `Transport` failure regardless of body.
    pub fn parse_response(&self, url: &str, response: HttpResponse) -> Result<Value, ApiError> {
        if response.status != 200 {
            warn!(url, status = response.status, "request failed");
            return Err(ApiError::Transport {
                status: Some(response.status),
            });
        }
        envelope::decode_body(url, response.body.as_bytes())
    }

    pub async fn get(&self, params: &QueryParams) -> Result<Value, ApiError> {
        self.dispatch(self.build_get(params)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, body: &B, params: &QueryParams) -> Result<Value, ApiError> {
        let request = self.build_post(body, params)?;
        self.dispatch(request).await
    }

    pub async fn post_empty(&self, params: &QueryParams) -> Result<Value, ApiError> {
        self.dispatch(self.build_request(HttpMethod::Post, None, params)).await
    }

    pub async fn get_as<T: DeserializeOwned>(&self, params: &QueryParams) -> Result<T, ApiError> {
        envelope::data_into(self.get(params).await?)
    }

    pub async fn post_as<T, B>(&self, body: &B, params: &QueryParams) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        envelope::data_into(self.post(body, params).await?)
    }

    /// Run one exchange: build, send, parse.
    pub async fn execute(
        &self,
        method: HttpMethod,
        body: Option<String>,
        params: &QueryParams,
    ) -> Result<Value, ApiError> {
        self.dispatch(self.build_request(method, body, params)).await
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<Value, ApiError> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let url = request.url.clone();
        let response = self.send(request).await?;
        self.parse_response(&url, response)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&request.url),
            HttpMethod::Post => self.http.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "transport error");
            ApiError::Transport { status: None }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "failed to read response body");
            ApiError::Transport { status: Some(status) }
        })?;

        Ok(HttpResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryEncoding, QueryValue};
    use serde_json::json;

    fn executor() -> RequestExecutor {
        RequestExecutor::new("http://localhost:3000/api/items")
    }

    fn ok(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn build_get_without_params_uses_bare_endpoint() {
        let req = executor().build_get(&QueryParams::new());
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:3000/api/items");
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_get_appends_non_empty_params() {
        let params = QueryParams::new()
            .with("page", 2)
            .with("filter", "")
            .with("sort", QueryValue::Null);
        let req = executor().build_get(&params);
        assert_eq!(req.url, "http://localhost:3000/api/items?page=2");
    }

    #[test]
    fn build_get_percent_encodes_by_default() {
        let params = QueryParams::new().with("q", "a b");
        assert_eq!(executor().build_get(&params).url, "http://localhost:3000/api/items?q=a%20b");
    }

    #[test]
    fn build_get_raw_encoding() {
        let options = ClientOptions::default().query_encoding(QueryEncoding::Raw);
        let executor = RequestExecutor::with_client("/foo/bar", options, reqwest::Client::new());
        let params = QueryParams::new().with("bar", "baz").with("qwer", 1);
        assert_eq!(executor.build_get(&params).url, "/foo/bar?bar=baz&qwer=1");
    }

    #[test]
    fn build_post_serializes_json_body() {
        let req = executor()
            .build_post(&json!({"title": "Buy milk"}), &QueryParams::new().with("draft", true))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:3000/api/items?draft=true");
        assert_eq!(
            req.headers,
            vec![("content-type".to_string(), "application/json".to_string())]
        );
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["title"], "Buy milk");
    }

    #[test]
    fn build_request_without_body_has_no_content_type() {
        let req = executor().build_request(HttpMethod::Post, None, &QueryParams::new());
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn parse_success_returns_data() {
        let data = executor()
            .parse_response("/x", ok(r#"{"success":true,"data":{"id":1}}"#))
            .unwrap();
        assert_eq!(data, json!({"id": 1}));
    }

    #[test]
    fn parse_application_error() {
        let err = executor()
            .parse_response("/x", ok(r#"{"success":false,"errors":{"field":"bad"}}"#))
            .unwrap_err();
        assert_eq!(err.application_errors(), Some(&json!({"field": "bad"})));
    }

    #[test]
    fn parse_malformed_names_url() {
        let err = executor().parse_response("/x?a=1", ok("{}")).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { ref url } if url == "/x?a=1"));

        let err = executor().parse_response("/x", ok("not json")).unwrap_err();
        assert!(matches!(err, ApiError::MalformedEnvelope { .. }));
    }

    #[test]
    fn parse_non_200_is_opaque_transport_failure() {
        let response = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: r#"{"success":true,"data":{"id":1}}"#.to_string(),
        };
        let err = executor().parse_response("/x", response).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: Some(500) }));

        let response = HttpResponse {
            status: 201,
            headers: Vec::new(),
            body: r#"{"success":true}"#.to_string(),
        };
        assert!(matches!(
            executor().parse_response("/x", response),
            Err(ApiError::Transport { status: Some(201) })
        ));
    }
}
