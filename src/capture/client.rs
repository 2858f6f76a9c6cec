//! `reqwest` integration for the capture adapter.
//!
//! [`CapturingClient`] sends requests through a regular `reqwest::Client`
//! and records each one. Transport errors are returned to the caller
//! unchanged after they have been recorded.
//!
//! The response body is captured while the caller reads it: every chunk
//! handed out by [`CapturedResponse::chunk`] is observed on its way through.
//! The transaction is completed when the body is exhausted, or with whatever
//! was read when the response is dropped early.
//!
//! Gzip bodies are decoded by reqwest before they are observed, so they are
//! stored as text. A wrapped client built with `.no_gzip()` hands out the raw
//! compressed bytes instead: the `Content-Encoding: gzip` header still passes
//! the encoding gate, but the bytes are not valid UTF-8 and the body is
//! stored with sizes only (`content: None`).

use super::{
    describe_transport_error, CaptureAdapter, CaptureHandle, RequestParts, ResponseParts,
};
use crate::models::Header;
use bytes::Bytes;
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Version};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Failure recorded when the caller abandons a request before it resolves.
pub const CANCELLED_ERROR: &str = "Request cancelled";

/// HTTP client that records every call it makes.
#[derive(Debug, Clone)]
pub struct CapturingClient {
    client: reqwest::Client,
    adapter: Arc<CaptureAdapter>,
}

impl CapturingClient {
    pub fn new(client: reqwest::Client, adapter: Arc<CaptureAdapter>) -> Self {
        Self { client, adapter }
    }

    /// The wrapped client, for building requests.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn adapter(&self) -> &Arc<CaptureAdapter> {
        &self.adapter
    }

    /// Builds and executes a request.
    ///
    /// A request that fails to build is returned as an error without being
    /// recorded; it never reached the transport.
    pub async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<CapturedResponse, reqwest::Error> {
        let request = builder.build()?;
        self.execute(request).await
    }

    /// Executes a request, recording it.
    ///
    /// Request bodies are captured when they are available as bytes; streamed
    /// request bodies are sent but not recorded.
    pub async fn execute(
        &self,
        request: reqwest::Request,
    ) -> Result<CapturedResponse, reqwest::Error> {
        let headers = headers_from_map(request.headers());
        let handle = self.adapter.on_request_start(RequestParts {
            method: request.method().as_str(),
            url: request.url(),
            headers: &headers,
            body: request.body().and_then(reqwest::Body::as_bytes),
        });

        let mut pending = CancelGuard {
            adapter: self.adapter.clone(),
            handle: Some(handle),
        };
        let started = Instant::now();

        match self.client.execute(request).await {
            Ok(response) => {
                let elapsed = started.elapsed();
                Ok(CapturedResponse::new(
                    response,
                    self.adapter.clone(),
                    pending.disarm(),
                    elapsed,
                ))
            }
            Err(e) => {
                self.adapter
                    .on_failure(pending.disarm(), describe_transport_error(&e));
                Err(e)
            }
        }
    }
}

/// Resolves the transaction as cancelled if the request future is dropped
/// before the transport answers.
struct CancelGuard {
    adapter: Arc<CaptureAdapter>,
    handle: Option<CaptureHandle>,
}

impl CancelGuard {
    fn disarm(&mut self) -> CaptureHandle {
        self.handle.take().unwrap_or_else(CaptureHandle::untracked)
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.adapter.on_failure(handle, CANCELLED_ERROR);
        }
    }
}

struct ResponseCapture {
    adapter: Arc<CaptureAdapter>,
    handle: CaptureHandle,
    parts: ResponseParts,
    elapsed: Duration,
}

impl ResponseCapture {
    fn observe(&mut self, chunk: &[u8]) {
        if let Some(ref mut body) = self.parts.body {
            body.observe(chunk);
        }
    }

    fn finish(self) {
        self.adapter
            .on_response_complete(self.handle, self.parts, self.elapsed);
    }
}

/// A response whose body is recorded as it is read.
pub struct CapturedResponse {
    response: reqwest::Response,
    capture: Option<ResponseCapture>,
}

impl CapturedResponse {
    fn new(
        response: reqwest::Response,
        adapter: Arc<CaptureAdapter>,
        handle: CaptureHandle,
        elapsed: Duration,
    ) -> Self {
        let capture = handle.is_tracked().then(|| {
            let headers = headers_from_map(response.headers());
            let status = response.status();
            ResponseCapture {
                parts: ResponseParts {
                    status_code: status.as_u16(),
                    status_message: status.canonical_reason().unwrap_or("Unknown").to_string(),
                    protocol: format!("{:?}", response.version()),
                    tls_version: None,
                    body: Some(adapter.body_capture(&headers)),
                    headers,
                },
                adapter,
                handle,
                elapsed,
            }
        });

        Self { response, capture }
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn version(&self) -> Version {
        self.response.version()
    }

    pub fn url(&self) -> &Url {
        self.response.url()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Reads the next chunk of the body.
    ///
    /// Errors while reading the body are returned as-is; the transaction is
    /// completed with the part of the body that was read.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, reqwest::Error> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => {
                if let Some(ref mut capture) = self.capture {
                    capture.observe(&chunk);
                }
                Ok(Some(chunk))
            }
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                debug!("Response body read failed: {}", e);
                self.finish();
                Err(e)
            }
        }
    }

    /// Reads the full body.
    pub async fn bytes(mut self) -> Result<Bytes, reqwest::Error> {
        let mut body = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }

    /// Reads the full body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn finish(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.finish();
        }
    }
}

impl Drop for CapturedResponse {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for CapturedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedResponse")
            .field("status", &self.response.status())
            .field("url", self.response.url())
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

/// Converts a header map to an ordered header list.
///
/// Values that are not visible ASCII are decoded lossily.
pub fn headers_from_map(map: &HeaderMap) -> Vec<Header> {
    map.iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            Header::new(name.as_str(), value)
        })
        .collect()
}
