use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;

use crate::{Error, Result};

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response body, delivered as it arrives off the wire.
pub type HttpBody = BoxStream<'static, io::Result<Bytes>>;

pub struct HttpResponse {
    pub status: u16,
    pub body: HttpBody,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::NetworkFailure(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The one thing we need from an HTTP stack.
///
/// Implementations return `Err(Error::NetworkFailure)` when no response
/// was received at all. Any response, whatever its status, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by reqwest.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;

        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
                .boxed(),
        })
    }
}
