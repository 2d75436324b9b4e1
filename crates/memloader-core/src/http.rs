//! Minimal JSON-over-HTTP client shared by the extractors and loaders.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// JSON HTTP client bound to one base URL and one auth scheme.
#[derive(Clone)]
pub(crate) struct JsonClient {
    base_url: String,
    /// Full `Authorization` header value, e.g. `Bearer sk-...`
    authorization: Option<String>,
    client: reqwest::Client,
}

impl JsonClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: None,
            client,
        })
    }

    /// Send `Authorization: {value}` on every request.
    pub(crate) fn with_authorization(mut self, value: String) -> Self {
        self.authorization = Some(value);
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(reqwest::Method::GET, path, &[], Option::<()>::None).await
    }

    pub(crate) async fn get_query<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.request(reqwest::Method::GET, path, query, Option::<()>::None).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.request(reqwest::Method::POST, path, &[], Some(body)).await
    }

    pub(crate) async fn delete_with<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let _: serde_json::Value = self.request(reqwest::Method::DELETE, path, &[], Some(body)).await?;
        Ok(())
    }

    /// POST a multipart form, e.g. a file upload.
    pub(crate) async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T> {
        let req = self.builder(reqwest::Method::POST, path).multipart(form);
        let resp = self.send(path, req).await?;
        parse_json(&resp.bytes().await?)
    }

    /// GET a response body as plain text.
    pub(crate) async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self.send(path, self.builder(reqwest::Method::GET, path)).await?;
        Ok(resp.text().await?)
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T> {
        let mut req = self.builder(method, path);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(ref b) = body {
            req = req.json(b);
        }

        let resp = self.send(path, req).await?;
        parse_json(&resp.bytes().await?)
    }

    fn builder(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("HTTP request: {} {}", method, url);

        let req = self.client.request(method, &url);
        match self.authorization {
            Some(ref value) => req.header("Authorization", value),
            None => req,
        }
    }

    /// Send and map non-success statuses to errors.
    async fn send(&self, path: &str, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(Error::NotFound(path.to_string()))
        } else {
            let error_text = resp.text().await.unwrap_or_default();
            let message = format!("Request to {} returned {}: {}", path, status, error_text);
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                Err(Error::Http(message))
            } else {
                Err(Error::Other(message))
            }
        }
    }
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // Some endpoints answer 204 or an empty body
    let slice: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) { b"null" } else { bytes };
    serde_json::from_slice(slice).map_err(|e| Error::Other(format!("Failed to parse response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_parses_as_null() {
        let value: serde_json::Value = parse_json(b"  \n").unwrap();
        assert!(value.is_null());

        let unit: Option<u32> = parse_json(b"").unwrap();
        assert_eq!(unit, None);
    }

    #[test]
    fn test_bad_body_is_reported() {
        let err = parse_json::<serde_json::Value>(b"<html>").unwrap_err();
        assert!(err.to_string().contains("Failed to parse response"));
    }
}
