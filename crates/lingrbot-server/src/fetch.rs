use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Format(String),
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml"))
            .unwrap_or(false)
    }
}

/// Outbound HTTP as the reply handlers need it.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<FetchResponse, FetchError>;

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<FetchResponse, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, String> {
        let client = Client::builder().build().map_err(|e| e.to_string())?;
        Ok(Self { client })
    }

    async fn send(request: RequestBuilder) -> Result<FetchResponse, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<FetchResponse, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        Self::send(request).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<FetchResponse, FetchError> {
        Self::send(self.client.post(url).form(form)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_type(content_type: Option<&str>) -> FetchResponse {
        FetchResponse {
            status: 200,
            content_type: content_type.map(|v| v.to_string()),
            body: Bytes::new(),
        }
    }

    #[test]
    fn html_content_types() {
        assert!(with_type(Some("text/html")).is_html());
        assert!(with_type(Some("text/html; charset=Shift_JIS")).is_html());
        assert!(with_type(Some("application/xhtml+xml")).is_html());
        assert!(!with_type(Some("image/png")).is_html());
        assert!(!with_type(Some("text/plain")).is_html());
        assert!(!with_type(None).is_html());
    }
}
