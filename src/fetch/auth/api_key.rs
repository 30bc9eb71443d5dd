use crate::error::FetchError;
use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sends the API key in a request header.
///
/// The header is validated once at construction so every request can be
/// decorated without failing.
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self, FetchError> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(format!("API key header name: {e}")))?;
        let mut value = HeaderValue::from_str(key)
            .map_err(|e| FetchError::InvalidRequest(format!("API key header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self {
            inner,
            header_name,
            value,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
