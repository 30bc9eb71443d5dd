//! HTTP seam for the elevation API.
//!
//! All requests go through [`HttpClient`], so auth decorators and test fakes
//! can wrap or replace the real transport.

mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};

use crate::error::FetchError;

/// POSTs a JSON body and returns the response bytes of a 2xx reply.
///
/// Non-2xx statuses are returned as [`FetchError::Status`].
pub async fn post_json<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    body: Vec<u8>,
) -> Result<Vec<u8>, FetchError> {
    let url = url
        .parse()
        .map_err(|e| FetchError::InvalidRequest(format!("bad endpoint `{url}`: {e}")))?;
    let mut req = reqwest::Request::new(reqwest::Method::POST, url);

    let json = HeaderValue::from_static("application/json");
    req.headers_mut().insert(ACCEPT, json.clone());
    req.headers_mut().insert(CONTENT_TYPE, json);
    *req.body_mut() = Some(body.into());

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp.bytes().await?.to_vec())
}
