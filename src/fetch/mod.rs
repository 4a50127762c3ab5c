//! HTTP plumbing shared by every source adapter and the schedule download.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, StatusCode, Url};

use crate::error::SourceUnavailable;

fn parse_url(url: &str) -> Result<Url, SourceUnavailable> {
    Url::parse(url).map_err(|e| SourceUnavailable::InvalidUrl(format!("{url}: {e}")))
}

async fn send<C: HttpClient + ?Sized>(
    client: &C,
    req: Request,
) -> Result<Bytes, SourceUnavailable> {
    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceUnavailable::Status(status));
    }
    Ok(resp.bytes().await?)
}

/// Issues a GET and returns the body of a successful response.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, SourceUnavailable> {
    let req = Request::new(Method::GET, parse_url(url)?);
    send(client, req).await
}

/// Posts a SOAP 1.1 envelope and returns the response status and body.
///
/// Non-success statuses are not errors here: a SOAP service reports faults
/// as a `500` with an envelope, so the caller inspects both.
pub async fn post_soap<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    soap_action: &str,
    envelope: String,
) -> Result<(StatusCode, Bytes), SourceUnavailable> {
    let mut req = Request::new(Method::POST, parse_url(url)?);
    let headers = req.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/xml; charset=utf-8"),
    );
    let action = HeaderValue::from_str(&format!("\"{soap_action}\""))
        .map_err(|e| SourceUnavailable::Payload(format!("invalid SOAPAction: {e}")))?;
    headers.insert("soapaction", action);
    *req.body_mut() = Some(envelope.into());

    let resp = client.execute(req).await?;
    let status = resp.status();
    Ok((status, resp.bytes().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_rejects_garbage() {
        let err = parse_url("not a url").unwrap_err();
        assert!(matches!(err, SourceUnavailable::InvalidUrl(_)));
    }

    #[test]
    fn test_parse_url_accepts_http() {
        let url = parse_url("http://feed.example.org/trip_updates.pb").unwrap();
        assert_eq!(url.host_str(), Some("feed.example.org"));
    }
}
