mod payload;

use std::{error::Error as _, time::Duration};

use anyhow::{Context, Result};
use buildwatch_core::{
    models::{RequestError, RequestErrorKind},
    util::UrlExt,
};
pub use payload::LastBuild;
use serde_json::Value;
use time::UtcDateTime;
use url::Url;

/// Path of the last build's JSON API, relative to a job URL.
const LAST_BUILD_PATH: &str = "lastBuild/api/json";

/// Performs the status requests for projects.
#[derive(Clone)]
pub struct StatusFetcher {
    client: reqwest::Client,
}

/// Everything known about one status request once it completed.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Taken before the request was issued.
    pub started_at: UtcDateTime,
    pub request_error: Option<RequestError>,
    /// HTTP status, if a response was received at all.
    pub status_code: Option<u16>,
    pub body: FetchBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    /// No body was received.
    Missing,
    /// The server answered with an empty body.
    Empty,
    Json(Value),
    /// The body of a successful response is not valid JSON.
    Invalid(String),
    /// The body of an unsuccessful response, which is not interpreted.
    Rejected,
}

impl FetchBody {
    fn parse(data: &[u8]) -> Self {
        match serde_json::from_slice(data) {
            Ok(value) => Self::Json(value),
            Err(e) => Self::Invalid(e.to_string()),
        }
    }
}

impl FetchResult {
    fn failed(started_at: UtcDateTime, error: RequestError, status_code: Option<u16>) -> Self {
        Self { started_at, request_error: Some(error), status_code, body: FetchBody::Missing }
    }

    /// Whether a response with content was received.
    pub fn had_response(&self) -> bool {
        self.status_code.is_some() && !matches!(self.body, FetchBody::Missing | FetchBody::Empty)
    }

    /// The build described by the reply. Replies without a usable body describe an empty
    /// build; `None` when the body could not be decoded at all.
    pub fn last_build(&self) -> Option<LastBuild> {
        match &self.body {
            FetchBody::Json(value) => Some(LastBuild::from_value(value)),
            FetchBody::Invalid(_) => None,
            FetchBody::Missing | FetchBody::Empty | FetchBody::Rejected => {
                Some(LastBuild::default())
            }
        }
    }
}

impl StatusFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("buildwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// Requests the last build of the job at `url`. Never fails: transport and decoding
    /// problems are recorded in the result.
    pub async fn fetch(&self, url: &str, username: &str, token: &str) -> FetchResult {
        let started_at = UtcDateTime::now();
        let endpoint = match last_build_url(url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let error =
                    RequestError { kind: RequestErrorKind::InvalidUrl, description: e.to_string() };
                return FetchResult::failed(started_at, error, None);
            }
        };
        tracing::debug!("Requesting {}", endpoint);
        let response =
            match self.client.get(endpoint).basic_auth(username, Some(token)).send().await {
                Ok(response) => response,
                Err(e) => return FetchResult::failed(started_at, request_error(&e), None),
            };
        let status = response.status();
        let data = match response.bytes().await {
            Ok(data) => data,
            Err(e) => {
                return FetchResult::failed(started_at, request_error(&e), Some(status.as_u16()));
            }
        };
        let body = if data.iter().all(u8::is_ascii_whitespace) {
            FetchBody::Empty
        } else if status.is_success() {
            FetchBody::parse(&data)
        } else {
            FetchBody::Rejected
        };
        FetchResult { started_at, request_error: None, status_code: Some(status.as_u16()), body }
    }
}

/// The JSON API URL of the last build of the job at `url`.
pub fn last_build_url(url: &str) -> Result<Url> {
    let base = Url::parse(url.trim()).with_context(|| format!("Invalid job URL {url:?}"))?;
    Ok(base.as_directory().join(LAST_BUILD_PATH)?)
}

fn request_error(error: &reqwest::Error) -> RequestError {
    let kind = if error.is_timeout() {
        RequestErrorKind::Timeout
    } else if error.is_connect() {
        RequestErrorKind::Connect
    } else if error.is_redirect() {
        RequestErrorKind::Redirect
    } else if error.is_body() || error.is_decode() {
        RequestErrorKind::Body
    } else if error.is_builder() {
        RequestErrorKind::InvalidUrl
    } else {
        RequestErrorKind::Other
    };
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    RequestError { kind, description }
}
