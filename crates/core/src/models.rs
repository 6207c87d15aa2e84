use std::{fmt, str::FromStr};

use axum::http::StatusCode;
use serde::Serialize;
use time::UtcDateTime;

/// Error code recorded when a status reply is not valid JSON.
pub const JSON_PARSE_ERROR_CODE: i32 = 3840;

/// Outcome of the last build of a job.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildResult {
    Success,
    Failure,
    Aborted,
    Unstable,
    #[default]
    NotBuilt,
}

impl BuildResult {
    pub const fn variants() -> &'static [Self] {
        &[Self::Success, Self::Failure, Self::Aborted, Self::Unstable, Self::NotBuilt]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
            Self::Unstable => "unstable",
            Self::NotBuilt => "not_built",
        }
    }

    /// Maps the `result` field of a Jenkins build. Unknown or missing values are `NotBuilt`.
    pub fn from_jenkins(result: Option<&str>) -> Self {
        match result {
            Some("SUCCESS") => Self::Success,
            Some("FAILURE") => Self::Failure,
            Some("UNSTABLE") => Self::Unstable,
            Some("ABORTED") => Self::Aborted,
            _ => Self::NotBuilt,
        }
    }
}

impl FromStr for BuildResult {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "aborted" => Ok(Self::Aborted),
            "unstable" => Ok(Self::Unstable),
            "not_built" => Ok(Self::NotBuilt),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Aborted => "Aborted",
            Self::Unstable => "Unstable",
            Self::NotBuilt => "Not built",
        })
    }
}

/// A monitored job and the credentials used to query it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Project {
    pub project_id: String,
    pub title: String,
    pub url: String,
    pub username: String,
    pub token: String,
    pub ignore_for_summary: bool,
    pub list_order: i64,
    pub created_at: UtcDateTime,
    pub modified_at: UtcDateTime,
    pub deletion_date: Option<UtcDateTime>,
}

impl Project {
    pub fn new(title: impl Into<String>, now: UtcDateTime) -> Self {
        Self {
            project_id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            url: String::new(),
            username: String::new(),
            token: String::new(),
            ignore_for_summary: false,
            // New projects go to the end of the list until renumbered
            list_order: i32::MAX as i64,
            created_at: now,
            modified_at: now,
            deletion_date: None,
        }
    }

    pub fn is_active(&self) -> bool { self.deletion_date.is_none() }

    /// Whether the settings used to query the job differ. Results fetched with the old
    /// settings must not be applied to the new ones.
    pub fn connection_changed(&self, other: &Project) -> bool {
        self.url != other.url || self.username != other.username || self.token != other.token
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RequestErrorKind {
    InvalidUrl,
    Timeout,
    Connect,
    Redirect,
    Body,
    Other,
}

impl RequestErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Other => "other",
        }
    }
}

impl FromStr for RequestErrorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid_url" => Ok(Self::InvalidUrl),
            "timeout" => Ok(Self::Timeout),
            "connect" => Ok(Self::Connect),
            "redirect" => Ok(Self::Redirect),
            "body" => Ok(Self::Body),
            "other" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

/// Transport-level failure of a status request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub description: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParseError {
    pub code: i32,
    pub description: String,
}

impl ParseError {
    pub fn json() -> Self {
        Self { code: JSON_PARSE_ERROR_CODE, description: "Error parsing JSON".to_string() }
    }
}

/// Last known state of a project's most recent build.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProjectStatus {
    pub last_known_status: BuildResult,
    pub had_response: bool,
    pub last_build_number: Option<i64>,
    pub failed_build_number: Option<i64>,
    pub culprits: Option<String>,
    pub build_description: Option<String>,
    pub building: bool,
    pub name: Option<String>,
    /// Start time of the request whose result was last accepted.
    pub update_date: Option<UtcDateTime>,
    pub response_status_code: Option<u16>,
    pub request_error: Option<RequestError>,
    pub parse_error: Option<ParseError>,
}

impl ProjectStatus {
    /// A blank status that rejects every result fetched before `at`.
    pub fn reset(at: UtcDateTime) -> Self { Self { update_date: Some(at), ..Self::default() } }

    /// Human-readable explanation of the last problem talking to the server, if any.
    pub fn describe(&self) -> Option<String> {
        if let Some(error) = &self.parse_error {
            return Some(format!("{}\nJSON({})", error.description, error.code));
        }
        if let Some(error) = &self.request_error {
            return Some(format!("{}\nRequest({})", error.description, error.kind.as_str()));
        }
        match self.response_status_code? {
            200 if !self.had_response => Some("Empty response\nHTTP(200)".to_string()),
            code @ 400..600 => {
                let reason = StatusCode::from_u16(code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown status");
                Some(format!("{reason}\nHTTP({code})"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProjectInfo {
    pub project: Project,
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Failed,
    Fixed,
}

/// A user-facing message to be shown no earlier than `deliver_at`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub project_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub deliver_at: UtcDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_result_round_trips_through_storage_name() {
        for &result in BuildResult::variants() {
            assert_eq!(result.as_str().parse::<BuildResult>(), Ok(result));
        }
        assert!("NOT_BUILT".parse::<BuildResult>().is_err());
    }

    #[test]
    fn jenkins_results() {
        assert_eq!(BuildResult::from_jenkins(Some("SUCCESS")), BuildResult::Success);
        assert_eq!(BuildResult::from_jenkins(Some("FAILURE")), BuildResult::Failure);
        assert_eq!(BuildResult::from_jenkins(Some("NOT_BUILT")), BuildResult::NotBuilt);
        assert_eq!(BuildResult::from_jenkins(Some("success")), BuildResult::NotBuilt);
        assert_eq!(BuildResult::from_jenkins(None), BuildResult::NotBuilt);
    }

    #[test]
    fn describe_prefers_parse_errors() {
        let status = ProjectStatus {
            parse_error: Some(ParseError::json()),
            request_error: Some(RequestError {
                kind: RequestErrorKind::Timeout,
                description: "timed out".to_string(),
            }),
            response_status_code: Some(500),
            ..ProjectStatus::default()
        };
        assert_eq!(status.describe().as_deref(), Some("Error parsing JSON\nJSON(3840)"));
    }

    #[test]
    fn describe_http_status() {
        let empty = ProjectStatus { response_status_code: Some(200), ..ProjectStatus::default() };
        assert_eq!(empty.describe().as_deref(), Some("Empty response\nHTTP(200)"));

        let ok = ProjectStatus {
            response_status_code: Some(200),
            had_response: true,
            ..ProjectStatus::default()
        };
        assert_eq!(ok.describe(), None);

        let missing = ProjectStatus { response_status_code: Some(404), ..ProjectStatus::default() };
        assert_eq!(missing.describe().as_deref(), Some("Not Found\nHTTP(404)"));

        assert_eq!(ProjectStatus::default().describe(), None);
    }

    #[test]
    fn connection_changes() {
        let now = UtcDateTime::now();
        let project = Project::new("Project 0", now);
        let mut renamed = project.clone();
        renamed.title = "Renamed".to_string();
        renamed.list_order = 3;
        assert!(!project.connection_changed(&renamed));
        let mut moved = project.clone();
        moved.url = "https://ci.example.com/job/other".to_string();
        assert!(project.connection_changed(&moved));
    }
}
