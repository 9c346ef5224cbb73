//! Decoding of inbound hook deliveries into [`Notification`]s.
//!
//! A delivery is only considered when its `Content-Type` is exactly
//! `application/json`; anything else (health checks, browsers, form-encoded
//! hooks) is ignored without error. The event kind comes from the
//! `X-Github-Event` header and the repository from `repository.full_name`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HookError, Result};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const EVENT_HEADER: &str = "x-github-event";

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ping,
    Push,
    Unknown,
}

impl EventKind {
    pub fn from_header(value: &str) -> Self {
        match value {
            "ping" => EventKind::Ping,
            "push" => EventKind::Push,
            _ => EventKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ping => "ping",
            EventKind::Push => "push",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A recognised hook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: EventKind,
    /// `owner/name` of the repository. Empty only for pings sent by
    /// organisation-level hooks, which carry no repository.
    pub repository_id: String,
    pub hook_id: Option<u64>,
}

impl Notification {
    pub fn is_dispatchable(&self) -> bool {
        self.kind == EventKind::Push
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    repository: Option<RepositoryPayload>,
    #[serde(default)]
    hook_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

/// Classify and decode one delivery.
///
/// Returns `Ok(None)` when the request is not a JSON delivery at all.
/// Unknown event kinds fail with [`HookError::UnrecognizedEvent`] before the
/// body is looked at; bodies that do not decode fail with
/// [`HookError::MalformedPayload`].
pub fn parse(
    content_type: Option<&str>,
    event: Option<&str>,
    body: &[u8],
) -> Result<Option<Notification>> {
    if content_type != Some(JSON_CONTENT_TYPE) {
        return Ok(None);
    }

    let event = event.unwrap_or_default();
    let kind = EventKind::from_header(event);
    if kind == EventKind::Unknown {
        return Err(HookError::UnrecognizedEvent(event.to_string()));
    }

    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| HookError::MalformedPayload(e.to_string()))?;

    let repository_id = match (kind, payload.repository) {
        (EventKind::Push, Some(repo)) => {
            validate_repository_id(&repo.full_name)?;
            repo.full_name
        }
        (EventKind::Push, None) => {
            return Err(HookError::MalformedPayload(
                "push payload has no repository".into(),
            ))
        }
        (_, repo) => repo.map(|r| r.full_name).unwrap_or_default(),
    };

    Ok(Some(Notification {
        kind,
        repository_id,
        hook_id: payload.hook_id,
    }))
}

// ---------------------------------------------------------------------------
// Repository id validation
// ---------------------------------------------------------------------------

static REPOSITORY_RE: OnceLock<Regex> = OnceLock::new();

fn repository_re() -> &'static Regex {
    REPOSITORY_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+$").expect("repository regex is valid")
    })
}

/// The id is joined onto the actions directory, so it must be exactly
/// `owner/name` with no dot-only segments.
pub fn validate_repository_id(id: &str) -> Result<()> {
    let dot_segment = id.split('/').any(|s| s == "." || s == "..");
    if id.len() > 200 || !repository_re().is_match(id) || dot_segment {
        return Err(HookError::MalformedPayload(format!(
            "invalid repository full_name '{id}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH_BODY: &[u8] = br#"{"ref":"refs/heads/main","repository":{"name":"repo","full_name":"org/repo"}}"#;

    #[test]
    fn push_extracts_full_name() {
        let n = parse(Some("application/json"), Some("push"), PUSH_BODY)
            .unwrap()
            .unwrap();
        assert_eq!(n.kind, EventKind::Push);
        assert_eq!(n.repository_id, "org/repo");
        assert!(n.is_dispatchable());
    }

    #[test]
    fn non_json_content_type_is_ignored() {
        for ct in [None, Some("text/html"), Some("application/x-www-form-urlencoded")] {
            assert!(parse(ct, Some("push"), PUSH_BODY).unwrap().is_none());
        }
    }

    #[test]
    fn content_type_must_match_exactly() {
        let parsed = parse(Some("application/json; charset=utf-8"), Some("push"), PUSH_BODY);
        assert!(parsed.unwrap().is_none());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let err = parse(Some("application/json"), Some("issues"), PUSH_BODY).unwrap_err();
        assert!(matches!(err, HookError::UnrecognizedEvent(ref e) if e == "issues"));
    }

    #[test]
    fn missing_event_header_is_rejected() {
        let err = parse(Some("application/json"), None, PUSH_BODY).unwrap_err();
        assert!(matches!(err, HookError::UnrecognizedEvent(ref e) if e.is_empty()));
    }

    #[test]
    fn malformed_push_body_is_rejected() {
        let err = parse(Some("application/json"), Some("push"), b"{not json").unwrap_err();
        assert!(matches!(err, HookError::MalformedPayload(_)));
    }

    #[test]
    fn push_without_repository_is_rejected() {
        let err = parse(Some("application/json"), Some("push"), b"{}").unwrap_err();
        assert!(matches!(err, HookError::MalformedPayload(_)));
    }

    #[test]
    fn ping_is_not_dispatchable() {
        let body = br#"{"zen":"Keep it logically awesome.","hook_id":42,"repository":{"full_name":"org/repo"}}"#;
        let n = parse(Some("application/json"), Some("ping"), body)
            .unwrap()
            .unwrap();
        assert_eq!(n.kind, EventKind::Ping);
        assert_eq!(n.hook_id, Some(42));
        assert!(!n.is_dispatchable());
    }

    #[test]
    fn org_ping_without_repository_is_accepted() {
        let n = parse(Some("application/json"), Some("ping"), br#"{"hook_id":7}"#)
            .unwrap()
            .unwrap();
        assert_eq!(n.repository_id, "");
    }

    #[test]
    fn valid_repository_ids() {
        for id in ["org/repo", "my-org/my.repo", "a_b/c-d.e", "Octo/Hello-World"] {
            validate_repository_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_repository_ids() {
        for id in [
            "",
            "repo",
            "/etc/passwd",
            "org/..",
            "../repo",
            "org/repo/extra",
            "org\\repo",
            "org/ repo",
        ] {
            assert!(validate_repository_id(id).is_err(), "expected invalid: {id}");
        }
    }

    #[test]
    fn push_with_traversal_is_rejected() {
        let body = br#"{"repository":{"full_name":"../../bin/sh"}}"#;
        let err = parse(Some("application/json"), Some("push"), body).unwrap_err();
        assert!(matches!(err, HookError::MalformedPayload(_)));
    }
}
