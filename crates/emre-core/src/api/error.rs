use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// A field-level message from a rejected request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Remote failures, classified. `Clone` so one in-flight result can be
/// handed to every reader waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Unauthorized - credential missing or expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unexpected status {status}: {body}")]
    Unknown { status: u16, body: String },
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Detail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    Fields(Vec<FieldDetail>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct FieldDetail {
    #[serde(default)]
    loc: Vec<Value>,
    msg: String,
}

impl RequestError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// The backend's `detail` string when present, else the truncated body.
    fn message(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: Detail::Message(msg),
            }) => msg,
            _ => Self::truncate_body(body),
        }
    }

    fn field_errors(body: &str) -> Vec<FieldError> {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                detail: Detail::Fields(fields),
            }) => fields
                .into_iter()
                .map(|f| FieldError {
                    field: field_path(&f.loc),
                    message: f.msg,
                })
                .collect(),
            Ok(ErrorBody {
                detail: Detail::Message(msg),
            }) => vec![FieldError {
                field: None,
                message: msg,
            }],
            Ok(ErrorBody {
                detail: Detail::Other(other),
            }) => vec![FieldError {
                field: None,
                message: other.to_string(),
            }],
            Err(_) => vec![FieldError {
                field: None,
                message: Self::truncate_body(body),
            }],
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 | 422 => RequestError::Validation(Self::field_errors(body)),
            401 => RequestError::Unauthorized,
            403 => RequestError::Forbidden(Self::message(body)),
            404 => RequestError::NotFound(Self::message(body)),
            409 => RequestError::Conflict(Self::message(body)),
            429 => RequestError::RateLimited,
            _ => RequestError::Unknown {
                status,
                body: Self::truncate_body(body),
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RequestError::Unauthorized)
    }
}

/// `["body", "quantity"]` -> `quantity`; the leading location segment is noise.
fn field_path(loc: &[Value]) -> Option<String> {
    let parts: Vec<String> = loc
        .iter()
        .skip_while(|v| matches!(v.as_str(), Some("body" | "query" | "path")))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_detail_list_becomes_field_errors() {
        let body = r#"{"detail": [{"loc": ["body", "quantity"], "msg": "ensure this value is greater than 0", "type": "value_error"}]}"#;
        match RequestError::from_status(422, body) {
            RequestError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field.as_deref(), Some("quantity"));
                assert_eq!(fields[0].message, "ensure this value is greater than 0");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_request_detail_string() {
        let body = r#"{"detail": "Not enough quantity available. Only 2 units available"}"#;
        let err = RequestError::from_status(400, body);
        assert_eq!(
            err.to_string(),
            "Validation failed: Not enough quantity available. Only 2 units available"
        );
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(RequestError::from_status(401, ""), RequestError::Unauthorized);
        assert!(RequestError::from_status(401, "").is_unauthorized());
        assert_eq!(
            RequestError::from_status(403, r#"{"detail": "Not authorized to update this incident"}"#),
            RequestError::Forbidden("Not authorized to update this incident".into())
        );
        assert_eq!(
            RequestError::from_status(404, "gone"),
            RequestError::NotFound("gone".into())
        );
        assert_eq!(RequestError::from_status(429, ""), RequestError::RateLimited);
        assert!(matches!(
            RequestError::from_status(502, "bad gateway"),
            RequestError::Unknown { status: 502, .. }
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match RequestError::from_status(500, &body) {
            RequestError::Unknown { body, .. } => {
                assert!(body.len() < 600);
                assert!(body.contains("2000 total bytes"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
