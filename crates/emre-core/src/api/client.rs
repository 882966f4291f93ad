//! Request executor for the EmRe REST API.
//!
//! `ApiClient::execute` turns an [`Operation`] into one HTTP exchange and a
//! typed outcome. It never touches the cache and never retries.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Session;

use super::operation::{Operation, Payload};
use super::transport::{HttpRequest, Transport, TransportError};
use super::RequestError;

/// Default API root of a local backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Clone is cheap - the transport and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    session: Session,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>, session: Session) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn execute(&self, operation: &Operation) -> Result<Payload, RequestError> {
        let request = self.build_request(operation)?;
        debug!(method = %operation.method, path = %operation.path, "Sending request");

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(method = %operation.method, path = %operation.path, error = %e, "Transport failure");
            RequestError::from(e)
        })?;

        if !response.is_success() {
            let err = RequestError::from_status(response.status, &response.body);
            debug!(status = response.status, path = %operation.path, error = %err, "Request rejected");
            return Err(err);
        }

        let data = if response.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&response.body).map_err(|e| {
                RequestError::InvalidResponse(format!("{} {}: {}", operation.method, operation.path, e))
            })?
        };
        let contents = operation.shape.validate(&data).map_err(|e| {
            warn!(path = %operation.path, error = %e, "Response failed schema validation");
            RequestError::InvalidResponse(e)
        })?;

        Ok(Payload::new(data, contents))
    }

    fn build_request(&self, operation: &Operation) -> Result<HttpRequest, RequestError> {
        let mut url = format!("{}{}", self.base_url, operation.path);
        if !operation.params.is_empty() {
            url.push('?');
            url.push_str(&encode_pairs(
                operation.params.iter().map(|(k, v)| (k.as_str(), v.clone())),
            ));
        }

        let mut headers = vec![("Accept".to_string(), CONTENT_TYPE_JSON.to_string())];
        if let Some(auth) = self.session.authorization() {
            headers.push(("Authorization".to_string(), auth));
        }

        let body = match &operation.body {
            None => None,
            Some(body) if operation.is_form_encoded() => {
                headers.push(("Content-Type".to_string(), CONTENT_TYPE_FORM.to_string()));
                Some(form_encode(body)?)
            }
            Some(body) => {
                headers.push(("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()));
                Some(body.to_string())
            }
        };

        Ok(HttpRequest {
            method: operation.method,
            url,
            headers,
            body,
        })
    }
}

impl From<TransportError> for RequestError {
    fn from(e: TransportError) -> Self {
        RequestError::Transport(e.to_string())
    }
}

fn encode_pairs<'a>(pairs: impl Iterator<Item = (&'a str, String)>) -> String {
    pairs
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(&v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Flatten a JSON object of scalars into `application/x-www-form-urlencoded`.
fn form_encode(body: &Value) -> Result<String, RequestError> {
    let object = body.as_object().ok_or_else(|| {
        RequestError::InvalidResponse("form body must be a JSON object".to_string())
    })?;
    Ok(encode_pairs(object.iter().filter_map(|(k, v)| {
        let value = match v {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some((k.as_str(), value))
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::operation::{Method, Shape};
    use crate::api::transport::HttpResponse;
    use crate::auth::SessionData;
    use crate::models::{Organization, Token};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays one canned response and records the request.
    struct Canned {
        response: Result<HttpResponse, TransportError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> HttpRequest {
            self.seen.lock().unwrap().last().cloned().expect("a request was sent")
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.response.clone()
        }
    }

    fn client(transport: Arc<Canned>, session: Session) -> ApiClient {
        ApiClient::new(transport, "http://api.test/api/v1/", session)
    }

    #[tokio::test]
    async fn test_login_is_form_encoded_without_credential() {
        let transport = Canned::new(200, r#"{"access_token": "tok", "token_type": "bearer"}"#);
        let api = client(transport.clone(), Session::new());
        let op = Operation::send(
            Method::Post,
            "/auth/login",
            Some(json!({"username": "a@b.org", "password": "p&ss word"})),
            Shape::record::<Token>(),
        );

        let payload = api.execute(&op).await.expect("login should succeed");
        assert_eq!(payload.data["access_token"], "tok");

        let sent = transport.last();
        assert_eq!(sent.url, "http://api.test/api/v1/auth/login");
        assert_eq!(sent.header("content-type"), Some(CONTENT_TYPE_FORM));
        assert!(sent.header("authorization").is_none());
        assert_eq!(sent.body.as_deref(), Some("password=p%26ss%20word&username=a%40b.org"));
    }

    #[tokio::test]
    async fn test_json_request_carries_bearer_and_params() {
        let transport = Canned::new(200, "[]");
        let session = Session::with_data(SessionData::new("secret", None));
        let api = client(transport.clone(), session);
        let op = Operation::get("/organizations", Shape::many::<Organization>())
            .with_params(vec![("search".into(), "ridge county".into())]);

        let payload = api.execute(&op).await.expect("list should succeed");
        assert!(payload.ids.is_empty());

        let sent = transport.last();
        assert_eq!(sent.url, "http://api.test/api/v1/organizations?search=ridge%20county");
        assert_eq!(sent.header("Authorization"), Some("Bearer secret"));
        assert!(sent.body.is_none());
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_invalid_response() {
        let transport = Canned::new(200, r#"[{"id": 1, "name": "x", "type": "unknown_kind", "created_at": "2024-01-01T00:00:00"}]"#);
        let api = client(transport, Session::new());
        let op = Operation::get("/organizations", Shape::many::<Organization>());
        assert!(matches!(api.execute(&op).await, Err(RequestError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_error_statuses_are_classified() {
        let api = client(Canned::new(401, r#"{"detail": "Could not validate credentials"}"#), Session::new());
        let op = Operation::get("/users/me", Shape::ignored());
        assert_eq!(api.execute(&op).await, Err(RequestError::Unauthorized));

        let transport = Arc::new(Canned {
            response: Err(TransportError::Timeout),
            seen: Mutex::new(Vec::new()),
        });
        let api = client(transport, Session::new());
        assert_eq!(
            api.execute(&op).await,
            Err(RequestError::Transport("request timed out".into()))
        );
    }

    #[tokio::test]
    async fn test_empty_body_is_null_payload() {
        let api = client(Canned::new(204, ""), Session::new());
        let op = Operation::send(Method::Delete, "/organizations/3", None, Shape::ignored());
        assert_eq!(api.execute(&op).await, Ok(Payload::empty()));
    }
}
