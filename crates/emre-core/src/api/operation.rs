//! Operation descriptors handed to the request executor.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{Entity, EntityKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Validator = fn(&Value) -> Result<Contents, String>;

/// What a validated body holds: the ids of its top-level records, and every
/// record in flat form, including those nested in detail views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contents {
    pub ids: Vec<i64>,
    pub records: Vec<Record>,
}

/// The shape a successful response body must have.
///
/// Validation deserializes into the typed model, so enum values outside the
/// schema and missing required fields are rejected here, and yields the ids
/// of the records the body contains for tagging and snapshots.
#[derive(Clone, Copy)]
pub struct Shape {
    kind: Option<EntityKind>,
    many: bool,
    validate: Validator,
}

impl Shape {
    pub fn one<T: Entity>() -> Self {
        Self {
            kind: Some(T::KIND),
            many: false,
            validate: validate_one::<T>,
        }
    }

    pub fn many<T: Entity>() -> Self {
        Self {
            kind: Some(T::KIND),
            many: true,
            validate: validate_many::<T>,
        }
    }

    /// A typed body that is not a cacheable entity (login tokens).
    pub fn record<T: DeserializeOwned>() -> Self {
        Self {
            kind: None,
            many: false,
            validate: validate_record::<T>,
        }
    }

    /// An entity body the endpoint may also leave empty.
    pub fn optional<T: Entity>() -> Self {
        Self {
            kind: Some(T::KIND),
            many: false,
            validate: validate_optional::<T>,
        }
    }

    /// Any body, including none (acknowledgements, deletes).
    pub fn ignored() -> Self {
        Self {
            kind: None,
            many: false,
            validate: |_| Ok(Contents::default()),
        }
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    pub fn validate(&self, body: &Value) -> Result<Contents, String> {
        (self.validate)(body)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("kind", &self.kind)
            .field("many", &self.many)
            .finish()
    }
}

fn validate_one<T: Entity>(body: &Value) -> Result<Contents, String> {
    let entity = T::deserialize(body).map_err(|e| format!("{}: {}", T::KIND, e))?;
    entity.check()?;
    Ok(Contents {
        ids: vec![entity.id()],
        records: entity.records()?,
    })
}

fn validate_many<T: Entity>(body: &Value) -> Result<Contents, String> {
    let entities = Vec::<T>::deserialize(body).map_err(|e| format!("{} list: {}", T::KIND, e))?;
    let mut contents = Contents::default();
    for entity in &entities {
        entity.check()?;
        contents.ids.push(entity.id());
        contents.records.extend(entity.records()?);
    }
    Ok(contents)
}

fn validate_record<T: DeserializeOwned>(body: &Value) -> Result<Contents, String> {
    T::deserialize(body)
        .map(|_| Contents::default())
        .map_err(|e| e.to_string())
}

fn validate_optional<T: Entity>(body: &Value) -> Result<Contents, String> {
    if body.is_null() {
        Ok(Contents::default())
    } else {
        validate_one::<T>(body)
    }
}

/// A bound request: the path template already carries its parameters.
#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub shape: Shape,
}

impl Operation {
    pub fn get(path: impl Into<String>, shape: Shape) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
            shape,
        }
    }

    pub fn send(method: Method, path: impl Into<String>, body: Option<Value>, shape: Shape) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body,
            shape,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    /// Auth endpoints take form-encoded credentials; everything else is JSON.
    pub fn is_form_encoded(&self) -> bool {
        self.path.starts_with("/auth/")
    }
}

/// A validated response body plus the records it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub data: Value,
    pub ids: Vec<i64>,
    pub records: Vec<Record>,
}

impl Payload {
    pub fn new(data: Value, contents: Contents) -> Self {
        Self {
            data,
            ids: contents.ids,
            records: contents.records,
        }
    }

    pub fn empty() -> Self {
        Self::new(Value::Null, Contents::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Incident, Organization, TeamDetail, Token};
    use serde_json::json;

    fn org(id: i64) -> Value {
        json!({"id": id, "name": "Org", "type": "disaster_relief", "created_at": "2024-05-01T08:00:00"})
    }

    #[test]
    fn test_shape_many_collects_ids() {
        let contents = Shape::many::<Organization>()
            .validate(&json!([org(1), org(5)]))
            .expect("list should validate");
        assert_eq!(contents.ids, vec![1, 5]);
        assert_eq!(contents.records.len(), 2);
    }

    #[test]
    fn test_shape_rejects_out_of_range_enum() {
        let body = json!({"id": 7, "title": "x", "type": "emergency", "priority": "urgent",
                          "organization_id": 1, "created_at": "2024-05-01T08:00:00"});
        let err = Shape::one::<Incident>().validate(&body).unwrap_err();
        assert!(err.starts_with("incident"), "unexpected message: {}", err);
    }

    #[test]
    fn test_optional_and_record_shapes() {
        assert_eq!(Shape::optional::<Incident>().validate(&Value::Null), Ok(Contents::default()));
        assert!(Shape::record::<Token>().validate(&json!({"access_token": "abc"})).is_ok());
        assert!(Shape::record::<Token>().validate(&json!({})).is_err());
        assert!(Shape::ignored().validate(&json!({"message": "ok"})).is_ok());
    }

    #[test]
    fn test_team_detail_yields_nested_records() {
        let body = json!({
            "id": 4, "name": "Medic 4", "type": "medical", "organization_id": 1,
            "created_at": "2024-05-01T08:00:00",
            "members": [{"id": 40, "user_id": 2, "team_id": 4, "role": "member"}],
            "resources": [{"id": 3, "name": "Ambulance 1", "type": "vehicle", "quantity": 1,
                           "status": "available", "organization_id": 1, "team_id": 4,
                           "created_at": "2024-05-01T08:00:00"}]
        });
        let contents = Shape::one::<TeamDetail>().validate(&body).expect("detail should validate");
        assert_eq!(contents.ids, vec![4]);
        let records: Vec<_> = contents.records.iter().map(|r| (r.kind, r.id)).collect();
        assert_eq!(
            records,
            vec![(EntityKind::Team, 4), (EntityKind::TeamMember, 40), (EntityKind::Resource, 3)]
        );
    }

    #[test]
    fn test_auth_paths_are_form_encoded() {
        let login = Operation::send(Method::Post, "/auth/login", None, Shape::record::<Token>());
        assert!(login.is_form_encoded());
        assert!(!Operation::get("/organizations", Shape::many::<Organization>()).is_form_encoded());
    }
}
