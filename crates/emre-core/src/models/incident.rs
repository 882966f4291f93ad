use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{timestamp, Entity, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum IncidentType {
    Emergency,
    ResourceRequest,
    StatusUpdate,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Emergency => "emergency",
            IncidentType::ResourceRequest => "resource_request",
            IncidentType::StatusUpdate => "status_update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum IncidentPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl IncidentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentPriority::Critical => "critical",
            IncidentPriority::High => "high",
            IncidentPriority::Medium => "medium",
            IncidentPriority::Low => "low",
        }
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum IncidentStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        }
    }

    /// Open and in-progress incidents still need responders.
    pub fn is_active(&self) -> bool {
        matches!(self, IncidentStatus::Open | IncidentStatus::InProgress)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Incident {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub priority: IncidentPriority,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub location_description: Option<String>,
    pub organization_id: i64,
    #[serde(default)]
    pub created_by_id: Option<i64>,
    #[serde(default)]
    pub assigned_team_id: Option<i64>,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

impl Entity for Incident {
    const KIND: EntityKind = EntityKind::Incident;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum UpdateType {
    StatusChange,
    ResourceUpdate,
    #[default]
    GeneralUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StatusChangeMetadata {
    pub old_status: IncidentStatus,
    pub new_status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ResourceAction {
    Assigned,
    Returned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourceUpdateMetadata {
    pub resource_id: i64,
    pub resource_name: String,
    pub action: ResourceAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// Metadata interpreted according to an update's `update_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateMetadata {
    StatusChange(StatusChangeMetadata),
    ResourceUpdate(ResourceUpdateMetadata),
    General(Map<String, Value>),
}

/// One entry of an incident's append-only update log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct IncidentUpdate {
    pub id: i64,
    pub incident_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub update_type: UpdateType,
    #[serde(default)]
    pub update_metadata: Value,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

impl IncidentUpdate {
    pub fn metadata(&self) -> Result<UpdateMetadata, serde_json::Error> {
        decode_metadata(self.update_type, &self.update_metadata)
    }
}

impl Entity for IncidentUpdate {
    const KIND: EntityKind = EntityKind::IncidentUpdate;

    fn id(&self) -> i64 {
        self.id
    }

    fn check(&self) -> Result<(), String> {
        self.metadata()
            .map(|_| ())
            .map_err(|e| format!("update {} metadata does not match {:?}: {}", self.id, self.update_type, e))
    }
}

fn decode_metadata(update_type: UpdateType, raw: &Value) -> Result<UpdateMetadata, serde_json::Error> {
    match update_type {
        UpdateType::StatusChange => StatusChangeMetadata::deserialize(raw).map(UpdateMetadata::StatusChange),
        UpdateType::ResourceUpdate => {
            ResourceUpdateMetadata::deserialize(raw).map(UpdateMetadata::ResourceUpdate)
        }
        UpdateType::GeneralUpdate => match raw {
            Value::Null => Ok(UpdateMetadata::General(Map::new())),
            other => Map::deserialize(other).map(UpdateMetadata::General),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewIncident {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub priority: IncidentPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_description: Option<String>,
    pub organization_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_team_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct IncidentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_team_id: Option<i64>,
}

impl IncidentPatch {
    pub fn affects_listing(&self) -> bool {
        self.priority.is_some() || self.status.is_some() || self.assigned_team_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewIncidentUpdate {
    pub content: String,
    pub update_type: UpdateType,
    pub update_metadata: Value,
}

impl NewIncidentUpdate {
    pub fn general(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            update_type: UpdateType::GeneralUpdate,
            update_metadata: Value::Object(Map::new()),
        }
    }

    pub fn status_change(content: impl Into<String>, metadata: &StatusChangeMetadata) -> Self {
        Self {
            content: content.into(),
            update_type: UpdateType::StatusChange,
            update_metadata: serde_json::to_value(metadata).unwrap_or_default(),
        }
    }

    pub fn resource_update(content: impl Into<String>, metadata: &ResourceUpdateMetadata) -> Self {
        Self {
            content: content.into(),
            update_type: UpdateType::ResourceUpdate,
            update_metadata: serde_json::to_value(metadata).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(update_type: &str, metadata: Value) -> IncidentUpdate {
        serde_json::from_value(json!({
            "id": 1, "incident_id": 7, "user_id": 2, "content": "note",
            "update_type": update_type, "update_metadata": metadata,
            "created_at": "2024-05-01T08:00:00"
        }))
        .expect("update should parse")
    }

    #[test]
    fn test_incident_defaults_to_open() {
        let json = r#"{"id": 7, "title": "Flooding", "type": "emergency", "priority": "high",
                       "organization_id": 1, "created_at": "2024-05-01T08:00:00"}"#;
        let incident: Incident = serde_json::from_str(json).expect("incident should parse");
        assert_eq!(incident.status, IncidentStatus::Open);
        assert!(incident.resolved_at.is_none());
        assert!(incident.coordinates().is_none());
    }

    #[test]
    fn test_status_change_metadata_is_checked() {
        let ok = update("status_change", json!({"old_status": "open", "new_status": "in_progress"}));
        assert!(ok.check().is_ok());
        match ok.metadata().unwrap() {
            UpdateMetadata::StatusChange(meta) => assert_eq!(meta.new_status, IncidentStatus::InProgress),
            other => panic!("unexpected metadata {:?}", other),
        }

        let bad = update("status_change", json!({"resource_id": 3}));
        assert!(bad.check().is_err());
    }

    #[test]
    fn test_general_update_accepts_empty_metadata() {
        assert!(update("general_update", json!({})).check().is_ok());
        assert!(update("general_update", Value::Null).check().is_ok());
        assert!(update("general_update", json!([1, 2])).check().is_err());
    }

    #[test]
    fn test_new_update_constructors_match_type() {
        let meta = ResourceUpdateMetadata {
            resource_id: 4,
            resource_name: "Generator".into(),
            action: ResourceAction::Assigned,
            quantity: Some(2),
        };
        let new = NewIncidentUpdate::resource_update("Generator on site", &meta);
        assert_eq!(new.update_type, UpdateType::ResourceUpdate);
        assert_eq!(new.update_metadata["action"], "assigned");
        assert_eq!(NewIncidentUpdate::general("hi").update_metadata, json!({}));
    }
}
