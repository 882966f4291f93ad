use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{timestamp, Entity, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ResourceType {
    Vehicle,
    Equipment,
    Medical,
    Supply,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Vehicle => "vehicle",
            ResourceType::Equipment => "equipment",
            ResourceType::Medical => "medical",
            ResourceType::Supply => "supply",
            ResourceType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ResourceStatus {
    #[default]
    Available,
    InUse,
    OutOfService,
    Reserved,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "available",
            ResourceStatus::InUse => "in_use",
            ResourceStatus::OutOfService => "out_of_service",
            ResourceStatus::Reserved => "reserved",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Resource {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: u32,
    pub status: ResourceStatus,
    pub organization_id: i64,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Resource {
    const KIND: EntityKind = EntityKind::Resource;

    fn id(&self) -> i64 {
        self.id
    }
}

/// Links a resource to an incident. `returned_at` is null while active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourceAssignment {
    pub id: i64,
    pub resource_id: i64,
    pub incident_id: i64,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub assigned_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_by_id: Option<i64>,
}

impl ResourceAssignment {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}

impl Entity for ResourceAssignment {
    const KIND: EntityKind = EntityKind::ResourceAssignment;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum HistoryAction {
    Created,
    Updated,
    Assigned,
    Returned,
    StatusChanged,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Assigned => "assigned",
            HistoryAction::Returned => "returned",
            HistoryAction::StatusChanged => "status_changed",
        }
    }
}

/// `old_value`/`new_value` are strings or numbers depending on the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct HistoryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
}

/// One entry of `GET /resources/{id}/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourceHistory {
    pub id: i64,
    pub resource_id: i64,
    pub action: HistoryAction,
    #[serde(default)]
    pub metadata: HistoryMetadata,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl Entity for ResourceHistory {
    const KIND: EntityKind = EntityKind::ResourceHistory;

    fn id(&self) -> i64 {
        self.id
    }

    fn check(&self) -> Result<(), String> {
        let numeric_or_text = |v: &Option<Value>| {
            matches!(v, None | Some(Value::String(_)) | Some(Value::Number(_)) | Some(Value::Null))
        };
        if numeric_or_text(&self.metadata.old_value) && numeric_or_text(&self.metadata.new_value) {
            Ok(())
        } else {
            Err(format!("history entry {} has a structured old/new value", self.id))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewResource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: u32,
    pub status: ResourceStatus,
    pub organization_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}
