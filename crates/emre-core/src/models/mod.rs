//! Data models for EmRe entities.
//!
//! This module is the wire contract shared by every other layer:
//!
//! - `Organization`, `OrganizationDetail`: owning tenants
//! - `Team`, `TeamDetail`, `TeamMember`: response units and their rosters
//! - `Resource`, `ResourceAssignment`: physical assets and their commitments
//! - `Incident`, `IncidentUpdate`: reported events and their append-only log
//! - `User`, `Token`: account and login payloads
//!
//! Enum values use the backend's `snake_case` strings. Unknown values and
//! missing required fields fail deserialization; nothing is coerced.

pub mod incident;
pub mod organization;
pub mod resource;
pub mod team;
pub mod timestamp;
pub mod user;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub use incident::{
    Incident, IncidentPatch, IncidentPriority, IncidentStatus, IncidentType, IncidentUpdate,
    NewIncident, NewIncidentUpdate, ResourceAction, ResourceUpdateMetadata, StatusChangeMetadata,
    UpdateMetadata, UpdateType,
};
pub use organization::{
    NewOrganization, Organization, OrganizationDetail, OrganizationPatch, OrganizationType,
    Visibility,
};
pub use resource::{
    HistoryAction, HistoryMetadata, NewResource, Resource, ResourceAssignment, ResourceHistory,
    ResourcePatch, ResourceStatus, ResourceType,
};
pub use team::{NewTeam, Team, TeamDetail, TeamMember, TeamPatch, TeamRole, TeamStatus, TeamType};
pub use user::{NewUser, Token, User, UserSummary};

/// Every kind of record the cache can hold or tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum EntityKind {
    Organization,
    Team,
    TeamMember,
    Resource,
    ResourceAssignment,
    ResourceHistory,
    Incident,
    IncidentUpdate,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Organization => "organization",
            EntityKind::Team => "team",
            EntityKind::TeamMember => "team_member",
            EntityKind::Resource => "resource",
            EntityKind::ResourceAssignment => "resource_assignment",
            EntityKind::ResourceHistory => "resource_history",
            EntityKind::Incident => "incident",
            EntityKind::IncidentUpdate => "incident_update",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record with an integer identity that the cache can normalize.
pub trait Entity: DeserializeOwned + Serialize {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    /// Structural checks serde cannot express on its own.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }

    /// This record in flat form, followed by every record nested inside it.
    fn records(&self) -> Result<Vec<Record>, String> {
        Ok(vec![Record::of(self)?])
    }
}

/// One normalized record taken out of a response body.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: EntityKind,
    pub id: i64,
    pub value: Value,
}

impl Record {
    pub fn of<T: Entity>(entity: &T) -> Result<Self, String> {
        let value = serde_json::to_value(entity)
            .map_err(|e| format!("{} {}: {}", T::KIND, entity.id(), e))?;
        Ok(Self {
            kind: T::KIND,
            id: entity.id(),
            value,
        })
    }
}
