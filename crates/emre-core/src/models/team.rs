use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resource::Resource;
use super::user::UserSummary;
use super::{timestamp, Entity, EntityKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum TeamType {
    Response,
    Medical,
    Rescue,
    Logistics,
    Support,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum TeamStatus {
    #[default]
    Active,
    Inactive,
    Standby,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum TeamRole {
    Leader,
    Dispatcher,
    Member,
}

impl TeamRole {
    /// Leaders and dispatchers may commit the team's resources to incidents.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, TeamRole::Leader | TeamRole::Dispatcher)
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamRole::Leader => write!(f, "leader"),
            TeamRole::Dispatcher => write!(f, "dispatcher"),
            TeamRole::Member => write!(f, "member"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Team {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub team_type: TeamType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geographic_area: Option<String>,
    #[serde(default)]
    pub status: TeamStatus,
    pub organization_id: i64,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Team {
    const KIND: EntityKind = EntityKind::Team;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub active_incidents: u32,
    #[serde(default)]
    pub assigned_resources: u32,
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl Entity for TeamDetail {
    const KIND: EntityKind = EntityKind::Team;

    fn id(&self) -> i64 {
        self.team.id
    }

    /// The flat team, then its roster rows and the resources it holds.
    fn records(&self) -> Result<Vec<Record>, String> {
        let mut records = vec![Record::of(&self.team)?];
        for member in &self.members {
            records.push(Record::of(member)?);
        }
        for resource in &self.resources {
            records.push(Record::of(resource)?);
        }
        Ok(records)
    }
}

/// A team roster row. Membership mutations return it without `user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeamMember {
    pub id: i64,
    pub user_id: i64,
    pub team_id: i64,
    pub role: TeamRole,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub join_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

impl TeamMember {
    pub fn display_name(&self) -> String {
        match &self.user {
            Some(user) => format!("{}, {}", user.last_name, user.first_name),
            None => format!("user #{}", self.user_id),
        }
    }
}

impl Entity for TeamMember {
    const KIND: EntityKind = EntityKind::TeamMember;

    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewTeam {
    pub name: String,
    #[serde(rename = "type")]
    pub team_type: TeamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographic_area: Option<String>,
    pub organization_id: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeamPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub team_type: Option<TeamType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographic_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TeamStatus>,
}
