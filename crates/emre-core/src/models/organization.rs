use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::team::Team;
use super::{timestamp, Entity, EntityKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum OrganizationType {
    EmergencyResponse,
    ResourceDistribution,
    VolunteerCoordination,
    DisasterRelief,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::EmergencyResponse => "emergency_response",
            OrganizationType::ResourceDistribution => "resource_distribution",
            OrganizationType::VolunteerCoordination => "volunteer_coordination",
            OrganizationType::DisasterRelief => "disaster_relief",
        }
    }
}

impl fmt::Display for OrganizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub org_type: OrganizationType,
    #[serde(default)]
    pub description: Option<String>,
    // The list page and the schema disagree on this field's name
    #[serde(default, alias = "region")]
    pub location: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, alias = "is_verified")]
    pub verification_status: bool,
    #[serde(default)]
    pub created_by_id: Option<i64>,
    #[serde(with = "timestamp::required")]
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn location_display(&self) -> &str {
        self.location.as_deref().unwrap_or("-")
    }
}

impl Entity for Organization {
    const KIND: EntityKind = EntityKind::Organization;

    fn id(&self) -> i64 {
        self.id
    }
}

/// `GET /organizations/{id}` adds roll-up counts and the team list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: Organization,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub team_count: u32,
    #[serde(default)]
    pub resource_count: u32,
    #[serde(default)]
    pub active_incidents: u32,
}

impl Entity for OrganizationDetail {
    const KIND: EntityKind = EntityKind::Organization;

    fn id(&self) -> i64 {
        self.organization.id
    }

    fn records(&self) -> Result<Vec<Record>, String> {
        let mut records = vec![Record::of(&self.organization)?];
        for team in &self.teams {
            records.push(Record::of(team)?);
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewOrganization {
    pub name: String,
    #[serde(rename = "type")]
    pub org_type: OrganizationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OrganizationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub org_type: Option<OrganizationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl OrganizationPatch {
    /// Whether the patch touches a field that list queries filter on.
    pub fn affects_listing(&self) -> bool {
        self.name.is_some() || self.org_type.is_some() || self.visibility.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_organization_with_region_alias() {
        let json = r#"{
            "id": 4, "name": "Ridge County EMS", "type": "emergency_response",
            "region": "Ridge County", "visibility": "public", "is_verified": true,
            "created_by_id": 1, "created_at": "2024-05-01T08:00:00"
        }"#;
        let org: Organization = serde_json::from_str(json).expect("organization should parse");
        assert_eq!(org.location_display(), "Ridge County");
        assert!(org.verification_status);
        assert_eq!(org.org_type, OrganizationType::EmergencyResponse);
        assert!(org.updated_at.is_none());
    }

    #[test]
    fn test_unknown_organization_type_is_rejected() {
        let json = r#"{"id": 1, "name": "X", "type": "fire_brigade", "created_at": "2024-05-01T08:00:00"}"#;
        assert!(serde_json::from_str::<Organization>(json).is_err());
    }

    #[test]
    fn test_detail_records_are_flat_and_include_teams() {
        let json = r#"{
            "id": 4, "name": "Ridge County EMS", "type": "emergency_response",
            "created_at": "2024-05-01T08:00:00", "member_count": 3,
            "teams": [{"id": 9, "name": "Medic 9", "type": "medical", "organization_id": 4,
                       "created_at": "2024-05-01T08:00:00"}]
        }"#;
        let detail: OrganizationDetail = serde_json::from_str(json).expect("detail should parse");
        let records = detail.records().expect("records should serialize");

        let ids: Vec<_> = records.iter().map(|r| (r.kind, r.id)).collect();
        assert_eq!(ids, vec![(EntityKind::Organization, 4), (EntityKind::Team, 9)]);
        assert!(records[0].value.get("teams").is_none());
        assert!(records[0].value.get("member_count").is_none());
    }

    #[test]
    fn test_detail_flattens_organization() {
        let json = r#"{
            "id": 2, "name": "Relief", "type": "disaster_relief", "visibility": "private",
            "created_at": "2024-05-01T08:00:00Z", "member_count": 12, "team_count": 2,
            "resource_count": 7, "active_incidents": 1, "teams": []
        }"#;
        let detail: OrganizationDetail = serde_json::from_str(json).expect("detail should parse");
        assert_eq!(detail.id(), 2);
        assert_eq!(detail.organization.visibility, Visibility::Private);
        assert_eq!(detail.resource_count, 7);
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = OrganizationPatch {
            visibility: Some(Visibility::Private),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), serde_json::json!({"visibility": "private"}));
        assert!(patch.affects_listing());
        assert!(!OrganizationPatch { description: Some("x".into()), ..Default::default() }.affects_listing());
    }
}
