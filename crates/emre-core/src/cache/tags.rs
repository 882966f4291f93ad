//! Tag declarations: what each cached result-set depends on, and what each
//! mutation invalidates.
//!
//! Invalidation is a single lookup per mutation. Declarations never reference
//! other mutations, so there is nothing to close over transitively.

use std::collections::BTreeSet;
use std::fmt;

use crate::api::{Mutation, Query};
use crate::models::{EntityKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagId {
    /// Every list of the kind, whatever its filter.
    All,
    Id(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub kind: EntityKind,
    pub id: TagId,
}

impl Tag {
    pub fn all(kind: EntityKind) -> Self {
        Self { kind, id: TagId::All }
    }

    pub fn id(kind: EntityKind, id: i64) -> Self {
        Self {
            kind,
            id: TagId::Id(id),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            TagId::All => write!(f, "{}:*", self.kind),
            TagId::Id(id) => write!(f, "{}:{}", self.kind, id),
        }
    }
}

pub type TagSet = BTreeSet<Tag>;

/// Tags carried by a result-set of `query` that contained `ids` at the top
/// level and `records` overall. A detail view depends on the rows it embeds
/// (a team's resources, an organization's teams) as much as on its own.
pub fn tags_for(query: &Query, ids: &[i64], records: &[Record]) -> TagSet {
    let mut tags = TagSet::new();
    if let Some(kind) = query.kind() {
        tags.insert(Tag::all(kind));
        tags.extend(ids.iter().map(|&id| Tag::id(kind, id)));
    }
    tags.extend(records.iter().map(|record| Tag::id(record.kind, record.id)));
    if let Some((kind, id)) = query.parent() {
        tags.insert(Tag::id(kind, id));
    }
    tags
}

/// The static invalidation set of a mutation.
pub fn invalidated_by(mutation: &Mutation) -> TagSet {
    use EntityKind::*;

    let mut tags = TagSet::new();
    let mut add = |tag: Tag| {
        tags.insert(tag);
    };

    match mutation {
        // Credential changes clear the whole store instead.
        Mutation::Login { .. } | Mutation::Register(_) => {}

        Mutation::CreateOrganization(_) => add(Tag::all(Organization)),
        Mutation::UpdateOrganization { id, patch } => {
            add(Tag::id(Organization, *id));
            if patch.affects_listing() {
                add(Tag::all(Organization));
            }
        }
        Mutation::DeleteOrganization { id } => {
            add(Tag::id(Organization, *id));
            add(Tag::all(Organization));
            add(Tag::all(Team));
            add(Tag::all(Resource));
            add(Tag::all(Incident));
        }

        Mutation::CreateTeam(team) => {
            add(Tag::all(Team));
            add(Tag::id(Organization, team.organization_id));
        }
        Mutation::UpdateTeam { id, .. } => add(Tag::id(Team, *id)),
        Mutation::AddTeamMember { team_id, .. }
        | Mutation::UpdateTeamMemberRole { team_id, .. }
        | Mutation::RemoveTeamMember { team_id, .. } => {
            add(Tag::id(Team, *team_id));
            add(Tag::all(TeamMember));
        }

        Mutation::CreateResource(resource) => {
            add(Tag::all(Resource));
            add(Tag::id(Organization, resource.organization_id));
            if let Some(team_id) = resource.team_id {
                add(Tag::id(Team, team_id));
            }
        }
        Mutation::UpdateResource { id, patch } => {
            add(Tag::id(Resource, *id));
            if patch.resource_type.is_some() {
                add(Tag::all(Resource));
            }
        }
        Mutation::SetResourceStatus { id, .. } => {
            add(Tag::id(Resource, *id));
            add(Tag::all(Resource));
        }
        Mutation::AssignResourceToTeam {
            resource_id,
            team_id,
            previous_team_id,
            ..
        } => {
            add(Tag::id(Resource, *resource_id));
            add(Tag::all(Resource));
            add(Tag::id(Team, *team_id));
            if let Some(previous) = previous_team_id {
                add(Tag::id(Team, *previous));
            }
        }
        Mutation::RemoveResourceFromTeam {
            resource_id,
            team_id,
            ..
        } => {
            add(Tag::id(Resource, *resource_id));
            add(Tag::all(Resource));
            if let Some(team_id) = team_id {
                add(Tag::id(Team, *team_id));
            }
        }

        Mutation::CreateIncident(incident) => {
            add(Tag::all(Incident));
            add(Tag::id(Organization, incident.organization_id));
        }
        Mutation::UpdateIncident { id, patch } => {
            add(Tag::id(Incident, *id));
            if patch.affects_listing() {
                add(Tag::all(Incident));
            }
        }
        // Posting on an open incident moves it to in_progress.
        Mutation::AddIncidentUpdate { incident_id, .. } => {
            add(Tag::id(Incident, *incident_id));
            add(Tag::all(Incident));
            add(Tag::all(IncidentUpdate));
        }
        Mutation::AssignResource {
            incident_id,
            resource_id,
            team_id,
            ..
        }
        | Mutation::ReturnResource {
            incident_id,
            resource_id,
            team_id,
            ..
        } => {
            add(Tag::id(Resource, *resource_id));
            add(Tag::all(Resource));
            add(Tag::id(Incident, *incident_id));
            add(Tag::all(Incident));
            add(Tag::all(ResourceAssignment));
            add(Tag::all(IncidentUpdate));
            if let Some(team_id) = team_id {
                add(Tag::id(Team, *team_id));
            }
        }
        Mutation::StartIncident { id }
        | Mutation::ResolveIncident { id, .. }
        | Mutation::CloseIncident { id, .. }
        | Mutation::ReopenIncident { id, .. } => {
            add(Tag::id(Incident, *id));
            add(Tag::all(Incident));
            add(Tag::all(IncidentUpdate));
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HistoryRange, IncidentFilter, ResourceFilter};
    use crate::models::{IncidentPatch, IncidentPriority, OrganizationPatch, ResourceStatus, TeamPatch};
    use serde_json::json;

    fn carried(query: &Query, body: serde_json::Value) -> TagSet {
        let contents = query.operation().shape.validate(&body).expect("body should validate");
        tags_for(query, &contents.ids, &contents.records)
    }

    fn hits(carried: &TagSet, mutation: &Mutation) -> bool {
        !carried.is_disjoint(&invalidated_by(mutation))
    }

    fn assign(team_id: Option<i64>) -> Mutation {
        Mutation::AssignResource {
            incident_id: 7,
            resource_id: 3,
            quantity: 1,
            notes: None,
            team_id,
        }
    }

    #[test]
    fn test_list_tags_cover_kind_and_ids() {
        let tags = tags_for(&Query::resources(&ResourceFilter::default()), &[3, 4], &[]);
        assert!(tags.contains(&Tag::all(EntityKind::Resource)));
        assert!(tags.contains(&Tag::id(EntityKind::Resource, 3)));
        assert!(tags.contains(&Tag::id(EntityKind::Resource, 4)));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_nested_list_carries_parent_tag() {
        let tags = tags_for(&Query::incident_updates(7), &[70, 71], &[]);
        assert!(tags.contains(&Tag::id(EntityKind::Incident, 7)));
        assert!(tags.contains(&Tag::id(EntityKind::IncidentUpdate, 70)));
    }

    #[test]
    fn test_assignment_invalidates_both_sides() {
        let tags = invalidated_by(&assign(None));
        for tag in [
            Tag::id(EntityKind::Resource, 3),
            Tag::all(EntityKind::Resource),
            Tag::id(EntityKind::Incident, 7),
            Tag::all(EntityKind::Incident),
        ] {
            assert!(tags.contains(&tag), "missing {}", tag);
        }
        assert!(!tags.iter().any(|t| t.kind == EntityKind::Team));
    }

    #[test]
    fn test_assignment_reaches_claiming_team() {
        let tags = invalidated_by(&assign(Some(4)));
        assert!(tags.contains(&Tag::id(EntityKind::Team, 4)));
    }

    #[test]
    fn test_team_transfer_invalidates_both_teams() {
        let tags = invalidated_by(&Mutation::AssignResourceToTeam {
            resource_id: 3,
            team_id: 5,
            previous_team_id: Some(4),
            notes: None,
        });
        assert!(tags.contains(&Tag::id(EntityKind::Team, 5)));
        assert!(tags.contains(&Tag::id(EntityKind::Team, 4)));
        assert!(tags.contains(&Tag::id(EntityKind::Resource, 3)));
    }

    #[test]
    fn test_cosmetic_updates_stay_narrow() {
        let tags = invalidated_by(&Mutation::UpdateOrganization {
            id: 1,
            patch: OrganizationPatch {
                description: Some("County EMS".into()),
                ..Default::default()
            },
        });
        assert_eq!(tags.len(), 1);

        let tags = invalidated_by(&Mutation::UpdateIncident {
            id: 7,
            patch: IncidentPatch {
                priority: Some(IncidentPriority::Critical),
                ..Default::default()
            },
        });
        assert!(tags.contains(&Tag::all(EntityKind::Incident)));
    }

    #[test]
    fn test_incident_list_is_reached_by_status_change() {
        let list = tags_for(&Query::incidents(&IncidentFilter::for_organization(1)), &[7], &[]);
        let invalidated = invalidated_by(&Mutation::CloseIncident {
            id: 9,
            resolution_notes: "done".into(),
        });
        assert!(list.iter().any(|t| invalidated.contains(t)));
    }

    #[test]
    fn test_team_detail_follows_the_resources_it_holds() {
        let detail = carried(
            &Query::team(4),
            json!({
                "id": 4, "name": "Medic 4", "type": "medical", "organization_id": 1,
                "created_at": "2024-05-01T08:00:00",
                "resources": [{"id": 3, "name": "Ambulance 1", "type": "vehicle", "quantity": 1,
                               "status": "available", "organization_id": 1, "team_id": 4,
                               "created_at": "2024-05-01T08:00:00"}]
            }),
        );

        assert!(detail.contains(&Tag::id(EntityKind::Resource, 3)));
        assert!(hits(
            &detail,
            &Mutation::SetResourceStatus {
                id: 3,
                status: ResourceStatus::OutOfService,
                notes: None,
            }
        ));
        assert!(!hits(
            &detail,
            &Mutation::SetResourceStatus {
                id: 8,
                status: ResourceStatus::OutOfService,
                notes: None,
            }
        ));
    }

    #[test]
    fn test_organization_detail_follows_its_teams() {
        let detail = carried(
            &Query::organization(1),
            json!({
                "id": 1, "name": "Ridge County EMS", "type": "emergency_response",
                "created_at": "2024-05-01T08:00:00",
                "teams": [{"id": 4, "name": "Medic 4", "type": "medical", "organization_id": 1,
                           "created_at": "2024-05-01T08:00:00"}]
            }),
        );
        assert!(hits(
            &detail,
            &Mutation::UpdateTeam {
                id: 4,
                patch: TeamPatch::default(),
            }
        ));
    }

    #[test]
    fn test_resource_history_is_reached_through_its_resource() {
        let history = carried(&Query::resource_history(3, &HistoryRange::default()), json!([]));
        assert!(hits(&history, &assign(None)));
        assert!(hits(
            &history,
            &Mutation::SetResourceStatus {
                id: 3,
                status: ResourceStatus::OutOfService,
                notes: Some("axle".into()),
            }
        ));
        assert!(!hits(&history, &Mutation::StartIncident { id: 7 }));
    }
}
