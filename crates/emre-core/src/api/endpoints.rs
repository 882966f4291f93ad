//! Declared read and write operations against `/api/v1`.
//!
//! A [`Query`] is a cacheable read: a name, canonical arguments and the bound
//! request. A [`Mutation`] is a write; what it invalidates is declared in
//! `cache::tags`.

use serde_json::json;

use crate::cache::CacheKey;
use crate::models::{
    EntityKind, Incident, IncidentUpdate, NewIncident, NewIncidentUpdate, NewOrganization,
    NewResource, NewTeam, NewUser, Organization, OrganizationDetail, OrganizationPatch,
    IncidentPatch, Resource, ResourceAssignment, ResourceHistory, ResourcePatch, ResourceStatus,
    Team, TeamDetail,
    TeamMember, TeamPatch, TeamRole, Token, User,
};

use super::filters::{Args, HistoryRange, IncidentFilter, OrganizationFilter, ResourceFilter};
use super::operation::{Method, Operation, Shape};

#[derive(Debug, Clone)]
pub struct Query {
    name: &'static str,
    args: Args,
    parent: Option<(EntityKind, i64)>,
    operation: Operation,
}

impl Query {
    fn new(name: &'static str, args: Args, operation: Operation) -> Self {
        Self {
            name,
            args,
            parent: None,
            operation,
        }
    }

    fn by_id(name: &'static str, id: i64, operation: Operation) -> Self {
        let mut args = Args::new();
        args.insert("id", id.to_string());
        Self::new(name, args, operation)
    }

    fn nested(name: &'static str, parent: (EntityKind, i64), operation: Operation) -> Self {
        let mut query = Self::by_id(name, parent.1, operation);
        query.parent = Some(parent);
        query
    }

    /// List endpoints take their canonical arguments as query parameters.
    fn listing(name: &'static str, args: Args, path: &str, shape: Shape) -> Self {
        let params = args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Self::new(name, args, Operation::get(path, shape).with_params(params))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// The entity kind the result-set holds, if it holds entities.
    pub fn kind(&self) -> Option<EntityKind> {
        self.operation.shape.kind()
    }

    /// The owning entity of a nested collection.
    pub fn parent(&self) -> Option<(EntityKind, i64)> {
        self.parent
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.name, &self.args)
    }

    // ===== Users =====

    pub fn current_user() -> Self {
        Self::new("current_user", Args::new(), Operation::get("/users/me", Shape::one::<User>()))
    }

    // ===== Organizations =====

    pub fn organizations(filter: &OrganizationFilter) -> Self {
        Self::listing(
            "list_organizations",
            filter.args(),
            "/organizations",
            Shape::many::<Organization>(),
        )
    }

    pub fn organization(id: i64) -> Self {
        Self::by_id(
            "get_organization",
            id,
            Operation::get(format!("/organizations/{}", id), Shape::one::<OrganizationDetail>()),
        )
    }

    // ===== Teams =====

    pub fn organization_teams(organization_id: i64) -> Self {
        Self::nested(
            "list_organization_teams",
            (EntityKind::Organization, organization_id),
            Operation::get(
                format!("/teams/organization/{}", organization_id),
                Shape::many::<Team>(),
            ),
        )
    }

    pub fn team(id: i64) -> Self {
        Self::by_id(
            "get_team",
            id,
            Operation::get(format!("/teams/{}", id), Shape::one::<TeamDetail>()),
        )
    }

    pub fn team_members(team_id: i64) -> Self {
        Self::nested(
            "list_team_members",
            (EntityKind::Team, team_id),
            Operation::get(format!("/teams/{}/members", team_id), Shape::many::<TeamMember>()),
        )
    }

    // ===== Resources =====

    pub fn resources(filter: &ResourceFilter) -> Self {
        Self::listing("list_resources", filter.args(), "/resources", Shape::many::<Resource>())
    }

    pub fn resource(id: i64) -> Self {
        Self::by_id(
            "get_resource",
            id,
            Operation::get(format!("/resources/{}", id), Shape::one::<Resource>()),
        )
    }

    pub fn resource_assignments(resource_id: i64) -> Self {
        Self::nested(
            "list_resource_assignments",
            (EntityKind::Resource, resource_id),
            Operation::get(
                format!("/resources/{}/assignments", resource_id),
                Shape::many::<ResourceAssignment>(),
            ),
        )
    }

    /// Activity log of one resource, optionally bounded by date.
    pub fn resource_history(resource_id: i64, range: &HistoryRange) -> Self {
        let mut query = Self::listing(
            "resource_history",
            range.args(),
            &format!("/resources/{}/history", resource_id),
            Shape::many::<ResourceHistory>(),
        );
        query.args.insert("id", resource_id.to_string());
        query.parent = Some((EntityKind::Resource, resource_id));
        query
    }

    // ===== Incidents =====

    pub fn incidents(filter: &IncidentFilter) -> Self {
        Self::listing("list_incidents", filter.args(), "/incidents", Shape::many::<Incident>())
    }

    pub fn incident(id: i64) -> Self {
        Self::by_id(
            "get_incident",
            id,
            Operation::get(format!("/incidents/{}", id), Shape::one::<Incident>()),
        )
    }

    pub fn incident_updates(incident_id: i64) -> Self {
        Self::nested(
            "list_incident_updates",
            (EntityKind::Incident, incident_id),
            Operation::get(
                format!("/incidents/{}/updates", incident_id),
                Shape::many::<IncidentUpdate>(),
            ),
        )
    }
}

/// Every write the client can issue.
///
/// Relationship mutations carry the ids of every entity whose cached views
/// they affect (e.g. the team that holds a resource), because invalidation is
/// declared from the mutation alone.
#[derive(Debug, Clone)]
pub enum Mutation {
    Login {
        username: String,
        password: String,
    },
    Register(NewUser),

    CreateOrganization(NewOrganization),
    UpdateOrganization {
        id: i64,
        patch: OrganizationPatch,
    },
    DeleteOrganization {
        id: i64,
    },

    CreateTeam(NewTeam),
    UpdateTeam {
        id: i64,
        patch: TeamPatch,
    },
    AddTeamMember {
        team_id: i64,
        user_id: i64,
        role: TeamRole,
    },
    UpdateTeamMemberRole {
        team_id: i64,
        user_id: i64,
        role: TeamRole,
    },
    RemoveTeamMember {
        team_id: i64,
        user_id: i64,
    },

    CreateResource(NewResource),
    UpdateResource {
        id: i64,
        patch: ResourcePatch,
    },
    SetResourceStatus {
        id: i64,
        status: ResourceStatus,
        notes: Option<String>,
    },
    AssignResourceToTeam {
        resource_id: i64,
        team_id: i64,
        previous_team_id: Option<i64>,
        notes: Option<String>,
    },
    RemoveResourceFromTeam {
        resource_id: i64,
        team_id: Option<i64>,
        notes: Option<String>,
    },

    CreateIncident(NewIncident),
    UpdateIncident {
        id: i64,
        patch: IncidentPatch,
    },
    AddIncidentUpdate {
        incident_id: i64,
        update: NewIncidentUpdate,
    },
    AssignResource {
        incident_id: i64,
        resource_id: i64,
        quantity: u32,
        notes: Option<String>,
        team_id: Option<i64>,
    },
    ReturnResource {
        incident_id: i64,
        resource_id: i64,
        notes: Option<String>,
        team_id: Option<i64>,
    },
    StartIncident {
        id: i64,
    },
    ResolveIncident {
        id: i64,
        resolution_notes: String,
    },
    CloseIncident {
        id: i64,
        resolution_notes: String,
    },
    ReopenIncident {
        id: i64,
        reason: String,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Login { .. } => "login",
            Mutation::Register(_) => "register",
            Mutation::CreateOrganization(_) => "create_organization",
            Mutation::UpdateOrganization { .. } => "update_organization",
            Mutation::DeleteOrganization { .. } => "delete_organization",
            Mutation::CreateTeam(_) => "create_team",
            Mutation::UpdateTeam { .. } => "update_team",
            Mutation::AddTeamMember { .. } => "add_team_member",
            Mutation::UpdateTeamMemberRole { .. } => "update_team_member_role",
            Mutation::RemoveTeamMember { .. } => "remove_team_member",
            Mutation::CreateResource(_) => "create_resource",
            Mutation::UpdateResource { .. } => "update_resource",
            Mutation::SetResourceStatus { .. } => "set_resource_status",
            Mutation::AssignResourceToTeam { .. } => "assign_resource_to_team",
            Mutation::RemoveResourceFromTeam { .. } => "remove_resource_from_team",
            Mutation::CreateIncident(_) => "create_incident",
            Mutation::UpdateIncident { .. } => "update_incident",
            Mutation::AddIncidentUpdate { .. } => "add_incident_update",
            Mutation::AssignResource { .. } => "assign_resource",
            Mutation::ReturnResource { .. } => "return_resource",
            Mutation::StartIncident { .. } => "start_incident",
            Mutation::ResolveIncident { .. } => "resolve_incident",
            Mutation::CloseIncident { .. } => "close_incident",
            Mutation::ReopenIncident { .. } => "reopen_incident",
        }
    }

    pub fn operation(&self) -> Operation {
        use Method::{Delete, Patch, Post, Put};

        match self {
            Mutation::Login { username, password } => Operation::send(
                Post,
                "/auth/login",
                Some(json!({"username": username, "password": password})),
                Shape::record::<Token>(),
            ),
            Mutation::Register(user) => {
                Operation::send(Post, "/users", Some(json!(user)), Shape::one::<User>())
            }

            Mutation::CreateOrganization(org) => Operation::send(
                Post,
                "/organizations",
                Some(json!(org)),
                Shape::one::<Organization>(),
            ),
            Mutation::UpdateOrganization { id, patch } => Operation::send(
                Patch,
                format!("/organizations/{}", id),
                Some(json!(patch)),
                Shape::one::<Organization>(),
            ),
            Mutation::DeleteOrganization { id } => Operation::send(
                Delete,
                format!("/organizations/{}", id),
                None,
                Shape::ignored(),
            ),

            Mutation::CreateTeam(team) => {
                Operation::send(Post, "/teams", Some(json!(team)), Shape::one::<Team>())
            }
            Mutation::UpdateTeam { id, patch } => Operation::send(
                Put,
                format!("/teams/{}", id),
                Some(json!(patch)),
                Shape::one::<Team>(),
            ),
            Mutation::AddTeamMember {
                team_id,
                user_id,
                role,
            } => Operation::send(
                Post,
                format!("/teams/{}/members", team_id),
                Some(json!({"user_id": user_id, "role": role})),
                Shape::one::<TeamMember>(),
            ),
            Mutation::UpdateTeamMemberRole {
                team_id,
                user_id,
                role,
            } => Operation::send(
                Put,
                format!("/teams/{}/members/{}/role", team_id, user_id),
                Some(json!({"role": role})),
                Shape::one::<TeamMember>(),
            ),
            Mutation::RemoveTeamMember { team_id, user_id } => Operation::send(
                Delete,
                format!("/teams/{}/members/{}", team_id, user_id),
                None,
                Shape::ignored(),
            ),

            Mutation::CreateResource(resource) => Operation::send(
                Post,
                "/resources",
                Some(json!(resource)),
                Shape::one::<Resource>(),
            ),
            Mutation::UpdateResource { id, patch } => Operation::send(
                Put,
                format!("/resources/{}", id),
                Some(json!(patch)),
                Shape::one::<Resource>(),
            ),
            Mutation::SetResourceStatus { id, status, notes } => Operation::send(
                Put,
                format!("/resources/{}/status", id),
                Some(json!({"status": status, "notes": notes})),
                Shape::one::<Resource>(),
            ),
            Mutation::AssignResourceToTeam {
                resource_id,
                team_id,
                notes,
                ..
            } => Operation::send(
                Put,
                format!("/resources/{}/team", resource_id),
                Some(json!({"team_id": team_id, "notes": notes})),
                Shape::one::<Resource>(),
            ),
            Mutation::RemoveResourceFromTeam {
                resource_id, notes, ..
            } => Operation::send(
                Delete,
                format!("/resources/{}/team", resource_id),
                Some(json!({"notes": notes})),
                Shape::optional::<Resource>(),
            ),

            Mutation::CreateIncident(incident) => Operation::send(
                Post,
                "/incidents",
                Some(json!(incident)),
                Shape::one::<Incident>(),
            ),
            Mutation::UpdateIncident { id, patch } => Operation::send(
                Put,
                format!("/incidents/{}", id),
                Some(json!(patch)),
                Shape::one::<Incident>(),
            ),
            Mutation::AddIncidentUpdate {
                incident_id,
                update,
            } => Operation::send(
                Post,
                format!("/incidents/{}/updates", incident_id),
                Some(json!(update)),
                Shape::optional::<IncidentUpdate>(),
            ),
            Mutation::AssignResource {
                incident_id,
                resource_id,
                quantity,
                notes,
                ..
            } => Operation::send(
                Post,
                format!("/incidents/{}/resources", incident_id),
                Some(json!({"resource_id": resource_id, "quantity": quantity, "notes": notes})),
                Shape::optional::<ResourceAssignment>(),
            ),
            Mutation::ReturnResource {
                incident_id,
                resource_id,
                notes,
                ..
            } => Operation::send(
                Post,
                format!("/incidents/{}/resources/{}/return", incident_id, resource_id),
                Some(json!({"notes": notes})),
                Shape::optional::<ResourceAssignment>(),
            ),
            Mutation::StartIncident { id } => Operation::send(
                Put,
                format!("/incidents/{}", id),
                Some(json!({"status": "in_progress"})),
                Shape::one::<Incident>(),
            ),
            Mutation::ResolveIncident {
                id,
                resolution_notes,
            } => Operation::send(
                Put,
                format!("/incidents/{}", id),
                Some(json!({"status": "resolved", "resolution_notes": resolution_notes})),
                Shape::one::<Incident>(),
            ),
            Mutation::CloseIncident {
                id,
                resolution_notes,
            } => Operation::send(
                Post,
                format!("/incidents/{}/close", id),
                Some(json!({"resolution_notes": resolution_notes})),
                Shape::optional::<Incident>(),
            ),
            Mutation::ReopenIncident { id, reason } => Operation::send(
                Post,
                format!("/incidents/{}/reopen", id),
                Some(json!({"reason": reason})),
                Shape::optional::<Incident>(),
            ),
        }
    }

    /// The entity removed from the backend, if this is a delete.
    pub fn deleted(&self) -> Option<(EntityKind, i64)> {
        match self {
            Mutation::DeleteOrganization { id } => Some((EntityKind::Organization, *id)),
            _ => None,
        }
    }
}
