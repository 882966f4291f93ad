//! Typed facade over the cache and the request executor.
//!
//! Reads go through the [`CacheStore`]. Mutations run the lifecycle checks
//! against cached state first, then the request, then the store's
//! invalidation. A 401 anywhere ends the session and empties the cache.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{
    ApiClient, HistoryRange, IncidentFilter, Mutation, OrganizationFilter, Payload, Query,
    RequestError, ResourceFilter, ReqwestTransport, Transport,
};
use crate::auth::{Session, SessionData};
use crate::cache::{CacheStore, FetchFn, Subscription};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lifecycle::{incident, resource};
use crate::models::{
    Incident, IncidentPatch, IncidentUpdate, NewIncident, NewIncidentUpdate, NewOrganization,
    NewResource, NewTeam, NewUser, Organization, OrganizationDetail, OrganizationPatch, Resource,
    ResourceAssignment, ResourceHistory, ResourcePatch, ResourceStatus, Team, TeamDetail,
    TeamMember, TeamPatch, TeamRole, Token, User,
};

#[derive(Clone)]
pub struct EmreClient {
    api: ApiClient,
    store: CacheStore,
}

fn decode<T: DeserializeOwned>(what: &'static str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| Error::Decode {
        what,
        message: e.to_string(),
    })
}

impl EmreClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        session: Session,
        keep_unused_for: Duration,
    ) -> Self {
        let api = ApiClient::new(transport, base_url, session);
        let fetcher = api.clone();
        let fetch: FetchFn = Arc::new(move |operation| {
            let api = fetcher.clone();
            async move {
                let result = api.execute(&operation).await;
                if matches!(result, Err(RequestError::Unauthorized)) {
                    api.session().clear();
                }
                result
            }
            .boxed()
        });
        let store = CacheStore::with_keep_unused_for(fetch, keep_unused_for);
        store.clear_on_sign_out(api.session().watch());
        Self { api, store }
    }

    /// Production client: reqwest transport with the configured timeout.
    pub fn from_config(config: &Config, session: Session) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout()).map_err(RequestError::from)?;
        Ok(Self::new(
            Arc::new(transport),
            config.api_base_url.clone(),
            session,
            config.keep_unused_for(),
        ))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn session(&self) -> &Session {
        self.api.session()
    }

    // ===== Session =====

    /// Exchange credentials for a token. The cache is emptied so nothing
    /// fetched under a previous identity survives.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData> {
        let mutation = Mutation::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let payload = self.api.execute(&mutation.operation()).await?;
        let token: Token = decode("token", &payload.data)?;

        self.store.clear();
        let mut data = SessionData::new(token.access_token, Some(username.to_string()));
        data.token_type = token.token_type;
        self.session().set(data.clone());
        info!(username, "Logged in");
        Ok(data)
    }

    pub async fn register(&self, user: NewUser) -> Result<User> {
        self.mutate_into("user", Mutation::Register(user)).await
    }

    pub fn logout(&self) {
        self.teardown();
        info!("Logged out");
    }

    fn teardown(&self) {
        self.session().clear();
        self.store.clear();
    }

    // ===== Reads =====

    /// Subscribe to a query; the entry is fetched if missing or stale and
    /// kept while the subscription lives.
    pub fn watch(&self, query: &Query) -> Subscription {
        self.store.subscribe(query)
    }

    pub async fn read<T: DeserializeOwned>(&self, query: &Query) -> Result<T> {
        let value = self.store.read(query).await?;
        decode(query.name(), &value)
    }

    pub async fn current_user(&self) -> Result<User> {
        self.read(&Query::current_user()).await
    }

    pub async fn organizations(&self, filter: &OrganizationFilter) -> Result<Vec<Organization>> {
        self.read(&Query::organizations(filter)).await
    }

    pub async fn organization(&self, id: i64) -> Result<OrganizationDetail> {
        self.read(&Query::organization(id)).await
    }

    pub async fn organization_teams(&self, organization_id: i64) -> Result<Vec<Team>> {
        self.read(&Query::organization_teams(organization_id)).await
    }

    pub async fn team(&self, id: i64) -> Result<TeamDetail> {
        self.read(&Query::team(id)).await
    }

    pub async fn team_members(&self, team_id: i64) -> Result<Vec<TeamMember>> {
        self.read(&Query::team_members(team_id)).await
    }

    pub async fn resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        self.read(&Query::resources(filter)).await
    }

    pub async fn resource(&self, id: i64) -> Result<Resource> {
        self.read(&Query::resource(id)).await
    }

    pub async fn resource_assignments(&self, resource_id: i64) -> Result<Vec<ResourceAssignment>> {
        self.read(&Query::resource_assignments(resource_id)).await
    }

    pub async fn resource_history(
        &self,
        resource_id: i64,
        range: &HistoryRange,
    ) -> Result<Vec<ResourceHistory>> {
        self.read(&Query::resource_history(resource_id, range)).await
    }

    pub async fn incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
        self.read(&Query::incidents(filter)).await
    }

    pub async fn incident(&self, id: i64) -> Result<Incident> {
        self.read(&Query::incident(id)).await
    }

    pub async fn incident_updates(&self, incident_id: i64) -> Result<Vec<IncidentUpdate>> {
        self.read(&Query::incident_updates(incident_id)).await
    }

    // ===== Mutations =====

    /// Run one mutation and apply its invalidation. Never retried.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Payload> {
        match self.api.execute(&mutation.operation()).await {
            Ok(payload) => {
                self.store.apply(&mutation, Some(&payload));
                Ok(payload)
            }
            Err(err) => {
                if err.is_unauthorized() {
                    warn!(mutation = mutation.name(), "Unauthorized, ending session");
                    self.teardown();
                }
                Err(err.into())
            }
        }
    }

    async fn mutate_into<T: DeserializeOwned>(
        &self,
        what: &'static str,
        mutation: Mutation,
    ) -> Result<T> {
        let payload = self.mutate(mutation).await?;
        decode(what, &payload.data)
    }

    /// For endpoints that may answer with an empty body.
    async fn mutate_maybe<T: DeserializeOwned>(
        &self,
        what: &'static str,
        mutation: Mutation,
    ) -> Result<Option<T>> {
        let payload = self.mutate(mutation).await?;
        if payload.data.is_null() {
            Ok(None)
        } else {
            decode(what, &payload.data).map(Some)
        }
    }

    pub async fn create_organization(&self, org: NewOrganization) -> Result<Organization> {
        self.mutate_into("organization", Mutation::CreateOrganization(org)).await
    }

    pub async fn update_organization(
        &self,
        id: i64,
        patch: OrganizationPatch,
    ) -> Result<Organization> {
        self.mutate_into("organization", Mutation::UpdateOrganization { id, patch })
            .await
    }

    pub async fn delete_organization(&self, id: i64) -> Result<()> {
        self.mutate(Mutation::DeleteOrganization { id }).await.map(|_| ())
    }

    pub async fn create_team(&self, team: NewTeam) -> Result<Team> {
        self.mutate_into("team", Mutation::CreateTeam(team)).await
    }

    pub async fn update_team(&self, id: i64, patch: TeamPatch) -> Result<Team> {
        self.mutate_into("team", Mutation::UpdateTeam { id, patch }).await
    }

    pub async fn add_team_member(
        &self,
        team_id: i64,
        user_id: i64,
        role: TeamRole,
    ) -> Result<TeamMember> {
        self.mutate_into(
            "team member",
            Mutation::AddTeamMember {
                team_id,
                user_id,
                role,
            },
        )
        .await
    }

    pub async fn update_team_member_role(
        &self,
        team_id: i64,
        user_id: i64,
        role: TeamRole,
    ) -> Result<TeamMember> {
        self.mutate_into(
            "team member",
            Mutation::UpdateTeamMemberRole {
                team_id,
                user_id,
                role,
            },
        )
        .await
    }

    pub async fn remove_team_member(&self, team_id: i64, user_id: i64) -> Result<()> {
        self.mutate(Mutation::RemoveTeamMember { team_id, user_id })
            .await
            .map(|_| ())
    }

    pub async fn create_resource(&self, resource: NewResource) -> Result<Resource> {
        self.mutate_into("resource", Mutation::CreateResource(resource)).await
    }

    pub async fn update_resource(&self, id: i64, patch: ResourcePatch) -> Result<Resource> {
        self.mutate_into("resource", Mutation::UpdateResource { id, patch }).await
    }

    pub async fn set_resource_status(
        &self,
        id: i64,
        status: ResourceStatus,
        notes: Option<String>,
    ) -> Result<Resource> {
        self.mutate_into("resource", Mutation::SetResourceStatus { id, status, notes })
            .await
    }

    /// Move a resource to `team_id`. The team currently holding it is looked
    /// up so both rosters are refreshed.
    pub async fn assign_resource_to_team(
        &self,
        resource_id: i64,
        team_id: i64,
        notes: Option<String>,
    ) -> Result<Resource> {
        let current = self.resource(resource_id).await?;
        self.mutate_into(
            "resource",
            Mutation::AssignResourceToTeam {
                resource_id,
                team_id,
                previous_team_id: current.team_id.filter(|&t| t != team_id),
                notes,
            },
        )
        .await
    }

    pub async fn remove_resource_from_team(
        &self,
        resource_id: i64,
        notes: Option<String>,
    ) -> Result<Option<Resource>> {
        let current = self.resource(resource_id).await?;
        self.mutate_maybe(
            "resource",
            Mutation::RemoveResourceFromTeam {
                resource_id,
                team_id: current.team_id,
                notes,
            },
        )
        .await
    }

    pub async fn create_incident(&self, incident: NewIncident) -> Result<Incident> {
        self.mutate_into("incident", Mutation::CreateIncident(incident)).await
    }

    pub async fn update_incident(&self, id: i64, patch: IncidentPatch) -> Result<Incident> {
        let mutation = Mutation::UpdateIncident { id, patch };
        self.check_incident(id, &mutation).await?;
        self.mutate_into("incident", mutation).await
    }

    /// Post to the incident log. The first update on an open incident moves
    /// it to in progress.
    pub async fn add_incident_update(
        &self,
        incident_id: i64,
        update: NewIncidentUpdate,
    ) -> Result<Option<IncidentUpdate>> {
        let mutation = Mutation::AddIncidentUpdate {
            incident_id,
            update,
        };
        self.check_incident(incident_id, &mutation).await?;
        self.mutate_maybe("incident update", mutation).await
    }

    pub async fn start_incident(&self, id: i64) -> Result<Incident> {
        let mutation = Mutation::StartIncident { id };
        self.check_incident(id, &mutation).await?;
        self.mutate_into("incident", mutation).await
    }

    pub async fn resolve_incident(&self, id: i64, resolution_notes: &str) -> Result<Incident> {
        let mutation = Mutation::ResolveIncident {
            id,
            resolution_notes: resolution_notes.to_string(),
        };
        self.check_incident(id, &mutation).await?;
        self.mutate_into("incident", mutation).await
    }

    pub async fn close_incident(&self, id: i64, resolution_notes: &str) -> Result<Option<Incident>> {
        let mutation = Mutation::CloseIncident {
            id,
            resolution_notes: resolution_notes.to_string(),
        };
        self.check_incident(id, &mutation).await?;
        self.mutate_maybe("incident", mutation).await
    }

    pub async fn reopen_incident(&self, id: i64, reason: &str) -> Result<Option<Incident>> {
        let mutation = Mutation::ReopenIncident {
            id,
            reason: reason.to_string(),
        };
        self.check_incident(id, &mutation).await?;
        self.mutate_maybe("incident", mutation).await
    }

    /// Commit `quantity` of a resource to an incident.
    pub async fn assign_resource(
        &self,
        incident_id: i64,
        resource_id: i64,
        quantity: u32,
        notes: Option<String>,
    ) -> Result<Option<ResourceAssignment>> {
        let target = self.resource(resource_id).await?;
        let history = self.resource_assignments(resource_id).await?;
        resource::check_assign(&target, &history, quantity)?;

        self.mutate_maybe(
            "resource assignment",
            Mutation::AssignResource {
                incident_id,
                resource_id,
                quantity,
                notes,
                team_id: target.team_id,
            },
        )
        .await
    }

    pub async fn return_resource(
        &self,
        incident_id: i64,
        resource_id: i64,
        notes: Option<String>,
    ) -> Result<Option<ResourceAssignment>> {
        let target = self.resource(resource_id).await?;
        let history = self.resource_assignments(resource_id).await?;
        resource::check_return(resource_id, incident_id, &history)?;

        self.mutate_maybe(
            "resource assignment",
            Mutation::ReturnResource {
                incident_id,
                resource_id,
                notes,
                team_id: target.team_id,
            },
        )
        .await
    }

    /// Text first, then the cached status; nothing is sent on failure.
    async fn check_incident(&self, id: i64, mutation: &Mutation) -> Result<()> {
        incident::check_text(mutation)?;
        let current = self.incident(id).await?;
        incident::check_mutation(current.status, mutation)?;
        Ok(())
    }
}
