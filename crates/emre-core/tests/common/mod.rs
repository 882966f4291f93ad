//! In-memory stand-in for the EmRe backend, speaking the same JSON over the
//! `Transport` seam.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use emre_core::api::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use emre_core::auth::Session;
use emre_core::EmreClient;

pub const BASE_URL: &str = "http://emre.test/api/v1";
pub const TOKEN: &str = "test-token";
pub const USERNAME: &str = "dispatch@ridgecounty.org";
pub const PASSWORD: &str = "correct horse";

#[derive(Default)]
struct Db {
    next_id: i64,
    organizations: Vec<Value>,
    teams: Vec<Value>,
    resources: Vec<Value>,
    incidents: Vec<Value>,
    updates: Vec<Value>,
    assignments: Vec<Value>,
    calls: HashMap<String, usize>,
    token_revoked: bool,
}

impl Db {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct FakeBackend {
    db: Mutex<Db>,
}

fn now() -> Value {
    Value::String(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
}

fn ok(body: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: body.to_string(),
    }
}

fn error(status: u16, detail: &str) -> HttpResponse {
    HttpResponse {
        status,
        body: json!({ "detail": detail }).to_string(),
    }
}

fn not_found(what: &str) -> HttpResponse {
    error(404, &format!("{} not found", what))
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn find(items: &mut [Value], id: i64) -> Option<&mut Value> {
    items.iter_mut().find(|item| item["id"] == id)
}

fn matches(item: &Value, params: &[(String, String)]) -> bool {
    params.iter().all(|(k, v)| match (k.as_str(), &item[k.as_str()]) {
        ("search", _) => item["name"]
            .as_str()
            .map_or(false, |name| name.to_lowercase().contains(&v.to_lowercase())),
        (_, Value::String(s)) => s == v,
        (_, other) => other.to_string() == *v,
    })
}

fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((
                urlencoding::decode(k).ok()?.into_owned(),
                urlencoding::decode(v).ok()?.into_owned(),
            ))
        })
        .collect()
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(Db::default()),
        })
    }

    /// A client wired to this backend, already holding a valid token.
    pub fn client(self: &Arc<Self>) -> EmreClient {
        let client = self.anonymous_client();
        client
            .session()
            .set(emre_core::auth::SessionData::new(TOKEN, Some(USERNAME.to_string())));
        client
    }

    pub fn anonymous_client(self: &Arc<Self>) -> EmreClient {
        let transport: Arc<dyn Transport> = self.clone();
        EmreClient::new(transport, BASE_URL, Session::new(), Duration::from_secs(60))
    }

    /// Requests seen for `method path` (query string excluded).
    pub fn calls(&self, method: Method, path: &str) -> usize {
        let db = self.db.lock().unwrap();
        db.calls
            .get(&format!("{} {}", method, path))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.db.lock().unwrap().calls.values().sum()
    }

    pub fn revoke_token(&self) {
        self.db.lock().unwrap().token_revoked = true;
    }

    pub fn seed_team(&self, organization_id: i64, name: &str) -> i64 {
        let mut db = self.db.lock().unwrap();
        let id = db.id();
        db.teams.push(json!({
            "id": id, "name": name, "type": "medical", "status": "active",
            "organization_id": organization_id, "created_at": now()
        }));
        id
    }

    pub fn seed_resource(&self, organization_id: i64, name: &str, quantity: u32, team_id: Option<i64>) -> i64 {
        let mut db = self.db.lock().unwrap();
        let id = db.id();
        db.resources.push(json!({
            "id": id, "name": name, "type": "vehicle", "quantity": quantity,
            "status": "available", "organization_id": organization_id,
            "team_id": team_id, "created_at": now()
        }));
        id
    }

    fn handle(&self, request: HttpRequest) -> HttpResponse {
        let Some(rest) = request.url.strip_prefix(BASE_URL) else {
            return not_found("Host");
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params = parse_pairs(query);
        let body: Value = request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(Value::Null);

        let mut db = self.db.lock().unwrap();
        *db.calls
            .entry(format!("{} {}", request.method, path))
            .or_default() += 1;

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let public = matches!(segments.as_slice(), ["auth", "login"] | ["users"]);
        let bearer = format!("Bearer {}", TOKEN);
        let authorized = request.header("Authorization") == Some(bearer.as_str()) && !db.token_revoked;
        if !public && !authorized {
            return error(401, "Could not validate credentials");
        }

        let id_at = |i: usize| segments.get(i).and_then(|s| s.parse::<i64>().ok()).unwrap_or(-1);
        let db = &mut *db;

        use Method::*;
        match (request.method, segments.as_slice()) {
            (Post, ["auth", "login"]) => {
                let form = parse_pairs(request.body.as_deref().unwrap_or(""));
                let field = |name: &str| form.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str());
                if field("username") == Some(USERNAME) && field("password") == Some(PASSWORD) {
                    ok(json!({ "access_token": TOKEN, "token_type": "bearer" }))
                } else {
                    error(401, "Incorrect email or password")
                }
            }
            (Get, ["users", "me"]) => ok(json!({
                "id": 1, "email": USERNAME, "first_name": "Dana", "last_name": "Reyes",
                "is_active": true
            })),

            (Get, ["organizations"]) => ok(Value::Array(
                db.organizations.iter().filter(|o| matches(o, &params)).cloned().collect(),
            )),
            (Post, ["organizations"]) => {
                let mut org = body;
                merge(
                    &mut org,
                    &json!({ "id": db.id(), "verification_status": false, "created_by_id": 1, "created_at": now() }),
                );
                db.organizations.push(org.clone());
                ok(org)
            }
            (Get, ["organizations", _]) => {
                let id = id_at(1);
                let Some(org) = db.organizations.iter().find(|o| o["id"] == id).cloned() else {
                    return not_found("Organization");
                };
                let teams: Vec<Value> = db
                    .teams
                    .iter()
                    .filter(|t| t["organization_id"] == id)
                    .cloned()
                    .collect();
                let active = db
                    .incidents
                    .iter()
                    .filter(|i| i["organization_id"] == id && (i["status"] == "open" || i["status"] == "in_progress"))
                    .count();
                let mut detail = org;
                merge(
                    &mut detail,
                    &json!({
                        "member_count": 1, "team_count": teams.len(),
                        "resource_count": db.resources.iter().filter(|r| r["organization_id"] == id).count(),
                        "active_incidents": active, "teams": teams
                    }),
                );
                ok(detail)
            }
            (Patch, ["organizations", _]) => match find(&mut db.organizations, id_at(1)) {
                Some(org) => {
                    merge(org, &body);
                    merge(org, &json!({ "updated_at": now() }));
                    ok(org.clone())
                }
                None => not_found("Organization"),
            },
            (Delete, ["organizations", _]) => {
                let id = id_at(1);
                db.organizations.retain(|o| o["id"] != id);
                HttpResponse {
                    status: 204,
                    body: String::new(),
                }
            }

            (Get, ["teams", "organization", _]) => {
                let id = id_at(2);
                ok(Value::Array(
                    db.teams.iter().filter(|t| t["organization_id"] == id).cloned().collect(),
                ))
            }

            (Get, ["resources"]) => ok(Value::Array(
                db.resources.iter().filter(|r| matches(r, &params)).cloned().collect(),
            )),
            (Get, ["resources", _]) => match find(&mut db.resources, id_at(1)) {
                Some(resource) => ok(resource.clone()),
                None => not_found("Resource"),
            },
            (Get, ["resources", _, "assignments"]) => {
                let id = id_at(1);
                ok(Value::Array(
                    db.assignments.iter().filter(|a| a["resource_id"] == id).cloned().collect(),
                ))
            }
            (Get, ["resources", _, "history"]) => {
                let id = id_at(1);
                let mut entries = Vec::new();
                for a in db.assignments.iter().filter(|a| a["resource_id"] == id) {
                    let assignment_id = a["id"].as_i64().unwrap_or(0);
                    entries.push(json!({
                        "id": assignment_id * 10, "resource_id": id, "action": "assigned",
                        "metadata": { "incident_id": a["incident_id"], "new_value": a["quantity"] },
                        "created_at": a["assigned_at"], "user_id": 1
                    }));
                    if !a["returned_at"].is_null() {
                        entries.push(json!({
                            "id": assignment_id * 10 + 1, "resource_id": id, "action": "returned",
                            "metadata": { "incident_id": a["incident_id"] },
                            "created_at": a["returned_at"], "user_id": 1
                        }));
                    }
                }
                ok(Value::Array(entries))
            }
            (Put, ["resources", _, "team"]) => match find(&mut db.resources, id_at(1)) {
                Some(resource) => {
                    merge(resource, &json!({ "team_id": body["team_id"] }));
                    ok(resource.clone())
                }
                None => not_found("Resource"),
            },

            (Get, ["incidents"]) => ok(Value::Array(
                db.incidents.iter().filter(|i| matches(i, &params)).cloned().collect(),
            )),
            (Post, ["incidents"]) => {
                let mut incident = body;
                merge(
                    &mut incident,
                    &json!({ "id": db.id(), "status": "open", "created_by_id": 1, "created_at": now() }),
                );
                db.incidents.push(incident.clone());
                ok(incident)
            }
            (Get, ["incidents", _]) => match find(&mut db.incidents, id_at(1)) {
                Some(incident) => ok(incident.clone()),
                None => not_found("Incident"),
            },
            (Put, ["incidents", _]) => match find(&mut db.incidents, id_at(1)) {
                Some(incident) => {
                    let mut patch = body.clone();
                    if let Some(map) = patch.as_object_mut() {
                        map.remove("resolution_notes");
                    }
                    merge(incident, &patch);
                    if body["status"] == "resolved" {
                        merge(incident, &json!({ "resolved_at": now() }));
                    }
                    merge(incident, &json!({ "updated_at": now() }));
                    ok(incident.clone())
                }
                None => not_found("Incident"),
            },
            (Get, ["incidents", _, "updates"]) => {
                let id = id_at(1);
                ok(Value::Array(
                    db.updates.iter().filter(|u| u["incident_id"] == id).cloned().collect(),
                ))
            }
            (Post, ["incidents", _, "updates"]) => {
                let id = id_at(1);
                let update_id = db.id();
                let Some(incident) = find(&mut db.incidents, id) else {
                    return not_found("Incident");
                };
                if incident["status"] == "open" {
                    merge(incident, &json!({ "status": "in_progress" }));
                }
                let mut update = body;
                merge(
                    &mut update,
                    &json!({ "id": update_id, "incident_id": id, "user_id": 1, "created_at": now() }),
                );
                db.updates.push(update.clone());
                ok(update)
            }
            (Post, ["incidents", _, "close"]) => match find(&mut db.incidents, id_at(1)) {
                Some(incident) => {
                    if incident["resolved_at"].is_null() {
                        merge(incident, &json!({ "resolved_at": now() }));
                    }
                    merge(incident, &json!({ "status": "closed", "updated_at": now() }));
                    ok(incident.clone())
                }
                None => not_found("Incident"),
            },
            (Post, ["incidents", _, "reopen"]) => match find(&mut db.incidents, id_at(1)) {
                Some(incident) => {
                    merge(
                        incident,
                        &json!({ "status": "open", "resolved_at": null, "updated_at": now() }),
                    );
                    ok(incident.clone())
                }
                None => not_found("Incident"),
            },
            (Post, ["incidents", _, "resources"]) => {
                let incident_id = id_at(1);
                let resource_id = body["resource_id"].as_i64().unwrap_or(-1);
                let assignment_id = db.id();
                let Some(resource) = find(&mut db.resources, resource_id) else {
                    return not_found("Resource");
                };
                merge(resource, &json!({ "status": "in_use" }));
                let assignment = json!({
                    "id": assignment_id, "resource_id": resource_id, "incident_id": incident_id,
                    "quantity": body["quantity"], "notes": body["notes"],
                    "assigned_at": now(), "returned_at": null, "assigned_by_id": 1
                });
                db.assignments.push(assignment.clone());
                ok(assignment)
            }
            (Post, ["incidents", _, "resources", _, "return"]) => {
                let (incident_id, resource_id) = (id_at(1), id_at(3));
                let Some(assignment) = db.assignments.iter_mut().find(|a| {
                    a["incident_id"] == incident_id
                        && a["resource_id"] == resource_id
                        && a["returned_at"].is_null()
                }) else {
                    return error(400, "Resource is not assigned to this incident");
                };
                merge(assignment, &json!({ "returned_at": now() }));
                let returned = assignment.clone();
                if let Some(resource) = find(&mut db.resources, resource_id) {
                    merge(resource, &json!({ "status": "available" }));
                }
                ok(returned)
            }

            _ => not_found("Route"),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Ok(self.handle(request))
    }
}

/// Request body as a JSON map, for assertions on what was sent.
pub fn object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
