//! Plain-text tables for terminal output.

use chrono::{DateTime, Local, Utc};

use emre_core::cache::age_display;
use emre_core::models::{
    Incident, IncidentUpdate, Organization, OrganizationDetail, Resource, ResourceHistory, User,
};

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %d, %Y %H:%M").to_string()
}

pub fn user(user: &User) -> String {
    format!("{} <{}>", user.full_name(), user.email)
}

pub fn organizations(orgs: &[Organization]) -> String {
    let mut out = format!("{:>5}  {:<32}  {:<24}  {:<8}  {}\n", "ID", "NAME", "TYPE", "VIS", "LOCATION");
    for org in orgs {
        out.push_str(&format!(
            "{:>5}  {:<32}  {:<24}  {:<8}  {}{}\n",
            org.id,
            truncate_string(&org.name, 32),
            org.org_type.as_str(),
            org.visibility.as_str(),
            org.location_display(),
            if org.verification_status { "  (verified)" } else { "" },
        ));
    }
    out
}

pub fn organization(detail: &OrganizationDetail) -> String {
    let org = &detail.organization;
    let mut out = format!(
        "{} [{}]\n{} members, {} teams, {} resources, {} active incidents\n",
        org.name,
        org.org_type,
        detail.member_count,
        detail.team_count,
        detail.resource_count,
        detail.active_incidents
    );
    if let Some(description) = &org.description {
        out.push_str(&format!("{}\n", description));
    }
    for team in &detail.teams {
        out.push_str(&format!("  #{:<5} {}\n", team.id, team.name));
    }
    out
}

pub fn incidents(incidents: &[Incident]) -> String {
    let mut out = format!("{:>5}  {:<8}  {:<11}  {:<40}  {}\n", "ID", "PRIORITY", "STATUS", "TITLE", "REPORTED");
    for incident in incidents {
        out.push_str(&format!(
            "{:>5}  {:<8}  {:<11}  {:<40}  {}\n",
            incident.id,
            incident.priority.as_str(),
            incident.status.as_str(),
            truncate_string(&incident.title, 40),
            age_display(incident.created_at, Utc::now()),
        ));
    }
    out
}

pub fn incident(incident: &Incident, updates: &[IncidentUpdate]) -> String {
    let mut out = format!(
        "#{} {}\n{} / {} / {}\n",
        incident.id,
        incident.title,
        incident.incident_type.as_str(),
        incident.priority.as_str(),
        incident.status.as_str()
    );
    if let Some(location) = &incident.location_description {
        out.push_str(&format!("Location: {}\n", location));
    } else if let Some((lat, lon)) = incident.coordinates() {
        out.push_str(&format!("Location: {:.5}, {:.5}\n", lat, lon));
    }
    out.push_str(&format!("Reported: {}\n", format_timestamp(incident.created_at)));
    if let Some(resolved) = incident.resolved_at {
        out.push_str(&format!("Resolved: {}\n", format_timestamp(resolved)));
    }
    for update in updates {
        out.push_str(&format!(
            "  {}  {}\n",
            format_timestamp(update.created_at),
            update.content
        ));
    }
    out
}

pub fn resources(resources: &[Resource]) -> String {
    let mut out = format!("{:>5}  {:<28}  {:<10}  {:>4}  {:<14}  {}\n", "ID", "NAME", "TYPE", "QTY", "STATUS", "TEAM");
    for resource in resources {
        out.push_str(&format!(
            "{:>5}  {:<28}  {:<10}  {:>4}  {:<14}  {}\n",
            resource.id,
            truncate_string(&resource.name, 28),
            resource.resource_type.as_str(),
            resource.quantity,
            resource.status.as_str(),
            resource.team_id.map_or_else(|| "-".to_string(), |t| t.to_string()),
        ));
    }
    out
}

pub fn resource_history(entries: &[ResourceHistory]) -> String {
    let mut out = String::new();
    for entry in entries {
        let mut line = format!("  {}  {:<14}", format_timestamp(entry.created_at), entry.action.as_str());
        let meta = &entry.metadata;
        if let Some(incident) = meta.incident_id {
            line.push_str(&format!("  incident {}", incident));
        }
        if let (Some(old), Some(new)) = (&meta.old_value, &meta.new_value) {
            line.push_str(&format!("  {} -> {}", old, new));
        }
        if let Some(notes) = &meta.notes {
            line.push_str(&format!("  {}", truncate_string(notes, 40)));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
