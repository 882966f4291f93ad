//! List filters. Each renders to sorted `(field, value)` pairs with unset
//! fields dropped, so equivalent filters produce identical cache keys.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    IncidentPriority, IncidentStatus, IncidentType, OrganizationType, ResourceStatus, ResourceType,
    Visibility,
};

pub type Args = BTreeMap<&'static str, String>;

fn put(args: &mut Args, field: &'static str, value: Option<impl ToString>) {
    if let Some(value) = value {
        args.insert(field, value.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationFilter {
    pub search: Option<String>,
    pub org_type: Option<OrganizationType>,
    pub visibility: Option<Visibility>,
}

impl OrganizationFilter {
    pub fn args(&self) -> Args {
        let mut args = Args::new();
        put(&mut args, "search", self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()));
        put(&mut args, "type", self.org_type.map(|t| t.as_str()));
        put(&mut args, "visibility", self.visibility.map(|v| v.as_str()));
        args
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub organization_id: Option<i64>,
    pub team_id: Option<i64>,
    pub resource_type: Option<ResourceType>,
    pub status: Option<ResourceStatus>,
}

impl ResourceFilter {
    pub fn for_organization(organization_id: i64) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Default::default()
        }
    }

    pub fn args(&self) -> Args {
        let mut args = Args::new();
        put(&mut args, "organization_id", self.organization_id);
        put(&mut args, "team_id", self.team_id);
        put(&mut args, "type", self.resource_type.map(|t| t.as_str()));
        put(&mut args, "status", self.status.map(|s| s.as_str()));
        args
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub organization_id: Option<i64>,
    pub team_id: Option<i64>,
    pub status: Option<IncidentStatus>,
    pub priority: Option<IncidentPriority>,
    pub incident_type: Option<IncidentType>,
}

impl IncidentFilter {
    pub fn for_organization(organization_id: i64) -> Self {
        Self {
            organization_id: Some(organization_id),
            ..Default::default()
        }
    }

    pub fn args(&self) -> Args {
        let mut args = Args::new();
        put(&mut args, "organization_id", self.organization_id);
        put(&mut args, "team_id", self.team_id);
        put(&mut args, "status", self.status.map(|s| s.as_str()));
        put(&mut args, "priority", self.priority.map(|p| p.as_str()));
        put(&mut args, "type", self.incident_type.map(|t| t.as_str()));
        args
    }
}

/// Optional calendar bounds on a resource's history. The backend takes
/// them as `startDate`/`endDate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl HistoryRange {
    pub fn args(&self) -> Args {
        let mut args = Args::new();
        put(&mut args, "startDate", self.start_date.map(|d| d.format("%Y-%m-%d")));
        put(&mut args, "endDate", self.end_date.map(|d| d.format("%Y-%m-%d")));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_dropped() {
        assert!(IncidentFilter::default().args().is_empty());
        let args = IncidentFilter {
            status: Some(IncidentStatus::InProgress),
            ..IncidentFilter::for_organization(4)
        }
        .args();
        let pairs: Vec<_> = args.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(pairs, vec![("organization_id", "4"), ("status", "in_progress")]);
    }

    #[test]
    fn test_history_range_uses_backend_names() {
        let range = HistoryRange {
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            end_date: None,
        };
        let pairs: Vec<_> = range.args().into_iter().collect();
        assert_eq!(pairs, vec![("startDate", "2024-05-01".to_string())]);
    }

    #[test]
    fn test_blank_search_is_dropped() {
        let filter = OrganizationFilter {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert!(filter.args().is_empty());
    }
}
