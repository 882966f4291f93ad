//! Command-line argument definitions.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use emre_core::models::{
    IncidentPriority, IncidentStatus, IncidentType, OrganizationType, ResourceStatus, ResourceType,
    Visibility,
};

/// Parse a backend enum value (`in_progress`, `emergency_response`, ...).
fn wire_value<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|_| format!("unknown value '{}'", raw))
}

#[derive(Parser, Debug)]
#[command(name = "emre")]
#[command(author, version, about = "Command-line client for EmRe emergency-response coordination", long_about = None)]
pub struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// API root, e.g. https://emre.example.org/api/v1
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and keep the token in the OS keychain
    Login {
        #[arg(short, long, env = "EMRE_USERNAME")]
        username: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List organizations
    Orgs {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long = "type", value_parser = wire_value::<OrganizationType>)]
        org_type: Option<OrganizationType>,
        #[arg(long, value_parser = wire_value::<Visibility>)]
        visibility: Option<Visibility>,
    },

    /// Show one organization with its teams
    Org { id: i64 },

    /// List incidents
    Incidents {
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        team: Option<i64>,
        #[arg(long, value_parser = wire_value::<IncidentStatus>)]
        status: Option<IncidentStatus>,
        #[arg(long, value_parser = wire_value::<IncidentPriority>)]
        priority: Option<IncidentPriority>,
        #[arg(long = "type", value_parser = wire_value::<IncidentType>)]
        incident_type: Option<IncidentType>,
    },

    /// Work with a single incident
    Incident {
        #[command(subcommand)]
        command: IncidentCommands,
    },

    /// Resource listing and assignment
    Resources {
        #[command(subcommand)]
        command: ResourceCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum IncidentCommands {
    /// Show an incident and its update log
    Show { id: i64 },

    /// Report a new incident
    Create {
        #[arg(long)]
        org: i64,
        #[arg(long)]
        title: String,
        #[arg(long = "type", value_parser = wire_value::<IncidentType>, default_value = "emergency")]
        incident_type: IncidentType,
        #[arg(long, value_parser = wire_value::<IncidentPriority>, default_value = "medium")]
        priority: IncidentPriority,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },

    /// Mark an open incident in progress
    Start { id: i64 },

    /// Post to the incident log
    Update { id: i64, content: String },

    Resolve {
        id: i64,
        #[arg(long)]
        notes: String,
    },

    Close {
        id: i64,
        #[arg(long)]
        notes: String,
    },

    Reopen {
        id: i64,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    /// List resources
    List {
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        team: Option<i64>,
        #[arg(long = "type", value_parser = wire_value::<ResourceType>)]
        resource_type: Option<ResourceType>,
        #[arg(long, value_parser = wire_value::<ResourceStatus>)]
        status: Option<ResourceStatus>,
    },

    /// Commit a resource to an incident
    Assign {
        #[arg(long)]
        incident: i64,
        #[arg(long)]
        resource: i64,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Release a resource from an incident
    Return {
        #[arg(long)]
        incident: i64,
        #[arg(long)]
        resource: i64,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show a resource's audit trail
    History {
        id: i64,
        /// Earliest day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_value() {
        assert_eq!(wire_value::<IncidentStatus>("in_progress"), Ok(IncidentStatus::InProgress));
        assert_eq!(wire_value::<IncidentPriority>(" HIGH "), Ok(IncidentPriority::High));
        assert!(wire_value::<IncidentStatus>("pending").is_err());
    }

    #[test]
    fn test_parse_assign() {
        let cli = Cli::try_parse_from([
            "emre", "resources", "assign", "--incident", "7", "--resource", "3", "--quantity", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Resources {
                command:
                    ResourceCommands::Assign {
                        incident, resource, quantity, ..
                    },
            } => assert_eq!((incident, resource, quantity), (7, 3, 2)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_range() {
        let cli = Cli::try_parse_from(["emre", "resources", "history", "3", "--from", "2024-05-01"])
            .unwrap();
        match cli.command {
            Commands::Resources {
                command: ResourceCommands::History { id, from, to },
            } => {
                assert_eq!(id, 3);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 5, 1));
                assert_eq!(to, None);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["emre", "resources", "history", "3", "--to", "May 1"]).is_err());
    }
}
