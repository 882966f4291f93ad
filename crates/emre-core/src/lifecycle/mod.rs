//! Client-side state machines checked before any network call.

pub mod incident;
pub mod resource;

use thiserror::Error;

use crate::models::{IncidentStatus, ResourceStatus};

pub use incident::IncidentAction;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Cannot {action} an incident that is {from}")]
    Incident {
        from: IncidentStatus,
        action: IncidentAction,
    },

    #[error("Resolution notes are required")]
    MissingResolutionNotes,

    #[error("A reason is required to reopen an incident")]
    MissingReopenReason,

    #[error("Resource is {status} and cannot be assigned")]
    ResourceUnavailable { status: ResourceStatus },

    #[error("Resource is already assigned to incident {incident_id}")]
    AlreadyAssigned { incident_id: i64 },

    #[error("Requested quantity {requested} exceeds the {available} available")]
    QuantityExceeded { requested: u32, available: u32 },

    #[error("Quantity must be at least 1")]
    ZeroQuantity,

    #[error("Resource {resource_id} has no active assignment on incident {incident_id}")]
    NoActiveAssignment { resource_id: i64, incident_id: i64 },
}
