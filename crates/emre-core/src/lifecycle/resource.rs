//! Resource assignment rules.

use crate::models::{Resource, ResourceAssignment, ResourceStatus};

use super::TransitionError;

fn active_for<'a>(
    resource_id: i64,
    assignments: &'a [ResourceAssignment],
) -> impl Iterator<Item = &'a ResourceAssignment> {
    assignments
        .iter()
        .filter(move |a| a.resource_id == resource_id && a.is_active())
}

/// A resource may be committed to one incident at a time, for at most its
/// own quantity.
pub fn check_assign(
    resource: &Resource,
    assignments: &[ResourceAssignment],
    quantity: u32,
) -> Result<(), TransitionError> {
    if quantity == 0 {
        return Err(TransitionError::ZeroQuantity);
    }
    if let Some(active) = active_for(resource.id, assignments).next() {
        return Err(TransitionError::AlreadyAssigned {
            incident_id: active.incident_id,
        });
    }
    if !matches!(resource.status, ResourceStatus::Available | ResourceStatus::Reserved) {
        return Err(TransitionError::ResourceUnavailable {
            status: resource.status,
        });
    }
    if quantity > resource.quantity {
        return Err(TransitionError::QuantityExceeded {
            requested: quantity,
            available: resource.quantity,
        });
    }
    Ok(())
}

/// The active assignment a return would close.
pub fn check_return<'a>(
    resource_id: i64,
    incident_id: i64,
    assignments: &'a [ResourceAssignment],
) -> Result<&'a ResourceAssignment, TransitionError> {
    active_for(resource_id, assignments)
        .find(|a| a.incident_id == incident_id)
        .ok_or(TransitionError::NoActiveAssignment {
            resource_id,
            incident_id,
        })
}

/// Status implied by the assignment history. Out of service wins.
pub fn effective_status(resource: &Resource, assignments: &[ResourceAssignment]) -> ResourceStatus {
    match resource.status {
        ResourceStatus::OutOfService => ResourceStatus::OutOfService,
        _ if active_for(resource.id, assignments).next().is_some() => ResourceStatus::InUse,
        ResourceStatus::InUse => ResourceStatus::Available,
        other => other,
    }
}

/// Status once the assignment on `incident_id` is returned.
pub fn status_after_return(
    resource: &Resource,
    assignments: &[ResourceAssignment],
    incident_id: i64,
) -> ResourceStatus {
    let remaining: Vec<ResourceAssignment> = assignments
        .iter()
        .filter(|a| !(a.resource_id == resource.id && a.incident_id == incident_id))
        .cloned()
        .collect();
    effective_status(resource, &remaining)
}
