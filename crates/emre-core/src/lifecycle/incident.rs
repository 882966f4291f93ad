//! Incident status machine.
//!
//! ```text
//! open ──start / first update──▶ in_progress ──resolve──▶ resolved ──close──▶ closed
//!   │                                │                                          │
//!   └───────────close────────────────┴──────────────────────────────────────────┤
//!                                                                               │
//! open ◀──────────────────────────── reopen (from resolved or closed) ──────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use crate::api::Mutation;
use crate::models::{Incident, IncidentStatus};

use super::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentAction {
    Start,
    PostUpdate,
    Resolve,
    Close,
    Reopen,
}

impl IncidentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentAction::Start => "start",
            IncidentAction::PostUpdate => "post an update on",
            IncidentAction::Resolve => "resolve",
            IncidentAction::Close => "close",
            IncidentAction::Reopen => "reopen",
        }
    }
}

impl fmt::Display for IncidentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn next_status(
    from: IncidentStatus,
    action: IncidentAction,
) -> Result<IncidentStatus, TransitionError> {
    use IncidentAction as A;
    use IncidentStatus as S;

    match (from, action) {
        (S::Open, A::Start) => Ok(S::InProgress),
        (S::Open, A::PostUpdate) => Ok(S::InProgress),
        (S::InProgress | S::Resolved, A::PostUpdate) => Ok(from),
        (S::InProgress, A::Resolve) => Ok(S::Resolved),
        // Administrative close skips resolution.
        (S::Open | S::InProgress | S::Resolved, A::Close) => Ok(S::Closed),
        (S::Resolved | S::Closed, A::Reopen) => Ok(S::Open),
        _ => Err(TransitionError::Incident { from, action }),
    }
}

fn require_text(text: &str, missing: TransitionError) -> Result<(), TransitionError> {
    if text.trim().is_empty() {
        Err(missing)
    } else {
        Ok(())
    }
}

/// Apply `action` to a local copy, maintaining `resolved_at`.
pub fn apply(
    incident: &mut Incident,
    action: IncidentAction,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let next = next_status(incident.status, action)?;
    match action {
        IncidentAction::Resolve | IncidentAction::Close => {
            incident.resolved_at.get_or_insert(now);
        }
        IncidentAction::Reopen => incident.resolved_at = None,
        IncidentAction::Start | IncidentAction::PostUpdate => {}
    }
    incident.status = next;
    incident.updated_at = Some(now);
    Ok(())
}

/// The action a direct status write amounts to.
pub fn action_for_status(from: IncidentStatus, to: IncidentStatus) -> Option<IncidentAction> {
    match to {
        IncidentStatus::InProgress if from == IncidentStatus::Open => Some(IncidentAction::Start),
        IncidentStatus::InProgress => None,
        IncidentStatus::Resolved => Some(IncidentAction::Resolve),
        IncidentStatus::Closed => Some(IncidentAction::Close),
        IncidentStatus::Open => Some(IncidentAction::Reopen),
    }
}

/// Text a status mutation must carry. Checked before anything is read.
pub fn check_text(mutation: &Mutation) -> Result<(), TransitionError> {
    match mutation {
        Mutation::ResolveIncident {
            resolution_notes, ..
        }
        | Mutation::CloseIncident {
            resolution_notes, ..
        } => require_text(resolution_notes, TransitionError::MissingResolutionNotes),
        Mutation::ReopenIncident { reason, .. } => {
            require_text(reason, TransitionError::MissingReopenReason)
        }
        _ => Ok(()),
    }
}

/// Check a mutation against the incident's current status. Returns the
/// status the incident will have afterwards, or `None` when the mutation
/// does not touch incident status.
pub fn check_mutation(
    current: IncidentStatus,
    mutation: &Mutation,
) -> Result<Option<IncidentStatus>, TransitionError> {
    check_text(mutation)?;
    let action = match mutation {
        Mutation::StartIncident { .. } => IncidentAction::Start,
        Mutation::AddIncidentUpdate { .. } => IncidentAction::PostUpdate,
        Mutation::ResolveIncident { .. } => IncidentAction::Resolve,
        Mutation::CloseIncident { .. } => IncidentAction::Close,
        Mutation::ReopenIncident { .. } => IncidentAction::Reopen,
        Mutation::UpdateIncident { patch, .. } => {
            let Some(to) = patch.status else {
                return Ok(None);
            };
            // A bare patch carries no notes or reason.
            match action_for_status(current, to) {
                None => return Ok(Some(current)),
                Some(IncidentAction::Resolve | IncidentAction::Close) => {
                    return Err(TransitionError::MissingResolutionNotes)
                }
                Some(IncidentAction::Reopen) => return Err(TransitionError::MissingReopenReason),
                Some(action) => action,
            }
        }
        _ => return Ok(None),
    };
    next_status(current, action).map(Some)
}
