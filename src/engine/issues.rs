use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::issue::{Issue, IssueAction, IssueReport, IssueStatus};

/// Resolves where `action` moves an issue currently in `status`.
pub fn next_status(status: IssueStatus, action: &IssueAction) -> Option<IssueStatus> {
    use IssueStatus::*;

    match (status, action) {
        (Open, IssueAction::Acknowledge { .. }) => Some(InProgress),
        (Open | InProgress, IssueAction::Resolve { .. }) => Some(Resolved),
        (Open | InProgress, IssueAction::Escalate { .. }) => Some(Escalated),
        (Resolved | Escalated, IssueAction::Close { .. }) => Some(Closed),
        _ => None,
    }
}

pub fn action_name(action: &IssueAction) -> &'static str {
    match action {
        IssueAction::Acknowledge { .. } => "acknowledge",
        IssueAction::Resolve { .. } => "resolve",
        IssueAction::Escalate { .. } => "escalate",
        IssueAction::Close { .. } => "close",
    }
}

#[derive(Debug, Clone)]
pub struct IssueBook {
    issues: Vec<Issue>,
}

impl IssueBook {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn all(&self) -> &[Issue] {
        &self.issues
    }

    pub fn get(&self, id: Uuid) -> Option<&Issue> {
        self.issues.iter().find(|i| i.id == id)
    }

    pub fn with_status(&self, status: IssueStatus) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.status == status)
    }

    pub fn report(&mut self, report: IssueReport, now: DateTime<Utc>) -> Issue {
        let issue = Issue {
            id: Uuid::new_v4(),
            delivery_id: report.delivery_id,
            issue_type: report.issue_type,
            reported_by: report.reported_by,
            description: report.description,
            severity: report.severity,
            status: IssueStatus::Open,
            resolved_by: None,
            resolution: None,
            photos: report.photos,
            location: report.location,
            reported_at: now,
            updated_at: now,
            resolved_at: None,
        };
        self.issues.push(issue.clone());
        issue
    }

    pub fn check(&self, id: Uuid, action: &IssueAction) -> Result<IssueStatus, TrackingError> {
        let issue = self.get(id).ok_or(TrackingError::UnknownIssue(id))?;
        next_status(issue.status, action).ok_or(TrackingError::InvalidIssueTransition {
            id,
            status: issue.status,
            action: action_name(action),
        })
    }

    pub fn apply(
        &mut self,
        id: Uuid,
        action: &IssueAction,
        now: DateTime<Utc>,
    ) -> Result<Issue, TrackingError> {
        let next = self.check(id, action)?;
        let issue = self
            .issues
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(TrackingError::UnknownIssue(id))?;

        match action {
            IssueAction::Resolve {
                resolver,
                resolution,
            }
            | IssueAction::Escalate {
                resolver,
                resolution,
            } => {
                issue.resolved_by = Some(resolver.clone());
                issue.resolution = Some(resolution.clone());
                issue.resolved_at = Some(now);
            }
            IssueAction::Acknowledge { .. } | IssueAction::Close { .. } => {}
        }
        issue.status = next;
        issue.updated_at = now;

        Ok(issue.clone())
    }
}

impl Default for IssueBook {
    fn default() -> Self {
        Self::new()
    }
}
