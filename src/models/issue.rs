use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IssueType {
    AccessProblem,
    AddressNotFound,
    RecipientAbsent,
    DamagedPackage,
    DeliveryRefused,
    VehicleBreakdown,
    TrafficJam,
    Weather,
    Security,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Escalated,
    Closed,
}

impl IssueStatus {
    pub fn is_unresolved(self) -> bool {
        matches!(self, IssueStatus::Open | IssueStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub issue_type: IssueType,
    pub reported_by: String,
    pub description: String,
    pub severity: IssueSeverity,
    pub status: IssueStatus,
    pub resolved_by: Option<String>,
    pub resolution: Option<String>,
    pub photos: Vec<String>,
    pub location: Option<GeoPoint>,
    pub reported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReport {
    pub delivery_id: Uuid,
    pub issue_type: IssueType,
    pub reported_by: String,
    pub description: String,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IssueAction {
    Acknowledge { actor: String },
    Resolve { resolver: String, resolution: String },
    Escalate { resolver: String, resolution: String },
    Close { actor: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCommand {
    pub issue_id: Uuid,
    pub action: IssueAction,
}
