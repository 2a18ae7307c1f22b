use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::engine::eta::ProximityLevel;
use crate::models::event::{AdminAlert, NotificationPriority, NotificationRequest, Recipient};
use crate::models::issue::{Issue, IssueSeverity};
use crate::models::status::DeliveryStatus;
use crate::observability::metrics::Metrics;

/// Hands notification requests to whatever delivers push/email/SMS.
/// Implementations must not block the caller.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, request: NotificationRequest);
}

/// Receives operational alerts meant for administrators.
pub trait AdminNotifier: Send + Sync {
    fn alert(&self, alert: AdminAlert);
}

/// Queues requests on a bounded channel; a full queue drops the request.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<NotificationRequest>,
    metrics: Metrics,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<NotificationRequest>, metrics: Metrics) -> Self {
        Self { tx, metrics }
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn dispatch(&self, request: NotificationRequest) {
        if let Err(err) = self.tx.try_send(request) {
            self.metrics.notifications_dropped_total.inc();
            warn!(error = %err, "notification request dropped");
        }
    }
}

/// Writes admin alerts to the log.
pub struct LogAdminNotifier;

impl AdminNotifier for LogAdminNotifier {
    fn alert(&self, alert: AdminAlert) {
        warn!(
            delivery_id = %alert.delivery_id,
            issue_id = %alert.issue_id,
            severity = ?alert.severity,
            title = %alert.title,
            "admin alert"
        );
    }
}

/// Drains queued notification requests. Actual push delivery lives outside
/// this service, so the relay only logs what it hands off.
pub async fn run_notification_relay(mut rx: mpsc::Receiver<NotificationRequest>) {
    info!("notification relay started");

    while let Some(request) = rx.recv().await {
        info!(
            delivery_id = %request.delivery_id,
            recipient = ?request.recipient,
            title = %request.title,
            "notification handed off"
        );
    }

    warn!("notification relay stopped: channel closed");
}

pub fn status_notification(
    delivery_id: uuid::Uuid,
    status: DeliveryStatus,
    note: Option<&str>,
) -> NotificationRequest {
    let (title, default_body) = match status {
        DeliveryStatus::Created => ("Delivery created", "Your delivery has been registered"),
        DeliveryStatus::Assigned => ("Carrier assigned", "A carrier has been assigned to your delivery"),
        DeliveryStatus::PickedUp => ("Package picked up", "Your package has been picked up"),
        DeliveryStatus::InTransit => ("Delivery in progress", "Your package is on its way"),
        DeliveryStatus::DeliveryAttempt => (
            "Delivery attempt",
            "Your carrier is attempting delivery at your address",
        ),
        DeliveryStatus::Delivered => ("Delivered", "Your package has been delivered"),
        DeliveryStatus::Failed => ("Delivery failed", "Your package could not be delivered"),
        DeliveryStatus::Cancelled => ("Delivery cancelled", "Your delivery has been cancelled"),
    };

    let body = match status {
        DeliveryStatus::Failed | DeliveryStatus::Cancelled => note.unwrap_or(default_body),
        _ => default_body,
    };

    let priority = if status.is_terminal() {
        NotificationPriority::High
    } else {
        NotificationPriority::Normal
    };

    NotificationRequest {
        delivery_id,
        recipient: Recipient::Counterparty,
        title: title.to_string(),
        body: body.to_string(),
        priority,
        data: BTreeMap::from([
            ("delivery_id".to_string(), delivery_id.to_string()),
            ("status".to_string(), status.to_string()),
        ]),
    }
}

pub fn proximity_notification(
    delivery_id: uuid::Uuid,
    level: ProximityLevel,
    distance_m: f64,
    eta_minutes: Option<i64>,
) -> NotificationRequest {
    let (title, body, priority) = match level {
        ProximityLevel::Approaching => (
            "Your carrier is on the way",
            match eta_minutes {
                Some(minutes) => format!("Arriving in about {minutes} minutes"),
                None => "Your carrier is approaching".to_string(),
            },
            NotificationPriority::Normal,
        ),
        ProximityLevel::Nearby => (
            "Your carrier is nearby",
            format!("Your carrier is {}m from your address", distance_m.round() as i64),
            NotificationPriority::Normal,
        ),
        ProximityLevel::Arrived => (
            "Your carrier has arrived",
            "Your carrier is at your address".to_string(),
            NotificationPriority::High,
        ),
    };

    NotificationRequest {
        delivery_id,
        recipient: Recipient::Counterparty,
        title: title.to_string(),
        body,
        priority,
        data: BTreeMap::from([
            ("delivery_id".to_string(), delivery_id.to_string()),
            ("proximity".to_string(), format!("{level:?}")),
        ]),
    }
}

/// Tells the carrier how an issue they were working around was settled.
pub fn issue_resolved_notification(issue: &Issue) -> NotificationRequest {
    NotificationRequest {
        delivery_id: issue.delivery_id,
        recipient: Recipient::Carrier,
        title: format!("Issue resolved: {:?}", issue.issue_type),
        body: issue
            .resolution
            .clone()
            .unwrap_or_else(|| issue.description.clone()),
        priority: NotificationPriority::Normal,
        data: BTreeMap::from([
            ("delivery_id".to_string(), issue.delivery_id.to_string()),
            ("issue_id".to_string(), issue.id.to_string()),
        ]),
    }
}

pub fn issue_alert(issue: &Issue, escalated: bool) -> AdminAlert {
    let title = if escalated {
        format!("Issue escalated: {:?}", issue.issue_type)
    } else {
        format!("{:?} issue reported: {:?}", issue.severity, issue.issue_type)
    };
    let body = issue
        .resolution
        .as_ref()
        .filter(|_| escalated)
        .unwrap_or(&issue.description)
        .clone();

    AdminAlert {
        delivery_id: issue.delivery_id,
        issue_id: issue.id,
        severity: issue.severity,
        title,
        body,
    }
}

pub fn needs_admin_attention(severity: IssueSeverity) -> bool {
    severity >= IssueSeverity::High
}
