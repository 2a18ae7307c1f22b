use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::engine::checkpoints::{issue_code, verify_code, CheckpointBook};
use crate::engine::eta::{EtaEstimator, EtaInputs, EtaLog, ProximityLevel};
use crate::engine::issues::IssueBook;
use crate::engine::notify::{
    issue_alert, issue_resolved_notification, needs_admin_attention, proximity_notification,
    status_notification, AdminNotifier, NotificationDispatcher,
};
use crate::engine::positions::PositionStore;
use crate::engine::status::{StatusLedger, TransitionRequest};
use crate::error::TrackingError;
use crate::geo::{bounding_box, distance_m, BoundingBox};
use crate::models::checkpoint::{
    Checkpoint, CheckpointCompletion, CheckpointKind, CheckpointPlan, ConfirmationCode,
    DeliveryConfirmation, ProofOfCompletion,
};
use crate::models::eta::{EtaOverride, EtaRecord, EtaView, TrafficCondition, TrafficHint};
use crate::models::event::{InboundEvent, TrackingEvent, TrackingUpdate};
use crate::models::issue::{Issue, IssueAction, IssueCommand, IssueReport, IssueSeverity, IssueStatus};
use crate::models::position::{GeoPoint, PositionInput, PositionReport};
use crate::models::session::{SessionEndReason, SessionStart, TrackingSession};
use crate::models::status::{DeliveryStatus, StatusChange, StatusHistoryEntry};
use crate::observability::metrics::Metrics;

const SYSTEM_ACTOR: &str = "system";
/// Slowest hinted speed accepted, in km/h.
const MIN_HINTED_SPEED_KMH: f64 = 1.0;

/// Everything known about one delivery. Guarded by a single async mutex so
/// events for the same delivery apply one at a time, in arrival order.
struct DeliveryLedger {
    session: TrackingSession,
    status: StatusLedger,
    positions: PositionStore,
    checkpoints: CheckpointBook,
    eta: EtaLog,
    issues: IssueBook,
    traffic_hint: Option<TrafficHint>,
    confirmation: Option<ConfirmationCode>,
    proximity: Option<ProximityLevel>,
}

impl DeliveryLedger {
    fn new(session: TrackingSession, config: &TrackingConfig) -> Self {
        let delivery_id = session.delivery_id;
        Self {
            session,
            status: StatusLedger::new(delivery_id),
            positions: PositionStore::new(config.position_retention),
            checkpoints: CheckpointBook::new(delivery_id),
            eta: EtaLog::default(),
            issues: IssueBook::new(),
            traffic_hint: None,
            confirmation: None,
            proximity: None,
        }
    }

    fn delivery_id(&self) -> Uuid {
        self.session.delivery_id
    }

    fn ensure_active(&self) -> Result<(), TrackingError> {
        if self.session.active {
            Ok(())
        } else {
            Err(TrackingError::SessionInactive(self.delivery_id()))
        }
    }

    /// A terminal delivery answers status requests with the graph violation;
    /// a paused one is simply inactive.
    fn ensure_can_move_to(&self, to: DeliveryStatus) -> Result<(), TrackingError> {
        if !self.status.current().is_terminal() {
            self.ensure_active()?;
        }
        self.status.check(to)
    }

    /// Where the carrier is heading next: the next open checkpoint, else the
    /// final destination.
    fn eta_target(&self) -> Option<GeoPoint> {
        self.checkpoints
            .next_pending()
            .map(|c| c.point)
            .or(self.session.destination)
    }
}

type SharedLedger = Arc<Mutex<DeliveryLedger>>;

/// External collaborators the engine reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub admin: Arc<dyn AdminNotifier>,
}

/// The tracking session manager: owns every delivery's state and is the only
/// way to mutate it.
pub struct TrackingEngine {
    config: TrackingConfig,
    estimator: EtaEstimator,
    deliveries: DashMap<Uuid, SharedLedger>,
    carriers: DashMap<Uuid, Vec<Uuid>>,
    checkpoint_index: DashMap<Uuid, Uuid>,
    issue_index: DashMap<Uuid, Uuid>,
    events_tx: broadcast::Sender<TrackingEvent>,
    collaborators: Collaborators,
    metrics: Metrics,
}

impl TrackingEngine {
    pub fn new(
        config: TrackingConfig,
        event_buffer_size: usize,
        collaborators: Collaborators,
        metrics: Metrics,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            estimator: EtaEstimator::new(&config),
            config,
            deliveries: DashMap::new(),
            carriers: DashMap::new(),
            checkpoint_index: DashMap::new(),
            issue_index: DashMap::new(),
            events_tx,
            collaborators,
            metrics,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }

    pub fn active_session_count(&self) -> i64 {
        self.metrics.active_sessions.get()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // ---- session lifecycle -------------------------------------------------

    pub async fn start_session(&self, start: SessionStart) -> Result<TrackingSession, TrackingError> {
        let started = Instant::now();
        let outcome = self.start_session_inner(start).await;
        self.observe("start_session", started, &outcome);
        outcome
    }

    async fn start_session_inner(&self, start: SessionStart) -> Result<TrackingSession, TrackingError> {
        if start.destination.is_some_and(|d| !d.is_valid()) {
            return Err(TrackingError::InvalidInput(
                "destination coordinates out of range".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = match self.deliveries.entry(start.delivery_id) {
            Entry::Occupied(slot) => slot.get().clone(),
            Entry::Vacant(slot) => {
                let mut ledger = DeliveryLedger::new(TrackingSession::start(&start, now), &self.config);
                let entry = ledger.status.apply(
                    TransitionRequest {
                        status: DeliveryStatus::Assigned,
                        actor: start.carrier_id.to_string(),
                        location: None,
                        note: None,
                        reason: None,
                        notify_counterparty: false,
                    },
                    now,
                )?;
                let session = ledger.session.clone();
                slot.insert(Arc::new(Mutex::new(ledger)));

                self.carriers
                    .entry(start.carrier_id)
                    .or_default()
                    .push(start.delivery_id);
                self.metrics.active_sessions.inc();
                self.publish(start.delivery_id, now, TrackingUpdate::SessionStarted(session.clone()));
                self.publish(start.delivery_id, now, TrackingUpdate::StatusUpdate(entry));

                info!(
                    delivery_id = %start.delivery_id,
                    carrier_id = %start.carrier_id,
                    "tracking session started"
                );
                return Ok(session);
            }
        };

        let mut ledger = existing.lock().await;
        if ledger.session.active {
            return Err(TrackingError::SessionAlreadyActive(start.delivery_id));
        }
        if ledger.status.current().is_terminal() {
            return Err(TrackingError::SessionInactive(start.delivery_id));
        }

        let previous_carrier = ledger.session.carrier_id;
        if previous_carrier != start.carrier_id {
            if let Some(mut deliveries) = self.carriers.get_mut(&previous_carrier) {
                deliveries.retain(|id| *id != start.delivery_id);
            }
            self.carriers
                .entry(start.carrier_id)
                .or_default()
                .push(start.delivery_id);
        }

        let session = &mut ledger.session;
        session.carrier_id = start.carrier_id;
        session.active = true;
        session.ended_at = None;
        session.end_reason = None;
        session.last_update_at = now;
        if start.destination.is_some() {
            session.destination = start.destination;
        }
        if let Some(telemetry) = start.telemetry {
            session.telemetry = telemetry;
        }
        let session = session.clone();

        self.metrics.active_sessions.inc();
        self.publish(start.delivery_id, now, TrackingUpdate::SessionStarted(session.clone()));
        info!(
            delivery_id = %start.delivery_id,
            carrier_id = %start.carrier_id,
            "tracking session resumed"
        );

        Ok(session)
    }

    /// Ends a session outside terminal-status completion. Waits for any
    /// in-flight event on the same delivery to finish first.
    pub async fn end_session(
        &self,
        delivery_id: Uuid,
        reason: SessionEndReason,
        actor: &str,
    ) -> Result<TrackingSession, TrackingError> {
        let started = Instant::now();
        let outcome = self.end_session_inner(delivery_id, reason, actor).await;
        self.observe("end_session", started, &outcome);
        outcome
    }

    async fn end_session_inner(
        &self,
        delivery_id: Uuid,
        reason: SessionEndReason,
        actor: &str,
    ) -> Result<TrackingSession, TrackingError> {
        if reason == SessionEndReason::Completed {
            return Err(TrackingError::InvalidInput(
                "sessions complete through a terminal status transition".to_string(),
            ));
        }

        let shared = self.ledger(delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;
        let now = Utc::now();

        if reason == SessionEndReason::Cancelled {
            ledger.status.check(DeliveryStatus::Cancelled)?;
            self.commit_transition(
                ledger,
                TransitionRequest {
                    status: DeliveryStatus::Cancelled,
                    actor: actor.to_string(),
                    location: None,
                    note: None,
                    reason: Some("session cancelled".to_string()),
                    notify_counterparty: true,
                },
                SessionEndReason::Cancelled,
                now,
            )?;
        } else {
            ledger.session.end(reason, now);
            self.metrics.active_sessions.dec();
            self.publish(delivery_id, now, TrackingUpdate::SessionEnded(ledger.session.clone()));
        }

        info!(delivery_id = %delivery_id, reason = ?reason, actor, "tracking session ended");
        Ok(ledger.session.clone())
    }

    // ---- inbound events ----------------------------------------------------

    /// Single entry point for every inbound event. Returns the event published
    /// for the primary effect; cascaded effects publish their own events.
    pub async fn ingest(&self, event: InboundEvent) -> Result<TrackingEvent, TrackingError> {
        let kind = event.kind();
        let started = Instant::now();

        let outcome = match event {
            InboundEvent::Position(input) => self.handle_position(input).await,
            InboundEvent::Status(change) => self.handle_status(change).await,
            InboundEvent::PlanCheckpoint(plan) => self.handle_plan_checkpoint(plan).await,
            InboundEvent::CompleteCheckpoint(completion) => {
                self.handle_complete_checkpoint(completion).await
            }
            InboundEvent::ConfirmDelivery(confirmation) => self.handle_confirm(confirmation).await,
            InboundEvent::TrafficHint { delivery_id, hint } => {
                self.handle_traffic_hint(delivery_id, hint).await
            }
            InboundEvent::EtaOverride(request) => self.handle_eta_override(request).await,
            InboundEvent::ReportIssue(report) => self.handle_report_issue(report).await,
            InboundEvent::Issue(command) => self.handle_issue_command(command).await,
        };

        self.observe(kind, started, &outcome);
        outcome
    }

    async fn handle_position(&self, input: PositionInput) -> Result<TrackingEvent, TrackingError> {
        if let Some(battery) = input.telemetry.as_ref().and_then(|t| t.battery_level) {
            if battery > 100 {
                return Err(TrackingError::InvalidInput(format!(
                    "battery level {battery} is above 100"
                )));
            }
        }

        let shared = self.ledger(input.delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;

        let now = Utc::now();
        let report = ledger
            .positions
            .record(&input, now, self.config.max_clock_skew)?;

        if let Some(telemetry) = input.telemetry {
            if telemetry.battery_level.is_some() {
                ledger.session.telemetry.battery_level = telemetry.battery_level;
            }
            if telemetry.network.is_some() {
                ledger.session.telemetry.network = telemetry.network;
            }
        }
        ledger.session.touch(now);

        debug!(
            delivery_id = %report.delivery_id,
            lat = report.point.lat,
            lng = report.point.lng,
            "position recorded"
        );
        let event = self.publish(
            report.delivery_id,
            now,
            TrackingUpdate::LocationUpdate(report.clone()),
        );

        if !ledger.eta.is_pinned() {
            self.refresh_eta(ledger, now);
        }
        self.check_proximity(ledger, &report, now)?;

        Ok(event)
    }

    async fn handle_status(&self, change: StatusChange) -> Result<TrackingEvent, TrackingError> {
        let shared = self.ledger(change.delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_can_move_to(change.status)?;

        self.commit_transition(
            ledger,
            TransitionRequest {
                status: change.status,
                actor: change.actor,
                location: change.location,
                note: change.note,
                reason: change.reason,
                notify_counterparty: change.notify_counterparty,
            },
            SessionEndReason::Completed,
            Utc::now(),
        )
    }

    async fn handle_plan_checkpoint(&self, plan: CheckpointPlan) -> Result<TrackingEvent, TrackingError> {
        if !plan.point.is_valid() {
            return Err(TrackingError::InvalidInput(
                "checkpoint coordinates out of range".to_string(),
            ));
        }

        let shared = self.ledger(plan.delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;

        let now = Utc::now();
        let checkpoint = ledger.checkpoints.plan(plan);
        self.checkpoint_index
            .insert(checkpoint.id, checkpoint.delivery_id);
        ledger.session.touch(now);

        info!(
            delivery_id = %checkpoint.delivery_id,
            checkpoint_id = %checkpoint.id,
            kind = ?checkpoint.kind,
            "checkpoint planned"
        );
        let event = self.publish(
            checkpoint.delivery_id,
            now,
            TrackingUpdate::CheckpointPlanned(checkpoint),
        );

        if !ledger.eta.is_pinned() {
            self.refresh_eta(ledger, now);
        }
        Ok(event)
    }

    async fn handle_complete_checkpoint(
        &self,
        completion: CheckpointCompletion,
    ) -> Result<TrackingEvent, TrackingError> {
        let delivery_id = self
            .checkpoint_index
            .get(&completion.checkpoint_id)
            .map(|entry| *entry.value())
            .ok_or(TrackingError::UnknownCheckpoint(completion.checkpoint_id))?;

        let shared = self.ledger(delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.checkpoints.check_completion(completion.checkpoint_id)?;
        ledger.ensure_active()?;

        let now = Utc::now();
        let checkpoint = ledger.checkpoints.complete(completion)?;
        ledger.session.touch(now);

        info!(
            delivery_id = %delivery_id,
            checkpoint_id = %checkpoint.id,
            kind = ?checkpoint.kind,
            "checkpoint reached"
        );
        let event = self.publish(delivery_id, now, TrackingUpdate::CheckpointReached(checkpoint));

        self.refresh_eta(ledger, now);
        Ok(event)
    }

    async fn handle_confirm(
        &self,
        confirmation: DeliveryConfirmation,
    ) -> Result<TrackingEvent, TrackingError> {
        let delivery_id = confirmation.delivery_id;
        let shared = self.ledger(delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_can_move_to(DeliveryStatus::Delivered)?;

        let now = Utc::now();
        if let Some(code) = &confirmation.confirmation_code {
            verify_code(ledger.confirmation.as_ref(), code, now)?;
        }

        let point = confirmation
            .location
            .or_else(|| ledger.positions.latest().map(|r| r.point))
            .or(ledger.session.destination)
            .ok_or_else(|| {
                TrackingError::InvalidInput(
                    "no location available for proof of delivery".to_string(),
                )
            })?;

        let proof = ProofOfCompletion {
            photo_url: confirmation.photo_url,
            signature_url: confirmation.signature_url,
            confirmation_code: confirmation.confirmation_code.clone(),
        };
        let pending = ledger
            .checkpoints
            .latest_pending_of_kind(CheckpointKind::Delivery)
            .map(|c| c.id);

        let checkpoint = match pending {
            Some(checkpoint_id) => ledger.checkpoints.complete(CheckpointCompletion {
                checkpoint_id,
                actual_at: now,
                completed_by: confirmation.confirmed_by.clone(),
                notes: confirmation.notes.clone(),
                proof,
            })?,
            None => ledger.checkpoints.record_unplanned(
                CheckpointKind::Delivery,
                point,
                format!("{:.6},{:.6}", point.lat, point.lng),
                CheckpointCompletion {
                    checkpoint_id: Uuid::nil(),
                    actual_at: now,
                    completed_by: confirmation.confirmed_by.clone(),
                    notes: confirmation.notes.clone(),
                    proof,
                },
            ),
        };
        self.checkpoint_index.insert(checkpoint.id, delivery_id);
        if confirmation.confirmation_code.is_some() {
            if let Some(issued) = ledger.confirmation.as_mut() {
                issued.used_at = Some(now);
            }
        }

        self.publish(delivery_id, now, TrackingUpdate::CheckpointReached(checkpoint));

        let event = self.commit_transition(
            ledger,
            TransitionRequest {
                status: DeliveryStatus::Delivered,
                actor: confirmation.confirmed_by,
                location: Some(point),
                note: confirmation.notes,
                reason: None,
                notify_counterparty: true,
            },
            SessionEndReason::Completed,
            now,
        )?;

        info!(delivery_id = %delivery_id, "delivery confirmed");
        Ok(event)
    }

    async fn handle_traffic_hint(
        &self,
        delivery_id: Uuid,
        hint: TrafficHint,
    ) -> Result<TrackingEvent, TrackingError> {
        if hint.speed_kmh.is_some_and(|s| !(s >= MIN_HINTED_SPEED_KMH)) {
            return Err(TrackingError::InvalidInput(format!(
                "hinted speed must be at least {MIN_HINTED_SPEED_KMH} km/h"
            )));
        }

        let shared = self.ledger(delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;

        let now = Utc::now();
        let record = self.compute_eta(ledger, Some(hint), now)?;
        ledger.traffic_hint = Some(hint);
        ledger.session.touch(now);

        info!(delivery_id = %delivery_id, condition = ?hint.condition, "traffic hint applied");
        Ok(self.commit_eta(ledger, record, now))
    }

    async fn handle_eta_override(&self, request: EtaOverride) -> Result<TrackingEvent, TrackingError> {
        let shared = self.ledger(request.delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;

        let now = Utc::now();
        let remaining = ledger
            .positions
            .latest()
            .zip(ledger.eta_target())
            .map(|(position, target)| distance_m(&position.point, &target));
        let traffic = ledger
            .traffic_hint
            .map(|h| h.condition)
            .unwrap_or(TrafficCondition::Unknown);

        let record = self.estimator.manual(&request, remaining, traffic, now);
        ledger.session.touch(now);

        info!(
            delivery_id = %request.delivery_id,
            overridden_by = %request.overridden_by,
            estimated_arrival = %request.estimated_arrival,
            "eta overridden"
        );
        Ok(self.commit_eta(ledger, record, now))
    }

    async fn handle_report_issue(&self, report: IssueReport) -> Result<TrackingEvent, TrackingError> {
        if report.description.trim().is_empty() {
            return Err(TrackingError::InvalidInput(
                "issue description cannot be empty".to_string(),
            ));
        }

        let shared = self.ledger(report.delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.ensure_active()?;

        let now = Utc::now();
        let issue = ledger.issues.report(report, now);
        self.issue_index.insert(issue.id, issue.delivery_id);
        ledger.session.touch(now);

        warn!(
            delivery_id = %issue.delivery_id,
            issue_id = %issue.id,
            issue_type = ?issue.issue_type,
            severity = ?issue.severity,
            "issue reported"
        );
        if needs_admin_attention(issue.severity) {
            self.collaborators.admin.alert(issue_alert(&issue, false));
        }

        Ok(self.publish(issue.delivery_id, now, TrackingUpdate::IssueReported(issue)))
    }

    /// Issue workflow actions stay available after the session ends so that
    /// support can close out incidents.
    async fn handle_issue_command(&self, command: IssueCommand) -> Result<TrackingEvent, TrackingError> {
        let delivery_id = self
            .issue_index
            .get(&command.issue_id)
            .map(|entry| *entry.value())
            .ok_or(TrackingError::UnknownIssue(command.issue_id))?;

        let shared = self.ledger(delivery_id)?;
        let mut guard = shared.lock().await;
        let ledger = &mut *guard;
        ledger.issues.check(command.issue_id, &command.action)?;

        let now = Utc::now();
        let issue = ledger.issues.apply(command.issue_id, &command.action, now)?;
        ledger.session.touch(now);

        info!(
            delivery_id = %delivery_id,
            issue_id = %issue.id,
            status = ?issue.status,
            "issue updated"
        );

        let update = match command.action {
            IssueAction::Acknowledge { .. } => TrackingUpdate::IssueUpdated(issue.clone()),
            _ => TrackingUpdate::IssueResolved(issue.clone()),
        };
        let event = self.publish(delivery_id, now, update);

        if matches!(command.action, IssueAction::Resolve { .. }) {
            self.collaborators.notifier.dispatch(issue_resolved_notification(&issue));
        }

        if let IssueAction::Escalate {
            resolver,
            resolution,
        } = command.action
        {
            self.collaborators.admin.alert(issue_alert(&issue, true));

            if issue.severity == IssueSeverity::Critical {
                if ledger.status.current().is_terminal() {
                    warn!(
                        delivery_id = %delivery_id,
                        issue_id = %issue.id,
                        "critical escalation on a finished delivery; status unchanged"
                    );
                } else {
                    self.commit_transition(
                        ledger,
                        TransitionRequest {
                            status: DeliveryStatus::Failed,
                            actor: resolver,
                            location: issue.location,
                            note: None,
                            reason: Some(resolution),
                            notify_counterparty: true,
                        },
                        SessionEndReason::Completed,
                        now,
                    )?;
                }
            }
        }

        Ok(event)
    }

    // ---- typed wrappers ----------------------------------------------------

    pub async fn record_position(&self, input: PositionInput) -> Result<PositionReport, TrackingError> {
        self.ingest_as(InboundEvent::Position(input), |update| match update {
            TrackingUpdate::LocationUpdate(report) => Some(report),
            _ => None,
        })
        .await
    }

    pub async fn apply_transition(&self, change: StatusChange) -> Result<StatusHistoryEntry, TrackingError> {
        self.ingest_as(InboundEvent::Status(change), status_entry).await
    }

    pub async fn plan_checkpoint(&self, plan: CheckpointPlan) -> Result<Checkpoint, TrackingError> {
        self.ingest_as(InboundEvent::PlanCheckpoint(plan), |update| match update {
            TrackingUpdate::CheckpointPlanned(checkpoint) => Some(checkpoint),
            _ => None,
        })
        .await
    }

    pub async fn complete_checkpoint(
        &self,
        completion: CheckpointCompletion,
    ) -> Result<Checkpoint, TrackingError> {
        self.ingest_as(InboundEvent::CompleteCheckpoint(completion), |update| match update {
            TrackingUpdate::CheckpointReached(checkpoint) => Some(checkpoint),
            _ => None,
        })
        .await
    }

    pub async fn confirm_delivery(
        &self,
        confirmation: DeliveryConfirmation,
    ) -> Result<StatusHistoryEntry, TrackingError> {
        self.ingest_as(InboundEvent::ConfirmDelivery(confirmation), status_entry)
            .await
    }

    pub async fn apply_traffic_hint(
        &self,
        delivery_id: Uuid,
        hint: TrafficHint,
    ) -> Result<EtaRecord, TrackingError> {
        self.ingest_as(InboundEvent::TrafficHint { delivery_id, hint }, eta_record)
            .await
    }

    pub async fn override_eta(&self, request: EtaOverride) -> Result<EtaRecord, TrackingError> {
        self.ingest_as(InboundEvent::EtaOverride(request), eta_record).await
    }

    pub async fn report_issue(&self, report: IssueReport) -> Result<Issue, TrackingError> {
        self.ingest_as(InboundEvent::ReportIssue(report), issue_of).await
    }

    pub async fn acknowledge_issue(&self, issue_id: Uuid, actor: &str) -> Result<Issue, TrackingError> {
        self.issue_action(
            issue_id,
            IssueAction::Acknowledge {
                actor: actor.to_string(),
            },
        )
        .await
    }

    pub async fn resolve_issue(
        &self,
        issue_id: Uuid,
        resolver: &str,
        resolution: &str,
    ) -> Result<Issue, TrackingError> {
        self.issue_action(
            issue_id,
            IssueAction::Resolve {
                resolver: resolver.to_string(),
                resolution: resolution.to_string(),
            },
        )
        .await
    }

    pub async fn escalate_issue(
        &self,
        issue_id: Uuid,
        resolver: &str,
        resolution: &str,
    ) -> Result<Issue, TrackingError> {
        self.issue_action(
            issue_id,
            IssueAction::Escalate {
                resolver: resolver.to_string(),
                resolution: resolution.to_string(),
            },
        )
        .await
    }

    pub async fn close_issue(&self, issue_id: Uuid, actor: &str) -> Result<Issue, TrackingError> {
        self.issue_action(
            issue_id,
            IssueAction::Close {
                actor: actor.to_string(),
            },
        )
        .await
    }

    pub async fn issue_action(&self, issue_id: Uuid, action: IssueAction) -> Result<Issue, TrackingError> {
        self.ingest_as(
            InboundEvent::Issue(IssueCommand { issue_id, action }),
            issue_of,
        )
        .await
    }

    /// Issues a fresh six-digit code, replacing any earlier one.
    pub async fn issue_confirmation_code(
        &self,
        delivery_id: Uuid,
    ) -> Result<ConfirmationCode, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let mut ledger = shared.lock().await;
        ledger.ensure_active()?;

        let code = issue_code(delivery_id, Utc::now(), self.config.confirmation_code_ttl);
        ledger.confirmation = Some(code.clone());
        info!(delivery_id = %delivery_id, expires_at = %code.expires_at, "confirmation code issued");
        Ok(code)
    }

    // ---- queries -----------------------------------------------------------

    pub async fn session(&self, delivery_id: Uuid) -> Result<TrackingSession, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.session.clone())
    }

    pub async fn sessions_for_carrier(&self, carrier_id: Uuid) -> Vec<TrackingSession> {
        let delivery_ids = self
            .carriers
            .get(&carrier_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut sessions = Vec::with_capacity(delivery_ids.len());
        for delivery_id in delivery_ids {
            if let Ok(session) = self.session(delivery_id).await {
                sessions.push(session);
            }
        }
        sessions
    }

    pub async fn current_status(&self, delivery_id: Uuid) -> Result<DeliveryStatus, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.status.current())
    }

    pub async fn status_history(
        &self,
        delivery_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.status.history().to_vec())
    }

    pub async fn latest_position(&self, delivery_id: Uuid) -> Result<PositionReport, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        ledger.positions.latest().cloned().ok_or_else(|| {
            TrackingError::NotFound(format!("no position reported for delivery {delivery_id}"))
        })
    }

    /// Up to `window` reports, most recent first.
    pub async fn position_history(
        &self,
        delivery_id: Uuid,
        window: usize,
    ) -> Result<Vec<PositionReport>, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.positions.history(window).cloned().collect())
    }

    pub async fn checkpoints(&self, delivery_id: Uuid) -> Result<Vec<Checkpoint>, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.checkpoints.all().to_vec())
    }

    pub async fn current_eta(&self, delivery_id: Uuid) -> Result<EtaView, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        let now = Utc::now();
        let record = ledger.eta.current().cloned().ok_or_else(|| {
            TrackingError::NotFound(format!("no eta computed for delivery {delivery_id}"))
        })?;
        Ok(EtaView {
            is_late: ledger.eta.is_late(now),
            record,
        })
    }

    pub async fn eta_history(&self, delivery_id: Uuid) -> Result<Vec<EtaRecord>, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.eta.records().to_vec())
    }

    pub async fn is_late(&self, delivery_id: Uuid) -> Result<bool, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(ledger.eta.is_late(Utc::now()))
    }

    pub async fn issues(
        &self,
        delivery_id: Uuid,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, TrackingError> {
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        Ok(match status {
            Some(status) => ledger.issues.with_status(status).cloned().collect(),
            None => ledger.issues.all().to_vec(),
        })
    }

    pub async fn issue(&self, issue_id: Uuid) -> Result<Issue, TrackingError> {
        let delivery_id = self
            .issue_index
            .get(&issue_id)
            .map(|entry| *entry.value())
            .ok_or(TrackingError::UnknownIssue(issue_id))?;
        let shared = self.ledger(delivery_id)?;
        let ledger = shared.lock().await;
        ledger
            .issues
            .get(issue_id)
            .cloned()
            .ok_or(TrackingError::UnknownIssue(issue_id))
    }

    /// Box around the latest fix of every active session, optionally limited
    /// to one carrier.
    pub async fn active_bounding_box(&self, carrier_id: Option<Uuid>) -> Option<BoundingBox> {
        let ledgers: Vec<SharedLedger> = self
            .deliveries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut points = Vec::new();
        for shared in ledgers {
            let ledger = shared.lock().await;
            if !ledger.session.active {
                continue;
            }
            if carrier_id.is_some_and(|id| id != ledger.session.carrier_id) {
                continue;
            }
            if let Some(report) = ledger.positions.latest() {
                points.push(report.point);
            }
        }

        bounding_box(&points)
    }

    // ---- internals ---------------------------------------------------------

    fn ledger(&self, delivery_id: Uuid) -> Result<SharedLedger, TrackingError> {
        self.deliveries
            .get(&delivery_id)
            .map(|entry| entry.value().clone())
            .ok_or(TrackingError::UnknownDelivery(delivery_id))
    }

    fn publish(&self, delivery_id: Uuid, timestamp: DateTime<Utc>, update: TrackingUpdate) -> TrackingEvent {
        let event = TrackingEvent::new(delivery_id, timestamp, update);
        let _ = self.events_tx.send(event.clone());
        event
    }

    fn observe<T>(&self, kind: &str, started: Instant, outcome: &Result<T, TrackingError>) {
        self.metrics
            .ingest_latency_seconds
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(_) => {
                self.metrics
                    .events_total
                    .with_label_values(&[kind, "accepted"])
                    .inc();
            }
            Err(err) => {
                self.metrics
                    .events_total
                    .with_label_values(&[kind, "rejected"])
                    .inc();
                self.metrics
                    .rejections_total
                    .with_label_values(&[err.kind()])
                    .inc();
                warn!(kind, error = %err, "inbound event rejected");
            }
        }
    }

    async fn ingest_as<T, F>(&self, event: InboundEvent, extract: F) -> Result<T, TrackingError>
    where
        F: FnOnce(TrackingUpdate) -> Option<T>,
    {
        let event = self.ingest(event).await?;
        let kind = event.update.kind();
        extract(event.update)
            .ok_or_else(|| TrackingError::Internal(format!("unexpected {kind} event")))
    }

    /// Writes a validated transition, publishes it, sends the counterparty
    /// notification and ends the session on a terminal status.
    fn commit_transition(
        &self,
        ledger: &mut DeliveryLedger,
        mut request: TransitionRequest,
        end_reason: SessionEndReason,
        now: DateTime<Utc>,
    ) -> Result<TrackingEvent, TrackingError> {
        let delivery_id = ledger.delivery_id();
        if request.location.is_none() {
            request.location = ledger.positions.latest().map(|r| r.point);
        }
        let note = request.note.clone().or_else(|| request.reason.clone());

        let entry = ledger.status.apply(request, now)?;
        ledger.session.touch(now);
        if entry.status == DeliveryStatus::InTransit {
            ledger.proximity = None;
        }

        info!(
            delivery_id = %delivery_id,
            from = %entry.previous_status,
            to = %entry.status,
            actor = %entry.actor,
            "status changed"
        );
        if entry.counterparty_notified {
            self.collaborators.notifier.dispatch(status_notification(
                delivery_id,
                entry.status,
                note.as_deref(),
            ));
        }

        let status = entry.status;
        let event = self.publish(delivery_id, now, TrackingUpdate::StatusUpdate(entry));

        if status.is_terminal() && ledger.session.active {
            ledger.session.end(end_reason, now);
            self.metrics.active_sessions.dec();
            self.publish(delivery_id, now, TrackingUpdate::SessionEnded(ledger.session.clone()));
            info!(delivery_id = %delivery_id, status = %status, "tracking session closed");
        }

        Ok(event)
    }

    fn compute_eta(
        &self,
        ledger: &DeliveryLedger,
        hint: Option<TrafficHint>,
        now: DateTime<Utc>,
    ) -> Result<EtaRecord, TrackingError> {
        let position = ledger.positions.latest().ok_or_else(|| {
            TrackingError::EtaUnavailable("no position reported yet".to_string())
        })?;
        let target = ledger.eta_target().ok_or_else(|| {
            TrackingError::EtaUnavailable("no pending checkpoint or destination".to_string())
        })?;

        let inputs = EtaInputs {
            delivery_id: ledger.delivery_id(),
            position,
            target,
            hint: hint.or(ledger.traffic_hint),
            historical_speed_kmh: ledger
                .positions
                .average_speed_kmh(self.config.speed_sample_size, self.config.speed_sample_window),
            now,
        };

        self.estimator
            .estimate(&inputs)
            .ok_or_else(|| TrackingError::EtaUnavailable("no usable speed".to_string()))
    }

    fn commit_eta(&self, ledger: &mut DeliveryLedger, record: EtaRecord, now: DateTime<Utc>) -> TrackingEvent {
        let record = ledger.eta.push(record);
        debug!(
            delivery_id = %record.delivery_id,
            estimated_arrival = %record.estimated_arrival,
            method = ?record.method,
            confidence = record.confidence,
            "eta updated"
        );
        self.publish(record.delivery_id, now, TrackingUpdate::EtaUpdate(record))
    }

    fn refresh_eta(&self, ledger: &mut DeliveryLedger, now: DateTime<Utc>) {
        match self.compute_eta(ledger, None, now) {
            Ok(record) => {
                self.commit_eta(ledger, record, now);
            }
            Err(err) => debug!(delivery_id = %ledger.delivery_id(), reason = %err, "eta not refreshed"),
        }
    }

    fn check_proximity(
        &self,
        ledger: &mut DeliveryLedger,
        report: &PositionReport,
        now: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        let Some(destination) = ledger.session.destination else {
            return Ok(());
        };
        let Some(level) = ProximityLevel::classify(&report.point, &destination, &self.config) else {
            return Ok(());
        };

        if ledger.proximity.is_none_or(|seen| level > seen) {
            ledger.proximity = Some(level);
            let eta_minutes = ledger
                .eta
                .current()
                .map(|r| (r.estimated_arrival - now).num_minutes().max(0));
            self.collaborators.notifier.dispatch(proximity_notification(
                ledger.delivery_id(),
                level,
                distance_m(&report.point, &destination),
                eta_minutes,
            ));
        }

        let arrived_in_transit = level == ProximityLevel::Arrived
            && ledger.status.current() == DeliveryStatus::InTransit;
        if arrived_in_transit && self.config.auto_attempt_on_arrival {
            self.commit_transition(
                ledger,
                TransitionRequest {
                    status: DeliveryStatus::DeliveryAttempt,
                    actor: SYSTEM_ACTOR.to_string(),
                    location: Some(report.point),
                    note: Some("arrived at destination".to_string()),
                    reason: None,
                    notify_counterparty: false,
                },
                SessionEndReason::Completed,
                now,
            )?;
        }
        Ok(())
    }
}

fn status_entry(update: TrackingUpdate) -> Option<StatusHistoryEntry> {
    match update {
        TrackingUpdate::StatusUpdate(entry) => Some(entry),
        _ => None,
    }
}

fn eta_record(update: TrackingUpdate) -> Option<EtaRecord> {
    match update {
        TrackingUpdate::EtaUpdate(record) => Some(record),
        _ => None,
    }
}

fn issue_of(update: TrackingUpdate) -> Option<Issue> {
    match update {
        TrackingUpdate::IssueReported(issue)
        | TrackingUpdate::IssueUpdated(issue)
        | TrackingUpdate::IssueResolved(issue) => Some(issue),
        _ => None,
    }
}
