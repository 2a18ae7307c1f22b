use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use delivery_tracker::config::TrackingConfig;
use delivery_tracker::engine::notify::{AdminNotifier, NotificationDispatcher};
use delivery_tracker::engine::session::{Collaborators, TrackingEngine};
use delivery_tracker::error::TrackingError;
use delivery_tracker::models::checkpoint::{
    CheckpointCompletion, CheckpointKind, CheckpointPlan, DeliveryConfirmation, ProofOfCompletion,
};
use delivery_tracker::models::eta::{EtaMethod, EtaOverride, TrafficCondition, TrafficHint};
use delivery_tracker::models::event::{AdminAlert, NotificationRequest, Recipient, TrackingUpdate};
use delivery_tracker::models::issue::{IssueReport, IssueSeverity, IssueStatus, IssueType};
use delivery_tracker::models::position::{GeoPoint, PositionInput};
use delivery_tracker::models::session::{SessionEndReason, SessionStart};
use delivery_tracker::models::status::{DeliveryStatus, StatusChange};
use delivery_tracker::observability::metrics::Metrics;
use uuid::Uuid;

/// Meters per degree of latitude on the sphere used by `geo::distance_m`.
const METERS_PER_DEGREE: f64 = 6_371_009.0 * std::f64::consts::PI / 180.0;

#[derive(Default)]
struct Recorder {
    notifications: Mutex<Vec<NotificationRequest>>,
    alerts: Mutex<Vec<AdminAlert>>,
}

impl NotificationDispatcher for Recorder {
    fn dispatch(&self, request: NotificationRequest) {
        self.notifications.lock().unwrap().push(request);
    }
}

impl AdminNotifier for Recorder {
    fn alert(&self, alert: AdminAlert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

fn engine() -> (Arc<TrackingEngine>, Arc<Recorder>) {
    engine_with(TrackingConfig::default())
}

fn engine_with(config: TrackingConfig) -> (Arc<TrackingEngine>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let collaborators = Collaborators {
        notifier: recorder.clone(),
        admin: recorder.clone(),
    };
    let engine = TrackingEngine::new(config, 256, collaborators, Metrics::new());
    (Arc::new(engine), recorder)
}

fn origin() -> GeoPoint {
    GeoPoint::new(52.0, 13.0)
}

fn north_of(point: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(point.lat + meters / METERS_PER_DEGREE, point.lng)
}

fn position(delivery_id: Uuid, point: GeoPoint, timestamp: DateTime<Utc>) -> PositionInput {
    PositionInput {
        delivery_id,
        point,
        accuracy: Some(10.0),
        heading: None,
        speed: None,
        altitude: None,
        timestamp,
        metadata: Default::default(),
        telemetry: None,
    }
}

fn change(delivery_id: Uuid, status: DeliveryStatus) -> StatusChange {
    StatusChange {
        delivery_id,
        status,
        actor: "dispatcher".to_string(),
        location: None,
        note: None,
        reason: None,
        notify_counterparty: false,
    }
}

fn confirmation(delivery_id: Uuid, code: Option<&str>) -> DeliveryConfirmation {
    DeliveryConfirmation {
        delivery_id,
        confirmed_by: "recipient".to_string(),
        confirmation_code: code.map(str::to_string),
        signature_url: None,
        photo_url: None,
        location: None,
        notes: None,
    }
}

async fn start(engine: &TrackingEngine, destination: Option<GeoPoint>) -> Uuid {
    let delivery_id = Uuid::new_v4();
    engine
        .start_session(SessionStart {
            delivery_id,
            carrier_id: Uuid::new_v4(),
            destination,
            telemetry: None,
        })
        .await
        .unwrap();
    delivery_id
}

async fn move_to(engine: &TrackingEngine, delivery_id: Uuid, statuses: &[DeliveryStatus]) {
    for status in statuses {
        engine
            .apply_transition(change(delivery_id, *status))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn eta_over_two_kilometers_at_default_speed() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 2_100.0);
    let delivery_id = start(&engine, Some(destination)).await;

    engine
        .record_position(position(delivery_id, origin(), Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    let view = engine.current_eta(delivery_id).await.unwrap();
    let seconds = (view.record.estimated_arrival - view.record.computed_at).num_seconds();
    assert!((251..=253).contains(&seconds), "got {seconds}s");
    assert_eq!(view.record.method, EtaMethod::LivePositional);
    assert!(!view.is_late);

    let remaining = view.record.remaining_distance.unwrap();
    assert!((remaining - 2_100.0).abs() < 1.0);
}

#[tokio::test]
async fn reported_speeds_switch_to_historical_pattern() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 5_000.0);
    let delivery_id = start(&engine, Some(destination)).await;
    let base = Utc::now() - Duration::seconds(30);

    for step in 0..3 {
        let mut input = position(
            delivery_id,
            north_of(origin(), step as f64 * 100.0),
            base + Duration::seconds(step * 10),
        );
        input.speed = Some(10.0);
        engine.record_position(input).await.unwrap();
    }

    let view = engine.current_eta(delivery_id).await.unwrap();
    assert_eq!(view.record.method, EtaMethod::HistoricalPattern);
    assert_eq!(view.record.traffic, TrafficCondition::Moderate);
}

#[tokio::test]
async fn traffic_hint_slows_the_estimate() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 3_000.0);
    let delivery_id = start(&engine, Some(destination)).await;

    let err = engine
        .apply_traffic_hint(
            delivery_id,
            TrafficHint {
                condition: TrafficCondition::Heavy,
                speed_kmh: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::EtaUnavailable(_)));

    engine
        .record_position(position(delivery_id, origin(), Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();
    let before = engine.current_eta(delivery_id).await.unwrap().record;

    let after = engine
        .apply_traffic_hint(
            delivery_id,
            TrafficHint {
                condition: TrafficCondition::Heavy,
                speed_kmh: None,
            },
        )
        .await
        .unwrap();

    assert!(after.estimated_arrival > before.estimated_arrival);
    assert_eq!(after.traffic, TrafficCondition::Heavy);
    assert_eq!(after.previous_estimate, Some(before.estimated_arrival));
    assert!(after.confidence < before.confidence);
}

#[tokio::test]
async fn vanishing_hinted_speed_is_rejected() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 2_100.0);
    let delivery_id = start(&engine, Some(destination)).await;
    engine
        .record_position(position(delivery_id, origin(), Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .apply_traffic_hint(
                    delivery_id,
                    TrafficHint {
                        condition: TrafficCondition::Heavy,
                        speed_kmh: Some(1e-12),
                    },
                )
                .await
        })
    };

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, TrackingError::InvalidInput(_)));

    let view = engine.current_eta(delivery_id).await.unwrap();
    assert_eq!(view.record.traffic, TrafficCondition::Unknown);
}

#[tokio::test]
async fn manual_override_survives_new_positions() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 4_000.0);
    let delivery_id = start(&engine, Some(destination)).await;
    let base = Utc::now() - Duration::seconds(20);

    engine
        .record_position(position(delivery_id, origin(), base))
        .await
        .unwrap();

    let pinned_at = Utc::now() + Duration::hours(2);
    engine
        .override_eta(EtaOverride {
            delivery_id,
            estimated_arrival: pinned_at,
            overridden_by: "ops".to_string(),
            note: Some("road closure".to_string()),
        })
        .await
        .unwrap();

    engine
        .record_position(position(
            delivery_id,
            north_of(origin(), 500.0),
            base + Duration::seconds(10),
        ))
        .await
        .unwrap();

    let view = engine.current_eta(delivery_id).await.unwrap();
    assert_eq!(view.record.method, EtaMethod::ManualOverride);
    assert_eq!(view.record.estimated_arrival, pinned_at);
    assert_eq!(view.record.overridden_by.as_deref(), Some("ops"));
    assert_eq!(engine.eta_history(delivery_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn delivered_delivery_rejects_positions() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, None).await;

    move_to(
        &engine,
        delivery_id,
        &[DeliveryStatus::InTransit, DeliveryStatus::Delivered],
    )
    .await;

    let session = engine.session(delivery_id).await.unwrap();
    assert!(!session.active);
    assert_eq!(session.end_reason, Some(SessionEndReason::Completed));

    let err = engine
        .record_position(position(delivery_id, origin(), Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::SessionInactive(id) if id == delivery_id));
    assert_eq!(engine.active_session_count(), 0);
}

#[tokio::test]
async fn critical_escalation_fails_the_delivery() {
    let (engine, recorder) = engine();
    let delivery_id = start(&engine, None).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;

    let issue = engine
        .report_issue(IssueReport {
            delivery_id,
            issue_type: IssueType::VehicleBreakdown,
            reported_by: "carrier".to_string(),
            description: "engine failure on the ring road".to_string(),
            severity: IssueSeverity::Critical,
            location: Some(origin()),
            photos: vec![],
        })
        .await
        .unwrap();
    assert_eq!(issue.status, IssueStatus::Open);

    let escalated = engine
        .escalate_issue(issue.id, "support", "no replacement vehicle")
        .await
        .unwrap();
    assert_eq!(escalated.status, IssueStatus::Escalated);

    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::Failed
    );
    let session = engine.session(delivery_id).await.unwrap();
    assert!(!session.active);

    let err = engine
        .resolve_issue(issue.id, "support", "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::InvalidIssueTransition { .. }));

    let closed = engine.close_issue(issue.id, "support").await.unwrap();
    assert_eq!(closed.status, IssueStatus::Closed);

    assert_eq!(recorder.alerts.lock().unwrap().len(), 2);
    let notifications = recorder.notifications.lock().unwrap();
    assert!(notifications
        .iter()
        .any(|n| n.data.get("status").map(String::as_str) == Some("failed")));
}

#[tokio::test]
async fn resolving_an_issue_notifies_the_carrier() {
    let (engine, recorder) = engine();
    let delivery_id = start(&engine, None).await;

    let issue = engine
        .report_issue(IssueReport {
            delivery_id,
            issue_type: IssueType::AddressNotFound,
            reported_by: "carrier".to_string(),
            description: "house number missing".to_string(),
            severity: IssueSeverity::Medium,
            location: None,
            photos: vec![],
        })
        .await
        .unwrap();
    engine
        .resolve_issue(issue.id, "support", "use the side entrance")
        .await
        .unwrap();

    let notifications = recorder.notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient, Recipient::Carrier);
    assert_eq!(notifications[0].body, "use the side entrance");
    assert_eq!(
        notifications[0].data.get("issue_id"),
        Some(&issue.id.to_string())
    );
}

#[tokio::test]
async fn low_severity_issue_does_not_alert_admins() {
    let (engine, recorder) = engine();
    let delivery_id = start(&engine, None).await;

    let issue = engine
        .report_issue(IssueReport {
            delivery_id,
            issue_type: IssueType::TrafficJam,
            reported_by: "carrier".to_string(),
            description: "slow traffic near the bridge".to_string(),
            severity: IssueSeverity::Low,
            location: None,
            photos: vec![],
        })
        .await
        .unwrap();
    engine.acknowledge_issue(issue.id, "support").await.unwrap();

    assert!(recorder.alerts.lock().unwrap().is_empty());
    let open = engine
        .issues(delivery_id, Some(IssueStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn repeated_attempts_keep_every_checkpoint() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 1_000.0);
    let delivery_id = start(&engine, Some(destination)).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;

    for attempt in 0..2 {
        let checkpoint = engine
            .plan_checkpoint(CheckpointPlan {
                delivery_id,
                kind: CheckpointKind::DeliveryAttempt,
                point: destination,
                address: "12 Harbour Street".to_string(),
                planned_at: None,
                metadata: Default::default(),
            })
            .await
            .unwrap();

        move_to(&engine, delivery_id, &[DeliveryStatus::DeliveryAttempt]).await;
        engine
            .complete_checkpoint(CheckpointCompletion {
                checkpoint_id: checkpoint.id,
                actual_at: Utc::now(),
                completed_by: "carrier".to_string(),
                notes: Some(format!("attempt {}", attempt + 1)),
                proof: ProofOfCompletion::default(),
            })
            .await
            .unwrap();

        if attempt == 0 {
            move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;
        }
    }

    engine
        .confirm_delivery(confirmation(delivery_id, None))
        .await
        .unwrap();

    let checkpoints = engine.checkpoints(delivery_id).await.unwrap();
    assert_eq!(checkpoints.len(), 3);
    let attempts = checkpoints
        .iter()
        .filter(|c| c.kind == CheckpointKind::DeliveryAttempt)
        .count();
    assert_eq!(attempts, 2);
    assert!(checkpoints.iter().all(|c| c.actual_at.is_some()));
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::Delivered
    );
}

#[tokio::test]
async fn wrong_confirmation_code_leaves_status_alone() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, Some(origin())).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;

    let code = engine.issue_confirmation_code(delivery_id).await.unwrap();
    let wrong = if code.code == "123456" { "654321" } else { "123456" };

    let err = engine
        .confirm_delivery(confirmation(delivery_id, Some(wrong)))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::InvalidConfirmationCode(_)));
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::InTransit
    );
    assert!(engine.checkpoints(delivery_id).await.unwrap().is_empty());

    let entry = engine
        .confirm_delivery(confirmation(delivery_id, Some(&code.code)))
        .await
        .unwrap();
    assert_eq!(entry.status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn duplicate_confirmation_is_an_invalid_transition() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, Some(origin())).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;

    engine
        .confirm_delivery(confirmation(delivery_id, None))
        .await
        .unwrap();
    let err = engine
        .confirm_delivery(confirmation(delivery_id, None))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TrackingError::InvalidTransition {
            from: DeliveryStatus::Delivered,
            to: DeliveryStatus::Delivered,
        }
    ));
}

#[tokio::test]
async fn status_history_forms_a_path() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, None).await;

    move_to(
        &engine,
        delivery_id,
        &[
            DeliveryStatus::PickedUp,
            DeliveryStatus::InTransit,
            DeliveryStatus::DeliveryAttempt,
            DeliveryStatus::InTransit,
        ],
    )
    .await;
    let rejected = engine
        .apply_transition(change(delivery_id, DeliveryStatus::PickedUp))
        .await;
    assert!(rejected.is_err());
    move_to(&engine, delivery_id, &[DeliveryStatus::Delivered]).await;

    let history = engine.status_history(delivery_id).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history[0].previous_status, DeliveryStatus::Created);
    for pair in history.windows(2) {
        assert_eq!(pair[1].previous_status, pair[0].status);
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
    assert_eq!(history.last().unwrap().status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn stale_and_equal_timestamps_are_rejected() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, None).await;
    let at = Utc::now() - Duration::seconds(10);

    engine
        .record_position(position(delivery_id, origin(), at))
        .await
        .unwrap();

    for timestamp in [at, at - Duration::seconds(1)] {
        let err = engine
            .record_position(position(delivery_id, origin(), timestamp))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::StaleTimestamp { .. }));
    }
    assert_eq!(engine.position_history(delivery_id, 10).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_end_races_in_flight_positions() {
    let (engine, _) = engine();
    let delivered = start(&engine, None).await;
    let paused = start(&engine, None).await;
    move_to(&engine, delivered, &[DeliveryStatus::InTransit]).await;

    let mut rx = engine.subscribe();
    let base = Utc::now() - Duration::seconds(120);

    let mut positions = Vec::new();
    let mut endings = Vec::new();
    for step in 0..50i64 {
        for delivery_id in [delivered, paused] {
            let engine = engine.clone();
            positions.push(tokio::spawn(async move {
                let input = position(
                    delivery_id,
                    north_of(origin(), step as f64),
                    base + Duration::seconds(step),
                );
                (delivery_id, engine.record_position(input).await)
            }));
        }

        if step == 25 {
            let engine_a = engine.clone();
            endings.push(tokio::spawn(async move {
                engine_a
                    .apply_transition(change(delivered, DeliveryStatus::Delivered))
                    .await
                    .map(|_| ())
            }));
            let engine_b = engine.clone();
            endings.push(tokio::spawn(async move {
                engine_b
                    .end_session(paused, SessionEndReason::Paused, "ops")
                    .await
                    .map(|_| ())
            }));
        }
    }

    for handle in endings {
        handle.await.unwrap().unwrap();
    }

    let mut accepted = std::collections::HashMap::new();
    for handle in positions {
        let (delivery_id, outcome) = handle.await.unwrap();
        match outcome {
            Ok(_) => *accepted.entry(delivery_id).or_insert(0usize) += 1,
            Err(err) => assert!(
                matches!(
                    err,
                    TrackingError::SessionInactive(_) | TrackingError::StaleTimestamp { .. }
                ),
                "unexpected rejection: {err}"
            ),
        }
    }

    for delivery_id in [delivered, paused] {
        let stored = engine.position_history(delivery_id, 100).await.unwrap().len();
        assert_eq!(stored, accepted.get(&delivery_id).copied().unwrap_or(0));
    }

    // The event stream reflects the order writes were applied in: nothing
    // lands on a delivery after its session-ended event.
    let mut ended = std::collections::HashSet::new();
    while let Ok(event) = rx.try_recv() {
        match event.update {
            TrackingUpdate::SessionEnded(_) => {
                ended.insert(event.delivery_id);
            }
            TrackingUpdate::LocationUpdate(_) => {
                assert!(
                    !ended.contains(&event.delivery_id),
                    "position recorded after session end"
                );
            }
            _ => {}
        }
    }
    assert!(ended.contains(&delivered) && ended.contains(&paused));

    for delivery_id in [delivered, paused] {
        let err = engine
            .record_position(position(delivery_id, origin(), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::SessionInactive(id) if id == delivery_id));

        let err = engine
            .plan_checkpoint(CheckpointPlan {
                delivery_id,
                kind: CheckpointKind::Waypoint,
                point: origin(),
                address: "late stop".to_string(),
                planned_at: None,
                metadata: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::SessionInactive(_)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_deliveries_progress_in_parallel() {
    let (engine, _) = engine();
    let first = start(&engine, None).await;
    let second = start(&engine, None).await;
    let base = Utc::now() - Duration::seconds(120);

    let writers: Vec<_> = [first, second]
        .into_iter()
        .map(|delivery_id| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for step in 0..30i64 {
                    engine
                        .record_position(position(
                            delivery_id,
                            north_of(origin(), step as f64),
                            base + Duration::seconds(step),
                        ))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.await.unwrap();
    }

    for delivery_id in [first, second] {
        let history = engine.position_history(delivery_id, 100).await.unwrap();
        assert_eq!(history.len(), 30);
        assert_eq!(history[0].timestamp, base + Duration::seconds(29));
    }
}

#[tokio::test]
async fn cancelling_a_session_cancels_the_delivery() {
    let (engine, recorder) = engine();
    let delivery_id = start(&engine, None).await;

    let session = engine
        .end_session(delivery_id, SessionEndReason::Cancelled, "ops")
        .await
        .unwrap();
    assert!(!session.active);
    assert_eq!(session.end_reason, Some(SessionEndReason::Cancelled));
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::Cancelled
    );
    assert_eq!(recorder.notifications.lock().unwrap().len(), 1);

    let err = engine
        .start_session(SessionStart {
            delivery_id,
            carrier_id: Uuid::new_v4(),
            destination: None,
            telemetry: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::SessionInactive(_)));
}

#[tokio::test]
async fn completed_is_not_a_manual_end_reason() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, None).await;

    let err = engine
        .end_session(delivery_id, SessionEndReason::Completed, "ops")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::InvalidInput(_)));
    assert!(engine.session(delivery_id).await.unwrap().active);
}

#[tokio::test]
async fn paused_session_resumes_with_new_carrier() {
    let (engine, _) = engine();
    let delivery_id = start(&engine, None).await;

    engine
        .end_session(delivery_id, SessionEndReason::CarrierDisconnected, "system")
        .await
        .unwrap();
    assert_eq!(engine.active_session_count(), 0);

    let carrier_id = Uuid::new_v4();
    let session = engine
        .start_session(SessionStart {
            delivery_id,
            carrier_id,
            destination: None,
            telemetry: None,
        })
        .await
        .unwrap();
    assert!(session.active);
    assert_eq!(session.end_reason, None);
    assert_eq!(engine.active_session_count(), 1);
    assert_eq!(engine.sessions_for_carrier(carrier_id).await.len(), 1);
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::Assigned
    );
}

#[tokio::test]
async fn arrival_triggers_proximity_alerts_and_attempt() {
    let (engine, recorder) = engine();
    let destination = north_of(origin(), 1_500.0);
    let delivery_id = start(&engine, Some(destination)).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;
    let base = Utc::now() - Duration::seconds(60);

    engine
        .record_position(position(delivery_id, origin(), base))
        .await
        .unwrap();
    engine
        .record_position(position(
            delivery_id,
            north_of(origin(), 1_480.0),
            base + Duration::seconds(30),
        ))
        .await
        .unwrap();

    let history = engine.status_history(delivery_id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.status, DeliveryStatus::DeliveryAttempt);
    assert_eq!(last.actor, "system");

    let levels: Vec<String> = recorder
        .notifications
        .lock()
        .unwrap()
        .iter()
        .filter_map(|n| n.data.get("proximity").cloned())
        .collect();
    assert_eq!(levels, vec!["Approaching".to_string(), "Arrived".to_string()]);
}

#[tokio::test]
async fn retry_after_attempt_arrives_again() {
    let (engine, recorder) = engine();
    let destination = north_of(origin(), 1_000.0);
    let delivery_id = start(&engine, Some(destination)).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;
    let base = Utc::now() - Duration::seconds(120);

    engine
        .record_position(position(delivery_id, north_of(destination, -10.0), base))
        .await
        .unwrap();
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::DeliveryAttempt
    );

    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;
    engine
        .record_position(position(delivery_id, origin(), base + Duration::seconds(30)))
        .await
        .unwrap();
    engine
        .record_position(position(
            delivery_id,
            north_of(destination, -5.0),
            base + Duration::seconds(90),
        ))
        .await
        .unwrap();

    let history = engine.status_history(delivery_id).await.unwrap();
    let attempts: Vec<&str> = history
        .iter()
        .filter(|entry| entry.status == DeliveryStatus::DeliveryAttempt)
        .map(|entry| entry.actor.as_str())
        .collect();
    assert_eq!(attempts, vec!["system", "system"]);
    assert_eq!(history.last().unwrap().status, DeliveryStatus::DeliveryAttempt);

    let arrivals = recorder
        .notifications
        .lock()
        .unwrap()
        .iter()
        .filter(|n| n.data.get("proximity").map(String::as_str) == Some("Arrived"))
        .count();
    assert_eq!(arrivals, 2);
}

#[tokio::test]
async fn arrival_before_transit_attempts_once_moving() {
    let (engine, _) = engine();
    let destination = north_of(origin(), 1_000.0);
    let delivery_id = start(&engine, Some(destination)).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::PickedUp]).await;
    let base = Utc::now() - Duration::seconds(60);

    engine
        .record_position(position(delivery_id, north_of(destination, -5.0), base))
        .await
        .unwrap();
    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::PickedUp
    );

    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;
    engine
        .record_position(position(
            delivery_id,
            north_of(destination, -3.0),
            base + Duration::seconds(10),
        ))
        .await
        .unwrap();

    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::DeliveryAttempt
    );
}

#[tokio::test]
async fn arrival_without_auto_attempt_keeps_status() {
    let config = TrackingConfig {
        auto_attempt_on_arrival: false,
        ..TrackingConfig::default()
    };
    let (engine, _) = engine_with(config);
    let destination = north_of(origin(), 20.0);
    let delivery_id = start(&engine, Some(destination)).await;
    move_to(&engine, delivery_id, &[DeliveryStatus::InTransit]).await;

    engine
        .record_position(position(delivery_id, origin(), Utc::now() - Duration::seconds(1)))
        .await
        .unwrap();

    assert_eq!(
        engine.current_status(delivery_id).await.unwrap(),
        DeliveryStatus::InTransit
    );
}

#[tokio::test]
async fn subscribers_see_session_start_and_status() {
    let (engine, _) = engine();
    let mut rx = engine.subscribe();
    let delivery_id = start(&engine, None).await;

    let first = rx.recv().await.unwrap();
    assert_eq!(first.delivery_id, delivery_id);
    assert!(matches!(first.update, TrackingUpdate::SessionStarted(_)));

    let second = rx.recv().await.unwrap();
    match second.update {
        TrackingUpdate::StatusUpdate(entry) => {
            assert_eq!(entry.previous_status, DeliveryStatus::Created);
            assert_eq!(entry.status, DeliveryStatus::Assigned);
        }
        other => panic!("unexpected update {}", other.kind()),
    }
}

#[tokio::test]
async fn unknown_delivery_is_reported() {
    let (engine, _) = engine();
    let missing = Uuid::new_v4();

    let err = engine
        .apply_transition(change(missing, DeliveryStatus::InTransit))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::UnknownDelivery(id) if id == missing));
}
