use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::checkpoint::{
    Checkpoint, CheckpointCompletion, CheckpointKind, CheckpointPlan, ConfirmationCode,
    ProofOfCompletion,
};
use crate::models::position::GeoPoint;

/// Planned and realised stops for one delivery. Checkpoints are never removed;
/// a re-attempt is a new checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointBook {
    delivery_id: Uuid,
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointBook {
    pub fn new(delivery_id: Uuid) -> Self {
        Self {
            delivery_id,
            checkpoints: Vec::new(),
        }
    }

    pub fn all(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn get(&self, id: Uuid) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    pub fn plan(&mut self, plan: CheckpointPlan) -> Checkpoint {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            delivery_id: self.delivery_id,
            kind: plan.kind,
            point: plan.point,
            address: plan.address,
            planned_at: plan.planned_at,
            actual_at: None,
            completed_by: None,
            notes: None,
            proof: ProofOfCompletion::default(),
            metadata: plan.metadata,
        };
        self.checkpoints.push(checkpoint.clone());
        checkpoint
    }

    pub fn check_completion(&self, id: Uuid) -> Result<&Checkpoint, TrackingError> {
        let checkpoint = self.get(id).ok_or(TrackingError::UnknownCheckpoint(id))?;
        if checkpoint.is_completed() {
            return Err(TrackingError::AlreadyCompleted(id));
        }
        Ok(checkpoint)
    }

    pub fn complete(&mut self, completion: CheckpointCompletion) -> Result<Checkpoint, TrackingError> {
        self.check_completion(completion.checkpoint_id)?;

        let checkpoint = self
            .checkpoints
            .iter_mut()
            .find(|c| c.id == completion.checkpoint_id)
            .ok_or(TrackingError::UnknownCheckpoint(completion.checkpoint_id))?;

        checkpoint.actual_at = Some(completion.actual_at);
        checkpoint.completed_by = Some(completion.completed_by);
        checkpoint.notes = completion.notes;
        checkpoint.proof = completion.proof;

        Ok(checkpoint.clone())
    }

    /// The stop the carrier is heading for: the earliest planned incomplete
    /// checkpoint, unscheduled ones last in planning order.
    pub fn next_pending(&self) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| !c.is_completed())
            .min_by_key(|c| (c.planned_at.is_none(), c.planned_at))
    }

    pub fn latest_pending_of_kind(&self, kind: CheckpointKind) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.kind == kind && !c.is_completed())
    }

    /// Plans and completes a checkpoint in one step, for stops that were never
    /// scheduled in advance.
    pub fn record_unplanned(
        &mut self,
        kind: CheckpointKind,
        point: GeoPoint,
        address: String,
        completion: CheckpointCompletion,
    ) -> Checkpoint {
        let mut checkpoint = self.plan(CheckpointPlan {
            delivery_id: self.delivery_id,
            kind,
            point,
            address,
            planned_at: None,
            metadata: Default::default(),
        });
        if let Some(stored) = self.checkpoints.iter_mut().find(|c| c.id == checkpoint.id) {
            stored.actual_at = Some(completion.actual_at);
            stored.completed_by = Some(completion.completed_by);
            stored.notes = completion.notes;
            stored.proof = completion.proof;
            checkpoint = stored.clone();
        }
        checkpoint
    }
}

/// Six-digit code derived from a random v4 UUID.
pub fn generate_code() -> String {
    let value = Uuid::new_v4().as_u128() % 900_000 + 100_000;
    value.to_string()
}

pub fn issue_code(delivery_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> ConfirmationCode {
    ConfirmationCode {
        delivery_id,
        code: generate_code(),
        issued_at: now,
        expires_at: now + ttl,
        used_at: None,
    }
}

pub fn verify_code(
    issued: Option<&ConfirmationCode>,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(), TrackingError> {
    let issued = issued.ok_or_else(|| {
        TrackingError::InvalidConfirmationCode("no code was issued for this delivery".to_string())
    })?;

    if issued.used_at.is_some() {
        return Err(TrackingError::InvalidConfirmationCode(
            "code has already been used".to_string(),
        ));
    }
    if now > issued.expires_at {
        return Err(TrackingError::InvalidConfirmationCode(
            "code has expired".to_string(),
        ));
    }
    if issued.code != submitted.trim() {
        return Err(TrackingError::InvalidConfirmationCode(
            "code does not match".to_string(),
        ));
    }
    Ok(())
}
