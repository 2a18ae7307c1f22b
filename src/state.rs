use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::TrackingConfig;
use crate::engine::notify::{ChannelDispatcher, LogAdminNotifier};
use crate::engine::session::{Collaborators, TrackingEngine};
use crate::models::event::NotificationRequest;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub engine: Arc<TrackingEngine>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: TrackingConfig,
        notification_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<NotificationRequest>) {
        let metrics = Metrics::new();
        let (notification_tx, notification_rx) = mpsc::channel(notification_queue_size.max(1));

        let collaborators = Collaborators {
            notifier: Arc::new(ChannelDispatcher::new(notification_tx, metrics.clone())),
            admin: Arc::new(LogAdminNotifier),
        };
        let engine = TrackingEngine::new(config, event_buffer_size, collaborators, metrics.clone());

        (
            Self {
                engine: Arc::new(engine),
                metrics,
            },
            notification_rx,
        )
    }
}
