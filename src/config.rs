use std::env;

use chrono::Duration;

use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub grpc_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub notification_queue_size: usize,
    pub tracking: TrackingConfig,
}

/// Knobs handed to the tracking engine at construction.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub default_speed_kmh: f64,
    pub position_retention: usize,
    pub max_clock_skew: Duration,
    pub speed_sample_size: usize,
    pub speed_sample_window: Duration,
    pub confirmation_code_ttl: Duration,
    pub auto_attempt_on_arrival: bool,
    pub approaching_radius_m: f64,
    pub nearby_radius_m: f64,
    pub arrived_radius_m: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            default_speed_kmh: 30.0,
            position_retention: 10_000,
            max_clock_skew: Duration::seconds(30),
            speed_sample_size: 10,
            speed_sample_window: Duration::minutes(5),
            confirmation_code_ttl: Duration::hours(24),
            auto_attempt_on_arrival: true,
            approaching_radius_m: 2_000.0,
            nearby_radius_m: 500.0,
            arrived_radius_m: 50.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, TrackingError> {
        let _ = dotenvy::dotenv();

        let defaults = TrackingConfig::default();
        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(TrackingError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        let default_speed_kmh: f64 = parse_or_default("DEFAULT_SPEED_KMH", defaults.default_speed_kmh)?;
        if default_speed_kmh <= 0.0 {
            return Err(TrackingError::Internal(
                "invalid DEFAULT_SPEED_KMH: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            grpc_port: parse_or_default("GRPC_PORT", 50051)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            tracking: TrackingConfig {
                default_speed_kmh,
                position_retention: parse_or_default(
                    "POSITION_RETENTION",
                    defaults.position_retention,
                )?,
                max_clock_skew: seconds_or_default("MAX_CLOCK_SKEW_SECS", 30)?,
                speed_sample_size: parse_or_default("SPEED_SAMPLE_SIZE", defaults.speed_sample_size)?,
                speed_sample_window: seconds_or_default("SPEED_SAMPLE_WINDOW_SECS", 300)?,
                confirmation_code_ttl: seconds_or_default("CONFIRMATION_CODE_TTL_SECS", 86_400)?,
                auto_attempt_on_arrival: parse_or_default(
                    "AUTO_ATTEMPT_ON_ARRIVAL",
                    defaults.auto_attempt_on_arrival,
                )?,
                ..defaults
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, TrackingError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| TrackingError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn seconds_or_default(key: &str, default: i64) -> Result<Duration, TrackingError> {
    seconds(key, parse_or_default(key, default)?)
}

fn seconds(key: &str, secs: i64) -> Result<Duration, TrackingError> {
    if secs < 0 {
        return Err(TrackingError::Internal(format!(
            "invalid {key}: must not be negative"
        )));
    }
    Duration::try_seconds(secs)
        .ok_or_else(|| TrackingError::Internal(format!("invalid {key}: {secs} is out of range")))
}
