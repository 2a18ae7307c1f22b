//! Wire messages for the `tracking.TrackingService` gRPC service. The service
//! stubs are generated by `build.rs` and included at the bottom.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeoPoint {
    #[prost(double, tag = "1")]
    pub lat: f64,
    #[prost(double, tag = "2")]
    pub lng: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordPositionRequest {
    #[prost(string, tag = "1")]
    pub delivery_id: String,
    #[prost(message, optional, tag = "2")]
    pub point: Option<GeoPoint>,
    #[prost(double, optional, tag = "3")]
    pub accuracy: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub heading: Option<f64>,
    #[prost(double, optional, tag = "5")]
    pub speed: Option<f64>,
    #[prost(double, optional, tag = "6")]
    pub altitude: Option<f64>,
    /// RFC 3339 capture time.
    #[prost(string, tag = "7")]
    pub timestamp: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PositionReply {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub delivery_id: String,
    #[prost(message, optional, tag = "3")]
    pub point: Option<GeoPoint>,
    #[prost(string, tag = "4")]
    pub timestamp: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyTransitionRequest {
    #[prost(string, tag = "1")]
    pub delivery_id: String,
    #[prost(string, tag = "2")]
    pub status: String,
    #[prost(string, tag = "3")]
    pub actor: String,
    #[prost(string, optional, tag = "4")]
    pub note: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub reason: Option<String>,
    #[prost(bool, tag = "6")]
    pub notify_counterparty: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusEntry {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub delivery_id: String,
    #[prost(string, tag = "3")]
    pub status: String,
    #[prost(string, tag = "4")]
    pub previous_status: String,
    #[prost(string, tag = "5")]
    pub timestamp: String,
    #[prost(string, tag = "6")]
    pub actor: String,
    #[prost(string, optional, tag = "7")]
    pub note: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub reason: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeliveryRef {
    #[prost(string, tag = "1")]
    pub delivery_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusReply {
    #[prost(string, tag = "1")]
    pub delivery_id: String,
    #[prost(string, tag = "2")]
    pub status: String,
    #[prost(bool, tag = "3")]
    pub active: bool,
    #[prost(message, repeated, tag = "4")]
    pub history: Vec<StatusEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WatchEventsRequest {
    #[prost(string, optional, tag = "1")]
    pub delivery_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TrackingEventReply {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub delivery_id: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(string, tag = "4")]
    pub timestamp: String,
    /// The kind-specific payload, JSON encoded.
    #[prost(string, tag = "5")]
    pub payload_json: String,
}

include!(concat!(env!("OUT_DIR"), "/tracking.TrackingService.rs"));
