fn main() {
    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::api::grpc::pb::{input}"))
            .output_type(format!("crate::api::grpc::pb::{output}"))
            .codec_path("tonic::codec::ProstCodec")
    };

    let service = tonic_build::manual::Service::builder()
        .name("TrackingService")
        .package("tracking")
        .method(
            method(
                "record_position",
                "RecordPosition",
                "RecordPositionRequest",
                "PositionReply",
            )
            .build(),
        )
        .method(
            method(
                "apply_transition",
                "ApplyTransition",
                "ApplyTransitionRequest",
                "StatusEntry",
            )
            .build(),
        )
        .method(method("get_status", "GetStatus", "DeliveryRef", "StatusReply").build())
        .method(
            method("watch_events", "WatchEvents", "WatchEventsRequest", "TrackingEventReply")
                .server_streaming()
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}
