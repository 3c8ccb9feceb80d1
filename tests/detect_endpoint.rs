//! Upload and result-fetch behaviour against a loopback stub service.

mod support;

use std::time::Duration;

use defect_inspector::{ClientConfig, ClientError, DetectClient, SelectedFile, Severity};
use support::{png_bytes, CannedResponse, StubServer};

const ONE_CRACK: &str = r#"{"detections":[{"class_name":"crack","severity":"HIGH",
    "confidence":0.873,"x":10,"y":20,"width":100,"height":50}]}"#;

fn client_for(server: &StubServer) -> DetectClient {
    client_with_timeout(server, Duration::from_secs(5))
}

fn client_with_timeout(server: &StubServer, timeout: Duration) -> DetectClient {
    let mut cfg = ClientConfig {
        api_url: server.url(),
        timeout,
        ..ClientConfig::default()
    };
    cfg.validate().expect("valid config");
    DetectClient::new(&cfg)
}

fn rail_image() -> SelectedFile {
    SelectedFile::from_bytes("rail.png", "image/png", png_bytes(32, 32))
}

#[test]
fn posts_multipart_file_and_parses_detections() {
    let server = StubServer::start(vec![CannedResponse::json(200, ONE_CRACK)]);
    let file = rail_image();

    let response = client_for(&server).detect(&file).expect("detect");
    assert_eq!(response.detections.len(), 1);
    let crack = &response.detections[0];
    assert_eq!(crack.class_name, "crack");
    assert_eq!(crack.severity, Severity::High);
    assert_eq!(crack.width, 100.0);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.request_line.starts_with("POST /detect "));
    assert_eq!(request.header("accept"), Some("application/json"));
    let content_type = request.header("content-type").expect("content type");
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = request.body_text();
    assert!(body.contains("Content-Disposition: form-data; name=\"file\"; filename=\"rail.png\""));
    assert!(body.contains("Content-Type: image/png"));
    let uploaded = request
        .body
        .windows(file.bytes.len())
        .any(|window| window == file.bytes.as_slice());
    assert!(uploaded, "image bytes must be uploaded unchanged");
}

#[test]
fn empty_success_body_means_no_defects() {
    let server = StubServer::start(vec![CannedResponse::json(200, "{}")]);
    let response = client_for(&server).detect(&rail_image()).expect("detect");
    assert!(response.is_empty());
}

#[test]
fn detail_message_is_surfaced_exactly() {
    let server = StubServer::start(vec![CannedResponse::json(
        400,
        r#"{"detail":"unsupported format"}"#,
    )]);
    let err = client_for(&server).detect(&rail_image()).unwrap_err();
    match &err {
        ClientError::ServerError { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "unsupported format");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "unsupported format");
}

#[test]
fn unparsable_error_body_synthesizes_status_message() {
    let server = StubServer::start(vec![
        CannedResponse::json(500, "Internal Server Error"),
        CannedResponse::json(500, ""),
    ]);
    let client = client_for(&server);
    for _ in 0..2 {
        let err = client.detect(&rail_image()).unwrap_err();
        assert!(matches!(err, ClientError::ServerError { status: 500, .. }));
        assert_eq!(err.to_string(), "Server error: 500");
    }
}

#[test]
fn malformed_success_body_is_reported() {
    let server = StubServer::start(vec![CannedResponse::json(
        200,
        r#"{"detections":[{"class_name":"crack"}]}"#,
    )]);
    let err = client_for(&server).detect(&rail_image()).unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)));
}

#[test]
fn refused_connection_is_a_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut cfg = ClientConfig {
        api_url: format!("http://{}", addr),
        timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    };
    cfg.validate().unwrap();
    let err = DetectClient::new(&cfg).detect(&rail_image()).unwrap_err();
    assert!(matches!(err, ClientError::TransportError(_)), "got {err:?}");
}

#[test]
fn slow_service_hits_the_explicit_timeout() {
    let server = StubServer::start(vec![
        CannedResponse::json(200, ONE_CRACK).delayed(Duration::from_secs(3))
    ]);
    let timeout = Duration::from_millis(300);
    let err = client_with_timeout(&server, timeout)
        .detect(&rail_image())
        .unwrap_err();
    match err {
        ClientError::TimeoutError(waited) => assert_eq!(waited, timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn health_and_classes_are_fetched() {
    let server = StubServer::start(vec![
        CannedResponse::json(
            200,
            r#"{"status":"online","message":"Railway Track Inspection API","model":"YOLOv5","classes":7}"#,
        ),
        CannedResponse::json(
            200,
            r#"{"classes":["fishplate","track_crack"],"total":2,
                "high_risk":["track_crack"],"medium_risk":["fishplate"],"low_risk":[]}"#,
        ),
    ]);
    let client = client_for(&server);

    let health = client.health().expect("health");
    assert_eq!(health.status, "online");
    assert_eq!(health.classes, Some(7));

    let catalog = client.classes().expect("classes");
    assert_eq!(catalog.classes, vec!["fishplate", "track_crack"]);
    assert_eq!(catalog.high_risk, vec!["track_crack"]);

    let requests = server.requests();
    assert!(requests[0].request_line.starts_with("GET / "));
    assert!(requests[1].request_line.starts_with("GET /classes "));
}

#[test]
fn batch_uploads_every_file_under_one_field() {
    let server = StubServer::start(vec![CannedResponse::json(
        200,
        r#"{"results":[
            {"filename":"rail.png","result":{"detections":[{"class_name":"crack","severity":"HIGH",
                "confidence":0.873,"x":10,"y":20,"width":100,"height":50}]}},
            {"filename":"sleeper.png","error":"400: File must be an image"}
        ]}"#,
    )]);
    let files = vec![
        rail_image(),
        SelectedFile::from_bytes("sleeper.png", "image/png", png_bytes(16, 16)),
    ];

    let batch = client_for(&server).detect_batch(&files).expect("batch");
    assert_eq!(batch.results.len(), 2);
    let first = batch.results[0].outcome().expect("first result");
    assert_eq!(first.detections[0].class_name, "crack");
    let second = batch.results[1].outcome().unwrap_err();
    assert_eq!(second.to_string(), "400: File must be an image");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert!(request.request_line.starts_with("POST /detect-batch "));
    let body = request.body_text();
    assert!(body.contains("name=\"files\"; filename=\"rail.png\""));
    assert!(body.contains("name=\"files\"; filename=\"sleeper.png\""));
    assert!(body.find("rail.png").unwrap() < body.find("sleeper.png").unwrap());
}

#[test]
fn batch_with_no_files_sends_nothing() {
    let server = StubServer::start(vec![CannedResponse::json(200, r#"{"results":[]}"#)]);
    let batch = client_for(&server).detect_batch(&[]).expect("empty batch");
    assert!(batch.results.is_empty());
    std::thread::sleep(Duration::from_millis(100));
    assert!(server.requests().is_empty());
}

#[test]
fn batch_result_count_must_match_uploads() {
    let server = StubServer::start(vec![CannedResponse::json(
        200,
        r#"{"results":[{"filename":"rail.png","result":{"detections":[]}}]}"#,
    )]);
    let files = vec![rail_image(), rail_image()];
    let err = client_for(&server).detect_batch(&files).unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)), "got {err:?}");
}
