use super::*;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{ClusterCount, InitMethod},
    protocol::{KmeansRequest, ResetRequest},
};
use tokio::{net::TcpListener, sync::Mutex};

use crate::mapping::{ScreenPoint, SurfaceSize};

const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Clone, Default)]
struct MockEngineState {
    requests: Arc<Mutex<Vec<(EngineIntent, Value)>>>,
    steps_before_convergence: Arc<Mutex<usize>>,
}

impl MockEngineState {
    async fn record(&self, intent: EngineIntent, body: Value) {
        self.requests.lock().await.push((intent, body));
    }
}

fn png_response() -> Response {
    ([(header::CONTENT_TYPE, "image/png")], PNG_STUB.to_vec()).into_response()
}

async fn handle_generate(State(state): State<MockEngineState>) -> Response {
    state.record(EngineIntent::GenerateDataset, Value::Null).await;
    Json(json!({
        "data_points": [[-2.0, -3.0], [2.0, 2.0], [-3.0, 2.0], [2.0, -4.0]],
        "x_min": -4.0,
        "x_max": 4.0,
        "y_min": -5.0,
        "y_max": 3.0,
    }))
    .into_response()
}

async fn handle_step(State(state): State<MockEngineState>, Json(body): Json<Value>) -> Response {
    state.record(EngineIntent::StepKmeans, body).await;
    let mut remaining = state.steps_before_convergence.lock().await;
    if *remaining == 0 {
        return Json(json!({ "converged": true })).into_response();
    }
    *remaining -= 1;
    png_response()
}

async fn handle_run(State(state): State<MockEngineState>, Json(body): Json<Value>) -> Response {
    let missing_centroids = body["initMethod"] == "Manual" && body.get("centroids").is_none();
    state.record(EngineIntent::RunKmeans, body).await;
    if missing_centroids {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "manual initialization requires centroids" })),
        )
            .into_response();
    }
    png_response()
}

async fn handle_reset(State(state): State<MockEngineState>, Json(body): Json<Value>) -> Response {
    state.record(EngineIntent::ResetKmeans, body).await;
    png_response()
}

async fn handle_manual(State(state): State<MockEngineState>, Json(body): Json<Value>) -> Response {
    let count = body["centroids"].as_array().map(Vec::len).unwrap_or(0);
    state.record(EngineIntent::ManualKmeans, body).await;
    Json(json!({ "message": format!("received {count} centroids") })).into_response()
}

async fn spawn_mock_engine(steps_before_convergence: usize) -> anyhow::Result<(String, MockEngineState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockEngineState::default();
    *state.steps_before_convergence.lock().await = steps_before_convergence;
    let app = Router::new()
        .route("/generate-dataset", post(handle_generate))
        .route("/step-kmeans", post(handle_step))
        .route("/run-kmeans", post(handle_run))
        .route("/reset-kmeans", post(handle_reset))
        .route("/manual-kmeans", post(handle_manual))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

fn k(value: u32) -> ClusterCount {
    ClusterCount::new(value).expect("k")
}

#[test]
fn json_replies_are_status_and_everything_else_is_an_image() {
    let converged = classify_response(
        EngineIntent::StepKmeans,
        200,
        Some("application/json"),
        br#"{"converged": true}"#,
    )
    .expect("classify");
    assert!(matches!(
        converged,
        EngineResponse::Status(StatusResponse {
            converged: true,
            error: None,
            ..
        })
    ));

    let image = classify_response(EngineIntent::StepKmeans, 200, Some("image/png"), PNG_STUB)
        .expect("classify");
    let EngineResponse::Image(image) = image else {
        panic!("expected image");
    };
    assert_eq!(image.bytes(), PNG_STUB);
    assert_eq!(image.content_type(), Some("image/png"));

    let untyped = classify_response(EngineIntent::ResetKmeans, 200, None, PNG_STUB)
        .expect("classify");
    assert_eq!(untyped.kind(), "image");
}

#[test]
fn json_detection_ignores_case_and_parameters() {
    let reply = classify_response(
        EngineIntent::ManualKmeans,
        200,
        Some("Application/JSON; charset=utf-8"),
        br#"{"message": "ok"}"#,
    )
    .expect("classify");
    assert_eq!(
        reply,
        EngineResponse::Status(StatusResponse {
            message: Some("ok".to_string()),
            ..StatusResponse::default()
        })
    );
}

#[test]
fn generate_dataset_accepts_structured_and_rendered_replies() {
    let structured = classify_response(
        EngineIntent::GenerateDataset,
        200,
        Some("application/json"),
        br#"{"data_points": [[0.5, 1.5]], "x_min": 0, "x_max": 1, "y_min": 1, "y_max": 2}"#,
    )
    .expect("classify");
    let EngineResponse::Dataset { points, limits } = structured else {
        panic!("expected dataset");
    };
    assert_eq!(points, vec![DataPoint::new(0.5, 1.5)]);
    assert_eq!(limits.y_max(), 2.0);

    let legacy = classify_response(EngineIntent::GenerateDataset, 200, Some("image/png"), PNG_STUB)
        .expect("classify");
    assert_eq!(legacy.kind(), "image");

    let degenerate = classify_response(
        EngineIntent::GenerateDataset,
        200,
        Some("application/json"),
        br#"{"data_points": [], "x_min": 1, "x_max": 1, "y_min": 0, "y_max": 2}"#,
    );
    assert!(matches!(degenerate, Err(EngineError::InvalidDataset(_))));
}

#[test]
fn http_failures_without_json_are_transport_errors() {
    let err = classify_response(
        EngineIntent::RunKmeans,
        500,
        Some("text/html"),
        b"<h1>Internal Server Error</h1>",
    )
    .expect_err("http failure");
    assert!(matches!(
        err,
        EngineError::HttpStatus {
            intent: EngineIntent::RunKmeans,
            status: 500,
            ..
        }
    ));

    let reported = classify_response(
        EngineIntent::RunKmeans,
        400,
        Some("application/json"),
        br#"{"error": "bad k"}"#,
    )
    .expect("classify");
    assert_eq!(
        reported,
        EngineResponse::Status(StatusResponse {
            error: Some("bad k".to_string()),
            ..StatusResponse::default()
        })
    );

    assert!(matches!(
        classify_response(EngineIntent::StepKmeans, 200, Some("image/png"), b""),
        Err(EngineError::EmptyBody { .. })
    ));
    assert!(matches!(
        classify_response(EngineIntent::StepKmeans, 200, Some("application/json"), b"not json"),
        Err(EngineError::Decode { .. })
    ));
}

#[test]
fn endpoint_urls_keep_the_base_path() {
    let client = EngineClient::new("http://localhost:5000").expect("client");
    assert_eq!(
        client.endpoint_url(EngineIntent::StepKmeans).expect("url").as_str(),
        "http://localhost:5000/step-kmeans"
    );

    let prefixed = EngineClient::new("http://engine.local/api/v1").expect("client");
    assert_eq!(
        prefixed
            .endpoint_url(EngineIntent::ManualKmeans)
            .expect("url")
            .as_str(),
        "http://engine.local/api/v1/manual-kmeans"
    );

    assert!(matches!(
        EngineClient::new("not a url"),
        Err(EngineError::InvalidUrl { .. })
    ));
}

#[tokio::test]
async fn client_posts_request_bodies_in_engine_shape() {
    let (engine_url, engine) = spawn_mock_engine(5).await.expect("spawn engine");
    let client = EngineClient::new(&engine_url).expect("client");

    let reply = client
        .send(&EngineRequest::Step(KmeansRequest::new(
            k(4),
            InitMethod::KMeansPlusPlus,
            &[],
        )))
        .await
        .expect("step");
    assert_eq!(reply, EngineResponse::Image(EngineImage::new(PNG_STUB.to_vec(), Some("image/png".to_string()))));

    client
        .send(&EngineRequest::Reset(ResetRequest {
            k: k(4),
            init_method: InitMethod::Farthest,
        }))
        .await
        .expect("reset");

    let requests = engine.requests.lock().await;
    assert_eq!(
        *requests,
        vec![
            (
                EngineIntent::StepKmeans,
                json!({ "k": 4, "initMethod": "KMeans++" })
            ),
            (
                EngineIntent::ResetKmeans,
                json!({ "k": 4, "initMethod": "Farthest" })
            ),
        ]
    );
}

#[tokio::test]
async fn engine_reported_errors_arrive_as_status() {
    let (engine_url, _engine) = spawn_mock_engine(0).await.expect("spawn engine");
    let client = EngineClient::new(&engine_url).expect("client");

    let request = EngineRequest::Run(KmeansRequest {
        k: k(2),
        init_method: InitMethod::Manual,
        centroids: None,
    });
    let reply = client.send(&request).await.expect("run");
    assert_eq!(
        reply,
        EngineResponse::Status(StatusResponse {
            error: Some("manual initialization requires centroids".to_string()),
            ..StatusResponse::default()
        })
    );
}

#[tokio::test]
async fn driven_session_steps_to_convergence() {
    let (engine_url, engine) = spawn_mock_engine(2).await.expect("spawn engine");
    let client = EngineClient::new(&engine_url).expect("client");
    let mut controller =
        SessionController::with_parameters(SurfaceSize::new(400.0, 400.0), k(2), InitMethod::Random);

    let effects = controller.generate_dataset();
    let report = drive(&mut controller, &client, effects).await;
    assert!(report.notices.is_empty());
    assert_eq!(controller.phase(), SessionPhase::Ready);
    assert_eq!(controller.state().dataset().map(|d| d.points().len()), Some(4));

    let mut steps = 0;
    while controller.phase() != SessionPhase::Converged {
        let effects = controller.step();
        let report = drive(&mut controller, &client, effects).await;
        assert!(!report.has_errors(), "unexpected errors: {:?}", report.notices);
        steps += 1;
        assert!(steps <= 3, "engine should converge on the third step");
    }
    assert_eq!(steps, 3);
    assert!(controller.state().converged());

    let effects = controller.step();
    let report = drive(&mut controller, &client, effects).await;
    assert!(report.requests.is_empty());
    assert_eq!(report.notices, vec![Notice::AlreadyConverged]);

    let requests = engine.requests.lock().await;
    assert_eq!(requests.len(), 4);
    assert!(requests
        .iter()
        .filter(|(intent, _)| *intent == EngineIntent::StepKmeans)
        .all(|(_, body)| body.get("centroids").is_none()));
}

#[tokio::test]
async fn driven_manual_session_sends_collected_centroids() {
    let (engine_url, engine) = spawn_mock_engine(1).await.expect("spawn engine");
    let client = EngineClient::new(&engine_url).expect("client");
    let mut controller =
        SessionController::with_parameters(SurfaceSize::new(400.0, 400.0), k(2), InitMethod::Manual);

    let effects = controller.generate_dataset();
    drive(&mut controller, &client, effects).await;
    assert_eq!(controller.phase(), SessionPhase::CollectingCentroids);

    let effects = controller.place_centroid(ScreenPoint::new(0.0, 0.0));
    assert!(drive(&mut controller, &client, effects).await.requests.is_empty());

    let effects = controller.place_centroid(ScreenPoint::new(400.0, 400.0));
    let report = drive(&mut controller, &client, effects).await;
    assert_eq!(report.requests, vec![EngineIntent::ManualKmeans]);
    assert_eq!(
        report.notices,
        vec![Notice::Acknowledged("received 2 centroids".to_string())]
    );
    assert_eq!(controller.phase(), SessionPhase::Stepping);

    let effects = controller.converge();
    drive(&mut controller, &client, effects).await;
    assert_eq!(controller.phase(), SessionPhase::Converged);

    let requests = engine.requests.lock().await;
    let (_, manual_body) = &requests[1];
    assert_eq!(
        *manual_body,
        json!({
            "centroids": [{ "x": -4.0, "y": 3.0 }, { "x": 4.0, "y": -5.0 }],
            "k": 2,
        })
    );
    let (intent, run_body) = &requests[2];
    assert_eq!(*intent, EngineIntent::RunKmeans);
    assert_eq!(run_body["initMethod"], "Manual");
    assert_eq!(run_body["centroids"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn unreachable_engine_is_a_recoverable_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = EngineClient::new(&format!("http://{addr}")).expect("client");
    let mut controller = SessionController::new(SurfaceSize::new(100.0, 100.0));

    let effects = controller.generate_dataset();
    let report = drive(&mut controller, &client, effects).await;
    assert!(report.has_errors());
    assert!(matches!(
        report.notices.as_slice(),
        [Notice::TransportFailure {
            intent: EngineIntent::GenerateDataset,
            ..
        }]
    ));
    assert_eq!(controller.phase(), SessionPhase::Idle);
    assert!(controller.state().in_flight().is_none());
}
