//! End-to-end flow: signed HTTP request through verifier, middleware and
//! handlers, plus the same verifier reused behind the bus adapter.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use hookline::adapters::Disposition;
use hookline::verify::sign;
use hookline::{
    BusAdapter, DispatchError, FunctionAdapter, Headers, HttpAdapter, Router, SignatureVerifier,
    Verifier, VerifyError, WebhookEvent,
};

const SECRET: &str = "whsec_integration";
const BODY: &str = r#"{"id":"evt_1","type":"x.done","data":{"k":1}}"#;

type Log = Arc<Mutex<Vec<String>>>;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn recording_router(log: &Log) -> Router {
    let mut router = Router::new();

    let seen = Arc::clone(log);
    router.use_fn("audit", move |event, next| {
        seen.lock().unwrap().push(format!("mw:{}", event.id()));
        Box::pin(async move { next.run(event).await })
    });

    for name in ["first", "second"] {
        let sink = Arc::clone(log);
        router.on_named("x.done", name, move |event: Arc<WebhookEvent>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock()
                    .unwrap()
                    .push(format!("{name}:{}", event.data()["k"]));
                Ok(())
            }
        });
    }

    router
}

async fn post(app: axum::Router, body: &str, signature: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri("/webhooks");
    if let Some(signature) = signature {
        request = request.header("hookline-signature", signature);
    }

    let response = app
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn http_app(log: &Log) -> axum::Router {
    HttpAdapter::new(SignatureVerifier::new(SECRET), Arc::new(recording_router(log)))
        .into_router("/webhooks")
}

#[tokio::test]
async fn signed_request_is_dispatched_in_order() {
    let log = Log::default();
    let signature = sign(SECRET.as_bytes(), now(), BODY.as_bytes());

    let (status, body) = post(http_app(&log), BODY, Some(signature)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true}));
    assert_eq!(*log.lock().unwrap(), vec!["mw:evt_1", "first:1", "second:1"]);
}

#[tokio::test]
async fn forged_request_never_reaches_router() {
    let log = Log::default();
    let signature = sign(b"attacker", now(), BODY.as_bytes());

    let (status, body) = post(http_app(&log), BODY, Some(signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["error"].as_str().unwrap().is_empty());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_data_field_is_reported() {
    let log = Log::default();
    let body = r#"{"id":"evt_1","type":"x.done"}"#;
    let signature = sign(SECRET.as_bytes(), now(), body.as_bytes());

    let (status, response) = post(http_app(&log), body, Some(signature)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("data"));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn verifier_output_matches_payload() {
    let verifier = SignatureVerifier::new(SECRET);
    let headers: Headers = [("Hookline-Signature", sign(SECRET.as_bytes(), now(), BODY.as_bytes()))]
        .into_iter()
        .collect();

    let result = verifier.verify(BODY.as_bytes(), &headers).await.unwrap();

    assert_eq!(result.event.id(), "evt_1");
    assert_eq!(result.event.event_type(), "x.done");
    assert_eq!(result.event.data(), &json!({"k": 1}));
    assert_eq!(result.raw, Some(serde_json::from_str::<Value>(BODY).unwrap()));
}

#[tokio::test]
async fn unsigned_request_fails_verification() {
    let verifier = SignatureVerifier::new(SECRET);
    let err = verifier
        .verify(BODY.as_bytes(), &Headers::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VerifyError::Verification(_)));
}

#[tokio::test]
async fn failing_handler_keeps_sibling_side_effects() {
    let log = Log::default();
    let mut router = Router::new();
    router.on_named("x.done", "broken", |_event| async { anyhow::bail!("boom") });
    let sink = Arc::clone(&log);
    router.on_named("x.done", "healthy", move |_event| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push("healthy".to_string());
            Ok(())
        }
    });

    let event = WebhookEvent::from_slice(BODY.as_bytes()).unwrap();
    let err = router.dispatch(event).await.unwrap_err();

    assert_eq!(*log.lock().unwrap(), vec!["healthy"]);
    match err {
        DispatchError::Handlers(errors) => assert_eq!(errors.handlers(), vec!["broken"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn same_verifier_works_behind_bus_adapter() {
    let log = Log::default();
    let adapter = BusAdapter::new(SignatureVerifier::new(SECRET), Arc::new(recording_router(&log)));
    let headers: Headers = [("hookline-signature", sign(SECRET.as_bytes(), now(), BODY.as_bytes()))]
        .into_iter()
        .collect();

    assert_eq!(
        adapter.process(BODY.as_bytes(), &headers, false).await,
        Disposition::Ack
    );
    assert_eq!(*log.lock().unwrap(), vec!["mw:evt_1", "first:1", "second:1"]);
}

#[tokio::test]
async fn function_adapter_dispatches_detail() {
    let log = Log::default();
    let adapter = FunctionAdapter::new(Arc::new(recording_router(&log)));
    let payload = format!(r#"{{"id":"envelope","detail-type":"webhook","detail":{BODY}}}"#);

    adapter
        .handle_json(payload.as_bytes(), &Default::default())
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["mw:evt_1", "first:1", "second:1"]);
}
