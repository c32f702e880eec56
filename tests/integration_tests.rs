/// End-to-end tests for the prediction webhook router
///
/// Run with: cargo test --test integration_tests -- --nocapture

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::{fs, sync::Mutex};
use tower::ServiceExt;

use munshi_predictor::{
    items::ItemCodeTable,
    model::{LinearModel, ModelArtifacts, ModelError, Predictor, Scaler, StandardScaler},
    router, AppState,
};

// mean [6, 15, 2020, 10], scale [2, 5, 1, 1]; Rice on 2023-05-10 scales to
// [-0.5, -1, 3, 3] and predicts 250 - 1 - 4 + 30 + 3 = 278.
const SCALER_JSON: &str = r#"{"mean_": [6.0, 15.0, 2020.0, 10.0], "scale_": [2.0, 5.0, 1.0, 1.0]}"#;
const MODEL_JSON: &str = r#"{"coef_": [2.0, 4.0, 10.0, 1.0], "intercept_": 250.0}"#;

fn app_from_files() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let scaler = dir.path().join("scaler.json");
    let model = dir.path().join("model.json");
    fs::write(&scaler, SCALER_JSON).unwrap();
    fs::write(&model, MODEL_JSON).unwrap();

    let models = ModelArtifacts::load(&model, &scaler).expect("artifacts load");
    (router(AppState::new(ItemCodeTable::new(), models)), dir)
}

fn app_with(scaler: impl Scaler + 'static, predictor: impl Predictor + 'static) -> Router {
    let models = ModelArtifacts::new(Box::new(scaler), Box::new(predictor));
    router(AppState::new(ItemCodeTable::new(), models))
}

fn identity_scaler() -> StandardScaler {
    StandardScaler::new(vec![0.0; 4], vec![1.0; 4]).unwrap()
}

async fn post_predict(app: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn payload(items: &str, date: &str) -> String {
    json!({"queryResult": {"parameters": {"items": items, "date-time": date}}}).to_string()
}

fn text(v: &Value) -> &str {
    v["fulfillmentText"].as_str().expect("fulfillmentText")
}

#[tokio::test]
async fn test_index_welcome() {
    let (app, _dir) = app_from_files();
    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v, json!({"message": "Welcome to the prediction API"}));
}

#[tokio::test]
async fn test_rice_end_to_end() {
    let (app, _dir) = app_from_files();
    let (status, v) = post_predict(app, payload("Rice", "2023-05-10")).await;

    println!("✓ response: {}", v);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "The predicted price of Rice on 10/05/2023 is PKR 278.0."
    );
}

#[tokio::test]
async fn test_agent_timestamp_date() {
    let (app, _dir) = app_from_files();
    let (status, v) = post_predict(app, payload("rice", "2023-05-10T12:00:00+05:00")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "The predicted price of rice on 10/05/2023 is PKR 278.0."
    );
}

struct Recording(Mutex<Vec<Vec<f64>>>);

impl Predictor for &'static Recording {
    fn predict(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.0.lock().unwrap().push(x.to_vec());
        Ok(vec![123.456])
    }
    fn name(&self) -> &str {
        "recording"
    }
}

#[tokio::test]
async fn test_feature_order_month_day_year_code() {
    let rec: &'static Recording = Box::leak(Box::new(Recording(Mutex::new(Vec::new()))));
    let app = app_with(identity_scaler(), rec);

    let (_, v) = post_predict(app, payload("Wheat Flour", "2024-12-03")).await;
    assert_eq!(
        text(&v),
        "The predicted price of Wheat Flour on 03/12/2024 is PKR 123.5."
    );
    let seen = rec.0.lock().unwrap();
    assert_eq!(seen.as_slice(), &[vec![12.0, 3.0, 2024.0, 19.0]]);
}

#[tokio::test]
async fn test_missing_parameters() {
    let (app, _dir) = app_from_files();
    let body = json!({"queryResult": {"parameters": {"items": "rice"}}}).to_string();
    let (status, v) = post_predict(app, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "Invalid request: Missing 'items' or 'date-time' parameters."
    );
}

#[tokio::test]
async fn test_unsupported_item() {
    let (app, _dir) = app_from_files();
    let (status, v) = post_predict(app, payload("caviar", "2023-05-10")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&v).starts_with("Sorry, we do not have data for 'caviar'."));
}

#[tokio::test]
async fn test_malformed_date() {
    let (app, _dir) = app_from_files();
    let (status, v) = post_predict(app, payload("rice", "13/45/2023")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "Invalid date format. Please provide the date in ISO format (YYYY-MM-DD)."
    );
}

#[tokio::test]
async fn test_non_json_bodies_still_200() {
    for body in ["", "not json at all", "null", "{}", "[]", "0", "false", "\"\""] {
        let (app, _dir) = app_from_files();
        let (status, v) = post_predict(app, body.to_string()).await;
        assert_eq!(status, StatusCode::OK, "body {:?}", body);
        assert_eq!(text(&v), "Invalid request: No JSON data provided.");
    }
}

#[tokio::test]
async fn test_wrong_content_type_still_200() {
    let (app, _dir) = app_from_files();
    let req = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(payload("eggs", "2023-01-02")))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let v: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(text(&v).starts_with("The predicted price of eggs on 02/01/2023 is PKR "));
}

#[tokio::test]
async fn test_oversized_body_still_200() {
    let (app, _dir) = app_from_files();
    let padding = "x".repeat(3 * 1024 * 1024);
    let body = json!({
        "queryResult": {"parameters": {"items": "Rice", "date-time": "2023-05-10"}},
        "originalDetectIntentRequest": {"payload": {"padding": padding}}
    })
    .to_string();

    let (status, v) = post_predict(app, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "The predicted price of Rice on 10/05/2023 is PKR 278.0."
    );
    println!("✓ 3 MB payload accepted");
}

#[tokio::test]
async fn test_iso_time_variants() {
    for date in ["2023-05-10T12:00", "2023-05-10 12:00:00", "2023-05-10T12:00+05:00"] {
        let (app, _dir) = app_from_files();
        let (status, v) = post_predict(app, payload("Rice", date)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            text(&v),
            "The predicted price of Rice on 10/05/2023 is PKR 278.0.",
            "{}",
            date
        );
    }
}

#[tokio::test]
async fn test_falsy_item_is_missing_parameter() {
    let (app, _dir) = app_from_files();
    let body = json!({"queryResult": {"parameters": {"items": 0, "date-time": "2023-05-10"}}});
    let (status, v) = post_predict(app, body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "Invalid request: Missing 'items' or 'date-time' parameters."
    );
}

struct FailingScaler;

impl Scaler for FailingScaler {
    fn transform(&self, x: &[f64]) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::FeatureLength {
            got: x.len(),
            expected: 5,
        })
    }
}

#[tokio::test]
async fn test_scaler_fault_is_converted() {
    let model = LinearModel::new(vec![1.0; 4], 0.0).unwrap();
    let app = app_with(FailingScaler, model);
    let (status, v) = post_predict(app, payload("milk", "2023-05-10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text(&v),
        "An error occurred while processing your request: feature length mismatch: got 4, expected 5"
    );
}

struct EmptyPredictor;

impl Predictor for EmptyPredictor {
    fn predict(&self, _x: &[f64]) -> Result<Vec<f64>, ModelError> {
        Ok(vec![])
    }
    fn name(&self) -> &str {
        "empty"
    }
}

#[tokio::test]
async fn test_predictor_fault_is_converted() {
    let app = app_with(identity_scaler(), EmptyPredictor);
    let (status, v) = post_predict(app, payload("tea", "2023-05-10")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&v).starts_with("An error occurred while processing your request:"));
}

#[tokio::test]
async fn test_every_item_any_casing() {
    let (app, _dir) = app_from_files();
    for (name, _) in ItemCodeTable::new().iter() {
        let upper = name.to_uppercase();
        let (status, v) = post_predict(app.clone(), payload(&upper, "2023-05-10")).await;
        assert_eq!(status, StatusCode::OK);
        let expected = format!("The predicted price of {} on 10/05/2023 is PKR ", upper);
        assert!(text(&v).starts_with(&expected), "{}", text(&v));
        assert!(text(&v).ends_with('.'));
    }
    println!("✓ all items resolved");
}
