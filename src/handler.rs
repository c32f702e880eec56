use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::items::ItemCodeTable;
use crate::model::{ModelArtifacts, ModelError};
use crate::types::{
    FeatureVector, PredictionRequest, WebhookRequest, WebhookResponse, Welcome,
};
use crate::AppState;

/// Every way a `/predict` call can fall short of a price. Each kind maps to
/// its own fulfillment text; none of them change the HTTP status.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("no JSON data provided")]
    NoJson,
    #[error("malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("missing 'items' or 'date-time' parameters")]
    MissingParameters,
    #[error("no data for item '{0}'")]
    UnknownItem(String),
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PredictError {
    pub fn fulfillment_text(&self) -> String {
        match self {
            Self::NoJson => "Invalid request: No JSON data provided.".to_string(),
            Self::Malformed(_) => "An error occurred: Missing data fields.".to_string(),
            Self::MissingParameters => {
                "Invalid request: Missing 'items' or 'date-time' parameters.".to_string()
            }
            Self::UnknownItem(item) => {
                format!("Sorry, we do not have data for '{item}'. Please try another item.")
            }
            Self::InvalidDate(_) => {
                "Invalid date format. Please provide the date in ISO format (YYYY-MM-DD)."
                    .to_string()
            }
            Self::Model(e) => format!("An error occurred while processing your request: {e}"),
        }
    }
}

// ---------- Parsing ----------

/// Falsy JSON: `null`, `false`, `0`, `""`, `[]` and `{}`.
fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
    }
}

/// Blank values are missing; anything else must be a JSON string.
fn text_param(v: Option<Value>) -> Result<Option<String>, PredictError> {
    match v {
        Some(v) if !is_blank(&v) => String::deserialize(v)
            .map(Some)
            .map_err(PredictError::Malformed),
        _ => Ok(None),
    }
}

/// Raw body -> validated request. Unreadable bodies, non-JSON and blank JSON
/// values all count as "no data".
pub fn parse_payload(body: &[u8]) -> Result<PredictionRequest, PredictError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| PredictError::NoJson)?;
    if is_blank(&value) {
        return Err(PredictError::NoJson);
    }

    let req: WebhookRequest = serde_json::from_value(value).map_err(PredictError::Malformed)?;
    let params = req.query_result.parameters;
    match (text_param(params.items)?, text_param(params.date_time)?) {
        (Some(item_name), Some(raw_date)) => Ok(PredictionRequest {
            item_name,
            raw_date,
        }),
        _ => Err(PredictError::MissingParameters),
    }
}

fn digits(s: &str, max: u32) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|v| *v <= max)
}

/// `HH[:MM[:SS[.ffffff]]]`
fn is_iso_time(s: &str) -> bool {
    let (hms, frac) = match s.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (s, None),
    };
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() > 3 {
        return false;
    }
    if let Some(frac) = frac {
        if parts.len() != 3 || frac.is_empty() || !frac.bytes().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    parts
        .iter()
        .zip([23, 59, 59])
        .all(|(p, max)| p.len() == 2 && digits(p, max).is_some())
}

/// Time of day with an optional `Z` or `+HH:MM` / `-HH:MM` offset.
fn is_iso_time_with_offset(s: &str) -> bool {
    let (time, offset) = match s.find(['Z', '+', '-']) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let offset_ok = offset.is_empty()
        || offset == "Z"
        || offset
            .strip_prefix('+')
            .or_else(|| offset.strip_prefix('-'))
            .is_some_and(is_iso_time);
    is_iso_time(time) && offset_ok
}

/// Strict ISO-8601 calendar date `YYYY-MM-DD`, optionally followed by `T` or a
/// space and a time of day. The date is taken as written; offsets are not
/// normalised to UTC.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let b = raw.as_bytes();
    if b.len() < 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    let year = digits(raw.get(0..4)?, 9999)?;
    let month = digits(raw.get(5..7)?, 12)?;
    let day = digits(raw.get(8..10)?, 31)?;
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;

    let rest = &raw[10..];
    if rest.is_empty() {
        return Some(date);
    }
    rest.strip_prefix(|c: char| c == 'T' || c == ' ')
        .filter(|time| is_iso_time_with_offset(time))
        .map(|_| date)
}

// ---------- Prediction ----------

pub fn predict_text(
    items: &ItemCodeTable,
    models: &ModelArtifacts,
    req: &PredictionRequest,
) -> Result<String, PredictError> {
    let item_code = items
        .lookup(&req.item_name)
        .ok_or_else(|| PredictError::UnknownItem(req.item_name.clone()))?;
    let date =
        parse_date(&req.raw_date).ok_or_else(|| PredictError::InvalidDate(req.raw_date.clone()))?;

    let features = FeatureVector::new(date, item_code);
    let result = models.predict(&features)?;
    tracing::debug!(?features, price = result.price, "prediction");

    Ok(format!(
        "The predicted price of {} on {} is PKR {}.",
        req.item_name,
        date.format("%d/%m/%Y"),
        result
    ))
}

/// Full request cycle. Never fails; errors are logged and turned into text.
pub fn handle_predict(state: &AppState, body: &[u8]) -> WebhookResponse {
    let outcome =
        parse_payload(body).and_then(|req| predict_text(&state.items, &state.models, &req));

    match outcome {
        Ok(text) => {
            tracing::info!("{}", text);
            WebhookResponse::new(text)
        }
        Err(e) => {
            match &e {
                PredictError::Model(_) | PredictError::Malformed(_) => {
                    tracing::error!(error = %e, "prediction failed")
                }
                _ => tracing::warn!(reason = %e, "prediction request rejected"),
            }
            WebhookResponse::new(e.fulfillment_text())
        }
    }
}

// ---------- Routes ----------

pub async fn index() -> Json<Welcome> {
    Json(Welcome {
        message: "Welcome to the prediction API",
    })
}

// Body is taken as raw bytes so bad JSON, content types or unreadable bodies
// still get a 200.
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<WebhookResponse> {
    let body = body.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to read request body");
        Bytes::new()
    });
    Json(handle_predict(&state, &body))
}
