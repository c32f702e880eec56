use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------- Webhook wire types ----------

/// Inbound fulfillment envelope. Only `queryResult.parameters` is read; the
/// agent sends plenty of other keys, which are ignored.
#[derive(Deserialize, Debug, Default)]
pub struct WebhookRequest {
    #[serde(rename = "queryResult", default)]
    pub query_result: QueryResult,
}

#[derive(Deserialize, Debug, Default)]
pub struct QueryResult {
    #[serde(default)]
    pub parameters: Parameters,
}

/// Left untyped; the handler decides what counts as missing.
#[derive(Deserialize, Debug, Default)]
pub struct Parameters {
    pub items: Option<Value>,
    #[serde(rename = "date-time")]
    pub date_time: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    #[serde(rename = "fulfillmentText")]
    pub fulfillment_text: String,
}

impl WebhookResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fulfillment_text: text.into(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Welcome {
    pub message: &'static str,
}

// ---------- Validated domain types ----------

/// Both fields are guaranteed non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub item_name: String,
    pub raw_date: String,
}

/// Model input. Field order is the column order the scaler and predictor
/// were fitted on: month, day, year, item code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    pub month: u32,
    pub day: u32,
    pub year: i32,
    pub item_code: i64,
}

impl FeatureVector {
    pub const LEN: usize = 4;

    pub fn new(date: NaiveDate, item_code: i64) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
            year: date.year(),
            item_code,
        }
    }

    pub fn to_array(&self) -> [f64; Self::LEN] {
        [
            f64::from(self.month),
            f64::from(self.day),
            f64::from(self.year),
            self.item_code as f64,
        ]
    }
}

/// Single predicted price. Displays rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub price: f64,
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.price)
    }
}
