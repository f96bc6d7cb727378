//! Inbound submission payloads and the outbound receipt.
//!
//! The client submits one JSON document per order action. Its `status` field
//! selects the workflow, so the whole payload is modeled as a tagged enum over
//! a shared [`OrderDraft`]: a status string outside NEW/UPDATED/KOT fails at
//! parse time, before any write can happen. Field names follow the POS
//! client's camelCase with snake_case aliases for older producers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::OrderError;

/// Order type carried in the payload's `option` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OrderType {
    Delivery = 1,
    DineIn = 2,
    TakeAway = 3,
}

impl TryFrom<u8> for OrderType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderType::Delivery),
            2 => Ok(OrderType::DineIn),
            3 => Ok(OrderType::TakeAway),
            other => Err(format!("unknown order type {other}, expected 1, 2 or 3")),
        }
    }
}

impl From<OrderType> for u8 {
    fn from(value: OrderType) -> u8 {
        value as u8
    }
}

impl OrderType {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderType::Delivery => "Delivery",
            OrderType::DineIn => "Dine-In",
            OrderType::TakeAway => "Take Away",
        }
    }
}

/// One submitted line item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedItem {
    #[serde(alias = "item_code")]
    pub item_code: i64,
    #[serde(alias = "sl_no")]
    pub sl_no: i64,
    #[serde(default)]
    pub qty: f64,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub vat: f64,
    #[serde(default, alias = "vat_amt")]
    pub vat_amt: f64,
    #[serde(default, alias = "tax_ledger")]
    pub tax_ledger: i64,
    #[serde(default, alias = "item_name")]
    pub item_name: String,
    /// Localized name snapshot printed on kitchen tickets.
    #[serde(default)]
    pub arabic: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Fields shared by all three workflows.
///
/// `order_no` is the client-tracked candidate id: NEW re-derives its own,
/// UPDATED and KOT address an existing header with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(default, deserialize_with = "de_i64_lenient", alias = "order_no")]
    pub order_no: i64,
    pub date: String,
    pub time: String,
    pub option: OrderType,
    #[serde(default, alias = "cust_id")]
    pub cust_id: i64,
    #[serde(default, alias = "cust_name")]
    pub cust_name: String,
    #[serde(default, alias = "flat_no")]
    pub flat_no: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default, alias = "delivery_boy_id")]
    pub delivery_boy_id: i64,
    #[serde(default, alias = "table_id")]
    pub table_id: i64,
    #[serde(default, alias = "table_no")]
    pub table_no: String,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub items: Vec<SubmittedItem>,
    /// Draft order to purge from the hold area once this submission commits.
    #[serde(default, alias = "holded_order")]
    pub holded_order: Option<i64>,
    #[serde(default, alias = "selected_seats")]
    pub selected_seats: Vec<i64>,
}

impl OrderDraft {
    /// Seat id stored on the order header: the first usable selected seat.
    pub fn first_selected_seat(&self) -> Option<i64> {
        self.selected_seats.iter().copied().find(|s| *s > 0)
    }
}

/// A complete submission, tagged by workflow status.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status")]
pub enum OrderSubmission {
    #[serde(rename = "NEW")]
    New(OrderDraft),
    #[serde(rename = "UPDATED")]
    Updated(OrderDraft),
    #[serde(rename = "KOT")]
    Kot(OrderDraft),
}

impl OrderSubmission {
    pub fn draft(&self) -> &OrderDraft {
        match self {
            OrderSubmission::New(d) | OrderSubmission::Updated(d) | OrderSubmission::Kot(d) => d,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            OrderSubmission::New(_) => "NEW",
            OrderSubmission::Updated(_) => "UPDATED",
            OrderSubmission::Kot(_) => "KOT",
        }
    }
}

/// Parse a raw JSON payload into a typed submission.
///
/// Unknown status tags, out-of-range order types, and malformed fields all
/// surface as client-fault [`OrderError::InvalidPayload`].
pub fn parse_submission(payload: &Value) -> Result<OrderSubmission, OrderError> {
    serde_json::from_value(payload.clone()).map_err(|e| OrderError::InvalidPayload(e.to_string()))
}

/// Accept the two shapes POS clients send for numeric ids: a number or a
/// numeric string.
fn de_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match &v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("not a numeric string: {s:?}"))),
        other => Err(serde::de::Error::custom(format!(
            "expected number or string, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Outbound receipt
// ---------------------------------------------------------------------------

/// Result descriptor returned to the caller after a committed submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_no: i64,
    pub cust_id: i64,
    pub status: String,
    pub message: String,
    pub details: ReceiptDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDetails {
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_seats: Option<Vec<i64>>,
    pub items_count: usize,
    pub total: f64,
}

// ===========================================================================
// Tests
// ===========================================================================
