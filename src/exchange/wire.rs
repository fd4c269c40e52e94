// Upstream JSON shapes and their conversion into domain models

use crate::error::{OrchestratorError, Result};
use crate::models::{Candle, OrderAck, OrderStatus, OrderUpdate, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const CANDLES_CHANNEL: &str = "candles";
pub const USER_CHANNEL: &str = "user";

/// Numbers arrive either as JSON numbers or as decimal strings
fn flexible_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) if text.trim().is_empty() => Ok(0.0),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Unix-seconds string, falling back to RFC 3339
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = raw.trim().parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| OrchestratorError::Protocol(format!("timestamp out of range: {raw}")));
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| OrchestratorError::Protocol(format!("bad timestamp: {raw}")))
}

// ============== Subscriptions ==============

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    product_ids: &'a [String],
    channel: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt: Option<&'a str>,
}

fn subscribe_kind(unsubscribe: bool) -> &'static str {
    if unsubscribe {
        "unsubscribe"
    } else {
        "subscribe"
    }
}

pub fn market_subscription(symbols: &[String], unsubscribe: bool) -> Result<String> {
    Ok(serde_json::to_string(&SubscribeFrame {
        kind: subscribe_kind(unsubscribe),
        product_ids: symbols,
        channel: CANDLES_CHANNEL,
        jwt: None,
    })?)
}

pub fn user_subscription(symbols: &[String], token: &str, unsubscribe: bool) -> Result<String> {
    Ok(serde_json::to_string(&SubscribeFrame {
        kind: subscribe_kind(unsubscribe),
        product_ids: symbols,
        channel: USER_CHANNEL,
        jwt: Some(token),
    })?)
}

// ============== Inbound frames ==============

#[derive(Debug, Deserialize)]
struct ChannelPeek {
    #[serde(default)]
    channel: String,
}

#[derive(Debug, Deserialize)]
struct CandleMessage {
    #[serde(default)]
    events: Vec<CandleEvent>,
}

#[derive(Debug, Deserialize)]
struct CandleEvent {
    #[serde(default)]
    candles: Vec<WireCandle>,
}

#[derive(Debug, Deserialize)]
pub struct WireCandle {
    pub start: String,
    #[serde(deserialize_with = "flexible_f64")]
    pub open: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub high: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub low: f64,
    #[serde(deserialize_with = "flexible_f64")]
    pub close: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub volume: f64,
    #[serde(default)]
    pub product_id: String,
}

impl WireCandle {
    pub fn into_candle(self, symbol: &str) -> Result<Candle> {
        let symbol = if self.product_id.is_empty() {
            symbol.to_string()
        } else {
            self.product_id
        };
        Ok(Candle {
            symbol,
            start: parse_timestamp(&self.start)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserMessage {
    #[serde(default)]
    events: Vec<UserEvent>,
}

#[derive(Debug, Deserialize)]
struct UserEvent {
    #[serde(default)]
    orders: Vec<WireOrder>,
}

#[derive(Debug, Deserialize)]
pub struct WireOrder {
    pub order_id: String,
    pub product_id: String,
    #[serde(alias = "side")]
    pub order_side: String,
    pub status: String,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub cumulative_quantity: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub filled_value: f64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub leaves_quantity: f64,
    #[serde(default, deserialize_with = "flexible_f64", alias = "average_filled_price")]
    pub avg_price: f64,
    #[serde(default, alias = "created_time")]
    pub creation_time: Option<String>,
}

impl WireOrder {
    pub fn into_update(self) -> Result<OrderUpdate> {
        let time = match self.creation_time.as_deref() {
            Some(raw) if !raw.is_empty() => parse_timestamp(raw)?,
            _ => Utc::now(),
        };
        Ok(OrderUpdate {
            side: self.order_side.parse::<Side>()?,
            status: OrderStatus::from(self.status.as_str()),
            symbol: self.product_id,
            order_id: self.order_id,
            filled_qty: self.cumulative_quantity,
            filled_value: self.filled_value,
            leaves: self.leaves_quantity,
            price: self.avg_price,
            time,
        })
    }
}

/// Decoded upstream frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Candles(Vec<Candle>),
    Orders(Vec<OrderUpdate>),
    /// Heartbeats, subscription acks and anything else without a payload for us
    Ignored(String),
}

/// Dispatch on the envelope's `channel` field
///
/// Entries that fail to convert are logged and dropped; the rest of the frame
/// is still delivered.
pub fn decode(text: &str) -> Result<Inbound> {
    let peek: ChannelPeek = serde_json::from_str(text)?;
    match peek.channel.as_str() {
        CANDLES_CHANNEL => {
            let message: CandleMessage = serde_json::from_str(text)?;
            let candles = message
                .events
                .into_iter()
                .flat_map(|event| event.candles)
                .filter_map(|candle| match candle.into_candle("") {
                    Ok(candle) => Some(candle),
                    Err(e) => {
                        tracing::warn!(error = %e, "⚠️ skipping malformed candle");
                        None
                    }
                })
                .collect();
            Ok(Inbound::Candles(candles))
        }
        USER_CHANNEL => {
            let message: UserMessage = serde_json::from_str(text)?;
            let orders = message
                .events
                .into_iter()
                .flat_map(|event| event.orders)
                .filter_map(|order| {
                    let order_id = order.order_id.clone();
                    match order.into_update() {
                        Ok(update) => Some(update),
                        Err(e) => {
                            tracing::warn!(order_id = %order_id, error = %e, "⚠️ skipping malformed order update");
                            None
                        }
                    }
                })
                .collect();
            Ok(Inbound::Orders(orders))
        }
        other => Ok(Inbound::Ignored(other.to_string())),
    }
}

// ============== REST bodies ==============

#[derive(Debug, Deserialize)]
pub struct CandlesResponse {
    #[serde(default)]
    pub candles: Vec<WireCandle>,
}

#[derive(Debug, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub uuid: String,
    pub currency: String,
    pub available_balance: Balance,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct AccountsResponse {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub cursor: String,
}

#[derive(Debug, Deserialize)]
pub struct OrdersResponse {
    #[serde(default)]
    pub orders: Vec<WireOrder>,
}

#[derive(Debug, Serialize)]
pub struct MarketIoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderConfiguration {
    pub market_market_ioc: MarketIoc,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub client_order_id: String,
    pub product_id: String,
    pub side: &'static str,
    pub order_configuration: OrderConfiguration,
}

impl CreateOrderRequest {
    /// Market IOC sized in quote currency (USD)
    pub fn by_quote(symbol: &str, usd: f64, side: Side) -> Self {
        Self::market(symbol, side, Some(format!("{usd:.6}")), None)
    }

    /// Market IOC sized in base tokens
    pub fn by_base(symbol: &str, tokens: f64, side: Side) -> Self {
        Self::market(symbol, side, None, Some(format!("{tokens:.8}")))
    }

    fn market(symbol: &str, side: Side, quote_size: Option<String>, base_size: Option<String>) -> Self {
        Self {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            product_id: symbol.to_string(),
            side: side.as_str(),
            order_configuration: OrderConfiguration {
                market_market_ioc: MarketIoc {
                    quote_size,
                    base_size,
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderIdBody {
    #[serde(default)]
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    success_response: Option<OrderIdBody>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_response: Option<ErrorBody>,
}

impl From<OrderResponse> for OrderAck {
    fn from(response: OrderResponse) -> Self {
        let order_id = match response.success_response {
            Some(body) if response.order_id.is_empty() => body.order_id,
            _ => response.order_id,
        };
        let error = response.error_message.filter(|m| !m.is_empty()).or_else(|| {
            response.error_response.map(|body| {
                if body.message.is_empty() {
                    body.error
                } else {
                    body.message
                }
            })
        });
        OrderAck {
            order_id,
            success: response.success,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EditOrderRequest<'a> {
    pub order_id: &'a str,
    pub price: String,
    pub size: String,
}

#[derive(Debug, Serialize)]
pub struct CancelOrdersRequest<'a> {
    pub order_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct CancelResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub failure_reason: String,
    #[serde(default)]
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrdersResponse {
    #[serde(default)]
    pub results: Vec<CancelResult>,
}
