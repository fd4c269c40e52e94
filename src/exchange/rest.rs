use super::auth::TokenSource;
use super::wire::{
    AccountsResponse, CancelOrdersRequest, CancelOrdersResponse, CandlesResponse,
    CreateOrderRequest, EditOrderRequest, OrderResponse, OrdersResponse,
};
use crate::error::{OrchestratorError, Result};
use crate::models::{Candle, CandleSize, OrderAck, OrderUpdate, Side};
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_REST_URL: &str = "https://api.coinbase.com";
const API_PREFIX: &str = "/api/v3/brokerage";
const MAX_RETRIES: u32 = 3;
/// Buckets requested when seeding a series
const HISTORY_BUCKETS: i32 = 100;

type RestRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Brokerage REST client with rate limiting and retry on 429/5xx
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    rate_limiter: Arc<RestRateLimiter>,
    retry_base: Duration,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        requests_per_second: u32,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            retry_base: Duration::from_secs(1),
        })
    }

    /// Scale of the `2^attempt` retry delay
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    /// Make a rate-limited request with retry logic
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        authenticated: bool,
    ) -> Result<Response> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let token = if authenticated {
            Some(self.tokens.bearer_token().await?)
        } else {
            None
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limiter.until_ready().await;

            let mut request = self.client.request(method.clone(), &url).query(query);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let backoff = self.retry_base * 2u32.pow(attempt);
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < MAX_RETRIES {
                        tracing::warn!(
                            "{} {} returned {}, retrying in {:?} (attempt {}/{})",
                            method,
                            path,
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(OrchestratorError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error on {} {}: {}, retrying in {:?} (attempt {}/{})",
                        method,
                        path,
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get(&self, path: &str, query: &[(&str, String)], authenticated: bool) -> Result<Response> {
        self.execute::<()>(Method::GET, path, query, None, authenticated)
            .await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        self.execute(Method::POST, path, &[], Some(body), true).await
    }

    /// Last 100 buckets of `size`, oldest first
    pub async fn historical_candles(&self, symbol: &str, size: CandleSize) -> Result<Vec<Candle>> {
        let end = Utc::now();
        let start = end - size.duration() * HISTORY_BUCKETS;
        let query = [
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("granularity", size.granularity().to_string()),
        ];

        let path = format!("/market/products/{symbol}/candles");
        let response: CandlesResponse = self.get(&path, &query, false).await?.json().await?;

        let mut candles = response
            .candles
            .into_iter()
            .map(|candle| candle.into_candle(symbol))
            .collect::<Result<Vec<_>>>()?;
        candles.sort_by_key(|candle| candle.start);

        tracing::debug!(symbol, size = %size, count = candles.len(), "fetched historical candles");
        Ok(candles)
    }

    pub async fn list_accounts(&self) -> Result<AccountsResponse> {
        Ok(self.get("/accounts", &[], true).await?.json().await?)
    }

    /// Available balance per currency of every active, ready account
    pub async fn token_balances(&self) -> Result<HashMap<String, f64>> {
        let response = self.list_accounts().await?;

        let balances = response
            .accounts
            .into_iter()
            .filter(|account| account.active && account.ready)
            .map(|account| {
                let value = account.available_balance.value.parse::<f64>().unwrap_or_else(|_| {
                    tracing::warn!(
                        currency = %account.currency,
                        raw = %account.available_balance.value,
                        "unparseable balance, treating as 0"
                    );
                    0.0
                });
                (account.currency, value)
            })
            .collect();

        Ok(balances)
    }

    pub async fn list_orders(&self, symbol: &str, limit: usize) -> Result<Vec<OrderUpdate>> {
        let query = [
            ("product_id", symbol.to_string()),
            ("limit", limit.to_string()),
        ];
        let response: OrdersResponse = self
            .get("/orders/historical/batch", &query, true)
            .await?
            .json()
            .await?;

        response
            .orders
            .into_iter()
            .map(|order| order.into_update())
            .collect()
    }

    /// Market order sized in USD
    pub async fn create_order(&self, symbol: &str, usd: f64, side: Side) -> Result<OrderAck> {
        let request = CreateOrderRequest::by_quote(symbol, usd, side);
        self.submit(&request).await
    }

    /// Market sell sized in base tokens
    pub async fn sell_tokens(&self, symbol: &str, tokens: f64) -> Result<OrderAck> {
        let request = CreateOrderRequest::by_base(symbol, tokens, Side::Sell);
        self.submit(&request).await
    }

    async fn submit(&self, request: &CreateOrderRequest) -> Result<OrderAck> {
        let response: OrderResponse = self.post("/orders", request).await?.json().await?;
        let ack = OrderAck::from(response);

        tracing::info!(
            symbol = %request.product_id,
            side = request.side,
            order_id = %ack.order_id,
            success = ack.success,
            "order submitted"
        );
        Ok(ack)
    }

    pub async fn edit_order(&self, order_id: &str, price: f64, size: f64) -> Result<OrderAck> {
        let request = EditOrderRequest {
            order_id,
            price: price.to_string(),
            size: size.to_string(),
        };
        let response: OrderResponse = self.post("/orders/edit", &request).await?.json().await?;
        let mut ack = OrderAck::from(response);
        if ack.order_id.is_empty() {
            ack.order_id = order_id.to_string();
        }
        Ok(ack)
    }

    pub async fn cancel_orders(&self, order_ids: &[String]) -> Result<()> {
        let request = CancelOrdersRequest { order_ids };
        let response: CancelOrdersResponse = self
            .post("/orders/batch_cancel", &request)
            .await?
            .json()
            .await?;

        match response.results.iter().find(|result| !result.success) {
            Some(failed) => Err(OrchestratorError::OrderRejected(format!(
                "cancel {} failed: {}",
                failed.order_id, failed.failure_reason
            ))),
            None => Ok(()),
        }
    }
}
