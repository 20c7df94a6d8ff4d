use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::BotConfig;
use crate::error::{StartupError, VenueError, VenueResult};
use crate::models::{
    Candle, OrderSide, PnlRecord, PositionState, ProtectiveKind, ProtectiveOrder,
};
use crate::venue::{MarketDataProvider, PnlSource, VenueGateway};

const API_KEY_HEADER: &str = "X-MBX-APIKEY";
const CLIENT_ORDER_PREFIX: &str = "fb-";
const INCOME_PAGE_LIMIT: u32 = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Decimal places from a symbol's filters; None when the filter is absent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SymbolPrecision {
    quantity: Option<u32>, // LOT_SIZE stepSize
    price: Option<u32>,    // PRICE_FILTER tickSize
}

type PrecisionTable = HashMap<String, SymbolPrecision>;

/// API key pair for signed endpoints
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Read `BINANCE_API_KEY` and `BINANCE_API_SECRET`
    pub fn from_env() -> Result<Self, StartupError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(StartupError::MissingCredential(name))
        };

        Ok(Self::new(read("BINANCE_API_KEY")?, read("BINANCE_API_SECRET")?))
    }

    /// First four characters of the key, for logs
    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(4).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_key())
            .field("api_secret", &"***")
            .finish()
    }
}

/// Binance USDⓈ-M Futures REST client
///
/// Cloneable; all clones share the rate limiter and the exchange-info cache.
/// Nothing is retried here: a failed call surfaces as a `VenueError` and the
/// next trade cycle is the retry.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
    precisions: Arc<OnceCell<PrecisionTable>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    #[serde(default)]
    step_size: Option<String>,
    #[serde(default)]
    tick_size: Option<String>,
}

impl SymbolInfo {
    fn filter(&self, filter_type: &str) -> Option<&SymbolFilter> {
        self.filters.iter().find(|f| f.filter_type == filter_type)
    }

    fn precision(&self) -> VenueResult<SymbolPrecision> {
        let quantity = self
            .filter("LOT_SIZE")
            .and_then(|f| f.step_size.as_deref())
            .map(step_precision)
            .transpose()?;
        let price = self
            .filter("PRICE_FILTER")
            .and_then(|f| f.tick_size.as_deref())
            .map(step_precision)
            .transpose()?;

        Ok(SymbolPrecision { quantity, price })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrder {
    symbol: String,
    order_id: u64,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    #[serde(default)]
    stop_price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: u64,
    #[serde(default)]
    client_order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomeEntry {
    symbol: String,
    income: String,
    time: i64,
}

impl BinanceFuturesClient {
    pub fn new(config: &BotConfig, credentials: Option<Credentials>) -> VenueResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            rate_limiter,
            precisions: Arc::new(OnceCell::new()),
        })
    }

    async fn public<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> VenueResult<T> {
        let query = encode_query(params);
        let body = self.send(Method::GET, path, query, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> VenueResult<T> {
        let credentials = self.credentials.as_ref().ok_or(VenueError::MissingCredentials)?;

        let mut params = params.to_vec();
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = encode_query(&params);
        let signature = sign(&credentials.api_secret, &query)?;
        let query = format!("{}&signature={}", query, signature);

        let body = self
            .send(method, path, query, Some(credentials.api_key.as_str()))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send(&self, method: Method, path: &str, query: String, api_key: Option<&str>) -> VenueResult<String> {
        self.rate_limiter.until_ready().await;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut request = self.client.request(method, &url);
        if let Some(key) = api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        if status == 429 || status == 418 {
            tracing::warn!("Rate limited by Binance ({}) on {}", status, path);
            return Err(VenueError::RateLimited(status));
        }

        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => VenueError::Api {
                    status,
                    code: err.code,
                    message: err.msg,
                },
                Err(_) => VenueError::Api {
                    status,
                    code: 0,
                    message: body,
                },
            });
        }

        Ok(body)
    }

    /// Fetch exchangeInfo once and keep the quantity and price precision of every symbol
    async fn precision_table(&self) -> VenueResult<&PrecisionTable> {
        self.precisions
            .get_or_try_init(|| async {
                tracing::info!("Loading Binance exchange info...");
                let info: ExchangeInfo = self.public("/fapi/v1/exchangeInfo", &[]).await?;

                let mut table = HashMap::with_capacity(info.symbols.len());
                for symbol in info.symbols {
                    let precision = symbol.precision()?;
                    table.insert(symbol.symbol, precision);
                }

                tracing::info!("✓ Exchange info loaded: {} symbols", table.len());
                Ok::<_, VenueError>(table)
            })
            .await
    }
}

#[async_trait]
impl VenueGateway for BinanceFuturesClient {
    async fn open_orders(&self, symbol: &str) -> VenueResult<Vec<ProtectiveOrder>> {
        let orders: Vec<OpenOrder> = self
            .signed(Method::GET, "/fapi/v1/openOrders", &[("symbol", symbol.to_string())])
            .await?;

        let mut protective = Vec::with_capacity(orders.len());
        for order in orders {
            let Some(kind) = protective_kind(&order.order_type) else {
                tracing::debug!("{}: ignoring {} order {}", symbol, order.order_type, order.order_id);
                continue;
            };

            protective.push(ProtectiveOrder {
                symbol: order.symbol,
                order_id: order.order_id,
                kind,
                side: parse_side(&order.side)?,
                trigger_price: match order.stop_price.as_deref() {
                    Some(price) => Decimal::from_str(price)?,
                    None => Decimal::ZERO,
                },
            });
        }

        Ok(protective)
    }

    async fn position(&self, symbol: &str) -> VenueResult<Option<PositionState>> {
        let positions: Vec<PositionRisk> = self
            .signed(Method::GET, "/fapi/v2/positionRisk", &[("symbol", symbol.to_string())])
            .await?;

        for position in positions {
            if position.symbol != symbol {
                continue;
            }
            let quantity = Decimal::from_str(&position.position_amt)?;
            if quantity.is_zero() {
                continue;
            }
            return Ok(Some(PositionState {
                symbol: position.symbol,
                quantity,
                entry_price: Decimal::from_str(&position.entry_price)?,
            }));
        }

        Ok(None)
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> VenueResult<()> {
        let _: Value = self
            .signed(
                Method::DELETE,
                "/fapi/v1/order",
                &[("symbol", symbol.to_string()), ("orderId", order_id.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn place_market_order(&self, symbol: &str, side: OrderSide, quantity: Decimal) -> VenueResult<()> {
        let ack: OrderAck = self
            .signed(
                Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", "MARKET".to_string()),
                    ("quantity", quantity.normalize().to_string()),
                    ("newClientOrderId", client_order_id()),
                ],
            )
            .await?;

        tracing::debug!("{}: market order accepted as #{} ({:?})", symbol, ack.order_id, ack.client_order_id);
        Ok(())
    }

    async fn place_protective_order(
        &self,
        symbol: &str,
        kind: ProtectiveKind,
        side: OrderSide,
        trigger_price: Decimal,
    ) -> VenueResult<()> {
        let order_type = match kind {
            ProtectiveKind::TakeProfit => "TAKE_PROFIT_MARKET",
            ProtectiveKind::StopLoss => "STOP_MARKET",
        };

        let ack: OrderAck = self
            .signed(
                Method::POST,
                "/fapi/v1/order",
                &[
                    ("symbol", symbol.to_string()),
                    ("side", side.as_str().to_string()),
                    ("type", order_type.to_string()),
                    ("stopPrice", trigger_price.to_string()),
                    ("closePosition", "true".to_string()),
                    ("timeInForce", "GTC".to_string()),
                    ("workingType", "MARK_PRICE".to_string()),
                    ("newClientOrderId", client_order_id()),
                ],
            )
            .await?;

        tracing::debug!("{}: {} accepted as #{} ({:?})", symbol, kind, ack.order_id, ack.client_order_id);
        Ok(())
    }

    async fn instrument_precision(&self, symbol: &str) -> VenueResult<u32> {
        match self.precision_table().await?.get(symbol).map(|p| p.quantity) {
            None => Err(VenueError::UnknownSymbol(symbol.to_string())),
            Some(None) => Err(VenueError::MissingFilter(symbol.to_string())),
            Some(Some(precision)) => Ok(precision),
        }
    }

    async fn price_precision(&self, symbol: &str) -> VenueResult<Option<u32>> {
        self.precision_table()
            .await?
            .get(symbol)
            .map(|p| p.price)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesClient {
    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> VenueResult<Vec<Candle>> {
        let rows: Vec<Vec<Value>> = self
            .public(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }
}

#[async_trait]
impl PnlSource for BinanceFuturesClient {
    async fn realized_pnl(&self, since: DateTime<Utc>) -> VenueResult<Vec<PnlRecord>> {
        let entries: Vec<IncomeEntry> = self
            .signed(
                Method::GET,
                "/fapi/v1/income",
                &[
                    ("incomeType", "REALIZED_PNL".to_string()),
                    ("startTime", since.timestamp_millis().to_string()),
                    ("limit", INCOME_PAGE_LIMIT.to_string()),
                ],
            )
            .await?;

        entries
            .into_iter()
            .map(|entry| {
                Ok(PnlRecord {
                    timestamp: millis_to_datetime(entry.time)?,
                    symbol: entry.symbol,
                    realized: Decimal::from_str(&entry.income)?,
                })
            })
            .collect()
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex HMAC-SHA256 of the query string
fn sign(secret: &str, payload: &str) -> VenueResult<String> {
    // HMAC takes keys of any length; this only fails for an unusable secret
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| VenueError::MissingCredentials)?;
    mac.update(payload.as_bytes());

    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Decimal places allowed by a LOT_SIZE step ("0.001" -> 3, "1" -> 0)
fn step_precision(step: &str) -> VenueResult<u32> {
    Ok(Decimal::from_str(step)?.normalize().scale())
}

fn client_order_id() -> String {
    format!("{}{}", CLIENT_ORDER_PREFIX, Uuid::new_v4().simple())
}

fn protective_kind(order_type: &str) -> Option<ProtectiveKind> {
    match order_type {
        "TAKE_PROFIT_MARKET" | "TAKE_PROFIT" => Some(ProtectiveKind::TakeProfit),
        "STOP_MARKET" | "STOP" => Some(ProtectiveKind::StopLoss),
        _ => None,
    }
}

fn parse_side(side: &str) -> VenueResult<OrderSide> {
    match side {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(VenueError::Decode(format!("unknown order side '{}'", other))),
    }
}

fn millis_to_datetime(millis: i64) -> VenueResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| VenueError::Decode(format!("timestamp {} out of range", millis)))
}

/// Kline row: [open time, open, high, low, close, volume, close time, ...]
fn parse_kline(symbol: &str, row: &[Value]) -> VenueResult<Candle> {
    let millis = |i: usize| {
        row.get(i)
            .and_then(Value::as_i64)
            .ok_or_else(|| VenueError::Decode(format!("kline field {} is not a timestamp", i)))
            .and_then(millis_to_datetime)
    };
    let number = |i: usize| {
        row.get(i)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| VenueError::Decode(format!("kline field {} is not a number", i)))
    };

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time: millis(0)?,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume: number(5)?,
        close_time: millis(6)?,
    })
}
