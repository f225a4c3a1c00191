use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use super::traits::{
    BrokerAccount, BrokerApi, BrokerPosition, Candle, InstrumentCatalog, InstrumentDetail,
    InstrumentRecord, InstrumentRef, MoneyValue, OperationsPage,
};
use crate::errors::CoreError;
use crate::models::instrument::InstrumentType;

const BASE_URL: &str = "https://invest-public-api.tinkoff.ru/rest/tinkoff.public.invest.api.contract.v1";
const PROVIDER: &str = "T-Invest";

/// REST gateway client for the T-Invest public API.
///
/// - **Auth**: bearer token (read-only tokens are enough).
/// - **Transport**: JSON over HTTPS POST, one URL per `Service/Method`.
/// - int64 values arrive as strings; see [`super::traits::Quotation`].
pub struct TInvestClient {
    client: Client,
    token: String,
    base_url: String,
}

impl std::fmt::Debug for TInvestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TInvestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TInvestClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, BASE_URL)
    }

    /// Point the client at another gateway (sandbox, proxy).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(30));
        Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call<Req, Resp>(&self, service: &str, method: &str, body: &Req) -> Result<Resp, CoreError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}.{service}/{method}", self.base_url);
        debug!("{PROVIDER}: {service}/{method}");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("{service}/{method} returned {status}: {text}"),
            });
        }

        resp.json().await.map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to parse {service}/{method} response: {e}"),
        })
    }

    async fn instrument_by_uid(&self, method: &str, uid: &str) -> Result<InstrumentDetail, CoreError> {
        let resp: InstrumentResponse = self
            .call(
                "InstrumentsService",
                method,
                &json!({ "idType": "INSTRUMENT_ID_TYPE_UID", "id": uid }),
            )
            .await?;
        Ok(resp.instrument)
    }

    async fn catalog(&self, method: &str) -> Result<Vec<InstrumentDetail>, CoreError> {
        let resp: InstrumentsResponse = self
            .call(
                "InstrumentsService",
                method,
                &json!({ "instrumentStatus": "INSTRUMENT_STATUS_ALL" }),
            )
            .await?;
        Ok(resp.instruments)
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Gateway response envelopes ──────────────────────────────────────

#[derive(Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    accounts: Vec<BrokerAccount>,
}

#[derive(Deserialize)]
struct PortfolioResponse {
    #[serde(default)]
    positions: Vec<BrokerPosition>,
}

#[derive(Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    money: Vec<MoneyValue>,
}

#[derive(Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<Candle>,
}

#[derive(Deserialize)]
struct InstrumentResponse {
    instrument: InstrumentDetail,
}

#[derive(Deserialize)]
struct InstrumentsResponse {
    #[serde(default)]
    instruments: Vec<InstrumentDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoundInstrument {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    figi: String,
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    instrument_type: String,
    #[serde(default)]
    instrument_kind: String,
}

#[derive(Deserialize)]
struct FindInstrumentResponse {
    #[serde(default)]
    instruments: Vec<FoundInstrument>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl BrokerApi for TInvestClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn list_accounts(&self) -> Result<Vec<BrokerAccount>, CoreError> {
        let resp: AccountsResponse = self.call("UsersService", "GetAccounts", &json!({})).await?;
        Ok(resp.accounts)
    }

    async fn fetch_positions(&self, account_id: &str) -> Result<Vec<BrokerPosition>, CoreError> {
        let resp: PortfolioResponse = self
            .call(
                "OperationsService",
                "GetPortfolio",
                &json!({ "accountId": account_id, "currency": "RUB" }),
            )
            .await?;
        Ok(resp.positions)
    }

    async fn fetch_cash_balances(&self, account_id: &str) -> Result<Vec<MoneyValue>, CoreError> {
        let resp: PositionsResponse = self
            .call("OperationsService", "GetPositions", &json!({ "accountId": account_id }))
            .await?;
        Ok(resp.money)
    }

    async fn fetch_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, CoreError> {
        let resp: CandlesResponse = self
            .call(
                "MarketDataService",
                "GetCandles",
                &json!({
                    "instrumentId": instrument_id,
                    "from": timestamp(from),
                    "to": timestamp(to),
                    "interval": "CANDLE_INTERVAL_DAY",
                }),
            )
            .await?;
        Ok(resp.candles)
    }

    async fn fetch_operations_page(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: &str,
        limit: u32,
    ) -> Result<OperationsPage, CoreError> {
        self.call(
            "OperationsService",
            "GetOperationsByCursor",
            &json!({
                "accountId": account_id,
                "from": timestamp(from),
                "to": timestamp(to),
                "cursor": cursor,
                "limit": limit,
                "state": "OPERATION_STATE_EXECUTED",
                "withoutTrades": true,
            }),
        )
        .await
    }

    async fn resolve_instrument(&self, query: &str) -> Result<Option<InstrumentRef>, CoreError> {
        let resp: FindInstrumentResponse = self
            .call(
                "InstrumentsService",
                "FindInstrument",
                &json!({ "query": query, "apiTradeAvailableFlag": false }),
            )
            .await?;

        // Search is fuzzy; only an exact identifier match counts.
        let found = resp
            .instruments
            .into_iter()
            .find(|i| i.figi == query || i.uid == query || i.ticker == query);

        Ok(found.and_then(|i| {
            let kind = InstrumentType::from_wire(&i.instrument_type)
                .or_else(|| InstrumentType::from_wire(&i.instrument_kind))?;
            Some(InstrumentRef { uid: i.uid, kind })
        }))
    }

    async fn get_instrument_detail(
        &self,
        uid: &str,
        kind: InstrumentType,
    ) -> Result<InstrumentRecord, CoreError> {
        let method = match kind {
            InstrumentType::Bond => "BondBy",
            InstrumentType::Currency => "CurrencyBy",
            InstrumentType::Etf => "EtfBy",
            InstrumentType::Share => "ShareBy",
            InstrumentType::Futures => "FutureBy",
        };
        let detail = self.instrument_by_uid(method, uid).await?;
        Ok(InstrumentRecord::tagged(kind, detail))
    }

    async fn bulk_list_instruments(&self) -> Result<InstrumentCatalog, CoreError> {
        Ok(InstrumentCatalog {
            bonds: self.catalog("Bonds").await?,
            etfs: self.catalog("Etfs").await?,
            shares: self.catalog("Shares").await?,
            currencies: self.catalog("Currencies").await?,
        })
    }
}
