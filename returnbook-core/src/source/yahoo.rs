//! Yahoo Finance price source.
//!
//! Fetches daily closes from Yahoo's v8 chart API with bounded retries and
//! exponential backoff. Yahoo has no official API and changes format without
//! notice; every parse failure surfaces as `ResponseFormatChanged`.

use super::provider::{FetchWindow, PriceSource, SourceError};
use crate::config::YahooConfig;
use crate::domain::PriceSample;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::time::Duration;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds.
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

/// Upper bound on configured retries.
const MAX_RETRIES: u32 = 10;
/// Longest exponential backoff step.
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Longest `Retry-After` the client will honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Delay before retry number `attempt` (1-based).
///
/// Exponential from `base`, capped at `MAX_BACKOFF`, and never shorter than a
/// rate-limit `Retry-After` (itself capped at `MAX_RETRY_AFTER`).
fn retry_delay(base: Duration, attempt: u32, last_error: Option<&SourceError>) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    let backoff = base.saturating_mul(factor).min(MAX_BACKOFF);
    match last_error {
        Some(SourceError::RateLimited { retry_after_secs }) => {
            backoff.max(Duration::from_secs(*retry_after_secs).min(MAX_RETRY_AFTER))
        }
        _ => backoff,
    }
}

/// Yahoo Finance price source.
pub struct YahooSource {
    client: reqwest::blocking::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooSource {
    pub fn new(config: &YahooConfig) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| SourceError::NetworkUnreachable(format!("HTTP client setup: {e}")))?;

        Ok(Self {
            client,
            max_retries: config.max_retries.min(MAX_RETRIES),
            base_delay: Duration::from_millis(config.base_delay_ms),
        })
    }

    /// Build the chart API URL for a symbol and inclusive date range.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let symbol = symbol.replace('^', "%5E");
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d&events=history"
        )
    }

    /// Parse the chart API response into samples. Null closes are skipped.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceSample>, SourceError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            Some(err) => {
                SourceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
            }
            None => SourceError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("result array is empty".into()))?;

        // A valid symbol with nothing in range comes back without timestamps.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?;

        let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
        let mut samples = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            // Trading dates are exchange-local.
            let date = chrono::DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    SourceError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;
            samples.push(PriceSample::new(date, close));
        }

        Ok(samples)
    }

    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceSample>, SourceError> {
        let url = Self::chart_url(symbol, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(self.base_delay, attempt, last_error.as_ref());
                if let Some(err) = &last_error {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying Yahoo fetch"
                    );
                }
                std::thread::sleep(delay);
            }

            tracing::debug!(%url, attempt, "requesting chart");

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(SourceError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(SourceError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if status.is_server_error() {
                        last_error = Some(SourceError::HttpStatus {
                            status: status.as_u16(),
                            symbol: symbol.to_string(),
                        });
                        continue;
                    }

                    // 401/403 and other client errors will not fix themselves.
                    if !status.is_success() {
                        return Err(SourceError::HttpStatus {
                            status: status.as_u16(),
                            symbol: symbol.to_string(),
                        });
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        SourceError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(SourceError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(SourceError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SourceError::NetworkUnreachable("max retries exceeded".into())))
    }
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        window: FetchWindow,
        as_of: NaiveDate,
    ) -> Result<Vec<PriceSample>, SourceError> {
        let (start, end) = window.resolve(as_of);
        tracing::info!(symbol, %start, %end, "fetching daily closes from Yahoo Finance");
        self.fetch_with_retry(symbol, start, end)
    }
}
