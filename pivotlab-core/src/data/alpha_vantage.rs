//! Alpha Vantage daily time-series provider.
//!
//! Fetches `TIME_SERIES_DAILY` in compact or full size. Handles request
//! spacing, retries with exponential backoff, the circuit breaker, and
//! payload normalization.
//!
//! Alpha Vantage reports throttling inside a 200 response body, so a
//! successful HTTP status still has to go through the normalizer before the
//! request counts as a success.

use std::sync::Arc;
use std::time::Duration;

use super::circuit_breaker::CircuitBreaker;
use super::normalize::{normalize_daily, DailyPayload};
use super::provider::{DataError, DataProvider, FetchMode, FetchResult};
use super::throttle::Throttle;
use crate::domain::Bar;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage notices carry no retry hint; their quota is per minute.
const NOTICE_RETRY_AFTER_SECS: u64 = 60;

/// Tunables for [`AlphaVantageProvider`].
#[derive(Debug, Clone)]
pub struct AlphaVantageOptions {
    pub api_key: String,
    pub base_url: String,
    /// Minimum spacing between requests.
    pub throttle: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl AlphaVantageOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            throttle: Duration::from_millis(1900),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Alpha Vantage data provider.
pub struct AlphaVantageProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: Throttle,
    options: AlphaVantageOptions,
}

impl AlphaVantageProvider {
    pub fn new(
        options: AlphaVantageOptions,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        if options.api_key.trim().is_empty() {
            return Err(DataError::AuthenticationRequired(
                "Alpha Vantage API key is empty".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            throttle: Throttle::new(options.throttle),
            options,
        })
    }

    /// Query parameters for one request.
    fn query<'a>(&'a self, symbol: &'a str, mode: FetchMode) -> [(&'static str, &'a str); 4] {
        [
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", mode.as_str()),
            ("apikey", self.options.api_key.as_str()),
        ]
    }

    /// Execute the request with throttle, retry and circuit breaker logic.
    fn fetch_with_retry(&self, symbol: &str, mode: FetchMode) -> Result<Vec<Bar>, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.options.base_delay, attempt);
                log::debug!("{symbol} - retry {attempt} in {delay:?}");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                log::warn!(
                    "{symbol} - circuit breaker open, {:?} cooldown left",
                    self.circuit_breaker.remaining_cooldown()
                );
                return Err(DataError::CircuitBreakerTripped);
            }

            self.throttle.wait();

            let resp = match self
                .client
                .get(&self.options.base_url)
                .query(&self.query(symbol, mode))
                .send()
            {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(DataError::AuthenticationRequired(
                    "Alpha Vantage rejected the API key".into(),
                ));
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let body = resp.text().map_err(|e| {
                DataError::NetworkUnreachable(format!("failed to read body for {symbol}: {e}"))
            })?;

            match parse_body(symbol, &body) {
                Ok(bars) => {
                    self.circuit_breaker.record_success();
                    return Ok(bars);
                }
                Err(e @ DataError::RateLimited { .. }) => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Decode a 200 body. A throttling notice in place of the series is a rate
/// limit and gets retried; every other malformed body is final.
fn parse_body(symbol: &str, body: &str) -> Result<Vec<Bar>, DataError> {
    let payload = DailyPayload::from_json(body)?;
    if let Some(notice) = payload.notice() {
        log::warn!("{symbol} - provider notice instead of data: {notice}");
        return Err(DataError::RateLimited {
            retry_after_secs: NOTICE_RETRY_AFTER_SECS,
        });
    }
    normalize_daily(symbol, payload)
}

impl DataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch_daily(&self, symbol: &str, mode: FetchMode) -> Result<FetchResult, DataError> {
        log::info!("{symbol} - fetching {mode} data...");
        let bars = self.fetch_with_retry(symbol, mode)?;
        log::info!("{symbol} - retrieved {} entries", bars.len());
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            mode,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AlphaVantageProvider {
        AlphaVantageProvider::new(
            AlphaVantageOptions::new("demo"),
            Arc::new(CircuitBreaker::default_provider()),
        )
        .unwrap()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = AlphaVantageProvider::new(
            AlphaVantageOptions::new("  "),
            Arc::new(CircuitBreaker::default_provider()),
        );
        assert!(matches!(result, Err(DataError::AuthenticationRequired(_))));
    }

    #[test]
    fn query_carries_output_size() {
        let p = provider();
        let q = p.query("MSFT", FetchMode::Full);
        assert!(q.contains(&("outputsize", "full")));
        assert!(q.contains(&("symbol", "MSFT")));
        assert!(q.contains(&("function", "TIME_SERIES_DAILY")));
    }

    #[test]
    fn notice_body_is_a_rate_limit() {
        let body = r#"{"Note": "Our standard API call frequency is 5 calls per minute."}"#;
        assert!(matches!(
            parse_body("MSFT", body),
            Err(DataError::RateLimited { retry_after_secs: 60 })
        ));
        let body = r#"{"Information": "API rate limit reached."}"#;
        assert!(parse_body("MSFT", body).unwrap_err().is_retryable());
    }

    #[test]
    fn error_body_is_malformed() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let err = parse_body("BAD", body).unwrap_err();
        assert!(matches!(err, DataError::MalformedPayload(_)));
    }

    #[test]
    fn series_body_parses() {
        let body = r#"{"Time Series (Daily)": {"2024-01-02": {"2. high": "11", "3. low": "9", "4. close": "10", "5. volume": "100"}}}"#;
        let bars = parse_body("MSFT", body).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 100);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 40), base * u32::MAX);
        assert_eq!(backoff_delay(base, u32::MAX), base * u32::MAX);
        assert_eq!(backoff_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn tripped_breaker_short_circuits() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        let p = AlphaVantageProvider::new(AlphaVantageOptions::new("demo"), breaker.clone()).unwrap();
        breaker.trip();
        assert!(!p.is_available());
        assert!(matches!(
            p.fetch_daily("MSFT", FetchMode::Compact),
            Err(DataError::CircuitBreakerTripped)
        ));
    }
}
