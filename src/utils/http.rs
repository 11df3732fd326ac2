// src/utils/http.rs

//! HTTP transport used by the fetcher and the document assembler.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;

/// Network capability consumed by the scraping pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a page body as text.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// Size of a resource in bytes, as reported by a HEAD request.
    async fn content_length(&self, url: &str) -> Result<u64>;

    /// Fetch a resource body as raw bytes.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &HttpConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(create_async_client(config)?))
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::network(url, format!("HTTP {status}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String> {
        log::debug!("GET {url}");
        let response = self.send(self.client.get(url), url).await?;
        Ok(response.text().await?)
    }

    async fn content_length(&self, url: &str) -> Result<u64> {
        log::debug!("HEAD {url}");
        let response = self.send(self.client.head(url), url).await?;
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(size)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET (bytes) {url}");
        let response = self.send(self.client.get(url), url).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Run `future` unless `cancel` fires first.
pub async fn with_cancel<T>(
    cancel: &CancellationToken,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = future => result,
    }
}

/// Run `future` with a deadline.
pub async fn with_timeout<T>(
    url: &str,
    secs: u64,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(secs), future)
        .await
        .map_err(|_| AppError::Timeout {
            url: url.to_string(),
            secs,
        })?
}

/// In-memory transport for tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::Transport;
    use crate::error::{AppError, Result};

    #[derive(Clone)]
    enum Route {
        Text(String),
        Bytes(Vec<u8>),
        Size(u64),
        /// Answer a HEAD after a delay.
        SlowSize(u64, Duration),
        Fail,
        /// Signal the gate and never answer.
        Hang,
    }

    /// Routes URLs to canned responses and counts every call.
    #[derive(Default)]
    pub struct FakeTransport {
        routes: Mutex<HashMap<String, Route>>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        pub gate: Notify,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn route(&self, url: &str, route: Route) {
            self.routes.lock().unwrap().insert(url.to_string(), route);
        }

        pub fn page(&self, url: &str, html: &str) {
            self.route(url, Route::Text(html.to_string()));
        }

        pub fn bytes(&self, url: &str, bytes: Vec<u8>) {
            self.route(url, Route::Bytes(bytes));
        }

        pub fn size(&self, url: &str, size: u64) {
            self.route(url, Route::Size(size));
        }

        pub fn slow_size(&self, url: &str, size: u64, delay: Duration) {
            self.route(url, Route::SlowSize(size, delay));
        }

        pub fn fail(&self, url: &str) {
            self.route(url, Route::Fail);
        }

        pub fn hang(&self, url: &str) {
            self.route(url, Route::Hang);
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }

        /// Most slow requests that were ever pending at once.
        pub fn peak_in_flight(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        async fn lookup(&self, url: &str) -> Result<Route> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let route = self.routes.lock().unwrap().get(url).cloned();
            match route {
                Some(Route::Fail) | None => Err(AppError::network(url, "HTTP 404 Not Found")),
                Some(Route::Hang) => {
                    self.gate.notify_one();
                    std::future::pending().await
                }
                Some(Route::SlowSize(size, delay)) => {
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(Route::Size(size))
                }
                Some(route) => Ok(route),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get_text(&self, url: &str) -> Result<String> {
            match self.lookup(url).await? {
                Route::Text(text) => Ok(text),
                _ => Err(AppError::network(url, "not a page")),
            }
        }

        async fn content_length(&self, url: &str) -> Result<u64> {
            match self.lookup(url).await? {
                Route::Size(size) => Ok(size),
                Route::Bytes(bytes) => Ok(bytes.len() as u64),
                _ => Ok(0),
            }
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
            match self.lookup(url).await? {
                Route::Bytes(bytes) => Ok(bytes),
                Route::Text(text) => Ok(text.into_bytes()),
                _ => Err(AppError::network(url, "no body")),
            }
        }
    }
}
