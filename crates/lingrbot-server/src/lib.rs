use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use lingrbot_config::{Config, Services};
use lingrbot_contracts::{EventBatch, PlaygroundResult};
use lingrbot_kernel::{
    classify, counter_reply, extract_title, finish_reply, godoc_reply, godoc_synopsis,
    parse_counter, render_box, title_reply, Classification, CounterOp,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

mod fetch;
mod store;

pub use fetch::{FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use store::{CounterRecord, Lookup, StoreBackend, StoreError};

const TEXT_PLAIN: &str = "text/plain; charset=utf8";
const TEXT_HTML: &str = "text/html; charset=utf8";

#[derive(Debug, Error)]
#[error("decode event batch failed: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "lingrbot listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let fetcher = Arc::new(HttpFetcher::new()?);
    build_app_with_fetcher(cfg, fetcher).await
}

/// Same router as [`build_app`], with outbound HTTP going through `fetcher`.
pub async fn build_app_with_fetcher(
    cfg: Config,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Router, String> {
    let state = AppState::new(cfg, fetcher)?;
    Ok(Router::new()
        .route("/", post(events).fallback(index))
        .route("/healthz", get(healthz))
        .with_state(state))
}

#[derive(Clone)]
struct AppState {
    index_path: Arc<str>,
    services: Arc<Services>,
    store: Arc<Mutex<StoreBackend>>,
    fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    fn new(cfg: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self, String> {
        let store = StoreBackend::open(&cfg.store)?;
        Ok(Self {
            index_path: cfg.server.index_path.into(),
            services: Arc::new(cfg.services),
            store: Arc::new(Mutex::new(store)),
            fetcher,
        })
    }

    /// Replies to every message in the batch, in arrival order. `None` when
    /// nothing had anything to say.
    async fn process_batch(&self, body: &[u8]) -> Result<Option<String>, DecodeError> {
        let batch: EventBatch = serde_json::from_slice(body)?;

        let mut results = String::new();
        for event in &batch.events {
            let Some(message) = &event.message else {
                debug!(event_id = event.id, "event without message skipped");
                continue;
            };
            let result = self.reply_to(&message.text).await;
            debug!(
                event_id = event.id,
                room = %message.room,
                nickname = %message.nickname,
                reply_len = result.len(),
                "message handled"
            );
            results.push_str(&result);
        }
        Ok(finish_reply(&results))
    }

    async fn reply_to(&self, text: &str) -> String {
        let classification = classify(text);
        debug!(rule = classification.name(), "message classified");
        match classification {
            Classification::None => String::new(),
            Classification::CommandGo { code } => self.run_playground(&code).await,
            Classification::CommandGoDoc { package } => self.lookup_godoc(&package).await,
            Classification::DecorativeBox { text, repeat } => render_box(&text, repeat),
            Classification::UrlList(urls) => {
                let titles = self.url_titles(&urls).await;
                if !titles.is_empty() {
                    return titles;
                }
                // Counter names cannot hold `:` or `/`, so this never matches
                // text that carried a URL; kept for the rule order.
                match parse_counter(text) {
                    Some(op) => self.adjust_counter(op).await,
                    None => String::new(),
                }
            }
            Classification::CounterOp(op) => self.adjust_counter(op).await,
        }
    }

    async fn run_playground(&self, code: &str) -> String {
        let url = &self.services.playground_url;
        let outcome = async {
            let response = self
                .fetcher
                .post_form(url, &[("version", "2"), ("body", code)])
                .await?;
            let result: PlaygroundResult = serde_json::from_slice(&response.body)
                .map_err(|e| FetchError::Format(e.to_string()))?;
            result
                .output()
                .ok_or_else(|| FetchError::Format("no errors and no events".to_string()))
        }
        .await;
        outcome.unwrap_or_else(|e| {
            warn!(%url, error = %e, "playground run failed");
            String::new()
        })
    }

    async fn lookup_godoc(&self, package: &str) -> String {
        let url = format!("{}{}", self.services.godoc_base_url, package);
        let headers = [
            ("User-Agent", self.services.user_agent.as_str()),
            ("Accept", "text/plain"),
        ];
        let synopsis = match self.fetcher.get(&url, &headers).await {
            Ok(response) if response.status == 200 => {
                godoc_synopsis(&String::from_utf8_lossy(&response.body))
            }
            Ok(response) => {
                debug!(%url, status = response.status, "godoc lookup missed");
                String::new()
            }
            Err(e) => {
                warn!(%url, error = %e, "godoc lookup failed");
                String::new()
            }
        };
        godoc_reply(&url, &synopsis)
    }

    async fn url_titles(&self, urls: &[String]) -> String {
        let mut out = String::new();
        for url in urls {
            let response = match self.fetcher.get(url, &[]).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(%url, error = %e, "title fetch failed");
                    continue;
                }
            };
            if !response.is_html() {
                continue;
            }
            if let Some(title) = extract_title(&response.body) {
                out.push_str(&title_reply(&title));
            }
        }
        out
    }

    async fn adjust_counter(&self, op: CounterOp) -> String {
        let mut store = self.store.lock().await;
        let mut record = match store.get(&op.nickname) {
            Ok(lookup) => lookup.or_zero(&op.nickname),
            Err(e) => {
                warn!(nickname = %op.nickname, error = %e, "counter read failed");
                return String::new();
            }
        };
        record.count += op.delta;
        if let Err(e) = store.put(&record) {
            warn!(nickname = %op.nickname, error = %e, "counter write failed");
            return String::new();
        }
        counter_reply(&record.nickname, record.count)
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn events(State(state): State<AppState>, body: Bytes) -> Response {
    match state.process_batch(&body).await {
        Ok(Some(reply)) => ([(CONTENT_TYPE, TEXT_PLAIN)], reply).into_response(),
        Ok(None) => ([(CONTENT_TYPE, TEXT_PLAIN)], String::new()).into_response(),
        Err(e) => {
            error!(error = %e, "rejecting event batch");
            StatusCode::OK.into_response()
        }
    }
}

async fn index(State(state): State<AppState>) -> Response {
    let page = tokio::fs::read(&*state.index_path)
        .await
        .unwrap_or_else(|e| {
            warn!(path = %state.index_path, error = %e, "landing page unreadable");
            Vec::new()
        });
    ([(CONTENT_TYPE, TEXT_HTML)], page).into_response()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingrbot_config::{Logging, Server, Store};

    struct Offline;

    #[async_trait::async_trait]
    impl Fetcher for Offline {
        async fn get(&self, _url: &str, _headers: &[(&str, &str)]) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Transport("offline".to_string()))
        }

        async fn post_form(
            &self,
            _url: &str,
            _form: &[(&str, &str)],
        ) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Transport("offline".to_string()))
        }
    }

    fn offline_state() -> AppState {
        let cfg = Config {
            server: Server {
                listen_addr: "127.0.0.1:0".to_string(),
                index_path: "./index.html".to_string(),
            },
            store: Store {
                kind: "memory".to_string(),
                sqlite_path: None,
            },
            services: Services::default(),
            logging: Logging::default(),
        };
        AppState::new(cfg, Arc::new(Offline)).unwrap()
    }

    #[tokio::test]
    async fn unreachable_url_falls_back_to_nothing() {
        let state = offline_state();
        assert_eq!(state.reply_to("see http://example.com/").await, "");
    }

    #[tokio::test]
    async fn playground_transport_failure_is_silent() {
        let state = offline_state();
        assert_eq!(state.reply_to("!go package main").await, "");
    }

    #[tokio::test]
    async fn godoc_transport_failure_reports_missing_docs() {
        let state = offline_state();
        assert_eq!(
            state.reply_to("!godoc fmt").await,
            "http://godoc.org/fmt\nNo such documents\n"
        );
    }

    #[tokio::test]
    async fn counters_are_per_nickname() {
        let state = offline_state();
        assert_eq!(state.reply_to("a++").await, "a (1)\n");
        assert_eq!(state.reply_to("b+=4").await, "b (4)\n");
        assert_eq!(state.reply_to("a-=3").await, "a (-2)\n");
        assert_eq!(state.reply_to("b--").await, "b (3)\n");
    }

    #[tokio::test]
    async fn malformed_batch_is_a_decode_error() {
        let state = offline_state();
        assert!(state.process_batch(b"{not json").await.is_err());
        assert_eq!(state.process_batch(br#"{"events":[]}"#).await.unwrap(), None);
    }
}
