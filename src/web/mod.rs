use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{RawQuery, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::aggregator::Aggregator;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(search_listings))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn(cors_layer))
        .with_state(state)
}

pub async fn start_http_server(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {bind_addr}"))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server crashed")
}

async fn cors_layer(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        apply_cors_headers(response.headers_mut());
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
    } else {
        let mut response = next.run(req).await;
        apply_cors_headers(response.headers_mut());
        response
    }
}

fn apply_cors_headers(headers: &mut axum::http::HeaderMap) {
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    headers.insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
}

async fn search_listings(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let query = query.unwrap_or_default();

    match state.aggregator.search(&query).await {
        Ok(listings) => Json(listings).into_response(),
        Err(err) => {
            error!("Search failed: {}", err);
            let body = ErrorResponse {
                error: "Failed to fetch listings".to_string(),
                message: err.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::QueryCache;
    use crate::models::{Listing, ListingFilters, Source};
    use crate::scrapers::ListingSource;
    use crate::store::{ListingStore, SqliteStore, StoreError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedSource(Result<Vec<Listing>, &'static str>);

    #[async_trait]
    impl ListingSource for FixedSource {
        async fn scrape(&self, _filters: &ListingFilters) -> anyhow::Result<Vec<Listing>> {
            self.0.clone().map_err(|msg| anyhow::anyhow!(msg))
        }

        fn source(&self) -> Source {
            Source::Immowelt
        }
    }

    struct DownStore;

    #[async_trait]
    impl ListingStore for DownStore {
        async fn upsert_many(&self, _listings: &[Listing]) -> Result<usize, StoreError> {
            Err(StoreError::Task("offline".to_string()))
        }

        async fn find_by_city_like(&self, _city: &str) -> Result<Vec<Listing>, StoreError> {
            Err(StoreError::Task("offline".to_string()))
        }
    }

    /// Serve the router on an ephemeral port and return its base url
    async fn serve(source: FixedSource, store: Arc<dyn ListingStore>) -> String {
        let aggregator = Aggregator::new(
            vec![Arc::new(source) as Arc<dyn ListingSource>],
            store,
            QueryCache::new(Duration::from_secs(300), None),
        );
        let app = router(AppState {
            aggregator: Arc::new(aggregator),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn flats() -> Vec<Listing> {
        [(1, 950), (2, 650)]
            .into_iter()
            .map(|(id, price)| {
                let mut listing = Listing::new(Source::Immowelt, "Wohnung", "Berlin", format!("https://a.de/{id}"));
                listing.price = price;
                listing
            })
            .collect()
    }

    #[tokio::test]
    async fn search_returns_listing_array() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let base = serve(FixedSource(Ok(flats())), store).await;

        let response = reqwest::get(format!("{base}/api/search?city=Berlin&sort=priceAsc"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let body: serde_json::Value = response.json().await.unwrap();
        let listings = body.as_array().unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0]["price"], 650);
        assert_eq!(listings[0]["source"], "Immowelt");
        assert_eq!(listings[0]["petsAllowed"], false);
    }

    #[tokio::test]
    async fn total_failure_is_a_500_with_error_body() {
        let base = serve(FixedSource(Err("timeout")), Arc::new(DownStore)).await;

        let response = reqwest::get(format!("{base}/api/search")).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Failed to fetch listings");
        assert!(body["message"].as_str().unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn preflight_and_health() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let base = serve(FixedSource(Ok(Vec::new())), store).await;
        let client = reqwest::Client::new();

        let preflight = client
            .request(reqwest::Method::OPTIONS, format!("{base}/api/search"))
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status().as_u16(), 204);
        assert_eq!(preflight.headers()["access-control-allow-methods"], "GET, OPTIONS");

        let health = client.get(format!("{base}/healthz")).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);
        assert_eq!(health.text().await.unwrap(), "ok");
    }
}
