//! Beehiiv v2 API client.
//!
//! Requests are sequential. Each one waits a fixed delay first, and a 429
//! response waits out the backoff before retrying.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{PublicationBundle, Snapshot};
use crate::config::ApiConfig;
use crate::error::{AnalyticsError, Result};

/// One page of a list endpoint. Page-numbered endpoints set `total_pages`,
/// cursor endpoints set `has_more` and `next_cursor`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Page {
    pub data: Vec<Value>,
    pub total_pages: Option<u32>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl Page {
    /// Next page number after `page`, if any.
    pub fn next_page(&self, page: u32) -> Option<u32> {
        if self.data.is_empty() {
            return None;
        }
        let next = page + 1;
        (next <= self.total_pages.unwrap_or(1)).then_some(next)
    }

    pub fn next_cursor(&self) -> Option<&str> {
        if self.data.is_empty() || !self.has_more {
            return None;
        }
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct BeehiivClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    request_delay: Duration,
    rate_limit_backoff: Duration,
    max_retries: u32,
    max_per_page: u32,
    max_segment_details: usize,
    max_subscription_pages: usize,
}

impl BeehiivClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            AnalyticsError::Config(format!("{} must be set to fetch data", config.api_key_env))
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsletter-analytics/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            request_delay: Duration::from_millis(config.rate_limit_delay_ms),
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            max_retries: config.max_rate_limit_retries.max(1),
            max_per_page: config.max_per_page,
            max_segment_details: config.max_segment_details,
            max_subscription_pages: config.max_subscription_pages,
        })
    }

    async fn get_json<T>(&self, path: &str, params: &[(&str, String)]) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0;
        loop {
            attempts += 1;
            tokio::time::sleep(self.request_delay).await;

            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(params)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempts >= self.max_retries {
                    return Err(AnalyticsError::RateLimited { attempts });
                }
                warn!(
                    path,
                    attempts,
                    backoff_secs = self.rate_limit_backoff.as_secs(),
                    "rate limited, backing off"
                );
                tokio::time::sleep(self.rate_limit_backoff).await;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalyticsError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(response.json::<T>().await?);
        }
    }

    async fn fetch_pages(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let mut query = params.to_vec();
            query.push(("page", page.to_string()));
            query.push(("limit", self.max_per_page.to_string()));

            let mut response: Page = self.get_json(path, &query).await?;
            let next = response.next_page(page);
            records.append(&mut response.data);
            match next {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(records)
    }

    async fn fetch_cursor_pages(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        for page in 0..self.max_subscription_pages {
            let mut query = params.to_vec();
            query.push(("limit", self.max_per_page.to_string()));
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }

            let mut response: Page = self.get_json(path, &query).await?;
            let next = response.next_cursor().map(str::to_string);
            records.append(&mut response.data);
            if (page + 1) % 10 == 0 {
                debug!(path, records = records.len(), "paging subscriptions");
            }
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    pub async fn publications(&self) -> Result<Vec<Value>> {
        let page: Page = self
            .get_json("/publications", &[("expand[]", "stats".to_string())])
            .await?;
        Ok(page.data)
    }

    pub async fn posts(&self, publication_id: &str) -> Result<Vec<Value>> {
        self.fetch_pages(
            &format!("/publications/{publication_id}/posts"),
            &[
                ("expand[]", "stats".to_string()),
                ("status", "confirmed".to_string()),
                ("direction", "desc".to_string()),
                ("order_by", "publish_date".to_string()),
            ],
        )
        .await
    }

    pub async fn subscriptions(&self, publication_id: &str) -> Result<Vec<Value>> {
        self.fetch_cursor_pages(
            &format!("/publications/{publication_id}/subscriptions"),
            &[
                ("expand[]", "stats".to_string()),
                ("status", "all".to_string()),
            ],
        )
        .await
    }

    /// Segment list with per-segment detail for the first few. A failed detail
    /// request keeps the summary record.
    pub async fn segments(&self, publication_id: &str) -> Result<Vec<Value>> {
        let summaries = self
            .fetch_pages(&format!("/publications/{publication_id}/segments"), &[])
            .await?;

        let mut detailed = Vec::new();
        for summary in summaries.into_iter().take(self.max_segment_details) {
            let Some(segment_id) = summary.get("id").and_then(Value::as_str) else {
                detailed.push(summary);
                continue;
            };
            let path = format!("/publications/{publication_id}/segments/{segment_id}");
            match self
                .get_json::<Value>(&path, &[("expand[]", "stats".to_string())])
                .await
            {
                Ok(mut detail) => match detail.get_mut("data").map(Value::take) {
                    Some(data) if data.is_object() => detailed.push(data),
                    _ => detailed.push(summary),
                },
                Err(e) => {
                    debug!(segment_id, error = %e, "segment detail unavailable");
                    detailed.push(summary);
                }
            }
        }
        Ok(detailed)
    }

    /// Pull every publication in the account.
    ///
    /// A publication whose posts or subscribers cannot be fetched is kept with
    /// no records. Segment failures only drop that publication's segments.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let started = Instant::now();
        let publications = self.publications().await?;
        info!(count = publications.len(), "fetched publications");

        let mut bundles = Vec::with_capacity(publications.len());
        for publication in publications {
            let id = publication
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let name = publication
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            let mut bundle = PublicationBundle {
                publication,
                ..PublicationBundle::default()
            };
            if id.is_empty() {
                warn!(publication = %name, "publication has no id, skipping its records");
                bundles.push(bundle);
                continue;
            }

            match self.fetch_publication_records(&id).await {
                Ok((posts, subscribers)) => {
                    info!(
                        publication = %name,
                        posts = posts.len(),
                        subscribers = subscribers.len(),
                        "fetched publication records"
                    );
                    bundle.posts = posts;
                    bundle.subscribers = subscribers;
                    match self.segments(&id).await {
                        Ok(segments) => bundle.segments = segments,
                        Err(e) => warn!(publication = %name, error = %e, "segments fetch failed"),
                    }
                }
                Err(e) => warn!(publication = %name, error = %e, "publication fetch failed"),
            }
            bundles.push(bundle);
        }

        let fetch_duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(duration_ms = fetch_duration_ms, "fetch complete");
        Ok(Snapshot {
            fetched_at: Utc::now(),
            fetch_duration_ms,
            publications: bundles,
        })
    }

    async fn fetch_publication_records(&self, id: &str) -> Result<(Vec<Value>, Vec<Value>)> {
        let posts = self.posts(id).await?;
        let subscribers = self.subscriptions(id).await?;
        Ok((posts, subscribers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP server answering each request with `respond(path, seen)`,
    /// where `seen` counts earlier requests. Returns the base URL and a hit counter.
    async fn serve<F>(respond: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str, usize) -> (u16, Value) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let target = request.split_whitespace().nth(1).unwrap_or("/");
                let path = target.split('?').next().unwrap_or(target);
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = respond(path, seen);
                let body = body.to_string();
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn local_client(base_url: String, max_retries: u32) -> BeehiivClient {
        BeehiivClient::new(&ApiConfig {
            base_url,
            api_key: Some("key".to_string()),
            rate_limit_delay_ms: 0,
            rate_limit_backoff_secs: 0,
            max_rate_limit_retries: max_retries,
            ..ApiConfig::default()
        })
        .unwrap()
    }

    fn page(body: Value) -> Page {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn page_numbers_stop_at_total_pages() {
        let first = page(json!({"data": [{"id": 1}], "total_pages": 2}));
        assert_eq!(first.next_page(1), Some(2));
        assert_eq!(first.next_page(2), None);

        let single = page(json!({"data": [{"id": 1}]}));
        assert_eq!(single.next_page(1), None);

        let empty = page(json!({"data": [], "total_pages": 9}));
        assert_eq!(empty.next_page(1), None);
    }

    #[test]
    fn cursors_require_has_more() {
        let more = page(json!({"data": [{}], "has_more": true, "next_cursor": "abc"}));
        assert_eq!(more.next_cursor(), Some("abc"));

        let done = page(json!({"data": [{}], "has_more": false, "next_cursor": "abc"}));
        assert_eq!(done.next_cursor(), None);

        let blank = page(json!({"data": [{}], "has_more": true, "next_cursor": ""}));
        assert_eq!(blank.next_cursor(), None);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let result = BeehiivClient::new(&ApiConfig::default());
        assert!(matches!(result, Err(AnalyticsError::Config(_))));

        let config = ApiConfig {
            api_key: Some("key".to_string()),
            base_url: "https://api.example.com/v2/".to_string(),
            ..ApiConfig::default()
        };
        let client = BeehiivClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v2");
    }

    #[tokio::test]
    async fn rate_limited_requests_are_retried() {
        let (base_url, hits) = serve(|_, seen| {
            if seen < 2 {
                (429, json!({"error": "slow down"}))
            } else {
                (200, json!({"data": [{"id": "pub_1", "name": "Daily"}]}))
            }
        })
        .await;

        let publications = local_client(base_url, 5).publications().await.unwrap();
        assert_eq!(publications.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let (base_url, hits) = serve(|_, _| (429, json!({"error": "slow down"}))).await;

        let result = local_client(base_url, 3).publications().await;
        assert!(matches!(result, Err(AnalyticsError::RateLimited { attempts: 3 })));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_body() {
        let (base_url, _) = serve(|_, _| (401, json!({"error": "bad key"}))).await;

        match local_client(base_url, 3).publications().await {
            Err(AnalyticsError::Api { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("expected an API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_publications_stay_in_the_snapshot() {
        let (base_url, _) = serve(|path, _| match path {
            "/publications" => (
                200,
                json!({"data": [
                    {"id": "pub_a", "name": "A"},
                    {"id": "pub_b", "name": "B"},
                    {"id": "pub_c", "name": "C"}
                ]}),
            ),
            "/publications/pub_a/posts" => (500, json!({"error": "boom"})),
            p if p.ends_with("/posts") => (200, json!({"data": [{"id": "p1"}], "total_pages": 1})),
            p if p.ends_with("/subscriptions") => {
                (200, json!({"data": [{"id": "s1"}], "has_more": false}))
            }
            "/publications/pub_c/segments" => {
                (200, json!({"data": [{"id": "seg1", "name": "Engaged"}]}))
            }
            _ => (503, json!({"error": "unavailable"})),
        })
        .await;

        let snapshot = local_client(base_url, 1).fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.publications.len(), 3);

        let failed = &snapshot.publications[0];
        assert_eq!(failed.publication["id"], "pub_a");
        assert!(failed.posts.is_empty());
        assert!(failed.subscribers.is_empty());
        assert!(failed.segments.is_empty());

        let no_segments = &snapshot.publications[1];
        assert_eq!(no_segments.posts.len(), 1);
        assert_eq!(no_segments.subscribers.len(), 1);
        assert!(no_segments.segments.is_empty());

        let summary_only = &snapshot.publications[2];
        assert_eq!(summary_only.segments.len(), 1);
        assert_eq!(summary_only.segments[0]["name"], "Engaged");
    }
}
