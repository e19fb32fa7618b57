//! HTTP transport and robots.txt cache. Mirrors `crawlerlib/net.py`:
//! `HttpClient` retries on 429/5xx with a capped attempt count and
//! backoff, decodes the body as UTF-8 only for `text/html`/`text/plain`
//! responses, and `RobotsCache` treats a missing or >=400 robots.txt as
//! fully-allowed for the session. The robots cache holds a reference to
//! the HTTP client, never the reverse (spec §9 "no cyclic ownership").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use robotstxt::DefaultMatcher;
use tokio::sync::Mutex;
use url::Url;

use crate::types::FetchResult;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const MAX_RETRIES: u32 = 2;
const BACKOFF_FACTOR: f64 = 0.3;

pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str, read_timeout: Duration, max_connections: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(read_timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(max_connections)
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// Fetches `url`, retrying on 429/5xx up to [`MAX_RETRIES`] times
    /// with exponential backoff. Returns `None` on exhausted retries or
    /// a transport-level failure (§7 `NetworkError`) — the caller
    /// records a failed-fetch metric and dequeues the URL.
    pub async fn fetch(&self, url: &str) -> Option<FetchResult> {
        let (status, content_type, body) = self.request_with_retries(url).await?;
        let size_bytes = body.len();
        let text = if content_type.contains("text/html") || content_type.contains("text/plain") {
            String::from_utf8_lossy(&body).into_owned()
        } else {
            String::new()
        };
        Some(FetchResult {
            status,
            content_type,
            text,
            size_bytes,
        })
    }

    async fn request_with_retries(&self, url: &str) -> Option<(u16, String, Vec<u8>)> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if RETRYABLE_STATUSES.contains(&status) && attempt < MAX_RETRIES {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let body = response.bytes().await.ok()?.to_vec();
                    return Some((status, content_type, body));
                }
                Err(_) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(_) => return None,
            }
        }
    }

    /// Raw GET used internally to fetch `robots.txt`; mirrors
    /// `net.py::HttpClient._request_bytes`.
    async fn get_raw(&self, url: &str) -> Option<(u16, Vec<u8>)> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .ok()?;
        let status = response.status().as_u16();
        let body = response.bytes().await.ok()?.to_vec();
        Some((status, body))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs_f64(BACKOFF_FACTOR * 2f64.powi(attempt as i32 - 1))
}

/// Per-origin cached robots.txt decision. `None` cache entries mean
/// "unavailable; treat as allowed" for the remainder of the session.
pub struct RobotsCache {
    http: Arc<HttpClient>,
    user_agent: String,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl RobotsCache {
    pub fn new(user_agent: String, http: Arc<HttpClient>) -> Self {
        Self {
            http,
            user_agent,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn can_fetch(&self, url: &str) -> bool {
        let origin = match origin_of(url) {
            Some(o) => o,
            None => return true,
        };

        let cached = {
            let cache = self.cache.lock().await;
            cache.get(&origin).cloned()
        };
        let robots_txt = match cached {
            Some(body) => body,
            None => {
                let fetched = self.fetch_robots(&origin).await;
                self.cache.lock().await.insert(origin.clone(), fetched.clone());
                fetched
            }
        };

        match robots_txt {
            None => true,
            Some(body) => DefaultMatcher::default().one_agent_allowed_by_robots(&body, &self.user_agent, url),
        }
    }

    async fn fetch_robots(&self, origin: &str) -> Option<String> {
        let robots_url = format!("{origin}/robots.txt");
        let (status, body) = self.http.get_raw(&robots_url).await?;
        if status >= 400 {
            return None;
        }
        Some(String::from_utf8_lossy(&body).into_owned())
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_decodes_html_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>").insert_header("content-type", "text/html; charset=utf-8"))
            .mount(&server)
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5), 4).unwrap();
        let result = client.fetch(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(result.status, 200);
        assert!(result.content_type.contains("text/html"));
        assert_eq!(result.text, "<html></html>");
    }

    #[tokio::test]
    async fn fetch_leaves_text_empty_for_non_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2]).insert_header("content-type", "image/png"))
            .mount(&server)
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5), 4).unwrap();
        let result = client.fetch(&format!("{}/img", server.uri())).await.unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.size_bytes, 3);
    }

    #[tokio::test]
    async fn robots_disallow_is_honored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
            .mount(&server)
            .await;

        let http = Arc::new(HttpClient::new("test-agent", Duration::from_secs(5), 4).unwrap());
        let robots = RobotsCache::new("test-agent".to_string(), http);
        assert!(!robots.can_fetch(&format!("{}/private/page", server.uri())).await);
        assert!(robots.can_fetch(&format!("{}/public/page", server.uri())).await);
    }

    #[tokio::test]
    async fn missing_robots_defaults_to_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = Arc::new(HttpClient::new("test-agent", Duration::from_secs(5), 4).unwrap());
        let robots = RobotsCache::new("test-agent".to_string(), http);
        assert!(robots.can_fetch(&format!("{}/anything", server.uri())).await);
    }
}
