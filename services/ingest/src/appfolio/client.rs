use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};

use haven_common::error::{HavenError, HavenResult};
use haven_common::types::ResourceType;
use haven_db::settings::repositories::SettingsRepository;

use super::limiter::TokenBucket;
use super::models::{report_name, ReportPage};

/// API credentials, read from the settings store on every sync start so a
/// rotated secret takes effect on the next run without a restart.
#[derive(Debug, Clone)]
pub struct AppfolioCredentials {
    pub database: String,
    pub client_id: String,
    pub client_secret: String,
}

impl AppfolioCredentials {
    pub async fn from_settings(settings: &dyn SettingsRepository) -> HavenResult<Self> {
        let database = require(settings, "appfolio.database").await?;
        let client_id = require(settings, "appfolio.client_id").await?;
        let client_secret = require(settings, "appfolio.client_secret").await?;

        Ok(Self {
            database,
            client_id,
            client_secret,
        })
    }

    pub fn base_url(&self) -> String {
        format!("https://{}.appfolio.com", self.database)
    }
}

async fn require(settings: &dyn SettingsRepository, key: &str) -> HavenResult<String> {
    settings
        .get(key)
        .await?
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| HavenError::Config(format!("setting {key} is required but not set")))
}

#[derive(Debug, Clone)]
pub struct AppfolioClientConfig {
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Token-bucket rate: sustained requests per second and burst size.
    pub requests_per_sec: f64,
    pub burst: f64,
}

impl Default for AppfolioClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_secs: 30,
            requests_per_sec: 2.0,
            burst: 5.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppfolioClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

pub struct AppfolioClient {
    client: Client,
    config: AppfolioClientConfig,
    credentials: AppfolioCredentials,
    base_url: String,
    limiter: TokenBucket,
}

impl AppfolioClient {
    pub fn new(
        config: AppfolioClientConfig,
        credentials: AppfolioCredentials,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = credentials.base_url();
        let limiter = TokenBucket::new(config.burst, config.requests_per_sec);
        Ok(Self {
            client,
            config,
            credentials,
            base_url,
            limiter,
        })
    }

    /// For testing: point the client at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// First page of a report. Incremental syncs pass the since cursor; the
    /// body filter limits the response to rows modified after it.
    pub async fn fetch_first_page(
        &self,
        resource: ResourceType,
        since: Option<NaiveDate>,
    ) -> Result<ReportPage, AppfolioClientError> {
        let url = format!(
            "{}/api/v1/reports/{}.json",
            self.base_url,
            report_name(resource)
        );
        let mut body = serde_json::json!({ "paginate_results": true });
        if let Some(since) = since {
            body["modified_from"] = serde_json::Value::String(since.to_string());
        }

        self.post_with_retry(&url, &body).await
    }

    /// Follow an absolute next-page cursor returned by a prior page.
    pub async fn fetch_next_page(&self, next_page_url: &str) -> Result<ReportPage, AppfolioClientError> {
        let body = serde_json::json!({});
        self.post_with_retry(next_page_url, &body).await
    }

    async fn post_with_retry(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<ReportPage, AppfolioClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            self.limiter.acquire().await;

            let response = match self
                .client
                .post(url)
                .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(AppfolioClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<ReportPage>()
                    .await
                    .map_err(AppfolioClientError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body_text = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body_text}");
                continue;
            }

            // Fail fast on 4xx (auth failure, malformed request)
            let body_text = response.text().await.unwrap_or_default();
            return Err(AppfolioClientError::HttpError {
                status,
                body: body_text,
            });
        }

        Err(AppfolioClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_credentials() -> AppfolioCredentials {
        AppfolioCredentials {
            database: "testco".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    fn test_config() -> AppfolioClientConfig {
        AppfolioClientConfig {
            max_retries: 2,
            timeout_secs: 5,
            requests_per_sec: 1000.0,
            burst: 1000.0,
        }
    }

    fn test_client(server: &MockServer) -> AppfolioClient {
        AppfolioClient::new(test_config(), test_credentials())
            .unwrap()
            .with_base_url(&server.uri())
    }

    fn rows(count: usize, offset: usize) -> Vec<serde_json::Value> {
        (0..count)
            .map(|i| serde_json::json!({"property_id": i + offset, "name": format!("P{}", i + offset)}))
            .collect()
    }

    #[tokio::test]
    async fn fetch_single_page() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": rows(3, 0), "next_page_url": null})),
            )
            .mount(&server)
            .await;

        let page = test_client(&server)
            .fetch_first_page(ResourceType::Property, None)
            .await
            .unwrap();
        assert_eq!(page.results.len(), 3);
        assert!(page.next_page_url.is_none());
    }

    #[tokio::test]
    async fn follows_next_page_cursor() {
        let server = MockServer::start().await;

        // First-page requests carry the paginate flag; cursor fetches send
        // an empty body, so this mock only matches the initial request
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .and(body_partial_json(serde_json::json!({"paginate_results": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": rows(2, 0),
                "next_page_url": format!("{}/api/v1/reports/property_directory.json?page=2", server.uri()),
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .and(wiremock::matchers::query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": rows(1, 2), "next_page_url": null})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let first = client
            .fetch_first_page(ResourceType::Property, None)
            .await
            .unwrap();
        let cursor = first.next_page_url.expect("cursor");
        let second = client.fetch_next_page(&cursor).await.unwrap();
        assert_eq!(second.results.len(), 1);
        assert!(second.next_page_url.is_none());
    }

    #[tokio::test]
    async fn incremental_sync_sends_since_filter() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/vendor_directory.json"))
            .and(body_partial_json(
                serde_json::json!({"modified_from": "2025-05-01"}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": [], "next_page_url": null})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let since = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        test_client(&server)
            .fetch_first_page(ResourceType::Vendor, Some(since))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retries_on_500() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": rows(2, 0), "next_page_url": null})),
            )
            .mount(&server)
            .await;

        let page = test_client(&server)
            .fetch_first_page(ResourceType::Property, None)
            .await
            .unwrap();
        assert_eq!(page.results.len(), 2);
    }

    #[tokio::test]
    async fn fails_fast_on_401() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .fetch_first_page(ResourceType::Property, None)
            .await
            .unwrap_err();
        match err {
            AppfolioClientError::HttpError { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("expected HttpError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_retries_exceeded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/work_order.json"))
            .respond_with(ResponseTemplate::new(503).set_body_string("always failing"))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.max_retries = 1;
        let client = AppfolioClient::new(config, test_credentials())
            .unwrap()
            .with_base_url(&server.uri());

        let err = client
            .fetch_first_page(ResourceType::WorkOrder, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppfolioClientError::MaxRetriesExceeded { .. }));
    }

    #[tokio::test]
    async fn uses_basic_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/reports/tenant_directory.json"))
            .and(wiremock::matchers::header_exists("Authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": [], "next_page_url": null})),
            )
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server)
            .fetch_first_page(ResourceType::Tenant, None)
            .await
            .unwrap();
    }
}
