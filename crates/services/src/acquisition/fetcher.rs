use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::instrument;

use crate::error::FetchError;

/// Connection settings for the remote question source.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    /// Category selector sent as the `type` query parameter.
    pub question_type: String,
    pub timeout: Duration,
}

/// Anything that can hand back the raw markup of one page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `FetchError` on network or status failures.
    async fn fetch(&self, page: u32) -> Result<String, FetchError>;
}

/// `reqwest`-backed page source.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns `FetchError` when a configured header is not valid HTTP or the
    /// client cannot be built.
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    #[instrument(skip(self), fields(question_type = %self.config.question_type))]
    async fn fetch(&self, page: u32) -> Result<String, FetchError> {
        let page = page.to_string();
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("type", self.config.question_type.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status()));
        }

        let body = response.text().await?;
        tracing::debug!(bytes = body.len(), "fetched page");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> FetcherConfig {
        FetcherConfig {
            base_url,
            headers: BTreeMap::from([("User-Agent".to_string(), "quizbank-test".to_string())]),
            question_type: "A".into(),
            timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn sends_type_page_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/questions"))
            .and(query_param("type", "A"))
            .and(query_param("page", "2"))
            .and(header("user-agent", "quizbank-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>page two</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(config(format!("{}/questions", server.uri()))).unwrap();
        let body = fetcher.fetch(2).await.unwrap();
        assert_eq!(body, "<html>page two</html>");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(config(server.uri())).unwrap();
        let err = fetcher.fetch(1).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.timeout = Duration::from_millis(50);
        let err = HttpFetcher::new(cfg).unwrap().fetch(1).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let mut cfg = config("http://localhost".into());
        cfg.headers.insert("bad header".into(), "x".into());
        assert!(matches!(
            HttpFetcher::new(cfg),
            Err(FetchError::InvalidHeader(name)) if name == "bad header"
        ));
    }
}
