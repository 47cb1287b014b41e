//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just HTTP. Handles redirects, timeouts, retry on 5xx,
//! backoff on 429, and an HTTP/1.1 fallback for sites that reject HTTP/2.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const MAX_RETRIES: u32 = 2;

/// Response from one request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    /// Response headers, lowercase names.
    pub headers: Vec<(String, String)>,
    /// Body as text.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All `Set-Cookie` values, for login flows that carry a session onward.
    pub fn set_cookies(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k == "set-cookie")
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// HTTP client shared by all runners.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback for CDNs that mishandle HTTP/2.
    h1_client: reqwest::Client,
    /// No-redirect client for form POSTs. Login endpoints answer 302 with
    /// `set-cookie`, which following the redirect would discard.
    post_client: reqwest::Client,
}

impl HttpClient {
    /// Client with a standard Chrome user-agent and bounded redirects.
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        let h1_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .http1_only()
            .build()
            .unwrap_or_default();

        let post_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self {
            client,
            h1_client,
            post_client,
        }
    }

    /// GET with retry on 5xx, backoff on 429, and HTTP/1.1 fallback on
    /// protocol errors.
    pub async fn get(&self, url: &str, timeout_ms: u64) -> Result<HttpResponse> {
        self.get_with_headers(url, &[], timeout_ms).await
    }

    /// GET carrying extra request headers (e.g. a `Cookie` from a login).
    pub async fn get_with_headers(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        match self
            .get_inner(&self.client, url, extra_headers, timeout_ms)
            .await
        {
            Ok(resp) => Ok(resp),
            Err(e) => {
                let text = format!("{e}");
                if text.contains("http2") || text.contains("protocol") || text.contains("connection closed")
                {
                    self.get_inner(&self.h1_client, url, extra_headers, timeout_ms)
                        .await
                } else {
                    Err(e)
                }
            }
        }
    }

    /// GET a JSON endpoint, as used after a data API has been located.
    pub async fn get_json(&self, url: &str, timeout_ms: u64) -> Result<Value> {
        let resp = self.get(url, timeout_ms).await?;
        if !resp.is_success() {
            anyhow::bail!("endpoint {url} answered {}", resp.status);
        }
        serde_json::from_str(&resp.body).with_context(|| format!("non-JSON body from {url}"))
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        extra_headers: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        let mut retries = 0u32;

        loop {
            let mut builder = client.get(url).timeout(Duration::from_millis(timeout_ms));
            for (name, value) in extra_headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            match builder.send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let final_url = r.url().to_string();
                    let headers: Vec<(String, String)> = r
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                        .collect();
                    let body = r.text().await.unwrap_or_default();

                    return Ok(HttpResponse {
                        url: url.to_string(),
                        final_url,
                        status,
                        headers,
                        body,
                    });
                }
                Err(e) => {
                    if retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// POST url-encoded form data. Redirects are not followed and all
    /// response headers are kept, because login flows need the `set-cookie`
    /// of the immediate response.
    pub async fn post_form(
        &self,
        url: &str,
        form_fields: &[(String, String)],
        extra_headers: &[(String, String)],
        timeout_ms: u64,
    ) -> Result<HttpResponse> {
        let mut builder = self
            .post_client
            .post(url)
            .timeout(Duration::from_millis(timeout_ms));

        for (name, value) in extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.form(form_fields);

        let r = builder.send().await?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let headers: Vec<(String, String)> = r
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = r.text().await.unwrap_or_default();

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body,
        })
    }

    /// Parallel GETs with bounded concurrency, order not preserved.
    pub async fn get_many(
        &self,
        urls: &[String],
        concurrency: usize,
        timeout_ms: u64,
    ) -> Vec<Result<HttpResponse>> {
        use futures::stream::{self, StreamExt};

        stream::iter(urls.iter())
            .map(|url| {
                let client = self.clone();
                let u = url.clone();
                async move { client.get(&u, timeout_ms).await }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/listing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ul><li>Acme</li></ul>"))
            .mount(&server)
            .await;

        let client = HttpClient::new(5000);
        let resp = client
            .get(&format!("{}/listing", server.uri()), 5000)
            .await
            .unwrap();

        assert!(resp.is_success());
        assert!(resp.body.contains("Acme"));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let client = HttpClient::new(5000);
        let resp = client
            .get(&format!("{}/flaky", server.uri()), 5000)
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "recovered");
    }

    #[tokio::test]
    async fn get_json_parses_and_rejects_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rows"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"rows":[{"id":"rec1"}]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(5000);
        let value = client
            .get_json(&format!("{}/api/rows", server.uri()), 5000)
            .await
            .unwrap();
        assert_eq!(value["rows"][0]["id"], "rec1");

        let err = client
            .get_json(&format!("{}/api/missing", server.uri()), 5000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn post_form_sends_fields_and_keeps_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("email=user%40example.com"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc123; Path=/"),
            )
            .mount(&server)
            .await;

        let client = HttpClient::new(5000);
        let resp = client
            .post_form(
                &format!("{}/login", server.uri()),
                &[
                    ("email".to_string(), "user@example.com".to_string()),
                    ("password".to_string(), "hunter2".to_string()),
                ],
                &[],
                5000,
            )
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.set_cookies(), vec!["sid=abc123; Path=/"]);
    }
}
