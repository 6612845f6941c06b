//! HTTP health checks with retry

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};

/// Result of a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpCheckOutcome {
    /// Status of the final response
    pub status: u16,
    /// Requests made, including the successful one
    pub attempts: u32,
    /// Time from the first request to the final response
    pub elapsed: Duration,
}

/// Polls a URL until it answers with the expected status
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// Every request is bounded by `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET `url` up to `retries + 1` times, waiting `delay` between attempts
    ///
    /// `expected_status` of 0 accepts any response. Both the requests and the
    /// waits observe `cancel`.
    pub async fn check_with_retry(
        &self,
        url: &str,
        expected_status: u16,
        retries: u32,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpCheckOutcome> {
        let start = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=retries.saturating_add(1) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if attempt > 1 {
                tracing::debug!("HTTP check retry {}/{} for {}", attempt - 1, retries, url);
            }

            let response = tokio::select! {
                response = self.client.get(url).send() => response,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };

            match response {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if expected_status == 0 || status == expected_status {
                        return Ok(HttpCheckOutcome {
                            status,
                            attempts: attempt,
                            elapsed: start.elapsed(),
                        });
                    }
                    last_error = Error::HttpStatus {
                        expected: expected_status,
                        actual: status,
                    }
                    .to_string();
                }
                Err(e) => last_error = e.to_string(),
            }
            tracing::debug!(attempt, "HTTP check against {} failed: {}", url, last_error);

            if attempt <= retries {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }

        Err(Error::Http {
            retries,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker() -> HttpChecker {
        HttpChecker::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let delay = Duration::from_millis(100);
        let outcome = checker()
            .check_with_retry(
                &format!("{}/health", server.uri()),
                200,
                2,
                delay,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.elapsed >= delay);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = checker()
            .check_with_retry(
                &server.uri(),
                200,
                1,
                Duration::from_millis(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "HTTP check failed after 1 retries: expected status 200, got 500"
        );
    }

    #[tokio::test]
    async fn test_zero_expected_status_accepts_anything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let outcome = checker()
            .check_with_retry(&server.uri(), 0, 0, Duration::ZERO, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, 404);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_retry_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = checker()
            .check_with_retry(&server.uri(), 200, 5, Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connection_errors_are_retried() {
        // Nothing listens on the port of a dropped listener
        let uri = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}", listener.local_addr().unwrap())
        };
        let err = checker()
            .check_with_retry(&uri, 200, 1, Duration::from_millis(10), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http { retries: 1, .. }));
    }
}
