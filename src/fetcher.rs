use crate::referer::FALLBACK_REFERER;
use crate::util::{ProxyError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Request, StatusCode, Uri};
use hyper::client::HttpConnector;
use hyper::{body::to_bytes, Body, Client as HyperClient};
use hyper_rustls::HttpsConnector;
use log::{debug, warn};
use std::time::Duration;
use url::Url;

/// fixed browser-like identity presented to origins.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134 Safari/537.36";
const ACCEPT: &str = "image/*,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// one upstream attempt's outcome. non-2xx statuses are returned here, not
/// as errors, so the retry policy can inspect them.
#[derive(Debug)]
pub struct FetchedImage {
    pub status: StatusCode,
    pub body: Bytes,
}

/// seam between the pipeline and the network. tests substitute a scripted
/// implementation to drive the retry policy without sockets.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, target: &Url, referer: &str) -> Result<FetchedImage>;
}

/// hyper-based fetcher with tls support and a per-attempt deadline.
pub struct HttpFetcher {
    client: HyperClient<HttpsConnector<HttpConnector>>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: HyperClient::builder().build(https),
            timeout,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, target: &Url, referer: &str) -> Result<FetchedImage> {
        let uri: Uri = target.as_str().parse()?;

        let request = Request::get(uri)
            .header(header::REFERER, referer)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, ACCEPT)
            .header(header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .body(Body::empty())?;

        debug!("fetching {} with referer {}", target, referer);

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ProxyError::Internal(format!("fetch of {} timed out", target)))??;

        let status = response.status();
        let body = to_bytes(response.into_body()).await?;

        Ok(FetchedImage { status, body })
    }
}

/// retry policy as an explicit two-attempt state machine: the first attempt
/// uses the resolved referer; a 403 on that attempt triggers exactly one
/// retry with the fixed fallback referer. any other non-2xx status, on
/// either attempt, is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    FallbackRetry,
}

pub async fn fetch_with_fallback(
    fetcher: &dyn ImageFetcher,
    target: &Url,
    referer: &str,
) -> Result<FetchedImage> {
    let mut attempt = Attempt::Initial;

    loop {
        let attempt_referer = match attempt {
            Attempt::Initial => referer,
            Attempt::FallbackRetry => FALLBACK_REFERER,
        };

        let fetched = fetcher.fetch(target, attempt_referer).await?;

        if fetched.status == StatusCode::FORBIDDEN && attempt == Attempt::Initial {
            warn!(
                "{} returned 403, retrying with fallback referer {}",
                target, FALLBACK_REFERER
            );
            attempt = Attempt::FallbackRetry;
            continue;
        }

        if !fetched.status.is_success() {
            return Err(ProxyError::Upstream(fetched.status));
        }

        return Ok(fetched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedFetcher {
        responses: Mutex<VecDeque<FetchedImage>>,
        referers: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<FetchedImage>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                referers: Mutex::new(Vec::new()),
            }
        }

        fn seen_referers(&self) -> Vec<String> {
            self.referers.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageFetcher for ScriptedFetcher {
        async fn fetch(&self, _target: &Url, referer: &str) -> Result<FetchedImage> {
            self.referers.lock().unwrap().push(referer.to_string());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left"))
        }
    }

    fn ok(body: &'static [u8]) -> FetchedImage {
        FetchedImage {
            status: StatusCode::OK,
            body: Bytes::from_static(body),
        }
    }

    fn status(status: StatusCode) -> FetchedImage {
        FetchedImage {
            status,
            body: Bytes::new(),
        }
    }

    fn target() -> Url {
        Url::parse("https://images.example.com/pic.png").unwrap()
    }

    #[tokio::test]
    async fn success_on_first_attempt_uses_resolved_referer() {
        let fetcher = ScriptedFetcher::new(vec![ok(b"img")]);
        let fetched = fetch_with_fallback(&fetcher, &target(), "https://example.com/")
            .await
            .expect("success");
        assert_eq!(fetched.body, Bytes::from_static(b"img"));
        assert_eq!(fetcher.seen_referers(), vec!["https://example.com/"]);
    }

    #[tokio::test]
    async fn forbidden_triggers_exactly_one_fallback_retry() {
        let fetcher = ScriptedFetcher::new(vec![status(StatusCode::FORBIDDEN), ok(b"img")]);
        let fetched = fetch_with_fallback(&fetcher, &target(), "https://example.com/")
            .await
            .expect("retry should succeed");
        assert_eq!(fetched.body, Bytes::from_static(b"img"));
        assert_eq!(
            fetcher.seen_referers(),
            vec!["https://example.com/", FALLBACK_REFERER]
        );
    }

    #[tokio::test]
    async fn forbidden_twice_is_terminal() {
        let fetcher = ScriptedFetcher::new(vec![
            status(StatusCode::FORBIDDEN),
            status(StatusCode::FORBIDDEN),
        ]);
        let err = fetch_with_fallback(&fetcher, &target(), "https://example.com/")
            .await
            .expect_err("second 403 is terminal");
        assert!(matches!(
            err,
            ProxyError::Upstream(StatusCode::FORBIDDEN)
        ));
        assert_eq!(fetcher.seen_referers().len(), 2);
    }

    #[tokio::test]
    async fn non_forbidden_error_is_never_retried() {
        let fetcher = ScriptedFetcher::new(vec![status(StatusCode::NOT_FOUND)]);
        let err = fetch_with_fallback(&fetcher, &target(), "https://example.com/")
            .await
            .expect_err("404 is terminal");
        assert!(matches!(err, ProxyError::Upstream(StatusCode::NOT_FOUND)));
        assert_eq!(fetcher.seen_referers().len(), 1);
    }
}
