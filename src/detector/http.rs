//! HTTP readiness probing.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Failure to obtain any response from a readiness probe.
pub type ProbeError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by [`HttpProber::head`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeResponse, ProbeError>> + Send + 'a>>;

/// The parts of a probe response a detector can inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl ProbeResponse {
    /// A response with `status` and no headers.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }
}

/// Issues the lightweight requests used for HTTP readiness polling.
pub trait HttpProber: Send + Sync {
    /// Send a `HEAD` request to `url`.
    fn head(&self, url: &str) -> ProbeFuture<'_>;
}

impl HttpProber for reqwest::Client {
    fn head(&self, url: &str) -> ProbeFuture<'_> {
        let request = Self::head(self, url);
        Box::pin(async move {
            let response = request.send().await?;
            Ok(ProbeResponse {
                status: response.status(),
                headers: response.headers().clone(),
            })
        })
    }
}

type ResponsePredicate = dyn Fn(&ProbeResponse) -> bool + Send + Sync;

/// Decides from a probe response whether the service is ready.
#[derive(Clone)]
pub struct HttpDetector(Arc<ResponsePredicate>);

impl HttpDetector {
    /// Wrap a predicate over the probe response.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ProbeResponse) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Ready once the probe answers with exactly `expected`.
    #[must_use]
    pub fn status(expected: StatusCode) -> Self {
        Self::new(move |response| response.status == expected)
    }

    /// Ready once the probe answers with any 2xx status.
    #[must_use]
    pub fn success() -> Self {
        Self::new(|response| response.status.is_success())
    }

    /// Apply the predicate.
    #[must_use]
    pub fn is_ready(&self, response: &ProbeResponse) -> bool {
        (self.0)(response)
    }
}

impl fmt::Debug for HttpDetector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("HttpDetector(..)")
    }
}
