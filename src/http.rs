//! HTTP execution: one logical request per generated input.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect;
use url::Url;

use crate::error::Error;

/// Everything the fuzzing loops need to know about one HTTP exchange.
#[derive(Debug, Clone)]
pub struct FuzzResponse {
    status: u16,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    url: String,
}

impl FuzzResponse {
    pub fn new<S: Into<String>>(
        status: u16,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
        url: S,
    ) -> Self {
        Self {
            status,
            body,
            headers,
            url: url.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The URL the request was sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Declared content length, if the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse().ok())
    }

    /// Coarse novelty fingerprint for the mutation loop: the status code
    /// paired with the declared content length, or with the header count when
    /// no length was sent.
    pub fn coverage_fingerprint(&self) -> String {
        match self.content_length() {
            Some(len) => format!("{}-{}", self.status, len),
            None => format!("{}-h{}", self.status, self.headers.len()),
        }
    }
}

/// The capability the core consumes to test an input: one logical GET per
/// call, redirects are not followed, a per-request timeout bounds wall time,
/// transport errors are reported, not retried.
pub trait Executor: Send + Sync {
    fn execute(&self, input: &str) -> Result<FuzzResponse, Error>;
}

/// [`Executor`] backed by a blocking reqwest client. Relative inputs are
/// resolved against the target URL.
pub struct HttpExecutor {
    client: Client,
    target: Url,
}

impl HttpExecutor {
    pub fn new(target: &str, timeout: Duration) -> Result<Self, Error> {
        let target = Url::parse(target)
            .map_err(|e| Error::Input(format!("invalid target URL '{}': {}", target, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { client, target })
    }

    fn resolve(&self, input: &str) -> Result<Url, Error> {
        match Url::parse(input) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .target
                .join(input)
                .map_err(|e| Error::Input(format!("invalid input '{}': {}", input, e))),
            Err(e) => Err(Error::Input(format!("invalid input '{}': {}", input, e))),
        }
    }
}

impl Executor for HttpExecutor {
    fn execute(&self, input: &str) -> Result<FuzzResponse, Error> {
        let url = self.resolve(input)?;

        let response = self.client.get(url).send()?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes()?.to_vec();

        Ok(FuzzResponse::new(status, body, headers, final_url))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{Executor, FuzzResponse};
    use crate::error::Error;

    /// Executor that answers every input with the same canned response.
    pub struct StaticExecutor {
        pub status: u16,
        pub body: &'static [u8],
    }

    impl Executor for StaticExecutor {
        fn execute(&self, input: &str) -> Result<FuzzResponse, Error> {
            let headers = vec![("content-length".to_string(), self.body.len().to_string())];
            Ok(FuzzResponse::new(self.status, self.body.to_vec(), headers, input))
        }
    }

    /// Executor whose responses grow by one byte per call, so every response
    /// carries a fresh coverage fingerprint.
    #[derive(Default)]
    pub struct CountingExecutor {
        calls: AtomicUsize,
    }

    impl Executor for CountingExecutor {
        fn execute(&self, input: &str) -> Result<FuzzResponse, Error> {
            let call = self.calls.fetch_add(1, Ordering::Relaxed);
            let body = vec![b'x'; call + 1];
            let headers = vec![("content-length".to_string(), body.len().to_string())];
            Ok(FuzzResponse::new(200, body, headers, input))
        }
    }

    /// Executor that fails every request.
    pub struct FailingExecutor;

    impl Executor for FailingExecutor {
        fn execute(&self, input: &str) -> Result<FuzzResponse, Error> {
            Err(Error::Input(format!("unreachable: {}", input)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_uses_content_length() {
        let response = FuzzResponse::new(
            200,
            b"hello".to_vec(),
            vec![("Content-Length".to_string(), "5".to_string())],
            "http://h/a",
        );
        assert_eq!(response.coverage_fingerprint(), "200-5");
    }

    #[test]
    fn test_fingerprint_falls_back_to_header_count() {
        let response = FuzzResponse::new(
            404,
            Vec::new(),
            vec![
                ("server".to_string(), "x".to_string()),
                ("date".to_string(), "y".to_string()),
            ],
            "http://h/a",
        );
        assert_eq!(response.coverage_fingerprint(), "404-h2");
    }

    #[test]
    fn test_success_range() {
        assert!(FuzzResponse::new(204, Vec::new(), Vec::new(), "u").is_success());
        assert!(!FuzzResponse::new(302, Vec::new(), Vec::new(), "u").is_success());
        assert!(!FuzzResponse::new(500, Vec::new(), Vec::new(), "u").is_success());
    }

    #[test]
    fn test_resolve_relative_inputs() {
        let executor = HttpExecutor::new("http://localhost:8000/app", Duration::from_secs(2)).unwrap();

        let absolute = executor.resolve("http://other/x").unwrap();
        assert_eq!(absolute.as_str(), "http://other/x");

        let relative = executor.resolve("/login?user=a").unwrap();
        assert_eq!(relative.as_str(), "http://localhost:8000/login?user=a");
    }

    #[test]
    fn test_invalid_target_is_an_input_error() {
        let result = HttpExecutor::new("not a url", Duration::from_secs(2));
        assert!(matches!(result, Err(Error::Input(_))));
    }
}
