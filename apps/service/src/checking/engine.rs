use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use super::types::{Category, CheckConfig, CheckOutcome};
use crate::storage::models::Endpoint;

/// A single-endpoint check. Implementations hold no mutable shared state and
/// are safe to call from many tasks at once.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> CheckOutcome;
}

/// Layered protocol checker: DNS resolution, TLS validation, HTTP fetch,
/// content assertion. Evaluation short-circuits on the first stage that
/// fails, so a dead name never costs an HTTP round-trip.
pub struct ProtocolChecker {
    config: CheckConfig,
    client: reqwest::Client,
    resolver: TokioAsyncResolver,
    tls: tokio_native_tls::TlsConnector,
}

impl ProtocolChecker {
    pub fn new(config: CheckConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        // A cached answer would hide a real outage, so every call resolves
        // fresh. The resolver timeout bounds the DNS stage like every other
        // network suspension point.
        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.timeout = config.request_timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts);

        let tls = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);

        Ok(Self { config, client, resolver, tls })
    }

    async fn resolve(&self, host: &str) -> Result<(), String> {
        match self.resolver.lookup_ip(host).await {
            Ok(lookup) if lookup.iter().next().is_some() => Ok(()),
            Ok(_) => Err("No Answer".into()),
            Err(error) => Err(match error.kind() {
                ResolveErrorKind::NoRecordsFound {
                    response_code: ResponseCode::NXDomain, ..
                } => "Not Found".into(),
                ResolveErrorKind::NoRecordsFound { .. } => "No Answer".into(),
                ResolveErrorKind::Timeout => "Timeout".into(),
                _ => error.to_string(),
            }),
        }
    }

    /// TLS-only validation: connect to port 443, handshake against the
    /// platform trust store, require a peer certificate. Streams are dropped
    /// on every exit path.
    async fn handshake(&self, host: &str) -> Result<(), String> {
        let stream = match timeout(self.config.request_timeout, TcpStream::connect((host, 443)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => return Err(connect_error_detail(&error)),
            Err(_) => return Err("Connection Timeout".into()),
        };

        let tls_stream =
            match timeout(self.config.request_timeout, self.tls.connect(host, stream)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(error)) => return Err(tls_error_detail(&error)),
                Err(_) => return Err("Connection Timeout".into()),
            };

        match tls_stream.get_ref().peer_certificate() {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err("Invalid Certificate".into()),
            Err(error) => Err(error.to_string()),
        }
    }

    async fn fetch(&self, url: &str) -> Result<(u16, String), FetchFailure> {
        let response = self.client.get(url).send().await.map_err(|error| {
            if error.is_timeout() {
                FetchFailure::Timeout
            } else {
                FetchFailure::Transport(error)
            }
        })?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        // Best-effort decode; undecodable bytes are replaced, a mid-body
        // transport failure leaves an empty body rather than failing the
        // check.
        let body = response.text().await.unwrap_or_default();
        Ok((status.as_u16(), body))
    }

    fn classify_fetch_failure(&self, failure: FetchFailure, is_https: bool) -> CheckOutcome {
        if is_https && self.config.check_ssl {
            if let FetchFailure::Transport(error) = &failure {
                let detail = error_chain_text(error);
                if looks_like_tls_error(&detail) {
                    return CheckOutcome::fail(Category::Ssl, detail);
                }
            }
        }
        match failure {
            FetchFailure::Status(code) => CheckOutcome::fail(Category::Http, code.to_string()),
            FetchFailure::Timeout => CheckOutcome::fail(Category::Timeout, "Connection Timeout"),
            FetchFailure::Transport(error) => {
                CheckOutcome::fail(Category::Error, error_chain_text(&error))
            }
        }
    }
}

#[async_trait]
impl Checker for ProtocolChecker {
    async fn check(&self, endpoint: &Endpoint) -> CheckOutcome {
        let url = endpoint.url.as_str();
        let host = host_of(url);
        let is_https = url.starts_with("https://");

        if self.config.check_dns {
            if let Err(detail) = self.resolve(&host).await {
                return CheckOutcome::fail(Category::Dns, detail);
            }
        }

        let mut body = None;
        let mut status_code = String::from("200");

        if self.config.check_http {
            match self.fetch(url).await {
                Ok((code, text)) => {
                    status_code = code.to_string();
                    body = Some(text);
                }
                Err(failure) => return self.classify_fetch_failure(failure, is_https),
            }
        } else if self.config.check_ssl && is_https {
            // With HTTP checking enabled this handshake would be redundant;
            // TLS failures then surface through the fetch instead.
            if let Err(detail) = self.handshake(&host).await {
                return CheckOutcome::fail(Category::Ssl, detail);
            }
        }

        if self.config.check_content {
            if let (Some(expected), Some(body)) =
                (endpoint.check_string.as_deref(), body.as_deref())
            {
                if !expected.is_empty() && !body.contains(expected) {
                    return CheckOutcome::fail(Category::Content, "Not Found");
                }
            }
        }

        CheckOutcome::ok(status_code)
    }
}

enum FetchFailure {
    /// Response arrived with a non-2xx/3xx status.
    Status(u16),
    Timeout,
    Transport(reqwest::Error),
}

/// Hostname for the DNS and TLS stages. Malformed URLs degrade to a
/// best-effort split so a partially-checkable endpoint keeps being
/// monitored.
pub(crate) fn host_of(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            return host.to_string();
        }
    }
    let rest = url.split_once("//").map_or(url, |(_, rest)| rest);
    let host = rest.split('/').next().unwrap_or(rest);
    host.split(':').next().unwrap_or(host).to_string()
}

/// Approximate TLS-failure detection: matches any error text mentioning
/// "ssl" or "certificate", which can also catch unrelated messages that
/// happen to use those words.
fn looks_like_tls_error(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("ssl") || lower.contains("certificate")
}

fn connect_error_detail(error: &std::io::Error) -> String {
    match error.kind() {
        std::io::ErrorKind::ConnectionRefused => "Connection Refused".into(),
        std::io::ErrorKind::TimedOut => "Connection Timeout".into(),
        _ if error.to_string().contains("lookup") => "DNS Lookup Failed".into(),
        _ => error.to_string(),
    }
}

fn tls_error_detail(error: &native_tls::Error) -> String {
    let text = error_chain_text(error);
    if text.to_ascii_lowercase().contains("certificate") {
        "Certificate Verification Error".into()
    } else {
        text
    }
}

fn error_chain_text(error: &(dyn std::error::Error)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Serve one canned HTTP response on a loopback socket and return the
    /// URL pointing at it.
    async fn serve_once(response: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/")
    }

    fn http_only_config() -> CheckConfig {
        CheckConfig {
            check_dns: false,
            check_ssl: false,
            check_http: true,
            check_content: true,
            request_timeout: Duration::from_secs(2),
            ..CheckConfig::default()
        }
    }

    #[test]
    fn host_extraction_handles_well_formed_and_malformed_urls() {
        assert_eq!(host_of("https://example.test/path?q=1"), "example.test");
        assert_eq!(host_of("http://host.test:8080/x"), "host.test");
        assert_eq!(host_of("example.test/foo"), "example.test");
        assert_eq!(host_of("host.test:8080"), "host.test");
    }

    #[test]
    fn tls_error_heuristic_matches_expected_signatures() {
        assert!(looks_like_tls_error("invalid peer certificate: UnknownIssuer"));
        assert!(looks_like_tls_error("error:0A000086:SSL routines::certificate verify failed"));
        assert!(!looks_like_tls_error("connection reset by peer"));
    }

    #[tokio::test]
    async fn all_switches_disabled_is_unconditionally_ok() {
        let config = CheckConfig {
            check_dns: false,
            check_ssl: false,
            check_http: false,
            check_content: false,
            ..CheckConfig::default()
        };
        let checker = ProtocolChecker::new(config).unwrap();
        // Port 1 is never serving; no stage may touch the network.
        let endpoint = Endpoint::new("dark", "http://127.0.0.1:1/");

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Ok);
        assert_eq!(outcome.detail, "200");
    }

    #[tokio::test]
    async fn ssl_only_check_skips_plaintext_endpoints() {
        let config = CheckConfig {
            check_dns: false,
            check_ssl: true,
            check_http: false,
            check_content: false,
            ..CheckConfig::default()
        };
        let checker = ProtocolChecker::new(config).unwrap();
        let endpoint = Endpoint::new("plain", "http://127.0.0.1:1/");

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Ok);
        assert_eq!(outcome.detail, "200");
    }

    #[tokio::test]
    async fn ok_with_expected_content() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n<html>Example Domain</html>",
        )
        .await;
        let checker = ProtocolChecker::new(http_only_config()).unwrap();
        let endpoint = Endpoint::new("example", url).with_check_string("Example Domain");

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Ok);
        assert_eq!(outcome.detail, "200");
    }

    #[tokio::test]
    async fn missing_content_is_reported_as_string_category() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n<html>something else</html>",
        )
        .await;
        let checker = ProtocolChecker::new(http_only_config()).unwrap();
        let endpoint = Endpoint::new("example", url).with_check_string("Example Domain");

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Content);
        assert_eq!(outcome.detail, "Not Found");
    }

    #[tokio::test]
    async fn http_error_status_carries_the_code() {
        let url =
            serve_once("HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\nnothing here").await;
        let checker = ProtocolChecker::new(http_only_config()).unwrap();
        let endpoint = Endpoint::new("missing", url);

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Http);
        assert_eq!(outcome.detail, "404");
    }

    #[tokio::test]
    async fn unresponsive_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                // Hold the connection open without answering.
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            }
        });

        let config = CheckConfig {
            request_timeout: Duration::from_millis(200),
            ..http_only_config()
        };
        let checker = ProtocolChecker::new(config).unwrap();
        let endpoint = Endpoint::new("slow", format!("http://{addr}/"));

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Timeout);
        assert_eq!(outcome.detail, "Connection Timeout");
    }

    #[tokio::test]
    async fn failed_resolution_short_circuits_before_http() {
        let config = CheckConfig {
            check_dns: true,
            check_ssl: false,
            check_http: true,
            check_content: true,
            request_timeout: Duration::from_millis(500),
            ..CheckConfig::default()
        };
        let checker = ProtocolChecker::new(config).unwrap();
        // Reserved TLD; resolution can never succeed, so the outcome must be
        // classified at the DNS stage rather than as an HTTP failure.
        let endpoint = Endpoint::new("ghost", "http://no-such-host.invalid/");

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Dns);
    }

    #[tokio::test]
    async fn tls_garbage_is_reclassified_as_ssl() {
        // A plaintext HTTP server on an https URL: the handshake sees
        // garbage, and with both switches on the failure must surface as SSL
        // rather than a generic error.
        let url = serve_once("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nplaintext").await;
        let https_url = url.replacen("http://", "https://", 1);
        let config = CheckConfig {
            check_dns: false,
            check_ssl: true,
            check_http: true,
            check_content: false,
            request_timeout: Duration::from_secs(2),
            ..CheckConfig::default()
        };
        let checker = ProtocolChecker::new(config).unwrap();
        let endpoint = Endpoint::new("garbage", https_url);

        let outcome = checker.check(&endpoint).await;
        assert_eq!(outcome.category, Category::Ssl);
    }
}
