//! Bounded HTTP transport
//!
//! Every remote GET and POST goes through [`Transport`]. Bodies are read
//! chunk by chunk and abandoned as soon as they exceed the caller's limit.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::FederationConfig;
use crate::error::AppError;
use crate::metrics::{FEDERATION_REQUEST_DURATION_SECONDS, FEDERATION_REQUESTS_TOTAL};

/// Status and bounded body of a remote response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with the given Accept header, reading at most `max_size` bytes.
    async fn get(&self, url: &str, accept: &str, max_size: usize)
    -> Result<TransportResponse, AppError>;

    /// POST `body` with extra headers, reading at most `max_size` bytes of the reply.
    async fn post(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        max_size: usize,
    ) -> Result<TransportResponse, AppError>;
}

// =============================================================================
// Outbound host guard
// =============================================================================

pub(crate) fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

pub(crate) fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let normalized = host.trim_end_matches('.').to_ascii_lowercase();

    let mut resolved_any = false;
    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| AppError::Transport(format!("Failed to resolve {}: {}", host, e)))?;

    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Forbidden);
        }
    }

    if !resolved_any {
        return Err(AppError::Transport(format!("No DNS records for {}", host)));
    }

    Ok(())
}

/// Parse and vet an outbound URL; only http(s) to public hosts unless private hosts are allowed.
async fn check_destination(url: &str, allow_private_hosts: bool) -> Result<url::Url, AppError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| AppError::Transport(format!("Invalid URL {}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::Transport(format!(
                "Unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Transport(format!("Missing host in URL: {}", url)))?
        .to_string();

    if !allow_private_hosts {
        if is_disallowed_host(&host) {
            return Err(AppError::Forbidden);
        }
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| AppError::Transport(format!("Missing port in URL: {}", url)))?;
        validate_resolved_host_ips(&host, port).await?;
    }

    Ok(parsed)
}

// =============================================================================
// reqwest transport
// =============================================================================

/// Production transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    allow_private_hosts: bool,
}

impl HttpTransport {
    pub fn new(config: &FederationConfig) -> Result<Self, AppError> {
        let allow_private_hosts = config.allow_private_hosts;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= 5 {
                attempt.error("too many redirects")
            } else if !allow_private_hosts
                && attempt.url().host_str().map(is_disallowed_host).unwrap_or(true)
            {
                attempt.error("redirect to disallowed host")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .redirect(redirect)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            allow_private_hosts,
        })
    }

    async fn send(
        &self,
        direction: &str,
        request: reqwest::RequestBuilder,
        max_size: usize,
    ) -> Result<TransportResponse, AppError> {
        let timer = FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&[direction])
            .start_timer();

        let result = async {
            let response = request
                .send()
                .await
                .map_err(|e| AppError::Transport(e.to_string()))?;
            let status = response.status().as_u16();
            let body = read_bounded(response, max_size).await?;
            Ok(TransportResponse { status, body })
        }
        .await;

        timer.observe_duration();
        let status_label = match &result {
            Ok(response) => response.status.to_string(),
            Err(_) => "error".to_string(),
        };
        FEDERATION_REQUESTS_TOTAL
            .with_label_values(&[direction, &status_label])
            .inc();

        result
    }
}

/// Read a response body, failing once it grows past `max_size`.
async fn read_bounded(mut response: reqwest::Response, max_size: usize) -> Result<Vec<u8>, AppError> {
    if let Some(length) = response.content_length() {
        if length > max_size as u64 {
            return Err(AppError::PayloadTooLarge { limit: max_size });
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?
    {
        if body.len() + chunk.len() > max_size {
            return Err(AppError::PayloadTooLarge { limit: max_size });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        accept: &str,
        max_size: usize,
    ) -> Result<TransportResponse, AppError> {
        let parsed = check_destination(url, self.allow_private_hosts).await?;
        let request = self.client.get(parsed).header("Accept", accept);
        self.send("outbound_get", request, max_size).await
    }

    async fn post(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        max_size: usize,
    ) -> Result<TransportResponse, AppError> {
        let parsed = check_destination(url, self.allow_private_hosts).await?;
        let mut request = self.client.post(parsed);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        self.send("outbound_post", request.body(body), max_size)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallowed_hosts() {
        assert!(is_disallowed_host("localhost"));
        assert!(is_disallowed_host("api.localhost"));
        assert!(is_disallowed_host("192.168.1.10"));
        assert!(is_disallowed_host("[::1]"));
        assert!(!is_disallowed_host("example.com"));
        assert!(!is_disallowed_host("93.184.216.34"));
    }

    #[tokio::test]
    async fn check_destination_rejects_private_targets() {
        match check_destination("http://127.0.0.1/actor/alice", false).await {
            Err(AppError::Forbidden) => {}
            other => panic!("expected forbidden for loopback, got: {other:?}"),
        }
        assert!(
            check_destination("http://127.0.0.1/actor/alice", true)
                .await
                .is_ok()
        );
        assert!(matches!(
            check_destination("ftp://example.com/file", true).await,
            Err(AppError::Transport(_))
        ));
    }
}
