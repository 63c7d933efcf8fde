//! Type-specific probe implementations (spec §4.4 "Status mapping").

use std::time::Duration;

use konsul_core::model::CheckStatus;

pub struct ProbeOutcome {
    pub status: CheckStatus,
    pub output: String,
}

impl ProbeOutcome {
    fn new(status: CheckStatus, output: impl Into<String>) -> Self {
        Self { status, output: output.into() }
    }
}

pub async fn probe_http(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    headers: &std::collections::HashMap<String, String>,
    timeout: Duration,
) -> ProbeOutcome {
    let http_method = match reqwest::Method::from_bytes(method.as_bytes()) {
        Ok(m) => m,
        Err(_) => return ProbeOutcome::new(CheckStatus::Critical, format!("invalid method {method}")),
    };
    let mut builder = client.request(http_method, url).timeout(timeout);
    for (k, v) in headers {
        builder = builder.header(k, v);
    }
    match builder.send().await {
        Ok(resp) => {
            let code = resp.status();
            if code.is_success() {
                ProbeOutcome::new(CheckStatus::Passing, format!("HTTP {code}"))
            } else if code.is_redirection() {
                ProbeOutcome::new(CheckStatus::Warning, format!("HTTP {code}"))
            } else {
                ProbeOutcome::new(CheckStatus::Critical, format!("HTTP {code}"))
            }
        }
        Err(err) if err.is_timeout() => ProbeOutcome::new(CheckStatus::Critical, "timed out"),
        Err(err) => ProbeOutcome::new(CheckStatus::Critical, err.to_string()),
    }
}

pub async fn probe_tcp(address: &str, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(address)).await {
        Ok(Ok(_)) => ProbeOutcome::new(CheckStatus::Passing, "connected"),
        Ok(Err(err)) => ProbeOutcome::new(CheckStatus::Critical, err.to_string()),
        Err(_) => ProbeOutcome::new(CheckStatus::Critical, "timed out"),
    }
}

pub async fn probe_grpc(target: &str, tls: bool, timeout: Duration) -> ProbeOutcome {
    use tonic_health::pb::health_client::HealthClient;
    use tonic_health::pb::HealthCheckRequest;

    let endpoint = if tls { format!("https://{target}") } else { format!("http://{target}") };
    let connect = async {
        let channel = tonic::transport::Endpoint::from_shared(endpoint)
            .map_err(|e| e.to_string())?
            .connect()
            .await
            .map_err(|e| e.to_string())?;
        let mut client = HealthClient::new(channel);
        client
            .check(HealthCheckRequest { service: String::new() })
            .await
            .map_err(|e| e.to_string())
    };
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(resp)) => match resp.into_inner().status {
            1 => ProbeOutcome::new(CheckStatus::Passing, "SERVING"),
            2 => ProbeOutcome::new(CheckStatus::Warning, "NOT_SERVING"),
            _ => ProbeOutcome::new(CheckStatus::Critical, "UNKNOWN"),
        },
        Ok(Err(msg)) => ProbeOutcome::new(CheckStatus::Critical, msg),
        Err(_) => ProbeOutcome::new(CheckStatus::Critical, "timed out"),
    }
}
