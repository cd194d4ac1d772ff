//! Internet reachability probing and the publish-side network gate
//!
//! [`HttpReachability`] issues a GET against each configured endpoint and falls
//! back to a DNS lookup. [`NetworkGate`] is shared by every worker of a run:
//! while the probe fails, publishers wait on it, and the loss and recovery are
//! each logged (and broadcast) once no matter how many workers are waiting.

use crate::config::NetworkConfig;
use crate::control::RunControl;
use crate::error::Result;
use crate::types::Event;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Outcome of one connection test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    /// Whether any check succeeded
    pub reachable: bool,
    /// Endpoint (or `dns:<host>`) that answered first, if any
    pub via: Option<String>,
}

/// Answers "can we reach the outside world right now?"
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Run one probe
    async fn probe(&self) -> ConnectionReport;
}

/// GET each endpoint in order, then resolve a hostname
pub struct HttpReachability {
    client: reqwest::Client,
    endpoints: Vec<String>,
    dns_host: String,
}

impl HttpReachability {
    /// Build a probe from configuration
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoints: config.probe_endpoints.clone(),
            dns_host: config.dns_host.clone(),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachability {
    async fn probe(&self) -> ConnectionReport {
        for endpoint in &self.endpoints {
            match self.client.get(endpoint).send().await {
                Ok(response) if response.status().is_success() => {
                    return ConnectionReport {
                        reachable: true,
                        via: Some(endpoint.clone()),
                    };
                }
                Ok(response) => {
                    tracing::debug!(endpoint, status = %response.status(), "Probe endpoint answered with error status");
                }
                Err(e) => {
                    tracing::debug!(endpoint, error = %e, "Probe endpoint unreachable");
                }
            }
        }

        if self.dns_host.is_empty() {
            return ConnectionReport {
                reachable: false,
                via: None,
            };
        }

        let resolved = tokio::net::lookup_host((self.dns_host.as_str(), 443))
            .await
            .map(|mut addrs| addrs.next().is_some());
        match resolved {
            Ok(true) => ConnectionReport {
                reachable: true,
                via: Some(format!("dns:{}", self.dns_host)),
            },
            Ok(false) => ConnectionReport {
                reachable: false,
                via: None,
            },
            Err(e) => {
                tracing::debug!(host = %self.dns_host, error = %e, "DNS fallback failed");
                ConnectionReport {
                    reachable: false,
                    via: None,
                }
            }
        }
    }
}

/// Run-wide gate in front of every publish attempt
pub struct NetworkGate {
    probe: Arc<dyn ReachabilityProbe>,
    poll_interval: Duration,
    events: broadcast::Sender<Event>,
    down: AtomicBool,
}

impl NetworkGate {
    /// Create a gate that polls `probe` every `poll_interval` while down
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        poll_interval: Duration,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            probe,
            poll_interval,
            events,
            down: AtomicBool::new(false),
        }
    }

    /// Return once the network is reachable; fails only when the run is stopped
    pub async fn wait_until_reachable(&self, control: &RunControl) -> Result<()> {
        loop {
            control.checkpoint().await?;

            if self.probe.probe().await.reachable {
                if self.down.swap(false, Ordering::SeqCst) {
                    tracing::info!("Network restored, resuming uploads");
                    let _ = self.events.send(Event::NetworkRestored);
                }
                return Ok(());
            }

            if !self.down.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    poll_secs = self.poll_interval.as_secs_f64(),
                    "Network unreachable, waiting for connection"
                );
                let _ = self.events.send(Event::NetworkLost);
            }

            control.sleep(self.poll_interval).await?;
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Reports down for the first `failures` probes
    struct FlakyProbe {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReachabilityProbe for FlakyProbe {
        async fn probe(&self) -> ConnectionReport {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ConnectionReport {
                reachable: call >= self.failures,
                via: None,
            }
        }
    }

    fn config(endpoints: Vec<String>) -> NetworkConfig {
        NetworkConfig {
            probe_endpoints: endpoints,
            probe_timeout: Duration::from_secs(2),
            dns_host: String::new(),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_first_healthy_endpoint_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let up = format!("{}/up", server.uri());
        let probe =
            HttpReachability::new(&config(vec![format!("{}/down", server.uri()), up.clone()]))
                .unwrap();
        let report = probe.probe().await;
        assert!(report.reachable);
        assert_eq!(report.via, Some(up));
    }

    #[tokio::test]
    async fn test_all_endpoints_down_without_dns_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let probe = HttpReachability::new(&config(vec![server.uri()])).unwrap();
        assert!(!probe.probe().await.reachable);
    }

    #[tokio::test]
    async fn test_dns_fallback_when_no_endpoint_answers() {
        let mut config = config(Vec::new());
        config.dns_host = "localhost".to_string();
        let report = HttpReachability::new(&config).unwrap().probe().await;
        assert!(report.reachable);
        assert_eq!(report.via.as_deref(), Some("dns:localhost"));
    }

    #[tokio::test]
    async fn test_unresolvable_dns_host_is_unreachable() {
        let mut config = config(Vec::new());
        config.dns_host = "no-such-host.invalid".to_string();
        let report = HttpReachability::new(&config).unwrap().probe().await;
        assert!(!report.reachable);
        assert!(report.via.is_none());
    }

    #[tokio::test]
    async fn test_gate_waits_and_reports_once() {
        let (events, mut rx) = broadcast::channel(16);
        let gate = NetworkGate::new(
            Arc::new(FlakyProbe {
                failures: 3,
                calls: AtomicUsize::new(0),
            }),
            Duration::from_millis(5),
            events,
        );

        gate.wait_until_reachable(&RunControl::new()).await.unwrap();
        // Reachable again: a second wait passes without new events
        gate.wait_until_reachable(&RunControl::new()).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), Event::NetworkLost));
        assert!(matches!(rx.try_recv().unwrap(), Event::NetworkRestored));
        assert!(rx.try_recv().is_err(), "loss should be announced once");
    }

    #[tokio::test]
    async fn test_gate_returns_cancelled_on_stop() {
        let (events, _rx) = broadcast::channel(16);
        let gate = Arc::new(NetworkGate::new(
            Arc::new(FlakyProbe {
                failures: usize::MAX,
                calls: AtomicUsize::new(0),
            }),
            Duration::from_secs(30),
            events,
        ));
        let control = RunControl::new();

        let waiter = tokio::spawn({
            let gate = gate.clone();
            let control = control.clone();
            async move { gate.wait_until_reachable(&control).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        control.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
