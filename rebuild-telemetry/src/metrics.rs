use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Installs the global Prometheus recorder with a scrape endpoint on `[::]:{port}/metrics`.
///
/// The recorder is global, so this must be called at most once per process.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port))
        .install()?;

    Ok(())
}
