//! Port-Forwarding Fabric — host-to-container TCP proxies
//!
//! One accept loop per port mapping, each proxying accepted connections to
//! the container's IP with manual half-duplex buffer loops (grounded on
//! the bidirectional-copy shape of a container exec-based forwarder, but
//! splicing raw TCP instead of shelling into the runtime).

use crate::state::ContainerRecord;
use crate::{CoreError, Result};
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

const BUFFER_SIZE: usize = 32 * 1024;
const CONNECT_RETRIES: u32 = 5;
const CONNECT_RETRY_SPACING: Duration = Duration::from_millis(200);
const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_WAKE_INTERVAL: Duration = Duration::from_secs(1);

pub struct PortForwardingFabric {
    stop_tx: watch::Sender<bool>,
}

impl PortForwardingFabric {
    /// Start one accept loop per port mapping on `record`. Fails if any
    /// host port cannot be bound.
    pub async fn start(record: &ContainerRecord, stop_rx: watch::Receiver<bool>) -> Result<Self> {
        let (stop_tx, _) = watch::channel(false);
        let container_ip = discover_ip(record).await;

        for mapping in &record.ports {
            let listener = TcpListener::bind(("0.0.0.0", mapping.host))
                .await
                .map_err(|_| CoreError::PortInUse(mapping.host))?;

            probe_liveness(container_ip, mapping.container).await;

            let target_port = mapping.container;
            let mut inner_stop_rx = stop_tx.subscribe();
            let mut outer_stop_rx = stop_rx.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        _ = inner_stop_rx.changed() => {
                            if *inner_stop_rx.borrow() { break; }
                        }
                        _ = outer_stop_rx.changed() => {
                            if *outer_stop_rx.borrow() { break; }
                        }
                        _ = tokio::time::sleep(ACCEPT_WAKE_INTERVAL) => {}

                        accept_result = listener.accept() => {
                            match accept_result {
                                Ok((stream, _addr)) => {
                                    tokio::spawn(async move {
                                        if let Err(e) = forward_connection(stream, container_ip, target_port).await {
                                            tracing::debug!("forward error: {}", e);
                                        }
                                    });
                                }
                                Err(e) => tracing::warn!("accept error (continuing): {}", e),
                            }
                        }
                    }
                }
            });
        }

        Ok(Self { stop_tx })
    }

    /// Signal all accept loops to exit; they wake within one second.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// IP discovery policy, first match wins: non-loopback hostname address,
/// then a 172.* preference over any non-loopback, then 127.0.0.1.
async fn discover_ip(record: &ContainerRecord) -> IpAddr {
    if let Some(ip) = hostname_address(record).await {
        return ip;
    }
    if let Some(ip) = interface_address(record).await {
        return ip;
    }
    tracing::warn!(
        "could not determine container IP for {}, forwarding will likely fail",
        record.id
    );
    IpAddr::from([127, 0, 0, 1])
}

async fn hostname_address(record: &ContainerRecord) -> Option<IpAddr> {
    let request = lockbox_backend::ExecRequest::new("hostname -i".to_string());
    let backend = lockbox_backend::create_backend();
    let result = backend.exec(&record.id, &record.root, &request).await.ok()?;
    result
        .output
        .split_whitespace()
        .find_map(|tok| tok.parse::<IpAddr>().ok())
        .filter(|ip| !ip.is_loopback())
}

async fn interface_address(record: &ContainerRecord) -> Option<IpAddr> {
    let request = lockbox_backend::ExecRequest::new("ip -4 addr show".to_string());
    let backend = lockbox_backend::create_backend();
    let result = backend.exec(&record.id, &record.root, &request).await.ok()?;

    let candidates: Vec<IpAddr> = result
        .output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.starts_with("inet ") {
                return None;
            }
            let addr = line.split_whitespace().nth(1)?;
            let ip_str = addr.split('/').next()?;
            ip_str.parse::<IpAddr>().ok()
        })
        .filter(|ip| !ip.is_loopback())
        .collect();

    candidates
        .iter()
        .find(|ip| matches!(ip, IpAddr::V4(v4) if v4.octets()[0] == 172))
        .copied()
        .or_else(|| candidates.into_iter().next())
}

async fn probe_liveness(ip: IpAddr, port: u16) {
    let deadline = tokio::time::Instant::now() + LIVENESS_PROBE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if TcpStream::connect((ip, port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn connect_with_retry(ip: IpAddr, port: u16) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for _ in 0..CONNECT_RETRIES {
        match TcpStream::connect((ip, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(CONNECT_RETRY_SPACING).await;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect retries exhausted")))
}

async fn forward_connection(client: TcpStream, target_ip: IpAddr, target_port: u16) -> std::io::Result<()> {
    let target = connect_with_retry(target_ip, target_port).await?;

    let (mut client_read, mut client_write) = client.into_split();
    let (mut target_read, mut target_write) = target.into_split();

    let client_to_target = tokio::spawn(async move { splice(&mut client_read, &mut target_write).await });
    let target_to_client = tokio::spawn(async move { splice(&mut target_read, &mut client_write).await });

    tokio::select! {
        _ = client_to_target => {}
        _ = target_to_client => {}
    }

    Ok(())
}

/// Half-duplex forwarder with a 32 KiB buffer.
async fn splice(
    reader: &mut (impl AsyncReadExt + Unpin),
    writer: &mut (impl AsyncWriteExt + Unpin),
) -> std::io::Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_address_prefers_172_range() {
        let output = "\
inet 10.0.0.5/24 scope global eth0
inet 172.20.0.4/16 scope global eth1
inet 127.0.0.1/8 scope host lo";
        let candidates: Vec<IpAddr> = output
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if !line.starts_with("inet ") {
                    return None;
                }
                let addr = line.split_whitespace().nth(1)?;
                let ip_str = addr.split('/').next()?;
                ip_str.parse::<IpAddr>().ok()
            })
            .filter(|ip| !ip.is_loopback())
            .collect();

        let chosen = candidates
            .iter()
            .find(|ip| matches!(ip, IpAddr::V4(v4) if v4.octets()[0] == 172))
            .copied()
            .or_else(|| candidates.into_iter().next());

        assert_eq!(chosen, Some(IpAddr::from([172, 20, 0, 4])));
    }

    #[tokio::test]
    async fn test_connect_with_retry_fails_after_exhausting_attempts() {
        // Port 1 on loopback should reliably refuse
        let result = connect_with_retry(IpAddr::from([127, 0, 0, 1]), 1).await;
        assert!(result.is_err());
    }
}
