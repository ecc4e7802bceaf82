use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::message::{TxtResponse, build_txt_query, parse_txt_response};
use super::{RCODE_NXDOMAIN, TxtLookup};
use crate::error::DnsError;

/// Per-server budget for one query, TCP retry included
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub const RESOLV_CONF: &str = "/etc/resolv.conf";

pub const DEFAULT_NAMESERVERS: [SocketAddr; 2] = [
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53),
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53),
];

/// Extract `nameserver` entries from resolv.conf contents
pub fn parse_resolv_conf(contents: &str) -> Vec<SocketAddr> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("nameserver"), Some(addr)) => {
                    // Drop an IPv6 zone id, tokio cannot use it here
                    let addr = addr.split('%').next().unwrap_or(addr);
                    addr.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 53))
                }
                _ => None,
            }
        })
        .collect()
}

/// Sends TXT queries to a fixed list of recursive nameservers
#[derive(Debug, Clone)]
pub struct DnsTxtClient {
    nameservers: Vec<SocketAddr>,
    timeout: Duration,
}

impl DnsTxtClient {
    pub fn new(nameservers: Vec<SocketAddr>) -> Self {
        Self {
            nameservers,
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Use the system resolver configuration, or public resolvers if it has
    /// no usable entries.
    pub fn from_system() -> Self {
        let nameservers = match std::fs::read_to_string(RESOLV_CONF) {
            Ok(contents) => parse_resolv_conf(&contents),
            Err(e) => {
                debug!("Cannot read {}: {}", RESOLV_CONF, e);
                Vec::new()
            }
        };

        if nameservers.is_empty() {
            debug!("No nameservers configured, using public defaults");
            Self::new(DEFAULT_NAMESERVERS.to_vec())
        } else {
            Self::new(nameservers)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn nameservers(&self) -> &[SocketAddr] {
        &self.nameservers
    }

    /// Query each nameserver in turn until one gives a usable answer.
    pub async fn query(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let id = rand::random::<u16>();
        let query_bytes = build_txt_query(id, name)?;

        let mut last_error = None;
        for &server in &self.nameservers {
            trace!("Sending {} byte TXT query for {} to {}", query_bytes.len(), name, server);

            let result = timeout(self.timeout, self.query_server(&query_bytes, id, server))
                .await
                .unwrap_or(Err(DnsError::Timeout));

            match result {
                Ok(response) if response.rcode == RCODE_NXDOMAIN => {
                    debug!("{} does not exist", name);
                    return Ok(Vec::new());
                }
                Ok(response) if response.rcode != 0 => {
                    debug!("{} answered rcode {}", server, response.rcode);
                    last_error = Some(DnsError::ServerFailure(response.rcode));
                }
                Ok(response) => {
                    debug!("{} returned {} TXT records", server, response.records.len());
                    return Ok(response.records);
                }
                Err(e) => {
                    debug!("Query to {} failed: {}", server, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DnsError::Io("no nameservers configured".to_string())))
    }

    /// UDP first, TCP if the answer was truncated
    async fn query_server(
        &self,
        query_bytes: &[u8],
        id: u16,
        server: SocketAddr,
    ) -> Result<TxtResponse, DnsError> {
        let response = self.send_udp_query(query_bytes, server).await?;
        let response = if response.truncated {
            debug!("UDP response truncated, retrying with TCP");
            self.send_tcp_query(query_bytes, server).await?
        } else {
            response
        };

        if response.id != id {
            return Err(DnsError::InvalidPacket(format!(
                "response id {} does not match query id {}",
                response.id, id
            )));
        }
        Ok(response)
    }

    async fn send_udp_query(
        &self,
        query_bytes: &[u8],
        server: SocketAddr,
    ) -> Result<TxtResponse, DnsError> {
        let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = vec![0u8; 4096];
        let response_len = socket.recv(&mut response_buf).await?;
        trace!(
            "Raw UDP response data ({} bytes): {:02x?}",
            response_len,
            &response_buf[..response_len.min(64)]
        );

        parse_txt_response(&response_buf[..response_len])
    }

    async fn send_tcp_query(
        &self,
        query_bytes: &[u8],
        server: SocketAddr,
    ) -> Result<TxtResponse, DnsError> {
        let mut stream = TcpStream::connect(server).await?;

        let query_length = query_bytes.len() as u16;
        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(query_bytes).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0; response_length];
        stream.read_exact(&mut response_buf).await?;
        trace!(
            "Raw TCP response data ({} bytes): {:02x?}",
            response_length,
            &response_buf[..response_length.min(64)]
        );

        parse_txt_response(&response_buf)
    }
}

#[async_trait]
impl TxtLookup for DnsTxtClient {
    async fn lookup_txt(&self, name: &str) -> Vec<String> {
        match self.query(name).await {
            Ok(records) => records,
            Err(e) => {
                warn!("TXT lookup for {} failed: {}", name, e);
                Vec::new()
            }
        }
    }
}
