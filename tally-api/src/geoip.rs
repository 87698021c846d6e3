//! Country lookup for ingested IP addresses.
//!
//! Lookups are best effort: a failure is logged by the caller and the record
//! is stored with an empty country code.

use std::net::IpAddr;
use std::path::Path;

use thiserror::Error;

/// Errors from GeoIP loading or lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoIpError {
    #[error("no GeoIP database configured")]
    Unavailable,

    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("no country known for {0}")]
    NotFound(String),

    #[error("failed to read GeoIP table {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("GeoIP table line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// IP to ISO country code resolver.
pub trait GeoIpLookup: Send + Sync {
    fn country(&self, ip: &str) -> Result<String, GeoIpError>;
}

/// Resolver used when no table is configured. Every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeoIp;

impl GeoIpLookup for NoGeoIp {
    fn country(&self, _ip: &str) -> Result<String, GeoIpError> {
        Err(GeoIpError::Unavailable)
    }
}

#[derive(Debug, Clone)]
struct Network {
    addr: IpAddr,
    prefix: u8,
    country: String,
}

impl Network {
    fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                masked(u32::from(net) as u128, self.prefix, 32)
                    == masked(u32::from(ip) as u128, self.prefix, 32)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                masked(u128::from(net), self.prefix, 128) == masked(u128::from(ip), self.prefix, 128)
            }
            _ => false,
        }
    }
}

fn masked(bits: u128, prefix: u8, width: u8) -> u128 {
    if prefix == 0 {
        return 0;
    }
    let shift = width - prefix;
    (bits >> shift) << shift
}

/// In-memory CIDR table; the longest matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct CidrTable {
    // Sorted by prefix length, longest first.
    networks: Vec<Network>,
}

impl CidrTable {
    /// Parse `network,country_code` lines. Blank lines and `#` comments are skipped.
    pub fn parse(source: &str) -> Result<Self, GeoIpError> {
        let mut networks = Vec::new();
        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_err = |reason: String| GeoIpError::Parse {
                line: idx + 1,
                reason,
            };
            let (network, country) = line
                .split_once(',')
                .ok_or_else(|| parse_err("expected `network,country_code`".to_string()))?;
            let (addr, prefix) = match network.trim().split_once('/') {
                Some((addr, prefix)) => (addr, Some(prefix)),
                None => (network.trim(), None),
            };
            let addr: IpAddr = addr
                .parse()
                .map_err(|e: std::net::AddrParseError| parse_err(e.to_string()))?;
            let width = if addr.is_ipv4() { 32 } else { 128 };
            let prefix = match prefix {
                Some(p) => p
                    .parse::<u8>()
                    .ok()
                    .filter(|p| *p <= width)
                    .ok_or_else(|| parse_err(format!("invalid prefix length {p:?}")))?,
                None => width,
            };
            networks.push(Network {
                addr,
                prefix,
                country: country.trim().to_uppercase(),
            });
        }
        networks.sort_by(|a, b| b.prefix.cmp(&a.prefix));
        Ok(Self { networks })
    }

    /// Load a table from a CSV file.
    pub fn load(path: &Path) -> Result<Self, GeoIpError> {
        let source = std::fs::read_to_string(path).map_err(|e| GeoIpError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&source)
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

impl GeoIpLookup for CidrTable {
    fn country(&self, ip: &str) -> Result<String, GeoIpError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| GeoIpError::InvalidAddress(ip.to_string()))?;
        self.networks
            .iter()
            .find(|n| n.contains(addr))
            .map(|n| n.country.clone())
            .ok_or_else(|| GeoIpError::NotFound(ip.to_string()))
    }
}
