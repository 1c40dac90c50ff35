use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::extract::ConnectInfo;
use axum::http::Request;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpRangeError {
    #[error("ip range {0:?} is not in \"start-end\" form")]
    Format(String),
    #[error("invalid ip address {0:?}")]
    Address(String),
}

/// Inclusive range of addresses.
///
/// IPv4 addresses are compared in their IPv4-mapped IPv6 form, so a range may
/// mix both families the same way a 16-byte comparison would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl IpRange {
    pub fn new(start: IpAddr, end: IpAddr) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = octets(ip);
        ip >= octets(self.start) && ip <= octets(self.end)
    }
}

fn octets(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| IpRangeError::Format(s.to_string()))?;

        let parse = |ip: &str| {
            ip.trim()
                .parse::<IpAddr>()
                .map_err(|_| IpRangeError::Address(ip.trim().to_string()))
        };

        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

/// Comma separated list of ranges, e.g.
/// `"192.168.10.1-192.168.10.10,192.168.90.1-192.168.90.10"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpRanges(Vec<IpRange>);

impl IpRanges {
    pub fn new(ranges: Vec<IpRange>) -> Self {
        Self(ranges)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|range| range.contains(ip))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpRange> {
        self.0.iter()
    }
}

impl FromStr for IpRanges {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|range| !range.is_empty())
            .map(IpRange::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// Best guess at the address of the client that sent `req`.
///
/// `X-Real-IP` wins, then the first non-empty `X-Forwarded-For` entry, then
/// the peer address when the server was started with connect info.
pub fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    let headers = req.headers();

    let forwarded = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip())
    })
}
