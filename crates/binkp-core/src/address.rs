//! FTN addresses and dialable host:port targets.
//!
//! An FTN address is the four-integer node identity `zone:net/node.point`,
//! optionally qualified with an `@domain` label. The point defaults to 0 and
//! is omitted when rendering a node address.

use std::fmt;
use std::str::FromStr;

use crate::DEFAULT_PORT;
use crate::error::AddressError;

/// A 4-D FidoNet-style address with optional domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FtnAddress {
    /// Zone number.
    pub zone: u16,
    /// Net number.
    pub net: u16,
    /// Node number.
    pub node: u16,
    /// Point number; 0 for node addresses.
    pub point: u16,
    /// Optional domain label (`fidonet`, `fsxnet`, ...).
    pub domain: Option<String>,
}

impl FtnAddress {
    /// Build a node address (point 0, no domain).
    #[must_use]
    pub fn node(zone: u16, net: u16, node: u16) -> Self {
        Self {
            zone,
            net,
            node,
            point: 0,
            domain: None,
        }
    }

    /// True when `other` names the same node, ignoring the domain label.
    #[must_use]
    pub fn same_node(&self, other: &FtnAddress) -> bool {
        self.zone == other.zone
            && self.net == other.net
            && self.node == other.node
            && self.point == other.point
    }
}

fn component(raw: &str, input: &str) -> Result<u16, AddressError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AddressError::Syntax(input.to_owned()));
    }
    raw.parse::<u16>()
        .map_err(|_| AddressError::Range(input.to_owned()))
}

impl FromStr for FtnAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (body, domain) = match input.split_once('@') {
            Some((body, domain)) => {
                if domain.is_empty() {
                    return Err(AddressError::Syntax(input.to_owned()));
                }
                (body, Some(domain.to_owned()))
            }
            None => (input, None),
        };

        let (zone, rest) = body
            .split_once(':')
            .ok_or_else(|| AddressError::Syntax(input.to_owned()))?;
        let (net, rest) = rest
            .split_once('/')
            .ok_or_else(|| AddressError::Syntax(input.to_owned()))?;
        let (node, point) = match rest.split_once('.') {
            Some((node, point)) => (node, Some(point)),
            None => (rest, None),
        };

        Ok(Self {
            zone: component(zone, input)?,
            net: component(net, input)?,
            node: component(node, input)?,
            point: match point {
                Some(p) => component(p, input)?,
                None => 0,
            },
            domain,
        })
    }
}

impl fmt::Display for FtnAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.zone, self.net, self.node)?;
        if self.point != 0 {
            write!(f, ".{}", self.point)?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "@{domain}")?;
        }
        Ok(())
    }
}

/// A dialable target: hostname or literal address plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    /// Hostname, IPv4 literal, or bare IPv6 literal (no brackets).
    pub host: String,
    /// TCP port, defaulted to [`DEFAULT_PORT`] when absent.
    pub port: u16,
}

impl HostPort {
    /// Parse one of the three accepted shells:
    ///
    /// - bracketed IPv6: `[::1]:24554` or `[::1]`
    /// - FTN-prefixed: `1:2/3.4@example.org[:port]` (the FTN part is
    ///   discarded; only the part after `@` is resolved)
    /// - bare: `host[:port]`
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressError::Syntax(input.to_owned()))?;
            if host.is_empty() {
                return Err(AddressError::Syntax(input.to_owned()));
            }
            let port = match tail {
                "" => DEFAULT_PORT,
                t => {
                    let t = t
                        .strip_prefix(':')
                        .ok_or_else(|| AddressError::Syntax(input.to_owned()))?;
                    parse_port(t, input)?
                }
            };
            return Ok(Self {
                host: host.to_owned(),
                port,
            });
        }

        if let Some((_, host)) = input.split_once('@') {
            return Self::parse(host);
        }

        match input.split_once(':') {
            // More than one colon means a bare IPv6 literal, not host:port.
            Some((_, rest)) if rest.contains(':') => Ok(Self {
                host: input.to_owned(),
                port: DEFAULT_PORT,
            }),
            Some((host, port)) if !host.is_empty() => Ok(Self {
                host: host.to_owned(),
                port: parse_port(port, input)?,
            }),
            Some(_) => Err(AddressError::Syntax(input.to_owned())),
            None if input.is_empty() => Err(AddressError::Syntax(input.to_owned())),
            None => Ok(Self {
                host: input.to_owned(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

fn parse_port(raw: &str, input: &str) -> Result<u16, AddressError> {
    let n: u32 = raw
        .parse()
        .map_err(|_| AddressError::Port(input.to_owned()))?;
    if n == 0 || n > u32::from(u16::MAX) {
        return Err(AddressError::Port(input.to_owned()));
    }
    Ok(n as u16)
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
