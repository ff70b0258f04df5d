//! jNode-compatible configuration.
//!
//! The on-disk format is `key = value` text with `#` comments, using the
//! jNode property names (`ftn.primary`, `station.name`, `binkp.port`, ...).
//! Malformed numeric and boolean values silently fall back to their
//! defaults, and unknown keys are ignored, matching what jNode installs
//! tolerate. Links replace jNode's SQL `links` table with one line each:
//!
//! ```text
//! link.2:5020/1042 = binkp.example.org:24554,secret
//! ```
//!
//! The host and password parts are both optional; a host-less link can only
//! answer, a password-less link is non-secure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use binkp_core::{AddressError, DEFAULT_PORT, FtnAddress, HostPort, SessionConfig};

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the file at all.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// A key the node cannot run without.
    #[error("missing required config key {0:?}")]
    Missing(&'static str),

    /// A value that must parse and does not.
    #[error("invalid value for {key}: {source}")]
    Invalid {
        /// Offending key.
        key: String,
        /// Underlying parse failure.
        #[source]
        source: AddressError,
    },
}

/// One configured link (remote node we exchange mail with).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// The link's FTN address.
    pub address: FtnAddress,
    /// Where to dial it, when we originate.
    pub host: Option<HostPort>,
    /// Session password; `None` or empty means non-secure.
    pub password: Option<String>,
}

/// Typed node configuration with jNode defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local primary FTN address (`ftn.primary`). Required.
    pub primary_address: FtnAddress,
    /// Station name (`station.name`).
    pub system_name: String,
    /// Sysop name (`sysop.name`).
    pub sysop_name: String,
    /// Station location (`ftn.location`).
    pub location: String,
    /// Inbound directory (`ftn.inbound`).
    pub inbound_dir: PathBuf,
    /// Outbound directory (`ftn.outbound`).
    pub outbound_dir: PathBuf,
    /// Temp directory (`ftn.temp`).
    pub temp_dir: PathBuf,
    /// Answer incoming calls (`binkp.server`).
    pub server_enabled: bool,
    /// Dial configured links (`binkp.client`).
    pub client_enabled: bool,
    /// IPv4 bind address (`binkp.bind`).
    pub bind_addr: String,
    /// IPv6 bind address (`binkp.bind6`).
    pub bind6_addr: String,
    /// TCP port (`binkp.port`).
    pub port: u16,
    /// Also bind the v6 address (`binkp.ipv6.enable`).
    pub ipv6_enabled: bool,
    /// Session inactivity timeout (`binkp.timeout`, seconds).
    pub timeout: Duration,
    /// Dial timeout (`binkp.connect.timeout`, seconds).
    pub connect_timeout: Duration,
    /// Memory hint for queue implementations (`binkp.maxmem`).
    pub max_memory: usize,
    /// Data frame payload size (`binkp.size`, clamped 1..=32767).
    pub frame_size: usize,
    /// Log verbosity 1..=5 (`log.level`).
    pub log_level: u8,
    /// Log file (`log.file`); stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Configured links.
    pub links: Vec<LinkConfig>,
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse config text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        let mut links = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if let Some(address) = key.strip_prefix("link.") {
                links.push(parse_link(key, address, value)?);
            } else {
                values.insert(key.to_owned(), value.to_owned());
            }
        }

        let primary: FtnAddress = values
            .get("ftn.primary")
            .ok_or(ConfigError::Missing("ftn.primary"))?
            .parse()
            .map_err(|source| ConfigError::Invalid {
                key: "ftn.primary".to_owned(),
                source,
            })?;

        let string = |key: &str, default: &str| -> String {
            values.get(key).cloned().unwrap_or_else(|| default.to_owned())
        };
        let number = |key: &str, default: i64| -> i64 {
            values
                .get(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let boolean = |key: &str, default: bool| -> bool {
            values
                .get(key)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        // Port 0 is honoured (ephemeral bind); only out-of-range values
        // fall back.
        let port =
            u16::try_from(number("binkp.port", i64::from(DEFAULT_PORT))).unwrap_or(DEFAULT_PORT);

        Ok(Self {
            primary_address: primary,
            system_name: string("station.name", ""),
            sysop_name: string("sysop.name", ""),
            location: string("ftn.location", ""),
            inbound_dir: PathBuf::from(string("ftn.inbound", "inbound")),
            outbound_dir: PathBuf::from(string("ftn.outbound", "outbound")),
            temp_dir: PathBuf::from(string("ftn.temp", "temp")),
            server_enabled: boolean("binkp.server", true),
            client_enabled: boolean("binkp.client", true),
            bind_addr: string("binkp.bind", "0.0.0.0"),
            bind6_addr: string("binkp.bind6", "::"),
            port,
            ipv6_enabled: boolean("binkp.ipv6.enable", false),
            timeout: Duration::from_secs(number("binkp.timeout", 30).max(1) as u64),
            connect_timeout: Duration::from_secs(number("binkp.connect.timeout", 10).max(1) as u64),
            max_memory: number("binkp.maxmem", 10_485_760).max(0) as usize,
            frame_size: (number("binkp.size", 32767).clamp(1, 32767)) as usize,
            log_level: number("log.level", 4).clamp(1, 5) as u8,
            log_file: values.get("log.file").map(PathBuf::from),
            links,
        })
    }

    /// The link entry for a peer, matched by node identity (domain and the
    /// answering side's point sloppiness ignored).
    #[must_use]
    pub fn link_for(&self, peer: &FtnAddress) -> Option<&LinkConfig> {
        self.links.iter().find(|link| link.address.same_node(peer))
    }

    /// Session password for a peer; absent or empty means none required.
    #[must_use]
    pub fn password_for(&self, peer: &FtnAddress) -> Option<String> {
        self.link_for(peer).and_then(|link| link.password.clone())
    }

    /// The per-session parameter block handed to the protocol core.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let links: Vec<LinkConfig> = self.links.clone();
        SessionConfig::new(self.primary_address.clone())
            .with_identity(
                self.system_name.clone(),
                self.sysop_name.clone(),
                self.location.clone(),
            )
            .with_frame_size(self.frame_size)
            .with_timeout(self.timeout)
            .with_passwords(move |peer| {
                links
                    .iter()
                    .find(|link| link.address.same_node(peer))
                    .and_then(|link| link.password.clone())
            })
    }
}

fn parse_link(key: &str, address: &str, value: &str) -> Result<LinkConfig, ConfigError> {
    let address: FtnAddress = address.parse().map_err(|source| ConfigError::Invalid {
        key: key.to_owned(),
        source,
    })?;

    let mut parts = value.splitn(2, ',').map(str::trim);
    let host = match parts.next() {
        None | Some("") | Some("-") => None,
        Some(host) => Some(HostPort::parse(host).map_err(|source| ConfigError::Invalid {
            key: key.to_owned(),
            source,
        })?),
    };
    let password = parts
        .next()
        .filter(|p| !p.is_empty())
        .map(str::to_owned);

    Ok(LinkConfig {
        address,
        host,
        password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_jnode() {
        let config = Config::parse("ftn.primary = 2:5020/1042\n").unwrap();
        assert_eq!(config.primary_address, "2:5020/1042".parse().unwrap());
        assert_eq!(config.port, 24554);
        assert!(config.server_enabled);
        assert!(config.client_enabled);
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.bind6_addr, "::");
        assert!(!config.ipv6_enabled);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_memory, 10_485_760);
        assert_eq!(config.frame_size, 32767);
        assert_eq!(config.log_level, 4);
        assert!(config.log_file.is_none());
        assert!(config.links.is_empty());
    }

    #[test]
    fn full_file_parses() {
        let text = "\
# jNode-style config
ftn.primary = 2:5020/1042
station.name = Rusty Mailer
sysop.name = Jane Sysop
ftn.location = Somewhere, Earth
ftn.inbound = /var/spool/ftn/in
ftn.outbound = /var/spool/ftn/out
ftn.temp = /var/spool/ftn/tmp
binkp.server = true
binkp.client = false
binkp.bind = 127.0.0.1
binkp.port = 24555
binkp.timeout = 60
binkp.connect.timeout = 5
binkp.size = 16384
log.level = 5
log.file = /var/log/binkp.log

link.1:2/3 = mail.example.org,secret
link.2:9999/1 = [::1]:24556,hush
link.3:4/5 = -
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.system_name, "Rusty Mailer");
        assert_eq!(config.port, 24555);
        assert!(!config.client_enabled);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.frame_size, 16384);
        assert_eq!(config.log_file.as_deref(), Some(Path::new("/var/log/binkp.log")));

        assert_eq!(config.links.len(), 3);
        let link = config.link_for(&"1:2/3".parse().unwrap()).unwrap();
        assert_eq!(link.host.as_ref().unwrap().host, "mail.example.org");
        assert_eq!(link.password.as_deref(), Some("secret"));

        let v6 = config.link_for(&"2:9999/1".parse().unwrap()).unwrap();
        assert_eq!(v6.host.as_ref().unwrap().host, "::1");
        assert_eq!(v6.host.as_ref().unwrap().port, 24556);

        let answer_only = config.link_for(&"3:4/5".parse().unwrap()).unwrap();
        assert!(answer_only.host.is_none());
        assert!(answer_only.password.is_none());
    }

    #[test]
    fn missing_primary_is_an_error() {
        assert!(matches!(
            Config::parse("station.name = X\n"),
            Err(ConfigError::Missing("ftn.primary"))
        ));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let text = "\
ftn.primary = 1:2/3
binkp.port = not-a-port
binkp.timeout = -5
binkp.size = 99999999
log.level = 42
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.port, 24554);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.frame_size, 32767);
        assert_eq!(config.log_level, 5);
    }

    #[test]
    fn bad_link_address_is_an_error() {
        assert!(matches!(
            Config::parse("ftn.primary = 1:2/3\nlink.nonsense = host\n"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn password_lookup_matches_by_node() {
        let text = "\
ftn.primary = 1:2/3
link.2:5020/1042 = host.example.org,hunter2
";
        let config = Config::parse(text).unwrap();
        assert_eq!(
            config.password_for(&"2:5020/1042".parse().unwrap()),
            Some("hunter2".to_owned())
        );
        // Domain label on the peer's ADR does not break the match.
        assert_eq!(
            config.password_for(&"2:5020/1042@fidonet".parse().unwrap()),
            Some("hunter2".to_owned())
        );
        assert!(config.password_for(&"2:5020/9".parse().unwrap()).is_none());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let text = "\n# comment\n   \nftn.primary = 1:2/3\njunk line without equals\n";
        assert!(Config::parse(text).is_ok());
    }

    #[test]
    fn session_config_carries_identity_and_passwords() {
        let text = "\
ftn.primary = 1:2/3
station.name = Rusty
sysop.name = Jane
ftn.location = Lab
link.2:5020/1042 = host,pw
";
        let config = Config::parse(text).unwrap().session_config();
        assert_eq!(config.system_name, "Rusty");
        assert_eq!(
            config.password_for(&"2:5020/1042".parse().unwrap()),
            Some("pw".to_owned())
        );
    }
}
