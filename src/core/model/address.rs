use anyhow::anyhow;
use fixedstr::{str128, str8};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Represents a networking address; composed of host + port
#[derive(Copy, Clone, Debug)]
pub struct Address {
    host: str128, // up to 128 bytes (on stack)
    port: str8,   // up to 8 bytes (on stack)
}

impl Address {
    /// Create a new Address
    pub fn new(host: &str, port: &str) -> Address {
        Address {
            host: str128::from(host),
            port: str8::from(port),
        }
    }

    /// Parses an address in `host:port` form. The port is split at the last colon, so the host
    /// may not itself contain one.
    pub fn parse(s: &str) -> anyhow::Result<Address> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("address {:?} is not in host:port form", s))?;
        if host.is_empty() || host.contains(':') {
            return Err(anyhow!("address {:?} has an invalid host", s));
        }
        if host.len() > 127 {
            return Err(anyhow!("address {:?} has a host longer than 127 bytes", s));
        }
        port.parse::<u16>()
            .map_err(|e| anyhow!("address {:?} has an invalid port: {}", s, e))?;
        Ok(Address::new(host, port))
    }

    /// Get the host
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Get the port
    pub fn port(&self) -> &str {
        self.port.as_str()
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.host() == other.host() && self.port() == other.port()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host().hash(state);
        self.port().hash(state);
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host(), self.port())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(D::Error::custom)
    }
}
