//! Environment-derived defaults.
//!
//! Explicit environment variables win; otherwise the network environment
//! is inferred from the primary local IPv4 address.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const APP_NAME_VAR: &str = "REMOTE_CONFIG_APP_NAME";
pub const ROOT_VAR: &str = "REMOTE_CONFIG_ROOT";
pub const ENVIRONMENT_VAR: &str = "REMOTE_CONFIG_ENV";

/// Network the process runs in; selects the default authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnvironment {
    Production,
    Development,
    Testing,
    Labs,
}

impl NetworkEnvironment {
    /// Classify an address by private range.
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                let [a, b, ..] = v4.octets();
                match (a, b) {
                    (10, _) => NetworkEnvironment::Production,
                    (172, 16..=31) => NetworkEnvironment::Testing,
                    (192, 168) => NetworkEnvironment::Development,
                    _ => NetworkEnvironment::Labs,
                }
            }
            IpAddr::V6(_) => NetworkEnvironment::Labs,
        }
    }

    /// `REMOTE_CONFIG_ENV` if set and valid, else inferred from the local address.
    pub fn detect() -> Self {
        if let Ok(raw) = std::env::var(ENVIRONMENT_VAR) {
            match raw.parse() {
                Ok(env) => return env,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring {}", ENVIRONMENT_VAR),
            }
        }
        local_ipv4()
            .map(Self::from_ip)
            .unwrap_or(NetworkEnvironment::Labs)
    }

    /// Poll endpoint of the authority serving this environment.
    pub fn default_remote_url(self) -> &'static str {
        match self {
            NetworkEnvironment::Production => "http://config.prod.internal/sections/poll",
            NetworkEnvironment::Development => "http://config.dev.internal/sections/poll",
            NetworkEnvironment::Testing => "http://config.test.internal/sections/poll",
            NetworkEnvironment::Labs => "http://127.0.0.1:8700/sections/poll",
        }
    }
}

impl FromStr for NetworkEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(NetworkEnvironment::Production),
            "development" | "dev" => Ok(NetworkEnvironment::Development),
            "testing" | "test" => Ok(NetworkEnvironment::Testing),
            "labs" | "lab" => Ok(NetworkEnvironment::Labs),
            other => Err(format!("unknown network environment '{other}'")),
        }
    }
}

/// `REMOTE_CONFIG_APP_NAME`, else the executable's file stem.
pub fn application_name() -> String {
    std::env::var(APP_NAME_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "application".to_string())
}

/// `REMOTE_CONFIG_ROOT`, else `./config`.
pub fn config_root() -> PathBuf {
    std::env::var_os(ROOT_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Host name reported to the authority.
pub fn machine_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

/// Address of the interface that would route outbound traffic. Connecting
/// a UDP socket sends nothing.
fn local_ipv4() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_ip() {
        let cases = [
            ("10.4.0.12", NetworkEnvironment::Production),
            ("172.20.1.1", NetworkEnvironment::Testing),
            ("172.32.1.1", NetworkEnvironment::Labs),
            ("192.168.1.40", NetworkEnvironment::Development),
            ("8.8.8.8", NetworkEnvironment::Labs),
            ("::1", NetworkEnvironment::Labs),
        ];
        for (ip, expected) in cases {
            assert_eq!(NetworkEnvironment::from_ip(ip.parse().unwrap()), expected, "{ip}");
        }
    }

    #[test]
    fn test_parse_environment() {
        assert_eq!("Prod".parse(), Ok(NetworkEnvironment::Production));
        assert_eq!(" testing ".parse(), Ok(NetworkEnvironment::Testing));
        assert!("staging".parse::<NetworkEnvironment>().is_err());
    }

    #[test]
    fn test_default_urls_are_distinct() {
        let urls: std::collections::HashSet<_> = [
            NetworkEnvironment::Production,
            NetworkEnvironment::Development,
            NetworkEnvironment::Testing,
            NetworkEnvironment::Labs,
        ]
        .into_iter()
        .map(NetworkEnvironment::default_remote_url)
        .collect();
        assert_eq!(urls.len(), 4);
    }

    #[test]
    fn test_machine_name_is_never_empty() {
        assert!(!machine_name().is_empty());
    }
}
