//! Client configuration
//!
//! Parsed from a single string of the shape
//! `<serverHost>:<udpPortSpec>@<token>[:<localPort>]` where `udpPortSpec` is
//! `1-65535` (any port), a `lo-hi` range, or a single port. The trailing
//! `:localPort` is only split off when it parses as a port; otherwise the
//! whole right-hand side is the token, so tokens may contain colons.

use std::str::FromStr;

use crate::ConfigError;

/// Local UDP port used when the config string does not carry one
pub const DEFAULT_LOCAL_PORT: u16 = 5300;

/// Port spec literal meaning "any destination UDP port"
pub const ANY_UDP_PORT_SPEC: &str = "1-65535";

/// Immutable per-run client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Relay server hostname or IP
    pub server_host: String,
    /// True when any destination UDP port is allowed
    pub any_udp_port: bool,
    pub port_min: u16,
    pub port_max: u16,
    /// Shared secret keying the frame HMAC
    pub token: String,
    /// Local UDP listen port (bound on 127.0.0.1)
    pub local_port: u16,
}

impl ClientConfig {
    /// Whether `port` is an acceptable destination UDP port.
    pub fn allows_dst_port(&self, port: u16) -> bool {
        if port == 0 {
            return false;
        }
        self.any_udp_port || (self.port_min..=self.port_max).contains(&port)
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Empty);
        }

        let (left, right) = raw.rsplit_once('@').ok_or(ConfigError::MissingAt)?;

        let (host, port_spec) = left
            .rsplit_once(':')
            .ok_or(ConfigError::InvalidHostPortSpec)?;
        if port_spec.is_empty() {
            return Err(ConfigError::InvalidHostPortSpec);
        }
        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let (token, local_port) = split_token_local_port(right);
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        let (any_udp_port, port_min, port_max) = parse_port_spec(port_spec)?;

        Ok(Self {
            server_host: host.to_string(),
            any_udp_port,
            port_min,
            port_max,
            token,
            local_port,
        })
    }
}

/// Split `token[:localPort]`. The trailing piece is a local port only when it
/// parses as 1..=65535; anything else folds back into the token.
fn split_token_local_port(right: &str) -> (String, u16) {
    if let Some((token, maybe_port)) = right.rsplit_once(':') {
        if !token.is_empty() {
            if let Ok(port) = maybe_port.parse::<u16>() {
                if port >= 1 {
                    return (token.to_string(), port);
                }
            }
        }
    }
    (right.to_string(), DEFAULT_LOCAL_PORT)
}

fn parse_port_spec(spec: &str) -> Result<(bool, u16, u16), ConfigError> {
    if spec == ANY_UDP_PORT_SPEC {
        return Ok((true, 1, 65535));
    }
    if let Some((lo, hi)) = spec.split_once('-') {
        let min = parse_port(lo)?;
        let max = parse_port(hi)?;
        if min > max {
            return Err(ConfigError::InvalidRange { min, max });
        }
        return Ok((min == 1 && max == 65535, min, max));
    }
    let port = parse_port(spec)?;
    Ok((false, port, port))
}

fn parse_port(text: &str) -> Result<u16, ConfigError> {
    match text.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(ConfigError::InvalidPort(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_any_port() {
        let cfg: ClientConfig = "min.example.org:1-65535@Trial25171:1".parse().unwrap();
        assert!(cfg.any_udp_port);
        assert_eq!(cfg.server_host, "min.example.org");
        assert_eq!(cfg.token, "Trial25171");
        assert_eq!(cfg.local_port, 1);
        assert!(cfg.allows_dst_port(65535));
        assert!(cfg.allows_dst_port(53));
    }

    #[test]
    fn test_parse_partial_range() {
        let cfg: ClientConfig = "min.example.org:54-65535@Trial25171:1".parse().unwrap();
        assert!(!cfg.any_udp_port);
        assert_eq!((cfg.port_min, cfg.port_max), (54, 65535));
        assert!(!cfg.allows_dst_port(53));
        assert!(cfg.allows_dst_port(54));
    }

    #[test]
    fn test_parse_single_port() {
        let cfg: ClientConfig = "example.com:53@tok:9001".parse().unwrap();
        assert!(!cfg.any_udp_port);
        assert_eq!((cfg.port_min, cfg.port_max), (53, 53));
        assert_eq!(cfg.local_port, 9001);
        assert!(cfg.allows_dst_port(53));
        assert!(!cfg.allows_dst_port(54));
    }

    #[test]
    fn test_token_can_contain_colon() {
        let cfg: ClientConfig = "10.0.0.1:53@user:pass:5300".parse().unwrap();
        assert_eq!(cfg.token, "user:pass");
        assert_eq!(cfg.local_port, 5300);
    }

    #[test]
    fn test_local_port_defaults_without_trailing_port() {
        let cfg: ClientConfig = "example.com:53@tok".parse().unwrap();
        assert_eq!(cfg.token, "tok");
        assert_eq!(cfg.local_port, DEFAULT_LOCAL_PORT);
    }

    #[test]
    fn test_non_numeric_trailing_piece_folds_into_token() {
        let cfg: ClientConfig = "example.com:53@tok:abc".parse().unwrap();
        assert_eq!(cfg.token, "tok:abc");
        assert_eq!(cfg.local_port, DEFAULT_LOCAL_PORT);

        // 0 is not a valid port, so it stays in the token too
        let cfg: ClientConfig = "example.com:53@tok:0".parse().unwrap();
        assert_eq!(cfg.token, "tok:0");
        assert_eq!(cfg.local_port, DEFAULT_LOCAL_PORT);
    }

    #[test]
    fn test_full_range_spelled_out_means_any() {
        let cfg: ClientConfig = "h:1-65535@t".parse().unwrap();
        assert!(cfg.any_udp_port);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert_eq!("".parse::<ClientConfig>().unwrap_err(), ConfigError::Empty);
        assert_eq!(
            "hostonly".parse::<ClientConfig>().unwrap_err(),
            ConfigError::MissingAt
        );
        assert_eq!(
            "nohostspec@tok".parse::<ClientConfig>().unwrap_err(),
            ConfigError::InvalidHostPortSpec
        );
        assert_eq!(
            "host:53@".parse::<ClientConfig>().unwrap_err(),
            ConfigError::EmptyToken
        );
    }

    #[test]
    fn test_rejects_invalid_ports_and_ranges() {
        assert!(matches!(
            "host:0@tok".parse::<ClientConfig>().unwrap_err(),
            ConfigError::InvalidPort(_)
        ));
        assert!(matches!(
            "host:70000@tok".parse::<ClientConfig>().unwrap_err(),
            ConfigError::InvalidPort(_)
        ));
        assert_eq!(
            "host:500-53@tok".parse::<ClientConfig>().unwrap_err(),
            ConfigError::InvalidRange { min: 500, max: 53 }
        );
        assert!(matches!(
            "host:1-2-3@tok".parse::<ClientConfig>().unwrap_err(),
            ConfigError::InvalidPort(_)
        ));
    }

    #[test]
    fn test_allows_dst_port_rejects_zero() {
        let cfg: ClientConfig = "h:1-65535@t".parse().unwrap();
        assert!(!cfg.allows_dst_port(0));
    }
}
