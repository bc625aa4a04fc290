//! Compile-time configuration.
//!
//! Credentials and broker parameters are read from the build environment with
//! `option_env!`, so nothing secret lives in the source tree:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `MQTTS_WIFI_SSID` / `MQTTS_WIFI_PSK` | access point credentials |
//! | `MQTTS_BROKER_URI` | `mqtts://host[:port]` or `mqtt://host[:port]` |
//! | `MQTTS_BROKER_PORT` | port override |
//! | `MQTTS_CLIENT_ID` | MQTT client identifier |
//! | `MQTTS_USERNAME` / `MQTTS_PASSWORD` | broker credentials |
//! | `MQTTS_STATUS_INTERVAL_SECS` | enables the periodic status publish |
//!
//! The trust anchor is not an environment variable; the board binary embeds it
//! with `include_bytes!` and passes it through [`BrokerConfig::with_trust_anchor`].

/// Default MQTT port for plain TCP.
pub const MQTT_PORT: u16 = 1883;
/// Default MQTT port for TLS.
pub const MQTTS_PORT: u16 = 8883;

/// Minimum authentication mode accepted when picking an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuthMode {
    Open,
    Wpa2Personal,
    Wpa3Personal,
}

/// How the station scans for its access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanMethod {
    /// Stop at the first matching access point.
    Fast,
    /// Scan every channel before choosing.
    AllChannels,
}

/// Wireless station parameters.
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
    pub auth_threshold: AuthMode,
    pub scan: ScanMethod,
    /// Prefer the strongest signal among matching access points.
    pub sort_by_signal: bool,
    pub rssi_threshold: i8,
    pub pmf_capable: bool,
    pub pmf_required: bool,
}

/// Broker connection parameters.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    pub uri: &'static str,
    /// Overrides the port in `uri` (or the scheme default).
    pub port: Option<u16>,
    pub client_id: &'static str,
    pub username: Option<&'static str>,
    pub password: Option<&'static str>,
    /// DER-encoded CA certificate the broker must chain to.
    pub trust_anchor: Option<&'static [u8]>,
    pub keep_alive_secs: u16,
}

impl BrokerConfig {
    pub const fn with_trust_anchor(mut self, der: &'static [u8]) -> Self {
        self.trust_anchor = Some(der);
        self
    }

    /// Resolves the URI and port override into a connectable endpoint.
    pub fn endpoint(&self) -> Result<BrokerEndpoint<'static>, UriError> {
        let mut endpoint = parse_broker_uri(self.uri)?;
        if let Some(port) = self.port {
            endpoint.port = port;
        }
        Ok(endpoint)
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Copy)]
pub struct AppConfig {
    pub wifi: WifiConfig,
    pub broker: BrokerConfig,
    /// Period of the status publish; `None` leaves it off.
    pub status_interval_secs: Option<u32>,
}

pub const WIFI: WifiConfig = WifiConfig {
    ssid: env_or(option_env!("MQTTS_WIFI_SSID"), "mqtts-node"),
    password: env_or(option_env!("MQTTS_WIFI_PSK"), ""),
    auth_threshold: AuthMode::Wpa2Personal,
    scan: ScanMethod::Fast,
    sort_by_signal: true,
    rssi_threshold: -127,
    pmf_capable: true,
    pmf_required: false,
};

pub const BROKER: BrokerConfig = BrokerConfig {
    uri: env_or(option_env!("MQTTS_BROKER_URI"), "mqtts://localhost"),
    port: match option_env!("MQTTS_BROKER_PORT") {
        Some(port) => parse_u16(port),
        None => None,
    },
    client_id: env_or(option_env!("MQTTS_CLIENT_ID"), "mqtts-node"),
    username: option_env!("MQTTS_USERNAME"),
    password: option_env!("MQTTS_PASSWORD"),
    trust_anchor: None,
    keep_alive_secs: 120,
};

pub const APP: AppConfig = AppConfig {
    wifi: WIFI,
    broker: BROKER,
    status_interval_secs: match option_env!("MQTTS_STATUS_INTERVAL_SECS") {
        Some(secs) => match parse_u16(secs) {
            Some(secs) => Some(secs as u32),
            None => None,
        },
        None => None,
    },
};

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

const fn parse_u16(s: &str) -> Option<u16> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (b - b'0') as u32;
        if value > u16::MAX as u32 {
            return None;
        }
        i += 1;
    }
    Some(value as u16)
}

/// Transport security selected by the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scheme {
    Mqtt,
    Mqtts,
}

/// A parsed broker address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerEndpoint<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UriError {
    UnsupportedScheme,
    MissingHost,
    InvalidPort,
}

/// Parses `mqtt://host[:port]` / `mqtts://host[:port]`.
///
/// A trailing `/` is accepted; any other path is not.
pub fn parse_broker_uri(uri: &str) -> Result<BrokerEndpoint<'_>, UriError> {
    let (scheme, rest) = if let Some(rest) = uri.strip_prefix("mqtts://") {
        (Scheme::Mqtts, rest)
    } else if let Some(rest) = uri.strip_prefix("mqtt://") {
        (Scheme::Mqtt, rest)
    } else {
        return Err(UriError::UnsupportedScheme);
    };
    let authority = rest.strip_suffix('/').unwrap_or(rest);
    if authority.contains('/') {
        return Err(UriError::MissingHost);
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, parse_u16(port).ok_or(UriError::InvalidPort)?),
        None => (
            authority,
            match scheme {
                Scheme::Mqtt => MQTT_PORT,
                Scheme::Mqtts => MQTTS_PORT,
            },
        ),
    };
    if host.is_empty() {
        return Err(UriError::MissingHost);
    }
    Ok(BrokerEndpoint { scheme, host, port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tls_uri_with_default_port() {
        let endpoint = parse_broker_uri("mqtts://broker.example.com").unwrap();
        assert_eq!(
            endpoint,
            BrokerEndpoint {
                scheme: Scheme::Mqtts,
                host: "broker.example.com",
                port: 8883,
            }
        );
    }

    #[test]
    fn parses_explicit_port_and_trailing_slash() {
        let endpoint = parse_broker_uri("mqtt://10.0.0.2:1884/").unwrap();
        assert_eq!(endpoint.scheme, Scheme::Mqtt);
        assert_eq!(endpoint.host, "10.0.0.2");
        assert_eq!(endpoint.port, 1884);
    }

    #[test]
    fn rejects_bad_uris() {
        assert_eq!(
            parse_broker_uri("https://broker"),
            Err(UriError::UnsupportedScheme)
        );
        assert_eq!(parse_broker_uri("mqtts://"), Err(UriError::MissingHost));
        assert_eq!(parse_broker_uri("mqtts://:8883"), Err(UriError::MissingHost));
        assert_eq!(
            parse_broker_uri("mqtts://broker:99999"),
            Err(UriError::InvalidPort)
        );
        assert_eq!(
            parse_broker_uri("mqtts://broker:port"),
            Err(UriError::InvalidPort)
        );
    }

    #[test]
    fn port_override_wins() {
        let config = BrokerConfig {
            uri: "mqtts://broker:1000",
            port: Some(8883),
            client_id: "node",
            username: None,
            password: None,
            trust_anchor: None,
            keep_alive_secs: 60,
        };
        assert_eq!(config.endpoint().unwrap().port, 8883);
    }

    #[test]
    fn const_port_parser() {
        assert_eq!(parse_u16("8883"), Some(8883));
        assert_eq!(parse_u16("65535"), Some(65535));
        assert_eq!(parse_u16("65536"), None);
        assert_eq!(parse_u16(""), None);
        assert_eq!(parse_u16("88a3"), None);
    }

    #[test]
    fn station_defaults_match_wpa2_fast_scan() {
        assert_eq!(WIFI.auth_threshold, AuthMode::Wpa2Personal);
        assert_eq!(WIFI.scan, ScanMethod::Fast);
        assert_eq!(WIFI.rssi_threshold, -127);
        assert!(WIFI.pmf_capable && !WIFI.pmf_required);
    }
}
