//! Server configuration, parsed from the command line.

use clap::Parser;

/// The default host PulseKV binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// The default port PulseKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// PulseKV - a small in-memory key-value server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "pulsekv", version, about)]
pub struct Config {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "pulsekv=trace")
    #[arg(long, default_value = "pulsekv=info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: "pulsekv=info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["pulsekv"]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.bind_address(), "0.0.0.0:6379");
    }

    #[test]
    fn test_overrides() {
        let config =
            Config::try_parse_from(["pulsekv", "--host", "127.0.0.1", "-p", "6380"]).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:6380");
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["pulsekv", "--port", "seventy"]).is_err());
        assert!(Config::try_parse_from(["pulsekv", "--port", "70000"]).is_err());
    }
}
