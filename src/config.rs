//! Agent configuration from environment variables plus a small CLI layer.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection descriptor; `:memory:` is accepted.
    pub db_path: String,
    pub port: u16,
    /// Allowed cross-origin callers; `*` means any.
    pub cors_origins: Vec<String>,
    /// Cadence of the timer-driven collector.
    pub sample_interval: Duration,
    /// How many top CPU consumers each snapshot keeps.
    pub top_n: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path =
            std::env::var("SYSMON_AGENT_DB").unwrap_or_else(|_| "sysmon.db".to_string());
        let port = std::env::var("SYSMON_AGENT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let cors_origins = std::env::var("SYSMON_AGENT_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let interval_secs: u64 = std::env::var("SYSMON_AGENT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        let top_n: usize = std::env::var("SYSMON_AGENT_TOP_N")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            db_path,
            port,
            cors_origins,
            sample_interval: Duration::from_secs(interval_secs.max(1)),
            top_n,
        }
    }
}

/// Parse `--port 9000`, `-p 9000`, or `--port=9000` out of the argv;
/// anything unparseable falls back to `default_port`.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(
            parse_port(vec!["agent".into(), "--port".into(), "9001".into()], 8000),
            9001
        );
        assert_eq!(
            parse_port(vec!["agent".into(), "-p".into(), "9002".into()], 8000),
            9002
        );
        assert_eq!(parse_port(vec!["agent".into(), "--port=9003".into()], 8000), 9003);
        assert_eq!(parse_port(vec!["agent".into()], 8000), 8000);
    }

    #[test]
    fn port_garbage_falls_back() {
        assert_eq!(
            parse_port(vec!["agent".into(), "--port".into(), "nope".into()], 8000),
            8000
        );
    }
}
