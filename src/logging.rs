use tracing_subscriber::{fmt, EnvFilter};

use crate::settings::LogSettings;

/// Maps a Fabric log level name onto a tracing directive. Unknown names fall
/// back to `info`.
pub fn tracing_level(fabric_level: &str) -> &'static str {
    match fabric_level.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "ERROR" => "error",
        "WARNING" | "WARN" => "warn",
        "NOTICE" | "INFO" => "info",
        "DEBUG" => "debug",
        "TRACE" => "trace",
        _ => "info",
    }
}

/// Chaincode code logs at `level`, this crate at `shim_level`.
pub fn filter_spec(settings: &LogSettings) -> String {
    format!(
        "{},fabric_shim={}",
        tracing_level(&settings.level),
        tracing_level(&settings.shim_level)
    )
}

/// Installs the global subscriber. `RUST_LOG` wins over the Fabric levels
/// when set. Calling this twice is harmless.
pub fn init(settings: &LogSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_spec(settings)));
    let _ = fmt().with_env_filter(env_filter).with_target(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fabric_levels_map_to_tracing() {
        assert_eq!(tracing_level("CRITICAL"), "error");
        assert_eq!(tracing_level("warning"), "warn");
        assert_eq!(tracing_level("NOTICE"), "info");
        assert_eq!(tracing_level("DEBUG"), "debug");
        assert_eq!(tracing_level("chatty"), "info");
    }

    #[test]
    fn shim_gets_its_own_directive() {
        let settings = LogSettings {
            level: String::from("WARNING"),
            shim_level: String::from("DEBUG"),
        };
        assert_eq!(filter_spec(&settings), "warn,fabric_shim=debug");
    }
}
