//! Runtime settings, layered lowest to highest: built-in defaults, an
//! optional config file, `CORE_*` and `CHAINCODE_*` environment variables,
//! then command line flags.
//!
//! Environment variables map onto dotted keys by splitting on `_`, so
//! `CORE_PEER_TLS_ROOTCERT_FILE` sets `peer.tls.rootcert.file` and
//! `CHAINCODE_SERVER_ADDRESS` sets `server.address`.

use std::fs;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use config::{Config, ConfigError, Environment, File};

use crate::Result;

pub const DEFAULT_MAX_MESSAGE_LENGTH: i64 = 100 * 1024 * 1024;
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: i64 = 110_000;
pub const DEFAULT_KEEPALIVE_TIMEOUT_MS: i64 = 20_000;
pub const DEFAULT_RECONNECT_INTERVAL_MS: i64 = 1_000;

pub fn load_config(config_file: Option<&str>) -> Result<Config> {
    let mut settings = Config::default();
    settings.set_default("peer.tls.enabled", false)?;
    settings.set_default("grpc.max_send_message_length", DEFAULT_MAX_MESSAGE_LENGTH)?;
    settings.set_default("grpc.max_receive_message_length", DEFAULT_MAX_MESSAGE_LENGTH)?;
    settings.set_default("grpc.keepalive.interval", DEFAULT_KEEPALIVE_INTERVAL_MS)?;
    settings.set_default("grpc.keepalive.timeout", DEFAULT_KEEPALIVE_TIMEOUT_MS)?;
    settings.set_default("chaincode.reconnect.attempts", 0_i64)?;
    settings.set_default("chaincode.reconnect.interval", DEFAULT_RECONNECT_INTERVAL_MS)?;
    settings.set_default("chaincode.logging.level", "INFO")?;
    settings.set_default("chaincode.logging.shim", "INFO")?;

    if let Some(config_file) = config_file {
        settings.merge(File::with_name(config_file))?;
    }
    settings.merge(Environment::with_prefix("CORE").separator("_"))?;
    settings.merge(Environment::with_prefix("CHAINCODE").separator("_"))?;
    Ok(settings)
}

fn optional_string(settings: &Config, key: &str) -> Option<String> {
    settings
        .get_str(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn required_string(settings: &Config, key: &str) -> Result<String> {
    optional_string(settings, key).ok_or_else(|| ConfigError::NotFound(key.to_string()).into())
}

fn millis(settings: &Config, key: &str) -> Result<Duration> {
    let value = settings.get_int(key)?;
    Ok(Duration::from_millis(value.max(0) as u64))
}

fn message_length(settings: &Config, key: &str) -> Result<usize> {
    let value = settings.get_int(key)?;
    if value <= 0 {
        return Err(ConfigError::Message(format!("{} must be positive", key)).into());
    }
    Ok(value as usize)
}

/// TLS material as found on disk: either PEM, or PEM encoded once more in
/// base64 the way the peer writes client credentials for chaincode.
pub fn read_tls_material(path: &str) -> Result<Vec<u8>> {
    let contents = fs::read(path)?;
    Ok(decode_tls_material(contents))
}

fn decode_tls_material(contents: Vec<u8>) -> Vec<u8> {
    if contents.starts_with(b"-----BEGIN") {
        return contents;
    }
    let compact: Vec<u8> = contents
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact).unwrap_or(contents)
}

fn optional_material(settings: &Config, key: &str) -> Result<Option<Vec<u8>>> {
    match optional_string(settings, key) {
        Some(path) => Ok(Some(read_tls_material(&path)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub enabled: bool,
    pub root_cert: Option<Vec<u8>>,
    pub client_key: Option<Vec<u8>>,
    pub client_cert: Option<Vec<u8>>,
    pub server_name_override: Option<String>,
}

/// Settings for `start`: the chaincode dials the peer.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub peer_address: String,
    pub chaincode_id: String,
    pub tls: TlsSettings,
    pub max_send_message_length: usize,
    pub max_receive_message_length: usize,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_interval: Duration,
}

impl ClientSettings {
    pub fn from_config(settings: &Config) -> Result<Self> {
        let enabled = settings.get_bool("peer.tls.enabled")?;
        let tls = if enabled {
            TlsSettings {
                enabled,
                root_cert: optional_material(settings, "peer.tls.rootcert.file")?,
                client_key: optional_material(settings, "tls.client.key.path")?,
                client_cert: optional_material(settings, "tls.client.cert.path")?,
                server_name_override: optional_string(settings, "peer.tls.serverhostoverride"),
            }
        } else {
            TlsSettings::default()
        };
        Ok(ClientSettings {
            peer_address: required_string(settings, "peer.address")?,
            chaincode_id: required_string(settings, "chaincode.id.name")?,
            tls,
            max_send_message_length: message_length(settings, "grpc.max_send_message_length")?,
            max_receive_message_length: message_length(
                settings,
                "grpc.max_receive_message_length",
            )?,
            keepalive_interval: millis(settings, "grpc.keepalive.interval")?,
            keepalive_timeout: millis(settings, "grpc.keepalive.timeout")?,
            reconnect_attempts: settings.get_int("chaincode.reconnect.attempts")?.max(0) as u32,
            reconnect_interval: millis(settings, "chaincode.reconnect.interval")?,
        })
    }
}

/// Settings for `server`: the peer dials the chaincode.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub address: String,
    pub chaincode_id: String,
    pub tls_key: Option<Vec<u8>>,
    pub tls_cert: Option<Vec<u8>>,
    pub client_ca_cert: Option<Vec<u8>>,
    pub max_send_message_length: usize,
    pub max_receive_message_length: usize,
}

impl ServerSettings {
    pub fn from_config(settings: &Config) -> Result<Self> {
        let chaincode_id = optional_string(settings, "id")
            .or_else(|| optional_string(settings, "chaincode.id.name"))
            .ok_or_else(|| ConfigError::NotFound(String::from("id")))?;
        Ok(ServerSettings {
            address: required_string(settings, "server.address")?,
            chaincode_id,
            tls_key: optional_material(settings, "tls.key.file")?,
            tls_cert: optional_material(settings, "tls.cert.file")?,
            client_ca_cert: optional_material(settings, "tls.client.cacert.file")?,
            max_send_message_length: message_length(settings, "grpc.max_send_message_length")?,
            max_receive_message_length: message_length(
                settings,
                "grpc.max_receive_message_length",
            )?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub shim_level: String,
}

impl LogSettings {
    pub fn from_config(settings: &Config) -> Self {
        LogSettings {
            level: optional_string(settings, "chaincode.logging.level")
                .unwrap_or_else(|| String::from("INFO")),
            shim_level: optional_string(settings, "chaincode.logging.shim")
                .unwrap_or_else(|| String::from("INFO")),
        }
    }
}
