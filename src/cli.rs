/*!
# Chaincode Command Line Interface

Every chaincode binary gets the same commands by calling [run] from `main`.

```bash
# dial the peer (what the peer does when it launches chaincode itself)
asset_transfer start --peer.address peer0.org1.example.com:7052 --chaincode-id-name mycc:1.0

# listen for the peer (chaincode as an external service)
asset_transfer server --chaincode-address 0.0.0.0:9999 --chaincode-id mycc:abcdef

# print or save the contract metadata
asset_transfer metadata generate --file metadata.json
```

Flags override `CORE_*` / `CHAINCODE_*` environment variables, which override `--config`.
*/
use std::fs;
use std::sync::Arc;

use clap::{App, AppSettings, Arg, ArgMatches, ErrorKind, SubCommand};
use config::Config;
use tracing::{event, Level};

use crate::chaincode::Chaincode;
use crate::networking::{client, server};
use crate::settings::{self, ClientSettings, LogSettings, ServerSettings};
use crate::{logging, Error, Result};

fn app<'a, 'b>() -> App<'a, 'b> {
    let config_arg = Arg::with_name("config")
        .short("c")
        .long("config")
        .takes_value(true)
        .help("config file name");
    App::new("Fabric Chaincode")
        .about("Runs a Hyperledger Fabric chaincode")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("start")
                .about("registers with the peer at --peer.address")
                .arg(config_arg.clone())
                .arg(
                    Arg::with_name("peer.address")
                        .long("peer.address")
                        .takes_value(true)
                        .help("peer address as host:port"),
                )
                .arg(
                    Arg::with_name("chaincode-id-name")
                        .long("chaincode-id-name")
                        .takes_value(true)
                        .help("name the chaincode registers under"),
                )
                .arg(
                    Arg::with_name("grpc.max_send_message_length")
                        .long("grpc.max_send_message_length")
                        .takes_value(true)
                        .help("largest message sent to the peer, in bytes"),
                )
                .arg(
                    Arg::with_name("grpc.max_receive_message_length")
                        .long("grpc.max_receive_message_length")
                        .takes_value(true)
                        .help("largest message accepted from the peer, in bytes"),
                )
                .arg(
                    Arg::with_name("grpc.keepalive.interval")
                        .long("grpc.keepalive.interval")
                        .takes_value(true)
                        .help("keepalive ping interval in milliseconds"),
                )
                .arg(
                    Arg::with_name("grpc.keepalive.timeout")
                        .long("grpc.keepalive.timeout")
                        .takes_value(true)
                        .help("keepalive ping timeout in milliseconds"),
                )
                .arg(
                    Arg::with_name("chaincode.reconnect.attempts")
                        .long("reconnect-attempts")
                        .takes_value(true)
                        .help("how often to register again after losing the peer"),
                ),
        )
        .subcommand(
            SubCommand::with_name("server")
                .about("waits for the peer to connect")
                .arg(config_arg.clone())
                .arg(
                    Arg::with_name("server.address")
                        .long("chaincode-address")
                        .takes_value(true)
                        .help("address to listen on as host:port"),
                )
                .arg(
                    Arg::with_name("id")
                        .long("chaincode-id")
                        .takes_value(true)
                        .help("chaincode id the peer knows this chaincode by"),
                )
                .arg(
                    Arg::with_name("tls.key.file")
                        .long("chaincode-tls-key-file")
                        .takes_value(true)
                        .help("PEM server key"),
                )
                .arg(
                    Arg::with_name("tls.cert.file")
                        .long("chaincode-tls-cert-file")
                        .takes_value(true)
                        .help("PEM server certificate"),
                )
                .arg(
                    Arg::with_name("tls.client.cacert.file")
                        .long("chaincode-tls-client-cacert-file")
                        .takes_value(true)
                        .help("PEM CA certificate for client authentication"),
                ),
        )
        .subcommand(
            SubCommand::with_name("metadata")
                .about("contract metadata")
                .setting(AppSettings::SubcommandRequiredElseHelp)
                .subcommand(
                    SubCommand::with_name("generate")
                        .about("writes the metadata document to --file, or stdout")
                        .arg(
                            Arg::with_name("file")
                                .short("f")
                                .long("file")
                                .takes_value(true)
                                .help("output file"),
                        ),
                ),
        )
}

/// Loads config and lets flags that were given override it. Flag names are
/// the config keys.
fn load_settings(matches: &ArgMatches, keys: &[&str]) -> Result<Config> {
    let mut settings = settings::load_config(matches.value_of("config"))?;
    for key in keys {
        if let Some(value) = matches.value_of(key) {
            settings.set(key, value)?;
        }
    }
    Ok(settings)
}

const START_KEYS: &[&str] = &[
    "peer.address",
    "grpc.max_send_message_length",
    "grpc.max_receive_message_length",
    "grpc.keepalive.interval",
    "grpc.keepalive.timeout",
    "chaincode.reconnect.attempts",
];

const SERVER_KEYS: &[&str] = &[
    "server.address",
    "id",
    "tls.key.file",
    "tls.cert.file",
    "tls.client.cacert.file",
];

fn write_metadata(chaincode: &dyn Chaincode, file: Option<&str>) -> Result<()> {
    let document = chaincode.metadata().unwrap_or_else(|| serde_json::json!({}));
    let pretty = serde_json::to_string_pretty(&document)?;
    match file {
        Some(file) => {
            fs::write(file, pretty)?;
            event!(Level::INFO, "Metadata written to {}", file);
        }
        None => println!("{}", pretty),
    }
    Ok(())
}

/// Entry point for chaincode binaries.
pub async fn run(chaincode: Arc<dyn Chaincode>) -> Result<()> {
    run_with_args(chaincode, std::env::args_os().collect()).await
}

pub async fn run_with_args(
    chaincode: Arc<dyn Chaincode>,
    args: Vec<std::ffi::OsString>,
) -> Result<()> {
    let matches = match app().get_matches_from_safe(args) {
        Ok(matches) => matches,
        Err(err) => match err.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => err.exit(),
            _ => return Err(Error::InvalidArgument(err.message)),
        },
    };

    match matches.subcommand() {
        ("start", Some(matches)) => {
            let mut config = load_settings(matches, START_KEYS)?;
            if let Some(name) = matches.value_of("chaincode-id-name") {
                config.set("chaincode.id.name", name)?;
            }
            logging::init(&LogSettings::from_config(&config));
            client::run(chaincode, ClientSettings::from_config(&config)?).await
        }
        ("server", Some(matches)) => {
            let config = load_settings(matches, SERVER_KEYS)?;
            logging::init(&LogSettings::from_config(&config));
            server::serve(chaincode, ServerSettings::from_config(&config)?).await
        }
        ("metadata", Some(matches)) => match matches.subcommand() {
            ("generate", Some(matches)) => write_metadata(chaincode.as_ref(), matches.value_of("file")),
            _ => Err(Error::InvalidArgument(String::from("unknown metadata command"))),
        },
        _ => Err(Error::InvalidArgument(String::from("unknown command"))),
    }
}
