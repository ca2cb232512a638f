use std::sync::Arc;

use tokio::time::sleep;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::{event, Level};

use crate::chaincode::Chaincode;
use crate::networking::handler::ChaincodeHandler;
use crate::protos::protos::chaincode_support_client::ChaincodeSupportClient;
use crate::protos::ChaincodeId;
use crate::settings::ClientSettings;
use crate::util::{format_peer_url, host_of};
use crate::{Error, Result};

/// Opens the HTTP/2 channel to the peer, with TLS when configured.
pub async fn connect(settings: &ClientSettings) -> Result<Channel> {
    let url = format_peer_url(&settings.peer_address, settings.tls.enabled);
    let mut endpoint = Endpoint::from_shared(url)?
        .http2_keep_alive_interval(settings.keepalive_interval)
        .keep_alive_timeout(settings.keepalive_timeout)
        .keep_alive_while_idle(true);

    if settings.tls.enabled {
        let domain_name = settings
            .tls
            .server_name_override
            .clone()
            .unwrap_or_else(|| host_of(&settings.peer_address).to_string());
        let mut tls_config = ClientTlsConfig::new().domain_name(domain_name);
        if let Some(root_cert) = &settings.tls.root_cert {
            tls_config = tls_config.ca_certificate(Certificate::from_pem(root_cert));
        }
        match (&settings.tls.client_cert, &settings.tls.client_key) {
            (Some(cert), Some(key)) => {
                tls_config = tls_config.identity(Identity::from_pem(cert, key));
            }
            (None, None) => {}
            _ => {
                return Err(Error::InvalidArgument(String::from(
                    "TLS client key and certificate must be configured together",
                )))
            }
        }
        endpoint = endpoint.tls_config(tls_config)?;
    }

    event!(Level::INFO, "Connecting to peer at {}", settings.peer_address);
    Ok(endpoint.connect().await?)
}

/// One registration session: dial, REGISTER, and serve transactions until
/// the stream ends.
pub async fn register(chaincode: Arc<dyn Chaincode>, settings: &ClientSettings) -> Result<()> {
    let channel = connect(settings).await?;
    let mut client = ChaincodeSupportClient::new(channel)
        .max_encoding_message_size(settings.max_send_message_length)
        .max_decoding_message_size(settings.max_receive_message_length);

    let chaincode_id = ChaincodeId {
        name: settings.chaincode_id.clone(),
        ..Default::default()
    };
    let (handler, outbound) = ChaincodeHandler::new(chaincode, chaincode_id);
    handler.start().await?;
    let response = client.register(outbound).await?;
    handler.run(response.into_inner()).await
}

fn can_reconnect(error: &Error) -> bool {
    matches!(
        error,
        Error::ConnectionLost(_) | Error::Transport(_) | Error::Status(_)
    )
}

/// Registers with the peer and, after a lost connection, registers again
/// with a fresh handler up to `reconnect_attempts` times.
pub async fn run(chaincode: Arc<dyn Chaincode>, settings: ClientSettings) -> Result<()> {
    let mut attempts_left = settings.reconnect_attempts;
    loop {
        match register(chaincode.clone(), &settings).await {
            Ok(()) => return Ok(()),
            Err(error) if can_reconnect(&error) && attempts_left > 0 => {
                attempts_left -= 1;
                event!(
                    Level::WARN,
                    "Connection to peer lost ({}), reconnecting in {}ms, {} attempts left",
                    error,
                    settings.reconnect_interval.as_millis(),
                    attempts_left
                );
                sleep(settings.reconnect_interval).await;
            }
            Err(error) => {
                event!(Level::ERROR, "Chaincode registration ended: {}", error);
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TlsSettings;
    use crate::test_utilities::mocks::EchoChaincode;
    use std::time::{Duration, Instant};

    fn settings(reconnect_attempts: u32) -> ClientSettings {
        ClientSettings {
            peer_address: String::from("127.0.0.1:1"),
            chaincode_id: String::from("mycc"),
            tls: TlsSettings::default(),
            max_send_message_length: 1024,
            max_receive_message_length: 1024,
            keepalive_interval: Duration::from_secs(110),
            keepalive_timeout: Duration::from_secs(20),
            reconnect_attempts,
            reconnect_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn only_connection_failures_are_retried() {
        assert!(can_reconnect(&Error::ConnectionLost(String::from("eof"))));
        assert!(!can_reconnect(&Error::PeerRejected(String::from("no"))));
        assert!(!can_reconnect(&Error::ProtocolViolation(String::from("dup"))));
    }

    #[tokio::test]
    async fn unreachable_peer_fails_after_retries() {
        let started = Instant::now();
        let result = run(Arc::new(EchoChaincode), settings(2)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn half_configured_client_identity_is_rejected() {
        let mut settings = settings(0);
        settings.tls = TlsSettings {
            enabled: true,
            client_key: Some(b"key".to_vec()),
            ..Default::default()
        };
        assert!(matches!(
            connect(&settings).await,
            Err(Error::InvalidArgument(_))
        ));
    }
}
