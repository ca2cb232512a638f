use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status, Streaming};
use tracing::{event, Level};
use uuid::Uuid;

use crate::chaincode::Chaincode;
use crate::networking::handler::ChaincodeHandler;
use crate::protos::protos::chaincode_server::{Chaincode as ChaincodeRpc, ChaincodeServer};
use crate::protos::{ChaincodeId, ChaincodeMessage};
use crate::settings::ServerSettings;
use crate::{Error, Result};

type MessageStream = Pin<Box<dyn Stream<Item = std::result::Result<ChaincodeMessage, Status>> + Send>>;

/// Accepts `protos.Chaincode/Connect` from the peer. Each connection gets its
/// own handler, registered the same way as in client mode.
pub struct ConnectService {
    chaincode: Arc<dyn Chaincode>,
    chaincode_id: ChaincodeId,
}

impl ConnectService {
    pub fn new(chaincode: Arc<dyn Chaincode>, chaincode_id: &str) -> Self {
        ConnectService {
            chaincode,
            chaincode_id: ChaincodeId {
                name: chaincode_id.to_string(),
                ..Default::default()
            },
        }
    }
}

#[tonic::async_trait]
impl ChaincodeRpc for ConnectService {
    type ConnectStream = MessageStream;

    async fn connect(
        &self,
        request: Request<Streaming<ChaincodeMessage>>,
    ) -> std::result::Result<Response<Self::ConnectStream>, Status> {
        let connection_id = Uuid::new_v4();
        event!(
            Level::INFO,
            "Peer {:?} connected ({})",
            request.remote_addr(),
            connection_id
        );
        let (handler, outbound) =
            ChaincodeHandler::new(self.chaincode.clone(), self.chaincode_id.clone());
        handler
            .start()
            .await
            .map_err(|err| Status::internal(err.to_string()))?;
        let inbound = request.into_inner();
        tokio::spawn(async move {
            match handler.run(inbound).await {
                Ok(()) => event!(Level::INFO, "Connection {} closed", connection_id),
                Err(err) => event!(Level::WARN, "Connection {} ended: {}", connection_id, err),
            }
        });
        let stream: MessageStream = Box::pin(outbound.map(Ok::<ChaincodeMessage, Status>));
        Ok(Response::new(stream))
    }
}

/// Serves chaincode to peers until ctrl-c.
pub async fn serve(chaincode: Arc<dyn Chaincode>, settings: ServerSettings) -> Result<()> {
    let address: SocketAddr = settings.address.parse().map_err(|_| {
        Error::InvalidArgument(format!("invalid server address {:?}", settings.address))
    })?;
    let service = ChaincodeServer::new(ConnectService::new(chaincode, &settings.chaincode_id))
        .max_encoding_message_size(settings.max_send_message_length)
        .max_decoding_message_size(settings.max_receive_message_length);

    let mut builder = Server::builder();
    match (&settings.tls_cert, &settings.tls_key) {
        (Some(cert), Some(key)) => {
            let mut tls_config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));
            if let Some(client_ca_cert) = &settings.client_ca_cert {
                tls_config = tls_config.client_ca_root(Certificate::from_pem(client_ca_cert));
            }
            builder = builder.tls_config(tls_config)?;
        }
        (None, None) => {}
        _ => {
            return Err(Error::InvalidArgument(String::from(
                "TLS key and certificate must be configured together",
            )))
        }
    }

    event!(
        Level::INFO,
        "Chaincode {} listening on {}",
        settings.chaincode_id,
        address
    );
    builder
        .add_service(service)
        .serve_with_shutdown(address, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
