use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;

use crate::chaincode::Chaincode;
use crate::networking::codec::{self, TxKey};
use crate::networking::handler::{ChaincodeHandler, ChannelState};
use crate::protos::{ChaincodeId, ChaincodeMessage, MessageType};
use crate::test_utilities::mocks::make_input;
use crate::Result;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

type Inbound = mpsc::UnboundedSender<std::result::Result<ChaincodeMessage, Status>>;

/// The peer side of a handler's stream, kept in memory. Panics on anything
/// unexpected, which is what a test wants.
pub struct MockPeer {
    pub handler: Arc<ChaincodeHandler>,
    to_handler: Option<Inbound>,
    from_handler: UnboundedReceiverStream<ChaincodeMessage>,
    runner: JoinHandle<Result<()>>,
}

impl MockPeer {
    /// Starts a handler and consumes its REGISTER.
    pub async fn start(chaincode: Arc<dyn Chaincode>) -> MockPeer {
        let chaincode_id = ChaincodeId {
            name: String::from("mycc:1.0"),
            ..Default::default()
        };
        let (handler, from_handler) = ChaincodeHandler::new(chaincode, chaincode_id);
        let (to_handler, inbound) = mpsc::unbounded_channel();
        let runner = tokio::spawn(handler.clone().run(UnboundedReceiverStream::new(inbound)));
        handler.start().await.unwrap();
        let mut peer = MockPeer {
            handler,
            to_handler: Some(to_handler),
            from_handler,
            runner,
        };
        peer.expect(MessageType::Register).await;
        peer
    }

    /// A handler that has completed REGISTERED and READY.
    pub async fn ready(chaincode: Arc<dyn Chaincode>) -> MockPeer {
        let peer = MockPeer::start(chaincode).await;
        let key = TxKey::new("", "");
        peer.send(codec::new_message(MessageType::Registered, &key, vec![]));
        peer.send(codec::new_message(MessageType::Ready, &key, vec![]));
        peer.wait_for_state(ChannelState::Ready).await;
        peer
    }

    pub async fn wait_for_state(&self, state: ChannelState) {
        for _ in 0..200 {
            if self.handler.state().await == state {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "handler never reached {:?}, still {:?}",
            state,
            self.handler.state().await
        );
    }

    pub fn send(&self, message: ChaincodeMessage) {
        self.to_handler
            .as_ref()
            .expect("peer already disconnected")
            .send(Ok(message))
            .expect("handler stopped reading");
    }

    pub fn fail(&self, status: Status) {
        if let Some(to_handler) = &self.to_handler {
            let _ = to_handler.send(Err(status));
        }
    }

    /// Ends the inbound stream the way a closed connection does.
    pub fn disconnect(&mut self) {
        self.to_handler.take();
    }

    pub fn transaction(&self, channel_id: &str, txid: &str, args: &[&str]) {
        self.send(codec::new_message(
            MessageType::Transaction,
            &TxKey::new(channel_id, txid),
            codec::encode(&make_input(args)),
        ));
    }

    pub fn init(&self, channel_id: &str, txid: &str, args: &[&str]) {
        self.send(codec::new_message(
            MessageType::Init,
            &TxKey::new(channel_id, txid),
            codec::encode(&make_input(args)),
        ));
    }

    pub async fn recv(&mut self) -> Option<ChaincodeMessage> {
        timeout(RECV_TIMEOUT, self.from_handler.next())
            .await
            .ok()
            .flatten()
    }

    /// Next message if one arrives within `millis`.
    pub async fn recv_within(&mut self, millis: u64) -> Option<ChaincodeMessage> {
        timeout(Duration::from_millis(millis), self.from_handler.next())
            .await
            .ok()
            .flatten()
    }

    pub async fn expect(&mut self, message_type: MessageType) -> ChaincodeMessage {
        let message = self
            .recv()
            .await
            .unwrap_or_else(|| panic!("expected {:?}, got nothing", message_type));
        assert_eq!(
            codec::message_type(&message),
            message_type,
            "unexpected message {}",
            codec::describe(&message)
        );
        message
    }

    /// Asserts the handler sends nothing for `millis`.
    pub async fn expect_silence(&mut self, millis: u64) {
        if let Some(message) = self.recv_within(millis).await {
            panic!("unexpected message {}", codec::describe(&message));
        }
    }

    pub fn respond(&self, request: &ChaincodeMessage, payload: Vec<u8>) {
        self.send(codec::new_message(
            MessageType::Response,
            &TxKey::of(request),
            payload,
        ));
    }

    pub fn reject(&self, request: &ChaincodeMessage, message: &str) {
        self.send(codec::new_message(
            MessageType::Error,
            &TxKey::of(request),
            message.as_bytes().to_vec(),
        ));
    }

    /// Waits for the read loop to exit and returns its outcome.
    pub async fn finished(self) -> Result<()> {
        let MockPeer {
            runner, to_handler, ..
        } = self;
        drop(to_handler);
        runner.await.expect("read loop panicked")
    }
}
