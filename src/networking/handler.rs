use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock as SyncRwLock};

use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;
use tracing::{debug, error, event, info, warn, Level};

use crate::chaincode::{self, Chaincode};
use crate::networking::codec::{self, TxKey};
use crate::protos::{ChaincodeEvent, ChaincodeId, ChaincodeMessage, MessageType, Response};
use crate::stub::ChaincodeStub;
use crate::time::create_timestamp;
use crate::{Error, Result};

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Lifecycle of the stream to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    AwaitingRegistered,
    Established,
    Ready,
    Closed,
    Errored,
}

/// A state request waiting for the peer. Only the head of a transaction's
/// queue is on the wire; the others still hold their message.
struct PendingRequest {
    sequence: u64,
    message_type: MessageType,
    message: Option<ChaincodeMessage>,
    responder: oneshot::Sender<Result<ChaincodeMessage>>,
    created_at: u64,
}

#[derive(Default)]
struct TransactionEntry {
    queue: VecDeque<PendingRequest>,
}

/// Drives one chaincode stream: the registration handshake, per-transaction
/// dispatch to the [`Chaincode`], and correlation of state requests with the
/// peer's replies.
///
/// All outbound messages go through one unbounded queue. The transport owns
/// the receiving end (see [`ChaincodeHandler::new`]) and forwards it to the
/// gRPC request stream.
pub struct ChaincodeHandler {
    chaincode: Arc<dyn Chaincode>,
    chaincode_id: ChaincodeId,
    state: RwLock<ChannelState>,
    outbound: SyncRwLock<Option<mpsc::UnboundedSender<ChaincodeMessage>>>,
    transactions: Mutex<HashMap<TxKey, TransactionEntry>>,
    sequence: AtomicU64,
    closed: Notify,
}

impl ChaincodeHandler {
    pub fn new(
        chaincode: Arc<dyn Chaincode>,
        chaincode_id: ChaincodeId,
    ) -> (Arc<ChaincodeHandler>, UnboundedReceiverStream<ChaincodeMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler = ChaincodeHandler {
            chaincode,
            chaincode_id,
            state: RwLock::new(ChannelState::Created),
            outbound: SyncRwLock::new(Some(sender)),
            transactions: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            closed: Notify::new(),
        };
        (Arc::new(handler), UnboundedReceiverStream::new(receiver))
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    pub fn chaincode_id(&self) -> &ChaincodeId {
        &self.chaincode_id
    }

    /// Queues REGISTER. Must be called once, before [`ChaincodeHandler::run`]
    /// sees the first inbound message.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != ChannelState::Created {
            return Err(Error::ProtocolViolation(format!(
                "cannot register from state {:?}",
                *state
            )));
        }
        event!(
            Level::INFO,
            "Registering with peer as chaincode {:?}",
            self.chaincode_id.name
        );
        self.send(codec::register_message(&self.chaincode_id))?;
        *state = ChannelState::AwaitingRegistered;
        Ok(())
    }

    /// Read loop. Returns when the stream ends, fails, or the channel is
    /// closed locally. Every outcome except a local close is an error, and
    /// leaves the channel `Errored` with all pending requests rejected.
    pub async fn run<S>(self: Arc<Self>, inbound: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<ChaincodeMessage, Status>> + Send + 'static,
    {
        let mut inbound = Box::pin(inbound);
        loop {
            let next = tokio::select! {
                next = inbound.next() => next,
                _ = self.closed.notified() => return Ok(()),
            };
            let failure = match next {
                Some(Ok(message)) => match self.handle_message(message).await {
                    Ok(()) => continue,
                    Err(err) => err,
                },
                Some(Err(status)) => {
                    Error::ConnectionLost(format!("stream error: {}", status.message()))
                }
                None => {
                    if self.state().await == ChannelState::Closed {
                        return Ok(());
                    }
                    Error::ConnectionLost(String::from("peer closed the stream"))
                }
            };
            event!(Level::ERROR, "Chaincode stream terminated: {}", failure);
            self.terminate(ChannelState::Errored, &failure.to_string())
                .await;
            return Err(failure);
        }
    }

    /// Shuts the channel down from this side. Pending requests are rejected
    /// with `ConnectionLost` and the outbound stream ends.
    pub async fn close(&self) {
        self.terminate(ChannelState::Closed, "channel closed").await;
        self.closed.notify_one();
    }

    async fn handle_message(self: &Arc<Self>, message: ChaincodeMessage) -> Result<()> {
        let message_type = codec::message_type(&message);
        if message_type == MessageType::Keepalive {
            debug!("Received KEEPALIVE");
            return Ok(());
        }
        let state = self.state().await;
        debug!("Received {} in state {:?}", codec::describe(&message), state);
        match (state, message_type) {
            (ChannelState::AwaitingRegistered, MessageType::Registered) => {
                info!("Successfully registered with peer node. State transferred to \"established\"");
                self.set_state(ChannelState::Established).await;
                Ok(())
            }
            (ChannelState::Established, MessageType::Ready) => {
                info!("Successfully established communication with peer node. State transferred to \"ready\"");
                self.set_state(ChannelState::Ready).await;
                Ok(())
            }
            (ChannelState::AwaitingRegistered, MessageType::Error)
            | (ChannelState::Established, MessageType::Error) => Err(Error::PeerRejected(format!(
                "peer rejected registration: {}",
                String::from_utf8_lossy(&message.payload)
            ))),
            (ChannelState::Ready, MessageType::Init)
            | (ChannelState::Ready, MessageType::Transaction) => {
                self.begin_transaction(message).await
            }
            (ChannelState::Ready, MessageType::Response)
            | (ChannelState::Ready, MessageType::Error) => self.resolve_request(message).await,
            (ChannelState::Closed, _) | (ChannelState::Errored, _) => {
                debug!("Dropping {} on a finished channel", codec::describe(&message));
                Ok(())
            }
            (state, message_type) => Err(Error::ProtocolViolation(format!(
                "{} received unexpected message type {} in state {:?}",
                TxKey::of(&message),
                message_type.as_str_name(),
                state
            ))),
        }
    }

    async fn set_state(&self, state: ChannelState) {
        *self.state.write().await = state;
    }

    fn send(&self, message: ChaincodeMessage) -> Result<()> {
        let outbound = self
            .outbound
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match outbound.as_ref() {
            Some(sender) => sender
                .send(message)
                .map_err(|_| Error::ConnectionLost(String::from("outbound stream dropped"))),
            None => Err(Error::ConnectionLost(String::from("channel is closed"))),
        }
    }

    async fn begin_transaction(self: &Arc<Self>, message: ChaincodeMessage) -> Result<()> {
        let key = TxKey::of(&message);
        {
            let mut transactions = self.transactions.lock().await;
            if transactions.contains_key(&key) {
                return Err(Error::ProtocolViolation(format!(
                    "{} received {} for a transaction that is already executing",
                    key,
                    codec::message_type(&message).as_str_name()
                )));
            }
            transactions.insert(key.clone(), TransactionEntry::default());
        }
        let handler = self.clone();
        tokio::spawn(async move {
            handler.execute_transaction(key, message).await;
        });
        Ok(())
    }

    async fn execute_transaction(self: Arc<Self>, key: TxKey, message: ChaincodeMessage) {
        let is_init = codec::message_type(&message) == MessageType::Init;
        debug!("{} Calling chaincode {}", key, if is_init { "Init()" } else { "Invoke()" });
        let outcome = match ChaincodeStub::new(self.clone(), key.clone(), &message) {
            Ok(stub) => {
                let call = if is_init {
                    self.chaincode.init(stub.clone())
                } else {
                    self.chaincode.invoke(stub.clone())
                };
                let result = match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(Error::Transaction(format!(
                        "chaincode panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                };
                result.map(|response| (response, stub.take_event()))
            }
            Err(err) => Err(err),
        };
        self.complete_transaction(&key, outcome).await;
    }

    /// Sends the transaction's one final message and forgets it. Requests the
    /// chaincode left behind are rejected.
    async fn complete_transaction(
        &self,
        key: &TxKey,
        outcome: Result<(Response, Option<ChaincodeEvent>)>,
    ) {
        let mut transactions = self.transactions.lock().await;
        let entry = match transactions.remove(key) {
            Some(entry) => entry,
            None => {
                debug!("{} Channel went away before the transaction finished", key);
                return;
            }
        };
        for pending in entry.queue {
            let _ = pending
                .responder
                .send(Err(Error::TransactionCompleted(key.txid.clone())));
        }
        let reply = match outcome {
            Ok((mut response, event)) => {
                if response.status == 0 {
                    let message = format!("{} Calling chaincode has not called success or error.", key);
                    error!("{}", message);
                    response = chaincode::error(message);
                }
                debug!("{} Completed with status {}", key, response.status);
                codec::completed_message(key, &response, event)
            }
            Err(err) => {
                error!("{} Transaction failed: {}", key, err);
                codec::error_message(key, &err)
            }
        };
        if let Err(err) = self.send(reply) {
            warn!("{} Could not send final response: {}", key, err);
        }
    }

    /// Sends a state request for `key` and waits for the peer's RESPONSE or
    /// ERROR. Requests of one transaction are put on the wire one at a time,
    /// in the order this is called.
    pub(crate) async fn request(
        &self,
        key: &TxKey,
        message_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<ChaincodeMessage> {
        let (responder, response) = oneshot::channel();
        {
            match self.state().await {
                ChannelState::Ready => {}
                state => {
                    return Err(Error::ConnectionLost(format!(
                        "cannot send {} in state {:?}",
                        message_type.as_str_name(),
                        state
                    )))
                }
            }
            let mut transactions = self.transactions.lock().await;
            let entry = transactions
                .get_mut(key)
                .ok_or_else(|| Error::TransactionCompleted(key.txid.clone()))?;
            let message = codec::new_message(message_type, key, payload);
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            let pending_message = if entry.queue.is_empty() {
                self.send(message)?;
                None
            } else {
                Some(message)
            };
            debug!(
                "{} Queued {} as request #{} ({} ahead)",
                key,
                message_type.as_str_name(),
                sequence,
                entry.queue.len()
            );
            entry.queue.push_back(PendingRequest {
                sequence,
                message_type,
                message: pending_message,
                responder,
                created_at: create_timestamp(),
            });
        }
        response.await.map_err(|_| {
            Error::ConnectionLost(format!("{} request dropped without a reply", key))
        })?
    }

    async fn resolve_request(&self, message: ChaincodeMessage) -> Result<()> {
        let key = TxKey::of(&message);
        let mut transactions = self.transactions.lock().await;
        let entry = match transactions.get_mut(&key) {
            Some(entry) => entry,
            None => {
                warn!(
                    "{} Received {} for a transaction that is not executing, dropping it",
                    key,
                    codec::message_type(&message).as_str_name()
                );
                return Ok(());
            }
        };
        let pending = match entry.queue.pop_front() {
            Some(pending) => pending,
            None => {
                warn!(
                    "{} Received {} with no request outstanding, dropping it",
                    key,
                    codec::message_type(&message).as_str_name()
                );
                return Ok(());
            }
        };
        debug!(
            "{} Request #{} {} answered after {}ms",
            key,
            pending.sequence,
            pending.message_type.as_str_name(),
            create_timestamp().saturating_sub(pending.created_at)
        );
        let _ = pending.responder.send(Ok(message));
        if let Some(next) = entry.queue.front_mut() {
            if let Some(next_message) = next.message.take() {
                self.send(next_message)?;
            }
        }
        Ok(())
    }

    async fn terminate(&self, state: ChannelState, reason: &str) {
        self.set_state(state).await;
        self.outbound
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let transactions: Vec<(TxKey, TransactionEntry)> =
            self.transactions.lock().await.drain().collect();
        for (key, entry) in transactions {
            if !entry.queue.is_empty() {
                warn!("{} Rejecting {} pending requests: {}", key, entry.queue.len(), reason);
            }
            for pending in entry.queue {
                let _ = pending
                    .responder
                    .send(Err(Error::ConnectionLost(reason.to_string())));
            }
        }
    }

    /// Number of requests still waiting for the peer, across all transactions.
    pub async fn pending_requests(&self) -> usize {
        self.transactions
            .lock()
            .await
            .values()
            .map(|entry| entry.queue.len())
            .sum()
    }
}
