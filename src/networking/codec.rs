use std::fmt;

use prost::Message;

use crate::protos::{ChaincodeEvent, ChaincodeId, ChaincodeMessage, MessageType, Response};
use crate::time::create_proto_timestamp;
use crate::util::short_txid;
use crate::{Error, Result};

/// Identifies one transaction on the stream. The peer may reuse a txid on
/// another channel, so the channel is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxKey {
    pub channel_id: String,
    pub txid: String,
}

impl TxKey {
    pub fn new<C: Into<String>, T: Into<String>>(channel_id: C, txid: T) -> Self {
        TxKey {
            channel_id: channel_id.into(),
            txid: txid.into(),
        }
    }

    pub fn of(message: &ChaincodeMessage) -> Self {
        TxKey::new(message.channel_id.as_str(), message.txid.as_str())
    }
}

impl fmt::Display for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.channel_id, short_txid(&self.txid))
    }
}

pub fn encode<M: Message>(message: &M) -> Vec<u8> {
    message.encode_to_vec()
}

pub fn decode<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    Ok(M::decode(bytes)?)
}

/// Unknown type numbers decode as `Undefined`, which no state accepts.
pub fn message_type(message: &ChaincodeMessage) -> MessageType {
    MessageType::try_from(message.r#type).unwrap_or(MessageType::Undefined)
}

pub fn new_message(
    message_type: MessageType,
    key: &TxKey,
    payload: Vec<u8>,
) -> ChaincodeMessage {
    ChaincodeMessage {
        r#type: message_type as i32,
        timestamp: Some(create_proto_timestamp()),
        payload,
        txid: key.txid.clone(),
        proposal: None,
        chaincode_event: None,
        channel_id: key.channel_id.clone(),
    }
}

pub fn register_message(chaincode_id: &ChaincodeId) -> ChaincodeMessage {
    ChaincodeMessage {
        r#type: MessageType::Register as i32,
        timestamp: Some(create_proto_timestamp()),
        payload: encode(chaincode_id),
        ..Default::default()
    }
}

pub fn completed_message(
    key: &TxKey,
    response: &Response,
    event: Option<ChaincodeEvent>,
) -> ChaincodeMessage {
    let mut message = new_message(MessageType::Completed, key, encode(response));
    message.chaincode_event = event;
    message
}

pub fn error_message(key: &TxKey, error: &Error) -> ChaincodeMessage {
    new_message(MessageType::Error, key, error.to_string().into_bytes())
}

/// Payload of a RESPONSE to `call`. An ERROR reply carries the peer's
/// message; any other type means the peer and shim disagree on the protocol.
pub fn response_payload(reply: ChaincodeMessage, call: &str) -> Result<Vec<u8>> {
    match message_type(&reply) {
        MessageType::Response => Ok(reply.payload),
        MessageType::Error => Err(Error::PeerRejected(
            String::from_utf8_lossy(&reply.payload).into_owned(),
        )),
        other => Err(Error::ProtocolViolation(format!(
            "{} Received incorrect chaincode in response to the {}() call: type=\"{}\", expecting \"RESPONSE\"",
            TxKey::of(&reply),
            call,
            other.as_str_name()
        ))),
    }
}

pub fn decode_response<M: Message + Default>(reply: ChaincodeMessage, call: &str) -> Result<M> {
    decode(&response_payload(reply, call)?)
}

/// One-line summary for logs; payloads can be large.
pub fn describe(message: &ChaincodeMessage) -> String {
    format!(
        "{} {} ({} bytes)",
        TxKey::of(message),
        message_type(message).as_str_name(),
        message.payload.len()
    )
}
