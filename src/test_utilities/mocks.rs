use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use uuid::Uuid;

use crate::chaincode::{self, Chaincode};
use crate::networking::codec::{self, TxKey};
use crate::protos::{
    ChaincodeInput, ChaincodeMessage, ChaincodeProposalPayload, ChannelHeader, Header, Kv,
    MessageType, Proposal, QueryResponse, QueryResultBytes, Response, SerializedIdentity,
    SignatureHeader, SignedProposal,
};
use crate::stub::ChaincodeStub;
use crate::{Error, Result};

/// Chaincode driven by its first argument:
///
/// - `get <key>` returns the stored value
/// - `put <key> <value>` stores it
/// - `fail <message>` errors
/// - anything else echoes the function name back
pub struct EchoChaincode;

#[async_trait]
impl Chaincode for EchoChaincode {
    async fn init(&self, _stub: ChaincodeStub) -> Result<Response> {
        Ok(chaincode::success(vec![]))
    }

    async fn invoke(&self, stub: ChaincodeStub) -> Result<Response> {
        let (function, params) = stub.function_and_parameters();
        match function.as_str() {
            "get" => Ok(chaincode::success(stub.get_state(&params[0]).await?)),
            "put" => {
                stub.put_state(&params[0], params[1].as_bytes()).await?;
                Ok(chaincode::success(vec![]))
            }
            "fail" => Err(Error::transaction(params.join(" "))),
            _ => Ok(chaincode::success(function)),
        }
    }
}

/// Chaincode whose init and invoke both run `F`.
pub struct FnChaincode<F>(pub F);

#[async_trait]
impl<F, Fut> Chaincode for FnChaincode<F>
where
    F: Fn(ChaincodeStub) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn init(&self, stub: ChaincodeStub) -> Result<Response> {
        (self.0)(stub).await
    }

    async fn invoke(&self, stub: ChaincodeStub) -> Result<Response> {
        (self.0)(stub).await
    }
}

pub fn new_txid() -> String {
    Uuid::new_v4().to_simple().to_string()
}

pub fn make_input(args: &[&str]) -> ChaincodeInput {
    ChaincodeInput {
        args: args.iter().map(|arg| arg.as_bytes().to_vec()).collect(),
        ..Default::default()
    }
}

pub fn make_transaction_message(
    channel_id: &str,
    txid: &str,
    input: &ChaincodeInput,
) -> ChaincodeMessage {
    codec::new_message(
        MessageType::Transaction,
        &TxKey::new(channel_id, txid),
        codec::encode(input),
    )
}

pub fn make_init_message(channel_id: &str, txid: &str, input: &ChaincodeInput) -> ChaincodeMessage {
    codec::new_message(
        MessageType::Init,
        &TxKey::new(channel_id, txid),
        codec::encode(input),
    )
}

/// A proposal as a client would sign it, minus the signature.
pub fn make_signed_proposal(
    mspid: &str,
    nonce: &[u8],
    epoch: u64,
    timestamp: prost_types::Timestamp,
    transient: HashMap<String, Vec<u8>>,
) -> SignedProposal {
    let creator = codec::encode(&SerializedIdentity {
        mspid: mspid.to_string(),
        id_bytes: b"-----BEGIN CERTIFICATE-----".to_vec(),
    });
    let channel_header = ChannelHeader {
        timestamp: Some(timestamp),
        epoch,
        ..Default::default()
    };
    let signature_header = SignatureHeader {
        creator,
        nonce: nonce.to_vec(),
    };
    let header = Header {
        channel_header: codec::encode(&channel_header),
        signature_header: codec::encode(&signature_header),
    };
    let payload = ChaincodeProposalPayload {
        input: vec![],
        transient_map: transient,
    };
    let proposal = Proposal {
        header: codec::encode(&header),
        payload: codec::encode(&payload),
        extension: vec![],
    };
    SignedProposal {
        proposal_bytes: codec::encode(&proposal),
        signature: vec![],
    }
}

pub fn make_kv(key: &str, value: &str) -> Kv {
    Kv {
        namespace: String::from("mycc"),
        key: key.to_string(),
        value: value.as_bytes().to_vec(),
    }
}

pub fn make_query_response(records: &[Kv], has_more: bool, id: &str) -> QueryResponse {
    QueryResponse {
        results: records
            .iter()
            .map(|record| QueryResultBytes {
                result_bytes: codec::encode(record),
            })
            .collect(),
        has_more,
        id: id.to_string(),
        metadata: vec![],
    }
}
