use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::composite_key::{
    self, partial_key_range_end, validate_simple_keys, EMPTY_KEY_SUBSTITUTE,
};
use crate::iterators::{response_metadata, HistoryQueryIterator, StateQueryIterator};
use crate::networking::codec::{self, TxKey};
use crate::networking::handler::ChaincodeHandler;
use crate::protos::{
    ChaincodeEvent, ChaincodeId, ChaincodeInput, ChaincodeMessage, ChaincodeProposalPayload,
    ChaincodeSpec, ChannelHeader, DelState, GetHistoryForKey, GetQueryResult, GetState,
    GetStateByRange, GetStateMetadata, Header, MessageType, Proposal, PurgePrivateState,
    PutState, PutStateMetadata, QueryMetadata, QueryResponse, QueryResponseMetadata, Response,
    SerializedIdentity, SignatureHeader, SignedProposal, StateMetadata, StateMetadataResult,
};
use crate::time::timestamp_to_datetime;
use crate::{Error, Result};

/// Largest value accepted by `put_state` and `put_private_data`.
pub const MAX_VALUE_SIZE: usize = 100 * 1024 * 1024;

pub const VALIDATION_PARAMETER: &str = "VALIDATION_PARAMETER";

/// Proposal fields decoded once when the transaction starts.
#[derive(Default)]
struct ProposalContext {
    signed_proposal: Option<SignedProposal>,
    creator: Option<SerializedIdentity>,
    transient: HashMap<String, Vec<u8>>,
    tx_timestamp: Option<prost_types::Timestamp>,
    binding: String,
}

impl ProposalContext {
    fn decode(signed_proposal: Option<&SignedProposal>) -> Result<Self> {
        let signed_proposal = match signed_proposal {
            Some(signed_proposal) => signed_proposal,
            None => return Ok(ProposalContext::default()),
        };
        let proposal: Proposal = codec::decode(&signed_proposal.proposal_bytes)?;
        let header: Header = codec::decode(&proposal.header)?;
        let channel_header: ChannelHeader = codec::decode(&header.channel_header)?;
        let signature_header: SignatureHeader = codec::decode(&header.signature_header)?;
        let creator: SerializedIdentity = codec::decode(&signature_header.creator)?;
        let payload: ChaincodeProposalPayload = codec::decode(&proposal.payload)?;

        let mut hasher = Sha256::new();
        hasher.update(&signature_header.nonce);
        hasher.update(&signature_header.creator);
        hasher.update(channel_header.epoch.to_le_bytes());

        Ok(ProposalContext {
            signed_proposal: Some(signed_proposal.clone()),
            creator: Some(creator),
            transient: payload.transient_map,
            tx_timestamp: channel_header.timestamp,
            binding: hex::encode(hasher.finalize()),
        })
    }
}

struct StubInner {
    handler: Arc<ChaincodeHandler>,
    key: TxKey,
    args: Vec<Vec<u8>>,
    decorations: HashMap<String, Vec<u8>>,
    proposal: ProposalContext,
    event: Mutex<Option<ChaincodeEvent>>,
}

/// Ledger access for one transaction. Cheap to clone; every clone talks to
/// the same transaction.
#[derive(Clone)]
pub struct ChaincodeStub {
    inner: Arc<StubInner>,
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must be a non-empty string", what)));
    }
    Ok(())
}

fn require_value_size(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::InvalidArgument(format!(
            "value of {} bytes exceeds the maximum of {} bytes",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}

fn query_metadata(page_size: i32, bookmark: &str) -> Result<Vec<u8>> {
    if page_size <= 0 {
        return Err(Error::InvalidArgument(format!(
            "page size must be a positive number, got {}",
            page_size
        )));
    }
    Ok(codec::encode(&QueryMetadata {
        page_size,
        bookmark: bookmark.to_string(),
    }))
}

impl ChaincodeStub {
    pub(crate) fn new(
        handler: Arc<ChaincodeHandler>,
        key: TxKey,
        message: &ChaincodeMessage,
    ) -> Result<Self> {
        let input: ChaincodeInput = codec::decode(&message.payload)?;
        let proposal = ProposalContext::decode(message.proposal.as_ref())?;
        Ok(ChaincodeStub {
            inner: Arc::new(StubInner {
                handler,
                key,
                args: input.args,
                decorations: input.decorations,
                proposal,
                event: Mutex::new(None),
            }),
        })
    }

    async fn call(&self, message_type: MessageType, payload: Vec<u8>) -> Result<ChaincodeMessage> {
        debug!(
            "{} Sending {}",
            self.inner.key,
            message_type.as_str_name()
        );
        self.inner
            .handler
            .request(&self.inner.key, message_type, payload)
            .await
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.inner.args
    }

    pub fn string_args(&self) -> Vec<String> {
        self.inner
            .args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect()
    }

    /// First argument as the function name, the rest as its parameters.
    pub fn function_and_parameters(&self) -> (String, Vec<String>) {
        let mut args = self.string_args();
        if args.is_empty() {
            return (String::new(), vec![]);
        }
        let function = args.remove(0);
        (function, args)
    }

    pub fn tx_id(&self) -> &str {
        &self.inner.key.txid
    }

    pub fn channel_id(&self) -> &str {
        &self.inner.key.channel_id
    }

    pub fn creator(&self) -> Option<&SerializedIdentity> {
        self.inner.proposal.creator.as_ref()
    }

    pub fn msp_id(&self) -> Option<&str> {
        self.creator().map(|creator| creator.mspid.as_str())
    }

    pub fn transient(&self) -> &HashMap<String, Vec<u8>> {
        &self.inner.proposal.transient
    }

    pub fn signed_proposal(&self) -> Option<&SignedProposal> {
        self.inner.proposal.signed_proposal.as_ref()
    }

    pub fn tx_timestamp(&self) -> Option<&prost_types::Timestamp> {
        self.inner.proposal.tx_timestamp.as_ref()
    }

    pub fn date_timestamp(&self) -> Option<DateTime<Utc>> {
        self.tx_timestamp().and_then(timestamp_to_datetime)
    }

    /// Hex SHA-256 over nonce, creator and epoch; empty without a proposal.
    pub fn binding(&self) -> &str {
        &self.inner.proposal.binding
    }

    pub fn decorations(&self) -> &HashMap<String, Vec<u8>> {
        &self.inner.decorations
    }

    pub async fn get_state(&self, key: &str) -> Result<Vec<u8>> {
        require_non_empty(key, "key")?;
        self.fetch_state(key, "", MessageType::GetState, "GetState")
            .await
    }

    pub async fn put_state(&self, key: &str, value: &[u8]) -> Result<()> {
        require_non_empty(key, "key")?;
        self.store_state(key, value, "").await
    }

    pub async fn delete_state(&self, key: &str) -> Result<()> {
        require_non_empty(key, "key")?;
        self.remove_state(key, "", MessageType::DelState, "DeleteState")
            .await
    }

    pub async fn set_state_validation_parameter(&self, key: &str, policy: &[u8]) -> Result<()> {
        require_non_empty(key, "key")?;
        self.store_validation_parameter(key, "", policy).await
    }

    pub async fn get_state_validation_parameter(&self, key: &str) -> Result<Vec<u8>> {
        require_non_empty(key, "key")?;
        self.fetch_validation_parameter(key, "").await
    }

    pub async fn get_state_by_range(
        &self,
        start_key: &str,
        end_key: &str,
    ) -> Result<StateQueryIterator> {
        let start_key = if start_key.is_empty() {
            EMPTY_KEY_SUBSTITUTE
        } else {
            start_key
        };
        validate_simple_keys(&[start_key, end_key])?;
        let response = self.range_query(start_key, end_key, "", vec![]).await?;
        Ok(self.state_iterator(response))
    }

    pub async fn get_state_by_range_with_pagination(
        &self,
        start_key: &str,
        end_key: &str,
        page_size: i32,
        bookmark: &str,
    ) -> Result<(StateQueryIterator, QueryResponseMetadata)> {
        let start_key = if start_key.is_empty() {
            EMPTY_KEY_SUBSTITUTE
        } else {
            start_key
        };
        validate_simple_keys(&[start_key, end_key])?;
        let metadata = query_metadata(page_size, bookmark)?;
        let response = self.range_query(start_key, end_key, "", metadata).await?;
        self.paged_iterator(response)
    }

    pub async fn get_state_by_partial_composite_key<S: AsRef<str>>(
        &self,
        object_type: &str,
        attributes: &[S],
    ) -> Result<StateQueryIterator> {
        let start_key = composite_key::create_composite_key(object_type, attributes)?;
        let end_key = partial_key_range_end(&start_key);
        let response = self.range_query(&start_key, &end_key, "", vec![]).await?;
        Ok(self.state_iterator(response))
    }

    pub async fn get_state_by_partial_composite_key_with_pagination<S: AsRef<str>>(
        &self,
        object_type: &str,
        attributes: &[S],
        page_size: i32,
        bookmark: &str,
    ) -> Result<(StateQueryIterator, QueryResponseMetadata)> {
        let start_key = composite_key::create_composite_key(object_type, attributes)?;
        let end_key = partial_key_range_end(&start_key);
        let metadata = query_metadata(page_size, bookmark)?;
        let response = self
            .range_query(&start_key, &end_key, "", metadata)
            .await?;
        self.paged_iterator(response)
    }

    pub async fn get_query_result(&self, query: &str) -> Result<StateQueryIterator> {
        let response = self.rich_query(query, "", vec![]).await?;
        Ok(self.state_iterator(response))
    }

    pub async fn get_query_result_with_pagination(
        &self,
        query: &str,
        page_size: i32,
        bookmark: &str,
    ) -> Result<(StateQueryIterator, QueryResponseMetadata)> {
        let metadata = query_metadata(page_size, bookmark)?;
        let response = self.rich_query(query, "", metadata).await?;
        self.paged_iterator(response)
    }

    pub async fn get_history_for_key(&self, key: &str) -> Result<HistoryQueryIterator> {
        require_non_empty(key, "key")?;
        let request = GetHistoryForKey {
            key: key.to_string(),
        };
        let reply = self
            .call(MessageType::GetHistoryForKey, codec::encode(&request))
            .await?;
        let response: QueryResponse = codec::decode_response(reply, "GetHistoryForKey")?;
        Ok(HistoryQueryIterator::new(
            self.inner.handler.clone(),
            self.inner.key.clone(),
            response,
        ))
    }

    pub async fn get_private_data(&self, collection: &str, key: &str) -> Result<Vec<u8>> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.fetch_state(key, collection, MessageType::GetState, "GetPrivateData")
            .await
    }

    pub async fn get_private_data_hash(&self, collection: &str, key: &str) -> Result<Vec<u8>> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.fetch_state(
            key,
            collection,
            MessageType::GetPrivateDataHash,
            "GetPrivateDataHash",
        )
        .await
    }

    pub async fn put_private_data(&self, collection: &str, key: &str, value: &[u8]) -> Result<()> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.store_state(key, value, collection).await
    }

    pub async fn delete_private_data(&self, collection: &str, key: &str) -> Result<()> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.remove_state(key, collection, MessageType::DelState, "DeletePrivateData")
            .await
    }

    /// Removes the key and its history from the private data store.
    pub async fn purge_private_data(&self, collection: &str, key: &str) -> Result<()> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.remove_state(
            key,
            collection,
            MessageType::PurgePrivateData,
            "PurgePrivateData",
        )
        .await
    }

    pub async fn set_private_data_validation_parameter(
        &self,
        collection: &str,
        key: &str,
        policy: &[u8],
    ) -> Result<()> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.store_validation_parameter(key, collection, policy)
            .await
    }

    pub async fn get_private_data_validation_parameter(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Vec<u8>> {
        require_non_empty(collection, "collection")?;
        require_non_empty(key, "key")?;
        self.fetch_validation_parameter(key, collection).await
    }

    pub async fn get_private_data_by_range(
        &self,
        collection: &str,
        start_key: &str,
        end_key: &str,
    ) -> Result<StateQueryIterator> {
        require_non_empty(collection, "collection")?;
        let start_key = if start_key.is_empty() {
            EMPTY_KEY_SUBSTITUTE
        } else {
            start_key
        };
        validate_simple_keys(&[start_key, end_key])?;
        let response = self
            .range_query(start_key, end_key, collection, vec![])
            .await?;
        Ok(self.state_iterator(response))
    }

    pub async fn get_private_data_by_partial_composite_key<S: AsRef<str>>(
        &self,
        collection: &str,
        object_type: &str,
        attributes: &[S],
    ) -> Result<StateQueryIterator> {
        require_non_empty(collection, "collection")?;
        let start_key = composite_key::create_composite_key(object_type, attributes)?;
        let end_key = partial_key_range_end(&start_key);
        let response = self
            .range_query(&start_key, &end_key, collection, vec![])
            .await?;
        Ok(self.state_iterator(response))
    }

    pub async fn get_private_data_query_result(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<StateQueryIterator> {
        require_non_empty(collection, "collection")?;
        let response = self.rich_query(query, collection, vec![]).await?;
        Ok(self.state_iterator(response))
    }

    /// Calls another chaincode. `channel` defaults to this transaction's
    /// channel on the peer side.
    pub async fn invoke_chaincode(
        &self,
        chaincode_name: &str,
        args: Vec<Vec<u8>>,
        channel: Option<&str>,
    ) -> Result<Response> {
        require_non_empty(chaincode_name, "chaincode name")?;
        let name = match channel {
            Some(channel) if !channel.is_empty() => format!("{}/{}", chaincode_name, channel),
            _ => chaincode_name.to_string(),
        };
        let spec = ChaincodeSpec {
            chaincode_id: Some(ChaincodeId {
                name,
                ..Default::default()
            }),
            input: Some(ChaincodeInput {
                args,
                ..Default::default()
            }),
            ..Default::default()
        };
        let reply = self
            .call(MessageType::InvokeChaincode, codec::encode(&spec))
            .await?;
        let nested: ChaincodeMessage = codec::decode_response(reply, "InvokeChaincode")?;
        match codec::message_type(&nested) {
            MessageType::Completed => codec::decode(&nested.payload),
            _ => Err(Error::PeerRejected(
                String::from_utf8_lossy(&nested.payload).into_owned(),
            )),
        }
    }

    /// Attaches an event to the transaction's COMPLETED message. A later
    /// call replaces an earlier one.
    pub fn set_event<P: Into<Vec<u8>>>(&self, name: &str, payload: P) -> Result<()> {
        require_non_empty(name, "event name")?;
        let event = ChaincodeEvent {
            event_name: name.to_string(),
            payload: payload.into(),
            ..Default::default()
        };
        *self
            .inner
            .event
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(event);
        Ok(())
    }

    pub(crate) fn take_event(&self) -> Option<ChaincodeEvent> {
        self.inner
            .event
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    pub fn create_composite_key<S: AsRef<str>>(
        &self,
        object_type: &str,
        attributes: &[S],
    ) -> Result<String> {
        composite_key::create_composite_key(object_type, attributes)
    }

    pub fn split_composite_key(&self, composite_key: &str) -> Result<(String, Vec<String>)> {
        composite_key::split_composite_key(composite_key)
    }

    async fn fetch_state(
        &self,
        key: &str,
        collection: &str,
        message_type: MessageType,
        call: &str,
    ) -> Result<Vec<u8>> {
        let request = GetState {
            key: key.to_string(),
            collection: collection.to_string(),
        };
        let reply = self.call(message_type, codec::encode(&request)).await?;
        codec::response_payload(reply, call)
    }

    async fn store_state(&self, key: &str, value: &[u8], collection: &str) -> Result<()> {
        require_value_size(value)?;
        let request = PutState {
            key: key.to_string(),
            value: value.to_vec(),
            collection: collection.to_string(),
        };
        let reply = self
            .call(MessageType::PutState, codec::encode(&request))
            .await?;
        codec::response_payload(reply, "PutState")?;
        Ok(())
    }

    async fn remove_state(
        &self,
        key: &str,
        collection: &str,
        message_type: MessageType,
        call: &str,
    ) -> Result<()> {
        let payload = if message_type == MessageType::PurgePrivateData {
            codec::encode(&PurgePrivateState {
                key: key.to_string(),
                collection: collection.to_string(),
            })
        } else {
            codec::encode(&DelState {
                key: key.to_string(),
                collection: collection.to_string(),
            })
        };
        let reply = self.call(message_type, payload).await?;
        codec::response_payload(reply, call)?;
        Ok(())
    }

    async fn store_validation_parameter(
        &self,
        key: &str,
        collection: &str,
        policy: &[u8],
    ) -> Result<()> {
        let request = PutStateMetadata {
            key: key.to_string(),
            collection: collection.to_string(),
            metadata: Some(StateMetadata {
                metakey: VALIDATION_PARAMETER.to_string(),
                value: policy.to_vec(),
            }),
        };
        let reply = self
            .call(MessageType::PutStateMetadata, codec::encode(&request))
            .await?;
        codec::response_payload(reply, "PutStateMetadata")?;
        Ok(())
    }

    async fn fetch_validation_parameter(&self, key: &str, collection: &str) -> Result<Vec<u8>> {
        let request = GetStateMetadata {
            key: key.to_string(),
            collection: collection.to_string(),
        };
        let reply = self
            .call(MessageType::GetStateMetadata, codec::encode(&request))
            .await?;
        let result: StateMetadataResult = codec::decode_response(reply, "GetStateMetadata")?;
        Ok(result
            .entries
            .into_iter()
            .find(|entry| entry.metakey == VALIDATION_PARAMETER)
            .map(|entry| entry.value)
            .unwrap_or_default())
    }

    async fn range_query(
        &self,
        start_key: &str,
        end_key: &str,
        collection: &str,
        metadata: Vec<u8>,
    ) -> Result<QueryResponse> {
        let request = GetStateByRange {
            start_key: start_key.to_string(),
            end_key: end_key.to_string(),
            collection: collection.to_string(),
            metadata,
        };
        let reply = self
            .call(MessageType::GetStateByRange, codec::encode(&request))
            .await?;
        codec::decode_response(reply, "GetStateByRange")
    }

    async fn rich_query(
        &self,
        query: &str,
        collection: &str,
        metadata: Vec<u8>,
    ) -> Result<QueryResponse> {
        require_non_empty(query, "query")?;
        let request = GetQueryResult {
            query: query.to_string(),
            collection: collection.to_string(),
            metadata,
        };
        let reply = self
            .call(MessageType::GetQueryResult, codec::encode(&request))
            .await?;
        codec::decode_response(reply, "GetQueryResult")
    }

    fn state_iterator(&self, response: QueryResponse) -> StateQueryIterator {
        StateQueryIterator::new(self.inner.handler.clone(), self.inner.key.clone(), response)
    }

    fn paged_iterator(
        &self,
        response: QueryResponse,
    ) -> Result<(StateQueryIterator, QueryResponseMetadata)> {
        let metadata = response_metadata(&response)?;
        Ok((self.state_iterator(response), metadata))
    }
}
