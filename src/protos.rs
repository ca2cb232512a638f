//! Types generated from the vendored Fabric protos (see `build.rs`).
//!
//! The module names mirror the proto packages so that cross-package
//! references in the generated code (`super::common::…`) resolve.

#[allow(clippy::all)]
pub mod common {
    tonic::include_proto!("common");
}

#[allow(clippy::all)]
pub mod msp {
    tonic::include_proto!("msp");
}

#[allow(clippy::all)]
pub mod queryresult {
    tonic::include_proto!("queryresult");
}

#[allow(clippy::all)]
pub mod protos {
    tonic::include_proto!("protos");
}

pub use self::common::{ChannelHeader, Header, SignatureHeader};
pub use self::msp::SerializedIdentity;
pub use self::protos::chaincode_message::Type as MessageType;
pub use self::protos::{
    ChaincodeEvent, ChaincodeId, ChaincodeInput, ChaincodeMessage, ChaincodeProposalPayload,
    ChaincodeSpec, DelState, GetHistoryForKey, GetQueryResult, GetState, GetStateByRange,
    GetStateMetadata, Proposal, PurgePrivateState, PutState, PutStateMetadata, QueryMetadata,
    QueryResponse, QueryResponseMetadata, QueryResultBytes, QueryStateClose, QueryStateNext,
    Response, SignedProposal, StateMetadata, StateMetadataResult,
};
pub use self::queryresult::{KeyModification, Kv};
