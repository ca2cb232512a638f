/*!

# Chaincode Protocol

## Introduction

A chaincode process talks to exactly one peer over a single gRPC bidirectional stream of
`protos.ChaincodeMessage`. The stream is opened either by the chaincode
(`protos.ChaincodeSupport/Register`, see [client]) or by the peer (`protos.Chaincode/Connect`,
see [server]). Either way the same [handler::ChaincodeHandler] drives it.

Every message is an envelope:

```bytes
type          ChaincodeMessage.Type
timestamp     google.protobuf.Timestamp
payload       bytes, meaning depends on type
txid          string
proposal      SignedProposal (INIT and TRANSACTION only)
chaincode_event ChaincodeEvent (COMPLETED only)
channel_id    string
```

Messages belonging to one transaction are identified by the pair `(channel_id, txid)`. The
peer may run several transactions with the same txid on different channels at once.

## Handshake

```bytes
chaincode                         peer
    REGISTER(ChaincodeID)  ---->
                           <----  REGISTERED
                           <----  READY
```

Until READY arrives the only other acceptable message is ERROR, which means the peer refused
the registration. Anything else is a protocol violation and the channel is torn down.
KEEPALIVE may arrive at any time and is ignored.

## Transactions

```bytes
                           <----  INIT | TRANSACTION (ChaincodeInput, SignedProposal)
    GET_STATE(GetState)    ---->
                           <----  RESPONSE(value) | ERROR(message)
    ...
    COMPLETED(Response)    ---->    or    ERROR(message)
```

While a transaction executes, its state requests go on the wire strictly one at a time in the
order they were issued. The peer answers each with RESPONSE or ERROR carrying the same
`(channel_id, txid)`; the answer always belongs to the oldest outstanding request of that
transaction. Each transaction ends with exactly one COMPLETED or ERROR from the chaincode.

## Request payloads

```bytes
GET_STATE              GetState                RESPONSE: raw value (empty if absent)
PUT_STATE              PutState                RESPONSE: empty
DEL_STATE              DelState                RESPONSE: empty
PURGE_PRIVATE_DATA     PurgePrivateState       RESPONSE: empty
GET_PRIVATE_DATA_HASH  GetState                RESPONSE: hash bytes
GET_STATE_METADATA     GetStateMetadata        RESPONSE: StateMetadataResult
PUT_STATE_METADATA     PutStateMetadata        RESPONSE: empty
GET_STATE_BY_RANGE     GetStateByRange         RESPONSE: QueryResponse
GET_QUERY_RESULT       GetQueryResult          RESPONSE: QueryResponse
GET_HISTORY_FOR_KEY    GetHistoryForKey        RESPONSE: QueryResponse
QUERY_STATE_NEXT       QueryStateNext          RESPONSE: QueryResponse
QUERY_STATE_CLOSE      QueryStateClose         RESPONSE: QueryResponse
INVOKE_CHAINCODE       ChaincodeSpec           RESPONSE: ChaincodeMessage(COMPLETED(Response) | ERROR)
```

*/
pub mod client;
pub mod codec;
pub mod handler;
pub mod server;
