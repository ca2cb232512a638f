use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crate::chaincode::OK;
use crate::contract::{
    Context, Contract, ContractRouter, Transaction, TransactionFn, TransactionHooks,
    SYSTEM_CONTRACT_NAME,
};
use crate::networking::codec;
use crate::protos::{MessageType, PutState, Response};
use crate::test_utilities::mock_peer::MockPeer;
use crate::{Error, Result};
use serde_json::{json, Value};

fn asset_router() -> ContractRouter {
    ContractRouter::builder()
        .info("asset-transfer", "1.0.0")
        .component(
            "Asset",
            json!({
                "type": "object",
                "required": ["id", "color"],
                "properties": {
                    "id": {"type": "string"},
                    "color": {"type": "string"}
                }
            }),
        )
        .contract(
            Contract::new("assets")
                .default_contract()
                .transaction(
                    Transaction::submit("CreateAsset")
                        .param("id", json!({"type": "string"}))
                        .handler(|ctx: Context, args: Vec<Value>| async move {
                            let id = args[0].as_str().unwrap_or_default().to_string();
                            ctx.stub().put_state(&id, b"{}").await?;
                            Ok::<Value, Error>(Value::String(id))
                        }),
                )
                .transaction(
                    Transaction::submit("StoreAsset")
                        .param("asset", json!({"$ref": "#/components/schemas/Asset"}))
                        .handler(|ctx: Context, args: Vec<Value>| async move {
                            let id = args[0]["id"].as_str().unwrap_or_default().to_string();
                            ctx.stub().put_state(&id, args[0].to_string().as_bytes()).await?;
                            Ok::<Value, Error>(Value::Null)
                        }),
                )
                .transaction(
                    Transaction::evaluate("ReadAsset")
                        .param("id", json!({"type": "string"}))
                        .returns(json!({"$ref": "#/components/schemas/Asset"}))
                        .handler(|_ctx: Context, args: Vec<Value>| async move {
                            Ok::<Value, Error>(json!({"id": args[0], "color": "blue"}))
                        }),
                )
                .transaction(
                    Transaction::evaluate("BadReturn")
                        .returns(json!({"type": "string"}))
                        .handler(|_ctx: Context, _args: Vec<Value>| async move {
                            Ok::<Value, Error>(json!(5))
                        }),
                )
                .transaction(Transaction::evaluate("Ping").handler(
                    |_ctx: Context, _args: Vec<Value>| async move {
                        Ok::<Value, Error>(json!("assets"))
                    },
                )),
        )
        .contract(Contract::new("audit").transaction(Transaction::evaluate("Ping").handler(
            |_ctx: Context, _args: Vec<Value>| async move { Ok::<Value, Error>(json!("audit")) },
        )))
        .build()
        .unwrap()
}

fn decode_response(payload: &[u8]) -> Response {
    codec::decode(payload).unwrap()
}

#[tokio::test]
async fn string_parameter_takes_numeric_looking_id() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    for (txid, raw) in [("tx1", "1001"), ("tx2", "\"1001\"")] {
        peer.transaction("ch", txid, &["CreateAsset", raw]);
        let request = peer.expect(MessageType::PutState).await;
        let put: PutState = codec::decode(&request.payload).unwrap();
        assert_eq!(put.key, "1001");
        peer.respond(&request, vec![]);
        let completed = peer.expect(MessageType::Completed).await;
        assert_eq!(decode_response(&completed.payload).payload, b"1001".to_vec());
    }
}

#[tokio::test]
async fn mistyped_argument_fails_before_ledger_access() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    peer.transaction("ch", "tx1", &["StoreAsset", "{\"id\":42,\"color\":\"blue\"}"]);
    let failed = peer.expect(MessageType::Error).await;
    let message = String::from_utf8(failed.payload).unwrap();
    assert_eq!(
        message,
        "schema validation failed: asset.id: expected string but got number"
    );
    peer.expect_silence(100).await;

    peer.transaction("ch", "tx2", &["StoreAsset", "{\"id\":\"42\",\"color\":\"blue\"}"]);
    let request = peer.expect(MessageType::PutState).await;
    let put: PutState = codec::decode(&request.payload).unwrap();
    assert_eq!(put.key, "42");
    peer.respond(&request, vec![]);
    peer.expect(MessageType::Completed).await;
}

#[tokio::test]
async fn wrong_argument_count_is_rejected() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    peer.transaction("ch", "tx", &["CreateAsset"]);
    let failed = peer.expect(MessageType::Error).await;
    let message = String::from_utf8(failed.payload).unwrap();
    assert!(message.contains("Expected 1 parameters, but 0 have been supplied"));
}

#[tokio::test]
async fn bare_name_goes_to_default_contract() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;

    peer.transaction("ch", "tx1", &["Ping"]);
    let completed = peer.expect(MessageType::Completed).await;
    assert_eq!(decode_response(&completed.payload).payload, b"assets".to_vec());

    peer.transaction("ch", "tx2", &["audit:Ping"]);
    let completed = peer.expect(MessageType::Completed).await;
    assert_eq!(decode_response(&completed.payload).payload, b"audit".to_vec());
}

#[tokio::test]
async fn bare_name_shared_without_default_is_ambiguous() {
    let ping = |answer: &'static str| {
        Transaction::evaluate("Ping").handler(move |_ctx: Context, _args: Vec<Value>| async move {
            Ok::<Value, Error>(json!(answer))
        })
    };
    let router = ContractRouter::builder()
        .contract(Contract::new("left").transaction(ping("left")))
        .contract(Contract::new("right").transaction(ping("right")))
        .build()
        .unwrap();
    let mut peer = MockPeer::ready(Arc::new(router)).await;

    peer.transaction("ch", "tx1", &["Ping"]);
    let failed = peer.expect(MessageType::Error).await;
    let message = String::from_utf8(failed.payload).unwrap();
    assert!(message.contains("defined by several contracts (left, right)"));

    peer.transaction("ch", "tx2", &["right:Ping"]);
    let completed = peer.expect(MessageType::Completed).await;
    assert_eq!(decode_response(&completed.payload).payload, b"right".to_vec());
}

#[tokio::test]
async fn object_results_are_json_and_checked_against_returns() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;

    peer.transaction("ch", "tx1", &["ReadAsset", "asset1"]);
    let completed = peer.expect(MessageType::Completed).await;
    let payload = decode_response(&completed.payload).payload;
    let asset: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(asset, json!({"id": "asset1", "color": "blue"}));

    peer.transaction("ch", "tx2", &["BadReturn"]);
    let failed = peer.expect(MessageType::Error).await;
    let message = String::from_utf8(failed.payload).unwrap();
    assert!(message.contains("return value: expected string but got number"));
}

#[tokio::test]
async fn get_metadata_lists_user_contracts() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    let function = format!("{}:GetMetadata", SYSTEM_CONTRACT_NAME);
    peer.transaction("ch", "tx", &[function.as_str()]);
    let completed = peer.expect(MessageType::Completed).await;
    let response = decode_response(&completed.payload);
    assert_eq!(response.status, OK);
    let document: Value = serde_json::from_slice(&response.payload).unwrap();

    assert_eq!(document["info"]["title"], json!("asset-transfer"));
    let contracts = document["contracts"].as_object().unwrap();
    let mut names: Vec<&str> = contracts.keys().map(String::as_str).collect();
    names.sort();
    assert_eq!(names, vec!["assets", "audit"]);
    assert_eq!(
        document["contracts"]["assets"]["contractInstance"]["default"],
        json!(true)
    );
    assert!(document["components"]["schemas"]["Asset"].is_object());
}

#[tokio::test]
async fn init_without_arguments_succeeds() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    peer.init("ch", "tx", &[]);
    let completed = peer.expect(MessageType::Completed).await;
    let response = decode_response(&completed.payload);
    assert_eq!(response.status, OK);
    assert!(response.payload.is_empty());
}

#[derive(Clone, Default)]
struct RecordingHooks {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingHooks {
    fn record<S: Into<String>>(&self, call: S) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait]
impl TransactionHooks for RecordingHooks {
    async fn before_transaction(&self, ctx: &Context) -> Result<()> {
        self.record(format!("before {}", ctx.function()));
        ctx.set("caller", json!("recorder"));
        Ok(())
    }

    async fn around_transaction(
        &self,
        ctx: &Context,
        transaction: &TransactionFn,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.record("around");
        transaction(ctx.clone(), args).await
    }

    async fn after_transaction(&self, _ctx: &Context, result: &Value) -> Result<()> {
        self.record(format!("after {}", result));
        Ok(())
    }

    async fn unknown_transaction(&self, ctx: &Context) -> Result<Value> {
        self.record(format!("unknown {}", ctx.function()));
        Ok(json!("fallback"))
    }
}

#[tokio::test]
async fn hooks_wrap_every_call_in_order() {
    let hooks = RecordingHooks::default();
    let recorder = hooks.clone();
    let failing = hooks.clone();
    let router = ContractRouter::builder()
        .contract(
            Contract::new("vault")
                .default_contract()
                .hooks(hooks.clone())
                .transaction(Transaction::evaluate("Open").handler(
                    move |ctx: Context, _args: Vec<Value>| {
                        let recorder = recorder.clone();
                        async move {
                            recorder.record("handler");
                            Ok::<Value, Error>(ctx.get("caller").unwrap_or(Value::Null))
                        }
                    },
                ))
                .transaction(Transaction::submit("Seal").handler(
                    move |_ctx: Context, _args: Vec<Value>| {
                        let failing = failing.clone();
                        async move {
                            failing.record("handler");
                            Err::<Value, Error>(Error::transaction("vault sealed"))
                        }
                    },
                )),
        )
        .build()
        .unwrap();
    let mut peer = MockPeer::ready(Arc::new(router)).await;

    peer.transaction("ch", "tx1", &["Open"]);
    let completed = peer.expect(MessageType::Completed).await;
    assert_eq!(decode_response(&completed.payload).payload, b"recorder".to_vec());
    assert_eq!(
        hooks.take(),
        vec!["before Open", "around", "handler", "after \"recorder\""]
    );

    peer.transaction("ch", "tx2", &["Seal"]);
    let failed = peer.expect(MessageType::Error).await;
    assert_eq!(failed.payload, b"vault sealed".to_vec());
    assert_eq!(hooks.take(), vec!["before Seal", "around", "handler"]);

    peer.transaction("ch", "tx3", &["vault:Missing"]);
    let completed = peer.expect(MessageType::Completed).await;
    assert_eq!(decode_response(&completed.payload).payload, b"fallback".to_vec());
    assert_eq!(
        hooks.take(),
        vec![
            "before vault:Missing",
            "unknown vault:Missing",
            "after \"fallback\""
        ]
    );
}

#[tokio::test]
async fn unknown_function_without_hook_override_is_an_error() {
    let mut peer = MockPeer::ready(Arc::new(asset_router())).await;
    peer.transaction("ch", "tx", &["assets:Burn"]);
    let failed = peer.expect(MessageType::Error).await;
    assert_eq!(
        failed.payload,
        b"You've asked to invoke a function that does not exist: assets:Burn".to_vec()
    );
}
