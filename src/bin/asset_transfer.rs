/*!
# Asset Transfer Chaincode

A small contract over the ledger's world state: assets keyed by id, owned by a named party.

## Help

```bash
asset_transfer help
asset_transfer start --help
```

## Example Usage

Dial a peer (the usual chaincode launch):

```bash
CORE_PEER_ADDRESS=peer0.org1.example.com:7052 \
CORE_CHAINCODE_ID_NAME=basic:1.0 \
asset_transfer start
```

Run as a chaincode-as-a-service endpoint the peer dials:

```bash
asset_transfer server --chaincode-address 0.0.0.0:9999 --chaincode-id basic:1.0
```

Write the contract metadata:

```bash
asset_transfer metadata generate --file metadata.json
```
*/
use std::sync::Arc;

use fabric_shim::cli;
use fabric_shim::contract::{Context, Contract, ContractRouter, Transaction};
use fabric_shim::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Asset {
    id: String,
    color: String,
    size: u64,
    owner: String,
    appraised_value: u64,
}

fn id_arg(args: &[Value]) -> String {
    args[0].as_str().unwrap_or_default().to_string()
}

async fn read_asset(ctx: &Context, id: &str) -> Result<Asset> {
    let bytes = ctx.stub().get_state(id).await?;
    if bytes.is_empty() {
        return Err(Error::transaction(format!("The asset {} does not exist", id)));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn write_asset(ctx: &Context, asset: &Asset) -> Result<()> {
    ctx.stub()
        .put_state(&asset.id, &serde_json::to_vec(asset)?)
        .await
}

async fn asset_exists(ctx: &Context, id: &str) -> Result<bool> {
    Ok(!ctx.stub().get_state(id).await?.is_empty())
}

async fn create_asset(ctx: Context, args: Vec<Value>) -> Result<Value> {
    let asset: Asset = serde_json::from_value(args[0].clone())?;
    if asset_exists(&ctx, &asset.id).await? {
        return Err(Error::transaction(format!(
            "The asset {} already exists",
            asset.id
        )));
    }
    write_asset(&ctx, &asset).await?;
    ctx.stub()
        .set_event("CreateAsset", serde_json::to_vec(&asset)?)?;
    Ok(Value::Null)
}

async fn update_asset(ctx: Context, args: Vec<Value>) -> Result<Value> {
    let asset: Asset = serde_json::from_value(args[0].clone())?;
    read_asset(&ctx, &asset.id).await?;
    write_asset(&ctx, &asset).await?;
    Ok(Value::Null)
}

async fn delete_asset(ctx: Context, args: Vec<Value>) -> Result<Value> {
    let id = id_arg(&args);
    read_asset(&ctx, &id).await?;
    ctx.stub().delete_state(&id).await?;
    Ok(Value::Null)
}

async fn transfer_asset(ctx: Context, args: Vec<Value>) -> Result<Value> {
    let mut asset = read_asset(&ctx, &id_arg(&args)).await?;
    let new_owner = args[1].as_str().unwrap_or_default().to_string();
    let old_owner = std::mem::replace(&mut asset.owner, new_owner);
    write_asset(&ctx, &asset).await?;
    Ok(Value::String(old_owner))
}

async fn get_all_assets(ctx: Context, _args: Vec<Value>) -> Result<Value> {
    let mut iterator = ctx.stub().get_state_by_range("", "").await?;
    let mut assets = vec![];
    while let Some(kv) = iterator.next().await? {
        let asset: Asset = serde_json::from_slice(&kv.value)?;
        assets.push(serde_json::to_value(asset)?);
    }
    iterator.close().await?;
    Ok(Value::Array(assets))
}

fn asset_contract() -> Contract {
    Contract::new("AssetTransfer")
        .default_contract()
        .version("1.0.0")
        .transaction(
            Transaction::submit("CreateAsset")
                .param("asset", json!({"$ref": "#/components/schemas/Asset"}))
                .handler(create_asset),
        )
        .transaction(
            Transaction::evaluate("ReadAsset")
                .param("id", json!({"type": "string", "minLength": 1}))
                .returns(json!({"$ref": "#/components/schemas/Asset"}))
                .handler(|ctx: Context, args: Vec<Value>| async move {
                    let asset = read_asset(&ctx, &id_arg(&args)).await?;
                    Ok::<Value, Error>(serde_json::to_value(asset)?)
                }),
        )
        .transaction(
            Transaction::submit("UpdateAsset")
                .param("asset", json!({"$ref": "#/components/schemas/Asset"}))
                .handler(update_asset),
        )
        .transaction(
            Transaction::submit("DeleteAsset")
                .param("id", json!({"type": "string", "minLength": 1}))
                .handler(delete_asset),
        )
        .transaction(
            Transaction::submit("TransferAsset")
                .param("id", json!({"type": "string", "minLength": 1}))
                .param("newOwner", json!({"type": "string", "minLength": 1}))
                .returns(json!({"type": "string"}))
                .handler(transfer_asset),
        )
        .transaction(
            Transaction::evaluate("AssetExists")
                .param("id", json!({"type": "string", "minLength": 1}))
                .returns(json!({"type": "boolean"}))
                .handler(|ctx: Context, args: Vec<Value>| async move {
                    let exists = asset_exists(&ctx, &id_arg(&args)).await?;
                    Ok::<Value, Error>(Value::Bool(exists))
                }),
        )
        .transaction(
            Transaction::evaluate("GetAllAssets")
                .returns(json!({"type": "array", "items": {"$ref": "#/components/schemas/Asset"}}))
                .handler(get_all_assets),
        )
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let router = ContractRouter::builder()
        .info("asset-transfer-basic", "1.0.0")
        .component(
            "Asset",
            json!({
                "type": "object",
                "required": ["id", "color", "size", "owner", "appraisedValue"],
                "properties": {
                    "id": {"type": "string", "minLength": 1},
                    "color": {"type": "string"},
                    "size": {"type": "integer", "minimum": 0},
                    "owner": {"type": "string"},
                    "appraisedValue": {"type": "integer", "minimum": 0}
                },
                "additionalProperties": false
            }),
        )
        .contract(asset_contract())
        .build()?;
    cli::run(Arc::new(router)).await
}
