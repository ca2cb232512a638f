use serde::Serialize;
use serde_json::{Map, Value};

use crate::contract::{Contract, Transaction};

pub const METADATA_SCHEMA: &str =
    "https://hyperledger.github.io/fabric-chaincode-node/main/api/contract-schema.json";

#[derive(Debug, Clone, Serialize)]
pub struct Info {
    pub title: String,
    pub version: String,
}

impl Default for Info {
    fn default() -> Self {
        Info {
            title: String::from("undefined"),
            version: String::from("latest"),
        }
    }
}

#[derive(Serialize)]
struct ParameterMetadata<'a> {
    name: &'a str,
    schema: &'a Value,
}

#[derive(Serialize)]
struct TransactionMetadata<'a> {
    name: &'a str,
    tag: Vec<&'static str>,
    parameters: Vec<ParameterMetadata<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    returns: Option<&'a Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContractInstance<'a> {
    name: &'a str,
    default: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContractMetadata<'a> {
    name: &'a str,
    contract_instance: ContractInstance<'a>,
    info: Info,
    transactions: Vec<TransactionMetadata<'a>>,
}

fn transaction_metadata(transaction: &Transaction) -> TransactionMetadata<'_> {
    TransactionMetadata {
        name: &transaction.name,
        tag: vec![transaction.tag.as_str()],
        parameters: transaction
            .parameters
            .iter()
            .map(|parameter| ParameterMetadata {
                name: &parameter.name,
                schema: &parameter.schema,
            })
            .collect(),
        returns: transaction.returns.as_ref(),
    }
}

fn contract_metadata(contract: &Contract) -> ContractMetadata<'_> {
    ContractMetadata {
        name: &contract.name,
        contract_instance: ContractInstance {
            name: &contract.name,
            default: contract.default,
        },
        info: Info {
            title: contract.name.clone(),
            version: contract.version.clone(),
        },
        transactions: contract.transactions.iter().map(transaction_metadata).collect(),
    }
}

/// The document served by `org.hyperledger.fabric:GetMetadata`.
pub fn generate(info: &Info, contracts: &[Contract], schemas: &Map<String, Value>) -> Value {
    let mut contract_map = Map::new();
    for contract in contracts {
        contract_map.insert(
            contract.name.clone(),
            serde_json::to_value(contract_metadata(contract)).unwrap_or(Value::Null),
        );
    }
    serde_json::json!({
        "$schema": METADATA_SCHEMA,
        "info": info,
        "contracts": contract_map,
        "components": {
            "schemas": schemas,
        },
    })
}
