use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, event, Level};

use crate::chaincode::{self, Chaincode};
use crate::contract::metadata::{self, Info};
use crate::contract::schema::{encode_return, SchemaValidator};
use crate::contract::{Contract, Context, Parameter, Transaction, TransactionFn, TransactionHooks};
use crate::protos::Response;
use crate::stub::ChaincodeStub;
use crate::{Error, Result};

/// Namespace of the built-in contract serving `GetMetadata`.
pub const SYSTEM_CONTRACT_NAME: &str = "org.hyperledger.fabric";

struct RegisteredTransaction {
    parameters: Vec<Parameter>,
    returns: Option<Value>,
    function: TransactionFn,
}

struct RegisteredContract {
    hooks: Arc<dyn TransactionHooks>,
    transactions: HashMap<String, RegisteredTransaction>,
}

#[derive(Default)]
pub struct ContractRouterBuilder {
    info: Info,
    contracts: Vec<Contract>,
    schemas: Map<String, Value>,
}

impl ContractRouterBuilder {
    pub fn info(mut self, title: &str, version: &str) -> Self {
        self.info = Info {
            title: title.to_string(),
            version: version.to_string(),
        };
        self
    }

    /// Registers a schema that parameters can reference as
    /// `{"$ref": "#/components/schemas/<name>"}`.
    pub fn component(mut self, name: &str, schema: Value) -> Self {
        self.schemas.insert(name.to_string(), schema);
        self
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.contracts.push(contract);
        self
    }

    pub fn build(self) -> Result<ContractRouter> {
        let metadata = metadata::generate(&self.info, &self.contracts, &self.schemas);
        let mut contracts: HashMap<String, RegisteredContract> = HashMap::new();
        let mut default_contract: Option<String> = None;

        for contract in self.contracts {
            if contract.name.is_empty() {
                return Err(Error::DuplicateRegistration(String::from(
                    "contract name must be a non-empty string",
                )));
            }
            if contract.name == SYSTEM_CONTRACT_NAME {
                return Err(Error::DuplicateRegistration(format!(
                    "contract name {} is reserved",
                    SYSTEM_CONTRACT_NAME
                )));
            }
            if contracts.contains_key(&contract.name) {
                return Err(Error::DuplicateRegistration(format!(
                    "contract {} is registered twice",
                    contract.name
                )));
            }
            if contract.default {
                if let Some(existing) = &default_contract {
                    return Err(Error::DuplicateRegistration(format!(
                        "contracts {} and {} are both marked default",
                        existing, contract.name
                    )));
                }
                default_contract = Some(contract.name.clone());
            }
            let registered = register_transactions(&contract.name, contract.transactions)?;
            contracts.insert(
                contract.name,
                RegisteredContract {
                    hooks: contract.hooks,
                    transactions: registered,
                },
            );
        }

        let mut bare_names: HashMap<String, Vec<String>> = HashMap::new();
        for (contract_name, contract) in &contracts {
            for function in contract.transactions.keys() {
                bare_names
                    .entry(function.clone())
                    .or_default()
                    .push(contract_name.clone());
            }
        }

        let document = metadata.clone();
        let system = Contract::new(SYSTEM_CONTRACT_NAME).transaction(
            Transaction::evaluate("GetMetadata").handler(move |_ctx, _args| {
                let document = document.clone();
                async move { Ok(document) }
            }),
        );
        contracts.insert(
            system.name,
            RegisteredContract {
                hooks: system.hooks,
                transactions: register_transactions(SYSTEM_CONTRACT_NAME, system.transactions)?,
            },
        );

        event!(
            Level::INFO,
            "Registered {} contracts (default: {:?})",
            contracts.len() - 1,
            default_contract
        );
        Ok(ContractRouter {
            contracts,
            default_contract,
            bare_names,
            schemas: self.schemas,
            metadata,
        })
    }
}

fn register_transactions(
    contract_name: &str,
    transactions: Vec<Transaction>,
) -> Result<HashMap<String, RegisteredTransaction>> {
    let mut registered = HashMap::new();
    for transaction in transactions {
        let function = transaction.function.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "transaction {}:{} has no handler",
                contract_name, transaction.name
            ))
        })?;
        if registered.contains_key(&transaction.name) {
            return Err(Error::DuplicateRegistration(format!(
                "transaction {} is registered twice in contract {}",
                transaction.name, contract_name
            )));
        }
        registered.insert(
            transaction.name,
            RegisteredTransaction {
                parameters: transaction.parameters,
                returns: transaction.returns,
                function,
            },
        );
    }
    Ok(registered)
}

/// Splits `contract:function` at the last colon.
fn split_function_name(fcn: &str) -> (Option<&str>, &str) {
    match fcn.rsplit_once(':') {
        Some((namespace, function)) => (Some(namespace), function),
        None => (None, fcn),
    }
}

/// Immutable table of contracts, built once at startup. Implements
/// [`Chaincode`] by routing each invocation to a transaction function.
///
/// A bare function name goes to the default contract. Without a default
/// contract it goes to the one contract defining that function; if several
/// do, the call is rejected as ambiguous.
pub struct ContractRouter {
    contracts: HashMap<String, RegisteredContract>,
    default_contract: Option<String>,
    bare_names: HashMap<String, Vec<String>>,
    schemas: Map<String, Value>,
    metadata: Value,
}

impl ContractRouter {
    pub fn builder() -> ContractRouterBuilder {
        ContractRouterBuilder::default()
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    fn resolve<'a>(&'a self, fcn: &'a str) -> Result<(&'a RegisteredContract, &'a str)> {
        let (namespace, function) = split_function_name(fcn);
        let contract_name = match namespace {
            Some(namespace) => namespace,
            None => match &self.default_contract {
                Some(default_contract) => default_contract.as_str(),
                None => match self.bare_names.get(function).map(Vec::as_slice) {
                    Some([only]) => only.as_str(),
                    Some(candidates) if candidates.len() > 1 => {
                        let mut candidates = candidates.to_vec();
                        candidates.sort();
                        return Err(Error::UnknownFunction(format!(
                            "Function {} is defined by several contracts ({}); prefix it with the contract name",
                            function,
                            candidates.join(", ")
                        )));
                    }
                    _ => {
                        return Err(Error::UnknownFunction(format!(
                            "You've asked to invoke a function that does not exist: {}",
                            function
                        )))
                    }
                },
            },
        };
        let contract = self.contracts.get(contract_name).ok_or_else(|| {
            Error::UnknownFunction(format!("Contract name is not known: {}", contract_name))
        })?;
        Ok((contract, function))
    }

    fn decode_arguments(
        &self,
        transaction: &RegisteredTransaction,
        raw: &[String],
    ) -> Result<Vec<Value>> {
        if raw.len() != transaction.parameters.len() {
            return Err(Error::SchemaValidation(format!(
                "Expected {} parameters, but {} have been supplied",
                transaction.parameters.len(),
                raw.len()
            )));
        }
        let validator = SchemaValidator::new(&self.schemas);
        transaction
            .parameters
            .iter()
            .zip(raw)
            .map(|(parameter, raw)| {
                let value = validator.decode_argument(raw, &parameter.schema);
                validator.validate(&value, &parameter.schema, &parameter.name)?;
                Ok(value)
            })
            .collect()
    }

    /// Runs `fcn` with string arguments. Returns the encoded result.
    pub async fn dispatch(&self, stub: ChaincodeStub) -> Result<Vec<u8>> {
        let (fcn, raw_args) = stub.function_and_parameters();
        let (contract, function) = self.resolve(&fcn)?;
        let transaction = contract.transactions.get(function);
        let args = match transaction {
            Some(transaction) => self.decode_arguments(transaction, &raw_args)?,
            None => vec![],
        };
        debug!("[{}-{}] Dispatching {}", stub.channel_id(), stub.tx_id(), fcn);

        let mut ctx = contract.hooks.create_context(stub).await?;
        ctx.set_function(&fcn);
        contract.hooks.before_transaction(&ctx).await?;
        let result = match transaction {
            Some(transaction) => {
                contract
                    .hooks
                    .around_transaction(&ctx, &transaction.function, args)
                    .await?
            }
            None => contract.hooks.unknown_transaction(&ctx).await?,
        };
        contract.hooks.after_transaction(&ctx, &result).await?;

        if let Some(returns) = transaction.and_then(|transaction| transaction.returns.as_ref()) {
            SchemaValidator::new(&self.schemas).validate(&result, returns, "return value")?;
        }
        encode_return(&result)
    }
}

#[async_trait]
impl Chaincode for ContractRouter {
    async fn init(&self, stub: ChaincodeStub) -> Result<Response> {
        if stub.args().is_empty() {
            return Ok(chaincode::success(vec![]));
        }
        self.dispatch(stub).await.map(chaincode::success)
    }

    async fn invoke(&self, stub: ChaincodeStub) -> Result<Response> {
        self.dispatch(stub).await.map(chaincode::success)
    }

    fn metadata(&self) -> Option<Value> {
        Some(self.metadata.clone())
    }
}
