/*!
# Contracts

Contract-style chaincode groups transaction functions into named contracts. A client calls
`contractName:functionName` (or just `functionName`, see [ContractRouter]) with string
arguments; each argument is decoded to JSON and checked against the parameter's schema before
any code runs.

```ignore
let router = ContractRouter::builder()
    .info("asset-transfer", "1.0.0")
    .contract(
        Contract::new("assets").default_contract().transaction(
            Transaction::submit("CreateAsset")
                .param("id", json!({"type": "string"}))
                .handler(|ctx, args| async move { ... }),
        ),
    )
    .build()?;
```

Hooks run in this order for every call:

```bytes
create_context -> before_transaction -> around_transaction(function) -> after_transaction
```

`around_transaction` is handed the function and calls it. A function the contract does not
define runs `unknown_transaction` in place of `around_transaction`. The first error ends the
chain and becomes the transaction's ERROR.
*/
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::stub::ChaincodeStub;
use crate::{Error, Result};

mod context;
pub mod metadata;
mod router;
pub mod schema;

pub use self::context::Context;
pub use self::router::{ContractRouter, ContractRouterBuilder, SYSTEM_CONTRACT_NAME};

pub type TransactionFn =
    Arc<dyn Fn(Context, Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Interception points around every transaction of a contract.
#[async_trait]
pub trait TransactionHooks: Send + Sync + 'static {
    async fn create_context(&self, stub: ChaincodeStub) -> Result<Context> {
        Ok(Context::new(stub))
    }

    async fn before_transaction(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    async fn around_transaction(
        &self,
        ctx: &Context,
        transaction: &TransactionFn,
        args: Vec<Value>,
    ) -> Result<Value> {
        transaction(ctx.clone(), args).await
    }

    async fn after_transaction(&self, _ctx: &Context, _result: &Value) -> Result<()> {
        Ok(())
    }

    async fn unknown_transaction(&self, ctx: &Context) -> Result<Value> {
        Err(Error::UnknownFunction(format!(
            "You've asked to invoke a function that does not exist: {}",
            ctx.function()
        )))
    }
}

pub struct DefaultHooks;

impl TransactionHooks for DefaultHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionTag {
    Submit,
    Evaluate,
}

impl TransactionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionTag::Submit => "submitTx",
            TransactionTag::Evaluate => "evaluateTx",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub schema: Value,
}

/// One callable function of a contract.
pub struct Transaction {
    pub(crate) name: String,
    pub(crate) tag: TransactionTag,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) returns: Option<Value>,
    pub(crate) function: Option<TransactionFn>,
}

impl Transaction {
    fn new(name: &str, tag: TransactionTag) -> Self {
        Transaction {
            name: name.to_string(),
            tag,
            parameters: vec![],
            returns: None,
            function: None,
        }
    }

    /// A function whose writes are meant to be ordered and committed.
    pub fn submit(name: &str) -> Self {
        Transaction::new(name, TransactionTag::Submit)
    }

    /// A read-only query.
    pub fn evaluate(name: &str) -> Self {
        Transaction::new(name, TransactionTag::Evaluate)
    }

    pub fn param(mut self, name: &str, schema: Value) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            schema,
        });
        self
    }

    pub fn returns(mut self, schema: Value) -> Self {
        self.returns = Some(schema);
        self
    }

    pub fn handler<F, Fut>(mut self, function: F) -> Self
    where
        F: Fn(Context, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.function = Some(Arc::new(move |ctx, args| function(ctx, args).boxed()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named group of transactions sharing one set of hooks.
pub struct Contract {
    pub(crate) name: String,
    pub(crate) default: bool,
    pub(crate) version: String,
    pub(crate) hooks: Arc<dyn TransactionHooks>,
    pub(crate) transactions: Vec<Transaction>,
}

impl Contract {
    pub fn new(name: &str) -> Self {
        Contract {
            name: name.to_string(),
            default: false,
            version: String::from("latest"),
            hooks: Arc::new(DefaultHooks),
            transactions: vec![],
        }
    }

    /// Names the contract after a Rust type, e.g. `AssetContract`.
    pub fn from_type<T: ?Sized>() -> Self {
        let type_name = std::any::type_name::<T>();
        let name = type_name
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(type_name);
        Contract::new(name)
    }

    pub fn default_contract(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn hooks<H: TransactionHooks>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod dispatch_tests;
