use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::protos::SerializedIdentity;
use crate::stub::ChaincodeStub;

/// Per-transaction context handed to hooks and transaction functions.
///
/// Clones share the attribute map, so a value stored by `before_transaction`
/// is visible to the transaction function and to `after_transaction`.
#[derive(Clone)]
pub struct Context {
    stub: ChaincodeStub,
    function: String,
    attributes: Arc<RwLock<HashMap<String, Value>>>,
}

impl Context {
    pub fn new(stub: ChaincodeStub) -> Self {
        Context {
            stub,
            function: String::new(),
            attributes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn stub(&self) -> &ChaincodeStub {
        &self.stub
    }

    pub fn creator(&self) -> Option<&SerializedIdentity> {
        self.stub.creator()
    }

    pub fn msp_id(&self) -> Option<&str> {
        self.stub.msp_id()
    }

    /// Function name as sent by the client, namespace included.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub(crate) fn set_function(&mut self, function: &str) {
        self.function = function.to_string();
    }

    pub fn set<K: Into<String>>(&self, key: K, value: Value) {
        self.attributes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.attributes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}
