use async_trait::async_trait;

use crate::protos::Response;
use crate::stub::ChaincodeStub;
use crate::Result;

pub const OK: i32 = 200;
pub const ERROR_THRESHOLD: i32 = 400;
pub const ERROR: i32 = 500;

/// The callback the handler invokes for every INIT and TRANSACTION.
///
/// Returning `Ok(response)` completes the transaction with that response,
/// whatever its status. Returning `Err` sends an ERROR to the peer with the
/// error's message. [`crate::contract::ContractRouter`] implements this trait
/// for contract-style chaincode.
#[async_trait]
pub trait Chaincode: Send + Sync + 'static {
    async fn init(&self, stub: ChaincodeStub) -> Result<Response>;

    async fn invoke(&self, stub: ChaincodeStub) -> Result<Response>;

    /// Metadata document printed by `metadata generate`.
    fn metadata(&self) -> Option<serde_json::Value> {
        None
    }
}

pub fn success<P: Into<Vec<u8>>>(payload: P) -> Response {
    Response {
        status: OK,
        message: String::new(),
        payload: payload.into(),
    }
}

pub fn error<M: Into<String>>(message: M) -> Response {
    Response {
        status: ERROR,
        message: message.into(),
        payload: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_helpers() {
        let ok = success("done");
        assert_eq!(ok.status, OK);
        assert_eq!(ok.payload, b"done".to_vec());
        let failed = error("bad asset");
        assert_eq!(failed.status, ERROR);
        assert!(failed.status >= ERROR_THRESHOLD);
        assert_eq!(failed.message, "bad asset");
    }
}
