/*!
# Fabric Shim

Write Hyperledger Fabric chaincode in Rust.

A chaincode process keeps one long-lived gRPC stream open to its peer. The peer sends
transactions down that stream; the chaincode reads and writes the ledger by sending requests
back up the same stream and finally answers each transaction with COMPLETED or ERROR. This
crate owns that stream (see [networking]) and exposes the ledger through [ChaincodeStub].

There are two ways to write chaincode:

- implement [Chaincode] directly and route on `stub.function_and_parameters()` yourself, or
- describe [contract::Contract]s and let a [contract::ContractRouter] decode arguments, run
  hooks and serve the metadata document.

Either way `main` hands the chaincode to [cli::run]:

```ignore
#[tokio::main]
async fn main() -> fabric_shim::Result<()> {
    fabric_shim::cli::run(Arc::new(MyChaincode)).await
}
```

# Usage

```bash
asset_transfer start --peer.address peer0:7052 --chaincode-id-name mycc:1.0
asset_transfer server --chaincode-address 0.0.0.0:9999 --chaincode-id mycc:abcdef
asset_transfer metadata generate --file metadata.json
```
*/
pub mod chaincode;
pub mod cli;
pub mod composite_key;
pub mod contract;
pub mod error;
pub mod iterators;
pub mod logging;
pub mod networking;
pub mod protos;
pub mod settings;
pub mod stub;
#[cfg(test)]
pub mod test_utilities;
pub mod time;
pub mod util;

mod test_setup;

pub use crate::chaincode::Chaincode;
pub use crate::error::{Error, Result};
pub use crate::stub::ChaincodeStub;
