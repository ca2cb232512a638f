use std::{env, path::PathBuf};

// The Fabric protos are vendored under proto/ and compiled into OUT_DIR on every
// build so that the wire contract is never redefined by hand. The peer owns
// these schemas; only the subset the shim reads or writes is vendored.
//
// protoc is taken from the PROTOC environment variable when it is set,
// otherwise the vendored binary is used.
// e.g.
// PROTOC=/usr/local/bin/protoc cargo build

const PROTO_FILES: &[&str] = &[
    "common/common.proto",
    "msp/identities.proto",
    "ledger/queryresult/kv_query_result.proto",
    "peer/chaincode.proto",
    "peer/chaincode_event.proto",
    "peer/proposal.proto",
    "peer/proposal_response.proto",
    "peer/chaincode_shim.proto",
];

fn main() {
    let proto_root = PathBuf::from("proto");
    let mut includes = vec![proto_root.clone()];

    if env::var("PROTOC").is_err() {
        let protoc = protoc_bin_vendored::protoc_bin_path().expect("No vendored protoc");
        env::set_var("PROTOC", protoc);
        if let Ok(include) = protoc_bin_vendored::include_path() {
            includes.push(include);
        }
    }

    let protos: Vec<PathBuf> = PROTO_FILES.iter().map(|file| proto_root.join(file)).collect();

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        // the Chaincode service has a Connect rpc, which collides with the
        // generated `connect` constructor; channels are built by hand instead
        .build_transport(false)
        .compile(&protos, &includes)
        .expect("Could not compile fabric protos");

    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto.display());
    }
    println!("cargo:rerun-if-env-changed=PROTOC");
}
