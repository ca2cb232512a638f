#[cfg(test)]
#[ctor::ctor]
fn init_tests() {
    // capture shim logs in test output, filtered by RUST_LOG
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
