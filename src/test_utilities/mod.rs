//! Builders and an in-memory peer for exercising the handler without a
//! network.
pub mod mock_peer;
pub mod mocks;
