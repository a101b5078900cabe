//! Raw chain fallback: mint-event scanning plus metadata dereference

mod metadata;
mod rpc;
mod scanner;

pub use metadata::{decode_data_uri, resolve_uri, MetadataResolver, RegistrationFile, ServiceEntry};
pub use rpc::{ChainReader, EvmRpcReader, MintEvent};
pub use scanner::{ChainScanner, ScanReport, CHUNK_SIZE, MIN_CHUNK};

#[cfg(test)]
pub(crate) use rpc::testing;
