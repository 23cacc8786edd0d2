//! Xray inbound credential management.
//!
//! - `document`: typed, lossless view of the shared Xray JSON config
//! - `transaction`: serialized load → mutate → atomic save → reload
//! - `store`: SOCKS/VLESS credential operations on top of both

pub mod document;
pub mod store;
pub mod transaction;

pub use document::{
    ConfigDocument, DocumentAccessor, InboundDefinition, SocksAccount, VlessClient,
};
pub use store::CredentialStore;
pub use transaction::MutationTransaction;

pub const PROTOCOL_SOCKS: &str = "socks";
pub const PROTOCOL_VLESS: &str = "vless";
