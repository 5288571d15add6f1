//! rsfairplay - Rust FairPlay Streaming key server core.
//!
//! This crate provides:
//! - SPC container parsing, decryption and TLLV validation.
//! - Business rules, lease/rental/persistence key durations and HDCP enforcement.
//! - CKC assembly and encryption with the anti-replay derived key.
//! - The `fairplay-streaming-request` JSON batch front end.
//! - Optional HTTP serve API and remote client.
//!
//! Feature flags:
//! - `cli`: enable the CLI binary helpers.
//! - `ksm`: link the vendor key payload library (see `build.rs`).
//! - `remote`: enable the remote key server client.
//! - `serve`: enable HTTP serve API.
//! - `chrono`: use chrono for date handling in CLI.
//! - `tracing`: enable tracing macros and subscriber.
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

/// Per-asset content key, IV and license settings.
pub mod asset;
/// CKC assembly and encryption.
pub mod ckc;
/// Protocol tags, sizes and enumerations.
pub mod constants;
/// Server RSA keys and provisioning data.
pub mod credentials;
/// AES and hashing helpers.
pub mod crypto;
/// Device identity and device info TLLVs.
pub mod device;
/// Common error types and Result alias.
pub mod error;
/// JSON request and response documents.
pub mod json;
/// Key server operations and their results.
pub mod operation;
/// Content key payload provider seam.
pub mod payload;
/// Business rules and the policy hooks.
pub mod rules;
/// Batch key server.
pub mod server;
/// Per-request session state.
pub mod session;
/// SPC container and payload parsing.
pub mod spc;
/// TLLV encoding and decoding.
pub mod tllv;
/// Shared helper utilities.
pub mod utils;

/// Vendor key payload library binding (feature: `ksm`).
#[cfg(feature = "ksm")]
pub mod ksm;

/// Remote key server client (feature: `remote`).
#[cfg(feature = "remote")]
pub mod remote;

/// HTTP serve API (feature: `serve`).
#[cfg(feature = "serve")]
pub mod serve;

#[cfg(test)]
mod test_support;

pub use asset::AssetInfo;
pub use credentials::Credentials;
pub use error::{Error, Result, Status};
pub use operation::{Operation, OperationResult};
pub use rules::{DefaultPolicy, Policy};
pub use server::KeyServer;
