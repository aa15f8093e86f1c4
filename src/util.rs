use crate::error::{NodeError, Result};
use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Current unix time in seconds. Block and transaction timestamps use this.
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

///
/// The `sha256_digest` function performs a SHA-256 hash operation on the provided
/// data, returning the resulting digest as a vector of bytes.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn hex_encode(data: &[u8]) -> String {
    HEXLOWER.encode(data)
}

pub fn hex_decode(data: &str) -> Result<Vec<u8>> {
    HEXLOWER
        .decode(data.as_bytes())
        .map_err(|e| NodeError::Codec(e.to_string()))
}

///
/// The `hash_value` function computes the canonical hash of any serializable
/// value: the lowercase hex of SHA-256 over the value's JSON rendering.
///
/// serde_json emits struct fields in declared order, so two values with
/// identical field contents produce identical bytes. This rendering is pinned:
/// it must never change once a chain has been produced.
///
/// # Arguments
///
/// * `value` - A reference to the value to hash.
pub fn hash_value<T: Serialize>(value: &T) -> Result<String> {
    let rendered = serde_json::to_vec(value).map_err(|e| NodeError::Codec(e.to_string()))?;
    Ok(hex_encode(sha256_digest(rendered.as_slice()).as_slice()))
}

/// Encodes a value with the pinned persistence codec (bincode, standard
/// configuration). Used for everything written to the store.
pub fn encode_to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| NodeError::Codec(e.to_string()))
}

pub fn decode_from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| NodeError::Codec(e.to_string()))
        .map(|(value, _)| value)
}

///
/// The `expect_persisted` function unwraps the result of an operation that
/// reads or writes persisted state. A codec or storage failure there means
/// the database can no longer be trusted, so the process aborts instead of
/// continuing to serve from corrupt state. Domain outcomes (a missing block,
/// say) are decided before calling this; only infrastructure failures reach
/// it.
///
pub fn expect_persisted<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!("persisted state failure, aborting: {err}");
            std::process::exit(1);
        }
    }
}
