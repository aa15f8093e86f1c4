//! Node wallet: an ECDSA P-256 keypair persisted as a PKCS#8 DER file.
//!
//! The wallet address is the lowercase hex of the public point coordinates
//! X‖Y (64 bytes). Signatures travel as hex of the fixed r‖s concatenation,
//! which is exactly ring's `FIXED` encoding, so `verify` can rebuild both the
//! signature and the public key from their hex halves.

use crate::error::{NodeError, Result};
use crate::util::{hex_decode, hex_encode};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair,
    UnparsedPublicKey,
};
use std::fs;
use std::path::Path;

// Big-endian byte length of a P-256 coordinate or signature scalar.
const SCALAR_LEN: usize = 32;

pub struct Wallet {
    /// PKCS#8 document as persisted on disk; the signing key is rebuilt from
    /// it on demand.
    pkcs8: Vec<u8>,
    address: String,
}

impl Wallet {
    /// Loads the wallet from `path`, or generates a fresh keypair and writes
    /// it there (mode 0600) when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Wallet> {
        let pkcs8 = if path.exists() {
            fs::read(path).map_err(|e| NodeError::Wallet(e.to_string()))?
        } else {
            let rng = SystemRandom::new();
            let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
                .map_err(|e| NodeError::Wallet(e.to_string()))?;
            persist_key(path, document.as_ref())?;
            document.as_ref().to_vec()
        };
        // public_key() yields the uncompressed point 0x04‖X‖Y.
        let key_pair = key_pair_from_pkcs8(pkcs8.as_slice())?;
        let address = hex_encode(&key_pair.public_key().as_ref()[1..]);
        Ok(Wallet { pkcs8, address })
    }

    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Signs a hex payload, returning hex(r‖s).
    pub fn sign(&self, payload_hex: &str) -> Result<String> {
        let payload = hex_decode(payload_hex)?;
        let key_pair = key_pair_from_pkcs8(self.pkcs8.as_slice())?;
        let rng = SystemRandom::new();
        let signature = key_pair
            .sign(&rng, payload.as_slice())
            .map_err(|e| NodeError::Wallet(e.to_string()))?;
        Ok(hex_encode(signature.as_ref()))
    }
}

fn key_pair_from_pkcs8(pkcs8: &[u8]) -> Result<EcdsaKeyPair> {
    let rng = SystemRandom::new();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| NodeError::Wallet(e.to_string()))
}

fn persist_key(path: &Path, der: &[u8]) -> Result<()> {
    fs::write(path, der).map_err(|e| NodeError::Wallet(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| NodeError::Wallet(e.to_string()))?;
    }
    Ok(())
}

///
/// The `verify` function checks an ECDSA P-256 signature over a hex payload
/// against a wallet address. Signature and address hex are each split into two
/// equal halves interpreted as big-endian unsigned integers, (r, s) and
/// (X, Y), and the public key is rebuilt from the point coordinates.
///
/// Returns false on any decoding or length error.
///
/// # Arguments
///
/// * `signature_hex` - hex of r‖s.
/// * `payload_hex` - hex of the signed payload (a transaction id).
/// * `address_hex` - hex of X‖Y, the owner's address.
pub fn verify(signature_hex: &str, payload_hex: &str, address_hex: &str) -> bool {
    let Some(signature) = decode_halves(signature_hex) else {
        return false;
    };
    let Some(point) = decode_halves(address_hex) else {
        return false;
    };
    let Ok(payload) = hex_decode(payload_hex) else {
        return false;
    };

    let mut public_key = Vec::with_capacity(1 + 2 * SCALAR_LEN);
    public_key.push(0x04); // uncompressed point marker
    public_key.extend_from_slice(&point);

    UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key.as_slice())
        .verify(payload.as_slice(), &signature)
        .is_ok()
}

/// Decodes hex into two equal halves, each left-padded to 32 bytes the way a
/// big-endian integer would be. None when the hex is malformed or a half
/// exceeds a P-256 scalar.
fn decode_halves(payload_hex: &str) -> Option<[u8; 2 * SCALAR_LEN]> {
    let bytes = hex_decode(payload_hex).ok()?;
    if bytes.is_empty() || bytes.len() % 2 != 0 {
        return None;
    }
    let (first, second) = bytes.split_at(bytes.len() / 2);
    if first.len() > SCALAR_LEN {
        return None;
    }

    let mut out = [0u8; 2 * SCALAR_LEN];
    out[SCALAR_LEN - first.len()..SCALAR_LEN].copy_from_slice(first);
    out[2 * SCALAR_LEN - second.len()..].copy_from_slice(second);
    Some(out)
}
