//! Witness verification
//!
//! A witness carries a 64-byte Ed25519 signature over the transaction hash
//! (invocation script) and the 32-byte public key (verification script).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use strata_core::{Hash256, Witness};

pub trait WitnessVerifier: Send + Sync {
    fn verify(&self, tx_hash: &Hash256, witness: &Witness) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519WitnessVerifier;

impl WitnessVerifier for Ed25519WitnessVerifier {
    fn verify(&self, tx_hash: &Hash256, witness: &Witness) -> bool {
        let key_bytes: [u8; 32] = match witness.verification_script.as_slice().try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match Signature::from_slice(&witness.invocation_script) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        key.verify(tx_hash.as_bytes(), &signature).is_ok()
    }
}

/// Build a witness signing `tx_hash` with `key`
pub fn sign_witness(key: &SigningKey, tx_hash: &Hash256) -> Witness {
    Witness {
        invocation_script: key.sign(tx_hash.as_bytes()).to_bytes().to_vec(),
        verification_script: key.verifying_key().to_bytes().to_vec(),
    }
}
