//! Key material derived from a seed.
//!
//! Both handles are opaque: no `Debug`, no `Clone`, no serialization. The
//! signing key zeroizes itself on drop and the encryption secret lives in a
//! `Zeroizing` buffer.

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use super::seed::Seed;
use crate::crypto::sha3_256;
use crate::ids::Signature;

/// Derivation index of the signing key.
const AUTH_KEY_INDEX: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0xe7];
/// Derivation index of the encryption key.
const ENCR_KEY_INDEX: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0xe8];

fn derive_key_seed(seed: &Seed, index: &[u8; 16]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(sha3_256(&[seed.core(), index]))
}

/// Ed25519 signing key used to authorize records.
pub struct AuthKey {
    signing_key: SigningKey,
}

impl AuthKey {
    pub fn from_seed(seed: &Seed) -> Self {
        let key_seed = derive_key_seed(seed, &AUTH_KEY_INDEX);
        Self {
            signing_key: SigningKey::from_bytes(&key_seed),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_dalek(&self.signing_key.sign(message))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// X25519 keypair for asset-content key exchange.
pub struct EncrKey {
    secret: Zeroizing<[u8; 32]>,
    public: [u8; 32],
}

impl EncrKey {
    pub fn from_seed(seed: &Seed) -> Self {
        let key_seed = derive_key_seed(seed, &ENCR_KEY_INDEX);
        let edwards = SigningKey::from_bytes(&key_seed);
        Self {
            secret: Zeroizing::new(edwards.to_scalar_bytes()),
            public: edwards.verifying_key().to_montgomery().to_bytes(),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public
    }

    /// Explicit export of the X25519 secret scalar.
    pub fn export_secret(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.secret)
    }
}
