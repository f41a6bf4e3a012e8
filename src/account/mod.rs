//! Account / identity.
//!
//! An [`Account`] is rebuilt deterministically from a [`Seed`]:
//! - an ed25519 signing key that authorizes records,
//! - an X25519 encryption key for asset-content key exchange,
//! - a checksummed, base58 [`AccountNumber`] that names the account on the ledger.

pub mod keys;
pub mod number;
pub mod seed;

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::ids::Signature;
use crate::signer::RecordSigner;

pub use keys::{AuthKey, EncrKey};
pub use number::AccountNumber;
pub use seed::Seed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Livenet,
    #[default]
    Testnet,
}

impl Network {
    pub fn default_api_endpoint(&self) -> &'static str {
        match self {
            Network::Livenet => "https://api.bitmark.com",
            Network::Testnet => "https://api.test.bitmark.com",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Livenet => write!(f, "livenet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "livenet" => Ok(Network::Livenet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(LedgerError::Validation(format!(
                "Invalid network: {}. Allowed: livenet, testnet",
                s
            ))),
        }
    }
}

/// Key material and identity of one ledger participant.
///
/// Immutable once built. Share it by reference; it is not `Clone`.
pub struct Account {
    seed: Seed,
    auth_key: AuthKey,
    encr_key: EncrKey,
    account_number: AccountNumber,
}

impl Account {
    /// Generate fresh key material
    pub fn create(network: Network) -> Self {
        Self::from_seed_value(Seed::generate(network))
    }

    /// Restore an account from its exported base58 seed
    pub fn from_seed(seed: &str) -> LedgerResult<Self> {
        Ok(Self::from_seed_value(Seed::from_base58(seed)?))
    }

    pub fn from_seed_value(seed: Seed) -> Self {
        let auth_key = AuthKey::from_seed(&seed);
        let encr_key = EncrKey::from_seed(&seed);
        let account_number = AccountNumber::from_public_key(seed.network(), &auth_key.verifying_key());
        Self {
            seed,
            auth_key,
            encr_key,
            account_number,
        }
    }

    pub fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }

    pub fn network(&self) -> Network {
        self.seed.network()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.auth_key.verifying_key()
    }

    pub fn encryption_public_key(&self) -> [u8; 32] {
        self.encr_key.public_key_bytes()
    }

    /// Sign a message with the account's signing key
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.auth_key.sign(message)
    }

    /// Explicit export of the secret seed.
    pub fn export_seed(&self) -> String {
        self.seed.to_base58()
    }
}

impl RecordSigner for Account {
    fn account_number(&self) -> &AccountNumber {
        &self.account_number
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.auth_key.sign(message)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_number", &self.account_number)
            .finish_non_exhaustive()
    }
}
