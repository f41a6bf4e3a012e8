//! Checksummed, base58 account numbers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use super::Network;
use crate::crypto::{checksum, CHECKSUM_LENGTH};
use crate::encoding::{encode_varint, read_varint, write_bytes};
use crate::error::{LedgerError, LedgerResult};

const KEY_TYPE_ED25519: u64 = 0x01;
const PUBLIC_KEY_FLAG: u64 = 0x01;
const TESTNET_FLAG: u64 = 0x02;
const PUBLIC_KEY_LENGTH: usize = 32;

/// Public identity of an account: `base58(varint(variant) ‖ public key ‖ checksum)`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber {
    encoded: String,
    network: Network,
    public_key: VerifyingKey,
}

fn key_variant(network: Network) -> u64 {
    let net = match network {
        Network::Livenet => 0,
        Network::Testnet => TESTNET_FLAG,
    };
    (KEY_TYPE_ED25519 << 4) | PUBLIC_KEY_FLAG | net
}

impl AccountNumber {
    pub fn from_public_key(network: Network, public_key: &VerifyingKey) -> Self {
        let mut raw = encode_varint(key_variant(network));
        raw.extend_from_slice(public_key.as_bytes());
        let sum = checksum(&raw);
        raw.extend_from_slice(&sum);

        Self {
            encoded: bs58::encode(raw).into_string(),
            network,
            public_key: *public_key,
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        let raw = bs58::decode(s).into_vec()?;
        if raw.len() <= CHECKSUM_LENGTH {
            return Err(LedgerError::Encoding(format!("account number too short: {}", s)));
        }
        let (body, sum) = raw.split_at(raw.len() - CHECKSUM_LENGTH);
        if checksum(body)[..] != *sum {
            return Err(LedgerError::Encoding(format!("account number checksum mismatch: {}", s)));
        }

        let (variant, used) = read_varint(body)?;
        if variant & PUBLIC_KEY_FLAG != PUBLIC_KEY_FLAG {
            return Err(LedgerError::Encoding("account number is not a public key".to_string()));
        }
        if variant >> 4 != KEY_TYPE_ED25519 {
            return Err(LedgerError::Encoding(format!(
                "unsupported key type {}",
                variant >> 4
            )));
        }
        let network = if variant & TESTNET_FLAG != 0 {
            Network::Testnet
        } else {
            Network::Livenet
        };

        let key_bytes: [u8; PUBLIC_KEY_LENGTH] = (&body[used..]).try_into().map_err(|_| {
            LedgerError::Encoding(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                body.len() - used
            ))
        })?;
        let public_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| LedgerError::Encoding(format!("invalid public key: {}", e)))?;

        Ok(Self {
            encoded: s.to_string(),
            network,
            public_key,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Account bytes as signed: the variant and public key, checksum stripped.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = encode_varint(key_variant(self.network));
        out.extend_from_slice(self.public_key.as_bytes());
        out
    }

    /// Writes the account as a length-prefixed canonical field.
    pub fn write_canonical(&self, buf: &mut Vec<u8>) {
        write_bytes(buf, &self.to_bytes());
    }

    /// `[abcd...wxyz]`, for log lines.
    pub fn short(&self) -> String {
        let s = &self.encoded;
        if s.len() < 8 {
            return String::new();
        }
        format!("[{}...{}]", &s[..4], &s[s.len() - 4..])
    }
}

impl PartialEq for AccountNumber {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for AccountNumber {}

impl Hash for AccountNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountNumber({})", self.encoded)
    }
}

impl FromStr for AccountNumber {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountNumber> for String {
    fn from(value: AccountNumber) -> Self {
        value.encoded
    }
}
