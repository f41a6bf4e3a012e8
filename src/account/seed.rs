//! Account seeds: the only secret an account is rebuilt from.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use super::Network;
use crate::crypto::{checksum, CHECKSUM_LENGTH};
use crate::error::{LedgerError, LedgerResult};

const SEED_HEADER: [u8; 3] = [0x5a, 0xfe, 0x01];
pub const SEED_CORE_LENGTH: usize = 32;
const SEED_LENGTH: usize = SEED_HEADER.len() + 1 + SEED_CORE_LENGTH + CHECKSUM_LENGTH;

/// Secret seed material. Zeroized on drop; deliberately neither `Debug`
/// nor `Clone`.
pub struct Seed {
    network: Network,
    core: Zeroizing<[u8; SEED_CORE_LENGTH]>,
}

impl Seed {
    /// Fresh random seed for `network`.
    pub fn generate(network: Network) -> Self {
        let mut core = Zeroizing::new([0u8; SEED_CORE_LENGTH]);
        OsRng.fill_bytes(&mut core[..]);
        Self { network, core }
    }

    pub fn new(network: Network, core: [u8; SEED_CORE_LENGTH]) -> Self {
        Self {
            network,
            core: Zeroizing::new(core),
        }
    }

    pub fn from_base58(encoded: &str) -> LedgerResult<Self> {
        let raw = Zeroizing::new(
            bs58::decode(encoded)
                .into_vec()
                .map_err(|e| LedgerError::InvalidSeed(format!("not base58: {}", e)))?,
        );
        if raw.len() != SEED_LENGTH {
            return Err(LedgerError::InvalidSeed(format!(
                "expected {} bytes, got {}",
                SEED_LENGTH,
                raw.len()
            )));
        }
        if raw[..SEED_HEADER.len()] != SEED_HEADER {
            return Err(LedgerError::InvalidSeed("unknown seed header".to_string()));
        }

        let (body, sum) = raw.split_at(SEED_LENGTH - CHECKSUM_LENGTH);
        if checksum(body)[..] != *sum {
            return Err(LedgerError::InvalidSeed("checksum mismatch".to_string()));
        }

        let network = match body[SEED_HEADER.len()] {
            0x00 => Network::Livenet,
            0x01 => Network::Testnet,
            other => {
                return Err(LedgerError::InvalidSeed(format!(
                    "unknown network byte {:#04x}",
                    other
                )))
            }
        };

        let mut core = Zeroizing::new([0u8; SEED_CORE_LENGTH]);
        core.copy_from_slice(&body[SEED_HEADER.len() + 1..]);
        Ok(Self { network, core })
    }

    /// Explicit export of the secret seed. Callers own the returned string.
    pub fn to_base58(&self) -> String {
        let mut raw = Vec::with_capacity(SEED_LENGTH);
        raw.extend_from_slice(&SEED_HEADER);
        raw.push(match self.network {
            Network::Livenet => 0x00,
            Network::Testnet => 0x01,
        });
        raw.extend_from_slice(&self.core[..]);
        let sum = checksum(&raw);
        raw.extend_from_slice(&sum);

        let encoded = bs58::encode(&raw).into_string();
        raw.zeroize();
        encoded
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub(crate) fn core(&self) -> &[u8; SEED_CORE_LENGTH] {
        &self.core
    }
}
