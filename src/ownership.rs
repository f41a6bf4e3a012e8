//! Local model of who owns a bitmark.
//!
//! ```text
//! Owned ──offer──▶ OfferPending ──accept──▶ Transferred ──confirm──▶ Owned(receiver)
//!   │                   └──reject──▶ Owned(unchanged)
//!   └──single-signature transfer──▶ Transferred
//! ```
//!
//! A transfer only takes effect once its transaction is confirmed. Until
//! then [`OwnershipState::authoritative_owner`] keeps reporting the previous
//! owner.

use crate::account::AccountNumber;
use crate::error::{LedgerError, LedgerResult};
use crate::ids::TxId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipState {
    Owned {
        owner: AccountNumber,
        head: TxId,
    },
    OfferPending {
        owner: AccountNumber,
        head: TxId,
        offer_id: String,
        receiver: AccountNumber,
    },
    /// Recorded on the ledger, waiting for confirmation.
    Transferred {
        previous_owner: AccountNumber,
        owner: AccountNumber,
        head: TxId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipEvent {
    Offered {
        offer_id: String,
        receiver: AccountNumber,
    },
    Accepted {
        tx_id: TxId,
    },
    Rejected,
    Transferred {
        receiver: AccountNumber,
        tx_id: TxId,
    },
    Confirmed {
        tx_id: TxId,
    },
}

impl OwnershipState {
    pub fn owned(owner: AccountNumber, head: TxId) -> Self {
        OwnershipState::Owned { owner, head }
    }

    /// Owner as last recorded, confirmed or not.
    pub fn owner(&self) -> &AccountNumber {
        match self {
            OwnershipState::Owned { owner, .. }
            | OwnershipState::OfferPending { owner, .. }
            | OwnershipState::Transferred { owner, .. } => owner,
        }
    }

    /// Owner whose rights are currently in force.
    pub fn authoritative_owner(&self) -> &AccountNumber {
        match self {
            OwnershipState::Transferred { previous_owner, .. } => previous_owner,
            other => other.owner(),
        }
    }

    pub fn head(&self) -> &TxId {
        match self {
            OwnershipState::Owned { head, .. }
            | OwnershipState::OfferPending { head, .. }
            | OwnershipState::Transferred { head, .. } => head,
        }
    }

    pub fn pending_offer(&self) -> Option<&str> {
        match self {
            OwnershipState::OfferPending { offer_id, .. } => Some(offer_id),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OwnershipState::Owned { .. } => "owned",
            OwnershipState::OfferPending { .. } => "offer pending",
            OwnershipState::Transferred { .. } => "transferred",
        }
    }

    /// Applies `event`, or fails with `Validation` and leaves the state
    /// untouched when the event is not allowed from the current state.
    pub fn apply(&mut self, event: OwnershipEvent) -> LedgerResult<()> {
        let next = match (&*self, event) {
            (OwnershipState::Owned { owner, head }, OwnershipEvent::Offered { offer_id, receiver }) => {
                OwnershipState::OfferPending {
                    owner: owner.clone(),
                    head: *head,
                    offer_id,
                    receiver,
                }
            }
            (OwnershipState::Owned { owner, .. }, OwnershipEvent::Transferred { receiver, tx_id }) => {
                OwnershipState::Transferred {
                    previous_owner: owner.clone(),
                    owner: receiver,
                    head: tx_id,
                }
            }
            (
                OwnershipState::OfferPending { owner, receiver, .. },
                OwnershipEvent::Accepted { tx_id },
            ) => OwnershipState::Transferred {
                previous_owner: owner.clone(),
                owner: receiver.clone(),
                head: tx_id,
            },
            (OwnershipState::OfferPending { owner, head, .. }, OwnershipEvent::Rejected) => {
                OwnershipState::Owned {
                    owner: owner.clone(),
                    head: *head,
                }
            }
            (OwnershipState::Transferred { owner, head, .. }, OwnershipEvent::Confirmed { tx_id })
                if *head == tx_id =>
            {
                OwnershipState::Owned {
                    owner: owner.clone(),
                    head: *head,
                }
            }
            (state, event) => {
                return Err(LedgerError::Validation(format!(
                    "{:?} is not allowed while {}",
                    event,
                    state.name()
                )))
            }
        };
        *self = next;
        Ok(())
    }
}
