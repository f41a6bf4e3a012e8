use crate::account::AccountNumber;
use crate::ids::Signature;

/// Anything that can authorize records on behalf of an account.
///
/// The record builder only ever sees this trait, never raw key material.
pub trait RecordSigner {
    fn account_number(&self) -> &AccountNumber;

    fn sign(&self, message: &[u8]) -> Signature;
}

impl<T: RecordSigner + ?Sized> RecordSigner for &T {
    fn account_number(&self) -> &AccountNumber {
        (**self).account_number()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        (**self).sign(message)
    }
}
