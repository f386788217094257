use auto_impl::auto_impl;
use revm::{
    precompile::secp256k1::ecrecover,
    primitives::{Address, B256},
};

use crate::PackageSignature;

/// Recovers the address that signed a package digest.
///
/// Implementations must be pure: the same digest and signature always recover the same address.
#[auto_impl(&, Box, Arc)]
pub trait SignatureRecovery {
    /// Returns the signer of `digest`, or `None` if the signature does not recover.
    fn recover_signer(&self, digest: &B256, signature: &PackageSignature) -> Option<Address>;
}

/// secp256k1 recovery through the `ecrecover` precompile backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Secp256k1Recovery;

impl SignatureRecovery for Secp256k1Recovery {
    fn recover_signer(&self, digest: &B256, signature: &PackageSignature) -> Option<Address> {
        let recid = signature.recovery_id().ok()?;
        ecrecover(&signature.rs(), recid, digest).ok().map(Address::from_word)
    }
}
