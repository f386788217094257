//! The signed package carried in the argument region of `TXCALL`.
//!
//! The region is a single type byte followed by the Solidity parameter encoding of
//! `(uint8 v, bytes32 r, bytes32 s, address sponsee, uint256 nextra, uint256 mingas, address to,
//! uint256 value, bytes data)`.

use alloy_sol_types::{
    sol_data::{Address as SolAddress, Bytes as SolBytes, FixedBytes, Uint},
    SolType,
};
use revm_primitives::{alloy_primitives::B512, keccak256, Address, Bytes, B256, U256};
use std::vec::Vec;

use crate::SPONSORED_TX_TYPE;

/// Order of the secp256k1 curve.
pub const SECP256K1N: U256 = U256::from_limbs([
    0xBFD25E8CD0364141,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0xFFFFFFFFFFFFFFFF,
]);

/// Half the order of the secp256k1 curve, the largest `s` accepted.
pub const SECP256K1N_HALF: U256 = U256::from_limbs([
    0xDFE92F46681B20A0,
    0x5D576E7357A4501D,
    0xFFFFFFFFFFFFFFFF,
    0x7FFFFFFFFFFFFFFF,
]);

type ArgsTuple = (
    Uint<8>,
    FixedBytes<32>,
    FixedBytes<32>,
    SolAddress,
    Uint<256>,
    Uint<256>,
    SolAddress,
    Uint<256>,
    SolBytes,
);

type DigestTuple = (Uint<256>, Uint<256>, SolAddress, Uint<256>, SolBytes, SolAddress, Uint<256>);

/// Errors raised while reading a package out of the argument region.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("argument region is empty")]
    Empty,
    #[error("unsupported package type {0:#04x}")]
    UnsupportedType(u8),
    #[error("malformed package encoding: {0}")]
    Abi(#[from] alloy_sol_types::Error),
    #[error("invalid signature v value {0}")]
    InvalidV(u8),
    #[error("signature r is zero or not below the curve order")]
    InvalidR,
    #[error("signature s is zero or in the upper half of the curve order")]
    InvalidS,
}

/// ECDSA signature over the package digest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackageSignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl PackageSignature {
    pub const fn new(v: u8, r: B256, s: B256) -> Self {
        Self { v, r, s }
    }

    /// Returns the recovery id encoded in `v`. Both the raw (`0`, `1`) and the legacy offset
    /// (`27`, `28`) forms are accepted.
    pub const fn recovery_id(&self) -> Result<u8, PackageError> {
        match self.v {
            0 | 27 => Ok(0),
            1 | 28 => Ok(1),
            v => Err(PackageError::InvalidV(v)),
        }
    }

    /// Checks that the signature is well-formed: a known `v`, `0 < r < n` and `0 < s <= n/2`.
    pub fn validate(&self) -> Result<(), PackageError> {
        self.recovery_id()?;

        let r = U256::from_be_bytes(self.r.0);
        if r.is_zero() || r >= SECP256K1N {
            return Err(PackageError::InvalidR);
        }
        let s = U256::from_be_bytes(self.s.0);
        if s.is_zero() || s > SECP256K1N_HALF {
            return Err(PackageError::InvalidS);
        }
        Ok(())
    }

    /// Returns the compact `r || s` form.
    pub fn rs(&self) -> B512 {
        let mut rs = B512::ZERO;
        rs[..32].copy_from_slice(self.r.as_slice());
        rs[32..].copy_from_slice(self.s.as_slice());
        rs
    }
}

/// A transaction-like package signed by the sponsee.
///
/// The package is immutable once decoded; `nextra` is opaque to the instruction and only carried
/// through the signature for the invoking contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SponsoredPackage {
    pub tx_type: u8,
    pub sponsee: Address,
    pub nextra: U256,
    pub mingas: U256,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub signature: PackageSignature,
}

impl SponsoredPackage {
    /// Encodes the package into the byte layout `TXCALL` reads from memory.
    pub fn encode_args(&self) -> Bytes {
        let encoded = ArgsTuple::abi_encode_params(&(
            self.signature.v,
            self.signature.r,
            self.signature.s,
            self.sponsee,
            self.nextra,
            self.mingas,
            self.to,
            self.value,
            self.data.clone(),
        ));

        let mut args = Vec::with_capacity(1 + encoded.len());
        args.push(self.tx_type);
        args.extend_from_slice(&encoded);
        args.into()
    }

    /// Decodes a package from the argument region.
    ///
    /// The type byte is checked before the tuple is decoded, so a region with a foreign type is
    /// rejected without looking at the rest of it. Decoding is strict: trailing bytes or
    /// non-canonical words are errors.
    pub fn decode_args(args: &[u8]) -> Result<Self, PackageError> {
        let (&tx_type, encoded) = args.split_first().ok_or(PackageError::Empty)?;
        if tx_type != SPONSORED_TX_TYPE {
            return Err(PackageError::UnsupportedType(tx_type));
        }

        let (v, r, s, sponsee, nextra, mingas, to, value, data) =
            ArgsTuple::abi_decode_params(encoded, true)?;

        Ok(Self {
            tx_type,
            sponsee,
            nextra,
            mingas,
            to,
            value,
            data,
            signature: PackageSignature { v, r, s },
        })
    }

    /// Computes the digest the sponsee signs.
    ///
    /// `keccak256(type || abi.encode(nextra, mingas, to, value, data, invoker, chain_id))`. The
    /// invoker address binds the package to a single calling contract.
    pub fn signing_digest(&self, invoker: Address, chain_id: u64) -> B256 {
        let encoded = DigestTuple::abi_encode_params(&(
            self.nextra,
            self.mingas,
            self.to,
            self.value,
            self.data.clone(),
            invoker,
            U256::from(chain_id),
        ));

        let mut preimage = Vec::with_capacity(1 + encoded.len());
        preimage.push(self.tx_type);
        preimage.extend_from_slice(&encoded);
        keccak256(preimage)
    }
}
