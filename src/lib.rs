//! Sponsored transactions for revm.
//!
//! `TXCALL` (`0xF9`) lets a contract, the invoker, make a call on behalf of a sponsee who signed a
//! transaction-like package off-chain. The sponsor pays for gas by sending the transaction that
//! reaches the invoker; the callee sees the sponsee as `CALLER`.
//!
//! The instruction leaves two words on the stack: `success` (the package was honoured) and, on
//! top of it, `calleeSuccess` (the nested call returned normally). Replay protection is left to
//! the invoker, which receives the opaque `nextra` field for that purpose.
//!
//! Contracts must not assume that `CALLER == ORIGIN` implies a non-reentrant context once
//! `TXCALL` is available.
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
#[cfg(not(feature = "std"))]
extern crate alloc as std;

mod builder;
mod config;
pub mod gas;
mod handle_register;
mod host;
mod instruction;
mod package;
mod recovery;

pub use builder::{sponsored_evm, SponsoredBuilder};
pub use config::SponsoredConfig;
pub use handle_register::sponsored_handle_register;
pub use host::{PendingTransfer, SponsoredContext, SponsoredExternal, SponsoredHost};
pub use instruction::{
    check_preconditions, make_sponsored_instruction_table, txcall, Invocation, Precondition,
    TxCallResult,
};
pub use package::{
    PackageError, PackageSignature, SponsoredPackage, SECP256K1N, SECP256K1N_HALF,
};
pub use recovery::{Secp256k1Recovery, SignatureRecovery};

/// Opcode of `TXCALL`.
pub const TXCALL: u8 = 0xF9;

/// Transaction type reserved for sponsored packages. A package of any other type is never
/// honoured.
pub const SPONSORED_TX_TYPE: u8 = 0x03;

#[cfg(test)]
mod test_utils;
