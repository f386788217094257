use revm::{
    interpreter::{
        gas,
        instructions::contract::{calc_call_gas, extdelegatecall, resize_memory},
        opcode::{make_instruction_table, InstructionTable},
        pop, push, CallInputs, CallOutcome, CallScheme, CallValue, InstructionResult,
        Interpreter, InterpreterAction, LoadAccountResult,
    },
    primitives::{Address, Bytes, Spec, U256},
};
use std::boxed::Box;
use tracing::{debug, trace};

use crate::{
    gas::{forwarded_gas, txcall_base_cost},
    host::{PendingTransfer, SponsoredHost},
    PackageError, SignatureRecovery, SponsoredPackage, TXCALL,
};

/// Creates an instruction table for `SPEC` with `TXCALL` installed at `0xF9`.
///
/// Only needed when driving an [`Interpreter`] directly; an `Evm` gets the instruction through
/// [`sponsored_handle_register`](crate::sponsored_handle_register).
pub fn make_sponsored_instruction_table<H: SponsoredHost + ?Sized, SPEC: Spec>(
) -> InstructionTable<H> {
    let mut table = make_instruction_table::<H, SPEC>();
    table[TXCALL as usize] = txcall::<H, SPEC>;
    table
}

/// Outcome of a single `TXCALL`, projected onto the two stack words it leaves behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxCallResult {
    /// The package was rejected and no call was made.
    PreconditionFailed,
    /// The package was accepted but the callee reverted, halted or could not be entered.
    CalleeReverted,
    /// The package was accepted and the callee returned normally.
    CalleeSucceeded,
}

impl TxCallResult {
    /// The `success` word: every precondition held.
    pub const fn success(self) -> bool {
        !matches!(self, Self::PreconditionFailed)
    }

    /// The `calleeSuccess` word. Never set without `success`.
    pub const fn callee_success(self) -> bool {
        matches!(self, Self::CalleeSucceeded)
    }

    /// Returns `(success, calleeSuccess)` as stack words.
    pub fn to_words(self) -> (U256, U256) {
        (U256::from(self.success()), U256::from(self.callee_success()))
    }

    /// Reads a result back from its stack words. Returns `None` for a pair no execution can
    /// produce.
    pub fn from_words(success: U256, callee_success: U256) -> Option<Self> {
        match (success.is_zero(), callee_success.is_zero()) {
            (true, true) => Some(Self::PreconditionFailed),
            (false, true) => Some(Self::CalleeReverted),
            (false, false) => Some(Self::CalleeSucceeded),
            (true, false) => None,
        }
    }
}

impl From<&CallOutcome> for TxCallResult {
    fn from(outcome: &CallOutcome) -> Self {
        if outcome.instruction_result().is_ok() {
            Self::CalleeSucceeded
        } else {
            Self::CalleeReverted
        }
    }
}

/// A package rejected by `TXCALL`, by the first check that failed.
#[derive(Debug, thiserror::Error)]
pub enum Precondition {
    #[error(transparent)]
    Decode(#[from] PackageError),
    #[error("malformed signature: {0}")]
    MalformedSignature(PackageError),
    #[error("signature does not recover to an address")]
    Unrecoverable,
    #[error("recovered signer {recovered} does not match sponsee {sponsee}")]
    SignerMismatch { recovered: Address, sponsee: Address },
    #[error("gas operand {gas} is below the signed minimum {mingas}")]
    GasBelowMinimum { gas: U256, mingas: U256 },
    #[error("remaining gas {remaining} is below the signed minimum {mingas}")]
    RemainingGasBelowMinimum { remaining: u64, mingas: U256 },
    #[error("callee would receive {forwarded} gas, below the signed minimum {mingas}")]
    ForwardedGasBelowMinimum { forwarded: u64, mingas: U256 },
    #[error("value operand {supplied} does not match signed value {signed}")]
    ValueMismatch { supplied: U256, signed: U256 },
    #[error("value transfer inside a static context")]
    StaticValueTransfer,
}

/// Execution context a package is checked against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Invocation {
    /// Address of the contract executing `TXCALL`.
    pub invoker: Address,
    pub chain_id: u64,
    /// `gas` stack operand.
    pub gas: U256,
    /// `value` stack operand.
    pub value: U256,
    /// Gas left in the frame after the base cost was charged.
    pub remaining_gas: u64,
    pub is_static: bool,
}

/// Decodes the argument region and runs every `TXCALL` precondition in order, stopping at the
/// first that fails.
///
/// Pure: nothing is charged and no state is touched, so a rejected package leaves no trace
/// beyond the base cost already paid by the caller.
pub fn check_preconditions<R: SignatureRecovery + ?Sized>(
    args: &[u8],
    invocation: &Invocation,
    recovery: &R,
) -> Result<SponsoredPackage, Precondition> {
    let package = SponsoredPackage::decode_args(args)?;

    package.signature.validate().map_err(Precondition::MalformedSignature)?;
    let digest = package.signing_digest(invocation.invoker, invocation.chain_id);
    let recovered =
        recovery.recover_signer(&digest, &package.signature).ok_or(Precondition::Unrecoverable)?;
    if recovered != package.sponsee {
        return Err(Precondition::SignerMismatch { recovered, sponsee: package.sponsee });
    }

    if invocation.gas < package.mingas {
        return Err(Precondition::GasBelowMinimum { gas: invocation.gas, mingas: package.mingas });
    }
    if U256::from(invocation.remaining_gas) < package.mingas {
        return Err(Precondition::RemainingGasBelowMinimum {
            remaining: invocation.remaining_gas,
            mingas: package.mingas,
        });
    }

    if invocation.value != package.value {
        return Err(Precondition::ValueMismatch {
            supplied: invocation.value,
            signed: package.value,
        });
    }
    if invocation.is_static && !package.value.is_zero() {
        return Err(Precondition::StaticValueTransfer);
    }

    Ok(package)
}

// TXCALL IMPLEMENTATION
// ================================================================================================

/// `TXCALL` (`0xF9`): calls `to` on behalf of a sponsee who signed the package in memory.
///
/// Stack in: `gas, value, argsOffset, argsLength, retOffset, retLength`.
/// Stack out: `success, calleeSuccess` with `calleeSuccess` on top.
///
/// Memory expansion and the base cost are always charged. A rejected package pushes two zeros,
/// clears the return data buffer and continues. A package is also rejected when the callee would
/// receive less than `mingas` after the `CALL` cost. An accepted package pushes `success`, pays
/// the regular `CALL` cost and hands a call with `caller = sponsee` to the host, which pushes
/// `calleeSuccess` once the callee returns.
///
/// The invoker pays `value`. The transfer is staged on the host and settled inside the callee
/// frame by [`sponsored_handle_register`](crate::sponsored_handle_register).
///
/// In EOF code the opcode keeps its EOF meaning, `EXTDELEGATECALL`.
pub fn txcall<H: SponsoredHost + ?Sized, SPEC: Spec>(interpreter: &mut Interpreter, host: &mut H) {
    if interpreter.is_eof {
        extdelegatecall::<H, SPEC>(interpreter, host);
        return;
    }
    if !host.sponsored_config().is_active(SPEC::SPEC_ID) {
        interpreter.instruction_result = InstructionResult::NotActivated;
        return;
    }

    pop!(interpreter, local_gas_limit, value);
    pop!(interpreter, args_offset, args_len, ret_offset, ret_len);

    let Some(args_range) = resize_memory(interpreter, args_offset, args_len) else {
        return;
    };
    let Some(return_memory_offset) = resize_memory(interpreter, ret_offset, ret_len) else {
        return;
    };
    gas!(interpreter, txcall_base_cost(args_range.len() as u64));

    let invocation = Invocation {
        invoker: interpreter.contract.target_address,
        chain_id: host.env().cfg.chain_id,
        gas: local_gas_limit,
        value,
        remaining_gas: interpreter.gas.remaining(),
        is_static: interpreter.is_static,
    };
    let args: &[u8] = if args_range.is_empty() {
        &[]
    } else {
        interpreter.shared_memory.slice_range(args_range)
    };

    let package = match check_preconditions(args, &invocation, host.signature_recovery()) {
        Ok(package) => package,
        Err(reason) => return reject(interpreter, invocation.invoker, reason),
    };

    let Some(LoadAccountResult { is_cold, is_empty }) = host.load_account(package.to) else {
        interpreter.instruction_result = InstructionResult::FatalExternalError;
        return;
    };
    let has_transfer = !package.value.is_zero();
    // a gas operand above u64 asks for everything the frame can give.
    let local_gas_limit = u64::try_from(local_gas_limit).unwrap_or(u64::MAX);

    // the callee must be able to receive the signed minimum once the call is paid for.
    let call_cost = gas::call_cost(SPEC::SPEC_ID, has_transfer, is_cold, is_empty);
    let forwarded =
        forwarded_gas(SPEC::SPEC_ID, interpreter.gas.remaining(), call_cost, local_gas_limit);
    if U256::from(forwarded) < package.mingas {
        let reason = Precondition::ForwardedGasBelowMinimum { forwarded, mingas: package.mingas };
        return reject(interpreter, invocation.invoker, reason);
    }

    let Some(mut gas_limit) =
        calc_call_gas::<SPEC>(interpreter, is_cold, has_transfer, is_empty, local_gas_limit)
    else {
        return;
    };
    gas!(interpreter, gas_limit);

    // add call stipend if there is value to be transferred.
    if has_transfer {
        gas_limit = gas_limit.saturating_add(gas::CALL_STIPEND);
    }

    push!(interpreter, U256::from(1));

    trace!(
        invoker = %invocation.invoker,
        sponsee = %package.sponsee,
        to = %package.to,
        value = %package.value,
        gas_limit,
        "TXCALL package accepted"
    );

    // the invoker pays the value while the callee sees the sponsee as caller.
    host.stage_transfer(PendingTransfer { from: invocation.invoker, value: package.value });
    interpreter.next_action = InterpreterAction::Call {
        inputs: Box::new(CallInputs {
            input: package.data,
            gas_limit,
            target_address: package.to,
            caller: package.sponsee,
            bytecode_address: package.to,
            value: CallValue::Apparent(package.value),
            scheme: CallScheme::Call,
            is_static: interpreter.is_static,
            is_eof: false,
            return_memory_offset,
        }),
    };
    interpreter.instruction_result = InstructionResult::CallOrCreate;
}

/// Leaves `0, 0` on the stack and an empty return data buffer. Execution continues.
fn reject(interpreter: &mut Interpreter, invoker: Address, reason: Precondition) {
    debug!(%invoker, %reason, "TXCALL package rejected");
    interpreter.return_data_buffer = Bytes::new();
    let (success, callee_success) = TxCallResult::PreconditionFailed.to_words();
    push!(interpreter, success, callee_success);
}
