//! Gas schedule of `TXCALL`.
//!
//! The base cost lives here. The cost of forwarding the nested call is whatever the host
//! charges for a `CALL` with the same operands, and is only paid once every precondition holds.

use revm::primitives::SpecId;

/// Flat part of the base cost.
pub const TXCALL_BASE: u64 = 3200;

/// Cost per 32-byte word of the argument region.
pub const TXCALL_WORD: u64 = 6;

/// Base cost of `TXCALL` for an argument region of `args_len` bytes:
/// `3200 + 6 * ceil(args_len / 32)`.
///
/// Charged whether or not the package is honoured. Cannot overflow: even `u64::MAX` bytes is at
/// most `2^59` words.
#[inline]
pub const fn txcall_base_cost(args_len: u64) -> u64 {
    TXCALL_BASE + TXCALL_WORD * args_len.div_ceil(32)
}

/// Gas the callee of an accepted `TXCALL` receives before any stipend.
///
/// `remaining` is the frame's gas once the base cost is paid and `call_cost` the host's cost for
/// the call. From Tangerine Whistle on the frame keeps one 64th of what is left.
pub const fn forwarded_gas(
    spec_id: SpecId,
    remaining: u64,
    call_cost: u64,
    gas_operand: u64,
) -> u64 {
    let Some(left) = remaining.checked_sub(call_cost) else {
        return 0;
    };
    if !SpecId::enabled(spec_id, SpecId::TANGERINE) {
        return gas_operand;
    }
    let available = left - left / 64;
    if gas_operand < available {
        gas_operand
    } else {
        available
    }
}
