//! Handler register installing `TXCALL`.

use revm::{
    handler::register::EvmHandler,
    interpreter::{return_ok, Gas, InstructionResult, Interpreter, InterpreterResult},
    primitives::{spec_to_generic, Address, Bytes, EVMError, SpecId},
    Context, Database, Frame, FrameOrResult, FrameResult,
};
use std::{ops::Range, sync::Arc};
use tracing::{debug, trace};

use crate::{instruction::txcall, PendingTransfer, SponsoredExternal, TxCallResult, TXCALL};

/// Configure the handler for sponsored transactions.
///
/// This function modifies the following handlers:
/// - `instruction_table` - Inserts `TXCALL` at `0xF9` for the handler's spec. Other entries, including
///    ones installed by earlier registers, are left as they are.
/// - `execution.call` - Settles the value of a `TXCALL` from the invoker to the callee inside the
///    callee's checkpoint, so a reverted callee refunds the invoker. An invoker that cannot pay
///    turns the call into an `OutOfFunds` failure.
/// - `execution.insert_call_outcome` - Traces the [`TxCallResult`] of every call started by
///    `TXCALL` before handing the outcome to the previous handle.
pub fn sponsored_handle_register<EXT, DB>(handler: &mut EvmHandler<'_, EXT, DB>)
where
    EXT: SponsoredExternal,
    DB: Database,
{
    spec_to_generic!(handler.cfg.spec_id, {
        handler.instruction_table.insert(TXCALL, txcall::<Context<EXT, DB>, SPEC>);
    });

    let call = handler.execution.call.clone();
    handler.execution.call = Arc::new(move |context, inputs| {
        let Some(transfer) = context.external.pending_transfer().take() else {
            return call(context, inputs);
        };
        let to = inputs.target_address;
        let gas_limit = inputs.gas_limit;
        let memory_offset = inputs.return_memory_offset.clone();

        match call(context, inputs)? {
            FrameOrResult::Frame(Frame::Call(frame)) => {
                // the frame's checkpoint is still open, so the transfer reverts with the callee.
                match settle(context, transfer, to)? {
                    None => Ok(FrameOrResult::Frame(Frame::Call(frame))),
                    Some(failure) => {
                        let checkpoint = frame.frame_data.checkpoint;
                        context.evm.journaled_state.checkpoint_revert(checkpoint);
                        Ok(failed_call(failure, gas_limit, memory_offset))
                    }
                }
            }
            FrameOrResult::Result(FrameResult::Call(outcome))
                if matches!(outcome.instruction_result(), return_ok!()) =>
            {
                // precompile or account without code, the call already completed.
                let checkpoint = context.evm.journaled_state.checkpoint();
                match settle(context, transfer, to)? {
                    None => {
                        context.evm.journaled_state.checkpoint_commit();
                        Ok(FrameOrResult::Result(FrameResult::Call(outcome)))
                    }
                    Some(failure) => {
                        context.evm.journaled_state.checkpoint_revert(checkpoint);
                        Ok(failed_call(failure, gas_limit, memory_offset))
                    }
                }
            }
            frame_or_result => Ok(frame_or_result),
        }
    });

    let insert_call_outcome = handler.execution.insert_call_outcome.clone();
    handler.execution.insert_call_outcome =
        Arc::new(move |context, frame, shared_memory, outcome| {
            if is_txcall_frame(frame.interpreter()) {
                let result = TxCallResult::from(&outcome);
                trace!(?result, gas_remaining = outcome.gas().remaining(), "TXCALL returned");
            }
            insert_call_outcome(context, frame, shared_memory, outcome)
        });
}

/// Moves the staged value from the invoker to `to`.
fn settle<EXT, DB: Database>(
    context: &mut Context<EXT, DB>,
    transfer: PendingTransfer,
    to: Address,
) -> Result<Option<InstructionResult>, EVMError<DB::Error>> {
    let inner = &mut context.evm.inner;
    let failure =
        inner.journaled_state.transfer(&transfer.from, &to, transfer.value, &mut inner.db)?;
    if let Some(failure) = failure {
        debug!(
            invoker = %transfer.from,
            value = %transfer.value,
            ?failure,
            "TXCALL value not paid"
        );
    }
    Ok(failure)
}

fn failed_call(
    result: InstructionResult,
    gas_limit: u64,
    memory_offset: Range<usize>,
) -> FrameOrResult {
    FrameOrResult::new_call_result(
        InterpreterResult { result, gas: Gas::new(gas_limit), output: Bytes::new() },
        memory_offset,
    )
}

/// Returns whether the frame is suspended on a `TXCALL`.
///
/// A suspended legacy frame has its program counter right after the call opcode.
fn is_txcall_frame(interpreter: &Interpreter) -> bool {
    !interpreter.is_eof
        && interpreter
            .program_counter()
            .checked_sub(1)
            .and_then(|pc| interpreter.bytecode.get(pc))
            == Some(&TXCALL)
}
