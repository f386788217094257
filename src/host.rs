use revm::{
    interpreter::Host,
    primitives::{Address, U256},
    Context, Database,
};

use crate::{Secp256k1Recovery, SignatureRecovery, SponsoredConfig};

/// Value an accepted `TXCALL` moves out of the invoker.
///
/// The call itself carries the sponsee as caller, so the transfer is staged here and settled by
/// [`sponsored_handle_register`](crate::sponsored_handle_register) once the callee frame exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingTransfer {
    /// The invoker, which pays the value.
    pub from: Address,
    pub value: U256,
}

/// External EVM context that carries what `TXCALL` needs from outside the interpreter.
pub trait SponsoredExternal {
    fn sponsored_config(&self) -> &SponsoredConfig;

    fn signature_recovery(&self) -> &dyn SignatureRecovery;

    /// Transfer staged by the last accepted `TXCALL` and not yet settled.
    fn pending_transfer(&mut self) -> &mut Option<PendingTransfer>;
}

/// External context with a configuration and a recovery backend.
#[derive(Clone, Debug, Default)]
pub struct SponsoredContext<R = Secp256k1Recovery> {
    pub config: SponsoredConfig,
    pub recovery: R,
    pending_transfer: Option<PendingTransfer>,
}

impl<R> SponsoredContext<R> {
    pub const fn new(config: SponsoredConfig, recovery: R) -> Self {
        Self { config, recovery, pending_transfer: None }
    }
}

impl<R: SignatureRecovery> SponsoredExternal for SponsoredContext<R> {
    fn sponsored_config(&self) -> &SponsoredConfig {
        &self.config
    }

    fn signature_recovery(&self) -> &dyn SignatureRecovery {
        &self.recovery
    }

    fn pending_transfer(&mut self) -> &mut Option<PendingTransfer> {
        &mut self.pending_transfer
    }
}

/// Host extension used by the `TXCALL` instruction.
pub trait SponsoredHost: Host {
    fn sponsored_config(&self) -> &SponsoredConfig;

    fn signature_recovery(&self) -> &dyn SignatureRecovery;

    /// Stages the value transfer of the call the instruction is about to dispatch.
    fn stage_transfer(&mut self, transfer: PendingTransfer);
}

impl<EXT, DB> SponsoredHost for Context<EXT, DB>
where
    EXT: SponsoredExternal,
    DB: Database,
{
    fn sponsored_config(&self) -> &SponsoredConfig {
        self.external.sponsored_config()
    }

    fn signature_recovery(&self) -> &dyn SignatureRecovery {
        self.external.signature_recovery()
    }

    fn stage_transfer(&mut self, transfer: PendingTransfer) {
        *self.external.pending_transfer() = Some(transfer);
    }
}
