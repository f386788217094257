use revm::{primitives::SpecId, Database, Evm};

use crate::{sponsored_handle_register, SponsoredExternal};

/// Installs `TXCALL` on an existing [`Evm`].
pub trait SponsoredBuilder<'a, EXT, DB: Database>: Sized {
    /// Returns the EVM with [`sponsored_handle_register`] appended. The register is reapplied
    /// whenever the spec id changes later on.
    fn with_sponsored_transactions(self) -> Evm<'a, EXT, DB>;
}

impl<'a, EXT, DB> SponsoredBuilder<'a, EXT, DB> for Evm<'a, EXT, DB>
where
    EXT: SponsoredExternal,
    DB: Database,
{
    fn with_sponsored_transactions(self) -> Evm<'a, EXT, DB> {
        self.modify().append_handler_register(sponsored_handle_register).build()
    }
}

/// Builds an [`Evm`] for `spec_id` with `TXCALL` installed.
///
/// The register is appended after the external context is set, since setting it resets the
/// handler.
pub fn sponsored_evm<'a, EXT, DB>(db: DB, external: EXT, spec_id: SpecId) -> Evm<'a, EXT, DB>
where
    EXT: SponsoredExternal,
    DB: Database,
{
    Evm::builder()
        .with_db(db)
        .with_external_context(external)
        .append_handler_register(sponsored_handle_register)
        .with_spec_id(spec_id)
        .build()
}
