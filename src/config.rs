use revm::primitives::SpecId;

/// Configuration of the `TXCALL` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SponsoredConfig {
    /// First hardfork at which `TXCALL` is honoured.
    pub activation: SpecId,
}

impl SponsoredConfig {
    pub const fn new() -> Self {
        Self { activation: SpecId::CANCUN }
    }

    pub const fn with_activation(mut self, activation: SpecId) -> Self {
        self.activation = activation;
        self
    }

    /// Returns whether `TXCALL` is active for `spec_id`.
    pub const fn is_active(&self, spec_id: SpecId) -> bool {
        SpecId::enabled(spec_id, self.activation)
    }
}

impl Default for SponsoredConfig {
    fn default() -> Self {
        Self::new()
    }
}
