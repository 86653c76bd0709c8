use {
  crate::Amount,
  serde::{Deserialize, Serialize},
};

/// Chain-defined, chain-updatable limits and rates for tank structures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
  /// The maximum length of a sink chain (a sequence of tank attachments).
  pub max_sink_chain_length: u16,
  /// The maximum number of taps a single operation may open.
  pub max_taps_to_open: u16,
  /// Flat part of the deposit charged for every tank.
  pub tank_deposit_base: Amount,
  /// Per-byte part of the deposit, charged on the serialized schematic.
  pub deposit_per_byte: Amount,
}

impl Default for Parameters {
  fn default() -> Self {
    Self {
      max_sink_chain_length: 30,
      max_taps_to_open: 20,
      tank_deposit_base: 500,
      deposit_per_byte: 1,
    }
  }
}
