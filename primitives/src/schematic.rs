use {
  crate::{
    operations::{TankCreate, TankUpdate},
    AssetId,
    Authority,
    Index,
    Sink,
    TankAttachment,
    TapRequirement,
  },
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
};

/// A named outflow from a tank, gated by requirements and connected to a
/// sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tap {
  /// The connected sink; if omitted, `connect_authority` must be set.
  pub connected_sink: Option<Sink>,
  /// The authority to open the tap; if unset, anyone who can satisfy the
  /// requirements can open it. The emergency tap must set one.
  pub open_authority: Option<Authority>,
  /// The authority to connect and disconnect the tap. If unset, the tap
  /// must be connected on creation and the connection can never change.
  pub connect_authority: Option<Authority>,
  /// Requirements gating this tap's releases. The emergency tap may not
  /// have any.
  pub requirements: Vec<TapRequirement>,
  /// If true, this tap can be used to destroy the tank once it empties.
  pub destructor_tap: bool,
}

/// Static description of a tank's taps and attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankSchematic {
  /// Taps on this tank. Id 0 must exist and satisfy the emergency tap
  /// contract.
  pub taps: BTreeMap<Index, Tap>,
  /// Counter of taps added; used to assign tap ids.
  pub tap_counter: Index,
  /// Attachments on this tank.
  pub attachments: BTreeMap<Index, TankAttachment>,
  /// Counter of attachments added; used to assign attachment ids.
  pub attachment_counter: Index,
  /// Type of asset this tank can store.
  pub asset_type: AssetId,
}

impl TankSchematic {
  /// The id of the mandatory emergency tap.
  pub const EMERGENCY_TAP_ID: Index = 0;

  /// Build a schematic from the contents of a create operation.
  pub fn from_create_operation(op: &TankCreate) -> Self {
    let mut schematic = TankSchematic {
      taps: BTreeMap::new(),
      tap_counter: 0,
      attachments: BTreeMap::new(),
      attachment_counter: 0,
      asset_type: op.contained_asset,
    };
    for attachment in &op.attachments {
      schematic
        .attachments
        .insert(schematic.attachment_counter, attachment.clone());
      schematic.attachment_counter += 1;
    }
    for tap in &op.taps {
      schematic.taps.insert(schematic.tap_counter, tap.clone());
      schematic.tap_counter += 1;
    }
    schematic
  }

  /// Apply an update operation's removes, replaces, and adds.
  pub fn apply_update(&mut self, op: &TankUpdate) {
    for id in &op.taps_to_remove {
      self.taps.remove(id);
    }
    for (id, tap) in &op.taps_to_replace {
      self.taps.insert(*id, tap.clone());
    }
    for tap in &op.taps_to_add {
      self.taps.insert(self.tap_counter, tap.clone());
      self.tap_counter += 1;
    }
    for id in &op.attachments_to_remove {
      self.attachments.remove(id);
    }
    for (id, attachment) in &op.attachments_to_replace {
      self.attachments.insert(*id, attachment.clone());
    }
    for attachment in &op.attachments_to_add {
      self
        .attachments
        .insert(self.attachment_counter, attachment.clone());
      self.attachment_counter += 1;
    }
  }

  pub fn emergency_tap(&self) -> Option<&Tap> {
    self.taps.get(&Self::EMERGENCY_TAP_ID)
  }

  /// The tank's deposit source restrictor, if it has one.
  pub fn source_restrictor(&self) -> Option<Index> {
    self
      .attachments
      .iter()
      .find(|(_, a)| matches!(a, TankAttachment::SourceRestrictor(_)))
      .map(|(id, _)| *id)
  }
}
