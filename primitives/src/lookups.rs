use {
  crate::{
    AssetId,
    AttachmentId,
    Sink,
    TankAttachment,
    TankId,
    TankSchematic,
  },
  thiserror::Error,
};

/// Resolves tank schematics by id, usually backed by the host database.
pub trait SchematicStore {
  fn schematic(&self, id: TankId) -> Option<&TankSchematic>;
}

/// Why a lookup could not produce the referenced object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
  #[error("referenced tank {0:?} does not exist")]
  NonexistentTank(TankId),

  #[error("referenced attachment {0:?} does not exist")]
  NonexistentAttachment(AttachmentId),

  #[error("reference to another tank requires a schematic store")]
  NeedLookup,
}

/// What asset a sink can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAsset {
  /// The sink receives exactly this asset.
  Asset(AssetId),
  /// The sink is an account and can receive any asset.
  AnyAsset,
  /// The sink is an attachment which receives no asset at all.
  NoAsset(AttachmentId),
}

/// Why a sink chain could not be walked to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkChainError {
  #[error("sink {0:?} cannot receive asset")]
  ReceivesNoAsset(Sink),

  #[error("sink {0:?} receives the wrong asset")]
  ReceivesWrongAsset(Sink),

  #[error("sink chain exceeds the maximum length of {0}")]
  ExceededMaxLength(usize),

  #[error(transparent)]
  Lookup(#[from] LookupError),
}

/// A walked chain of sinks, ending in a terminal sink or a remote
/// attachment the walker will not cross into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkChain {
  /// Every sink traversed, in order, terminal included.
  pub sinks: Vec<Sink>,
  /// The tank implied by a terminating `SameTank`, when known.
  pub final_sink_tank: Option<TankId>,
}

impl SinkChain {
  /// The tank the chain deposits into, if its terminal sink is a tank.
  pub fn destination_tank(&self) -> Option<TankId> {
    match self.sinks.last() {
      Some(Sink::SameTank) => self.final_sink_tank,
      Some(Sink::Tank(id)) => Some(*id),
      _ => None,
    }
  }
}

/// Information retrieval over a tank schematic and its cross-tank
/// references.
///
/// Without a schematic store, every cross-tank reference resolves to
/// `LookupError::NeedLookup`; callers validating without a store treat that
/// as "presumed valid".
pub struct LookupUtilities<'a> {
  current_tank: &'a TankSchematic,
  self_id: Option<TankId>,
  store: Option<&'a dyn SchematicStore>,
}

impl<'a> LookupUtilities<'a> {
  pub fn new(
    current_tank: &'a TankSchematic,
    self_id: Option<TankId>,
    store: Option<&'a dyn SchematicStore>,
  ) -> Self {
    Self {
      current_tank,
      self_id,
      store,
    }
  }

  pub fn current_tank(&self) -> &'a TankSchematic {
    self.current_tank
  }

  pub fn self_id(&self) -> Option<TankId> {
    self.self_id
  }

  /// Lookup a tank by id; a null id resolves to the current tank.
  pub fn lookup_tank(
    &self,
    id: Option<TankId>,
  ) -> Result<&TankSchematic, LookupError> {
    match id {
      None => Ok(self.current_tank),
      Some(id) if self.self_id == Some(id) => Ok(self.current_tank),
      Some(id) => match self.store {
        None => Err(LookupError::NeedLookup),
        Some(store) => {
          store.schematic(id).ok_or(LookupError::NonexistentTank(id))
        }
      },
    }
  }

  pub fn lookup_attachment(
    &self,
    id: &AttachmentId,
  ) -> Result<&TankAttachment, LookupError> {
    let tank = self.lookup_tank(id.tank_id)?;
    tank
      .attachments
      .get(&id.attachment_id)
      .ok_or_else(|| LookupError::NonexistentAttachment(id.clone()))
  }

  /// What asset an attachment accepts; `None` when it receives no asset.
  pub fn get_attachment_asset(
    &self,
    id: &AttachmentId,
  ) -> Result<Option<AssetId>, LookupError> {
    Ok(self.lookup_attachment(id)?.receives_asset())
  }

  /// What asset a sink can receive.
  pub fn get_sink_asset(&self, sink: &Sink) -> Result<SinkAsset, LookupError> {
    match sink {
      Sink::Account(_) => Ok(SinkAsset::AnyAsset),
      Sink::SameTank => Ok(SinkAsset::Asset(self.current_tank.asset_type)),
      Sink::Tank(id) => self
        .lookup_tank(Some(*id))
        .map(|schematic| SinkAsset::Asset(schematic.asset_type)),
      Sink::Attachment(id) => {
        Ok(match self.get_attachment_asset(id)? {
          Some(asset) => SinkAsset::Asset(asset),
          None => SinkAsset::NoAsset(id.clone()),
        })
      }
    }
  }

  /// Walk the chain of attachment sinks starting at `start` until it
  /// reaches a terminal sink, checking along the way that every sink
  /// accepts `expected_asset` (when provided) and that the chain stays
  /// within `max_length`.
  ///
  /// The walker never crosses into another tank: an attachment on a remote
  /// tank ends the chain and is returned as its last sink, for the caller
  /// to resolve.
  pub fn get_sink_chain(
    &self,
    start: &Sink,
    max_length: usize,
    expected_asset: Option<AssetId>,
  ) -> Result<SinkChain, SinkChainError> {
    let mut sinks = Vec::new();
    let mut sink = start.clone();

    loop {
      let attachment_id = match sink {
        Sink::Attachment(ref id) => id.clone(),
        terminal => {
          let final_sink_tank = match terminal {
            Sink::SameTank => self.self_id,
            _ => None,
          };
          if let (Sink::Tank(id), Some(expected)) = (&terminal, expected_asset)
          {
            match self.lookup_tank(Some(*id)) {
              Ok(schematic) if schematic.asset_type != expected => {
                return Err(SinkChainError::ReceivesWrongAsset(terminal));
              }
              Ok(_) => {}
              Err(LookupError::NeedLookup) => {}
              Err(e) => return Err(e.into()),
            }
          }
          sinks.push(terminal);
          return Ok(SinkChain {
            sinks,
            final_sink_tank,
          });
        }
      };

      if sinks.len() >= max_length {
        return Err(SinkChainError::ExceededMaxLength(max_length));
      }

      let local = match attachment_id.tank_id {
        None => true,
        Some(id) => self.self_id == Some(id),
      };

      if !local {
        // Verify what we can and hand the remote sink back to the caller.
        match self.get_attachment_asset(&attachment_id) {
          Ok(Some(asset)) => {
            if expected_asset.map_or(false, |expected| expected != asset) {
              return Err(SinkChainError::ReceivesWrongAsset(sink));
            }
          }
          Ok(None) => return Err(SinkChainError::ReceivesNoAsset(sink)),
          Err(LookupError::NeedLookup) => {}
          Err(e) => return Err(e.into()),
        }
        sinks.push(sink);
        return Ok(SinkChain {
          sinks,
          final_sink_tank: None,
        });
      }

      let attachment = self
        .current_tank
        .attachments
        .get(&attachment_id.attachment_id)
        .ok_or(LookupError::NonexistentAttachment(attachment_id.clone()))?;

      let next = match attachment {
        TankAttachment::FlowMeter(meter) => {
          if expected_asset.map_or(false, |e| e != meter.asset_type) {
            return Err(SinkChainError::ReceivesWrongAsset(sink));
          }
          meter.destination_sink.clone()
        }
        TankAttachment::TapOpener(opener) => {
          if expected_asset.map_or(false, |e| e != opener.asset_type) {
            return Err(SinkChainError::ReceivesWrongAsset(sink));
          }
          opener.destination_sink.clone()
        }
        TankAttachment::SourceRestrictor(_)
        | TankAttachment::ConnectAuthority(_) => {
          return Err(SinkChainError::ReceivesNoAsset(sink));
        }
      };

      sinks.push(sink);
      sink = next;
    }
  }
}
