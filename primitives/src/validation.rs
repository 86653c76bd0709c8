use {
  crate::{
    AccountId,
    Amount,
    AssetId,
    AttachmentId,
    AttachmentKind,
    Authority,
    DepositPath,
    FlowLimit,
    Index,
    LookupError,
    LookupUtilities,
    Parameters,
    PathElement,
    RequirementKind,
    SchematicStore,
    Sink,
    SinkAsset,
    SinkChainError,
    TankAttachment,
    TankId,
    TankSchematic,
    Tap,
    TapRequirement,
  },
  multihash_codetable::Code,
  std::collections::{BTreeMap, BTreeSet},
  thiserror::Error,
};

/// Rejection reasons for a tank schematic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("{role} must not be an impossible authority")]
  ImpossibleAuthority { role: &'static str },

  #[error("{role} must not be a trivial authority")]
  TrivialAuthority { role: &'static str },

  #[error("{role} must not be the null authority")]
  NullAuthority { role: &'static str },

  #[error("deposit source restrictor must accept at least one deposit path")]
  NoDepositPaths,

  #[error(
    "deposit path patterns must contain at least two elements, for a source \
     and a destination"
  )]
  ShortDepositPath,

  #[error(
    "deposit path patterns must begin and end with a terminal sink or a \
     wildcard"
  )]
  PathEndpointNotTerminal,

  #[error("deposit path patterns must end with the current tank or a wildcard")]
  PathBadTerminus,

  #[error("a single wildcard is not a valid deposit path pattern")]
  SingleWildcardPattern,

  #[error(
    "a repeatable wildcard in a deposit path pattern cannot be adjacent to \
     another wildcard"
  )]
  AdjacentWildcards,

  #[error("{what} must be positive")]
  NonPositive { what: &'static str },

  #[error("time lock must specify at least one lock/unlock time")]
  EmptyTimeLock,

  #[error("hash lock uses an unrecognized hash algorithm")]
  UnknownHashAlgorithm,

  #[error("ticket signer must not be the null public key")]
  NullTicketSigner,

  #[error("tap opener references nonexistent tap {tap}")]
  OpenerTargetMissing { tap: Index },

  #[error("attachment connect authority references nonexistent attachment \
           {attachment}")]
  ConnectTargetMissing { attachment: Index },

  #[error(
    "attachment connect authority references attachment {attachment}, which \
     does not receive asset"
  )]
  ConnectTargetReceivesNoAsset { attachment: Index },

  #[error("{role} references an attachment which is not a meter")]
  NotAMeter { role: &'static str },

  #[error("{role} references a meter which accepts the wrong asset")]
  MeterWrongAsset { role: &'static str },

  #[error("sink {sink:?} cannot receive asset")]
  SinkReceivesNoAsset { sink: Sink },

  #[error("sink {sink:?} receives the wrong asset")]
  SinkWrongAsset { sink: Sink },

  #[error("tap connects to a sink chain which exceeds the maximum length")]
  SinkChainTooLong,

  #[error("emergency tap does not exist")]
  EmergencyTapMissing,

  #[error("emergency tap must have no requirements")]
  EmergencyTapHasRequirements,

  #[error("emergency tap must specify an open authority")]
  EmergencyTapNoOpenAuthority,

  #[error("emergency tap must specify a connect authority")]
  EmergencyTapNoConnectAuthority,

  #[error("emergency tap must be a destructor tap")]
  EmergencyTapNotDestructor,

  #[error("tap must be connected, or specify a connect authority")]
  UnconnectableTap,

  #[error("requested tap {tap} does not exist")]
  TapMissing { tap: Index },

  #[error("requested attachment {attachment} does not exist")]
  AttachmentMissing { attachment: Index },

  #[error("tap {tap} has no requirement at index {index}")]
  RequirementMissing { tap: Index, index: Index },

  #[error("tank may have at most one {0:?} attachment")]
  DuplicateUniqueAttachment(AttachmentKind),

  #[error(
    "tap {tap} connects to a destination tank, but is not accepted by the \
     destination's deposit source restrictor"
  )]
  RestrictorRejectsTap { tap: Index },

  #[error(transparent)]
  Lookup(#[from] LookupError),
}

/// Reject impossible, trivial, and null authorities.
pub fn check_authority(
  authority: &Authority,
  role: &'static str,
) -> Result<(), ValidationError> {
  if authority.is_impossible() {
    return Err(ValidationError::ImpossibleAuthority { role });
  }
  if authority.is_trivial() {
    return Err(ValidationError::TrivialAuthority { role });
  }
  if authority.is_null() {
    return Err(ValidationError::NullAuthority { role });
  }
  Ok(())
}

fn sink_account(sink: &Sink, accounts: &mut BTreeSet<AccountId>) {
  if let Sink::Account(id) = sink {
    accounts.insert(*id);
  }
}

/// Validation and summary information for a tank schematic.
///
/// With a schematic store, cross-tank references are resolved and checked;
/// without one they are presumed valid.
pub struct TankValidator<'a> {
  lookup: LookupUtilities<'a>,
  max_sink_chain_length: usize,
  attachment_counters: BTreeMap<AttachmentKind, Index>,
  requirement_counters: BTreeMap<RequirementKind, Index>,
}

impl<'a> TankValidator<'a> {
  pub fn new(
    schematic: &'a TankSchematic,
    max_sink_chain_length: usize,
    tank_id: Option<TankId>,
    store: Option<&'a dyn SchematicStore>,
  ) -> Self {
    Self {
      lookup: LookupUtilities::new(schematic, tank_id, store),
      max_sink_chain_length,
      attachment_counters: BTreeMap::new(),
      requirement_counters: BTreeMap::new(),
    }
  }

  fn schematic(&self) -> &'a TankSchematic {
    self.lookup.current_tank()
  }

  /// Validate the full schematic: all attachments, the emergency tap, and
  /// every tap with its requirements and connected sink chain.
  pub fn validate_tank(&mut self) -> Result<(), ValidationError> {
    // Attachments first: taps may connect to them, so they should be
    // internally valid by the time taps are checked.
    let attachment_ids: Vec<Index> =
      self.schematic().attachments.keys().copied().collect();
    for id in attachment_ids {
      self.validate_attachment(id)?;
    }
    for (kind, count) in &self.attachment_counters {
      if kind.unique() && *count > 1 {
        return Err(ValidationError::DuplicateUniqueAttachment(*kind));
      }
    }

    self.validate_emergency_tap()?;

    let tap_ids: Vec<Index> = self.schematic().taps.keys().copied().collect();
    for id in tap_ids {
      self.validate_tap(id)?;
    }
    Ok(())
  }

  /// Validate a single attachment, including its cross-references.
  pub fn validate_attachment(
    &mut self,
    attachment_id: Index,
  ) -> Result<(), ValidationError> {
    let attachment = self
      .schematic()
      .attachments
      .get(&attachment_id)
      .ok_or(ValidationError::AttachmentMissing {
        attachment: attachment_id,
      })?;
    Self::check_attachment(attachment)?;

    match attachment {
      TankAttachment::FlowMeter(meter) => {
        self.check_sink_asset(&meter.destination_sink, meter.asset_type)?;
      }
      TankAttachment::SourceRestrictor(restrictor) => {
        // A pattern naming an explicit tank as its terminus must name the
        // tank under validation.
        for pattern in &restrictor.legal_deposit_paths {
          if let Some(PathElement::Sink(Sink::Tank(tank))) = pattern.last() {
            if self.lookup.self_id() != Some(*tank) {
              return Err(ValidationError::PathBadTerminus);
            }
          }
        }
      }
      TankAttachment::TapOpener(opener) => {
        if !self.schematic().taps.contains_key(&opener.tap_index) {
          return Err(ValidationError::OpenerTargetMissing {
            tap: opener.tap_index,
          });
        }
        self.check_sink_asset(&opener.destination_sink, opener.asset_type)?;
      }
      TankAttachment::ConnectAuthority(aca) => {
        let target = self
          .schematic()
          .attachments
          .get(&aca.attachment_id)
          .ok_or(ValidationError::ConnectTargetMissing {
            attachment: aca.attachment_id,
          })?;
        if target.receives_asset().is_none() {
          return Err(ValidationError::ConnectTargetReceivesNoAsset {
            attachment: aca.attachment_id,
          });
        }
      }
    }

    *self
      .attachment_counters
      .entry(attachment.kind())
      .or_default() += 1;
    Ok(())
  }

  /// Validate one requirement on a tap, including its cross-references.
  pub fn validate_tap_requirement(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<(), ValidationError> {
    let tap = self
      .schematic()
      .taps
      .get(&tap_id)
      .ok_or(ValidationError::TapMissing { tap: tap_id })?;
    let requirement = tap
      .requirements
      .get(usize::from(requirement_index))
      .ok_or(ValidationError::RequirementMissing {
        tap: tap_id,
        index: requirement_index,
      })?;
    Self::check_requirement(requirement)?;

    if let TapRequirement::Exchange(exchange) = requirement {
      self.check_meter(&exchange.meter_id, "exchange requirement", None)?;
    }

    *self
      .requirement_counters
      .entry(requirement.kind())
      .or_default() += 1;
    Ok(())
  }

  /// Validate a single tap: connectability, requirements, and the integrity
  /// of its connected sink chain.
  pub fn validate_tap(&mut self, tap_id: Index) -> Result<(), ValidationError> {
    let tap = self
      .schematic()
      .taps
      .get(&tap_id)
      .ok_or(ValidationError::TapMissing { tap: tap_id })?;
    if tap.connected_sink.is_none() && tap.connect_authority.is_none() {
      return Err(ValidationError::UnconnectableTap);
    }

    let requirement_count = tap.requirements.len();
    for i in 0..requirement_count {
      self.validate_tap_requirement(tap_id, i as Index)?;
    }

    self.check_tap_connection(tap_id)
  }

  pub fn validate_emergency_tap(&self) -> Result<(), ValidationError> {
    let tap = self
      .schematic()
      .emergency_tap()
      .ok_or(ValidationError::EmergencyTapMissing)?;
    Self::check_emergency_tap(tap)
  }

  /// Follow a connected tap's sink chain and check it deposits legally.
  fn check_tap_connection(&self, tap_id: Index) -> Result<(), ValidationError> {
    let tap = self
      .schematic()
      .taps
      .get(&tap_id)
      .ok_or(ValidationError::TapMissing { tap: tap_id })?;
    let sink = match &tap.connected_sink {
      Some(sink) => sink,
      None => return Ok(()),
    };

    let chain = match self.lookup.get_sink_chain(
      sink,
      self.max_sink_chain_length,
      Some(self.schematic().asset_type),
    ) {
      Ok(chain) => chain,
      Err(SinkChainError::ReceivesNoAsset(sink)) => {
        return Err(ValidationError::SinkReceivesNoAsset { sink })
      }
      Err(SinkChainError::ReceivesWrongAsset(sink)) => {
        return Err(ValidationError::SinkWrongAsset { sink })
      }
      Err(SinkChainError::ExceededMaxLength(_)) => {
        return Err(ValidationError::SinkChainTooLong)
      }
      Err(SinkChainError::Lookup(LookupError::NeedLookup)) => return Ok(()),
      Err(SinkChainError::Lookup(e)) => return Err(e.into()),
    };

    // If the chain terminates in a tank with a deposit source restrictor,
    // the path this tap deposits through must be acceptable to it.
    let destination = match chain.destination_tank() {
      Some(tank) => tank,
      None => return Ok(()),
    };
    let schematic = match self.lookup.lookup_tank(Some(destination)) {
      Ok(schematic) => schematic,
      Err(LookupError::NeedLookup) => return Ok(()),
      Err(e) => return Err(e.into()),
    };
    if let Some(restrictor_id) = schematic.source_restrictor() {
      if let Some(TankAttachment::SourceRestrictor(restrictor)) =
        schematic.attachments.get(&restrictor_id)
      {
        let path = DepositPath {
          origin: self.lookup.self_id().map(Sink::Tank),
          sink_chain: chain.sinks,
        };
        if restrictor.matching_path(&path, Some(destination)).is_none() {
          return Err(ValidationError::RestrictorRejectsTap { tap: tap_id });
        }
      }
    }
    Ok(())
  }

  /// Check that a destination sink can receive the given asset.
  fn check_sink_asset(
    &self,
    sink: &Sink,
    asset: AssetId,
  ) -> Result<(), ValidationError> {
    match self.lookup.get_sink_asset(sink) {
      Ok(SinkAsset::AnyAsset) => Ok(()),
      Ok(SinkAsset::Asset(a)) if a == asset => Ok(()),
      Ok(SinkAsset::Asset(_)) => {
        Err(ValidationError::SinkWrongAsset { sink: sink.clone() })
      }
      Ok(SinkAsset::NoAsset(_)) => {
        Err(ValidationError::SinkReceivesNoAsset { sink: sink.clone() })
      }
      Err(LookupError::NeedLookup) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  /// Check that an attachment reference points at a meter, optionally of a
  /// particular asset type.
  fn check_meter(
    &self,
    id: &AttachmentId,
    role: &'static str,
    asset: Option<AssetId>,
  ) -> Result<(), ValidationError> {
    let attachment = match self.lookup.lookup_attachment(id) {
      Ok(attachment) => attachment,
      Err(LookupError::NeedLookup) => return Ok(()),
      Err(e) => return Err(e.into()),
    };
    match attachment {
      TankAttachment::FlowMeter(meter) => {
        if asset.map_or(false, |a| a != meter.asset_type) {
          return Err(ValidationError::MeterWrongAsset { role });
        }
        Ok(())
      }
      _ => Err(ValidationError::NotAMeter { role }),
    }
  }

  /// Per-kind attachment counts gathered so far.
  pub fn attachment_counts(&self) -> &BTreeMap<AttachmentKind, Index> {
    &self.attachment_counters
  }

  /// Per-kind requirement counts gathered so far.
  pub fn requirement_counts(&self) -> &BTreeMap<RequirementKind, Index> {
    &self.requirement_counters
  }

  /// The deposit a tank with this schematic must carry.
  pub fn calculate_deposit(&self, parameters: &Parameters) -> Amount {
    let size = rmp_serde::to_vec(self.schematic()).unwrap().len() as Amount;
    parameters.tank_deposit_base + size * parameters.deposit_per_byte
  }

  /// Every account referenced anywhere in the schematic, for the host's
  /// impacted-accounts set.
  pub fn referenced_accounts(&self, accounts: &mut BTreeSet<AccountId>) {
    for tap in self.schematic().taps.values() {
      Self::tap_referenced_accounts(accounts, tap);
    }
    for attachment in self.schematic().attachments.values() {
      Self::attachment_referenced_accounts(accounts, attachment);
    }
  }

  // Stateless checks, shared with operation validation where no schematic
  // context exists yet.

  pub fn check_attachment(
    attachment: &TankAttachment,
  ) -> Result<(), ValidationError> {
    match attachment {
      TankAttachment::FlowMeter(meter) => {
        if let Some(authority) = &meter.reset_authority {
          check_authority(authority, "meter reset authority")?;
        }
        Ok(())
      }
      TankAttachment::SourceRestrictor(restrictor) => {
        if restrictor.legal_deposit_paths.is_empty() {
          return Err(ValidationError::NoDepositPaths);
        }
        for pattern in &restrictor.legal_deposit_paths {
          Self::check_deposit_path_pattern(pattern)?;
        }
        Ok(())
      }
      TankAttachment::TapOpener(opener) => {
        if let FlowLimit::Amount(amount) = opener.release_amount {
          if amount <= 0 {
            return Err(ValidationError::NonPositive {
              what: "tap opener release amount",
            });
          }
        }
        Ok(())
      }
      TankAttachment::ConnectAuthority(aca) => {
        check_authority(&aca.connect_authority, "attachment connect authority")
      }
    }
  }

  fn check_deposit_path_pattern(
    pattern: &[PathElement],
  ) -> Result<(), ValidationError> {
    if pattern.len() < 2 {
      return Err(ValidationError::ShortDepositPath);
    }
    if let Some(PathElement::Sink(sink)) = pattern.first() {
      if !sink.is_terminal() {
        return Err(ValidationError::PathEndpointNotTerminal);
      }
    }
    match pattern.last() {
      Some(PathElement::Sink(sink)) => {
        if !sink.is_terminal() {
          return Err(ValidationError::PathEndpointNotTerminal);
        }
        if !matches!(sink, Sink::SameTank | Sink::Tank(_)) {
          return Err(ValidationError::PathBadTerminus);
        }
      }
      _ => {}
    }
    if pattern.len() < 3
      && matches!(pattern.first(), Some(PathElement::Wildcard(_)))
    {
      return Err(ValidationError::SingleWildcardPattern);
    }
    for window in pattern.windows(2) {
      if let [PathElement::Wildcard(a), PathElement::Wildcard(b)] = window {
        if a.repeatable || b.repeatable {
          return Err(ValidationError::AdjacentWildcards);
        }
      }
    }
    Ok(())
  }

  pub fn check_requirement(
    requirement: &TapRequirement,
  ) -> Result<(), ValidationError> {
    match requirement {
      TapRequirement::Immediate(req) => {
        if req.limit <= 0 {
          return Err(ValidationError::NonPositive {
            what: "immediate flow limit",
          });
        }
      }
      TapRequirement::Cumulative(req) => {
        if req.limit <= 0 {
          return Err(ValidationError::NonPositive {
            what: "cumulative flow limit",
          });
        }
      }
      TapRequirement::Periodic(req) => {
        if req.limit <= 0 {
          return Err(ValidationError::NonPositive {
            what: "periodic flow limit",
          });
        }
        if req.period_duration_sec == 0 {
          return Err(ValidationError::NonPositive {
            what: "periodic flow limit period",
          });
        }
      }
      TapRequirement::TimeLock(req) => {
        if req.lock_unlock_times.is_empty() {
          return Err(ValidationError::EmptyTimeLock);
        }
      }
      TapRequirement::MinimumLevel(req) => {
        if req.minimum_level <= 0 {
          return Err(ValidationError::NonPositive {
            what: "minimum tank level",
          });
        }
      }
      TapRequirement::Review(req) => {
        check_authority(&req.reviewer, "reviewer")?;
      }
      TapRequirement::Documentation(_) => {}
      TapRequirement::Delay(req) => {
        if let Some(authority) = &req.veto_authority {
          check_authority(authority, "veto authority")?;
        }
        if req.delay_period_sec == 0 {
          return Err(ValidationError::NonPositive {
            what: "delay period",
          });
        }
      }
      TapRequirement::HashPreimage(req) => {
        if Code::try_from(req.hash.code()).is_err() {
          return Err(ValidationError::UnknownHashAlgorithm);
        }
        if req.preimage_size == Some(0) {
          return Err(ValidationError::NonPositive {
            what: "hash lock preimage size",
          });
        }
      }
      TapRequirement::Ticket(req) => {
        if req.ticket_signer.as_bytes() == &[0u8; 32] {
          return Err(ValidationError::NullTicketSigner);
        }
      }
      TapRequirement::Exchange(req) => {
        if req.tick_amount <= 0 {
          return Err(ValidationError::NonPositive {
            what: "exchange requirement tick amount",
          });
        }
        if req.release_per_tick <= 0 {
          return Err(ValidationError::NonPositive {
            what: "exchange requirement release amount",
          });
        }
      }
    }
    Ok(())
  }

  pub fn check_tap(tap: &Tap) -> Result<(), ValidationError> {
    if tap.connected_sink.is_none() && tap.connect_authority.is_none() {
      return Err(ValidationError::UnconnectableTap);
    }
    for requirement in &tap.requirements {
      Self::check_requirement(requirement)?;
    }
    Ok(())
  }

  pub fn check_emergency_tap(tap: &Tap) -> Result<(), ValidationError> {
    if !tap.requirements.is_empty() {
      return Err(ValidationError::EmergencyTapHasRequirements);
    }
    if tap.open_authority.is_none() {
      return Err(ValidationError::EmergencyTapNoOpenAuthority);
    }
    if tap.connect_authority.is_none() {
      return Err(ValidationError::EmergencyTapNoConnectAuthority);
    }
    if !tap.destructor_tap {
      return Err(ValidationError::EmergencyTapNotDestructor);
    }
    Ok(())
  }

  pub fn tap_referenced_accounts(
    accounts: &mut BTreeSet<AccountId>,
    tap: &Tap,
  ) {
    if let Some(authority) = &tap.open_authority {
      accounts.extend(authority.accounts());
    }
    if let Some(authority) = &tap.connect_authority {
      accounts.extend(authority.accounts());
    }
    if let Some(sink) = &tap.connected_sink {
      sink_account(sink, accounts);
    }
    for requirement in &tap.requirements {
      match requirement {
        TapRequirement::Review(req) => {
          accounts.extend(req.reviewer.accounts());
        }
        TapRequirement::Delay(req) => {
          if let Some(authority) = &req.veto_authority {
            accounts.extend(authority.accounts());
          }
        }
        _ => {}
      }
    }
  }

  pub fn attachment_referenced_accounts(
    accounts: &mut BTreeSet<AccountId>,
    attachment: &TankAttachment,
  ) {
    match attachment {
      TankAttachment::FlowMeter(meter) => {
        sink_account(&meter.destination_sink, accounts);
        if let Some(authority) = &meter.reset_authority {
          accounts.extend(authority.accounts());
        }
      }
      TankAttachment::SourceRestrictor(restrictor) => {
        for pattern in &restrictor.legal_deposit_paths {
          for element in pattern {
            if let PathElement::Sink(sink) = element {
              sink_account(sink, accounts);
            }
          }
        }
      }
      TankAttachment::TapOpener(opener) => {
        sink_account(&opener.destination_sink, accounts);
      }
      TankAttachment::ConnectAuthority(aca) => {
        accounts.extend(aca.connect_authority.accounts());
      }
    }
  }
}
