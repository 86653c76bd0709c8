use {
  crate::{
    AccountId,
    Amount,
    AssetId,
    Authority,
    FlowLimit,
    Index,
    QueryValidationError,
    Sink,
    TankAttachment,
    TankId,
    TankSchematic,
    TankValidator,
    Tap,
    TapId,
    TargetedQuery,
    ValidationError,
  },
  serde::{Deserialize, Serialize},
  std::collections::{BTreeMap, BTreeSet},
  thiserror::Error,
};

/// Fee schedule for an operation: a flat part plus a per-byte charge on the
/// serialized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParameters {
  pub base_fee: Amount,
  pub price_per_byte: Amount,
}

impl Default for FeeParameters {
  fn default() -> Self {
    Self {
      base_fee: 5000,
      price_per_byte: 10,
    }
  }
}

/// Rejection reasons for a statically malformed operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
  #[error("must have positive deposit")]
  NonPositiveDeposit,

  #[error("emergency tap cannot be removed, only replaced")]
  RemoveEmergencyTap,

  #[error("required authorities must not contain duplicates")]
  DuplicateAuthorities,

  #[error("query list must not be empty")]
  NoQueries,

  #[error("tank id must be specified")]
  MissingTankId,

  #[error("release amount must not be negative")]
  NegativeRelease,

  #[error("release amount can only be zero when destroying the tank")]
  ZeroReleaseWithoutTeardown,

  #[error(
    "when destroying the tank, release amount must be unlimited, or zero if \
     the tank is already empty"
  )]
  BoundedTeardownRelease,

  #[error("number of taps to open must be at least one")]
  ZeroTapOpenCount,

  #[error("when clearing the connect authority, a new sink must be given")]
  ClearWithoutNewSink,

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Query(#[from] QueryValidationError),
}

fn check_distinct_authorities(
  authorities: &[Authority],
) -> Result<(), OperationError> {
  for (i, authority) in authorities.iter().enumerate() {
    if authorities[i + 1..].contains(authority) {
      return Err(OperationError::DuplicateAuthorities);
    }
  }
  Ok(())
}

fn check_queries(
  queries: &[TargetedQuery],
  queried_tank: TankId,
) -> Result<(), OperationError> {
  for query in queries {
    query.validate(queried_tank)?;
  }
  Ok(())
}

/// Create a new tank holding `contained_asset`, paying a deposit from the
/// payer's core-asset balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankCreate {
  pub payer: AccountId,
  /// Amount paid for the deposit, in core asset. Must exactly match the
  /// deposit the validator computes for the schematic.
  pub deposit_amount: Amount,
  pub contained_asset: AssetId,
  pub taps: Vec<Tap>,
  pub attachments: Vec<TankAttachment>,
}

/// Rework an existing tank's schematic, authorized by its emergency tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankUpdate {
  pub payer: AccountId,
  /// Must equal the existing emergency tap's open authority.
  pub update_authority: Authority,
  pub tank_to_update: TankId,
  /// Old deposit minus new deposit; positive deltas are refunded to the
  /// payer, negative ones charged.
  pub deposit_delta: Amount,
  pub taps_to_remove: BTreeSet<Index>,
  pub taps_to_replace: BTreeMap<Index, Tap>,
  pub taps_to_add: Vec<Tap>,
  pub attachments_to_remove: BTreeSet<Index>,
  pub attachments_to_replace: BTreeMap<Index, TankAttachment>,
  pub attachments_to_add: Vec<TankAttachment>,
}

/// Destroy an empty tank and reclaim its deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TankDelete {
  pub payer: AccountId,
  /// Must equal the emergency tap's open authority.
  pub delete_authority: Authority,
  pub tank_to_delete: TankId,
  /// Must exactly match the tank's deposit.
  pub deposit_claimed: Amount,
}

/// Run queries against a tank without opening any tap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankQuery {
  pub payer: AccountId,
  pub tank_to_query: TankId,
  /// Exactly the authorities the queries consume; no more, no fewer.
  pub required_authorities: Vec<Authority>,
  pub queries: Vec<TargetedQuery>,
}

/// Open a tap, releasing asset through its connected sink chain, possibly
/// cascading into further taps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapOpen {
  pub payer: AccountId,
  /// Exactly the authorities the queries and opened taps consume.
  pub required_authorities: Vec<Authority>,
  pub tap_to_open: TapId,
  pub release_amount: FlowLimit,
  /// When set, the opened tap must be a destructor tap and the tank is
  /// destroyed once drained; the claimed deposit must match exactly.
  pub deposit_claimed: Option<Amount>,
  /// Maximum number of taps this operation may open, cascades included.
  pub tap_open_count: u16,
  /// Queries run before the flow, arming requirements of the opened taps.
  pub queries: Vec<TargetedQuery>,
}

/// Connect, reconnect, or disconnect a tap through its connect authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapConnect {
  pub payer: AccountId,
  /// Must equal the tap's connect authority.
  pub connect_authority: Authority,
  pub tap_to_connect: TapId,
  /// The new sink; unset disconnects the tap.
  pub new_sink: Option<Sink>,
  /// Permanently freeze the connection by clearing the connect authority.
  pub clear_connect_authority: bool,
}

/// Every user action the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
  TankCreate(TankCreate),
  TankUpdate(TankUpdate),
  TankDelete(TankDelete),
  TankQuery(TankQuery),
  TapOpen(TapOpen),
  TapConnect(TapConnect),
}

impl Operation {
  /// Total fee for this operation under the given schedule.
  pub fn calculate_fee(&self, fees: &FeeParameters) -> Amount {
    let size = rmp_serde::to_vec(self).unwrap().len() as Amount;
    fees.base_fee + size * fees.price_per_byte
  }

  /// Stateless validation: everything that can be checked without the
  /// current chain state.
  pub fn validate(&self) -> Result<(), OperationError> {
    match self {
      Operation::TankCreate(op) => {
        if op.deposit_amount <= 0 {
          return Err(OperationError::NonPositiveDeposit);
        }
        // Chain limits are unavailable here; check structure with a
        // generous chain length and recheck against real limits at
        // evaluation time.
        let schematic = TankSchematic::from_create_operation(op);
        TankValidator::new(&schematic, 100, None, None).validate_tank()?;
        Ok(())
      }
      Operation::TankUpdate(op) => {
        if op.taps_to_remove.contains(&TankSchematic::EMERGENCY_TAP_ID) {
          return Err(OperationError::RemoveEmergencyTap);
        }
        crate::validation::check_authority(
          &op.update_authority,
          "update authority",
        )?;
        if let Some(replacement) =
          op.taps_to_replace.get(&TankSchematic::EMERGENCY_TAP_ID)
        {
          TankValidator::check_emergency_tap(replacement)?;
        }
        for tap in op.taps_to_replace.values().chain(op.taps_to_add.iter()) {
          TankValidator::check_tap(tap)?;
        }
        for attachment in op
          .attachments_to_replace
          .values()
          .chain(op.attachments_to_add.iter())
        {
          TankValidator::check_attachment(attachment)?;
        }
        Ok(())
      }
      Operation::TankDelete(op) => {
        crate::validation::check_authority(
          &op.delete_authority,
          "delete authority",
        )?;
        Ok(())
      }
      Operation::TankQuery(op) => {
        check_distinct_authorities(&op.required_authorities)?;
        if op.queries.is_empty() {
          return Err(OperationError::NoQueries);
        }
        check_queries(&op.queries, op.tank_to_query)
      }
      Operation::TapOpen(op) => {
        check_distinct_authorities(&op.required_authorities)?;
        let tank_id =
          op.tap_to_open.tank_id.ok_or(OperationError::MissingTankId)?;
        check_queries(&op.queries, tank_id)?;

        if let FlowLimit::Amount(amount) = op.release_amount {
          if amount < 0 {
            return Err(OperationError::NegativeRelease);
          }
          if amount == 0 && op.deposit_claimed.is_none() {
            return Err(OperationError::ZeroReleaseWithoutTeardown);
          }
        }
        if op.deposit_claimed.is_some()
          && !matches!(
            op.release_amount,
            FlowLimit::Unlimited | FlowLimit::Amount(0)
          )
        {
          return Err(OperationError::BoundedTeardownRelease);
        }
        if op.tap_open_count == 0 {
          return Err(OperationError::ZeroTapOpenCount);
        }
        Ok(())
      }
      Operation::TapConnect(op) => {
        crate::validation::check_authority(
          &op.connect_authority,
          "connect authority",
        )?;
        if op.tap_to_connect.tank_id.is_none() {
          return Err(OperationError::MissingTankId);
        }
        if op.clear_connect_authority && op.new_sink.is_none() {
          return Err(OperationError::ClearWithoutNewSink);
        }
        Ok(())
      }
    }
  }

  /// Accounts impacted by this operation, for the host's index.
  pub fn impacted_accounts(&self, accounts: &mut BTreeSet<AccountId>) {
    match self {
      Operation::TankCreate(op) => {
        accounts.insert(op.payer);
        let schematic = TankSchematic::from_create_operation(op);
        TankValidator::new(&schematic, 100, None, None)
          .referenced_accounts(accounts);
      }
      Operation::TankUpdate(op) => {
        accounts.insert(op.payer);
        accounts.extend(op.update_authority.accounts());
        for tap in op.taps_to_replace.values().chain(op.taps_to_add.iter()) {
          TankValidator::tap_referenced_accounts(accounts, tap);
        }
        for attachment in op
          .attachments_to_replace
          .values()
          .chain(op.attachments_to_add.iter())
        {
          TankValidator::attachment_referenced_accounts(accounts, attachment);
        }
      }
      Operation::TankDelete(op) => {
        accounts.insert(op.payer);
        accounts.extend(op.delete_authority.accounts());
      }
      Operation::TankQuery(op) => {
        accounts.insert(op.payer);
        for authority in &op.required_authorities {
          accounts.extend(authority.accounts());
        }
      }
      Operation::TapOpen(op) => {
        accounts.insert(op.payer);
        for authority in &op.required_authorities {
          accounts.extend(authority.accounts());
        }
      }
      Operation::TapConnect(op) => {
        accounts.insert(op.payer);
        accounts.extend(op.connect_authority.accounts());
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{FeeParameters, Operation, OperationError, TapOpen},
    crate::{Authority, AccountId, FlowLimit, TapId},
  };

  fn open_op() -> TapOpen {
    TapOpen {
      payer: AccountId(1),
      required_authorities: vec![],
      tap_to_open: TapId::new(crate::TankId(1), 1),
      release_amount: FlowLimit::Amount(10),
      deposit_claimed: None,
      tap_open_count: 1,
      queries: vec![],
    }
  }

  #[test]
  fn tap_open_static_checks() {
    assert_eq!(Operation::TapOpen(open_op()).validate(), Ok(()));

    let mut negative = open_op();
    negative.release_amount = FlowLimit::Amount(-5);
    assert_eq!(
      Operation::TapOpen(negative).validate(),
      Err(OperationError::NegativeRelease)
    );

    let mut zero = open_op();
    zero.release_amount = FlowLimit::Amount(0);
    assert_eq!(
      Operation::TapOpen(zero).validate(),
      Err(OperationError::ZeroReleaseWithoutTeardown)
    );

    let mut teardown = open_op();
    teardown.deposit_claimed = Some(100);
    assert_eq!(
      Operation::TapOpen(teardown).validate(),
      Err(OperationError::BoundedTeardownRelease)
    );

    let mut no_taps = open_op();
    no_taps.tap_open_count = 0;
    assert_eq!(
      Operation::TapOpen(no_taps).validate(),
      Err(OperationError::ZeroTapOpenCount)
    );

    let mut duplicated = open_op();
    duplicated.required_authorities =
      vec![Authority::single(AccountId(2)), Authority::single(AccountId(2))];
    assert_eq!(
      Operation::TapOpen(duplicated).validate(),
      Err(OperationError::DuplicateAuthorities)
    );
  }

  #[test]
  fn fees_grow_with_size() {
    let fees = FeeParameters::default();
    let small = Operation::TapOpen(open_op());
    let mut big_op = open_op();
    big_op.required_authorities =
      (0..10).map(|i| Authority::single(AccountId(i))).collect();
    let big = Operation::TapOpen(big_op);
    assert!(big.calculate_fee(&fees) > small.calculate_fee(&fees));
  }
}
