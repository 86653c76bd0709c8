use {
  crate::Error,
  serde::{Deserialize, Serialize},
  std::collections::{BTreeMap, BTreeSet},
  tnt_primitives::{
    AccessoryAddress,
    AccessoryState,
    AccessoryStateMap,
    AccountId,
    Amount,
    AssetId,
    CumulativeFlowState,
    DelayState,
    ExchangeState,
    Index,
    MeterState,
    Parameters,
    PeriodicFlowState,
    ReviewState,
    SchematicStore,
    TankId,
    TankSchematic,
    TicketState,
    Timestamp,
  },
};

/// The database entity for a tank: its schematic, balances, and the mutable
/// state of its stateful accessories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankObject {
  pub id: TankId,
  pub schematic: TankSchematic,
  /// Asset currently held by the tank, in its contained asset type.
  pub balance: Amount,
  /// Core asset held against the tank's storage, refunded on deletion.
  pub deposit: Amount,
  /// State of stateful accessories, addressed by accessory address.
  pub accessory_states: AccessoryStateMap,
  /// Cached id of the tank's deposit source restrictor, if any.
  pub restrictor_id: Option<Index>,
  /// When the tank was created; periodic flow limits count periods from
  /// here.
  pub creation_date: Timestamp,
}

impl TankObject {
  pub fn new(
    id: TankId,
    schematic: TankSchematic,
    deposit: Amount,
    creation_date: Timestamp,
  ) -> Self {
    let restrictor_id = schematic.source_restrictor();
    Self {
      id,
      schematic,
      balance: 0,
      deposit,
      accessory_states: AccessoryStateMap::default(),
      restrictor_id,
      creation_date,
    }
  }

  pub fn meter_state(&self, attachment_id: Index) -> Option<&MeterState> {
    match self
      .accessory_states
      .get(&AccessoryAddress::attachment(attachment_id))?
    {
      AccessoryState::Meter(state) => Some(state),
      _ => None,
    }
  }

  pub fn meter_state_mut(
    &mut self,
    attachment_id: Index,
  ) -> Result<&mut MeterState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::attachment(attachment_id),
      || AccessoryState::Meter(MeterState::default()),
    ) {
      AccessoryState::Meter(state) => Ok(state),
      _ => Err(Error::Internal("attachment state is not a meter state")),
    }
  }

  pub fn cumulative_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut CumulativeFlowState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Cumulative(CumulativeFlowState::default()),
    ) {
      AccessoryState::Cumulative(state) => Ok(state),
      _ => Err(Error::Internal(
        "requirement state is not a cumulative flow state",
      )),
    }
  }

  pub fn periodic_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut PeriodicFlowState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Periodic(PeriodicFlowState::default()),
    ) {
      AccessoryState::Periodic(state) => Ok(state),
      _ => Err(Error::Internal(
        "requirement state is not a periodic flow state",
      )),
    }
  }

  pub fn review_state(
    &self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Option<&ReviewState> {
    match self
      .accessory_states
      .get(&AccessoryAddress::requirement(tap_id, requirement_index))?
    {
      AccessoryState::Review(state) => Some(state),
      _ => None,
    }
  }

  pub fn review_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut ReviewState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Review(ReviewState::default()),
    ) {
      AccessoryState::Review(state) => Ok(state),
      _ => Err(Error::Internal("requirement state is not a review state")),
    }
  }

  pub fn delay_state(
    &self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Option<&DelayState> {
    match self
      .accessory_states
      .get(&AccessoryAddress::requirement(tap_id, requirement_index))?
    {
      AccessoryState::Delay(state) => Some(state),
      _ => None,
    }
  }

  pub fn delay_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut DelayState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Delay(DelayState::default()),
    ) {
      AccessoryState::Delay(state) => Ok(state),
      _ => Err(Error::Internal("requirement state is not a delay state")),
    }
  }

  pub fn ticket_state(
    &self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Option<&TicketState> {
    match self
      .accessory_states
      .get(&AccessoryAddress::requirement(tap_id, requirement_index))?
    {
      AccessoryState::Ticket(state) => Some(state),
      _ => None,
    }
  }

  pub fn ticket_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut TicketState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Ticket(TicketState::default()),
    ) {
      AccessoryState::Ticket(state) => Ok(state),
      _ => Err(Error::Internal("requirement state is not a ticket state")),
    }
  }

  pub fn exchange_state(
    &self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Option<&ExchangeState> {
    match self
      .accessory_states
      .get(&AccessoryAddress::requirement(tap_id, requirement_index))?
    {
      AccessoryState::Exchange(state) => Some(state),
      _ => None,
    }
  }

  pub fn exchange_state_mut(
    &mut self,
    tap_id: Index,
    requirement_index: Index,
  ) -> Result<&mut ExchangeState, Error> {
    match self.accessory_states.get_or_insert_with(
      AccessoryAddress::requirement(tap_id, requirement_index),
      || AccessoryState::Exchange(ExchangeState::default()),
    ) {
      AccessoryState::Exchange(state) => Ok(state),
      _ => Err(Error::Internal("requirement state is not an exchange state")),
    }
  }
}

/// Everything the engine needs from the host chain: balances and asset
/// authorization, head-block time, chain parameters, and the tank object
/// store.
pub trait Database {
  fn get_balance(&self, account: AccountId, asset: AssetId) -> Amount;
  fn adjust_balance(&mut self, account: AccountId, asset: AssetId, delta: Amount);
  fn is_authorized_asset(&self, account: AccountId, asset: AssetId) -> bool;
  fn head_block_time(&self) -> Timestamp;
  fn parameters(&self) -> &Parameters;

  fn tank(&self, id: TankId) -> Option<&TankObject>;
  fn create_tank(&mut self, schematic: TankSchematic, deposit: Amount)
    -> TankId;
  fn put_tank(&mut self, tank: TankObject);
  fn remove_tank(&mut self, id: TankId);
}

/// Adapts any [`Database`] to the validator's schematic store.
pub struct StoreAdapter<'a, D: Database>(pub &'a D);

impl<'a, D: Database> SchematicStore for StoreAdapter<'a, D> {
  fn schematic(&self, id: TankId) -> Option<&TankSchematic> {
    self.0.tank(id).map(|tank| &tank.schematic)
  }
}

/// An in-memory chain, used in tests and other short-lived scenarios such
/// as simulators.
#[derive(Debug, Default)]
pub struct InMemoryChain {
  tanks: BTreeMap<TankId, TankObject>,
  balances: BTreeMap<(AccountId, AssetId), Amount>,
  unauthorized: BTreeSet<(AccountId, AssetId)>,
  now: Timestamp,
  parameters: Parameters,
  next_tank_id: u64,
}

impl InMemoryChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_time(&mut self, now: Timestamp) {
    self.now = now;
  }

  pub fn advance_time(&mut self, seconds: u64) {
    self.now += seconds;
  }

  pub fn set_parameters(&mut self, parameters: Parameters) {
    self.parameters = parameters;
  }

  /// Credit an account balance directly, bypassing any operation.
  pub fn credit(&mut self, account: AccountId, asset: AssetId, amount: Amount) {
    *self.balances.entry((account, asset)).or_default() += amount;
  }

  /// Forbid an account from transacting an asset.
  pub fn revoke_asset(&mut self, account: AccountId, asset: AssetId) {
    self.unauthorized.insert((account, asset));
  }

  /// Direct mutable access to a tank, for fixtures that fund tanks outside
  /// of any operation.
  pub fn tank_mut(&mut self, id: TankId) -> Option<&mut TankObject> {
    self.tanks.get_mut(&id)
  }

  pub fn tank_count(&self) -> usize {
    self.tanks.len()
  }
}

impl Database for InMemoryChain {
  fn get_balance(&self, account: AccountId, asset: AssetId) -> Amount {
    self.balances.get(&(account, asset)).copied().unwrap_or(0)
  }

  fn adjust_balance(
    &mut self,
    account: AccountId,
    asset: AssetId,
    delta: Amount,
  ) {
    *self.balances.entry((account, asset)).or_default() += delta;
  }

  fn is_authorized_asset(&self, account: AccountId, asset: AssetId) -> bool {
    !self.unauthorized.contains(&(account, asset))
  }

  fn head_block_time(&self) -> Timestamp {
    self.now
  }

  fn parameters(&self) -> &Parameters {
    &self.parameters
  }

  fn tank(&self, id: TankId) -> Option<&TankObject> {
    self.tanks.get(&id)
  }

  fn create_tank(
    &mut self,
    schematic: TankSchematic,
    deposit: Amount,
  ) -> TankId {
    let id = TankId(self.next_tank_id);
    self.next_tank_id += 1;
    self
      .tanks
      .insert(id, TankObject::new(id, schematic, deposit, self.now));
    id
  }

  fn put_tank(&mut self, tank: TankObject) {
    self.tanks.insert(tank.id, tank);
  }

  fn remove_tank(&mut self, id: TankId) {
    self.tanks.remove(&id);
  }
}
