use {
  crate::{Database, Error, TankObject},
  std::collections::{btree_map::Entry, BTreeMap, BTreeSet},
  tnt_primitives::{
    AccountId,
    Amount,
    AssetId,
    Parameters,
    SchematicStore,
    TankId,
    TankSchematic,
    Timestamp,
  },
};

/// Copy-on-write staging over the host database for a single operation.
///
/// Reads fall through to the underlying database until a tank is first
/// written, at which point the wrapper clones it and serves the mutable
/// copy. Account credits and tank removals are buffered likewise. Nothing
/// reaches the host database until the staged [`StateDiff`] is applied;
/// dropping the wrapper abandons every staged change.
pub struct CowDb<'db, D: Database> {
  db: &'db D,
  staged: BTreeMap<TankId, TankObject>,
  removed: BTreeSet<TankId>,
  credits: Vec<(AccountId, AssetId, Amount)>,
}

impl<'db, D: Database> CowDb<'db, D> {
  pub fn new(db: &'db D) -> Self {
    Self {
      db,
      staged: BTreeMap::new(),
      removed: BTreeSet::new(),
      credits: Vec::new(),
    }
  }

  pub fn tank(&self, id: TankId) -> Result<&TankObject, Error> {
    if self.removed.contains(&id) {
      return Err(Error::NoSuchTank(id));
    }
    if let Some(tank) = self.staged.get(&id) {
      return Ok(tank);
    }
    self.db.tank(id).ok_or(Error::NoSuchTank(id))
  }

  /// Mutable access; clones the tank out of the database on first write.
  pub fn tank_mut(&mut self, id: TankId) -> Result<&mut TankObject, Error> {
    if self.removed.contains(&id) {
      return Err(Error::NoSuchTank(id));
    }
    match self.staged.entry(id) {
      Entry::Occupied(staged) => Ok(staged.into_mut()),
      Entry::Vacant(slot) => {
        let tank = self.db.tank(id).ok_or(Error::NoSuchTank(id))?.clone();
        Ok(slot.insert(tank))
      }
    }
  }

  /// Stage a tank removal.
  pub fn remove_tank(&mut self, id: TankId) {
    self.staged.remove(&id);
    self.removed.insert(id);
  }

  /// Stage an account credit, applied through the host's balance adjuster.
  pub fn credit_account(
    &mut self,
    account: AccountId,
    asset: AssetId,
    amount: Amount,
  ) {
    self.credits.push((account, asset, amount));
  }

  pub fn head_block_time(&self) -> Timestamp {
    self.db.head_block_time()
  }

  pub fn parameters(&self) -> &Parameters {
    self.db.parameters()
  }

  pub fn is_authorized_asset(&self, account: AccountId, asset: AssetId) -> bool {
    self.db.is_authorized_asset(account, asset)
  }

  /// Turn the staged mutations into a diff, ready to apply atomically.
  pub fn into_diff(self) -> StateDiff {
    StateDiff {
      upserts: self.staged,
      removals: self.removed,
      credits: self.credits,
    }
  }
}

impl<'db, D: Database> SchematicStore for CowDb<'db, D> {
  fn schematic(&self, id: TankId) -> Option<&TankSchematic> {
    if self.removed.contains(&id) {
      return None;
    }
    if let Some(tank) = self.staged.get(&id) {
      return Some(&tank.schematic);
    }
    self.db.tank(id).map(|tank| &tank.schematic)
  }
}

/// The buffered outcome of one operation, applied to the host database in a
/// single step once the operation has fully succeeded.
#[derive(Debug, Default)]
pub struct StateDiff {
  upserts: BTreeMap<TankId, TankObject>,
  removals: BTreeSet<TankId>,
  credits: Vec<(AccountId, AssetId, Amount)>,
}

impl StateDiff {
  pub fn apply(self, db: &mut impl Database) {
    for (_, tank) in self.upserts {
      db.put_tank(tank);
    }
    for id in self.removals {
      db.remove_tank(id);
    }
    for (account, asset, amount) in self.credits {
      db.adjust_balance(account, asset, amount);
    }
  }
}
