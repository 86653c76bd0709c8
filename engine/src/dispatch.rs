use {
  crate::{
    tap_flow,
    CowDb,
    Database,
    Error,
    QueryEvaluator,
    StoreAdapter,
    TapFlowReport,
  },
  tnt_primitives::{
    Authority,
    FlowLimit,
    Operation,
    SchematicStore,
    TankCreate,
    TankDelete,
    TankId,
    TankQuery,
    TankSchematic,
    TankUpdate,
    TankValidator,
    TapConnect,
    TapOpen,
    CORE_ASSET,
  },
  tracing::debug,
};

/// What a successfully applied operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
  TankCreated(TankId),
  TankUpdated,
  TankDeleted,
  Queried,
  TapOpened(TapFlowReport),
  TapConnected,
}

/// Validate and apply one operation against the host database.
///
/// Operations are atomic: multi-step evaluation runs against a staged
/// copy-on-write wrapper, and nothing reaches the database unless the whole
/// operation succeeds.
pub fn apply_operation(
  db: &mut impl Database,
  op: &Operation,
) -> Result<OperationOutcome, Error> {
  op.validate()?;
  match op {
    Operation::TankCreate(op) => tank_create(db, op),
    Operation::TankUpdate(op) => tank_update(db, op),
    Operation::TankDelete(op) => tank_delete(db, op),
    Operation::TankQuery(op) => tank_query(db, op),
    Operation::TapOpen(op) => tap_open(db, op),
    Operation::TapConnect(op) => tap_connect(db, op),
  }
}

/// Check that the consumed authorities and the declared ones are the same
/// set: nothing missing, nothing unused.
fn verify_authority_set(
  declared: &[Authority],
  consumed: &[Authority],
) -> Result<(), Error> {
  for authority in consumed {
    if !declared.contains(authority) {
      return Err(Error::MissingAuthority(authority.clone()));
    }
  }
  for authority in declared {
    if !consumed.contains(authority) {
      return Err(Error::UnusedAuthority(authority.clone()));
    }
  }
  Ok(())
}

fn tank_create(
  db: &mut impl Database,
  op: &TankCreate,
) -> Result<OperationOutcome, Error> {
  if db.get_balance(op.payer, CORE_ASSET) < op.deposit_amount {
    return Err(Error::InsufficientBalance);
  }

  let schematic = TankSchematic::from_create_operation(op);
  let parameters = db.parameters().clone();
  let store = StoreAdapter(&*db);
  let mut validator = TankValidator::new(
    &schematic,
    usize::from(parameters.max_sink_chain_length),
    None,
    Some(&store as &dyn SchematicStore),
  );
  validator.validate_tank()?;

  let deposit = validator.calculate_deposit(&parameters);
  if deposit != op.deposit_amount {
    return Err(Error::WrongDeposit {
      expected: deposit,
      actual: op.deposit_amount,
    });
  }

  db.adjust_balance(op.payer, CORE_ASSET, -deposit);
  let id = db.create_tank(schematic, deposit);
  debug!(?id, deposit, "tank created");
  Ok(OperationOutcome::TankCreated(id))
}

fn tank_update(
  db: &mut impl Database,
  op: &TankUpdate,
) -> Result<OperationOutcome, Error> {
  let mut tank = db
    .tank(op.tank_to_update)
    .ok_or(Error::NoSuchTank(op.tank_to_update))?
    .clone();

  let update_authority = tank
    .schematic
    .emergency_tap()
    .and_then(|tap| tap.open_authority.as_ref())
    .ok_or(Error::Internal("validated tank lacks an emergency tap"))?;
  if op.update_authority != *update_authority {
    return Err(Error::AuthorityMismatch);
  }

  tank.schematic.apply_update(op);

  let parameters = db.parameters().clone();
  let store = StoreAdapter(&*db);
  let mut validator = TankValidator::new(
    &tank.schematic,
    usize::from(parameters.max_sink_chain_length),
    Some(op.tank_to_update),
    Some(&store as &dyn SchematicStore),
  );
  validator.validate_tank()?;

  let new_deposit = validator.calculate_deposit(&parameters);
  if tank.deposit - new_deposit != op.deposit_delta {
    return Err(Error::WrongDeposit {
      expected: tank.deposit - new_deposit,
      actual: op.deposit_delta,
    });
  }
  if op.deposit_delta < 0
    && db.get_balance(op.payer, CORE_ASSET) < -op.deposit_delta
  {
    return Err(Error::InsufficientBalance);
  }

  // States of removed or replaced accessories are discarded; a replaced
  // tap drops its whole range of requirement states.
  for id in op
    .attachments_to_remove
    .iter()
    .chain(op.attachments_to_replace.keys())
  {
    tank
      .accessory_states
      .remove(&tnt_primitives::AccessoryAddress::attachment(*id));
  }
  for id in op.taps_to_remove.iter().chain(op.taps_to_replace.keys()) {
    tank.accessory_states.remove_tap(*id);
  }

  tank.deposit = new_deposit;
  tank.restrictor_id = tank.schematic.source_restrictor();

  db.adjust_balance(op.payer, CORE_ASSET, op.deposit_delta);
  db.put_tank(tank);
  debug!(tank = ?op.tank_to_update, "tank updated");
  Ok(OperationOutcome::TankUpdated)
}

fn tank_delete(
  db: &mut impl Database,
  op: &TankDelete,
) -> Result<OperationOutcome, Error> {
  let tank = db
    .tank(op.tank_to_delete)
    .ok_or(Error::NoSuchTank(op.tank_to_delete))?;

  let delete_authority = tank
    .schematic
    .emergency_tap()
    .and_then(|tap| tap.open_authority.as_ref())
    .ok_or(Error::Internal("validated tank lacks an emergency tap"))?;
  if op.delete_authority != *delete_authority {
    return Err(Error::AuthorityMismatch);
  }
  if tank.balance != 0 {
    return Err(Error::NonEmptyTank);
  }
  if op.deposit_claimed != tank.deposit {
    return Err(Error::WrongDeposit {
      expected: tank.deposit,
      actual: op.deposit_claimed,
    });
  }

  db.adjust_balance(op.payer, CORE_ASSET, op.deposit_claimed);
  db.remove_tank(op.tank_to_delete);
  debug!(tank = ?op.tank_to_delete, "tank deleted");
  Ok(OperationOutcome::TankDeleted)
}

fn tank_query(
  db: &mut impl Database,
  op: &TankQuery,
) -> Result<OperationOutcome, Error> {
  let mut cow = CowDb::new(&*db);
  cow.tank(op.tank_to_query)?;

  let mut evaluator = QueryEvaluator::new(op.tank_to_query);
  for query in &op.queries {
    evaluator.evaluate_query(&mut cow, query.clone())?;
  }
  evaluator.apply_queries(&mut cow)?;

  verify_authority_set(
    &op.required_authorities,
    evaluator.required_authorities(),
  )?;

  let diff = cow.into_diff();
  diff.apply(db);
  Ok(OperationOutcome::Queried)
}

fn tap_open(
  db: &mut impl Database,
  op: &TapOpen,
) -> Result<OperationOutcome, Error> {
  let tank_id = op
    .tap_to_open
    .tank_id
    .ok_or(Error::Internal("operation validation admitted a tap open \
                           without a tank id"))?;
  let max_taps = usize::from(op.tap_open_count);
  if op.tap_open_count > db.parameters().max_taps_to_open {
    return Err(Error::TapOpenCountExceeded {
      max: usize::from(db.parameters().max_taps_to_open),
    });
  }

  let mut cow = CowDb::new(&*db);
  let mut evaluator = QueryEvaluator::new(tank_id);
  for query in &op.queries {
    evaluator.evaluate_query(&mut cow, query.clone())?;
  }

  // A zero release is only legal when destroying an already-empty tank:
  // nothing flows, but the opened tap's authority still gates.
  let report = if op.release_amount.is_zero() {
    let mut report = TapFlowReport::default();
    let tank = cow.tank(tank_id)?;
    let tap = tank
      .schematic
      .taps
      .get(&op.tap_to_open.tap_id)
      .ok_or(Error::NoSuchTap(op.tap_to_open))?;
    if let Some(authority) = &tap.open_authority {
      report
        .authorities_required
        .entry(tank_id)
        .or_default()
        .push(authority.clone());
    }
    report
  } else {
    tap_flow::evaluate_tap_flow(
      &mut cow,
      &evaluator,
      op.payer,
      op.tap_to_open,
      op.release_amount,
      max_taps,
    )?
  };

  evaluator.apply_queries(&mut cow)?;

  // Destructor teardown: claiming the deposit destroys the drained tank.
  if let Some(claimed) = op.deposit_claimed {
    let tank = cow.tank(tank_id)?;
    let opened = tank
      .schematic
      .taps
      .get(&op.tap_to_open.tap_id)
      .ok_or(Error::NoSuchTap(op.tap_to_open))?;
    if !opened.destructor_tap {
      return Err(Error::NotDestructorTap);
    }
    if tank.balance != 0 {
      return Err(Error::NonEmptyTank);
    }
    if claimed != tank.deposit {
      return Err(Error::WrongDeposit {
        expected: tank.deposit,
        actual: claimed,
      });
    }
    cow.credit_account(op.payer, CORE_ASSET, claimed);
    cow.remove_tank(tank_id);
    debug!(tank = ?tank_id, "tank destroyed through destructor tap");
  }

  let mut consumed = evaluator.required_authorities().to_vec();
  for authority in report.all_authorities() {
    if !consumed.contains(&authority) {
      consumed.push(authority);
    }
  }
  verify_authority_set(&op.required_authorities, &consumed)?;

  let diff = cow.into_diff();
  diff.apply(db);
  Ok(OperationOutcome::TapOpened(report))
}

fn tap_connect(
  db: &mut impl Database,
  op: &TapConnect,
) -> Result<OperationOutcome, Error> {
  let tank_id = op
    .tap_to_connect
    .tank_id
    .ok_or(Error::Internal("operation validation admitted a tap connect \
                           without a tank id"))?;
  let mut tank = db
    .tank(tank_id)
    .ok_or(Error::NoSuchTank(tank_id))?
    .clone();

  {
    let tap = tank
      .schematic
      .taps
      .get_mut(&op.tap_to_connect.tap_id)
      .ok_or(Error::NoSuchTap(op.tap_to_connect))?;
    let connect_authority = tap
      .connect_authority
      .as_ref()
      .ok_or(Error::ConnectionFrozen(op.tap_to_connect))?;
    if op.connect_authority != *connect_authority {
      return Err(Error::AuthorityMismatch);
    }

    tap.connected_sink = op.new_sink.clone();
    if op.clear_connect_authority {
      tap.connect_authority = None;
    }
  }

  // The rewired tap must still pass validation, new sink chain included.
  let parameters = db.parameters().clone();
  let store = StoreAdapter(&*db);
  let mut validator = TankValidator::new(
    &tank.schematic,
    usize::from(parameters.max_sink_chain_length),
    Some(tank_id),
    Some(&store as &dyn SchematicStore),
  );
  validator.validate_tap(op.tap_to_connect.tap_id)?;

  db.put_tank(tank);
  debug!(tank = ?tank_id, tap = op.tap_to_connect.tap_id, "tap reconnected");
  Ok(OperationOutcome::TapConnected)
}
