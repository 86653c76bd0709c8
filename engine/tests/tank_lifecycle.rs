use {
  common::{chain, create_tank, deposit_for, emergency_tap, fund_tank, tap},
  tnt_engine::{apply_operation, Database, Error, OperationOutcome},
  tnt_primitives::{
    AccessoryAddress,
    AssetFlowMeter,
    Authority,
    CumulativeFlowLimit,
    FlowLimit,
    Operation,
    Query,
    QueryTarget,
    Sink,
    TankAttachment,
    TankDelete,
    TankQuery,
    TankUpdate,
    TankValidator,
    TapId,
    TapOpen,
    TapRequirement,
    TargetedQuery,
    CORE_ASSET,
  },
};

mod common;

use common::{ALICE, ASSET_X, BOB};

fn meter() -> TankAttachment {
  TankAttachment::FlowMeter(AssetFlowMeter {
    asset_type: ASSET_X,
    destination_sink: Sink::SameTank,
    reset_authority: None,
  })
}

/// A freshly created tank starts empty, carries exactly the computed
/// deposit, and caches its restrictor (or lack of one).
#[test]
fn creation_postconditions() -> anyhow::Result<()> {
  let mut chain = chain();
  let before = chain.get_balance(ALICE, CORE_ASSET);
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
  ], vec![meter()])?;

  let object = chain.tank(tank).unwrap();
  assert_eq!(object.balance, 0);
  assert_eq!(object.restrictor_id, None);
  assert!(object.accessory_states.is_empty());

  let expected_deposit = TankValidator::new(&object.schematic, 30, None, None)
    .calculate_deposit(chain.parameters());
  assert_eq!(object.deposit, expected_deposit);
  assert_eq!(
    chain.get_balance(ALICE, CORE_ASSET),
    before - expected_deposit
  );

  // A wrong deposit is refused outright.
  let mut op = common::create_op(ALICE, ASSET_X, vec![emergency_tap(ALICE)], vec![]);
  op.deposit_amount = deposit_for(&chain, &op) + 1;
  let wrong = apply_operation(&mut chain, &Operation::TankCreate(op));
  assert!(matches!(wrong, Err(Error::WrongDeposit { .. })));

  Ok(())
}

/// Updating a tank back and forth restores the original schematic, and
/// replacing a tap discards its requirement states.
#[test]
fn update_round_trip_and_state_erasure() -> anyhow::Result<()> {
  let mut chain = chain();
  let spend = tap(Sink::Account(BOB), vec![TapRequirement::Cumulative(
    CumulativeFlowLimit { limit: 50 },
  )]);
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    spend.clone(),
  ], vec![])?;
  fund_tank(&mut chain, tank, 100);

  // Flow 20 through the tap to build up cumulative state.
  apply_operation(
    &mut chain,
    &Operation::TapOpen(TapOpen {
      payer: BOB,
      required_authorities: vec![],
      tap_to_open: TapId::new(tank, 1),
      release_amount: FlowLimit::Amount(20),
      deposit_claimed: None,
      tap_open_count: 1,
      queries: vec![],
    }),
  )?;
  let original = chain.tank(tank).unwrap().schematic.clone();
  assert!(chain
    .tank(tank)
    .unwrap()
    .accessory_states
    .get(&AccessoryAddress::requirement(1, 0))
    .is_some());

  // Replace the tap with a fresh copy of itself. The schematic is
  // unchanged, but the tap's accumulated state is gone.
  let update = |taps_to_replace| {
    Operation::TankUpdate(TankUpdate {
      payer: ALICE,
      update_authority: Authority::single(ALICE),
      tank_to_update: tank,
      deposit_delta: 0,
      taps_to_remove: Default::default(),
      taps_to_replace,
      taps_to_add: vec![],
      attachments_to_remove: Default::default(),
      attachments_to_replace: Default::default(),
      attachments_to_add: vec![],
    })
  };
  apply_operation(&mut chain, &update([(1, spend.clone())].into()))?;

  let updated = chain.tank(tank).unwrap();
  assert_eq!(updated.schematic, original);
  assert!(updated
    .accessory_states
    .get(&AccessoryAddress::requirement(1, 0))
    .is_none());

  // The erased cumulative state means the full limit is available again.
  apply_operation(
    &mut chain,
    &Operation::TapOpen(TapOpen {
      payer: BOB,
      required_authorities: vec![],
      tap_to_open: TapId::new(tank, 1),
      release_amount: FlowLimit::Amount(50),
      deposit_claimed: None,
      tap_open_count: 1,
      queries: vec![],
    }),
  )?;
  assert_eq!(chain.get_balance(BOB, ASSET_X), 70);

  // An update under the wrong authority never goes through.
  let mut bad = update(Default::default());
  if let Operation::TankUpdate(op) = &mut bad {
    op.update_authority = Authority::single(BOB);
    op.taps_to_add.push(tap(Sink::Account(BOB), vec![]));
  }
  assert_eq!(
    apply_operation(&mut chain, &bad),
    Err(Error::AuthorityMismatch)
  );

  Ok(())
}

/// Meter resets are idempotent while no flow has occurred in between.
#[test]
fn meter_reset_idempotence() -> anyhow::Result<()> {
  let mut chain = chain();
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
  ], vec![meter()])?;

  let reset = Operation::TankQuery(TankQuery {
    payer: ALICE,
    tank_to_query: tank,
    required_authorities: vec![Authority::single(ALICE)],
    queries: vec![TargetedQuery {
      query: Query::ResetMeter,
      target: QueryTarget::Accessory(AccessoryAddress::attachment(0)),
    }],
  });
  apply_operation(&mut chain, &reset)?;
  let after_first = chain.tank(tank).unwrap().clone();
  apply_operation(&mut chain, &reset)?;
  assert_eq!(chain.tank(tank).unwrap(), &after_first);
  assert_eq!(after_first.meter_state(0).unwrap().metered_amount, 0);

  Ok(())
}

/// Deletion demands an empty tank and the exact deposit; a destructor tap
/// can instead tear the tank down as it drains.
#[test]
fn deletion_and_destructor_teardown() -> anyhow::Result<()> {
  let mut chain = chain();
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
  ], vec![])?;
  fund_tank(&mut chain, tank, 30);
  let deposit = chain.tank(tank).unwrap().deposit;

  let delete = |claimed| {
    Operation::TankDelete(TankDelete {
      payer: ALICE,
      delete_authority: Authority::single(ALICE),
      tank_to_delete: tank,
      deposit_claimed: claimed,
    })
  };

  // Not while there is still asset inside.
  assert_eq!(
    apply_operation(&mut chain, &delete(deposit)),
    Err(Error::NonEmptyTank)
  );

  // Draining through the emergency tap with the deposit claim destroys
  // the tank and refunds the deposit in one operation.
  let core_before = chain.get_balance(ALICE, CORE_ASSET);
  let outcome = apply_operation(
    &mut chain,
    &Operation::TapOpen(TapOpen {
      payer: ALICE,
      required_authorities: vec![Authority::single(ALICE)],
      tap_to_open: TapId::new(tank, 0),
      release_amount: FlowLimit::Unlimited,
      deposit_claimed: Some(deposit),
      tap_open_count: 1,
      queries: vec![],
    }),
  )?;
  assert!(matches!(outcome, OperationOutcome::TapOpened(_)));
  assert!(chain.tank(tank).is_none());
  assert_eq!(chain.get_balance(ALICE, ASSET_X), 30);
  assert_eq!(chain.get_balance(ALICE, CORE_ASSET), core_before + deposit);

  // Deleting a tank that no longer exists is a reference error.
  assert_eq!(
    apply_operation(&mut chain, &delete(deposit)),
    Err(Error::NoSuchTank(tank))
  );

  // An already-empty tank is destroyed with a zero release.
  let empty = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
  ], vec![])?;
  let empty_deposit = chain.tank(empty).unwrap().deposit;
  apply_operation(
    &mut chain,
    &Operation::TapOpen(TapOpen {
      payer: ALICE,
      required_authorities: vec![Authority::single(ALICE)],
      tap_to_open: TapId::new(empty, 0),
      release_amount: FlowLimit::Amount(0),
      deposit_claimed: Some(empty_deposit),
      tap_open_count: 1,
      queries: vec![],
    }),
  )?;
  assert!(chain.tank(empty).is_none());

  Ok(())
}
