use {
  common::{chain, create_tank, emergency_tap, fund_tank, open_tap, tap},
  tnt_engine::{apply_operation, Database, Error, ErrorKind, OperationOutcome},
  tnt_primitives::{
    Authority,
    DepositSourceRestrictor,
    FlowLimit,
    Operation,
    PathElement,
    Sink,
    TankAttachment,
    Tap,
    TapConnect,
    TapId,
    ValidationError,
    WildcardSink,
  },
};

mod common;

use common::{ALICE, ASSET_X, BOB};

fn restrictor_for(source: tnt_primitives::TankId) -> TankAttachment {
  TankAttachment::SourceRestrictor(DepositSourceRestrictor {
    legal_deposit_paths: vec![vec![
      PathElement::Sink(Sink::Tank(source)),
      PathElement::Wildcard(WildcardSink { repeatable: true }),
      PathElement::Sink(Sink::SameTank),
    ]],
  })
}

/// An unconnected tap holding a connect authority, to be wired up later.
fn connectable_tap(owner: tnt_primitives::AccountId) -> Tap {
  Tap {
    connected_sink: None,
    open_authority: None,
    connect_authority: Some(Authority::single(owner)),
    requirements: vec![],
    destructor_tap: false,
  }
}

/// A destination tank that only accepts deposits flowing out of one
/// specific source tank.
#[test]
fn restrictor_gates_deposits() -> anyhow::Result<()> {
  let mut chain = chain();

  // The source exists first so the destination's pattern can name it; its
  // outflow tap is connected only once the destination exists.
  let source = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    connectable_tap(ALICE),
  ], vec![])?;
  let destination = create_tank(
    &mut chain,
    ALICE,
    ASSET_X,
    vec![emergency_tap(ALICE)],
    vec![restrictor_for(source)],
  )?;
  assert_eq!(chain.tank(destination).unwrap().restrictor_id, Some(0));

  // Connecting the source's tap to the destination passes the restrictor:
  // the origin is the named source tank.
  let outcome = apply_operation(
    &mut chain,
    &Operation::TapConnect(TapConnect {
      payer: ALICE,
      connect_authority: Authority::single(ALICE),
      tap_to_connect: TapId::new(source, 1),
      new_sink: Some(Sink::Tank(destination)),
      clear_connect_authority: false,
    }),
  )?;
  assert_eq!(outcome, OperationOutcome::TapConnected);

  // The release flows and the restricted tank accepts the deposit.
  fund_tank(&mut chain, source, 60);
  let report = open_tap(
    &mut chain,
    ALICE,
    TapId::new(source, 1),
    FlowLimit::Unlimited,
    vec![],
    vec![],
  )?;
  assert_eq!(report.tap_flows[0].flow_path, vec![Sink::Tank(destination)]);
  assert_eq!(chain.tank(destination).unwrap().balance, 60);
  assert_eq!(chain.tank(source).unwrap().balance, 0);

  // A stranger tank can aim a tap at the destination at creation time,
  // when its own id is not known yet and the origin is presumed to match.
  let intruder = create_tank(&mut chain, BOB, ASSET_X, vec![
    emergency_tap(BOB),
    tap(Sink::Tank(destination), vec![]),
    connectable_tap(BOB),
  ], vec![])?;
  fund_tank(&mut chain, intruder, 10);

  // At flow time the origin is known, and the restrictor rejects it.
  let rejected = open_tap(
    &mut chain,
    BOB,
    TapId::new(intruder, 1),
    FlowLimit::Unlimited,
    vec![],
    vec![],
  );
  assert_eq!(rejected, Err(Error::DepositPathRejected));
  assert_eq!(Error::DepositPathRejected.kind(), ErrorKind::Asset);
  // The failed flow left no trace.
  assert_eq!(chain.tank(intruder).unwrap().balance, 10);
  assert_eq!(chain.tank(destination).unwrap().balance, 60);

  // Connecting a tap on a known tank re-runs the path check and refuses
  // outright.
  let refused = apply_operation(
    &mut chain,
    &Operation::TapConnect(TapConnect {
      payer: BOB,
      connect_authority: Authority::single(BOB),
      tap_to_connect: TapId::new(intruder, 2),
      new_sink: Some(Sink::Tank(destination)),
      clear_connect_authority: false,
    }),
  );
  assert!(matches!(
    refused,
    Err(Error::Validation(ValidationError::RestrictorRejectsTap { .. }))
  ));

  Ok(())
}
