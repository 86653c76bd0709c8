use {
  common::{chain, create_tank, emergency_tap, fund_tank, tap},
  tnt_engine::{apply_operation, Database, Error, ErrorKind},
  tnt_primitives::{
    AttachmentId,
    FlowLimit,
    ImmediateFlowLimit,
    Operation,
    Sink,
    TankAttachment,
    TapId,
    TapOpen,
    TapOpener,
    TapRequirement,
  },
};

mod common;

use common::{ALICE, ASSET_X, BOB};

/// Asset flowing through a tap opener schedules another tap, which the
/// engine opens as part of the same operation.
#[test]
fn opener_cascades_into_second_tap() -> anyhow::Result<()> {
  let mut chain = chain();
  let opener = TankAttachment::TapOpener(TapOpener {
    tap_index: 2,
    release_amount: FlowLimit::Unlimited,
    destination_sink: Sink::Account(BOB),
    asset_type: ASSET_X,
  });
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    tap(Sink::Attachment(AttachmentId::local(0)), vec![]),
    tap(Sink::Account(ALICE), vec![TapRequirement::Immediate(
      ImmediateFlowLimit { limit: 50 },
    )]),
  ], vec![opener])?;
  fund_tank(&mut chain, tank, 100);

  let report = common::open_tap(
    &mut chain,
    BOB,
    TapId::new(tank, 1),
    FlowLimit::Amount(30),
    vec![],
    vec![],
  )?;

  // Two flows: 30 through the opener to Bob, then up to 50 from the
  // scheduled tap to Alice.
  assert_eq!(report.tap_flows.len(), 2);
  assert_eq!(report.tap_flows[0].amount_released, 30);
  assert_eq!(report.tap_flows[0].flow_path, vec![
    Sink::Attachment(AttachmentId::local(0)),
    Sink::Account(BOB),
  ]);
  assert_eq!(report.tap_flows[1].amount_released, 50);
  assert_eq!(report.tap_flows[1].source_tap, TapId::new(tank, 2));

  assert_eq!(chain.get_balance(BOB, ASSET_X), 30);
  assert_eq!(chain.get_balance(ALICE, ASSET_X), 50);
  assert_eq!(chain.tank(tank).unwrap().balance, 20);

  Ok(())
}

/// A ring of openers re-scheduling the same tap runs into the tap-open
/// bound and aborts the whole operation.
#[test]
fn opener_ring_hits_the_cascade_bound() -> anyhow::Result<()> {
  let mut chain = chain();
  let opener = TankAttachment::TapOpener(TapOpener {
    tap_index: 1,
    release_amount: FlowLimit::Amount(10),
    destination_sink: Sink::Account(BOB),
    asset_type: ASSET_X,
  });
  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    tap(Sink::Attachment(AttachmentId::local(0)), vec![]),
  ], vec![opener])?;
  fund_tank(&mut chain, tank, 100);

  let outcome = apply_operation(
    &mut chain,
    &Operation::TapOpen(TapOpen {
      payer: BOB,
      required_authorities: vec![],
      tap_to_open: TapId::new(tank, 1),
      release_amount: FlowLimit::Amount(10),
      deposit_claimed: None,
      tap_open_count: 3,
      queries: vec![],
    }),
  );
  assert_eq!(outcome, Err(Error::TapOpenCountExceeded { max: 3 }));
  assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Limit);

  // The aborted cascade left balances untouched.
  assert_eq!(chain.tank(tank).unwrap().balance, 100);
  assert_eq!(chain.get_balance(BOB, ASSET_X), 0);

  Ok(())
}
