use {
  common::{chain, create_tank, emergency_tap, fund_tank, open_tap, tap},
  tnt_engine::{apply_operation, Database, Error, OperationOutcome},
  tnt_primitives::{
    AccessoryAddress,
    AssetFlowMeter,
    AttachmentId,
    Authority,
    ExchangeRequirement,
    FlowLimit,
    Operation,
    Query,
    QueryTarget,
    Sink,
    TankAttachment,
    TankQuery,
    TapId,
    TapRequirement,
    TargetedQuery,
  },
};

mod common;

use common::{ALICE, ASSET_X, BOB, CAROL};

/// An exchange tap: releases are earned tick by tick as deposits flow
/// through the monitored meter.
#[test]
fn exchange_releases_follow_the_meter() -> anyhow::Result<()> {
  let mut chain = chain();

  // The vending tank meters everything deposited into it, and its
  // exchange tap pays Carol 5 per 10 metered.
  let vendor = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    tap(Sink::Account(CAROL), vec![TapRequirement::Exchange(
      ExchangeRequirement {
        meter_id: AttachmentId::local(0),
        release_per_tick: 5,
        tick_amount: 10,
      },
    )]),
  ], vec![TankAttachment::FlowMeter(AssetFlowMeter {
    asset_type: ASSET_X,
    destination_sink: Sink::SameTank,
    reset_authority: None,
  })])?;
  fund_tank(&mut chain, vendor, 50);

  // A buyer tank pays through the vendor's meter.
  let buyer = create_tank(&mut chain, BOB, ASSET_X, vec![
    emergency_tap(BOB),
    tap(
      Sink::Attachment(AttachmentId {
        tank_id: Some(vendor),
        attachment_id: 0,
      }),
      vec![],
    ),
  ], vec![])?;
  fund_tank(&mut chain, buyer, 25);

  // Nothing metered yet, so the exchange tap is locked.
  let locked = open_tap(
    &mut chain,
    CAROL,
    TapId::new(vendor, 1),
    FlowLimit::Unlimited,
    vec![],
    vec![],
  );
  assert!(matches!(locked, Err(Error::TapLocked { requirement: 0 })));

  // Bob pays 25 through the meter; the vendor tank receives it.
  open_tap(
    &mut chain,
    BOB,
    TapId::new(buyer, 1),
    FlowLimit::Amount(25),
    vec![],
    vec![],
  )?;
  assert_eq!(chain.tank(vendor).unwrap().balance, 75);
  assert_eq!(
    chain.tank(vendor).unwrap().meter_state(0).unwrap().metered_amount,
    25
  );

  // 25 metered at 10-per-tick earns two ticks of 5 each.
  let report = open_tap(
    &mut chain,
    CAROL,
    TapId::new(vendor, 1),
    FlowLimit::Unlimited,
    vec![],
    vec![],
  )?;
  assert_eq!(report.tap_flows[0].amount_released, 10);
  assert_eq!(chain.get_balance(CAROL, ASSET_X), 10);

  // Earned ticks are spent; no further release until more is metered.
  let spent = open_tap(
    &mut chain,
    CAROL,
    TapId::new(vendor, 1),
    FlowLimit::Amount(1),
    vec![],
    vec![],
  );
  assert!(matches!(spent, Err(Error::TapLocked { requirement: 0 })));

  // Resetting the exchange and meter needs the emergency authority, since
  // the meter declares no reset authority of its own.
  let outcome = apply_operation(
    &mut chain,
    &Operation::TankQuery(TankQuery {
      payer: ALICE,
      tank_to_query: vendor,
      required_authorities: vec![Authority::single(ALICE)],
      queries: vec![TargetedQuery {
        query: Query::ResetExchangeAndMeter,
        target: QueryTarget::Accessory(AccessoryAddress::requirement(1, 0)),
      }],
    }),
  )?;
  assert_eq!(outcome, OperationOutcome::Queried);

  let vendor_tank = chain.tank(vendor).unwrap();
  assert_eq!(vendor_tank.meter_state(0).unwrap().metered_amount, 0);
  assert_eq!(vendor_tank.exchange_state(1, 0).unwrap().amount_released, 0);

  Ok(())
}
