use {
  common::{chain, create_tank, emergency_tap, fund_tank, open_tap, tap},
  ed25519_dalek::{Keypair, Signer},
  tnt_engine::{Database, Error},
  tnt_primitives::{
    AccessoryAddress,
    FlowLimit,
    Query,
    QueryTarget,
    Sink,
    TapId,
    TapRequirement,
    TargetedQuery,
    Ticket,
    TicketRequirement,
  },
};

mod common;

use common::{ALICE, ASSET_X, BOB};

fn redeem(ticket: Ticket, keypair: &Keypair) -> TargetedQuery {
  let signature = keypair.sign(&ticket.digest().to_bytes());
  TargetedQuery {
    target: QueryTarget::Accessory(AccessoryAddress::requirement(
      ticket.tap_id,
      ticket.requirement_index,
    )),
    query: Query::RedeemTicketToOpen {
      ticket,
      ticket_signature: signature,
    },
  }
}

/// Tickets signed by the designated key authorize releases, strictly in
/// sequence.
#[test]
fn tickets_redeem_in_sequence() -> anyhow::Result<()> {
  let mut chain = chain();
  let signer = Keypair::generate(&mut rand::thread_rng());
  let forger = Keypair::generate(&mut rand::thread_rng());

  let tank = create_tank(&mut chain, ALICE, ASSET_X, vec![
    emergency_tap(ALICE),
    tap(Sink::Account(BOB), vec![TapRequirement::Ticket(
      TicketRequirement {
        ticket_signer: signer.public,
      },
    )]),
  ], vec![])?;
  fund_tank(&mut chain, tank, 100);
  let gated = TapId::new(tank, 1);

  let ticket = |number, max| Ticket {
    tank_id: tank,
    tap_id: 1,
    requirement_index: 0,
    max_withdrawal: FlowLimit::Amount(max),
    ticket_number: number,
  };

  // A ticket signed by anyone else is worthless.
  let forged = open_tap(
    &mut chain,
    BOB,
    gated,
    FlowLimit::Amount(30),
    vec![],
    vec![redeem(ticket(0, 30), &forger)],
  );
  assert_eq!(forged, Err(Error::BadTicketSignature));

  // Ticket 0 authorizes up to 30.
  open_tap(
    &mut chain,
    BOB,
    gated,
    FlowLimit::Amount(30),
    vec![],
    vec![redeem(ticket(0, 30), &signer)],
  )?;
  assert_eq!(chain.get_balance(BOB, ASSET_X), 30);
  assert_eq!(
    chain.tank(tank).unwrap().ticket_state(1, 0).unwrap().tickets_consumed,
    1
  );

  // Replaying ticket 0 is stale; the next redeemable number is 1.
  let replay = open_tap(
    &mut chain,
    BOB,
    gated,
    FlowLimit::Amount(10),
    vec![],
    vec![redeem(ticket(0, 30), &signer)],
  );
  assert_eq!(replay, Err(Error::StaleTicket { expected: 1 }));

  // Consecutive tickets can be redeemed together in one operation.
  open_tap(
    &mut chain,
    BOB,
    gated,
    FlowLimit::Amount(25),
    vec![],
    vec![
      redeem(ticket(1, 10), &signer),
      redeem(ticket(2, 15), &signer),
    ],
  )?;
  assert_eq!(chain.get_balance(BOB, ASSET_X), 55);
  assert_eq!(
    chain.tank(tank).unwrap().ticket_state(1, 0).unwrap().tickets_consumed,
    3
  );

  // The ticket limit binds: requesting more than the redeemed tickets
  // allow fails.
  let over = open_tap(
    &mut chain,
    BOB,
    gated,
    FlowLimit::Amount(20),
    vec![],
    vec![redeem(ticket(3, 15), &signer)],
  );
  assert!(matches!(over, Err(Error::ExcessiveFlow { .. })));

  Ok(())
}
