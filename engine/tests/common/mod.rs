use {
  tnt_engine::{
    apply_operation,
    Database,
    Error,
    InMemoryChain,
    OperationOutcome,
    TapFlowReport,
  },
  tnt_primitives::{
    AccountId,
    Amount,
    AssetId,
    Authority,
    FlowLimit,
    Operation,
    Sink,
    TankAttachment,
    TankCreate,
    TankId,
    TankSchematic,
    TankValidator,
    Tap,
    TapId,
    TapOpen,
    TapRequirement,
    TargetedQuery,
    CORE_ASSET,
  },
};

pub const ALICE: AccountId = AccountId(1);
pub const BOB: AccountId = AccountId(2);
pub const CAROL: AccountId = AccountId(3);

/// The asset the test tanks hold.
pub const ASSET_X: AssetId = AssetId(7);

pub const GENESIS: u64 = 1_000_000;

/// A chain with a funded set of test accounts.
pub fn chain() -> InMemoryChain {
  let mut chain = InMemoryChain::new();
  chain.set_time(GENESIS);
  for account in [ALICE, BOB, CAROL] {
    chain.credit(account, CORE_ASSET, 1_000_000);
  }
  chain
}

/// The mandatory tap 0, rescuing and administering the tank.
pub fn emergency_tap(owner: AccountId) -> Tap {
  Tap {
    connected_sink: Some(Sink::Account(owner)),
    open_authority: Some(Authority::single(owner)),
    connect_authority: Some(Authority::single(owner)),
    requirements: vec![],
    destructor_tap: true,
  }
}

/// An openable-by-anyone tap connected to a sink.
pub fn tap(sink: Sink, requirements: Vec<TapRequirement>) -> Tap {
  Tap {
    connected_sink: Some(sink),
    open_authority: None,
    connect_authority: None,
    requirements,
    destructor_tap: false,
  }
}

/// The exact deposit a create operation must pay for this layout.
pub fn deposit_for(
  chain: &InMemoryChain,
  op: &TankCreate,
) -> Amount {
  let schematic = TankSchematic::from_create_operation(op);
  TankValidator::new(&schematic, 100, None, None)
    .calculate_deposit(chain.parameters())
}

pub fn create_op(
  payer: AccountId,
  asset: AssetId,
  taps: Vec<Tap>,
  attachments: Vec<TankAttachment>,
) -> TankCreate {
  TankCreate {
    payer,
    deposit_amount: 0,
    contained_asset: asset,
    taps,
    attachments,
  }
}

/// Create a tank through the regular operation path.
pub fn create_tank(
  chain: &mut InMemoryChain,
  payer: AccountId,
  asset: AssetId,
  taps: Vec<Tap>,
  attachments: Vec<TankAttachment>,
) -> Result<TankId, Error> {
  let mut op = create_op(payer, asset, taps, attachments);
  op.deposit_amount = deposit_for(chain, &op);
  match apply_operation(chain, &Operation::TankCreate(op))? {
    OperationOutcome::TankCreated(id) => Ok(id),
    outcome => panic!("unexpected outcome: {outcome:?}"),
  }
}

/// Put asset into a tank directly, standing in for the host's deposit path.
pub fn fund_tank(chain: &mut InMemoryChain, tank: TankId, amount: Amount) {
  chain.tank_mut(tank).expect("tank exists").balance += amount;
}

pub fn open_tap(
  chain: &mut InMemoryChain,
  payer: AccountId,
  tap: TapId,
  release: FlowLimit,
  authorities: Vec<Authority>,
  queries: Vec<TargetedQuery>,
) -> Result<TapFlowReport, Error> {
  let op = Operation::TapOpen(TapOpen {
    payer,
    required_authorities: authorities,
    tap_to_open: tap,
    release_amount: release,
    deposit_claimed: None,
    tap_open_count: 5,
    queries,
  });
  match apply_operation(chain, &op)? {
    OperationOutcome::TapOpened(report) => Ok(report),
    outcome => panic!("unexpected outcome: {outcome:?}"),
  }
}
