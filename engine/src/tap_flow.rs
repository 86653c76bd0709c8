use {
  crate::{sink_flow, CowDb, Database, Error, QueryEvaluator, TankObject},
  std::collections::{BTreeMap, VecDeque},
  tnt_primitives::{
    AccessoryAddress,
    AccountId,
    Amount,
    Authority,
    FlowLimit,
    Index,
    Query,
    Sink,
    TankId,
    TapId,
    TapRequirement,
  },
  tracing::debug,
};

/// One tap opening processed during a flow evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapFlow {
  /// The amount released from the tap.
  pub amount_released: Amount,
  /// The tap that released the asset.
  pub source_tap: TapId,
  /// The path the released asset flowed along, terminal sink included.
  pub flow_path: Vec<Sink>,
}

/// The outcome of a flow evaluation: every tap opened, and the authorities
/// the openings required, keyed by the tank that required them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapFlowReport {
  pub tap_flows: Vec<TapFlow>,
  pub authorities_required: BTreeMap<TankId, Vec<Authority>>,
}

impl TapFlowReport {
  fn require_authority(&mut self, tank_id: TankId, authority: Authority) {
    let authorities = self.authorities_required.entry(tank_id).or_default();
    if !authorities.contains(&authority) {
      authorities.push(authority);
    }
  }

  /// Every distinct authority the flow required, across all tanks.
  pub fn all_authorities(&self) -> Vec<Authority> {
    let mut all = Vec::new();
    for authorities in self.authorities_required.values() {
      for authority in authorities {
        if !all.contains(authority) {
          all.push(authority.clone());
        }
      }
    }
    all
  }
}

/// Open a tap and process the full cascade of flows it triggers.
///
/// Openings are processed from a FIFO seeded with the requested tap. Each
/// opening computes the tap's release limit from its requirements, releases
/// through the sink flow processor, and appends any tap-opener scheduled
/// openings back onto the queue. The cascade is bounded by `max_taps`.
pub fn evaluate_tap_flow<D: Database>(
  db: &mut CowDb<D>,
  queries: &QueryEvaluator,
  responsible_account: AccountId,
  tap_to_open: TapId,
  flow_amount: FlowLimit,
  max_taps: usize,
) -> Result<TapFlowReport, Error> {
  let mut report = TapFlowReport::default();
  let mut queue = VecDeque::new();
  queue.push_back((tap_to_open, flow_amount));

  while let Some((tap_id, amount)) = queue.pop_front() {
    let tank_id = tap_id
      .tank_id
      .ok_or(Error::Internal("tap to open lacks a tank id"))?;

    let (connected_sink, asset_type) = {
      let tank = db.tank(tank_id)?;
      let tap = tank
        .schematic
        .taps
        .get(&tap_id.tap_id)
        .ok_or(Error::NoSuchTap(tap_id))?;
      if let Some(authority) = &tap.open_authority {
        report.require_authority(tank_id, authority.clone());
      }
      let sink = tap
        .connected_sink
        .clone()
        .ok_or(Error::TapNotConnected(tap_id))?;
      (sink, tank.schematic.asset_type)
    };

    if !db.is_authorized_asset(responsible_account, asset_type) {
      return Err(Error::UnauthorizedAccount {
        account: responsible_account,
        asset: asset_type,
      });
    }

    let (limiting_requirement, max_release) =
      max_tap_release(db, queries, tank_id, tap_id.tap_id)?;
    if max_release.is_zero() {
      return Err(match limiting_requirement {
        Some(requirement) => Error::TapLocked {
          requirement: requirement as Index,
        },
        None => Error::TankEmpty,
      });
    }

    let release = match amount {
      FlowLimit::Amount(requested) => {
        if FlowLimit::Amount(requested) > max_release {
          return Err(Error::ExcessiveFlow {
            requested,
            limit: max_release,
          });
        }
        requested
      }
      // The release limit is capped by the tank's balance, so it is always
      // bounded here.
      FlowLimit::Unlimited => max_release
        .amount()
        .ok_or(Error::Internal("release limit above tank balance"))?,
    };

    record_release(db, tank_id, tap_id.tap_id, release)?;
    db.tank_mut(tank_id)?.balance -= release;

    let mut opened = Vec::new();
    let flow_path = sink_flow::release_to_sink(
      db,
      Sink::Tank(tank_id),
      connected_sink,
      asset_type,
      release,
      |tap, limit| opened.push((tap, limit)),
    )?;

    debug!(?tank_id, tap = tap_id.tap_id, release, "tap opened");
    report.tap_flows.push(TapFlow {
      amount_released: release,
      source_tap: tap_id,
      flow_path,
    });
    queue.extend(opened);

    if queue.len() + report.tap_flows.len() > max_taps {
      return Err(Error::TapOpenCountExceeded { max: max_taps });
    }
  }

  Ok(report)
}

/// Evaluate a tap's requirements for the maximum releasable amount.
///
/// Returns the index of the most restrictive requirement (none when the
/// binding limit is the tank's balance) and the limit itself.
pub fn max_tap_release<D: Database>(
  db: &CowDb<D>,
  queries: &QueryEvaluator,
  tank_id: TankId,
  tap_id: Index,
) -> Result<(Option<usize>, FlowLimit), Error> {
  let tank = db.tank(tank_id)?;
  let tap = tank
    .schematic
    .taps
    .get(&tap_id)
    .ok_or(Error::NoSuchTap(TapId::new(tank_id, tap_id)))?;

  let mut limit = FlowLimit::Amount(tank.balance.max(0));
  let mut most_restrictive = None;

  for (i, requirement) in tap.requirements.iter().enumerate() {
    let requirement_limit =
      max_release(db, queries, tank, tap_id, i as Index, requirement)?;
    if requirement_limit < limit {
      limit = requirement_limit;
      most_restrictive = Some(i);
    }
    if limit.is_zero() {
      break;
    }
  }

  Ok((most_restrictive, limit))
}

/// The release limit imposed by a single requirement.
fn max_release<D: Database>(
  db: &CowDb<D>,
  queries: &QueryEvaluator,
  tank: &TankObject,
  tap_id: Index,
  requirement_index: Index,
  requirement: &TapRequirement,
) -> Result<FlowLimit, Error> {
  let address = AccessoryAddress::requirement(tap_id, requirement_index);
  let limit = match requirement {
    TapRequirement::Immediate(req) => FlowLimit::Amount(req.limit),

    TapRequirement::Cumulative(req) => {
      let released = tank
        .accessory_states
        .get(&address)
        .and_then(|state| match state {
          tnt_primitives::AccessoryState::Cumulative(state) => {
            Some(state.amount_released)
          }
          _ => None,
        })
        .unwrap_or(0);
      FlowLimit::Amount((req.limit - released).max(0))
    }

    TapRequirement::Periodic(req) => {
      let period_num = (db.head_block_time() - tank.creation_date)
        / u64::from(req.period_duration_sec);
      let released = tank
        .accessory_states
        .get(&address)
        .and_then(|state| match state {
          tnt_primitives::AccessoryState::Periodic(state)
            if state.period_num == period_num =>
          {
            Some(state.amount_released)
          }
          _ => None,
        })
        .unwrap_or(0);
      FlowLimit::Amount((req.limit - released).max(0))
    }

    TapRequirement::TimeLock(req) => {
      if req.unlocked_at(db.head_block_time()) {
        FlowLimit::Unlimited
      } else {
        FlowLimit::ZERO
      }
    }

    TapRequirement::MinimumLevel(req) => {
      FlowLimit::Amount((tank.balance - req.minimum_level).max(0))
    }

    TapRequirement::Documentation(_) => {
      let documented = queries
        .tank_queries()
        .any(|q| matches!(q.query, Query::DocumentationString { .. }));
      if documented {
        FlowLimit::Unlimited
      } else {
        FlowLimit::ZERO
      }
    }

    TapRequirement::Review(_) => {
      let state = tank.review_state(tap_id, requirement_index);
      let mut total: Amount = 0;
      let mut unlimited = false;
      for query in queries.target_queries(&address) {
        if let Query::ConsumeApprovedRequestToOpen { request_id } =
          &query.query
        {
          let request = state
            .and_then(|state| state.pending_requests.get(request_id))
            .ok_or(Error::NoSuchRequest(*request_id))?;
          match request.request_amount {
            FlowLimit::Unlimited => unlimited = true,
            FlowLimit::Amount(amount) => total += amount,
          }
        }
      }
      if unlimited {
        FlowLimit::Unlimited
      } else {
        FlowLimit::Amount(total)
      }
    }

    TapRequirement::Delay(_) => {
      let state = tank.delay_state(tap_id, requirement_index);
      let mut total: Amount = 0;
      let mut unlimited = false;
      for query in queries.target_queries(&address) {
        if let Query::ConsumeMaturedRequestToOpen { request_id } =
          &query.query
        {
          let request = state
            .and_then(|state| state.pending_requests.get(request_id))
            .ok_or(Error::NoSuchRequest(*request_id))?;
          match request.request_amount {
            FlowLimit::Unlimited => unlimited = true,
            FlowLimit::Amount(amount) => total += amount,
          }
        }
      }
      if unlimited {
        FlowLimit::Unlimited
      } else {
        FlowLimit::Amount(total)
      }
    }

    TapRequirement::HashPreimage(_) => {
      let revealed = queries
        .target_queries(&address)
        .any(|q| matches!(q.query, Query::RevealHashPreimage { .. }));
      if revealed {
        FlowLimit::Unlimited
      } else {
        FlowLimit::ZERO
      }
    }

    TapRequirement::Ticket(_) => {
      let mut total: Amount = 0;
      let mut unlimited = false;
      for query in queries.target_queries(&address) {
        if let Query::RedeemTicketToOpen { ticket, .. } = &query.query {
          match ticket.max_withdrawal {
            FlowLimit::Unlimited => unlimited = true,
            FlowLimit::Amount(amount) => total += amount,
          }
        }
      }
      if unlimited {
        FlowLimit::Unlimited
      } else {
        FlowLimit::Amount(total)
      }
    }

    TapRequirement::Exchange(req) => {
      let meter_tank_id = req.meter_id.tank_id.unwrap_or(tank.id);
      let meter_tank;
      let meter_owner = if meter_tank_id == tank.id {
        tank
      } else {
        meter_tank = db.tank(meter_tank_id)?;
        meter_tank
      };
      match meter_owner.meter_state(req.meter_id.attachment_id) {
        None => FlowLimit::ZERO,
        Some(meter_state) => {
          let released = tank
            .exchange_state(tap_id, requirement_index)
            .map(|state| state.amount_released)
            .unwrap_or(0);
          FlowLimit::Amount(
            req.max_release_amount(released, meter_state.metered_amount),
          )
        }
      }
    }
  };
  Ok(limit)
}

/// Record a release against the states of the released tap's requirements:
/// cumulative and exchange tallies grow, the periodic tally grows or rolls
/// over into the current period.
fn record_release<D: Database>(
  db: &mut CowDb<D>,
  tank_id: TankId,
  tap_id: Index,
  release: Amount,
) -> Result<(), Error> {
  let now = db.head_block_time();
  let tank = db.tank_mut(tank_id)?;
  let creation_date = tank.creation_date;

  let requirements: Vec<(Index, TapRequirement)> = tank
    .schematic
    .taps
    .get(&tap_id)
    .map(|tap| {
      tap
        .requirements
        .iter()
        .enumerate()
        .map(|(i, r)| (i as Index, r.clone()))
        .collect()
    })
    .unwrap_or_default();

  for (index, requirement) in requirements {
    match requirement {
      TapRequirement::Cumulative(_) => {
        tank.cumulative_state_mut(tap_id, index)?.amount_released += release;
      }
      TapRequirement::Periodic(req) => {
        let period_num =
          (now - creation_date) / u64::from(req.period_duration_sec);
        let state = tank.periodic_state_mut(tap_id, index)?;
        if state.period_num == period_num {
          state.amount_released += release;
        } else {
          state.period_num = period_num;
          state.amount_released = release;
        }
      }
      TapRequirement::Exchange(_) => {
        tank.exchange_state_mut(tap_id, index)?.amount_released += release;
      }
      _ => {}
    }
  }
  Ok(())
}
