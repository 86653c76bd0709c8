use {
  crate::{Amount, FlowLimit, Index, Timestamp},
  core::cmp::Ordering,
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
};

/// Locates an accessory within a tank schematic.
///
/// Ordering is by address value, not accessory type: attachment addresses
/// come before requirement addresses, attachments order by id, requirements
/// by `(tap_id, requirement_index)`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
pub enum AccessoryAddress {
  Attachment { attachment_id: Index },
  Requirement { tap_id: Index, requirement_index: Index },
}

impl AccessoryAddress {
  pub fn attachment(attachment_id: Index) -> Self {
    AccessoryAddress::Attachment { attachment_id }
  }

  pub fn requirement(tap_id: Index, requirement_index: Index) -> Self {
    AccessoryAddress::Requirement {
      tap_id,
      requirement_index,
    }
  }
}

/// Lookup key accepted by the accessory state map.
///
/// `Tap` is the transparent form: it compares equal to every requirement
/// address on that tap (and after every attachment address). That is what
/// lets a tap replacement erase the whole range of that tap's requirement
/// states in one pass, without enumerating requirement indices.
#[derive(Debug, Clone, Copy)]
pub enum StateKey {
  Address(AccessoryAddress),
  Tap(Index),
}

impl StateKey {
  fn cmp_address(&self, other: &AccessoryAddress) -> Ordering {
    match self {
      StateKey::Address(address) => address.cmp(other),
      StateKey::Tap(tap) => match other {
        AccessoryAddress::Attachment { .. } => Ordering::Greater,
        AccessoryAddress::Requirement { tap_id, .. } => tap.cmp(tap_id),
      },
    }
  }
}

/// Running tally of asset that has flowed through a meter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterState {
  pub metered_amount: Amount,
}

/// Lifetime total released through a cumulative flow limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeFlowState {
  pub amount_released: Amount,
}

/// Amount released within the current period of a periodic flow limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicFlowState {
  /// The period the tally below belongs to.
  pub period_num: u64,
  pub amount_released: Amount,
}

/// A withdrawal request waiting for review or redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
  /// Amount requested for release.
  pub request_amount: FlowLimit,
  /// Optional comment about the request.
  pub request_comment: Option<String>,
  /// Whether the request has passed review.
  pub approved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
  /// Number of requests made so far; used to assign request ids.
  pub request_counter: Index,
  pub pending_requests: BTreeMap<Index, ReviewRequest>,
}

/// A withdrawal request waiting out its delay period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRequest {
  /// When the delay period ends and the request matures.
  pub delay_period_end: Timestamp,
  pub request_amount: FlowLimit,
  pub request_comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayState {
  pub request_counter: Index,
  pub pending_requests: BTreeMap<Index, DelayRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
  /// Number of tickets consumed to authorize releases so far.
  pub tickets_consumed: Index,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeState {
  pub amount_released: Amount,
}

/// Mutable per-accessory data kept on the tank object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessoryState {
  Meter(MeterState),
  Cumulative(CumulativeFlowState),
  Periodic(PeriodicFlowState),
  Review(ReviewState),
  Delay(DelayState),
  Ticket(TicketState),
  Exchange(ExchangeState),
}

/// Ordered map from accessory address to accessory state.
///
/// Kept as a sorted vector so lookups can go through `StateKey` and its
/// transparent tap case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessoryStateMap {
  entries: Vec<(AccessoryAddress, AccessoryState)>,
}

impl AccessoryStateMap {
  pub fn get(&self, address: &AccessoryAddress) -> Option<&AccessoryState> {
    let key = StateKey::Address(*address);
    self
      .entries
      .binary_search_by(|(a, _)| key.cmp_address(a).reverse())
      .ok()
      .map(|i| &self.entries[i].1)
  }

  pub fn get_mut(
    &mut self,
    address: &AccessoryAddress,
  ) -> Option<&mut AccessoryState> {
    let key = StateKey::Address(*address);
    self
      .entries
      .binary_search_by(|(a, _)| key.cmp_address(a).reverse())
      .ok()
      .map(|i| &mut self.entries[i].1)
  }

  pub fn get_or_insert_with(
    &mut self,
    address: AccessoryAddress,
    init: impl FnOnce() -> AccessoryState,
  ) -> &mut AccessoryState {
    let key = StateKey::Address(address);
    let index = match self
      .entries
      .binary_search_by(|(a, _)| key.cmp_address(a).reverse())
    {
      Ok(i) => i,
      Err(i) => {
        self.entries.insert(i, (address, init()));
        i
      }
    };
    &mut self.entries[index].1
  }

  pub fn remove(
    &mut self,
    address: &AccessoryAddress,
  ) -> Option<AccessoryState> {
    let key = StateKey::Address(*address);
    self
      .entries
      .binary_search_by(|(a, _)| key.cmp_address(a).reverse())
      .ok()
      .map(|i| self.entries.remove(i).1)
  }

  /// Erase every requirement state belonging to a tap, via the transparent
  /// tap key.
  pub fn remove_tap(&mut self, tap_id: Index) {
    let key = StateKey::Tap(tap_id);
    let start = self
      .entries
      .partition_point(|(a, _)| key.cmp_address(a) == Ordering::Greater);
    let end = self
      .entries
      .partition_point(|(a, _)| key.cmp_address(a) != Ordering::Less);
    self.entries.drain(start..end);
  }

  pub fn iter(
    &self,
  ) -> impl Iterator<Item = (&AccessoryAddress, &AccessoryState)> {
    self.entries.iter().map(|(a, s)| (a, s))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
