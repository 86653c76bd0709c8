use {
  core::fmt::{Debug, Display},
  serde::{Deserialize, Serialize},
};

/// Index of a tap, attachment, or requirement within a tank schematic.
pub type Index = u16;

/// A signed share count of some asset.
pub type Amount = i64;

/// Seconds since the unix epoch, as stamped by the host chain's head block.
pub type Timestamp = u64;

/// The chain's core asset, in which tank deposits are paid and refunded.
pub const CORE_ASSET: AssetId = AssetId(0);

#[derive(
  Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TankId(pub u64);

#[derive(
  Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AccountId(pub u64);

#[derive(
  Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AssetId(pub u64);

impl Debug for TankId {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "tank({})", self.0)
  }
}

impl Debug for AccountId {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "account({})", self.0)
  }
}

impl Debug for AssetId {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "asset({})", self.0)
  }
}

/// Locates an attachment, possibly on another tank.
///
/// An unset tank id refers to "the current tank" of whatever context the
/// reference appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId {
  pub tank_id: Option<TankId>,
  pub attachment_id: Index,
}

impl AttachmentId {
  /// An attachment on the current tank.
  pub fn local(attachment_id: Index) -> Self {
    Self {
      tank_id: None,
      attachment_id,
    }
  }
}

/// Locates a tap, possibly on another tank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TapId {
  pub tank_id: Option<TankId>,
  pub tap_id: Index,
}

impl TapId {
  pub fn new(tank_id: TankId, tap_id: Index) -> Self {
    Self {
      tank_id: Some(tank_id),
      tap_id,
    }
  }
}

/// A limit on the amount of asset that moves during a release.
///
/// Totally ordered, with `Unlimited` greater than every bounded amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowLimit {
  Unlimited,
  Amount(Amount),
}

impl FlowLimit {
  pub const ZERO: FlowLimit = FlowLimit::Amount(0);

  pub fn is_zero(&self) -> bool {
    matches!(self, FlowLimit::Amount(0))
  }

  /// The bounded amount, if there is one.
  pub fn amount(&self) -> Option<Amount> {
    match self {
      FlowLimit::Unlimited => None,
      FlowLimit::Amount(a) => Some(*a),
    }
  }
}

impl From<Amount> for FlowLimit {
  fn from(amount: Amount) -> Self {
    FlowLimit::Amount(amount)
  }
}

impl PartialOrd for FlowLimit {
  fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for FlowLimit {
  fn cmp(&self, other: &Self) -> core::cmp::Ordering {
    use core::cmp::Ordering;
    match (self, other) {
      (FlowLimit::Unlimited, FlowLimit::Unlimited) => Ordering::Equal,
      (FlowLimit::Unlimited, FlowLimit::Amount(_)) => Ordering::Greater,
      (FlowLimit::Amount(_), FlowLimit::Unlimited) => Ordering::Less,
      (FlowLimit::Amount(a), FlowLimit::Amount(b)) => a.cmp(b),
    }
  }
}

impl Display for FlowLimit {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      FlowLimit::Unlimited => write!(f, "unlimited"),
      FlowLimit::Amount(a) => write!(f, "{a}"),
    }
  }
}
