use {
  crate::AccountId,
  serde::{Deserialize, Serialize},
  std::collections::BTreeMap,
};

/// A weighted-threshold permission predicate over accounts.
///
/// The engine treats authorities as opaque values: it compares them, gathers
/// them into required-authority sets, and recognizes the degenerate forms.
/// Checking that a transaction actually satisfies an authority (signature
/// verification, recursive account authorities) is the host chain's concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
  /// Minimum total weight of satisfied members.
  pub weight_threshold: u32,
  /// Member accounts and their weights.
  pub account_weights: BTreeMap<AccountId, u16>,
}

impl Authority {
  /// An authority satisfied by a single account alone.
  pub fn single(account: AccountId) -> Self {
    Self {
      weight_threshold: 1,
      account_weights: BTreeMap::from([(account, 1)]),
    }
  }

  /// A trivial authority is satisfied by anyone.
  pub fn is_trivial(&self) -> bool {
    self.weight_threshold == 0
  }

  /// An impossible authority can never be satisfied: its members' combined
  /// weight falls short of the threshold.
  pub fn is_impossible(&self) -> bool {
    let total: u64 =
      self.account_weights.values().map(|w| u64::from(*w)).sum();
    total < u64::from(self.weight_threshold)
  }

  /// The null authority names no members at all.
  pub fn is_null(&self) -> bool {
    self.account_weights.is_empty() && self.weight_threshold == 0
  }

  /// Accounts named by this authority.
  pub fn accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
    self.account_weights.keys().copied()
  }
}
