use {
  crate::{Amount, AttachmentId, Authority, FlowLimit, Index, TankId, Timestamp},
  ed25519_dalek::PublicKey,
  multihash::Multihash,
  multihash_codetable::{Code, MultihashDigest},
  serde::{Deserialize, Serialize},
};

/// A flat limit on the amount that can be released in any single opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmediateFlowLimit {
  pub limit: Amount,
}

/// A limit on the cumulative total released through the tap over its
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeFlowLimit {
  pub limit: Amount,
}

/// A limit on the cumulative total released through the tap within a given
/// period. Periods are counted from the tank's creation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicFlowLimit {
  /// Duration of periods in seconds.
  pub period_duration_sec: u32,
  /// Maximum cumulative amount to release in a given period.
  pub limit: Amount,
}

/// Locks and unlocks the tap at specified times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLock {
  /// If true, the tap starts out locked.
  pub start_locked: bool,
  /// The tap switches between locked and unlocked at each of these times.
  pub lock_unlock_times: Vec<Timestamp>,
}

impl TimeLock {
  /// Whether the tap is unlocked at the given time.
  pub fn unlocked_at(&self, time: Timestamp) -> bool {
    let mut locked = self.start_locked;
    for boundary in &self.lock_unlock_times {
      if *boundary > time {
        break;
      }
      locked = !locked;
    }
    !locked
  }
}

/// Prevents the tap from draining the tank below a specified balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumTankLevel {
  pub minimum_level: Amount,
}

/// Requires the account opening the tap to file a request that must be
/// reviewed and approved before asset can be released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequirement {
  /// Authority which approves or denies requests.
  pub reviewer: Authority,
  /// Maximum number of outstanding requests; zero means no limit.
  pub request_limit: Index,
}

/// Requires a non-empty documentation string be supplied when opening the
/// tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationRequirement;

/// Requires the account opening the tap to file a request, then wait out a
/// delay period before the tap can be opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRequirement {
  /// Authority which can veto a request during the delay period.
  pub veto_authority: Option<Authority>,
  /// Seconds between a request and its maturity.
  pub delay_period_sec: u32,
  /// Maximum number of outstanding requests; zero means no limit.
  pub request_limit: Index,
}

/// Requires the preimage of a specified hash in order to open the tap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashPreimageRequirement {
  /// The hash whose preimage unlocks the tap.
  pub hash: Multihash<64>,
  /// Required preimage size in bytes; a preimage of a different size is
  /// rejected. If unset, a matching preimage of any size is accepted.
  pub preimage_size: Option<u16>,
}

impl HashPreimageRequirement {
  /// Whether the preimage has the declared size.
  pub fn accepts_size(&self, len: usize) -> bool {
    match self.preimage_size {
      Some(size) => len == usize::from(size),
      None => true,
    }
  }

  /// Whether the preimage hashes to the stored digest under the stored
  /// digest's own algorithm.
  pub fn matches_preimage(&self, preimage: &[u8]) -> bool {
    match Code::try_from(self.hash.code()) {
      Ok(code) => code.digest(preimage) == self.hash,
      Err(_) => false,
    }
  }
}

/// A ticket authorizing a release through a specific requirement on a
/// specific tap of a specific tank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
  /// Tank containing the tap this ticket is for.
  pub tank_id: TankId,
  /// The tap this ticket is for.
  pub tap_id: Index,
  /// The requirement on that tap this ticket is for.
  pub requirement_index: Index,
  /// Maximum release authorized by this ticket.
  pub max_withdrawal: FlowLimit,
  /// Must equal the requirement's count of consumed tickets to be valid.
  pub ticket_number: Index,
}

impl Ticket {
  /// The digest that the ticket signer signs.
  pub fn digest(&self) -> Multihash<64> {
    Code::Sha3_256.digest(&rmp_serde::to_vec(self).unwrap())
  }
}

/// Requires a ticket signed by a designated key to open the tap.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequirement {
  /// Key that must sign tickets for them to be valid.
  pub ticket_signer: PublicKey,
}

impl core::fmt::Debug for TicketRequirement {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("TicketRequirement")
      .field(
        "ticket_signer",
        &bs58::encode(self.ticket_signer.as_bytes()).into_string(),
      )
      .finish()
  }
}

/// Limits the amount released based on the amount deposited to a designated
/// meter and an exchange rate. Releases come in ticks: once the meter has
/// received a full tick amount, the tap can release a tick's worth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequirement {
  /// The meter whose reading drives the exchange.
  pub meter_id: AttachmentId,
  /// Amount to release per tick of the meter.
  pub release_per_tick: Amount,
  /// Amount of metered asset per tick.
  pub tick_amount: Amount,
}

impl ExchangeRequirement {
  /// The maximum release given the amount already released and the meter
  /// reading: `metered / tick_amount * release_per_tick - released`.
  pub fn max_release_amount(&self, released: Amount, metered: Amount) -> Amount {
    (metered / self.tick_amount * self.release_per_tick - released).max(0)
  }
}

/// Discriminant of a tap requirement, used for per-type accounting.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RequirementKind {
  Immediate,
  Cumulative,
  Periodic,
  TimeLock,
  MinimumLevel,
  Review,
  Documentation,
  Delay,
  HashPreimage,
  Ticket,
  Exchange,
}

/// A predicate and limit controlling a tap's release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapRequirement {
  Immediate(ImmediateFlowLimit),
  Cumulative(CumulativeFlowLimit),
  Periodic(PeriodicFlowLimit),
  TimeLock(TimeLock),
  MinimumLevel(MinimumTankLevel),
  Review(ReviewRequirement),
  Documentation(DocumentationRequirement),
  Delay(DelayRequirement),
  HashPreimage(HashPreimageRequirement),
  Ticket(TicketRequirement),
  Exchange(ExchangeRequirement),
}

impl TapRequirement {
  pub fn kind(&self) -> RequirementKind {
    match self {
      TapRequirement::Immediate(_) => RequirementKind::Immediate,
      TapRequirement::Cumulative(_) => RequirementKind::Cumulative,
      TapRequirement::Periodic(_) => RequirementKind::Periodic,
      TapRequirement::TimeLock(_) => RequirementKind::TimeLock,
      TapRequirement::MinimumLevel(_) => RequirementKind::MinimumLevel,
      TapRequirement::Review(_) => RequirementKind::Review,
      TapRequirement::Documentation(_) => RequirementKind::Documentation,
      TapRequirement::Delay(_) => RequirementKind::Delay,
      TapRequirement::HashPreimage(_) => RequirementKind::HashPreimage,
      TapRequirement::Ticket(_) => RequirementKind::Ticket,
      TapRequirement::Exchange(_) => RequirementKind::Exchange,
    }
  }

  /// Whether this requirement keeps per-accessory state on the tank.
  pub fn stateful(&self) -> bool {
    matches!(
      self,
      TapRequirement::Cumulative(_)
        | TapRequirement::Periodic(_)
        | TapRequirement::Review(_)
        | TapRequirement::Delay(_)
        | TapRequirement::Ticket(_)
        | TapRequirement::Exchange(_)
    )
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{ExchangeRequirement, HashPreimageRequirement, TimeLock},
    crate::AttachmentId,
    multihash_codetable::{Code, MultihashDigest},
  };

  #[test]
  fn time_lock_toggles_at_boundaries() {
    let lock = TimeLock {
      start_locked: true,
      lock_unlock_times: vec![100, 200, 300],
    };
    assert!(!lock.unlocked_at(99));
    assert!(lock.unlocked_at(100));
    assert!(lock.unlocked_at(150));
    assert!(!lock.unlocked_at(200));
    assert!(lock.unlocked_at(300));
    assert!(lock.unlocked_at(10_000));
  }

  #[test]
  fn preimage_matching() {
    let preimage = b"open sesame";
    let req = HashPreimageRequirement {
      hash: Code::Sha2_256.digest(preimage),
      preimage_size: Some(preimage.len() as u16),
    };
    assert!(req.accepts_size(preimage.len()));
    assert!(!req.accepts_size(preimage.len() + 1));
    assert!(req.matches_preimage(preimage));
    assert!(!req.matches_preimage(b"open barley"));
  }

  #[test]
  fn exchange_release_comes_in_ticks() {
    let req = ExchangeRequirement {
      meter_id: AttachmentId::local(0),
      release_per_tick: 5,
      tick_amount: 10,
    };
    assert_eq!(req.max_release_amount(0, 9), 0);
    assert_eq!(req.max_release_amount(0, 10), 5);
    assert_eq!(req.max_release_amount(0, 25), 10);
    assert_eq!(req.max_release_amount(5, 25), 5);
    assert_eq!(req.max_release_amount(10, 25), 0);
  }
}
