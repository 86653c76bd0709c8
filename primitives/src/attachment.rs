use {
  crate::{
    sink::sink_eq,
    AssetId,
    Authority,
    FlowLimit,
    Index,
    Sink,
    TankId,
  },
  serde::{Deserialize, Serialize},
};

/// Receives asset and immediately releases it to a predetermined sink,
/// keeping a running tally of the total amount that has flowed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFlowMeter {
  /// The type of asset which can flow through this meter.
  pub asset_type: AssetId,
  /// The sink the metered asset is released to.
  pub destination_sink: Sink,
  /// Authority allowed to reset the meter; if unset, the emergency tap's
  /// open authority can.
  pub reset_authority: Option<Authority>,
}

/// A wildcard element in a deposit path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardSink {
  /// If true, the wildcard matches any number of sinks; otherwise exactly
  /// one.
  pub repeatable: bool,
}

/// One element of a deposit path pattern: a concrete sink or a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathElement {
  Sink(Sink),
  Wildcard(WildcardSink),
}

/// A sequence of path elements that incoming deposits are matched against.
pub type PathPattern = Vec<PathElement>;

/// The path a deposit arrived through: its origin (if known) and the chain
/// of sinks it traversed, ending with the terminal sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositPath {
  pub origin: Option<Sink>,
  pub sink_chain: Vec<Sink>,
}

/// Holds patterns for sources that may deposit to the tank; a deposit whose
/// path matches no pattern is rejected. The restrictor never receives asset
/// itself: it is consulted when its tank is the terminal sink of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSourceRestrictor {
  /// Patterns a deposit path is checked against.
  pub legal_deposit_paths: Vec<PathPattern>,
}

impl DepositSourceRestrictor {
  /// Index of the first pattern accepting the path, if any.
  ///
  /// Matching is greedy from the left. The origin is matched against the
  /// pattern's first element, then the chain against the rest; a repeatable
  /// wildcard consumes zero or more chain sinks, scanning forward until the
  /// following pattern sink reappears in the chain. An unknown origin is
  /// presumed to match any concrete sink except an account.
  pub fn matching_path(
    &self,
    path: &DepositPath,
    current_tank: Option<TankId>,
  ) -> Option<usize> {
    self
      .legal_deposit_paths
      .iter()
      .position(|pattern| pattern_matches(pattern, path, current_tank))
  }
}

fn pattern_matches(
  pattern: &[PathElement],
  path: &DepositPath,
  current_tank: Option<TankId>,
) -> bool {
  // An empty chain never deposited anywhere, so it never matches.
  if path.sink_chain.is_empty() || pattern.is_empty() {
    return false;
  }

  let mut p = 0;
  match &pattern[0] {
    // A repeatable wildcard stays in place to also consume chain sinks.
    PathElement::Wildcard(w) => {
      if !w.repeatable {
        p = 1;
      }
    }
    PathElement::Sink(s) => match &path.origin {
      Some(origin) => {
        if !sink_eq(s, origin, current_tank) {
          return false;
        }
        p = 1;
      }
      // An unknown origin never matches a concrete account, but is
      // presumed to match anything else.
      None => {
        if matches!(s, Sink::Account(_)) {
          return false;
        }
        p = 1;
      }
    },
  }

  let chain = &path.sink_chain;
  let mut c = 0;
  while c < chain.len() {
    match pattern.get(p) {
      None => return false,
      Some(PathElement::Wildcard(w)) if !w.repeatable => {
        p += 1;
        c += 1;
      }
      Some(PathElement::Wildcard(_)) => {
        if p + 1 == pattern.len() {
          // A trailing repeatable wildcard swallows the rest of the chain.
          return true;
        }
        let next = match &pattern[p + 1] {
          PathElement::Sink(s) => s,
          // Adjacent to a repeatable wildcard is rejected at validation.
          PathElement::Wildcard(_) => return false,
        };
        while c < chain.len() && !sink_eq(next, &chain[c], current_tank) {
          c += 1;
        }
        if c == chain.len() {
          return false;
        }
        p += 2;
        c += 1;
      }
      Some(PathElement::Sink(s)) => {
        if !sink_eq(s, &chain[c], current_tank) {
          return false;
        }
        p += 1;
        c += 1;
      }
    }
  }

  // A repeatable wildcard left at the cursor consumed zero sinks.
  if let Some(PathElement::Wildcard(w)) = pattern.get(p) {
    if w.repeatable {
      p += 1;
    }
  }
  p == pattern.len()
}

/// Receives asset and immediately releases it onward, scheduling a tap on
/// its own tank to be opened once the received asset stops moving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapOpener {
  /// Index of the tap to open; must be on the same tank as the opener.
  pub tap_index: Index,
  /// The amount to open the tap for.
  pub release_amount: FlowLimit,
  /// The sink asset is released to after flowing through the opener.
  pub destination_sink: Sink,
  /// The type of asset which can flow through the opener.
  pub asset_type: AssetId,
}

/// Delegates the right to reconnect an asset-receiving attachment's
/// destination sink to a designated authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentConnectAuthority {
  /// The authority that can reconnect the attachment.
  pub connect_authority: Authority,
  /// The attachment that can be reconnected; must be on the current tank.
  pub attachment_id: Index,
}

/// Discriminant of a tank attachment, used for per-type accounting.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AttachmentKind {
  FlowMeter,
  SourceRestrictor,
  TapOpener,
  ConnectAuthority,
}

impl AttachmentKind {
  /// Whether at most one attachment of this kind may exist per tank.
  pub fn unique(&self) -> bool {
    matches!(self, AttachmentKind::SourceRestrictor)
  }
}

/// An in-flow processor installed on a tank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TankAttachment {
  FlowMeter(AssetFlowMeter),
  SourceRestrictor(DepositSourceRestrictor),
  TapOpener(TapOpener),
  ConnectAuthority(AttachmentConnectAuthority),
}

impl TankAttachment {
  pub fn kind(&self) -> AttachmentKind {
    match self {
      TankAttachment::FlowMeter(_) => AttachmentKind::FlowMeter,
      TankAttachment::SourceRestrictor(_) => AttachmentKind::SourceRestrictor,
      TankAttachment::TapOpener(_) => AttachmentKind::TapOpener,
      TankAttachment::ConnectAuthority(_) => AttachmentKind::ConnectAuthority,
    }
  }

  /// If the attachment can receive asset, the type it receives.
  pub fn receives_asset(&self) -> Option<AssetId> {
    match self {
      TankAttachment::FlowMeter(m) => Some(m.asset_type),
      TankAttachment::TapOpener(o) => Some(o.asset_type),
      TankAttachment::SourceRestrictor(_)
      | TankAttachment::ConnectAuthority(_) => None,
    }
  }

  /// If the attachment can receive asset, the sink it releases it to.
  pub fn output_sink(&self) -> Option<&Sink> {
    match self {
      TankAttachment::FlowMeter(m) => Some(&m.destination_sink),
      TankAttachment::TapOpener(o) => Some(&o.destination_sink),
      TankAttachment::SourceRestrictor(_)
      | TankAttachment::ConnectAuthority(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{
      DepositPath,
      DepositSourceRestrictor,
      PathElement,
      WildcardSink,
    },
    crate::{AccountId, Sink, TankId},
  };

  fn wild(repeatable: bool) -> PathElement {
    PathElement::Wildcard(WildcardSink { repeatable })
  }

  fn account(n: u64) -> Sink {
    Sink::Account(AccountId(n))
  }

  fn restrictor(patterns: Vec<Vec<PathElement>>) -> DepositSourceRestrictor {
    DepositSourceRestrictor {
      legal_deposit_paths: patterns,
    }
  }

  #[test]
  fn empty_chain_never_matches() {
    let r = restrictor(vec![vec![wild(true), PathElement::Sink(
      Sink::SameTank,
    )]]);
    let path = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![],
    };
    assert_eq!(r.matching_path(&path, Some(TankId(1))), None);
  }

  #[test]
  fn origin_and_terminus() {
    let tank = TankId(9);
    let r = restrictor(vec![vec![
      PathElement::Sink(account(1)),
      wild(true),
      PathElement::Sink(Sink::SameTank),
    ]]);

    let direct = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&direct, Some(tank)), Some(0));

    let wrong_origin = DepositPath {
      origin: Some(account(2)),
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&wrong_origin, Some(tank)), None);

    // An unknown origin never matches a concrete account element.
    let unknown_origin = DepositPath {
      origin: None,
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&unknown_origin, Some(tank)), None);
  }

  #[test]
  fn unknown_origin_presumed_against_tank() {
    let tank = TankId(9);
    let r = restrictor(vec![vec![
      PathElement::Sink(Sink::Tank(TankId(2))),
      PathElement::Sink(Sink::SameTank),
    ]]);
    let path = DepositPath {
      origin: None,
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&path, Some(tank)), Some(0));
  }

  #[test]
  fn repeatable_wildcard_consumes_zero_or_more() {
    let tank = TankId(3);
    let r = restrictor(vec![vec![
      PathElement::Sink(account(1)),
      wild(true),
      PathElement::Sink(Sink::SameTank),
    ]]);

    for extra in 0..3 {
      let mut chain = vec![
        Sink::Attachment(crate::AttachmentId {
          tank_id: Some(tank),
          attachment_id: 0,
        });
        extra
      ];
      chain.push(Sink::Tank(tank));
      let path = DepositPath {
        origin: Some(account(1)),
        sink_chain: chain,
      };
      assert_eq!(r.matching_path(&path, Some(tank)), Some(0), "extra={extra}");
    }
  }

  #[test]
  fn single_wildcard_consumes_exactly_one() {
    let tank = TankId(3);
    let r = restrictor(vec![vec![
      wild(false),
      PathElement::Sink(Sink::SameTank),
    ]]);

    let one = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&one, Some(tank)), Some(0));

    // Two chain sinks is one more than the pattern can consume.
    let two = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![Sink::Tank(TankId(8)), Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&two, Some(tank)), None);
  }

  #[test]
  fn widening_a_wildcard_preserves_matches() {
    // A chain matching a non-repeatable wildcard still matches when the
    // wildcard is made repeatable.
    let tank = TankId(3);
    let narrow = restrictor(vec![vec![
      PathElement::Sink(account(1)),
      wild(false),
      PathElement::Sink(Sink::SameTank),
    ]]);
    let wide = restrictor(vec![vec![
      PathElement::Sink(account(1)),
      wild(true),
      PathElement::Sink(Sink::SameTank),
    ]]);

    let path = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![Sink::Tank(TankId(8)), Sink::Tank(tank)],
    };
    assert_eq!(narrow.matching_path(&path, Some(tank)), Some(0));
    assert_eq!(wide.matching_path(&path, Some(tank)), Some(0));
  }

  #[test]
  fn first_matching_pattern_wins() {
    let tank = TankId(3);
    let r = restrictor(vec![
      vec![
        PathElement::Sink(account(2)),
        PathElement::Sink(Sink::SameTank),
      ],
      vec![wild(true), PathElement::Sink(Sink::SameTank)],
    ]);
    let path = DepositPath {
      origin: Some(account(1)),
      sink_chain: vec![Sink::Tank(tank)],
    };
    assert_eq!(r.matching_path(&path, Some(tank)), Some(1));
  }
}
