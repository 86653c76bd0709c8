use {
  thiserror::Error,
  tnt_primitives::{
    AccountId,
    Amount,
    AssetId,
    AttachmentId,
    Authority,
    FlowLimit,
    Index,
    LookupError,
    OperationError,
    QueryValidationError,
    TankId,
    TapId,
    ValidationError,
  },
};

/// Coarse classification of engine errors.
///
/// Every error is fatal to the operation that raised it; staged changes are
/// discarded. The kind tells the host what class of fault to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A schematic failed validation at create or update time.
  Structural,
  /// Declared authorities were insufficient, or declared but unused.
  Authority,
  /// An asset-type mismatch along a release path, or an account that may
  /// not hold the asset.
  Asset,
  /// A flow was prevented: tap locked, tank empty, a limit or bound
  /// exceeded.
  Limit,
  /// A referenced tap, attachment, tank, or request does not exist.
  Reference,
  /// Chain state refuses the operation: non-empty tank, wrong deposit,
  /// unready request.
  State,
  /// An invariant that prior validation should have guaranteed was broken;
  /// indicates a bug.
  Internal,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  #[error("schematic validation failed: {0}")]
  Validation(#[from] ValidationError),

  #[error("malformed query: {0}")]
  Query(#[from] QueryValidationError),

  #[error("malformed operation: {0}")]
  Operation(#[from] OperationError),

  #[error("operation requires authority {0:?}, which was not declared")]
  MissingAuthority(Authority),

  #[error("declared authority {0:?} was not used by the operation")]
  UnusedAuthority(Authority),

  #[error("declared authority does not match the required authority")]
  AuthorityMismatch,

  #[error("tap {0:?} has no connect authority; its connection is frozen")]
  ConnectionFrozen(TapId),

  #[error("no authority is able to veto requests on this requirement")]
  NoVetoAuthority,

  #[error("account {account:?} is not authorized to transact {asset:?}")]
  UnauthorizedAccount {
    account: AccountId,
    asset: AssetId,
  },

  #[error("flow carries {received:?} but the receiver accepts {expected:?}")]
  WrongAssetFlowed {
    expected: AssetId,
    received: AssetId,
  },

  #[error(
    "deposit path was rejected by the destination tank's source restrictor"
  )]
  DepositPathRejected,

  #[error("cannot open tap: requirement {requirement} has locked the tap")]
  TapLocked { requirement: Index },

  #[error("cannot open tap: tank is empty")]
  TankEmpty,

  #[error(
    "cannot release {requested} from tap: a requirement limited flow to \
     {limit}"
  )]
  ExcessiveFlow {
    requested: Amount,
    limit: FlowLimit,
  },

  #[error("flow exceeded the maximum sink chain length")]
  ChainTooLong,

  #[error("flow would open more than {max} taps")]
  TapOpenCountExceeded { max: usize },

  #[error("tank {0:?} does not exist")]
  NoSuchTank(TankId),

  #[error("tap {0:?} does not exist")]
  NoSuchTap(TapId),

  #[error("attachment {0:?} does not exist")]
  NoSuchAttachment(AttachmentId),

  #[error("request {0} does not exist")]
  NoSuchRequest(Index),

  #[error("tap {0:?} is not connected to any sink")]
  TapNotConnected(TapId),

  #[error("cannot delete a tank with an outstanding balance")]
  NonEmptyTank,

  #[error("insufficient balance to pay the deposit")]
  InsufficientBalance,

  #[error("incorrect deposit amount: expected {expected}, got {actual}")]
  WrongDeposit { expected: Amount, actual: Amount },

  #[error("tap is not a destructor tap, so the tank cannot be destroyed")]
  NotDestructorTap,

  #[error("request {0} has not been approved")]
  RequestNotApproved(Index),

  #[error("request {0} has not matured yet")]
  RequestNotMatured(Index),

  #[error("request limit reached; cancel or consume a pending request first")]
  RequestLimitReached,

  #[error("request {0} is already being consumed by this operation")]
  RequestBusy(Index),

  #[error("preimage has the wrong size")]
  BadPreimageSize,

  #[error("preimage does not match the hash lock")]
  BadPreimage,

  #[error("ticket signature is invalid")]
  BadTicketSignature,

  #[error("ticket number must equal {expected} to be redeemable")]
  StaleTicket { expected: Index },

  #[error("query targets an accessory of the wrong type")]
  WrongQueryTarget,

  #[error("internal error, please report this: {0}")]
  Internal(&'static str),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) | Error::Query(_) | Error::Operation(_) => {
        ErrorKind::Structural
      }
      Error::WrongQueryTarget => ErrorKind::Structural,
      Error::MissingAuthority(_)
      | Error::UnusedAuthority(_)
      | Error::AuthorityMismatch
      | Error::ConnectionFrozen(_)
      | Error::NoVetoAuthority => ErrorKind::Authority,
      Error::UnauthorizedAccount { .. }
      | Error::WrongAssetFlowed { .. }
      | Error::DepositPathRejected => ErrorKind::Asset,
      Error::TapLocked { .. }
      | Error::TankEmpty
      | Error::ExcessiveFlow { .. }
      | Error::ChainTooLong
      | Error::TapOpenCountExceeded { .. } => ErrorKind::Limit,
      Error::NoSuchTank(_)
      | Error::NoSuchTap(_)
      | Error::NoSuchAttachment(_)
      | Error::NoSuchRequest(_) => ErrorKind::Reference,
      Error::TapNotConnected(_)
      | Error::NonEmptyTank
      | Error::InsufficientBalance
      | Error::WrongDeposit { .. }
      | Error::NotDestructorTap
      | Error::RequestNotApproved(_)
      | Error::RequestNotMatured(_)
      | Error::RequestLimitReached
      | Error::RequestBusy(_)
      | Error::BadPreimageSize
      | Error::BadPreimage
      | Error::BadTicketSignature
      | Error::StaleTicket { .. } => ErrorKind::State,
      Error::Internal(_) => ErrorKind::Internal,
    }
  }
}

impl From<LookupError> for Error {
  fn from(e: LookupError) -> Self {
    match e {
      LookupError::NonexistentTank(id) => Error::NoSuchTank(id),
      LookupError::NonexistentAttachment(id) => Error::NoSuchAttachment(id),
      LookupError::NeedLookup => {
        Error::Internal("schematic store missing during evaluation")
      }
    }
  }
}
