//! Protocol types for Tanks and Taps, a framework for composable on-chain
//! financial contracts.
//!
//! Asset is locked in containers called tanks and leaves them only through
//! taps, whose releases are gated by tap requirements and routed through
//! tank attachments that process asset in flight. Chaining tanks and taps
//! together models contracts such as hash/time-locked transfers, allowance
//! schedules, review-and-approve escrows, and exchange meters, without a
//! general-purpose virtual machine.
//!
//! This crate holds the data model and everything that can be checked
//! without chain state: the tank schematic and its validator, sink-chain
//! lookups, the deposit path matcher, query and operation definitions. The
//! execution engine lives in `tnt-engine`.

mod accessory;
mod attachment;
mod authority;
mod ids;
mod lookups;
mod operations;
mod parameters;
mod queries;
mod requirement;
mod schematic;
mod sink;
pub mod validation;

pub use {
  accessory::{
    AccessoryAddress,
    AccessoryState,
    AccessoryStateMap,
    CumulativeFlowState,
    DelayRequest,
    DelayState,
    ExchangeState,
    MeterState,
    PeriodicFlowState,
    ReviewRequest,
    ReviewState,
    StateKey,
    TicketState,
  },
  attachment::{
    AssetFlowMeter,
    AttachmentConnectAuthority,
    AttachmentKind,
    DepositPath,
    DepositSourceRestrictor,
    PathElement,
    PathPattern,
    TankAttachment,
    TapOpener,
    WildcardSink,
  },
  authority::Authority,
  ids::{
    AccountId,
    Amount,
    AssetId,
    AttachmentId,
    FlowLimit,
    Index,
    TankId,
    TapId,
    Timestamp,
    CORE_ASSET,
  },
  lookups::{
    LookupError,
    LookupUtilities,
    SchematicStore,
    SinkAsset,
    SinkChain,
    SinkChainError,
  },
  operations::{
    FeeParameters,
    Operation,
    OperationError,
    TankCreate,
    TankDelete,
    TankQuery,
    TankUpdate,
    TapConnect,
    TapOpen,
  },
  parameters::Parameters,
  queries::{
    Query,
    QueryTarget,
    QueryValidationError,
    TargetedQuery,
    MAX_COMMENT_LEN,
  },
  requirement::{
    CumulativeFlowLimit,
    DelayRequirement,
    DocumentationRequirement,
    ExchangeRequirement,
    HashPreimageRequirement,
    ImmediateFlowLimit,
    MinimumTankLevel,
    PeriodicFlowLimit,
    RequirementKind,
    ReviewRequirement,
    TapRequirement,
    Ticket,
    TicketRequirement,
    TimeLock,
  },
  schematic::{Tap, TankSchematic},
  sink::{sink_eq, Sink},
  validation::{TankValidator, ValidationError},
};
