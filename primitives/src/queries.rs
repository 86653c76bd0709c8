use {
  crate::{AccessoryAddress, FlowLimit, Index, Sink, TankId, Ticket},
  ed25519_dalek::Signature,
  serde::{Deserialize, Serialize},
  thiserror::Error,
};

/// Upper bound on request comments and documentation strings.
pub const MAX_COMMENT_LEN: usize = 150;

/// Rejection reasons for a malformed query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryValidationError {
  #[error("request amount must not be zero")]
  ZeroRequestAmount,

  #[error("if provided, comment must not be empty")]
  EmptyComment,

  #[error("comment is at most {MAX_COMMENT_LEN} characters")]
  CommentTooLong,

  #[error("preimage must not be empty")]
  EmptyPreimage,

  #[error("maximum withdrawal must not be zero")]
  ZeroMaxWithdrawal,

  #[error("ticket tank does not match the queried tank")]
  TicketTankMismatch,

  #[error("ticket tap does not match the query target")]
  TicketTapMismatch,

  #[error("ticket requirement index does not match the query target")]
  TicketRequirementMismatch,

  #[error("ticket queries must target a tap requirement")]
  TicketTargetNotRequirement,
}

fn check_comment(comment: &Option<String>) -> Result<(), QueryValidationError> {
  if let Some(comment) = comment {
    if comment.is_empty() {
      return Err(QueryValidationError::EmptyComment);
    }
    if comment.len() > MAX_COMMENT_LEN {
      return Err(QueryValidationError::CommentTooLong);
    }
  }
  Ok(())
}

/// An action to run against a tank or one of its accessories.
///
/// Queries either mutate accessory state directly (resets, reconnects,
/// request bookkeeping) or arm a tap requirement for the flow evaluator to
/// consume within the same operation (reveals, redemptions, consumptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
  /// Reset a meter's tally to zero.
  ResetMeter,
  /// Point an asset-receiving attachment at a new destination sink, through
  /// an attachment connect authority.
  ReconnectAttachment { new_sink: Sink },
  /// File a request to open a tap gated by a review requirement.
  CreateRequestForReview {
    request_amount: FlowLimit,
    comment: Option<String>,
  },
  /// Approve or deny a filed review request.
  ReviewRequestToOpen {
    request_id: Index,
    approved: bool,
    comment: Option<String>,
  },
  /// Withdraw a filed review request.
  CancelRequestForReview {
    request_id: Index,
    comment: Option<String>,
  },
  /// Open a tap gated by a review requirement by consuming an approved
  /// request.
  ConsumeApprovedRequestToOpen { request_id: Index },
  /// Document the reason for the action being taken. Always permitted;
  /// consumed only by documentation requirements.
  DocumentationString { reason: String },
  /// File a request to open a tap gated by a delay requirement.
  CreateRequestForDelay {
    request_amount: FlowLimit,
    comment: Option<String>,
  },
  /// Veto a request during its delay period.
  VetoRequestInDelay {
    request_id: Index,
    comment: Option<String>,
  },
  /// Withdraw a request during its delay period.
  CancelRequestInDelay {
    request_id: Index,
    comment: Option<String>,
  },
  /// Open a tap gated by a delay requirement by consuming a matured
  /// request.
  ConsumeMaturedRequestToOpen { request_id: Index },
  /// Provide the preimage to a hash lock.
  RevealHashPreimage { preimage: Vec<u8> },
  /// Provide a signed ticket authorizing a release.
  RedeemTicketToOpen {
    ticket: Ticket,
    ticket_signature: Signature,
  },
  /// Zero an exchange requirement's released tally and its meter.
  ResetExchangeAndMeter,
}

impl Query {
  /// Stateless well-formedness checks.
  pub fn validate(&self) -> Result<(), QueryValidationError> {
    match self {
      Query::ResetMeter
      | Query::ResetExchangeAndMeter
      | Query::ConsumeApprovedRequestToOpen { .. }
      | Query::ConsumeMaturedRequestToOpen { .. }
      | Query::ReconnectAttachment { .. } => Ok(()),
      Query::CreateRequestForReview {
        request_amount,
        comment,
      }
      | Query::CreateRequestForDelay {
        request_amount,
        comment,
      } => {
        if request_amount.is_zero() {
          return Err(QueryValidationError::ZeroRequestAmount);
        }
        check_comment(comment)
      }
      Query::ReviewRequestToOpen { comment, .. }
      | Query::CancelRequestForReview { comment, .. }
      | Query::VetoRequestInDelay { comment, .. }
      | Query::CancelRequestInDelay { comment, .. } => check_comment(comment),
      Query::DocumentationString { reason } => {
        check_comment(&Some(reason.clone()))
      }
      Query::RevealHashPreimage { preimage } => {
        if preimage.is_empty() {
          return Err(QueryValidationError::EmptyPreimage);
        }
        Ok(())
      }
      Query::RedeemTicketToOpen { ticket, .. } => {
        if ticket.max_withdrawal.is_zero() {
          return Err(QueryValidationError::ZeroMaxWithdrawal);
        }
        Ok(())
      }
    }
  }
}

/// What a query is aimed at: the tank as a whole, or one accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryTarget {
  Tank,
  Accessory(AccessoryAddress),
}

/// A query with the address of the accessory it pertains to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedQuery {
  pub query: Query,
  pub target: QueryTarget,
}

impl TargetedQuery {
  /// Stateless validation, including the ticket's echo of its target.
  pub fn validate(
    &self,
    queried_tank: TankId,
  ) -> Result<(), QueryValidationError> {
    self.query.validate()?;
    if let Query::RedeemTicketToOpen { ticket, .. } = &self.query {
      if ticket.tank_id != queried_tank {
        return Err(QueryValidationError::TicketTankMismatch);
      }
      match self.target {
        QueryTarget::Accessory(AccessoryAddress::Requirement {
          tap_id,
          requirement_index,
        }) => {
          if ticket.tap_id != tap_id {
            return Err(QueryValidationError::TicketTapMismatch);
          }
          if ticket.requirement_index != requirement_index {
            return Err(QueryValidationError::TicketRequirementMismatch);
          }
        }
        _ => return Err(QueryValidationError::TicketTargetNotRequirement),
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use {
    super::{Query, QueryTarget, QueryValidationError, TargetedQuery},
    crate::{AccessoryAddress, FlowLimit, TankId, Ticket},
    ed25519_dalek::{Keypair, Signer},
    rand::rngs::OsRng,
  };

  #[test]
  fn comments_are_bounded() {
    let query = Query::CreateRequestForReview {
      request_amount: FlowLimit::Amount(10),
      comment: Some("a".repeat(151)),
    };
    assert_eq!(query.validate(), Err(QueryValidationError::CommentTooLong));

    let query = Query::CreateRequestForReview {
      request_amount: FlowLimit::Amount(10),
      comment: Some(String::new()),
    };
    assert_eq!(query.validate(), Err(QueryValidationError::EmptyComment));
  }

  #[test]
  fn zero_amounts_rejected() {
    let query = Query::CreateRequestForDelay {
      request_amount: FlowLimit::Amount(0),
      comment: None,
    };
    assert_eq!(
      query.validate(),
      Err(QueryValidationError::ZeroRequestAmount)
    );
  }

  #[test]
  fn ticket_must_echo_its_target() {
    let keypair = Keypair::generate(&mut OsRng);
    let ticket = Ticket {
      tank_id: TankId(1),
      tap_id: 2,
      requirement_index: 0,
      max_withdrawal: FlowLimit::Amount(50),
      ticket_number: 0,
    };
    let signature = keypair.sign(&ticket.digest().to_bytes());

    let query = TargetedQuery {
      query: Query::RedeemTicketToOpen {
        ticket: ticket.clone(),
        ticket_signature: signature,
      },
      target: QueryTarget::Accessory(AccessoryAddress::requirement(2, 0)),
    };
    assert_eq!(query.validate(TankId(1)), Ok(()));
    assert_eq!(
      query.validate(TankId(9)),
      Err(QueryValidationError::TicketTankMismatch)
    );

    let mistargeted = TargetedQuery {
      target: QueryTarget::Accessory(AccessoryAddress::requirement(3, 0)),
      ..query
    };
    assert_eq!(
      mistargeted.validate(TankId(1)),
      Err(QueryValidationError::TicketTapMismatch)
    );
  }
}
