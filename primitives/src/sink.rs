use {
  crate::{AccountId, AttachmentId, TankId},
  serde::{Deserialize, Serialize},
};

/// Anywhere asset can flow to: an account, a tank, or a tank attachment.
///
/// `SameTank` is contextual and resolves against the "current tank" of the
/// traversal it appears in. Accounts and tanks are terminal; attachments
/// process asset in flight and release it onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sink {
  SameTank,
  Account(AccountId),
  Tank(TankId),
  Attachment(AttachmentId),
}

impl Sink {
  /// A terminal sink stores asset rather than forwarding it.
  pub fn is_terminal(&self) -> bool {
    !matches!(self, Sink::Attachment(_))
  }
}

/// Contextual sink equality.
///
/// `SameTank` on either side resolves against `current_tank`; attachment
/// references with an unset tank id substitute it as well. Two `SameTank`
/// sinks are only equal when the current tank is actually known.
pub fn sink_eq(a: &Sink, b: &Sink, current_tank: Option<TankId>) -> bool {
  match (a, b) {
    (Sink::SameTank, Sink::SameTank) => current_tank.is_some(),
    (Sink::SameTank, Sink::Tank(t)) | (Sink::Tank(t), Sink::SameTank) => {
      current_tank == Some(*t)
    }
    (Sink::Account(x), Sink::Account(y)) => x == y,
    (Sink::Tank(x), Sink::Tank(y)) => x == y,
    (Sink::Attachment(x), Sink::Attachment(y)) => {
      if x.attachment_id != y.attachment_id {
        return false;
      }
      match (x.tank_id, y.tank_id) {
        (Some(a), Some(b)) => a == b,
        (Some(t), None) | (None, Some(t)) => current_tank == Some(t),
        (None, None) => true,
      }
    }
    _ => false,
  }
}
