use {
  crate::{CowDb, Database, Error, TankObject},
  ed25519_dalek::Verifier,
  tnt_primitives::{
    AccessoryAddress,
    Authority,
    DelayRequest,
    FlowLimit,
    Index,
    LookupError,
    LookupUtilities,
    Query,
    QueryTarget,
    ReviewRequest,
    SchematicStore,
    Sink,
    SinkAsset,
    TankAttachment,
    TankId,
    TapId,
    TapRequirement,
    TargetedQuery,
    Ticket,
    ValidationError,
  },
};

/// Evaluates queries against one tank, accumulating the authorities they
/// consume.
///
/// Queries with immediate effects (resets, reconnects, request bookkeeping)
/// stage them against the copy-on-write wrapper as they are evaluated.
/// Consume-style queries (approved or matured requests, preimage reveals,
/// ticket redemptions) are validated eagerly but only applied by
/// [`QueryEvaluator::apply_queries`] after the flow phase, so the flow
/// evaluator's requirement inspectors can still observe the state they
/// consume.
pub struct QueryEvaluator {
  tank_id: TankId,
  evaluated: Vec<TargetedQuery>,
  authorities: Vec<Authority>,
}

impl QueryEvaluator {
  pub fn new(tank_id: TankId) -> Self {
    Self {
      tank_id,
      evaluated: Vec::new(),
      authorities: Vec::new(),
    }
  }

  pub fn tank_id(&self) -> TankId {
    self.tank_id
  }

  /// Every distinct authority consumed by the queries evaluated so far.
  pub fn required_authorities(&self) -> &[Authority] {
    &self.authorities
  }

  /// Queries targeting the tank as a whole.
  pub fn tank_queries(
    &self,
  ) -> impl Iterator<Item = &TargetedQuery> {
    self
      .evaluated
      .iter()
      .filter(|q| matches!(q.target, QueryTarget::Tank))
  }

  /// Queries targeting one particular accessory.
  pub fn target_queries<'a>(
    &'a self,
    address: &'a AccessoryAddress,
  ) -> impl Iterator<Item = &'a TargetedQuery> {
    self
      .evaluated
      .iter()
      .filter(move |q| q.target == QueryTarget::Accessory(*address))
  }

  /// Run one query's validation, stage its immediate effects, and return
  /// the authorities it requires.
  pub fn evaluate_query<D: Database>(
    &mut self,
    db: &mut CowDb<D>,
    query: TargetedQuery,
  ) -> Result<Vec<Authority>, Error> {
    query.validate(self.tank_id)?;

    let required = match &query.query {
      Query::ResetMeter => self.reset_meter(db, &query.target)?,
      Query::ReconnectAttachment { new_sink } => {
        self.reconnect_attachment(db, &query.target, new_sink)?
      }
      Query::CreateRequestForReview {
        request_amount,
        comment,
      } => self.create_review_request(
        db,
        &query.target,
        *request_amount,
        comment.clone(),
      )?,
      Query::ReviewRequestToOpen {
        request_id,
        approved,
        ..
      } => self.review_request(db, &query.target, *request_id, *approved)?,
      Query::CancelRequestForReview { request_id, .. } => {
        self.cancel_review_request(db, &query.target, *request_id)?
      }
      Query::ConsumeApprovedRequestToOpen { request_id } => {
        self.consume_approved_request(db, &query, *request_id)?
      }
      Query::DocumentationString { .. } => match query.target {
        QueryTarget::Tank => vec![],
        _ => return Err(Error::WrongQueryTarget),
      },
      Query::CreateRequestForDelay {
        request_amount,
        comment,
      } => self.create_delay_request(
        db,
        &query.target,
        *request_amount,
        comment.clone(),
      )?,
      Query::VetoRequestInDelay { request_id, .. } => {
        self.veto_delay_request(db, &query.target, *request_id)?
      }
      Query::CancelRequestInDelay { request_id, .. } => {
        self.cancel_delay_request(db, &query.target, *request_id)?
      }
      Query::ConsumeMaturedRequestToOpen { request_id } => {
        self.consume_matured_request(db, &query, *request_id)?
      }
      Query::RevealHashPreimage { preimage } => {
        self.reveal_preimage(db, &query.target, preimage)?
      }
      Query::RedeemTicketToOpen {
        ticket,
        ticket_signature,
      } => self.redeem_ticket(db, &query, ticket, ticket_signature)?,
      Query::ResetExchangeAndMeter => {
        self.reset_exchange_and_meter(db, &query.target)?
      }
    };

    for authority in &required {
      if !self.authorities.contains(authority) {
        self.authorities.push(authority.clone());
      }
    }
    self.evaluated.push(query);
    Ok(required)
  }

  /// Durably apply the consume-style queries. Called after the flow phase,
  /// so requirement inspectors observed the consumed state first.
  pub fn apply_queries<D: Database>(
    &self,
    db: &mut CowDb<D>,
  ) -> Result<(), Error> {
    for query in &self.evaluated {
      match (&query.query, &query.target) {
        (
          Query::ConsumeApprovedRequestToOpen { request_id },
          QueryTarget::Accessory(AccessoryAddress::Requirement {
            tap_id,
            requirement_index,
          }),
        ) => {
          let tank = db.tank_mut(self.tank_id)?;
          tank
            .review_state_mut(*tap_id, *requirement_index)?
            .pending_requests
            .remove(request_id);
        }
        (
          Query::ConsumeMaturedRequestToOpen { request_id },
          QueryTarget::Accessory(AccessoryAddress::Requirement {
            tap_id,
            requirement_index,
          }),
        ) => {
          let tank = db.tank_mut(self.tank_id)?;
          tank
            .delay_state_mut(*tap_id, *requirement_index)?
            .pending_requests
            .remove(request_id);
        }
        (
          Query::RedeemTicketToOpen { .. },
          QueryTarget::Accessory(AccessoryAddress::Requirement {
            tap_id,
            requirement_index,
          }),
        ) => {
          let tank = db.tank_mut(self.tank_id)?;
          tank
            .ticket_state_mut(*tap_id, *requirement_index)?
            .tickets_consumed += 1;
        }
        _ => {}
      }
    }
    Ok(())
  }

  /// Resolve a requirement address on the query tank.
  fn requirement<'t>(
    &self,
    tank: &'t TankObject,
    target: &QueryTarget,
  ) -> Result<(Index, Index, &'t TapRequirement), Error> {
    match target {
      QueryTarget::Accessory(AccessoryAddress::Requirement {
        tap_id,
        requirement_index,
      }) => {
        let tap = tank
          .schematic
          .taps
          .get(tap_id)
          .ok_or(Error::NoSuchTap(TapId::new(self.tank_id, *tap_id)))?;
        let requirement = tap
          .requirements
          .get(usize::from(*requirement_index))
          .ok_or(Error::WrongQueryTarget)?;
        Ok((*tap_id, *requirement_index, requirement))
      }
      _ => Err(Error::WrongQueryTarget),
    }
  }

  /// Resolve an attachment address on the query tank.
  fn attachment<'t>(
    &self,
    tank: &'t TankObject,
    target: &QueryTarget,
  ) -> Result<(Index, &'t TankAttachment), Error> {
    match target {
      QueryTarget::Accessory(AccessoryAddress::Attachment {
        attachment_id,
      }) => {
        let attachment = tank
          .schematic
          .attachments
          .get(attachment_id)
          .ok_or(Error::WrongQueryTarget)?;
        Ok((*attachment_id, attachment))
      }
      _ => Err(Error::WrongQueryTarget),
    }
  }

  /// The fallback authority for resets: the tank's emergency open
  /// authority.
  fn emergency_authority(tank: &TankObject) -> Result<Authority, Error> {
    tank
      .schematic
      .emergency_tap()
      .and_then(|tap| tap.open_authority.clone())
      .ok_or(Error::Internal("validated tank lacks an emergency tap"))
  }

  fn reset_meter<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
  ) -> Result<Vec<Authority>, Error> {
    let (attachment_id, authority) = {
      let tank = db.tank(self.tank_id)?;
      let (id, attachment) = self.attachment(tank, target)?;
      let meter = match attachment {
        TankAttachment::FlowMeter(meter) => meter,
        _ => return Err(Error::WrongQueryTarget),
      };
      let authority = match &meter.reset_authority {
        Some(authority) => authority.clone(),
        None => Self::emergency_authority(tank)?,
      };
      (id, authority)
    };
    let tank = db.tank_mut(self.tank_id)?;
    tank.meter_state_mut(attachment_id)?.metered_amount = 0;
    Ok(vec![authority])
  }

  fn reconnect_attachment<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    new_sink: &Sink,
  ) -> Result<Vec<Authority>, Error> {
    let (target_id, authority) = {
      let tank = db.tank(self.tank_id)?;
      let (_, attachment) = self.attachment(tank, target)?;
      let aca = match attachment {
        TankAttachment::ConnectAuthority(aca) => aca,
        _ => return Err(Error::WrongQueryTarget),
      };
      let reconnected = tank
        .schematic
        .attachments
        .get(&aca.attachment_id)
        .ok_or(Error::WrongQueryTarget)?;
      let emitted = reconnected.receives_asset().ok_or(Error::Internal(
        "connect authority references a non-receiving attachment",
      ))?;

      // The new sink must accept the asset the attachment emits.
      let lookup = LookupUtilities::new(
        &tank.schematic,
        Some(self.tank_id),
        Some(&*db as &dyn SchematicStore),
      );
      match lookup.get_sink_asset(new_sink) {
        Ok(SinkAsset::AnyAsset) => {}
        Ok(SinkAsset::Asset(asset)) if asset == emitted => {}
        Ok(SinkAsset::Asset(_)) => {
          return Err(Error::Validation(ValidationError::SinkWrongAsset {
            sink: new_sink.clone(),
          }))
        }
        Ok(SinkAsset::NoAsset(_)) => {
          return Err(Error::Validation(
            ValidationError::SinkReceivesNoAsset {
              sink: new_sink.clone(),
            },
          ))
        }
        Err(LookupError::NeedLookup) => {}
        Err(e) => return Err(e.into()),
      }
      (aca.attachment_id, aca.connect_authority.clone())
    };

    let tank = db.tank_mut(self.tank_id)?;
    match tank.schematic.attachments.get_mut(&target_id) {
      Some(TankAttachment::FlowMeter(meter)) => {
        meter.destination_sink = new_sink.clone();
      }
      Some(TankAttachment::TapOpener(opener)) => {
        opener.destination_sink = new_sink.clone();
      }
      _ => {
        return Err(Error::Internal(
          "connect authority references a non-receiving attachment",
        ))
      }
    }
    Ok(vec![authority])
  }

  fn create_review_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_amount: FlowLimit,
    comment: Option<String>,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index, limit) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      let review = match requirement {
        TapRequirement::Review(review) => review,
        _ => return Err(Error::WrongQueryTarget),
      };
      (tap_id, index, review.request_limit)
    };
    let tank = db.tank_mut(self.tank_id)?;
    let state = tank.review_state_mut(tap_id, index)?;
    if limit > 0 && state.pending_requests.len() >= usize::from(limit) {
      return Err(Error::RequestLimitReached);
    }
    let request_id = state.request_counter;
    state.request_counter += 1;
    state.pending_requests.insert(request_id, ReviewRequest {
      request_amount,
      request_comment: comment,
      approved: false,
    });
    Ok(vec![])
  }

  fn review_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_id: Index,
    approved: bool,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index, reviewer) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      let review = match requirement {
        TapRequirement::Review(review) => review,
        _ => return Err(Error::WrongQueryTarget),
      };
      (tap_id, index, review.reviewer.clone())
    };
    let tank = db.tank_mut(self.tank_id)?;
    let state = tank.review_state_mut(tap_id, index)?;
    if approved {
      state
        .pending_requests
        .get_mut(&request_id)
        .ok_or(Error::NoSuchRequest(request_id))?
        .approved = true;
    } else {
      // A denied request is dropped.
      state
        .pending_requests
        .remove(&request_id)
        .ok_or(Error::NoSuchRequest(request_id))?;
    }
    Ok(vec![reviewer])
  }

  fn cancel_review_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_id: Index,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      if !matches!(requirement, TapRequirement::Review(_)) {
        return Err(Error::WrongQueryTarget);
      }
      (tap_id, index)
    };
    let tank = db.tank_mut(self.tank_id)?;
    tank
      .review_state_mut(tap_id, index)?
      .pending_requests
      .remove(&request_id)
      .ok_or(Error::NoSuchRequest(request_id))?;
    Ok(vec![])
  }

  fn consume_approved_request<D: Database>(
    &self,
    db: &CowDb<D>,
    query: &TargetedQuery,
    request_id: Index,
  ) -> Result<Vec<Authority>, Error> {
    self.check_not_already_consuming(query, request_id)?;
    let tank = db.tank(self.tank_id)?;
    let (tap_id, index, requirement) =
      self.requirement(tank, &query.target)?;
    let review = match requirement {
      TapRequirement::Review(review) => review,
      _ => return Err(Error::WrongQueryTarget),
    };
    let request = tank
      .review_state(tap_id, index)
      .and_then(|state| state.pending_requests.get(&request_id))
      .ok_or(Error::NoSuchRequest(request_id))?;
    if !request.approved {
      return Err(Error::RequestNotApproved(request_id));
    }
    Ok(vec![review.reviewer.clone()])
  }

  fn create_delay_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_amount: FlowLimit,
    comment: Option<String>,
  ) -> Result<Vec<Authority>, Error> {
    let now = db.head_block_time();
    let (tap_id, index, limit, delay) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      let delay_req = match requirement {
        TapRequirement::Delay(delay) => delay,
        _ => return Err(Error::WrongQueryTarget),
      };
      (
        tap_id,
        index,
        delay_req.request_limit,
        delay_req.delay_period_sec,
      )
    };
    let tank = db.tank_mut(self.tank_id)?;
    let state = tank.delay_state_mut(tap_id, index)?;
    if limit > 0 && state.pending_requests.len() >= usize::from(limit) {
      return Err(Error::RequestLimitReached);
    }
    let request_id = state.request_counter;
    state.request_counter += 1;
    state
      .pending_requests
      .insert(request_id, DelayRequest {
        delay_period_end: now + u64::from(delay),
        request_amount,
        request_comment: comment,
      });
    Ok(vec![])
  }

  fn veto_delay_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_id: Index,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index, authority) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      let delay_req = match requirement {
        TapRequirement::Delay(delay) => delay,
        _ => return Err(Error::WrongQueryTarget),
      };
      let authority = delay_req
        .veto_authority
        .clone()
        .ok_or(Error::NoVetoAuthority)?;
      (tap_id, index, authority)
    };
    let tank = db.tank_mut(self.tank_id)?;
    tank
      .delay_state_mut(tap_id, index)?
      .pending_requests
      .remove(&request_id)
      .ok_or(Error::NoSuchRequest(request_id))?;
    Ok(vec![authority])
  }

  fn cancel_delay_request<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
    request_id: Index,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      if !matches!(requirement, TapRequirement::Delay(_)) {
        return Err(Error::WrongQueryTarget);
      }
      (tap_id, index)
    };
    let tank = db.tank_mut(self.tank_id)?;
    tank
      .delay_state_mut(tap_id, index)?
      .pending_requests
      .remove(&request_id)
      .ok_or(Error::NoSuchRequest(request_id))?;
    Ok(vec![])
  }

  fn consume_matured_request<D: Database>(
    &self,
    db: &CowDb<D>,
    query: &TargetedQuery,
    request_id: Index,
  ) -> Result<Vec<Authority>, Error> {
    self.check_not_already_consuming(query, request_id)?;
    let now = db.head_block_time();
    let tank = db.tank(self.tank_id)?;
    let (tap_id, index, requirement) =
      self.requirement(tank, &query.target)?;
    if !matches!(requirement, TapRequirement::Delay(_)) {
      return Err(Error::WrongQueryTarget);
    }
    let request = tank
      .delay_state(tap_id, index)
      .and_then(|state| state.pending_requests.get(&request_id))
      .ok_or(Error::NoSuchRequest(request_id))?;
    if request.delay_period_end > now {
      return Err(Error::RequestNotMatured(request_id));
    }
    Ok(vec![])
  }

  fn reveal_preimage<D: Database>(
    &self,
    db: &CowDb<D>,
    target: &QueryTarget,
    preimage: &[u8],
  ) -> Result<Vec<Authority>, Error> {
    let tank = db.tank(self.tank_id)?;
    let (_, _, requirement) = self.requirement(tank, target)?;
    let lock = match requirement {
      TapRequirement::HashPreimage(lock) => lock,
      _ => return Err(Error::WrongQueryTarget),
    };
    if !lock.accepts_size(preimage.len()) {
      return Err(Error::BadPreimageSize);
    }
    if !lock.matches_preimage(preimage) {
      return Err(Error::BadPreimage);
    }
    Ok(vec![])
  }

  fn redeem_ticket<D: Database>(
    &self,
    db: &CowDb<D>,
    query: &TargetedQuery,
    ticket: &Ticket,
    signature: &ed25519_dalek::Signature,
  ) -> Result<Vec<Authority>, Error> {
    let tank = db.tank(self.tank_id)?;
    let (tap_id, index, requirement) =
      self.requirement(tank, &query.target)?;
    let ticket_req = match requirement {
      TapRequirement::Ticket(req) => req,
      _ => return Err(Error::WrongQueryTarget),
    };
    if ticket_req
      .ticket_signer
      .verify(&ticket.digest().to_bytes(), signature)
      .is_err()
    {
      return Err(Error::BadTicketSignature);
    }

    // Tickets redeem strictly in sequence. Redemptions already staged in
    // this operation count toward the expected number, so an operation can
    // redeem consecutive tickets.
    let consumed = tank
      .ticket_state(tap_id, index)
      .map(|state| state.tickets_consumed)
      .unwrap_or(0);
    let staged = self
      .target_queries(&AccessoryAddress::requirement(tap_id, index))
      .filter(|q| matches!(q.query, Query::RedeemTicketToOpen { .. }))
      .count() as Index;
    let expected = consumed + staged;
    if ticket.ticket_number != expected {
      return Err(Error::StaleTicket { expected });
    }
    Ok(vec![])
  }

  fn reset_exchange_and_meter<D: Database>(
    &self,
    db: &mut CowDb<D>,
    target: &QueryTarget,
  ) -> Result<Vec<Authority>, Error> {
    let (tap_id, index, meter_tank, meter_id, authority) = {
      let tank = db.tank(self.tank_id)?;
      let (tap_id, index, requirement) = self.requirement(tank, target)?;
      let exchange = match requirement {
        TapRequirement::Exchange(exchange) => exchange,
        _ => return Err(Error::WrongQueryTarget),
      };
      let meter_tank = exchange.meter_id.tank_id.unwrap_or(self.tank_id);
      let meter_id = exchange.meter_id.attachment_id;

      let meter_owner = db.tank(meter_tank)?;
      let authority = match meter_owner.schematic.attachments.get(&meter_id) {
        Some(TankAttachment::FlowMeter(meter)) => {
          match &meter.reset_authority {
            Some(authority) => authority.clone(),
            None => Self::emergency_authority(meter_owner)?,
          }
        }
        _ => {
          return Err(Error::Validation(ValidationError::NotAMeter {
            role: "exchange requirement",
          }))
        }
      };
      (tap_id, index, meter_tank, meter_id, authority)
    };

    db.tank_mut(self.tank_id)?
      .exchange_state_mut(tap_id, index)?
      .amount_released = 0;
    db.tank_mut(meter_tank)?
      .meter_state_mut(meter_id)?
      .metered_amount = 0;
    Ok(vec![authority])
  }

  /// Reject a second consume query for the same request within one
  /// operation.
  fn check_not_already_consuming(
    &self,
    query: &TargetedQuery,
    request_id: Index,
  ) -> Result<(), Error> {
    let duplicate = self.evaluated.iter().any(|prior| {
      prior.target == query.target
        && match (&prior.query, &query.query) {
          (
            Query::ConsumeApprovedRequestToOpen { request_id: a },
            Query::ConsumeApprovedRequestToOpen { .. },
          )
          | (
            Query::ConsumeMaturedRequestToOpen { request_id: a },
            Query::ConsumeMaturedRequestToOpen { .. },
          ) => *a == request_id,
          _ => false,
        }
    });
    if duplicate {
      return Err(Error::RequestBusy(request_id));
    }
    Ok(())
  }
}
