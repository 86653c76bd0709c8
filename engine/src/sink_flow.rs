use {
  crate::{CowDb, Database, Error},
  tnt_primitives::{
    Amount,
    AssetId,
    DepositPath,
    FlowLimit,
    Sink,
    TankAttachment,
    TankId,
    TapId,
  },
  tracing::trace,
};

/// Release asset into a sink and walk it through intermediate attachments
/// to its terminal sink, performing the accounting each step calls for.
///
/// Meters accrue the flowed amount; tap openers schedule a tap through
/// `on_tap_open` (the tap flow evaluator turns these into queue entries).
/// A terminal tank is credited after its deposit source restrictor, if any,
/// accepts the path; a terminal account is credited through the staged
/// balance adjustments after an asset-authorization check.
///
/// Returns the full path of sinks the asset flowed through, terminal
/// included.
pub fn release_to_sink<D: Database>(
  db: &mut CowDb<D>,
  origin: Sink,
  start: Sink,
  asset: AssetId,
  amount: Amount,
  mut on_tap_open: impl FnMut(TapId, FlowLimit),
) -> Result<Vec<Sink>, Error> {
  if matches!(origin, Sink::SameTank) {
    return Err(Error::Internal(
      "sink flow started from an origin of 'same tank'",
    ));
  }

  let max_chain = usize::from(db.parameters().max_sink_chain_length);
  let mut path: Vec<Sink> = Vec::new();
  let mut current_tank: Option<TankId> = match origin {
    Sink::Tank(id) => Some(id),
    _ => None,
  };

  let mut sink = start;
  while let Sink::Attachment(attachment_id) = sink {
    if path.len() >= max_chain {
      return Err(Error::ChainTooLong);
    }

    let tank_id = attachment_id
      .tank_id
      .or(current_tank)
      .ok_or(Error::Internal(
        "sink names an attachment with an implied tank outside the context \
         of any current tank",
      ))?;
    current_tank = Some(tank_id);
    path.push(Sink::Attachment(attachment_id.clone()));

    let tank = db.tank_mut(tank_id)?;
    let attachment = tank
      .schematic
      .attachments
      .get(&attachment_id.attachment_id)
      .cloned()
      .ok_or_else(|| Error::NoSuchAttachment(attachment_id.clone()))?;

    sink = match attachment {
      TankAttachment::FlowMeter(meter) => {
        if meter.asset_type != asset {
          return Err(Error::WrongAssetFlowed {
            expected: meter.asset_type,
            received: asset,
          });
        }
        tank
          .meter_state_mut(attachment_id.attachment_id)?
          .metered_amount += amount;
        trace!(?tank_id, meter = attachment_id.attachment_id, amount,
               "asset flowed through meter");
        meter.destination_sink
      }
      TankAttachment::TapOpener(opener) => {
        if opener.asset_type != asset {
          return Err(Error::WrongAssetFlowed {
            expected: opener.asset_type,
            received: asset,
          });
        }
        on_tap_open(
          TapId::new(tank_id, opener.tap_index),
          opener.release_amount,
        );
        opener.destination_sink
      }
      TankAttachment::SourceRestrictor(_)
      | TankAttachment::ConnectAuthority(_) => {
        return Err(Error::Internal(
          "asset flowed into an attachment which cannot receive it",
        ));
      }
    };
  }

  let sink = match sink {
    Sink::SameTank => Sink::Tank(current_tank.ok_or(Error::Internal(
      "flow terminates at 'same tank' outside the context of any current \
       tank",
    ))?),
    terminal => terminal,
  };
  path.push(sink.clone());

  match sink {
    Sink::Tank(tank_id) => {
      let destination = db.tank(tank_id)?;
      if destination.schematic.asset_type != asset {
        return Err(Error::WrongAssetFlowed {
          expected: destination.schematic.asset_type,
          received: asset,
        });
      }
      if let Some(restrictor_id) = destination.restrictor_id {
        let restrictor =
          match destination.schematic.attachments.get(&restrictor_id) {
            Some(TankAttachment::SourceRestrictor(restrictor)) => restrictor,
            _ => {
              return Err(Error::Internal(
                "restrictor cache points at a non-restrictor attachment",
              ))
            }
          };
        let deposit_path = DepositPath {
          origin: Some(origin),
          sink_chain: path.clone(),
        };
        if restrictor
          .matching_path(&deposit_path, Some(tank_id))
          .is_none()
        {
          return Err(Error::DepositPathRejected);
        }
      }
      db.tank_mut(tank_id)?.balance += amount;
      trace!(?tank_id, amount, "flow deposited into tank");
    }
    Sink::Account(account) => {
      if !db.is_authorized_asset(account, asset) {
        return Err(Error::UnauthorizedAccount { account, asset });
      }
      db.credit_account(account, asset, amount);
      trace!(?account, amount, "flow deposited into account");
    }
    _ => {
      return Err(Error::Internal(
        "sink chain terminated in a non-terminal sink",
      ))
    }
  }

  Ok(path)
}
