use crate::domain::money::{Amount, HourlyRate, Hours};
use crate::domain::rental::RentalId;
use crate::domain::resource::{NewResource, ResourceId};
use crate::domain::user::{ProfileUpdate, ReferralCode, UserId};
use crate::error::{RentalError, Result};
use std::str::FromStr;

/// A parsed console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ListRentals,
    AssignBike { rental: RentalId },
    SetMain { bike: ResourceId },
    ReleaseBike { bike: ResourceId },
    CloseRental { rental: RentalId, hours: Hours },
    PayPartner { partner: UserId, amount: Amount },
    PartnerEarnings { partner: UserId },

    Start { referral: Option<ReferralCode> },
    Signup,
    Profile(ProfileUpdate),
    Partner,
    /// `owner` is filled in from the sender by the dispatcher.
    AddBike(NewResource),
    Bikes,
    Rent,
    RentBike { bike: ResourceId },
    MyEarnings,
    MyReferrals,
    /// Free text, read as the answer to the sender's open form step.
    Answer(String),
}

impl Command {
    /// Commands reserved to allow-listed operators.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::ListRentals
                | Self::AssignBike { .. }
                | Self::SetMain { .. }
                | Self::ReleaseBike { .. }
                | Self::CloseRental { .. }
                | Self::PayPartner { .. }
                | Self::PartnerEarnings { .. }
        )
    }
}

impl FromStr for Command {
    type Err = RentalError;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return Ok(Self::Answer(text.to_string()));
        }
        let mut words = text.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let command = match name {
            "/list_rentals" => Self::ListRentals,
            "/assign_bike" => Self::AssignBike {
                rental: id_arg(&args, 0, "rental id")?,
            },
            "/set_main" => Self::SetMain {
                bike: id_arg(&args, 0, "bike id")?,
            },
            "/release_bike" => Self::ReleaseBike {
                bike: id_arg(&args, 0, "bike id")?,
            },
            "/close_rental" => Self::CloseRental {
                rental: id_arg(&args, 0, "rental id")?,
                hours: arg(&args, 1, "hours")?.parse()?,
            },
            "/pay_partner" => Self::PayPartner {
                partner: id_arg(&args, 0, "partner id")?,
                amount: arg(&args, 1, "amount")?.parse()?,
            },
            "/partner_earnings" => Self::PartnerEarnings {
                partner: id_arg(&args, 0, "partner id")?,
            },
            "/start" => Self::Start {
                referral: args.first().map(|code| ReferralCode::parse(code)),
            },
            "/signup" => Self::Signup,
            "/profile" => Self::Profile(ProfileUpdate::from_pairs(
                args.iter().filter_map(|pair| pair.split_once('=')),
            )?),
            "/partner" => Self::Partner,
            "/add_bike" => Self::AddBike(bike_draft(&args)?),
            "/bikes" => Self::Bikes,
            "/rent" => Self::Rent,
            "/rent_bike" => Self::RentBike {
                bike: id_arg(&args, 0, "bike id")?,
            },
            "/my_earnings" => Self::MyEarnings,
            "/my_referrals" => Self::MyReferrals,
            other => {
                return Err(RentalError::validation(format!("Unknown command {other}")));
            }
        };
        Ok(command)
    }
}

fn arg<'a>(args: &[&'a str], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| RentalError::validation(format!("Missing {what}")))
}

fn id_arg(args: &[&str], index: usize, what: &str) -> Result<u64> {
    let raw = arg(args, index, what)?;
    raw.parse()
        .map_err(|_| RentalError::validation(format!("'{raw}' is not a valid {what}")))
}

/// `/add_bike <rate> <name…> [code=<code>] [image=<handle>]`
fn bike_draft(args: &[&str]) -> Result<NewResource> {
    let rate: HourlyRate = arg(args, 0, "hourly rate")?.parse()?;
    let mut draft = NewResource::default().with_rate(rate);
    let mut name = Vec::new();
    for word in args.iter().skip(1) {
        match word.split_once('=') {
            Some(("code", code)) => draft.code = Some(code.to_string()),
            Some(("image", image)) => draft.image = Some(image.to_string()),
            _ => name.push(*word),
        }
    }
    draft.name = name.join(" ");
    draft.validate()?;
    Ok(draft)
}
