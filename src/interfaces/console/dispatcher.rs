use super::command::Command;
use super::form::SignupForm;
use crate::application::{Attribution, FormSessions, ReferralService, Services};
use crate::domain::payout::PartnerBalance;
use crate::domain::ports::NotifierRef;
use crate::domain::rental::Rental;
use crate::domain::resource::Resource;
use crate::domain::user::{ProfileUpdate, UserId};
use crate::error::{RentalError, Result};
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Operator identities allowed to run admin commands.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList(HashSet<UserId>);

impl AdminAllowList {
    pub fn contains(&self, user: UserId) -> bool {
        self.0.contains(&user)
    }
}

impl FromIterator<UserId> for AdminAllowList {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Rendered by the caller, e.g. as CSV.
    Rentals(Vec<Rental>),
}

/// Routes commands from any sender to the services.
///
/// Holds no per-request state beyond the form sessions, so one `Console` can
/// be shared by every concurrent conversation.
#[derive(Clone)]
pub struct Console {
    services: Services,
    notifier: NotifierRef,
    admins: AdminAllowList,
    forms: FormSessions<SignupForm>,
}

impl Console {
    pub fn new(
        services: Services,
        notifier: NotifierRef,
        admins: AdminAllowList,
        forms: FormSessions<SignupForm>,
    ) -> Self {
        Self {
            services,
            notifier,
            admins,
            forms,
        }
    }

    /// Executes `command` on behalf of `sender`.
    ///
    /// Admin commands from senders outside the allow-list are dropped with
    /// `Ok(None)`.
    #[instrument(skip(self, command))]
    pub async fn handle(&self, sender: UserId, command: Command) -> Result<Option<Reply>> {
        if command.is_admin() && !self.admins.contains(sender) {
            warn!(?command, "Admin command from unauthorized sender ignored");
            return Ok(None);
        }
        let reply = match command {
            Command::ListRentals => {
                Reply::Rentals(self.services.reservations.list_rentals().await?)
            }
            Command::AssignBike { rental } => {
                let (rental, bike) = self.services.reservations.assign_primary(rental).await?;
                self.notify(
                    rental.user,
                    &format!(
                        "Bike {} ({}) is assigned to your rental #{}",
                        bike.name, bike.code, rental.id
                    ),
                )
                .await;
                Reply::Text(format!(
                    "Rental #{} assigned bike #{} ({})",
                    rental.id, bike.id, bike.code
                ))
            }
            Command::SetMain { bike } => {
                let bike = self.services.registry.set_primary(bike).await?;
                Reply::Text(format!("Bike #{} ({}) is now the main bike", bike.id, bike.code))
            }
            Command::ReleaseBike { bike } => {
                let bike = self.services.registry.release(bike).await?;
                Reply::Text(format!("Bike #{} ({}) is available", bike.id, bike.code))
            }
            Command::CloseRental { rental, hours } => {
                let rental = self.services.reservations.close_rental(rental, hours).await?;
                Reply::Text(format!("Rental #{} closed, fee {}", rental.id, rental.fee))
            }
            Command::PayPartner { partner, amount } => {
                self.services.directory.get_user(partner).await?;
                let payout = self.services.ledger.record_payout(partner, amount).await?;
                let balance = self.services.ledger.balance(partner).await?;
                self.notify(
                    partner,
                    &format!(
                        "A payout of {} was sent to you. Balance: {}",
                        payout.amount, balance.balance
                    ),
                )
                .await;
                Reply::Text(format!(
                    "Paid {} to partner {partner}. {}",
                    payout.amount,
                    describe_balance(&balance)
                ))
            }
            Command::PartnerEarnings { partner } => {
                let earnings = self.services.ledger.partner_earnings(partner).await?;
                Reply::Text(format!(
                    "Partner {partner} earned {} over {} rentals",
                    earnings.total,
                    earnings.rentals.len()
                ))
            }

            Command::Start { referral } => {
                let user = self.services.directory.get_or_create_user(sender).await?;
                let mut text = format!(
                    "Welcome, {}! Your referral code is {}.",
                    user.display_name(),
                    ReferralService::issue_code(&user)
                );
                if let Some(code) = referral
                    && let Attribution::Linked { referrer } =
                        self.services.referrals.attribute(sender, &code).await?
                {
                    text.push_str(&format!(" You were invited by user {referrer}."));
                }
                text.push_str(" Send /signup to rent a bike.");
                Reply::Text(text)
            }
            Command::Signup => {
                self.services.directory.get_or_create_user(sender).await?;
                let form = SignupForm::default();
                let prompt = form.prompt();
                self.forms.put(sender, form).await?;
                Reply::Text(prompt.to_string())
            }
            Command::Answer(text) => return self.answer(sender, &text).await,
            Command::Profile(update) => {
                if update.is_empty() {
                    return Err(RentalError::validation("Nothing to update"));
                }
                self.services.directory.get_or_create_user(sender).await?;
                let user = self.services.directory.update_profile(sender, update).await?;
                Reply::Text(format!("Profile of {} updated", user.display_name()))
            }
            Command::Partner => {
                self.services.directory.register_partner(sender).await?;
                Reply::Text("You are now a partner. Add bikes with /add_bike <rate> <name>".into())
            }
            Command::AddBike(draft) => {
                let bike = self.services.registry.register(draft.owned_by(sender)).await?;
                Reply::Text(format!("Bike #{} registered with code {}", bike.id, bike.code))
            }
            Command::Bikes => {
                let bikes = self.services.registry.list_available().await?;
                if bikes.is_empty() {
                    Reply::Text("No bikes available".into())
                } else {
                    Reply::Text(bikes.iter().map(describe_bike).collect::<Vec<_>>().join("\n"))
                }
            }
            Command::Rent => {
                self.services.directory.get_or_create_user(sender).await?;
                let (rental, bike) = self.services.reservations.rent_primary(sender).await?;
                Reply::Text(rented(&rental, &bike))
            }
            Command::RentBike { bike } => {
                self.services.directory.get_or_create_user(sender).await?;
                let bike = self.services.registry.get(bike).await?;
                let rental = self.services.reservations.create_rental(sender, bike.id).await?;
                Reply::Text(rented(&rental, &bike))
            }
            Command::MyEarnings => {
                let earnings = self.services.ledger.partner_earnings(sender).await?;
                let payouts = self.services.ledger.partner_payouts(sender).await?;
                let balance = PartnerBalance::new(earnings.total, &payouts)?;
                Reply::Text(format!(
                    "{} rentals, {} payouts. {}",
                    earnings.rentals.len(),
                    payouts.len(),
                    describe_balance(&balance)
                ))
            }
            Command::MyReferrals => {
                let count = self.services.referrals.count_referrals(sender).await?;
                Reply::Text(format!("You invited {count} users"))
            }
        };
        Ok(Some(reply))
    }

    /// Advances the sender's sign-up form. On completion the profile is saved
    /// and the main bike rented, or a request queued if it is not free.
    async fn answer(&self, sender: UserId, text: &str) -> Result<Option<Reply>> {
        let Some(mut form) = self.forms.get(sender).await? else {
            debug!("Free text without an open form");
            return Ok(Some(Reply::Text("Unknown command. Send /start to begin.".into())));
        };
        let Some(profile) = form.answer(text)? else {
            let prompt = form.prompt();
            self.forms.put(sender, form).await?;
            return Ok(Some(Reply::Text(prompt.to_string())));
        };
        self.forms.finish(sender).await?;
        self.complete_signup(sender, profile).await.map(Some)
    }

    async fn complete_signup(&self, sender: UserId, profile: ProfileUpdate) -> Result<Reply> {
        self.services.directory.get_or_create_user(sender).await?;
        self.services.directory.update_profile(sender, profile).await?;
        match self.services.reservations.rent_primary(sender).await {
            Ok((rental, bike)) => Ok(Reply::Text(rented(&rental, &bike))),
            Err(RentalError::NotFound(_) | RentalError::Conflict(_)) => {
                let rental = self.services.reservations.request_rental(sender).await?;
                Ok(Reply::Text(format!(
                    "Thanks! No bike is free right now, request #{} is queued",
                    rental.id
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn notify(&self, recipient: UserId, message: &str) {
        if let Err(e) = self.notifier.notify(recipient, message).await {
            warn!(recipient, error = %e, "Notification failed");
        }
    }
}

fn rented(rental: &Rental, bike: &Resource) -> String {
    format!("Rental #{} started on bike {} ({})", rental.id, bike.name, bike.code)
}

fn describe_bike(bike: &Resource) -> String {
    match bike.hourly_rate {
        Some(rate) => format!(
            "#{} {} {} {}/h",
            bike.id,
            bike.code,
            bike.name,
            rate.value().normalize()
        ),
        None => format!("#{} {} {}", bike.id, bike.code, bike.name),
    }
}

fn describe_balance(balance: &PartnerBalance) -> String {
    format!(
        "Earned {}, paid {}, balance {}",
        balance.earned, balance.paid, balance.balance
    )
}
