use crate::domain::user::{Coordinates, PhoneNumber, ProfileUpdate};
use crate::error::{RentalError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupStep {
    Name,
    Phone,
    Location,
    Document,
}

/// The multi-step sign-up conversation. Answers accumulate into a
/// [`ProfileUpdate`] which is written in one go once the last step is done.
#[derive(Debug, Clone, PartialEq)]
pub struct SignupForm {
    step: SignupStep,
    answers: ProfileUpdate,
}

impl Default for SignupForm {
    fn default() -> Self {
        Self {
            step: SignupStep::Name,
            answers: ProfileUpdate::default(),
        }
    }
}

impl SignupForm {
    pub fn step(&self) -> SignupStep {
        self.step
    }

    pub fn prompt(&self) -> &'static str {
        match self.step {
            SignupStep::Name => "What is your name?",
            SignupStep::Phone => "Your phone number, e.g. +998 90 123 45 67:",
            SignupStep::Location => "Your location as '<latitude> <longitude>':",
            SignupStep::Document => "Your passport or ID number:",
        }
    }

    /// Applies the answer to the current step. A rejected answer leaves the
    /// form on the same step. Returns the collected profile once complete.
    pub fn answer(&mut self, text: &str) -> Result<Option<ProfileUpdate>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RentalError::validation("Answer must not be empty"));
        }
        match self.step {
            SignupStep::Name => {
                let (first, last) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
                self.answers.first_name = Some(first.to_string());
                self.answers.last_name = Some(last.trim().to_string());
                self.step = SignupStep::Phone;
            }
            SignupStep::Phone => {
                self.answers.phone = Some(PhoneNumber::parse(text)?);
                self.step = SignupStep::Location;
            }
            SignupStep::Location => {
                self.answers.location = Some(parse_location(text)?);
                self.step = SignupStep::Document;
            }
            SignupStep::Document => {
                self.answers.identity_document = Some(text.to_string());
                return Ok(Some(self.answers.clone()));
            }
        }
        Ok(None)
    }
}

fn parse_location(text: &str) -> Result<Coordinates> {
    let invalid =
        || RentalError::validation(format!("'{text}' is not a '<latitude> <longitude>' pair"));
    let mut parts = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let lat: f64 = lat.parse().map_err(|_| invalid())?;
    let lon: f64 = lon.parse().map_err(|_| invalid())?;
    Coordinates::new(lat, lon)
}
