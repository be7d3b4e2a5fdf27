use super::money::HourlyRate;
use super::user::UserId;
use crate::error::RentalError;
use serde::{Deserialize, Serialize};

pub type ResourceId = u64;

/// A rentable bicycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    /// Unset means the bike is rented out for free.
    pub hourly_rate: Option<HourlyRate>,
    pub owner: Option<UserId>,
    /// False while the bike is attached to a rental.
    pub available: bool,
    /// Human-presentable code, unique across the registry.
    pub code: String,
    /// Opaque storage-provider handle of the bike's photo.
    pub image: Option<String>,
    /// At most one resource carries this flag at any time.
    pub primary: bool,
}

impl Resource {
    pub fn new(id: ResourceId, draft: NewResource) -> Self {
        let NewResource {
            name,
            hourly_rate,
            owner,
            image,
            code,
        } = draft;
        Self {
            id,
            name,
            hourly_rate,
            owner,
            available: true,
            code: code.unwrap_or_else(|| default_code(id)),
            image,
            primary: false,
        }
    }

    /// Marks the resource taken.
    ///
    /// Only call this while holding exclusive access to the resource for the
    /// whole check-and-flip, and in the same atomic unit that writes the
    /// rental. A plain read followed by this call lets two renters win.
    pub fn claim(&mut self) -> Result<(), RentalError> {
        if !self.available {
            return Err(RentalError::conflict(format!(
                "Bike {} is not available",
                self.id
            )));
        }
        self.available = false;
        Ok(())
    }

    pub fn release(&mut self) {
        self.available = true;
    }
}

pub fn default_code(id: ResourceId) -> String {
    format!("B{id}")
}

/// Registration data for a resource; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewResource {
    pub name: String,
    pub hourly_rate: Option<HourlyRate>,
    pub owner: Option<UserId>,
    pub image: Option<String>,
    pub code: Option<String>,
}

impl NewResource {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_rate(mut self, rate: HourlyRate) -> Self {
        self.hourly_rate = Some(rate);
        self
    }

    pub fn owned_by(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn validate(&self) -> Result<(), RentalError> {
        if self.name.trim().is_empty() {
            return Err(RentalError::validation("Bike name must not be empty"));
        }
        if matches!(&self.code, Some(code) if code.trim().is_empty()) {
            return Err(RentalError::validation("Bike code must not be empty"));
        }
        Ok(())
    }
}
