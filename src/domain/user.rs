use crate::error::RentalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External account identifier. Stable and unique, it is the user's key.
pub type UserId = u64;

const REFERRAL_PREFIX: char = 'R';
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A user's referral code.
///
/// Derived from the user id with a bijective encoding, so the same user
/// always gets the same code and no two users share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferralCode(String);

impl ReferralCode {
    pub fn issue(user: UserId) -> Self {
        let mut digits = Vec::new();
        let mut rest = user;
        loop {
            digits.push(BASE36[(rest % 36) as usize] as char);
            rest /= 36;
            if rest == 0 {
                break;
            }
        }
        let mut code = String::with_capacity(digits.len() + 1);
        code.push(REFERRAL_PREFIX);
        code.extend(digits.iter().rev());
        Self(code)
    }

    /// Normalizes user input (trimmed, upper-cased) for lookup.
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A phone number in international form: `+` then 7 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, RentalError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = compact
            .strip_prefix('+')
            .ok_or_else(|| RentalError::validation(format!("Phone '{raw}' must start with '+'")))?;
        if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(RentalError::validation(format!(
                "Phone '{raw}' must contain 7 to 15 digits"
            )));
        }
        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = RentalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, RentalError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(RentalError::validation(format!(
                "Coordinates ({lat}, {lon}) are out of range"
            )));
        }
        Ok(Self { lat, lon })
    }
}

/// Profile data collected by the front-end, filled in incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub location: Option<Coordinates>,
    /// Reference to an identity document (passport or national id number).
    pub identity_document: Option<String>,
}

/// Partial update of a [`Profile`]. Only these attributes are settable;
/// `None` leaves the stored value untouched and unknown keys are ignored
/// when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub location: Option<Coordinates>,
    pub identity_document: Option<String>,
}

impl ProfileUpdate {
    /// Builds an update from `key=value` pairs.
    ///
    /// Recognized keys: `first_name`, `last_name`, `phone`, `lat`, `lon`,
    /// `identity_document`. Anything else is skipped.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, RentalError> {
        let mut update = Self::default();
        let mut lat = None;
        let mut lon = None;
        for (key, value) in pairs {
            match key {
                "first_name" => update.first_name = Some(value.to_string()),
                "last_name" => update.last_name = Some(value.to_string()),
                "phone" => update.phone = Some(PhoneNumber::parse(value)?),
                "identity_document" => update.identity_document = Some(value.to_string()),
                "lat" => lat = Some(parse_degrees(key, value)?),
                "lon" => lon = Some(parse_degrees(key, value)?),
                _ => {}
            }
        }
        match (lat, lon) {
            (Some(lat), Some(lon)) => update.location = Some(Coordinates::new(lat, lon)?),
            (None, None) => {}
            _ => {
                return Err(RentalError::validation(
                    "Latitude and longitude must be given together",
                ));
            }
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_degrees(key: &str, value: &str) -> Result<f64, RentalError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RentalError::validation(format!("'{value}' is not a valid {key}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub is_partner: bool,
    pub profile: Profile,
    pub referral_code: ReferralCode,
    /// Set at most once, never to the user itself.
    pub referrer: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            is_partner: false,
            profile: Profile::default(),
            referral_code: ReferralCode::issue(id),
            referrer: None,
            created_at,
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate) {
        let ProfileUpdate {
            first_name,
            last_name,
            phone,
            location,
            identity_document,
        } = update;
        if first_name.is_some() {
            self.profile.first_name = first_name;
        }
        if last_name.is_some() {
            self.profile.last_name = last_name;
        }
        if phone.is_some() {
            self.profile.phone = phone;
        }
        if location.is_some() {
            self.profile.location = location;
        }
        if identity_document.is_some() {
            self.profile.identity_document = identity_document;
        }
    }

    /// Records `referrer` if none is set yet. Returns whether it was written.
    pub fn link_referrer(&mut self, referrer: UserId) -> bool {
        if self.referrer.is_some() || referrer == self.id {
            return false;
        }
        self.referrer = Some(referrer);
        true
    }

    pub fn display_name(&self) -> String {
        match (&self.profile.first_name, &self.profile.last_name) {
            (Some(first), Some(last)) if !last.is_empty() => format!("{first} {last}"),
            (Some(first), _) => first.clone(),
            _ => format!("user {}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_codes_are_deterministic_and_distinct() {
        assert_eq!(ReferralCode::issue(0).as_str(), "R0");
        assert_eq!(ReferralCode::issue(35).as_str(), "RZ");
        assert_eq!(ReferralCode::issue(36).as_str(), "R10");
        assert_eq!(ReferralCode::issue(2001), ReferralCode::issue(2001));

        let codes: std::collections::HashSet<_> =
            (0..5000u64).map(ReferralCode::issue).collect();
        assert_eq!(codes.len(), 5000);
    }

    #[test]
    fn test_referral_code_parse_normalizes() {
        let code = ReferralCode::issue(1001);
        let typed = format!("  {}  ", code.as_str().to_lowercase());
        assert_eq!(ReferralCode::parse(&typed), code);
    }

    #[test]
    fn test_phone_validation() {
        assert_eq!(
            PhoneNumber::parse("+998 90 123 45 67").unwrap().as_str(),
            "+998901234567"
        );
        assert!(PhoneNumber::parse("998901234567").is_err());
        assert!(PhoneNumber::parse("+99890abc").is_err());
        assert!(PhoneNumber::parse("+12").is_err());
    }

    #[test]
    fn test_profile_update_from_pairs_ignores_unknown_keys() {
        let update = ProfileUpdate::from_pairs([
            ("first_name", "Ali"),
            ("favourite_colour", "green"),
            ("lat", "41.3"),
            ("lon", "69.2"),
        ])
        .unwrap();
        assert_eq!(update.first_name.as_deref(), Some("Ali"));
        assert_eq!(update.location, Some(Coordinates { lat: 41.3, lon: 69.2 }));
        assert!(update.phone.is_none());
    }

    #[test]
    fn test_profile_update_rejects_malformed_values() {
        assert!(matches!(
            ProfileUpdate::from_pairs([("phone", "12345")]),
            Err(RentalError::ValidationError(_))
        ));
        assert!(ProfileUpdate::from_pairs([("lat", "41.3")]).is_err());
        assert!(ProfileUpdate::from_pairs([("lat", "91"), ("lon", "0")]).is_err());
    }

    #[test]
    fn test_profile_update_deserializes_with_unknown_fields() {
        let update: ProfileUpdate =
            serde_json::from_str(r#"{"last_name": "Karimov", "shoe_size": 42}"#).unwrap();
        assert_eq!(update.last_name.as_deref(), Some("Karimov"));

        let bad: Result<ProfileUpdate, _> = serde_json::from_str(r#"{"phone": "nope"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let mut user = User::new(7, Utc::now());
        user.apply(ProfileUpdate {
            first_name: Some("Ali".into()),
            ..Default::default()
        });
        user.apply(ProfileUpdate {
            identity_document: Some("AA1234567".into()),
            ..Default::default()
        });
        assert_eq!(user.profile.first_name.as_deref(), Some("Ali"));
        assert_eq!(user.profile.identity_document.as_deref(), Some("AA1234567"));
    }

    #[test]
    fn test_link_referrer_once_and_never_self() {
        let mut user = User::new(7, Utc::now());
        assert!(!user.link_referrer(7));
        assert!(user.referrer.is_none());
        assert!(user.link_referrer(3));
        assert!(!user.link_referrer(4));
        assert_eq!(user.referrer, Some(3));
    }
}
