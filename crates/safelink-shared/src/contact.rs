use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CONTACT_NAME_LEN, MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};
use crate::types::{now_utc, ContactId, UserId};
use crate::validation::{ValidationErrors, Validator};

/// A person a user wants notified when they trigger an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedContact {
    pub id: ContactId,
    pub user_id: UserId,
    pub name: String,
    pub phone_number: Option<String>,
    pub relationship: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Order contacts for fan-out: the primary contact first, everyone else in
/// their stored order.
pub fn primary_first(contacts: &mut [TrustedContact]) {
    // stable sort keeps insertion order among non-primary contacts
    contacts.sort_by_key(|c| !c.is_primary);
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    #[serde(skip)]
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

impl NewContact {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.chars_between("name", &self.name, 1, MAX_CONTACT_NAME_LEN);
        if let Some(phone) = &self.phone_number {
            v.check(
                is_valid_phone_number(phone),
                "phoneNumber",
                format!("must contain {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"),
            );
        }
        v.finish()
    }

    pub fn build(self) -> Result<TrustedContact, ValidationErrors> {
        self.validate()?;
        Ok(TrustedContact {
            id: ContactId::new(),
            user_id: self.user_id,
            name: self.name.trim().to_string(),
            phone_number: self.phone_number.map(|p| p.trim().to_string()),
            relationship: self.relationship.filter(|r| !r.trim().is_empty()),
            is_primary: self.is_primary,
            created_at: now_utc(),
        })
    }
}

/// Spaces, dashes and a leading plus are tolerated; what remains must be
/// 8 to 15 digits.
pub fn is_valid_phone_number(phone: &str) -> bool {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+'))
        .collect();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
}
