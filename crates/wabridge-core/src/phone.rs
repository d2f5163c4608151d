//! Destination phone-number normalization.
//!
//! Everything except digits and `+` is stripped, the result must start with
//! `+`, and at least [`PhoneNumber::MIN_DIGITS`] digits must follow it.

use std::fmt;
use thiserror::Error;

/// Server suffix for personal chats.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Why a destination was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("Phone number must start with +")]
    MissingPlus,

    #[error("Phone number is too short ({digits} digits, need at least {min})", min = PhoneNumber::MIN_DIGITS)]
    TooShort { digits: usize },
}

/// A validated international phone number, stored as bare digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber {
    digits: String,
}

impl PhoneNumber {
    /// Minimum digit count after the leading `+`.
    pub const MIN_DIGITS: usize = 10;

    /// Normalize and validate a user-supplied destination.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();

        let rest = cleaned.strip_prefix('+').ok_or(PhoneError::MissingPlus)?;

        // Only the leading `+` is meaningful; stray ones further in are dropped.
        let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < Self::MIN_DIGITS {
            return Err(PhoneError::TooShort {
                digits: digits.len(),
            });
        }

        Ok(Self { digits })
    }

    /// Digits without the `+`.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Recipient JID (`<digits>@s.whatsapp.net`).
    pub fn jid(&self) -> String {
        format!("{}@{USER_SERVER}", self.digits)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}", self.digits)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
