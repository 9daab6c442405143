//! Local phone number type.
//!
//! Numbers are validated against a [`PhoneFormat`]: a fixed prefix and a total
//! digit count, e.g. Egyptian mobile numbers (`01` followed by nine digits).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains something other than digits and separators.
    #[error("phone number may only contain digits")]
    InvalidCharacter,
    /// The number does not start with the required prefix.
    #[error("phone number must start with {prefix}")]
    WrongPrefix {
        /// Required prefix.
        prefix: String,
    },
    /// The number has the wrong number of digits.
    #[error("phone number must have exactly {expected} digits")]
    WrongLength {
        /// Required digit count.
        expected: usize,
    },
}

/// Local numbering plan a phone number must follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneFormat {
    /// Digits every number starts with.
    pub prefix: String,
    /// Total number of digits, prefix included.
    pub digits: usize,
}

impl PhoneFormat {
    /// Create a numbering plan.
    #[must_use]
    pub fn new(prefix: impl Into<String>, digits: usize) -> Self {
        Self {
            prefix: prefix.into(),
            digits,
        }
    }
}

impl Default for PhoneFormat {
    /// Egyptian mobile numbers: `01XXXXXXXXX`.
    fn default() -> Self {
        Self::new("01", 11)
    }
}

/// A phone number in local format, stored as bare digits.
///
/// Spaces and hyphens are accepted as separators and stripped.
///
/// ```
/// use souq_core::{PhoneFormat, PhoneNumber};
///
/// let format = PhoneFormat::default();
/// assert!(PhoneNumber::parse("01012345678", &format).is_ok());
/// assert!(PhoneNumber::parse("010 1234 5678", &format).is_ok());
/// assert!(PhoneNumber::parse("0101234567", &format).is_err()); // too short
/// assert!(PhoneNumber::parse("02012345678", &format).is_err()); // wrong prefix
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse a phone number against a numbering plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains non-digit characters,
    /// lacks the plan's prefix, or has the wrong digit count.
    pub fn parse(s: &str, format: &PhoneFormat) -> Result<Self, PhoneError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PhoneError::Empty);
        }

        let digits: String = s.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PhoneError::InvalidCharacter);
        }

        if !digits.starts_with(&format.prefix) {
            return Err(PhoneError::WrongPrefix {
                prefix: format.prefix.clone(),
            });
        }

        if digits.len() != format.digits {
            return Err(PhoneError::WrongLength {
                expected: format.digits,
            });
        }

        Ok(Self(digits))
    }

    /// Returns the digits as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PhoneNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PhoneNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PhoneNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
