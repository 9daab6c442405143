//! Checkout form validation.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use souq_core::{Email, PaymentMethod, PhoneFormat, PhoneNumber};

use crate::models::ShippingDestination;
use crate::pricing::ShippingRateTable;
use crate::services::auth::MIN_PASSWORD_LENGTH;

/// Buyer and delivery details as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutForm {
    /// Recipient name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone in the local numbering format.
    pub phone: String,
    /// Street address.
    pub address: String,
    /// City.
    pub city: String,
    /// Shipping region.
    pub region: String,
    /// Payment method.
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Optional password for guests who want to sign in later.
    #[serde(default)]
    pub password: Option<String>,
}

/// Form field a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Email,
    Phone,
    Address,
    City,
    Region,
    Password,
}

impl Field {
    /// Field name as used in forms.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::City => "city",
            Self::Region => "region",
            Self::Password => "password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field the buyer has to correct.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Offending field.
    pub field: Field,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// How many problems a failed validation reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Stop at the first bad field, in form order.
    #[default]
    FirstFailure,
    /// Report every bad field.
    Aggregate,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_failure" => Ok(Self::FirstFailure),
            "aggregate" => Ok(Self::Aggregate),
            _ => Err(format!("unknown validation mode: {s}")),
        }
    }
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    /// Recipient name, trimmed.
    pub name: String,
    /// Contact email.
    pub email: Email,
    /// Contact phone.
    pub phone: PhoneNumber,
    /// Delivery address, trimmed.
    pub destination: ShippingDestination,
    /// Payment method.
    pub payment_method: PaymentMethod,
    /// Password, if the buyer entered one.
    pub password: Option<String>,
}

fn required(field: Field, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    Ok(value.to_owned())
}

/// Validate a checkout form.
///
/// Fields are checked in form order: name, email, phone, address, city,
/// region, then the optional password. The region must be one the rate table
/// delivers to and is stored with the table's spelling. A blank password
/// counts as no password.
///
/// # Errors
///
/// Returns the bad fields: only the first one in
/// [`ValidationMode::FirstFailure`], all of them in
/// [`ValidationMode::Aggregate`]. Never returns an empty list.
pub fn validate(
    form: &CheckoutForm,
    phone_format: &PhoneFormat,
    rates: &ShippingRateTable,
    mode: ValidationMode,
) -> Result<ValidatedCheckout, Vec<ValidationError>> {
    let name = required(Field::Name, &form.name);
    let email = Email::parse(&form.email)
        .map_err(|e| ValidationError::new(Field::Email, e.to_string()));
    let phone = PhoneNumber::parse(&form.phone, phone_format)
        .map_err(|e| ValidationError::new(Field::Phone, e.to_string()));
    let address = required(Field::Address, &form.address);
    let city = required(Field::City, &form.city);
    let region = required(Field::Region, &form.region).and_then(|region| {
        rates
            .resolve(&region)
            .map(|(name, _)| name.to_owned())
            .ok_or_else(|| {
                ValidationError::new(Field::Region, format!("we do not deliver to {region}"))
            })
    });
    let password = match form.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) if password.chars().count() < MIN_PASSWORD_LENGTH => Err(
            ValidationError::new(
                Field::Password,
                format!("password must be at least {MIN_PASSWORD_LENGTH} characters"),
            ),
        ),
        other => Ok(other.map(str::to_owned)),
    };

    match (name, email, phone, address, city, region, password) {
        (Ok(name), Ok(email), Ok(phone), Ok(address), Ok(city), Ok(region), Ok(password)) => {
            Ok(ValidatedCheckout {
                name,
                email,
                phone,
                destination: ShippingDestination {
                    region,
                    city,
                    address,
                },
                payment_method: form.payment_method,
                password,
            })
        }
        (name, email, phone, address, city, region, password) => {
            let mut errors: Vec<ValidationError> = [
                name.err(),
                email.err(),
                phone.err(),
                address.err(),
                city.err(),
                region.err(),
                password.err(),
            ]
            .into_iter()
            .flatten()
            .collect();
            if mode == ValidationMode::FirstFailure {
                errors.truncate(1);
            }
            Err(errors)
        }
    }
}
