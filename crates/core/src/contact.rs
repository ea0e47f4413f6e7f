//! Validation of contact and postal-address form input.
//!
//! Checkout and the address book both collect a postal address. Raw form
//! input is validated into [`PostalAddress`] / [`ShippingDetails`]; every
//! problem is collected into [`FieldErrors`] so the form can be re-shown with
//! all messages at once.

use serde::{Deserialize, Serialize};

use crate::Email;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Form field name (matches the HTML input name).
    pub field: &'static str,
    /// Message shown next to the form.
    pub message: String,
}

/// All validation failures for one submitted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// No errors yet.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Record an error against a field.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first message recorded for `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// Iterate over every recorded error in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    fn into_result<T>(self, value: Option<T>) -> Result<T, Self> {
        match value {
            Some(value) if self.is_empty() => Ok(value),
            _ => Err(self),
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for error in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

/// A validated postal address with contact name and phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    /// Empty when not given.
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// Everything snapshotted onto an order at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub address: PostalAddress,
    pub email: Email,
    /// Free-text delivery notes from the customer; empty when not given.
    pub customer_notes: String,
}

/// Raw postal-address form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostalAddressInput {
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// Raw checkout form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingDetailsInput {
    pub address: PostalAddressInput,
    pub email: String,
    pub customer_notes: String,
}

/// Field limits, mirroring the column widths in the storefront schema.
mod limits {
    pub const FULL_NAME: usize = 200;
    pub const PHONE: usize = 20;
    pub const ADDRESS_LINE: usize = 250;
    pub const CITY: usize = 100;
    pub const STATE: usize = 100;
    pub const POSTAL_CODE: usize = 20;
    pub const COUNTRY: usize = 100;
}

fn required(
    errors: &mut FieldErrors,
    field: &'static str,
    label: &str,
    value: &str,
    max: usize,
) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.push(field, format!("{label} is required."));
    } else if value.chars().count() > max {
        errors.push(field, format!("{label} must be at most {max} characters."));
    }
    value.to_owned()
}

fn optional(
    errors: &mut FieldErrors,
    field: &'static str,
    label: &str,
    value: &str,
    max: usize,
) -> String {
    let value = value.trim();
    if value.chars().count() > max {
        errors.push(field, format!("{label} must be at most {max} characters."));
    }
    value.to_owned()
}

impl PostalAddressInput {
    fn collect(&self, errors: &mut FieldErrors) -> PostalAddress {
        PostalAddress {
            full_name: required(
                errors,
                "full_name",
                "Full Name",
                &self.full_name,
                limits::FULL_NAME,
            ),
            phone: required(errors, "phone", "Phone Number", &self.phone, limits::PHONE),
            address_line_1: required(
                errors,
                "address_line_1",
                "Address Line 1",
                &self.address_line_1,
                limits::ADDRESS_LINE,
            ),
            address_line_2: optional(
                errors,
                "address_line_2",
                "Address Line 2",
                &self.address_line_2,
                limits::ADDRESS_LINE,
            ),
            city: required(errors, "city", "City", &self.city, limits::CITY),
            state: required(
                errors,
                "state",
                "State / Province",
                &self.state,
                limits::STATE,
            ),
            postal_code: required(
                errors,
                "postal_code",
                "Postal / ZIP Code",
                &self.postal_code,
                limits::POSTAL_CODE,
            ),
            country: required(errors, "country", "Country", &self.country, limits::COUNTRY),
        }
    }

    /// Validate into a [`PostalAddress`].
    ///
    /// # Errors
    ///
    /// Returns every field that is missing or too long.
    pub fn validate(&self) -> Result<PostalAddress, FieldErrors> {
        let mut errors = FieldErrors::new();
        let address = self.collect(&mut errors);
        errors.into_result(Some(address))
    }
}

impl From<&PostalAddress> for PostalAddressInput {
    fn from(address: &PostalAddress) -> Self {
        Self {
            full_name: address.full_name.clone(),
            phone: address.phone.clone(),
            address_line_1: address.address_line_1.clone(),
            address_line_2: address.address_line_2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

impl ShippingDetailsInput {
    /// Validate into [`ShippingDetails`].
    ///
    /// # Errors
    ///
    /// Returns every invalid field, including a malformed email address.
    pub fn validate(&self) -> Result<ShippingDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        let address = self.address.collect(&mut errors);

        let email = match Email::parse(&self.email) {
            Ok(email) => Some(email),
            Err(e) => {
                errors.push("email", format!("Email Address: {e}."));
                None
            }
        };

        let details = email.map(|email| ShippingDetails {
            address,
            email,
            customer_notes: self.customer_notes.trim().to_owned(),
        });

        errors.into_result(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_address() -> PostalAddressInput {
        PostalAddressInput {
            full_name: "Jo Bloggs".to_owned(),
            phone: "+44 20 7946 0000".to_owned(),
            address_line_1: "1 High Street".to_owned(),
            address_line_2: String::new(),
            city: "London".to_owned(),
            state: "Greater London".to_owned(),
            postal_code: "N1 9GU".to_owned(),
            country: "UK".to_owned(),
        }
    }

    #[test]
    fn test_valid_details() {
        let input = ShippingDetailsInput {
            address: valid_address(),
            email: " jo@example.com ".to_owned(),
            customer_notes: "  leave with neighbour ".to_owned(),
        };

        let details = input.validate().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(details.email.as_str(), "jo@example.com");
        assert_eq!(details.customer_notes, "leave with neighbour");
        assert_eq!(details.address.address_line_2, "");
    }

    #[test]
    fn test_collects_every_error() {
        let input = ShippingDetailsInput {
            address: PostalAddressInput {
                city: "x".repeat(101),
                ..PostalAddressInput::default()
            },
            email: "nope".to_owned(),
            customer_notes: String::new(),
        };

        let errors = input.validate().err().unwrap_or_default();
        for field in [
            "full_name",
            "phone",
            "address_line_1",
            "city",
            "state",
            "postal_code",
            "country",
            "email",
        ] {
            assert!(errors.get(field).is_some(), "expected an error for {field}");
        }
        assert!(errors.get("address_line_2").is_none());
        assert_eq!(
            errors.get("city"),
            Some("City must be at most 100 characters.")
        );
    }

    #[test]
    fn test_whitespace_only_is_missing() {
        let input = PostalAddressInput {
            full_name: "   ".to_owned(),
            ..valid_address()
        };
        let errors = input.validate().err().unwrap_or_default();
        assert_eq!(errors.get("full_name"), Some("Full Name is required."));
    }
}
