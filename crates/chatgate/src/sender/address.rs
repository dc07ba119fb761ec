//! Recipient addressing.

use std::fmt;

use super::error::ValidationError;

/// Separator between the local part and the domain of an address.
pub const ADDRESS_SEPARATOR: char = '@';

/// A validated, fully-qualified recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient(String);

impl Recipient {
    /// Normalize a caller-supplied number into a protocol address.
    ///
    /// Bare identifiers get `@{default_domain}` appended; input that already
    /// carries a separator is kept as is. The local part must be digits only
    /// and exactly one separator is allowed.
    pub fn parse(input: &str, default_domain: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let address = if input.contains(ADDRESS_SEPARATOR) {
            input.to_string()
        } else {
            format!("{}{}{}", input, ADDRESS_SEPARATOR, default_domain)
        };

        let (local, domain) = address
            .split_once(ADDRESS_SEPARATOR)
            .ok_or_else(|| ValidationError::InvalidRecipient(address.clone()))?;

        let valid_local = !local.is_empty() && local.chars().all(|c| c.is_ascii_digit());
        let valid_domain = !domain.is_empty() && !domain.contains(ADDRESS_SEPARATOR);
        if !valid_local || !valid_domain {
            return Err(ValidationError::InvalidRecipient(address));
        }

        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
