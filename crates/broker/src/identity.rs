//! Composite identity keys.
//!
//! Every credential record and every completed authorization flow is
//! addressed by exactly one `IdentityKey`: the authenticated operator plus
//! the delegated end-user, rendered as `operator::end_user`. The `::`
//! separator must stay unambiguous, so ids containing it (or empty ids) are
//! rejected at construction instead of being escaped.

use std::fmt;
use std::str::FromStr;

use crate::error::BrokerError;

/// Separator between the operator and end-user halves of a key.
const SEPARATOR: &str = "::";

/// Composite of operator id and end-user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    operator: String,
    end_user: String,
}

impl IdentityKey {
    /// Build a key from its two halves, validating both.
    ///
    /// # Errors
    /// Returns [`BrokerError::Unauthenticated`] when the operator id is
    /// empty (no verified identity was supplied), and
    /// [`BrokerError::InvalidIdentity`] when either half contains the
    /// separator or the end-user id is empty.
    pub fn new(
        operator: impl Into<String>,
        end_user: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let operator = operator.into();
        let end_user = end_user.into();

        if operator.is_empty() {
            return Err(BrokerError::Unauthenticated);
        }
        if end_user.is_empty() {
            return Err(BrokerError::InvalidIdentity("end-user id is empty".to_string()));
        }
        if operator.contains(SEPARATOR) || end_user.contains(SEPARATOR) {
            return Err(BrokerError::InvalidIdentity(format!(
                "ids must not contain '{SEPARATOR}'"
            )));
        }

        Ok(Self { operator, end_user })
    }

    /// The authenticated primary account driving the request.
    #[must_use]
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// The principal on whose behalf delegated access is requested.
    #[must_use]
    pub fn end_user(&self) -> &str {
        &self.end_user
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.operator, self.end_user)
    }
}

impl FromStr for IdentityKey {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (operator, end_user) = s.split_once(SEPARATOR).ok_or_else(|| {
            BrokerError::InvalidIdentity(format!("missing '{SEPARATOR}' separator in '{s}'"))
        })?;
        Self::new(operator, end_user)
    }
}
