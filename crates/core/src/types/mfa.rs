//! Second-factor verification code.

use core::fmt;

/// Errors that can occur when parsing a [`SecondFactorCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SecondFactorCodeError {
    /// The input is not exactly six characters long.
    #[error("code must be exactly {expected} digits (got {actual})")]
    WrongLength {
        /// Required length.
        expected: usize,
        /// Length of the input.
        actual: usize,
    },
    /// The input contains something other than ASCII digits.
    #[error("code must contain only ASCII digits")]
    NonDigit,
}

/// A six-digit one-time code.
///
/// ## Examples
///
/// ```
/// use matricula_core::SecondFactorCode;
///
/// assert!(SecondFactorCode::parse("042917").is_ok());
/// assert!(SecondFactorCode::parse("42917").is_err());   // too short
/// assert!(SecondFactorCode::parse("04291a").is_err());  // not a digit
/// assert!(SecondFactorCode::parse("٠٤٢٩١٧").is_err());  // non-ASCII digits
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SecondFactorCode(String);

impl SecondFactorCode {
    /// Number of digits in a code.
    pub const LENGTH: usize = 6;

    /// Parse a code.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, SecondFactorCodeError> {
        let actual = s.chars().count();
        if actual != Self::LENGTH {
            return Err(SecondFactorCodeError::WrongLength {
                expected: Self::LENGTH,
                actual,
            });
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SecondFactorCodeError::NonDigit);
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecondFactorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecondFactorCode(******)")
    }
}

impl std::str::FromStr for SecondFactorCode {
    type Err = SecondFactorCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
