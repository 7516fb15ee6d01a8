use std::fmt;
use thiserror::Error;

const MAX_DIGITS: usize = 15;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid phone number format")]
pub struct InvalidPhoneNumber;

/// A phone number in canonical E.164-like form: a `+` followed by 2 to 15 digits where the first
/// digit is not zero. Parsing drops whitespace and accepts the number with or without the `+`, so
/// both spellings of a number compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, InvalidPhoneNumber> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = compact.strip_prefix('+').unwrap_or(&compact);
        let valid = (2..=MAX_DIGITS).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');
        if valid {
            Ok(Self(format!("+{}", digits)))
        } else {
            Err(InvalidPhoneNumber)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds a phone number that was validated before being stored.
    pub(crate) fn from_trusted(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_numbers() {
        assert_eq!(
            PhoneNumber::parse("+996701234567").unwrap().as_str(),
            "+996701234567"
        );
        assert_eq!(PhoneNumber::parse("12").unwrap().as_str(), "+12");
        assert_eq!(
            PhoneNumber::parse("+996 701 234 567").unwrap().as_str(),
            "+996701234567"
        );
        assert!(PhoneNumber::parse("123456789012345").is_ok());
    }

    #[test]
    fn spellings_with_and_without_plus_are_the_same_number() {
        assert_eq!(
            PhoneNumber::parse("996701234567").unwrap(),
            PhoneNumber::parse("+996701234567").unwrap()
        );
        assert_eq!(
            PhoneNumber::parse("996 701 234 567").unwrap().to_string(),
            "+996701234567"
        );
    }

    #[test]
    fn rejects_invalid_numbers() {
        for raw in [
            "",
            "+",
            "1",
            "+0123456",
            "0123456",
            "1234567890123456",
            "+99670abc",
            "++996701234567",
            "996-701",
        ] {
            assert_eq!(PhoneNumber::parse(raw), Err(InvalidPhoneNumber), "{}", raw);
        }
    }
}
