use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IdentifierError;

/// Top-level identifier namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityFamily {
    Account,
    Card,
    Customer,
}

impl EntityFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityFamily::Account => "account",
            EntityFamily::Card => "card",
            EntityFamily::Customer => "customer",
        }
    }

    /// Digits of the zero-padded counter field, `None` when unbounded.
    pub fn counter_width(&self) -> Option<usize> {
        match self {
            EntityFamily::Account => Some(18),
            EntityFamily::Card => Some(12),
            EntityFamily::Customer => None,
        }
    }

    /// Largest counter that still fits the family's field.
    pub fn max_counter(&self) -> u64 {
        match self.counter_width() {
            Some(width) => 10u64.pow(width as u32) - 1,
            None => u64::MAX,
        }
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityFamily {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "account" => Ok(EntityFamily::Account),
            "card" => Ok(EntityFamily::Card),
            "customer" => Ok(EntityFamily::Customer),
            _ => Err(IdentifierError::MalformedIdentifier(format!(
                "unknown entity family `{}`",
                s
            ))),
        }
    }
}

/// Sub-classification within a family. Each code determines a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    Savings,
    Current,
    /// Legacy account type, only present in early account schemes.
    CashCredit,
    Debit,
    Credit,
    /// Legacy card type.
    Atm,
    /// Legacy card type.
    Prepaid,
}

impl TypeCode {
    pub const ALL: [TypeCode; 7] = [
        TypeCode::Savings,
        TypeCode::Current,
        TypeCode::CashCredit,
        TypeCode::Debit,
        TypeCode::Credit,
        TypeCode::Atm,
        TypeCode::Prepaid,
    ];

    pub fn family(&self) -> EntityFamily {
        match self {
            TypeCode::Savings | TypeCode::Current | TypeCode::CashCredit => EntityFamily::Account,
            TypeCode::Debit | TypeCode::Credit | TypeCode::Atm | TypeCode::Prepaid => {
                EntityFamily::Card
            }
        }
    }

    /// Canonical two-letter code.
    pub fn code(&self) -> &'static str {
        match self {
            TypeCode::Savings => "SB",
            TypeCode::Current => "CA",
            TypeCode::CashCredit => "CC",
            TypeCode::Debit => "DC",
            TypeCode::Credit => "CC",
            TypeCode::Atm => "AC",
            TypeCode::Prepaid => "PP",
        }
    }

    /// Leading characters of every identifier of this type.
    pub fn prefix(&self) -> &'static str {
        match self {
            TypeCode::Savings => "SB",
            TypeCode::Current => "CA",
            TypeCode::CashCredit => "CC",
            TypeCode::Debit => "1231",
            TypeCode::Credit => "1232",
            TypeCode::Atm => "1233",
            TypeCode::Prepaid => "1234",
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, TypeCode::CashCredit | TypeCode::Atm | TypeCode::Prepaid)
    }

    /// Resolves a code string within `family`. `DR` and `CR` are accepted as
    /// older spellings of the debit and credit card codes.
    pub fn from_code(family: EntityFamily, code: &str) -> Result<TypeCode, IdentifierError> {
        let normalized = code.trim().to_ascii_uppercase();
        let type_code = match (family, normalized.as_str()) {
            (EntityFamily::Account, "SB") => Some(TypeCode::Savings),
            (EntityFamily::Account, "CA") => Some(TypeCode::Current),
            (EntityFamily::Account, "CC") => Some(TypeCode::CashCredit),
            (EntityFamily::Card, "DC" | "DR") => Some(TypeCode::Debit),
            (EntityFamily::Card, "CC" | "CR") => Some(TypeCode::Credit),
            (EntityFamily::Card, "AC") => Some(TypeCode::Atm),
            (EntityFamily::Card, "PP") => Some(TypeCode::Prepaid),
            _ => None,
        };
        type_code.ok_or_else(|| IdentifierError::InvalidTypeCode {
            family,
            type_code: code.to_string(),
        })
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The unit of counter isolation: one independent counter per key.
///
/// Outside the crate a key can only be built from a [`TypeCode`] or as the
/// customer key, so its family always matches its type code. Whether a
/// legacy code is enabled is checked by
/// [`IdentifierFormat::validate`](crate::identifier_format::IdentifierFormat::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    family: EntityFamily,
    type_code: Option<TypeCode>,
}

impl SequenceKey {
    pub(crate) fn new(family: EntityFamily, type_code: Option<TypeCode>) -> Self {
        SequenceKey { family, type_code }
    }

    pub fn typed(type_code: TypeCode) -> Self {
        SequenceKey::new(type_code.family(), Some(type_code))
    }

    pub fn customer() -> Self {
        SequenceKey::new(EntityFamily::Customer, None)
    }

    pub fn family(&self) -> EntityFamily {
        self.family
    }

    pub fn type_code(&self) -> Option<TypeCode> {
        self.type_code
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_code {
            Some(type_code) => write!(f, "{}:{}", self.family, type_code.code()),
            None => write!(f, "{}", self.family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_is_scoped_to_family() {
        assert_eq!(
            TypeCode::from_code(EntityFamily::Account, "CC").unwrap(),
            TypeCode::CashCredit
        );
        assert_eq!(
            TypeCode::from_code(EntityFamily::Card, "CC").unwrap(),
            TypeCode::Credit
        );
        assert!(matches!(
            TypeCode::from_code(EntityFamily::Card, "SB"),
            Err(IdentifierError::InvalidTypeCode { .. })
        ));
        assert!(TypeCode::from_code(EntityFamily::Customer, "SB").is_err());
    }

    #[test]
    fn test_from_code_accepts_older_card_spellings() {
        assert_eq!(TypeCode::from_code(EntityFamily::Card, "DR").unwrap(), TypeCode::Debit);
        assert_eq!(TypeCode::from_code(EntityFamily::Card, "cr").unwrap(), TypeCode::Credit);
        assert_eq!(TypeCode::Debit.code(), "DC");
    }

    #[test]
    fn test_sequence_key_display() {
        assert_eq!(SequenceKey::typed(TypeCode::Savings).to_string(), "account:SB");
        assert_eq!(SequenceKey::typed(TypeCode::Debit).to_string(), "card:DC");
        assert_eq!(SequenceKey::customer().to_string(), "customer");
    }

    #[test]
    fn test_public_constructors_keep_family_and_type_aligned() {
        for type_code in TypeCode::ALL {
            let key = SequenceKey::typed(type_code);
            assert_eq!(key.family(), type_code.family());
            assert_eq!(key.type_code(), Some(type_code));
        }
        let customer = SequenceKey::customer();
        assert_eq!(customer.family(), EntityFamily::Customer);
        assert_eq!(customer.type_code(), None);
    }

    #[test]
    fn test_family_bounds() {
        assert_eq!(EntityFamily::Account.max_counter(), 999_999_999_999_999_999);
        assert_eq!(EntityFamily::Card.max_counter(), 999_999_999_999);
        assert_eq!(EntityFamily::Customer.max_counter(), u64::MAX);
        assert_eq!("Card".parse::<EntityFamily>().unwrap(), EntityFamily::Card);
    }
}
