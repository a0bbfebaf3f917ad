use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IdentifierError;
use crate::family::{EntityFamily, SequenceKey, TypeCode};

/// Which legacy type codes are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// ATM (`AC`, prefix `1233`) and Prepaid (`PP`, prefix `1234`) cards.
    pub legacy_card_types: bool,
    /// Cash Credit accounts (`CC`).
    pub legacy_account_types: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            legacy_card_types: true,
            legacy_account_types: false,
        }
    }
}

/// A formatted account number, card number or customer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    pub family: EntityFamily,
    pub type_code: Option<TypeCode>,
    pub counter: u64,
}

impl ParsedIdentifier {
    pub fn key(&self) -> SequenceKey {
        SequenceKey::new(self.family, self.type_code)
    }
}

/// Table-driven translation between `(family, type code, counter)` and the
/// canonical identifier string.
pub struct IdentifierFormat {
    options: FormatOptions,
    account_re: Regex,
    card_re: Regex,
    customer_re: Regex,
}

impl IdentifierFormat {
    pub fn new(options: FormatOptions) -> Self {
        IdentifierFormat {
            options,
            account_re: Regex::new(r"^([A-Z]{2})(\d{18})$").expect("account pattern is valid"),
            card_re: Regex::new(r"^(\d{4})(\d{12})$").expect("card pattern is valid"),
            customer_re: Regex::new(r"^(0|[1-9]\d*)$").expect("customer pattern is valid"),
        }
    }

    pub fn options(&self) -> FormatOptions {
        self.options
    }

    pub fn is_enabled(&self, type_code: TypeCode) -> bool {
        match type_code {
            TypeCode::Atm | TypeCode::Prepaid => self.options.legacy_card_types,
            TypeCode::CashCredit => self.options.legacy_account_types,
            _ => true,
        }
    }

    /// Type codes currently recognized for `family`.
    pub fn type_codes(&self, family: EntityFamily) -> Vec<TypeCode> {
        TypeCode::ALL
            .into_iter()
            .filter(|t| t.family() == family && self.is_enabled(*t))
            .collect()
    }

    /// Checks that `type_code` is legal for `family` and returns the key.
    /// Customers take no type code; every other family requires one.
    pub fn validate(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
    ) -> Result<SequenceKey, IdentifierError> {
        let legal = match (family, type_code) {
            (EntityFamily::Customer, None) => true,
            (EntityFamily::Customer, Some(_)) | (_, None) => false,
            (_, Some(t)) => t.family() == family && self.is_enabled(t),
        };
        if !legal {
            return Err(IdentifierError::InvalidTypeCode {
                family,
                type_code: type_code.map(|t| t.code()).unwrap_or("").to_string(),
            });
        }
        Ok(SequenceKey::new(family, type_code))
    }

    pub fn format(
        &self,
        family: EntityFamily,
        type_code: Option<TypeCode>,
        counter: u64,
    ) -> Result<Identifier, IdentifierError> {
        let key = self.validate(family, type_code)?;
        if counter > family.max_counter() {
            return Err(IdentifierError::CounterOverflow { key, counter });
        }

        let formatted = match (type_code, family.counter_width()) {
            (Some(t), Some(width)) => format!("{}{:0width$}", t.prefix(), counter, width = width),
            _ => counter.to_string(),
        };
        Ok(Identifier(formatted))
    }

    /// Parses a canonical identifier. Layouts are tried in order account,
    /// card, customer, so a 16-digit string with an enabled card prefix is
    /// always a card number. Use [`parse_as`](Self::parse_as) when the family
    /// is already known.
    pub fn parse(&self, identifier: &str) -> Result<ParsedIdentifier, IdentifierError> {
        [EntityFamily::Account, EntityFamily::Card, EntityFamily::Customer]
            .into_iter()
            .find_map(|family| self.match_family(family, identifier))
            .ok_or_else(|| IdentifierError::MalformedIdentifier(identifier.to_string()))
    }

    /// Parses `identifier` against the layout of `family` only.
    pub fn parse_as(
        &self,
        family: EntityFamily,
        identifier: &str,
    ) -> Result<ParsedIdentifier, IdentifierError> {
        self.match_family(family, identifier)
            .ok_or_else(|| IdentifierError::MalformedIdentifier(identifier.to_string()))
    }

    fn match_family(&self, family: EntityFamily, identifier: &str) -> Option<ParsedIdentifier> {
        let (type_code, digits) = match family {
            EntityFamily::Account | EntityFamily::Card => {
                let re = if family == EntityFamily::Account {
                    &self.account_re
                } else {
                    &self.card_re
                };
                let caps = re.captures(identifier)?;
                let type_code = self.lookup_prefix(family, caps.get(1)?.as_str())?;
                (Some(type_code), caps.get(2)?.as_str())
            }
            EntityFamily::Customer => {
                if !self.customer_re.is_match(identifier) {
                    return None;
                }
                (None, identifier)
            }
        };
        let counter = digits.parse::<u64>().ok()?;
        Some(ParsedIdentifier {
            family,
            type_code,
            counter,
        })
    }

    fn lookup_prefix(&self, family: EntityFamily, prefix: &str) -> Option<TypeCode> {
        self.type_codes(family)
            .into_iter()
            .find(|t| t.prefix() == prefix)
    }
}

impl Default for IdentifierFormat {
    fn default() -> Self {
        IdentifierFormat::new(FormatOptions::default())
    }
}
