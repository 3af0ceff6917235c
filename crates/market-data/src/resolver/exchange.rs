//! Indian equity exchanges and their provider-specific suffixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Exchange on which an equity candidate is listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// National Stock Exchange of India.
    Nse,
    /// BSE (Bombay Stock Exchange).
    Bse,
}

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Nse, Exchange::Bse];

    /// Yahoo Finance suffix (".NS" / ".BO"). This is also the canonical
    /// suffix used for candidate symbols.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Nse => ".NS",
            Self::Bse => ".BO",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nse => "National Stock Exchange of India",
            Self::Bse => "BSE Ltd",
        }
    }

    /// ISO 10383 market identifier code.
    pub fn mic(&self) -> &'static str {
        match self {
            Self::Nse => "XNSE",
            Self::Bse => "XBOM",
        }
    }

    pub fn currency(&self) -> &'static str {
        "INR"
    }

    /// Alpha Vantage suffix. Alpha Vantage lists BSE symbols only.
    pub fn alpha_vantage_suffix(&self) -> Option<&'static str> {
        match self {
            Self::Nse => None,
            Self::Bse => Some(".BSE"),
        }
    }

    /// Match a Yahoo-style suffix (with or without the dot, any case).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let suffix = suffix.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|exchange| exchange.suffix()[1..].eq_ignore_ascii_case(suffix))
    }

    /// Classify an exchange label as reported by a search API
    /// ("NSI", "NSE", "BSE", "BOM", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NSE" | "NSI" | "XNSE" => Some(Self::Nse),
            "BSE" | "BOM" | "XBOM" => Some(Self::Bse),
            _ => None,
        }
    }
}

impl FromStr for Exchange {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NSE" => Ok(Self::Nse),
            "BSE" => Ok(Self::Bse),
            other => Err(MarketDataError::InvalidInput(format!(
                "Unknown exchange '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_suffix() {
        assert_eq!(Exchange::from_suffix(".NS"), Some(Exchange::Nse));
        assert_eq!(Exchange::from_suffix("bo"), Some(Exchange::Bse));
        assert_eq!(Exchange::from_suffix(".L"), None);
    }

    #[test]
    fn test_alpha_vantage_covers_bse_only() {
        assert_eq!(Exchange::Bse.alpha_vantage_suffix(), Some(".BSE"));
        assert_eq!(Exchange::Nse.alpha_vantage_suffix(), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!("nse".parse::<Exchange>().unwrap(), Exchange::Nse);
        assert!("NYSE".parse::<Exchange>().is_err());
        assert_eq!(Exchange::from_label("NSI"), Some(Exchange::Nse));
        assert_eq!(Exchange::from_label("BOM"), Some(Exchange::Bse));
    }
}
