use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AnalysisError;

const ASX_SUFFIX: &str = ".AX";

/// The big-four banks plus the regionals and Macquarie.
pub const DEFAULT_BANK_CODES: &[&str] = &["CBA", "WBC", "ANZ", "NAB", "MQG", "BEN", "BOQ"];

/// A normalised ASX ticker, always stored as `CODE.AX`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AsxSymbol(String);

impl AsxSymbol {
    /// Accepts `cba`, `CBA`, `CBA.AX` or `cba.ax` (surrounding whitespace ignored).
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let upper = raw.trim().to_ascii_uppercase();
        let code = upper.strip_suffix(ASX_SUFFIX).unwrap_or(&upper);

        let valid = (2..=6).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(AnalysisError::InvalidSymbol(raw.to_string()));
        }

        Ok(Self(format!("{}{}", code, ASX_SUFFIX)))
    }

    /// The bare exchange code, e.g. `CBA`.
    pub fn code(&self) -> &str {
        self.0.strip_suffix(ASX_SUFFIX).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn default_watchlist() -> Vec<AsxSymbol> {
        DEFAULT_BANK_CODES
            .iter()
            .map(|code| AsxSymbol(format!("{}{}", code, ASX_SUFFIX)))
            .collect()
    }
}

impl fmt::Display for AsxSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AsxSymbol {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AsxSymbol {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AsxSymbol> for String {
    fn from(symbol: AsxSymbol) -> Self {
        symbol.0
    }
}
