//! Niveaux géographiques de la hiérarchie administrative
//!
//! Ordre total, du plus fin au plus grossier :
//! commune (`city`) < EPCI < département < région < pays.
//! L'EPCI et la commune sont tous deux rattachés au département.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TerritoireError;

/// Code de la racine (France entière)
pub const COUNTRY_CODE: &str = "00";

/// Niveau géographique
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GeographicLevel {
    City,
    Epci,
    Department,
    Region,
    #[default]
    Country,
}

impl GeographicLevel {
    /// Tous les niveaux, du plus fin au plus grossier
    pub const ALL: [GeographicLevel; 5] = [
        GeographicLevel::City,
        GeographicLevel::Epci,
        GeographicLevel::Department,
        GeographicLevel::Region,
        GeographicLevel::Country,
    ];

    /// Niveaux strictement plus grossiers, du plus proche au plus lointain
    pub fn coarser_levels(self) -> &'static [GeographicLevel] {
        let idx = Self::ALL
            .iter()
            .position(|l| *l == self)
            .unwrap_or(Self::ALL.len() - 1);
        &Self::ALL[idx + 1..]
    }

    /// Vrai pour les niveaux agrégés (région, département, EPCI)
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            GeographicLevel::Region | GeographicLevel::Department | GeographicLevel::Epci
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeographicLevel::City => "city",
            GeographicLevel::Epci => "epci",
            GeographicLevel::Department => "department",
            GeographicLevel::Region => "region",
            GeographicLevel::Country => "country",
        }
    }
}

impl fmt::Display for GeographicLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeographicLevel {
    type Err = TerritoireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "city" => Ok(GeographicLevel::City),
            "epci" => Ok(GeographicLevel::Epci),
            "department" => Ok(GeographicLevel::Department),
            "region" => Ok(GeographicLevel::Region),
            "country" => Ok(GeographicLevel::Country),
            other => Err(TerritoireError::UnknownLevel(other.to_string())),
        }
    }
}

/// Retire le préfixe `r` des codes région (`r84` → `84`)
pub fn strip_region_prefix(code: &str) -> &str {
    code.strip_prefix('r').unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarser_levels() {
        assert_eq!(
            GeographicLevel::City.coarser_levels(),
            &[
                GeographicLevel::Epci,
                GeographicLevel::Department,
                GeographicLevel::Region,
                GeographicLevel::Country
            ]
        );
        assert_eq!(
            GeographicLevel::Region.coarser_levels(),
            &[GeographicLevel::Country]
        );
        assert!(GeographicLevel::Country.coarser_levels().is_empty());
    }

    #[test]
    fn test_ordering() {
        assert!(GeographicLevel::Country > GeographicLevel::Region);
        assert!(GeographicLevel::Department > GeographicLevel::Epci);
        assert!(GeographicLevel::Epci > GeographicLevel::City);
    }

    #[test]
    fn test_parse_roundtrip() {
        for level in GeographicLevel::ALL {
            assert_eq!(level.as_str().parse::<GeographicLevel>().unwrap(), level);
        }
        assert!("commune".parse::<GeographicLevel>().is_err());
    }

    #[test]
    fn test_strip_region_prefix() {
        assert_eq!(strip_region_prefix("r84"), "84");
        assert_eq!(strip_region_prefix("38"), "38");
    }
}
