//! Référentiel statique des régions, départements et EPCI
//!
//! Chargé une fois, en lecture seule, puis injecté (via `Arc`) dans le moteur
//! de navigation et la fusion EPCI.

use std::collections::HashMap;
use std::path::Path;

use crate::level::strip_region_prefix;
use crate::types::{AreaKind, ParentArea};
use crate::TerritoireError;

/// Référentiel indexé par `insee_geo`
#[derive(Debug, Clone, Default)]
pub struct ParentAreas {
    areas: Vec<ParentArea>,
    index: HashMap<String, usize>,
}

impl ParentAreas {
    pub fn new(areas: Vec<ParentArea>) -> Self {
        // En cas de doublon, la première occurrence gagne
        let mut index = HashMap::with_capacity(areas.len());
        for (i, area) in areas.iter().enumerate() {
            index.entry(area.insee_geo.clone()).or_insert(i);
        }
        Self { areas, index }
    }

    /// Parse un référentiel JSON (`ParentArea[]`)
    pub fn from_json(json: &str) -> Result<Self, TerritoireError> {
        let areas: Vec<ParentArea> = serde_json::from_str(json)?;
        Ok(Self::new(areas))
    }

    /// Charge un référentiel depuis un fichier
    pub fn load(path: &Path) -> Result<Self, TerritoireError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn find(&self, code: &str) -> Option<&ParentArea> {
        self.index.get(code).map(|&i| &self.areas[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParentArea> {
        self.areas.iter()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &ParentArea> {
        self.areas.iter().filter(|a| a.kind == AreaKind::Region)
    }

    /// Départements d'une région (code avec ou sans préfixe `r`)
    pub fn departments_in_region<'a>(
        &'a self,
        region_code: &'a str,
    ) -> impl Iterator<Item = &'a ParentArea> + 'a {
        let wanted = strip_region_prefix(region_code);
        self.areas.iter().filter(move |a| {
            a.kind == AreaKind::Department
                && a.insee_reg.as_deref().map(strip_region_prefix) == Some(wanted)
        })
    }

    /// Codes des régions ayant au moins un département, triés et dédoublonnés
    pub fn region_codes_with_departments(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .areas
            .iter()
            .filter(|a| a.kind == AreaKind::Department)
            .filter_map(|a| a.insee_reg.clone())
            .filter(|c| !c.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// Nombre total de communes (somme des régions)
    pub fn total_cities(&self) -> i64 {
        self.regions()
            .map(|a| i64::from(a.n_cities.unwrap_or(0)))
            .sum()
    }

    /// Nombre de communes d'une collectivité, 0 si inconnue
    pub fn cities_of(&self, code: &str) -> i64 {
        self.find(code)
            .and_then(|a| a.n_cities)
            .map(i64::from)
            .unwrap_or(0)
    }
}
