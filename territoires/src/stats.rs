//! Calcul des statistiques d'une unité géographique
//!
//! Deux tableaux de bord partagent la même signature :
//! - conformité : critères satisfaits (`rcpnt`), score de 0 à 2
//! - déploiement : services utilisés par commune
//!
//! Aucune fonction de ce module ne panique ni ne retourne d'erreur : une
//! donnée absente donne `None` (unité rendue "sans donnée").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::level::{strip_region_prefix, GeographicLevel};
use crate::reference::ParentAreas;
use crate::types::{AreaStats, CityRecord, DeploymentRecord, ScoreDetails, StatRecord};

/// Critères servant au score composite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformityRefs {
    /// Les deux critères d'ancrage (ex: `1.a`, `2.a`)
    pub anchor_refs: [String; 2],
    /// Critère "deux côtés" (ex: `a`)
    pub both_sides_ref: String,
}

impl Default for ConformityRefs {
    fn default() -> Self {
        Self {
            anchor_refs: ["1.a".to_string(), "2.a".to_string()],
            both_sides_ref: "a".to_string(),
        }
    }
}

/// Lignes de statistiques par code d'unité, pour un niveau
pub type StatTable = HashMap<String, Vec<StatRecord>>;

/// Statistiques de conformité des trois niveaux agrégés
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConformityTables {
    pub region: StatTable,
    pub department: StatTable,
    pub epci: StatTable,
}

impl ConformityTables {
    pub fn table(&self, level: GeographicLevel) -> Option<&StatTable> {
        match level {
            GeographicLevel::Region => Some(&self.region),
            GeographicLevel::Department => Some(&self.department),
            GeographicLevel::Epci => Some(&self.epci),
            GeographicLevel::City | GeographicLevel::Country => None,
        }
    }

    pub fn table_mut(&mut self, level: GeographicLevel) -> Option<&mut StatTable> {
        match level {
            GeographicLevel::Region => Some(&mut self.region),
            GeographicLevel::Department => Some(&mut self.department),
            GeographicLevel::Epci => Some(&mut self.epci),
            GeographicLevel::City | GeographicLevel::Country => None,
        }
    }

    /// Vrai tant qu'aucune région n'est chargée
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}

/// Valeurs d'une ligne, `{0, 0}` si la ligne est absente
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    valid: i64,
    total: i64,
}

fn counts_for(rows: &[StatRecord], criterion: &str) -> Counts {
    rows.iter()
        .find(|r| r.criterion == criterion)
        .map(|r| Counts {
            valid: r.valid,
            total: r.total,
        })
        .unwrap_or_default()
}

/// Contexte d'un calcul de conformité
#[derive(Debug, Clone, Copy)]
pub struct ConformityContext<'a> {
    pub tables: &'a ConformityTables,
    /// Communes du département courant (niveau commune)
    pub cities: &'a [CityRecord],
    pub refs: &'a ConformityRefs,
}

/// Score de conformité d'une unité
///
/// `criterion` : filtre sur un seul critère, sinon score composite.
pub fn conformity_stats(
    level: GeographicLevel,
    code: &str,
    ctx: &ConformityContext<'_>,
    criterion: Option<&str>,
) -> Option<AreaStats> {
    match level {
        GeographicLevel::City => city_conformity(code, ctx, criterion),
        GeographicLevel::Country => None,
        GeographicLevel::Region | GeographicLevel::Department | GeographicLevel::Epci => {
            let table = ctx.tables.table(level)?;
            let rows = table.get(strip_region_prefix(code))?;
            Some(match criterion {
                Some(c) => single_criterion(rows, c),
                None => composite(level, code, rows, ctx.refs),
            })
        }
    }
}

fn city_conformity(
    code: &str,
    ctx: &ConformityContext<'_>,
    criterion: Option<&str>,
) -> Option<AreaStats> {
    let city = ctx
        .cities
        .iter()
        .find(|c| c.insee_geo == code || c.siret == code)?;
    // Critères pas encore chargés
    let satisfied = city.rcpnt.as_ref()?;

    let score = match criterion {
        Some(c) => satisfied.iter().any(|r| r == c) as u8,
        None => ctx
            .refs
            .anchor_refs
            .iter()
            .filter(|anchor| satisfied.contains(anchor))
            .count() as u8,
    };

    Some(AreaStats {
        n_cities: Some(1),
        score: Some(f64::from(score)),
        ..Default::default()
    })
}

fn single_criterion(rows: &[StatRecord], criterion: &str) -> AreaStats {
    let stat = counts_for(rows, criterion);
    let score = if stat.total > 0 {
        Some(stat.valid as f64 / stat.total as f64 * 2.0)
    } else {
        None
    };

    let mut details = ScoreDetails::new();
    details.insert(0, stat.total - stat.valid);
    details.insert(2, stat.valid);

    AreaStats {
        n_cities: Some(stat.total),
        score,
        inconsistent: stat.valid > stat.total || stat.valid < 0,
        details: Some(details),
        ..Default::default()
    }
}

fn composite(
    level: GeographicLevel,
    code: &str,
    rows: &[StatRecord],
    refs: &ConformityRefs,
) -> AreaStats {
    let both = counts_for(rows, &refs.both_sides_ref);
    let anchor_a = counts_for(rows, &refs.anchor_refs[0]);
    let anchor_b = counts_for(rows, &refs.anchor_refs[1]);

    let n_cities = both.total;
    let fully = both.valid;
    let partially = (anchor_a.valid - both.valid) + (anchor_b.valid - both.valid);
    let none = n_cities - fully - partially;

    // Les paliers négatifs sont conservés et signalés
    let inconsistent = partially < 0 || none < 0;
    if inconsistent {
        warn!(
            level = %level,
            code = %code,
            fully,
            partially,
            none,
            "Inconsistent conformity counts"
        );
    }

    let score = if both.total > 0 {
        Some((fully * 2 + partially) as f64 / both.total as f64)
    } else {
        None
    };

    let mut details = ScoreDetails::new();
    details.insert(0, none);
    details.insert(1, partially);
    details.insert(2, fully);

    AreaStats {
        n_cities: Some(n_cities),
        score,
        details: Some(details),
        inconsistent,
        ..Default::default()
    }
}

/// Contexte d'un calcul de déploiement
#[derive(Debug, Clone, Copy)]
pub struct DeploymentContext<'a> {
    pub records: &'a [DeploymentRecord],
    pub areas: &'a ParentAreas,
}

/// Vrai si la commune utilise un des services sélectionnés, ou au moins un
/// service quand aucun filtre n'est actif
pub fn has_selected_service(record: &DeploymentRecord, selected: Option<&[String]>) -> bool {
    match selected {
        Some(ids) if !ids.is_empty() => record.all_services.iter().any(|s| ids.contains(s)),
        _ => !record.all_services.is_empty(),
    }
}

/// Nombre de services de la commune parmi la sélection
pub fn matched_services(record: &DeploymentRecord, selected: &[String]) -> u32 {
    selected
        .iter()
        .filter(|s| record.all_services.contains(s))
        .count() as u32
}

fn in_unit(record: &DeploymentRecord, level: GeographicLevel, code: &str) -> bool {
    match level {
        GeographicLevel::Region => {
            record.reg.as_deref().map(strip_region_prefix) == Some(strip_region_prefix(code))
        }
        GeographicLevel::Department => record.dep.as_deref() == Some(code),
        GeographicLevel::Epci => record.epci.as_deref() == Some(code),
        GeographicLevel::City | GeographicLevel::Country => true,
    }
}

/// Statistiques de déploiement d'une unité
///
/// Au niveau commune `code` est le SIRET. Les niveaux agrégés comptent les
/// communes retenues, rapportées au nombre de communes du référentiel.
pub fn deployment_stats(
    level: GeographicLevel,
    code: &str,
    ctx: &DeploymentContext<'_>,
    selected: Option<&[String]>,
) -> Option<AreaStats> {
    let mut retained = ctx
        .records
        .iter()
        .filter(|r| in_unit(r, level, code))
        .filter(|r| has_selected_service(r, selected));

    if level == GeographicLevel::City {
        let found = retained.any(|r| r.id == code);
        return Some(AreaStats {
            n_cities: Some(1),
            score: Some(if found { 1.0 } else { 0.0 }),
            ..Default::default()
        });
    }

    let n_cities = retained.count() as i64;
    let n_total_cities = match level {
        GeographicLevel::Country => ctx.areas.total_cities(),
        _ => ctx.areas.cities_of(code),
    };

    Some(AreaStats {
        n_cities: Some(n_cities),
        n_total_cities: Some(n_total_cities),
        score: None,
        ..Default::default()
    })
}
