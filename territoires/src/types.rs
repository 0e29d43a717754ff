//! Types de données pour le crate territoires

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Nature d'une collectivité de référence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaKind {
    Region,
    Department,
    Epci,
    #[serde(other)]
    Unknown,
}

/// Région, département ou EPCI du référentiel statique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentArea {
    /// Code unique (les régions sont préfixées par `r`)
    pub insee_geo: String,

    pub name: String,

    #[serde(rename = "type")]
    pub kind: AreaKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insee_reg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insee_dep: Option<String>,

    /// Nombre de communes rattachées
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_cities: Option<u32>,
}

/// Données brutes d'une commune (conformité et déploiement)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CityRecord {
    #[serde(default)]
    pub insee_geo: String,

    pub siret: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insee_dep: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insee_reg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epci_siren: Option<String>,

    #[serde(default, alias = "population", skip_serializing_if = "Option::is_none")]
    pub pop: Option<u64>,

    /// Critères satisfaits (codes `1.a`, `2.a`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcpnt: Option<Vec<String>>,

    /// Services utilisés
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_services: Option<Vec<String>>,

    /// Statistiques de déploiement rattachées après coup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_city_stats: Option<DeploymentRecord>,
}

impl CityRecord {
    /// Vrai si la commune satisfait le critère
    pub fn satisfies(&self, criterion: &str) -> Option<bool> {
        self.rcpnt
            .as_ref()
            .map(|refs| refs.iter().any(|r| r == criterion))
    }
}

/// Ligne de statistique (unité géographique × critère)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatRecord {
    #[serde(rename = "ref")]
    pub criterion: String,

    pub valid: i64,

    pub total: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_pop: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pop: Option<i64>,
}

/// Ligne de statistique de déploiement (une commune)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// SIRET de la commune
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epci: Option<String>,

    #[serde(default)]
    pub total: i64,

    #[serde(default)]
    pub active: i64,

    #[serde(default)]
    pub all_services: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_services: Option<Vec<String>>,
}

impl DeploymentRecord {
    /// SIREN (9 premiers caractères du SIRET)
    pub fn siren(&self) -> &str {
        self.id.get(..9).unwrap_or(&self.id)
    }
}

/// Répartition des communes par palier de score (0, 1, 2)
pub type ScoreDetails = BTreeMap<u8, i64>;

/// Statistiques dérivées d'une unité géographique
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AreaStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_cities: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_total_cities: Option<i64>,

    /// Score, `None` = pas de donnée
    pub score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ScoreDetails>,

    /// Données amont incohérentes (palier négatif)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inconsistent: bool,
}
