//! Sources de données : GeoJSON, communes, statistiques
//!
//! - `http` : API du portail (`/geojson/...`, `/api/...`)
//! - `fs` : même arborescence lue depuis un répertoire local
//! - `cache` : mémoïsation des GeoJSON pour la session

pub mod cache;
pub mod fs;
pub mod http;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use territoires::level::strip_region_prefix;
use territoires::{CityRecord, DeploymentRecord, GeographicLevel, StatRecord};
use thiserror::Error;

use crate::url::is_valid_period;

pub use cache::CachedSource;
pub use fs::DirectorySource;
pub use http::HttpSource;

/// Erreurs des sources de données
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid code: {0:?}")]
    InvalidCode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

/// Fichier GeoJSON de contours
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeoJsonPath {
    /// Régions de France
    Regions,
    /// Départements d'une région (code sans préfixe)
    DepartmentsOfRegion(String),
    /// Communes d'un département
    CitiesOfDepartment(String),
}

impl GeoJsonPath {
    /// Fichier de contours d'une unité, `None` pour les niveaux sans fichier
    pub fn for_area(level: GeographicLevel, code: &str) -> Option<Self> {
        match level {
            GeographicLevel::Country => Some(Self::Regions),
            GeographicLevel::Region => Some(Self::DepartmentsOfRegion(
                strip_region_prefix(code).to_string(),
            )),
            GeographicLevel::Department => Some(Self::CitiesOfDepartment(code.to_string())),
            GeographicLevel::Epci | GeographicLevel::City => None,
        }
    }

    /// Code porté par le chemin
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Regions => None,
            Self::DepartmentsOfRegion(code) | Self::CitiesOfDepartment(code) => Some(code),
        }
    }

    /// Chemin relatif, après validation du code
    pub fn checked_relative(&self) -> Result<String, SourceError> {
        if let Some(code) = self.code() {
            checked_code(code)?;
        }
        Ok(self.relative())
    }

    /// Chemin relatif à la racine `geojson/`
    pub fn relative(&self) -> String {
        match self {
            Self::Regions => "regions.json".to_string(),
            Self::DepartmentsOfRegion(code) => format!("departements_par_region/{}.json", code),
            Self::CitiesOfDepartment(code) => format!("communes_par_departement/{}.json", code),
        }
    }
}

impl fmt::Display for GeoJsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative())
    }
}

/// Portée d'une requête de statistiques
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsScope {
    Region,
    Department,
    Epci,
}

impl StatsScope {
    pub const ALL: [StatsScope; 3] = [StatsScope::Region, StatsScope::Department, StatsScope::Epci];

    /// Valeur du paramètre `scope` de l'API
    pub fn as_api(self) -> &'static str {
        match self {
            StatsScope::Region => "reg",
            StatsScope::Department => "dep",
            StatsScope::Epci => "epci",
        }
    }

    pub fn level(self) -> GeographicLevel {
        match self {
            StatsScope::Region => GeographicLevel::Region,
            StatsScope::Department => GeographicLevel::Department,
            StatsScope::Epci => GeographicLevel::Epci,
        }
    }
}

impl fmt::Display for StatsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api())
    }
}

/// Période envoyée à l'API (`current` ou absente = données courantes)
pub fn api_period(period: Option<&str>) -> Option<&str> {
    period.filter(|p| !p.is_empty() && *p != "current")
}

/// Code INSEE, SIREN ou SIRET utilisable tel quel dans un chemin ou une URL
pub fn checked_code(code: &str) -> Result<&str, SourceError> {
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(code)
    } else {
        Err(SourceError::InvalidCode(code.to_string()))
    }
}

/// Comme `api_period`, en rejetant ce qui n'est pas `AAAA-MM`
pub fn checked_period(period: Option<&str>) -> Result<Option<&str>, SourceError> {
    match api_period(period) {
        Some(p) if !is_valid_period(p) => Err(SourceError::InvalidCode(p.to_string())),
        other => Ok(other),
    }
}

/// Critère dans l'historique mensuel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRef {
    #[serde(rename = "ref")]
    pub criterion: String,
    pub valid: i64,
}

/// Un mois d'historique
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMonth {
    pub month: String,
    pub total: i64,
    #[serde(default)]
    pub refs: Vec<HistoryRef>,
}

/// Historique de conformité d'une unité
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryData {
    pub scope: String,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub months: Vec<HistoryMonth>,
}

/// Portée de l'historique pour un niveau (`global`, `reg`, `dep`, `epci`)
pub fn history_scope(level: GeographicLevel, code: &str) -> Option<(&'static str, Option<String>)> {
    match level {
        GeographicLevel::Country => Some(("global", None)),
        GeographicLevel::Region => Some(("reg", Some(strip_region_prefix(code).to_string()))),
        GeographicLevel::Department => Some(("dep", Some(code.to_string()))),
        GeographicLevel::Epci => Some(("epci", Some(code.to_string()))),
        GeographicLevel::City => None,
    }
}

/// Accès aux données du portail
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Contours GeoJSON
    async fn fetch_geojson(
        &self,
        path: &GeoJsonPath,
    ) -> Result<Arc<FeatureCollection>, SourceError>;

    /// Fiche d'une commune, `None` si le SIRET est inconnu
    async fn fetch_commune(&self, siret: &str) -> Result<Option<CityRecord>, SourceError>;

    /// Communes d'un département avec leurs critères satisfaits
    async fn fetch_department_cities(
        &self,
        department: &str,
        period: Option<&str>,
    ) -> Result<Vec<CityRecord>, SourceError>;

    /// Statistiques de conformité par code d'unité
    async fn fetch_conformity_stats(
        &self,
        scope: StatsScope,
        refs: &[String],
        period: Option<&str>,
    ) -> Result<HashMap<String, Vec<StatRecord>>, SourceError>;

    /// Statistiques de déploiement par commune
    async fn fetch_deployment_stats(&self) -> Result<Vec<DeploymentRecord>, SourceError>;

    /// Historique mensuel de conformité
    async fn fetch_history(
        &self,
        scope: &str,
        scope_id: Option<&str>,
        refs: &[String],
    ) -> Result<HistoryData, SourceError>;
}

/// Enveloppe `{data: [...]}` des statistiques de déploiement
#[derive(Debug, Deserialize)]
pub(crate) struct DeploymentEnvelope {
    pub data: Vec<DeploymentRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geojson_paths() {
        assert_eq!(
            GeoJsonPath::for_area(GeographicLevel::Country, "00").unwrap().relative(),
            "regions.json"
        );
        assert_eq!(
            GeoJsonPath::for_area(GeographicLevel::Region, "r84").unwrap().relative(),
            "departements_par_region/84.json"
        );
        assert_eq!(
            GeoJsonPath::for_area(GeographicLevel::Department, "2A").unwrap().relative(),
            "communes_par_departement/2A.json"
        );
        assert!(GeoJsonPath::for_area(GeographicLevel::Epci, "200040715").is_none());
    }

    #[test]
    fn test_codes_are_checked() {
        assert_eq!(checked_code("2A").unwrap(), "2A");
        assert!(checked_code("21380185000017").is_ok());
        for bad in ["", "../38", "38?x=1", "38/..", "38 "] {
            assert!(matches!(checked_code(bad), Err(SourceError::InvalidCode(_))), "{}", bad);
        }

        let escaping = GeoJsonPath::CitiesOfDepartment("../../etc/passwd".to_string());
        assert!(escaping.checked_relative().is_err());
        assert_eq!(GeoJsonPath::Regions.checked_relative().unwrap(), "regions.json");
    }

    #[test]
    fn test_periods_are_checked() {
        assert_eq!(checked_period(Some("current")).unwrap(), None);
        assert_eq!(checked_period(Some("2024-05")).unwrap(), Some("2024-05"));
        assert!(checked_period(Some("../2024")).is_err());
    }

    #[test]
    fn test_api_period() {
        assert_eq!(api_period(Some("current")), None);
        assert_eq!(api_period(None), None);
        assert_eq!(api_period(Some("2024-05")), Some("2024-05"));
    }

    #[test]
    fn test_history_scope() {
        assert_eq!(history_scope(GeographicLevel::Country, "00"), Some(("global", None)));
        assert_eq!(
            history_scope(GeographicLevel::Region, "r84"),
            Some(("reg", Some("84".to_string())))
        );
        assert_eq!(history_scope(GeographicLevel::City, "21380185000017"), None);
    }

    #[test]
    fn test_deployment_envelope() {
        let env: DeploymentEnvelope = serde_json::from_str(
            r#"{"data": [{"id": "21380185000017", "dep": "38", "total": 3, "active": 2, "all_services": ["1"]}]}"#,
        )
        .unwrap();
        assert_eq!(env.data.len(), 1);
        assert_eq!(env.data[0].siren(), "213801850");
    }
}
