//! Configuration du système

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use territoires::{ConformityRefs, Gradient};

use crate::state::{DepartmentView, RegionView};

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Racine de l'API du portail (source HTTP)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Répertoire des réponses enregistrées (source locale)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Référentiel des régions, départements et EPCI
    pub parent_areas: PathBuf,

    pub hexbin: HexbinConfig,

    #[serde(default)]
    pub default_department_view: DepartmentView,

    #[serde(default)]
    pub default_region_view: RegionView,

    pub conformity: ConformityConfig,

    pub colors: ColorsConfig,
}

/// Taille des hexagones (mètres)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HexbinConfig {
    pub country_cell_size: f64,
    pub region_cell_size: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConformityConfig {
    #[serde(flatten)]
    pub model: ConformityRefs,

    /// Critères demandés à l'API de statistiques
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorsConfig {
    pub conformity: Gradient,
    pub deployment: Gradient,
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default", preset),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(config: &str) -> Result<Self> {
        let path = Path::new(config);
        if path.extension().is_some_and(|ext| ext == "json") || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(config)
        }
    }

    /// Surcharge par les variables d'environnement
    /// (`CARTO_BASE_URL`, `CARTO_DATA_DIR`, `CARTO_PARENT_AREAS`)
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CARTO_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Ok(dir) = std::env::var("CARTO_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(path) = std::env::var("CARTO_PARENT_AREAS") {
            self.parent_areas = PathBuf::from(path);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset() {
        let config = Config::from_preset("default").unwrap();
        assert_eq!(config.hexbin.country_cell_size, 15000.0);
        assert_eq!(config.hexbin.region_cell_size, 12000.0);
        assert_eq!(config.default_department_view, DepartmentView::Epci);
        assert_eq!(config.default_region_view, RegionView::Department);
        assert_eq!(config.conformity.model, ConformityRefs::default());
        assert!(config.conformity.refs.iter().any(|r| r == "2.7"));
        assert_eq!(config.colors.conformity, Gradient::conformity());
        assert_eq!(config.colors.deployment, Gradient::deployment());
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Config::from_preset("full").is_err());
        assert!(Config::resolve("absent.json").is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = include_str!("presets/default.json").replace(
            "\"base_url\": null",
            "\"base_url\": \"https://portail.example.fr\"",
        );
        std::fs::write(&path, json).unwrap();

        let config = Config::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://portail.example.fr"));
    }
}
