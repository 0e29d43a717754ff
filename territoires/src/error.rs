//! Types d'erreurs pour le crate territoires

use thiserror::Error;

/// Erreurs pouvant survenir lors du traitement des données territoriales
#[derive(Debug, Error)]
pub enum TerritoireError {
    /// Erreur d'I/O lors de la lecture d'un fichier de référence
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON invalide
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// GeoJSON invalide ou non convertible
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Géométrie invalide
    #[error("Invalid geometry for {entity_id}: {reason}")]
    InvalidGeometry { entity_id: String, reason: String },

    /// Échec de l'union des polygones d'un groupe
    #[error("Union failed for group {group}: {reason}")]
    UnionFailed { group: String, reason: String },

    /// Niveau géographique inconnu
    #[error("Unknown geographic level: {0}")]
    UnknownLevel(String),

    /// Couleur ou dégradé invalide
    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

impl TerritoireError {
    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(entity_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            entity_id: entity_id.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur d'union avec contexte
    pub fn union_failed(group: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnionFailed {
            group: group.into(),
            reason: reason.into(),
        }
    }
}
