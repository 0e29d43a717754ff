//! Rapport de transition de navigation
//!
//! `select_level` ne retourne jamais d'erreur : les échecs de chargement sont
//! collectés ici, avec le statut final de la transition.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use territoires::GeographicLevel;

use crate::navigation::NavigationSource;

/// Statut global d'une transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionStatus {
    /// Toutes les unités ont été chargées
    Success,
    /// Cible chargée, mais un ancêtre ou une donnée secondaire a échoué
    PartialSuccess,
    /// Cible introuvable : retour à la racine France
    FellBack,
    /// Une transition plus récente a été lancée, résultat ignoré
    Discarded,
}

/// Problème rencontré pendant une transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionWarning {
    /// Niveau concerné
    pub level: GeographicLevel,
    /// Code de l'unité
    pub code: String,
    /// Message
    pub message: String,
    /// Vrai si l'unité n'a pas pu être chargée du tout
    pub failed: bool,
}

/// Rapport complet d'une transition
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    /// Niveau demandé
    pub target_level: GeographicLevel,
    /// Code demandé
    pub target_code: String,
    pub source: NavigationSource,
    /// Jeton de génération de la transition
    pub generation: u64,
    /// Durée de la transition
    pub duration_secs: f64,
    /// Statut global
    pub status: TransitionStatus,

    /// Niveaux calculés par cette transition
    pub computed: Vec<GeographicLevel>,
    /// Niveau courant à l'issue de la transition
    pub final_level: GeographicLevel,

    /// Problèmes rencontrés
    pub warnings: Vec<TransitionWarning>,

    #[serde(skip)]
    fell_back: bool,
    #[serde(skip)]
    discarded: bool,
}

impl TransitionReport {
    pub fn new(
        target_level: GeographicLevel,
        target_code: &str,
        source: NavigationSource,
        generation: u64,
    ) -> Self {
        Self {
            target_level,
            target_code: target_code.to_string(),
            source,
            generation,
            duration_secs: 0.0,
            status: TransitionStatus::Success,
            computed: Vec::new(),
            final_level: target_level,
            warnings: Vec::new(),
            fell_back: false,
            discarded: false,
        }
    }

    /// Enregistre une unité calculée
    pub fn record_computed(&mut self, level: GeographicLevel) {
        if !self.computed.contains(&level) {
            self.computed.push(level);
        }
    }

    /// Enregistre une unité non chargée
    pub fn record_failure(&mut self, level: GeographicLevel, code: &str, message: impl Into<String>) {
        self.warnings.push(TransitionWarning {
            level,
            code: code.to_string(),
            message: message.into(),
            failed: true,
        });
    }

    /// Enregistre une donnée secondaire manquante (unité chargée quand même)
    pub fn record_warning(&mut self, level: GeographicLevel, code: &str, message: impl Into<String>) {
        self.warnings.push(TransitionWarning {
            level,
            code: code.to_string(),
            message: message.into(),
            failed: false,
        });
    }

    /// La cible a échoué, la transition s'est rabattue sur la racine
    pub fn mark_fallback(&mut self) {
        self.fell_back = true;
        self.final_level = GeographicLevel::Country;
    }

    /// Transition périmée
    pub fn mark_discarded(&mut self) {
        self.discarded = true;
    }

    /// Définit la durée de la transition
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        self.status = if self.discarded {
            TransitionStatus::Discarded
        } else if self.fell_back {
            TransitionStatus::FellBack
        } else if !self.warnings.is_empty() {
            TransitionStatus::PartialSuccess
        } else {
            TransitionStatus::Success
        };
    }

    pub fn is_applied(&self) -> bool {
        self.status != TransitionStatus::Discarded
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!(
            "TRANSITION REPORT - {} {} ({:?})",
            self.target_level, self.target_code, self.source
        );
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        println!("Final level: {}", self.final_level);

        if !self.computed.is_empty() {
            let levels: Vec<&str> = self.computed.iter().map(|l| l.as_str()).collect();
            println!("Computed: {}", levels.join(", "));
        }

        if !self.warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", self.warnings.len());
            for w in self.warnings.iter().take(20) {
                let tag = if w.failed { "FAILED" } else { "warn" };
                println!("  [{}:{}] {} {}", w.level, w.code, tag, w.message);
            }
            if self.warnings.len() > 20 {
                println!("  ... and {} more", self.warnings.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} {} -> {}: {:?}, {} computed, {} warnings",
            self.target_level,
            self.target_code,
            self.final_level,
            self.status,
            self.computed.len(),
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TransitionReport {
        TransitionReport::new(GeographicLevel::Department, "38", NavigationSource::AreaClick, 1)
    }

    #[test]
    fn test_finalize_success() {
        let mut report = report();
        report.record_computed(GeographicLevel::Department);
        report.record_computed(GeographicLevel::Department);
        report.finalize();

        assert_eq!(report.status, TransitionStatus::Success);
        assert_eq!(report.computed, vec![GeographicLevel::Department]);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = report();
        report.record_warning(GeographicLevel::Department, "38", "cities unavailable");
        report.finalize();

        assert_eq!(report.status, TransitionStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_fallback() {
        let mut report = report();
        report.record_failure(GeographicLevel::Department, "38", "HTTP 500");
        report.mark_fallback();
        report.finalize();

        assert_eq!(report.status, TransitionStatus::FellBack);
        assert_eq!(report.final_level, GeographicLevel::Country);
        assert!(report.is_applied());
    }

    #[test]
    fn test_discarded_wins() {
        let mut report = report();
        report.mark_fallback();
        report.mark_discarded();
        report.finalize();

        assert_eq!(report.status, TransitionStatus::Discarded);
        assert!(!report.is_applied());
    }

    #[test]
    fn test_summary() {
        let mut report = report();
        report.record_computed(GeographicLevel::Department);
        report.finalize();

        let summary = report.summary();
        assert!(summary.contains("department 38"));
        assert!(summary.contains("1 computed"));
    }
}
