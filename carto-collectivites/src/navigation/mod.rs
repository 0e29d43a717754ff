//! Machine d'état de navigation (`select_level`)
//!
//! Une transition construit un nouvel `MapState` complet puis le publie d'un
//! bloc. Chaque transition reçoit un jeton de génération croissant : si une
//! transition plus récente a démarré entre-temps, son résultat est ignoré.

mod levels;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use territoires::level::strip_region_prefix;
use territoires::{GeographicLevel, ParentAreas, COUNTRY_CODE};
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::display;
use crate::report::TransitionReport;
use crate::source::{history_scope, DataSource, GeoJsonPath, HistoryData, SourceError};
use crate::state::{DepartmentView, Filters, MapState, RegionView, SelectedArea, SelectedAreas};
use crate::url::UrlState;

use levels::LevelContext;

/// Origine d'une transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationSource {
    /// Clic sur une unité affichée : on descend dans la même branche
    AreaClick,
    /// Fil d'Ariane ou bouton retour
    BackClick,
    /// Saut depuis la recherche ou l'URL
    QuickNav,
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Unknown {level} code: {code}")]
    UnknownArea {
        level: GeographicLevel,
        code: String,
    },

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("Invalid search result: {0}")]
    InvalidSearchResult(String),
}

/// Résultat de la recherche de collectivités
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// `region`, `departement`, `epci` ou `commune`
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub insee_reg: Option<String>,

    #[serde(default)]
    pub insee_dep: Option<String>,

    #[serde(default)]
    pub siret: Option<String>,

    #[serde(default)]
    pub name: String,
}

impl SearchResult {
    /// Niveau et code visés
    pub fn target(&self) -> Result<(GeographicLevel, String), NavigationError> {
        let required = |value: &Option<String>, field: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    NavigationError::InvalidSearchResult(format!(
                        "{} without {}",
                        self.kind, field
                    ))
                })
        };

        match self.kind.as_str() {
            "region" => Ok((
                GeographicLevel::Region,
                format!("r{}", strip_region_prefix(&required(&self.insee_reg, "insee_reg")?)),
            )),
            "departement" => Ok((
                GeographicLevel::Department,
                required(&self.insee_dep, "insee_dep")?,
            )),
            "epci" => {
                let siret = required(&self.siret, "siret")?;
                let siren = siret.get(..9).unwrap_or(&siret).to_string();
                Ok((GeographicLevel::Epci, siren))
            }
            "commune" => Ok((GeographicLevel::City, required(&self.siret, "siret")?)),
            other => Err(NavigationError::InvalidSearchResult(format!(
                "unknown type {}",
                other
            ))),
        }
    }
}

/// Surcharges optionnelles d'une transition
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub department_view: Option<DepartmentView>,
    pub region_view: Option<RegionView>,
    /// Remplace les filtres courants
    pub filters: Option<Filters>,
}

/// Moteur de navigation : détient l'état courant et les dépendances
pub struct Navigator<S: ?Sized> {
    source: Arc<S>,
    areas: Arc<ParentAreas>,
    state: RwLock<Arc<MapState>>,
    generation: AtomicU64,
    /// Tous les départements de France, chargés une fois
    departments: OnceCell<Arc<FeatureCollection>>,
}

impl<S: DataSource + ?Sized> Navigator<S> {
    pub fn new(source: Arc<S>, areas: Arc<ParentAreas>) -> Self {
        Self {
            source,
            areas,
            state: RwLock::new(Arc::new(MapState::default())),
            generation: AtomicU64::new(0),
            departments: OnceCell::new(),
        }
    }

    /// Remplace l'état initial (vues par défaut de la configuration)
    pub fn with_state(mut self, state: MapState) -> Self {
        self.state = RwLock::new(Arc::new(state));
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn areas(&self) -> &Arc<ParentAreas> {
        &self.areas
    }

    /// Instantané de l'état courant
    pub async fn state(&self) -> Arc<MapState> {
        Arc::clone(&*self.state.read().await)
    }

    /// Dernier jeton de génération émis
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Seul point de mutation géographique de l'état
    ///
    /// Ne retourne jamais d'erreur : si l'unité cible est indisponible,
    /// l'état retombe sur la racine France et le rapport l'indique.
    pub async fn select_level(
        &self,
        level: GeographicLevel,
        code: &str,
        source: NavigationSource,
        request: TransitionRequest,
    ) -> TransitionReport {
        let start = Instant::now();
        let generation = self.next_generation();
        let snapshot = self.state().await;
        let mut report = TransitionReport::new(level, code, source, generation);

        info!(level = %level, code = %code, source = ?source, generation, "Transition started");

        let next = match self
            .build_state(&snapshot, level, code, source, &request, &mut report)
            .await
        {
            Ok(state) => state,
            Err(e) => {
                warn!(level = %level, code = %code, error = %e, "Target unavailable, falling back to country");
                report.record_failure(level, code, e.to_string());
                report.mark_fallback();
                self.fallback_state(&snapshot, &request, &mut report).await
            }
        };

        if !self.publish(next, generation).await {
            report.mark_discarded();
        }

        report.set_duration(start.elapsed());
        report.finalize();
        info!(generation, status = ?report.status, "Transition done");
        report
    }

    async fn build_state(
        &self,
        snapshot: &MapState,
        level: GeographicLevel,
        code: &str,
        source: NavigationSource,
        request: &TransitionRequest,
        report: &mut TransitionReport,
    ) -> Result<MapState, NavigationError> {
        let filters = request
            .filters
            .clone()
            .unwrap_or_else(|| snapshot.filters.clone());
        let region_view = request.region_view.unwrap_or(snapshot.region_view);
        let ctx = LevelContext {
            source: self.source.as_ref(),
            areas: &self.areas,
            period: filters.period.as_deref(),
        };

        let mut selected: SelectedAreas = match source {
            NavigationSource::BackClick => snapshot
                .selected_areas
                .iter()
                .filter(|(l, _)| **l > level)
                .map(|(l, e)| (*l, e.clone()))
                .collect(),
            NavigationSource::AreaClick => snapshot.selected_areas.clone(),
            NavigationSource::QuickNav => snapshot
                .selected_areas
                .iter()
                .filter(|(l, _)| **l == GeographicLevel::Country)
                .map(|(l, e)| (*l, e.clone()))
                .collect(),
        };

        let entry = levels::compute(&ctx, level, code, region_view, report).await?;
        selected.insert(level, entry);

        if source == NavigationSource::QuickNav {
            self.compute_ancestors(&ctx, level, region_view, &mut selected, report)
                .await;
        }

        // Depuis la vue communes ou EPCI d'une région, le département est sauté
        if source == NavigationSource::AreaClick
            && snapshot.current_level == GeographicLevel::Region
            && matches!(level, GeographicLevel::City | GeographicLevel::Epci)
        {
            if let Some(department) = levels::parent_code(GeographicLevel::Department, &selected) {
                self.compute_optional(
                    &ctx,
                    GeographicLevel::Department,
                    &department,
                    region_view,
                    &mut selected,
                    report,
                )
                .await;
            }
        }

        let department_view = match request.department_view {
            Some(view) => view,
            None if level == GeographicLevel::City && source == NavigationSource::QuickNav => {
                DepartmentView::City
            }
            None => snapshot.department_view,
        };

        Ok(MapState {
            current_level: level,
            selected_areas: selected,
            department_view,
            region_view,
            filters,
            panel_open: snapshot.panel_open,
        })
    }

    /// Reconstruit tous les ancêtres de la cible, du plus proche au pays
    async fn compute_ancestors(
        &self,
        ctx: &LevelContext<'_, S>,
        level: GeographicLevel,
        region_view: RegionView,
        selected: &mut SelectedAreas,
        report: &mut TransitionReport,
    ) {
        for &parent in level.coarser_levels() {
            if parent == GeographicLevel::Country && selected.contains_key(&parent) {
                continue;
            }

            let Some(parent_code) = levels::parent_code(parent, selected) else {
                if parent == GeographicLevel::Epci {
                    debug!("City without EPCI");
                } else {
                    warn!(level = %parent, "Ancestor code unavailable");
                    report.record_failure(parent, "", "ancestor code unavailable");
                }
                continue;
            };

            self.compute_optional(ctx, parent, &parent_code, region_view, selected, report)
                .await;
        }
    }

    /// Calcule une unité non cible : un échec laisse l'entrée absente
    async fn compute_optional(
        &self,
        ctx: &LevelContext<'_, S>,
        level: GeographicLevel,
        code: &str,
        region_view: RegionView,
        selected: &mut SelectedAreas,
        report: &mut TransitionReport,
    ) {
        match levels::compute(ctx, level, code, region_view, report).await {
            Ok(entry) => {
                selected.insert(level, entry);
            }
            Err(e) => {
                warn!(level = %level, code = %code, error = %e, "Ancestor unavailable");
                report.record_failure(level, code, e.to_string());
            }
        }
    }

    /// État de repli : la racine France seule
    async fn fallback_state(
        &self,
        snapshot: &MapState,
        request: &TransitionRequest,
        report: &mut TransitionReport,
    ) -> MapState {
        let filters = request
            .filters
            .clone()
            .unwrap_or_else(|| snapshot.filters.clone());
        let region_view = request.region_view.unwrap_or(snapshot.region_view);

        let country = match snapshot.entry(GeographicLevel::Country) {
            Some(entry) => entry.clone(),
            None => {
                let ctx = LevelContext {
                    source: self.source.as_ref(),
                    areas: &self.areas,
                    period: filters.period.as_deref(),
                };
                match levels::compute(&ctx, GeographicLevel::Country, COUNTRY_CODE, region_view, report)
                    .await
                {
                    Ok(entry) => entry,
                    Err(_) => SelectedArea::france().into(),
                }
            }
        };

        let mut selected = SelectedAreas::new();
        selected.insert(GeographicLevel::Country, country);

        MapState {
            current_level: GeographicLevel::Country,
            selected_areas: selected,
            department_view: request.department_view.unwrap_or(snapshot.department_view),
            region_view,
            filters,
            panel_open: snapshot.panel_open,
        }
    }

    /// Publie l'état si `generation` est toujours la plus récente
    async fn publish(&self, mut next: MapState, generation: u64) -> bool {
        let mut live = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, latest = self.generation(), "Stale transition discarded");
            return false;
        }
        next.panel_open = live.panel_open;
        *live = Arc::new(next);
        true
    }

    /// Remonte d'un niveau
    pub async fn go_back(&self) -> Option<TransitionReport> {
        let state = self.state().await;
        let previous = state.previous_level()?;
        let code = state
            .entry(previous)
            .map(|e| e.code().to_string())
            .unwrap_or_default();

        Some(
            self.select_level(
                previous,
                &code,
                NavigationSource::BackClick,
                TransitionRequest::default(),
            )
            .await,
        )
    }

    /// Clic sur une unité affichée (niveau suivant selon les vues)
    pub async fn click_area(&self, code: &str) -> TransitionReport {
        let level = self.state().await.next_level();
        self.select_level(
            level,
            code,
            NavigationSource::AreaClick,
            TransitionRequest::default(),
        )
        .await
    }

    /// Saut vers un résultat de recherche
    pub async fn handle_quick_nav(
        &self,
        result: &SearchResult,
    ) -> Result<TransitionReport, NavigationError> {
        let (level, code) = result.target().map_err(|e| {
            warn!(kind = %result.kind, error = %e, "Search result rejected");
            e
        })?;

        Ok(self
            .select_level(
                level,
                &code,
                NavigationSource::QuickNav,
                TransitionRequest::default(),
            )
            .await)
    }

    /// Synchronisation initiale depuis l'URL
    pub async fn open_url(&self, url: &UrlState) -> TransitionReport {
        let request = TransitionRequest {
            department_view: url.department_view,
            region_view: url.region_view,
            filters: Some(url.filters.clone()),
        };
        self.select_level(url.level, &url.code, NavigationSource::QuickNav, request)
            .await
    }

    /// Change la période et recharge les communes affichées
    ///
    /// Retourne `false` si une transition a démarré pendant le rechargement.
    pub async fn set_period(&self, period: Option<String>) -> bool {
        let generation = self.next_generation();
        let snapshot = self.state().await;
        let mut next = (*snapshot).clone();
        next.filters.period = period.filter(|p| !p.is_empty());

        let ctx = LevelContext {
            source: self.source.as_ref(),
            areas: &self.areas,
            period: next.filters.period.as_deref(),
        };

        let reload_department = match snapshot.current_level {
            GeographicLevel::Department => snapshot.department_view == DepartmentView::City,
            GeographicLevel::Epci | GeographicLevel::City => true,
            GeographicLevel::Region | GeographicLevel::Country => false,
        };

        if reload_department {
            if let Some(department) = snapshot.area(GeographicLevel::Department) {
                match self
                    .source
                    .fetch_department_cities(&department.insee_geo, ctx.period)
                    .await
                {
                    Ok(cities) => {
                        let mut updated = department.clone();
                        updated.cities = Some(Arc::new(cities));
                        next.selected_areas
                            .insert(GeographicLevel::Department, updated.into());
                    }
                    Err(e) => {
                        warn!(department = %department.insee_geo, error = %e, "Failed to reload cities");
                    }
                }
            }
        } else if snapshot.is_region_city_view() {
            if let Some(region) = snapshot.area(GeographicLevel::Region) {
                let (cities, failed) = levels::region_cities(&ctx, &region.insee_geo).await;
                if !failed.is_empty() {
                    warn!(region = %region.insee_geo, failed = failed.len(), "Cities partially reloaded");
                }
                let mut updated = region.clone();
                updated.cities = Some(Arc::new(cities));
                next.selected_areas
                    .insert(GeographicLevel::Region, updated.into());
            }
        }

        info!(period = ?next.filters.period, "Period changed");
        self.publish(next, generation).await
    }

    /// Préoccupation purement UI, hors `select_level`
    pub async fn set_panel_open(&self, open: bool) {
        let mut live = self.state.write().await;
        let mut next = (**live).clone();
        next.panel_open = open;
        *live = Arc::new(next);
    }

    /// Contours à afficher pour l'état courant
    pub async fn displayed_geojson(&self) -> Option<Arc<FeatureCollection>> {
        display::displayed(&*self.state().await)
    }

    /// Contours de contexte autour de l'unité courante
    pub async fn neighbour_geojson(&self) -> Option<Arc<FeatureCollection>> {
        let state = self.state().await;
        match state.current_level {
            GeographicLevel::Country => None,
            GeographicLevel::Region => display::region_neighbours(&state).map(Arc::new),
            GeographicLevel::Department | GeographicLevel::Epci | GeographicLevel::City => {
                match self.all_departments().await {
                    Ok(collection) => Some(collection),
                    Err(e) => {
                        warn!(error = %e, "Failed to load departments geometry");
                        None
                    }
                }
            }
        }
    }

    /// Départements de France, assemblés une fois (un échec sera retenté)
    async fn all_departments(&self) -> Result<Arc<FeatureCollection>, SourceError> {
        let collection = self
            .departments
            .get_or_try_init(|| async {
                let regions = self.areas.region_codes_with_departments();
                let results = join_all(regions.iter().map(|code| {
                    let path = GeoJsonPath::DepartmentsOfRegion(strip_region_prefix(code).to_string());
                    async move { self.source.fetch_geojson(&path).await }
                }))
                .await;

                let mut features = Vec::new();
                for result in results {
                    features.extend(result?.features.iter().cloned());
                }
                debug!(features = features.len(), "Departments of France stitched");

                Ok::<_, SourceError>(Arc::new(FeatureCollection {
                    bbox: None,
                    features,
                    foreign_members: None,
                }))
            })
            .await?;
        Ok(Arc::clone(collection))
    }

    /// Historique de conformité de l'unité courante
    pub async fn load_history(&self, refs: &[String]) -> Option<HistoryData> {
        let state = self.state().await;
        let code = state.current_code()?;
        let (scope, scope_id) = history_scope(state.current_level, code)?;

        match self
            .source
            .fetch_history(scope, scope_id.as_deref(), refs)
            .await
        {
            Ok(history) => Some(history),
            Err(e) => {
                warn!(scope = %scope, error = %e, "Failed to load history");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(kind: &str) -> SearchResult {
        SearchResult {
            kind: kind.to_string(),
            insee_reg: Some("84".to_string()),
            insee_dep: Some("38".to_string()),
            siret: Some("20004071500012".to_string()),
            name: "Test".to_string(),
        }
    }

    #[test]
    fn test_search_targets() {
        assert_eq!(
            search("region").target().unwrap(),
            (GeographicLevel::Region, "r84".to_string())
        );
        assert_eq!(
            search("departement").target().unwrap(),
            (GeographicLevel::Department, "38".to_string())
        );
        assert_eq!(
            search("epci").target().unwrap(),
            (GeographicLevel::Epci, "200040715".to_string())
        );
        assert_eq!(
            search("commune").target().unwrap(),
            (GeographicLevel::City, "20004071500012".to_string())
        );
    }

    #[test]
    fn test_invalid_search_results() {
        assert!(matches!(
            search("canton").target(),
            Err(NavigationError::InvalidSearchResult(_))
        ));

        let mut result = search("commune");
        result.siret = None;
        assert!(result.target().is_err());
    }

    #[test]
    fn test_search_result_json() {
        let result: SearchResult = serde_json::from_str(
            r#"{"type": "commune", "siret": "21380185000017", "name": "Grenoble", "insee_dep": "38"}"#,
        )
        .unwrap();
        assert_eq!(
            result.target().unwrap(),
            (GeographicLevel::City, "21380185000017".to_string())
        );
    }

    #[test]
    fn test_navigation_source_serde() {
        let json = serde_json::to_string(&NavigationSource::QuickNav).unwrap();
        assert_eq!(json, "\"quickNav\"");
    }
}
