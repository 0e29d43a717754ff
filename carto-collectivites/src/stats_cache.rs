//! Cache des statistiques de conformité par (portée, période)
//!
//! Une requête déjà en cours pour la même clé n'est pas relancée ; la clé
//! quitte l'ensemble "en cours" à la fin de la requête, succès ou échec.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use territoires::stats::StatTable;
use territoires::{ConformityTables, GeographicLevel};
use tracing::{debug, warn};

use crate::source::{DataSource, StatsScope};
use crate::state::{DepartmentView, MapState, RegionView};

/// Période normalisée (`current` si absente)
fn period_key(period: Option<&str>) -> String {
    match period {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => "current".to_string(),
    }
}

type CacheKey = (StatsScope, String);

/// Résultat de `ensure_loaded`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Déjà en cache
    Cached,
    /// Une autre requête identique est en cours
    AlreadyLoading,
    /// Chargé par cet appel
    Loaded,
    /// Échec de la requête (rien n'est mis en cache)
    Failed,
}

#[derive(Debug, Default)]
pub struct StatsCache {
    refs: Vec<String>,
    entries: Mutex<HashMap<CacheKey, Arc<StatTable>>>,
    in_flight: Mutex<HashSet<CacheKey>>,
}

/// Retire la clé de l'ensemble "en cours" à la destruction
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<CacheKey>>,
    key: CacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StatsCache {
    /// `refs` : critères demandés à chaque requête
    pub fn new(refs: Vec<String>) -> Self {
        Self {
            refs,
            ..Default::default()
        }
    }

    pub fn get(&self, scope: StatsScope, period: Option<&str>) -> Option<Arc<StatTable>> {
        lock(&self.entries)
            .get(&(scope, period_key(period)))
            .cloned()
    }

    pub fn is_loading(&self, scope: StatsScope, period: Option<&str>) -> bool {
        lock(&self.in_flight).contains(&(scope, period_key(period)))
    }

    /// Charge une portée si elle n'est ni en cache ni en cours de chargement
    pub async fn ensure_loaded<S: DataSource + ?Sized>(
        &self,
        source: &S,
        scope: StatsScope,
        period: Option<&str>,
    ) -> LoadOutcome {
        let key = (scope, period_key(period));

        if lock(&self.entries).contains_key(&key) {
            return LoadOutcome::Cached;
        }
        if !lock(&self.in_flight).insert(key.clone()) {
            debug!(scope = %scope, period = %key.1, "Stats already loading");
            return LoadOutcome::AlreadyLoading;
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            key: key.clone(),
        };

        match source.fetch_conformity_stats(scope, &self.refs, period).await {
            Ok(table) => {
                debug!(scope = %scope, period = %key.1, units = table.len(), "Stats loaded");
                lock(&self.entries).insert(key, Arc::new(table));
                LoadOutcome::Loaded
            }
            Err(e) => {
                warn!(scope = %scope, period = %key.1, error = %e, "Failed to load stats");
                LoadOutcome::Failed
            }
        }
    }

    /// Charge plusieurs portées en parallèle
    pub async fn ensure_scopes<S: DataSource + ?Sized>(
        &self,
        source: &S,
        scopes: &[StatsScope],
        period: Option<&str>,
    ) -> Vec<(StatsScope, LoadOutcome)> {
        let outcomes = join_all(
            scopes
                .iter()
                .map(|&scope| self.ensure_loaded(source, scope, period)),
        )
        .await;
        scopes.iter().copied().zip(outcomes).collect()
    }

    /// Tables des portées en cache pour une période
    pub fn tables(&self, period: Option<&str>) -> ConformityTables {
        let mut tables = ConformityTables::default();
        for scope in StatsScope::ALL {
            if let (Some(cached), Some(table)) =
                (self.get(scope, period), tables.table_mut(scope.level()))
            {
                *table = (*cached).clone();
            }
        }
        tables
    }
}

/// Portées nécessaires pour annoter l'état courant
pub fn required_scopes(state: &MapState) -> Vec<StatsScope> {
    let mut scopes = vec![StatsScope::Region];
    match state.current_level {
        GeographicLevel::Region => {
            scopes.push(StatsScope::Department);
            if state.region_view == RegionView::Epci {
                scopes.push(StatsScope::Epci);
            }
        }
        GeographicLevel::City => scopes.push(StatsScope::Department),
        GeographicLevel::Department => {
            scopes.push(StatsScope::Department);
            if state.department_view == DepartmentView::Epci {
                scopes.push(StatsScope::Epci);
            }
        }
        GeographicLevel::Country | GeographicLevel::Epci => {}
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_scopes() {
        let mut state = MapState::default();
        assert_eq!(required_scopes(&state), vec![StatsScope::Region]);

        state.current_level = GeographicLevel::Department;
        assert_eq!(
            required_scopes(&state),
            vec![StatsScope::Region, StatsScope::Department, StatsScope::Epci]
        );

        state.department_view = DepartmentView::City;
        assert_eq!(
            required_scopes(&state),
            vec![StatsScope::Region, StatsScope::Department]
        );

        state.current_level = GeographicLevel::Region;
        assert_eq!(
            required_scopes(&state),
            vec![StatsScope::Region, StatsScope::Department]
        );

        state.region_view = RegionView::Epci;
        assert_eq!(
            required_scopes(&state),
            vec![StatsScope::Region, StatsScope::Department, StatsScope::Epci]
        );
    }

    #[test]
    fn test_period_key() {
        assert_eq!(period_key(None), "current");
        assert_eq!(period_key(Some("")), "current");
        assert_eq!(period_key(Some("2024-05")), "2024-05");
    }
}
