//! Mémoïsation des contours GeoJSON pour la session

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use geojson::FeatureCollection;
use territoires::{CityRecord, DeploymentRecord, StatRecord};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DataSource, GeoJsonPath, HistoryData, SourceError, StatsScope};

/// Enveloppe une source et garde en mémoire les GeoJSON déjà chargés
///
/// Les échecs ne sont pas mis en cache : un nouvel appel refait la requête.
pub struct CachedSource<S> {
    inner: S,
    geojson: RwLock<HashMap<GeoJsonPath, Arc<FeatureCollection>>>,
    hits: AtomicUsize,
}

impl<S: DataSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            geojson: RwLock::new(HashMap::new()),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Nombre de lectures servies depuis le cache
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub async fn clear(&self) {
        self.geojson.write().await.clear();
    }
}

#[async_trait]
impl<S: DataSource> DataSource for CachedSource<S> {
    async fn fetch_geojson(
        &self,
        path: &GeoJsonPath,
    ) -> Result<Arc<FeatureCollection>, SourceError> {
        if let Some(cached) = self.geojson.read().await.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path, "GeoJSON cache hit");
            return Ok(Arc::clone(cached));
        }

        let collection = self.inner.fetch_geojson(path).await?;
        self.geojson
            .write()
            .await
            .insert(path.clone(), Arc::clone(&collection));
        Ok(collection)
    }

    async fn fetch_commune(&self, siret: &str) -> Result<Option<CityRecord>, SourceError> {
        self.inner.fetch_commune(siret).await
    }

    async fn fetch_department_cities(
        &self,
        department: &str,
        period: Option<&str>,
    ) -> Result<Vec<CityRecord>, SourceError> {
        self.inner.fetch_department_cities(department, period).await
    }

    async fn fetch_conformity_stats(
        &self,
        scope: StatsScope,
        refs: &[String],
        period: Option<&str>,
    ) -> Result<HashMap<String, Vec<StatRecord>>, SourceError> {
        self.inner.fetch_conformity_stats(scope, refs, period).await
    }

    async fn fetch_deployment_stats(&self) -> Result<Vec<DeploymentRecord>, SourceError> {
        self.inner.fetch_deployment_stats().await
    }

    async fn fetch_history(
        &self,
        scope: &str,
        scope_id: Option<&str>,
        refs: &[String],
    ) -> Result<HistoryData, SourceError> {
        self.inner.fetch_history(scope, scope_id, refs).await
    }
}
