//! Source locale : réponses de l'API enregistrées dans un répertoire
//!
//! Arborescence :
//! ```text
//! geojson/regions.json
//! geojson/departements_par_region/84.json
//! geojson/communes_par_departement/38.json
//! communes/{siret}.json
//! rcpnt/[{period}/]reg.json            (dep.json, epci.json)
//! rcpnt/[{period}/]list-commune/38.json
//! rcpnt/hist/{scope}[_{scope_id}].json
//! deployment/list-commune.json
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use geojson::{FeatureCollection, GeoJson};
use serde::de::DeserializeOwned;
use territoires::{CityRecord, DeploymentRecord, StatRecord};
use tracing::debug;

use super::{
    checked_code, checked_period, DataSource, DeploymentEnvelope, GeoJsonPath, HistoryData,
    SourceError, StatsScope,
};

#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rcpnt_dir(&self, period: Option<&str>) -> Result<PathBuf, SourceError> {
        Ok(match checked_period(period)? {
            Some(period) => self.root.join("rcpnt").join(period),
            None => self.root.join("rcpnt"),
        })
    }

    async fn read(&self, path: &Path) -> Result<Option<String>, SourceError> {
        debug!(path = %path.display(), "Read");
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, SourceError> {
        let content = self
            .read(path)
            .await?
            .ok_or_else(|| SourceError::NotFound(path.display().to_string()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl DataSource for DirectorySource {
    async fn fetch_geojson(
        &self,
        path: &GeoJsonPath,
    ) -> Result<Arc<FeatureCollection>, SourceError> {
        let file = self.root.join("geojson").join(path.checked_relative()?);
        let content = self
            .read(&file)
            .await?
            .ok_or_else(|| SourceError::NotFound(file.display().to_string()))?;

        let geojson: GeoJson = content.parse()?;
        Ok(Arc::new(FeatureCollection::try_from(geojson)?))
    }

    async fn fetch_commune(&self, siret: &str) -> Result<Option<CityRecord>, SourceError> {
        let file = self
            .root
            .join("communes")
            .join(format!("{}.json", checked_code(siret)?));
        match self.read(&file).await? {
            Some(content) => Ok(Some(serde_json::from_str(&content)?)),
            None => Ok(None),
        }
    }

    async fn fetch_department_cities(
        &self,
        department: &str,
        period: Option<&str>,
    ) -> Result<Vec<CityRecord>, SourceError> {
        let file = self
            .rcpnt_dir(period)?
            .join("list-commune")
            .join(format!("{}.json", checked_code(department)?));
        self.read_json(&file).await
    }

    async fn fetch_conformity_stats(
        &self,
        scope: StatsScope,
        _refs: &[String],
        period: Option<&str>,
    ) -> Result<HashMap<String, Vec<StatRecord>>, SourceError> {
        let file = self
            .rcpnt_dir(period)?
            .join(format!("{}.json", scope.as_api()));
        self.read_json(&file).await
    }

    async fn fetch_deployment_stats(&self) -> Result<Vec<DeploymentRecord>, SourceError> {
        let file = self.root.join("deployment").join("list-commune.json");
        let envelope: DeploymentEnvelope = self.read_json(&file).await?;
        Ok(envelope.data)
    }

    async fn fetch_history(
        &self,
        scope: &str,
        scope_id: Option<&str>,
        _refs: &[String],
    ) -> Result<HistoryData, SourceError> {
        let scope = checked_code(scope)?;
        let name = match scope_id {
            Some(id) => format!("{}_{}.json", scope, checked_code(id)?),
            None => format!("{}.json", scope),
        };
        let file = self.root.join("rcpnt").join("hist").join(name);
        self.read_json(&file).await
    }
}
