//! Client HTTP de l'API du portail

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use geojson::{FeatureCollection, GeoJson};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use territoires::{CityRecord, DeploymentRecord, StatRecord};
use tracing::debug;

use super::{
    api_period, checked_code, DataSource, DeploymentEnvelope, GeoJsonPath, HistoryData,
    SourceError, StatsScope,
};

/// Source HTTP (`GET /geojson/...`, `GET /api/...`)
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        // Sans slash final, `join` remplacerait le dernier segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    async fn get_text(&self, url: Url) -> Result<Option<String>, SourceError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Some(response.text().await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let label = url.to_string();
        let text = self
            .get_text(url)
            .await?
            .ok_or(SourceError::NotFound(label))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch_geojson(
        &self,
        path: &GeoJsonPath,
    ) -> Result<Arc<FeatureCollection>, SourceError> {
        let url = self.endpoint(&format!("geojson/{}", path.checked_relative()?))?;
        let text = self
            .get_text(url)
            .await?
            .ok_or_else(|| SourceError::NotFound(path.relative()))?;

        let geojson: GeoJson = text.parse()?;
        Ok(Arc::new(FeatureCollection::try_from(geojson)?))
    }

    async fn fetch_commune(&self, siret: &str) -> Result<Option<CityRecord>, SourceError> {
        let url = self.endpoint(&format!("api/communes/{}", checked_code(siret)?))?;
        match self.get_text(url).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn fetch_department_cities(
        &self,
        department: &str,
        period: Option<&str>,
    ) -> Result<Vec<CityRecord>, SourceError> {
        let mut url = self.endpoint("api/rcpnt/stats")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("scope", "list-commune");
            query.append_pair("dep", checked_code(department)?);
            if let Some(period) = api_period(period) {
                query.append_pair("period", period);
            }
        }
        self.get_json(url).await
    }

    async fn fetch_conformity_stats(
        &self,
        scope: StatsScope,
        refs: &[String],
        period: Option<&str>,
    ) -> Result<HashMap<String, Vec<StatRecord>>, SourceError> {
        let mut url = self.endpoint("api/rcpnt/stats")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("scope", scope.as_api());
            query.append_pair("refs", &refs.join(","));
            if let Some(period) = api_period(period) {
                query.append_pair("period", period);
            }
        }
        self.get_json(url).await
    }

    async fn fetch_deployment_stats(&self) -> Result<Vec<DeploymentRecord>, SourceError> {
        let mut url = self.endpoint("api/deployment/stats")?;
        url.query_pairs_mut().append_pair("scope", "list-commune");
        let envelope: DeploymentEnvelope = self.get_json(url).await?;
        Ok(envelope.data)
    }

    async fn fetch_history(
        &self,
        scope: &str,
        scope_id: Option<&str>,
        refs: &[String],
    ) -> Result<HistoryData, SourceError> {
        let mut url = self.endpoint("api/rcpnt/hist")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("scope", scope);
            query.append_pair("refs", &refs.join(","));
            if let Some(id) = scope_id {
                query.append_pair("scope_id", id);
            }
        }
        self.get_json(url).await
    }
}
