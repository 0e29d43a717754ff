//! Synchronisation de l'état avec la chaîne de requête
//!
//! `?level=&code=&view=&ref=&period=&service_ids=` ; l'absence de `level` et
//! `code` désigne la racine (`country` / `00`), qui se sérialise en chaîne vide.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use territoires::{GeographicLevel, COUNTRY_CODE};
use thiserror::Error;
use tracing::warn;

use crate::state::{DepartmentView, Filters, MapState, RegionView};

/// Base fictive servant uniquement à l'encodage des paramètres
const QUERY_BASE: &str = "http://localhost/";

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Invalid query string: {0}")]
    InvalidQuery(String),

    #[error("Unknown level: {0}")]
    UnknownLevel(String),

    #[error("Invalid view for {level}: {view}")]
    InvalidView { level: GeographicLevel, view: String },
}

fn period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-(0[1-9]|1[0-2])|current)$").unwrap_or_else(|_| unreachable!())
    })
}

/// Vrai pour `YYYY-MM` ou `current`
pub fn is_valid_period(period: &str) -> bool {
    period_regex().is_match(period)
}

/// Sous-ensemble navigationnel de l'état porté par l'URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlState {
    pub level: GeographicLevel,
    pub code: String,
    /// Seulement au niveau département
    pub department_view: Option<DepartmentView>,
    /// Seulement au niveau région
    pub region_view: Option<RegionView>,
    pub filters: Filters,
}

impl Default for UrlState {
    fn default() -> Self {
        Self {
            level: GeographicLevel::Country,
            code: COUNTRY_CODE.to_string(),
            department_view: None,
            region_view: None,
            filters: Filters::default(),
        }
    }
}

impl UrlState {
    /// `None` tant que l'unité courante n'est pas chargée
    pub fn from_state(state: &MapState) -> Option<Self> {
        let code = state.current_code()?.to_string();
        Some(Self {
            level: state.current_level,
            code,
            department_view: (state.current_level == GeographicLevel::Department)
                .then_some(state.department_view),
            region_view: (state.current_level == GeographicLevel::Region)
                .then_some(state.region_view),
            filters: state.filters.clone(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.level == GeographicLevel::Country && self.code == COUNTRY_CODE
    }

    /// Chaîne de requête avec `?`, vide pour la racine sans filtre
    pub fn to_query(&self) -> String {
        let Ok(mut url) = Url::parse(QUERY_BASE) else {
            return String::new();
        };

        {
            let mut pairs = url.query_pairs_mut();
            if self.level != GeographicLevel::Country {
                pairs.append_pair("level", self.level.as_str());
            }
            if self.code != COUNTRY_CODE {
                pairs.append_pair("code", &self.code);
            }
            match self.level {
                GeographicLevel::Department => {
                    if let Some(view) = self.department_view {
                        pairs.append_pair("view", view.as_str());
                    }
                }
                GeographicLevel::Region => {
                    if let Some(view) = self.region_view {
                        pairs.append_pair("view", view.as_str());
                    }
                }
                _ => {}
            }
            if let Some(criterion) = self.filters.criterion.as_deref().filter(|c| !c.is_empty()) {
                pairs.append_pair("ref", criterion);
            }
            if let Some(period) = self.filters.period.as_deref().filter(|p| !p.is_empty()) {
                pairs.append_pair("period", period);
            }
            if let Some(ids) = self.filters.selected_services() {
                pairs.append_pair("service_ids", &ids.join(","));
            }
        }

        match url.query() {
            Some(query) if !query.is_empty() => format!("?{}", query),
            _ => String::new(),
        }
    }

    /// Parse une chaîne de requête (avec ou sans `?`, ou une URL complète)
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None => input,
        };
        let mut url =
            Url::parse(QUERY_BASE).map_err(|e| UrlError::InvalidQuery(e.to_string()))?;
        url.set_query(Some(query));

        let mut level = None;
        let mut code = None;
        let mut view = None;
        let mut filters = Filters::default();

        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "level" => level = Some(value.into_owned()),
                "code" => code = Some(value.into_owned()),
                "view" => view = Some(value.into_owned()),
                "ref" => filters.criterion = Some(value.into_owned()),
                "period" => {
                    if is_valid_period(&value) {
                        filters.period = Some(value.into_owned());
                    } else {
                        warn!(period = %value, "Ignoring invalid period");
                    }
                }
                "service_ids" => {
                    let ids: Vec<String> = value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .collect();
                    if !ids.is_empty() {
                        filters.service_ids = Some(ids);
                    }
                }
                _ => {}
            }
        }

        let level = match level {
            Some(level) => level
                .parse::<GeographicLevel>()
                .map_err(|_| UrlError::UnknownLevel(level))?,
            None => GeographicLevel::Country,
        };
        let code = match (level, code) {
            (_, Some(code)) => code,
            (GeographicLevel::Country, None) => COUNTRY_CODE.to_string(),
            // Niveau sans code : retour à la racine
            (_, None) => {
                return Ok(Self {
                    filters,
                    ..Default::default()
                })
            }
        };

        let invalid_view = |view: &str| UrlError::InvalidView {
            level,
            view: view.to_string(),
        };
        let department_view = match (level, view.as_deref()) {
            (GeographicLevel::Department, Some(v)) => {
                Some(v.parse::<DepartmentView>().map_err(|_| invalid_view(v))?)
            }
            _ => None,
        };
        let region_view = match (level, view.as_deref()) {
            (GeographicLevel::Region, Some(v)) => {
                Some(v.parse::<RegionView>().map_err(|_| invalid_view(v))?)
            }
            _ => None,
        };

        Ok(Self {
            level,
            code,
            department_view,
            region_view,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SelectedArea;

    #[test]
    fn test_root_is_empty() {
        let url = UrlState::default();
        assert!(url.is_root());
        assert_eq!(url.to_query(), "");
        assert_eq!(UrlState::parse("").unwrap(), url);
        assert_eq!(UrlState::parse("?").unwrap(), url);
    }

    #[test]
    fn test_department_with_filters() {
        let url = UrlState {
            level: GeographicLevel::Department,
            code: "2A".to_string(),
            department_view: Some(DepartmentView::City),
            region_view: None,
            filters: Filters {
                criterion: Some("1.a".to_string()),
                period: Some("2024-05".to_string()),
                service_ids: Some(vec!["1".to_string(), "3".to_string()]),
            },
        };

        let query = url.to_query();
        assert!(query.starts_with("?level=department&code=2A&view=city&ref=1.a&period=2024-05"));
        assert_eq!(UrlState::parse(&query).unwrap(), url);
    }

    #[test]
    fn test_view_only_for_its_level() {
        let parsed = UrlState::parse("level=epci&code=200040715&view=city").unwrap();
        assert_eq!(parsed.department_view, None);
        assert_eq!(parsed.region_view, None);

        let parsed = UrlState::parse("https://portail.example.fr/carte?level=region&code=r84&view=city")
            .unwrap();
        assert_eq!(parsed.region_view, Some(RegionView::City));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            UrlState::parse("level=canton&code=1"),
            Err(UrlError::UnknownLevel(_))
        ));
        assert!(matches!(
            UrlState::parse("level=department&code=38&view=region"),
            Err(UrlError::InvalidView { .. })
        ));
    }

    #[test]
    fn test_invalid_period_is_dropped() {
        let parsed = UrlState::parse("period=2024-13&service_ids=1,,2").unwrap();
        assert_eq!(parsed.filters.period, None);
        assert_eq!(
            parsed.filters.service_ids,
            Some(vec!["1".to_string(), "2".to_string()])
        );
        assert!(is_valid_period("current"));
        assert!(is_valid_period("2025-01"));
        assert!(!is_valid_period("2025-1"));
    }

    #[test]
    fn test_level_without_code_is_root() {
        let parsed = UrlState::parse("level=department&ref=2.a").unwrap();
        assert!(parsed.is_root());
        assert_eq!(parsed.filters.criterion.as_deref(), Some("2.a"));
    }

    #[test]
    fn test_from_state() {
        let mut state = MapState::default();
        assert!(UrlState::from_state(&state).is_none());

        state.current_level = GeographicLevel::Region;
        state.selected_areas.insert(
            GeographicLevel::Region,
            SelectedArea {
                insee_geo: "r84".to_string(),
                ..Default::default()
            }
            .into(),
        );

        let url = UrlState::from_state(&state).unwrap();
        assert_eq!(url.to_query(), "?level=region&code=r84&view=department");
    }
}
