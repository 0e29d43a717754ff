//! État de la carte : niveau courant, unités visitées, vues et filtres
//!
//! L'état n'est jamais modifié en place par la navigation : chaque transition
//! construit un nouvel `MapState` complet, les données lourdes (GeoJSON,
//! communes) sont partagées via `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use territoires::{AreaKind, CityRecord, GeographicLevel, ParentArea, COUNTRY_CODE};

/// Affichage d'un département : communes ou EPCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartmentView {
    City,
    #[default]
    Epci,
}

impl DepartmentView {
    pub fn as_str(self) -> &'static str {
        match self {
            DepartmentView::City => "city",
            DepartmentView::Epci => "epci",
        }
    }
}

impl FromStr for DepartmentView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "city" => Ok(DepartmentView::City),
            "epci" => Ok(DepartmentView::Epci),
            other => Err(format!("Unknown department view: {}", other)),
        }
    }
}

/// Affichage d'une région : départements, communes ou EPCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionView {
    #[default]
    Department,
    City,
    Epci,
}

impl RegionView {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionView::Department => "department",
            RegionView::City => "city",
            RegionView::Epci => "epci",
        }
    }
}

impl FromStr for RegionView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "department" => Ok(RegionView::Department),
            "city" => Ok(RegionView::City),
            "epci" => Ok(RegionView::Epci),
            other => Err(format!("Unknown region view: {}", other)),
        }
    }
}

impl fmt::Display for DepartmentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RegionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filtres orthogonaux à la navigation géographique
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filters {
    /// Critère de conformité unique (`ref`)
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,

    /// `YYYY-MM` ou `current`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    /// Services sélectionnés (tableau de bord déploiement)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ids: Option<Vec<String>>,
}

impl Filters {
    /// Services sélectionnés, `None` si aucun filtre
    pub fn selected_services(&self) -> Option<&[String]> {
        self.service_ids
            .as_deref()
            .filter(|ids| !ids.is_empty())
    }
}

/// Unité visitée (pays, région, département ou EPCI)
#[derive(Debug, Clone, Default)]
pub struct SelectedArea {
    pub insee_geo: String,
    pub name: String,
    pub kind: Option<AreaKind>,
    pub insee_reg: Option<String>,
    pub insee_dep: Option<String>,
    /// Contours des unités filles
    pub geojson: Option<Arc<FeatureCollection>>,
    /// Contours fusionnés par EPCI
    pub geojson_epci: Option<Arc<FeatureCollection>>,
    /// Communes de l'unité avec leurs critères
    pub cities: Option<Arc<Vec<CityRecord>>>,
}

impl SelectedArea {
    /// Racine France, sans contours
    pub fn france() -> Self {
        Self {
            insee_geo: COUNTRY_CODE.to_string(),
            name: "France".to_string(),
            ..Default::default()
        }
    }

    pub fn from_parent(area: &ParentArea) -> Self {
        Self {
            insee_geo: area.insee_geo.clone(),
            name: area.name.clone(),
            kind: Some(area.kind),
            insee_reg: area.insee_reg.clone(),
            insee_dep: area.insee_dep.clone(),
            ..Default::default()
        }
    }
}

/// Entrée de `selected_areas` : une unité agrégée ou une commune
#[derive(Debug, Clone)]
pub enum AreaEntry {
    Area(Arc<SelectedArea>),
    City(Arc<CityRecord>),
}

impl AreaEntry {
    /// Code de l'unité (SIRET pour une commune)
    pub fn code(&self) -> &str {
        match self {
            AreaEntry::Area(area) => &area.insee_geo,
            AreaEntry::City(city) => &city.siret,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AreaEntry::Area(area) => &area.name,
            AreaEntry::City(city) => &city.name,
        }
    }

    pub fn as_area(&self) -> Option<&SelectedArea> {
        match self {
            AreaEntry::Area(area) => Some(area),
            AreaEntry::City(_) => None,
        }
    }

    pub fn as_city(&self) -> Option<&CityRecord> {
        match self {
            AreaEntry::City(city) => Some(city),
            AreaEntry::Area(_) => None,
        }
    }
}

impl From<SelectedArea> for AreaEntry {
    fn from(area: SelectedArea) -> Self {
        AreaEntry::Area(Arc::new(area))
    }
}

impl From<CityRecord> for AreaEntry {
    fn from(city: CityRecord) -> Self {
        AreaEntry::City(Arc::new(city))
    }
}

pub type SelectedAreas = BTreeMap<GeographicLevel, AreaEntry>;

/// Source unique de vérité pour l'interface
#[derive(Debug, Clone, Default)]
pub struct MapState {
    pub current_level: GeographicLevel,
    pub selected_areas: SelectedAreas,
    pub department_view: DepartmentView,
    pub region_view: RegionView,
    pub filters: Filters,
    /// Panneau latéral ouvert (préoccupation purement UI)
    pub panel_open: bool,
}

impl MapState {
    pub fn entry(&self, level: GeographicLevel) -> Option<&AreaEntry> {
        self.selected_areas.get(&level)
    }

    pub fn area(&self, level: GeographicLevel) -> Option<&SelectedArea> {
        self.entry(level).and_then(AreaEntry::as_area)
    }

    pub fn city(&self) -> Option<&CityRecord> {
        self.entry(GeographicLevel::City).and_then(AreaEntry::as_city)
    }

    pub fn current_entry(&self) -> Option<&AreaEntry> {
        self.entry(self.current_level)
    }

    /// Code de l'unité courante (SIRET au niveau commune)
    pub fn current_code(&self) -> Option<&str> {
        self.current_entry().map(AreaEntry::code)
    }

    /// Vrai si la région courante affiche ses communes
    pub fn is_region_city_view(&self) -> bool {
        self.current_level == GeographicLevel::Region && self.region_view == RegionView::City
    }

    /// Niveau atteint par "retour"
    pub fn previous_level(&self) -> Option<GeographicLevel> {
        match self.current_level {
            GeographicLevel::City => Some(if self.entry(GeographicLevel::Epci).is_some() {
                GeographicLevel::Epci
            } else {
                GeographicLevel::Department
            }),
            GeographicLevel::Epci => Some(GeographicLevel::Department),
            GeographicLevel::Department => Some(GeographicLevel::Region),
            GeographicLevel::Region => Some(GeographicLevel::Country),
            GeographicLevel::Country => None,
        }
    }

    /// Niveau atteint en cliquant sur une unité affichée
    pub fn next_level(&self) -> GeographicLevel {
        match self.current_level {
            GeographicLevel::Country => GeographicLevel::Region,
            GeographicLevel::Region if self.region_view == RegionView::City => GeographicLevel::City,
            GeographicLevel::Region if self.region_view == RegionView::Epci => GeographicLevel::Epci,
            GeographicLevel::Region => GeographicLevel::Department,
            GeographicLevel::Department => match self.department_view {
                DepartmentView::Epci => GeographicLevel::Epci,
                DepartmentView::City => GeographicLevel::City,
            },
            GeographicLevel::Epci | GeographicLevel::City => GeographicLevel::City,
        }
    }

    /// Fil d'Ariane : (niveau, nom) du plus grossier au plus fin
    pub fn breadcrumbs(&self) -> Vec<(GeographicLevel, &str)> {
        self.selected_areas
            .iter()
            .rev()
            .map(|(level, entry)| (*level, entry.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(code: &str, name: &str) -> AreaEntry {
        SelectedArea {
            insee_geo: code.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_previous_level_of_city() {
        let mut state = MapState {
            current_level: GeographicLevel::City,
            ..Default::default()
        };
        assert_eq!(state.previous_level(), Some(GeographicLevel::Department));

        state
            .selected_areas
            .insert(GeographicLevel::Epci, area("200040715", "Grenoble-Alpes-Métropole"));
        assert_eq!(state.previous_level(), Some(GeographicLevel::Epci));

        state.current_level = GeographicLevel::Country;
        assert_eq!(state.previous_level(), None);
    }

    #[test]
    fn test_next_level_follows_views() {
        let mut state = MapState {
            current_level: GeographicLevel::Department,
            ..Default::default()
        };
        assert_eq!(state.next_level(), GeographicLevel::Epci);
        state.department_view = DepartmentView::City;
        assert_eq!(state.next_level(), GeographicLevel::City);

        state.current_level = GeographicLevel::Region;
        assert_eq!(state.next_level(), GeographicLevel::Department);
        state.region_view = RegionView::City;
        assert_eq!(state.next_level(), GeographicLevel::City);
        state.region_view = RegionView::Epci;
        assert_eq!(state.next_level(), GeographicLevel::Epci);
    }

    #[test]
    fn test_breadcrumbs_order() {
        let mut state = MapState::default();
        state
            .selected_areas
            .insert(GeographicLevel::Department, area("38", "Isère"));
        state
            .selected_areas
            .insert(GeographicLevel::Country, SelectedArea::france().into());
        state
            .selected_areas
            .insert(GeographicLevel::Region, area("r84", "Auvergne-Rhône-Alpes"));

        let names: Vec<&str> = state.breadcrumbs().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["France", "Auvergne-Rhône-Alpes", "Isère"]);
    }

    #[test]
    fn test_empty_service_filter_is_no_filter() {
        let filters = Filters {
            service_ids: Some(vec![]),
            ..Default::default()
        };
        assert!(filters.selected_services().is_none());
    }
}
