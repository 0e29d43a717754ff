//! Annotation des contours affichés : statistiques et couleur par unité
//!
//! Deux tableaux de bord partagent la même mécanique : conformité (critères
//! RCPNT, score 0 à 2) et déploiement (services utilisés, part des communes).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geojson::{Feature, FeatureCollection};
use serde::{Deserialize, Serialize};
use territoires::dissolve::{string_property, EPCI_GROUP_PROPERTY};
use territoires::level::strip_region_prefix;
use territoires::stats::{matched_services, ConformityContext, DeploymentContext};
use territoires::{
    conformity_stats, deployment_stats, hex_bin, AreaStats, CityRecord, ColorScale,
    ConformityRefs, ConformityTables, DeploymentRecord, GeographicLevel, HexPoint, ParentAreas,
    TerritoireError,
};
use tracing::debug;

use crate::config::HexbinConfig;
use crate::display::CODE_PROPERTY;
use crate::state::{DepartmentView, MapState, RegionView};

/// Propriété portant le SIRET des communes
pub const SIRET_PROPERTY: &str = "SIRET";

/// Statistiques et couleur d'une unité affichée
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDatum {
    #[serde(flatten)]
    pub stats: AreaStats,
    pub color: String,
}

/// Annotation par code d'unité
pub type MapData = BTreeMap<String, MapDatum>;

/// Code d'une feature : `INSEE_GEO`, à défaut `EPCI_SIREN` ou `SIRET`
pub fn feature_code(feature: &Feature) -> Option<String> {
    string_property(feature, CODE_PROPERTY)
        .or_else(|| string_property(feature, EPCI_GROUP_PROPERTY))
        .or_else(|| string_property(feature, SIRET_PROPERTY))
}

/// Niveau des unités affichées pour l'état courant
pub fn score_level(state: &MapState) -> GeographicLevel {
    match state.current_level {
        GeographicLevel::Country => GeographicLevel::Region,
        GeographicLevel::Region => match state.region_view {
            RegionView::Department => GeographicLevel::Department,
            RegionView::City => GeographicLevel::City,
            RegionView::Epci => GeographicLevel::Epci,
        },
        GeographicLevel::Department => match state.department_view {
            DepartmentView::City => GeographicLevel::City,
            DepartmentView::Epci => GeographicLevel::Epci,
        },
        GeographicLevel::Epci | GeographicLevel::City => GeographicLevel::City,
    }
}

/// Communes connues pour l'état : celles de la région en vue communes,
/// sinon celles du département
pub fn context_cities(state: &MapState) -> &[CityRecord] {
    let cities = if state.is_region_city_view() {
        state.area(GeographicLevel::Region)
    } else {
        state.area(GeographicLevel::Department)
    }
    .and_then(|area| area.cities.as_deref());

    cities.map(Vec::as_slice).unwrap_or(&[])
}

/// Calcul des statistiques d'un tableau de bord
pub trait AreaScorer {
    /// `siret` : SIRET de la feature au niveau commune
    fn stats(&self, level: GeographicLevel, code: &str, siret: Option<&str>) -> Option<AreaStats>;

    fn scale(&self) -> &ColorScale;

    /// Valeur servant à la couleur
    fn color_value(&self, _level: GeographicLevel, stats: &AreaStats) -> Option<f64> {
        stats.score
    }
}

/// Annote chaque feature de `collection`
///
/// Les unités sans donnée reçoivent la couleur par défaut.
pub fn annotate(
    state: &MapState,
    collection: &FeatureCollection,
    scorer: &dyn AreaScorer,
) -> MapData {
    let level = score_level(state);
    let mut data = MapData::new();

    for feature in &collection.features {
        let Some(code) = feature_code(feature) else {
            continue;
        };
        let siret = string_property(feature, SIRET_PROPERTY);
        let stats = scorer
            .stats(level, &code, siret.as_deref())
            .unwrap_or_default();
        let color = scorer.scale().color_or_default(scorer.color_value(level, &stats));
        data.insert(code, MapDatum { stats, color });
    }

    debug!(level = %level, units = data.len(), "Map data annotated");
    data
}

/// Tableau de bord conformité
pub struct ConformityScorer<'a> {
    tables: ConformityTables,
    cities: &'a [CityRecord],
    refs: &'a ConformityRefs,
    criterion: Option<&'a str>,
    scale: ColorScale,
}

impl<'a> ConformityScorer<'a> {
    pub fn new(
        state: &'a MapState,
        tables: ConformityTables,
        refs: &'a ConformityRefs,
        scale: ColorScale,
    ) -> Self {
        Self {
            tables,
            cities: context_cities(state),
            refs,
            criterion: state
                .filters
                .criterion
                .as_deref()
                .filter(|c| !c.is_empty()),
            scale,
        }
    }

    /// Vrai tant que les statistiques régionales ne sont pas chargées
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl AreaScorer for ConformityScorer<'_> {
    fn stats(&self, level: GeographicLevel, code: &str, _siret: Option<&str>) -> Option<AreaStats> {
        let ctx = ConformityContext {
            tables: &self.tables,
            cities: self.cities,
            refs: self.refs,
        };
        conformity_stats(level, code, &ctx, self.criterion)
    }

    fn scale(&self) -> &ColorScale {
        &self.scale
    }

    /// Une commune qui satisfait le critère filtré prend la couleur d'un
    /// agrégat entièrement conforme (échelle 0..2)
    fn color_value(&self, level: GeographicLevel, stats: &AreaStats) -> Option<f64> {
        match (level, self.criterion) {
            (GeographicLevel::City, Some(_)) => stats.score.map(|s| s * 2.0),
            _ => stats.score,
        }
    }
}

/// Annotation conformité, vide tant que les régions ne sont pas chargées
pub fn conformity_map_data(
    state: &MapState,
    collection: &FeatureCollection,
    scorer: &ConformityScorer<'_>,
) -> MapData {
    if scorer.is_empty() {
        return MapData::new();
    }
    annotate(state, collection, scorer)
}

/// Tableau de bord déploiement
pub struct DeploymentScorer<'a> {
    records: &'a [DeploymentRecord],
    areas: &'a ParentAreas,
    selected: Option<&'a [String]>,
    scale: ColorScale,
}

impl<'a> DeploymentScorer<'a> {
    pub fn new(
        state: &'a MapState,
        records: &'a [DeploymentRecord],
        areas: &'a ParentAreas,
        scale: ColorScale,
    ) -> Self {
        Self {
            records,
            areas,
            selected: state.filters.selected_services(),
            scale,
        }
    }
}

impl AreaScorer for DeploymentScorer<'_> {
    fn stats(&self, level: GeographicLevel, code: &str, siret: Option<&str>) -> Option<AreaStats> {
        let ctx = DeploymentContext {
            records: self.records,
            areas: self.areas,
        };
        let code = match level {
            GeographicLevel::City => siret.unwrap_or(code),
            _ => code,
        };
        deployment_stats(level, code, &ctx, self.selected)
    }

    fn scale(&self) -> &ColorScale {
        &self.scale
    }

    /// Part des communes utilisatrices pour les niveaux agrégés
    fn color_value(&self, _level: GeographicLevel, stats: &AreaStats) -> Option<f64> {
        match (stats.score, stats.n_cities, stats.n_total_cities) {
            (Some(score), _, _) => Some(score),
            (None, Some(n), Some(total)) if total > 0 => Some(n as f64 / total as f64),
            _ => None,
        }
    }
}

/// Coordonnées d'une commune
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

/// Coordonnées par SIREN (9 premiers caractères du SIRET)
pub type SirenCoordinates = HashMap<String, Coordinates>;

/// Services présents dans les statistiques, triés
pub fn known_services(records: &[DeploymentRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.all_services.iter().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// Couche hexagonale du déploiement (pays et région seulement)
pub fn deployment_hexbins(
    state: &MapState,
    records: &[DeploymentRecord],
    coordinates: &SirenCoordinates,
    all_services: &[String],
    hexbin: &HexbinConfig,
) -> Result<Option<FeatureCollection>, TerritoireError> {
    let (cell_size, region) = match state.current_level {
        GeographicLevel::Country => (hexbin.country_cell_size, None),
        GeographicLevel::Region => (
            hexbin.region_cell_size,
            state.current_code().map(strip_region_prefix),
        ),
        _ => return Ok(None),
    };

    let selected = state.filters.selected_services().unwrap_or(all_services);
    let records: Vec<&DeploymentRecord> = records
        .iter()
        .filter(|r| match region {
            Some(code) => r.reg.as_deref().map(strip_region_prefix) == Some(code),
            None => true,
        })
        .collect();

    let points = hexbin_points(records, coordinates, selected);
    let max_weight = u32::try_from(selected.len()).unwrap_or(u32::MAX);
    hex_bin(&points, cell_size, max_weight).map(Some)
}

/// Points pondérés des communes localisées
///
/// Poids = nombre de services de la commune parmi `selected`. Les communes
/// sans coordonnées (ou à zéro) sont ignorées.
pub fn hexbin_points<'a>(
    records: impl IntoIterator<Item = &'a DeploymentRecord>,
    coordinates: &SirenCoordinates,
    selected: &[String],
) -> Vec<HexPoint> {
    records
        .into_iter()
        .filter_map(|r| {
            let coords = coordinates.get(r.siren())?;
            if coords.longitude == 0.0 || coords.latitude == 0.0 {
                return None;
            }
            Some(HexPoint::new(
                coords.longitude,
                coords.latitude,
                matched_services(r, selected),
            ))
        })
        .collect()
}

/// Rattache à chaque commune sa ligne de déploiement
pub fn enrich_cities(cities: &mut [CityRecord], records: &[DeploymentRecord]) {
    let by_siret: HashMap<&str, &DeploymentRecord> =
        records.iter().map(|r| (r.id.as_str(), r)).collect();

    for city in cities.iter_mut() {
        if let Some(record) = by_siret.get(city.siret.as_str()) {
            city.additional_city_stats = Some((*record).clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SelectedArea;
    use geojson::JsonObject;
    use serde_json::json;
    use std::sync::Arc;
    use territoires::{Gradient, StatRecord, DEFAULT_COLOR};

    fn feature(properties: &[(&str, &str)]) -> Feature {
        let mut object = JsonObject::new();
        for (key, value) in properties {
            object.insert(key.to_string(), json!(value));
        }
        Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: Some(object),
            foreign_members: None,
        }
    }

    fn collection(features: Vec<Feature>) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    #[test]
    fn test_feature_code_priority() {
        let f = feature(&[("SIRET", "21380185000017"), ("INSEE_GEO", "38185")]);
        assert_eq!(feature_code(&f).as_deref(), Some("38185"));
        let f = feature(&[("EPCI_SIREN", "200040715")]);
        assert_eq!(feature_code(&f).as_deref(), Some("200040715"));
        assert!(feature_code(&feature(&[("NAME", "x")])).is_none());
    }

    #[test]
    fn test_score_level() {
        let mut state = MapState::default();
        assert_eq!(score_level(&state), GeographicLevel::Region);

        state.current_level = GeographicLevel::Region;
        assert_eq!(score_level(&state), GeographicLevel::Department);
        state.region_view = RegionView::City;
        assert_eq!(score_level(&state), GeographicLevel::City);
        state.region_view = RegionView::Epci;
        assert_eq!(score_level(&state), GeographicLevel::Epci);

        state.current_level = GeographicLevel::Department;
        assert_eq!(score_level(&state), GeographicLevel::Epci);
        state.department_view = DepartmentView::City;
        assert_eq!(score_level(&state), GeographicLevel::City);
    }

    #[test]
    fn test_conformity_annotation() {
        let state = MapState::default();
        let mut tables = ConformityTables::default();
        tables.region.insert(
            "84".to_string(),
            vec![
                StatRecord {
                    criterion: "a".to_string(),
                    valid: 10,
                    total: 10,
                    ..Default::default()
                },
                StatRecord {
                    criterion: "1.a".to_string(),
                    valid: 10,
                    total: 10,
                    ..Default::default()
                },
                StatRecord {
                    criterion: "2.a".to_string(),
                    valid: 10,
                    total: 10,
                    ..Default::default()
                },
            ],
        );
        let refs = ConformityRefs::default();
        let scale = ColorScale::new(&Gradient::conformity()).unwrap();
        let scorer = ConformityScorer::new(&state, tables, &refs, scale);

        let regions = collection(vec![
            feature(&[("INSEE_GEO", "r84")]),
            feature(&[("INSEE_GEO", "r11")]),
        ]);
        let data = conformity_map_data(&state, &regions, &scorer);

        assert_eq!(data["r84"].stats.score, Some(2.0));
        assert_eq!(data["r84"].color, "#009081");
        assert_eq!(data["r11"].stats.score, None);
        assert_eq!(data["r11"].color, DEFAULT_COLOR);
    }

    #[test]
    fn test_city_criterion_color_matches_aggregate_scale() {
        let cities = ["38185", "38151"]
            .iter()
            .map(|insee| CityRecord {
                insee_geo: insee.to_string(),
                rcpnt: Some(if *insee == "38185" {
                    vec!["1.a".to_string()]
                } else {
                    vec![]
                }),
                ..Default::default()
            })
            .collect();
        let department = SelectedArea {
            insee_geo: "38".to_string(),
            cities: Some(Arc::new(cities)),
            ..Default::default()
        };

        let mut state = MapState {
            current_level: GeographicLevel::Department,
            department_view: DepartmentView::City,
            ..Default::default()
        };
        state
            .selected_areas
            .insert(GeographicLevel::Department, department.into());
        state.filters.criterion = Some("1.a".to_string());

        let mut tables = ConformityTables::default();
        tables.region.insert("84".to_string(), vec![]);
        let refs = ConformityRefs::default();
        let scale = ColorScale::new(&Gradient::conformity()).unwrap();
        let scorer = ConformityScorer::new(&state, tables, &refs, scale);

        let communes = collection(vec![
            feature(&[("INSEE_GEO", "38185")]),
            feature(&[("INSEE_GEO", "38151")]),
        ]);
        let data = conformity_map_data(&state, &communes, &scorer);

        let expected = ColorScale::new(&Gradient::conformity()).unwrap();
        assert_eq!(data["38185"].stats.score, Some(1.0));
        assert_eq!(data["38185"].color, expected.color(2.0));
        assert_eq!(data["38151"].stats.score, Some(0.0));
        assert_eq!(data["38151"].color, expected.color(0.0));
    }

    #[test]
    fn test_conformity_empty_until_regions_loaded() {
        let state = MapState::default();
        let refs = ConformityRefs::default();
        let scale = ColorScale::new(&Gradient::conformity()).unwrap();
        let scorer = ConformityScorer::new(&state, ConformityTables::default(), &refs, scale);

        let regions = collection(vec![feature(&[("INSEE_GEO", "r84")])]);
        assert!(conformity_map_data(&state, &regions, &scorer).is_empty());
    }

    fn record(id: &str, reg: &str, services: &[&str]) -> DeploymentRecord {
        DeploymentRecord {
            id: id.to_string(),
            reg: Some(reg.to_string()),
            all_services: services.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_deployment_city_uses_siret() {
        let mut state = MapState {
            current_level: GeographicLevel::Department,
            department_view: DepartmentView::City,
            ..Default::default()
        };
        state.selected_areas.insert(
            GeographicLevel::Department,
            SelectedArea {
                insee_geo: "38".to_string(),
                cities: Some(Arc::new(vec![])),
                ..Default::default()
            }
            .into(),
        );

        let records = vec![record("21380185000017", "84", &["1"])];
        let areas = ParentAreas::default();
        let scale = ColorScale::new(&Gradient::deployment()).unwrap();
        let scorer = DeploymentScorer::new(&state, &records, &areas, scale);

        let cities = collection(vec![
            feature(&[("INSEE_GEO", "38185"), ("SIRET", "21380185000017")]),
            feature(&[("INSEE_GEO", "38001"), ("SIRET", "21380001000010")]),
        ]);
        let data = annotate(&state, &cities, &scorer);

        assert_eq!(data["38185"].stats.score, Some(1.0));
        assert_eq!(data["38185"].color, "#2a3c84");
        assert_eq!(data["38001"].stats.score, Some(0.0));
        assert_eq!(data["38001"].color, "#eeeeee");
    }

    #[test]
    fn test_deployment_hexbins_only_at_top_levels() {
        let hexbin = HexbinConfig {
            country_cell_size: 15000.0,
            region_cell_size: 12000.0,
        };
        let records = vec![
            record("21380185000017", "84", &["1", "2"]),
            record("21750001600019", "11", &["1"]),
        ];
        let mut coordinates = SirenCoordinates::new();
        coordinates.insert(
            "213801850".to_string(),
            Coordinates {
                longitude: 5.72,
                latitude: 45.18,
            },
        );
        coordinates.insert(
            "217500016".to_string(),
            Coordinates {
                longitude: 2.35,
                latitude: 48.85,
            },
        );
        let services = known_services(&records);
        assert_eq!(services, vec!["1".to_string(), "2".to_string()]);

        let mut state = MapState::default();
        let layer = deployment_hexbins(&state, &records, &coordinates, &services, &hexbin)
            .unwrap()
            .unwrap();
        assert_eq!(layer.features.len(), 2);

        state.current_level = GeographicLevel::Region;
        state.selected_areas.insert(
            GeographicLevel::Region,
            SelectedArea {
                insee_geo: "r84".to_string(),
                ..Default::default()
            }
            .into(),
        );
        let layer = deployment_hexbins(&state, &records, &coordinates, &services, &hexbin)
            .unwrap()
            .unwrap();
        assert_eq!(layer.features.len(), 1);
        let score = layer.features[0]
            .properties
            .as_ref()
            .and_then(|p| p.get("score"))
            .and_then(|s| s.as_f64());
        assert_eq!(score, Some(1.0));

        state.current_level = GeographicLevel::Department;
        assert!(
            deployment_hexbins(&state, &records, &coordinates, &services, &hexbin)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_enrich_cities() {
        let mut cities = vec![
            CityRecord {
                siret: "21380185000017".to_string(),
                ..Default::default()
            },
            CityRecord {
                siret: "21380001000010".to_string(),
                ..Default::default()
            },
        ];
        let records = vec![record("21380185000017", "84", &["1"])];
        enrich_cities(&mut cities, &records);

        assert!(cities[0].additional_city_stats.is_some());
        assert!(cities[1].additional_city_stats.is_none());
    }
}
