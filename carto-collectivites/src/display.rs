//! Sélection des contours à afficher pour un état

use std::sync::Arc;

use geojson::{Feature, FeatureCollection};
use territoires::dissolve::{string_property, EPCI_GROUP_PROPERTY};
use territoires::GeographicLevel;

use crate::state::{DepartmentView, MapState, RegionView};

/// Propriété portant le code d'unité dans les GeoJSON
pub const CODE_PROPERTY: &str = "INSEE_GEO";

/// Contours de l'état courant, `None` tant que rien n'est à afficher
pub fn displayed(state: &MapState) -> Option<Arc<FeatureCollection>> {
    let current = state.current_entry()?;

    match state.current_level {
        GeographicLevel::Country => current.as_area()?.geojson.clone(),
        GeographicLevel::Region => {
            let region = current.as_area()?;
            match state.region_view {
                RegionView::Epci => region.geojson_epci.clone(),
                RegionView::Department | RegionView::City => region.geojson.clone(),
            }
        }
        GeographicLevel::Department => {
            let department = current.as_area()?;
            match state.department_view {
                DepartmentView::City => department.geojson.clone(),
                DepartmentView::Epci => department.geojson_epci.clone(),
            }
        }
        GeographicLevel::Epci => epci_cities(state, current.code()).map(Arc::new),
        GeographicLevel::City => match state.entry(GeographicLevel::Epci) {
            Some(epci) => epci_cities(state, epci.code()).map(Arc::new),
            None => state.area(GeographicLevel::Department)?.geojson.clone(),
        },
    }
}

/// Communes du département courant appartenant à l'EPCI
fn epci_cities(state: &MapState, epci: &str) -> Option<FeatureCollection> {
    let cities = state.area(GeographicLevel::Department)?.geojson.as_ref()?;
    Some(filter_features(cities, |f| {
        string_property(f, EPCI_GROUP_PROPERTY).as_deref() == Some(epci)
    }))
}

/// Régions voisines : toutes les régions sauf la courante
pub fn region_neighbours(state: &MapState) -> Option<FeatureCollection> {
    if state.current_level != GeographicLevel::Region {
        return None;
    }
    let region = state.current_code()?;
    let country = state.area(GeographicLevel::Country)?.geojson.as_ref()?;

    let neighbours = filter_features(country, |f| {
        string_property(f, CODE_PROPERTY).as_deref() != Some(region)
    });
    (!neighbours.features.is_empty()).then_some(neighbours)
}

fn filter_features<F>(collection: &FeatureCollection, keep: F) -> FeatureCollection
where
    F: Fn(&Feature) -> bool,
{
    FeatureCollection {
        bbox: None,
        features: collection
            .features
            .iter()
            .filter(|f| keep(f))
            .cloned()
            .collect(),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SelectedArea;
    use geojson::JsonObject;
    use serde_json::json;
    use territoires::CityRecord;

    fn feature(key: &str, value: &str) -> Feature {
        let mut properties = JsonObject::new();
        properties.insert(key.to_string(), json!(value));
        Feature {
            bbox: None,
            geometry: None,
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }

    fn collection(features: Vec<Feature>) -> Arc<FeatureCollection> {
        Arc::new(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    fn department_state() -> MapState {
        let cities = collection(vec![
            feature(EPCI_GROUP_PROPERTY, "200040715"),
            feature(EPCI_GROUP_PROPERTY, "200040715"),
            feature(EPCI_GROUP_PROPERTY, "243800604"),
        ]);
        let epci = collection(vec![
            feature(CODE_PROPERTY, "200040715"),
            feature(CODE_PROPERTY, "243800604"),
        ]);

        let mut state = MapState {
            current_level: GeographicLevel::Department,
            ..Default::default()
        };
        state.selected_areas.insert(
            GeographicLevel::Department,
            SelectedArea {
                insee_geo: "38".to_string(),
                geojson: Some(cities),
                geojson_epci: Some(epci),
                ..Default::default()
            }
            .into(),
        );
        state
    }

    #[test]
    fn test_absent_level_gives_none() {
        let state = MapState::default();
        assert!(displayed(&state).is_none());
    }

    #[test]
    fn test_department_views() {
        let mut state = department_state();
        assert_eq!(displayed(&state).unwrap().features.len(), 2);

        state.department_view = DepartmentView::City;
        assert_eq!(displayed(&state).unwrap().features.len(), 3);
    }

    #[test]
    fn test_epci_filters_department_cities() {
        let mut state = department_state();
        state.current_level = GeographicLevel::Epci;
        state.selected_areas.insert(
            GeographicLevel::Epci,
            SelectedArea {
                insee_geo: "200040715".to_string(),
                ..Default::default()
            }
            .into(),
        );

        assert_eq!(displayed(&state).unwrap().features.len(), 2);

        state.current_level = GeographicLevel::City;
        state.selected_areas.insert(
            GeographicLevel::City,
            CityRecord {
                siret: "21380185000017".to_string(),
                ..Default::default()
            }
            .into(),
        );
        assert_eq!(displayed(&state).unwrap().features.len(), 2);

        state.selected_areas.remove(&GeographicLevel::Epci);
        assert_eq!(displayed(&state).unwrap().features.len(), 3);
    }

    #[test]
    fn test_region_neighbours() {
        let mut state = MapState {
            current_level: GeographicLevel::Region,
            ..Default::default()
        };
        let mut france = SelectedArea::france();
        france.geojson = Some(collection(vec![
            feature(CODE_PROPERTY, "r84"),
            feature(CODE_PROPERTY, "r11"),
            feature(CODE_PROPERTY, "r93"),
        ]));
        state
            .selected_areas
            .insert(GeographicLevel::Country, france.into());
        state.selected_areas.insert(
            GeographicLevel::Region,
            SelectedArea {
                insee_geo: "r84".to_string(),
                ..Default::default()
            }
            .into(),
        );

        assert_eq!(region_neighbours(&state).unwrap().features.len(), 2);

        state.current_level = GeographicLevel::Country;
        assert!(region_neighbours(&state).is_none());
    }
}
