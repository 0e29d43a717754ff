//! Fusion (dissolve) des polygones communaux par groupe
//!
//! Chaque groupe (typiquement un EPCI, clé `EPCI_SIREN`) produit une seule
//! feature dont la géométrie est l'union des géométries membres et dont les
//! propriétés sont remplacées par la fiche du référentiel.

pub mod fallback;
pub mod union;

use std::collections::BTreeMap;

use geo::MultiPolygon;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::reference::ParentAreas;
use crate::types::ParentArea;
use crate::TerritoireError;

/// Propriété portant le SIREN de l'EPCI dans les GeoJSON communaux
pub const EPCI_GROUP_PROPERTY: &str = "EPCI_SIREN";

/// Valeur sentinelle des groupes absents du référentiel
pub const UNKNOWN_EPCI: &str = "EPCI inconnue";

/// Fusionne les features par clé de groupe
///
/// Le regroupement est stable : les groupes sont émis dans l'ordre de leur clé,
/// quel que soit l'ordre des features en entrée. Une feature sans clé rejoint
/// le groupe de clé vide.
pub fn dissolve<F>(
    collection: &FeatureCollection,
    group_key: F,
    areas: &ParentAreas,
) -> FeatureCollection
where
    F: Fn(&Feature) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<&Feature>> = BTreeMap::new();
    for feature in &collection.features {
        let key = group_key(feature).unwrap_or_default();
        groups.entry(key).or_default().push(feature);
    }

    let groups: Vec<(String, Vec<&Feature>)> = groups.into_iter().collect();

    let features: Vec<Feature> = groups
        .par_iter()
        .map(|(key, members)| dissolve_group(key, members, areas.find(key)))
        .collect();

    debug!(
        input = collection.features.len(),
        output = features.len(),
        "Dissolve done"
    );

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Fusion des communes par EPCI (`EPCI_SIREN`)
pub fn dissolve_epci(collection: &FeatureCollection, areas: &ParentAreas) -> FeatureCollection {
    dissolve(collection, |f| string_property(f, EPCI_GROUP_PROPERTY), areas)
}

/// Lit une propriété texte (les nombres sont convertis)
pub fn string_property(feature: &Feature, key: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn dissolve_group(key: &str, members: &[&Feature], record: Option<&ParentArea>) -> Feature {
    let properties = group_properties(record);

    if let [single] = members {
        // Un seul membre : géométrie inchangée
        return Feature {
            bbox: None,
            geometry: single.geometry.clone(),
            id: single.id.clone(),
            properties: Some(properties),
            foreign_members: None,
        };
    }

    let shapes: Vec<MultiPolygon<f64>> = members
        .iter()
        .filter_map(|f| match to_multi_polygon(f) {
            Ok(mp) => Some(mp),
            Err(e) => {
                warn!(group = %key, error = %e, "Skipping non-polygonal member");
                None
            }
        })
        .collect();

    let merged = match union::union_all(key, &shapes) {
        Ok(mp) => mp,
        Err(e) => {
            warn!(group = %key, error = %e, "Union failed, keeping members unmodified");
            fallback::merge_unmodified(&shapes)
        }
    };

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&merged))),
        id: Some(Id::String(key.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

fn group_properties(record: Option<&ParentArea>) -> JsonObject {
    let (name, insee_geo, insee_reg, insee_dep) = match record {
        Some(r) => (
            r.name.clone(),
            r.insee_geo.clone(),
            r.insee_reg.clone().unwrap_or_default(),
            r.insee_dep.clone().unwrap_or_default(),
        ),
        None => (
            UNKNOWN_EPCI.to_string(),
            UNKNOWN_EPCI.to_string(),
            UNKNOWN_EPCI.to_string(),
            UNKNOWN_EPCI.to_string(),
        ),
    };

    let mut properties = JsonObject::new();
    properties.insert("NAME".to_string(), JsonValue::String(name));
    properties.insert("INSEE_GEO".to_string(), JsonValue::String(insee_geo));
    properties.insert("INSEE_REG".to_string(), JsonValue::String(insee_reg));
    properties.insert("INSEE_DEP".to_string(), JsonValue::String(insee_dep));
    properties
}

/// Convertit la géométrie d'une feature en `MultiPolygon`
pub fn to_multi_polygon(feature: &Feature) -> Result<MultiPolygon<f64>, TerritoireError> {
    let entity_id = feature
        .id
        .as_ref()
        .map(|id| match id {
            Id::String(s) => s.clone(),
            Id::Number(n) => n.to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string());

    let Some(geometry) = feature.geometry.clone() else {
        return Err(TerritoireError::invalid_geometry(entity_id, "missing geometry"));
    };

    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    match geometry {
        geo::Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        _ => Err(TerritoireError::invalid_geometry(
            entity_id,
            "expected Polygon or MultiPolygon",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};
    use serde_json::json;

    fn commune(epci: &str, x: f64) -> Feature {
        let poly = polygon![
            (x: x, y: 0.0),
            (x: x + 1.0, y: 0.0),
            (x: x + 1.0, y: 1.0),
            (x: x, y: 1.0),
            (x: x, y: 0.0),
        ];
        let mut properties = JsonObject::new();
        properties.insert("EPCI_SIREN".to_string(), json!(epci));
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&poly))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }

    fn areas() -> ParentAreas {
        ParentAreas::from_json(
            r#"[{"insee_geo": "200040715", "name": "Grenoble-Alpes-Métropole", "type": "epci", "insee_reg": "r84", "insee_dep": "38"}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_known_group_properties() {
        let fc = FeatureCollection {
            bbox: None,
            features: vec![commune("200040715", 0.0), commune("200040715", 1.0)],
            foreign_members: None,
        };
        let out = dissolve_epci(&fc, &areas());
        assert_eq!(out.features.len(), 1);

        let props = out.features[0].properties.as_ref().unwrap();
        assert_eq!(props["NAME"], json!("Grenoble-Alpes-Métropole"));
        assert_eq!(props["INSEE_DEP"], json!("38"));

        let area = to_multi_polygon(&out.features[0]).unwrap().unsigned_area();
        assert!((area - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_group_is_kept() {
        let fc = FeatureCollection {
            bbox: None,
            features: vec![commune("999999999", 0.0)],
            foreign_members: None,
        };
        let out = dissolve_epci(&fc, &areas());
        assert_eq!(out.features.len(), 1);
        let props = out.features[0].properties.as_ref().unwrap();
        assert_eq!(props["NAME"], json!(UNKNOWN_EPCI));
        assert_eq!(props["INSEE_GEO"], json!(UNKNOWN_EPCI));
    }

    #[test]
    fn test_string_property_accepts_numbers() {
        let mut f = commune("x", 0.0);
        f.properties
            .as_mut()
            .unwrap()
            .insert("EPCI_SIREN".to_string(), json!(200040715));
        assert_eq!(string_property(&f, "EPCI_SIREN").as_deref(), Some("200040715"));
        assert_eq!(string_property(&f, "ABSENT"), None);
    }

    #[test]
    fn test_point_is_not_polygonal() {
        let f = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![1.0, 2.0]))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        assert!(to_multi_polygon(&f).is_err());
    }
}
