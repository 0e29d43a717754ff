//! Agrégation de points sur une grille hexagonale
//!
//! Les points sont projetés en Web Mercator puis rangés dans une grille
//! "odd-r" : les lignes impaires sont décalées d'une demi-cellule.
//! Les cellules sont indexées par (colonne, ligne) entières, jamais par
//! les coordonnées flottantes de leur centre.

use std::collections::BTreeMap;

use geo::{Coord, LineString, Polygon};
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::json;
use tracing::debug;

use crate::projection::{from_web_mercator, to_web_mercator};
use crate::TerritoireError;

/// Point pondéré en coordonnées géographiques (degrés)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexPoint {
    pub lon: f64,
    pub lat: f64,
    /// Nombre d'éléments retenus pour ce point (ex: services utilisés)
    pub weight: u32,
}

impl HexPoint {
    pub fn new(lon: f64, lat: f64, weight: u32) -> Self {
        Self { lon, lat, weight }
    }

    /// Coordonnées finies et dans les bornes WGS84
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// Index d'une cellule dans la grille
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexCellIndex {
    pub row: i64,
    pub col: i64,
}

/// Cumuls d'une cellule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HexCell {
    /// Nombre de points tombés dans la cellule
    pub count: u32,
    /// Somme des poids
    pub matched: u64,
}

/// Grille hexagonale et ses cellules occupées
#[derive(Debug, Clone)]
pub struct HexGrid {
    /// Largeur entre côtés plats (mètres)
    cell_size: f64,
    cells: BTreeMap<HexCellIndex, HexCell>,
    skipped: usize,
}

impl HexGrid {
    pub fn new(cell_size: f64) -> Result<Self, TerritoireError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(TerritoireError::invalid_geometry(
                "hexgrid",
                format!("cell size must be positive, got {}", cell_size),
            ));
        }

        Ok(Self {
            cell_size,
            cells: BTreeMap::new(),
            skipped: 0,
        })
    }

    /// Construit la grille à partir d'un lot de points
    pub fn bin(points: &[HexPoint], cell_size: f64) -> Result<Self, TerritoireError> {
        let mut grid = Self::new(cell_size)?;
        for point in points {
            grid.insert(point);
        }
        debug!(
            points = points.len(),
            cells = grid.cells.len(),
            skipped = grid.skipped,
            "Hexbin grid built"
        );
        Ok(grid)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Espacement vertical entre deux lignes
    fn row_height(&self) -> f64 {
        3.0_f64.sqrt() * self.cell_size / 2.0
    }

    fn row_offset(&self, row: i64) -> f64 {
        if row.rem_euclid(2) == 1 {
            self.cell_size / 2.0
        } else {
            0.0
        }
    }

    /// Cellule contenant un point du plan (mètres)
    pub fn cell_index(&self, x: f64, y: f64) -> HexCellIndex {
        let row = (y / self.row_height()).round() as i64;
        let col = ((x - self.row_offset(row)) / self.cell_size).round() as i64;
        HexCellIndex { row, col }
    }

    /// Centre d'une cellule dans le plan (mètres)
    pub fn cell_center(&self, index: HexCellIndex) -> Coord {
        Coord {
            x: index.col as f64 * self.cell_size + self.row_offset(index.row),
            y: index.row as f64 * self.row_height(),
        }
    }

    /// Ajoute un point ; les points invalides sont ignorés silencieusement
    pub fn insert(&mut self, point: &HexPoint) -> bool {
        if !point.is_valid() {
            self.skipped += 1;
            return false;
        }

        let planar = to_web_mercator(point.lon, point.lat);
        let index = self.cell_index(planar.x, planar.y);
        let cell = self.cells.entry(index).or_default();
        cell.count += 1;
        cell.matched += u64::from(point.weight);
        true
    }

    pub fn cells(&self) -> impl Iterator<Item = (&HexCellIndex, &HexCell)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Nombre de points ignorés (coordonnées invalides)
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Nombre total de points retenus
    pub fn total_count(&self) -> u64 {
        self.cells.values().map(|c| u64::from(c.count)).sum()
    }

    /// Hexagone d'une cellule, sommets en degrés
    ///
    /// Rayon circonscrit = largeur entre côtés plats / √3, sommets tous les 60°
    /// à partir de 30°.
    pub fn hexagon(&self, index: HexCellIndex) -> Polygon<f64> {
        let center = self.cell_center(index);
        let radius = self.cell_size / 3.0_f64.sqrt();

        let mut ring: Vec<Coord> = (0..6)
            .map(|i| {
                let angle = (60.0 * i as f64 + 30.0).to_radians();
                from_web_mercator(
                    center.x + radius * angle.cos(),
                    center.y + radius * angle.sin(),
                )
            })
            .collect();
        ring.push(ring[0]);

        Polygon::new(LineString::new(ring), vec![])
    }

    /// Convertit les cellules non vides en features GeoJSON
    ///
    /// `score = matched / (max_weight × count)` ; les cellules sans poids ne
    /// sont pas émises.
    pub fn to_feature_collection(&self, max_weight: u32) -> FeatureCollection {
        let features: Vec<Feature> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.count > 0 && cell.matched > 0)
            .map(|(index, cell)| self.cell_feature(*index, cell, max_weight))
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }

    fn cell_feature(&self, index: HexCellIndex, cell: &HexCell, max_weight: u32) -> Feature {
        let possible = f64::from(max_weight.max(1)) * f64::from(cell.count);
        let score = cell.matched as f64 / possible;

        let center = self.cell_center(index);
        let center_geo = from_web_mercator(center.x, center.y);

        let mut properties = JsonObject::new();
        properties.insert("score".to_string(), json!(score));
        properties.insert("count".to_string(), json!(cell.count));
        properties.insert("matched".to_string(), json!(cell.matched));
        properties.insert("centerLon".to_string(), json!(center_geo.x));
        properties.insert("centerLat".to_string(), json!(center_geo.y));

        let polygon = self.hexagon(index);
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&polygon))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Agrège des points en hexagones et retourne les cellules non vides
pub fn hex_bin(
    points: &[HexPoint],
    cell_size: f64,
    max_weight: u32,
) -> Result<FeatureCollection, TerritoireError> {
    let grid = HexGrid::bin(points, cell_size)?;
    Ok(grid.to_feature_collection(max_weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_cell_size() {
        assert!(HexGrid::new(0.0).is_err());
        assert!(HexGrid::new(-5.0).is_err());
        assert!(HexGrid::new(f64::NAN).is_err());
    }

    #[test]
    fn test_odd_rows_are_offset() {
        let grid = HexGrid::new(1000.0).unwrap();
        let even = grid.cell_center(HexCellIndex { row: 0, col: 0 });
        let odd = grid.cell_center(HexCellIndex { row: 1, col: 0 });
        let negative_odd = grid.cell_center(HexCellIndex { row: -1, col: 0 });

        assert_eq!(even.x, 0.0);
        assert_eq!(odd.x, 500.0);
        assert_eq!(negative_odd.x, 500.0);
        assert!((odd.y - 866.025).abs() < 0.01);
    }

    #[test]
    fn test_center_maps_to_own_cell() {
        let grid = HexGrid::new(12000.0).unwrap();
        for row in -3..3 {
            for col in -3..3 {
                let index = HexCellIndex { row, col };
                let c = grid.cell_center(index);
                assert_eq!(grid.cell_index(c.x, c.y), index);
            }
        }
    }

    #[test]
    fn test_skip_invalid_points() {
        let points = vec![
            HexPoint::new(5.72, 45.18, 1),
            HexPoint::new(f64::NAN, 45.0, 1),
            HexPoint::new(200.0, 45.0, 1),
            HexPoint::new(5.0, f64::INFINITY, 1),
        ];
        let grid = HexGrid::bin(&points, 15000.0).unwrap();
        assert_eq!(grid.total_count(), 1);
        assert_eq!(grid.skipped(), 3);
    }

    #[test]
    fn test_hexagon_is_closed() {
        let grid = HexGrid::new(15000.0).unwrap();
        let hex = grid.hexagon(HexCellIndex { row: 400, col: 20 });
        let coords: Vec<_> = hex.exterior().coords().collect();
        assert_eq!(coords.len(), 7);
        assert_eq!(coords.first(), coords.last());
    }

    #[test]
    fn test_zero_weight_cells_are_dropped() {
        let points = vec![
            HexPoint::new(5.72, 45.18, 0),
            HexPoint::new(2.35, 48.85, 2),
            HexPoint::new(2.351, 48.851, 0),
        ];
        let fc = hex_bin(&points, 15000.0, 2).unwrap();
        assert_eq!(fc.features.len(), 1);

        let props = fc.features[0].properties.as_ref().unwrap();
        assert_eq!(props["count"], json!(2));
        assert_eq!(props["matched"], json!(2));
        // 2 / (2 services × 2 communes)
        assert_eq!(props["score"], json!(0.5));
    }
}
