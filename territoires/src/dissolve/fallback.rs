//! Fallback quand l'union échoue : les polygones membres sont gardés tels quels

use geo::MultiPolygon;

/// Regroupe les polygones membres dans un seul `MultiPolygon`, sans union
pub fn merge_unmodified(shapes: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    MultiPolygon::new(shapes.iter().flat_map(|mp| mp.0.iter().cloned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_merge_unmodified() {
        let a = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)]]);
        let b = MultiPolygon::new(vec![polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 5.0, y: 6.0), (x: 5.0, y: 5.0)]]);

        let merged = merge_unmodified(&[a.clone(), b]);
        assert_eq!(merged.0.len(), 2);
        assert_eq!(merged.0[0], a.0[0]);
    }
}
