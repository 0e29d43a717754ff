//! Union des polygones d'un groupe

use std::panic::{self, AssertUnwindSafe};

use geo::{BooleanOps, MultiPolygon};

use crate::TerritoireError;

/// Calcule l'union de toutes les géométries d'un groupe
///
/// Le moteur booléen de `geo` peut paniquer sur des topologies dégénérées :
/// la panique est convertie en `TerritoireError::UnionFailed`.
pub fn union_all(
    group: &str,
    shapes: &[MultiPolygon<f64>],
) -> Result<MultiPolygon<f64>, TerritoireError> {
    if shapes.is_empty() {
        return Err(TerritoireError::union_failed(group, "no polygonal member"));
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        shapes.iter().cloned().reduce(|a, b| a.union(&b))
    }));

    match result {
        Ok(Some(merged)) if !merged.0.is_empty() => Ok(merged),
        Ok(_) => Err(TerritoireError::union_failed(group, "empty union result")),
        Err(_) => Err(TerritoireError::union_failed(group, "boolean operation panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn test_adjacent_squares_merge() {
        let merged = union_all("g", &[square(0.0, 0.0), square(1.0, 0.0), square(0.0, 1.0)]).unwrap();
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_squares_stay_separate() {
        let merged = union_all("g", &[square(0.0, 0.0), square(5.0, 5.0)]).unwrap();
        assert_eq!(merged.0.len(), 2);
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_group() {
        assert!(union_all("g", &[]).is_err());
    }
}
