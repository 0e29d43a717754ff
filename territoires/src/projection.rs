//! Projection Web Mercator (EPSG:3857)
//!
//! Modèle sphérique avec le rayon équatorial WGS84. Sert de plan métrique
//! pour le hexbinning ; l'aller et le retour utilisent les mêmes constantes.

use geo::Coord;

/// Demi-grand axe WGS84 (mètres)
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude maximale représentable (degrés)
const MAX_LATITUDE: f64 = 85.0;

/// Convertit des degrés (lon, lat) vers Web Mercator (mètres)
pub fn to_web_mercator(lon: f64, lat: f64) -> Coord {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let lon = lon.to_radians();

    Coord {
        x: EARTH_RADIUS * lon,
        y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Convertit Web Mercator (mètres) vers des degrés (x = lon, y = lat)
pub fn from_web_mercator(x: f64, y: f64) -> Coord {
    let lon = x / EARTH_RADIUS;
    let lat = 2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2;

    Coord {
        x: lon.to_degrees(),
        y: lat.to_degrees(),
    }
}
