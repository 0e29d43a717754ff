//! Échelle de couleurs linéaire (dégradé entre paliers hexadécimaux)

use serde::{Deserialize, Serialize};

use crate::TerritoireError;

/// Couleur des unités sans donnée
pub const DEFAULT_COLOR: &str = "#e2e8f0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rgb(u8, u8, u8);

impl Rgb {
    fn parse(hex: &str) -> Result<Self, TerritoireError> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        let invalid = || TerritoireError::InvalidColor(hex.to_string());
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
        Rgb(
            mix(self.0, other.0),
            mix(self.1, other.1),
            mix(self.2, other.2),
        )
    }
}

/// Définition sérialisable d'un dégradé
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub domain: Vec<f64>,
    pub colors: Vec<String>,
}

impl Gradient {
    /// Dégradé du tableau de bord conformité (score 0 à 2)
    pub fn conformity() -> Self {
        Self {
            domain: vec![0.0, 1.0, 2.0],
            colors: vec![
                "#FF6868".to_string(),
                "#FFC579".to_string(),
                "#009081".to_string(),
            ],
        }
    }

    /// Dégradé du tableau de bord déploiement (score 0 à 1)
    pub fn deployment() -> Self {
        Self {
            domain: vec![0.0, 1.0],
            colors: vec!["#EEEEEE".to_string(), "#2A3C84".to_string()],
        }
    }
}

/// Échelle prête à l'emploi
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    stops: Vec<(f64, Rgb)>,
}

impl ColorScale {
    pub fn new(gradient: &Gradient) -> Result<Self, TerritoireError> {
        if gradient.domain.len() != gradient.colors.len() || gradient.domain.len() < 2 {
            return Err(TerritoireError::InvalidColor(format!(
                "{} stops for {} colors",
                gradient.domain.len(),
                gradient.colors.len()
            )));
        }
        if gradient.domain.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(TerritoireError::InvalidColor(
                "domain must be strictly increasing".to_string(),
            ));
        }

        let stops = gradient
            .domain
            .iter()
            .zip(&gradient.colors)
            .map(|(&v, c)| Rgb::parse(c).map(|rgb| (v, rgb)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { stops })
    }

    /// Couleur d'un score ; hors domaine, la valeur est ramenée aux bornes
    pub fn color(&self, value: f64) -> String {
        if !value.is_finite() {
            return DEFAULT_COLOR.to_string();
        }

        let (first, last) = (self.stops[0], self.stops[self.stops.len() - 1]);
        if value <= first.0 {
            return first.1.to_hex();
        }
        if value >= last.0 {
            return last.1.to_hex();
        }

        for pair in self.stops.windows(2) {
            let ((v0, c0), (v1, c1)) = (pair[0], pair[1]);
            if value <= v1 {
                let t = (value - v0) / (v1 - v0);
                return c0.lerp(c1, t).to_hex();
            }
        }
        last.1.to_hex()
    }

    /// Couleur d'un score optionnel (`None` = sans donnée)
    pub fn color_or_default(&self, value: Option<f64>) -> String {
        value
            .map(|v| self.color(v))
            .unwrap_or_else(|| DEFAULT_COLOR.to_string())
    }
}
