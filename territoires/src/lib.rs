//! # territoires
//!
//! Briques géographiques pour la cartographie des collectivités françaises.
//!
//! ## Features
//!
//! - Hiérarchie administrative (pays, région, département, EPCI, commune)
//! - Référentiel statique des régions, départements et EPCI
//! - Fusion des polygones communaux par EPCI (union `geo`, parallélisée avec `rayon`)
//! - Agrégation de points sur grille hexagonale en Web Mercator
//! - Scores de conformité et de déploiement par unité
//!
//! ## Usage
//!
//! ```rust,ignore
//! use territoires::{dissolve_epci, ParentAreas};
//! use std::path::Path;
//!
//! let areas = ParentAreas::load(Path::new("parent_areas.json"))?;
//! let communes: geojson::FeatureCollection = std::fs::read_to_string("38.json")?.parse()?;
//!
//! let epci = dissolve_epci(&communes, &areas);
//! println!("{} EPCI", epci.features.len());
//! ```

pub mod color;
pub mod dissolve;
pub mod error;
pub mod hexbin;
pub mod level;
pub mod projection;
pub mod reference;
pub mod stats;
pub mod types;

pub use color::{ColorScale, Gradient, DEFAULT_COLOR};
pub use dissolve::{dissolve, dissolve_epci};
pub use error::TerritoireError;
pub use hexbin::{hex_bin, HexGrid, HexPoint};
pub use level::{GeographicLevel, COUNTRY_CODE};
pub use reference::ParentAreas;
pub use stats::{conformity_stats, deployment_stats, ConformityRefs, ConformityTables};
pub use types::{AreaKind, AreaStats, CityRecord, DeploymentRecord, ParentArea, StatRecord};
