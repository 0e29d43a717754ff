//! # carto-collectivites
//!
//! Navigation cartographique multi-niveaux (pays, région, département, EPCI,
//! commune) et statistiques de conformité et de déploiement des collectivités.
//!
//! ## Features
//!
//! - Sources de données : API du portail (`reqwest`), répertoire local, cache de session
//! - Cache des statistiques avec déduplication des requêtes en cours
//! - Machine d'état de navigation avec jeton de génération (résultats périmés ignorés)
//! - Sélection des contours affichés et du contexte voisin
//! - Synchronisation avec la chaîne de requête de l'URL
//! - Annotation des contours (score, couleur) et couche hexagonale du déploiement
//!
//! ## Usage CLI
//!
//! ```bash
//! # Département de l'Isère en vue communes, depuis des réponses enregistrées
//! carto navigate --data-dir ./data --level department --code 38 --view city
//!
//! # Depuis une URL partagée, avec annotation
//! carto navigate --base-url https://portail.example.fr --url "?level=region&code=r84" --map-data map.json
//!
//! # Fusion EPCI d'un fichier communal
//! carto dissolve --input communes.geojson --output epci.geojson
//! ```

pub mod annotate;
pub mod config;
pub mod display;
pub mod navigation;
pub mod report;
pub mod source;
pub mod state;
pub mod stats_cache;
pub mod url;

pub use config::Config;
pub use navigation::{
    NavigationError, NavigationSource, Navigator, SearchResult, TransitionRequest,
};
pub use report::{TransitionReport, TransitionStatus};
pub use state::{AreaEntry, DepartmentView, Filters, MapState, RegionView, SelectedArea};
pub use url::UrlState;
