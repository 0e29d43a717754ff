//! Définition et implémentation des commandes CLI
//!
//! - `navigate` : transition `quickNav` vers une unité, rapport et URL
//! - `dissolve` : fusion EPCI d'un GeoJSON communal
//! - `hexbin` : couche hexagonale du déploiement

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use geojson::{FeatureCollection, GeoJson};
use serde::Deserialize;
use tracing::{info, warn};

use carto_collectivites::annotate::{
    self, ConformityScorer, DeploymentScorer, MapData, SirenCoordinates,
};
use carto_collectivites::source::{CachedSource, DataSource, DirectorySource, HttpSource};
use carto_collectivites::state::{DepartmentView, Filters, MapState, RegionView};
use carto_collectivites::stats_cache::{required_scopes, StatsCache};
use carto_collectivites::url::{is_valid_period, UrlState};
use carto_collectivites::{Config, Navigator};
use territoires::{
    dissolve_epci, hex_bin, ColorScale, DeploymentRecord, GeographicLevel, ParentAreas,
    COUNTRY_CODE,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Navigate to an area (quickNav) and print the transition report
    Navigate {
        #[command(flatten)]
        data: DataArgs,

        /// Query string, e.g. "?level=department&code=38&view=city"
        #[arg(long, conflicts_with_all = ["level", "code"])]
        url: Option<String>,

        /// Target level (country, region, department, epci, city)
        #[arg(long)]
        level: Option<String>,

        /// Target code (INSEE code, "r"-prefixed region, SIRET for a city)
        #[arg(long)]
        code: Option<String>,

        /// View of the target (department: city/epci, region: department/city/epci)
        #[arg(long)]
        view: Option<String>,

        /// Single conformity criterion (e.g. 1.a)
        #[arg(long = "ref")]
        criterion: Option<String>,

        /// Period (YYYY-MM or "current")
        #[arg(long)]
        period: Option<String>,

        /// Selected services (comma separated)
        #[arg(long, value_delimiter = ',')]
        services: Option<Vec<String>>,

        /// Write the displayed GeoJSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the annotated map data to this file
        #[arg(long)]
        map_data: Option<PathBuf>,

        /// Annotate with deployment statistics instead of conformity
        #[arg(long)]
        deployment: bool,

        /// Write the transition report (JSON) to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Dissolve a communes GeoJSON by EPCI
    Dissolve {
        /// Communes GeoJSON (with EPCI_SIREN properties)
        #[arg(short, long)]
        input: PathBuf,

        /// Output GeoJSON
        #[arg(short, long)]
        output: PathBuf,

        /// Reference file of regions, departments and EPCI
        #[arg(long)]
        parent_areas: Option<PathBuf>,

        /// Config preset name (default) or path to a JSON config
        #[arg(long, default_value = "default")]
        config: String,
    },

    /// Bin deployment records on a hexagonal grid
    Hexbin {
        /// Deployment statistics ({"data": [...]} or a plain array)
        #[arg(long)]
        records: PathBuf,

        /// Commune coordinates by SIREN
        #[arg(long)]
        coords: PathBuf,

        /// Cell width across flats (meters)
        #[arg(long, default_value_t = 15000.0)]
        cell_size: f64,

        /// Selected services (comma separated, default: all)
        #[arg(long, value_delimiter = ',')]
        services: Option<Vec<String>>,

        /// Output GeoJSON
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Origine des données
#[derive(Args)]
pub struct DataArgs {
    /// Config preset name (default) or path to a JSON config
    #[arg(long, default_value = "default")]
    pub config: String,

    /// Directory of recorded portal responses
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Portal API root (défaut : env CARTO_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Reference file of regions, departments and EPCI (défaut : env CARTO_PARENT_AREAS)
    #[arg(long)]
    pub parent_areas: Option<PathBuf>,
}

/// Paramètres de `navigate`
pub struct NavigateArgs {
    pub data: DataArgs,
    pub url: Option<String>,
    pub level: Option<String>,
    pub code: Option<String>,
    pub view: Option<String>,
    pub criterion: Option<String>,
    pub period: Option<String>,
    pub services: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub map_data: Option<PathBuf>,
    pub deployment: bool,
    pub report: Option<PathBuf>,
}

fn load_config(data: &DataArgs) -> Result<Config> {
    let mut config = Config::resolve(&data.config)?.with_env();
    if let Some(dir) = &data.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(url) = &data.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(path) = &data.parent_areas {
        config.parent_areas = path.clone();
    }
    Ok(config)
}

fn open_source(config: &Config) -> Result<Arc<dyn DataSource>> {
    if let Some(dir) = &config.data_dir {
        info!(dir = %dir.display(), "Using local data directory");
        return Ok(Arc::new(CachedSource::new(DirectorySource::new(dir.clone()))));
    }
    if let Some(url) = &config.base_url {
        info!(url = %url, "Using portal API");
        let source = HttpSource::new(url).context("Invalid base URL")?;
        return Ok(Arc::new(CachedSource::new(source)));
    }
    anyhow::bail!("No data source: use --data-dir or --base-url (or CARTO_DATA_DIR / CARTO_BASE_URL)")
}

fn load_parent_areas(path: &Path) -> Result<Arc<ParentAreas>> {
    let areas = ParentAreas::load(path)
        .with_context(|| format!("Failed to load parent areas: {}", path.display()))?;
    info!(areas = areas.len(), "Parent areas loaded");
    Ok(Arc::new(areas))
}

/// Valide une période YYYY-MM ou `current`
fn validate_period(period: &str) -> Result<()> {
    if !is_valid_period(period) {
        anyhow::bail!(
            "Invalid period: '{}'. Expected YYYY-MM (e.g., 2024-05) or current",
            period
        );
    }
    Ok(())
}

/// Cible de `navigate` depuis `--url` ou les options dédiées
fn target_from_args(args: &NavigateArgs) -> Result<UrlState> {
    if let Some(url) = &args.url {
        return UrlState::parse(url).context("Invalid --url");
    }

    let level: GeographicLevel = match &args.level {
        Some(level) => level.parse()?,
        None => GeographicLevel::Country,
    };
    let code = match (&args.code, level) {
        (Some(code), _) => code.clone(),
        (None, GeographicLevel::Country) => COUNTRY_CODE.to_string(),
        (None, _) => anyhow::bail!("--code is required for level {}", level),
    };

    if let Some(period) = &args.period {
        validate_period(period)?;
    }

    let mut target = UrlState {
        level,
        code,
        filters: Filters {
            criterion: args.criterion.clone(),
            period: args.period.clone(),
            service_ids: args.services.clone(),
        },
        ..Default::default()
    };

    if let Some(view) = &args.view {
        match level {
            GeographicLevel::Department => {
                target.department_view =
                    Some(view.parse::<DepartmentView>().map_err(anyhow::Error::msg)?)
            }
            GeographicLevel::Region => {
                target.region_view = Some(view.parse::<RegionView>().map_err(anyhow::Error::msg)?)
            }
            _ => warn!(view = %view, level = %level, "View ignored for this level"),
        }
    }

    Ok(target)
}

/// Exécute la commande navigate
pub async fn cmd_navigate(args: NavigateArgs) -> Result<()> {
    let config = load_config(&args.data)?;
    let source = open_source(&config)?;
    let areas = load_parent_areas(&config.parent_areas)?;
    let target = target_from_args(&args)?;

    let initial = MapState {
        department_view: config.default_department_view,
        region_view: config.default_region_view,
        ..Default::default()
    };
    let navigator = Navigator::new(Arc::clone(&source), Arc::clone(&areas)).with_state(initial);

    let report = navigator.open_url(&target).await;
    report.display();
    if let Some(path) = &args.report {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }

    let state = navigator.state().await;
    match UrlState::from_state(&state) {
        Some(url) => println!("URL: {}", url.to_query()),
        None => println!("URL: (nothing loaded)"),
    }
    for (level, name) in state.breadcrumbs() {
        println!("  {} {}", level, name);
    }

    let Some(displayed) = navigator.displayed_geojson().await else {
        warn!("Nothing to display for this state");
        return Ok(());
    };
    info!(features = displayed.features.len(), "Displayed GeoJSON");

    if let Some(path) = &args.output {
        write_geojson(path, &displayed)?;
    }

    if let Some(path) = &args.map_data {
        let data = if args.deployment {
            deployment_map_data(source.as_ref(), &areas, &config, &state, &displayed).await?
        } else {
            conformity_map_data(source.as_ref(), &config, &state, &displayed).await?
        };
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), units = data.len(), "Map data written");
    }

    Ok(())
}

async fn conformity_map_data(
    source: &dyn DataSource,
    config: &Config,
    state: &MapState,
    displayed: &FeatureCollection,
) -> Result<MapData> {
    let period = state.filters.period.as_deref();
    let cache = StatsCache::new(config.conformity.refs.clone());
    for (scope, outcome) in cache
        .ensure_scopes(source, &required_scopes(state), period)
        .await
    {
        info!(scope = %scope, outcome = ?outcome, "Conformity stats");
    }

    let scale = ColorScale::new(&config.colors.conformity)?;
    let scorer = ConformityScorer::new(state, cache.tables(period), &config.conformity.model, scale);
    Ok(annotate::conformity_map_data(state, displayed, &scorer))
}

async fn deployment_map_data(
    source: &dyn DataSource,
    areas: &ParentAreas,
    config: &Config,
    state: &MapState,
    displayed: &FeatureCollection,
) -> Result<MapData> {
    let records = source
        .fetch_deployment_stats()
        .await
        .context("Failed to load deployment stats")?;
    let scale = ColorScale::new(&config.colors.deployment)?;
    let scorer = DeploymentScorer::new(state, &records, areas, scale);
    Ok(annotate::annotate(state, displayed, &scorer))
}

fn read_geojson(path: &Path) -> Result<FeatureCollection> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content.parse().context("Invalid GeoJSON")?;
    FeatureCollection::try_from(geojson).context("Expected a FeatureCollection")
}

fn write_geojson(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let json = serde_json::to_string(collection)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), features = collection.features.len(), "GeoJSON written");
    Ok(())
}

/// Exécute la commande dissolve
pub fn cmd_dissolve(
    input: &Path,
    output: &Path,
    parent_areas: Option<&Path>,
    config: &str,
) -> Result<()> {
    let areas = match parent_areas {
        Some(path) => load_parent_areas(path)?,
        None => load_parent_areas(&Config::resolve(config)?.with_env().parent_areas)?,
    };

    let communes = read_geojson(input)?;
    let epci = dissolve_epci(&communes, &areas);
    info!(
        communes = communes.features.len(),
        epci = epci.features.len(),
        "Dissolve done"
    );
    write_geojson(output, &epci)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    Envelope { data: Vec<DeploymentRecord> },
    Plain(Vec<DeploymentRecord>),
}

/// Exécute la commande hexbin
pub fn cmd_hexbin(
    records: &Path,
    coords: &Path,
    cell_size: f64,
    services: Option<Vec<String>>,
    output: &Path,
) -> Result<()> {
    let content = std::fs::read_to_string(records)
        .with_context(|| format!("Failed to read {}", records.display()))?;
    let records = match serde_json::from_str::<RecordsFile>(&content)
        .context("Invalid deployment records")?
    {
        RecordsFile::Envelope { data } => data,
        RecordsFile::Plain(data) => data,
    };

    let content = std::fs::read_to_string(coords)
        .with_context(|| format!("Failed to read {}", coords.display()))?;
    let coordinates: SirenCoordinates =
        serde_json::from_str(&content).context("Invalid coordinates file")?;

    let selected = match services.filter(|s| !s.is_empty()) {
        Some(services) => services,
        None => annotate::known_services(&records),
    };

    let points = annotate::hexbin_points(&records, &coordinates, &selected);
    info!(
        records = records.len(),
        points = points.len(),
        services = selected.len(),
        "Hexbin input"
    );

    let max_weight = u32::try_from(selected.len()).unwrap_or(u32::MAX);
    let cells = hex_bin(&points, cell_size, max_weight)?;
    write_geojson(output, &cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigate_args() -> NavigateArgs {
        NavigateArgs {
            data: DataArgs {
                config: "default".to_string(),
                data_dir: None,
                base_url: None,
                parent_areas: None,
            },
            url: None,
            level: None,
            code: None,
            view: None,
            criterion: None,
            period: None,
            services: None,
            output: None,
            map_data: None,
            deployment: false,
            report: None,
        }
    }

    #[test]
    fn test_validate_period() {
        assert!(validate_period("2024-01").is_ok());
        assert!(validate_period("current").is_ok());
        assert!(validate_period("2024-13").is_err());
        assert!(validate_period("2024/01").is_err());
        assert!(validate_period("").is_err());
    }

    #[test]
    fn test_target_defaults_to_root() {
        let target = target_from_args(&navigate_args()).unwrap();
        assert!(target.is_root());
    }

    #[test]
    fn test_target_from_options() {
        let mut args = navigate_args();
        args.level = Some("department".to_string());
        args.code = Some("38".to_string());
        args.view = Some("city".to_string());
        args.services = Some(vec!["1".to_string()]);

        let target = target_from_args(&args).unwrap();
        assert_eq!(target.level, GeographicLevel::Department);
        assert_eq!(target.department_view, Some(DepartmentView::City));
        assert_eq!(target.filters.service_ids, Some(vec!["1".to_string()]));

        args.code = None;
        assert!(target_from_args(&args).is_err());
    }

    #[test]
    fn test_target_from_url() {
        let mut args = navigate_args();
        args.url = Some("?level=region&code=r84&view=city".to_string());

        let target = target_from_args(&args).unwrap();
        assert_eq!(target.region_view, Some(RegionView::City));
    }

    #[test]
    fn test_records_file_formats() {
        let envelope: RecordsFile =
            serde_json::from_str(r#"{"data": [{"id": "21380185000017"}]}"#).unwrap();
        assert!(matches!(envelope, RecordsFile::Envelope { data } if data.len() == 1));

        let plain: RecordsFile = serde_json::from_str(r#"[{"id": "21380185000017"}]"#).unwrap();
        assert!(matches!(plain, RecordsFile::Plain(data) if data.len() == 1));
    }
}
