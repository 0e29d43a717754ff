//! Calcul d'une unité par niveau
//!
//! Chaque niveau a sa fonction de chargement (`compute`) et sa dérivation du
//! code parent (`parent_code`), toutes deux exhaustives sur `GeographicLevel`.

use std::sync::Arc;

use futures::future::join_all;
use geojson::FeatureCollection;
use territoires::level::strip_region_prefix;
use territoires::{
    dissolve_epci, AreaKind, CityRecord, GeographicLevel, ParentArea, ParentAreas, COUNTRY_CODE,
};
use tracing::{debug, warn};

use super::NavigationError;
use crate::report::TransitionReport;
use crate::source::{DataSource, GeoJsonPath};
use crate::state::{AreaEntry, RegionView, SelectedArea, SelectedAreas};

/// Dépendances d'un calcul d'unité
pub(crate) struct LevelContext<'a, S: ?Sized> {
    pub source: &'a S,
    pub areas: &'a Arc<ParentAreas>,
    pub period: Option<&'a str>,
}

/// Charge l'unité `code` du niveau `level`
///
/// Une erreur signifie que l'unité elle-même est indisponible ; les données
/// secondaires manquantes sont consignées dans `report`.
pub(crate) async fn compute<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    level: GeographicLevel,
    code: &str,
    region_view: RegionView,
    report: &mut TransitionReport,
) -> Result<AreaEntry, NavigationError> {
    let entry: AreaEntry = match level {
        GeographicLevel::Country => country(ctx, report).await.into(),
        GeographicLevel::Region => region(ctx, code, region_view, report).await?.into(),
        GeographicLevel::Department => department(ctx, code, report).await?.into(),
        GeographicLevel::Epci => epci(ctx, code)?.into(),
        GeographicLevel::City => city(ctx, code).await?.into(),
    };

    debug!(level = %level, code = %code, "Area computed");
    report.record_computed(level);
    Ok(entry)
}

/// Code du niveau `level` déduit des unités plus fines déjà calculées
pub(crate) fn parent_code(level: GeographicLevel, selected: &SelectedAreas) -> Option<String> {
    let area = |l: GeographicLevel| selected.get(&l).and_then(AreaEntry::as_area);
    let city = || selected.get(&GeographicLevel::City).and_then(AreaEntry::as_city);

    match level {
        GeographicLevel::Country => Some(COUNTRY_CODE.to_string()),
        GeographicLevel::Region => area(GeographicLevel::Department)
            .and_then(|d| d.insee_reg.clone())
            .or_else(|| city().and_then(|c| c.insee_reg.clone()))
            .map(|code| region_code(&code)),
        GeographicLevel::Department => area(GeographicLevel::Epci)
            .and_then(|e| e.insee_dep.clone())
            .or_else(|| city().and_then(|c| c.insee_dep.clone())),
        GeographicLevel::Epci => city().and_then(|c| c.epci_siren.clone()),
        GeographicLevel::City => None,
    }
    .filter(|code| !code.is_empty())
}

/// Code de région avec son préfixe `r`
fn region_code(code: &str) -> String {
    format!("r{}", strip_region_prefix(code))
}

fn find_area<'a>(
    areas: &'a ParentAreas,
    level: GeographicLevel,
    kind: AreaKind,
    code: &str,
) -> Result<&'a ParentArea, NavigationError> {
    areas
        .find(code)
        .filter(|a| a.kind == kind)
        .ok_or_else(|| NavigationError::UnknownArea {
            level,
            code: code.to_string(),
        })
}

async fn country<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    report: &mut TransitionReport,
) -> SelectedArea {
    let mut area = SelectedArea::france();
    match ctx.source.fetch_geojson(&GeoJsonPath::Regions).await {
        Ok(collection) => area.geojson = Some(collection),
        Err(e) => {
            warn!(error = %e, "Failed to load regions geometry");
            report.record_warning(
                GeographicLevel::Country,
                COUNTRY_CODE,
                format!("geometry unavailable: {}", e),
            );
        }
    }
    area
}

async fn region<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    code: &str,
    view: RegionView,
    report: &mut TransitionReport,
) -> Result<SelectedArea, NavigationError> {
    let record = find_area(ctx.areas, GeographicLevel::Region, AreaKind::Region, code)?;
    let mut area = SelectedArea::from_parent(record);

    let path = GeoJsonPath::DepartmentsOfRegion(strip_region_prefix(code).to_string());
    let geojson = ctx.source.fetch_geojson(&path).await?;
    area.geojson = Some(Arc::clone(&geojson));

    if view == RegionView::Department {
        return Ok(area);
    }

    let (stitched, failed) = stitch_region(ctx, code).await;
    for department in &failed {
        report.record_warning(
            GeographicLevel::Region,
            code,
            format!("city geometry of department {} unavailable", department),
        );
    }

    if stitched.features.is_empty() {
        warn!(region = %code, "No city features for region, keeping region geometry");
        report.record_warning(
            GeographicLevel::Region,
            code,
            "no city features, region geometry kept",
        );
        if view == RegionView::Epci {
            area.geojson_epci = Some(geojson);
        }
    } else {
        let stitched = Arc::new(stitched);
        match view {
            RegionView::City => area.geojson = Some(stitched),
            RegionView::Epci => {
                area.geojson_epci =
                    dissolve_blocking(ctx.areas, &stitched, GeographicLevel::Region, code, report)
                        .await
            }
            RegionView::Department => {}
        }
    }

    if view == RegionView::City {
        let (cities, failed) = region_cities(ctx, code).await;
        for department in &failed {
            report.record_warning(
                GeographicLevel::Region,
                code,
                format!("cities of department {} unavailable", department),
            );
        }
        area.cities = Some(Arc::new(cities));
    }

    Ok(area)
}

async fn department<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    code: &str,
    report: &mut TransitionReport,
) -> Result<SelectedArea, NavigationError> {
    let record = find_area(
        ctx.areas,
        GeographicLevel::Department,
        AreaKind::Department,
        code,
    )?;
    let mut area = SelectedArea::from_parent(record);

    let path = GeoJsonPath::CitiesOfDepartment(code.to_string());
    let geojson = ctx.source.fetch_geojson(&path).await?;

    match ctx.source.fetch_department_cities(code, ctx.period).await {
        Ok(cities) => area.cities = Some(Arc::new(cities)),
        Err(e) => {
            warn!(department = %code, error = %e, "Failed to load department cities");
            report.record_warning(
                GeographicLevel::Department,
                code,
                format!("cities unavailable: {}", e),
            );
        }
    }

    area.geojson_epci =
        dissolve_blocking(ctx.areas, &geojson, GeographicLevel::Department, code, report).await;
    area.geojson = Some(geojson);
    Ok(area)
}

fn epci<S: ?Sized>(ctx: &LevelContext<'_, S>, code: &str) -> Result<SelectedArea, NavigationError> {
    let record = find_area(ctx.areas, GeographicLevel::Epci, AreaKind::Epci, code)?;
    Ok(SelectedArea::from_parent(record))
}

async fn city<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    siret: &str,
) -> Result<CityRecord, NavigationError> {
    ctx.source
        .fetch_commune(siret)
        .await?
        .ok_or_else(|| NavigationError::CityNotFound(siret.to_string()))
}

/// Fusion EPCI hors de la boucle async
async fn dissolve_blocking(
    areas: &Arc<ParentAreas>,
    collection: &Arc<FeatureCollection>,
    level: GeographicLevel,
    code: &str,
    report: &mut TransitionReport,
) -> Option<Arc<FeatureCollection>> {
    let areas = Arc::clone(areas);
    let collection = Arc::clone(collection);

    match tokio::task::spawn_blocking(move || dissolve_epci(&collection, &areas)).await {
        Ok(dissolved) => Some(Arc::new(dissolved)),
        Err(e) => {
            warn!(level = %level, code = %code, error = %e, "EPCI dissolve task failed");
            report.record_warning(level, code, format!("EPCI geometry unavailable: {}", e));
            None
        }
    }
}

/// Contours communaux de tous les départements d'une région
///
/// Les départements en échec ne contribuent rien ; leurs codes sont retournés.
async fn stitch_region<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    region: &str,
) -> (FeatureCollection, Vec<String>) {
    let departments: Vec<&ParentArea> = ctx.areas.departments_in_region(region).collect();

    let results = join_all(departments.iter().map(|d| {
        let path = GeoJsonPath::CitiesOfDepartment(d.insee_geo.clone());
        async move { ctx.source.fetch_geojson(&path).await }
    }))
    .await;

    let mut features = Vec::new();
    let mut failed = Vec::new();
    for (department, result) in departments.iter().zip(results) {
        match result {
            Ok(collection) => features.extend(collection.features.iter().cloned()),
            Err(e) => {
                warn!(department = %department.insee_geo, error = %e, "Failed to load city geometry");
                failed.push(department.insee_geo.clone());
            }
        }
    }

    debug!(region = %region, features = features.len(), "Region cities stitched");
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    (collection, failed)
}

/// Communes de tous les départements d'une région
pub(crate) async fn region_cities<S: DataSource + ?Sized>(
    ctx: &LevelContext<'_, S>,
    region: &str,
) -> (Vec<CityRecord>, Vec<String>) {
    let departments: Vec<&ParentArea> = ctx.areas.departments_in_region(region).collect();

    let results = join_all(
        departments
            .iter()
            .map(|d| ctx.source.fetch_department_cities(&d.insee_geo, ctx.period)),
    )
    .await;

    let mut cities = Vec::new();
    let mut failed = Vec::new();
    for (department, result) in departments.iter().zip(results) {
        match result {
            Ok(list) => cities.extend(list),
            Err(e) => {
                warn!(department = %department.insee_geo, error = %e, "Failed to load cities");
                failed.push(department.insee_geo.clone());
            }
        }
    }
    (cities, failed)
}
