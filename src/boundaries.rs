use crate::departments::{fill_color_for, TargetDepartment};
use crate::error::DataError;
use crate::projection::Projector;
use crate::types::{RegionBoundary, Route};
use geo::{Geometry, MultiLineString, MultiPolygon};
use geojson::GeoJson;
use shapefile::dbase::FieldValue;
use shapefile::Shape;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info};

/// A feature as read from disk, before reprojection.
#[derive(Debug)]
struct RawFeature {
    name: Option<String>,
    geometry: Geometry<f64>,
}

struct Layer {
    features: Vec<RawFeature>,
    projector: Projector,
}

/// Loads every polygon feature of a departments file (`.zip`, `.shp` or
/// GeoJSON) and reprojects it to lon/lat degrees.
pub fn load(
    path: &Path,
    name_column: &str,
    source_crs: Option<&str>,
) -> Result<Vec<RegionBoundary>, DataError> {
    let layer = open_layer(path, Some(name_column), source_crs)?;

    let mut boundaries = Vec::new();
    for feature in layer.features {
        let Some(name) = feature.name else { continue };
        let polygons = match feature.geometry {
            Geometry::MultiPolygon(mp) => mp,
            Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            _ => continue, // Skip points/lines
        };
        boundaries.push(RegionBoundary {
            name,
            geometry: layer.projector.reproject(&polygons, path)?,
        });
    }

    let unfilled = boundaries.iter().filter(|b| b.fill_color().is_none()).count();
    debug!("{} of {} boundaries have no fill color", unfilled, boundaries.len());
    info!("Loaded {} boundaries from {:?}", boundaries.len(), path);
    Ok(boundaries)
}

/// Loads the line features of a road network file.
pub fn load_routes(path: &Path, source_crs: Option<&str>) -> Result<Vec<Route>, DataError> {
    let layer = open_layer(path, None, source_crs)?;

    let mut routes = Vec::new();
    for feature in layer.features {
        let lines = match feature.geometry {
            Geometry::MultiLineString(ml) => ml,
            Geometry::LineString(l) => MultiLineString::new(vec![l]),
            _ => continue,
        };
        routes.push(Route {
            geometry: layer.projector.reproject(&lines, path)?,
        });
    }

    info!("Loaded {} route features from {:?}", routes.len(), path);
    Ok(routes)
}

/// The subset drawn on the map: boundaries named exactly like one of the
/// target departments.
pub fn targets(boundaries: &[RegionBoundary]) -> Vec<&RegionBoundary> {
    boundaries.iter().filter(|b| b.target().is_some()).collect()
}

impl RegionBoundary {
    pub fn target(&self) -> Option<TargetDepartment> {
        TargetDepartment::from_name(&self.name)
    }

    pub fn fill_color(&self) -> Option<[u8; 4]> {
        fill_color_for(&self.name)
    }

    /// Polygons → rings → `[lon, lat]` pairs, exterior ring first.
    pub fn coordinates(&self) -> Vec<Vec<Vec<[f64; 2]>>> {
        self.geometry
            .iter()
            .map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                    .collect()
            })
            .collect()
    }
}

impl Route {
    pub fn paths(&self) -> Vec<Vec<[f64; 2]>> {
        self.geometry
            .iter()
            .map(|line| line.coords().map(|c| [c.x, c.y]).collect())
            .collect()
    }
}

fn open_layer(
    path: &Path,
    name_column: Option<&str>,
    source_crs: Option<&str>,
) -> Result<Layer, DataError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| DataError::format(path, "geometry file has no extension"))?;

    let (features, prj, default_geographic) = match extension.as_str() {
        "zip" => {
            let (features, prj) = read_zipped_shapefile(path, name_column)?;
            (features, prj, false)
        }
        "shp" => {
            let mut reader = shapefile::Reader::from_path(path)
                .map_err(|e| DataError::format(path, format!("failed to open shapefile: {}", e)))?;
            let prj = std::fs::read_to_string(path.with_extension("prj")).ok();
            (read_shapefile(&mut reader, path, name_column)?, prj, false)
        }
        // RFC 7946 GeoJSON is always WGS84.
        "json" | "geojson" => (read_geojson(path, name_column)?, None, true),
        _ => {
            return Err(DataError::format(
                path,
                format!("unsupported geometry format: {}", extension),
            ))
        }
    };

    let projector = resolve_projector(path, source_crs, prj.as_deref(), default_geographic)?;
    Ok(Layer {
        features,
        projector,
    })
}

fn resolve_projector(
    path: &Path,
    source_crs: Option<&str>,
    prj: Option<&str>,
    default_geographic: bool,
) -> Result<Projector, DataError> {
    let projector = if let Some(defn) = source_crs {
        debug!("Using configured CRS for {:?}: {}", path, defn);
        Projector::from_proj_string(defn)
    } else if let Some(wkt) = prj {
        debug!("Using .prj CRS for {:?}", path);
        Projector::from_wkt(wkt)
    } else {
        if !default_geographic {
            debug!("No CRS declared for {:?}; assuming lon/lat", path);
        }
        Ok(Projector::geographic())
    };
    projector.map_err(|reason| DataError::format(path, reason))
}

fn read_zipped_shapefile(
    path: &Path,
    name_column: Option<&str>,
) -> Result<(Vec<RawFeature>, Option<String>), DataError> {
    let file = File::open(path)
        .map_err(|e| DataError::format(path, format!("failed to open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| DataError::format(path, format!("corrupt archive: {}", e)))?;

    let mut shp: Option<Vec<u8>> = None;
    let mut dbf: Option<Vec<u8>> = None;
    let mut prj: Option<Vec<u8>> = None;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DataError::format(path, format!("corrupt archive entry: {}", e)))?;
        let name = entry.name().to_lowercase();
        let slot = if name.ends_with(".shp") {
            &mut shp
        } else if name.ends_with(".dbf") {
            &mut dbf
        } else if name.ends_with(".prj") {
            &mut prj
        } else {
            continue;
        };
        if slot.is_some() {
            continue; // first layer wins
        }
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| DataError::format(path, format!("failed to read {}: {}", name, e)))?;
        *slot = Some(buf);
    }

    let shp = shp.ok_or_else(|| DataError::format(path, "archive has no .shp geometry"))?;
    let dbf = dbf.ok_or_else(|| DataError::format(path, "archive has no .dbf attribute table"))?;

    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp))
        .map_err(|e| DataError::format(path, format!("invalid .shp: {}", e)))?;
    let dbase_reader = shapefile::dbase::Reader::new(Cursor::new(dbf))
        .map_err(|e| DataError::format(path, format!("invalid .dbf: {}", e)))?;
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);

    let features = read_shapefile(&mut reader, path, name_column)?;
    let prj = prj.map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    Ok((features, prj))
}

fn read_shapefile<T: Read + Seek, D: Read + Seek>(
    reader: &mut shapefile::Reader<T, D>,
    path: &Path,
    name_column: Option<&str>,
) -> Result<Vec<RawFeature>, DataError> {
    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| DataError::format(path, e.to_string()))?;

        let name = match name_column {
            None => None,
            Some(column) => {
                let value = record.get(column).ok_or_else(|| {
                    DataError::format(path, format!("name column '{}' not found", column))
                })?;
                match value {
                    FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
                    FieldValue::Character(None) => continue, // Skip if null
                    _ => {
                        return Err(DataError::format(
                            path,
                            format!("name column '{}' must be a string", column),
                        ))
                    }
                }
            }
        };

        let Some(geometry) = shape_to_geometry(shape, path)? else {
            continue;
        };
        features.push(RawFeature { name, geometry });
    }

    Ok(features)
}

fn shape_to_geometry(shape: Shape, path: &Path) -> Result<Option<Geometry<f64>>, DataError> {
    let convert = |e: String| DataError::format(path, format!("invalid shape: {}", e));
    let geometry = match shape {
        Shape::Polygon(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into().map_err(|e| convert(format!("{:?}", e)))?;
            Geometry::MultiPolygon(mp)
        }
        Shape::PolygonM(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into().map_err(|e| convert(format!("{:?}", e)))?;
            Geometry::MultiPolygon(mp)
        }
        Shape::PolygonZ(polygon) => {
            let mp: MultiPolygon<f64> = polygon.try_into().map_err(|e| convert(format!("{:?}", e)))?;
            Geometry::MultiPolygon(mp)
        }
        Shape::Polyline(line) => Geometry::MultiLineString(line.into()),
        Shape::PolylineM(line) => Geometry::MultiLineString(line.into()),
        Shape::PolylineZ(line) => Geometry::MultiLineString(line.into()),
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

fn read_geojson(path: &Path, name_column: Option<&str>) -> Result<Vec<RawFeature>, DataError> {
    let file = File::open(path)
        .map_err(|e| DataError::format(path, format!("failed to open GeoJSON: {}", e)))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .map_err(|e| DataError::format(path, format!("failed to parse GeoJSON: {}", e)))?;
    geojson_features(geojson, path, name_column)
}

fn geojson_features(
    geojson: GeoJson,
    path: &Path,
    name_column: Option<&str>,
) -> Result<Vec<RawFeature>, DataError> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(DataError::format(path, "GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();
    for feature in collection.features {
        let name = match name_column {
            None => None,
            Some(column) => match feature.properties.as_ref().and_then(|p| p.get(column)) {
                Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => continue, // Skip if no name
            },
        };

        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: Geometry<f64> = geometry
            .value
            .try_into()
            .map_err(|e| DataError::format(path, format!("failed to convert geometry: {:?}", e)))?;
        features.push(RawFeature { name, geometry });
    }
    Ok(features)
}
