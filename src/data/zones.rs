use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::RasterError;
use super::crop::align_zones;
use super::loader::read_raster;
use super::model::{GeoTransform, RasterStack, ZoneId, ZoneRaster};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where burn-scar zones come from.
///
/// Polygons are tried first; when any of them is invalid the pre-rasterized
/// `fallback_raster` is used instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSource {
    pub polygons: Option<PathBuf>,
    pub zone_field: String,
    pub fallback_raster: Option<PathBuf>,
}

impl Default for ZoneSource {
    fn default() -> Self {
        Self {
            polygons: None,
            zone_field: "zone".to_string(),
            fallback_raster: None,
        }
    }
}

/// How the zone raster in a [`ZoneResolution`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneOrigin {
    Rasterized,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ZoneResolution {
    pub zones: ZoneRaster,
    pub origin: ZoneOrigin,
}

// ---------------------------------------------------------------------------
// Polygon model
// ---------------------------------------------------------------------------

pub type Ring = Vec<[f64; 2]>;

/// One zone feature: one or more polygons, each an outer ring plus holes.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePolygon {
    pub zone: ZoneId,
    /// `parts[i][0]` is the outer ring, the rest are holes.
    pub parts: Vec<Vec<Ring>>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolve zones on the stack's grid, falling back to the pre-rasterized
/// file when the polygons cannot be rasterized.
pub fn load_zones(source: &ZoneSource, stack: &RasterStack) -> Result<ZoneResolution, RasterError> {
    let attempt = match &source.polygons {
        Some(path) => read_polygons(path, &source.zone_field)
            .and_then(|polys| rasterize(&polys, &stack.transform, stack.rows(), stack.cols())),
        None => Err(RasterError::ZoneFile {
            path: PathBuf::new(),
            reason: "no polygon file configured".to_string(),
        }),
    };

    match attempt {
        Ok(zones) => {
            log::info!("Rasterized {} zones from polygons", zones.zone_ids().len());
            Ok(ZoneResolution {
                zones,
                origin: ZoneOrigin::Rasterized,
            })
        }
        Err(err @ (RasterError::InvalidGeometry { .. } | RasterError::ZoneFile { .. })) => {
            let Some(fallback) = &source.fallback_raster else {
                return Err(RasterError::NoZoneFallback(Box::new(err)));
            };
            log::warn!(
                "Cannot rasterize zone polygons ({err}); using {}",
                fallback.display()
            );
            let zones = read_zone_raster(fallback)?;
            Ok(ZoneResolution {
                zones: align_zones(&zones, stack)?,
                origin: ZoneOrigin::Fallback,
            })
        }
        Err(other) => Err(other),
    }
}

/// Read a categorical raster; `NaN`, negative and `0` cells are unzoned.
pub fn read_zone_raster(path: &Path) -> Result<ZoneRaster, RasterError> {
    let raster = read_raster(path)?;
    let zones = raster.data.mapv(|v| {
        if v.is_finite() && v.round() >= 1.0 {
            Some(v.round() as ZoneId)
        } else {
            None
        }
    });
    Ok(ZoneRaster::new(raster.transform, zones))
}

// ---------------------------------------------------------------------------
// GeoJSON reading
// ---------------------------------------------------------------------------

/// Parse a GeoJSON `FeatureCollection` of `Polygon` / `MultiPolygon`
/// features. The zone id is the integer property `zone_field`, or the
/// feature's 1-based position when the property is absent or null. Any
/// other value is a [`RasterError::ZoneFile`].
pub fn read_polygons(path: &Path, zone_field: &str) -> Result<Vec<ZonePolygon>, RasterError> {
    let text = std::fs::read_to_string(path).map_err(|e| RasterError::io(path, e))?;
    let bad = |reason: String| RasterError::ZoneFile {
        path: path.to_path_buf(),
        reason,
    };
    let root: JsonValue = serde_json::from_str(&text).map_err(|e| bad(e.to_string()))?;
    let features = root
        .get("features")
        .and_then(|f| f.as_array())
        .ok_or_else(|| bad("expected a FeatureCollection".to_string()))?;

    features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let zone = match feature.get("properties").and_then(|p| p.get(zone_field)) {
                None | Some(JsonValue::Null) => i as ZoneId + 1,
                Some(z) => json_zone_id(z)
                    .ok_or_else(|| bad(format!("feature {i}: {zone_field} {z} is not an integer")))?,
            };
            let geometry = feature
                .get("geometry")
                .ok_or_else(|| bad(format!("feature {i} has no geometry")))?;
            let coords = geometry.get("coordinates");
            let parts = match geometry.get("type").and_then(|t| t.as_str()) {
                Some("Polygon") => vec![json_polygon(coords, i).map_err(bad)?],
                Some("MultiPolygon") => coords
                    .and_then(|c| c.as_array())
                    .ok_or_else(|| bad(format!("feature {i}: missing coordinates")))?
                    .iter()
                    .map(|p| json_polygon(Some(p), i))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(bad)?,
                other => return Err(bad(format!("feature {i}: unsupported geometry {other:?}"))),
            };
            Ok(ZonePolygon { zone, parts })
        })
        .collect()
}

/// Integers, and whole-valued floats such as `2.0` from shapefile exports.
fn json_zone_id(z: &JsonValue) -> Option<ZoneId> {
    if let Some(id) = z.as_i64() {
        return Some(id);
    }
    z.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as ZoneId)
}

fn json_polygon(val: Option<&JsonValue>, feature: usize) -> Result<Vec<Ring>, String> {
    let rings = val
        .and_then(|v| v.as_array())
        .ok_or_else(|| format!("feature {feature}: polygon is not an array of rings"))?;
    rings
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| format!("feature {feature}: ring is not an array"))?
                .iter()
                .map(|pos| {
                    let xy = pos.as_array().filter(|a| a.len() >= 2);
                    match xy.map(|a| (a[0].as_f64(), a[1].as_f64())) {
                        Some((Some(x), Some(y))) => Ok([x, y]),
                        _ => Err(format!("feature {feature}: bad position {pos}")),
                    }
                })
                .collect::<Result<Ring, String>>()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check the rings of a feature: closed, at least four positions, finite,
/// and free of self-intersections.
pub fn validate(polygon: &ZonePolygon, feature: usize) -> Result<(), RasterError> {
    let invalid = |reason: String| RasterError::InvalidGeometry { feature, reason };
    if polygon.parts.is_empty() {
        return Err(invalid("no rings".to_string()));
    }
    for (p, rings) in polygon.parts.iter().enumerate() {
        if rings.is_empty() {
            return Err(invalid(format!("part {p} has no rings")));
        }
        for (r, ring) in rings.iter().enumerate() {
            // Repeated consecutive positions are allowed and carry no edge.
            let mut ring = ring.clone();
            ring.dedup();
            if ring.len() < 4 {
                return Err(invalid(format!("ring {p}.{r} has {} distinct positions", ring.len())));
            }
            if ring.iter().flatten().any(|v| !v.is_finite()) {
                return Err(invalid(format!("ring {p}.{r} has non-finite coordinates")));
            }
            if ring.first() != ring.last() {
                return Err(invalid(format!("ring {p}.{r} is not closed")));
            }
            if let Some((a, b)) = self_intersection(&ring) {
                return Err(invalid(format!(
                    "ring {p}.{r} self-intersects at edges {a} and {b}"
                )));
            }
        }
    }
    Ok(())
}

/// First pair of non-adjacent edges of a closed ring that touch or cross.
/// The ring must not repeat consecutive positions.
fn self_intersection(ring: &[[f64; 2]]) -> Option<(usize, usize)> {
    let n = ring.len() - 1;
    for i in 0..n {
        for j in (i + 1)..n {
            // Consecutive edges share a vertex, as do the first and last.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if segments_intersect(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn on_segment(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    p[0] >= a[0].min(b[0]) && p[0] <= a[0].max(b[0]) && p[1] >= a[1].min(b[1]) && p[1] <= a[1].max(b[1])
}

fn segments_intersect(p1: [f64; 2], p2: [f64; 2], q1: [f64; 2], q2: [f64; 2]) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

// ---------------------------------------------------------------------------
// Rasterization
// ---------------------------------------------------------------------------

/// Burn polygons into a `rows × cols` zone grid by cell centre. Every
/// polygon is validated first; later features overwrite earlier ones.
pub fn rasterize(
    polygons: &[ZonePolygon],
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Result<ZoneRaster, RasterError> {
    for (i, polygon) in polygons.iter().enumerate() {
        validate(polygon, i)?;
    }

    let mut zones = Array2::<Option<ZoneId>>::from_elem((rows, cols), None);
    for polygon in polygons {
        for ((row, col), cell) in zones.indexed_iter_mut() {
            let (x, y) = transform.cell_center(row, col);
            if polygon.parts.iter().any(|rings| in_polygon(rings, x, y)) {
                *cell = Some(polygon.zone);
            }
        }
    }
    Ok(ZoneRaster::new(*transform, zones))
}

fn in_polygon(rings: &[Ring], x: f64, y: f64) -> bool {
    let Some((outer, holes)) = rings.split_first() else {
        return false;
    };
    in_ring(outer, x, y) && !holes.iter().any(|h| in_ring(h, x, y))
}

/// Even-odd ray casting.
fn in_ring(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let mut inside = false;
    for edge in ring.windows(2) {
        let ([xi, yi], [xj, yj]) = (edge[0], edge[1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
    }
    inside
}
