//! GPX track sampling: cumulative distance paired with elevation.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use gpx::{Gpx, Waypoint};
use serde::{Deserialize, Serialize};

use crate::TrailError;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// One chart sample: cumulative distance from the start of the track and
/// the elevation at that point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElevationSample {
    pub distance_km: f64,
    pub elevation_m: f64,
}

/// Load a GPX file and derive its elevation profile.
///
/// A missing path fails with [`TrailError::FileNotFound`] before anything
/// else happens, so no output is ever produced for it.
pub fn samples_from_path(path: &Path) -> Result<Vec<ElevationSample>, TrailError> {
    if !path.exists() {
        return Err(TrailError::FileNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    samples_from_reader(BufReader::new(file))
}

/// Parse a GPX document from `reader` and derive its elevation profile.
///
/// Fails with [`TrailError::GpxParse`] on malformed input and
/// [`TrailError::NoData`] when the document holds zero track points.
pub fn samples_from_reader(reader: impl Read) -> Result<Vec<ElevationSample>, TrailError> {
    let gpx = gpx::read(reader).map_err(|e| TrailError::GpxParse(e.to_string()))?;
    let samples = elevation_samples(&gpx);
    if samples.is_empty() {
        return Err(TrailError::NoData);
    }
    Ok(samples)
}

/// Walk tracks, segments, and points in document order, accumulating
/// point-to-point distance.
///
/// The first point emits distance 0. Every later point adds the 3D distance
/// to its predecessor, falling back to plain great-circle distance when
/// either point lacks elevation. Points without elevation repeat the
/// previous sample's elevation, or 0 when no sample precedes them.
pub fn elevation_samples(gpx: &Gpx) -> Vec<ElevationSample> {
    let mut samples: Vec<ElevationSample> = Vec::new();
    let mut distance_km = 0.0;
    let mut previous: Option<&Waypoint> = None;

    for track in &gpx.tracks {
        for segment in &track.segments {
            for point in &segment.points {
                if let Some(prev) = previous {
                    let meters =
                        distance_3d(prev, point).unwrap_or_else(|| distance_2d(prev, point));
                    distance_km += meters / 1000.0;
                }
                let elevation_m = point
                    .elevation
                    .or_else(|| samples.last().map(|s| s.elevation_m))
                    .unwrap_or(0.0);
                samples.push(ElevationSample {
                    distance_km,
                    elevation_m,
                });
                previous = Some(point);
            }
        }
    }
    samples
}

/// Great-circle distance between two track points in meters.
pub fn distance_2d(a: &Waypoint, b: &Waypoint) -> f64 {
    let (pa, pb) = (a.point(), b.point());
    haversine_distance(pa.y(), pa.x(), pb.y(), pb.x())
}

/// Great-circle distance including the altitude difference, in meters.
/// `None` when either point lacks elevation.
pub fn distance_3d(a: &Waypoint, b: &Waypoint) -> Option<f64> {
    let (ea, eb) = (a.elevation?, b.elevation?);
    let flat = distance_2d(a, b);
    let rise = eb - ea;
    Some((flat * flat + rise * rise).sqrt())
}

fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}
