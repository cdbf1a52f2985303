//! Spatial primitives: great-circle and point-to-segment distances.
//!
//! Everything works on WGS84 decimal degrees and returns meters. The
//! point-to-segment projection uses a local planar approximation in degree
//! space, which is accurate enough at route-deviation scales (tens to a few
//! hundred meters).

/// Earth radius in meters (mean radius).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Segments shorter than this are treated as degenerate and measured
/// against their midpoint instead of a projection.
const MIN_SEGMENT_LENGTH_M: f64 = 10.0;

/// Great-circle distance between two points (haversine formula), in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Minimum distance in meters from `point` to the segment `[seg_start, seg_end]`.
///
/// Points are `(lat, lon)` pairs. The projection parameter is computed in
/// degree space and clamped to the segment, so positions "before" the start
/// measure to the start and positions "past" the end measure to the end.
pub fn point_to_segment_distance(
    point: (f64, f64),
    seg_start: (f64, f64),
    seg_end: (f64, f64),
) -> f64 {
    let (lat_p, lon_p) = point;
    let (lat1, lon1) = seg_start;
    let (lat2, lon2) = seg_end;

    let seg_length = haversine_distance(lat1, lon1, lat2, lon2);
    if seg_length < MIN_SEGMENT_LENGTH_M {
        let mid_lat = (lat1 + lat2) / 2.0;
        let mid_lon = (lon1 + lon2) / 2.0;
        return haversine_distance(lat_p, lon_p, mid_lat, mid_lon);
    }

    let dlat_seg = lat2 - lat1;
    let dlon_seg = lon2 - lon1;
    let seg_length_sq_deg = dlat_seg * dlat_seg + dlon_seg * dlon_seg;
    if seg_length_sq_deg == 0.0 {
        return haversine_distance(lat_p, lon_p, lat1, lon1);
    }

    let dlat_point = lat_p - lat1;
    let dlon_point = lon_p - lon1;

    let t = (dlat_point * dlat_seg + dlon_point * dlon_seg) / seg_length_sq_deg;
    let t = t.clamp(0.0, 1.0);

    let proj_lat = lat1 + t * dlat_seg;
    let proj_lon = lon1 + t * dlon_seg;

    haversine_distance(lat_p, lon_p, proj_lat, proj_lon)
}
