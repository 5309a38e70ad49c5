//! GeoRSS Simple (`georss:`) and GeoRSS GML (`gml:`) geometries.
//!
//! Geometries are stored in the record's `where` dict in GeoJSON shape:
//! `{"type": "Point", "coordinates": [lon, lat]}`. GeoRSS writes latitude
//! first, so coordinate pairs are swapped unless a GML `srsName` names a
//! projected EPSG system.

use crate::dict::{FeedParserDict, Value};
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::{GeometryKind, ParserState};

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("georss_point", Start(start_georss_geometry)),
    ("georss_point", End(end_georss_point)),
    ("georss_line", Start(start_georss_geometry)),
    ("georss_line", End(end_georss_line)),
    ("georss_polygon", Start(start_georss_geometry)),
    ("georss_polygon", End(end_georss_polygon)),
    ("georss_box", Start(start_georss_geometry)),
    ("georss_box", End(end_georss_box)),
    ("where", Start(start_where)),
    ("where", End(end_where)),
    ("georss_where", Start(start_where)),
    ("georss_where", End(end_where)),
    ("gml_point", Start(start_gml_point)),
    ("gml_point", End(end_geometry)),
    ("gml_linestring", Start(start_gml_linestring)),
    ("gml_linestring", End(end_geometry)),
    ("gml_polygon", Start(start_gml_polygon)),
    ("gml_polygon", End(end_geometry)),
    ("gml_exterior", Start(start_gml_exterior)),
    ("gml_exterior", End(end_geometry)),
    ("gml_linearring", Start(start_gml_linearring)),
    ("gml_linearring", End(end_geometry)),
    ("gml_pos", Start(start_gml_pos)),
    ("gml_pos", End(end_gml_pos)),
    ("gml_poslist", Start(start_gml_pos)),
    ("gml_poslist", End(end_gml_poslist)),
];

/// EPSG codes of geographic coordinate systems, as inclusive ranges.
/// Coordinates in these are latitude first and get swapped.
const GEOGRAPHIC_CS: &[(u32, u32)] = &[
    (3819, 3819),
    (3821, 3821),
    (3824, 3824),
    (3889, 3889),
    (3906, 3906),
    (4001, 4016),
    (4018, 4025),
    (4027, 4036),
    (4041, 4047),
    (4052, 4055),
    (4075, 4075),
    (4081, 4081),
    (4120, 4176),
    (4178, 4185),
    (4188, 4216),
    (4218, 4289),
    (4291, 4304),
    (4306, 4319),
    (4322, 4322),
    (4324, 4324),
    (4326, 4326),
    (4463, 4463),
    (4470, 4470),
    (4475, 4475),
    (4483, 4483),
    (4490, 4490),
    (4555, 4555),
    (4558, 4558),
    (4600, 4646),
    (4657, 4765),
    (4801, 4811),
    (4813, 4821),
    (4823, 4824),
    (4901, 4904),
    (4979, 4979),
];

fn is_geographic(epsg: u32) -> bool {
    GEOGRAPHIC_CS.iter().any(|(lo, hi)| (*lo..=*hi).contains(&epsg))
}

// ============================================================================
// Coordinate parsing
// ============================================================================

/// Splits `value` into coordinate tuples of `dims` numbers. A trailing
/// incomplete tuple is dropped; any non-numeric token fails the whole
/// geometry.
fn parse_coords(value: &str, swap: bool, dims: usize) -> Option<Vec<Value>> {
    let numbers = value
        .trim()
        .replace(',', " ")
        .split_whitespace()
        .map(|token| token.parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    let width = if dims == 3 { 3 } else { 2 };
    let tuples = numbers
        .chunks_exact(width)
        .map(|chunk| {
            let mut tuple = chunk.to_vec();
            if swap {
                tuple.swap(0, 1);
            }
            Value::List(tuple.into_iter().map(Value::Float).collect())
        })
        .collect();
    Some(tuples)
}

fn geometry(kind: &str, coordinates: Value) -> FeedParserDict {
    [("type", Value::from(kind)), ("coordinates", coordinates)]
        .into_iter()
        .collect()
}

pub(crate) fn parse_point(value: &str, swap: bool, dims: usize) -> Option<FeedParserDict> {
    let first = parse_coords(value, swap, dims)?.into_iter().next()?;
    Some(geometry("Point", first))
}

pub(crate) fn parse_line(value: &str, swap: bool, dims: usize) -> Option<FeedParserDict> {
    Some(geometry("LineString", Value::List(parse_coords(value, swap, dims)?)))
}

/// A ring needs at least four positions.
pub(crate) fn parse_polygon(value: &str, swap: bool, dims: usize) -> Option<FeedParserDict> {
    let ring = parse_coords(value, swap, dims)?;
    if ring.len() < 4 {
        return None;
    }
    Some(geometry("Polygon", Value::List(vec![Value::List(ring)])))
}

pub(crate) fn parse_box(value: &str, swap: bool, dims: usize) -> Option<FeedParserDict> {
    Some(geometry("Box", Value::List(parse_coords(value, swap, dims)?)))
}

// ============================================================================
// GeoRSS Simple
// ============================================================================

fn save_where(state: &mut ParserState, geometry: Option<FeedParserDict>) {
    if let Some(geometry) = geometry {
        state.context().ensure_dict("where").update(geometry);
    }
}

fn start_georss_geometry(state: &mut ParserState, _attrs: Attrs) {
    state.push("geometry", false);
    state.context().set("where", FeedParserDict::new());
}

fn end_georss_simple(state: &mut ParserState, parse: fn(&str, bool, usize) -> Option<FeedParserDict>) {
    let value = state.pop("geometry").unwrap_or_default();
    save_where(state, parse(&value, true, 2));
}

fn end_georss_point(state: &mut ParserState) {
    end_georss_simple(state, parse_point);
}

fn end_georss_line(state: &mut ParserState) {
    end_georss_simple(state, parse_line);
}

fn end_georss_polygon(state: &mut ParserState) {
    end_georss_simple(state, parse_polygon);
}

fn end_georss_box(state: &mut ParserState) {
    end_georss_simple(state, parse_box);
}

fn start_where(state: &mut ParserState, _attrs: Attrs) {
    state.push("where", false);
    state.context().set("where", FeedParserDict::new());
}

fn end_where(state: &mut ParserState) {
    state.pop("where");
}

// ============================================================================
// GML
// ============================================================================

fn parse_srs_attrs(state: &mut ParserState, attrs: &Attrs) {
    let dimension = attrs
        .get("srsdimension")
        .and_then(|d| d.parse::<i64>().ok())
        .unwrap_or(2);
    let place = state.context().ensure_dict("where");
    place.set("srsName", attrs.get("srsname"));
    place.set("srsDimension", dimension);
}

fn start_gml_point(state: &mut ParserState, attrs: Attrs) {
    parse_srs_attrs(state, &attrs);
    state.ingeometry = GeometryKind::Point;
    state.push("geometry", false);
}

fn start_gml_linestring(state: &mut ParserState, attrs: Attrs) {
    parse_srs_attrs(state, &attrs);
    state.ingeometry = GeometryKind::LineString;
    state.push("geometry", false);
}

fn start_gml_polygon(state: &mut ParserState, attrs: Attrs) {
    parse_srs_attrs(state, &attrs);
    state.push("geometry", false);
}

fn start_gml_exterior(state: &mut ParserState, _attrs: Attrs) {
    state.push("geometry", false);
}

fn start_gml_linearring(state: &mut ParserState, _attrs: Attrs) {
    state.ingeometry = GeometryKind::Polygon;
    state.push("geometry", false);
}

fn start_gml_pos(state: &mut ParserState, _attrs: Attrs) {
    state.push("pos", false);
}

/// Axis order and dimension declared by the enclosing GML geometry.
fn srs(state: &mut ParserState) -> (bool, usize) {
    let place = state.context().ensure_dict("where");
    let dims = place
        .get("srsDimension")
        .and_then(Value::as_int)
        .and_then(|d| usize::try_from(d).ok())
        .unwrap_or(2);
    let swap = match place.get_str("srsName") {
        Some(name) if name.contains("EPSG") => name
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .map_or(true, is_geographic),
        _ => true,
    };
    (swap, dims)
}

fn end_gml_pos(state: &mut ParserState) {
    let value = state.pop("pos").unwrap_or_default();
    let (swap, dims) = srs(state);
    save_where(state, parse_point(&value, swap, dims));
}

fn end_gml_poslist(state: &mut ParserState) {
    let value = state.pop("pos").unwrap_or_default();
    let (swap, dims) = srs(state);
    let geometry = match state.ingeometry {
        GeometryKind::LineString => parse_line(&value, swap, dims),
        GeometryKind::Polygon => parse_line(&value, swap, dims).and_then(|mut line| {
            let ring = line.remove("coordinates")?;
            Some(geometry("Polygon", Value::List(vec![ring])))
        }),
        GeometryKind::None | GeometryKind::Point => None,
    };
    save_where(state, geometry);
}

fn end_geometry(state: &mut ParserState) {
    state.ingeometry = GeometryKind::None;
    state.pop("geometry");
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use super::*;
    use pretty_assertions::assert_eq;

    fn floats(value: &Value) -> Vec<Vec<f64>> {
        value
            .as_list()
            .unwrap()
            .iter()
            .map(|t| t.as_list().unwrap().iter().map(|v| if let Value::Float(f) = v { *f } else { f64::NAN }).collect())
            .collect()
    }

    #[test]
    fn test_parse_point_swaps_to_lon_lat() {
        let point = parse_point("45.256 -71.92", true, 2).unwrap();
        assert_eq!(point.get_str("type"), Some("Point"));
        assert_eq!(
            point.get("coordinates"),
            Some(&Value::List(vec![Value::Float(-71.92), Value::Float(45.256)]))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_point("", true, 2), None);
        assert_eq!(parse_point("45.256 north", true, 2), None);
        assert_eq!(parse_polygon("1 2 3 4 5 6", true, 2), None);
    }

    #[test]
    fn test_trailing_partial_tuple_is_dropped() {
        let line = parse_line("1,2 3,4 5", true, 2).unwrap();
        assert_eq!(floats(line.get("coordinates").unwrap()), vec![vec![2.0, 1.0], vec![4.0, 3.0]]);
    }

    #[test]
    fn test_epsg_lookup() {
        assert!(is_geographic(4326));
        assert!(is_geographic(4700));
        assert!(!is_geographic(4017));
        assert!(!is_geographic(3857));
    }

    #[test]
    fn test_georss_point_in_entry() {
        let parsed = run(&rss(
            true,
            vec![Ev::Start("georss:point", &[]), Ev::Text("45.256 -71.92"), Ev::End("georss:point")],
        ));
        let place = parsed.entries[0].get_dict("where").unwrap();
        assert_eq!(place.get_str("type"), Some("Point"));
    }

    #[test]
    fn test_gml_polygon_with_projected_srs() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("georss:where", &[]),
                Ev::Start("gml:Polygon", &[("srsName", "EPSG:3857")]),
                Ev::Start("gml:exterior", &[]),
                Ev::Start("gml:LinearRing", &[]),
                Ev::Start("gml:posList", &[]),
                Ev::Text("1 2 3 4 5 6 1 2"),
                Ev::End("gml:posList"),
                Ev::End("gml:LinearRing"),
                Ev::End("gml:exterior"),
                Ev::End("gml:Polygon"),
                Ev::End("georss:where"),
            ],
        ));
        let place = parsed.entries[0].get_dict("where").unwrap();
        assert_eq!(place.get_str("type"), Some("Polygon"));
        assert_eq!(place.get_str("srsName"), Some("EPSG:3857"));
        let rings = place.get_list("coordinates").unwrap();
        assert_eq!(floats(&rings[0])[0], vec![1.0, 2.0]);
    }
}
