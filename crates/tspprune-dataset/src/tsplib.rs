//! Reading TSPLIB problem (`.tsp`) and tour (`.opt.tour`) files, and writing
//! generated `EUC_2D` problems.

use crate::error::{PipelineError, PipelineResult};
use crate::graph::{Graph, Tour};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightType {
    Coords(Metric),
    Explicit,
}

impl WeightType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "EUC_2D" => Some(Self::Coords(Metric::Euc2d)),
            "CEIL_2D" => Some(Self::Coords(Metric::Ceil2d)),
            "ATT" => Some(Self::Coords(Metric::Att)),
            "GEO" => Some(Self::Coords(Metric::Geo)),
            "EXPLICIT" => Some(Self::Explicit),
            _ => None,
        }
    }
}

/// Coordinate-based TSPLIB distance functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Euc2d,
    Ceil2d,
    Att,
    Geo,
}

impl Metric {
    fn distance(self, p: (f64, f64), q: (f64, f64)) -> f64 {
        let (dx, dy) = (p.0 - q.0, p.1 - q.1);
        match self {
            Self::Euc2d => nint(dx.hypot(dy)),
            Self::Ceil2d => dx.hypot(dy).ceil(),
            Self::Att => {
                let r = ((dx * dx + dy * dy) / 10.0).sqrt();
                let t = nint(r);
                if t < r { t + 1.0 } else { t }
            }
            Self::Geo => geo_distance(p, q),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    NodeCoord,
    EdgeWeight,
    Tour,
    Ignored,
}

impl Section {
    fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "NODE_COORD_SECTION" => Some(Self::NodeCoord),
            "EDGE_WEIGHT_SECTION" => Some(Self::EdgeWeight),
            "TOUR_SECTION" => Some(Self::Tour),
            "DISPLAY_DATA_SECTION" | "FIXED_EDGES_SECTION" => Some(Self::Ignored),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawFile {
    header: HashMap<String, String>,
    coords: Vec<(i64, f64, f64)>,
    edge_weights: Vec<f64>,
    tour: Vec<i64>,
}

impl RawFile {
    fn dimension(&self, path: &Path) -> PipelineResult<Option<usize>> {
        self.header
            .get("DIMENSION")
            .map(|d| {
                d.parse::<usize>().map_err(|_| {
                    PipelineError::invalid_instance(path, format!("bad DIMENSION {d:?}"))
                })
            })
            .transpose()
    }
}

fn parse_raw(text: &str, path: &Path) -> PipelineResult<RawFile> {
    let mut raw = RawFile::default();
    let mut section: Option<Section> = None;
    let mut tour_closed = false;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "EOF" {
            break;
        }

        let first = line.split_whitespace().next().unwrap_or_default();
        let is_data = first.parse::<f64>().is_ok();

        if let (Some(current), true) = (section, is_data) {
            let bad = || {
                PipelineError::invalid_instance(
                    path,
                    format!("line {}: bad data {line:?}", lineno + 1),
                )
            };
            match current {
                Section::NodeCoord => {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() < 3 {
                        return Err(bad());
                    }
                    let id = fields[0].parse::<i64>().map_err(|_| bad())?;
                    let x = fields[1].parse::<f64>().map_err(|_| bad())?;
                    let y = fields[2].parse::<f64>().map_err(|_| bad())?;
                    raw.coords.push((id, x, y));
                }
                Section::EdgeWeight => {
                    for token in line.split_whitespace() {
                        raw.edge_weights.push(token.parse::<f64>().map_err(|_| bad())?);
                    }
                }
                Section::Tour => {
                    for token in line.split_whitespace() {
                        let id = token.parse::<i64>().map_err(|_| bad())?;
                        if id == -1 {
                            tour_closed = true;
                            break;
                        }
                        if !tour_closed {
                            raw.tour.push(id);
                        }
                    }
                }
                Section::Ignored => {}
            }
            continue;
        }

        if let Some(next) = Section::parse(line.trim_end_matches(':').trim()) {
            section = Some(next);
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(PipelineError::invalid_instance(
                path,
                format!("line {}: expected `KEY: value`, got {line:?}", lineno + 1),
            ));
        };
        section = None;
        raw.header.insert(key.trim().to_uppercase(), value.trim().to_string());
    }

    Ok(raw)
}

/// Read a TSPLIB `.tsp` file into a complete [`Graph`].
pub fn read_problem(path: &Path) -> PipelineResult<Graph> {
    let text = std::fs::read_to_string(path)?;
    parse_problem(&text, path)
}

pub fn parse_problem(text: &str, path: &Path) -> PipelineResult<Graph> {
    let raw = parse_raw(text, path)?;
    let name = raw.header.get("NAME").cloned().unwrap_or_else(|| {
        path.file_name()
            .map(|n| crate::layout::name_stem(&n.to_string_lossy()).to_string())
            .unwrap_or_default()
    });
    let dimension = raw
        .dimension(path)?
        .ok_or_else(|| PipelineError::invalid_instance(path, "missing DIMENSION"))?;

    let weight_type = raw
        .header
        .get("EDGE_WEIGHT_TYPE")
        .map(String::as_str)
        .unwrap_or("EUC_2D");
    let weight_type = WeightType::parse(weight_type).ok_or_else(|| {
        PipelineError::invalid_instance(path, format!("unsupported EDGE_WEIGHT_TYPE {weight_type}"))
    })?;

    match weight_type {
        WeightType::Explicit => {
            let format =
                raw.header.get("EDGE_WEIGHT_FORMAT").map_or("FULL_MATRIX", String::as_str);
            let matrix = explicit_matrix(&raw.edge_weights, dimension, format, path)?;
            Graph::from_fn(name, dimension, 1, |a, b| matrix[a * dimension + b])
        }
        WeightType::Coords(metric) => coordinate_graph(name, raw.coords, dimension, metric, path),
    }
}

fn coordinate_graph(
    name: String,
    mut coords: Vec<(i64, f64, f64)>,
    dimension: usize,
    metric: Metric,
    path: &Path,
) -> PipelineResult<Graph> {
    coords.sort_by_key(|c| c.0);
    if coords.len() != dimension {
        return Err(PipelineError::invalid_instance(
            path,
            format!("DIMENSION is {dimension} but {} coordinates were given", coords.len()),
        ));
    }
    let first = coords.first().map_or(1, |c| c.0);
    let min_node = u32::try_from(first)
        .map_err(|_| PipelineError::invalid_instance(path, format!("negative node id {first}")))?;
    for (offset, c) in coords.iter().enumerate() {
        if c.0 != first + offset as i64 {
            return Err(PipelineError::invalid_instance(path, "node ids are not contiguous"));
        }
    }
    Graph::from_fn(name, dimension, min_node, |a, b| {
        metric.distance((coords[a].1, coords[a].2), (coords[b].1, coords[b].2))
    })
}

fn explicit_matrix(
    values: &[f64],
    n: usize,
    format: &str,
    path: &Path,
) -> PipelineResult<Vec<f64>> {
    let cells: Vec<(usize, usize)> = match format {
        "FULL_MATRIX" => (0..n).flat_map(|i| (0..n).map(move |j| (i, j))).collect(),
        "UPPER_ROW" => (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect(),
        "LOWER_ROW" => (0..n).flat_map(|i| (0..i).map(move |j| (i, j))).collect(),
        "UPPER_DIAG_ROW" => (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect(),
        "LOWER_DIAG_ROW" => (0..n).flat_map(|i| (0..=i).map(move |j| (i, j))).collect(),
        other => {
            return Err(PipelineError::invalid_instance(
                path,
                format!("unsupported EDGE_WEIGHT_FORMAT {other}"),
            ));
        }
    };
    if values.len() != cells.len() {
        return Err(PipelineError::invalid_instance(
            path,
            format!(
                "{format} for dimension {n} needs {} weights, got {}",
                cells.len(),
                values.len()
            ),
        ));
    }

    let mut matrix = vec![0.0; n * n];
    for (&(i, j), &w) in cells.iter().zip(values) {
        matrix[i * n + j] = w;
        if format != "FULL_MATRIX" {
            matrix[j * n + i] = w;
        }
    }
    Ok(matrix)
}

/// Read a TSPLIB `.opt.tour` file.
pub fn read_tour(path: &Path) -> PipelineResult<Tour> {
    let text = std::fs::read_to_string(path)?;
    parse_tour(&text, path)
}

pub fn parse_tour(text: &str, path: &Path) -> PipelineResult<Tour> {
    let raw = parse_raw(text, path)?;
    if raw.tour.is_empty() {
        return Err(PipelineError::invalid_instance(path, "empty or missing TOUR_SECTION"));
    }
    if let Some(dimension) = raw.dimension(path)? {
        if dimension != raw.tour.len() {
            return Err(PipelineError::invalid_instance(
                path,
                format!("DIMENSION is {dimension} but tour lists {} nodes", raw.tour.len()),
            ));
        }
    }
    let nodes = raw
        .tour
        .iter()
        .map(|&id| {
            u32::try_from(id)
                .map_err(|_| PipelineError::invalid_instance(path, format!("bad node id {id}")))
        })
        .collect::<PipelineResult<Vec<_>>>()?;
    Ok(Tour::new(nodes))
}

/// Write an `EUC_2D` problem with nodes numbered from 1.
pub fn write_problem(
    path: &Path,
    name: &str,
    coords: &[(f64, f64)],
    precision: usize,
) -> PipelineResult<()> {
    let mut out = String::new();
    // String formatting is infallible.
    let _ = writeln!(out, "NAME: {name}");
    let _ = writeln!(out, "TYPE: TSP");
    let _ = writeln!(out, "DIMENSION: {}", coords.len());
    let _ = writeln!(out, "EDGE_WEIGHT_TYPE: EUC_2D");
    let _ = writeln!(out, "NODE_COORD_SECTION");
    for (i, (x, y)) in coords.iter().enumerate() {
        let _ = writeln!(out, "{} {x:.precision$} {y:.precision$}", i + 1);
    }
    out.push_str("EOF\n");
    std::fs::write(path, out)?;
    Ok(())
}

/// Rounding used by TSPLIB distance functions.
fn nint(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn geo_distance(p: (f64, f64), q: (f64, f64)) -> f64 {
    const PI: f64 = 3.141_592;
    const RRR: f64 = 6378.388;
    let radians = |x: f64| {
        let deg = x.trunc();
        let min = x - deg;
        PI * (deg + 5.0 * min / 3.0) / 180.0
    };
    let (lat_p, lon_p) = (radians(p.0), radians(p.1));
    let (lat_q, lon_q) = (radians(q.0), radians(q.1));
    let q1 = (lon_p - lon_q).cos();
    let q2 = (lat_p - lat_q).cos();
    let q3 = (lat_p + lat_q).cos();
    (RRR * (0.5 * ((1.0 + q1) * q2 - (1.0 - q1) * q3)).acos() + 1.0).trunc()
}
