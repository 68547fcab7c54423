//! GeoJSON output.
//!
//! One `Feature` per row of the mapped table that carries at least one
//! parseable geo value. Geo values are `lat lon [alt [acc]]` points separated
//! by `;` for traces and shapes.

use crate::error::ExportResult;
use crate::flatten::FlattenedRow;
use fieldsync_model::{DataType, FieldId, FormModel};
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::debug;

/// Accumulates features for one table.
#[derive(Debug)]
pub struct GeoJsonCollector {
    table: FieldId,
    geo_fields: Vec<(FieldId, DataType)>,
    scalar_fields: Vec<(FieldId, String)>,
    features: Vec<Value>,
}

impl GeoJsonCollector {
    pub fn new(model: &FormModel, table: FieldId) -> Self {
        let geo_fields = model
            .geo_fields(table)
            .into_iter()
            .map(|id| (id, model.field(id).data_type))
            .collect();
        let scalar_fields = model
            .scalar_fields(table)
            .into_iter()
            .map(|id| (id, model.fqn(id)))
            .collect();
        Self {
            table,
            geo_fields,
            scalar_fields,
            features: Vec::new(),
        }
    }

    pub fn table(&self) -> FieldId {
        self.table
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Adds the rows belonging to the mapped table. Returns how many
    /// features were added.
    pub fn add_rows(&mut self, rows: &[FlattenedRow]) -> usize {
        let before = self.features.len();
        for row in rows.iter().filter(|r| r.table == self.table) {
            if let Some(feature) = self.feature(row) {
                self.features.push(feature);
            } else {
                debug!("no geometry in row {}", row.local_id);
            }
        }
        self.features.len() - before
    }

    fn feature(&self, row: &FlattenedRow) -> Option<Value> {
        let mut geometries: Vec<Value> = self
            .geo_fields
            .iter()
            .filter_map(|(id, data_type)| {
                row.value(*id).and_then(|raw| geometry(*data_type, raw))
            })
            .collect();
        let geometry = match geometries.len() {
            0 => return None,
            1 => geometries.remove(0),
            _ => json!({ "type": "GeometryCollection", "geometries": geometries }),
        };

        let mut properties = Map::new();
        properties.insert("key".to_string(), Value::String(row.local_id.clone()));
        for (id, name) in &self.scalar_fields {
            if let Some(value) = row.value(*id) {
                properties.insert(name.clone(), Value::String(value.to_string()));
            }
        }
        Some(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }))
    }

    pub fn to_value(&self) -> Value {
        json!({ "type": "FeatureCollection", "features": self.features })
    }

    /// Writes the collection to `path`, replacing any previous file.
    pub fn write(&self, path: &Path) -> ExportResult<()> {
        let body = serde_json::to_vec_pretty(&self.to_value())?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

/// Builds a GeoJSON geometry from a raw form value.
pub fn geometry(data_type: DataType, raw: &str) -> Option<Value> {
    match data_type {
        DataType::GeoPoint => parse_point(raw).map(|p| json!({ "type": "Point", "coordinates": p })),
        DataType::GeoTrace => {
            let points = parse_points(raw)?;
            (points.len() >= 2).then(|| json!({ "type": "LineString", "coordinates": points }))
        }
        DataType::GeoShape => {
            let mut points = parse_points(raw)?;
            if points.len() < 3 {
                return None;
            }
            if points.first() != points.last() {
                let first = points[0].clone();
                points.push(first);
            }
            Some(json!({ "type": "Polygon", "coordinates": [points] }))
        }
        _ => None,
    }
}

fn parse_points(raw: &str) -> Option<Vec<Vec<f64>>> {
    raw.split(';')
        .filter(|p| !p.trim().is_empty())
        .map(parse_point)
        .collect()
}

/// `lat lon [alt [acc]]` to `[lon, lat, alt?]`.
fn parse_point(raw: &str) -> Option<Vec<f64>> {
    let parts: Vec<f64> = raw
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [lat, lon] => Some(vec![*lon, *lat]),
        [lat, lon, alt, ..] => Some(vec![*lon, *lat, *alt]),
        _ => None,
    }
}
