use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use submission_model::FormElementId;
use submission_store::CellValue;

use super::{ColumnBinding, RowArena};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoPoint {
    pub latitude: Decimal,
    pub longitude: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<Decimal>,
}

impl FromStr for GeoPoint {
    type Err = EngineError;

    /// `lat lng [alt [acc]]`, whitespace separated.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if !(2..=4).contains(&tokens.len()) {
            return Err(EngineError::conversion(
                raw,
                "geopoint",
                format!("expected 2 to 4 coordinates, found {}", tokens.len()),
            ));
        }
        let coordinate = |token: &str| {
            Decimal::from_str(token)
                .or_else(|_| Decimal::from_scientific(token))
                .map_err(|err| EngineError::conversion(raw, "geopoint", err))
        };
        Ok(Self {
            latitude: coordinate(tokens[0])?,
            longitude: coordinate(tokens[1])?,
            altitude: tokens.get(2).map(|token| coordinate(token)).transpose()?,
            accuracy: tokens.get(3).map(|token| coordinate(token)).transpose()?,
        })
    }
}

/// Geopoint spread over latitude, longitude, altitude and accuracy columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoPointValue {
    pub(crate) element: FormElementId,
    columns: [ColumnBinding; 4],
    value: Option<GeoPoint>,
}

impl GeoPointValue {
    pub(crate) fn new(element: FormElementId, columns: [ColumnBinding; 4]) -> Self {
        Self {
            element,
            columns,
            value: None,
        }
    }

    pub fn value(&self) -> Option<&GeoPoint> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: Option<GeoPoint>) {
        self.value = value;
    }

    pub fn set_from_string(&mut self, raw: &str) -> Result<(), EngineError> {
        self.value = if raw.trim().is_empty() {
            None
        } else {
            Some(raw.parse()?)
        };
        Ok(())
    }

    pub(crate) fn load(&mut self, rows: &RowArena) -> Result<(), EngineError> {
        let [lat, lng, alt, acc] = &self.columns;
        let latitude = lat.read(rows)?.as_decimal();
        let longitude = lng.read(rows)?.as_decimal();
        self.value = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
                altitude: alt.read(rows)?.as_decimal(),
                accuracy: acc.read(rows)?.as_decimal(),
            }),
            _ => None,
        };
        Ok(())
    }

    pub(crate) fn write(&self, rows: &mut RowArena) -> Result<(), EngineError> {
        let point = self.value.as_ref();
        let cells = [
            point.map(|point| point.latitude),
            point.map(|point| point.longitude),
            point.and_then(|point| point.altitude),
            point.and_then(|point| point.accuracy),
        ];
        for (binding, cell) in self.columns.iter().zip(cells) {
            binding.write(rows, CellValue::from(cell))?;
        }
        Ok(())
    }
}
