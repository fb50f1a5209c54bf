//! InfluxDB line-protocol encoding.
//!
//! Produces `measurement[,tag=value...] field=value[,field=value...]` with no
//! timestamp; the database stamps points at ingestion time. Tags and fields
//! are written in the order they were given.

use std::fmt::Write;

/// Measurement name for soil readings.
pub const SOIL_MEASUREMENT: &str = "soil_moisture";

/// Field carrying the calibrated percentage.
pub const VALUE_FIELD: &str = "value";

/// Tag key identifying the reporting device.
pub const DEVICE_TAG: &str = "device";

// ---

/// One row destined for the time-series database.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    // ---
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, f64)>,
}

impl MeasurementPoint {
    // ---
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Soil moisture point for a single device, as published every cycle.
    pub fn soil_moisture(device: &str, percentage: f64) -> Self {
        Self::new(SOIL_MEASUREMENT)
            .tag(DEVICE_TAG, device)
            .field(VALUE_FIELD, percentage)
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn to_line(&self) -> String {
        encode(&self.measurement, &self.fields, &self.tags)
    }
}

/// Encode a measurement, its fields and tags as one line-protocol row.
///
/// # Panics
/// If `fields` is empty. A row without fields is malformed and always a
/// programming error on the caller's side.
pub fn encode<F, T, V>(measurement: &str, fields: &[(F, f64)], tags: &[(T, V)]) -> String
where
    F: AsRef<str>,
    T: AsRef<str>,
    V: AsRef<str>,
{
    // ---
    assert!(
        !fields.is_empty(),
        "line protocol point `{measurement}` needs at least one field"
    );

    let mut line = escape(measurement, &[',', ' ']);

    for (key, value) in tags {
        line.push(',');
        line.push_str(&escape(key.as_ref(), &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value.as_ref(), &[',', '=', ' ']));
    }

    line.push(' ');

    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape(key.as_ref(), &[',', '=', ' ']));
        line.push('=');
        // `{:?}` keeps the decimal point on whole numbers (100.0, not 100)
        let _ = write!(line, "{value:?}");
    }

    line
}

fn escape(raw: &str, special: &[char]) -> String {
    // ---
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_reference_point() {
        // ---
        let line = encode(
            "soil_moisture",
            &[("value", 42.5)],
            &[("device", "raspberry_pico_w")],
        );

        assert_eq!(line, "soil_moisture,device=raspberry_pico_w value=42.5");
    }

    #[test]
    fn test_builder_matches_encode() {
        // ---
        let point = MeasurementPoint::soil_moisture("raspberry_pico_w", 42.5);

        assert_eq!(
            point.to_line(),
            "soil_moisture,device=raspberry_pico_w value=42.5"
        );
    }

    #[test]
    fn test_insertion_order_preserved() {
        // ---
        let line = encode(
            "soil_moisture",
            &[("value", 12.25), ("raw", 36815.0)],
            &[("location", "bed_b"), ("device", "pico")],
        );

        assert_eq!(
            line,
            "soil_moisture,location=bed_b,device=pico value=12.25,raw=36815.0"
        );
    }

    #[test]
    fn test_no_tags() {
        // ---
        let tags: [(&str, &str); 0] = [];
        let line = encode("soil_moisture", &[("value", 0.0)], &tags);

        assert_eq!(line, "soil_moisture value=0.0");
    }

    #[test]
    fn test_whole_numbers_keep_decimal_point() {
        // ---
        let point = MeasurementPoint::soil_moisture("pico", 100.0);

        assert_eq!(point.to_line(), "soil_moisture,device=pico value=100.0");
    }

    #[test]
    fn test_special_characters_escaped() {
        // ---
        let line = encode(
            "soil moisture",
            &[("value", 1.5)],
            &[("site", "north field,bed=2")],
        );

        assert_eq!(line, r"soil\ moisture,site=north\ field\,bed\=2 value=1.5");
    }

    #[test]
    #[should_panic(expected = "at least one field")]
    fn test_empty_fields_panics() {
        // ---
        let fields: [(&str, f64); 0] = [];
        encode("soil_moisture", &fields, &[("device", "pico")]);
    }
}
