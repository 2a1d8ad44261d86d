//! Unit & dimension registry.
//!
//! Dimensions are named vectors of SI base exponents; units bind a symbol to
//! a dimension with a power-of-ten, a multiplicative scale and an additive
//! offset. The registry turns quantity literals such as `"-60mV"` or
//! `"30 min"` into SI values.
//!
//! # Example
//!
//! ```
//! use lems_runtime::units::UnitRegistry;
//!
//! let units = UnitRegistry::standard();
//! let v = units.convert("-60mV", Some("voltage")).unwrap();
//! assert!((v + 0.06).abs() < 1e-12);
//! ```

use indexmap::IndexMap;

use crate::error::UnitError;
use crate::expr::token::scan_number;

/// Wildcard accepted in place of an expected dimension.
pub const ANY_DIMENSION: &str = "*";

/// Name of the dimensionless dimension.
pub const DIMENSIONLESS: &str = "none";

/// SI base exponents, in the order mass, length, time, current,
/// temperature, amount, luminous intensity.
pub type Exponents = [i8; 7];

/// A named physical dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub exponents: Exponents,
}

impl Dimension {
    pub fn new(name: impl Into<String>, exponents: Exponents) -> Self {
        Self {
            name: name.into(),
            exponents,
        }
    }

    /// Builds a dimension from `m l t i k n j` exponents.
    #[allow(clippy::too_many_arguments)]
    pub fn si(name: impl Into<String>, m: i8, l: i8, t: i8, i: i8, k: i8, n: i8, j: i8) -> Self {
        Self::new(name, [m, l, t, i, k, n, j])
    }

    pub fn dimensionless(name: impl Into<String>) -> Self {
        Self::new(name, [0; 7])
    }
}

/// A unit symbol bound to a dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub symbol: String,
    pub dimension: String,
    /// Power-of-ten exponent (`mV` has power -3).
    pub power: i32,
    /// Multiplicative factor (`min` has scale 60).
    pub scale: f64,
    /// Additive offset applied after scaling (`degC` has offset 273.15).
    pub offset: f64,
}

impl Unit {
    pub fn new(symbol: impl Into<String>, dimension: impl Into<String>, power: i32) -> Self {
        Self {
            symbol: symbol.into(),
            dimension: dimension.into(),
            power,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Converts a magnitude in this unit to SI.
    pub fn to_si(&self, magnitude: f64) -> f64 {
        magnitude * self.scale * 10f64.powi(self.power) + self.offset
    }
}

/// Registry of dimensions and units for one model.
#[derive(Clone, Debug, Default)]
pub struct UnitRegistry {
    dimensions: IndexMap<String, Dimension>,
    units: IndexMap<String, Unit>,
}

impl UnitRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the dimensions and units used by
    /// biophysical models.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        for dim in [
            Dimension::dimensionless(DIMENSIONLESS),
            Dimension::si("time", 0, 0, 1, 0, 0, 0, 0),
            Dimension::si("per_time", 0, 0, -1, 0, 0, 0, 0),
            Dimension::si("voltage", 1, 2, -3, -1, 0, 0, 0),
            Dimension::si("per_voltage", -1, -2, 3, 1, 0, 0, 0),
            Dimension::si("current", 0, 0, 0, 1, 0, 0, 0),
            Dimension::si("charge", 0, 0, 1, 1, 0, 0, 0),
            Dimension::si("capacitance", -1, -2, 4, 2, 0, 0, 0),
            Dimension::si("conductance", -1, -2, 3, 2, 0, 0, 0),
            Dimension::si("resistance", 1, 2, -3, -2, 0, 0, 0),
            Dimension::si("temperature", 0, 0, 0, 0, 1, 0, 0),
            Dimension::si("length", 0, 1, 0, 0, 0, 0, 0),
            Dimension::si("area", 0, 2, 0, 0, 0, 0, 0),
            Dimension::si("concentration", 0, -3, 0, 0, 0, 1, 0),
            Dimension::si("specificCapacitance", -1, -4, 4, 2, 0, 0, 0),
            Dimension::si("conductanceDensity", -1, -4, 3, 2, 0, 0, 0),
            Dimension::si("currentDensity", 0, -2, 0, 1, 0, 0, 0),
        ] {
            registry.add_dimension(dim);
        }

        for unit in [
            Unit::new("s", "time", 0),
            Unit::new("ms", "time", -3),
            Unit::new("us", "time", -6),
            Unit::new("min", "time", 0).with_scale(60.0),
            Unit::new("hour", "time", 0).with_scale(3600.0),
            Unit::new("per_s", "per_time", 0),
            Unit::new("per_ms", "per_time", 3),
            Unit::new("Hz", "per_time", 0),
            Unit::new("V", "voltage", 0),
            Unit::new("mV", "voltage", -3),
            Unit::new("per_V", "per_voltage", 0),
            Unit::new("per_mV", "per_voltage", 3),
            Unit::new("A", "current", 0),
            Unit::new("mA", "current", -3),
            Unit::new("uA", "current", -6),
            Unit::new("nA", "current", -9),
            Unit::new("pA", "current", -12),
            Unit::new("C", "charge", 0),
            Unit::new("F", "capacitance", 0),
            Unit::new("uF", "capacitance", -6),
            Unit::new("nF", "capacitance", -9),
            Unit::new("pF", "capacitance", -12),
            Unit::new("S", "conductance", 0),
            Unit::new("mS", "conductance", -3),
            Unit::new("uS", "conductance", -6),
            Unit::new("nS", "conductance", -9),
            Unit::new("pS", "conductance", -12),
            Unit::new("ohm", "resistance", 0),
            Unit::new("kohm", "resistance", 3),
            Unit::new("Mohm", "resistance", 6),
            Unit::new("K", "temperature", 0),
            Unit::new("degC", "temperature", 0).with_offset(273.15),
            Unit::new("m", "length", 0),
            Unit::new("cm", "length", -2),
            Unit::new("um", "length", -6),
            Unit::new("m2", "area", 0),
            Unit::new("cm2", "area", -4),
            Unit::new("um2", "area", -12),
            Unit::new("mol_per_m3", "concentration", 0),
            Unit::new("mM", "concentration", 0),
            Unit::new("F_per_m2", "specificCapacitance", 0),
            Unit::new("uF_per_cm2", "specificCapacitance", -2),
            Unit::new("S_per_m2", "conductanceDensity", 0),
            Unit::new("mS_per_cm2", "conductanceDensity", 1),
            Unit::new("A_per_m2", "currentDensity", 0),
        ] {
            registry.add_unit(unit);
        }

        registry
    }

    /// Registers a dimension, replacing any previous one with the same name.
    pub fn add_dimension(&mut self, dimension: Dimension) -> Option<Dimension> {
        self.dimensions.insert(dimension.name.clone(), dimension)
    }

    /// Registers a unit, replacing any previous one with the same symbol.
    pub fn add_unit(&mut self, unit: Unit) -> Option<Unit> {
        self.units.insert(unit.symbol.clone(), unit)
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn unit(&self, symbol: &str) -> Option<&Unit> {
        self.units.get(symbol)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.values()
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    /// Returns true if the two dimension names denote the same dimension,
    /// either by name or by identical exponents.
    pub fn same_dimension(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.dimensions.get(a), self.dimensions.get(b)) {
            (Some(da), Some(db)) => da.exponents == db.exponents,
            _ => false,
        }
    }

    /// Converts a quantity literal to its SI value.
    ///
    /// The numeric prefix is parsed greedily and the trimmed remainder is
    /// looked up as a unit symbol. A literal without a symbol is returned
    /// unchanged. When `expected` names a dimension (anything but `*`), the
    /// unit must carry that dimension.
    pub fn convert(&self, literal: &str, expected: Option<&str>) -> Result<f64, UnitError> {
        let (magnitude, symbol) = split_literal(literal)?;
        if symbol.is_empty() {
            return Ok(magnitude);
        }

        let unit = self.units.get(symbol).ok_or_else(|| UnitError::UnknownUnit {
            literal: literal.to_string(),
            symbol: symbol.to_string(),
        })?;

        if let Some(expected) = expected {
            if expected != ANY_DIMENSION && !self.same_dimension(expected, &unit.dimension) {
                return Err(UnitError::DimensionMismatch {
                    literal: literal.to_string(),
                    expected: expected.to_string(),
                    found: unit.dimension.clone(),
                });
            }
        }

        Ok(unit.to_si(magnitude))
    }

    /// Checks that every unit refers to a registered dimension.
    pub fn validate(&self) -> Result<(), UnitError> {
        for unit in self.units.values() {
            if !self.dimensions.contains_key(&unit.dimension) {
                return Err(UnitError::UnknownDimension {
                    symbol: unit.symbol.clone(),
                    dimension: unit.dimension.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Splits `"<number><symbol>"` into its magnitude and trimmed symbol.
fn split_literal(literal: &str) -> Result<(f64, &str), UnitError> {
    let trimmed = literal.trim();
    let chars: Vec<char> = trimmed.chars().collect();

    let mut start = 0;
    if matches!(chars.first(), Some('-') | Some('+')) {
        start = 1;
    }
    let end = scan_number(&chars, start);
    if end == start {
        return Err(UnitError::InvalidLiteral(literal.to_string()));
    }

    // Chars before `end` are ASCII, so the char index is also a byte index.
    let (number, rest) = trimmed.split_at(end);
    let magnitude = number
        .parse::<f64>()
        .map_err(|_| UnitError::InvalidLiteral(literal.to_string()))?;
    Ok((magnitude, rest.trim()))
}
