use serde::{Deserialize, Serialize};

use crate::error::CostError;

/// Physical category a unit belongs to. Conversion is only defined within a
/// single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Mass,
    Volume,
    Length,
    Count,
}

impl UnitKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Mass => "mass",
            UnitKind::Volume => "volume",
            UnitKind::Length => "length",
            UnitKind::Count => "count",
        }
    }
}

// Multipliers into the category base unit (grams, millilitres, metres).
const MASS_TO_GRAMS: &[(&str, f64)] = &[
    ("kg", 1000.0),
    ("g", 1.0),
    ("mg", 0.001),
    ("oz", 28.3495),
    ("lb", 453.592),
];

const VOLUME_TO_ML: &[(&str, f64)] = &[
    ("l", 1000.0),
    ("ml", 1.0),
    ("cup", 236.588),
    ("tbsp", 15.0),
    ("tsp", 5.0),
    ("gallon", 3785.41),
];

const LENGTH_TO_M: &[(&str, f64)] = &[
    ("km", 1000.0),
    ("m", 1.0),
    ("cm", 0.01),
    ("mm", 0.001),
    ("in", 0.0254),
    ("ft", 0.3048),
];

/// Count-like units carry no shared numeric base; they are interchangeable
/// only through this 1:1 equivalence list.
const COUNT_UNITS: &[&str] = &["piece", "each", "unit", "serving"];

fn base_multiplier(unit: &str) -> Option<(UnitKind, f64)> {
    let lower = unit.to_lowercase();
    if let Some(&(_, m)) = MASS_TO_GRAMS.iter().find(|(u, _)| *u == lower) {
        return Some((UnitKind::Mass, m));
    }
    if let Some(&(_, m)) = VOLUME_TO_ML.iter().find(|(u, _)| *u == lower) {
        return Some((UnitKind::Volume, m));
    }
    if let Some(&(_, m)) = LENGTH_TO_M.iter().find(|(u, _)| *u == lower) {
        return Some((UnitKind::Length, m));
    }
    if COUNT_UNITS.contains(&lower.as_str()) {
        return Some((UnitKind::Count, 1.0));
    }
    None
}

/// Category of a unit, if known.
#[must_use]
pub fn unit_kind(unit: &str) -> Option<UnitKind> {
    base_multiplier(unit).map(|(kind, _)| kind)
}

/// Convert `quantity` from one unit to another within the same category.
///
/// Converting a unit to itself is an identity and returns the input
/// unchanged, even for units the tables do not know about. Cross-category
/// conversions and unknown units fail with [`CostError::Conversion`].
pub fn convert(quantity: f64, from: &str, to: &str) -> Result<f64, CostError> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(quantity);
    }

    let (from_kind, from_mult) =
        base_multiplier(from).ok_or_else(|| CostError::unknown_unit(from))?;
    let (to_kind, to_mult) = base_multiplier(to).ok_or_else(|| CostError::unknown_unit(to))?;

    if from_kind != to_kind {
        return Err(CostError::Conversion {
            from: from.to_string(),
            from_kind: from_kind.as_str().to_string(),
            to: to.to_string(),
            to_kind: to_kind.as_str().to_string(),
        });
    }

    // Count units map 1:1, with no numeric base to pass through.
    if from_kind == UnitKind::Count {
        return Ok(quantity);
    }

    Ok(quantity * from_mult / to_mult)
}
