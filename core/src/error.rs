use thiserror::Error;

/// Errors raised by the costing core.
///
/// Per-line `Conversion` failures during cost computation are recovered into
/// [`crate::cost::CostBreakdown::errors`]; everything else fails the
/// operation that raised it.
#[derive(Debug, Clone, Error)]
pub enum CostError {
    #[error("cannot convert {from} ({from_kind}) to {to} ({to_kind})")]
    Conversion {
        from: String,
        from_kind: String,
        to: String,
        to_kind: String,
    },

    #[error("no exchange rate for {currency}")]
    MissingExchangeRate { currency: String },

    #[error("circular reference: recipe '{name}' (id {id}) via {}", format_path(.path))]
    CircularReference {
        id: i64,
        name: String,
        path: Vec<i64>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(String),
}

impl CostError {
    pub(crate) fn unknown_unit(unit: &str) -> Self {
        CostError::Conversion {
            from: unit.to_string(),
            from_kind: "unknown".to_string(),
            to: unit.to_string(),
            to_kind: "unknown".to_string(),
        }
    }
}

fn format_path(path: &[i64]) -> String {
    if path.is_empty() {
        "direct self-reference".to_string()
    } else {
        path.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl From<rusqlite::Error> for CostError {
    fn from(e: rusqlite::Error) -> Self {
        CostError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_reference_message_includes_path() {
        let err = CostError::CircularReference {
            id: 1,
            name: "Stock".to_string(),
            path: vec![1, 3, 1],
        };
        let msg = err.to_string();
        assert!(msg.contains("Stock"));
        assert!(msg.contains("1 -> 3 -> 1"));
    }

    #[test]
    fn test_circular_reference_message_empty_path() {
        let err = CostError::CircularReference {
            id: 7,
            name: "Demi-glace".to_string(),
            path: vec![],
        };
        assert!(err.to_string().contains("direct self-reference"));
    }

    #[test]
    fn test_missing_rate_names_currency() {
        let err = CostError::MissingExchangeRate {
            currency: "GBP".to_string(),
        };
        assert!(err.to_string().contains("GBP"));
    }
}
