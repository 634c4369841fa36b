use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::models::{LineRef, RecipeSnapshot, SnapshotLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDiff {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub change: ChangeKind,
    /// Relative change for numeric fields. Omitted when the old value is 0
    /// or missing: a percentage of nothing is undefined, not infinite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineDiff {
    pub reference: LineRef,
    pub change: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<SnapshotLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<SnapshotLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_pct_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_pct_change: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDiff {
    pub field_diffs: Vec<FieldDiff>,
    pub line_diffs: Vec<LineDiff>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.field_diffs
            .iter()
            .all(|f| f.change == ChangeKind::Unchanged)
            && self
                .line_diffs
                .iter()
                .all(|l| l.change == ChangeKind::Unchanged)
    }
}

/// Relative change between two readings, as a percentage of the old one.
#[must_use]
pub fn percent_change(old: f64, new: f64) -> Option<f64> {
    if old == 0.0 {
        return None;
    }
    Some((new - old) / old * 100.0)
}

/// Compare two snapshots of the same recipe field by field and line by line.
///
/// Classification only: whether a change is an improvement is a
/// presentation concern and not judged here.
#[must_use]
pub fn diff_snapshots(a: &RecipeSnapshot, b: &RecipeSnapshot) -> SnapshotDiff {
    let mut field_diffs = Vec::new();

    text_field(&mut field_diffs, "name", &a.name, &b.name);
    numeric_field(&mut field_diffs, "servings", Some(a.servings), Some(b.servings));
    text_field(&mut field_diffs, "currency", &a.currency, &b.currency);
    numeric_field(
        &mut field_diffs,
        "selling_price",
        a.selling_price,
        b.selling_price,
    );
    numeric_field(
        &mut field_diffs,
        "target_cost_pct",
        a.target_cost_pct,
        b.target_cost_pct,
    );
    numeric_field(
        &mut field_diffs,
        "waste_buffer_pct",
        Some(a.waste_buffer_pct),
        Some(b.waste_buffer_pct),
    );
    numeric_field(&mut field_diffs, "total_cost", a.total_cost, b.total_cost);
    numeric_field(
        &mut field_diffs,
        "profit_margin",
        a.profit_margin,
        b.profit_margin,
    );

    SnapshotDiff {
        field_diffs,
        line_diffs: diff_lines(&a.lines, &b.lines),
    }
}

fn text_field(out: &mut Vec<FieldDiff>, field: &str, old: &str, new: &str) {
    out.push(FieldDiff {
        field: field.to_string(),
        old_value: json!(old),
        new_value: json!(new),
        change: if old == new {
            ChangeKind::Unchanged
        } else {
            ChangeKind::Modified
        },
        percent_change: None,
    });
}

fn numeric_field(out: &mut Vec<FieldDiff>, field: &str, old: Option<f64>, new: Option<f64>) {
    let change = match (old, new) {
        (Some(o), Some(n)) if (o - n).abs() < f64::EPSILON => ChangeKind::Unchanged,
        (None, None) => ChangeKind::Unchanged,
        _ => ChangeKind::Modified,
    };
    let percent = match (change, old, new) {
        (ChangeKind::Modified, Some(o), Some(n)) => percent_change(o, n),
        _ => None,
    };
    out.push(FieldDiff {
        field: field.to_string(),
        old_value: json!(old),
        new_value: json!(new),
        change,
        percent_change: percent,
    });
}

fn lines_equal(a: &SnapshotLine, b: &SnapshotLine) -> bool {
    (a.quantity - b.quantity).abs() < f64::EPSILON
        && a.unit == b.unit
        && match (a.cost, b.cost) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            (None, None) => true,
            _ => false,
        }
}

fn diff_lines(old_lines: &[SnapshotLine], new_lines: &[SnapshotLine]) -> Vec<LineDiff> {
    let mut diffs = Vec::new();
    let mut consumed = vec![false; new_lines.len()];

    for old in old_lines {
        // First unconsumed line with the same reference; a recipe may list
        // the same ingredient more than once.
        let matched = new_lines
            .iter()
            .enumerate()
            .find(|(i, new)| !consumed[*i] && new.reference == old.reference);

        match matched {
            Some((i, new)) => {
                consumed[i] = true;
                let change = if lines_equal(old, new) {
                    ChangeKind::Unchanged
                } else {
                    ChangeKind::Modified
                };
                diffs.push(LineDiff {
                    reference: old.reference,
                    change,
                    quantity_pct_change: if (old.quantity - new.quantity).abs() < f64::EPSILON {
                        None
                    } else {
                        percent_change(old.quantity, new.quantity)
                    },
                    cost_pct_change: match (old.cost, new.cost) {
                        (Some(o), Some(n)) if (o - n).abs() >= f64::EPSILON => percent_change(o, n),
                        _ => None,
                    },
                    old: Some(old.clone()),
                    new: Some(new.clone()),
                });
            }
            None => diffs.push(LineDiff {
                reference: old.reference,
                change: ChangeKind::Removed,
                old: Some(old.clone()),
                new: None,
                quantity_pct_change: None,
                cost_pct_change: None,
            }),
        }
    }

    for (i, new) in new_lines.iter().enumerate() {
        if !consumed[i] {
            diffs.push(LineDiff {
                reference: new.reference,
                change: ChangeKind::Added,
                old: None,
                new: Some(new.clone()),
                quantity_pct_change: None,
                cost_pct_change: None,
            });
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(version: i64, lines: Vec<SnapshotLine>) -> RecipeSnapshot {
        RecipeSnapshot {
            recipe_id: 1,
            version,
            name: "Pancakes".to_string(),
            servings: 10.0,
            currency: "USD".to_string(),
            selling_price: Some(12.0),
            target_cost_pct: Some(25.0),
            waste_buffer_pct: 5.0,
            total_cost: Some(4.0),
            profit_margin: Some(66.7),
            lines,
            change_reason: None,
            created_at: String::new(),
            is_current: false,
        }
    }

    fn snap_line(reference: LineRef, quantity: f64, unit: &str, cost: Option<f64>) -> SnapshotLine {
        SnapshotLine {
            reference,
            quantity,
            unit: unit.to_string(),
            cost,
        }
    }

    #[test]
    fn test_identical_snapshots_are_unchanged() {
        let lines = vec![snap_line(LineRef::Ingredient(1), 500.0, "g", Some(1.0))];
        let a = snapshot(1, lines.clone());
        let b = snapshot(2, lines);
        let diff = diff_snapshots(&a, &b);
        assert!(diff.is_unchanged());
    }

    #[test]
    fn test_scalar_modification_with_percent() {
        let a = snapshot(1, vec![]);
        let mut b = snapshot(2, vec![]);
        b.total_cost = Some(5.0);

        let diff = diff_snapshots(&a, &b);
        let total = diff
            .field_diffs
            .iter()
            .find(|f| f.field == "total_cost")
            .unwrap();
        assert_eq!(total.change, ChangeKind::Modified);
        // 4.0 -> 5.0 is +25%
        assert!((total.percent_change.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_percent_change_undefined_from_zero() {
        assert!(percent_change(0.0, 10.0).is_none());
        assert!(percent_change(0.0, 0.0).is_none());
        assert!((percent_change(10.0, 0.0).unwrap() - -100.0).abs() < 1e-9);

        let mut a = snapshot(1, vec![]);
        a.total_cost = Some(0.0);
        let mut b = snapshot(2, vec![]);
        b.total_cost = Some(9.0);
        let diff = diff_snapshots(&a, &b);
        let total = diff
            .field_diffs
            .iter()
            .find(|f| f.field == "total_cost")
            .unwrap();
        assert_eq!(total.change, ChangeKind::Modified);
        assert!(total.percent_change.is_none());
    }

    #[test]
    fn test_optional_field_set_and_cleared() {
        let mut a = snapshot(1, vec![]);
        a.selling_price = None;
        let b = snapshot(2, vec![]);

        let diff = diff_snapshots(&a, &b);
        let price = diff
            .field_diffs
            .iter()
            .find(|f| f.field == "selling_price")
            .unwrap();
        assert_eq!(price.change, ChangeKind::Modified);
        assert!(price.percent_change.is_none());
    }

    #[test]
    fn test_line_added_removed_modified() {
        let a = snapshot(
            1,
            vec![
                snap_line(LineRef::Ingredient(1), 500.0, "g", Some(1.0)),
                snap_line(LineRef::Ingredient(2), 200.0, "ml", Some(0.5)),
            ],
        );
        let b = snapshot(
            2,
            vec![
                snap_line(LineRef::Ingredient(1), 750.0, "g", Some(1.5)),
                snap_line(LineRef::Ingredient(3), 2.0, "piece", Some(0.8)),
            ],
        );

        let diff = diff_snapshots(&a, &b);
        assert_eq!(diff.line_diffs.len(), 3);

        let flour = &diff.line_diffs[0];
        assert_eq!(flour.change, ChangeKind::Modified);
        // 500 -> 750 is +50%
        assert!((flour.quantity_pct_change.unwrap() - 50.0).abs() < 1e-9);
        assert!((flour.cost_pct_change.unwrap() - 50.0).abs() < 1e-9);

        let milk = &diff.line_diffs[1];
        assert_eq!(milk.change, ChangeKind::Removed);
        assert!(milk.new.is_none());

        let eggs = &diff.line_diffs[2];
        assert_eq!(eggs.change, ChangeKind::Added);
        assert!(eggs.old.is_none());
    }

    #[test]
    fn test_sub_recipe_and_ingredient_ids_do_not_collide() {
        // Ingredient 5 and sub-recipe 5 are different references
        let a = snapshot(1, vec![snap_line(LineRef::Ingredient(5), 1.0, "kg", None)]);
        let b = snapshot(
            2,
            vec![snap_line(LineRef::SubRecipe(5), 1.0, "serving", None)],
        );

        let diff = diff_snapshots(&a, &b);
        assert_eq!(diff.line_diffs.len(), 2);
        assert_eq!(diff.line_diffs[0].change, ChangeKind::Removed);
        assert_eq!(diff.line_diffs[1].change, ChangeKind::Added);
    }

    #[test]
    fn test_duplicate_references_matched_pairwise() {
        let a = snapshot(
            1,
            vec![
                snap_line(LineRef::Ingredient(1), 100.0, "g", None),
                snap_line(LineRef::Ingredient(1), 50.0, "g", None),
            ],
        );
        let b = snapshot(
            2,
            vec![
                snap_line(LineRef::Ingredient(1), 100.0, "g", None),
                snap_line(LineRef::Ingredient(1), 50.0, "g", None),
            ],
        );

        let diff = diff_snapshots(&a, &b);
        assert!(diff.line_diffs.iter().all(|l| l.change == ChangeKind::Unchanged));
    }

    #[test]
    fn test_unit_change_is_a_modification() {
        let a = snapshot(1, vec![snap_line(LineRef::Ingredient(1), 1.0, "kg", None)]);
        let b = snapshot(2, vec![snap_line(LineRef::Ingredient(1), 1.0, "lb", None)]);

        let diff = diff_snapshots(&a, &b);
        assert_eq!(diff.line_diffs[0].change, ChangeKind::Modified);
        assert!(diff.line_diffs[0].quantity_pct_change.is_none());
    }
}
