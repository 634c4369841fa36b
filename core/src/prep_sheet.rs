use std::collections::HashMap;

use crate::cost::{RecipeReader, SERVING_UNIT};
use crate::error::CostError;
use crate::models::{
    LineRef, PrepSheetContribution, PrepSheetItem, PrepSheetRecipe, PrepSheetSelection, Recipe,
    RecipeLine,
};
use crate::units;

/// Nesting ceiling for sub-recipe expansion, matching the cost engine's.
const MAX_DEPTH: usize = 64;

/// A generated (not yet persisted) prep sheet body.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub recipes: Vec<PrepSheetRecipe>,
    pub items: Vec<PrepSheetItem>,
}

/// Scale every selected recipe to its requested servings and merge identical
/// ingredients across recipes into one list.
///
/// Scaling is exact multiplication all the way down; nothing is rounded
/// mid-pipeline. Contributions whose unit cannot be converted into the
/// item's unit stay visible in the breakdown, tagged with their own unit,
/// without touching `total_quantity`.
pub fn aggregate(
    selections: &[PrepSheetSelection],
    recipes: &dyn RecipeReader,
) -> Result<Aggregation, CostError> {
    let mut selected = Vec::with_capacity(selections.len());
    let mut map: HashMap<i64, PrepSheetItem> = HashMap::new();
    // Remembers first-encounter order so ties in the final sort stay stable.
    let mut order: Vec<i64> = Vec::new();

    for selection in selections {
        let Some(recipe) = recipes.recipe(selection.recipe_id)? else {
            return Err(CostError::Validation(format!(
                "Recipe {} not found",
                selection.recipe_id
            )));
        };
        if recipe.servings <= 0.0 {
            return Err(CostError::Validation(format!(
                "Recipe '{}' has no servings to scale from",
                recipe.name
            )));
        }
        if selection.requested_servings < 0.0 {
            return Err(CostError::Validation(format!(
                "Requested servings for '{}' must not be negative",
                recipe.name
            )));
        }

        // requested 0 is a valid zero contribution
        let scale = selection.requested_servings / recipe.servings;

        selected.push(PrepSheetRecipe {
            recipe_id: recipe.id,
            recipe_name: recipe.name.clone(),
            base_servings: recipe.servings,
            requested_servings: selection.requested_servings,
        });

        let mut stack = vec![recipe.id];
        collect_lines(&recipe, scale, recipes, &mut stack, &mut map, &mut order)?;
    }

    let mut items: Vec<PrepSheetItem> = order
        .into_iter()
        .filter_map(|id| map.remove(&id))
        .collect();
    items.sort_by(|a, b| {
        a.ingredient_name
            .to_lowercase()
            .cmp(&b.ingredient_name.to_lowercase())
            .then_with(|| a.ingredient_name.cmp(&b.ingredient_name))
    });

    Ok(Aggregation {
        recipes: selected,
        items,
    })
}

fn collect_lines(
    recipe: &Recipe,
    scale: f64,
    recipes: &dyn RecipeReader,
    stack: &mut Vec<i64>,
    map: &mut HashMap<i64, PrepSheetItem>,
    order: &mut Vec<i64>,
) -> Result<(), CostError> {
    if stack.len() > MAX_DEPTH {
        return Err(CostError::Validation(format!(
            "Sub-recipe nesting exceeds maximum depth of {MAX_DEPTH}"
        )));
    }

    for line in &recipe.lines {
        match line.reference {
            LineRef::Ingredient(id) => {
                merge_contribution(map, order, id, line, recipe, line.quantity * scale);
            }
            LineRef::SubRecipe(id) => {
                if stack.contains(&id) {
                    let mut path = stack.clone();
                    path.push(id);
                    return Err(CostError::CircularReference {
                        id,
                        name: line.name.clone().unwrap_or_else(|| format!("recipe {id}")),
                        path,
                    });
                }
                let Some(sub) = recipes.recipe(id)? else {
                    return Err(CostError::Validation(format!("Recipe {id} not found")));
                };
                if sub.servings <= 0.0 {
                    return Err(CostError::Validation(format!(
                        "Recipe '{}' has no servings to scale from",
                        sub.name
                    )));
                }
                // The line quantity is servings of the sub-recipe (count
                // units are 1:1 with servings).
                let servings_used = units::convert(line.quantity, &line.unit, SERVING_UNIT)
                    .map_err(|e| {
                        CostError::Validation(format!(
                            "Line '{}' in '{}': {e}",
                            line.name.clone().unwrap_or_else(|| format!("sub-recipe {id}")),
                            recipe.name
                        ))
                    })?;
                stack.push(id);
                collect_lines(
                    &sub,
                    scale * servings_used / sub.servings,
                    recipes,
                    stack,
                    map,
                    order,
                )?;
                stack.pop();
            }
        }
    }
    Ok(())
}

fn merge_contribution(
    map: &mut HashMap<i64, PrepSheetItem>,
    order: &mut Vec<i64>,
    ingredient_id: i64,
    line: &RecipeLine,
    recipe: &Recipe,
    quantity: f64,
) {
    let name = line
        .name
        .clone()
        .unwrap_or_else(|| format!("ingredient {ingredient_id}"));

    if let Some(item) = map.get_mut(&ingredient_id) {
        match units::convert(quantity, &line.unit, &item.unit) {
            Ok(converted) => {
                item.total_quantity += converted;
                item.breakdown.push(PrepSheetContribution {
                    recipe_name: recipe.name.clone(),
                    quantity: converted,
                    unit: item.unit.clone(),
                });
            }
            // Unmergeable: visible in the breakdown, total untouched
            Err(_) => item.breakdown.push(PrepSheetContribution {
                recipe_name: recipe.name.clone(),
                quantity,
                unit: line.unit.clone(),
            }),
        }
    } else {
        order.push(ingredient_id);
        map.insert(
            ingredient_id,
            PrepSheetItem {
                ingredient_id,
                ingredient_name: name,
                total_quantity: quantity,
                unit: line.unit.clone(),
                breakdown: vec![PrepSheetContribution {
                    recipe_name: recipe.name.clone(),
                    quantity,
                    unit: line.unit.clone(),
                }],
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRecipes {
        recipes: HashMap<i64, Recipe>,
    }

    impl RecipeReader for FakeRecipes {
        fn recipe(&self, id: i64) -> Result<Option<Recipe>, CostError> {
            Ok(self.recipes.get(&id).cloned())
        }
    }

    fn line(reference: LineRef, quantity: f64, unit: &str, name: &str) -> RecipeLine {
        RecipeLine {
            id: 0,
            uuid: String::new(),
            recipe_id: 0,
            reference,
            quantity,
            unit: unit.to_string(),
            cost: None,
            name: Some(name.to_string()),
        }
    }

    fn recipe(id: i64, name: &str, servings: f64, lines: Vec<RecipeLine>) -> Recipe {
        Recipe {
            id,
            uuid: String::new(),
            name: name.to_string(),
            servings,
            currency: "USD".to_string(),
            selling_price: None,
            target_cost_pct: None,
            waste_buffer_pct: 0.0,
            total_cost: None,
            profit_margin: None,
            created_at: String::new(),
            updated_at: String::new(),
            lines,
        }
    }

    fn store(recipes: Vec<Recipe>) -> FakeRecipes {
        FakeRecipes {
            recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    fn select(recipe_id: i64, requested_servings: f64) -> PrepSheetSelection {
        PrepSheetSelection {
            recipe_id,
            requested_servings,
        }
    }

    #[test]
    fn test_pancakes_and_waffles_merge() {
        // Pancakes: 10 servings, 500g flour; requested 30 -> 1500g
        // Waffles: 4 servings, 200g flour; requested 16 -> 800g
        let recipes = store(vec![
            recipe(
                1,
                "Pancakes",
                10.0,
                vec![line(LineRef::Ingredient(1), 500.0, "g", "Flour")],
            ),
            recipe(
                2,
                "Waffles",
                4.0,
                vec![line(LineRef::Ingredient(1), 200.0, "g", "Flour")],
            ),
        ]);

        let agg = aggregate(&[select(1, 30.0), select(2, 16.0)], &recipes).unwrap();
        assert_eq!(agg.items.len(), 1);
        let flour = &agg.items[0];
        assert_eq!(flour.ingredient_name, "Flour");
        assert_eq!(flour.unit, "g");
        assert!((flour.total_quantity - 2300.0).abs() < 1e-9);
        assert_eq!(flour.breakdown.len(), 2);
        assert!((flour.breakdown[0].quantity - 1500.0).abs() < 1e-9);
        assert!((flour.breakdown[1].quantity - 800.0).abs() < 1e-9);
        assert_eq!(agg.recipes.len(), 2);
    }

    #[test]
    fn test_unit_conversion_on_merge() {
        // First encounter fixes grams; the second recipe contributes kilos
        let recipes = store(vec![
            recipe(
                1,
                "Bread",
                1.0,
                vec![line(LineRef::Ingredient(1), 500.0, "g", "Flour")],
            ),
            recipe(
                2,
                "Pasta",
                1.0,
                vec![line(LineRef::Ingredient(1), 1.0, "kg", "Flour")],
            ),
        ]);

        let agg = aggregate(&[select(1, 1.0), select(2, 1.0)], &recipes).unwrap();
        let flour = &agg.items[0];
        assert_eq!(flour.unit, "g");
        assert!((flour.total_quantity - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_unit_kept_visible_not_summed() {
        let recipes = store(vec![
            recipe(
                1,
                "Dough",
                1.0,
                vec![line(LineRef::Ingredient(1), 500.0, "g", "Honey")],
            ),
            recipe(
                2,
                "Glaze",
                1.0,
                vec![line(LineRef::Ingredient(1), 100.0, "ml", "Honey")],
            ),
        ]);

        let agg = aggregate(&[select(1, 1.0), select(2, 1.0)], &recipes).unwrap();
        let honey = &agg.items[0];
        // Total holds only the gram contribution
        assert!((honey.total_quantity - 500.0).abs() < 1e-9);
        assert_eq!(honey.breakdown.len(), 2);
        assert_eq!(honey.breakdown[1].unit, "ml");
        assert!((honey.breakdown[1].quantity - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_selection_order_does_not_change_totals() {
        let recipes = store(vec![
            recipe(
                1,
                "Pancakes",
                10.0,
                vec![
                    line(LineRef::Ingredient(1), 500.0, "g", "Flour"),
                    line(LineRef::Ingredient(2), 300.0, "ml", "Milk"),
                ],
            ),
            recipe(
                2,
                "Waffles",
                4.0,
                vec![
                    line(LineRef::Ingredient(1), 200.0, "g", "Flour"),
                    line(LineRef::Ingredient(2), 150.0, "ml", "Milk"),
                ],
            ),
        ]);

        let fwd = aggregate(&[select(1, 30.0), select(2, 16.0)], &recipes).unwrap();
        let rev = aggregate(&[select(2, 16.0), select(1, 30.0)], &recipes).unwrap();
        assert_eq!(fwd.items.len(), rev.items.len());
        for (a, b) in fwd.items.iter().zip(rev.items.iter()) {
            assert_eq!(a.ingredient_id, b.ingredient_id);
            assert!((a.total_quantity - b.total_quantity).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_requested_servings_is_valid() {
        let recipes = store(vec![recipe(
            1,
            "Pancakes",
            10.0,
            vec![line(LineRef::Ingredient(1), 500.0, "g", "Flour")],
        )]);

        let agg = aggregate(&[select(1, 0.0)], &recipes).unwrap();
        assert_eq!(agg.items.len(), 1);
        assert!((agg.items[0].total_quantity - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_recipe_is_an_error() {
        let recipes = store(vec![]);
        assert!(matches!(
            aggregate(&[select(9, 4.0)], &recipes),
            Err(CostError::Validation(_))
        ));
    }

    #[test]
    fn test_sub_recipe_lines_expand_to_ingredients() {
        // Sauce: 4 servings from 400g tomatoes. Pasta uses 2 servings of
        // sauce and yields 2 servings; requesting 4 servings of pasta
        // doubles everything: 2 * (2/4) * 400g... i.e. scale 2 * 2 servings
        // of sauce = 4 servings -> 400g tomatoes.
        let recipes = store(vec![
            recipe(
                1,
                "Sauce",
                4.0,
                vec![line(LineRef::Ingredient(10), 400.0, "g", "Tomatoes")],
            ),
            recipe(
                2,
                "Pasta",
                2.0,
                vec![
                    line(LineRef::SubRecipe(1), 2.0, "serving", "Sauce"),
                    line(LineRef::Ingredient(11), 200.0, "g", "Spaghetti"),
                ],
            ),
        ]);

        let agg = aggregate(&[select(2, 4.0)], &recipes).unwrap();
        let tomatoes = agg
            .items
            .iter()
            .find(|i| i.ingredient_id == 10)
            .expect("tomatoes aggregated");
        assert!((tomatoes.total_quantity - 400.0).abs() < 1e-9);
        let spaghetti = agg.items.iter().find(|i| i.ingredient_id == 11).unwrap();
        assert!((spaghetti.total_quantity - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_cyclic_store_fails_fast() {
        let recipes = store(vec![
            recipe(
                1,
                "A",
                1.0,
                vec![line(LineRef::SubRecipe(2), 1.0, "serving", "B")],
            ),
            recipe(
                2,
                "B",
                1.0,
                vec![line(LineRef::SubRecipe(1), 1.0, "serving", "A")],
            ),
        ]);

        assert!(matches!(
            aggregate(&[select(1, 1.0)], &recipes),
            Err(CostError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_items_sorted_case_insensitively() {
        let recipes = store(vec![recipe(
            1,
            "Mix",
            1.0,
            vec![
                line(LineRef::Ingredient(1), 5.0, "kg", "tomatoes"),
                line(LineRef::Ingredient(2), 2.0, "kg", "Flour"),
                line(LineRef::Ingredient(3), 1.0, "kg", "SUGAR"),
            ],
        )]);

        let agg = aggregate(&[select(1, 1.0)], &recipes).unwrap();
        let names: Vec<&str> = agg
            .items
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect();
        assert_eq!(names, vec!["Flour", "SUGAR", "tomatoes"]);
    }
}
