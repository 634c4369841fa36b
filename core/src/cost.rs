use crate::currency::{self, RateTable};
use crate::error::CostError;
use crate::models::{ComputedTotals, IngredientPricing, LineRef, Recipe, RecipeLine};
use crate::units;

/// Hard ceiling on sub-recipe nesting. The cycle validator keeps the graph
/// acyclic, so any composition deeper than this is pathological.
const MAX_DEPTH: usize = 64;

/// Unit a sub-recipe's resolved cost is priced in: one serving of its yield.
pub const SERVING_UNIT: &str = "serving";

/// Read access to ingredient pricing facts.
pub trait IngredientReader {
    fn ingredient_pricing(&self, id: i64) -> Result<Option<IngredientPricing>, CostError>;
}

/// Read access to full recipes, lines included.
pub trait RecipeReader {
    fn recipe(&self, id: i64) -> Result<Option<Recipe>, CostError>;
}

/// Read access to the current exchange-rate table.
pub trait ExchangeRateReader {
    fn rates(&self) -> Result<RateTable, CostError>;
}

/// Write access for persisting engine-derived totals.
pub trait RecipeWriter {
    fn save_computed_totals(&self, recipe_id: i64, totals: &ComputedTotals)
    -> Result<(), CostError>;
}

/// Cost of a single resolved line, in the recipe's currency. `cost` is
/// `None` when the line could not be priced (see the sibling entry in
/// [`CostBreakdown::errors`]).
#[derive(Debug, Clone)]
pub struct LineCost {
    pub line_id: i64,
    pub name: String,
    pub cost: Option<f64>,
}

/// Result of a full cost resolution, in the recipe's currency.
#[derive(Debug, Clone)]
pub struct CostBreakdown {
    pub subtotal: f64,
    pub waste_cost: f64,
    pub total_cost: f64,
    pub line_costs: Vec<LineCost>,
    /// One message per line that could not be priced. Partial-failure
    /// semantics: a bad line never aborts the rest of the recipe; the caller
    /// decides whether a non-empty list blocks saving.
    pub errors: Vec<String>,
}

/// Tracks the recipe ids on the active resolution path. The cycle validator
/// gates every graph mutation, so the guard tripping means the store was
/// mutated behind the validator's back; failing fast here turns that into
/// the same error kind instead of unbounded recursion.
#[derive(Debug, Default)]
struct CostingGuard {
    stack: Vec<(i64, String)>,
}

impl CostingGuard {
    fn enter(&mut self, id: i64, name: &str) -> Result<(), CostError> {
        if self.stack.iter().any(|(seen, _)| *seen == id) {
            let mut path: Vec<i64> = self.stack.iter().map(|(seen, _)| *seen).collect();
            path.push(id);
            return Err(CostError::CircularReference {
                id,
                name: name.to_string(),
                path,
            });
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(CostError::Validation(format!(
                "Sub-recipe nesting exceeds maximum depth of {MAX_DEPTH}"
            )));
        }
        self.stack.push((id, name.to_string()));
        Ok(())
    }

    fn exit(&mut self, id: i64) {
        if let Some(pos) = self.stack.iter().rposition(|(seen, _)| *seen == id) {
            self.stack.remove(pos);
        }
    }
}

pub struct CostEngine<'a> {
    ingredients: &'a dyn IngredientReader,
    recipes: &'a dyn RecipeReader,
    exchange_rates: &'a dyn ExchangeRateReader,
}

impl<'a> CostEngine<'a> {
    #[must_use]
    pub fn new(
        ingredients: &'a dyn IngredientReader,
        recipes: &'a dyn RecipeReader,
        exchange_rates: &'a dyn ExchangeRateReader,
    ) -> Self {
        CostEngine {
            ingredients,
            recipes,
            exchange_rates,
        }
    }

    /// Resolve the recipe's full cost: each line priced via the ingredient
    /// store or a recursive sub-recipe resolution, unit- and
    /// currency-converted into the recipe's own terms, then summed and
    /// topped up by the waste buffer.
    pub fn compute_total_cost(&self, recipe: &Recipe) -> Result<CostBreakdown, CostError> {
        let rates = self.exchange_rates.rates()?;
        let mut guard = CostingGuard::default();
        self.compute_inner(recipe, &rates, &mut guard)
    }

    fn compute_inner(
        &self,
        recipe: &Recipe,
        rates: &RateTable,
        guard: &mut CostingGuard,
    ) -> Result<CostBreakdown, CostError> {
        guard.enter(recipe.id, &recipe.name)?;

        let mut subtotal = 0.0;
        let mut line_costs = Vec::with_capacity(recipe.lines.len());
        let mut errors = Vec::new();

        for line in &recipe.lines {
            match self.resolve_line(recipe, line, rates, guard, &mut errors)? {
                Some((label, cost)) => {
                    subtotal += cost;
                    line_costs.push(LineCost {
                        line_id: line.id,
                        name: label,
                        cost: Some(cost),
                    });
                }
                None => {
                    line_costs.push(LineCost {
                        line_id: line.id,
                        name: line_label(line),
                        cost: None,
                    });
                }
            }
        }

        guard.exit(recipe.id);

        let waste_cost = subtotal * recipe.waste_buffer_pct / 100.0;
        Ok(CostBreakdown {
            subtotal,
            waste_cost,
            total_cost: subtotal + waste_cost,
            line_costs,
            errors,
        })
    }

    /// Price one line. `Ok(None)` means the line was skipped and a message
    /// pushed to `errors`; `Err` is reserved for failures that must abort
    /// the whole computation (cycles, store faults).
    fn resolve_line(
        &self,
        recipe: &Recipe,
        line: &RecipeLine,
        rates: &RateTable,
        guard: &mut CostingGuard,
        errors: &mut Vec<String>,
    ) -> Result<Option<(String, f64)>, CostError> {
        let (label, pricing) = match line.reference {
            LineRef::Ingredient(id) => match self.ingredients.ingredient_pricing(id)? {
                Some(pricing) => (pricing.name.clone(), pricing),
                None => {
                    errors.push(format!("{}: ingredient {id} not found", line_label(line)));
                    return Ok(None);
                }
            },
            LineRef::SubRecipe(id) => {
                let Some(sub) = self.recipes.recipe(id)? else {
                    errors.push(format!("{}: sub-recipe {id} not found", line_label(line)));
                    return Ok(None);
                };
                if sub.servings <= 0.0 {
                    errors.push(format!("{}: sub-recipe has no yield", sub.name));
                    return Ok(None);
                }
                let breakdown = self.compute_inner(&sub, rates, guard)?;
                for e in breakdown.errors {
                    errors.push(format!("{}: {e}", sub.name));
                }
                let pricing = IngredientPricing {
                    name: sub.name.clone(),
                    price_per_unit: breakdown.total_cost / sub.servings,
                    unit: SERVING_UNIT.to_string(),
                    currency: sub.currency.clone(),
                };
                (sub.name.clone(), pricing)
            }
        };

        let quantity = match units::convert(line.quantity, &line.unit, &pricing.unit) {
            Ok(q) => q,
            Err(e) => {
                errors.push(format!("{label}: {e}"));
                return Ok(None);
            }
        };

        let cost = quantity * pricing.price_per_unit;
        match currency::convert(cost, &pricing.currency, &recipe.currency, rates) {
            Ok(converted) => Ok(Some((label, converted))),
            Err(e) => {
                errors.push(format!("{label}: {e}"));
                Ok(None)
            }
        }
    }
}

fn line_label(line: &RecipeLine) -> String {
    line.name.clone().unwrap_or_else(|| match line.reference {
        LineRef::Ingredient(id) => format!("ingredient {id}"),
        LineRef::SubRecipe(id) => format!("sub-recipe {id}"),
    })
}

/// Price that puts food cost at `target_cost_pct` of the menu price,
/// rounded to cents. Non-positive targets yield the 0.0 sentinel.
#[must_use]
pub fn suggested_price(total_cost: f64, target_cost_pct: f64) -> f64 {
    if target_cost_pct <= 0.0 {
        return 0.0;
    }
    let price = total_cost / (target_cost_pct / 100.0);
    (price * 100.0).round() / 100.0
}

/// Margin percentage of the selling price. `None` when there is no positive
/// selling price to measure against.
#[must_use]
pub fn profit_margin(total_cost: f64, selling_price: f64) -> Option<f64> {
    if selling_price <= 0.0 {
        return None;
    }
    Some((selling_price - total_cost) / selling_price * 100.0)
}

/// Food cost as a percentage of the selling price; 0.0 when unpriced.
#[must_use]
pub fn food_cost_pct(total_cost: f64, selling_price: f64) -> f64 {
    if selling_price <= 0.0 {
        return 0.0;
    }
    total_cost / selling_price * 100.0
}

/// Blend an existing stock's unit price with a new purchase's. Used when a
/// delivery arrives at a different price than the stock on hand.
#[must_use]
pub fn weighted_average_price(
    stock_qty: f64,
    stock_price: f64,
    added_qty: f64,
    added_price: f64,
) -> f64 {
    let total_qty = stock_qty + added_qty;
    if total_qty <= 0.0 {
        return 0.0;
    }
    (stock_qty * stock_price + added_qty * added_price) / total_qty
}
