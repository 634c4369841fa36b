use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::cost::{self, CostBreakdown, CostEngine, RecipeWriter};
use crate::db::Database;
use crate::diff::{SnapshotDiff, diff_snapshots};
use crate::error::CostError;
use crate::graph;
use crate::models::{
    ComputedTotals, Ingredient, LineInput, LineRef, NewIngredient, NewRecipe, PrepSheet,
    PrepSheetSelection, Recipe, RecipeSnapshot, RecipeUpdate, validate_currency_code,
    validate_line_input,
};
use crate::prep_sheet::{Aggregation, aggregate};

type Result<T, E = CostError> = std::result::Result<T, E>;

/// Cost resolution plus the menu-pricing numbers derived from it.
#[derive(Debug, Clone)]
pub struct CostReport {
    pub recipe: Recipe,
    pub breakdown: CostBreakdown,
    pub suggested_price: Option<f64>,
    pub food_cost_pct: Option<f64>,
}

/// Facade over the costing core and its persistence.
///
/// Owns the single database connection, so every graph mutation and every
/// cascading recompute runs to completion before the next one starts: at
/// most one in-flight recompute per recipe, by construction. Construct one
/// per caller; there is no process-wide instance.
pub struct LadleService {
    db: Database,
}

impl LadleService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Ingredients ---

    pub fn add_ingredient(&self, ing: &NewIngredient) -> Result<Ingredient> {
        self.db.insert_ingredient(ing)
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Ingredient> {
        self.db
            .get_ingredient(id)?
            .ok_or_else(|| CostError::Validation(format!("Ingredient {id} not found")))
    }

    pub fn get_ingredient_by_name(&self, name: &str) -> Result<Ingredient> {
        self.db
            .get_ingredient_by_name(name)?
            .ok_or_else(|| CostError::Validation(format!("Ingredient '{name}' not found")))
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        self.db.list_ingredients(search)
    }

    /// Reprice an ingredient and recompute every recipe that uses it,
    /// directly or through sub-recipes. Returns the recomputed recipe ids.
    pub fn set_ingredient_price(&self, id: i64, price_per_unit: f64) -> Result<Vec<i64>> {
        self.db.set_ingredient_price(id, price_per_unit)?;
        let mut recomputed = Vec::new();
        for recipe_id in self.db.recipes_using_ingredient(id)? {
            recomputed.extend(self.recompute_cascade(recipe_id)?);
        }
        Ok(recomputed)
    }

    pub fn set_ingredient_stock(&self, id: i64, current_stock: f64) -> Result<()> {
        self.db.set_ingredient_stock(id, current_stock)
    }

    /// Book a delivery: stock goes up, the unit price becomes the weighted
    /// average of old stock and the new purchase, and dependent recipe
    /// costs are refreshed.
    pub fn receive_stock(&self, id: i64, quantity: f64, unit_price: f64) -> Result<Ingredient> {
        if quantity <= 0.0 {
            return Err(CostError::Validation(
                "Delivered quantity must be greater than 0".to_string(),
            ));
        }
        if unit_price < 0.0 {
            return Err(CostError::Validation(
                "Unit price must not be negative".to_string(),
            ));
        }
        let ing = self.get_ingredient(id)?;
        let blended = cost::weighted_average_price(
            ing.current_stock,
            ing.price_per_unit,
            quantity,
            unit_price,
        );
        self.db.set_ingredient_stock(id, ing.current_stock + quantity)?;
        self.set_ingredient_price(id, blended)?;
        self.get_ingredient(id)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let created = self.db.create_recipe(recipe)?;
        self.db.insert_snapshot(&created, Some("Created"))?;
        Ok(created)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.db
            .get_recipe(id)?
            .ok_or_else(|| CostError::Validation(format!("Recipe {id} not found")))
    }

    pub fn get_recipe_by_name(&self, name: &str) -> Result<Recipe> {
        self.db
            .get_recipe_by_name(name)?
            .ok_or_else(|| CostError::Validation(format!("Recipe '{name}' not found")))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.db.list_recipes()
    }

    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        self.db.delete_recipe(id)
    }

    /// Replace a recipe's composition. Validate-then-commit: the cycle
    /// check runs to completion against the pre-edit graph before anything
    /// is written, then the new line set lands atomically, costs cascade,
    /// and a version snapshot records the change.
    pub fn set_recipe_lines(
        &self,
        recipe_id: i64,
        lines: &[LineInput],
        change_reason: Option<&str>,
    ) -> Result<Recipe> {
        let recipe = self.get_recipe(recipe_id)?;

        for line in lines {
            validate_line_input(line)?;
            match line.reference {
                LineRef::Ingredient(id) => {
                    if self.db.get_ingredient(id)?.is_none() {
                        return Err(CostError::Validation(format!(
                            "Ingredient {id} not found"
                        )));
                    }
                }
                LineRef::SubRecipe(id) => {
                    if id != recipe_id && self.db.get_recipe(id)?.is_none() {
                        return Err(CostError::Validation(format!("Recipe {id} not found")));
                    }
                }
            }
        }

        graph::ensure_acyclic(recipe_id, &recipe.name, lines, &self.db)?;

        self.db.set_recipe_lines(recipe_id, lines)?;
        self.recompute_cascade(recipe_id)?;

        let updated = self.get_recipe(recipe_id)?;
        self.db
            .insert_snapshot(&updated, change_reason.or(Some("Lines updated")))?;
        Ok(updated)
    }

    /// Apply a partial scalar update, then recompute and snapshot.
    pub fn update_recipe(&self, recipe_id: i64, update: &RecipeUpdate) -> Result<Recipe> {
        let mut recipe = self.get_recipe(recipe_id)?;
        if let Some(name) = &update.name {
            recipe.name = name.clone();
        }
        if let Some(servings) = update.servings {
            recipe.servings = servings;
        }
        if let Some(currency) = &update.currency {
            recipe.currency = validate_currency_code(currency)?;
        }
        if let Some(selling_price) = update.selling_price {
            recipe.selling_price = selling_price;
        }
        if let Some(target_cost_pct) = update.target_cost_pct {
            recipe.target_cost_pct = target_cost_pct;
        }
        if let Some(waste_buffer_pct) = update.waste_buffer_pct {
            recipe.waste_buffer_pct = waste_buffer_pct;
        }
        self.db.update_recipe_scalars(&recipe)?;
        self.recompute_cascade(recipe_id)?;

        let updated = self.get_recipe(recipe_id)?;
        self.db.insert_snapshot(&updated, Some("Updated"))?;
        Ok(updated)
    }

    // --- Costing ---

    /// Resolve a recipe's cost, persist the derived totals (cascading to
    /// every ancestor), and report the pricing numbers.
    pub fn compute_cost(&self, recipe_id: i64) -> Result<CostReport> {
        let breakdown = self.compute_and_store(recipe_id)?;
        for parent in self.ancestors_of(recipe_id)? {
            self.compute_and_store(parent)?;
        }

        let recipe = self.get_recipe(recipe_id)?;
        let suggested = recipe
            .target_cost_pct
            .map(|pct| cost::suggested_price(breakdown.total_cost, pct));
        let food_pct = recipe
            .selling_price
            .map(|price| cost::food_cost_pct(breakdown.total_cost, price));
        Ok(CostReport {
            recipe,
            breakdown,
            suggested_price: suggested,
            food_cost_pct: food_pct,
        })
    }

    /// Recompute `recipe_id` and every recipe that can reach it, each
    /// exactly once. Returns the recomputed ids, the changed recipe first.
    fn recompute_cascade(&self, recipe_id: i64) -> Result<Vec<i64>> {
        let mut ids = vec![recipe_id];
        ids.extend(self.ancestors_of(recipe_id)?);
        for id in &ids {
            self.compute_and_store(*id)?;
        }
        Ok(ids)
    }

    /// Breadth-first walk of the reverse composition edges.
    fn ancestors_of(&self, recipe_id: i64) -> Result<Vec<i64>> {
        let mut seen: HashSet<i64> = HashSet::from([recipe_id]);
        let mut queue: VecDeque<i64> = VecDeque::from([recipe_id]);
        let mut ancestors = Vec::new();
        while let Some(id) = queue.pop_front() {
            for parent in self.db.parent_recipe_ids(id)? {
                if seen.insert(parent) {
                    ancestors.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        Ok(ancestors)
    }

    /// One full engine run against live store state; the engine re-resolves
    /// sub-recipes from scratch, so no stale cached total can leak in.
    fn compute_and_store(&self, recipe_id: i64) -> Result<CostBreakdown> {
        let recipe = self.get_recipe(recipe_id)?;
        let engine = CostEngine::new(&self.db, &self.db, &self.db);
        let breakdown = engine.compute_total_cost(&recipe)?;

        let profit_margin = recipe
            .selling_price
            .and_then(|price| cost::profit_margin(breakdown.total_cost, price));
        self.db.save_computed_totals(
            recipe_id,
            &ComputedTotals {
                total_cost: breakdown.total_cost,
                profit_margin,
            },
        )?;
        self.db.save_line_costs(&breakdown.line_costs)?;
        Ok(breakdown)
    }

    // --- Exchange rates ---

    pub fn rates(&self) -> Result<crate::currency::RateTable> {
        self.db.rate_table()
    }

    pub fn base_currency(&self) -> Result<String> {
        self.db.base_currency()
    }

    /// Upsert a rate and refresh every stored total: any recipe may price a
    /// line through this currency.
    pub fn set_exchange_rate(&self, currency: &str, rate: f64) -> Result<()> {
        let code = validate_currency_code(currency)?;
        self.db.set_exchange_rate(&code, rate)?;
        self.recompute_all()
    }

    pub fn remove_exchange_rate(&self, currency: &str) -> Result<bool> {
        let removed = self.db.delete_exchange_rate(currency)?;
        if removed {
            self.recompute_all()?;
        }
        Ok(removed)
    }

    /// Changing the base currency re-denominates the whole table; the
    /// caller must supply rates already expressed against the new base.
    pub fn set_base_currency(&self, currency: &str) -> Result<()> {
        let code = validate_currency_code(currency)?;
        self.db.set_base_currency(&code)?;
        self.recompute_all()
    }

    fn recompute_all(&self) -> Result<()> {
        for id in self.db.list_recipe_ids()? {
            self.compute_and_store(id)?;
        }
        Ok(())
    }

    // --- Prep sheets ---

    pub fn generate_prep_sheet(&self, selections: &[PrepSheetSelection]) -> Result<Aggregation> {
        aggregate(selections, &self.db)
    }

    /// Generate and persist a sheet as an immutable document.
    pub fn save_prep_sheet(
        &self,
        name: &str,
        date: &str,
        notes: Option<&str>,
        selections: &[PrepSheetSelection],
    ) -> Result<PrepSheet> {
        let aggregation = self.generate_prep_sheet(selections)?;
        self.db
            .save_prep_sheet(name, date, notes, &aggregation.recipes, &aggregation.items)
    }

    pub fn list_prep_sheets(&self) -> Result<Vec<PrepSheet>> {
        self.db.list_prep_sheets()
    }

    pub fn get_prep_sheet(&self, id: i64) -> Result<PrepSheet> {
        self.db
            .get_prep_sheet(id)?
            .ok_or_else(|| CostError::Validation(format!("Prep sheet {id} not found")))
    }

    pub fn delete_prep_sheet(&self, id: i64) -> Result<bool> {
        self.db.delete_prep_sheet(id)
    }

    // --- Versions ---

    pub fn snapshot_recipe(&self, recipe_id: i64, reason: Option<&str>) -> Result<RecipeSnapshot> {
        let recipe = self.get_recipe(recipe_id)?;
        self.db.insert_snapshot(&recipe, reason)
    }

    pub fn list_versions(&self, recipe_id: i64) -> Result<Vec<RecipeSnapshot>> {
        self.db.list_snapshots(recipe_id)
    }

    pub fn get_version(&self, recipe_id: i64, version: i64) -> Result<RecipeSnapshot> {
        self.db.get_snapshot(recipe_id, version)?.ok_or_else(|| {
            CostError::Validation(format!(
                "Version {version} not found for recipe {recipe_id}"
            ))
        })
    }

    pub fn diff_versions(&self, recipe_id: i64, from: i64, to: i64) -> Result<SnapshotDiff> {
        let a = self.get_version(recipe_id, from)?;
        let b = self.get_version(recipe_id, to)?;
        Ok(diff_snapshots(&a, &b))
    }

    /// Restore a past version's scalars and lines. The restored composition
    /// passes through the same cycle gate as any other edit, and the
    /// rollback itself is recorded as a new version.
    pub fn rollback_to_version(
        &self,
        recipe_id: i64,
        version: i64,
        reason: Option<&str>,
    ) -> Result<Recipe> {
        let target = self.get_version(recipe_id, version)?;
        let mut recipe = self.get_recipe(recipe_id)?;

        recipe.name = target.name.clone();
        recipe.servings = target.servings;
        recipe.currency = target.currency.clone();
        recipe.selling_price = target.selling_price;
        recipe.target_cost_pct = target.target_cost_pct;
        recipe.waste_buffer_pct = target.waste_buffer_pct;

        let lines: Vec<LineInput> = target
            .lines
            .iter()
            .map(|l| LineInput {
                reference: l.reference,
                quantity: l.quantity,
                unit: l.unit.clone(),
            })
            .collect();

        graph::ensure_acyclic(recipe_id, &recipe.name, &lines, &self.db)?;

        self.db.update_recipe_scalars(&recipe)?;
        self.db.set_recipe_lines(recipe_id, &lines)?;
        self.recompute_cascade(recipe_id)?;

        let restored = self.get_recipe(recipe_id)?;
        let default_reason = format!("Rolled back to version {version}");
        self.db
            .insert_snapshot(&restored, Some(reason.unwrap_or(&default_reason)))?;
        Ok(restored)
    }
}
