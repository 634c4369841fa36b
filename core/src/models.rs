use serde::{Deserialize, Serialize};

use crate::error::CostError;

pub const INGREDIENT_CATEGORIES: &[&str] = &[
    "protein",
    "vegetable",
    "dairy",
    "spice",
    "grain",
    "fruit",
    "condiment",
    "other",
];

pub fn validate_category(category: &str) -> Result<String, CostError> {
    let lower = category.to_lowercase();
    if INGREDIENT_CATEGORIES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(CostError::Validation(format!(
            "Invalid category '{category}'. Must be one of: {}",
            INGREDIENT_CATEGORIES.join(", ")
        )))
    }
}

/// Currency codes are ISO-4217 style: three ASCII letters.
pub fn validate_currency_code(code: &str) -> Result<String, CostError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_uppercase())
    } else {
        Err(CostError::Validation(format!(
            "Invalid currency code '{code}'. Must be a 3-letter code"
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    pub category: String,
    /// Canonical pricing unit: `price_per_unit` is per 1 of this unit.
    pub unit: String,
    pub price_per_unit: f64,
    pub currency: String,
    pub current_stock: f64,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub price_per_unit: f64,
    pub currency: String,
    pub current_stock: f64,
}

pub fn validate_new_ingredient(ing: &NewIngredient) -> Result<(), CostError> {
    if ing.name.trim().is_empty() {
        return Err(CostError::Validation(
            "Ingredient name must not be empty".to_string(),
        ));
    }
    if ing.price_per_unit < 0.0 {
        return Err(CostError::Validation(
            "price_per_unit must not be negative".to_string(),
        ));
    }
    if ing.current_stock < 0.0 {
        return Err(CostError::Validation(
            "current_stock must not be negative".to_string(),
        ));
    }
    validate_category(&ing.category)?;
    validate_currency_code(&ing.currency)?;
    Ok(())
}

/// What a recipe line points at. Exactly one of the two, checked at the type
/// level rather than inferred from nullable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref_id", rename_all = "snake_case")]
pub enum LineRef {
    Ingredient(i64),
    SubRecipe(i64),
}

impl LineRef {
    #[must_use]
    pub fn ingredient_id(self) -> Option<i64> {
        match self {
            LineRef::Ingredient(id) => Some(id),
            LineRef::SubRecipe(_) => None,
        }
    }

    #[must_use]
    pub fn sub_recipe_id(self) -> Option<i64> {
        match self {
            LineRef::SubRecipe(id) => Some(id),
            LineRef::Ingredient(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub recipe_id: i64,
    #[serde(flatten)]
    pub reference: LineRef,
    pub quantity: f64,
    /// Unit the recipe measures this line in; may differ from the referenced
    /// item's pricing unit and is converted at costing time.
    pub unit: String,
    /// Cost snapshot from the last engine run, in the recipe's currency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Joined display name of the referenced ingredient or sub-recipe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Line data as supplied by a caller before ids exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(flatten)]
    pub reference: LineRef,
    pub quantity: f64,
    pub unit: String,
}

pub fn validate_line_input(line: &LineInput) -> Result<(), CostError> {
    if line.quantity <= 0.0 {
        return Err(CostError::Validation(
            "Line quantity must be greater than 0".to_string(),
        ));
    }
    if line.unit.trim().is_empty() {
        return Err(CostError::Validation(
            "Line unit must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    /// Yield basis for scaling; always > 0.
    pub servings: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cost_pct: Option<f64>,
    pub waste_buffer_pct: f64,
    /// Derived by the cost engine; never hand-edited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<f64>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    pub lines: Vec<RecipeLine>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub servings: f64,
    pub currency: String,
    pub selling_price: Option<f64>,
    pub target_cost_pct: Option<f64>,
    pub waste_buffer_pct: f64,
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<(), CostError> {
    if recipe.name.trim().is_empty() {
        return Err(CostError::Validation(
            "Recipe name must not be empty".to_string(),
        ));
    }
    if recipe.servings <= 0.0 {
        return Err(CostError::Validation(
            "Recipe servings must be greater than 0".to_string(),
        ));
    }
    if recipe.waste_buffer_pct < 0.0 {
        return Err(CostError::Validation(
            "Waste buffer percentage must not be negative".to_string(),
        ));
    }
    if recipe.selling_price.is_some_and(|p| p < 0.0) {
        return Err(CostError::Validation(
            "Selling price must not be negative".to_string(),
        ));
    }
    validate_currency_code(&recipe.currency)?;
    Ok(())
}

/// Partial update of a recipe's scalar fields. Outer `None` leaves a field
/// alone; inner `None` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct RecipeUpdate {
    pub name: Option<String>,
    pub servings: Option<f64>,
    pub currency: Option<String>,
    pub selling_price: Option<Option<f64>>,
    pub target_cost_pct: Option<Option<f64>>,
    pub waste_buffer_pct: Option<f64>,
}

/// Pricing facts the cost engine needs about a raw ingredient.
#[derive(Debug, Clone)]
pub struct IngredientPricing {
    pub name: String,
    pub price_per_unit: f64,
    pub unit: String,
    pub currency: String,
}

/// Engine-derived totals persisted back onto the recipe row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComputedTotals {
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<f64>,
}

// --- Prep sheet types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrepSheetSelection {
    pub recipe_id: i64,
    pub requested_servings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepSheetContribution {
    pub recipe_name: String,
    pub quantity: f64,
    /// Tagged with its own unit when it could not be merged into the item's
    /// canonical unit.
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepSheetItem {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    /// Sum of all contributions convertible into `unit`. Incompatible
    /// contributions appear in `breakdown` only.
    pub total_quantity: f64,
    pub unit: String,
    pub breakdown: Vec<PrepSheetContribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepSheetRecipe {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub base_servings: f64,
    pub requested_servings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepSheet {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recipes: Vec<PrepSheetRecipe>,
    pub items: Vec<PrepSheetItem>,
    pub created_at: String,
}

// --- Version snapshot types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    #[serde(flatten)]
    pub reference: LineRef,
    pub quantity: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Frozen copy of a recipe's scalar fields plus its lines at a point in
/// time. The differ consumes these; the db serializes `lines` as one JSON
/// blob per version row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSnapshot {
    pub recipe_id: i64,
    pub version: i64,
    pub name: String,
    pub servings: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cost_pct: Option<f64>,
    pub waste_buffer_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<f64>,
    pub lines: Vec<SnapshotLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_reason: Option<String>,
    pub created_at: String,
    pub is_current: bool,
}

impl Recipe {
    /// Freeze the recipe's current state into a snapshot value.
    #[must_use]
    pub fn to_snapshot(&self, version: i64, change_reason: Option<String>) -> RecipeSnapshot {
        RecipeSnapshot {
            recipe_id: self.id,
            version,
            name: self.name.clone(),
            servings: self.servings,
            currency: self.currency.clone(),
            selling_price: self.selling_price,
            target_cost_pct: self.target_cost_pct,
            waste_buffer_pct: self.waste_buffer_pct,
            total_cost: self.total_cost,
            profit_margin: self.profit_margin,
            lines: self
                .lines
                .iter()
                .map(|l| SnapshotLine {
                    reference: l.reference,
                    quantity: l.quantity,
                    unit: l.unit.clone(),
                    cost: l.cost,
                })
                .collect(),
            change_reason,
            created_at: self.updated_at.clone(),
            is_current: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ingredient() -> NewIngredient {
        NewIngredient {
            name: "Flour".to_string(),
            category: "grain".to_string(),
            unit: "kg".to_string(),
            price_per_unit: 2.0,
            currency: "USD".to_string(),
            current_stock: 10.0,
        }
    }

    #[test]
    fn test_validate_category() {
        assert_eq!(validate_category("grain").unwrap(), "grain");
        assert_eq!(validate_category("Protein").unwrap(), "protein");
        assert!(validate_category("plastic").is_err());
        assert!(validate_category("").is_err());
    }

    #[test]
    fn test_validate_currency_code() {
        assert_eq!(validate_currency_code("usd").unwrap(), "USD");
        assert_eq!(validate_currency_code("EUR").unwrap(), "EUR");
        assert!(validate_currency_code("US").is_err());
        assert!(validate_currency_code("DOLLARS").is_err());
        assert!(validate_currency_code("U$D").is_err());
    }

    #[test]
    fn test_validate_new_ingredient() {
        assert!(validate_new_ingredient(&sample_ingredient()).is_ok());

        let mut bad = sample_ingredient();
        bad.name = "  ".to_string();
        assert!(validate_new_ingredient(&bad).is_err());

        let mut bad = sample_ingredient();
        bad.price_per_unit = -1.0;
        assert!(validate_new_ingredient(&bad).is_err());
    }

    #[test]
    fn test_validate_new_recipe() {
        let recipe = NewRecipe {
            name: "Pancakes".to_string(),
            servings: 10.0,
            currency: "USD".to_string(),
            selling_price: None,
            target_cost_pct: Some(25.0),
            waste_buffer_pct: 5.0,
        };
        assert!(validate_new_recipe(&recipe).is_ok());

        let mut bad = recipe.clone();
        bad.servings = 0.0;
        assert!(validate_new_recipe(&bad).is_err());

        let mut bad = recipe.clone();
        bad.waste_buffer_pct = -5.0;
        assert!(validate_new_recipe(&bad).is_err());

        let mut bad = recipe;
        bad.currency = "DOLLAR".to_string();
        assert!(validate_new_recipe(&bad).is_err());
    }

    #[test]
    fn test_validate_line_input() {
        let line = LineInput {
            reference: LineRef::Ingredient(1),
            quantity: 500.0,
            unit: "g".to_string(),
        };
        assert!(validate_line_input(&line).is_ok());

        let mut bad = line.clone();
        bad.quantity = 0.0;
        assert!(validate_line_input(&bad).is_err());

        let mut bad = line;
        bad.unit = String::new();
        assert!(validate_line_input(&bad).is_err());
    }

    #[test]
    fn test_line_ref_accessors() {
        assert_eq!(LineRef::Ingredient(3).ingredient_id(), Some(3));
        assert_eq!(LineRef::Ingredient(3).sub_recipe_id(), None);
        assert_eq!(LineRef::SubRecipe(7).sub_recipe_id(), Some(7));
        assert_eq!(LineRef::SubRecipe(7).ingredient_id(), None);
    }

    #[test]
    fn test_line_ref_serde_tagging() {
        let json = serde_json::to_string(&LineRef::SubRecipe(4)).unwrap();
        assert!(json.contains("sub_recipe"));
        let back: LineRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LineRef::SubRecipe(4));
    }

    #[test]
    fn test_snapshot_line_round_trip() {
        let line = SnapshotLine {
            reference: LineRef::Ingredient(2),
            quantity: 1.5,
            unit: "kg".to_string(),
            cost: Some(3.0),
        };
        let json = serde_json::to_string(&vec![line.clone()]).unwrap();
        let back: Vec<SnapshotLine> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], line);
    }
}
