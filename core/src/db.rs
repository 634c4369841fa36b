use std::path::Path;

use chrono::Local;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use crate::cost::{ExchangeRateReader, IngredientReader, LineCost, RecipeReader, RecipeWriter};
use crate::currency::{DEFAULT_BASE_CURRENCY, RateTable};
use crate::error::CostError;
use crate::graph::RecipeGraphReader;
use crate::models::{
    ComputedTotals, Ingredient, IngredientPricing, LineInput, LineRef, NewIngredient, NewRecipe,
    PrepSheet, PrepSheetItem, PrepSheetRecipe, Recipe, RecipeLine, RecipeSnapshot, SnapshotLine,
    validate_new_ingredient, validate_new_recipe,
};

pub struct Database {
    conn: Connection,
}

type Result<T, E = CostError> = std::result::Result<T, E>;

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            CostError::Store(format!("Failed to open database {}: {e}", path.display()))
        })?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    price_per_unit REAL NOT NULL,
                    currency TEXT NOT NULL,
                    current_stock REAL NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    servings REAL NOT NULL CHECK (servings > 0),
                    currency TEXT NOT NULL,
                    selling_price REAL,
                    target_cost_pct REAL,
                    waste_buffer_pct REAL NOT NULL DEFAULT 0,
                    total_cost REAL,
                    profit_margin REAL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_lines (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER REFERENCES ingredients(id),
                    sub_recipe_id INTEGER REFERENCES recipes(id),
                    quantity REAL NOT NULL CHECK (quantity > 0),
                    unit TEXT NOT NULL,
                    cost REAL,
                    position INTEGER NOT NULL,
                    CHECK ((ingredient_id IS NULL) != (sub_recipe_id IS NULL))
                );

                CREATE TABLE IF NOT EXISTS exchange_rates (
                    currency TEXT PRIMARY KEY,
                    rate REAL NOT NULL CHECK (rate > 0),
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_versions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    version_number INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    servings REAL NOT NULL,
                    currency TEXT NOT NULL,
                    selling_price REAL,
                    target_cost_pct REAL,
                    waste_buffer_pct REAL NOT NULL,
                    total_cost REAL,
                    profit_margin REAL,
                    lines_json TEXT NOT NULL,
                    change_reason TEXT,
                    created_at TEXT NOT NULL,
                    is_current INTEGER NOT NULL DEFAULT 0,
                    UNIQUE (recipe_id, version_number)
                );

                CREATE TABLE IF NOT EXISTS prep_sheets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    date TEXT NOT NULL,
                    notes TEXT,
                    recipes_json TEXT NOT NULL,
                    items_json TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);
                CREATE INDEX IF NOT EXISTS idx_lines_recipe ON recipe_lines(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_lines_sub_recipe ON recipe_lines(sub_recipe_id);
                CREATE INDEX IF NOT EXISTS idx_lines_ingredient ON recipe_lines(ingredient_id);
                CREATE INDEX IF NOT EXISTS idx_versions_recipe ON recipe_versions(recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn ingredient_from_row(row: &Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            category: row.get(3)?,
            unit: row.get(4)?,
            price_per_unit: row.get(5)?,
            currency: row.get(6)?,
            current_stock: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn recipe_from_row(row: &Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            uuid: row.get(1)?,
            name: row.get(2)?,
            servings: row.get(3)?,
            currency: row.get(4)?,
            selling_price: row.get(5)?,
            target_cost_pct: row.get(6)?,
            waste_buffer_pct: row.get(7)?,
            total_cost: row.get(8)?,
            profit_margin: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            lines: Vec::new(),
        })
    }

    const RECIPE_COLS: &str = "id, uuid, name, servings, currency, selling_price, \
         target_cost_pct, waste_buffer_pct, total_cost, profit_margin, created_at, updated_at";

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ing: &NewIngredient) -> Result<Ingredient> {
        validate_new_ingredient(ing)?;
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO ingredients (uuid, name, category, unit, price_per_unit, currency, current_stock, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid,
                ing.name,
                ing.category.to_lowercase(),
                ing.unit,
                ing.price_per_unit,
                ing.currency.to_uppercase(),
                ing.current_stock,
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient(id)?
            .ok_or_else(|| CostError::Store("Ingredient vanished after insert".to_string()))
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, category, unit, price_per_unit, currency, current_stock, created_at, updated_at
             FROM ingredients WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::ingredient_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, category, unit, price_per_unit, currency, current_stock, created_at, updated_at
             FROM ingredients WHERE LOWER(name) = LOWER(?1)",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::ingredient_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_ingredients(&self, search: Option<&str>) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, category, unit, price_per_unit, currency, current_stock, created_at, updated_at
             FROM ingredients
             WHERE ?1 IS NULL OR name LIKE '%' || ?1 || '%'
             ORDER BY name COLLATE NOCASE",
        )?;
        let ingredients = stmt
            .query_map(params![search], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Update an ingredient's unit price. The caller is responsible for
    /// recomputing every recipe that uses it (see
    /// [`recipes_using_ingredient`](Self::recipes_using_ingredient)).
    pub fn set_ingredient_price(&self, id: i64, price_per_unit: f64) -> Result<()> {
        if price_per_unit < 0.0 {
            return Err(CostError::Validation(
                "price_per_unit must not be negative".to_string(),
            ));
        }
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE ingredients SET price_per_unit = ?1, updated_at = ?2 WHERE id = ?3",
            params![price_per_unit, now, id],
        )?;
        if rows == 0 {
            return Err(CostError::Validation(format!("Ingredient {id} not found")));
        }
        Ok(())
    }

    pub fn set_ingredient_stock(&self, id: i64, current_stock: f64) -> Result<()> {
        if current_stock < 0.0 {
            return Err(CostError::Validation(
                "current_stock must not be negative".to_string(),
            ));
        }
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE ingredients SET current_stock = ?1, updated_at = ?2 WHERE id = ?3",
            params![current_stock, now, id],
        )?;
        if rows == 0 {
            return Err(CostError::Validation(format!("Ingredient {id} not found")));
        }
        Ok(())
    }

    /// Recipes whose lines reference the ingredient directly.
    pub fn recipes_using_ingredient(&self, ingredient_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT recipe_id FROM recipe_lines WHERE ingredient_id = ?1")?;
        let ids = stmt
            .query_map(params![ingredient_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        validate_new_recipe(recipe)?;
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO recipes (uuid, name, servings, currency, selling_price, target_cost_pct, waste_buffer_pct, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid,
                recipe.name,
                recipe.servings,
                recipe.currency.to_uppercase(),
                recipe.selling_price,
                recipe.target_cost_pct,
                recipe.waste_buffer_pct,
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?
            .ok_or_else(|| CostError::Store("Recipe vanished after insert".to_string()))
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipes WHERE id = ?1",
            Self::RECIPE_COLS
        ))?;
        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut recipe = Self::recipe_from_row(row)?;
        recipe.lines = self.get_recipe_lines(id)?;
        Ok(Some(recipe))
    }

    pub fn get_recipe_by_name(&self, name: &str) -> Result<Option<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipes WHERE LOWER(name) = LOWER(?1)",
            Self::RECIPE_COLS
        ))?;
        let mut rows = stmt.query(params![name])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut recipe = Self::recipe_from_row(row)?;
        recipe.lines = self.get_recipe_lines(recipe.id)?;
        Ok(Some(recipe))
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipes ORDER BY name COLLATE NOCASE",
            Self::RECIPE_COLS
        ))?;
        let mut recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for recipe in &mut recipes {
            recipe.lines = self.get_recipe_lines(recipe.id)?;
        }
        Ok(recipes)
    }

    pub fn list_recipe_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM recipes ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn get_recipe_lines(&self, recipe_id: i64) -> Result<Vec<RecipeLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT rl.id, rl.uuid, rl.recipe_id, rl.ingredient_id, rl.sub_recipe_id,
                    rl.quantity, rl.unit, rl.cost,
                    COALESCE(i.name, r.name)
             FROM recipe_lines rl
             LEFT JOIN ingredients i ON rl.ingredient_id = i.id
             LEFT JOIN recipes r ON rl.sub_recipe_id = r.id
             WHERE rl.recipe_id = ?1
             ORDER BY rl.position",
        )?;
        let lines = stmt
            .query_map(params![recipe_id], |row| {
                let ingredient_id: Option<i64> = row.get(3)?;
                let sub_recipe_id: Option<i64> = row.get(4)?;
                let reference = match (ingredient_id, sub_recipe_id) {
                    (Some(id), None) => LineRef::Ingredient(id),
                    (None, Some(id)) => LineRef::SubRecipe(id),
                    // The CHECK constraint makes this unreachable
                    _ => return Err(rusqlite::Error::IntegralValueOutOfRange(3, 0)),
                };
                Ok(RecipeLine {
                    id: row.get(0)?,
                    uuid: row.get(1)?,
                    recipe_id: row.get(2)?,
                    reference,
                    quantity: row.get(5)?,
                    unit: row.get(6)?,
                    cost: row.get(7)?,
                    name: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    /// Replace a recipe's whole line set in one shot. The cycle validator
    /// must have accepted `lines` before this is called; the delete/insert
    /// pair runs inside one transaction so readers never observe a partial
    /// line set.
    pub fn set_recipe_lines(&self, recipe_id: i64, lines: &[LineInput]) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let applied = (|| -> Result<()> {
            self.conn.execute(
                "DELETE FROM recipe_lines WHERE recipe_id = ?1",
                params![recipe_id],
            )?;
            let mut position = 0_i64;
            for line in lines {
                let uuid = Uuid::new_v4().to_string();
                self.conn.execute(
                    "INSERT INTO recipe_lines (uuid, recipe_id, ingredient_id, sub_recipe_id, quantity, unit, position)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        uuid,
                        recipe_id,
                        line.reference.ingredient_id(),
                        line.reference.sub_recipe_id(),
                        line.quantity,
                        line.unit,
                        position
                    ],
                )?;
                position += 1;
            }
            self.conn.execute(
                "UPDATE recipes SET updated_at = ?1 WHERE id = ?2",
                params![now, recipe_id],
            )?;
            Ok(())
        })();
        match applied {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    pub fn update_recipe_scalars(&self, recipe: &Recipe) -> Result<()> {
        validate_new_recipe(&NewRecipe {
            name: recipe.name.clone(),
            servings: recipe.servings,
            currency: recipe.currency.clone(),
            selling_price: recipe.selling_price,
            target_cost_pct: recipe.target_cost_pct,
            waste_buffer_pct: recipe.waste_buffer_pct,
        })?;
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE recipes SET name = ?1, servings = ?2, currency = ?3, selling_price = ?4,
                    target_cost_pct = ?5, waste_buffer_pct = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                recipe.name,
                recipe.servings,
                recipe.currency.to_uppercase(),
                recipe.selling_price,
                recipe.target_cost_pct,
                recipe.waste_buffer_pct,
                now,
                recipe.id
            ],
        )?;
        if rows == 0 {
            return Err(CostError::Validation(format!(
                "Recipe {} not found",
                recipe.id
            )));
        }
        Ok(())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let used_by = self.parent_recipe_ids(recipe_id)?;
        if !used_by.is_empty() {
            return Err(CostError::Validation(format!(
                "Recipe {recipe_id} is used as a sub-recipe by {} other recipe(s)",
                used_by.len()
            )));
        }
        self.conn.execute(
            "DELETE FROM recipe_lines WHERE recipe_id = ?1",
            params![recipe_id],
        )?;
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![recipe_id])?;
        Ok(rows > 0)
    }

    /// Persist the engine's per-line cost snapshots.
    pub fn save_line_costs(&self, line_costs: &[LineCost]) -> Result<()> {
        for lc in line_costs {
            self.conn.execute(
                "UPDATE recipe_lines SET cost = ?1 WHERE id = ?2",
                params![lc.cost, lc.line_id],
            )?;
        }
        Ok(())
    }

    /// Recipes that reference `recipe_id` as a sub-recipe (reverse edges of
    /// the composition graph, used for cascading recomputation).
    pub fn parent_recipe_ids(&self, recipe_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT recipe_id FROM recipe_lines WHERE sub_recipe_id = ?1")?;
        let ids = stmt
            .query_map(params![recipe_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // --- Exchange rates & settings ---

    pub fn base_currency(&self) -> Result<String> {
        Ok(self
            .get_setting("base_currency")?
            .unwrap_or_else(|| DEFAULT_BASE_CURRENCY.to_string()))
    }

    pub fn set_base_currency(&self, code: &str) -> Result<()> {
        self.set_setting("base_currency", &code.to_uppercase())
    }

    pub fn set_exchange_rate(&self, currency: &str, rate: f64) -> Result<()> {
        if rate <= 0.0 {
            return Err(CostError::Validation(
                "Exchange rate must be greater than 0".to_string(),
            ));
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO exchange_rates (currency, rate, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(currency) DO UPDATE SET rate = excluded.rate, updated_at = excluded.updated_at",
            params![currency.to_uppercase(), rate, now],
        )?;
        Ok(())
    }

    pub fn delete_exchange_rate(&self, currency: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM exchange_rates WHERE currency = ?1",
            params![currency.to_uppercase()],
        )?;
        Ok(rows > 0)
    }

    pub fn rate_table(&self) -> Result<RateTable> {
        let base = self.base_currency()?;
        let mut table = RateTable::new(base);
        let mut stmt = self
            .conn
            .prepare("SELECT currency, rate FROM exchange_rates")?;
        let entries = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (currency, rate) in entries {
            table.rates.insert(currency, rate);
        }
        Ok(table)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    // --- Recipe versions ---

    /// Freeze the recipe's current state as its next version and mark it
    /// current.
    pub fn insert_snapshot(
        &self,
        recipe: &Recipe,
        change_reason: Option<&str>,
    ) -> Result<RecipeSnapshot> {
        let next_version: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(version_number), 0) + 1 FROM recipe_versions WHERE recipe_id = ?1",
            params![recipe.id],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "UPDATE recipe_versions SET is_current = 0 WHERE recipe_id = ?1",
            params![recipe.id],
        )?;

        let snapshot = recipe.to_snapshot(next_version, change_reason.map(String::from));
        let lines_json = serde_json::to_string(&snapshot.lines)
            .map_err(|e| CostError::Store(format!("Failed to serialize snapshot lines: {e}")))?;
        let now = Local::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO recipe_versions (recipe_id, version_number, name, servings, currency,
                    selling_price, target_cost_pct, waste_buffer_pct, total_cost, profit_margin,
                    lines_json, change_reason, created_at, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
            params![
                snapshot.recipe_id,
                snapshot.version,
                snapshot.name,
                snapshot.servings,
                snapshot.currency,
                snapshot.selling_price,
                snapshot.target_cost_pct,
                snapshot.waste_buffer_pct,
                snapshot.total_cost,
                snapshot.profit_margin,
                lines_json,
                snapshot.change_reason,
                now,
            ],
        )?;

        Ok(RecipeSnapshot {
            created_at: now,
            ..snapshot
        })
    }

    fn snapshot_from_row(row: &Row) -> rusqlite::Result<(RecipeSnapshot, String)> {
        let lines_json: String = row.get(10)?;
        Ok((
            RecipeSnapshot {
                recipe_id: row.get(0)?,
                version: row.get(1)?,
                name: row.get(2)?,
                servings: row.get(3)?,
                currency: row.get(4)?,
                selling_price: row.get(5)?,
                target_cost_pct: row.get(6)?,
                waste_buffer_pct: row.get(7)?,
                total_cost: row.get(8)?,
                profit_margin: row.get(9)?,
                lines: Vec::new(),
                change_reason: row.get(11)?,
                created_at: row.get(12)?,
                is_current: row.get::<_, i64>(13)? == 1,
            },
            lines_json,
        ))
    }

    fn hydrate_snapshot(raw: (RecipeSnapshot, String)) -> Result<RecipeSnapshot> {
        let (mut snapshot, lines_json) = raw;
        snapshot.lines = serde_json::from_str::<Vec<SnapshotLine>>(&lines_json)
            .map_err(|e| CostError::Store(format!("Corrupt snapshot lines: {e}")))?;
        Ok(snapshot)
    }

    const VERSION_COLS: &str = "recipe_id, version_number, name, servings, currency, \
         selling_price, target_cost_pct, waste_buffer_pct, total_cost, profit_margin, \
         lines_json, change_reason, created_at, is_current";

    pub fn list_snapshots(&self, recipe_id: i64) -> Result<Vec<RecipeSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipe_versions WHERE recipe_id = ?1 ORDER BY version_number DESC",
            Self::VERSION_COLS
        ))?;
        let raw = stmt
            .query_map(params![recipe_id], Self::snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(Self::hydrate_snapshot).collect()
    }

    pub fn get_snapshot(&self, recipe_id: i64, version: i64) -> Result<Option<RecipeSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipe_versions WHERE recipe_id = ?1 AND version_number = ?2",
            Self::VERSION_COLS
        ))?;
        let mut rows = stmt.query(params![recipe_id, version])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::hydrate_snapshot(Self::snapshot_from_row(row)?)?))
        } else {
            Ok(None)
        }
    }

    pub fn current_snapshot(&self, recipe_id: i64) -> Result<Option<RecipeSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM recipe_versions WHERE recipe_id = ?1 AND is_current = 1",
            Self::VERSION_COLS
        ))?;
        let mut rows = stmt.query(params![recipe_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::hydrate_snapshot(Self::snapshot_from_row(row)?)?))
        } else {
            Ok(None)
        }
    }

    // --- Prep sheets ---

    pub fn save_prep_sheet(
        &self,
        name: &str,
        date: &str,
        notes: Option<&str>,
        recipes: &[PrepSheetRecipe],
        items: &[PrepSheetItem],
    ) -> Result<PrepSheet> {
        if name.trim().is_empty() {
            return Err(CostError::Validation(
                "Prep sheet name must not be empty".to_string(),
            ));
        }
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let recipes_json = serde_json::to_string(recipes)
            .map_err(|e| CostError::Store(format!("Failed to serialize selections: {e}")))?;
        let items_json = serde_json::to_string(items)
            .map_err(|e| CostError::Store(format!("Failed to serialize items: {e}")))?;
        self.conn.execute(
            "INSERT INTO prep_sheets (uuid, name, date, notes, recipes_json, items_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![uuid, name, date, notes, recipes_json, items_json, now],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(PrepSheet {
            id,
            uuid,
            name: name.to_string(),
            date: date.to_string(),
            notes: notes.map(String::from),
            recipes: recipes.to_vec(),
            items: items.to_vec(),
            created_at: now,
        })
    }

    fn prep_sheet_from_row(row: &Row) -> rusqlite::Result<(PrepSheet, String, String)> {
        let recipes_json: String = row.get(5)?;
        let items_json: String = row.get(6)?;
        Ok((
            PrepSheet {
                id: row.get(0)?,
                uuid: row.get(1)?,
                name: row.get(2)?,
                date: row.get(3)?,
                notes: row.get(4)?,
                recipes: Vec::new(),
                items: Vec::new(),
                created_at: row.get(7)?,
            },
            recipes_json,
            items_json,
        ))
    }

    fn hydrate_prep_sheet(raw: (PrepSheet, String, String)) -> Result<PrepSheet> {
        let (mut sheet, recipes_json, items_json) = raw;
        sheet.recipes = serde_json::from_str(&recipes_json)
            .map_err(|e| CostError::Store(format!("Corrupt prep sheet selections: {e}")))?;
        sheet.items = serde_json::from_str(&items_json)
            .map_err(|e| CostError::Store(format!("Corrupt prep sheet items: {e}")))?;
        Ok(sheet)
    }

    pub fn list_prep_sheets(&self) -> Result<Vec<PrepSheet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, date, notes, recipes_json, items_json, created_at
             FROM prep_sheets ORDER BY date DESC, created_at DESC",
        )?;
        let raw = stmt
            .query_map([], Self::prep_sheet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(Self::hydrate_prep_sheet).collect()
    }

    pub fn get_prep_sheet(&self, id: i64) -> Result<Option<PrepSheet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, date, notes, recipes_json, items_json, created_at
             FROM prep_sheets WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::hydrate_prep_sheet(Self::prep_sheet_from_row(
                row,
            )?)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_prep_sheet(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM prep_sheets WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

// --- Collaborator trait implementations ---

impl IngredientReader for Database {
    fn ingredient_pricing(&self, id: i64) -> Result<Option<IngredientPricing>> {
        Ok(self.get_ingredient(id)?.map(|ing| IngredientPricing {
            name: ing.name,
            price_per_unit: ing.price_per_unit,
            unit: ing.unit,
            currency: ing.currency,
        }))
    }
}

impl RecipeReader for Database {
    fn recipe(&self, id: i64) -> Result<Option<Recipe>> {
        self.get_recipe(id)
    }
}

impl ExchangeRateReader for Database {
    fn rates(&self) -> Result<RateTable> {
        self.rate_table()
    }
}

impl RecipeWriter for Database {
    fn save_computed_totals(&self, recipe_id: i64, totals: &ComputedTotals) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE recipes SET total_cost = ?1, profit_margin = ?2, updated_at = ?3 WHERE id = ?4",
            params![totals.total_cost, totals.profit_margin, now, recipe_id],
        )?;
        if rows == 0 {
            return Err(CostError::Validation(format!(
                "Recipe {recipe_id} not found"
            )));
        }
        Ok(())
    }
}

impl RecipeGraphReader for Database {
    fn sub_recipe_ids(&self, recipe_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT sub_recipe_id FROM recipe_lines WHERE recipe_id = ?1 AND sub_recipe_id IS NOT NULL",
        )?;
        let ids = stmt
            .query_map(params![recipe_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ingredient(name: &str) -> NewIngredient {
        NewIngredient {
            name: name.to_string(),
            category: "grain".to_string(),
            unit: "kg".to_string(),
            price_per_unit: 2.0,
            currency: "USD".to_string(),
            current_stock: 10.0,
        }
    }

    fn sample_recipe(name: &str) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
            servings: 4.0,
            currency: "USD".to_string(),
            selling_price: None,
            target_cost_pct: Some(25.0),
            waste_buffer_pct: 0.0,
        }
    }

    #[test]
    fn test_insert_and_get_ingredient() {
        let db = Database::open_in_memory().unwrap();
        let ing = db.insert_ingredient(&sample_ingredient("Flour")).unwrap();
        assert!(ing.id > 0);
        assert!(!ing.uuid.is_empty());

        let fetched = db.get_ingredient(ing.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Flour");
        assert_eq!(fetched.currency, "USD");

        assert!(db.get_ingredient(999).unwrap().is_none());
    }

    #[test]
    fn test_insert_ingredient_validates() {
        let db = Database::open_in_memory().unwrap();
        let mut bad = sample_ingredient("Flour");
        bad.category = "plastic".to_string();
        assert!(matches!(
            db.insert_ingredient(&bad),
            Err(CostError::Validation(_))
        ));
    }

    #[test]
    fn test_list_ingredients_sorted_and_searchable() {
        let db = Database::open_in_memory().unwrap();
        db.insert_ingredient(&sample_ingredient("tomatoes"))
            .unwrap();
        db.insert_ingredient(&sample_ingredient("Flour")).unwrap();
        db.insert_ingredient(&sample_ingredient("SUGAR")).unwrap();

        let all = db.list_ingredients(None).unwrap();
        let names: Vec<&str> = all.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Flour", "SUGAR", "tomatoes"]);

        let found = db.list_ingredients(Some("lou")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Flour");
    }

    #[test]
    fn test_recipe_lines_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&sample_ingredient("Flour")).unwrap();
        let base = db.create_recipe(&sample_recipe("Dough")).unwrap();
        let pizza = db.create_recipe(&sample_recipe("Pizza")).unwrap();

        db.set_recipe_lines(
            pizza.id,
            &[
                LineInput {
                    reference: LineRef::Ingredient(flour.id),
                    quantity: 500.0,
                    unit: "g".to_string(),
                },
                LineInput {
                    reference: LineRef::SubRecipe(base.id),
                    quantity: 1.0,
                    unit: "serving".to_string(),
                },
            ],
        )
        .unwrap();

        let fetched = db.get_recipe(pizza.id).unwrap().unwrap();
        assert_eq!(fetched.lines.len(), 2);
        assert_eq!(fetched.lines[0].reference, LineRef::Ingredient(flour.id));
        assert_eq!(fetched.lines[0].name.as_deref(), Some("Flour"));
        assert_eq!(fetched.lines[1].reference, LineRef::SubRecipe(base.id));
        assert_eq!(fetched.lines[1].name.as_deref(), Some("Dough"));
    }

    #[test]
    fn test_set_recipe_lines_replaces() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&sample_ingredient("Flour")).unwrap();
        let sugar = db.insert_ingredient(&sample_ingredient("Sugar")).unwrap();
        let cake = db.create_recipe(&sample_recipe("Cake")).unwrap();

        db.set_recipe_lines(
            cake.id,
            &[LineInput {
                reference: LineRef::Ingredient(flour.id),
                quantity: 1.0,
                unit: "kg".to_string(),
            }],
        )
        .unwrap();
        db.set_recipe_lines(
            cake.id,
            &[LineInput {
                reference: LineRef::Ingredient(sugar.id),
                quantity: 200.0,
                unit: "g".to_string(),
            }],
        )
        .unwrap();

        let fetched = db.get_recipe(cake.id).unwrap().unwrap();
        assert_eq!(fetched.lines.len(), 1);
        assert_eq!(fetched.lines[0].reference, LineRef::Ingredient(sugar.id));
    }

    #[test]
    fn test_graph_edges() {
        let db = Database::open_in_memory().unwrap();
        let stock = db.create_recipe(&sample_recipe("Stock")).unwrap();
        let soup = db.create_recipe(&sample_recipe("Soup")).unwrap();
        db.set_recipe_lines(
            soup.id,
            &[LineInput {
                reference: LineRef::SubRecipe(stock.id),
                quantity: 2.0,
                unit: "serving".to_string(),
            }],
        )
        .unwrap();

        assert_eq!(db.sub_recipe_ids(soup.id).unwrap(), vec![stock.id]);
        assert_eq!(db.parent_recipe_ids(stock.id).unwrap(), vec![soup.id]);
        assert!(db.sub_recipe_ids(stock.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_recipe_refuses_while_referenced() {
        let db = Database::open_in_memory().unwrap();
        let stock = db.create_recipe(&sample_recipe("Stock")).unwrap();
        let soup = db.create_recipe(&sample_recipe("Soup")).unwrap();
        db.set_recipe_lines(
            soup.id,
            &[LineInput {
                reference: LineRef::SubRecipe(stock.id),
                quantity: 1.0,
                unit: "serving".to_string(),
            }],
        )
        .unwrap();

        assert!(db.delete_recipe(stock.id).is_err());
        assert!(db.delete_recipe(soup.id).unwrap());
        assert!(db.delete_recipe(stock.id).unwrap());
    }

    #[test]
    fn test_rate_table_and_base_currency() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.base_currency().unwrap(), "USD");

        db.set_exchange_rate("eur", 0.92).unwrap();
        db.set_exchange_rate("EUR", 0.95).unwrap(); // upsert wins
        db.set_exchange_rate("CUP", 24.0).unwrap();

        let table = db.rate_table().unwrap();
        assert_eq!(table.base, "USD");
        assert!((table.rates["EUR"] - 0.95).abs() < f64::EPSILON);
        assert!((table.rates["CUP"] - 24.0).abs() < f64::EPSILON);

        db.set_base_currency("EUR").unwrap();
        assert_eq!(db.base_currency().unwrap(), "EUR");

        assert!(db.delete_exchange_rate("CUP").unwrap());
        assert!(!db.delete_exchange_rate("CUP").unwrap());
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.set_exchange_rate("EUR", 0.0).is_err());
        assert!(db.set_exchange_rate("EUR", -1.0).is_err());
    }

    #[test]
    fn test_snapshot_versioning() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&sample_ingredient("Flour")).unwrap();
        let bread = db.create_recipe(&sample_recipe("Bread")).unwrap();
        db.set_recipe_lines(
            bread.id,
            &[LineInput {
                reference: LineRef::Ingredient(flour.id),
                quantity: 1.0,
                unit: "kg".to_string(),
            }],
        )
        .unwrap();

        let recipe = db.get_recipe(bread.id).unwrap().unwrap();
        let v1 = db.insert_snapshot(&recipe, Some("initial")).unwrap();
        assert_eq!(v1.version, 1);
        assert!(v1.is_current);

        let v2 = db.insert_snapshot(&recipe, None).unwrap();
        assert_eq!(v2.version, 2);

        let all = db.list_snapshots(bread.id).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first; only it is current
        assert_eq!(all[0].version, 2);
        assert!(all[0].is_current);
        assert!(!all[1].is_current);
        assert_eq!(all[1].lines.len(), 1);

        let current = db.current_snapshot(bread.id).unwrap().unwrap();
        assert_eq!(current.version, 2);

        assert!(db.get_snapshot(bread.id, 99).unwrap().is_none());
    }

    #[test]
    fn test_prep_sheet_persistence_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let items = vec![PrepSheetItem {
            ingredient_id: 1,
            ingredient_name: "Flour".to_string(),
            total_quantity: 2300.0,
            unit: "g".to_string(),
            breakdown: vec![crate::models::PrepSheetContribution {
                recipe_name: "Pancakes".to_string(),
                quantity: 1500.0,
                unit: "g".to_string(),
            }],
        }];
        let recipes = vec![PrepSheetRecipe {
            recipe_id: 1,
            recipe_name: "Pancakes".to_string(),
            base_servings: 10.0,
            requested_servings: 30.0,
        }];

        let sheet = db
            .save_prep_sheet(
                "Morning Prep",
                "2026-02-05",
                Some("walk-in"),
                &recipes,
                &items,
            )
            .unwrap();
        assert!(sheet.id > 0);

        let fetched = db.get_prep_sheet(sheet.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Morning Prep");
        assert_eq!(fetched.items.len(), 1);
        assert!((fetched.items[0].total_quantity - 2300.0).abs() < f64::EPSILON);
        assert_eq!(fetched.recipes[0].recipe_name, "Pancakes");

        let all = db.list_prep_sheets().unwrap();
        assert_eq!(all.len(), 1);

        assert!(db.delete_prep_sheet(sheet.id).unwrap());
        assert!(db.get_prep_sheet(sheet.id).unwrap().is_none());
    }

    #[test]
    fn test_save_computed_totals() {
        let db = Database::open_in_memory().unwrap();
        let bread = db.create_recipe(&sample_recipe("Bread")).unwrap();
        db.save_computed_totals(
            bread.id,
            &ComputedTotals {
                total_cost: 4.2,
                profit_margin: Some(65.0),
            },
        )
        .unwrap();

        let fetched = db.get_recipe(bread.id).unwrap().unwrap();
        assert!((fetched.total_cost.unwrap() - 4.2).abs() < f64::EPSILON);
        assert!((fetched.profit_margin.unwrap() - 65.0).abs() < f64::EPSILON);
    }
}
