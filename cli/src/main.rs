mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_cost, cmd_ingredient_add, cmd_ingredient_list, cmd_ingredient_receive,
    cmd_ingredient_set_price, cmd_prep_delete, cmd_prep_generate, cmd_prep_list, cmd_prep_save,
    cmd_prep_show, cmd_rate_list, cmd_rate_remove, cmd_rate_set, cmd_rate_set_base,
    cmd_recipe_add_line, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list,
    cmd_recipe_remove_line, cmd_recipe_show, cmd_recipe_update, cmd_version_diff,
    cmd_version_list, cmd_version_rollback, cmd_version_snapshot,
};
use crate::config::Config;
use ladle_core::service::LadleService;

#[derive(Parser)]
#[command(
    name = "ladle",
    version,
    about = "A recipe costing CLI for kitchens",
    long_about = "\n\n  ██╗      █████╗ ██████╗ ██╗     ███████╗
  ██║     ██╔══██╗██╔══██╗██║     ██╔════╝
  ██║     ███████║██║  ██║██║     █████╗
  ██║     ██╔══██║██║  ██║██║     ██╔══╝
  ███████╗██║  ██║██████╔╝███████╗███████╗
  ╚══════╝╚═╝  ╚═╝╚═════╝ ╚══════╝╚══════╝
        know what your food costs.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage raw ingredients and their prices
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage recipes and their composition
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Resolve a recipe's full cost and pricing numbers
    Cost {
        /// Recipe name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage exchange rates and the base currency
    Rate {
        #[command(subcommand)]
        command: RateCommands,
    },
    /// Build shopping/prep lists from scaled recipe selections
    Prep {
        #[command(subcommand)]
        command: PrepCommands,
    },
    /// Inspect, diff, and roll back recipe versions
    Version {
        #[command(subcommand)]
        command: VersionCommands,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient
    Add {
        /// Ingredient name
        name: String,
        /// Category: protein, vegetable, dairy, spice, grain, fruit, condiment, other
        #[arg(short, long, default_value = "other")]
        category: String,
        /// Pricing unit (e.g. kg, l, piece)
        #[arg(short, long)]
        unit: String,
        /// Price per unit
        #[arg(short, long)]
        price: f64,
        /// Currency code (e.g. USD)
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Current stock in pricing units
        #[arg(long, default_value = "0")]
        stock: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List/search ingredients
    List {
        /// Search query to filter ingredients
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an ingredient's price (recosts affected recipes)
    SetPrice {
        /// Ingredient name
        name: String,
        /// New price per unit
        price: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Book a delivery: add stock at a purchase price (weighted-average repricing)
    Receive {
        /// Ingredient name
        name: String,
        /// Delivered quantity in pricing units
        quantity: f64,
        /// Purchase price per unit
        price: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe name
        name: String,
        /// Servings this recipe yields
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Currency the recipe is costed in
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Menu selling price
        #[arg(long)]
        price: Option<f64>,
        /// Target food cost percentage (for suggested pricing)
        #[arg(long)]
        target: Option<f64>,
        /// Waste buffer percentage
        #[arg(long, default_value = "0")]
        waste: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a line (ingredient or sub-recipe) to a recipe
    AddLine {
        /// Recipe name
        recipe: String,
        /// Ingredient or sub-recipe name
        item: String,
        /// Quantity with unit (e.g. "500g", "2 serving")
        quantity: String,
        /// Force resolving the item as a sub-recipe
        #[arg(long)]
        sub_recipe: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a line from a recipe by item name
    RemoveLine {
        /// Recipe name
        recipe: String,
        /// Ingredient or sub-recipe name to remove
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update recipe scalars (servings, pricing, waste buffer)
    Set {
        /// Recipe name
        recipe: String,
        /// New servings yield
        #[arg(long)]
        servings: Option<f64>,
        /// New currency code
        #[arg(long)]
        currency: Option<String>,
        /// New menu selling price
        #[arg(long)]
        price: Option<f64>,
        /// Clear the selling price
        #[arg(long, conflicts_with = "price")]
        clear_price: bool,
        /// New target food cost percentage
        #[arg(long)]
        target: Option<f64>,
        /// New waste buffer percentage
        #[arg(long)]
        waste: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details (lines + costs)
    Show {
        /// Recipe name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe (refused while other recipes use it)
    Delete {
        /// Recipe name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RateCommands {
    /// Set an exchange rate (units of currency per 1 base unit)
    Set {
        /// Currency code (e.g. EUR)
        currency: String,
        /// Units of this currency per 1 unit of the base currency
        rate: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the base currency and all stored rates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a stored rate
    Remove {
        /// Currency code
        currency: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the base currency the rate table is expressed against
    SetBase {
        /// Currency code
        currency: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PrepCommands {
    /// Aggregate scaled recipes into one list without saving
    Generate {
        /// Selections as "Recipe name:servings" (repeatable)
        #[arg(required = true)]
        selections: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate and save as an immutable prep sheet
    Save {
        /// Sheet name
        name: String,
        /// Selections as "Recipe name:servings" (repeatable)
        #[arg(required = true)]
        selections: Vec<String>,
        /// Date (YYYY-MM-DD or today/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved prep sheets
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a saved prep sheet
    Show {
        /// Prep sheet ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved prep sheet
    Delete {
        /// Prep sheet ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum VersionCommands {
    /// Record the recipe's current state as a new version
    Snapshot {
        /// Recipe name
        recipe: String,
        /// Reason to record with the version
        #[arg(long)]
        reason: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a recipe's versions
    List {
        /// Recipe name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Diff two versions of a recipe
    Diff {
        /// Recipe name
        recipe: String,
        /// Older version number
        from: i64,
        /// Newer version number
        to: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a past version (recorded as a new version)
    Rollback {
        /// Recipe name
        recipe: String,
        /// Version number to restore
        version: i64,
        /// Reason to record with the rollback
        #[arg(long)]
        reason: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use ladle_core::models::{LineInput, LineRef, NewIngredient, NewRecipe};
    use ladle_core::service::LadleService;

    #[test]
    fn test_disk_database_survives_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("ladle.db");
        let path = db_path.to_string_lossy().to_string();

        {
            let svc = LadleService::new(&path).unwrap();
            let flour = svc
                .add_ingredient(&NewIngredient {
                    name: "Flour".to_string(),
                    category: "grain".to_string(),
                    unit: "kg".to_string(),
                    price_per_unit: 2.0,
                    currency: "USD".to_string(),
                    current_stock: 0.0,
                })
                .unwrap();
            let bread = svc
                .create_recipe(&NewRecipe {
                    name: "Bread".to_string(),
                    servings: 2.0,
                    currency: "USD".to_string(),
                    selling_price: None,
                    target_cost_pct: None,
                    waste_buffer_pct: 0.0,
                })
                .unwrap();
            svc.set_recipe_lines(
                bread.id,
                &[LineInput {
                    reference: LineRef::Ingredient(flour.id),
                    quantity: 1.0,
                    unit: "kg".to_string(),
                }],
                None,
            )
            .unwrap();
        }

        // Reopening runs the migrations again and must find everything intact
        let svc = LadleService::new(&path).unwrap();
        let bread = svc.get_recipe_by_name("Bread").unwrap();
        assert_eq!(bread.lines.len(), 1);
        assert!((bread.total_cost.unwrap() - 2.0).abs() < 1e-9);
        assert!(!svc.list_versions(bread.id).unwrap().is_empty());
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = LadleService::new(&config.db_path.to_string_lossy())?;

    match cli.command {
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                category,
                unit,
                price,
                currency,
                stock,
                json,
            } => cmd_ingredient_add(&svc, &name, &category, &unit, price, &currency, stock, json),
            IngredientCommands::List { search, json } => {
                cmd_ingredient_list(&svc, search.as_deref(), json)
            }
            IngredientCommands::SetPrice { name, price, json } => {
                cmd_ingredient_set_price(&svc, &name, price, json)
            }
            IngredientCommands::Receive {
                name,
                quantity,
                price,
                json,
            } => cmd_ingredient_receive(&svc, &name, quantity, price, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                servings,
                currency,
                price,
                target,
                waste,
                json,
            } => cmd_recipe_create(&svc, &name, servings, &currency, price, target, waste, json),
            RecipeCommands::AddLine {
                recipe,
                item,
                quantity,
                sub_recipe,
                json,
            } => cmd_recipe_add_line(&svc, &recipe, &item, &quantity, sub_recipe, json),
            RecipeCommands::RemoveLine { recipe, item, json } => {
                cmd_recipe_remove_line(&svc, &recipe, &item, json)
            }
            RecipeCommands::Set {
                recipe,
                servings,
                currency,
                price,
                clear_price,
                target,
                waste,
                json,
            } => cmd_recipe_update(
                &svc,
                &recipe,
                servings,
                currency,
                price,
                clear_price,
                target,
                waste,
                json,
            ),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&svc, &recipe, json),
            RecipeCommands::List { json } => cmd_recipe_list(&svc, json),
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(&svc, &recipe, json),
        },
        Commands::Cost { recipe, json } => cmd_cost(&svc, &recipe, json),
        Commands::Rate { command } => match command {
            RateCommands::Set {
                currency,
                rate,
                json,
            } => cmd_rate_set(&svc, &currency, rate, json),
            RateCommands::List { json } => cmd_rate_list(&svc, json),
            RateCommands::Remove { currency, json } => cmd_rate_remove(&svc, &currency, json),
            RateCommands::SetBase { currency, json } => cmd_rate_set_base(&svc, &currency, json),
        },
        Commands::Prep { command } => match command {
            PrepCommands::Generate { selections, json } => {
                cmd_prep_generate(&svc, &selections, json)
            }
            PrepCommands::Save {
                name,
                selections,
                date,
                notes,
                json,
            } => cmd_prep_save(&svc, &name, date, notes.as_deref(), &selections, json),
            PrepCommands::List { json } => cmd_prep_list(&svc, json),
            PrepCommands::Show { id, json } => cmd_prep_show(&svc, id, json),
            PrepCommands::Delete { id, json } => cmd_prep_delete(&svc, id, json),
        },
        Commands::Version { command } => match command {
            VersionCommands::Snapshot {
                recipe,
                reason,
                json,
            } => cmd_version_snapshot(&svc, &recipe, reason.as_deref(), json),
            VersionCommands::List { recipe, json } => cmd_version_list(&svc, &recipe, json),
            VersionCommands::Diff {
                recipe,
                from,
                to,
                json,
            } => cmd_version_diff(&svc, &recipe, from, to, json),
            VersionCommands::Rollback {
                recipe,
                version,
                reason,
                json,
            } => cmd_version_rollback(&svc, &recipe, version, reason.as_deref(), json),
        },
    }
}
