use anyhow::{Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::models::{LineInput, LineRef, NewRecipe, RecipeUpdate};
use ladle_core::service::LadleService;

use super::helpers::{fmt_money, json_error, parse_quantity, truncate};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_recipe_create(
    svc: &LadleService,
    name: &str,
    servings: f64,
    currency: &str,
    selling_price: Option<f64>,
    target_cost_pct: Option<f64>,
    waste_buffer_pct: f64,
    json: bool,
) -> Result<()> {
    let recipe = svc.create_recipe(&NewRecipe {
        name: name.to_string(),
        servings,
        currency: currency.to_string(),
        selling_price,
        target_cost_pct,
        waste_buffer_pct,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        println!("Created recipe: {name} (id: {id}, servings: {servings})");
        println!("Add lines with: ladle recipe add-line \"{name}\" <item> <quantity>");
    }
    Ok(())
}

/// Resolve an item name to a line reference: ingredients first, recipes as a
/// fallback, `--sub-recipe` to force the recipe namespace.
fn resolve_reference(svc: &LadleService, item: &str, force_sub: bool) -> Result<LineRef> {
    if !force_sub {
        if let Ok(ingredient) = svc.get_ingredient_by_name(item) {
            return Ok(LineRef::Ingredient(ingredient.id));
        }
    }
    match svc.get_recipe_by_name(item) {
        Ok(recipe) => Ok(LineRef::SubRecipe(recipe.id)),
        Err(_) if force_sub => bail!("No recipe found for '{item}'"),
        Err(_) => bail!("No ingredient or recipe found for '{item}'"),
    }
}

pub(crate) fn cmd_recipe_add_line(
    svc: &LadleService,
    recipe_name: &str,
    item: &str,
    quantity_str: &str,
    force_sub: bool,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let (quantity, unit) = parse_quantity(quantity_str)?;
    let reference = resolve_reference(svc, item, force_sub)?;

    let mut lines: Vec<LineInput> = recipe
        .lines
        .iter()
        .map(|l| LineInput {
            reference: l.reference,
            quantity: l.quantity,
            unit: l.unit.clone(),
        })
        .collect();
    lines.push(LineInput {
        reference,
        quantity,
        unit: unit.clone(),
    });

    let updated = svc.set_recipe_lines(recipe.id, &lines, Some("Line added"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("Added {quantity} {unit} of {item} to {recipe_name}");
        report_warnings(svc, updated.id)?;
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove_line(
    svc: &LadleService,
    recipe_name: &str,
    item: &str,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let mut lines: Vec<LineInput> = Vec::new();
    let mut removed = false;
    for line in &recipe.lines {
        if !removed && line.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(item)) {
            removed = true;
            continue;
        }
        lines.push(LineInput {
            reference: line.reference,
            quantity: line.quantity,
            unit: line.unit.clone(),
        });
    }

    if removed {
        svc.set_recipe_lines(recipe.id, &lines, Some("Line removed"))?;
        if json {
            println!("{}", serde_json::json!({ "removed": item }));
        } else {
            println!("Removed {item} from {recipe_name}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Line '{item}' not found in recipe")));
        } else {
            eprintln!("Line '{item}' not found in recipe");
        }
        process::exit(2);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_recipe_update(
    svc: &LadleService,
    recipe_name: &str,
    servings: Option<f64>,
    currency: Option<String>,
    selling_price: Option<f64>,
    clear_selling_price: bool,
    target_cost_pct: Option<f64>,
    waste_buffer_pct: Option<f64>,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let update = RecipeUpdate {
        name: None,
        servings,
        currency,
        selling_price: if clear_selling_price {
            Some(None)
        } else {
            selling_price.map(Some)
        },
        target_cost_pct: target_cost_pct.map(Some),
        waste_buffer_pct,
    };
    let updated = svc.update_recipe(recipe.id, &update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        println!("Updated {recipe_name}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &LadleService, recipe_name: &str, json: bool) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let name = &recipe.name;
    let servings = recipe.servings;
    let currency = &recipe.currency;
    println!("=== {name} ===");
    print!("  Servings: {servings}  |  Currency: {currency}");
    if recipe.waste_buffer_pct > 0.0 {
        let waste = recipe.waste_buffer_pct;
        print!("  |  Waste buffer: {waste}%");
    }
    println!("\n");

    println!("  LINES:");
    for line in &recipe.lines {
        let lname = line.name.as_deref().unwrap_or("?");
        let qty = line.quantity;
        let unit = &line.unit;
        let kind = match line.reference {
            LineRef::Ingredient(_) => "",
            LineRef::SubRecipe(_) => " (sub-recipe)",
        };
        match line.cost {
            Some(cost) => {
                let cost = fmt_money(cost, &recipe.currency);
                println!("    {lname}{kind} — {qty} {unit} — {cost}");
            }
            None => println!("    {lname}{kind} — {qty} {unit} — unpriced"),
        }
    }

    if let Some(total) = recipe.total_cost {
        let total_fmt = fmt_money(total, &recipe.currency);
        let per_serving = fmt_money(total / recipe.servings, &recipe.currency);
        println!("\n  TOTAL: {total_fmt} ({per_serving}/serving)");
    }
    if let Some(price) = recipe.selling_price {
        let price = fmt_money(price, &recipe.currency);
        print!("  Selling price: {price}");
        if let Some(margin) = recipe.profit_margin {
            print!("  |  Margin: {margin:.1}%");
        }
        println!();
    }

    Ok(())
}

pub(crate) fn cmd_recipe_list(svc: &LadleService, json: bool) -> Result<()> {
    let recipes = svc.list_recipes()?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Servings")]
        servings: String,
        #[tabled(rename = "Total cost")]
        total_cost: String,
        #[tabled(rename = "Margin")]
        margin: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 30),
            servings: format!("{:.0}", r.servings),
            total_cost: r
                .total_cost
                .map_or("-".into(), |c| fmt_money(c, &r.currency)),
            margin: r.profit_margin.map_or("-".into(), |m| format!("{m:.1}%")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_delete(svc: &LadleService, recipe_name: &str, json: bool) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    svc.delete_recipe(recipe.id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": recipe_name }));
    } else {
        println!("Deleted {recipe_name}");
    }
    Ok(())
}

pub(crate) fn cmd_cost(svc: &LadleService, recipe_name: &str, json: bool) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let report = svc.compute_cost(recipe.id)?;

    if json {
        #[derive(serde::Serialize)]
        struct JsonReport<'a> {
            recipe: &'a str,
            currency: &'a str,
            subtotal: f64,
            waste_cost: f64,
            total_cost: f64,
            cost_per_serving: f64,
            suggested_price: Option<f64>,
            profit_margin: Option<f64>,
            food_cost_pct: Option<f64>,
            warnings: &'a [String],
        }
        let out = JsonReport {
            recipe: &report.recipe.name,
            currency: &report.recipe.currency,
            subtotal: report.breakdown.subtotal,
            waste_cost: report.breakdown.waste_cost,
            total_cost: report.breakdown.total_cost,
            cost_per_serving: report.breakdown.total_cost / report.recipe.servings,
            suggested_price: report.suggested_price,
            profit_margin: report.recipe.profit_margin,
            food_cost_pct: report.food_cost_pct,
            warnings: &report.breakdown.errors,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let currency = &report.recipe.currency;
    let name = &report.recipe.name;
    println!("=== Costing: {name} ===");
    for lc in &report.breakdown.line_costs {
        match lc.cost {
            Some(cost) => {
                let cost = fmt_money(cost, currency);
                let lname = &lc.name;
                println!("  {lname} — {cost}");
            }
            None => {
                let lname = &lc.name;
                println!("  {lname} — unpriced");
            }
        }
    }
    let subtotal = fmt_money(report.breakdown.subtotal, currency);
    println!("\n  Subtotal: {subtotal}");
    if report.breakdown.waste_cost > 0.0 {
        let waste = fmt_money(report.breakdown.waste_cost, currency);
        let pct = report.recipe.waste_buffer_pct;
        println!("  Waste buffer ({pct}%): {waste}");
    }
    let total = fmt_money(report.breakdown.total_cost, currency);
    let per_serving = fmt_money(
        report.breakdown.total_cost / report.recipe.servings,
        currency,
    );
    println!("  Total: {total} ({per_serving}/serving)");

    if let Some(suggested) = report.suggested_price {
        let suggested = fmt_money(suggested, currency);
        let pct = report.recipe.target_cost_pct.unwrap_or_default();
        println!("  Suggested price at {pct}% food cost: {suggested}");
    }
    if let Some(margin) = report.recipe.profit_margin {
        println!("  Profit margin: {margin:.1}%");
    }

    if !report.breakdown.errors.is_empty() {
        let count = report.breakdown.errors.len();
        eprintln!("\nWarning: could not price {count} line(s):");
        for e in &report.breakdown.errors {
            eprintln!("  {e}");
        }
    }

    Ok(())
}

/// Surface costing warnings after a composition change without failing it.
fn report_warnings(svc: &LadleService, recipe_id: i64) -> Result<()> {
    let report = svc.compute_cost(recipe_id)?;
    if !report.breakdown.errors.is_empty() {
        let count = report.breakdown.errors.len();
        eprintln!("Warning: could not price {count} line(s):");
        for e in &report.breakdown.errors {
            eprintln!("  {e}");
        }
    }
    Ok(())
}
