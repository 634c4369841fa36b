use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::models::{PrepSheetItem, PrepSheetSelection};
use ladle_core::service::LadleService;

use super::helpers::{parse_date, parse_selection, truncate};

fn resolve_selections(svc: &LadleService, specs: &[String]) -> Result<Vec<PrepSheetSelection>> {
    let mut selections = Vec::with_capacity(specs.len());
    for spec in specs {
        let (name, servings) = parse_selection(spec)?;
        let recipe = svc.get_recipe_by_name(&name)?;
        selections.push(PrepSheetSelection {
            recipe_id: recipe.id,
            requested_servings: servings,
        });
    }
    Ok(selections)
}

fn print_items(items: &[PrepSheetItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Total")]
        total: String,
        #[tabled(rename = "From")]
        breakdown: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|item| ItemRow {
            name: truncate(&item.ingredient_name, 30),
            total: format!("{:.1} {}", item.total_quantity, item.unit),
            breakdown: item
                .breakdown
                .iter()
                .map(|c| {
                    if c.unit == item.unit {
                        format!("{} ({:.1})", c.recipe_name, c.quantity)
                    } else {
                        // Unmerged contribution keeps its own unit visible
                        format!("{} ({:.1} {})", c.recipe_name, c.quantity, c.unit)
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_prep_generate(svc: &LadleService, specs: &[String], json: bool) -> Result<()> {
    let selections = resolve_selections(svc, specs)?;
    let aggregation = svc.generate_prep_sheet(&selections)?;

    if json {
        #[derive(serde::Serialize)]
        struct JsonAggregation<'a> {
            recipes: &'a [ladle_core::models::PrepSheetRecipe],
            items: &'a [PrepSheetItem],
        }
        let out = JsonAggregation {
            recipes: &aggregation.recipes,
            items: &aggregation.items,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for sel in &aggregation.recipes {
        let name = &sel.recipe_name;
        let base = sel.base_servings;
        let requested = sel.requested_servings;
        println!("{name}: {base} -> {requested} servings");
    }
    println!();
    print_items(&aggregation.items);
    Ok(())
}

pub(crate) fn cmd_prep_save(
    svc: &LadleService,
    name: &str,
    date: Option<String>,
    notes: Option<&str>,
    specs: &[String],
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?.format("%Y-%m-%d").to_string();
    let selections = resolve_selections(svc, specs)?;
    let sheet = svc.save_prep_sheet(name, &date, notes, &selections)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sheet)?);
    } else {
        let id = sheet.id;
        let count = sheet.items.len();
        println!("Saved prep sheet: {name} (id: {id}, {count} item(s), {date})");
    }
    Ok(())
}

pub(crate) fn cmd_prep_list(svc: &LadleService, json: bool) -> Result<()> {
    let sheets = svc.list_prep_sheets()?;
    if sheets.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No prep sheets found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&sheets)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct SheetRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Recipes")]
        recipes: usize,
        #[tabled(rename = "Items")]
        items: usize,
    }

    let rows: Vec<SheetRow> = sheets
        .iter()
        .map(|s| SheetRow {
            id: s.id,
            name: truncate(&s.name, 30),
            date: s.date.clone(),
            recipes: s.recipes.len(),
            items: s.items.len(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_prep_show(svc: &LadleService, id: i64, json: bool) -> Result<()> {
    let sheet = svc.get_prep_sheet(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sheet)?);
        return Ok(());
    }

    let name = &sheet.name;
    let date = &sheet.date;
    println!("=== {name} ({date}) ===");
    if let Some(notes) = &sheet.notes {
        println!("  {notes}");
    }
    for sel in &sheet.recipes {
        let rname = &sel.recipe_name;
        let base = sel.base_servings;
        let requested = sel.requested_servings;
        println!("  {rname}: {base} -> {requested} servings");
    }
    println!();
    print_items(&sheet.items);
    Ok(())
}

pub(crate) fn cmd_prep_delete(svc: &LadleService, id: i64, json: bool) -> Result<()> {
    if svc.delete_prep_sheet(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted prep sheet {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", super::helpers::json_error("Prep sheet not found"));
        } else {
            eprintln!("Prep sheet {id} not found");
        }
        process::exit(2);
    }
}
