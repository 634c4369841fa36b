use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::diff::ChangeKind;
use ladle_core::models::LineRef;
use ladle_core::service::LadleService;

use super::helpers::truncate;

pub(crate) fn cmd_version_snapshot(
    svc: &LadleService,
    recipe_name: &str,
    reason: Option<&str>,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let snapshot = svc.snapshot_recipe(recipe.id, reason)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let version = snapshot.version;
        println!("Saved {recipe_name} as version {version}");
    }
    Ok(())
}

pub(crate) fn cmd_version_list(svc: &LadleService, recipe_name: &str, json: bool) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let versions = svc.list_versions(recipe.id)?;
    if versions.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No versions recorded for {recipe_name}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct VersionRow {
        #[tabled(rename = "Version")]
        version: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Total cost")]
        total_cost: String,
        #[tabled(rename = "Reason")]
        reason: String,
        #[tabled(rename = "Current")]
        current: String,
    }

    let rows: Vec<VersionRow> = versions
        .iter()
        .map(|v| VersionRow {
            version: v.version,
            date: v.created_at.chars().take(10).collect(),
            total_cost: v
                .total_cost
                .map_or("-".into(), |c| format!("{c:.2} {}", v.currency)),
            reason: truncate(v.change_reason.as_deref().unwrap_or("-"), 30),
            current: if v.is_current { "*".into() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

fn change_label(change: ChangeKind) -> &'static str {
    match change {
        ChangeKind::Added => "added",
        ChangeKind::Removed => "removed",
        ChangeKind::Modified => "modified",
        ChangeKind::Unchanged => "unchanged",
    }
}

pub(crate) fn cmd_version_diff(
    svc: &LadleService,
    recipe_name: &str,
    from: i64,
    to: i64,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let diff = svc.diff_versions(recipe.id, from, to)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    println!("=== {recipe_name}: v{from} -> v{to} ===");
    if diff.is_unchanged() {
        println!("  No changes");
        return Ok(());
    }

    println!("  FIELDS:");
    for field in &diff.field_diffs {
        if field.change == ChangeKind::Unchanged {
            continue;
        }
        let name = &field.field;
        let old = &field.old_value;
        let new = &field.new_value;
        match field.percent_change {
            Some(pct) => println!("    {name}: {old} -> {new} ({pct:+.1}%)"),
            None => println!("    {name}: {old} -> {new}"),
        }
    }

    println!("  LINES:");
    for line in &diff.line_diffs {
        if line.change == ChangeKind::Unchanged {
            continue;
        }
        let label = change_label(line.change);
        let reference = match line.reference {
            LineRef::Ingredient(id) => format!("ingredient {id}"),
            LineRef::SubRecipe(id) => format!("sub-recipe {id}"),
        };
        match (line.change, &line.old, &line.new) {
            (ChangeKind::Modified, Some(old), Some(new)) => {
                let (oq, ou) = (old.quantity, &old.unit);
                let (nq, nu) = (new.quantity, &new.unit);
                match line.quantity_pct_change {
                    Some(pct) => {
                        println!("    {reference}: {oq} {ou} -> {nq} {nu} ({pct:+.1}%)");
                    }
                    None => println!("    {reference}: {oq} {ou} -> {nq} {nu}"),
                }
            }
            (_, Some(old), None) => {
                let (q, u) = (old.quantity, &old.unit);
                println!("    {reference}: {label} ({q} {u})");
            }
            (_, None, Some(new)) => {
                let (q, u) = (new.quantity, &new.unit);
                println!("    {reference}: {label} ({q} {u})");
            }
            _ => println!("    {reference}: {label}"),
        }
    }

    Ok(())
}

pub(crate) fn cmd_version_rollback(
    svc: &LadleService,
    recipe_name: &str,
    version: i64,
    reason: Option<&str>,
    json: bool,
) -> Result<()> {
    let recipe = svc.get_recipe_by_name(recipe_name)?;
    let restored = svc.rollback_to_version(recipe.id, version, reason)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&restored)?);
    } else {
        println!("Rolled {recipe_name} back to version {version}");
        if let Some(total) = restored.total_cost {
            let currency = &restored.currency;
            println!("  Total cost is now {total:.2} {currency}");
        }
    }
    Ok(())
}
