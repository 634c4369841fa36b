use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::models::NewIngredient;
use ladle_core::service::LadleService;

use super::helpers::{fmt_money, truncate};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_ingredient_add(
    svc: &LadleService,
    name: &str,
    category: &str,
    unit: &str,
    price: f64,
    currency: &str,
    stock: f64,
    json: bool,
) -> Result<()> {
    let ingredient = svc.add_ingredient(&NewIngredient {
        name: name.to_string(),
        category: category.to_string(),
        unit: unit.to_string(),
        price_per_unit: price,
        currency: currency.to_string(),
        current_stock: stock,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let id = ingredient.id;
        let price = fmt_money(ingredient.price_per_unit, &ingredient.currency);
        let unit = &ingredient.unit;
        println!("Added ingredient: {name} (id: {id}, {price}/{unit})");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    svc: &LadleService,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let ingredients = svc.list_ingredients(search)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }

    if ingredients.is_empty() {
        eprintln!("No ingredients found");
        return Ok(());
    }

    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Stock")]
        stock: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 30),
            category: i.category.clone(),
            price: format!(
                "{}/{}",
                fmt_money(i.price_per_unit, &i.currency),
                i.unit
            ),
            stock: format!("{:.1} {}", i.current_stock, i.unit),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_ingredient_set_price(
    svc: &LadleService,
    name: &str,
    price: f64,
    json: bool,
) -> Result<()> {
    let ingredient = svc.get_ingredient_by_name(name)?;
    let recomputed = svc.set_ingredient_price(ingredient.id, price)?;

    if json {
        let updated = svc.get_ingredient(ingredient.id)?;
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        let price = fmt_money(price, &ingredient.currency);
        let unit = &ingredient.unit;
        let count = recomputed.len();
        println!("Updated {name} to {price}/{unit} ({count} recipe(s) recosted)");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_receive(
    svc: &LadleService,
    name: &str,
    quantity: f64,
    price: f64,
    json: bool,
) -> Result<()> {
    let ingredient = svc.get_ingredient_by_name(name)?;
    let updated = svc.receive_stock(ingredient.id, quantity, price)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else {
        let unit = &updated.unit;
        let stock = updated.current_stock;
        let blended = fmt_money(updated.price_per_unit, &updated.currency);
        println!(
            "Received {quantity} {unit} of {name}: stock {stock:.1} {unit}, price now {blended}/{unit}"
        );
    }
    Ok(())
}
