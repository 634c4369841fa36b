use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::service::LadleService;

use super::helpers::json_error;

pub(crate) fn cmd_rate_set(svc: &LadleService, currency: &str, rate: f64, json: bool) -> Result<()> {
    svc.set_exchange_rate(currency, rate)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&svc.rates()?)?);
    } else {
        let base = svc.base_currency()?;
        let code = currency.to_uppercase();
        println!("Set rate: 1 {base} = {rate} {code}");
    }
    Ok(())
}

pub(crate) fn cmd_rate_remove(svc: &LadleService, currency: &str, json: bool) -> Result<()> {
    if svc.remove_exchange_rate(currency)? {
        if json {
            println!("{}", serde_json::json!({ "removed": currency.to_uppercase() }));
        } else {
            let code = currency.to_uppercase();
            println!("Removed rate for {code}");
        }
    } else if json {
        println!("{}", json_error(&format!("No rate stored for {currency}")));
    } else {
        eprintln!("No rate stored for {currency}");
    }
    Ok(())
}

pub(crate) fn cmd_rate_list(svc: &LadleService, json: bool) -> Result<()> {
    let rates = svc.rates()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rates)?);
        return Ok(());
    }

    let base = &rates.base;
    println!("Base currency: {base}");
    if rates.rates.is_empty() {
        eprintln!("No exchange rates stored");
        return Ok(());
    }

    #[derive(Tabled)]
    struct RateRow {
        #[tabled(rename = "Currency")]
        currency: String,
        #[tabled(rename = "Per 1 base")]
        rate: String,
    }

    let mut entries: Vec<(&String, &f64)> = rates.rates.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let rows: Vec<RateRow> = entries
        .into_iter()
        .map(|(code, rate)| RateRow {
            currency: code.clone(),
            rate: format!("{rate:.4}"),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_rate_set_base(svc: &LadleService, currency: &str, json: bool) -> Result<()> {
    svc.set_base_currency(currency)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&svc.rates()?)?);
    } else {
        let code = currency.to_uppercase();
        println!("Base currency is now {code}");
        println!("Stored rates are interpreted as units of currency per 1 {code}; re-enter them if they were quoted against the old base.");
    }
    Ok(())
}
