use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;

/// Parse a quantity string with a unit, e.g. "500g", "2 kg", "1.5 l",
/// "3 piece". Returns `(quantity, unit)`.
pub(crate) fn parse_quantity(s: &str) -> Result<(f64, String)> {
    let s = s.trim();

    // "500g" / "2.5kg" with no space
    if let Some((qty, unit)) = split_number_unit(s) {
        return Ok((qty, unit.to_lowercase()));
    }

    // "<number> <unit>"
    let parts: Vec<&str> = s.splitn(2, char::is_whitespace).collect();
    if parts.len() == 2 {
        let qty: f64 = parts[0]
            .parse()
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        let unit = parts[1].trim();
        if unit.is_empty() {
            bail!("Missing unit in '{s}'. Use '500g', '2 kg', '3 piece', etc.");
        }
        return Ok((qty, unit.to_lowercase()));
    }

    bail!("Invalid quantity format: '{s}'. Use '500g', '2 kg', '3 piece', etc.")
}

/// Split "500ml" or "2.5kg" into (500.0, "ml") or (2.5, "kg").
fn split_number_unit(s: &str) -> Option<(f64, &str)> {
    let idx = s.find(|c: char| c.is_alphabetic())?;
    if idx == 0 {
        return None;
    }
    let (num_part, unit_part) = s.split_at(idx);
    let qty: f64 = num_part.trim().parse().ok()?;
    if unit_part.is_empty() {
        return None;
    }
    Some((qty, unit_part))
}

/// Parse a "Recipe:servings" selection, e.g. "Pancakes:30".
pub(crate) fn parse_selection(s: &str) -> Result<(String, f64)> {
    let Some((name, servings)) = s.rsplit_once(':') else {
        bail!("Invalid selection '{s}'. Use 'Recipe name:servings' (e.g. 'Pancakes:30')");
    };
    let servings: f64 = servings
        .trim()
        .parse()
        .with_context(|| format!("Invalid servings in '{s}'"))?;
    if servings < 0.0 {
        bail!("Servings must not be negative in '{s}'");
    }
    Ok((name.trim().to_string(), servings))
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn fmt_money(amount: f64, currency: &str) -> String {
    format!("{amount:.2} {currency}")
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
