use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerces an arbitrary JSON value to a finite number.
///
/// Anything that is not a number, a numeric string or a boolean becomes `0.0`,
/// as do `NaN` and infinities.
pub fn coerce_number(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_amount(s),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };

    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Parses an amount as it appears in an imported spreadsheet cell.
///
/// Accepts thousands separators (`1,250.50`), a leading currency symbol and
/// accounting negatives (`(300)`). Returns `0.0` for anything unparseable.
pub fn parse_amount(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '$' | '£' | '€'))
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => {
            if negative {
                -v
            } else {
                v
            }
        }
        _ => 0.0,
    }
}

/// Renders a JSON cell as text. `null` becomes the empty string.
pub fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `deserialize_with` helper applying [`coerce_number`].
pub fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

/// `deserialize_with` helper applying [`coerce_string`].
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_string(&value))
}

/// Formats an amount for reports: rounded to the nearest whole unit with
/// thousands separators.
pub fn format_amount(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
