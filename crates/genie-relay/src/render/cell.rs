//! Table cell formatting.

use serde_json::Value;

const ELLIPSIS: char = '…';

/// Declared types rendered with thousands separators and two decimals.
const DECIMAL_TYPES: [&str; 3] = ["DECIMAL", "DOUBLE", "FLOAT"];

/// Declared types rendered as grouped integers.
const INTEGER_TYPES: [&str; 6] = ["INT", "BIGINT", "LONG", "SMALLINT", "TINYINT", "SHORT"];

/// Format one cell by its declared type, then truncate to `limit` characters.
pub fn format_cell(value: &Value, type_name: &str, limit: usize) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }

    let type_name = type_name.to_ascii_uppercase();
    let formatted = if DECIMAL_TYPES.contains(&type_name.as_str()) {
        as_f64(value).map(format_decimal)
    } else if INTEGER_TYPES.contains(&type_name.as_str()) {
        as_i128(value).map(format_integer)
    } else {
        None
    };

    let text = formatted.unwrap_or_else(|| escape(&plain_text(value)));
    truncate_chars(&text, limit)
}

/// Make a value safe inside a single markdown table cell.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '|' => out.push_str("\\|"),
            '\r' | '\n' => out.push(' '),
            '`' => out.push('ʼ'),
            other => out.push(other),
        }
    }
    out
}

/// Keep at most `limit` characters, marking a cut with an ellipsis.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}

/// `1234567` → `1,234,567`.
pub fn format_integer(value: i128) -> String {
    let digits = value.unsigned_abs().to_string();
    let sign = if value < 0 { "-" } else { "" };
    format!("{sign}{}", group_thousands(&digits))
}

/// `1234.5` → `1,234.50`.
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    // -0.001 rounds to 0.00; no sign then.
    let sign = if value < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    format!("{sign}{}.{frac}", group_thousands(whole))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i128(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i128)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
