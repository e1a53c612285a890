//! # Text substitution
//!
//! Resolves text directives in subject/body/report templates against a
//! workitem:
//!
//! - `<itemvalue format="…" separator="…" position="first|last"
//!   locale="xx_YY">itemname</itemvalue>` — replaced by the formatted item
//!   value(s),
//! - `<date DAY_OF_MONTH="…" MONTH="…" YEAR="…" ADD="FIELD,OFFSET" />` —
//!   replaced by a `yyyyMMdd` literal evaluated relative to now (used in
//!   report query strings).
//!
//! The `<date>` tag is expanded first so itemvalue templates may embed
//! date literals. Date values format with chrono `strftime` patterns; a
//! `format` containing `#` is treated as a decimal pattern
//! (`"EUR #,###,##0.00"`), locale `de`-style locales switch the decimal
//! and grouping separators.

use chrono::{DateTime, Datelike, Months, Utc};
use regex::Regex;
use tracing::warn;

use crate::document::{ItemCollection, ItemValue};

/// Replaces all known directives in the template.
pub fn adapt_text(template: &str, workitem: &ItemCollection) -> String {
    adapt_text_at(template, workitem, Utc::now())
}

/// Like [`adapt_text`] but with an explicit notion of "now", which keeps
/// date expansion deterministic for callers that need it.
pub fn adapt_text_at(template: &str, workitem: &ItemCollection, now: DateTime<Utc>) -> String {
    let text = expand_date_tags(template, now);
    expand_itemvalue_tags(&text, workitem)
}

/// Substitution variant used for ACL entries: a template that consists of
/// exactly one `<itemvalue>` tag expands to the full value list; anything
/// else resolves to a single-element list.
pub fn adapt_text_list(template: &str, workitem: &ItemCollection) -> Vec<String> {
    let trimmed = template.trim();
    let whole_tag = Regex::new(r"(?s)^<itemvalue[^>]*>(.+?)</itemvalue>$").expect("static pattern");
    if let Some(capture) = whole_tag.captures(trimmed) {
        let item_name = capture[1].trim();
        let values = workitem.item_string_list(item_name);
        if !values.is_empty() {
            return values;
        }
        return Vec::new();
    }
    vec![adapt_text(template, workitem)]
}

fn expand_itemvalue_tags(text: &str, workitem: &ItemCollection) -> String {
    let tag = Regex::new(r"(?s)<itemvalue([^>]*)>(.*?)</itemvalue>").expect("static pattern");
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    for capture in tag.captures_iter(text) {
        let whole = capture.get(0).expect("group 0");
        let attributes = parse_attributes(&capture[1]);
        let item_name = capture[2].trim();
        let values = workitem.item_value(item_name);

        result.push_str(&text[last_end..whole.start()]);
        result.push_str(&format_item_values(
            values,
            attributes.get("separator").map(String::as_str),
            attributes.get("format").map(String::as_str),
            attributes.get("locale").map(String::as_str),
            attributes.get("position").map(String::as_str),
        ));
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    result
}

/// Formats a value list. With a separator all values are joined; without
/// one only the value at the requested position (default: first) is
/// rendered.
pub fn format_item_values(
    values: &[ItemValue],
    separator: Option<&str>,
    format: Option<&str>,
    locale: Option<&str>,
    position: Option<&str>,
) -> String {
    if values.is_empty() {
        return String::new();
    }
    match (separator, position) {
        (Some(separator), _) => values
            .iter()
            .map(|v| format_value(v, format, locale))
            .collect::<Vec<_>>()
            .join(separator),
        (None, Some(position)) if position.eq_ignore_ascii_case("last") => {
            format_value(values.last().expect("non-empty"), format, locale)
        }
        _ => format_value(values.first().expect("non-empty"), format, locale),
    }
}

fn format_value(value: &ItemValue, format: Option<&str>, locale: Option<&str>) -> String {
    if let Some(date) = value.to_date() {
        return match format {
            Some(pattern) if !pattern.is_empty() => date.format(pattern).to_string(),
            _ => date.format("%Y-%m-%d %H:%M").to_string(),
        };
    }
    if let Some(pattern) = format {
        if pattern.contains('#') {
            if let Some(number) = value.to_double() {
                return format_number(pattern, locale, number);
            }
            warn!(pattern, "number format on non-numeric value");
            return "0".to_string();
        }
    }
    value.to_text()
}

/// Decimal-pattern formatter: `#` optional digit, `0` forced digit, `,`
/// grouping, `.` decimal point; literal text around the digit core is
/// preserved (`"EUR #,###,##0.00"`).
fn format_number(pattern: &str, locale: Option<&str>, value: f64) -> String {
    let core = Regex::new(r"[#0.,]+").expect("static pattern");
    let Some(digits) = core.find(pattern) else {
        return value.to_string();
    };
    let (prefix, suffix) = (&pattern[..digits.start()], &pattern[digits.end()..]);
    let core = digits.as_str();

    let (int_pattern, frac_pattern) = match core.rfind('.') {
        Some(pos) => (&core[..pos], &core[pos + 1..]),
        None => (core, ""),
    };
    let max_fraction = frac_pattern.len();
    let min_fraction = frac_pattern.chars().filter(|c| *c == '0').count();
    let grouping = int_pattern.contains(',');

    // round to the maximum fraction width, then trim optional zeros
    let mut formatted = format!("{value:.max_fraction$}");
    if max_fraction > min_fraction {
        while formatted.contains('.') && formatted.ends_with('0') {
            let digits_after: usize = formatted.len() - formatted.rfind('.').unwrap() - 1;
            if digits_after <= min_fraction {
                break;
            }
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }

    let (int_part, frac_part) = match formatted.find('.') {
        Some(pos) => (formatted[..pos].to_string(), formatted[pos + 1..].to_string()),
        None => (formatted, String::new()),
    };

    let (decimal_sep, group_sep) = separators(locale);
    let int_part = if grouping {
        group_digits(&int_part, group_sep)
    } else {
        int_part
    };

    let mut result = String::new();
    result.push_str(prefix);
    result.push_str(&int_part);
    if !frac_part.is_empty() {
        result.push(decimal_sep);
        result.push_str(&frac_part);
    }
    result.push_str(suffix);
    result
}

fn separators(locale: Option<&str>) -> (char, char) {
    match locale {
        Some(locale) => {
            let language = locale.split('_').next().unwrap_or("").to_ascii_lowercase();
            match language.as_str() {
                "de" | "es" | "it" | "nl" | "pt" => (',', '.'),
                "fr" => (',', ' '),
                _ => ('.', ','),
            }
        }
        None => ('.', ','),
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let (sign, digits) = digits.strip_prefix('-').map_or(("", digits), |d| ("-", d));
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}")
}

fn parse_attributes(raw: &str) -> std::collections::HashMap<String, String> {
    let attribute = Regex::new(r#"([\w]+)\s*=\s*"([^"]*)""#).expect("static pattern");
    attribute
        .captures_iter(raw)
        .map(|c| (c[1].to_lowercase(), c[2].to_string()))
        .collect()
}

// ---------------------------------------------------------------------
// <date> tag
// ---------------------------------------------------------------------

fn expand_date_tags(text: &str, now: DateTime<Utc>) -> String {
    let tag = Regex::new(r"<date\s*([^/>]*)/>").expect("static pattern");
    tag.replace_all(text, |capture: &regex::Captures<'_>| {
        match evaluate_date_tag(&capture[1], now) {
            Some(date) => date.format("%Y%m%d").to_string(),
            None => {
                warn!(tag = %&capture[0], "invalid <date> tag ignored");
                capture[0].to_string()
            }
        }
    })
    .to_string()
}

fn evaluate_date_tag(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let attributes = parse_attributes(raw);
    let mut date = now;

    if let Some(year) = attributes.get("year") {
        let year: i32 = year.parse().ok()?;
        date = date.with_year(year)?;
    }
    if let Some(month) = attributes.get("month") {
        let month = if month == "ACTUAL_MAXIMUM" {
            12
        } else {
            month.parse().ok()?
        };
        date = date.with_day(1)?.with_month(month)?;
    }
    if let Some(day) = attributes.get("day_of_month") {
        let day = if day == "ACTUAL_MAXIMUM" {
            last_day_of_month(date)
        } else {
            day.parse().ok()?
        };
        date = date.with_day(day)?;
    }
    if let Some(day_of_year) = attributes.get("day_of_year") {
        let ordinal: u32 = day_of_year.parse().ok()?;
        date = date.with_ordinal(ordinal)?;
    }
    if let Some(add) = attributes.get("add") {
        let (field, offset) = add.split_once(',')?;
        let offset: i64 = offset.trim().parse().ok()?;
        date = match field.trim() {
            "DAY_OF_MONTH" | "DAY_OF_YEAR" => date + chrono::Duration::days(offset),
            "MONTH" => {
                if offset >= 0 {
                    date.checked_add_months(Months::new(offset as u32))?
                } else {
                    date.checked_sub_months(Months::new(offset.unsigned_abs() as u32))?
                }
            }
            "YEAR" => date.with_year(date.year() + offset as i32)?,
            _ => return None,
        };
    }
    Some(date)
}

fn last_day_of_month(date: DateTime<Utc>) -> u32 {
    let next_month = if date.month() == 12 {
        date.with_year(date.year() + 1).and_then(|d| d.with_month(1))
    } else {
        date.with_month(date.month() + 1)
    };
    next_month
        .and_then(|d| d.with_day(1))
        .map(|d| (d - chrono::Duration::days(1)).day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn workitem() -> ItemCollection {
        let mut doc = ItemCollection::new();
        doc.set_item_value("$creator", "anna");
        doc.set_item_value_list("txtphones", ["123", "456"]);
        doc.set_item_value("_amount", 1456.781);
        doc.set_item_value(
            "$created",
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap(),
        );
        doc
    }

    #[test]
    fn replaces_itemvalue_tag() {
        let result = adapt_text("hello <itemvalue>$creator</itemvalue>!", &workitem());
        assert_eq!(result, "hello anna!");
    }

    #[test]
    fn separator_joins_all_values() {
        let result = adapt_text(
            r#"Phones: <itemvalue separator=", ">txtphones</itemvalue>"#,
            &workitem(),
        );
        assert_eq!(result, "Phones: 123, 456");
    }

    #[test]
    fn position_last_picks_final_value() {
        let result = adapt_text(
            r#"<itemvalue position="last">txtphones</itemvalue>"#,
            &workitem(),
        );
        assert_eq!(result, "456");
    }

    #[test]
    fn date_values_format_with_pattern() {
        let result = adapt_text(
            r#"created <itemvalue format="%d.%m.%Y">$created</itemvalue>"#,
            &workitem(),
        );
        assert_eq!(result, "created 01.06.2024");
    }

    #[test]
    fn number_pattern_with_locale() {
        let result = adapt_text(
            r#"<itemvalue format="EUR #,###,##0.00" locale="de_DE">_amount</itemvalue>"#,
            &workitem(),
        );
        assert_eq!(result, "EUR 1.456,78");
    }

    #[test]
    fn unknown_items_render_empty() {
        let result = adapt_text("[<itemvalue>missing</itemvalue>]", &workitem());
        assert_eq!(result, "[]");
    }

    #[test]
    fn adapt_text_list_expands_multi_values() {
        let values = adapt_text_list("<itemvalue>txtphones</itemvalue>", &workitem());
        assert_eq!(values, vec!["123".to_string(), "456".to_string()]);

        // plain strings stay single-element
        let values = adapt_text_list("sam", &workitem());
        assert_eq!(values, vec!["sam".to_string()]);

        // unresolvable item names expand to nothing
        let values = adapt_text_list("<itemvalue>missing</itemvalue>", &workitem());
        assert!(values.is_empty());
    }

    #[test]
    fn date_tag_expands_to_yyyymmdd() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(adapt_text_at("<date />", &ItemCollection::new(), now), "20240615");
        assert_eq!(
            adapt_text_at(
                r#"<date DAY_OF_MONTH="1" MONTH="1" />"#,
                &ItemCollection::new(),
                now
            ),
            "20240101"
        );
        assert_eq!(
            adapt_text_at(
                r#"<date DAY_OF_MONTH="ACTUAL_MAXIMUM" MONTH="2" />"#,
                &ItemCollection::new(),
                now
            ),
            "20240229"
        );
    }

    #[test]
    fn date_tag_with_offset() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(
            adapt_text_at(
                r#"query: $created:[<date ADD="DAY_OF_MONTH,-7" /> TO <date />]"#,
                &ItemCollection::new(),
                now
            ),
            "query: $created:[20240608 TO 20240615]"
        );
    }

    #[test]
    fn number_grouping_default_locale() {
        assert_eq!(format_number("###,###.##", None, 123456.789), "123,456.79");
        assert_eq!(format_number("#0.00", None, 3.5), "3.50");
        assert_eq!(format_number("#", None, 42.0), "42");
    }
}
