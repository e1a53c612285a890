//! Shared helpers for ACL and owner computation.
//!
//! These used to be instance methods on a common plugin base class; they
//! are free functions here so both the kernel-invoked access adapter and
//! optional plugins reuse them without inheritance.

use crate::context::WorkflowContext;
use crate::document::ItemCollection;

/// Merges entries of `source` into `target`, passing each entry through
/// the text substitution pipeline (one entry may expand to several names).
/// Already present names are not added twice.
pub fn merge_value_list(
    target: &mut Vec<String>,
    source: &[String],
    workitem: &ItemCollection,
    ctx: &WorkflowContext,
) {
    for entry in source {
        if target.iter().any(|t| t == entry) {
            continue;
        }
        for adapted in ctx.adapt_text_list(entry, workitem) {
            target.push(adapted);
        }
    }
}

/// Merges the values named by `field_list` into `target`.
///
/// A field entry names a workitem item whose current values are appended.
/// An entry in square or curly brackets (`[a,b]` / `{a,b}`) is an inline
/// literal list.
pub fn merge_field_list(workitem: &ItemCollection, target: &mut Vec<String>, field_list: &[String]) {
    for field in field_list {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let values: Vec<String> = if (field.starts_with('[') && field.ends_with(']'))
            || (field.starts_with('{') && field.ends_with('}'))
        {
            field[1..field.len() - 1]
                .split(',')
                .map(|v| v.trim().to_string())
                .collect()
        } else {
            workitem.item_string_list(field)
        };
        for value in values {
            if !target.contains(&value) {
                target.push(value);
            }
        }
    }
}

/// Removes duplicates and empty strings, preserving first occurrence.
pub fn unique_list(values: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if value.is_empty() || cleaned.contains(&value) {
            continue;
        }
        cleaned.push(value);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_list_reads_items_and_literals() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list("namteam", ["anna", "rico"]);

        let mut target = Vec::new();
        merge_field_list(
            &workitem,
            &mut target,
            &["namteam".to_string(), "[sam, joe]".to_string(), "{eddy}".to_string()],
        );
        assert_eq!(target, vec!["anna", "rico", "sam", "joe", "eddy"]);
    }

    #[test]
    fn field_list_skips_duplicates() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list("namteam", ["anna"]);

        let mut target = vec!["anna".to_string()];
        merge_field_list(&workitem, &mut target, &["namteam".to_string()]);
        assert_eq!(target, vec!["anna"]);
    }

    #[test]
    fn unique_list_drops_duplicates_and_empty() {
        let values = vec![
            "anna".to_string(),
            "".to_string(),
            "rico".to_string(),
            "anna".to_string(),
        ];
        assert_eq!(unique_list(values), vec!["anna", "rico"]);
    }
}
