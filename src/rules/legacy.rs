//! Legacy script shim.
//!
//! Early model generations embedded scripts written for a JavaScript
//! engine with direct item access (`workitem.txtname[0]`,
//! `workitem['space.team'][0]`, `workitem.get('txtname')`). This module
//! detects such scripts and rewrites the deprecated accessor phrases into
//! the canonical typed accessors before compilation:
//!
//! - numeric items rewrite to `getItemValueDouble("…")`,
//! - all other item reads rewrite to `getItemValueString("…")`,
//! - bare existence checks rewrite to `hasItem("…")`.
//!
//! Item names are substituted longest-first so an item name that prefixes
//! another (`team`, `team$approvers`) resolves to the longer name first.
//! A small set of surface normalizations (`var`→`let`, `===`→`==`,
//! single-quoted strings, `{}` object literals) maps the remaining legacy
//! syntax onto the current engine dialect.

use regex::Regex;

use crate::document::ItemCollection;

/// Returns true if the script was written for the deprecated engine
/// generation and must be rewritten before evaluation.
pub fn is_deprecated_script(script: &str) -> bool {
    if script.contains("graalvm.languageId=nashorn") {
        return true;
    }
    // any other explicit language id selects the current dialect
    if script.contains("graalvm.languageId=") {
        return false;
    }

    // untyped get(...) calls are the deprecated surface
    if script.contains("workitem.get(") || script.contains("event.get(") {
        return true;
    }
    // typed getters indicate the current dialect
    if script.contains("workitem.get") || script.contains("event.get") {
        return false;
    }
    if script.contains("workitem.hasItem") || script.contains("workitem.isItem") {
        return false;
    }

    // any remaining member access on the context objects is deprecated
    if script.contains("workitem.") || script.contains("event.") {
        return true;
    }

    // bracket indexing: workitem['space.team']
    let bracket = Regex::new(r"workitem\['[._\w]+'\]").expect("static pattern");
    bracket.is_match(script)
}

/// Rewrites a deprecated script into the canonical accessor form. The
/// returned script is no longer detected by [`is_deprecated_script`].
pub fn rewrite(script: &str, workitem: &ItemCollection, event: Option<&ItemCollection>) -> String {
    let mut script = convert_context(script, workitem, "workitem");
    if let Some(event) = event {
        script = convert_context(&script, event, "event");
    }
    // an accessor rewrite may leave a dangling index on a single value
    script = script.replace(")[0]", ")");
    normalize_surface(&script)
}

fn convert_context(script: &str, document: &ItemCollection, context: &str) -> String {
    let mut script = script.to_string();

    // longer item names first, they may contain shorter ones as prefix
    let mut item_names = document.item_names();
    item_names.sort_by(|a, b| b.len().cmp(&a.len()));

    for item_name in &item_names {
        let typed_getter = if document.is_item_value_numeric(item_name) {
            "getItemValueDouble"
        } else {
            "getItemValueString"
        };

        // workitem.txtname[0]  ->  workitem.getItemValueDouble/String("txtname")
        let phrase = format!("{context}.{item_name}[0]");
        let replacement = format!("{context}.{typed_getter}(\"{item_name}\")");
        script = script.replace(&phrase, &replacement);

        // workitem['txtname'][0]  ->  same as above
        let phrase = format!("{context}['{item_name}'][0]");
        script = script.replace(&phrase, &replacement);

        // workitem.txtname  ->  workitem.hasItem("txtname")
        let phrase = format!("{context}.{item_name}");
        let replacement = format!("{context}.hasItem(\"{item_name}\")");
        script = script.replace(&phrase, &replacement);

        // workitem['txtname']  ->  workitem.hasItem("txtname")
        let phrase = format!("{context}['{item_name}']");
        script = script.replace(&phrase, &replacement);

        // workitem.get('txtname')  ->  typed accessor for the named item
        for quote in ['\'', '"'] {
            let phrase = format!("{context}.get({quote}{item_name}{quote})");
            let replacement = format!("{context}.{typed_getter}(\"{item_name}\")");
            script = script.replace(&phrase, &replacement);
        }
    }
    script
}

/// Maps the remaining legacy JavaScript surface onto the engine dialect.
fn normalize_surface(script: &str) -> String {
    let mut script = script.replace("var ", "let ");
    script = script.replace("===", "==");
    script = script.replace("!==", "!=");

    // empty object literal -> object map literal
    let empty_object = Regex::new(r"=\s*\{\s*\}").expect("static pattern");
    script = empty_object.replace_all(&script, "= #{}").to_string();

    // single-quoted string literals -> double-quoted
    let single_quoted = Regex::new(r"'([^'\n]*)'").expect("static pattern");
    script = single_quoted.replace_all(&script, "\"$1\"").to_string();

    script
}
