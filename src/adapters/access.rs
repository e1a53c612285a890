//! # Access adapter
//!
//! Recomputes `$readaccess`, `$writeaccess` and `$participants` on every
//! transition, driven by ACL annotations on the triggering event and the
//! *next* task:
//!
//! - without `keyupdateacl` on either entity the ACL stays untouched,
//! - otherwise the existing read/write lists are cleared and the
//!   annotations of exactly one entity apply — the event wins over the
//!   task, the two are never merged,
//! - `namaddreadaccess` / `namaddwriteaccess` carry literal names (each
//!   passed through text substitution, which may expand to a list),
//!   `keyaddreadfields` / `keyaddwritefields` name workitem items or
//!   bracketed inline lists,
//! - the merged lists are de-duplicated preserving first occurrence,
//!   empty entries dropped.
//!
//! `$participants` is an append-only set of the caller of every step.

use tracing::debug;

use crate::constants;
use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::PluginError;
use crate::plugins::util::{merge_field_list, merge_value_list, unique_list};

/// Appends the current caller to `$participants` if not yet present.
pub fn update_participants(workitem: &mut ItemCollection, ctx: &WorkflowContext) {
    let caller = ctx.caller_name();
    if caller.is_empty() {
        return;
    }
    let mut participants = workitem.item_string_list(constants::PARTICIPANTS);
    if !participants.iter().any(|p| p == caller) {
        participants.push(caller.to_string());
        workitem.set_item_value_list(constants::PARTICIPANTS, participants);
    }
}

/// Recomputes `$readaccess` / `$writeaccess` from the event and next-task
/// annotations. `next_task` may be absent while a follow-up event is
/// pending.
pub fn update_acl(
    workitem: &mut ItemCollection,
    event: &ItemCollection,
    next_task: Option<&ItemCollection>,
    ctx: &WorkflowContext,
) -> Result<(), PluginError> {
    let event_updates = event.item_boolean("keyupdateacl");
    let task_updates = next_task
        .map(|t| t.item_boolean("keyupdateacl"))
        .unwrap_or(false);
    if !event_updates && !task_updates {
        return Ok(());
    }

    // replace, never merge with previous state
    workitem.replace_item_value(constants::READACCESS, Vec::new());
    workitem.replace_item_value(constants::WRITEACCESS, Vec::new());

    // the event's annotations win; task annotations apply only otherwise
    let source = if event_updates {
        event
    } else {
        next_task.expect("task_updates implies next_task")
    };
    apply_entity_acl(workitem, source, ctx);
    Ok(())
}

fn apply_entity_acl(workitem: &mut ItemCollection, entity: &ItemCollection, ctx: &WorkflowContext) {
    for (target_item, names_item, fields_item) in [
        (constants::READACCESS, "namaddreadaccess", "keyaddreadfields"),
        (constants::WRITEACCESS, "namaddwriteaccess", "keyaddwritefields"),
    ] {
        let mut access = workitem.item_string_list(target_item);
        let snapshot = workitem.clone();
        merge_value_list(
            &mut access,
            &entity.item_string_list(names_item),
            &snapshot,
            ctx,
        );
        merge_field_list(&snapshot, &mut access, &entity.item_string_list(fields_item));
        let access = unique_list(access);
        debug!(item = target_item, entries = ?access, "acl updated");
        workitem.set_item_value_list(target_item, access);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelManager;
    use crate::storage::InMemoryDocumentStore;
    use std::sync::Arc;

    fn ctx() -> WorkflowContext {
        WorkflowContext::new(
            "manfred",
            Arc::new(ModelManager::new()),
            Arc::new(InMemoryDocumentStore::new()),
        )
    }

    fn entity_with_acl(names: &[&str], fields: &[&str]) -> ItemCollection {
        let mut entity = ItemCollection::new();
        entity.set_item_value("keyupdateacl", true);
        entity.set_item_value_list("namaddwriteaccess", names.to_vec());
        entity.set_item_value_list("keyaddwritefields", fields.to_vec());
        entity
    }

    #[test]
    fn untouched_without_update_flag() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list(constants::WRITEACCESS, ["kevin", "julian"]);

        let event = ItemCollection::new();
        update_acl(&mut workitem, &event, None, &ctx()).unwrap();
        assert_eq!(
            workitem.item_string_list(constants::WRITEACCESS),
            vec!["kevin", "julian"]
        );
    }

    #[test]
    fn update_replaces_instead_of_merging() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list(constants::WRITEACCESS, ["kevin", "julian"]);

        let task = entity_with_acl(&["joe", "sam"], &[]);
        let event = ItemCollection::new();
        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        assert_eq!(
            workitem.item_string_list(constants::WRITEACCESS),
            vec!["joe", "sam"]
        );
    }

    #[test]
    fn event_annotations_win_over_task() {
        let mut workitem = ItemCollection::new();

        let event = entity_with_acl(&["eve"], &[]);
        let task = entity_with_acl(&["tom"], &[]);
        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        assert_eq!(
            workitem.item_string_list(constants::WRITEACCESS),
            vec!["eve"]
        );
    }

    #[test]
    fn fields_resolve_workitem_items_and_literals() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list("namteam", ["anna", "rico"]);

        let task = entity_with_acl(&[], &["namteam", "[guest]"]);
        let event = ItemCollection::new();
        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        assert_eq!(
            workitem.item_string_list(constants::WRITEACCESS),
            vec!["anna", "rico", "guest"]
        );
    }

    #[test]
    fn names_pass_through_text_substitution() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list("namteam", ["anna", "rico"]);

        let task = entity_with_acl(&["<itemvalue>namteam</itemvalue>", "sam"], &[]);
        let event = ItemCollection::new();
        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        assert_eq!(
            workitem.item_string_list(constants::WRITEACCESS),
            vec!["anna", "rico", "sam"]
        );
    }

    #[test]
    fn resolver_is_idempotent() {
        let mut workitem = ItemCollection::new();
        workitem.set_item_value_list("namteam", ["anna"]);
        let task = entity_with_acl(&["joe"], &["namteam"]);
        let event = ItemCollection::new();

        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        let first = workitem.item_string_list(constants::WRITEACCESS);
        update_acl(&mut workitem, &event, Some(&task), &ctx()).unwrap();
        assert_eq!(workitem.item_string_list(constants::WRITEACCESS), first);
    }

    #[test]
    fn participants_append_only() {
        let mut workitem = ItemCollection::new();
        let ctx = ctx();
        update_participants(&mut workitem, &ctx);
        update_participants(&mut workitem, &ctx);
        assert_eq!(
            workitem.item_string_list(constants::PARTICIPANTS),
            vec!["manfred"]
        );
    }
}
