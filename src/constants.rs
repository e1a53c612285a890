//! Reserved item names and lifecycle constants.
//!
//! Items prefixed with `$` are controlled by the engine; applications read
//! them but should mutate them only through the kernel or the plugins.

/// Unique id of a workitem, assigned on first processing.
pub const UNIQUEID: &str = "$uniqueid";
/// Version string (or regex pattern) selecting the BPMN model.
pub const MODELVERSION: &str = "$modelversion";
/// Current task id of the workitem.
pub const TASKID: &str = "$taskid";
/// Triggering event id; cleared to 0 after a committed transition.
pub const EVENTID: &str = "$eventid";
/// Queue of pending follow-up event ids.
pub const ACTIVITYIDLIST: &str = "$activityidlist";
/// List of processed event ids, in processing order.
pub const EVENTLOG: &str = "$eventlog";

pub const WORKFLOWGROUP: &str = "$workflowgroup";
pub const WORKFLOWSTATUS: &str = "$workflowstatus";

pub const READACCESS: &str = "$readaccess";
pub const WRITEACCESS: &str = "$writeaccess";
pub const OWNER: &str = "$owner";
pub const PARTICIPANTS: &str = "$participants";

pub const CREATOR: &str = "$creator";
pub const CREATED: &str = "$created";
pub const MODIFIED: &str = "$modified";
pub const LASTEVENTDATE: &str = "$lasteventdate";
pub const LASTEVENTID: &str = "$lasteventid";
pub const LASTTASK: &str = "$lasttask";

/// File attachment container, see `document::files`.
pub const FILE: &str = "$file";
pub const FILE_COUNT: &str = "$file.count";
pub const FILE_NAMES: &str = "$file.names";

/// Deprecated alias pairs, mirror-written for one major version.
/// Each entry is `(deprecated, canonical)`.
pub const DEPRECATED_ALIASES: &[(&str, &str)] = &[
    ("$processid", TASKID),
    ("$activityid", EVENTID),
    ("txtname", "name"),
    ("namowner", OWNER),
];

/// Lifecycle event published before the plugin chain runs.
pub const BEFORE_PROCESS: &str = "BEFORE_PROCESS";
/// Lifecycle event published after the transition committed, per workitem.
pub const AFTER_PROCESS: &str = "AFTER_PROCESS";

/// Document type of scheduler configurations.
pub const DOCUMENT_TYPE_SCHEDULER: &str = "scheduler";
/// Document type of adminp job descriptions.
pub const DOCUMENT_TYPE_ADMINP: &str = "adminp";

/// Scheduler configuration items.
pub const ITEM_SCHEDULER_DEFINITION: &str = "_scheduler_definition";
pub const ITEM_SCHEDULER_ENABLED: &str = "_scheduler_enabled";
pub const ITEM_SCHEDULER_CLASS: &str = "_scheduler_class";
pub const ITEM_SCHEDULER_LOG: &str = "_scheduler_log";
pub const ITEM_SCHEDULER_STATUS: &str = "_scheduler_status";
pub const ITEM_SCHEDULER_ERROR: &str = "_scheduler_error";
pub const ITEM_NEXT_TIMEOUT: &str = "nexttimeout";
pub const ITEM_TIME_REMAINING: &str = "timeremaining";

/// Returns the canonical partner of a deprecated item name, or the
/// deprecated partner of a canonical name, if the name participates in an
/// alias pair.
pub fn alias_partner(name: &str) -> Option<&'static str> {
    for (deprecated, canonical) in DEPRECATED_ALIASES {
        if name == *deprecated {
            return Some(canonical);
        }
        if name == *canonical {
            return Some(deprecated);
        }
    }
    None
}
