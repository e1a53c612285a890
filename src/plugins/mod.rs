//! Standard plugin chain.
//!
//! Hosts register the plugins they need, in the order they should run.
//! The usual chain for a document workflow is rule → owner → history →
//! result → mail, with the ACL recomputation handled by the kernel-invoked
//! access adapter.

pub mod history;
pub mod mail;
pub mod owner;
pub mod result;
pub mod rule;
pub mod util;

pub use history::HistoryPlugin;
pub use mail::{MailMessage, MailPlugin, MailTransport};
pub use owner::OwnerPlugin;
pub use result::ResultPlugin;
pub use rule::RulePlugin;
