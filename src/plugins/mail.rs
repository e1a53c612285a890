//! Mail notification plugin.
//!
//! Assembles messages from the mail annotations of the triggering event
//! (`nammailto`, `nammailcc`, `nammailbcc`, `txtmailsubject`,
//! `rtfmailbody`, `nammailreplytouser`) with subject and body run through
//! text substitution. Delivery is deferred: messages collect during `run`
//! and go out through the [`MailTransport`] collaborator in
//! `close(rollback = false)` — a rolled back step sends nothing.
//!
//! An event with `keymailinactive` set, or without recipients, produces no
//! message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::{codes, PluginError};
use crate::kernel::Plugin;
use crate::plugins::util::unique_list;

/// An assembled outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery collaborator (SMTP bridge, test recorder, …).
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), PluginError>;
}

pub struct MailPlugin {
    transport: Arc<dyn MailTransport>,
    ctx: Option<Arc<WorkflowContext>>,
    outbox: Vec<MailMessage>,
}

impl MailPlugin {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            ctx: None,
            outbox: Vec::new(),
        }
    }

    fn recipients(
        &self,
        event: &ItemCollection,
        workitem: &ItemCollection,
        item: &str,
        ctx: &WorkflowContext,
    ) -> Vec<String> {
        let mut recipients = Vec::new();
        for entry in event.item_string_list(item) {
            recipients.extend(ctx.adapt_text_list(&entry, workitem));
        }
        unique_list(recipients)
    }
}

#[async_trait]
impl Plugin for MailPlugin {
    fn name(&self) -> &str {
        "mail"
    }

    fn init(&mut self, ctx: &Arc<WorkflowContext>) -> Result<(), PluginError> {
        self.ctx = Some(ctx.clone());
        Ok(())
    }

    async fn run(
        &mut self,
        workitem: &mut ItemCollection,
        event: &ItemCollection,
    ) -> Result<(), PluginError> {
        if event.item_boolean("keymailinactive") {
            debug!("mail deactivated for this event");
            return Ok(());
        }
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| {
                PluginError::new("MailPlugin", codes::INVALID_WORKITEM, "plugin not initialized")
            })?
            .clone();

        let to = self.recipients(event, workitem, "nammailto", &ctx);
        if to.is_empty() {
            return Ok(());
        }
        let message = MailMessage {
            to,
            cc: self.recipients(event, workitem, "nammailcc", &ctx),
            bcc: self.recipients(event, workitem, "nammailbcc", &ctx),
            reply_to: event.item_string("nammailreplytouser"),
            subject: ctx.adapt_text(&event.item_string("txtmailsubject"), workitem),
            body: ctx.adapt_text(&event.item_string("rtfmailbody"), workitem),
        };
        debug!(recipients = message.to.len(), "mail message queued");
        self.outbox.push(message);
        Ok(())
    }

    async fn close(&mut self, rollback: bool) -> Result<(), PluginError> {
        let outbox = std::mem::take(&mut self.outbox);
        if rollback {
            debug!(discarded = outbox.len(), "mail delivery rolled back");
            return Ok(());
        }
        for message in outbox {
            info!(subject = %message.subject, "sending mail");
            self.transport.send(message).await?;
        }
        Ok(())
    }
}
