//! Prompt submission: correlate through the session cookie, then relay.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::cookie::{CookieStore, PromptCookie};
use crate::dispatcher::WebhookDispatcher;
use crate::error::DispatchError;
use crate::types::{DispatchOptions, DispatchResult};

pub const PROMPT_SUBMITTED_EVENT: &str = "prompt.submitted";

/// What happened to a submitted prompt.
#[derive(Debug)]
pub struct PromptSubmission {
    pub prompt_id: String,
    /// A new prompt id was minted because no valid cookie was present.
    pub is_new_session: bool,
    pub delivery: Result<DispatchResult, DispatchError>,
}

impl PromptSubmission {
    pub fn delivered(&self) -> bool {
        self.delivery.is_ok()
    }
}

pub struct PromptRelay {
    cookie: PromptCookie,
    dispatcher: WebhookDispatcher,
    options: DispatchOptions,
}

impl PromptRelay {
    pub fn new(cookie: PromptCookie, dispatcher: WebhookDispatcher) -> Self {
        Self {
            cookie,
            dispatcher,
            options: DispatchOptions::new(PROMPT_SUBMITTED_EVENT),
        }
    }

    /// Override retry settings and provider for relayed prompts. The event
    /// type and reference id are set per submission.
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Relay a prompt to the automation engine.
    ///
    /// Delivery failures do not fail the submission; they are logged and
    /// returned in [`PromptSubmission::delivery`] so the caller can proceed
    /// without automation.
    pub async fn submit_prompt<S: CookieStore + ?Sized>(
        &self,
        store: &mut S,
        prompt: &str,
        metadata: Value,
    ) -> PromptSubmission {
        let (prompt_id, is_new_session) = match self.cookie.read(store) {
            Some(id) => (id, false),
            None => {
                let id = Uuid::new_v4().to_string();
                self.cookie.set(store, &id);
                (id, true)
            }
        };

        let payload = json!({
            "promptId": prompt_id,
            "prompt": prompt,
            "metadata": metadata,
        });
        let options = self
            .options
            .clone()
            .with_reference_id(prompt_id.clone());

        let delivery = self.dispatcher.dispatch(&payload, &options).await;
        match &delivery {
            Ok(result) => tracing::info!(
                prompt_id = %prompt_id,
                attempt = result.attempt,
                "prompt relayed"
            ),
            Err(err) => tracing::warn!(
                prompt_id = %prompt_id,
                error = %err,
                "prompt relay failed, continuing without automation"
            ),
        }

        PromptSubmission {
            prompt_id,
            is_new_session,
            delivery,
        }
    }
}
