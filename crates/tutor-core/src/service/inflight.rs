//! In-flight request tracking
//!
//! Every dispatched generation is registered here until its background task
//! finishes. Entries are keyed by request id so parallel workers can remove
//! their own entry without coordinating.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::extract::GenerationMode;
use crate::llm::ModelSelector;

pub type RequestId = uuid::Uuid;

/// One outstanding background generation
#[derive(Debug)]
pub(crate) struct InFlightRequest {
    pub id: RequestId,
    pub question: String,
    pub system_prompt: Option<String>,
    pub mode: GenerationMode,
    /// Model the prompt was rendered for
    pub model: ModelSelector,
    pub started_at: DateTime<Utc>,
    handle: Option<JoinHandle<()>>,
}

impl InFlightRequest {
    pub fn new(
        id: RequestId,
        question: &str,
        system_prompt: Option<&str>,
        mode: GenerationMode,
        model: ModelSelector,
    ) -> Self {
        Self {
            id,
            question: question.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            mode,
            model,
            started_at: Utc::now(),
            handle: None,
        }
    }

    fn summary(&self) -> InFlightSummary {
        InFlightSummary {
            id: self.id,
            question: self.question.clone(),
            has_system_prompt: self.system_prompt.is_some(),
            mode: self.mode,
            model: self.model.clone(),
            started_at: self.started_at,
            elapsed_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
            running: self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(true),
        }
    }
}

/// Read-only view of an in-flight request for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightSummary {
    pub id: RequestId,
    pub question: String,
    pub has_system_prompt: bool,
    pub mode: GenerationMode,
    pub model: ModelSelector,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub running: bool,
}

#[derive(Debug, Default)]
pub(crate) struct InFlightRegistry {
    requests: DashMap<RequestId, InFlightRequest>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, request: InFlightRequest) {
        self.requests.insert(request.id, request);
    }

    /// Attach the task handle. A task that already finished has removed its
    /// entry; its handle is simply dropped.
    pub fn attach(&self, id: &RequestId, handle: JoinHandle<()>) {
        if let Some(mut entry) = self.requests.get_mut(id) {
            entry.handle = Some(handle);
        }
    }

    pub fn complete(&self, id: &RequestId) -> Option<InFlightRequest> {
        self.requests.remove(id).map(|(_, request)| request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.iter().map(|entry| *entry.key()).collect()
    }

    pub fn snapshot(&self) -> Vec<InFlightSummary> {
        let mut summaries: Vec<InFlightSummary> =
            self.requests.iter().map(|entry| entry.value().summary()).collect();
        summaries.sort_by_key(|s| s.started_at);
        summaries
    }
}
