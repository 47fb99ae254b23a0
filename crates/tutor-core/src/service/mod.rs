//! Answer service - gate, dispatch, extract, deliver
//!
//! `ask` never blocks its caller. Gated questions are answered inline; every
//! other question becomes a background task that waits for a generation
//! permit, runs the backend on a blocking thread and delivers exactly one
//! `Answered` or `Failed` event.
//!
//! Model reloads take the backend write lock, so they wait for running
//! generations and hold back new ones until the swap is done. A request keeps
//! the prompt it was given at dispatch time.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::error::{Result, TutorError};
use crate::extract::{postprocess, GenerationMode};
use crate::guard::Gate;
use crate::llm::{ModelSelector, TextGenerator};
use crate::prompt::build_prompt;

mod inflight;

use inflight::{InFlightRegistry, InFlightRequest};
pub use inflight::{InFlightSummary, RequestId};

type SharedBackend = Arc<RwLock<Box<dyn TextGenerator>>>;

/// Notification delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerEvent {
    Answered { id: RequestId, text: String },
    Failed { id: RequestId, error: String },
}

impl AnswerEvent {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Answered { id, .. } | Self::Failed { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub request_id: RequestId,
    pub text: String,
    /// Canned gating reply, the model was never called
    pub gated: bool,
}

/// Future-style handle for a single request
#[derive(Debug)]
pub struct AnswerHandle {
    id: RequestId,
    gated: bool,
    receiver: oneshot::Receiver<Result<GeneratedAnswer>>,
}

impl AnswerHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_gated(&self) -> bool {
        self.gated
    }

    pub async fn answer(self) -> Result<GeneratedAnswer> {
        self.receiver.await.map_err(|_| {
            TutorError::Generation("Answer channel closed before delivery".to_string())
        })?
    }
}

#[derive(Clone, Default)]
struct Notifier {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<AnswerEvent>>>>,
}

impl Notifier {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<AnswerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    fn send(&self, event: AnswerEvent) {
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

pub struct AnswerService {
    gate: Arc<dyn Gate>,
    backend: SharedBackend,
    /// Selector used to render new prompts; updated only after a reload succeeds
    active_model: Arc<RwLock<ModelSelector>>,
    in_flight: Arc<InFlightRegistry>,
    permits: Arc<Semaphore>,
    notifier: Notifier,
    runtime: Handle,
}

impl AnswerService {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        gate: Arc<dyn Gate>,
        backend: Box<dyn TextGenerator>,
        config: &crate::config::ServiceConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| TutorError::Config("AnswerService needs a Tokio runtime".to_string()))?;
        Ok(Self::with_runtime(gate, backend, config, runtime))
    }

    pub fn with_runtime(
        gate: Arc<dyn Gate>,
        backend: Box<dyn TextGenerator>,
        config: &crate::config::ServiceConfig,
        runtime: Handle,
    ) -> Self {
        let permits = if backend.supports_concurrent() {
            config.max_concurrent_generations.max(1)
        } else {
            1
        };
        let active_model = backend.selector().clone();

        tracing::info!(
            gate = gate.name(),
            model = %active_model,
            permits,
            "Answer service ready"
        );

        Self {
            gate,
            backend: Arc::new(RwLock::new(backend)),
            active_model: Arc::new(RwLock::new(active_model)),
            in_flight: Arc::new(InFlightRegistry::new()),
            permits: Arc::new(Semaphore::new(permits)),
            notifier: Notifier::default(),
            runtime,
        }
    }

    /// Receive every `Answered` / `Failed` event from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AnswerEvent> {
        self.notifier.subscribe()
    }

    pub fn ask(
        &self,
        question: &str,
        system_prompt: Option<&str>,
        mode: GenerationMode,
    ) -> AnswerHandle {
        let id = RequestId::new_v4();
        let (reply, receiver) = oneshot::channel();

        if let Some(canned) = self.gate.pregate(question) {
            tracing::debug!(request_id = %id, gate = self.gate.name(), "Question blocked before generation");
            self.notifier.send(AnswerEvent::Answered {
                id,
                text: canned.to_string(),
            });
            let _ = reply.send(Ok(GeneratedAnswer {
                request_id: id,
                text: canned.to_string(),
                gated: true,
            }));
            return AnswerHandle {
                id,
                gated: true,
                receiver,
            };
        }

        let model = self.active_model.read().clone();
        let prompt = build_prompt(question, system_prompt, &model);
        self.in_flight.start(InFlightRequest::new(
            id,
            question,
            system_prompt,
            mode,
            model.clone(),
        ));

        let task = GenerationTask {
            id,
            prompt,
            mode,
            backend: Arc::clone(&self.backend),
            permits: Arc::clone(&self.permits),
            in_flight: Arc::clone(&self.in_flight),
            notifier: self.notifier.clone(),
            reply,
        };
        let handle = self.runtime.spawn(task.run());
        self.in_flight.attach(&id, handle);

        tracing::debug!(request_id = %id, model = %model, mode = ?mode, "Generation dispatched");
        AnswerHandle {
            id,
            gated: false,
            receiver,
        }
    }

    /// Entry point for loosely typed UI payloads: either a bare string or an
    /// object with `question`, optional `system_prompt` and `mode`. Anything
    /// else is ignored.
    pub fn ask_payload(&self, payload: &JsonValue) -> Option<AnswerHandle> {
        let (question, system_prompt, mode) = match payload {
            JsonValue::String(question) => (question.as_str(), None, GenerationMode::Default),
            JsonValue::Object(fields) => {
                let Some(question) = fields.get("question").and_then(JsonValue::as_str) else {
                    tracing::debug!("Ignoring payload without a text question");
                    return None;
                };
                let system_prompt = fields.get("system_prompt").and_then(JsonValue::as_str);
                let mode = fields
                    .get("mode")
                    .and_then(JsonValue::as_str)
                    .map(|m| m.parse().unwrap_or_default())
                    .unwrap_or_default();
                (question, system_prompt, mode)
            }
            _ => {
                tracing::debug!("Ignoring non-text payload");
                return None;
            }
        };
        Some(self.ask(question, system_prompt, mode))
    }

    /// Reload the backend with another model. Heavy: runs on a blocking
    /// thread under the backend write lock. On error nothing changes.
    pub async fn set_model(&self, selector: ModelSelector) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let active_model = Arc::clone(&self.active_model);
        let requested = selector.clone();
        self.runtime
            .spawn_blocking(move || {
                let mut backend = backend.write();
                backend.set_model(requested)?;
                // Published before the write guard drops, so reloads apply in lock order
                *active_model.write() = backend.selector().clone();
                Ok::<_, TutorError>(())
            })
            .await
            .map_err(|e| TutorError::Config(format!("Model reload task panicked: {e}")))??;

        tracing::info!(model = %selector, "Active model set");
        Ok(())
    }

    pub fn active_model(&self) -> ModelSelector {
        self.active_model.read().clone()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_ids(&self) -> Vec<RequestId> {
        self.in_flight.ids()
    }

    pub fn in_flight(&self) -> Vec<InFlightSummary> {
        self.in_flight.snapshot()
    }
}

/// Background unit of work for one dispatched request
struct GenerationTask {
    id: RequestId,
    prompt: String,
    mode: GenerationMode,
    backend: SharedBackend,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlightRegistry>,
    notifier: Notifier,
    reply: oneshot::Sender<Result<GeneratedAnswer>>,
}

impl GenerationTask {
    async fn run(self) {
        let outcome = self.generate().await;

        // Deregister before delivering so observers never see a finished request
        self.in_flight.complete(&self.id);

        match outcome {
            Ok(text) => {
                tracing::debug!(request_id = %self.id, chars = text.len(), "Generation complete");
                self.notifier.send(AnswerEvent::Answered {
                    id: self.id,
                    text: text.clone(),
                });
                let _ = self.reply.send(Ok(GeneratedAnswer {
                    request_id: self.id,
                    text,
                    gated: false,
                }));
            }
            Err(err) => {
                tracing::error!(request_id = %self.id, error = %err, "Generation failed");
                self.notifier.send(AnswerEvent::Failed {
                    id: self.id,
                    error: err.to_string(),
                });
                let _ = self.reply.send(Err(err));
            }
        }
    }

    async fn generate(&self) -> Result<String> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(TutorError::generation)?;

        let backend = Arc::clone(&self.backend);
        let prompt = self.prompt.clone();
        let raw = tokio::task::spawn_blocking(move || backend.read().generate(&prompt))
            .await
            .map_err(|e| TutorError::Generation(format!("Generation task panicked: {e}")))??;

        Ok(postprocess(&raw, self.mode))
    }
}
