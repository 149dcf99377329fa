use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use retouch_contracts::events::{EventWriter, SessionEvent};
use retouch_contracts::images::{self, ImageData, ImageError};
use retouch_contracts::ledger::{
    compute_source_for_next_turn, Ledger, SessionMode, SourceError, SourcePlan, Turn,
};
use retouch_contracts::models::{Capability, ModelError, ModelRegistry};
use retouch_contracts::session::{infer_mode, Session};
use retouch_contracts::store::{FileStorage, HistoryStore};

use crate::adapter::{default_adapter_registry, AdapterRegistry, EditFailure, EditRequest};

const STORAGE_FILE: &str = "storage.json";
const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub image_model: Option<String>,
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Please provide a prompt.")]
    MissingPrompt,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("An edit is already in progress; wait for it to finish.")]
    Busy,

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no adapter registered for provider '{0}'")]
    MissingAdapter(String),

    #[error(transparent)]
    Edit(#[from] EditFailure),

    #[error("failed to write {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SubmitError {
    /// Input problems caught before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SubmitError::MissingPrompt
                | SubmitError::Source(_)
                | SubmitError::Busy
                | SubmitError::Image(ImageError::UnsupportedType(_))
        )
    }
}

/// Drives one chat session: owns the ledger, the transient session state and
/// the adapters, and threads images from turn to turn.
pub struct EditEngine {
    session_dir: PathBuf,
    events: EventWriter,
    store: HistoryStore,
    ledger: Ledger,
    session: Session,
    models: ModelRegistry,
    image_model: Option<String>,
    adapters: AdapterRegistry,
}

impl EditEngine {
    /// Opens (or creates) a session directory with file-backed history and the
    /// default adapters, restoring the previous session if there is one.
    pub fn open(
        session_dir: impl Into<PathBuf>,
        default_mode: SessionMode,
        options: EngineOptions,
    ) -> Result<Self> {
        let session_dir = absolute_dir(session_dir.into())?;
        let store = HistoryStore::new(FileStorage::new(session_dir.join(STORAGE_FILE)));
        let adapters = default_adapter_registry(options.request_timeout);
        Self::with_parts(session_dir, default_mode, store, adapters, options.image_model)
    }

    pub fn with_parts(
        session_dir: impl Into<PathBuf>,
        default_mode: SessionMode,
        store: HistoryStore,
        adapters: AdapterRegistry,
        image_model: Option<String>,
    ) -> Result<Self> {
        // Artifact paths are derived from this, so it must not depend on the
        // working directory.
        let session_dir = absolute_dir(session_dir.into())?;
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("failed to create {}", session_dir.display()))?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(session_dir.join(EVENTS_FILE), session_id);

        let mut engine = Self {
            session_dir,
            events,
            ledger: store.load(),
            store,
            session: Session::new(default_mode),
            models: ModelRegistry::default(),
            image_model,
            adapters,
        };
        engine.restore_session();
        engine.emit(SessionEvent::SessionStarted {
            session_dir: engine.session_dir.to_string_lossy().to_string(),
            mode: engine.session.mode(),
            turns: engine.ledger.len(),
        });
        Ok(engine)
    }

    fn restore_session(&mut self) {
        let Some(last) = self.ledger.last().cloned() else {
            return;
        };
        let mode = infer_mode(&last);
        self.session.set_mode(mode);
        if mode != SessionMode::Editor {
            return;
        }
        match ImageData::from_url(&last.original_url) {
            Ok(image) => self.session.attach_anchor(image, last.original_url.clone()),
            Err(err) => {
                tracing::warn!(
                    anchor = %last.original_url,
                    error = %err,
                    "failed to restore session image; starting over"
                );
                self.reset_all();
            }
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn mode(&self) -> SessionMode {
        self.session.mode()
    }

    pub fn image_model(&self) -> Option<&str> {
        self.image_model.as_deref()
    }

    pub fn set_image_model(&mut self, model: Option<String>) {
        self.image_model = model;
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Clears the session, the ledger and the persisted history, then switches
    /// to `mode`.
    pub fn start_new(&mut self, mode: SessionMode) {
        self.reset_all();
        self.session.set_mode(mode);
        self.emit(SessionEvent::SessionReset { mode });
    }

    fn reset_all(&mut self) {
        self.session.reset();
        self.ledger.clear();
        self.store.clear();
    }

    /// Sets the main image from a local path or data URL. Paths are recorded
    /// in absolute form.
    pub fn attach_anchor(&mut self, url: &str) -> Result<(), ImageError> {
        let image = ImageData::from_url(url)?;
        let url = images::absolute_url(url)?;
        self.session.attach_anchor(image, url);
        Ok(())
    }

    pub fn new_main_image(&mut self) {
        self.session.new_main_image();
    }

    /// Reads all reference images concurrently; nothing is added unless every
    /// one of them loads.
    pub fn add_references<P: AsRef<Path> + Sync>(
        &mut self,
        paths: &[P],
    ) -> Result<Vec<u64>, ImageError> {
        let loaded = images::load_all(paths)?;
        let mut entries = Vec::with_capacity(loaded.len());
        for (image, path) in loaded.into_iter().zip(paths) {
            let url = images::absolute_url(&path.as_ref().to_string_lossy())?;
            entries.push((image, url));
        }
        Ok(self.session.add_references(entries))
    }

    pub fn remove_reference(&mut self, id: u64) -> bool {
        self.session.remove_reference(id)
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.session.set_prompt(prompt);
    }

    /// Runs one turn with the pending prompt and references.
    ///
    /// On success the turn is appended and persisted and the pending input is
    /// cleared. On any failure the ledger, prompt and references are left as
    /// they were so the user can resubmit; nothing is retried.
    pub fn submit(&mut self) -> Result<Turn, SubmitError> {
        let prompt = self.session.prompt().trim().to_string();
        if prompt.is_empty() {
            return Err(SubmitError::MissingPrompt);
        }
        let plan = compute_source_for_next_turn(
            self.session.mode(),
            self.session.anchor_url(),
            self.ledger.last(),
        )?;
        if !self.session.try_begin() {
            return Err(SubmitError::Busy);
        }
        let outcome = self.run_turn(&prompt, &plan);
        self.session.finish();

        match outcome {
            Ok(turn) => Ok(turn),
            Err(err) => {
                self.emit(SessionEvent::EditFailed {
                    prompt,
                    kind: failure_kind(&err).to_string(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub fn submit_prompt(&mut self, prompt: impl Into<String>) -> Result<Turn, SubmitError> {
        self.set_prompt(prompt);
        self.submit()
    }

    fn run_turn(&mut self, prompt: &str, plan: &SourcePlan) -> Result<Turn, SubmitError> {
        let mut request_images = Vec::new();
        if let Some(source_url) = plan.source_url.as_deref() {
            request_images.push(self.load_source(source_url)?);
        }
        request_images.extend(
            self.session
                .references()
                .map(|reference| reference.image.clone()),
        );

        let capability = if request_images.is_empty() {
            Capability::Generate
        } else {
            Capability::Edit
        };
        let selection = self
            .models
            .select(self.image_model.as_deref(), capability)?;
        if let Some(requested) = selection.unavailable.as_deref() {
            tracing::warn!(
                requested,
                model = %selection.model.name,
                "requested image model unavailable; using default"
            );
        }
        let adapter = self
            .adapters
            .get(&selection.model.provider)
            .ok_or_else(|| SubmitError::MissingAdapter(selection.model.provider.clone()))?;

        let request = EditRequest {
            model: selection.model.name.clone(),
            images: request_images,
            prompt: prompt.to_string(),
        };
        tracing::info!(
            model = %request.model,
            provider = adapter.name(),
            images = request.images.len(),
            new_chain = plan.starts_chain(self.ledger.last()),
            "submitting turn"
        );
        let result = adapter.edit(&request)?;

        let id = self.ledger.next_turn_id(now_millis());
        let artifact_path = self
            .session_dir
            .join(format!("artifact-{id}.{}", result.extension()));
        std::fs::write(&artifact_path, &result.bytes).map_err(|source| SubmitError::Artifact {
            path: artifact_path.clone(),
            source,
        })?;
        let edited_url = artifact_path.to_string_lossy().to_string();

        let turn = Turn {
            id,
            original_url: plan.original_url(&edited_url),
            source_url: plan.source_url.clone(),
            prompt: prompt.to_string(),
            edited_url,
            reference_image_urls: self.session.reference_urls(),
            mode: Some(self.session.mode()),
        };
        self.ledger.append(turn.clone());
        self.store.save(&self.ledger);
        self.session.clear_pending();
        self.emit(SessionEvent::TurnCreated {
            turn_id: turn.id,
            model: request.model,
            original_url: turn.original_url.clone(),
            source_url: turn.source_url.clone(),
            edited_url: turn.edited_url.clone(),
            reference_count: turn.reference_image_urls.len(),
        });
        Ok(turn)
    }

    fn load_source(&self, url: &str) -> Result<ImageData, ImageError> {
        if let Some(anchor) = self.session.anchor() {
            if anchor.url == url {
                return Ok(anchor.image.clone());
            }
        }
        ImageData::from_url(url)
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(err) = self.events.emit(&event) {
            tracing::warn!(?event, error = %err, "failed to write event");
        }
    }
}

fn failure_kind(err: &SubmitError) -> &'static str {
    match err {
        SubmitError::Edit(EditFailure::BlockedBySafety { .. }) => "blocked_by_safety",
        SubmitError::Edit(EditFailure::BlockedByRecitation) => "blocked_by_recitation",
        SubmitError::Edit(EditFailure::EmptyResponse { .. }) => "empty_response",
        SubmitError::Edit(EditFailure::TransportError(_)) => "transport_error",
        other if other.is_validation() => "validation",
        _ => "internal",
    }
}

fn absolute_dir(dir: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&dir).with_context(|| format!("failed to resolve {}", dir.display()))
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
