use indexmap::IndexMap;

use crate::images::ImageData;
use crate::ledger::{SessionMode, Turn};

/// The main image an edit chain is anchored on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorImage {
    pub image: ImageData,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub id: u64,
    pub image: ImageData,
    pub url: String,
}

/// Transient per-session state: mode, anchor, pending prompt and references.
///
/// Nothing here is persisted; only the ledger survives a restart.
#[derive(Debug, Clone)]
pub struct Session {
    mode: SessionMode,
    anchor: Option<AnchorImage>,
    references: IndexMap<u64, ReferenceImage>,
    prompt: String,
    busy: bool,
    next_reference_id: u64,
}

impl Session {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            anchor: None,
            references: IndexMap::new(),
            prompt: String::new(),
            busy: false,
            next_reference_id: 1,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }

    pub fn anchor(&self) -> Option<&AnchorImage> {
        self.anchor.as_ref()
    }

    pub fn anchor_url(&self) -> Option<&str> {
        self.anchor.as_ref().map(|anchor| anchor.url.as_str())
    }

    pub fn attach_anchor(&mut self, image: ImageData, url: impl Into<String>) {
        self.anchor = Some(AnchorImage {
            image,
            url: url.into(),
        });
    }

    /// Drops the anchor and pending input so the next attached image starts a
    /// new chain. The ledger is untouched.
    pub fn new_main_image(&mut self) {
        self.anchor = None;
        self.clear_pending();
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_str()
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    /// Appends pending references and returns the ids assigned to them.
    pub fn add_references(&mut self, images: Vec<(ImageData, String)>) -> Vec<u64> {
        let mut ids = Vec::with_capacity(images.len());
        for (image, url) in images {
            let id = self.next_reference_id;
            self.next_reference_id += 1;
            self.references.insert(id, ReferenceImage { id, image, url });
            ids.push(id);
        }
        ids
    }

    pub fn remove_reference(&mut self, id: u64) -> bool {
        self.references.shift_remove(&id).is_some()
    }

    pub fn references(&self) -> impl Iterator<Item = &ReferenceImage> {
        self.references.values()
    }

    pub fn reference_urls(&self) -> Vec<String> {
        self.references
            .values()
            .map(|reference| reference.url.clone())
            .collect()
    }

    /// Clears prompt and references; done only after a successful turn.
    pub fn clear_pending(&mut self) {
        self.prompt.clear();
        self.references.clear();
    }

    /// Resets everything but the mode.
    pub fn reset(&mut self) {
        self.anchor = None;
        self.clear_pending();
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Marks the session busy; returns `false` when a submission is already in
    /// flight.
    pub fn try_begin(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    pub fn finish(&mut self) {
        self.busy = false;
    }
}

/// Best-effort guess of the mode a restored ledger was produced in.
///
/// An explicit `mode` on the turn wins. Older turns fall back to: generator
/// when there was no distinct source image and no references, editor
/// otherwise. The fallback cannot tell a reference-only edit chain apart.
pub fn infer_mode(last_turn: &Turn) -> SessionMode {
    if let Some(mode) = last_turn.mode {
        return mode;
    }
    let no_distinct_source = match last_turn.source_url.as_deref() {
        None => true,
        Some(source) => source == last_turn.edited_url,
    };
    if no_distinct_source && last_turn.reference_image_urls.is_empty() {
        SessionMode::Generator
    } else {
        SessionMode::Editor
    }
}
