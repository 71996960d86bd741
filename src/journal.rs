//! Journal entries as a [`ResourceStore`] collection.

use crate::models::{JournalEntry, JournalEntryDraft, JournalEntryPatch};
use crate::store::{Editable, Resource, ResourceStore};

pub type JournalStore = ResourceStore<JournalEntry>;

pub const MOOD_MIN: u8 = 1;
pub const MOOD_MAX: u8 = 10;

impl Resource for JournalEntry {
    type Draft = JournalEntryDraft;
    const KIND: &'static str = "journal_entry";

    fn id(&self) -> &str {
        &self.id
    }

    fn list_path() -> &'static str {
        "/journal/"
    }

    fn create_path() -> &'static str {
        "/journal/"
    }

    /// Title, content, or any tag contains the needle.
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }

    fn validate_draft(draft: &JournalEntryDraft) -> Result<(), String> {
        if draft.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if draft.content.trim().is_empty() {
            return Err("Content is required".to_string());
        }
        validate_mood(draft.mood_rating)
    }
}

impl Editable for JournalEntry {
    type Patch = JournalEntryPatch;

    fn item_path(id: &str) -> String {
        format!("/journal/{}", id)
    }

    fn validate_patch(patch: &JournalEntryPatch) -> Result<(), String> {
        if matches!(&patch.title, Some(t) if t.trim().is_empty()) {
            return Err("Title cannot be empty".to_string());
        }
        if matches!(&patch.content, Some(c) if c.trim().is_empty()) {
            return Err("Content cannot be empty".to_string());
        }
        validate_mood(patch.mood_rating)
    }
}

fn validate_mood(mood: Option<u8>) -> Result<(), String> {
    match mood {
        Some(m) if !(MOOD_MIN..=MOOD_MAX).contains(&m) => Err(format!(
            "Mood rating must be between {} and {}, got {}",
            MOOD_MIN, MOOD_MAX, m
        )),
        _ => Ok(()),
    }
}

impl JournalEntryDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            mood_rating: None,
            tags: Vec::new(),
        }
    }

    pub fn with_mood(mut self, mood: u8) -> Self {
        self.mood_rating = Some(mood);
        self
    }

    /// Prefill a draft for editing an existing entry.
    pub fn from_entry(entry: &JournalEntry) -> Self {
        Self {
            title: entry.title.clone(),
            content: entry.content.clone(),
            mood_rating: entry.mood_rating,
            tags: entry.tags.clone(),
        }
    }

    /// Append a tag unless it is blank or already present (exact match).
    /// Returns whether the tag was added.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }
}

impl JournalEntryPatch {
    /// A patch that overwrites every editable field with the draft's values.
    pub fn from_draft(draft: &JournalEntryDraft) -> Self {
        Self {
            title: Some(draft.title.clone()),
            content: Some(draft.content.clone()),
            mood_rating: draft.mood_rating,
            tags: Some(draft.tags.clone()),
        }
    }
}

/// Average of the mood ratings that are present; `None` when there are none.
pub fn mood_average(entries: &[JournalEntry]) -> Option<f64> {
    let moods: Vec<f64> = entries
        .iter()
        .filter_map(|e| e.mood_rating)
        .map(f64::from)
        .collect();
    if moods.is_empty() {
        return None;
    }
    Some(moods.iter().sum::<f64>() / moods.len() as f64)
}
