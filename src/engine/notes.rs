use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::Note;
use super::NoteStoreError;

/// Where a client's prior session notes come from.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Notes for `client_id`, most recent first.
    ///
    /// With explicit `note_ids` only those notes are returned and `limit` is
    /// not applied; otherwise at most `limit` of the latest notes.
    async fn fetch_notes(
        &self,
        client_id: &str,
        note_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<Note>, NoteStoreError>;
}

/// Process-local note store, for tests and for callers that already hold
/// their notes in memory.
#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    notes: RwLock<HashMap<String, Vec<Note>>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_note(&self, client_id: &str, note: Note) {
        let mut notes = self.notes.write().await;
        notes.entry(client_id.to_string()).or_default().push(note);
    }

    pub async fn note_count(&self, client_id: &str) -> usize {
        self.notes.read().await.get(client_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn fetch_notes(
        &self,
        client_id: &str,
        note_ids: Option<&[String]>,
        limit: usize,
    ) -> Result<Vec<Note>, NoteStoreError> {
        let all = self.notes.read().await;
        let client_notes = all
            .get(client_id)
            .ok_or_else(|| NoteStoreError::UnknownClient(client_id.to_string()))?;

        let mut selected: Vec<Note> = match note_ids {
            Some(ids) => client_notes
                .iter()
                .filter(|n| ids.contains(&n.id))
                .cloned()
                .collect(),
            None => client_notes.clone(),
        };
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if note_ids.is_none() {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}
