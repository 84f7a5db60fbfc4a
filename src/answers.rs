//! Answer archive
//!
//! Embeds interview answers and conversation summaries and files them in a
//! [`VectorStore`] with the bookkeeping fields later searches rely on.

use crate::embedding::Embedder;
use crate::error::{Result, VaultError};
use crate::vector::{Metadata, SearchResult, VectorStore};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const CONVERSATION_TYPE: &str = "hotel_preference_interview";

/// One archived answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedAnswer {
    pub text: String,
    pub vector_id: String,
}

pub struct AnswerArchive<E: Embedder> {
    store: VectorStore,
    embedder: E,
}

impl<E: Embedder> AnswerArchive<E> {
    pub fn new(store: VectorStore, embedder: E) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(VaultError::Configuration(format!(
                "embedder produces {}-dimensional vectors but the store expects {}",
                embedder.dimension(),
                store.dimension()
            )));
        }
        Ok(Self { store, embedder })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn into_store(self) -> VectorStore {
        self.store
    }

    /// Embed an answer and archive it under `question_id`.
    pub fn store_answer(&mut self, question_id: &str, answer: &str) -> Result<String> {
        self.store_answer_with(question_id, answer, Metadata::new())
    }

    /// Like [`store_answer`](Self::store_answer), with extra caller fields.
    /// `question_id` and `timestamp` always win over same-named extras.
    pub fn store_answer_with(
        &mut self,
        question_id: &str,
        answer: &str,
        mut extra: Metadata,
    ) -> Result<String> {
        let vector = self.embedder.embed(answer)?;

        extra.insert("question_id".to_string(), Value::from(question_id));
        extra.insert("timestamp".to_string(), Value::from(now_rfc3339()));

        let id = self.store.store(&vector, Some(extra))?;
        debug!("Archived answer to {} as {}", question_id, id);
        Ok(id)
    }

    /// Archive every collected answer, keyed by question id.
    ///
    /// Stops at the first failure; answers archived before it stay stored.
    pub fn archive_preferences(
        &mut self,
        preferences: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, ArchivedAnswer>> {
        let mut archived = BTreeMap::new();

        for (question_id, answer) in preferences {
            let vector_id = self.store_answer(question_id, answer)?;
            archived.insert(
                question_id.clone(),
                ArchivedAnswer {
                    text: answer.clone(),
                    vector_id,
                },
            );
        }

        info!("Archived {} answers", archived.len());
        Ok(archived)
    }

    /// Archive a whole-conversation summary for later similarity lookups.
    pub fn archive_conversation(
        &mut self,
        session_id: &str,
        summary: &str,
        mut extra: Metadata,
    ) -> Result<String> {
        let vector = self.embedder.embed(summary)?;

        extra.insert("session_id".to_string(), Value::from(session_id));
        extra.insert(
            "conversation_type".to_string(),
            Value::from(CONVERSATION_TYPE),
        );
        extra.insert("timestamp".to_string(), Value::from(now_rfc3339()));

        let id = self.store.store(&vector, Some(extra))?;
        info!("Archived conversation {} as {}", session_id, id);
        Ok(id)
    }

    pub fn similar_answers(&self, text: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let query = self.embedder.embed(text)?;
        self.store.search(&query, top_k)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VectorConfig;
    use crate::embedding::HashEmbedder;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn archive(dir: &TempDir) -> AnswerArchive<HashEmbedder> {
        let store = VectorStore::open(&VectorConfig::new(128, dir.path())).unwrap();
        AnswerArchive::new(store, HashEmbedder::new(128).unwrap()).unwrap()
    }

    #[test]
    fn test_dimension_must_match() {
        let dir = tempdir().unwrap();
        let store = VectorStore::open(&VectorConfig::new(128, dir.path())).unwrap();
        assert!(matches!(
            AnswerArchive::new(store, HashEmbedder::new(64).unwrap()),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn test_store_answer_records_question_and_timestamp() {
        let dir = tempdir().unwrap();
        let mut archive = archive(&dir);

        let id = archive
            .store_answer("destination", "Lisbon, close to the old town")
            .unwrap();
        let metadata = archive.store().get(&id).unwrap();

        assert_eq!(metadata["question_id"], "destination");
        let timestamp = metadata["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_extra_fields_cannot_override_question_id() {
        let dir = tempdir().unwrap();
        let mut archive = archive(&dir);

        let extra = json!({"question_id": "spoofed", "attempt": 2})
            .as_object()
            .cloned()
            .unwrap();
        let id = archive.store_answer_with("budget", "about 200 a night", extra).unwrap();
        let metadata = archive.store().get(&id).unwrap();

        assert_eq!(metadata["question_id"], "budget");
        assert_eq!(metadata["attempt"], 2);
    }

    #[test]
    fn test_archive_preferences_and_search() {
        let dir = tempdir().unwrap();
        let mut archive = archive(&dir);

        let preferences: BTreeMap<String, String> = [
            ("amenities", "pool and spa with a gym"),
            ("budget", "mid range, under 250 dollars"),
            ("destination", "Kyoto near the temples"),
        ]
        .into_iter()
        .map(|(q, a)| (q.to_string(), a.to_string()))
        .collect();

        let archived = archive.archive_preferences(&preferences).unwrap();
        assert_eq!(archived.len(), 3);
        assert_eq!(archived["budget"].text, "mid range, under 250 dollars");
        assert_eq!(archive.store().len(), 3);

        let hits = archive.similar_answers("a hotel with a pool and spa", 1).unwrap();
        assert_eq!(hits[0].id, archived["amenities"].vector_id);
        assert_eq!(hits[0].metadata["question_id"], "amenities");
    }

    #[test]
    fn test_archive_preferences_stops_on_first_failure() {
        let dir = tempdir().unwrap();
        let mut archive = archive(&dir);

        let preferences: BTreeMap<String, String> = [("a_first", "fine answer"), ("b_second", "!!!")]
            .into_iter()
            .map(|(q, a)| (q.to_string(), a.to_string()))
            .collect();

        assert!(matches!(
            archive.archive_preferences(&preferences),
            Err(VaultError::InvalidVector(_))
        ));
        assert_eq!(archive.store().len(), 1);
    }

    #[test]
    fn test_archive_conversation_metadata() {
        let dir = tempdir().unwrap();
        let mut archive = archive(&dir);

        let extra = json!({"destination": "Kyoto", "budget": null})
            .as_object()
            .cloned()
            .unwrap();
        let id = archive
            .archive_conversation("session-42", "Trip to Kyoto, quiet ryokan", extra)
            .unwrap();

        let store = archive.into_store();
        let metadata = store.get(&id).unwrap();
        assert_eq!(metadata["session_id"], "session-42");
        assert_eq!(metadata["conversation_type"], CONVERSATION_TYPE);
        assert_eq!(metadata["destination"], "Kyoto");
        assert!(metadata["budget"].is_null());
    }
}
