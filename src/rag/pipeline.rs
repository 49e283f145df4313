use tracing::{debug, info, warn};

use super::prompt::build_prompt;
use crate::lang::{self, Lang};
use crate::ollama::{Embedder, Generator, OllamaError};
use crate::store::{ScoredDocument, StoreError, VectorStore};
use crate::translate::{Translator, translate_or_original};

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("query embedding failed: {0}")]
    Embedding(#[source] OllamaError),

    #[error("embedding service returned no vector for the query")]
    EmptyEmbedding,

    #[error("retrieval failed: {0}")]
    Store(#[from] StoreError),

    #[error("answer generation failed: {0}")]
    Generation(#[source] OllamaError),
}

/// Answers medication questions from the embedded knowledge base.
///
/// Questions are answered in English internally; Bangla questions are
/// translated in and the answer translated back out.
pub struct Assistant<E, G, T> {
    embedder: E,
    generator: G,
    translator: T,
    store: VectorStore,
    k: usize,
}

impl<E, G, T> Assistant<E, G, T>
where
    E: Embedder,
    G: Generator,
    T: Translator,
{
    pub fn new(embedder: E, generator: G, translator: T, store: VectorStore, k: usize) -> Self {
        Self {
            embedder,
            generator,
            translator,
            store,
            k,
        }
    }

    pub fn documents(&self) -> usize {
        self.store.len()
    }

    #[cfg(test)]
    pub(crate) fn generator(&self) -> &G {
        &self.generator
    }

    /// Full pipeline. Never fails: every error ends in the canned apology,
    /// in the user's language.
    pub async fn answer(&self, query: &str) -> String {
        let lang = lang::detect(query);
        let query_en = translate_or_original(&self.translator, query, "auto", Lang::En.code()).await;
        debug!(%lang, query_en = %query_en, "query normalised");

        let answer_en = match self.answer_english(&query_en).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "RAG pipeline failed");
                String::new()
            }
        };

        if answer_en.is_empty() {
            return lang.not_found_message().to_string();
        }

        match lang {
            Lang::Bn => {
                translate_or_original(&self.translator, &answer_en, Lang::En.code(), Lang::Bn.code())
                    .await
            }
            Lang::En => answer_en,
        }
    }

    /// Top-k passages for an English query.
    pub async fn retrieve(&self, query_en: &str) -> Result<Vec<ScoredDocument>, RagError> {
        if self.store.is_empty() {
            warn!("vector index is empty; run the index command first");
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(&[query_en.to_string()])
            .await
            .map_err(RagError::Embedding)?
            .into_iter()
            .next()
            .ok_or(RagError::EmptyEmbedding)?;

        Ok(self.store.similarity_search(&embedding, self.k)?)
    }

    async fn answer_english(&self, query_en: &str) -> Result<String, RagError> {
        let hits = self.retrieve(query_en).await?;
        info!(
            passages = hits.len(),
            top = hits.first().map(|h| h.document.metadata.name.as_str()).unwrap_or(""),
            "retrieved context"
        );

        let passages: Vec<_> = hits.iter().map(|h| &h.document).collect();
        let prompt = build_prompt(&passages, query_en);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(RagError::Generation)?;
        Ok(answer.trim().to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockGenerator;
    use super::*;
    use crate::store::build::mock::MockEmbedder;
    use crate::store::doc;
    use crate::translate::mock::MockTranslator;

    fn store() -> VectorStore {
        let texts = [
            "napa paracetamol fever",
            "seclo omeprazole acidity",
            "histacin chlorpheniramine allergy",
        ];
        let mut store = VectorStore::new("mock-embed");
        store
            .add(
                texts.iter().map(|t| doc(t)).collect(),
                texts.iter().map(|t| MockEmbedder::vector(t)).collect(),
            )
            .unwrap();
        store
    }

    fn assistant(
        generator: MockGenerator,
        translator: MockTranslator,
        k: usize,
    ) -> Assistant<MockEmbedder, MockGenerator, MockTranslator> {
        Assistant::new(MockEmbedder::new(), generator, translator, store(), k)
    }

    #[tokio::test]
    async fn english_question_answered_without_back_translation() {
        let a = assistant(
            MockGenerator::replying("  Napa is paracetamol.  "),
            MockTranslator::working(),
            3,
        );

        let answer = a.answer("What is Napa?").await;

        assert_eq!(answer, "Napa is paracetamol.");
        let calls = a.translator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("What is Napa?".into(), "auto".into(), "en".into()));
    }

    #[tokio::test]
    async fn bangla_question_is_translated_both_ways() {
        let a = assistant(
            MockGenerator::replying("Napa is paracetamol."),
            MockTranslator::working(),
            3,
        );

        let answer = a.answer("নাপা কী?").await;

        assert_eq!(answer, "[bn] Napa is paracetamol.");
        let calls = a.translator.calls.lock().unwrap();
        assert_eq!(calls[0].2, "en");
        assert_eq!(calls[1], ("Napa is paracetamol.".into(), "en".into(), "bn".into()));

        let prompts = a.generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Question: [en] নাপা কী?"));
    }

    #[tokio::test]
    async fn translation_failure_falls_back_to_original_text() {
        let a = assistant(
            MockGenerator::replying("Napa is paracetamol."),
            MockTranslator::failing(),
            3,
        );

        let answer = a.answer("নাপা কী?").await;

        assert_eq!(answer, "Napa is paracetamol.");
        assert!(a.generator.prompts.lock().unwrap()[0].contains("Question: নাপা কী?"));
    }

    #[tokio::test]
    async fn prompt_holds_top_k_passages_best_first() {
        let a = assistant(MockGenerator::replying("ok"), MockTranslator::failing(), 2);

        a.answer("napa paracetamol").await;

        let prompts = a.generator.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(prompt.contains("napa paracetamol fever"));
        let passages = ["napa paracetamol fever", "seclo omeprazole acidity", "histacin chlorpheniramine allergy"];
        let included = passages.iter().filter(|p| prompt.contains(*p)).count();
        assert_eq!(included, 2);
        assert!(prompt.find("napa paracetamol fever").unwrap() < prompt.find("Question:").unwrap());
    }

    #[tokio::test]
    async fn empty_answer_returns_apology_in_user_language() {
        let a = assistant(MockGenerator::replying("   "), MockTranslator::working(), 3);

        assert_eq!(a.answer("What is Napa?").await, "Sorry, I couldn't find the answer.");
        assert_eq!(
            a.answer("নাপা কী?").await,
            "দুঃখিত, আমি আপনার প্রশ্নের উত্তর খুঁজে পাইনি।"
        );
    }

    #[tokio::test]
    async fn generation_failure_returns_apology() {
        let a = assistant(MockGenerator::failing(), MockTranslator::working(), 3);
        assert_eq!(a.answer("What is Napa?").await, "Sorry, I couldn't find the answer.");
    }

    #[tokio::test]
    async fn empty_index_still_asks_the_model() {
        let a = Assistant::new(
            MockEmbedder::new(),
            MockGenerator::replying("I don't know."),
            MockTranslator::failing(),
            VectorStore::new("mock-embed"),
            3,
        );

        assert!(a.retrieve("napa").await.unwrap().is_empty());
        assert_eq!(a.answer("What is Napa?").await, "I don't know.");
        assert_eq!(a.documents(), 0);
    }

    #[tokio::test]
    async fn embedding_failure_surfaces_from_retrieve() {
        let a = Assistant::new(
            MockEmbedder::failing_after(0),
            MockGenerator::replying("unused"),
            MockTranslator::failing(),
            store(),
            3,
        );
        assert!(matches!(
            a.retrieve("napa").await,
            Err(RagError::Embedding(_))
        ));
        assert_eq!(a.answer("What is Napa?").await, "Sorry, I couldn't find the answer.");
        assert!(a.generator.prompts.lock().unwrap().is_empty());
    }
}
