//! Structured answer assembly
//!
//! Turns ranked retrieval results into a final answer with citations. The
//! reasoning model receives the question and the evidence as a JSON payload
//! and is asked for a JSON reply; a reply that fails to parse degrades to a
//! plain-text answer instead of erroring.

use crate::error::Result;
use crate::providers::Reasoner;
use crate::retrieval::{RetrievalOutput, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You answer questions about videos using the provided evidence. \
Cite only facts supported by the evidence segments. Respond with a JSON object: \
{\"answer\": string, \"follow_up_questions\": [string]}. No other text.";

/// Final answer returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Segments the answer is grounded in, best first
    pub supporting_segments: Vec<RetrievalResult>,
    pub follow_up_questions: Vec<String>,
    pub metadata: AnswerMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub video_id: Option<String>,
    /// RFC 3339 timestamp of when the answer was assembled
    pub processing_timestamp: String,
}

/// Shape the reasoner is asked to reply in
#[derive(Deserialize)]
struct ReasonerReply {
    answer: String,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

/// Assembles answers from retrieval output via a reasoning model
pub struct AnswerGenerator {
    reasoner: Arc<dyn Reasoner>,
}

impl AnswerGenerator {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    /// Answer one question from ranked retrieval results.
    ///
    /// Empty results short-circuit to a canned reply without a model call.
    pub async fn answer(
        &self,
        question: &str,
        retrieval: &RetrievalOutput,
        video_id: Option<&str>,
    ) -> Result<Answer> {
        let metadata = AnswerMetadata {
            video_id: video_id.map(String::from),
            processing_timestamp: chrono::Utc::now().to_rfc3339(),
        };

        if retrieval.results.is_empty() {
            return Ok(Answer {
                answer: "I couldn't find any relevant content in this video for that question."
                    .to_string(),
                supporting_segments: Vec::new(),
                follow_up_questions: Vec::new(),
                metadata,
            });
        }

        let payload = serde_json::json!({
            "question": question,
            "evidence": retrieval.results.iter().map(|r| {
                serde_json::json!({
                    "segment_id": r.segment_id,
                    "start": r.start,
                    "end": r.end,
                    "confidence": r.confidence,
                    "text": r.evidence,
                })
            }).collect::<Vec<_>>(),
        });

        let raw = self
            .reasoner
            .complete(SYSTEM_PROMPT, &payload.to_string())
            .await?;

        let (answer, follow_up_questions) = match parse_reply(&raw) {
            Some(reply) => (reply.answer, reply.follow_up_questions),
            None => {
                log::warn!("Reasoner reply was not valid JSON, using raw text");
                (raw.trim().to_string(), Vec::new())
            }
        };

        Ok(Answer {
            answer,
            supporting_segments: retrieval.results.clone(),
            follow_up_questions,
            metadata,
        })
    }
}

/// Parse the reasoner's JSON reply, tolerating markdown code fences.
fn parse_reply(raw: &str) -> Option<ReasonerReply> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).ok()
}
