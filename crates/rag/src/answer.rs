use crate::index::RetrievalHit;

/// Reply used whenever retrieval cannot support an answer. Guessing from
/// model memory is never acceptable for policy questions.
pub const UNGROUNDED_REPLY: &str =
    "I don't have information on that in the HR policy documents I can access. \
     Please check with your HR team directly.";

const POLICY_SYSTEM_PROMPT: &str = "You are an HR assistant. Answer the employee's question \
using ONLY the numbered policy excerpts provided. Quote figures and durations exactly as \
written. If the excerpts do not contain the answer, say you do not have that information. \
Do not invent policy details.";

/// Decides whether a retrieval result is strong enough to answer from.
#[derive(Clone, Copy, Debug)]
pub struct GroundingPolicy {
    pub threshold: f32,
    pub top_k: usize,
}

impl GroundingPolicy {
    pub fn new(threshold: f32, top_k: usize) -> Self {
        Self { threshold, top_k }
    }

    /// Grounded iff at least one hit clears the similarity threshold.
    pub fn is_grounded(&self, hits: &[RetrievalHit]) -> bool {
        hits.iter().any(|hit| hit.score >= self.threshold)
    }
}

/// System and user message pair ready for a chat-completion call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptBundle {
    pub system: String,
    pub user: String,
}

/// Build the answering prompt from the question and its retrieved context.
/// Each excerpt is numbered and labelled with its source so the model can
/// cite it and a reader can trace the answer back.
pub fn compose_policy_prompt(question: &str, hits: &[RetrievalHit]) -> PromptBundle {
    let mut context = String::new();
    for (position, hit) in hits.iter().enumerate() {
        context.push_str(&format!(
            "[{}] Source: {} (policy {}, version {})\n{}\n\n",
            position + 1,
            hit.chunk.document_id,
            hit.chunk.metadata.policy_id,
            hit.chunk.metadata.version,
            hit.chunk.text.trim(),
        ));
    }

    PromptBundle {
        system: POLICY_SYSTEM_PROMPT.to_string(),
        user: format!("Policy excerpts:\n\n{context}Question: {question}"),
    }
}

/// Markdown footer listing the distinct documents an answer drew from,
/// in retrieval order.
pub fn sources_footer(hits: &[RetrievalHit]) -> String {
    let mut seen = Vec::new();
    for hit in hits {
        if !seen.iter().any(|id: &&str| *id == hit.chunk.document_id) {
            seen.push(hit.chunk.document_id.as_str());
        }
    }
    if seen.is_empty() {
        return String::new();
    }

    let mut footer = String::from("\n\n**Sources:**\n");
    for id in seen {
        footer.push_str(&format!("- {id}\n"));
    }
    footer.trim_end().to_string()
}
