//! Composite relevance scoring (spec §4.6.5, §4.6.6)
//!
//! Pure functions over a candidate's fields plus the query context.
//! Kept free of I/O so the retrieval pipeline and tests can call them
//! directly without a database.

use crate::model::Memory;

/// Emotional tone buckets used by the fixed lexicon (spec §9: "treat
/// them as configuration"). A swappable static table rather than
/// branching logic — callers needing a different lexicon build their
/// own `EmotionalLexicon` and pass it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

/// Word lists backing tone classification. `default()` carries the
/// pack's English word set; swappable per spec §9's open question.
pub struct EmotionalLexicon {
    positive: &'static [&'static str],
    negative: &'static [&'static str],
}

impl Default for EmotionalLexicon {
    fn default() -> Self {
        Self {
            positive: &[
                "happy", "glad", "love", "great", "excited", "wonderful", "joy", "thank",
                "thanks", "good", "amazing", "grateful", "hope", "excellent",
            ],
            negative: &[
                "sad", "angry", "hate", "terrible", "awful", "worried", "anxious", "fear",
                "bad", "upset", "frustrated", "disappointed", "hurt", "scared",
            ],
        }
    }
}

impl EmotionalLexicon {
    pub fn classify(&self, text: &str) -> Tone {
        let lower = text.to_lowercase();
        let has_positive = self.positive.iter().any(|w| lower.contains(w));
        let has_negative = self.negative.iter().any(|w| lower.contains(w));
        match (has_positive, has_negative) {
            (true, false) => Tone::Positive,
            (false, true) => Tone::Negative,
            _ => Tone::Neutral,
        }
    }

    /// `1.0` same tone, `0.0` opposite tone, `0.5` otherwise (spec §4.6.5).
    pub fn alignment(&self, query: &str, candidate: &str) -> f32 {
        match (self.classify(query), self.classify(candidate)) {
            (Tone::Positive, Tone::Positive) | (Tone::Negative, Tone::Negative) => 1.0,
            (Tone::Positive, Tone::Negative) | (Tone::Negative, Tone::Positive) => 0.0,
            _ => 0.5,
        }
    }
}

/// Step function of age in days (spec §4.6.5).
pub fn temporal_relevance(age_days: f64) -> f32 {
    if age_days <= 1.0 {
        1.0
    } else if age_days <= 7.0 {
        0.8
    } else if age_days <= 30.0 {
        0.6
    } else if age_days <= 90.0 {
        0.4
    } else {
        0.2
    }
}

/// Recognized "entity" heuristic: a capitalized token, or the literal
/// word "name", that doesn't itself end in `?` — a cheap stand-in for
/// named-entity recognition matching the spec's example ("a name").
fn contains_entity(text: &str) -> bool {
    text.split_whitespace().any(|tok| {
        let trimmed = tok.trim_matches(|c: char| !c.is_alphanumeric());
        if trimmed.is_empty() || trimmed.ends_with('?') {
            return false;
        }
        trimmed.eq_ignore_ascii_case("name")
            || trimmed.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
    })
}

/// `+0.5` when the query is a question and the candidate contains a
/// recognized entity that doesn't itself end in `?` (spec §4.6.5).
pub fn answer_boost(query: &str, candidate_content: &str) -> f32 {
    let is_question = query.trim_end().ends_with('?')
        || query.to_lowercase().starts_with("what")
        || query.to_lowercase().starts_with("who")
        || query.to_lowercase().starts_with("how")
        || query.to_lowercase().starts_with("when")
        || query.to_lowercase().starts_with("where");

    if is_question && contains_entity(candidate_content) {
        0.5
    } else {
        0.0
    }
}

/// Inputs to the composite score that aren't already on [`Memory`].
pub struct ScoringContext<'a> {
    pub query: &'a str,
    pub content_similarity: f32,
    pub is_best_cluster_member: bool,
    pub now_secs: i64,
    pub lexicon: &'a EmotionalLexicon,
}

/// The weighted composite defined in spec §4.6.5, applied after the
/// ×2.0 cluster-bias multiplier from step 4.
pub fn composite_score(memory: &Memory, ctx: &ScoringContext) -> f32 {
    let emotional_alignment = ctx.lexicon.alignment(ctx.query, &memory.content);
    let age_days = ((ctx.now_secs - memory.created_at).max(0) as f64) / 86_400.0;
    let temporal = temporal_relevance(age_days);
    let access_term = ((memory.access_frequency as f32) + 1.0).log10();
    let boost = answer_boost(ctx.query, &memory.content);

    let mut content_similarity = ctx.content_similarity;
    if ctx.is_best_cluster_member {
        content_similarity *= 2.0;
    }

    let raw = content_similarity * 0.35
        + emotional_alignment * 0.20
        + temporal * 0.20
        + memory.importance_score * 0.15
        + access_term * 0.10
        + boost;

    raw * memory.decay_factor
}

/// `composite > relevance_threshold` OR `importance_score >=
/// high_importance_bypass` (spec §4.6.6).
pub fn passes_relevance_gate(
    composite: f32,
    importance_score: f32,
    relevance_threshold: f32,
    high_importance_bypass: f32,
) -> bool {
    composite > relevance_threshold || importance_score >= high_importance_bypass
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(importance: f32, decay: f32, access_frequency: u64, created_at: i64) -> Memory {
        Memory {
            id: "m1".into(),
            user_id: "u1".into(),
            character_id: None,
            conversation_id: None,
            content: "my name is Layne".into(),
            content_hash: "h".into(),
            embedding: vec![0.0; 768],
            importance_score: importance,
            emotional_weight: 0.0,
            decay_factor: decay,
            access_frequency,
            semantic_cluster_id: None,
            memory_type: crate::model::MemoryType::Fact,
            cross_character_shared: false,
            created_at,
            updated_at: created_at,
            last_accessed: created_at,
            encryption_metadata: None,
        }
    }

    #[test]
    fn temporal_relevance_step_function() {
        assert_eq!(temporal_relevance(0.5), 1.0);
        assert_eq!(temporal_relevance(3.0), 0.8);
        assert_eq!(temporal_relevance(20.0), 0.6);
        assert_eq!(temporal_relevance(60.0), 0.4);
        assert_eq!(temporal_relevance(200.0), 0.2);
    }

    #[test]
    fn answer_boost_applies_for_question_plus_entity() {
        assert_eq!(answer_boost("what's my name?", "my name is Layne"), 0.5);
        assert_eq!(answer_boost("tell me a fact", "my name is Layne"), 0.0);
        assert_eq!(answer_boost("what's my name?", "no entity here"), 0.0);
    }

    #[test]
    fn answer_aware_retrieval_scenario_from_spec() {
        // spec §8 scenario 2: composite >= 0.5 for the dedup'd memory
        // when queried with a question that names the stored entity.
        let memory = memory_with(0.6, 1.0, 1, 0);
        let ctx = ScoringContext {
            query: "what's my name?",
            content_similarity: 0.9,
            is_best_cluster_member: true,
            now_secs: 0,
            lexicon: &EmotionalLexicon::default(),
        };
        let composite = composite_score(&memory, &ctx);
        assert!(composite >= 0.5, "composite was {composite}");
    }

    #[test]
    fn relevance_gate_bypassed_by_high_importance() {
        assert!(passes_relevance_gate(0.0, 0.9, 0.3, 0.8));
    }

    #[test]
    fn relevance_gate_rejects_low_everything() {
        assert!(!passes_relevance_gate(0.1, 0.2, 0.3, 0.8));
    }

    #[test]
    fn decay_factor_scales_composite_to_zero() {
        let memory = memory_with(0.6, 0.0, 1, 0);
        let ctx = ScoringContext {
            query: "what's my name?",
            content_similarity: 0.9,
            is_best_cluster_member: true,
            now_secs: 0,
            lexicon: &EmotionalLexicon::default(),
        };
        assert_eq!(composite_score(&memory, &ctx), 0.0);
    }
}
