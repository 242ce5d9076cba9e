//! Keyword matcher
//!
//! Scores each candidate flow's trigger against the inbound text and the
//! interactive reply, highest score wins. The literal `default` trigger
//! scores just enough to act as the fallback when nothing else hits.

use tracing::debug;
use wf_common::{normalize::normalize_keyword, Flow, DEFAULT_TRIGGER};

/// What the inbound event offers for matching.
#[derive(Debug, Clone, Default)]
pub struct MatchContext<'a> {
    pub full_text: &'a str,
    pub interactive_title: Option<&'a str>,
    pub interactive_id: Option<&'a str>,
}

/// Pick the flow for a new session.
///
/// Tie-break by most-recently-updated; with no positive score, the first
/// flow in input order wins; an empty candidate set yields nothing.
pub fn select_flow<'a>(flows: &'a [Flow], context: &MatchContext<'_>) -> Option<&'a Flow> {
    if flows.is_empty() {
        return None;
    }

    let text = normalize_keyword(context.full_text);
    let title = context.interactive_title.map(normalize_keyword);
    let id = context.interactive_id.map(normalize_keyword);

    let mut tokens: Vec<String> = vec![text.clone()];
    tokens.extend(text.split_whitespace().map(|w| w.to_string()));
    if let Some(title) = &title {
        tokens.push(title.clone());
    }
    if let Some(id) = &id {
        tokens.push(id.clone());
    }

    let mut best: Option<(&Flow, i32)> = None;
    for flow in flows {
        let trigger = normalize_keyword(&flow.trigger);
        if trigger.is_empty() {
            continue;
        }

        let mut score = 0;
        let token_hit = tokens.iter().any(|t| *t == trigger)
            || text.contains(&trigger)
            || title.as_deref().is_some_and(|t| t.contains(&trigger))
            || id.as_deref() == Some(trigger.as_str());
        if token_hit {
            score += 6;
        }
        if text == trigger {
            score += 2;
        }
        if title.as_deref() == Some(trigger.as_str()) {
            score += 1;
        }
        if id.as_deref() == Some(trigger.as_str()) {
            score += 1;
        }
        if trigger == DEFAULT_TRIGGER {
            score += 1;
        }

        let better = match best {
            None => score > 0,
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score && flow.updated_at > current.updated_at)
            }
        };
        if better {
            best = Some((flow, score));
        }
    }

    let selected = best.map(|(flow, score)| {
        debug!(flow_id = %flow.id, trigger = %flow.trigger, score, "Keyword matcher selected flow");
        flow
    });

    // Nothing scored: fall back to the first candidate.
    selected.or_else(|| flows.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow(trigger: &str) -> Flow {
        Flow::new("t1", format!("{} flow", trigger), trigger, json!({}))
    }

    #[test]
    fn test_exact_keyword_beats_default() {
        let flows = vec![flow("default"), flow("soporte")];
        let context = MatchContext { full_text: "soporte", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "soporte");
    }

    #[test]
    fn test_word_token_matches_inside_sentence() {
        let flows = vec![flow("pedido"), flow("turnos")];
        let context = MatchContext { full_text: "quiero hacer un pedido", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "pedido");
    }

    #[test]
    fn test_diacritics_ignored() {
        let flows = vec![flow("menú")];
        let context = MatchContext { full_text: "MENU", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "menú");
    }

    #[test]
    fn test_interactive_id_matches() {
        let flows = vec![flow("ventas"), flow("soporte")];
        let context = MatchContext {
            full_text: "algo sin relación",
            interactive_title: None,
            interactive_id: Some("soporte"),
        };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "soporte");
    }

    #[test]
    fn test_default_wins_when_nothing_matches() {
        let flows = vec![flow("ventas"), flow("default")];
        let context = MatchContext { full_text: "no tengo idea", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "default");
    }

    #[test]
    fn test_no_positive_score_falls_back_to_first() {
        let flows = vec![flow("ventas"), flow("soporte")];
        let context = MatchContext { full_text: "zzz", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "ventas");
    }

    #[test]
    fn test_tie_break_prefers_most_recent() {
        let mut older = flow("hola");
        older.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let newer = flow("hola");
        let flows = vec![older, newer.clone()];

        let context = MatchContext { full_text: "hola", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().id, newer.id);
    }

    #[test]
    fn test_empty_candidate_set() {
        let context = MatchContext { full_text: "hola", ..Default::default() };
        assert!(select_flow(&[], &context).is_none());
    }

    #[test]
    fn test_full_text_equality_outscores_substring() {
        // "ventas" appears inside the text for one flow, but the other
        // trigger equals the whole text.
        let flows = vec![flow("ventas"), flow("ventas mayoristas")];
        let context = MatchContext { full_text: "ventas mayoristas", ..Default::default() };
        assert_eq!(select_flow(&flows, &context).unwrap().trigger, "ventas mayoristas");
    }
}
