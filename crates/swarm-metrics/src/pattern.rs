use crate::types::{Pattern, PatternMatch, Prediction, ProcessEventResult};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const DEFAULT_WINDOW: usize = 10;
const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
struct ObservedEvent {
    event_type: String,
    metadata: HashMap<String, Value>,
    at_ms: u64,
}

/// Matches a bounded window of recent events against a library of learned
/// `Pattern`s and predicts what comes next.
pub struct PatternMatcher {
    patterns: Mutex<Vec<Pattern>>,
    window: Mutex<VecDeque<ObservedEvent>>,
    window_size: usize,
    match_threshold: f64,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_WINDOW, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn with_config(window_size: usize, match_threshold: f64) -> Self {
        Self { patterns: Mutex::new(Vec::new()), window: Mutex::new(VecDeque::new()), window_size: window_size.max(1), match_threshold }
    }

    /// Replaces the pattern library wholesale, e.g. after loading from the
    /// `semantic_knowledge` table.
    pub fn load_patterns(&self, patterns: Vec<Pattern>) {
        *self.patterns.lock().unwrap_or_else(|p| p.into_inner()) = patterns;
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Appends `event_type` to the sliding window (evicting the oldest once
    /// full) and returns every pattern whose score clears `match_threshold`,
    /// plus the predictions those matches yield, ranked by probability.
    pub fn process_event(&self, event_type: &str, metadata: HashMap<String, Value>, at_ms: u64) -> ProcessEventResult {
        {
            let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
            if window.len() == self.window_size {
                window.pop_front();
            }
            window.push_back(ObservedEvent { event_type: event_type.to_string(), metadata, at_ms });
        }
        let matches = self.matches();
        let predictions = self.rank_predictions(&matches);
        ProcessEventResult { matches, predictions }
    }

    fn matches(&self) -> Vec<PatternMatch> {
        let window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        let observed: Vec<&str> = window.iter().map(|e| e.event_type.as_str()).collect();
        let patterns = self.patterns.lock().unwrap_or_else(|p| p.into_inner());
        let mut out = Vec::new();
        for pattern in patterns.iter() {
            let score = score_pattern(pattern, &observed, &window);
            if score >= self.match_threshold {
                out.push(PatternMatch { pattern_id: pattern.id.clone(), score });
            }
        }
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        out
    }

    /// Predicts likely next event types from patterns that currently match
    /// the tail of the window, weighting by pattern confidence, how tightly
    /// the match fits, and how often the pattern has occurred. Ranked by
    /// probability descending.
    pub fn predict_next(&self) -> Vec<Prediction> {
        let matched = self.matches();
        self.rank_predictions(&matched)
    }

    fn rank_predictions(&self, matched: &[PatternMatch]) -> Vec<Prediction> {
        if matched.is_empty() {
            return Vec::new();
        }
        let patterns = self.patterns.lock().unwrap_or_else(|p| p.into_inner());
        let max_occurrences = patterns.iter().map(|p| p.occurrence_count).max().unwrap_or(1).max(1) as f64;

        let mut predictions = Vec::new();
        for m in matched {
            let Some(pattern) = patterns.iter().find(|p| p.id == m.pattern_id) else { continue };
            let window = self.window.lock().unwrap_or_else(|p| p.into_inner());
            let matched_len = window.len().min(pattern.sequence.len());
            let Some(next_event) = pattern.sequence.get(matched_len).cloned() else { continue };
            drop(window);
            let normalized_occurrence = pattern.occurrence_count as f64 / max_occurrences;
            let probability = (0.4 * pattern.confidence + 0.4 * m.score + 0.2 * normalized_occurrence).min(1.0);
            predictions.push(Prediction { event_type: next_event, probability, source_pattern_id: pattern.id.clone() });
        }
        predictions.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap());
        predictions
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// `0.5 * sequence + 0.3 * metadata + 0.2 * temporal`.
fn score_pattern(pattern: &Pattern, observed: &[&str], window: &VecDeque<ObservedEvent>) -> f64 {
    let sequence_score = lcs_ratio(&pattern.sequence, observed);
    let metadata_score = metadata_similarity(pattern, window);
    let temporal_score = temporal_fit(pattern, window);
    0.5 * sequence_score + 0.3 * metadata_score + 0.2 * temporal_score
}

/// Longest common subsequence length over the longer sequence's length, via
/// the standard O(m*n) DP table.
fn lcs_ratio(pattern_seq: &[String], observed: &[&str]) -> f64 {
    if pattern_seq.is_empty() || observed.is_empty() {
        return 0.0;
    }
    let m = pattern_seq.len();
    let n = observed.len();
    let mut dp = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if pattern_seq[i - 1] == observed[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    let lcs_len = dp[m][n] as f64;
    lcs_len / m.max(n) as f64
}

/// Per-key comparison between the pattern's stored metadata and the most
/// recently observed event's metadata: exact match for strings, normalized
/// proximity for numerics, averaged over keys present in both. Yields 0.0
/// when there is no overlap (including an empty window).
fn metadata_similarity(pattern: &Pattern, window: &VecDeque<ObservedEvent>) -> f64 {
    let Some(latest) = window.back() else { return 0.0 };
    let common_keys: Vec<&String> = pattern.metadata.keys().filter(|k| latest.metadata.contains_key(k.as_str())).collect();
    if common_keys.is_empty() {
        return 0.0;
    }
    let total: f64 = common_keys.iter().map(|k| value_similarity(&pattern.metadata[*k], &latest.metadata[*k])).sum();
    total / common_keys.len() as f64
}

fn value_similarity(a: &Value, b: &Value) -> f64 {
    match (a, b) {
        (Value::String(sa), Value::String(sb)) => {
            if sa == sb {
                1.0
            } else {
                0.0
            }
        }
        (Value::Number(na), Value::Number(nb)) => {
            let (fa, fb) = (na.as_f64().unwrap_or(0.0), nb.as_f64().unwrap_or(0.0));
            let denom = fa.abs().max(fb.abs()).max(1.0);
            (1.0 - (fa - fb).abs() / denom).clamp(0.0, 1.0)
        }
        _ => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// How closely the observed inter-event gaps track the pattern's learned
/// `typical_interval_ms`, averaged over consecutive window entries.
fn temporal_fit(pattern: &Pattern, window: &VecDeque<ObservedEvent>) -> f64 {
    if pattern.typical_interval_ms == 0 || window.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut count = 0;
    let mut iter = window.iter();
    let mut prev = iter.next();
    for curr in iter {
        if let Some(p) = prev {
            let gap = curr.at_ms.saturating_sub(p.at_ms) as f64;
            let typical = pattern.typical_interval_ms as f64;
            let deviation = (gap - typical).abs() / typical;
            total += (1.0 - deviation).clamp(0.0, 1.0);
            count += 1;
        }
        prev = Some(curr);
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(id: &str, sequence: &[&str], confidence: f64, occurrence_count: u64) -> Pattern {
        Pattern {
            id: id.to_string(),
            sequence: sequence.iter().map(|s| s.to_string()).collect(),
            occurrence_count,
            confidence,
            first_seen_ms: 0,
            last_seen_ms: 0,
            metadata: HashMap::new(),
            typical_interval_ms: 0,
        }
    }

    #[test]
    fn exact_sequence_match_scores_high() {
        let matcher = PatternMatcher::new();
        let mut meta = HashMap::new();
        meta.insert("project".to_string(), Value::String("swarm".to_string()));
        let mut p = pattern("p1", &["task_start", "task_progress", "task_complete"], 0.9, 10);
        p.metadata = meta.clone();
        p.typical_interval_ms = 100;
        matcher.load_patterns(vec![p]);
        matcher.process_event("task_start", HashMap::new(), 0);
        matcher.process_event("task_progress", HashMap::new(), 100);
        let result = matcher.process_event("task_complete", meta, 200);
        assert_eq!(result.matches.len(), 1);
        assert!(result.matches[0].score > 0.8);
        assert_eq!(result.predictions.len(), 0, "the sequence is already complete, nothing left to predict");
    }

    #[test]
    fn unrelated_events_do_not_match() {
        let matcher = PatternMatcher::new();
        matcher.load_patterns(vec![pattern("p1", &["task_start", "task_progress", "task_complete"], 0.9, 10)]);
        matcher.process_event("agent_registered", HashMap::new(), 0);
        let result = matcher.process_event("agent_removed", HashMap::new(), 100);
        assert!(result.matches.is_empty());
        assert!(result.predictions.is_empty());
    }

    #[test]
    fn predict_next_returns_remaining_tail_of_best_match() {
        let matcher = PatternMatcher::new();
        let mut meta = HashMap::new();
        meta.insert("owner".to_string(), Value::String("a1".to_string()));
        let mut p = pattern("p1", &["task_start", "task_progress", "task_complete"], 0.9, 10);
        p.metadata = meta.clone();
        p.typical_interval_ms = 100;
        matcher.load_patterns(vec![p]);
        matcher.process_event("task_start", meta.clone(), 0);
        matcher.process_event("task_progress", meta, 100);
        let predictions = matcher.predict_next();
        let best = predictions.first().expect("should predict");
        assert_eq!(best.event_type, "task_complete");
        assert_eq!(best.source_pattern_id, "p1");
    }

    #[test]
    fn predictions_are_sorted_by_probability_descending() {
        // Zero threshold so both partially-overlapping patterns register as
        // matches; this test is about ranking order, not the threshold cut.
        let matcher = PatternMatcher::with_config(DEFAULT_WINDOW, 0.0);
        matcher.load_patterns(vec![
            pattern("confident", &["task_start", "task_complete"], 0.95, 50),
            pattern("unsure", &["task_start", "task_failed"], 0.2, 1),
        ]);
        matcher.process_event("task_start", HashMap::new(), 0);
        let predictions = matcher.predict_next();
        assert_eq!(predictions.len(), 2);
        assert!(predictions[0].probability >= predictions[1].probability);
        assert_eq!(predictions[0].source_pattern_id, "confident");
    }

    #[test]
    fn metadata_similarity_averages_per_key_scores() {
        let mut pattern_meta = HashMap::new();
        pattern_meta.insert("owner".to_string(), Value::String("a1".to_string()));
        pattern_meta.insert("retries".to_string(), Value::from(4));
        let mut p = pattern("p1", &["task_start"], 0.9, 10);
        p.metadata = pattern_meta;

        let mut event_meta = HashMap::new();
        event_meta.insert("owner".to_string(), Value::String("a1".to_string()));
        event_meta.insert("retries".to_string(), Value::from(5));
        let mut window = VecDeque::new();
        window.push_back(ObservedEvent { event_type: "task_start".to_string(), metadata: event_meta, at_ms: 0 });

        // owner matches exactly (1.0); retries 4 vs 5 -> 1 - 1/5 = 0.8. Average: 0.9.
        assert!((metadata_similarity(&p, &window) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn lcs_ratio_handles_partial_overlap() {
        let pattern_seq = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let observed = vec!["x", "a", "b"];
        assert!((lcs_ratio(&pattern_seq, &observed) - (2.0 / 3.0)).abs() < 1e-9);
    }
}
