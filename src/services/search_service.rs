//! Fuzzy and semantic search over the local shadow store.
//!
//! SQL narrows candidates to the caller's live rows; scoring runs here so
//! typo-tolerant matching and cosine ranking stay in one place. Similarity
//! primitives are pure functions with their own tests.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::ai::AiProvider;
use crate::db::messages;
use crate::error::{Error, Result};
use crate::models::Email;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.2;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.5;
const MAX_SUGGESTIONS: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Subject,
    Sender,
    Body,
    All,
}

impl SearchScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subject" => Some(Self::Subject),
            "sender" => Some(Self::Sender),
            "body" => Some(Self::Body),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn includes_subject(self) -> bool {
        matches!(self, Self::Subject | Self::All)
    }

    fn includes_sender(self) -> bool {
        matches!(self, Self::Sender | Self::All)
    }

    fn includes_body(self) -> bool {
        matches!(self, Self::Body | Self::All)
    }
}

#[derive(Debug, Clone)]
pub struct FuzzyParams {
    pub query: String,
    pub threshold: f64,
    pub scope: SearchScope,
    pub mailbox_id: Option<i64>,
    pub page: i64,
    pub limit: i64,
    pub subject_weight: f64,
    pub sender_weight: f64,
    pub body_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEmail {
    #[serde(flatten)]
    pub email: Email,
    pub relevance: f64,
}

pub async fn fuzzy_search(
    pool: &SqlitePool,
    user_id: i64,
    params: &FuzzyParams,
) -> Result<(Vec<ScoredEmail>, i64)> {
    let query = params.query.trim().to_lowercase();
    if query.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let candidates = messages::search_candidates(pool, user_id, params.mailbox_id).await?;
    let mut matches: Vec<ScoredEmail> = candidates
        .into_iter()
        .filter_map(|email| {
            score_email(&email, &query, params).map(|relevance| ScoredEmail { email, relevance })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.email.id.cmp(&b.email.id))
    });

    let total = matches.len() as i64;
    let start = ((params.page - 1) * params.limit).max(0) as usize;
    let page: Vec<ScoredEmail> = matches
        .into_iter()
        .skip(start)
        .take(params.limit.max(0) as usize)
        .collect();
    Ok((page, total))
}

/// Returns the weighted relevance when the row qualifies under the active
/// scope, `None` otherwise.
fn score_email(email: &Email, query: &str, params: &FuzzyParams) -> Option<f64> {
    let subject = email.subject.as_deref().unwrap_or("");
    let from_name = email.from_name.as_deref().unwrap_or("");
    let from_email = email.from_email.as_str();

    let subject_score = word_similarity(query, subject).max(trigram_similarity(subject, query));
    let sender_score = word_similarity(query, from_name)
        .max(trigram_similarity(from_name, query))
        .max(word_similarity(query, from_email))
        .max(trigram_similarity(from_email, query));

    let body_doc = format!(
        "{} {}",
        email.body_text.as_deref().unwrap_or(""),
        email.ai_summary.as_deref().unwrap_or("")
    );
    let body_matches = params.scope.includes_body() && phrase_matches(&body_doc, query);
    let body_score = if params.scope.includes_body() {
        phrase_rank(&body_doc, query)
    } else {
        0.0
    };

    let subject_hit = params.scope.includes_subject()
        && (subject_score > params.threshold || subject.to_lowercase().contains(query));
    let sender_hit = params.scope.includes_sender()
        && (sender_score > params.threshold
            || from_name.to_lowercase().contains(query)
            || from_email.to_lowercase().contains(query));

    if !(subject_hit || sender_hit || body_matches) {
        return None;
    }

    Some(
        params.subject_weight * subject_score
            + params.sender_weight * sender_score
            + params.body_weight * body_score,
    )
}

pub async fn semantic_search(
    pool: &SqlitePool,
    ai: &dyn AiProvider,
    user_id: i64,
    query: &str,
    min_similarity: f64,
    mailbox_id: Option<i64>,
    page: i64,
    limit: i64,
) -> Result<(Vec<ScoredEmail>, i64)> {
    let query = query.trim();
    if query.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let query_vec = ai.embed(query).await?;
    let candidates = messages::search_candidates(pool, user_id, mailbox_id).await?;

    let mut matches: Vec<ScoredEmail> = candidates
        .into_iter()
        .filter_map(|email| {
            let embedding = email.embedding.as_ref()?;
            let score = cosine_similarity(embedding, &query_vec)?;
            (score >= min_similarity).then(|| ScoredEmail {
                email,
                relevance: score,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.email.id.cmp(&b.email.id))
    });

    let total = matches.len() as i64;
    let start = ((page - 1) * limit).max(0) as usize;
    let page: Vec<ScoredEmail> = matches
        .into_iter()
        .skip(start)
        .take(limit.max(0) as usize)
        .collect();
    Ok((page, total))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestions {
    pub contacts: Vec<String>,
    pub keywords: Vec<String>,
    pub recent_searches: Vec<String>,
}

pub async fn suggestions(pool: &SqlitePool, user_id: i64, prefix: &str) -> Result<Suggestions> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.is_empty() {
        return Err(Error::validation("q must not be empty"));
    }

    let candidates = messages::search_candidates(pool, user_id, None).await?;

    let mut contacts = Vec::new();
    for email in &candidates {
        let contact = email
            .from_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&email.from_email);
        if contact.to_lowercase().contains(&prefix) && !contacts.contains(&contact.to_string()) {
            contacts.push(contact.to_string());
            if contacts.len() >= MAX_SUGGESTIONS {
                break;
            }
        }
    }

    let mut frequencies: HashMap<String, usize> = HashMap::new();
    for email in &candidates {
        if let Some(subject) = &email.subject {
            for token in tokenize(subject) {
                if token.len() >= MIN_KEYWORD_LEN && token.contains(&prefix) {
                    *frequencies.entry(token).or_insert(0) += 1;
                }
            }
        }
    }
    let mut keywords: Vec<(String, usize)> = frequencies.into_iter().collect();
    keywords.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let keywords = keywords
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(word, _)| word)
        .collect();

    Ok(Suggestions {
        contacts,
        keywords,
        recent_searches: Vec::new(),
    })
}

// --- similarity primitives ---

/// Asymmetric, prefix- and substring-aware similarity of a query against
/// the words of a text. Returns the best per-word score in [0, 1].
pub fn word_similarity(query: &str, text: &str) -> f64 {
    let query = query.to_lowercase();
    if query.is_empty() || text.is_empty() {
        return 0.0;
    }

    let mut best: f64 = 0.0;
    for word in tokenize(text) {
        let score = if word == query {
            1.0
        } else if word.starts_with(&query) || query.starts_with(&word) {
            let ratio = word.len().min(query.len()) as f64 / word.len().max(query.len()) as f64;
            0.75 + 0.25 * ratio
        } else if word.contains(&query) {
            0.7
        } else {
            trigram_similarity(&word, &query)
        };
        best = best.max(score);
    }
    best
}

/// Symmetric 3-shingle Jaccard similarity in [0, 1].
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn trigrams(s: &str) -> std::collections::HashSet<String> {
    let normalized: String = format!("  {} ", s.to_lowercase());
    let chars: Vec<char> = normalized.chars().collect();
    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// True when every stemmed query token appears in the document.
pub fn phrase_matches(document: &str, query: &str) -> bool {
    let doc_stems: std::collections::HashSet<String> =
        tokenize(document).into_iter().map(|t| stem(&t)).collect();
    let query_stems: Vec<String> = tokenize(query).into_iter().map(|t| stem(&t)).collect();
    !query_stems.is_empty() && query_stems.iter().all(|s| doc_stems.contains(s))
}

/// Coverage-based rank of stemmed query tokens against a stemmed
/// document, with a saturating frequency bonus. Returns [0, 1].
pub fn phrase_rank(document: &str, query: &str) -> f64 {
    let query_stems: Vec<String> = tokenize(query).into_iter().map(|t| stem(&t)).collect();
    if query_stems.is_empty() {
        return 0.0;
    }

    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    for token in tokenize(document) {
        *doc_freq.entry(stem(&token)).or_insert(0) += 1;
    }

    let mut covered = 0usize;
    let mut tf_bonus = 0.0;
    for stem in &query_stems {
        if let Some(&freq) = doc_freq.get(stem) {
            covered += 1;
            tf_bonus += (freq.min(4) as f64) / 4.0;
        }
    }
    let coverage = covered as f64 / query_stems.len() as f64;
    let bonus = tf_bonus / query_stems.len() as f64;
    coverage * 0.5 + bonus * 0.5
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Light suffix stripping, enough to line up common inflections.
fn stem(token: &str) -> String {
    let t = token;
    if t.len() > 5 && t.ends_with("ing") {
        return t[..t.len() - 3].to_string();
    }
    if t.len() > 4 && t.ends_with("ed") {
        return t[..t.len() - 2].to_string();
    }
    if t.len() > 4 && t.ends_with("es") {
        return t[..t.len() - 2].to_string();
    }
    if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
        return t[..t.len() - 1].to_string();
    }
    t.to_string()
}

/// `1 - cosine_distance`, or `None` when the dimensions disagree or a
/// vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
