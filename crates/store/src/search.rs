//! Ranked full-text search over memory content
//!
//! Candidates come from the FTS5 index. Each hit is scored as
//! `relevance * rank_weight + importance * importance_weight`, where relevance
//! is the negated bm25 rank so that better matches score higher.

use crate::model::{Memory, SearchRequest, SearchWeights};
use crate::schema::MEMORY_COLUMNS;
use kbase_core::MAX_SEARCH_RESULTS;
use rusqlite::{Connection, ToSql};
use tracing::{debug, trace};

/// Most phrases a single search may carry
pub const MAX_PHRASES: usize = 5;

/// Most topics a single search may filter on
pub const MAX_TOPICS: usize = 5;

/// Check request bounds and resolve the result count
pub(crate) fn validate(request: &SearchRequest, default_max_results: usize) -> Result<usize, String> {
    if request.phrases.is_empty() {
        return Err("Error: At least one phrase is required".to_string());
    }
    if request.phrases.len() > MAX_PHRASES {
        return Err(format!("Error: Too many phrases, maximum length is {MAX_PHRASES}"));
    }
    if request.topics.len() > MAX_TOPICS {
        return Err(format!("Error: Too many topics, maximum length is {MAX_TOPICS}"));
    }

    let max_results = request.max_results.unwrap_or(default_max_results);
    if max_results > MAX_SEARCH_RESULTS {
        return Err(format!("Error: max_results is too large, maximum value is {MAX_SEARCH_RESULTS}"));
    }
    if max_results == 0 {
        return Err("Error: max_results must be at least 1".to_string());
    }

    Ok(max_results)
}

/// Drop every character that is neither alphanumeric nor whitespace, then
/// collapse runs of whitespace
///
/// This keeps FTS5 operators and quotes out of the query; what is left is
/// always safe inside a quoted phrase.
pub fn sanitize_phrase(phrase: &str) -> String {
    let kept: String = phrase
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the FTS5 match expression, or `None` when no phrase survives sanitizing
pub fn build_match_query(phrases: &[String]) -> Option<String> {
    let quoted: Vec<String> = phrases
        .iter()
        .map(|phrase| sanitize_phrase(phrase))
        .filter(|phrase| !phrase.is_empty())
        .map(|phrase| format!("\"{phrase}\""))
        .collect();

    if quoted.is_empty() {
        return None;
    }

    Some(format!("memory_content : ({})", quoted.join(" OR ")))
}

/// Run a validated search
pub(crate) fn search(
    conn: &Connection, request: &SearchRequest, weights: SearchWeights, max_results: usize,
) -> rusqlite::Result<Vec<Memory>> {
    let Some(match_query) = build_match_query(&request.phrases) else {
        debug!("no searchable phrase left after sanitizing");
        return Ok(Vec::new());
    };
    trace!(%match_query, "fts query");

    let mut sql = format!(
        r#"
        WITH search_results AS (
            SELECT memory_node_id, rank FROM memory_search WHERE memory_search MATCH ?
        )
        SELECT {MEMORY_COLUMNS}, (-sr.rank) * ? + mn.importance * ? AS score
        FROM search_results sr
        JOIN memory_nodes mn ON mn.id = sr.memory_node_id
        JOIN topics t ON t.id = mn.topic_id
        "#
    );

    let mut param_values: Vec<Box<dyn ToSql>> =
        vec![Box::new(match_query), Box::new(weights.rank), Box::new(weights.importance)];
    let mut where_clauses = Vec::new();

    if !request.topics.is_empty() {
        let placeholders: Vec<&str> = request.topics.iter().map(|_| "?").collect();
        where_clauses.push(format!("t.name IN ({})", placeholders.join(", ")));
        for topic in &request.topics {
            param_values.push(Box::new(topic.clone()));
        }
    }

    if request.exclude_outdated {
        where_clauses.push("mn.outdated IS NULL".to_string());
    }

    if !where_clauses.is_empty() {
        sql.push_str(&format!("WHERE {}\n", where_clauses.join(" AND ")));
    }
    sql.push_str("ORDER BY score DESC, mn.id DESC\nLIMIT ?");
    param_values.push(Box::new(max_results as i64));

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = param_values.iter().map(|value| value.as_ref()).collect();
    let hits = stmt
        .query_map(params.as_slice(), Memory::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!("Search returned {} hits", hits.len());
    Ok(hits)
}
