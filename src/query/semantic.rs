//! Natural-language search through the vector index

use super::{QueryResult, QueryStatus, ScoredSymbol};
use crate::config::SemanticSearchConfig;
use crate::storage::ProjectIndex;
use crate::vector::{EmbeddingProvider, VectorIndex, compare_scores, embed_with_timeout};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rank symbols by similarity to `query`.
///
/// `top_k` is clamped to `[1, max_limit]` and hits below `threshold` are
/// dropped. Ties on score go to the lower complexity (unknown last), then
/// the name, then the id, so repeated queries rank identically.
pub fn search_semantic(
    project: &ProjectIndex,
    vectors: Option<&VectorIndex>,
    provider: Option<&Arc<dyn EmbeddingProvider>>,
    query: &str,
    top_k: usize,
    config: &SemanticSearchConfig,
) -> QueryResult<ScoredSymbol> {
    if project.is_empty() {
        return QueryResult::empty(QueryStatus::IndexEmpty);
    }
    let (Some(vectors), Some(provider)) = (vectors, provider) else {
        let reason = if config.enabled {
            "no embedding model is loaded"
        } else {
            "semantic search is disabled in settings"
        };
        return QueryResult::empty(QueryStatus::SemanticUnavailable(reason.to_string()));
    };

    let timeout = Duration::from_secs(config.embed_timeout_secs);
    let query_vector = match embed_with_timeout(provider, vec![query.to_string()], timeout) {
        Ok(mut vectors) if vectors.len() == 1 => vectors.remove(0),
        Ok(_) => {
            return QueryResult::empty(QueryStatus::SemanticUnavailable(
                "embedding provider returned no vector for the query".to_string(),
            ));
        }
        Err(e) => return QueryResult::empty(QueryStatus::SemanticUnavailable(e.to_string())),
    };

    let scores = match vectors.scores(&query_vector) {
        Ok(scores) => scores,
        Err(e) => return QueryResult::empty(QueryStatus::SemanticUnavailable(e.to_string())),
    };

    let mut hits: Vec<ScoredSymbol> = scores
        .into_iter()
        .filter(|(_, score)| *score >= config.threshold)
        .filter_map(|(id, score)| {
            project.symbol(id).map(|symbol| ScoredSymbol {
                symbol: symbol.clone(),
                score,
            })
        })
        .collect();
    hits.sort_by(rank);
    hits.truncate(top_k.clamp(1, config.max_limit.max(1)));
    debug!(query, hits = hits.len(), "semantic search");

    QueryResult::found(hits)
}

fn rank(a: &ScoredSymbol, b: &ScoredSymbol) -> Ordering {
    compare_scores(a.score, b.score)
        .then_with(|| match (a.symbol.complexity, b.symbol.complexity) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.symbol.name.cmp(&b.symbol.name))
        .then_with(|| a.symbol.id.cmp(&b.symbol.id))
}
