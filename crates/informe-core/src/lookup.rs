use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Result of a topic lookup.
///
/// Failures are data, not errors: the pipeline hands either variant to the
/// writer as findings text, so a missing topic produces a report that says
/// so instead of aborting the run.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Found { title: String, summary: String },
    Failed { reason: String },
}

impl LookupOutcome {
    /// Render the outcome as the findings text the researcher prompt carries.
    pub fn into_findings(self) -> String {
        match self {
            Self::Found { title, summary } => {
                format!("Resumen de Wikipedia para \"{title}\":\n{summary}")
            }
            Self::Failed { reason } => format!("Error buscando: {reason}"),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

/// Single callable capability exposed to the researcher.
#[async_trait]
pub trait TopicLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> LookupOutcome;
}

/// Topic lookup against the Spanish Wikipedia MediaWiki API.
///
/// One search call resolves the best-matching page title, one extract call
/// fetches the plain-text article body, and the result is truncated to the
/// configured number of sentences.
pub struct WikipediaLookup {
    http: reqwest::Client,
    endpoint: String,
    sentences: usize,
}

impl WikipediaLookup {
    pub const DEFAULT_ENDPOINT: &'static str = "https://es.wikipedia.org/w/api.php";

    pub fn new(sentences: usize) -> Self {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT, sentences)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, sentences: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            sentences: sentences.max(1),
        }
    }

    async fn search_title(&self, query: &str) -> Result<String, String> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let payload: Value = response.json().await.map_err(|err| err.to_string())?;

        payload["query"]["search"]
            .as_array()
            .and_then(|results| results.first())
            .and_then(|result| result["title"].as_str())
            .map(str::to_string)
            .ok_or_else(|| format!("no se encontraron páginas para \"{query}\""))
    }

    async fn fetch_extract(&self, title: &str) -> Result<String, String> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|err| err.to_string())?;

        let payload: Value = response.json().await.map_err(|err| err.to_string())?;

        payload["query"]["pages"]
            .as_object()
            .and_then(|pages| pages.values().next())
            .and_then(|page| page["extract"].as_str())
            .filter(|extract| !extract.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("la página \"{title}\" no tiene contenido"))
    }
}

#[async_trait]
impl TopicLookup for WikipediaLookup {
    async fn lookup(&self, query: &str) -> LookupOutcome {
        let title = match self.search_title(query).await {
            Ok(title) => title,
            Err(reason) => {
                warn!(%query, %reason, "wikipedia search failed");
                return LookupOutcome::Failed { reason };
            }
        };

        match self.fetch_extract(&title).await {
            Ok(extract) => {
                let summary = truncate_sentences(&extract, self.sentences);
                debug!(%query, %title, chars = summary.len(), "wikipedia summary retrieved");
                LookupOutcome::Found { title, summary }
            }
            Err(reason) => {
                warn!(%query, %title, %reason, "wikipedia extract failed");
                LookupOutcome::Failed { reason }
            }
        }
    }
}

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]["'»)]?(\s+|$)"#).expect("sentence regex"));

/// Keep the first `limit` sentences of `text`, preserving original spacing.
pub(crate) fn truncate_sentences(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    let mut seen = 0usize;

    for capture in SENTENCE_END.find_iter(trimmed) {
        seen += 1;
        if seen == limit {
            return trimmed[..capture.end()].trim_end().to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_requested_sentences() {
        let text = "Primera frase. Segunda frase. Tercera frase. Cuarta frase.";
        assert_eq!(truncate_sentences(text, 2), "Primera frase. Segunda frase.");
    }

    #[test]
    fn truncation_is_noop_for_short_text() {
        let text = "Una sola frase.";
        assert_eq!(truncate_sentences(text, 25), text);
    }

    #[test]
    fn truncation_handles_exclamations_and_questions() {
        let text = "¿Qué es esto? ¡Una prueba! Fin de la historia.";
        assert_eq!(truncate_sentences(text, 2), "¿Qué es esto? ¡Una prueba!");
    }

    #[test]
    fn found_outcome_renders_summary() {
        let outcome = LookupOutcome::Found {
            title: "Roma".to_string(),
            summary: "La ciudad eterna.".to_string(),
        };
        let findings = outcome.into_findings();
        assert!(findings.contains("Roma"));
        assert!(findings.contains("La ciudad eterna."));
    }

    #[test]
    fn failed_outcome_becomes_descriptive_text() {
        let outcome = LookupOutcome::Failed {
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            outcome.into_findings(),
            "Error buscando: connection refused"
        );
    }
}
