//! Knowledge Lookup Tools
//!
//! `knowledge_lookup` runs one ranked search. `enhanced_knowledge_lookup`
//! grades the hits, rewrites the query and retries within a fixed attempt
//! budget, always returning its best (possibly empty) result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_core::provider::{GenerationOptions, LlmProvider, ToolChoice};
use agent_core::tool::{string_arg, ParameterSchema, ToolArgs, ToolSchema};
use agent_core::{Message, Result as CoreResult, Tool, ToolGroup};

use crate::error::{AdvisorError, Result};
use crate::knowledge::{self, Snippet};
use crate::specialty::Specialty;

/// Minimum share of query terms a hit must match
const MIN_SCORE: f64 = 0.2;

/// Top score at which the enhanced lookup stops rewriting
const RELEVANT_SCORE: f64 = 0.5;

const DEFAULT_LIMIT: usize = 3;
const DEFAULT_ATTEMPTS: usize = 3;

/// Strategy for reformulating a query that found nothing useful
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// A new query, or `None` when there is nothing better to try
    async fn rewrite(&self, query: &str, specialty: Specialty) -> Result<Option<String>>;
}

/// Expands lay terms with the clinical vocabulary used by the knowledge base
#[derive(Debug, Default)]
pub struct SynonymRewriter;

const SYNONYMS: &[(&str, &str)] = &[
    ("tummy", "abdominal pain"),
    ("stomach ache", "abdominal pain"),
    ("belly", "abdominal pain"),
    ("throwing up", "vomiting"),
    ("puking", "vomiting"),
    ("the runs", "diarrhea"),
    ("diarrhoea", "diarrhea"),
    ("heart racing", "palpitations"),
    ("pounding heart", "palpitations"),
    ("can't breathe", "shortness of breath"),
    ("breathless", "shortness of breath"),
    ("out of breath", "shortness of breath"),
    ("wheezy", "wheezing"),
    ("chest hurts", "chest pain"),
    ("head hurts", "headache"),
    ("migraine", "headache"),
    ("temperature", "fever"),
    ("spots", "rash"),
    ("bumps", "raised bumps"),
    ("itchy", "itchy rash"),
    ("sweaty", "cold sweat"),
    ("flu", "influenza"),
    ("burning chest", "heartburn"),
];

#[async_trait]
impl QueryRewriter for SynonymRewriter {
    async fn rewrite(&self, query: &str, _specialty: Specialty) -> Result<Option<String>> {
        let lower = query.to_lowercase();
        let mut expanded = query.trim().to_string();

        for (lay, clinical) in SYNONYMS {
            if lower.contains(lay) && !expanded.to_lowercase().contains(clinical) {
                expanded.push(' ');
                expanded.push_str(clinical);
            }
        }

        Ok((expanded != query.trim()).then_some(expanded))
    }
}

/// Asks the provider for a clinical reformulation
pub struct LlmQueryRewriter {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    timeout: Duration,
}

const REWRITE_PROMPT: &str = "Rewrite the patient's search query using standard clinical terms for symptoms \
and conditions. Reply with the rewritten query only, on one line, without quotes or explanation.";

impl LlmQueryRewriter {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self {
            provider,
            options: options.with_tool_choice(ToolChoice::None),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, query: &str, specialty: Specialty) -> Result<Option<String>> {
        let messages = [
            Message::system(format!("{REWRITE_PROMPT}\nSpecialty: {specialty}")),
            Message::user(query),
        ];

        let completion = tokio::time::timeout(
            self.timeout,
            self.provider.complete(&messages, &[], &self.options),
        )
        .await
        .map_err(|_| AdvisorError::Rewrite("timed out".into()))?
        .map_err(|e| AdvisorError::Rewrite(e.to_string()))?;

        let rewritten = completion
            .content
            .lines()
            .map(|l| l.trim().trim_matches(|c| c == '"' || c == '\''))
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string();

        if rewritten.is_empty() || rewritten.eq_ignore_ascii_case(query.trim()) {
            return Ok(None);
        }
        Ok(Some(rewritten))
    }
}

fn lookup_schema(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.into(),
        description: description.into(),
        parameters: vec![
            ParameterSchema::required("query", "string", "Symptoms or condition to look up (e.g., 'barking cough at night')"),
            ParameterSchema::optional("specialty", "string", "Domain to search; defaults to the consultation specialty"),
        ],
        group: ToolGroup::Knowledge,
    }
}

fn query_arg(args: &ToolArgs) -> Result<&str> {
    string_arg(args, "query").ok_or_else(|| AdvisorError::InvalidArgument("query must not be empty".into()))
}

fn lookup_output(query: &str, specialty: Specialty, results: &[Snippet]) -> Value {
    let mut output = json!({
        "query": query,
        "specialty": specialty,
        "found": !results.is_empty(),
        "results": results,
    });
    if results.is_empty() {
        output["message"] = json!(format!(
            "No relevant {specialty} information found for \"{query}\". Ask the patient for more detail or answer from general guidance."
        ));
    }
    output
}

/// Single-pass ranked knowledge search
pub struct KnowledgeLookupTool {
    specialty: Specialty,
    limit: usize,
}

impl KnowledgeLookupTool {
    pub fn new(specialty: Specialty) -> Self {
        Self {
            specialty,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn schema(&self) -> ToolSchema {
        lookup_schema(
            "knowledge_lookup",
            "Search the medical knowledge base for condition notes matching a query. Returns ranked snippets, or found=false.",
        )
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let query = query_arg(args)?;
        let specialty = string_arg(args, "specialty").map_or(self.specialty, Specialty::from_tag);

        let results = knowledge::search(query, specialty, MIN_SCORE, self.limit);
        tracing::debug!(query, %specialty, hits = results.len(), "Knowledge lookup");

        Ok(lookup_output(query, specialty, &results))
    }
}

/// Retrieve, grade, rewrite and retry
pub struct EnhancedKnowledgeLookupTool {
    specialty: Specialty,
    rewriter: Arc<dyn QueryRewriter>,
    limit: usize,
    max_attempts: usize,
}

impl EnhancedKnowledgeLookupTool {
    pub fn new(specialty: Specialty, rewriter: Arc<dyn QueryRewriter>) -> Self {
        Self {
            specialty,
            rewriter,
            limit: DEFAULT_LIMIT,
            max_attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[async_trait]
impl Tool for EnhancedKnowledgeLookupTool {
    fn schema(&self) -> ToolSchema {
        lookup_schema(
            "enhanced_knowledge_lookup",
            "Thorough knowledge search for vague or lay descriptions: rewrites the query into clinical terms and retries when results are weak.",
        )
    }

    async fn execute(&self, args: &ToolArgs) -> CoreResult<Value> {
        let original = query_arg(args)?;
        let specialty = string_arg(args, "specialty").map_or(self.specialty, Specialty::from_tag);

        let mut query = original.to_string();
        let mut tried: Vec<String> = Vec::new();
        let mut best: Vec<Snippet> = Vec::new();

        for attempt in 1..=self.max_attempts {
            tried.push(query.clone());

            let hits = knowledge::search(&query, specialty, MIN_SCORE, self.limit);
            let top = hits.first().map_or(0.0, |h| h.score);
            if top > best.first().map_or(0.0, |h| h.score) {
                best = hits;
            }

            if top >= RELEVANT_SCORE || attempt == self.max_attempts {
                break;
            }

            match self.rewriter.rewrite(&query, specialty).await {
                Ok(Some(next)) if !tried.contains(&next) => {
                    tracing::debug!(attempt, from = %query, to = %next, "Rewriting knowledge query");
                    query = next;
                }
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Query rewrite failed, keeping best result");
                    break;
                }
            }
        }

        let mut output = lookup_output(original, specialty, &best);
        output["attempts"] = json!(tried.len());
        output["queries"] = json!(tried);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(query: &str) -> ToolArgs {
        let mut args = ToolArgs::new();
        args.insert("query".into(), json!(query));
        args
    }

    /// Always proposes a new query that matches nothing
    #[derive(Default)]
    struct NoiseRewriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryRewriter for NoiseRewriter {
        async fn rewrite(&self, _query: &str, _specialty: Specialty) -> Result<Option<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("zzz{n}")))
        }
    }

    #[tokio::test]
    async fn test_basic_lookup_finds_entry() {
        let tool = KnowledgeLookupTool::new(Specialty::Pediatrics);
        let output = tool.execute(&args("barking cough at night")).await.unwrap();

        assert_eq!(output["found"], true);
        assert_eq!(output["results"][0]["id"], "peds-croup");
    }

    #[tokio::test]
    async fn test_zero_overlap_reports_not_found() {
        let tool = KnowledgeLookupTool::new(Specialty::General);
        let output = tool.execute(&args("quantum chromodynamics")).await.unwrap();

        assert_eq!(output["found"], false);
        assert_eq!(output["results"].as_array().unwrap().len(), 0);
        assert!(output["message"].as_str().unwrap().contains("No relevant"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let tool = KnowledgeLookupTool::new(Specialty::General);
        let err = tool.execute(&args("   ")).await.unwrap_err();
        assert!(matches!(err, agent_core::AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn test_synonym_rewriter_expands_lay_terms() {
        let rewriter = SynonymRewriter;
        let rewritten = rewriter.rewrite("my tummy hurts", Specialty::General).await.unwrap();
        assert_eq!(rewritten.as_deref(), Some("my tummy hurts abdominal pain"));

        let again = rewriter
            .rewrite("my tummy hurts abdominal pain", Specialty::General)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_enhanced_lookup_rewrites_lay_query() {
        let basic = KnowledgeLookupTool::new(Specialty::Gastroenterology);
        assert_eq!(basic.execute(&args("my tummy hurts")).await.unwrap()["found"], false);

        let tool = EnhancedKnowledgeLookupTool::new(Specialty::Gastroenterology, Arc::new(SynonymRewriter));
        let output = tool.execute(&args("my tummy hurts")).await.unwrap();

        assert_eq!(output["found"], true);
        assert_eq!(output["attempts"], 2);
        assert_eq!(output["query"], "my tummy hurts");
    }

    #[tokio::test]
    async fn test_enhanced_lookup_respects_attempt_budget() {
        let rewriter = Arc::new(NoiseRewriter::default());
        let tool = EnhancedKnowledgeLookupTool::new(Specialty::General, rewriter.clone());
        let output = tool.execute(&args("quantum chromodynamics")).await.unwrap();

        assert_eq!(output["found"], false);
        assert_eq!(output["attempts"], 3);
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_llm_rewriter_cleans_reply() {
        let provider = Arc::new(ScriptedProvider::new().reply("\"abdominal pain with vomiting\"\n").reply("my tummy"));
        let rewriter = LlmQueryRewriter::new(provider, GenerationOptions::default());

        let first = rewriter.rewrite("my tummy", Specialty::General).await.unwrap();
        assert_eq!(first.as_deref(), Some("abdominal pain with vomiting"));

        let unchanged = rewriter.rewrite("my tummy", Specialty::General).await.unwrap();
        assert!(unchanged.is_none());
    }

    #[tokio::test]
    async fn test_llm_rewriter_failure_keeps_best_result() {
        let provider = Arc::new(ScriptedProvider::new().fail("offline"));
        let rewriter = Arc::new(LlmQueryRewriter::new(provider, GenerationOptions::default()));
        let tool = EnhancedKnowledgeLookupTool::new(Specialty::General, rewriter);

        let output = tool.execute(&args("my tummy hurts")).await.unwrap();
        assert_eq!(output["found"], false);
        assert_eq!(output["attempts"], 1);
    }
}
