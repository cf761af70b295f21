//! Prompt templates for the stage agents.
//!
//! Every stage has a system prompt (role and expertise) and a user template
//! with `{name}` placeholders. Output format is not described here; each
//! request carries its stage's JSON Schema.
//!
//! Placeholders:
//! - `{document_text}`: full document text
//! - `{document_summary}`: type, parties and summary from the document analyzer
//! - `{clause_id}`, `{clause_title}`, `{clause_text}`: the clause under review
//! - `{clause_category}`: category assigned by the classifier

use legaldoc_core::Stage;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(\w+)\}").unwrap();
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("No {stage} prompt at {path}")]
    NotFound { stage: Stage, path: PathBuf },

    #[error("Failed to read prompt {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A user prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute `{name}` placeholders.
    ///
    /// Placeholders without a value are left as written, so templates may
    /// contain literal braces.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        PLACEHOLDER
            .replace_all(&self.source, |caps: &Captures| {
                let name = &caps[1];
                vars.iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Where stage prompts come from.
pub trait PromptSource: Send + Sync {
    /// System prompt for a stage.
    fn system_prompt(&self, stage: Stage) -> Result<String, PromptError>;

    /// User prompt template for a stage.
    fn template(&self, stage: Stage) -> Result<PromptTemplate, PromptError>;
}

const DOCUMENT_ANALYZER_SYSTEM: &str = "You are a legal document analyst. Your goal is to \
determine the type, parties and key characteristics of Non-Disclosure Agreements. You \
quickly tell mutual from unilateral agreements and notice the structural features that \
matter for clause-level review.";

const CLAUSE_SPLITTER_SYSTEM: &str = "You are a legal document analyst specializing in the \
structure of commercial agreements. Your goal is to break Non-Disclosure Agreements into \
their operative clauses, preserving the exact wording of each.";

const CLAUSE_CLASSIFIER_SYSTEM: &str = "You are a legal classification expert. Your goal is \
to assign each NDA clause to the single category that best describes its legal purpose, \
with an honest confidence score.";

const RISK_DETECTOR_SYSTEM: &str = "You are a legal risk analyst with deep experience in \
contract negotiation. Your goal is to identify risks, unfair terms and problematic \
language in NDA clauses, rate their severity and recommend concrete changes.";

const DOCUMENT_ANALYZER_TEMPLATE: &str = "Analyze the following agreement.

Determine whether it is a Mutual_NDA, a Unilateral_NDA or Other, list every party with \
its role, give the effective date if stated, write a one-paragraph summary of purpose and \
scope, and note any key observations.

Document:
{document_text}";

const CLAUSE_SPLITTER_TEMPLATE: &str = "Split the following agreement into its clauses, in \
document order.

Copy each clause's text verbatim. Keep numbered sub-sections with their parent clause. \
Mark preambles, recitals, WHEREAS blocks, background sections and signature blocks with \
\"operative\": false.

Document context:
{document_summary}

Document:
{document_text}";

const CLAUSE_CLASSIFIER_TEMPLATE: &str = "Classify the clause below.

Document context:
{document_summary}

Clause ID: {clause_id}
Title: {clause_title}
Text:
{clause_text}";

const RISK_DETECTOR_TEMPLATE: &str = "Assess the risk of the clause below for the party \
receiving confidential information.

Rate the clause LOW, MEDIUM or HIGH. For each risk give a short label, an explanation and \
its impact, then recommend changes that would reduce it. Perpetual obligations, one-sided \
remedies, unusually broad definitions and missing carve-outs deserve particular scrutiny.

Document context:
{document_summary}

Clause ID: {clause_id}
Category: {clause_category}
Title: {clause_title}
Text:
{clause_text}";

/// Prompts compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPrompts;

impl BuiltinPrompts {
    fn system(stage: Stage) -> &'static str {
        match stage {
            Stage::DocumentAnalyzer => DOCUMENT_ANALYZER_SYSTEM,
            Stage::ClauseSplitter => CLAUSE_SPLITTER_SYSTEM,
            Stage::ClauseClassifier => CLAUSE_CLASSIFIER_SYSTEM,
            Stage::RiskDetector => RISK_DETECTOR_SYSTEM,
        }
    }

    fn user(stage: Stage) -> &'static str {
        match stage {
            Stage::DocumentAnalyzer => DOCUMENT_ANALYZER_TEMPLATE,
            Stage::ClauseSplitter => CLAUSE_SPLITTER_TEMPLATE,
            Stage::ClauseClassifier => CLAUSE_CLASSIFIER_TEMPLATE,
            Stage::RiskDetector => RISK_DETECTOR_TEMPLATE,
        }
    }
}

impl PromptSource for BuiltinPrompts {
    fn system_prompt(&self, stage: Stage) -> Result<String, PromptError> {
        Ok(Self::system(stage).to_string())
    }

    fn template(&self, stage: Stage) -> Result<PromptTemplate, PromptError> {
        Ok(PromptTemplate::new(Self::user(stage)))
    }
}

/// Prompts read from a directory.
///
/// `<dir>/<stage>.txt` holds the user template and is required.
/// `<dir>/<stage>.system.txt` overrides the built-in system prompt.
/// Files are read once and cached.
pub struct DirectoryPrompts {
    dir: PathBuf,
    cache: RwLock<HashMap<PathBuf, Option<String>>>,
}

impl DirectoryPrompts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a file through the cache; `None` if it does not exist.
    fn load(&self, path: PathBuf) -> Result<Option<String>, PromptError> {
        if let Some(cached) = self.cache.read().get(&path) {
            return Ok(cached.clone());
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(PromptError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), found = content.is_some(), "Loaded prompt file");
        self.cache.write().insert(path, content.clone());
        Ok(content)
    }

    /// Forget cached files so edits are picked up.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

impl PromptSource for DirectoryPrompts {
    fn system_prompt(&self, stage: Stage) -> Result<String, PromptError> {
        let path = self.dir.join(format!("{}.system.txt", stage.name()));
        Ok(self
            .load(path)?
            .unwrap_or_else(|| BuiltinPrompts::system(stage).to_string()))
    }

    fn template(&self, stage: Stage) -> Result<PromptTemplate, PromptError> {
        let path = self.dir.join(format!("{}.txt", stage.name()));
        match self.load(path.clone())? {
            Some(source) => Ok(PromptTemplate::new(source)),
            None => Err(PromptError::NotFound { stage, path }),
        }
    }
}

impl std::fmt::Debug for DirectoryPrompts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryPrompts").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("legaldoc-prompts-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_render_substitutes_known_placeholders() {
        let template = PromptTemplate::new("Clause {clause_id}: {clause_text}");
        let rendered = template.render(&[("clause_id", "clause_2"), ("clause_text", "Term is two years.")]);
        assert_eq!(rendered, "Clause clause_2: Term is two years.");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let template = PromptTemplate::new("{clause_text} {unknown} {\"json\": 1}");
        let rendered = template.render(&[("clause_text", "Text")]);
        assert_eq!(rendered, "Text {unknown} {\"json\": 1}");
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let template = PromptTemplate::new("{clause_text}");
        let rendered = template.render(&[("clause_text", "see {document_text}"), ("document_text", "X")]);
        assert_eq!(rendered, "see {document_text}");
    }

    #[test]
    fn test_builtin_templates_use_expected_placeholders() {
        let prompts = BuiltinPrompts;
        for stage in Stage::ALL {
            assert!(!prompts.system_prompt(stage).unwrap().is_empty());
        }

        let risk = prompts.template(Stage::RiskDetector).unwrap();
        for name in ["{document_summary}", "{clause_id}", "{clause_category}", "{clause_text}"] {
            assert!(risk.source().contains(name), "risk template lacks {}", name);
        }
        assert!(prompts
            .template(Stage::DocumentAnalyzer)
            .unwrap()
            .source()
            .contains("{document_text}"));
    }

    #[test]
    fn test_directory_prompts() {
        let dir = temp_dir("load");
        std::fs::write(dir.join("clause_classifier.txt"), "Classify {clause_text}").unwrap();
        std::fs::write(dir.join("clause_classifier.system.txt"), "Custom system").unwrap();

        let prompts = DirectoryPrompts::new(&dir);
        assert_eq!(prompts.system_prompt(Stage::ClauseClassifier).unwrap(), "Custom system");
        assert_eq!(
            prompts.template(Stage::ClauseClassifier).unwrap().source(),
            "Classify {clause_text}"
        );

        // System prompt falls back to the built-in one
        assert_eq!(
            prompts.system_prompt(Stage::RiskDetector).unwrap(),
            RISK_DETECTOR_SYSTEM
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_directory_prompts_are_cached() {
        let dir = temp_dir("cache");
        let path = dir.join("risk_detector.txt");
        std::fs::write(&path, "first").unwrap();

        let prompts = DirectoryPrompts::new(&dir);
        assert_eq!(prompts.template(Stage::RiskDetector).unwrap().source(), "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(prompts.template(Stage::RiskDetector).unwrap().source(), "first");

        prompts.clear_cache();
        assert_eq!(prompts.template(Stage::RiskDetector).unwrap().source(), "second");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let dir = temp_dir("missing");
        let prompts = DirectoryPrompts::new(&dir);

        let err = prompts.template(Stage::ClauseSplitter).unwrap_err();
        assert!(matches!(err, PromptError::NotFound { stage: Stage::ClauseSplitter, .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    proptest! {
        #[test]
        fn render_without_placeholders_is_identity(text in "[^{}]*") {
            let template = PromptTemplate::new(text.clone());
            prop_assert_eq!(template.render(&[("clause_text", "x")]), text);
        }

        #[test]
        fn render_inserts_value_verbatim(value in "\\PC*") {
            let template = PromptTemplate::new("<{clause_text}>");
            prop_assert_eq!(
                template.render(&[("clause_text", value.as_str())]),
                format!("<{}>", value)
            );
        }
    }
}
