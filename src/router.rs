//! Deterministic query routing.
//!
//! Every question walks a fixed state machine; there is no planner or
//! agent loop, so the same question with the same index contents always
//! takes the same path. The visited states are recorded in the
//! [`RouteOutcome`] trace so callers (and tests) can see which flow
//! produced an answer.
//!
//! ```text
//! Start -> ResolveCodes -> ClassifyIntent
//!   Procedure: ProcedureFlow -> Synthesize -> Done
//!              ProcedureFlow (no hits) -> Fallback -> Synthesize -> Done
//!   Form:      FormFlow -> [ResolveFormRef ->] FetchForm -> Synthesize -> Done
//!              FormFlow (no reference) -> Done
//! ```

use std::sync::Arc;

use crate::config::{DocCodesConfig, DocTypesConfig};
use crate::error::PipelineError;
use crate::form_resolver::ResolveFormReferences;
use crate::models::{AnswerResult, RetrievedChunk};
use crate::retriever::Retrieve;
use crate::synthesizer::Synthesize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Start,
    ResolveCodes,
    ClassifyIntent,
    ProcedureFlow,
    FormFlow,
    ResolveFormRef,
    FetchForm,
    Fallback,
    Synthesize,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Procedure,
    Form,
}

/// Lexical intent classification. No model call; form phrasing routes
/// to the form flow, everything else enters the procedure flow (which
/// falls back to the broad search when it finds nothing).
pub fn classify_intent(question: &str) -> Intent {
    let q = question.to_lowercase();

    // Whole-word match so "performance" or "information" never read as
    // form questions.
    let form_word = q
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .any(|w| {
            matches!(w, "form" | "forms" | "template" | "templates" | "fm")
                || w.starts_with("fm-")
        });
    if form_word {
        Intent::Form
    } else {
        Intent::Procedure
    }
}

/// A quoted phrase in the question switches procedure retrieval to the
/// title-keyword mode.
fn quoted_phrase(question: &str) -> Option<String> {
    let start = question.find('"')?;
    let rest = &question[start + 1..];
    let end = rest.find('"')?;
    let phrase = rest[..end].trim();
    (phrase.len() >= 3).then(|| phrase.to_string())
}

/// The answer plus the states the router visited to produce it.
#[derive(Debug)]
pub struct RouteOutcome {
    pub answer: AnswerResult,
    pub trace: Vec<RouterState>,
}

pub struct QueryRouter {
    retriever: Arc<dyn Retrieve>,
    resolver: Arc<dyn ResolveFormReferences>,
    synthesizer: Arc<dyn Synthesize>,
    doc_codes: DocCodesConfig,
    doc_types: DocTypesConfig,
}

impl QueryRouter {
    pub fn new(
        retriever: Arc<dyn Retrieve>,
        resolver: Arc<dyn ResolveFormReferences>,
        synthesizer: Arc<dyn Synthesize>,
        doc_codes: DocCodesConfig,
        doc_types: DocTypesConfig,
    ) -> Self {
        Self {
            retriever,
            resolver,
            synthesizer,
            doc_codes,
            doc_types,
        }
    }

    /// Route one question for one organization.
    pub async fn route(
        &self,
        question: &str,
        organization: &str,
    ) -> Result<RouteOutcome, PipelineError> {
        let mut trace = vec![RouterState::Start, RouterState::ResolveCodes];
        let codes = self.doc_codes.resolve(organization);

        trace.push(RouterState::ClassifyIntent);
        match classify_intent(question) {
            Intent::Procedure => {
                self.procedure_flow(question, organization, &codes, trace)
                    .await
            }
            Intent::Form => self.form_flow(question, organization, &codes, trace).await,
        }
    }

    async fn procedure_flow(
        &self,
        question: &str,
        organization: &str,
        codes: &crate::config::DocCodes,
        mut trace: Vec<RouterState>,
    ) -> Result<RouteOutcome, PipelineError> {
        trace.push(RouterState::ProcedureFlow);

        let chunks = match quoted_phrase(question) {
            Some(phrase) => {
                self.retriever
                    .by_title_keyword(question, organization, &self.doc_types.procedure, &phrase)
                    .await?
            }
            None => {
                self.retriever
                    .by_doc_code(
                        question,
                        organization,
                        &self.doc_types.procedure,
                        &codes.procedure,
                    )
                    .await?
            }
        };

        if chunks.is_empty() {
            return self.fallback(question, organization, codes, trace).await;
        }

        self.synthesize(question, "procedure", chunks, trace).await
    }

    async fn form_flow(
        &self,
        question: &str,
        organization: &str,
        codes: &crate::config::DocCodes,
        mut trace: Vec<RouterState>,
    ) -> Result<RouteOutcome, PipelineError> {
        trace.push(RouterState::FormFlow);

        // An explicit code in the question skips the procedure search.
        let (mut context, target) = match self.resolver.scan(question).into_iter().next() {
            Some(form_ref) => (Vec::new(), form_ref),
            None => {
                let chunks = self
                    .retriever
                    .by_doc_code(
                        question,
                        organization,
                        &self.doc_types.procedure,
                        &codes.procedure,
                    )
                    .await?;

                trace.push(RouterState::ResolveFormRef);
                let annotated = self.resolver.resolve(chunks);
                let Some(form_ref) = annotated.iter().find_map(|c| c.form_ref.clone()) else {
                    trace.push(RouterState::Done);
                    return Ok(RouteOutcome {
                        answer: AnswerResult {
                            answer: "The procedures do not reference a form relevant to this \
                                     question."
                                .to_string(),
                            found_in_context: false,
                            citation: None,
                        },
                        trace,
                    });
                };
                (annotated, form_ref)
            }
        };

        trace.push(RouterState::FetchForm);
        let form_chunks = self
            .retriever
            .form_by_code(
                organization,
                &self.doc_types.form,
                &codes.form,
                &target.doc_number,
            )
            .await?;

        if form_chunks.is_empty() {
            trace.push(RouterState::Done);
            return Ok(RouteOutcome {
                answer: AnswerResult {
                    answer: format!(
                        "Form {}-{} is not present in the document index.",
                        codes.form, target.doc_number
                    ),
                    found_in_context: false,
                    citation: None,
                },
                trace,
            });
        }

        context.extend(form_chunks);
        self.synthesize(question, "form", context, trace).await
    }

    /// Broad search across the quality manual and procedure namespaces.
    async fn fallback(
        &self,
        question: &str,
        organization: &str,
        codes: &crate::config::DocCodes,
        mut trace: Vec<RouterState>,
    ) -> Result<RouteOutcome, PipelineError> {
        trace.push(RouterState::Fallback);

        let allowed = vec![codes.quality_manual.clone(), codes.procedure.clone()];
        let mut chunks = self
            .retriever
            .by_doc_codes(
                question,
                organization,
                &self.doc_types.quality_manual,
                &allowed,
            )
            .await?;
        chunks.extend(
            self.retriever
                .by_doc_codes(question, organization, &self.doc_types.procedure, &allowed)
                .await?,
        );

        self.synthesize(question, "quality manual and procedures", chunks, trace)
            .await
    }

    async fn synthesize(
        &self,
        question: &str,
        doc_type_label: &str,
        chunks: Vec<RetrievedChunk>,
        mut trace: Vec<RouterState>,
    ) -> Result<RouteOutcome, PipelineError> {
        trace.push(RouterState::Synthesize);

        let answer = match self
            .synthesizer
            .synthesize(question, doc_type_label, &chunks)
            .await
        {
            Ok(answer) => answer,
            // A synthesis failure degrades to the safe template rather
            // than surfacing an error to the caller.
            Err(PipelineError::Synthesis(reason)) => {
                eprintln!("Answer synthesis failed: {}", reason);
                AnswerResult::not_in_context(doc_type_label)
            }
            Err(e) => return Err(e),
        };

        trace.push(RouterState::Done);
        Ok(RouteOutcome { answer, trace })
    }
}
