//! Statement resolution ladder.
//!
//! A query attachment can reach its result three ways. Each tier runs only if
//! the previous one produced nothing, and every failure is kept so the final
//! error can name all of them.

use std::time::Duration;

use tracing::{error, warn};

use crate::genie::{GenieApi, GenieError, StatementResponse};
use crate::retry::RetryExecutor;

/// Ways to obtain a statement result, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolutionTier {
    /// The attachment already names a statement.
    AttachedStatement,
    /// Ask for the attachment's query-result descriptor.
    QueryResultDescriptor,
    /// Execute the attachment's query again.
    ReExecute,
}

impl ResolutionTier {
    pub(crate) const ORDER: [ResolutionTier; 3] = [
        ResolutionTier::AttachedStatement,
        ResolutionTier::QueryResultDescriptor,
        ResolutionTier::ReExecute,
    ];

    fn needs_attachment(self) -> bool {
        !matches!(self, ResolutionTier::AttachedStatement)
    }
}

/// Identifiers and budget for one resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatementTarget<'a> {
    pub space_id: &'a str,
    pub conversation_id: &'a str,
    pub message_id: &'a str,
    pub attachment_id: Option<&'a str>,
    pub statement_id: Option<&'a str>,
    pub timeout: Duration,
}

/// Every tier came up empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResultUnavailable {
    pub details: Vec<String>,
}

impl ResultUnavailable {
    pub(crate) fn user_message(&self) -> String {
        let details = if self.details.is_empty() {
            "unknown error".to_string()
        } else {
            self.details.join(", ")
        };
        format!("Query result unavailable ({details}). Please try again.")
    }
}

pub(crate) struct StatementResolver<'a> {
    api: &'a dyn GenieApi,
    retry: &'a RetryExecutor,
    target: StatementTarget<'a>,
    diagnostics: Vec<String>,
}

impl<'a> StatementResolver<'a> {
    pub(crate) fn new(
        api: &'a dyn GenieApi,
        retry: &'a RetryExecutor,
        target: StatementTarget<'a>,
    ) -> Self {
        Self {
            api,
            retry,
            target,
            diagnostics: Vec::new(),
        }
    }

    /// Walk the tiers until one yields a statement.
    pub(crate) async fn resolve(mut self) -> Result<StatementResponse, ResultUnavailable> {
        for tier in ResolutionTier::ORDER {
            if tier.needs_attachment() && self.target.attachment_id.is_none() {
                self.diagnostics.push("missing attachment".to_string());
                break;
            }
            if let Some(statement) = self.attempt(tier).await {
                return Ok(statement);
            }
        }
        Err(ResultUnavailable {
            details: self.diagnostics,
        })
    }

    async fn attempt(&mut self, tier: ResolutionTier) -> Option<StatementResponse> {
        match tier {
            ResolutionTier::AttachedStatement => {
                let statement_id = self.target.statement_id?;
                self.fetch_statement(statement_id).await
            }
            ResolutionTier::QueryResultDescriptor => {
                let attachment_id = self.target.attachment_id?;
                let (api, t) = (self.api, self.target);
                let result = self
                    .retry
                    .execute("get_attachment_query_result", t.timeout, || {
                        api.get_attachment_query_result(
                            t.space_id,
                            t.conversation_id,
                            t.message_id,
                            attachment_id,
                        )
                    })
                    .await;
                match result {
                    Ok(descriptor) => {
                        let statement_id = descriptor.statement_id()?.to_string();
                        self.fetch_statement(&statement_id).await
                    }
                    Err(e) => {
                        warn!(
                            space_id = %t.space_id,
                            attachment_id = %attachment_id,
                            error = %e,
                            "Attachment query-result fetch failed"
                        );
                        self.record(&e);
                        None
                    }
                }
            }
            ResolutionTier::ReExecute => {
                let attachment_id = self.target.attachment_id?;
                let (api, t) = (self.api, self.target);
                let result = self
                    .retry
                    .execute("execute_attachment_query", t.timeout, || {
                        api.execute_attachment_query(
                            t.space_id,
                            t.conversation_id,
                            t.message_id,
                            attachment_id,
                        )
                    })
                    .await;
                match result {
                    Ok(descriptor) => match descriptor.statement_id() {
                        Some(statement_id) => self.fetch_statement(statement_id).await,
                        None => {
                            self.diagnostics.push("no statement id".to_string());
                            None
                        }
                    },
                    Err(e) => {
                        error!(
                            space_id = %t.space_id,
                            attachment_id = %attachment_id,
                            error = %e,
                            "Attachment query re-execution failed"
                        );
                        self.record(&e);
                        None
                    }
                }
            }
        }
    }

    async fn fetch_statement(&mut self, statement_id: &str) -> Option<StatementResponse> {
        let api = self.api;
        let result = self
            .retry
            .execute("get_statement", self.target.timeout, || {
                api.get_statement(statement_id)
            })
            .await;
        match result {
            Ok(statement) => Some(statement),
            Err(e) => {
                warn!(
                    space_id = %self.target.space_id,
                    statement_id = %statement_id,
                    error = %e,
                    "Statement fetch failed"
                );
                self.record(&e);
                None
            }
        }
    }

    fn record(&mut self, err: &GenieError) {
        self.diagnostics.push(format!("{}: {}", err.kind(), err));
    }
}
