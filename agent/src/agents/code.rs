//! Code agent: plans edits for an issue (or fixes for a PR) and applies them.

use std::path::Path;

use anyhow::Result;
use tracing::instrument;

use crate::core::types::{Feedback, IssueText, Plan, PlanKind};
use crate::io::apply::{ApplyReport, apply_plan};
use crate::io::config::ContextSettings;
use crate::io::llm::ChatClient;
use crate::io::prompt::{render_fix_prompt, render_implement_prompt};
use crate::io::repo_context::repo_context;

use super::planner::plan_with;

pub struct CodeAgent<'a> {
    chat: &'a dyn ChatClient,
    workspace: &'a Path,
    context: ContextSettings,
    structured: bool,
}

impl<'a> CodeAgent<'a> {
    pub fn new(
        chat: &'a dyn ChatClient,
        workspace: &'a Path,
        context: ContextSettings,
        structured: bool,
    ) -> Self {
        Self {
            chat,
            workspace,
            context,
            structured,
        }
    }

    /// Plan an implementation of `issue`, showing the model the current files.
    #[instrument(skip_all, fields(issue = issue.number))]
    pub fn plan_changes(&self, issue: &IssueText) -> Result<Plan> {
        let context = repo_context(self.workspace, &self.context);
        let prompt = render_implement_prompt(issue, &context)?;
        plan_with(self.chat, self.structured, PlanKind::Implement, prompt)
    }

    /// Plan fixes for an existing PR from its diff and reviewer feedback.
    #[instrument(skip_all, fields(issue = issue.number, feedback = feedback.len()))]
    pub fn plan_fixes(&self, issue: &IssueText, diff: &str, feedback: &[Feedback]) -> Result<Plan> {
        let prompt = render_fix_prompt(issue, diff, feedback)?;
        plan_with(self.chat, self.structured, PlanKind::Fix, prompt)
    }

    pub fn apply_plan(&self, plan: &Plan) -> Result<ApplyReport> {
        apply_plan(self.workspace, plan)
    }
}
