//! Prompt rendering for the planners and the reviewer.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::types::{Feedback, IssueText, PlanKind};
use crate::io::github::PrFile;

const PLAN_TEXT_SYSTEM: &str = include_str!("prompts/plan_text.md");
const PLAN_STRUCTURED_SYSTEM: &str = include_str!("prompts/plan_structured.md");
const FIX_TEXT_SYSTEM: &str = include_str!("prompts/fix_text.md");
const FIX_STRUCTURED_SYSTEM: &str = include_str!("prompts/fix_structured.md");
const REVIEW_SYSTEM: &str = include_str!("prompts/review_system.md");

const IMPLEMENT_USER_TEMPLATE: &str = include_str!("prompts/implement_user.md");
const FIX_USER_TEMPLATE: &str = include_str!("prompts/fix_user.md");
const REVIEW_USER_TEMPLATE: &str = include_str!("prompts/review_user.md");

/// How the planner asks for its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Free text carrying a base64-encoded JSON plan.
    Text,
    /// Schema-constrained JSON with plain content.
    Structured,
}

/// System prompt for a planner.
pub fn plan_system_prompt(kind: PlanKind, mode: OutputMode) -> &'static str {
    let prompt = match (kind, mode) {
        (PlanKind::Implement, OutputMode::Text) => PLAN_TEXT_SYSTEM,
        (PlanKind::Implement, OutputMode::Structured) => PLAN_STRUCTURED_SYSTEM,
        (PlanKind::Fix, OutputMode::Text) => FIX_TEXT_SYSTEM,
        (PlanKind::Fix, OutputMode::Structured) => FIX_STRUCTURED_SYSTEM,
    };
    prompt.trim_end()
}

pub fn review_system_prompt() -> &'static str {
    REVIEW_SYSTEM.trim_end()
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("implement_user", IMPLEMENT_USER_TEMPLATE)
            .expect("implement template should be valid");
        env.add_template("fix_user", FIX_USER_TEMPLATE)
            .expect("fix template should be valid");
        env.add_template("review_user", REVIEW_USER_TEMPLATE)
            .expect("review template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let rendered = self
            .env
            .get_template(name)?
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered.trim_end().to_string())
    }
}

/// User prompt asking for an implementation of `issue`.
///
/// `repo_context` is appended after a blank line when non-empty.
pub fn render_implement_prompt(issue: &IssueText, repo_context: &str) -> Result<String> {
    PromptEngine::new().render(
        "implement_user",
        context! {
            title => issue.title.as_str(),
            body => issue.body.as_str(),
            repo_context => (!repo_context.trim().is_empty()).then_some(repo_context),
        },
    )
}

/// User prompt asking for fixes of an existing pull request.
pub fn render_fix_prompt(issue: &IssueText, diff: &str, feedback: &[Feedback]) -> Result<String> {
    let bullets = feedback
        .iter()
        .map(|item| format!("- {}", item.display_text()))
        .collect::<Vec<_>>()
        .join("\n");
    PromptEngine::new().render(
        "fix_user",
        context! {
            title => issue.title.as_str(),
            body => issue.body.as_str(),
            diff => diff,
            feedback => bullets,
        },
    )
}

/// User prompt for the reviewer.
pub fn render_review_prompt(
    issue: &IssueText,
    diff: &str,
    files: &[PrFile],
    ci_summary: &str,
) -> Result<String> {
    let files_text = files
        .iter()
        .map(|file| {
            format!(
                "### {}\n```\n{}\n```",
                file.filename,
                file.patch.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    PromptEngine::new().render(
        "review_user",
        context! {
            title => issue.title.as_str(),
            body => issue.body.as_str(),
            diff => diff,
            files => files_text,
            ci_summary => ci_summary,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> IssueText {
        IssueText {
            number: 4,
            title: "Add greeting".to_string(),
            body: "Print hello.".to_string(),
        }
    }

    #[test]
    fn implement_prompt_without_context() {
        let prompt = render_implement_prompt(&issue(), "").expect("render");
        assert_eq!(prompt, "Issue title: Add greeting\n\nIssue body:\nPrint hello.");
    }

    #[test]
    fn implement_prompt_appends_context() {
        let prompt =
            render_implement_prompt(&issue(), "Current repo files (path -> content):\n\n--- a.py ---\nx")
                .expect("render");
        assert!(
            prompt.ends_with("Print hello.\n\nCurrent repo files (path -> content):\n\n--- a.py ---\nx")
        );
    }

    #[test]
    fn fix_prompt_lists_feedback_bullets() {
        let feedback = vec![
            Feedback {
                body: "Rename x".to_string(),
                path: Some("a.py".to_string()),
            },
            Feedback {
                body: String::new(),
                path: Some("b.py".to_string()),
            },
        ];
        let prompt = render_fix_prompt(&issue(), "DIFF", &feedback).expect("render");
        assert!(
            prompt.contains("PR diff:\nDIFF\n\nReviewer feedback:\n- Rename x\n- b.py\n\nProduce")
        );
    }

    #[test]
    fn review_prompt_includes_files_and_ci() {
        let files = vec![PrFile {
            filename: "a.py".to_string(),
            patch: Some("+x".to_string()),
        }];
        let prompt = render_review_prompt(&issue(), "D", &files, "all green").expect("render");
        assert!(prompt.contains("Files:\n### a.py\n```\n+x\n```"));
        assert!(prompt.ends_with("CI summary:\nall green"));
    }

    #[test]
    fn text_prompts_demand_base64() {
        for kind in [PlanKind::Implement, PlanKind::Fix] {
            assert!(plan_system_prompt(kind, OutputMode::Text).contains("content_base64"));
            assert!(!plan_system_prompt(kind, OutputMode::Structured).contains("content_base64"));
        }
        assert!(review_system_prompt().contains("VERDICT: CHANGES_REQUESTED"));
    }

    #[test]
    fn values_are_not_html_escaped() {
        let issue = IssueText {
            number: 1,
            title: "<b>&</b>".to_string(),
            body: "\"q\"".to_string(),
        };
        let prompt = render_implement_prompt(&issue, "").expect("render");
        assert!(prompt.contains("<b>&</b>"));
        assert!(prompt.contains("\"q\""));
    }
}
