//! Issue-to-pull-request coding agent.
//!
//! `agent code` turns an issue into a pushed branch and a pull request,
//! `agent review` posts a model review on a pull request, and
//! `agent parse-plan` replays the plan pipeline on a saved model reply.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use agent::code::{CodeOutcome, CodeRequest, run_code};
use agent::exit_codes;
use agent::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_settings};
use agent::io::github::GitHubClient;
use agent::io::llm::create_chat_client;
use agent::io::workspace::target_repo;
use agent::logging;
use agent::parse::{parse_reply, render_outcome};
use agent::review::{ReviewRequest, run_review};

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Coding agent: issue -> code -> pull request, plus PR review"
)]
struct Cli {
    /// Settings file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Implement an issue (or fix an existing PR) and push a pull request.
    Code {
        /// Issue number.
        #[arg(long)]
        issue: u64,
        /// Existing pull request to update from reviewer feedback.
        #[arg(long)]
        pr: Option<u64>,
        /// Working copy to edit instead of a managed clone.
        #[arg(long)]
        repo_path: Option<PathBuf>,
        /// Print the issue sent to the model and log at info level.
        #[arg(short, long)]
        verbose: bool,
        /// Clone into a temporary directory instead of the cache.
        #[arg(long)]
        no_cache: bool,
    },
    /// Review a pull request against its issue and post a comment.
    #[command(alias = "reviewer")]
    Review {
        /// Pull request number.
        #[arg(long)]
        pr: u64,
        /// Issue number holding the requirements.
        #[arg(long)]
        issue: u64,
        /// CI jobs summary (falls back to `CI_SUMMARY`).
        #[arg(long)]
        ci_summary: Option<String>,
    },
    /// Recover a plan from a saved model reply (file or stdin) and print it as JSON.
    ParsePlan {
        /// Reply file; stdin when omitted.
        file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Command::Code { verbose: true, .. });
    logging::init(if verbose { "info" } else { "warn" });

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Code {
            issue,
            pr,
            repo_path,
            verbose,
            no_cache,
        } => cmd_code(
            &cli.config,
            CodeRequest {
                issue,
                pr,
                repo_path,
                verbose,
                no_cache,
            },
        ),
        Command::Review {
            pr,
            issue,
            ci_summary,
        } => cmd_review(
            &cli.config,
            ReviewRequest {
                pr,
                issue,
                ci_summary,
            },
        ),
        Command::ParsePlan { file } => cmd_parse_plan(file.as_deref()),
    }
}

fn load_config(path: &Path) -> Result<AgentConfig> {
    Ok(AgentConfig::from_env(load_settings(path)?))
}

fn tracker_for(config: &AgentConfig, checkout: &Path) -> Result<GitHubClient> {
    let token = config.require_github_token()?;
    GitHubClient::new(&config.api_url, token, target_repo(config, checkout)?)
}

fn cmd_code(config_path: &Path, request: CodeRequest) -> Result<i32> {
    let config = load_config(config_path)?;
    config.require_github_token()?;
    let chat = create_chat_client(&config)?;
    let checkout = request.repo_path.as_deref().unwrap_or(&config.workspace);
    let tracker = tracker_for(&config, checkout)?;

    match run_code(&config, &tracker, chat.as_ref(), &request)? {
        CodeOutcome::NoChanges => {
            eprintln!(
                "No changes planned (LLM returned empty or invalid plan). \
                 Check that the issue has a clear task and that the model supports JSON output."
            );
        }
        CodeOutcome::Pushed(pushed) => {
            if pushed.created {
                println!("Opened pull request {}", pushed.pull.html_url);
            } else {
                println!("Updated pull request {}", pushed.pull.html_url);
            }
            if let Some(dir) = pushed.temp_clone {
                eprintln!(
                    "Temp clone at {} (remove manually if not needed)",
                    dir.display()
                );
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_review(config_path: &Path, request: ReviewRequest) -> Result<i32> {
    let config = load_config(config_path)?;
    config.require_github_token()?;
    let chat = create_chat_client(&config)?;
    let tracker = tracker_for(&config, &config.workspace)?;

    run_review(&config, &tracker, chat.as_ref(), &request)?;
    println!("Review posted");
    Ok(exit_codes::OK)
}

fn cmd_parse_plan(file: Option<&Path>) -> Result<i32> {
    let outcome = parse_reply(file)?;
    if let Some(diagnostic) = &outcome.diagnostic {
        eprintln!("No plan recovered: {diagnostic}");
    }
    print!("{}", render_outcome(&outcome)?);
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_code_flags() {
        let cli = Cli::parse_from([
            "agent", "code", "--issue", "3", "--pr", "8", "-v", "--no-cache",
        ]);
        match cli.command {
            Command::Code {
                issue,
                pr,
                verbose,
                no_cache,
                repo_path,
            } => {
                assert_eq!(issue, 3);
                assert_eq!(pr, Some(8));
                assert!(verbose && no_cache);
                assert!(repo_path.is_none());
            }
            _ => panic!("expected code command"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_review_alias_and_global_config() {
        let cli = Cli::parse_from([
            "agent", "reviewer", "--pr", "2", "--issue", "1", "--config", "x.toml",
        ]);
        assert!(matches!(
            cli.command,
            Command::Review {
                pr: 2,
                issue: 1,
                ci_summary: None
            }
        ));
        assert_eq!(cli.config, PathBuf::from("x.toml"));
    }

    #[test]
    fn parse_plan_file_is_optional() {
        let cli = Cli::parse_from(["agent", "parse-plan"]);
        assert!(matches!(cli.command, Command::ParsePlan { file: None }));
    }
}
