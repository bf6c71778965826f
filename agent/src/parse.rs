//! `agent parse-plan`: run the text pipeline on a saved model reply.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::plan::{PlanOutcome, parse_plan};

/// Read the reply from `input`, or stdin when `None`.
pub fn read_reply(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path).with_context(|| format!("read {}", path.display())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("read reply from stdin")?;
            Ok(raw)
        }
    }
}

pub fn parse_reply(input: Option<&Path>) -> Result<PlanOutcome> {
    Ok(parse_plan(&read_reply(input)?))
}

/// Pretty JSON of the recovered plan, newline-terminated.
pub fn render_outcome(outcome: &PlanOutcome) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(&outcome.plan).context("serialize plan")?;
    payload.push('\n');
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_reply_from_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("reply.txt");
        fs::write(
            &path,
            "```json\n{\"files\":[{\"path\":\"a.py\",\"content_base64\":\"eD0x\"}]}\n```",
        )
        .expect("write");
        let outcome = parse_reply(Some(&path)).expect("parse");
        assert_eq!(outcome.plan.paths(), vec!["a.py"]);
        let rendered = render_outcome(&outcome).expect("render");
        assert!(rendered.contains("\"content\": \"x=1\""));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(parse_reply(Some(&temp.path().join("nope"))).is_err());
    }

    #[test]
    fn empty_plan_renders_empty_files_list() {
        let rendered = render_outcome(&parse_plan("no json here")).expect("render");
        assert_eq!(rendered, "{\n  \"files\": []\n}\n");
    }
}
