#![forbid(unsafe_code)]

use tracing::Level;

use healthlog_kernel_contracts::notes::parse_notes_line;
use healthlog_kernel_contracts::parse::ParseContext;
use healthlog_os::learned::LearnedPhraseLookup;
use healthlog_os::understand::{ModelExtractor, UnderstandingPipeline};

pub const USAGE: &str = "usage: healthlog <parse|notes|check-notes> <text>";

pub fn execute_command<M, L>(
    pipeline: &UnderstandingPipeline<M, L>,
    subcommand: &str,
    input: Option<&str>,
    ctx: &ParseContext,
) -> Result<String, String>
where
    M: ModelExtractor,
    L: LearnedPhraseLookup,
{
    match subcommand {
        "parse" => {
            let text = require_input(subcommand, input)?;
            let understanding = pipeline.understand(text, ctx);
            serde_json::to_string_pretty(&understanding)
                .map_err(|e| format!("failed to encode result: {e}"))
        }
        "notes" => {
            let text = require_input(subcommand, input)?;
            Ok(pipeline.understand(text, ctx).notes.rendered)
        }
        "check-notes" => {
            let line = require_input(subcommand, input)?;
            let parsed = parse_notes_line(line).map_err(|e| format!("invalid notes line: {e}"))?;
            let mut out = vec![format!("notes_v={}", parsed.version)];
            out.extend(parsed.tokens.iter().map(ToString::to_string));
            Ok(out.join("\n"))
        }
        _ => Err(format!(
            "unknown subcommand: {subcommand}. expected one of: parse, notes, check-notes"
        )),
    }
}

/// Log level from `HEALTHLOG_LOG`; anything unrecognized falls back to `warn`.
pub fn log_level(raw: Option<&str>) -> Level {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("error") => Level::ERROR,
        Some("info") => Level::INFO,
        Some("debug") => Level::DEBUG,
        Some("trace") => Level::TRACE,
        _ => Level::WARN,
    }
}

fn require_input<'a>(subcommand: &str, input: Option<&'a str>) -> Result<&'a str, String> {
    input.ok_or_else(|| format!("usage: healthlog {subcommand} <text>"))
}
