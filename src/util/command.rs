//! Running external helper tools (`nvidia-smi`, `pstree`, `lscpu`).

use std::process::{Command, Stdio};

use tracing::debug;

use crate::collector::CollectError;

/// Captured stdout of a helper tool, split into lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

/// Runs `argv[0]` with the remaining arguments and captures its stdout.
///
/// Fails if the tool cannot be spawned or exits non-zero. Stderr is
/// discarded.
pub fn run_command(argv: &[&str]) -> Result<CommandOutput, CollectError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| CollectError::Command("empty command line".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| CollectError::Command(format!("{}: {}", program, e)))?;

    if !output.status.success() {
        return Err(CollectError::Command(format!(
            "{} exited with {}",
            argv.join(" "),
            output.status
        )));
    }

    let lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect();
    debug!(command = program, lines = lines.len(), "helper finished");
    Ok(CommandOutput { lines })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_captures_lines() {
        let out = run_command(&["printf", "a\\nb\\n"]).unwrap();
        assert_eq!(out.lines, vec!["a", "b"]);
    }

    #[test]
    fn test_run_command_failures() {
        assert!(matches!(run_command(&[]), Err(CollectError::Command(_))));
        assert!(matches!(
            run_command(&["treemon-no-such-tool-xyz"]),
            Err(CollectError::Command(_))
        ));
        assert!(matches!(run_command(&["false"]), Err(CollectError::Command(_))));
    }
}
