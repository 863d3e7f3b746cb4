//! Interactive confirmation before destructive operations
//!
//! Every delete path (pruning a backup set, replacing it during a backup,
//! discarding detached volumes after a restore) runs through a
//! [`ConfirmationGate`] so tests can script the decision and the production
//! binary can ask on stdin.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// Outcome of a delete confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The user chose to proceed with the deletion
    Delete,
    /// The user declined; nothing may be deleted
    Cancel,
}

/// Decision point in front of every deletion.
pub trait ConfirmationGate {
    /// Ask whether the listed resources should be deleted.
    ///
    /// `resource_label` is a plural noun for the prompt ("snapshots",
    /// "volumes"); `resource_ids` are shown to the user before asking.
    fn confirm_delete(&self, resource_label: &str, resource_ids: &[String]) -> Result<Confirmation>;
}

/// Gate that prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinGate;

impl ConfirmationGate for StdinGate {
    fn confirm_delete(&self, resource_label: &str, resource_ids: &[String]) -> Result<Confirmation> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        read_decision(&mut input, &mut output, resource_label, resource_ids)
    }
}

/// Prompt loop, split out so tests can drive it with in-memory IO.
///
/// Accepts exactly `d` (delete) or `c` (cancel); anything else re-prompts.
/// End of input is treated as cancel so a closed stdin can never authorize
/// a deletion.
pub(crate) fn read_decision(
    input: &mut impl BufRead,
    output: &mut impl Write,
    resource_label: &str,
    resource_ids: &[String],
) -> Result<Confirmation> {
    writeln!(
        output,
        "Are you sure you would like to delete the following {resource_label}?"
    )
    .context("Failed to write confirmation prompt")?;
    writeln!(output, "{}", resource_ids.join(" ")).context("Failed to write confirmation prompt")?;
    writeln!(output).context("Failed to write confirmation prompt")?;

    loop {
        write!(output, "Delete or cancel [d/c]? ").context("Failed to write confirmation prompt")?;
        output.flush().context("Failed to flush confirmation prompt")?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read confirmation response")?;
        if read == 0 {
            writeln!(output).context("Failed to write confirmation prompt")?;
            return Ok(Confirmation::Cancel);
        }

        match line.trim() {
            "d" => return Ok(Confirmation::Delete),
            "c" => return Ok(Confirmation::Cancel),
            other => {
                writeln!(output, "Unrecognized response '{other}', expected 'd' or 'c'.")
                    .context("Failed to write confirmation prompt")?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn run_gate(responses: &str, resource_ids: &[String]) -> (Confirmation, String) {
        let mut input = Cursor::new(responses.as_bytes().to_vec());
        let mut output = Vec::new();
        let decision = read_decision(&mut input, &mut output, "snapshots", resource_ids)
            .expect("in-memory IO cannot fail");
        (decision, String::from_utf8(output).expect("prompt is UTF-8"))
    }

    #[test]
    fn test_delete_on_d() {
        let (decision, output) = run_gate("d\n", &ids(&["snap-1", "snap-2"]));
        assert_eq!(decision, Confirmation::Delete);
        assert!(output.contains("snap-1 snap-2"));
        assert!(output.contains("delete the following snapshots?"));
    }

    #[test]
    fn test_cancel_on_c() {
        let (decision, _) = run_gate("c\n", &ids(&["snap-1"]));
        assert_eq!(decision, Confirmation::Cancel);
    }

    #[test]
    fn test_reprompts_until_recognized() {
        let (decision, output) = run_gate("x\nx\nc\n", &ids(&["vol-1"]));
        assert_eq!(decision, Confirmation::Cancel);
        assert_eq!(output.matches("Delete or cancel [d/c]?").count(), 3);
        assert_eq!(output.matches("Unrecognized response").count(), 2);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let (decision, _) = run_gate("  d  \n", &ids(&["snap-1"]));
        assert_eq!(decision, Confirmation::Delete);
    }

    #[test]
    fn test_eof_is_cancel() {
        let (decision, _) = run_gate("", &ids(&["snap-1"]));
        assert_eq!(decision, Confirmation::Cancel);
    }

    #[test]
    fn test_uppercase_is_not_accepted() {
        let (decision, output) = run_gate("D\nd\n", &ids(&["snap-1"]));
        assert_eq!(decision, Confirmation::Delete);
        assert!(output.contains("Unrecognized response 'D'"));
    }
}
