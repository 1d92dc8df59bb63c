//! ui::prompts
//!
//! Interactive prompts and confirmations.
//!
//! # Design
//!
//! Prompts are only shown in interactive mode. In non-interactive mode,
//! operations requiring user input must either have defaults or fail
//! with a clear error message.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

/// Prompt for confirmation (yes/no) on stdin.
///
/// An empty answer picks `default`. End of input cancels.
///
/// # Errors
///
/// [`PromptError::NotInteractive`] when `interactive` is false.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    ask(message, default, &mut stdin.lock(), &mut stdout)
}

fn ask(
    message: &str,
    default: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool, PromptError> {
    let choices = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{} {} ", message, choices).map_err(|e| PromptError::IoError(e.to_string()))?;
        output
            .flush()
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| PromptError::IoError(e.to_string()))?;
        if read == 0 {
            return Err(PromptError::Cancelled);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer y or n.")
                .map_err(|e| PromptError::IoError(e.to_string()))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(answers: &str, default: bool) -> Result<bool, PromptError> {
        let mut input = answers.as_bytes();
        let mut output = Vec::new();
        ask("Delete?", default, &mut input, &mut output)
    }

    #[test]
    fn non_interactive_fails() {
        assert!(matches!(
            confirm("Delete?", false, false),
            Err(PromptError::NotInteractive)
        ));
    }

    #[test]
    fn answers() {
        assert!(run("y\n", false).unwrap());
        assert!(!run("no\n", true).unwrap());
        assert!(run("\n", true).unwrap());
        assert!(!run("\n", false).unwrap());
        assert!(run("maybe\nYES\n", false).unwrap());
        assert!(matches!(run("", false), Err(PromptError::Cancelled)));
    }
}
