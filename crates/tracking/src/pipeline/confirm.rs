//! Interactive confirmation of the calibration candidate.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::pipeline::motor::Pixel;

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("confirmation input closed")]
    Closed,
    #[error("confirmation prompt failed: {0}")]
    Io(#[from] io::Error),
}

/// Blocking yes/no decision on a calibration candidate.
pub trait Confirm {
    fn confirm(&mut self, candidate: Pixel) -> Result<bool, ConfirmError>;
}

impl<F> Confirm for F
where
    F: FnMut(Pixel) -> Result<bool, ConfirmError>,
{
    fn confirm(&mut self, candidate: Pixel) -> Result<bool, ConfirmError> {
        self(candidate)
    }
}

/// Prompts on `output` and reads one line from `input`. Only `y` accepts.
pub struct PromptConfirmer<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptConfirmer<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the terminal.
    pub fn terminal() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirmer<R, W> {
    fn confirm(&mut self, candidate: Pixel) -> Result<bool, ConfirmError> {
        writeln!(
            self.output,
            "About to set reference to x0={} y0={}",
            candidate.x, candidate.y
        )?;
        writeln!(
            self.output,
            "Press 'y' then Enter to validate, or just Enter to retry"
        )?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(ConfirmError::Closed);
        }
        Ok(line.trim().eq_ignore_ascii_case("y"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn answer(input: &str) -> (Result<bool, ConfirmError>, String) {
        let mut out = Vec::new();
        let result = PromptConfirmer::new(Cursor::new(input), &mut out).confirm(Pixel::new(20, 30));
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn only_y_accepts() {
        assert!(answer("y\n").0.unwrap());
        assert!(answer("  Y \n").0.unwrap());
        assert!(!answer("\n").0.unwrap());
        assert!(!answer("yes\n").0.unwrap());
        assert!(!answer("n\n").0.unwrap());
    }

    #[test]
    fn prompt_names_the_candidate() {
        let (_, printed) = answer("y\n");
        assert!(printed.contains("x0=20 y0=30"));
    }

    #[test]
    fn closed_input_is_an_error() {
        assert!(matches!(answer("").0, Err(ConfirmError::Closed)));
    }

    #[test]
    fn closures_confirm() {
        let mut seen = Vec::new();
        let mut confirmer = |p: Pixel| -> Result<bool, ConfirmError> {
            seen.push(p);
            Ok(true)
        };
        assert!(confirmer.confirm(Pixel::new(1, 2)).unwrap());
        assert_eq!(seen, vec![Pixel::new(1, 2)]);
    }
}
