use std::io::{IsTerminal, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";

// Decides how operator facing text is decorated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputStyle {
    pub color: bool,
}

impl OutputStyle {
    // Colors are used only if enabled, NO_COLOR is unset and stdout is a terminal
    pub fn detect(enabled: bool) -> Self {
        Self {
            color: enabled
                && std::env::var_os("NO_COLOR").is_none()
                && std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    pub fn info(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }

    pub fn success(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    pub fn warning(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    pub fn error(&self, text: &str) -> String {
        self.paint(RED, text)
    }
}

// Operator dialogue: prompts read from the input, everything else
// is written to the output
pub struct Console<R, W> {
    input: R,
    output: W,
    style: OutputStyle,
}

impl Console<BufReader<Stdin>, std::io::Stdout> {
    pub fn stdio(style: OutputStyle) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout(), style)
    }
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(input: R, output: W, style: OutputStyle) -> Self {
        Self {
            input,
            output,
            style,
        }
    }

    pub fn style(&self) -> OutputStyle {
        self.style
    }

    // Write a full line, output failures are not worth aborting for
    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.output, "{text}");
    }

    pub fn info(&mut self, text: &str) {
        let text = self.style.info(text);
        self.line(&text);
    }

    pub fn success(&mut self, text: &str) {
        let text = self.style.success(text);
        self.line(&text);
    }

    pub fn warning(&mut self, text: &str) {
        let text = self.style.warning(text);
        self.line(&text);
    }

    pub fn error(&mut self, text: &str) {
        let text = self.style.error(text);
        self.line(&text);
    }

    // Print the prompt and read one trimmed line.
    // Returns None once the input is closed
    pub async fn prompt(&mut self, question: &str) -> Result<Option<String>> {
        let _ = write!(self.output, "{question}");
        let _ = self.output.flush();

        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .await
            .context("Failed to read from the terminal")?;

        if read == 0 {
            return Ok(None);
        }

        Ok(Some(answer.trim().to_string()))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_style_leaves_text_alone() {
        let style = OutputStyle { color: false };
        assert_eq!(style.warning("careful"), "careful");
    }

    #[test]
    fn colored_style_wraps_text() {
        let style = OutputStyle { color: true };
        assert_eq!(style.error("boom"), "\x1b[31mboom\x1b[0m");
    }

    #[tokio::test]
    async fn prompt_trims_and_detects_end_of_input() {
        let mut console =
            Console::new(&b"  42 \n"[..], Vec::new(), OutputStyle::default());

        assert_eq!(console.prompt("Value: ").await.unwrap(), Some("42".to_string()));
        assert_eq!(console.prompt("Value: ").await.unwrap(), None);

        let output = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(output, "Value: Value: ");
    }
}
