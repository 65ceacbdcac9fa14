//! Line-oriented prompting for the interactive commands.

use std::io::{BufRead, Write};

use anyhow::Result;
use services::PresentedQuestion;

/// What the learner typed at a question prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Index into the presented (shuffled) options.
    Choice(usize),
    Login(String),
    Quit,
    Unrecognized,
}

/// Accepts `A`..`Z` or `1`..`n`, `login <name>`, and `q`.
pub fn parse_reply(line: &str, options: usize) -> Reply {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
        return Reply::Quit;
    }
    if let Some(handle) = line.strip_prefix("login ") {
        let handle = handle.trim();
        if !handle.is_empty() {
            return Reply::Login(handle.to_string());
        }
    }

    let index = match line.as_bytes() {
        [c] if c.is_ascii_alphabetic() => Some(usize::from(c.to_ascii_uppercase() - b'A')),
        _ => line.parse::<usize>().ok().and_then(|n| n.checked_sub(1)),
    };
    match index {
        Some(i) if i < options => Reply::Choice(i),
        _ => Reply::Unrecognized,
    }
}

#[must_use]
pub fn option_label(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map_or('?', |i| char::from(b'A' + i))
}

#[must_use]
pub fn render_question(question: &PresentedQuestion) -> String {
    let mut out = format!("\n#{} {}\n", question.number, question.title);
    for (i, option) in question.options.iter().enumerate() {
        out.push_str(&format!("  {}. {option}\n", option_label(i)));
    }
    out
}

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    /// Prompt and read one line. `None` at end of input.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Proceed without asking when `assume_yes` is set. Otherwise only `y`/`yes` proceeds.
    pub fn confirm(&mut self, prompt: &str, assume_yes: bool) -> Result<bool> {
        if assume_yes {
            return Ok(true);
        }
        let answer = self.ask(&format!("{prompt} [y/N] "))?;
        Ok(answer.is_some_and(|a| {
            let a = a.trim();
            a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_numbers_select_options() {
        assert_eq!(parse_reply("b", 4), Reply::Choice(1));
        assert_eq!(parse_reply(" D \n", 4), Reply::Choice(3));
        assert_eq!(parse_reply("1", 4), Reply::Choice(0));
        assert_eq!(parse_reply("E", 4), Reply::Unrecognized);
        assert_eq!(parse_reply("0", 4), Reply::Unrecognized);
        assert_eq!(parse_reply("", 4), Reply::Unrecognized);
    }

    #[test]
    fn commands_are_recognized() {
        assert_eq!(parse_reply("q", 4), Reply::Quit);
        assert_eq!(parse_reply("login  bob ", 4), Reply::Login("bob".into()));
        assert_eq!(parse_reply("login ", 4), Reply::Unrecognized);
    }

    #[test]
    fn ask_reports_end_of_input() {
        let mut out = Vec::new();
        let mut term = Console::new(&b"a\n"[..], &mut out);
        assert_eq!(term.ask("> ").unwrap().as_deref(), Some("a\n"));
        assert_eq!(term.ask("> ").unwrap(), None);
        drop(term);
        assert_eq!(String::from_utf8(out).unwrap(), "> > ");
    }

    #[test]
    fn confirm_defaults_to_no() {
        let mut out = Vec::new();
        let mut term = Console::new(&b"Y\n\nnope\n"[..], &mut out);
        assert!(term.confirm("refresh?", false).unwrap());
        assert!(!term.confirm("refresh?", false).unwrap());
        assert!(!term.confirm("refresh?", false).unwrap());
        // end of input
        assert!(!term.confirm("refresh?", false).unwrap());
        assert!(term.confirm("refresh?", true).unwrap());
        drop(term);
        assert_eq!(String::from_utf8(out).unwrap().matches("[y/N]").count(), 4);
    }
}
