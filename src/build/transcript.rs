//! The build transcript: one linear log per job, mailed to the pusher.

use std::fmt::Write as _;

use super::command::CommandOutput;

/// Append-only text log of a single build.
///
/// Owned by exactly one job; never shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript::default()
    }

    /// Appends one line.
    pub fn line(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    /// Appends a labelled value, aligned like the parameter block.
    pub fn field(&mut self, label: &str, value: impl std::fmt::Display) {
        // Writing to a String cannot fail.
        let _ = writeln!(self.text, "{:<8} {}", format!("{label}:"), value);
    }

    /// Starts a new step section, separated by a blank line.
    pub fn heading(&mut self, heading: &str) {
        self.text.push('\n');
        self.line(heading);
    }

    /// Appends a command's combined output, ending on a newline.
    pub fn output(&mut self, output: &CommandOutput) {
        if output.output.is_empty() {
            return;
        }
        self.text.push_str(&String::from_utf8_lossy(&output.output));
        if !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_aligned() {
        let mut t = Transcript::new();
        t.field("repo", "yavdr-base");
        t.field("git_url", "git://x");
        t.field("version_suffix", "-0yavdr0~trusty");
        assert_eq!(
            t.as_str(),
            "repo:    yavdr-base\ngit_url: git://x\nversion_suffix: -0yavdr0~trusty\n"
        );
    }

    #[test]
    fn output_is_appended_as_written() {
        let mut t = Transcript::new();
        t.heading("checkout sourcecode");
        t.output(&CommandOutput::failure(128, "fatal: no such branch\nout"));
        assert_eq!(t.as_str(), "\ncheckout sourcecode\nfatal: no such branch\nout\n");
    }

    #[test]
    fn empty_output_adds_nothing() {
        let mut t = Transcript::new();
        t.output(&CommandOutput::success(""));
        assert!(t.as_str().is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut t = Transcript::new();
        t.output(&CommandOutput::success(vec![b'a', 0xff, b'\n']));
        assert_eq!(t.into_string(), "a\u{fffd}\n");
    }
}
