//! Indented console output for blueprint dumps.

const INDENT: &str = "  ";

/// Collects indented lines and mirrors each one to `tracing` under the
/// `query_blueprint` target.
#[derive(Debug, Default)]
pub struct ConsoleLogger {
    indent: usize,
    lines: Vec<String>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn printf(&mut self, text: impl AsRef<str>) {
        let line = format!("{}{}", INDENT.repeat(self.indent), text.as_ref());
        tracing::info!(target: "query_blueprint", "{}", line);
        self.lines.push(line);
    }

    pub fn push_indent(&mut self) {
        self.indent += 1;
    }

    /// Unbalanced pops stay at column zero.
    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_text(self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_nested_lines() {
        let mut logger = ConsoleLogger::new();
        logger.printf("root");
        logger.push_indent();
        logger.printf("child");
        logger.pop_indent();
        logger.pop_indent();
        logger.printf("sibling");
        assert_eq!(logger.lines(), ["root", "  child", "sibling"]);
        assert_eq!(logger.into_text(), "root\n  child\nsibling");
    }
}
