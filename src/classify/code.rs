use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::model::CodeBlock;

/// Whole-word keywords, so prose like "format" or "important" does not count.
static CODE_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:function|def|class|if|else|for|while|return|import|from|include|void|int|string|Algorithm|BEGIN|END)\b|\b(?:Input|Output):",
    )
    .expect("Invalid code keyword regex")
});

const CODE_CHARS: &[char] = &['{', '}', '(', ')', ';', '='];

#[derive(Debug, Clone)]
pub struct CodeBlockDetector {
    pub min_lines: usize,
}

impl Default for CodeBlockDetector {
    fn default() -> Self {
        Self { min_lines: 3 }
    }
}

impl CodeBlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_code_line(&self, line: &str) -> bool {
        let stripped = line.trim();
        if CODE_KEYWORD.is_match(stripped) {
            return true;
        }
        let indent = line.len() - line.trim_start().len();
        stripped.contains(CODE_CHARS) && indent >= 2
    }

    pub fn detect(&self, text: &str) -> Vec<CodeBlock> {
        let mut blocks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.split('\n') {
            if self.is_code_line(line) {
                current.push(line);
            } else if !current.is_empty() && line.trim().is_empty() {
                current.push(line);
            } else {
                self.close(&mut current, &mut blocks);
            }
        }
        self.close(&mut current, &mut blocks);

        debug!(count = blocks.len(), "code blocks detected");
        blocks
    }

    fn close(&self, current: &mut Vec<&str>, blocks: &mut Vec<CodeBlock>) {
        while current.last().is_some_and(|line| line.trim().is_empty()) {
            current.pop();
        }
        if current.len() >= self.min_lines {
            let lines: Vec<String> = current.iter().map(|line| line.to_string()).collect();
            let language = guess_language(&lines).to_string();
            blocks.push(CodeBlock { lines, language });
        }
        current.clear();
    }
}

pub fn guess_language(lines: &[String]) -> &'static str {
    let code = lines.join("\n").to_lowercase();
    if code.contains("def ") || code.contains("import ") {
        "python"
    } else if code.contains("function") && (code.contains('{') || code.contains('}')) {
        "javascript"
    } else if code.contains("#include") || code.contains("int main") {
        "cpp"
    } else if code.contains("public class") || code.contains("public static void") {
        "java"
    } else if code.contains("algorithm") || code.contains("input:") {
        "pseudocode"
    } else {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn detects_python_function() {
        let text = "Intro paragraph.\ndef area(r):\n    pi = 3.14\n\n    return pi * r * r\nThe end.";
        let blocks = CodeBlockDetector::new().detect(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].lines.len(), 4);
    }

    #[test]
    fn trailing_blank_lines_do_not_count() {
        let text = "if x:\n    y = 1;\n\n\nplain words";
        assert!(CodeBlockDetector::new().detect(text).is_empty());
    }

    #[test]
    fn guesses_languages_from_signatures() {
        let lines = |text: &str| text.lines().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(guess_language(&lines("function f() {\n}")), "javascript");
        assert_eq!(guess_language(&lines("#include <stdio.h>\nint main()")), "cpp");
        assert_eq!(guess_language(&lines("public class Main {")), "java");
        assert_eq!(guess_language(&lines("Algorithm 1\nInput: n")), "pseudocode");
        assert_eq!(guess_language(&lines("BEGIN\nEND")), "text");
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let detector = CodeBlockDetector::new();
        assert!(!detector.is_code_line("An important format"));
        assert!(detector.is_code_line("for i in range(3):"));
        assert!(detector.is_code_line("  x = f(y);"));
        assert!(!detector.is_code_line("x = f(y)"));
    }
}
