//! FileCheck-style validation of generated kernel source.
//!
//! This module parses CHECK directives from a directive text (one per line,
//! optionally behind a `//`, `;` or `#` comment marker) and validates output
//! against them, similar to LLVM's FileCheck tool but implemented in a
//! Rust-native way. Matching is plain substring matching.

/// A CHECK directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match pattern at or after the current line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Pattern absent up to the next positive match
    CheckNot(String),
    /// CHECK-COUNT-n: pattern - Pattern matched n times in order
    CheckCount(usize, String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// Directives extracted from a directive text.
#[derive(Debug)]
pub struct CheckSpec {
    pub check_directives: Vec<CheckDirective>,
    /// Lines that are not directives.
    pub content: String,
}

fn strip_comment_marker(line: &str) -> &str {
    let trimmed = line.trim();
    for marker in ["//", ";", "#"] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest.trim();
        }
    }
    trimmed
}

fn parse_directive(line: &str) -> Result<Option<CheckDirective>, String> {
    let text = strip_comment_marker(line);

    if let Some(pattern) = text.strip_prefix("CHECK-LABEL:") {
        return Ok(Some(CheckDirective::CheckLabel(pattern.trim().to_string())));
    }
    if let Some(pattern) = text.strip_prefix("CHECK-NEXT:") {
        return Ok(Some(CheckDirective::CheckNext(pattern.trim().to_string())));
    }
    if let Some(pattern) = text.strip_prefix("CHECK-NOT:") {
        return Ok(Some(CheckDirective::CheckNot(pattern.trim().to_string())));
    }
    if text.starts_with("CHECK-EMPTY") {
        return Ok(Some(CheckDirective::CheckEmpty));
    }
    if let Some(rest) = text.strip_prefix("CHECK-COUNT-") {
        let Some((count, pattern)) = rest.split_once(':') else {
            return Err(format!("CHECK-COUNT: missing ':' in '{}'", line.trim()));
        };
        let count = count
            .trim()
            .parse::<usize>()
            .map_err(|_| format!("CHECK-COUNT: invalid count in '{}'", line.trim()))?;
        return Ok(Some(CheckDirective::CheckCount(count, pattern.trim().to_string())));
    }
    if let Some(pattern) = text.strip_prefix("CHECK:") {
        return Ok(Some(CheckDirective::Check(pattern.trim().to_string())));
    }
    if let Some(comment) = text.strip_prefix("COM:") {
        return Ok(Some(CheckDirective::Comment(comment.trim().to_string())));
    }
    Ok(None)
}

impl CheckSpec {
    /// Parse a directive text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut check_directives = Vec::new();
        let mut lines = Vec::new();

        for line in content.lines() {
            match parse_directive(line)? {
                Some(directive) => check_directives.push(directive),
                None => lines.push(line),
            }
        }

        Ok(CheckSpec {
            check_directives,
            content: lines.join("\n"),
        })
    }
}

/// Validates output against CHECK directives.
pub struct Checker {
    verbose: bool,
}

impl Checker {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn find(
        &self,
        lines: &[&str],
        from: usize,
        pattern: &str,
        not: &mut Vec<String>,
    ) -> Option<usize> {
        let Some(pos) = lines.iter().skip(from).position(|line| line.contains(pattern)) else {
            not.clear();
            return None;
        };
        let idx = pos + from;
        if let Some(bad) = Self::violated_not(lines, from, idx, not) {
            log::debug!("CHECK-NOT: '{}' found before '{}'", bad, pattern);
            not.clear();
            not.push(bad);
            return None;
        }
        not.clear();
        Some(idx)
    }

    fn violated_not(lines: &[&str], from: usize, to: usize, not: &[String]) -> Option<String> {
        not.iter()
            .find(|pattern| {
                lines[from.min(lines.len())..to.min(lines.len())]
                    .iter()
                    .any(|line| line.contains(pattern.as_str()))
            })
            .cloned()
    }

    /// Validate output against CHECK directives.
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<String> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.clone()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    match self.find(&output_lines, line_idx, pattern, &mut pending_not) {
                        Some(idx) => {
                            line_idx = idx + 1;
                            if self.verbose {
                                println!("CHECK: '{}' found at line {}", pattern, idx);
                            }
                        }
                        None if !pending_not.is_empty() => {
                            return Err(format!(
                                "CHECK-NOT: pattern '{}' found before '{}'",
                                pending_not[0], pattern
                            ));
                        }
                        None => {
                            return Err(format!(
                                "CHECK: pattern '{}' not found in output",
                                pattern
                            ));
                        }
                    }
                }

                CheckDirective::CheckCount(count, pattern) => {
                    for n in 0..*count {
                        match self.find(&output_lines, line_idx, pattern, &mut pending_not) {
                            Some(idx) => line_idx = idx + 1,
                            None if !pending_not.is_empty() => {
                                return Err(format!(
                                    "CHECK-NOT: pattern '{}' found before '{}'",
                                    pending_not[0], pattern
                                ));
                            }
                            None => {
                                return Err(format!(
                                    "CHECK-COUNT-{}: pattern '{}' found only {} time(s)",
                                    count, pattern, n
                                ));
                            }
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        if let Some(bad) =
            Self::violated_not(&output_lines, line_idx, output_lines.len(), &pending_not)
        {
            return Err(format!("CHECK-NOT: pattern '{}' found in output", bad));
        }

        Ok(())
    }
}

/// Parse `directives` and validate `output` against them.
pub fn check_output(output: &str, directives: &str) -> Result<(), String> {
    let spec = CheckSpec::parse(directives)?;
    Checker::new(false).validate_output(output, &spec.check_directives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"// CHECK: #include "typehint.h"
// CHECK-LABEL: void vector_add(
// CHECK-NEXT: float VMEM_SPACE a[256];
// CHECK-NOT: float8_128
// CHECK-COUNT-2: dlc_dma_new(
; COM: This is a comment
void f();"#;

        let spec = CheckSpec::parse(content).unwrap();
        assert_eq!(spec.check_directives.len(), 6);
        assert_eq!(
            spec.check_directives[4],
            CheckDirective::CheckCount(2, "dlc_dma_new(".to_string())
        );
        assert!(spec.content.contains("void f();"));
    }

    #[test]
    fn test_bad_count_is_rejected() {
        assert!(CheckSpec::parse("// CHECK-COUNT-x: foo").is_err());
    }

    #[test]
    fn test_check_matching() {
        let output = "header\nvoid k(int cid) {\n  a();\n}\n";
        check_output(
            output,
            "CHECK: header\nCHECK-LABEL: void k(\nCHECK-NEXT: a();\nCHECK-NEXT: }\nCHECK-EMPTY",
        )
        .unwrap();
    }

    #[test]
    fn test_check_next_failure() {
        let output = "Line 1\nLine 2\nLine 3\n";
        let result = check_output(output, "CHECK: Line 1\nCHECK-NEXT: Line 3");
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_check_not() {
        let output = "a\nb\nc\n";
        check_output(output, "CHECK: a\nCHECK-NOT: x\nCHECK: c").unwrap();
        let err = check_output(output, "CHECK: a\nCHECK-NOT: b\nCHECK: c").unwrap_err();
        assert!(err.contains("CHECK-NOT: pattern 'b'"));
        // trailing CHECK-NOT covers the rest of the output
        let err = check_output(output, "CHECK: a\nCHECK-NOT: c").unwrap_err();
        assert!(err.contains("'c'"));
    }

    #[test]
    fn test_check_count() {
        let output = "call\nother\ncall\ncall\n";
        check_output(output, "CHECK-COUNT-3: call").unwrap();
        let err = check_output(output, "CHECK-COUNT-4: call").unwrap_err();
        assert!(err.contains("found only 3"));
    }
}
