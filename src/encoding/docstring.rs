//! Docstring layout for the signature-aware encoding.
//!
//! The signature-aware sequence places the docstring right after the
//! definition header, so it is rendered the way it would sit in a function
//! body: indented one level and wrapped in triple quotes.

const INDENT: &str = "    ";
const QUOTES: &str = "\"\"\"";

/// Renders `docstring` as an indented triple-quoted block.
///
/// Multi-line docstrings get each line indented and the quotes on their own
/// lines. Single-line docstrings are wrapped inline with one space of padding.
pub fn wrap_docstring(docstring: &str) -> String {
    if docstring.contains('\n') {
        let body = docstring
            .split('\n')
            .map(|line| format!("{INDENT}{line}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n{INDENT}{QUOTES}\n{body}\n{INDENT}{QUOTES}")
    } else {
        format!("\n{INDENT}{QUOTES} {docstring} {QUOTES}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(
            wrap_docstring("Add two numbers."),
            "\n    \"\"\" Add two numbers. \"\"\""
        );
    }

    #[test]
    fn test_multi_line() {
        assert_eq!(
            wrap_docstring("Add.\nReturns the sum."),
            "\n    \"\"\"\n    Add.\n    Returns the sum.\n    \"\"\""
        );
    }

    #[test]
    fn test_empty_docstring_still_wrapped() {
        assert_eq!(wrap_docstring(""), "\n    \"\"\"  \"\"\"");
    }
}
