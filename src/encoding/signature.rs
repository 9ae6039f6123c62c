//! Separating a definition header from the body of a code blob.
//!
//! The code field of a record is pre-tokenized text in which layout is spelled
//! out with markers (`<NEW_LINE>`, `<INDENT>`, ...). A definition header ends
//! with a colon followed by the start of an indented block, which appears in
//! the text as [`END_OF_SIGNATURE`].

use std::sync::LazyLock;

use regex::Regex;

use crate::records::Record;

/// Colon followed by the start-of-block markers.
pub const END_OF_SIGNATURE: &str = ": <NEW_LINE> <INDENT>";

const FUNCTION_KEYWORD: &str = "def ";
const CLASS_KEYWORD: &str = "class ";

/// Signature and remaining code produced by [`split_signature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSplit<'a> {
    pub signature: &'a str,
    pub code: &'a str,
}

/// Splits `code` at the first [`END_OF_SIGNATURE`] marker.
///
/// The candidate header is everything up to and including the marker. When it
/// contains `def ` (checked first) or `class `, the signature is the candidate
/// from that keyword on and the code is the text after the marker. Otherwise,
/// including when the marker is missing, the signature is empty and the code
/// is returned untouched.
pub fn split_signature(code: &str) -> SignatureSplit<'_> {
    let unchanged = SignatureSplit {
        signature: "",
        code,
    };

    let Some(marker_start) = code.find(END_OF_SIGNATURE) else {
        return unchanged;
    };
    let marker_end = marker_start + END_OF_SIGNATURE.len();
    let candidate = &code[..marker_end];

    let keyword_pos = candidate
        .find(FUNCTION_KEYWORD)
        .or_else(|| candidate.find(CLASS_KEYWORD));

    match keyword_pos {
        Some(pos) => SignatureSplit {
            signature: &candidate[pos..],
            code: &code[marker_end..],
        },
        None => unchanged,
    }
}

/// Number of leading characters searched before falling back to the whole code.
const EARLY_SEARCH_CHARS: usize = 300;

static SIGNATURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?:async\s+)?              # optional async
        (?:def|class)
        \s+[A-Za-z_]\w*            # name
        (?:\s*\([^)]*\))?          # optional parameter list
        \s*:?                      # optional colon
        ",
    )
    .expect("signature pattern is valid")
});

static LEADING_LAYOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s|<NEW_LINE>|<NEWLINE>|<INDENT>|<DEDENT>)+")
        .expect("layout pattern is valid")
});

/// One extracted signature, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionExample {
    pub id: String,
    pub signature: String,
    pub code_prefix: String,
}

/// Summary of a [`SignatureExtractor::extract_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub total: usize,
    pub extracted: usize,
    pub examples: Vec<ExtractionExample>,
}

/// Fills empty `signature` fields by pattern-matching a `def`/`class` header
/// inside `code`.
#[derive(Debug, Clone)]
pub struct SignatureExtractor {
    max_examples: usize,
}

impl Default for SignatureExtractor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl SignatureExtractor {
    pub fn new(max_examples: usize) -> Self {
        Self { max_examples }
    }

    /// Finds a header in `code` and returns `(signature, remaining_code)`.
    ///
    /// The first occurrence of the matched text is removed from the code and
    /// leading whitespace and layout markers are stripped from the remainder.
    pub fn extract(&self, code: &str) -> Option<(String, String)> {
        let early_end = code
            .char_indices()
            .nth(EARLY_SEARCH_CHARS)
            .map(|(idx, _)| idx)
            .unwrap_or(code.len());

        let matched = SIGNATURE_PATTERN
            .find(&code[..early_end])
            .or_else(|| SIGNATURE_PATTERN.find(code))?
            .as_str();

        let remaining = code.replacen(matched, "", 1);
        let remaining = LEADING_LAYOUT.replace(&remaining, "").into_owned();
        Some((matched.trim().to_string(), remaining))
    }

    /// Applies [`Self::extract`] to every record with an empty signature and
    /// non-empty code.
    pub fn extract_all(&self, records: &mut [Record]) -> ExtractionReport {
        let mut report = ExtractionReport {
            total: records.len(),
            ..Default::default()
        };

        for record in records.iter_mut() {
            if !record.signature.trim().is_empty() || record.code.is_empty() {
                continue;
            }
            let Some((signature, code)) = self.extract(&record.code) else {
                continue;
            };

            if report.examples.len() < self.max_examples {
                report.examples.push(ExtractionExample {
                    id: record.id.clone(),
                    signature: signature.clone(),
                    code_prefix: code.chars().take(200).collect(),
                });
            }
            record.signature = signature;
            record.code = code;
            report.extracted += 1;
        }

        tracing::info!(
            total = report.total,
            extracted = report.extracted,
            "Signature extraction finished"
        );
        report
    }
}
