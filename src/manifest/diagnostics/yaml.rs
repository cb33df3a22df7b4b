//! YAML parse diagnostics.
//!
//! Converts `serde_saphyr` errors into [`miette`] diagnostics that point at
//! the offending byte and, for common mistakes such as tab indentation,
//! carry a hint.

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_saphyr::{Error as YamlError, Location};
use thiserror::Error;

use super::{ManifestName, ManifestSource};

const YAML_HINTS: [(&str, &str); 4] = [
    (
        "did not find expected '-'",
        "Start each target with '-' and indent its fields consistently.",
    ),
    (
        "expected ':'",
        "Separate every key from its value with ':'.",
    ),
    (
        "mapping values are not allowed",
        "Quote values containing ':' such as target names with flavours.",
    ),
    (
        "found character that cannot start any token",
        "Quote target names: '//' and '#' are significant in YAML.",
    ),
];

/// Byte offset of a one-based line and column, clamped to the line end.
/// Handles multi-byte characters and `\r\n` line endings.
fn byte_index(src: &str, line: u64, column: u64) -> usize {
    let target_line = usize::try_from(line.saturating_sub(1)).unwrap_or(usize::MAX);
    let target_column = usize::try_from(column.saturating_sub(1)).unwrap_or(usize::MAX);
    let mut offset = 0usize;
    for (idx, segment) in src.split_inclusive('\n').enumerate() {
        if idx == target_line {
            let without_newline = segment.strip_suffix('\n').unwrap_or(segment);
            let cleaned = without_newline
                .strip_suffix('\r')
                .unwrap_or(without_newline);
            let column_offset = cleaned
                .char_indices()
                .nth(target_column)
                .map_or(cleaned.len(), |(byte_idx, _)| byte_idx);
            return offset + column_offset;
        }
        offset += segment.len();
    }
    src.len()
}

fn to_span(src: &ManifestSource, loc: Location) -> SourceSpan {
    let at = byte_index(src.as_str(), loc.line(), loc.column());
    let bytes = src.as_str().as_bytes();
    let is_line_break = |b: u8| b == b'\n' || b == b'\r';
    let (start, end) = match bytes.get(at) {
        Some(&b) if !is_line_break(b) => (at, at + 1),
        _ => {
            let start = if at > 0 && bytes.get(at - 1).is_some_and(|p| !is_line_break(*p)) {
                at - 1
            } else {
                at
            };
            (start, at)
        }
    };
    SourceSpan::new(start.into(), end.saturating_sub(start))
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(kasane::yaml::parse))]
struct YamlDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("parse error here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    #[source]
    source: YamlError,
    message: String,
}

fn has_tab_indent(src: &ManifestSource, location: Option<Location>) -> bool {
    let Some(loc) = location else {
        return false;
    };
    let line_idx = usize::try_from(loc.line().saturating_sub(1)).unwrap_or(usize::MAX);
    src.as_str()
        .lines()
        .nth(line_idx)
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_whitespace())
        .any(|c| c == '\t')
}

fn hint_for(err_str: &str, src: &ManifestSource, loc: Option<Location>) -> Option<String> {
    if has_tab_indent(src, loc) {
        return Some("Use spaces for indentation; tabs are invalid in YAML.".into());
    }
    let lower = err_str.to_lowercase();
    YAML_HINTS
        .iter()
        .find(|(needle, _)| lower.contains(*needle))
        .map(|(_, hint)| (*hint).into())
}

/// Map a `serde_saphyr` parse error into a [`miette`] diagnostic spanning
/// the failure location.
#[must_use]
pub fn map_yaml_error(
    err: YamlError,
    src: &ManifestSource,
    name: &ManifestName,
) -> Box<dyn Diagnostic + Send + Sync + 'static> {
    let loc = err.location();
    let (line, col, span) = loc.map_or((1, 1, None), |l| {
        (l.line(), l.column(), Some(to_span(src, l)))
    });
    let err_str = err.to_string();
    let help = hint_for(&err_str, src, loc);
    Box::new(YamlDiagnostic {
        src: NamedSource::new(name.as_str(), src.as_str().to_owned()),
        span,
        help,
        source: err,
        message: format!("YAML parse error at line {line}, column {col}: {err_str}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, anyhow, ensure};
    use rstest::rstest;
    use std::error::Error as StdError;

    fn parse_failure(src: &ManifestSource) -> Result<YamlError> {
        match serde_saphyr::from_str::<serde_json::Value>(src.as_str()) {
            Ok(value) => Err(anyhow!("expected a parse error, got {value}")),
            Err(err) => Ok(err),
        }
    }

    #[test]
    fn tab_indentation_gets_a_hint() -> Result<()> {
        let src = ManifestSource::from("\tkind: \"unterminated");
        let diag = map_yaml_error(parse_failure(&src)?, &src, &ManifestName::from("test"));
        let yaml = (&*diag as &(dyn StdError + 'static))
            .downcast_ref::<YamlDiagnostic>()
            .context("expected YAML diagnostic")?;
        let help = yaml.help.as_deref().unwrap_or_default();
        ensure!(help.contains("Use spaces"), "missing tab hint: {help}");
        Ok(())
    }

    #[test]
    fn missing_location_defaults_to_first_line() -> Result<()> {
        let src = ManifestSource::from("targets: [");
        let err = serde_saphyr::Error::Eof {
            location: Location::UNKNOWN,
        };
        let diag = map_yaml_error(err, &src, &ManifestName::from("test"));
        ensure!(
            diag.to_string().contains("line 1, column 1"),
            "unexpected message: {diag}"
        );
        Ok(())
    }

    #[test]
    fn span_skips_carriage_return() -> Result<()> {
        let src = ManifestSource::from("targets:\r\n  - kind: cxx_library\r\n    srcs a.c\r\n");
        let diag = map_yaml_error(parse_failure(&src)?, &src, &ManifestName::from("test"));
        let yaml = (&*diag as &(dyn StdError + 'static))
            .downcast_ref::<YamlDiagnostic>()
            .context("expected YAML diagnostic")?;
        let span = yaml.span.context("span present")?;
        if let Some(byte) = src.as_str().as_bytes().get(span.offset()) {
            ensure!(*byte != b'\r', "span should skip carriage returns");
        }
        Ok(())
    }

    #[rstest]
    #[case("one\ntwo\nthree", 3, 3, 10)]
    #[case("one\r\ntwo\r\nthree", 2, 2, 6)]
    #[case("short", 1, 42, 5)]
    #[case("caf\u{e9}: x", 1, 5, 5)]
    fn byte_index_handles_lines_and_characters(
        #[case] src: &str,
        #[case] line: u64,
        #[case] column: u64,
        #[case] expected: usize,
    ) {
        assert_eq!(byte_index(src, line, column), expected);
    }
}
