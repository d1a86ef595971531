//! Structured model of a generated file's managed region.
//!
//! Every generated file is three parts: a preamble (boilerplate written on
//! first creation), the managed payload between sentinel marker lines, and
//! a free suffix the operator owns. Merging replaces only the payload bytes
//! and leaves both other parts byte-for-byte intact. Malformed markers are
//! a hard error; there is no best-effort recovery.

use std::path::Path;

use crate::errors::RenderError;

pub const MANAGED_BEGIN: &str = "# >>> topogen managed >>>";
pub const MANAGED_END: &str = "# <<< topogen managed <<<";

/// A generated file split at its markers. The marker lines themselves
/// belong to neither part; `compose` re-emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFile {
    pub preamble: String,
    pub payload: String,
    pub free_suffix: String,
}

impl ManagedFile {
    /// A fresh file: boilerplate preamble, the given payload, empty free
    /// region.
    pub fn fresh(payload: String) -> Self {
        Self {
            preamble: String::from(
                "---\n\
                 # Managed by topogen. The block between the markers below is rewritten\n\
                 # on every run; anything after the end marker is yours and is preserved.\n",
            ),
            payload,
            free_suffix: String::new(),
        }
    }

    /// Splits an existing file's content at the marker lines.
    pub fn split(path: &Path, content: &str) -> Result<Self, RenderError> {
        let malformed = |reason: &str| RenderError::MalformedMarkers {
            file: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let begin = match find_marker_line(content, MANAGED_BEGIN) {
            Some(range) => range,
            None => {
                if find_marker_line(content, MANAGED_END).is_some() {
                    return Err(malformed("end marker present without a start marker"));
                }
                return Err(malformed("no managed region markers found"));
            }
        };
        let after_begin = &content[begin.1..];
        if find_marker_line(after_begin, MANAGED_BEGIN).is_some() {
            return Err(malformed("start marker appears more than once"));
        }

        let end_in_tail = find_marker_line(after_begin, MANAGED_END)
            .ok_or_else(|| malformed("start marker without a matching end marker"))?;
        let end = (begin.1 + end_in_tail.0, begin.1 + end_in_tail.1);
        if find_marker_line(&content[end.1..], MANAGED_END).is_some() {
            return Err(malformed("end marker appears more than once"));
        }
        if find_marker_line(&content[..begin.0], MANAGED_END).is_some() {
            return Err(malformed("end marker precedes the start marker"));
        }

        Ok(Self {
            preamble: content[..begin.0].to_string(),
            payload: content[begin.1..end.0].to_string(),
            free_suffix: content[end.1..].to_string(),
        })
    }

    /// Re-assembles the full file bytes.
    pub fn compose(&self) -> String {
        format!(
            "{}{MANAGED_BEGIN}\n{}{MANAGED_END}\n{}",
            self.preamble, self.payload, self.free_suffix
        )
    }

    /// Returns a copy with the payload replaced, everything else intact.
    pub fn with_payload(&self, payload: String) -> Self {
        Self {
            preamble: self.preamble.clone(),
            payload,
            free_suffix: self.free_suffix.clone(),
        }
    }
}

/// Finds a marker occupying a whole line. Returns the byte range from the
/// start of the marker line to just past its trailing newline (or to the
/// end of the content for an unterminated final line).
fn find_marker_line(content: &str, marker: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == marker {
            return Some((offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("host_vars/test.yml")
    }

    #[test]
    fn fresh_compose_then_split_round_trips() {
        let fresh = ManagedFile::fresh("key: value\n".to_string());
        let composed = fresh.compose();
        let split = ManagedFile::split(&path(), &composed).unwrap();
        assert_eq!(split, fresh);
    }

    #[test]
    fn merge_replaces_only_the_payload() {
        let original = format!(
            "# my header\n{MANAGED_BEGIN}\nold: 1\n{MANAGED_END}\n# my notes\ncustom: true\n"
        );
        let split = ManagedFile::split(&path(), &original).unwrap();
        let merged = split.with_payload("new: 2\n".to_string()).compose();

        assert!(merged.starts_with("# my header\n"));
        assert!(merged.ends_with("# my notes\ncustom: true\n"));
        assert!(merged.contains("new: 2"));
        assert!(!merged.contains("old: 1"));
    }

    #[test]
    fn missing_end_marker_is_rejected() {
        let content = format!("{MANAGED_BEGIN}\npayload\n");
        let err = ManagedFile::split(&path(), &content).unwrap_err();
        assert!(err.to_string().contains("without a matching end"));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let content = format!("{MANAGED_END}\n{MANAGED_BEGIN}\n");
        let err = ManagedFile::split(&path(), &content).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn nested_start_markers_are_rejected() {
        let content = format!("{MANAGED_BEGIN}\n{MANAGED_BEGIN}\n{MANAGED_END}\n");
        let err = ManagedFile::split(&path(), &content).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn file_without_markers_is_rejected() {
        let err = ManagedFile::split(&path(), "just some text\n").unwrap_err();
        assert!(err.to_string().contains("no managed region markers"));
    }

    #[test]
    fn marker_must_occupy_a_whole_line() {
        let content = format!("prefix {MANAGED_BEGIN}\ntext\n");
        let err = ManagedFile::split(&path(), &content).unwrap_err();
        assert!(err.to_string().contains("no managed region markers"));
    }
}
