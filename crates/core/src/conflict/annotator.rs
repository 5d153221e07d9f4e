//! Recognition and tagging of merge conflict markers.
//!
//! A line-oriented scanner cycles through three states:
//!
//! | State | Recognized line | Next state |
//! |-------|-----------------|------------|
//! | `ExpectBegin` | `<<<<<<< label` (exactly two tokens) | `ExpectSeparator` |
//! | `ExpectSeparator` | `=======` | `ExpectEnd` |
//! | `ExpectEnd` | `>>>>>>> label` (exactly two tokens) | `ExpectBegin` |
//!
//! Lines that do not match the current state are left alone, and only a
//! complete begin/separator/end run is tagged. A run still open at the end
//! of the text is discarded.

use tracing::debug;

use crate::errors::StoreError;
use crate::store::VersionedStore;

pub const BEGIN_SENTINEL: &str = "<<<<<<<";
pub const SEPARATOR_SENTINEL: &str = "=======";
pub const END_SENTINEL: &str = ">>>>>>>";

/// Token prefixed (followed by a space) to every recognized marker line.
pub const ANNOTATION: &str = "BRANCHNOTE_CONFLICT_MARKER";

/// Line numbers (1-indexed) of one tagged conflict region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRegion {
    pub begin_line: usize,
    pub separator_line: usize,
    pub end_line: usize,
}

/// Annotated text and the regions that were tagged.
#[derive(Debug, Clone)]
pub struct Annotated {
    pub text: String,
    pub regions: Vec<ConflictRegion>,
}

impl Annotated {
    pub fn has_conflicts(&self) -> bool {
        !self.regions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    ExpectBegin,
    ExpectSeparator,
    ExpectEnd,
}

/// Tag every well-formed conflict region in `text`.
///
/// Marker lines that already carry the annotation are recognized through it
/// and keep a single prefix, so `annotate(annotate(x).text) == annotate(x)`.
pub fn annotate(text: &str) -> Annotated {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut tagged = vec![false; lines.len()];
    let mut regions = Vec::new();

    let mut state = ScanState::ExpectBegin;
    let mut begin = 0;
    let mut separator = 0;

    for (idx, line) in lines.iter().enumerate() {
        let bare = strip_prefix(line);
        state = match state {
            ScanState::ExpectBegin if is_labelled(bare, BEGIN_SENTINEL) => {
                begin = idx;
                ScanState::ExpectSeparator
            }
            ScanState::ExpectSeparator if is_separator(bare) => {
                separator = idx;
                ScanState::ExpectEnd
            }
            ScanState::ExpectEnd if is_labelled(bare, END_SENTINEL) => {
                for i in [begin, separator, idx] {
                    tagged[i] = true;
                }
                regions.push(ConflictRegion {
                    begin_line: begin + 1,
                    separator_line: separator + 1,
                    end_line: idx + 1,
                });
                ScanState::ExpectBegin
            }
            unchanged => unchanged,
        };
    }

    let mut out = String::with_capacity(text.len() + regions.len() * 3 * (ANNOTATION.len() + 1));
    for (line, is_tagged) in lines.iter().zip(tagged) {
        if is_tagged {
            out.push_str(ANNOTATION);
            out.push(' ');
            out.push_str(strip_prefix(line));
        } else {
            out.push_str(line);
        }
    }

    debug!(regions = regions.len(), "annotated conflict markers");
    Annotated { text: out, regions }
}

/// `line` without a leading annotation token, if it tags a marker.
fn strip_prefix(line: &str) -> &str {
    line.strip_prefix(ANNOTATION)
        .and_then(|rest| rest.strip_prefix(' '))
        .filter(|rest| {
            let bare = trim_eol(rest);
            bare.starts_with(BEGIN_SENTINEL)
                || bare.starts_with(END_SENTINEL)
                || bare == SEPARATOR_SENTINEL
        })
        .unwrap_or(line)
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn is_labelled(line: &str, sentinel: &str) -> bool {
    let mut tokens = trim_eol(line).split(' ');
    tokens.next() == Some(sentinel)
        && tokens.next().is_some_and(|label| !label.is_empty())
        && tokens.next().is_none()
}

fn is_separator(line: &str) -> bool {
    trim_eol(line) == SEPARATOR_SENTINEL
}

// ---------------------------------------------------------------------------
// Working-tree annotation
// ---------------------------------------------------------------------------

/// Rewrites conflicted notes in a store's working tree.
pub struct ConflictAnnotator;

impl ConflictAnnotator {
    /// Annotate the working-tree copy of `path` in place.
    ///
    /// A path absent from the working tree (the merge kept the deletion) is
    /// left alone and yields no regions.
    pub fn annotate_file(
        store: &mut dyn VersionedStore,
        path: &str,
    ) -> Result<Vec<ConflictRegion>, StoreError> {
        let text = match store.read_content(path) {
            Ok(text) => text,
            Err(StoreError::PathNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let annotated = annotate(&text);
        if annotated.text != text {
            store.write_content(path, &annotated.text)?;
        }
        Ok(annotated.regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFLICTED: &str = "intro\n<<<<<<< ours\nv2\n=======\nv1\n>>>>>>> theirs\noutro\n";

    #[test]
    fn test_tags_well_formed_region() {
        let result = annotate(CONFLICTED);
        assert_eq!(
            result.text,
            "intro\n\
             BRANCHNOTE_CONFLICT_MARKER <<<<<<< ours\n\
             v2\n\
             BRANCHNOTE_CONFLICT_MARKER =======\n\
             v1\n\
             BRANCHNOTE_CONFLICT_MARKER >>>>>>> theirs\n\
             outro\n"
        );
        assert_eq!(
            result.regions,
            vec![ConflictRegion {
                begin_line: 2,
                separator_line: 4,
                end_line: 6,
            }]
        );
    }

    #[test]
    fn test_clean_text_untouched() {
        let text = "just a note\n======= \nmore\n";
        let result = annotate(text);
        assert_eq!(result.text, text);
        assert!(!result.has_conflicts());
    }

    #[test]
    fn test_marker_lookalikes_outside_expected_state() {
        // Separator and end markers before any begin are user content.
        let text = "=======\n>>>>>>> quote\n<<<<<<< not a marker\nbody\n";
        let result = annotate(text);
        assert_eq!(result.text, text);
    }

    #[test]
    fn test_begin_needs_exactly_two_tokens() {
        let text = "<<<<<<< HEAD extra\na\n=======\nb\n>>>>>>> main\n";
        assert_eq!(annotate(text).text, text);

        let text = "<<<<<<<\na\n=======\nb\n>>>>>>> main\n";
        assert_eq!(annotate(text).text, text);
    }

    #[test]
    fn test_unterminated_region_not_tagged() {
        let text = "<<<<<<< ours\na\n=======\nb\n";
        let result = annotate(text);
        assert_eq!(result.text, text);
        assert!(result.regions.is_empty());
    }

    #[test]
    fn test_diff3_base_section_left_alone() {
        let text = "<<<<<<< ours\na\n||||||| original\nbase\n=======\nb\n>>>>>>> theirs\n";
        let result = annotate(text);
        assert!(result.text.contains("\n||||||| original\nbase\n"));
        assert_eq!(result.regions.len(), 1);
    }

    #[test]
    fn test_multiple_regions_and_no_trailing_newline() {
        let text = "<<<<<<< a\n1\n=======\n2\n>>>>>>> b\nmid\n<<<<<<< a\n3\n=======\n4\n>>>>>>> b";
        let result = annotate(text);
        assert_eq!(result.regions.len(), 2);
        assert!(result.text.ends_with("BRANCHNOTE_CONFLICT_MARKER >>>>>>> b"));
    }

    #[test]
    fn test_annotating_twice_is_stable() {
        let once = annotate(CONFLICTED);
        let twice = annotate(&once.text);
        assert_eq!(twice.text, once.text);
        assert_eq!(twice.regions, once.regions);
        // Content between the markers is neither duplicated nor altered.
        assert_eq!(twice.text.matches("\nv2\n").count(), 1);
        assert_eq!(twice.text.matches("\nv1\n").count(), 1);
    }

    #[test]
    fn test_crlf_lines() {
        let text = "<<<<<<< ours\r\na\r\n=======\r\nb\r\n>>>>>>> theirs\r\n";
        let result = annotate(text);
        assert_eq!(result.regions.len(), 1);
        assert!(result.text.starts_with("BRANCHNOTE_CONFLICT_MARKER <<<<<<< ours\r\n"));
    }
}
