//! Diff-to-method matching
//!
//! Diff edits arrive 0-based and half-open; parsed method spans are 1-based
//! and inclusive. Everything is converted to 1-based inclusive lines before
//! the overlap test.

use crate::models::{DiffEdit, EditKind, LineSpan};
use crate::parsers::ParsedMethod;
use serde::{Deserialize, Serialize};

/// How many methods a single edit block may be attributed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every overlapping method.
    #[default]
    All,
    /// Only the first overlapping method in source order.
    First,
}

/// New-file lines touched by `edit`, 1-based inclusive.
///
/// Pure deletions have no new-file lines and never match.
pub fn edit_lines(edit: &DiffEdit) -> Option<LineSpan> {
    if edit.kind() == EditKind::Delete {
        return None;
    }
    Some(LineSpan::new(edit.new_range.start + 1, edit.new_range.end))
}

/// Closed-interval overlap.
pub fn overlaps(method: LineSpan, edit: LineSpan) -> bool {
    method.start.max(edit.start) <= method.end.min(edit.end)
}

/// Whether any non-deletion edit touches `method`.
pub fn matches(method: LineSpan, edits: &[DiffEdit]) -> bool {
    edits
        .iter()
        .filter_map(edit_lines)
        .any(|lines| overlaps(method, lines))
}

/// Pair each edit with the methods it touches, as `(method index, edit)`.
pub fn attribute_edits<'e>(
    methods: &[ParsedMethod],
    edits: &'e [DiffEdit],
    policy: MatchPolicy,
) -> Vec<(usize, &'e DiffEdit)> {
    let mut pairs = Vec::new();
    for edit in edits {
        let Some(lines) = edit_lines(edit) else {
            continue;
        };
        for (idx, method) in methods.iter().enumerate() {
            if overlaps(method.span, lines) {
                pairs.push((idx, edit));
                if policy == MatchPolicy::First {
                    break;
                }
            }
        }
    }
    pairs
}

/// Methods touched by at least one edit, in source order, without duplicates.
pub fn touched_methods<'m>(
    methods: &'m [ParsedMethod],
    edits: &[DiffEdit],
    policy: MatchPolicy,
) -> Vec<&'m ParsedMethod> {
    let mut hit = vec![false; methods.len()];
    for (idx, _) in attribute_edits(methods, edits, policy) {
        hit[idx] = true;
    }
    methods
        .iter()
        .zip(hit)
        .filter_map(|(m, h)| h.then_some(m))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::java::parse_methods;

    #[test]
    fn test_off_by_one_alignment() {
        // Method on 1-based lines 5..=7
        let method = LineSpan::new(5, 7);

        // 0-based [3,4) is 1-based line 4: just before the method
        assert!(!matches(method, &[DiffEdit::new("F.java", 3..4, 3..4)]));
        // 0-based [4,5) is 1-based line 5: first line of the method
        assert!(matches(method, &[DiffEdit::new("F.java", 4..5, 4..5)]));
        // 0-based [6,7) is 1-based line 7: last line
        assert!(matches(method, &[DiffEdit::new("F.java", 6..7, 6..7)]));
        // 0-based [7,8) is 1-based line 8: just after
        assert!(!matches(method, &[DiffEdit::new("F.java", 7..8, 7..8)]));
    }

    #[test]
    fn test_pure_deletion_never_matches() {
        let method = LineSpan::new(1, 100);
        assert!(!matches(method, &[DiffEdit::new("F.java", 10..20, 9..9)]));
    }

    #[test]
    fn test_insert_matches_on_new_lines() {
        let method = LineSpan::new(10, 12);
        // Two lines inserted as new lines 12-13
        assert!(matches(method, &[DiffEdit::new("F.java", 11..11, 11..13)]));
    }

    #[test]
    fn test_edit_lines() {
        assert_eq!(
            edit_lines(&DiffEdit::new("F.java", 2..3, 2..5)),
            Some(LineSpan::new(3, 5))
        );
        assert_eq!(edit_lines(&DiffEdit::new("F.java", 2..3, 2..2)), None);
    }

    #[test]
    fn test_spanning_edit_policies() {
        let source = "class A {\n  void a() {\n  }\n  void b() {\n  }\n}\n";
        let methods = parse_methods(source).expect("should parse Java source");
        assert_eq!(methods[0].span, LineSpan::new(2, 3));
        assert_eq!(methods[1].span, LineSpan::new(4, 5));

        // One block rewriting lines 3-4 touches both methods
        let edits = vec![DiffEdit::new("A.java", 2..4, 2..4)];

        let all = touched_methods(&methods, &edits, MatchPolicy::All);
        assert_eq!(all.len(), 2);

        let first = touched_methods(&methods, &edits, MatchPolicy::First);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].identity.method_name, "a");
    }

    #[test]
    fn test_attribute_edits_keeps_each_pair() {
        let source = "class A {\n  void a() {\n  }\n}\n";
        let methods = parse_methods(source).expect("should parse Java source");
        let edits = vec![
            DiffEdit::new("A.java", 1..2, 1..2),
            DiffEdit::new("A.java", 2..2, 2..3),
            DiffEdit::new("A.java", 5..6, 5..6),
        ];
        let pairs = attribute_edits(&methods, &edits, MatchPolicy::All);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(idx, _)| *idx == 0));
    }
}
