//! Pure edit algebra: applying edits to text and transforming stale edits
//! so they stay meaningful after newer edits have been committed.
//!
//! Offsets and lengths are code points. The functions here never touch
//! shared state and are safe to call from anywhere, including tests that
//! bypass the binder entirely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single position/delete/insert edit carrying its version claim.
///
/// `position` and `delete` are interpreted against the document content as
/// it stood before this edit; `version` is the author's claim that this is
/// the `version`-th edit of the document. The binder rewrites `version`
/// (and possibly `position`/`delete`) when the claim is stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OTransform {
    pub position: usize,
    pub version: u64,
    pub delete: usize,
    pub insert: String,
}

impl OTransform {
    /// Insert length in code points.
    pub fn insert_len(&self) -> usize {
        self.insert.chars().count()
    }

    /// One past the last code point this edit deletes.
    fn end(&self) -> usize {
        self.position + self.delete
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("edit spans [{position}, {end}) but content holds {len} code points")]
    OutOfBounds {
        position: usize,
        end: usize,
        len: usize,
    },
}

/// Apply `edit` to `text`, yielding the post-edit content.
///
/// Defined only when `position + delete` does not exceed the content
/// length in code points.
pub fn apply(edit: &OTransform, text: &str) -> Result<String, TransformError> {
    let len = text.chars().count();
    let end = edit.end();
    if end > len {
        return Err(TransformError::OutOfBounds {
            position: edit.position,
            end,
            len,
        });
    }
    let start_byte = byte_offset(text, edit.position);
    let end_byte = byte_offset(text, end);
    let mut out = String::with_capacity(text.len() + edit.insert.len());
    out.push_str(&text[..start_byte]);
    out.push_str(&edit.insert);
    out.push_str(&text[end_byte..]);
    Ok(out)
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

/// Rewrite `new` so it remains meaningful after `old` has been applied.
///
/// `old` is the already-committed edit. When both are zero-delete inserts
/// at the same position the committed edit wins and the newcomer shifts
/// right past its insert. A transformed edit always applies cleanly to the
/// post-`old` content; the version tag is left untouched.
pub fn transform(new: &OTransform, old: &OTransform) -> OTransform {
    let mut out = new.clone();
    let ins = old.insert_len();
    if old.end() <= new.position {
        // Everything old touched sits at or before new's position.
        out.position = new.position - old.delete + ins;
    } else if new.end() <= old.position {
        // Strictly left of old; untouched content, untouched edit.
    } else {
        // Delete ranges overlap. Drop the code points old already removed;
        // if new's anchor fell inside old's deleted span, the surviving
        // region now starts right after old's insert.
        let overlap = new.end().min(old.end()) - new.position.max(old.position);
        out.delete = new.delete - overlap;
        if new.position >= old.position {
            out.position = old.position + ins;
        }
    }
    out
}

/// Transform `edit` against each committed edit of `history`, oldest first.
pub fn transform_stack<'a, I>(edit: &OTransform, history: I) -> OTransform
where
    I: IntoIterator<Item = &'a OTransform>,
{
    history
        .into_iter()
        .fold(edit.clone(), |acc, old| transform(&acc, old))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn edit(position: usize, version: u64, delete: usize, insert: &str) -> OTransform {
        OTransform {
            position,
            version,
            delete,
            insert: insert.to_string(),
        }
    }

    #[test]
    fn apply_replaces_a_span() {
        let out = apply(&edit(6, 2, 5, "universe"), "hello world").unwrap();
        assert_eq!(out, "hello universe");
    }

    #[test]
    fn apply_counts_code_points() {
        let out = apply(&edit(1, 1, 2, "ø"), "æπλ!").unwrap();
        assert_eq!(out, "æø!");
    }

    #[test]
    fn apply_rejects_out_of_bounds_spans() {
        let err = apply(&edit(3, 1, 2, ""), "abcd").unwrap_err();
        assert_eq!(
            err,
            TransformError::OutOfBounds {
                position: 3,
                end: 5,
                len: 4
            }
        );
    }

    #[test]
    fn earlier_edit_shifts_later_position() {
        // old inserted two chars before new's anchor
        let out = transform(&edit(4, 2, 1, "z"), &edit(0, 1, 0, "xy"));
        assert_eq!(out, edit(6, 2, 1, "z"));
        // old deleted three chars before new's anchor
        let out = transform(&edit(5, 2, 0, "z"), &edit(1, 1, 3, ""));
        assert_eq!(out, edit(2, 2, 0, "z"));
    }

    #[test]
    fn edit_left_of_old_is_untouched() {
        let out = transform(&edit(0, 2, 2, "a"), &edit(5, 1, 1, "q"));
        assert_eq!(out, edit(0, 2, 2, "a"));
    }

    #[test]
    fn fully_absorbed_delete_keeps_only_the_insert() {
        // old removed [1, 4); new wanted to replace [2, 3)
        let out = transform(&edit(2, 1, 1, "X"), &edit(1, 1, 3, ""));
        assert_eq!(out, edit(1, 1, 0, "X"));
    }

    #[test]
    fn partially_absorbed_delete_keeps_the_tail() {
        // old removed [1, 3); new wanted [2, 5), so [3, 5) survives
        let out = transform(&edit(2, 1, 3, ""), &edit(1, 1, 2, "ab"));
        assert_eq!(out, edit(3, 1, 2, ""));
    }

    #[test]
    fn overlap_from_the_left_keeps_position() {
        // new deletes [1, 4); old already removed [2, 5)
        let out = transform(&edit(1, 1, 3, ""), &edit(2, 1, 3, "Q"));
        assert_eq!(out, edit(1, 1, 1, ""));
    }

    #[test]
    fn committed_insert_wins_position_ties() {
        let out = transform(&edit(0, 1, 0, "B"), &edit(0, 1, 0, "A"));
        assert_eq!(out, edit(1, 1, 0, "B"));
    }

    #[test]
    fn transform_against_empty_history_is_identity() {
        let e = edit(3, 7, 2, "hi");
        assert_eq!(transform_stack(&e, []), e);
    }

    #[test]
    fn transform_stack_folds_in_order() {
        // two committed inserts of one char each, both before the edit
        let history = [edit(0, 1, 0, "x"), edit(0, 2, 0, "y")];
        let out = transform_stack(&edit(2, 1, 0, "z"), &history);
        assert_eq!(out, edit(4, 1, 0, "z"));
    }

    #[test]
    fn concurrent_same_position_inserts_converge() {
        // Both clients insert at 0 against the empty document; whichever
        // commits second lands after the first.
        let first = edit(0, 1, 0, "A");
        let second = transform(&edit(0, 1, 0, "B"), &first);
        let text = apply(&first, "").unwrap();
        let text = apply(&second, &text).unwrap();
        assert_eq!(text, "AB");
    }

    prop_compose! {
        fn arb_edit(len: usize)(position in 0..=len)(
            position in Just(position),
            delete in 0..=(len - position),
            insert in "[A-Z]{0,4}",
        ) -> OTransform {
            OTransform { position, version: 1, delete, insert }
        }
    }

    fn text_and_two_edits() -> impl Strategy<Value = (String, OTransform, OTransform)> {
        "[a-zé]{0,16}".prop_flat_map(|text| {
            let len = text.chars().count();
            (Just(text), arb_edit(len), arb_edit(len))
        })
    }

    proptest! {
        #[test]
        fn transformed_edit_applies_cleanly((text, old, new) in text_and_two_edits()) {
            let after_old = apply(&old, &text).unwrap();
            let transformed = transform(&new, &old);
            prop_assert!(apply(&transformed, &after_old).is_ok());
        }

        #[test]
        fn transform_never_grows_the_delete((_, old, new) in text_and_two_edits()) {
            let transformed = transform(&new, &old);
            prop_assert!(transformed.delete <= new.delete);
            prop_assert_eq!(transformed.insert, new.insert);
            prop_assert_eq!(transformed.version, new.version);
        }
    }
}
