//! Text documents: position-based sequence edits
//!
//! Positions and lengths count Unicode scalar values, not bytes, so two
//! clients agree on offsets regardless of encoding.

use crate::{OtError, OtSystem, Result, Transformed};
use serde::{Deserialize, Serialize};

/// Text edit operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TextOp {
    Insert { pos: usize, text: String },

    /// Delete `text`, which must be present at `pos`
    Delete { pos: usize, text: String },

    /// Replace `old`, which must be present at `pos`, with `new`
    Replace { pos: usize, old: String, new: String },
}

impl TextOp {
    pub fn insert(pos: usize, text: impl Into<String>) -> Self {
        TextOp::Insert {
            pos,
            text: text.into(),
        }
    }

    pub fn delete(pos: usize, text: impl Into<String>) -> Self {
        TextOp::Delete {
            pos,
            text: text.into(),
        }
    }

    pub fn replace(pos: usize, old: impl Into<String>, new: impl Into<String>) -> Self {
        TextOp::Replace {
            pos,
            old: old.into(),
            new: new.into(),
        }
    }

    /// Split a replacement into its deletion and insertion
    fn expand(&self) -> Vec<TextOp> {
        match self {
            TextOp::Replace { pos, old, new } => {
                vec![TextOp::delete(*pos, old.clone()), TextOp::insert(*pos, new.clone())]
            }
            op => vec![op.clone()],
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the char at `pos`; `pos == char_len` maps to the end
fn byte_offset(s: &str, pos: usize) -> Option<usize> {
    s.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(s.len()))
        .nth(pos)
}

/// `pos + len`, failing instead of overflowing on hostile positions
fn offset(pos: usize, len: usize) -> Result<usize> {
    pos.checked_add(len)
        .ok_or_else(|| OtError::transform(format!("position {pos} + {len} overflows")))
}

fn slice_chars(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Locate `expected` at char position `pos`, returning its byte range
fn locate(state: &str, pos: usize, expected: &str) -> Result<std::ops::Range<usize>> {
    let start = byte_offset(state, pos).ok_or_else(|| {
        OtError::invalid(format!(
            "position {pos} is past the end of a {}-char document",
            char_len(state)
        ))
    })?;
    let end = start + expected.len();
    if state.get(start..end) != Some(expected) {
        return Err(OtError::invalid(format!(
            "expected {expected:?} at position {pos}"
        )));
    }
    Ok(start..end)
}

/// Operation algebra of plain-text documents
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSystem;

impl TextSystem {
    /// Rebase an insertion and a deletion produced against the same text.
    ///
    /// `left` of the result is the insertion side.
    fn insert_vs_delete(
        ins_pos: usize,
        ins_text: &str,
        del_pos: usize,
        del_text: &str,
    ) -> Result<Transformed<TextOp>> {
        let ins_len = char_len(ins_text);
        let del_len = char_len(del_text);
        let shifted = offset(del_pos, ins_len)?;

        Ok(if ins_pos <= del_pos {
            Transformed::unchanged(
                TextOp::insert(ins_pos, ins_text),
                TextOp::delete(shifted, del_text),
            )
        } else if ins_pos >= offset(del_pos, del_len)? {
            Transformed::unchanged(
                TextOp::insert(ins_pos - del_len, ins_text),
                TextOp::delete(del_pos, del_text),
            )
        } else {
            // Insertion point inside the deleted span: delete around it
            let split = ins_pos - del_pos;
            Transformed::new(
                vec![TextOp::insert(del_pos, ins_text)],
                vec![
                    TextOp::delete(del_pos, slice_chars(del_text, 0, split)),
                    TextOp::delete(shifted, slice_chars(del_text, split, del_len)),
                ],
            )
        })
    }

    /// What is left of deletion 1 once deletion 2 has been applied
    fn delete_after_delete(
        pos: usize,
        text: &str,
        other_pos: usize,
        other_text: &str,
    ) -> Result<TextOp> {
        let len = char_len(text);
        let other_len = char_len(other_text);
        let end = offset(pos, len)?;
        let other_end = offset(other_pos, other_len)?;

        Ok(if end <= other_pos {
            TextOp::delete(pos, text)
        } else if pos >= other_end {
            TextOp::delete(pos - other_len, text)
        } else {
            let head = other_pos.saturating_sub(pos).min(len);
            let tail = (other_end - pos).min(len);
            let mut remaining = slice_chars(text, 0, head);
            remaining.push_str(&slice_chars(text, tail, len));
            TextOp::delete(pos.min(other_pos), remaining)
        })
    }
}

impl OtSystem for TextSystem {
    type State = String;
    type Op = TextOp;

    fn apply(&self, state: &mut String, op: &TextOp) -> Result<()> {
        match op {
            TextOp::Insert { pos, text } => {
                let at = byte_offset(state, *pos).ok_or_else(|| {
                    OtError::invalid(format!(
                        "cannot insert at {pos}: document has {} chars",
                        char_len(state)
                    ))
                })?;
                state.insert_str(at, text);
            }
            TextOp::Delete { pos, text } => {
                let range = locate(state, *pos, text)?;
                state.replace_range(range, "");
            }
            TextOp::Replace { pos, old, new } => {
                let range = locate(state, *pos, old)?;
                state.replace_range(range, new);
            }
        }
        Ok(())
    }

    fn invert(&self, op: &TextOp) -> TextOp {
        match op {
            TextOp::Insert { pos, text } => TextOp::delete(*pos, text.clone()),
            TextOp::Delete { pos, text } => TextOp::insert(*pos, text.clone()),
            TextOp::Replace { pos, old, new } => TextOp::replace(*pos, new.clone(), old.clone()),
        }
    }

    fn is_empty(&self, op: &TextOp) -> bool {
        match op {
            TextOp::Insert { text, .. } | TextOp::Delete { text, .. } => text.is_empty(),
            TextOp::Replace { old, new, .. } => old == new,
        }
    }

    fn squash(&self, first: &TextOp, second: &TextOp) -> Vec<TextOp> {
        match (first, second) {
            (TextOp::Insert { pos: p1, text: t1 }, TextOp::Insert { pos: p2, text: t2 })
                if *p1 <= *p2 && p1.checked_add(char_len(t1)).is_some_and(|end| *p2 <= end) =>
            {
                let mut merged = t1.clone();
                if let Some(at) = byte_offset(t1, p2 - p1) {
                    merged.insert_str(at, t2);
                    return vec![TextOp::insert(*p1, merged)];
                }
            }

            (TextOp::Insert { pos: p1, text: t1 }, TextOp::Delete { pos: p2, text: d })
                if *p1 <= *p2 && p2 - p1 + char_len(d) <= char_len(t1) =>
            {
                let start = p2 - p1;
                let end = start + char_len(d);
                if slice_chars(t1, start, end) == *d {
                    let mut remaining = slice_chars(t1, 0, start);
                    remaining.push_str(&slice_chars(t1, end, char_len(t1)));
                    return if remaining.is_empty() {
                        Vec::new()
                    } else {
                        vec![TextOp::insert(*p1, remaining)]
                    };
                }
            }

            (TextOp::Delete { pos: p1, text: d1 }, TextOp::Delete { pos: p2, text: d2 }) => {
                if p1 == p2 {
                    return vec![TextOp::delete(*p1, format!("{d1}{d2}"))];
                }
                if p2.checked_add(char_len(d2)) == Some(*p1) {
                    return vec![TextOp::delete(*p2, format!("{d2}{d1}"))];
                }
            }

            (TextOp::Delete { pos: p1, text: d }, TextOp::Insert { pos: p2, text: t })
                if p1 == p2 =>
            {
                return if d == t {
                    Vec::new()
                } else {
                    vec![TextOp::replace(*p1, d.clone(), t.clone())]
                };
            }

            (
                TextOp::Replace { pos: p1, old, new },
                TextOp::Replace {
                    pos: p2,
                    old: old2,
                    new: new2,
                },
            ) if p1 == p2 && new == old2 => {
                return if old == new2 {
                    Vec::new()
                } else {
                    vec![TextOp::replace(*p1, old.clone(), new2.clone())]
                };
            }

            _ => {}
        }

        vec![first.clone(), second.clone()]
    }

    fn transform_pair(&self, left: &TextOp, right: &TextOp) -> Result<Transformed<TextOp>> {
        match (left, right) {
            (TextOp::Replace { .. }, _) | (_, TextOp::Replace { .. }) => {
                self.transform(&left.expand(), &right.expand())
            }

            (TextOp::Insert { pos: p1, text: t1 }, TextOp::Insert { pos: p2, text: t2 }) => {
                if p1 < p2 {
                    Ok(Transformed::unchanged(
                        left.clone(),
                        TextOp::insert(offset(*p2, char_len(t1))?, t2.clone()),
                    ))
                } else {
                    // Equal positions: the committed insertion stays in front
                    Ok(Transformed::unchanged(
                        TextOp::insert(offset(*p1, char_len(t2))?, t1.clone()),
                        right.clone(),
                    ))
                }
            }

            (TextOp::Insert { pos: pi, text: t }, TextOp::Delete { pos: pd, text: d }) => {
                Self::insert_vs_delete(*pi, t, *pd, d)
            }

            (TextOp::Delete { pos: pd, text: d }, TextOp::Insert { pos: pi, text: t }) => {
                Self::insert_vs_delete(*pi, t, *pd, d).map(Transformed::swap)
            }

            (TextOp::Delete { pos: p1, text: d1 }, TextOp::Delete { pos: p2, text: d2 }) => {
                Ok(Transformed::unchanged(
                    Self::delete_after_delete(*p1, d1, *p2, d2)?,
                    Self::delete_after_delete(*p2, d2, *p1, d1)?,
                ))
            }
        }
    }
}
