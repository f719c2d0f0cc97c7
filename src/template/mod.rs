//! Code Template
//! An append-only text builder with indentation and keyed editable ranges.
//!
//! Generators write fixed text and wrap user-owned fragments in editable
//! ranges. The buffer keeps every range in sync with its text: a range's slice
//! of [`TemplateBuffer::code`] is always exactly that range's current content.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut, Range};
use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Duplicate editable range key: {0}")]
    DuplicateKey(String),
    #[error("Editable range {0} opened inside another editable range")]
    NestedRange(String),
    #[error("No editable range with key {0}")]
    UnknownKey(String),
    #[error("Range {start}..{end} is outside the template (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Bound on template keys. Keys are compared by equality and printed in errors.
pub trait TemplateKey: Clone + PartialEq + Debug {}

impl<K: Clone + PartialEq + Debug> TemplateKey for K {}

/// A user-editable span of generated text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableRange<K> {
    pub key: K,
    pub range: Range<usize>,
    /// Indent depth when the range was opened
    pub indent_level: usize,
    /// The text the generator wrote, before any edits
    pub generated: String,
}

/// A non-editable bookkeeping span, used to map offsets back to generator items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraRange<K> {
    pub key: K,
    pub range: Range<usize>,
}

/// Generated text plus its editable and extra ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateBuffer<K> {
    text: String,
    indent: String,
    indent_level: usize,
    editable: Vec<EditableRange<K>>,
    extra: Vec<ExtraRange<K>>,
    #[serde(skip)]
    open_range: bool,
}

impl<K: TemplateKey> Default for TemplateBuffer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TemplateKey> TemplateBuffer<K> {
    pub fn new() -> Self {
        Self::with_indent("\t")
    }

    pub fn with_indent(indent: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            indent: indent.into(),
            indent_level: 0,
            editable: Vec::new(),
            extra: Vec::new(),
            open_range: false,
        }
    }

    // ========================================================================
    // WRITING
    // ========================================================================

    pub fn indent_string(&self) -> &str {
        &self.indent
    }

    pub fn indent_level(&self) -> usize {
        self.indent_level
    }

    /// Current byte offset, i.e. the length of the text written so far
    pub fn position(&self) -> usize {
        self.text.len()
    }

    fn at_line_start(&self) -> bool {
        self.text.is_empty() || self.text.ends_with('\n')
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.text.push_str(&self.indent);
        }
    }

    /// Append text. Every line that receives content is indented first.
    pub fn write(&mut self, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.text.push('\n');
            }
            if line.is_empty() {
                continue;
            }
            if self.at_line_start() {
                self.push_indent();
            }
            self.text.push_str(line);
        }
    }

    /// Append text starting on a fresh line
    pub fn write_line(&mut self, text: &str) {
        self.newline_if_needed();
        self.write(text);
    }

    /// Append an empty line
    pub fn blank_line(&mut self) {
        self.newline_if_needed();
        self.text.push('\n');
    }

    fn newline_if_needed(&mut self) {
        if !self.at_line_start() {
            self.text.push('\n');
        }
    }

    /// Start a fresh line and write its indentation right away, so a range
    /// opened next begins after the indent.
    fn begin_line(&mut self) {
        self.newline_if_needed();
        self.push_indent();
    }

    /// Run `block` one indent level deeper. The level is restored however `block` exits.
    pub fn indented<R>(&mut self, block: impl FnOnce(&mut Self) -> R) -> R {
        self.indent_level += 1;
        let mut guard = RestoreGuard {
            buffer: self,
            restore: |buffer| buffer.indent_level -= 1,
        };
        block(&mut *guard)
    }

    /// Run `block` and record everything it writes as the editable range `key`.
    ///
    /// Keys are unique per buffer and editable ranges do not nest; either
    /// violation is a generator bug and aborts the pass.
    pub fn editable<R>(
        &mut self,
        key: K,
        block: impl FnOnce(&mut Self) -> TemplateResult<R>,
    ) -> TemplateResult<R> {
        if self.editable.iter().any(|r| r.key == key) {
            return Err(TemplateError::DuplicateKey(format!("{:?}", key)));
        }
        if self.open_range {
            return Err(TemplateError::NestedRange(format!("{:?}", key)));
        }

        let start = self.position();
        let indent_level = self.indent_level;
        self.open_range = true;
        let result = {
            let mut guard = RestoreGuard {
                buffer: self,
                restore: |buffer| buffer.open_range = false,
            };
            block(&mut *guard)
        };
        let value = result?;

        let end = self.position();
        self.editable.push(EditableRange {
            key,
            range: start..end,
            indent_level,
            generated: self.text[start..end].to_string(),
        });
        Ok(value)
    }

    /// An editable range on its own line(s), one level deeper
    pub fn indented_editable<R>(
        &mut self,
        key: K,
        block: impl FnOnce(&mut Self) -> TemplateResult<R>,
    ) -> TemplateResult<R> {
        self.indented(|t| {
            t.begin_line();
            t.editable(key, block)
        })
    }

    pub fn write_editable(&mut self, key: K, text: &str) -> TemplateResult<()> {
        self.editable(key, |t| {
            t.write(text);
            Ok(())
        })
    }

    /// Editable text on a fresh line at the current indent
    pub fn write_editable_line(&mut self, key: K, text: &str) -> TemplateResult<()> {
        self.begin_line();
        self.write_editable(key, text)
    }

    /// Record a bookkeeping span. A second range for the same key replaces the first.
    pub fn add_extra_range(&mut self, key: K, range: Range<usize>) -> TemplateResult<()> {
        self.check_bounds(&range)?;
        if let Some(existing) = self.extra.iter_mut().find(|r| r.key == key) {
            existing.range = range;
        } else {
            self.extra.push(ExtraRange { key, range });
        }
        Ok(())
    }

    /// Run `block` and record what it wrote as an extra range for `key`
    pub fn extra<R>(
        &mut self,
        key: K,
        block: impl FnOnce(&mut Self) -> TemplateResult<R>,
    ) -> TemplateResult<R> {
        let start = self.position();
        let value = block(self)?;
        let end = self.position();
        self.add_extra_range(key, start..end)?;
        Ok(value)
    }

    fn check_bounds(&self, range: &Range<usize>) -> TemplateResult<()> {
        if range.start > range.end || range.end > self.text.len() {
            return Err(TemplateError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: self.text.len(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn code(&self) -> &str {
        &self.text
    }

    pub fn code_in_range(&self, range: Range<usize>) -> Option<&str> {
        self.text.get(range)
    }

    /// Editable ranges in the order they were written
    pub fn editable_ranges(&self) -> &[EditableRange<K>] {
        &self.editable
    }

    pub fn keys_in_order(&self) -> impl Iterator<Item = &K> {
        self.editable.iter().map(|r| &r.key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.editable_range(key).is_some()
    }

    pub fn editable_range(&self, key: &K) -> Option<&EditableRange<K>> {
        self.editable.iter().find(|r| r.key == *key)
    }

    pub fn range_for_key(&self, key: &K) -> Option<Range<usize>> {
        self.editable_range(key).map(|r| r.range.clone())
    }

    pub fn code_for_key(&self, key: &K) -> Option<&str> {
        self.editable_range(key)
            .map(|r| &self.text[r.range.clone()])
    }

    /// Current text of every editable range, in order
    pub fn code_for_editable_ranges(&self) -> Vec<(K, String)> {
        self.editable
            .iter()
            .map(|r| (r.key.clone(), self.text[r.range.clone()].to_string()))
            .collect()
    }

    /// Whether the range holds something other than what the generator wrote
    pub fn is_edited(&self, key: &K) -> bool {
        self.editable_range(key)
            .map(|r| self.text[r.range.clone()] != r.generated)
            .unwrap_or(false)
    }

    pub fn extra_ranges(&self) -> &[ExtraRange<K>] {
        &self.extra
    }

    pub fn extra_range(&self, key: &K) -> Option<Range<usize>> {
        self.extra
            .iter()
            .find(|r| r.key == *key)
            .map(|r| r.range.clone())
    }

    /// The editable range containing `offset`. A range's end counts as inside,
    /// so a caret right after the last character still selects it.
    pub fn editable_key_at(&self, offset: usize) -> Option<&K> {
        self.editable
            .iter()
            .find(|r| r.range.start <= offset && offset <= r.range.end)
            .map(|r| &r.key)
    }

    /// Keys of all extra ranges containing `offset`, innermost first
    pub fn extra_keys_at(&self, offset: usize) -> Vec<&K> {
        let mut hits: Vec<&ExtraRange<K>> = self
            .extra
            .iter()
            .filter(|r| r.range.start <= offset && offset < r.range.end)
            .collect();
        hits.sort_by_key(|r| r.range.len());
        hits.into_iter().map(|r| &r.key).collect()
    }

    /// First editable range starting after `offset`
    pub fn next_editable(&self, offset: usize) -> Option<&K> {
        self.editable
            .iter()
            .find(|r| r.range.start > offset)
            .map(|r| &r.key)
    }

    /// Last editable range ending before `offset`
    pub fn previous_editable(&self, offset: usize) -> Option<&K> {
        self.editable
            .iter()
            .rev()
            .find(|r| r.range.end < offset)
            .map(|r| &r.key)
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Replace the text of one editable range, shifting every range after it
    /// and growing every extra range around it.
    ///
    /// Extra range boundaries inside the replaced text are clamped to the new
    /// text. An extra range starting where an empty editable range sits comes
    /// after it and moves with the rest of the text.
    pub fn set_code(&mut self, key: &K, code: &str) -> TemplateResult<()> {
        let index = self
            .editable
            .iter()
            .position(|r| r.key == *key)
            .ok_or_else(|| TemplateError::UnknownKey(format!("{:?}", key)))?;
        let old = self.editable[index].range.clone();
        if self.text[old.clone()] == *code {
            return Ok(());
        }
        self.text.replace_range(old.clone(), code);

        let new_end = old.start + code.len();
        let remap = |offset: usize| {
            if offset >= old.end {
                offset - old.end + new_end
            } else if offset <= old.start {
                offset
            } else {
                offset.min(new_end)
            }
        };

        // Editable ranges are stored in text order and never overlap
        self.editable[index].range.end = new_end;
        for range in &mut self.editable[index + 1..] {
            range.range = remap(range.range.start)..remap(range.range.end);
        }
        for range in &mut self.extra {
            range.range = remap(range.range.start)..remap(range.range.end);
        }
        Ok(())
    }
}

/// Undoes a scoped change to the buffer when dropped, including during unwinding.
struct RestoreGuard<'a, K: TemplateKey> {
    buffer: &'a mut TemplateBuffer<K>,
    restore: fn(&mut TemplateBuffer<K>),
}

impl<K: TemplateKey> Deref for RestoreGuard<'_, K> {
    type Target = TemplateBuffer<K>;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl<K: TemplateKey> DerefMut for RestoreGuard<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl<K: TemplateKey> Drop for RestoreGuard<'_, K> {
    fn drop(&mut self) {
        (self.restore)(self.buffer);
    }
}

/// Move lines after the first from one indent depth to another.
pub fn reindent(code: &str, from_level: usize, to_level: usize, indent: &str) -> String {
    if from_level == to_level || !code.contains('\n') {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len());
    for (i, line) in code.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            if !line.is_empty() {
                let mut rest = line;
                for _ in 0..from_level.saturating_sub(to_level) {
                    rest = rest.strip_prefix(indent).unwrap_or(rest);
                }
                for _ in 0..to_level.saturating_sub(from_level) {
                    out.push_str(indent);
                }
                out.push_str(rest);
                continue;
            }
        }
        out.push_str(line);
    }
    out
}
