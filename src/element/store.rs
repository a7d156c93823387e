/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::HashMap;

use crate::element::{Element, ElementKind};
use crate::errors::CoreError;
use crate::opcode;

pub type LabelTable = HashMap<String, usize>;

/// The append-only, index-addressable sequence of [`Element`]s that backs
/// one compilation unit's emitted assembly. Elements are never physically
/// removed (see [`ElementStore::comment_out`]); this is what keeps indices
/// stable within one optimization pass, which the simulator's
/// producer/consumer maps depend on.
#[derive(Debug, Default)]
pub struct ElementStore {
    elements: Vec<Element>,
    labels: LabelTable,
    open_section: Option<String>,
}

impl ElementStore {
    pub fn new() -> Self {
        ElementStore::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> &Element {
        &self.elements[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.elements.iter().enumerate()
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn push(&mut self, kind: ElementKind) -> usize {
        self.elements.push(Element::new(kind));
        self.elements.len() - 1
    }

    /// Constraint: `opcode` is non-empty, and non-empty for any opcode this
    /// crate's [`opcode::requires_operand`] table marks as operand-requiring.
    /// Precondition violations assert rather than return an error: they are
    /// compiler bugs, not runtime conditions a caller can recover from.
    pub fn append_instr(
        &mut self,
        opcode: impl Into<String>,
        operand: impl Into<String>,
        comment: impl Into<String>,
    ) -> usize {
        let opcode = opcode.into();
        let operand = operand.into();
        assert!(!opcode.is_empty(), "append_instr: empty opcode");
        assert!(
            !(operand.is_empty() && crate::opcode::requires_operand(&opcode)),
            "append_instr: {opcode} requires a non-empty operand"
        );
        self.push(ElementKind::Instr {
            opcode,
            operand,
            comment: comment.into(),
        })
    }

    /// Errors with `DuplicateLabel` rather than silently overwriting an
    /// existing definition's index, per the label-uniqueness property.
    pub fn append_label(
        &mut self,
        name: impl Into<String>,
        comment: impl Into<String>,
    ) -> Result<usize, CoreError> {
        let name = name.into();
        if self.labels.contains_key(&name) {
            return Err(CoreError::DuplicateLabel { name });
        }
        let idx = self.push(ElementKind::Label {
            name: name.clone(),
            comment: comment.into(),
        });
        self.labels.insert(name, idx);
        Ok(idx)
    }

    pub fn append_inline_asm(&mut self, text: impl Into<String>) -> usize {
        self.push(ElementKind::InlineAsm { text: text.into() })
    }

    pub fn append_comment(&mut self, text: impl Into<String>) -> usize {
        self.push(ElementKind::Comment { text: text.into() })
    }

    pub fn append_separator(&mut self) -> usize {
        self.push(ElementKind::Separator)
    }

    pub fn append_include(&mut self, path: impl Into<String>) -> usize {
        self.push(ElementKind::Include { path: path.into() })
    }

    pub fn emit_function_start(&mut self, id: impl Into<String>, line: impl Into<String>) -> usize {
        self.push(ElementKind::FunctionStart {
            id: id.into(),
            line: line.into(),
        })
    }

    pub fn emit_function_end(&mut self, id: impl Into<String>, line: impl Into<String>) -> usize {
        self.push(ElementKind::FunctionEnd {
            id: id.into(),
            line: line.into(),
        })
    }

    /// Sections are reported as a stack of depth at most one; a second
    /// `start_section` without an intervening `end_section` is an error.
    pub fn start_section(&mut self, name: impl Into<String>) -> Result<usize, CoreError> {
        let name = name.into();
        if let Some(open) = &self.open_section {
            return Err(CoreError::SectionAlreadyOpen { name: open.clone() });
        }
        self.open_section = Some(name.clone());
        Ok(self.push(ElementKind::SectionStart { name }))
    }

    pub fn end_section(&mut self) -> Result<usize, CoreError> {
        if self.open_section.take().is_none() {
            return Err(CoreError::NoOpenSection);
        }
        Ok(self.push(ElementKind::SectionEnd))
    }

    pub fn emit_export(&mut self, name: impl Into<String>) -> usize {
        self.push(ElementKind::Export { name: name.into() })
    }

    pub fn emit_import(&mut self, name: impl Into<String>) -> usize {
        self.push(ElementKind::Import { name: name.into() })
    }

    pub fn emit_end(&mut self) -> usize {
        self.push(ElementKind::End)
    }

    /// In-place conversion of any element into an `Instr`, used by rewrite
    /// rules that replace one instruction with another without growing the
    /// store.
    pub fn replace_with_instr(
        &mut self,
        index: usize,
        opcode: impl Into<String>,
        operand: impl Into<String>,
        comment: impl Into<String>,
    ) {
        self.elements[index].kind = ElementKind::Instr {
            opcode: opcode.into(),
            operand: operand.into(),
            comment: comment.into(),
        };
    }

    /// Converts the element at `index` into a `Comment` carrying `reason`.
    /// Never erases the element: this is the only way the rewrite engine
    /// "removes" anything, so producer/consumer indices built before the
    /// call stay valid.
    pub fn comment_out(&mut self, index: usize, reason: Option<&str>) {
        let text = match reason {
            Some(r) => format!("removed: {r}"),
            None => "removed".to_string(),
        };
        self.elements[index].kind = ElementKind::Comment { text };
    }

    /// Inserts a new instruction at `index`, shifting every later element
    /// right by one. The store's own label table is kept consistent, but
    /// any index a caller is holding past `index` (basic blocks, simulator
    /// cross-reference maps) is now stale and must be refreshed by the
    /// caller — this crate's rewrite rules avoid calling this once a
    /// simulator pass is in flight for exactly that reason.
    pub fn insert_instr(
        &mut self,
        index: usize,
        opcode: impl Into<String>,
        operand: impl Into<String>,
        comment: impl Into<String>,
    ) -> usize {
        let element = Element::new(ElementKind::Instr {
            opcode: opcode.into(),
            operand: operand.into(),
            comment: comment.into(),
        });
        self.elements.insert(index, element);
        for idx in self.labels.values_mut() {
            if *idx >= index {
                *idx += 1;
            }
        }
        index
    }

    /// Removes every `Label` element that no label-producing instruction's
    /// operand mentions any more, a cheap stage-1 pre-pass the rewrite
    /// engine's outer loop runs before each full rule scan.
    pub fn remove_useless_labels(&mut self) -> usize {
        let mut referenced: std::collections::HashSet<String> = std::collections::HashSet::new();
        for element in &self.elements {
            if let Some((_, operand, _)) = element.as_instr() {
                for name in self.labels.keys() {
                    if operand_mentions_label(operand, name) {
                        referenced.insert(name.clone());
                    }
                }
            }
        }

        let dead: Vec<(String, usize)> = self
            .labels
            .iter()
            .filter(|(name, _)| !referenced.contains(*name))
            .map(|(name, idx)| (name.clone(), *idx))
            .collect();

        for (name, idx) in &dead {
            self.comment_out(*idx, Some("unreferenced label"));
            self.labels.remove(name);
        }
        dead.len()
    }

    pub fn write<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        crate::element::writer::write(self, out)
    }

    /// Every branch/call operand that names a label must resolve against
    /// this store's label table. Run once the rewrite engine has reached a
    /// fixpoint, since a rule can retarget a branch to a label that was
    /// never actually defined only by leaving the stream inconsistent, not
    /// by construction. Collects every undefined reference rather than
    /// stopping at the first, matching `Session::report_error`'s "a whole
    /// run's errors visible in one pass" approach.
    pub fn validate_labels(&self) -> Vec<CoreError> {
        let mut errors = Vec::new();
        for element in &self.elements {
            let Some((opcode, operand, _)) = element.as_instr() else {
                continue;
            };
            if !opcode::is_label_referencing_branch(opcode) {
                continue;
            }
            let target = operand.trim();
            if target.is_empty() || target.contains(|c: char| !c.is_alphanumeric() && c != '_') {
                continue; // not a bare label operand
            }
            if !self.labels.contains_key(target) {
                errors.push(CoreError::UndefinedLabel {
                    name: target.to_string(),
                });
            }
        }
        errors
    }
}

fn operand_mentions_label(operand: &str, name: &str) -> bool {
    // Labels appear as whole tokens (after splitting on the addressing-mode
    // punctuation 6809 operands use); a substring match would wrongly treat
    // `LOOP` as referenced by an operand mentioning `LOOP2`.
    operand
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|tok| tok == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_instr_assigns_sequential_indices() {
        let mut store = ElementStore::new();
        let i0 = store.append_instr("LDA", "#1", "");
        let i1 = store.append_instr("NOP", "", "");
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    #[should_panic]
    fn append_instr_panics_on_missing_required_operand() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "", "");
    }

    #[test]
    fn nop_does_not_require_an_operand() {
        let mut store = ElementStore::new();
        store.append_instr("NOP", "", "");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn double_start_section_is_an_error() {
        let mut store = ElementStore::new();
        store.start_section("CODE").unwrap();
        let err = store.start_section("DATA").unwrap_err();
        assert_eq!(
            err,
            CoreError::SectionAlreadyOpen {
                name: "CODE".to_string()
            }
        );
    }

    #[test]
    fn end_section_without_start_is_an_error() {
        let mut store = ElementStore::new();
        assert_eq!(store.end_section().unwrap_err(), CoreError::NoOpenSection);
    }

    #[test]
    fn comment_out_preserves_the_index_and_converts_the_kind() {
        let mut store = ElementStore::new();
        let idx = store.append_instr("LDA", "#1", "");
        store.comment_out(idx, Some("dead write"));
        assert!(matches!(store.get(idx).kind, ElementKind::Comment { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_instr_shifts_later_labels() {
        let mut store = ElementStore::new();
        store.append_instr("NOP", "", "");
        let label_idx = store.append_label("L1", "").unwrap();
        store.insert_instr(0, "LDA", "#1", "");
        assert_eq!(*store.labels().get("L1").unwrap(), label_idx + 1);
        assert_eq!(store.get(1).kind, ElementKind::Instr {
            opcode: "NOP".into(),
            operand: "".into(),
            comment: "".into(),
        });
    }

    #[test]
    fn remove_useless_labels_drops_unreferenced_ones_only() {
        let mut store = ElementStore::new();
        store.append_label("DEAD", "").unwrap();
        store.append_label("LOOP", "").unwrap();
        store.append_instr("BRA", "LOOP", "");
        let removed = store.remove_useless_labels();
        assert_eq!(removed, 1);
        assert!(!store.labels().contains_key("DEAD"));
        assert!(store.labels().contains_key("LOOP"));
    }

    #[test]
    fn append_label_rejects_duplicate_name() {
        let mut store = ElementStore::new();
        store.append_label("L1", "").unwrap();
        let err = store.append_label("L1", "").unwrap_err();
        assert_eq!(
            err,
            CoreError::DuplicateLabel {
                name: "L1".to_string()
            }
        );
    }

    #[test]
    fn validate_labels_rejects_undefined_branch_target() {
        let mut store = ElementStore::new();
        store.append_instr("BEQ", "MISSING", "");
        assert_eq!(
            store.validate_labels(),
            vec![CoreError::UndefinedLabel {
                name: "MISSING".to_string()
            }]
        );
    }

    #[test]
    fn validate_labels_accepts_defined_branch_target() {
        let mut store = ElementStore::new();
        store.append_instr("BEQ", "L1", "");
        store.append_label("L1", "").unwrap();
        assert!(store.validate_labels().is_empty());
    }

    #[test]
    fn validate_labels_ignores_non_label_operands() {
        let mut store = ElementStore::new();
        store.append_instr("JMP", "[$4000]", "");
        store.append_instr("LDA", "#$10", "");
        assert!(store.validate_labels().is_empty());
    }
}
