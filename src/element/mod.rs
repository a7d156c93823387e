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

//! The element store: the canonical, append-only representation of the
//! assembly a function emits, and the writer that serializes it. This is the
//! direct descendant of `original_source/src/ASMText.h`'s `ASMText` class,
//! reworked as an arena-of-indices rather than an owning-pointer structure.

pub mod store;
pub mod writer;

pub use store::{ElementStore, LabelTable};

use crate::registers::RegMask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Instr {
        opcode: String,
        operand: String,
        comment: String,
    },
    Label {
        name: String,
        comment: String,
    },
    InlineAsm {
        text: String,
    },
    Comment {
        text: String,
    },
    Separator,
    Include {
        path: String,
    },
    FunctionStart {
        id: String,
        line: String,
    },
    FunctionEnd {
        id: String,
        line: String,
    },
    SectionStart {
        name: String,
    },
    SectionEnd,
    Export {
        name: String,
    },
    Import {
        name: String,
    },
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: ElementKind,
    /// Liveness bitmask computed by optional propagation passes; zero until
    /// something populates it.
    pub live_regs_before: RegMask,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Element {
            kind,
            live_regs_before: RegMask::empty(),
        }
    }

    /// True for every element kind except `Instr`, `Label`, `InlineAsm`, and
    /// `Include` — kept as its own explicit set rather than simplified to
    /// "anything that isn't an `Instr`".
    pub fn is_comment_like(&self) -> bool {
        !matches!(
            self.kind,
            ElementKind::Instr { .. }
                | ElementKind::Label { .. }
                | ElementKind::InlineAsm { .. }
                | ElementKind::Include { .. }
        )
    }

    pub fn as_instr(&self) -> Option<(&str, &str, &str)> {
        match &self.kind {
            ElementKind::Instr {
                opcode,
                operand,
                comment,
            } => Some((opcode.as_str(), operand.as_str(), comment.as_str())),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Label { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_instr_opcode(&self, opcode: &str) -> bool {
        matches!(self.as_instr(), Some((op, _, _)) if op.eq_ignore_ascii_case(opcode))
    }
}
