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

use thiserror::Error;

/// Errors the core can report without aborting the run. Precondition
/// violations (e.g. an empty operand on an opcode that requires one) are not
/// part of this enum: those are compiler bugs and `assert!` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("starting section \"{name}\", but a section is already open")]
    SectionAlreadyOpen { name: String },

    #[error(".section_end with no matching .start_section")]
    NoOpenSection,

    #[error("undefined label: {name}")]
    UndefinedLabel { name: String },

    #[error("duplicate label definition: {name}")]
    DuplicateLabel { name: String },

    #[error("I/O error while writing assembly: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}
