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

//! Splits one function's slice of the element store into maximal
//! straight-line basic blocks and records each block's successors.

use crate::element::{ElementKind, ElementStore};
use crate::opcode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Successor {
    Label(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: usize,
    pub end: usize, // half-open: [start, end)
    pub successors: Vec<Successor>,
}

impl BasicBlock {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Builds the basic blocks for the half-open element range `[func_start,
/// func_end)` (typically the span between a `FunctionStart` and its matching
/// `FunctionEnd`, exclusive of both markers).
pub fn build_blocks(store: &ElementStore, func_start: usize, func_end: usize) -> Vec<BasicBlock> {
    let mut blocks = Vec::new();
    let mut block_start: Option<usize> = None;
    let mut idx = func_start;

    while idx < func_end {
        let element = store.get(idx);
        match &element.kind {
            ElementKind::Label { .. } => {
                // The element right before a label ends the current block,
                // exclusively: the label itself starts the next one only
                // once real code resumes.
                if let Some(start) = block_start.take() {
                    push_block_ending_before(&mut blocks, store, start, idx);
                }
            }
            ElementKind::Instr { opcode, operand, .. } => {
                if block_start.is_none() {
                    block_start = Some(idx);
                }
                if is_block_ender(opcode, operand) {
                    let start = block_start.take().unwrap();
                    let successors = successors_for(store, opcode, operand, idx);
                    blocks.push(BasicBlock {
                        start,
                        end: idx + 1,
                        successors,
                    });
                }
            }
            ElementKind::InlineAsm { .. } => {
                if block_start.is_none() {
                    block_start = Some(idx);
                }
            }
            _ => {
                // Comment-like elements never start or end a block on their
                // own; they're simply excluded from the block's tail when it
                // closes at a label or at function end.
            }
        }
        idx += 1;
    }

    if let Some(start) = block_start {
        push_block_ending_before(&mut blocks, store, start, func_end);
    }

    blocks
}

/// Closes a block covering `[start, boundary)`, trimming any trailing
/// comment-like elements from its tail (they don't belong to the block, but
/// don't start a new one either).
fn push_block_ending_before(
    blocks: &mut Vec<BasicBlock>,
    store: &ElementStore,
    start: usize,
    boundary: usize,
) {
    let mut end = boundary;
    while end > start && store.get(end - 1).is_comment_like() {
        end -= 1;
    }
    if end <= start {
        return; // empty interval, discarded
    }
    let last = end - 1;
    let successors = match store.get(last).as_instr() {
        Some((opcode, operand, _)) if is_block_ender(opcode, operand) => {
            successors_for(store, opcode, operand, last)
        }
        _ => vec![Successor::Index(end)], // falls through
    };
    blocks.push(BasicBlock { start, end, successors });
}

fn is_block_ender(opcode: &str, operand: &str) -> bool {
    opcode::ends_block_unconditionally(opcode)
        || opcode::is_stack_return(opcode, operand)
        || opcode::is_conditional_branch(opcode)
}

fn successors_for(store: &ElementStore, opcode: &str, operand: &str, index: usize) -> Vec<Successor> {
    let up = opcode.to_ascii_uppercase();

    if up == "RTS" || up == "RTI" || opcode::is_stack_return(opcode, operand) {
        return Vec::new();
    }

    if up == "BRA" || up == "LBRA" || up == "JMP" {
        return vec![target_successor(store, operand)];
    }

    if opcode::is_conditional_branch(&up) {
        let mut successors = vec![target_successor(store, operand)];
        successors.push(Successor::Index(index + 1));
        return successors;
    }

    // Inline-asm tail or any other instruction: fall through.
    vec![Successor::Index(index + 1)]
}

fn target_successor(store: &ElementStore, operand: &str) -> Successor {
    let label = operand.trim();
    if let Some(&idx) = store.labels().get(label) {
        Successor::Index(idx)
    } else {
        Successor::Label(label.to_string())
    }
}
