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

//! The fixed-point driver. Mirrors `ASMText::peepholeOptimize`'s outer
//! `for(;;)` loop: clear out labels nothing references any more, sweep
//! stage-1 rules over the whole store, then (when enabled) sweep stage-2
//! rules per function/per block against a freshly built simulator state, and
//! repeat until one whole outer iteration makes no change anywhere.

use crate::basic_block::{self, BasicBlock};
use crate::effects;
use crate::element::{ElementKind, ElementStore};
use crate::rewrite::{stage1, stage2};
use crate::session::Session;
use crate::simulator::SimState;

/// Runs stage-1 and (if enabled) stage-2 rules to a global fixpoint over
/// every function in `store`.
pub fn optimize(store: &mut ElementStore, session: &mut Session) {
    loop {
        let removed_labels = store.remove_useless_labels();
        let stage1_changes = run_stage1_pass(store);
        let stage2_changes = if session.stage2_enabled {
            run_stage2_pass(store, session)
        } else {
            0
        };
        log::debug!(
            "rewrite pass: removed {removed_labels} labels, {stage1_changes} stage-1 rewrites, {stage2_changes} stage-2 rewrites"
        );
        if removed_labels == 0 && stage1_changes == 0 && stage2_changes == 0 {
            break;
        }
    }
}

fn run_stage1_pass(store: &mut ElementStore) -> usize {
    let mut applied = 0;
    let mut i = 0;
    while i < store.len() {
        let mut advanced = false;
        for rule in stage1::RULES {
            if let Some(next) = rule(store, i) {
                log::debug!("stage1 rule applied at index {i}, resuming at {next}");
                applied += 1;
                i = next;
                advanced = true;
                break;
            }
        }
        if !advanced {
            i += 1;
        }
    }
    applied
}

/// Finds each `FunctionStart`/`FunctionEnd` pair and runs stage-2 rules over
/// every basic block within it.
fn run_stage2_pass(store: &mut ElementStore, session: &Session) -> usize {
    let mut applied = 0;
    let mut i = 0;
    while i < store.len() {
        if let ElementKind::FunctionStart { id, .. } = &store.get(i).kind {
            let id = id.clone();
            let Some(end) = find_function_end(store, i + 1, &id) else {
                i += 1;
                continue;
            };
            applied += run_stage2_over_function(store, session, i + 1, end);
            i = end + 1;
            continue;
        }
        i += 1;
    }
    applied
}

fn find_function_end(store: &ElementStore, from: usize, id: &str) -> Option<usize> {
    (from..store.len()).find(|&i| match &store.get(i).kind {
        ElementKind::FunctionEnd { id: e, .. } => e.as_str() == id,
        _ => false,
    })
}

fn run_stage2_over_function(
    store: &mut ElementStore,
    session: &Session,
    func_start: usize,
    func_end: usize,
) -> usize {
    let mut applied = 0;
    let blocks = basic_block::build_blocks(store, func_start, func_end);
    for block in blocks {
        applied += run_stage2_over_block(store, session, &block);
    }
    applied
}

fn run_stage2_over_block(store: &mut ElementStore, session: &Session, block: &BasicBlock) -> usize {
    if block.is_empty() {
        return 0;
    }
    let mut applied = 0;
    loop {
        let sim = simulate_block(store, block.start, block.end, session.ignore_stack_errors);
        let mut changed = false;
        let mut i = block.start;
        while i < block.end {
            let mut advanced = false;
            for rule in stage2::RULES {
                if let Some(next) = rule(store, session, &sim, block.end, i) {
                    log::debug!("stage2 rule applied at index {i} within block [{},{})", block.start, block.end);
                    applied += 1;
                    changed = true;
                    i = next;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                i += 1;
            }
        }
        if !changed {
            break;
        }
    }
    applied
}

/// Builds a fresh [`SimState`] by replaying every element in `[start, end)`.
/// `InlineAsm` blocks are treated conservatively: their real effect is opaque
/// text, so every caller-saved register is invalidated rather than parsed.
/// An opcode `SimState::process` can't model (a control transfer other than
/// `BRN`, or a software interrupt) triggers a `warn!` so an otherwise
/// optimizable window isn't silently skipped without a trace.
fn simulate_block(store: &ElementStore, start: usize, end: usize, ignore_stack_errors: bool) -> SimState {
    let mut sim = SimState::new(ignore_stack_errors);
    for index in start..end {
        let element = store.get(index);
        match &element.kind {
            ElementKind::InlineAsm { .. } => {
                sim.invalidate(effects::CALLER_SAVED);
            }
            ElementKind::Instr {
                opcode, operand, ..
            } => {
                if !sim.process(opcode, operand, index) {
                    log::warn!(
                        "simulator could not model `{opcode} {operand}` at index {index}; stage-2 rules see stale state past this point"
                    );
                }
            }
            _ => {}
        }
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Target;

    fn sample_function(store: &mut ElementStore, body: impl FnOnce(&mut ElementStore)) {
        store.emit_function_start("f", "1");
        body(store);
        store.emit_function_end("f", "1");
    }

    #[test]
    fn fixpoint_splits_ldd_zero_into_clra_clrb() {
        let mut store = ElementStore::new();
        sample_function(&mut store, |s| {
            s.append_instr("LDD", "#$0000", "");
            s.append_instr("RTS", "", "");
        });
        let mut session = Session::new(Target::Simulator);
        optimize(&mut store, &mut session);

        let instrs: Vec<&str> = store
            .iter()
            .filter_map(|e| e.as_instr().map(|(op, _, _)| op))
            .collect();
        assert_eq!(instrs, vec!["CLRA", "CLRB", "RTS"]);
    }

    #[test]
    fn fixpoint_removes_branch_to_next_location_and_its_now_useless_label() {
        let mut store = ElementStore::new();
        sample_function(&mut store, |s| {
            s.append_instr("LBRA", "L1", "");
            s.append_label("L1", "").unwrap();
            s.append_instr("RTS", "", "");
        });
        let mut session = Session::new(Target::Simulator);
        optimize(&mut store, &mut session);

        let instrs: Vec<&str> = store
            .iter()
            .filter_map(|e| e.as_instr().map(|(op, _, _)| op))
            .collect();
        assert_eq!(instrs, vec!["RTS"]);
        assert!(store.labels().is_empty());
    }

    #[test]
    fn stage2_disabled_leaves_known_value_substitution_unapplied() {
        let mut store = ElementStore::new();
        sample_function(&mut store, |s| {
            s.append_instr("LDX", "#$4000", "");
            s.append_instr("TFR", "X,Y", "");
            s.append_instr("RTS", "", "");
        });
        let mut session = Session::new(Target::Simulator);
        session.stage2_enabled = false;
        optimize(&mut store, &mut session);

        assert!(store.iter().any(|e| e.is_instr_opcode("TFR")));
    }

    #[test]
    fn stage2_enabled_substitutes_known_transfer() {
        let mut store = ElementStore::new();
        sample_function(&mut store, |s| {
            s.append_instr("LDX", "#$4000", "");
            s.append_instr("TFR", "X,Y", "");
            s.append_instr("RTS", "", "");
        });
        let mut session = Session::new(Target::Simulator);
        optimize(&mut store, &mut session);

        assert!(!store.iter().any(|e| e.is_instr_opcode("TFR")));
        assert!(store.iter().any(|e| e.is_instr_opcode("LDY")));
    }
}
