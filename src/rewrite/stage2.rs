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

//! Stage-2 (simulator-driven) rewrite rules. Each rule consults a
//! [`SimState`] already built for the basic block containing `index`, so it
//! can answer "is this register's value known" or "is this write ever read"
//! in constant time rather than re-scanning the block. Stage-2 rules are only
//! run when `session.stage2_enabled` is set, since building that state costs
//! a simulator pass per block.

use crate::effects;
use crate::element::ElementStore;
use crate::registers::RegMask;
use crate::session::Session;
use crate::simulator::SimState;

/// `(store, session, sim, block_end, index)`. `block_end` is the exclusive
/// upper bound of the basic block `index` belongs to, letting a rule check
/// whether it sits at the very end of a block with no fall-through
/// successor (an `RTS`/`RTI` block, where nothing past the block can observe
/// a register's final value).
pub type Stage2Rule = fn(&mut ElementStore, &Session, &SimState, usize, usize) -> Option<usize>;

pub const RULES: &[Stage2Rule] = &[
    stack_operation_folding,
    redundant_pointer_arithmetic,
    strip_consecutive_loads_to_same_reg,
    fold_known_comparison_branch,
    known_value_substitution,
    simulator_proved_dead_write,
];

fn parse_hex_or_dec(text: &str) -> Option<i64> {
    let text = text.trim();
    let (sign, text) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text),
    };
    if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok().map(|v| sign * v)
    } else {
        text.parse::<i64>().ok().map(|v| sign * v)
    }
}

fn immediate_value(operand: &str) -> Option<i64> {
    parse_hex_or_dec(operand.trim().strip_prefix('#')?)
}

fn next_instr(store: &ElementStore, from: usize, block_end: usize) -> Option<usize> {
    let mut i = from;
    while i < block_end {
        let element = store.get(i);
        if element.as_instr().is_some() {
            return Some(i);
        }
        if !element.is_comment_like() {
            return None;
        }
        i += 1;
    }
    None
}

/// `PSHS B,A; LDD #imm; LEAS 1,S; ADDB ,S+` replaces with `ADDB #low(imm)`:
/// the pushed `A` is discarded by the `LEAS`, and the pushed `B` is popped
/// straight back into the addition. Grounded on CMOC's narrow, unconditional
/// `pushLoadDiscardAdd` peephole (a structural match, not a data-flow proof:
/// the original `A`/`B` values going onto the stack are never known here,
/// only the shape of the four-instruction window).
fn stack_operation_folding(
    store: &mut ElementStore,
    _session: &Session,
    _sim: &SimState,
    block_end: usize,
    index: usize,
) -> Option<usize> {
    let (push_op, push_operand, _) = store.get(index).as_instr()?;
    if !push_op.eq_ignore_ascii_case("PSHS") {
        return None;
    }
    let regs: std::collections::BTreeSet<String> = push_operand
        .split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .collect();
    let expected: std::collections::BTreeSet<String> =
        ["A", "B"].into_iter().map(String::from).collect();
    if regs != expected {
        return None;
    }

    let load_index = next_instr(store, index + 1, block_end)?;
    let (load_op, load_operand, _) = store.get(load_index).as_instr()?;
    if !load_op.eq_ignore_ascii_case("LDD") {
        return None;
    }
    let imm = immediate_value(load_operand)?;

    let leas_index = next_instr(store, load_index + 1, block_end)?;
    let (leas_op, leas_operand, _) = store.get(leas_index).as_instr()?;
    if !leas_op.eq_ignore_ascii_case("LEAS") || leas_operand.trim() != "1,S" {
        return None;
    }

    let add_index = next_instr(store, leas_index + 1, block_end)?;
    let (add_op, add_operand, _) = store.get(add_index).as_instr()?;
    if !add_op.eq_ignore_ascii_case("ADDB") || !add_operand.trim().eq_ignore_ascii_case(",S+") {
        return None;
    }

    let low = (imm & 0xFF) as u8;
    store.replace_with_instr(
        add_index,
        "ADDB",
        format!("#${low:02X}"),
        "optim: pushLoadDiscardAdd",
    );
    store.comment_out(index, Some("pushLoadDiscardAdd"));
    store.comment_out(load_index, Some("pushLoadDiscardAdd"));
    store.comment_out(leas_index, Some("pushLoadDiscardAdd"));
    Some(add_index + 1)
}

/// A load whose destination register already holds the same known constant
/// is redundant. Grounded on CMOC's `stripConsecutiveLoadsToSameReg`, but
/// proved here over the whole block via the simulator's pre-instruction
/// snapshot rather than requiring the two loads to be textually adjacent.
fn strip_consecutive_loads_to_same_reg(
    store: &mut ElementStore,
    _session: &Session,
    sim: &SimState,
    _block_end: usize,
    index: usize,
) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    let up = opcode.to_ascii_uppercase();
    let imm = immediate_value(operand)?;
    let snapshot = sim.index_to_state.get(&index)?;

    let already_held = match up.as_str() {
        "LDA" => snapshot.a.known && snapshot.a.value as i64 == imm,
        "LDB" => snapshot.b.known && snapshot.b.value as i64 == imm,
        "LDX" => snapshot.x.known && snapshot.x.value as i64 == imm,
        "LDY" => snapshot.y.known && snapshot.y.value as i64 == imm,
        "LDU" => snapshot.u.known && snapshot.u.value as i64 == imm,
        _ => false,
    };
    if !already_held {
        return None;
    }
    store.comment_out(index, Some("stripConsecutiveLoadsToSameReg"));
    Some(index + 1)
}

/// `CMPr #k`/`TSTr` whose register value the simulator already knows folds
/// the following `BEQ`/`BNE` (short or long) to an unconditional branch or
/// removes it outright.
fn fold_known_comparison_branch(
    store: &mut ElementStore,
    _session: &Session,
    sim: &SimState,
    block_end: usize,
    index: usize,
) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    let up = opcode.to_ascii_uppercase();
    let snapshot = sim.index_to_state.get(&index)?;

    let is_zero = match up.as_str() {
        "TSTA" => snapshot.a.known.then_some(snapshot.a.value == 0),
        "TSTB" => snapshot.b.known.then_some(snapshot.b.value == 0),
        "CMPA" => {
            let imm = immediate_value(operand)?;
            snapshot.a.known.then_some(snapshot.a.value as i64 == imm)
        }
        "CMPB" => {
            let imm = immediate_value(operand)?;
            snapshot.b.known.then_some(snapshot.b.value as i64 == imm)
        }
        _ => None,
    }?;

    let branch_index = next_instr(store, index + 1, block_end)?;
    let (branch_op, branch_operand, branch_comment) = store.get(branch_index).as_instr()?;
    let short = crate::opcode::shorten_long_branch(branch_op)
        .unwrap_or_else(|| branch_op.to_ascii_uppercase());
    let taken = match short.as_str() {
        "BEQ" => is_zero,
        "BNE" => !is_zero,
        _ => return None,
    };

    if taken {
        let operand = branch_operand.to_string();
        let comment = branch_comment.to_string();
        store.replace_with_instr(branch_index, "BRA", operand, comment);
    } else {
        store.comment_out(branch_index, Some("foldKnownComparisonBranch"));
    }
    store.comment_out(index, Some("foldKnownComparisonBranch"));
    Some(branch_index + 1)
}

/// A write the simulator never saw read anywhere in a block that ends in an
/// unconditional return has no observer: nothing past the `RTS`/`RTI` can
/// read a register out of this function. Restricted to the index registers
/// (`X`/`Y`/`U`/`DP`): `A`/`B`/`D` carry a function's return value by
/// convention, so an unread write to them at the end of a block is not
/// provably dead from this simulator pass alone. `CC` is excluded for the
/// same reason this pass never tracks flag liveness elsewhere.
fn simulator_proved_dead_write(
    store: &mut ElementStore,
    _session: &Session,
    sim: &SimState,
    block_end: usize,
    index: usize,
) -> Option<usize> {
    let last = store.get(block_end.checked_sub(1)?).as_instr()?;
    let (last_op, last_operand, _) = last;
    let ends_in_return = last_op.eq_ignore_ascii_case("RTS")
        || last_op.eq_ignore_ascii_case("RTI")
        || crate::opcode::is_stack_return(last_op, last_operand);
    if !ends_in_return {
        return None;
    }

    let (opcode, operand, comment) = store.get(index).as_instr()?;
    let (_read, written) = effects::analyze(opcode, operand, comment);
    let candidates = RegMask::X | RegMask::Y | RegMask::U | RegMask::DP;
    if written.is_empty() || !candidates.contains(written) {
        return None;
    }
    if sim.index_to_refs.contains_key(&index) {
        return None; // proved used somewhere later in the block
    }
    store.comment_out(index, Some("simulatorProvedDeadWrite"));
    Some(index + 1)
}

/// `TFR src,dst` where `src`'s value is already known at this point
/// rewrites to a direct `LDdst #value`, breaking the dependency on whatever
/// instruction produced `src`. Generalizes CMOC's `removeTfrDX`, which only
/// recognized the literal `LDD xxxx; TFR D,X` window, to any register pair
/// the simulator can prove known — the same transform the distilled rule
/// table calls out via the `LDD xxxx; TFR D,X; LDD yyyy; LEAX D,X` example
/// (the `TFR` is redundant pointer arithmetic once `D`'s value is already on
/// record). Declines to touch `Y` when the active target reserves it for the
/// data segment pointer, and only rewrites to a destination that actually has
/// an immediate-load mnemonic (`TFR A,DP`/`TFR A,CC` have no `LDDP`/`LDCC`).
fn redundant_pointer_arithmetic(
    store: &mut ElementStore,
    session: &Session,
    sim: &SimState,
    _block_end: usize,
    index: usize,
) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !opcode.eq_ignore_ascii_case("TFR") {
        return None;
    }
    let mut parts = operand.split(',');
    let src = parts.next()?.trim().to_ascii_uppercase();
    let dst = parts.next()?.trim().to_ascii_uppercase();
    if parts.next().is_some() {
        return None;
    }
    if !matches!(dst.as_str(), "A" | "B" | "D" | "X" | "Y" | "U" | "S") {
        return None; // no LDdst immediate-load mnemonic exists for this dst
    }
    if dst == "Y" && session.reserves_y() {
        return None;
    }

    let snapshot = sim.index_to_state.get(&index)?;
    let (known, value, width16) = match src.as_str() {
        "A" => (snapshot.a.known, snapshot.a.value as u32, false),
        "B" => (snapshot.b.known, snapshot.b.value as u32, false),
        "X" => (snapshot.x.known, snapshot.x.value as u32, true),
        "Y" => (snapshot.y.known, snapshot.y.value as u32, true),
        "U" => (snapshot.u.known, snapshot.u.value as u32, true),
        "D" => (
            snapshot.a.known && snapshot.b.known,
            ((snapshot.a.value as u32) << 8) | snapshot.b.value as u32,
            true,
        ),
        _ => return None,
    };
    if !known {
        return None;
    }
    let dst_is_16 = matches!(dst.as_str(), "X" | "Y" | "U" | "D" | "S");
    if dst_is_16 != width16 {
        return None; // a byte register can't receive a word-sized constant here
    }

    let load_op = format!("LD{dst}");
    let load_operand = if width16 {
        format!("#${value:04X}")
    } else {
        format!("#${value:02X}")
    };
    store.replace_with_instr(
        index,
        load_op,
        load_operand,
        "optim: redundantPointerArithmetic",
    );
    Some(index + 1)
}

/// `LDr ,X` / `,Y` / `,U` (bare indexed, zero offset, no auto inc/dec) where
/// the simulator has already proved the pointer register's value becomes an
/// extended-address load of that literal address, severing the dependency on
/// the pointer entirely. Declines addresses `$FF00`-`$FFFF`: on the 6809 that
/// range is where hardware registers live, and a board's I/O devices can
/// latch or clear state on read, so folding the load to a fixed address there
/// would change what the program observes.
fn known_value_substitution(
    store: &mut ElementStore,
    _session: &Session,
    sim: &SimState,
    _block_end: usize,
    index: usize,
) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    let up = opcode.to_ascii_uppercase();
    if !matches!(up.as_str(), "LDA" | "LDB" | "LDD" | "LDX" | "LDY" | "LDU") {
        return None;
    }
    let reg = operand.trim().strip_prefix(',')?.trim().to_ascii_uppercase();
    if !matches!(reg.as_str(), "X" | "Y" | "U") {
        return None;
    }

    let snapshot = sim.index_to_state.get(&index)?;
    let (known, addr) = match reg.as_str() {
        "X" => (snapshot.x.known, snapshot.x.value as i64),
        "Y" => (snapshot.y.known, snapshot.y.value as i64),
        "U" => (snapshot.u.known, snapshot.u.value as i64),
        _ => return None,
    };
    if !known {
        return None;
    }
    if (0xFF00..=0xFFFF).contains(&addr) {
        return None; // hardware register range, must not be folded to a literal
    }

    let new_operand = format!("${addr:04X}");
    store.replace_with_instr(index, up, new_operand, "optim: knownValueSubstitution");
    Some(index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::session::{Session, Target};

    fn simulate(store: &ElementStore, start: usize, end: usize) -> SimState {
        let mut sim = SimState::new(false);
        for i in start..end {
            if let Some((opcode, operand, _)) = store.get(i).as_instr() {
                sim.process(opcode, operand, i);
            }
        }
        sim
    }

    #[test]
    fn stack_operation_folding_matches_push_load_discard_add() {
        let mut store = ElementStore::new();
        store.append_instr("PSHS", "B,A", "");
        store.append_instr("LDD", "#$0005", "");
        store.append_instr("LEAS", "1,S", "");
        store.append_instr("ADDB", ",S+", "");
        let sim = simulate(&store, 0, 0); // folding is structural; an empty sim suffices
        let session = Session::new(Target::Simulator);
        let next = stack_operation_folding(&mut store, &session, &sim, store.len(), 0);
        assert!(next.is_some());
        assert!(store.get(3).is_instr_opcode("ADDB"));
        assert_eq!(store.get(3).as_instr().unwrap().1, "#$05");
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
        assert!(matches!(store.get(1).kind, ElementKind::Comment { .. }));
        assert!(matches!(store.get(2).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn strip_consecutive_loads_removes_redundant_reload() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#$10", "");
        store.append_instr("LDA", "#$10", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = strip_consecutive_loads_to_same_reg(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_some());
        assert!(matches!(store.get(1).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn fold_known_comparison_branch_removes_provably_false_branch() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#$01", "");
        store.append_instr("TSTA", "", "");
        store.append_instr("LBEQ", "L1", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = fold_known_comparison_branch(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_some());
        assert!(matches!(store.get(2).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn fold_known_comparison_branch_takes_provably_true_branch_unconditionally() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#$00", "");
        store.append_instr("TSTA", "", "");
        store.append_instr("LBEQ", "L1", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        fold_known_comparison_branch(&mut store, &session, &sim, store.len(), 1);
        assert!(store.get(2).is_instr_opcode("BRA"));
    }

    #[test]
    fn simulator_proved_dead_write_fires_at_end_of_returning_block() {
        let mut store = ElementStore::new();
        store.append_instr("LDX", "#$0001", "");
        store.append_instr("RTS", "", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = simulator_proved_dead_write(&mut store, &session, &sim, store.len(), 0);
        assert!(next.is_some());
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn simulator_proved_dead_write_declines_return_value_registers() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#$01", "");
        store.append_instr("RTS", "", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = simulator_proved_dead_write(&mut store, &session, &sim, store.len(), 0);
        assert!(next.is_none());
    }

    #[test]
    fn redundant_pointer_arithmetic_replaces_tfr_with_load() {
        let mut store = ElementStore::new();
        store.append_instr("LDX", "#$4000", "");
        store.append_instr("TFR", "X,Y", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = redundant_pointer_arithmetic(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_some());
        assert!(store.get(1).is_instr_opcode("LDY"));
        assert_eq!(store.get(1).as_instr().unwrap().1, "#$4000");
    }

    #[test]
    fn redundant_pointer_arithmetic_declines_y_under_os9() {
        let mut store = ElementStore::new();
        store.append_instr("LDX", "#$4000", "");
        store.append_instr("TFR", "X,Y", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Os9);
        let next = redundant_pointer_arithmetic(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_none());
    }

    #[test]
    fn redundant_pointer_arithmetic_declines_transfer_to_dp() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#$10", "");
        store.append_instr("TFR", "A,DP", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = redundant_pointer_arithmetic(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_none());
        assert!(store.get(1).is_instr_opcode("TFR"));
    }

    #[test]
    fn known_value_substitution_folds_indexed_load_through_known_pointer() {
        let mut store = ElementStore::new();
        store.append_instr("LDX", "#$4000", "");
        store.append_instr("LDB", ",X", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = known_value_substitution(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_some());
        assert!(store.get(1).is_instr_opcode("LDB"));
        assert_eq!(store.get(1).as_instr().unwrap().1, "$4000");
    }

    #[test]
    fn known_value_substitution_declines_hardware_register_range() {
        let mut store = ElementStore::new();
        store.append_instr("LDX", "#$FF22", "");
        store.append_instr("LDB", ",X", "");
        let sim = simulate(&store, 0, store.len());
        let session = Session::new(Target::Simulator);
        let next = known_value_substitution(&mut store, &session, &sim, store.len(), 1);
        assert!(next.is_none());
    }
}
