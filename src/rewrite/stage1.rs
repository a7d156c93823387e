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

//! Stage-1 (always on) peephole rules: inexpensive, local transformations
//! over a small window of adjacent elements, grounded on `ASMText.cpp`'s own
//! peephole functions of the same shape (`branchToNextLocation`,
//! `instrFollowingUncondBranch`, `condBranchOverUncondBranch`,
//! `shortenBranch`, `storeLoad`, ...).

use crate::effects;
use crate::element::{ElementKind, ElementStore};
use crate::opcode;

/// A stage-1 rule: given the store and an index, either leaves the store
/// untouched and returns `None`, or rewrites at/around `index` and returns
/// the index the outer scan should resume from.
pub type Stage1Rule = fn(&mut ElementStore, usize) -> Option<usize>;

pub const RULES: &[Stage1Rule] = &[
    branch_to_next_location,
    instr_after_uncond_branch,
    load_zero_word_splits_to_clears,
    load_word_used_as_byte,
    store_then_reload,
    cond_branch_over_uncond_branch,
    shorten_branch,
    push_op_pull_cancellation,
    dead_write,
    load_cmp_zero_branch,
    coalesce_lea_chain,
];

/// Skips comment-like elements starting at `from`, stopping at the first
/// `Instr`. Returns `None` if a `Label`, `InlineAsm`, or `Include` is reached
/// first (all three are boundaries this family of rules must not see past).
fn next_instr_before_label(store: &ElementStore, from: usize) -> Option<usize> {
    let mut i = from;
    while i < store.len() {
        let element = store.get(i);
        if element.as_instr().is_some() {
            return Some(i);
        }
        if !element.is_comment_like() {
            return None; // Label, InlineAsm, or Include: an opaque boundary.
        }
        i += 1;
    }
    None
}

/// Like [`next_instr_before_label`] but also skips over `Label` elements
/// (used where a label between the two instructions does not disqualify the
/// pattern, matching `ASMText::findNextInstr`).
fn next_instr_over_label(store: &ElementStore, from: usize) -> Option<usize> {
    let mut i = from;
    while i < store.len() {
        let element = store.get(i);
        if element.as_instr().is_some() {
            return Some(i);
        }
        if matches!(element.kind, ElementKind::Label { .. }) || element.is_comment_like() {
            i += 1;
            continue;
        }
        return None; // InlineAsm or Include: still an opaque boundary.
    }
    None
}

fn is_uncond_branch(opcode: &str, operand: &str) -> bool {
    let up = opcode.to_ascii_uppercase();
    (up == "BRA" || up == "LBRA") && !operand.trim().is_empty()
}

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

/// True for an absolute hex address in the memory-mapped hardware-register
/// range ($FF00 and above); stores/loads there are never safe to fold away,
/// since reading or writing them can have side effects.
fn is_absolute_io_address(operand: &str) -> bool {
    let trimmed = operand.trim();
    if trimmed.starts_with(',') {
        return false; // indexed, not an absolute address
    }
    match parse_hex_or_dec(trimmed) {
        Some(addr) => (0xFF00..=0xFFFF).contains(&addr),
        None => false,
    }
}

fn register_set(operand: &str) -> std::collections::BTreeSet<String> {
    operand
        .split(',')
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `LBRA`/`BRA target` immediately followed by `target:` is a no-op branch.
fn branch_to_next_location(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !is_uncond_branch(opcode, operand) {
        return None;
    }
    let target = operand.trim().to_string();
    let next = store.get(index + 1);
    if next.as_label()? != target {
        return None;
    }
    store.comment_out(index, Some("branchToNextLocation"));
    Some(index + 1)
}

/// Any instruction sitting between an unconditional branch and the next
/// label is unreachable dead code.
fn instr_after_uncond_branch(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !is_uncond_branch(opcode, operand) {
        return None;
    }
    let dead = next_instr_before_label(store, index + 1)?;
    store.comment_out(dead, Some("instrFollowingUncondBranch"));
    Some(dead + 1)
}

/// `LDD #$0000` splits into `CLRA ; CLRB`, matching end-to-end scenario 4.
fn load_zero_word_splits_to_clears(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !opcode.eq_ignore_ascii_case("LDD") {
        return None;
    }
    if immediate_value(operand)? != 0 {
        return None;
    }
    store.replace_with_instr(index, "CLRA", "", "optim: loadZeroWordSplitsToClears");
    store.insert_instr(index + 1, "CLRB", "", "optim: loadZeroWordSplitsToClears");
    Some(index + 2)
}

/// `LDD #imm` whose high byte is irrelevant because the very next
/// instruction clears `A` narrows to `LDB #low-byte(imm)`.
fn load_word_used_as_byte(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !opcode.eq_ignore_ascii_case("LDD") {
        return None;
    }
    let value = immediate_value(operand)?;
    let next = next_instr_before_label(store, index + 1)?;
    let (next_op, next_operand, _) = store.get(next).as_instr()?;
    if !next_op.eq_ignore_ascii_case("CLRA") || !next_operand.trim().is_empty() {
        return None;
    }
    let low = (value as i64 & 0xFF) as u8;
    store.replace_with_instr(
        index,
        "LDB",
        format!("#${low:02X}"),
        "optim: loadWordUsedAsByte",
    );
    Some(index + 1)
}

/// `ST? addr` followed (past comments) by `LD? addr` into the same register
/// is a redundant reload, unless `addr` is a memory-mapped I/O register.
fn store_then_reload(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    let up = opcode.to_ascii_uppercase();
    if !up.starts_with("ST") || up.len() != 3 {
        return None;
    }
    let reg = up.as_bytes()[2] as char;
    if !"ABD".contains(reg) {
        return None;
    }
    if is_absolute_io_address(operand) {
        return None;
    }
    let next = next_instr_before_label(store, index + 1)?;
    let (next_op, next_operand, _) = store.get(next).as_instr()?;
    let next_up = next_op.to_ascii_uppercase();
    if !next_up.starts_with("LD") || next_up.len() != 3 || next_up.as_bytes()[2] as char != reg {
        return None;
    }
    if next_operand.trim() != operand.trim() {
        return None;
    }
    store.comment_out(next, Some("storeLoad"));
    Some(next + 1)
}

/// `L?bcc foo ; LBRA bar ; foo:` inverts the condition and jumps straight to
/// `bar`, removing the intervening unconditional branch.
fn cond_branch_over_uncond_branch(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    let inverse = opcode::invert_conditional_branch(opcode)?;
    let (uncond_op, uncond_operand, _) = store.get(index + 1).as_instr()?;
    if !is_uncond_branch(uncond_op, uncond_operand) {
        return None;
    }
    let label = store.get(index + 2).as_label()?;
    if label != operand.trim() {
        return None;
    }
    let new_target = uncond_operand.to_string();
    store.replace_with_instr(index, inverse, new_target, "optim: condBranchOverUncondBranch");
    store.comment_out(index + 1, Some("condBranchOverUncondBranch"));
    Some(index + 2)
}

/// A long branch whose target is within 28 instructions, with no
/// `InlineAsm`/`Include`/`Separator` in between, can drop its leading `L`.
fn shorten_branch(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, comment) = store.get(index).as_instr()?;
    let short = opcode::shorten_long_branch(opcode)?;
    let target = operand.trim();
    let &label_index = store.labels().get(target)?;
    let (lo, hi) = if index <= label_index {
        (index, label_index)
    } else {
        (label_index, index)
    };
    let mut instr_count = 0usize;
    for i in lo..=hi {
        let element = store.get(i);
        if matches!(
            element.kind,
            ElementKind::InlineAsm { .. } | ElementKind::Include { .. } | ElementKind::Separator
        ) {
            return None;
        }
        if element.as_instr().is_some() {
            instr_count += 1;
        }
    }
    if instr_count > 28 {
        return None;
    }
    let comment = comment.to_string();
    let operand = operand.to_string();
    store.replace_with_instr(index, short, operand, comment);
    Some(index + 1)
}

/// `PSHS B,A; <ins>; PULS A,B`, where `<ins>` neither reads `D` nor touches
/// the stack, cancels the push/pull pair and keeps `<ins>`.
fn push_op_pull_cancellation(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (opcode, operand, _) = store.get(index).as_instr()?;
    if !opcode.eq_ignore_ascii_case("PSHS") {
        return None;
    }
    let pushed = register_set(operand);
    let middle = next_instr_before_label(store, index + 1)?;
    let (mid_op, mid_operand, mid_comment) = store.get(middle).as_instr()?;
    let (mid_read, _mid_written) = effects::analyze(mid_op, mid_operand, mid_comment);
    if mid_read.contains(crate::registers::RegMask::D) {
        return None;
    }
    if mid_operand.to_ascii_uppercase().contains(",S") {
        return None;
    }
    let pull = next_instr_before_label(store, middle + 1)?;
    let (pull_op, pull_operand, _) = store.get(pull).as_instr()?;
    if !pull_op.eq_ignore_ascii_case("PULS") {
        return None;
    }
    if register_set(pull_operand) != pushed {
        return None;
    }
    store.comment_out(index, Some("pushOpPullCancellation"));
    store.comment_out(pull, Some("pushOpPullCancellation"));
    Some(pull + 1)
}

/// Two writes to the same register with no intervening read removes the
/// first write (it was always going to be clobbered).
fn dead_write(store: &mut ElementStore, index: usize) -> Option<usize> {
    let element = store.get(index);
    let (opcode, operand, comment) = element.as_instr()?;
    let (_read, written) = effects::analyze(opcode, operand, comment);
    if written.is_empty() {
        return None;
    }

    let mut i = index + 1;
    while i < store.len() {
        let element = store.get(i);
        if matches!(element.kind, ElementKind::Label { .. }) {
            return None; // a jump target may arrive with the register still live
        }
        let Some((op, operand, comment)) = element.as_instr() else {
            i += 1;
            continue;
        };
        let (read, w) = effects::analyze(op, operand, comment);
        if read.intersects(written) {
            return None; // read before the next write: can't remove
        }
        if w.contains(written) {
            store.comment_out(index, Some("deadWrite"));
            return Some(index + 1);
        }
        if opcode::ends_block_unconditionally(op) || opcode::is_conditional_branch(op) {
            return None; // control leaves the straight-line region
        }
        i += 1;
    }
    None
}

/// `LDr x; CMPr #0; L?BEQ/BNE` (or `TSTr`) — the load already set `Z`, so the
/// comparison/test is redundant.
fn load_cmp_zero_branch(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (load_op, _load_operand, _) = store.get(index).as_instr()?;
    let up = load_op.to_ascii_uppercase();
    if !(up == "LDA" || up == "LDB") {
        return None;
    }
    let reg = up.as_bytes()[2] as char;

    let cmp_index = next_instr_before_label(store, index + 1)?;
    let (cmp_op, cmp_operand, _) = store.get(cmp_index).as_instr()?;
    let cmp_up = cmp_op.to_ascii_uppercase();
    let is_cmp_zero = cmp_up == format!("CMP{reg}") && immediate_value(cmp_operand) == Some(0);
    let is_tst = cmp_up == format!("TST{reg}");
    if !is_cmp_zero && !is_tst {
        return None;
    }

    let branch_index = next_instr_before_label(store, cmp_index + 1)?;
    let (branch_op, _, _) = store.get(branch_index).as_instr()?;
    let short = opcode::shorten_long_branch(branch_op).unwrap_or_else(|| branch_op.to_ascii_uppercase());
    if short != "BEQ" && short != "BNE" {
        return None;
    }

    let reason = if is_tst { "loadCmpZeroBranch (TST)" } else { "loadCmpZeroBranch" };
    store.comment_out(cmp_index, Some(reason));
    Some(cmp_index + 1)
}

fn parse_indexed(operand: &str) -> Option<(i64, String)> {
    let trimmed = operand.trim();
    let comma = trimmed.find(',')?;
    let (before, after) = trimmed.split_at(comma);
    let after = &after[1..];
    let offset = if before.trim().is_empty() {
        0
    } else {
        parse_hex_or_dec(before)?
    };
    Some((offset, after.trim().to_ascii_uppercase()))
}

/// `LEAr n,base ; LEAr m,r` (the second instruction's base is exactly the
/// register the first just computed into) coalesces to `LEAr (n+m),base`,
/// collapsing two index-register computations into one.
fn coalesce_lea_chain(store: &mut ElementStore, index: usize) -> Option<usize> {
    let (op1, operand1, _) = store.get(index).as_instr()?;
    let up1 = op1.to_ascii_uppercase();
    if !matches!(up1.as_str(), "LEAX" | "LEAY" | "LEAU") {
        return None;
    }
    let dest_reg = up1[3..].to_string();
    let (offset1, base1) = parse_indexed(operand1)?;

    let next = next_instr_before_label(store, index + 1)?;
    let (op2, operand2, comment2) = store.get(next).as_instr()?;
    if !op2.eq_ignore_ascii_case(&up1) {
        return None;
    }
    let (offset2, base2) = parse_indexed(operand2)?;
    if base2 != dest_reg {
        return None;
    }

    let combined = offset1 + offset2;
    let comment2 = comment2.to_string();
    store.comment_out(index, Some("coalesceLeaChain"));
    store.replace_with_instr(next, up1, format!("{combined},{base1}"), comment2);
    Some(next + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_rule_to_fixpoint(store: &mut ElementStore, rule: Stage1Rule) -> usize {
        let mut applied = 0;
        let mut i = 0;
        while i < store.len() {
            if let Some(next) = rule(store, i) {
                applied += 1;
                i = next;
            } else {
                i += 1;
            }
        }
        applied
    }

    #[test]
    fn scenario_branch_to_next_location() {
        let mut store = ElementStore::new();
        store.append_instr("LBRA", "L00010", "");
        store.append_label("L00010", "").unwrap();
        assert_eq!(run_rule_to_fixpoint(&mut store, branch_to_next_location), 1);
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn scenario_coalesce_lea_chain() {
        let mut store = ElementStore::new();
        store.append_instr("LEAX", "3,U", "");
        store.append_instr("LEAX", "5,X", "");
        assert!(coalesce_lea_chain(&mut store, 0).is_some());
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
        assert!(store.get(1).is_instr_opcode("LEAX"));
        assert_eq!(store.get(1).as_instr().unwrap().1, "8,U");
    }

    #[test]
    fn coalesce_lea_chain_refuses_when_base_does_not_match() {
        let mut store = ElementStore::new();
        store.append_instr("LEAX", "3,U", "");
        store.append_instr("LEAX", "5,Y", "");
        assert!(coalesce_lea_chain(&mut store, 0).is_none());
    }

    #[test]
    fn scenario_load_cmp_zero_beq() {
        let mut store = ElementStore::new();
        store.append_instr("LDB", ",U", "");
        store.append_instr("CMPB", "#0", "");
        store.append_instr("LBEQ", "L00001", "");
        assert_eq!(run_rule_to_fixpoint(&mut store, load_cmp_zero_branch), 1);
        assert!(matches!(store.get(1).kind, ElementKind::Comment { .. }));
        assert!(store.get(2).is_instr_opcode("LBEQ"));
    }

    #[test]
    fn scenario_load_zero_word_splits() {
        let mut store = ElementStore::new();
        store.append_instr("LDD", "#$0000", "");
        assert!(load_zero_word_splits_to_clears(&mut store, 0).is_some());
        assert!(store.get(0).is_instr_opcode("CLRA"));
        assert!(store.get(1).is_instr_opcode("CLRB"));
    }

    #[test]
    fn scenario_cond_branch_over_uncond_branch() {
        let mut store = ElementStore::new();
        store.append_instr("LBEQ", "L00020", "");
        store.append_instr("LBRA", "L00021", "");
        store.append_label("L00020", "").unwrap();
        assert!(cond_branch_over_uncond_branch(&mut store, 0).is_some());
        assert!(store.get(0).is_instr_opcode("LBNE"));
        assert_eq!(store.get(0).as_instr().unwrap().1, "L00021");
        assert!(matches!(store.get(1).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn store_then_reload_removes_second_load() {
        let mut store = ElementStore::new();
        store.append_instr("STB", "$2000", "");
        store.append_instr("LDB", "$2000", "");
        assert!(store_then_reload(&mut store, 0).is_some());
        assert!(matches!(store.get(1).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn store_then_reload_does_not_fire_on_io_address() {
        let mut store = ElementStore::new();
        store.append_instr("STB", "$FF22", "");
        store.append_instr("LDB", "$FF22", "");
        assert!(store_then_reload(&mut store, 0).is_none());
    }

    #[test]
    fn dead_write_removes_first_of_two_unread_writes() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#1", "");
        store.append_instr("LDA", "#2", "");
        assert!(dead_write(&mut store, 0).is_some());
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn dead_write_does_not_fire_when_value_is_read_first() {
        let mut store = ElementStore::new();
        store.append_instr("LDA", "#1", "");
        store.append_instr("STA", "$2000", "");
        store.append_instr("LDA", "#2", "");
        assert!(dead_write(&mut store, 0).is_none());
    }

    #[test]
    fn push_op_pull_cancellation_removes_push_and_pull() {
        let mut store = ElementStore::new();
        store.append_instr("PSHS", "B,A", "");
        store.append_instr("LDX", "#$4000", "");
        store.append_instr("PULS", "A,B", "");
        assert!(push_op_pull_cancellation(&mut store, 0).is_some());
        assert!(matches!(store.get(0).kind, ElementKind::Comment { .. }));
        assert!(store.get(1).is_instr_opcode("LDX"));
        assert!(matches!(store.get(2).kind, ElementKind::Comment { .. }));
    }

    #[test]
    fn push_op_pull_cancellation_refuses_when_middle_touches_stack() {
        let mut store = ElementStore::new();
        store.append_instr("PSHS", "B,A", "");
        store.append_instr("LDX", ",S", "");
        store.append_instr("PULS", "A,B", "");
        assert!(push_op_pull_cancellation(&mut store, 0).is_none());
    }

    #[test]
    fn shorten_branch_drops_leading_l_within_range() {
        let mut store = ElementStore::new();
        store.append_instr("LBEQ", "L1", "");
        store.append_instr("NOP", "", "");
        store.append_label("L1", "").unwrap();
        assert!(shorten_branch(&mut store, 0).is_some());
        assert!(store.get(0).is_instr_opcode("BEQ"));
    }

    #[test]
    fn shorten_branch_refuses_across_inline_asm() {
        let mut store = ElementStore::new();
        store.append_instr("LBEQ", "L1", "");
        store.append_inline_asm("\tNOP\n");
        store.append_label("L1", "").unwrap();
        assert!(shorten_branch(&mut store, 0).is_none());
    }

    #[test]
    fn load_word_used_as_byte_narrows_to_ldb() {
        let mut store = ElementStore::new();
        store.append_instr("LDD", "#$1234", "");
        store.append_instr("CLRA", "", "");
        assert!(load_word_used_as_byte(&mut store, 0).is_some());
        assert!(store.get(0).is_instr_opcode("LDB"));
        assert_eq!(store.get(0).as_instr().unwrap().1, "#$34");
    }

    #[test]
    fn next_instr_over_label_skips_labels_but_not_include() {
        let mut store = ElementStore::new();
        store.append_label("SKIP", "").unwrap();
        store.append_instr("NOP", "", "");
        assert_eq!(next_instr_over_label(&store, 0), Some(1));

        let mut store2 = ElementStore::new();
        store2.append_include("foo.inc");
        store2.append_instr("NOP", "", "");
        assert_eq!(next_instr_over_label(&store2, 0), None);
    }
}
