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

//! Pure function from one instruction's opcode/operand text to the two
//! register masks it reads and writes. Every rewrite rule that reasons about
//! liveness or aliasing goes through this module instead of inspecting
//! opcodes itself.

use crate::element::{Element, ElementKind};
use crate::opcode;
use crate::registers::{RegMask, Register};

/// A comment carrying this substring marks an `Instr` as standing in for an
/// inline-assembly statement whose actual effect on registers cannot be
/// determined from the opcode alone (see `original_source`'s treatment of
/// `asm` statements in `AssemblerStmt.cpp`, where an inline block is always
/// assumed to clobber the caller-saved registers).
pub const INLINE_ASM_TAG: &str = "#inline-asm-effect";

/// The conservative mask used for inline assembly and for the caller side of
/// a subroutine call: every register a called function is allowed to use
/// without saving, plus the stack pointer for calls (the return address).
pub(crate) const CALLER_SAVED: RegMask = RegMask::A
    .union(RegMask::B)
    .union(RegMask::X)
    .union(RegMask::Y)
    .union(RegMask::U);

/// Computes `(read, written)` for one element. Non-`Instr`, non-`InlineAsm`
/// elements have no register effect. `InlineAsm` blobs are conservative,
/// since their contents are opaque text, not parsed opcodes.
pub fn analyze_element(element: &Element) -> (RegMask, RegMask) {
    match &element.kind {
        ElementKind::InlineAsm { .. } => (CALLER_SAVED, CALLER_SAVED),
        ElementKind::Instr {
            opcode,
            operand,
            comment,
        } => analyze(opcode, operand, comment),
        _ => (RegMask::empty(), RegMask::empty()),
    }
}

/// Computes `(read, written)` for one `Instr`'s opcode/operand/comment.
pub fn analyze(opcode: &str, operand: &str, comment: &str) -> (RegMask, RegMask) {
    if comment.contains(INLINE_ASM_TAG) {
        return (CALLER_SAVED, CALLER_SAVED);
    }

    let up = opcode.to_ascii_uppercase();
    let (mut read, mut written) = base_effect(&up, operand);

    let (operand_read, operand_written) = analyze_operand(operand);
    read |= operand_read;
    written |= operand_written;

    if opcode::is_conditional_branch(&up) {
        read |= RegMask::CC;
    }

    (read, written)
}

fn base_effect(up: &str, operand: &str) -> (RegMask, RegMask) {
    use RegMask as M;
    match up {
        "NOP" | "SYNC" => (M::empty(), M::empty()),
        "DAA" => (M::A, M::A),
        "SEX" => (M::B, M::A),
        "MUL" => (M::D, M::D),

        // Software interrupts act like a full context switch: everything is
        // pushed to the stack and may come back changed.
        "SWI" | "SWI2" | "SWI3" => (CALLER_SAVED, CALLER_SAVED.union(M::S)),

        "RTS" => (M::S, M::empty()),
        "RTI" => (
            M::S,
            M::A.union(M::B).union(M::X).union(M::Y).union(M::U).union(M::DP).union(M::CC),
        ),

        // ANDCC/ORCC explicitly target CC, unlike ordinary ALU ops whose
        // flag update is a side effect we deliberately don't track.
        "ANDCC" | "ORCC" => (M::CC, M::CC),

        "LDA" => (M::empty(), M::A),
        "LDB" => (M::empty(), M::B),
        "LDD" => (M::empty(), M::D),
        "LDX" => (M::empty(), M::X),
        "LDY" => (M::empty(), M::Y),
        "LDU" => (M::empty(), M::U),
        "LDS" => (M::empty(), M::S),

        "STA" => (M::A, M::empty()),
        "STB" => (M::B, M::empty()),
        "STD" => (M::D, M::empty()),
        "STX" => (M::X, M::empty()),
        "STY" => (M::Y, M::empty()),
        "STU" => (M::U, M::empty()),
        "STS" => (M::S, M::empty()),

        "ADDA" | "SUBA" | "ANDA" | "ORA" | "EORA" | "ADCA" | "SBCA" => (M::A, M::A),
        "ADDB" | "SUBB" | "ANDB" | "ORB" | "EORB" | "ADCB" | "SBCB" => (M::B, M::B),
        "ADDD" | "SUBD" => (M::D, M::D),

        "CMPA" | "BITA" => (M::A, M::empty()),
        "CMPB" | "BITB" => (M::B, M::empty()),
        "CMPD" => (M::D, M::empty()),
        "CMPX" => (M::X, M::empty()),
        "CMPY" => (M::Y, M::empty()),
        "CMPU" => (M::U, M::empty()),
        "CMPS" => (M::S, M::empty()),

        "CLRA" => (M::empty(), M::A),
        "CLRB" => (M::empty(), M::B),
        "TSTA" => (M::A, M::empty()),
        "TSTB" => (M::B, M::empty()),
        "INCA" | "DECA" | "COMA" | "NEGA" | "ASLA" | "ASRA" | "LSRA" | "ROLA" | "RORA" => {
            (M::A, M::A)
        }
        "INCB" | "DECB" | "COMB" | "NEGB" | "ASLB" | "ASRB" | "LSRB" | "ROLB" | "RORB" => {
            (M::B, M::B)
        }

        // Memory-only forms of the above: no accumulator involved, only
        // whatever addressing-mode registers `analyze_operand` finds.
        "INC" | "DEC" | "CLR" | "COM" | "NEG" | "ASL" | "ASR" | "LSR" | "ROL" | "ROR" | "TST"
        | "JMP" => (M::empty(), M::empty()),

        "LEAX" => (M::empty(), M::X),
        "LEAY" => (M::empty(), M::Y),
        "LEAU" => (M::empty(), M::U),
        "LEAS" => (M::empty(), M::S),

        "JSR" | "BSR" | "LBSR" => (CALLER_SAVED, CALLER_SAVED.union(M::S)),

        "PSHS" | "PSHU" => {
            let pointer = if up == "PSHS" { M::S } else { M::U };
            (register_list(operand).union(pointer), pointer)
        }
        "PULS" | "PULU" => {
            let pointer = if up == "PULS" { M::S } else { M::U };
            (pointer, register_list(operand).union(pointer))
        }

        "TFR" => {
            let (src, dst) = register_pair(operand);
            (src, dst)
        }
        "EXG" => {
            let (src, dst) = register_pair(operand);
            (src.union(dst), src.union(dst))
        }

        "BRA" | "LBRA" | "BRN" | "LBRN" => (M::empty(), M::empty()),

        _ if opcode::is_conditional_branch(up) => (M::empty(), M::empty()),

        _ => {
            log::error!("effects::analyze: unknown opcode \"{up}\" (treated as a compiler bug)");
            (M::empty(), M::empty())
        }
    }
}

/// Parses a `PSHS`/`PULS`/`PSHU`/`PULU` register list (`"B,A"`, `"U,Y,X,DP,B,A,CC"`).
fn register_list(operand: &str) -> RegMask {
    operand
        .split(',')
        .filter_map(|tok| Register::parse(tok.trim()))
        .fold(RegMask::empty(), |mask, r| mask | r.mask())
}

/// Parses a `TFR`/`EXG` operand (`"A,B"`, `"X,Y"`) into `(first, second)`.
/// `D` and `PC` are valid on real hardware but contribute no bits here: `D`
/// expands to `A|B` via [`Register::mask`]'s caller (`D` itself doesn't
/// parse through [`Register::parse`], so callers wanting `D` support call
/// [`parse_transfer_register`] instead).
fn register_pair(operand: &str) -> (RegMask, RegMask) {
    let mut parts = operand.split(',');
    let first = parts.next().map(parse_transfer_register).unwrap_or_default();
    let second = parts.next().map(parse_transfer_register).unwrap_or_default();
    (first, second)
}

fn parse_transfer_register(text: &str) -> RegMask {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("D") {
        RegMask::D
    } else if trimmed.eq_ignore_ascii_case("PC") {
        RegMask::empty()
    } else {
        Register::parse(trimmed).map(Register::mask).unwrap_or_default()
    }
}

/// Inspects an addressing-mode operand for the extra registers it reads (and,
/// for auto-increment/decrement forms, writes): `,X` / `,Y` / `,U` / `,S`
/// suffixes, `,X+` / `,X++` / `,-X` / `,--X` auto inc/dec forms, `A,X` /
/// `B,X` / `D,X` accumulator-offset prefixes, and `[...]` indirection (the
/// brackets themselves add nothing; the inner expression is parsed the same
/// way either way).
fn analyze_operand(operand: &str) -> (RegMask, RegMask) {
    let inner = operand.trim().strip_prefix('[').map(|s| s.trim_end_matches(']')).unwrap_or(operand);

    let mut read = RegMask::empty();
    let mut written = RegMask::empty();

    if let Some(comma) = inner.find(',') {
        let (before, after_comma) = inner.split_at(comma);
        let after = &after_comma[1..];
        let before = before.trim();

        // Accumulator-offset prefix: "A,X" / "B,X" / "D,X".
        if before.eq_ignore_ascii_case("A") {
            read |= RegMask::A;
        } else if before.eq_ignore_ascii_case("B") {
            read |= RegMask::B;
        } else if before.eq_ignore_ascii_case("D") {
            read |= RegMask::D;
        }

        let after = after.trim();
        let (reg_text, inc_dec) = strip_auto_inc_dec(after);
        if let Some(reg) = Register::parse(reg_text) {
            read |= reg.mask();
            if inc_dec {
                written |= reg.mask();
            }
        }
    }

    (read, written)
}

/// Strips a trailing `+`/`++` or leading `-`/`--` auto inc/dec marker,
/// returning the bare register name and whether an auto inc/dec was present.
fn strip_auto_inc_dec(text: &str) -> (&str, bool) {
    if let Some(stripped) = text.strip_prefix("--") {
        (stripped, true)
    } else if let Some(stripped) = text.strip_prefix('-') {
        (stripped, true)
    } else if let Some(stripped) = text.strip_suffix("++") {
        (stripped, true)
    } else if let Some(stripped) = text.strip_suffix('+') {
        (stripped, true)
    } else {
        (text, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_writes_a_only() {
        let (r, w) = analyze("LDA", "#1", "");
        assert_eq!(r, RegMask::empty());
        assert_eq!(w, RegMask::A);
    }

    #[test]
    fn sta_reads_a_and_writes_nothing() {
        let (r, w) = analyze("STA", "$2000", "");
        assert_eq!(r, RegMask::A);
        assert_eq!(w, RegMask::empty());
    }

    #[test]
    fn indexed_operand_reads_index_register() {
        let (r, _w) = analyze("LDA", ",X", "");
        assert!(r.contains(RegMask::X));
    }

    #[test]
    fn post_increment_reads_and_writes_index_register() {
        let (r, w) = analyze("LDA", ",X+", "");
        assert!(r.contains(RegMask::X));
        assert!(w.contains(RegMask::X));
    }

    #[test]
    fn plain_indexed_does_not_write_index_register() {
        let (_r, w) = analyze("LDA", "4,X", "");
        assert!(!w.contains(RegMask::X));
    }

    #[test]
    fn accumulator_offset_prefix_reads_accumulator_and_index() {
        let (r, _w) = analyze("LDA", "B,X", "");
        assert!(r.contains(RegMask::B));
        assert!(r.contains(RegMask::X));
    }

    #[test]
    fn indirect_bracket_parses_inner_like_direct() {
        let (direct_r, _) = analyze("LDA", "4,X", "");
        let (indirect_r, _) = analyze("LDA", "[4,X]", "");
        assert_eq!(direct_r, indirect_r);
    }

    #[test]
    fn tfr_reads_source_writes_destination() {
        let (r, w) = analyze("TFR", "CC,B", "");
        assert_eq!(r, RegMask::CC);
        assert_eq!(w, RegMask::B);
    }

    #[test]
    fn tfr_cc_to_register_is_the_documented_cc_read_case() {
        let (r, _w) = analyze("TFR", "CC,A", "");
        assert!(r.contains(RegMask::CC));
    }

    #[test]
    fn exg_reads_and_writes_both_registers() {
        let (r, w) = analyze("EXG", "X,Y", "");
        assert!(r.contains(RegMask::X) && r.contains(RegMask::Y));
        assert!(w.contains(RegMask::X) && w.contains(RegMask::Y));
    }

    #[test]
    fn pshs_reads_listed_registers_plus_s() {
        let (r, w) = analyze("PSHS", "B,A", "");
        assert!(r.contains(RegMask::A) && r.contains(RegMask::B) && r.contains(RegMask::S));
        assert_eq!(w, RegMask::S);
    }

    #[test]
    fn pshs_cc_exposes_flags_via_read() {
        let (r, _w) = analyze("PSHS", "CC", "");
        assert!(r.contains(RegMask::CC));
    }

    #[test]
    fn ordinary_alu_does_not_set_cc_written() {
        let (_r, w) = analyze("ANDB", "#0", "");
        assert!(!w.contains(RegMask::CC));
    }

    #[test]
    fn conditional_branch_reads_cc_unconditional_does_not() {
        let (r, _w) = analyze("BEQ", "L1", "");
        assert!(r.contains(RegMask::CC));
        let (r2, _w2) = analyze("BRA", "L1", "");
        assert!(!r2.contains(RegMask::CC));
    }

    #[test]
    fn inline_asm_tagged_instr_is_conservative() {
        let (r, w) = analyze("NOP", "", INLINE_ASM_TAG);
        assert_eq!(r, CALLER_SAVED);
        assert_eq!(w, CALLER_SAVED);
    }

    #[test]
    fn jsr_is_conservative_and_touches_s() {
        let (r, w) = analyze("JSR", "FOO", "");
        assert_eq!(r, CALLER_SAVED);
        assert!(w.contains(RegMask::S));
    }

    #[test]
    fn unknown_opcode_returns_empty_masks() {
        let (r, w) = analyze("FROBNICATE", "X", "");
        assert_eq!(r, RegMask::empty());
        assert_eq!(w, RegMask::empty());
    }
}
