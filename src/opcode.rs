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

//! Small lookup tables over opcode mnemonics: which ones end a basic block,
//! which are conditional branches (with their logical inverses), and which
//! relational branches have an operand-swapped equivalent. Implemented as
//! `match` over `&str` rather than a chain of `if opcode == "..."` string
//! comparisons (Design Notes §9: "replace with a hashed or perfect-hash
//! dispatch... to avoid quadratic string comparisons").

/// Strip a leading long-branch `L` (`LBEQ` -> `BEQ`) without disturbing
/// opcodes that simply start with `L` for other reasons (`LEAX`, `LDA`...).
/// Only applied by callers that already know `opcode` is a branch mnemonic.
fn strip_long(opcode: &str) -> &str {
    const LONG_BRANCHES: &[&str] = &[
        "LBRA", "LBRN", "LBEQ", "LBNE", "LBLT", "LBGT", "LBLE", "LBGE", "LBLO", "LBHI", "LBLS",
        "LBHS", "LBMI", "LBPL", "LBVS", "LBVC", "LBCS", "LBCC",
    ];
    if let Some(found) = LONG_BRANCHES.iter().find(|&&l| l == opcode) {
        &found[1..]
    } else {
        opcode
    }
}

/// True for opcodes that unconditionally terminate a basic block: returns,
/// unconditional branches/jumps, and the stack-based `PULS U,PC` return idiom
/// (that last one is operand-dependent, so callers must also check the
/// operand via [`is_stack_return`]).
pub fn ends_block_unconditionally(opcode: &str) -> bool {
    matches!(
        opcode.to_ascii_uppercase().as_str(),
        "RTS" | "RTI" | "BRA" | "LBRA" | "JMP"
    )
}

/// `PULS` (or `PULU`) that restores `PC`, the 6809 idiom for a subroutine
/// return using the other stack.
pub fn is_stack_return(opcode: &str, operand: &str) -> bool {
    let op = opcode.to_ascii_uppercase();
    (op == "PULS" || op == "PULU")
        && operand
            .split(',')
            .any(|r| r.trim().eq_ignore_ascii_case("PC"))
}

/// Returns the logical inverse of a conditional branch mnemonic, preserving
/// the `L`/short form of the input (`BEQ` -> `BNE`, `LBEQ` -> `LBNE`).
pub fn invert_conditional_branch(opcode: &str) -> Option<String> {
    let upper = opcode.to_ascii_uppercase();
    let is_long = upper.starts_with('L') && strip_long(&upper) != upper;
    let short = strip_long(&upper);
    let inverse_short = match short {
        "BEQ" => "BNE",
        "BNE" => "BEQ",
        "BLT" => "BGE",
        "BGE" => "BLT",
        "BGT" => "BLE",
        "BLE" => "BGT",
        "BLO" => "BHS",
        "BHS" => "BLO",
        "BHI" => "BLS",
        "BLS" => "BHI",
        "BMI" => "BPL",
        "BPL" => "BMI",
        "BVS" => "BVC",
        "BVC" => "BVS",
        "BCS" => "BCC",
        "BCC" => "BCS",
        _ => return None,
    };
    Some(if is_long {
        format!("L{inverse_short}")
    } else {
        inverse_short.to_string()
    })
}

/// True for any conditional branch mnemonic (short or long form).
pub fn is_conditional_branch(opcode: &str) -> bool {
    invert_conditional_branch(opcode).is_some()
}

/// True for opcodes whose operand, when it isn't an addressing-mode
/// expression, is a bare label name: every conditional branch plus the
/// unconditional branch/call family. `JMP`/`JSR` are excluded since their
/// operand is as likely to be an indexed or extended address as a label.
pub fn is_label_referencing_branch(opcode: &str) -> bool {
    let upper = opcode.to_ascii_uppercase();
    is_conditional_branch(&upper)
        || matches!(upper.as_str(), "BRA" | "LBRA" | "BRN" | "LBRN" | "BSR" | "LBSR")
}

/// Returns the relational branch mnemonic obtained by swapping the order of
/// the two compared operands (`BLT a,b` <-> `BGT b,a`), independent of the
/// inversion table above (inversion negates the test; this swaps its sense
/// under operand order, which a rewrite rule can use to favor the cheaper
/// register-vs-immediate order).
pub fn swap_relational_branch(opcode: &str) -> Option<String> {
    let upper = opcode.to_ascii_uppercase();
    let is_long = upper.starts_with('L') && strip_long(&upper) != upper;
    let short = strip_long(&upper);
    let swapped = match short {
        "BLT" => "BGT",
        "BGT" => "BLT",
        "BLE" => "BGE",
        "BGE" => "BLE",
        "BLO" => "BHI",
        "BHI" => "BLO",
        "BLS" => "BHS",
        "BHS" => "BLS",
        _ => return None,
    };
    Some(if is_long {
        format!("L{swapped}")
    } else {
        swapped.to_string()
    })
}

/// Strips a leading long-branch `L` from any branch mnemonic (conditional or
/// `LBRA`/`LBRN`/`LBSR`), used by the "shorten-branch" rewrite rule. Returns
/// `None` for opcodes that are not in long-branch form already.
pub fn shorten_long_branch(opcode: &str) -> Option<String> {
    const LONG: &[(&str, &str)] = &[
        ("LBRA", "BRA"),
        ("LBRN", "BRN"),
        ("LBSR", "BSR"),
        ("LBEQ", "BEQ"),
        ("LBNE", "BNE"),
        ("LBLT", "BLT"),
        ("LBGT", "BGT"),
        ("LBLE", "BLE"),
        ("LBGE", "BGE"),
        ("LBLO", "BLO"),
        ("LBHI", "BHI"),
        ("LBLS", "BLS"),
        ("LBHS", "BHS"),
        ("LBMI", "BMI"),
        ("LBPL", "BPL"),
        ("LBVS", "BVS"),
        ("LBVC", "BVC"),
        ("LBCS", "BCS"),
        ("LBCC", "BCC"),
    ];
    let upper = opcode.to_ascii_uppercase();
    LONG.iter()
        .find(|&&(l, _)| l == upper)
        .map(|&(_, s)| s.to_string())
}

/// Every opcode this crate marks as requiring a non-empty operand; used by
/// `ElementStore::append_instr`'s precondition assertion.
pub fn requires_operand(opcode: &str) -> bool {
    const NO_OPERAND: &[&str] = &[
        "NOP", "RTS", "RTI", "SWI", "SWI2", "SWI3", "SYNC", "DAA", "SEX", "MUL", "CLRA", "CLRB",
        "COMA", "COMB", "NEGA", "NEGB", "INCA", "INCB", "DECA", "DECB", "TSTA", "TSTB", "ASLA",
        "ASLB", "ASRA", "ASRB", "LSRA", "LSRB", "ROLA", "ROLB", "RORA", "RORB",
    ];
    !NO_OPERAND.contains(&opcode.to_ascii_uppercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverts_short_and_long_forms() {
        assert_eq!(invert_conditional_branch("BEQ").as_deref(), Some("BNE"));
        assert_eq!(invert_conditional_branch("LBEQ").as_deref(), Some("LBNE"));
        assert_eq!(invert_conditional_branch("LDA"), None);
    }

    #[test]
    fn stack_return_detects_pc_in_register_list() {
        assert!(is_stack_return("PULS", "U,PC"));
        assert!(!is_stack_return("PULS", "U,Y"));
        assert!(!is_stack_return("PULU", "A,B"));
    }

    #[test]
    fn operand_requirement_table() {
        assert!(requires_operand("LDA"));
        assert!(!requires_operand("NOP"));
        assert!(!requires_operand("RTS"));
    }

    #[test]
    fn shorten_long_branch_strips_leading_l() {
        assert_eq!(shorten_long_branch("LBEQ").as_deref(), Some("BEQ"));
        assert_eq!(shorten_long_branch("LBRA").as_deref(), Some("BRA"));
        assert_eq!(shorten_long_branch("LDA"), None);
        assert_eq!(shorten_long_branch("BEQ"), None);
    }

    #[test]
    fn label_referencing_branch_covers_conditional_and_unconditional_forms() {
        assert!(is_label_referencing_branch("BEQ"));
        assert!(is_label_referencing_branch("LBRA"));
        assert!(is_label_referencing_branch("BSR"));
        assert!(!is_label_referencing_branch("JMP"));
        assert!(!is_label_referencing_branch("LDA"));
    }
}
