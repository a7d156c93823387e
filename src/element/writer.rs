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

//! Serializes an [`ElementStore`] to the line-oriented textual assembly
//! format the external assembler expects. Every per-kind form below is
//! fixed by that interface; none of it is a style choice.

use std::io::{self, Write};

use crate::element::{ElementKind, ElementStore};

const SEPARATOR_WIDTH: usize = 60;

pub fn write<W: Write>(store: &ElementStore, out: &mut W) -> io::Result<()> {
    for element in store.iter() {
        write_one(&element.kind, out)?;
    }
    Ok(())
}

fn write_one<W: Write>(kind: &ElementKind, out: &mut W) -> io::Result<()> {
    match kind {
        ElementKind::Instr {
            opcode,
            operand,
            comment,
        } => write_instr(opcode, operand, comment, out),
        ElementKind::Label { name, comment } => write_label(name, comment, out),
        ElementKind::InlineAsm { text } => {
            writeln!(out, "* Inline assembly:")?;
            write!(out, "{text}")?;
            if !text.ends_with('\n') {
                writeln!(out)?;
            }
            writeln!(out, "* End of inline assembly.")
        }
        ElementKind::Comment { text } => writeln!(out, "*\t{text}"),
        ElementKind::Separator => {
            writeln!(out)?;
            writeln!(out, "{}", "*".repeat(SEPARATOR_WIDTH))?;
            writeln!(out)
        }
        ElementKind::Include { path } => writeln!(out, "\tINCLUDE {path}"),
        ElementKind::FunctionStart { id, line } => {
            writeln!(out, "* FUNCTION {id}(): defined at {line}")
        }
        ElementKind::FunctionEnd { id, line } => {
            writeln!(out, "* END FUNCTION {id}(): defined at {line}")?;
            writeln!(out, "funcend_{id}\tEQU\t*")?;
            writeln!(out, "funcsize_{id}\tEQU\tfuncend_{id}-{id}")
        }
        ElementKind::SectionStart { name } => {
            writeln!(out)?;
            writeln!(out, "\tSECTION {name}")?;
            writeln!(out)
        }
        ElementKind::SectionEnd => {
            writeln!(out)?;
            writeln!(out, "\tENDSECTION")?;
            writeln!(out)
        }
        ElementKind::Export { name } => writeln!(out, "{name}\tEXPORT"),
        ElementKind::Import { name } => writeln!(out, "{name}\tIMPORT"),
        ElementKind::End => writeln!(out, "\tEND"),
    }
}

fn write_instr<W: Write>(opcode: &str, operand: &str, comment: &str, out: &mut W) -> io::Result<()> {
    write!(out, "\t{opcode}\t{operand}")?;
    if !comment.is_empty() {
        // Short operands leave the comment column short of the usual tab
        // stop; an extra tab keeps comments aligned the way the external
        // assembler's listing expects.
        if operand.len() < 8 {
            write!(out, "\t")?;
        }
        write!(out, "\t{comment}")?;
    }
    writeln!(out)
}

fn write_label<W: Write>(name: &str, comment: &str, out: &mut W) -> io::Result<()> {
    // Emitted as `NAME EQU *` rather than `NAME:` so a trailing comment can
    // never be misread as an opcode by the external assembler.
    write!(out, "{name}\tEQU\t*")?;
    if !comment.is_empty() {
        write!(out, "\t\t{comment}")?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut ElementStore)) -> String {
        let mut store = ElementStore::new();
        f(&mut store);
        let mut buf = Vec::new();
        store.write(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn instr_line_uses_tabs() {
        let text = rendered(|s| {
            s.append_instr("LDA", "#1", "");
        });
        assert_eq!(text, "\tLDA\t#1\n");
    }

    #[test]
    fn label_line_is_equ_star_not_a_colon() {
        let text = rendered(|s| {
            s.append_label("LOOP", "").unwrap();
        });
        assert_eq!(text, "LOOP\tEQU\t*\n");
    }

    #[test]
    fn comment_line_uses_star_tab() {
        let text = rendered(|s| {
            s.append_comment("hello");
        });
        assert_eq!(text, "*\thello\n");
    }

    #[test]
    fn include_line() {
        let text = rendered(|s| {
            s.append_include("stdlib.inc");
        });
        assert_eq!(text, "\tINCLUDE stdlib.inc\n");
    }

    #[test]
    fn export_import_and_end_lines() {
        let text = rendered(|s| {
            s.emit_export("main");
            s.emit_import("putchar");
            s.emit_end();
        });
        assert_eq!(text, "main\tEXPORT\nputchar\tIMPORT\n\tEND\n");
    }

    #[test]
    fn function_end_emits_funcend_and_funcsize_symbols() {
        let text = rendered(|s| {
            s.emit_function_end("main", "12");
        });
        assert!(text.contains("funcend_main\tEQU\t*\n"));
        assert!(text.contains("funcsize_main\tEQU\tfuncend_main-main\n"));
    }

    #[test]
    fn inline_asm_is_bracketed_verbatim() {
        let text = rendered(|s| {
            s.append_inline_asm("\tLDA #1\n");
        });
        assert_eq!(
            text,
            "* Inline assembly:\n\tLDA #1\n* End of inline assembly.\n"
        );
    }
}
