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

//! A 6809 assembly rewrite/peephole core: an append-only element store for
//! one compilation unit's emitted instructions, a symbolic simulator that
//! proves register and stack values known or unknown across a straight-line
//! run, and a two-stage rewrite engine that uses both to shrink and simplify
//! the stream before it's written out.

pub mod basic_block;
pub mod effects;
pub mod element;
pub mod errors;
pub mod opcode;
pub mod possibly_known;
pub mod registers;
pub mod rewrite;
pub mod session;
pub mod simulator;

use std::io::Write;

use element::ElementStore;
use session::Session;

/// Runs the rewrite engine to a fixpoint over `store` and serializes the
/// result to `out`. This is the one call a caller needs once its own code
/// generator has finished appending to `store` via [`element::store::ElementStore`]'s
/// `append_*`/`emit_*` methods.
pub fn compile_session<W: Write>(
    store: &mut ElementStore,
    session: &mut Session,
    out: &mut W,
) -> Result<(), errors::CoreError> {
    rewrite::optimize(store, session);
    for err in store.validate_labels() {
        session.report_error(err);
    }
    store.write(out)?;
    Ok(())
}
