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

//! Demonstration CLI: emits a small hand-written function into an
//! [`m6809opt::element::ElementStore`], runs it through the rewrite engine,
//! and writes the optimized assembly to stdout or a file. Real callers are
//! expected to be a code generator that builds the store itself; this binary
//! exists to exercise that pipeline end to end from the command line.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use m6809opt::element::ElementStore;
use m6809opt::session::{Session, Target};

#[derive(Parser)]
#[clap(version, author = "Connor Nolan", about = "6809 peephole/simulator rewrite demo")]
struct Opts {
    /// Retro target the emitted assembly is generated for.
    #[clap(long, value_enum, default_value = "simulator")]
    target: TargetArg,

    /// Disable the simulator-driven stage-2 rewrite pass, keeping only the
    /// always-on stage-1 peephole rules.
    #[clap(long)]
    no_stage2: bool,

    /// Treat a `LEAS n,S` popping more stack entries than the simulator has
    /// recorded as unknown rather than aborting that optimization window.
    #[clap(long)]
    ignore_stack_errors: bool,

    /// Write the optimized assembly here instead of stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum TargetArg {
    DiskBasic,
    Os9,
    Vectrex,
    Simulator,
}

impl From<TargetArg> for Target {
    fn from(t: TargetArg) -> Self {
        match t {
            TargetArg::DiskBasic => Target::DiskBasic,
            TargetArg::Os9 => Target::Os9,
            TargetArg::Vectrex => Target::Vectrex,
            TargetArg::Simulator => Target::Simulator,
        }
    }
}

fn demo_store() -> ElementStore {
    let mut store = ElementStore::new();
    store.emit_function_start("demo", "1");
    store.append_instr("LDD", "#$0000", "");
    store.append_instr("PSHS", "B,A", "");
    store.append_instr("LDD", "#$0005", "");
    store.append_instr("LEAS", "1,S", "");
    store.append_instr("ADDB", ",S+", "");
    store.append_instr("RTS", "", "");
    store.emit_function_end("demo", "1");
    store
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let opts = Opts::parse();

    let mut session = Session::new(opts.target.into());
    session.stage2_enabled = !opts.no_stage2;
    session.ignore_stack_errors = opts.ignore_stack_errors;

    let mut store = demo_store();

    let mut buffer = Vec::new();
    m6809opt::compile_session(&mut store, &mut session, &mut buffer)
        .context("failed to optimize and serialize the demonstration function")?;

    match opts.output {
        Some(path) => {
            File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?
                .write_all(&buffer)?;
        }
        None => io::stdout().write_all(&buffer)?,
    }

    if session.had_errors() {
        for err in session.errors() {
            eprintln!("error: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
