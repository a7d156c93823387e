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

//! The explicit context value threaded through emit/optimize/write, carrying
//! per-run configuration that would otherwise live behind a global.

use crate::errors::CoreError;

/// The retro target this run is generating 6809 assembly for. Only `Os9`
/// changes optimizer behavior today (it reserves `Y` for the data segment),
/// but all four are modeled so the selection is never read from a global.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Target {
    DiskBasic,
    Os9,
    Vectrex,
    Simulator,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub target: Target,
    /// Stage-2 rules are quality-gated: they cost a simulator pass per
    /// function and are only worth running when the caller asked for full
    /// optimization.
    pub stage2_enabled: bool,
    /// `LEAS n,S` with `n>0` popping more entries than the simulator has
    /// recorded is normally a lost-track-of-the-stack bug and aborts that
    /// optimization window; setting this makes the simulator treat the
    /// popped slots as unknown instead of failing.
    pub ignore_stack_errors: bool,
    errors: Vec<CoreError>,
}

impl Session {
    pub fn new(target: Target) -> Self {
        Session {
            target,
            stage2_enabled: true,
            ignore_stack_errors: false,
            errors: Vec::new(),
        }
    }

    /// Stage-2 rules that would otherwise repurpose `Y` as a scratch index
    /// register must check this first: under OS-9, `Y` holds the data
    /// segment pointer for the life of the process.
    pub fn reserves_y(&self) -> bool {
        self.target == Target::Os9
    }

    /// Record a semantic error and keep going, so a whole run's errors are
    /// visible in one pass rather than stopping at the first one.
    pub fn report_error(&mut self, err: CoreError) {
        log::warn!("{err}");
        self.errors.push(err);
    }

    pub fn errors(&self) -> &[CoreError] {
        &self.errors
    }

    pub fn had_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
