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

//! The fixed-point rewrite driver: stage-1 rules run over the
//! whole element store on every outer iteration; stage-2 rules run per basic
//! block, consulting a fresh [`crate::simulator::SimState`] built for that
//! block. Both stages share the convention that a rule returns the index the
//! outer scan should resume from on success, so the scan can skip past a
//! rewritten window the way `ASMText::peepholeOptimize`'s `i += n` did.

pub mod engine;
pub mod stage1;
pub mod stage2;

pub use engine::optimize;
