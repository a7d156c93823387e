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

//! The 6809 register file as seen by the optimizer: eight named storage
//! locations, encoded as a single byte so any subset fits in one `RegMask`.
//! `D` is not a storage location of its own; it is the `A:B` pair, and is
//! represented by [`RegMask::D`] as a convenience union rather than a ninth
//! bit. `PC` is tracked by the basic-block graph, not by this mask.

use bitflags::bitflags;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Register {
    A,
    B,
    X,
    Y,
    U,
    S,
    Dp,
    Cc,
}

impl Register {
    pub const ALL: [Register; 8] = [
        Register::A,
        Register::B,
        Register::X,
        Register::Y,
        Register::U,
        Register::S,
        Register::Dp,
        Register::Cc,
    ];

    /// Parse a register name as it appears in assembly operand text
    /// (`"X"`, `"PC"`, `"CC"`, ...). Returns `None` for `D` and `PC`, which
    /// are not `RegMask` bits on their own.
    pub fn parse(text: &str) -> Option<Register> {
        match text.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Register::A),
            "B" => Some(Register::B),
            "X" => Some(Register::X),
            "Y" => Some(Register::Y),
            "U" => Some(Register::U),
            "S" => Some(Register::S),
            "DP" => Some(Register::Dp),
            "CC" => Some(Register::Cc),
            _ => None,
        }
    }

    pub fn is_16_bit(self) -> bool {
        matches!(
            self,
            Register::X | Register::Y | Register::U | Register::S
        )
    }

    pub fn mask(self) -> RegMask {
        match self {
            Register::A => RegMask::A,
            Register::B => RegMask::B,
            Register::X => RegMask::X,
            Register::Y => RegMask::Y,
            Register::U => RegMask::U,
            Register::S => RegMask::S,
            Register::Dp => RegMask::DP,
            Register::Cc => RegMask::CC,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Register::A => "A",
            Register::B => "B",
            Register::X => "X",
            Register::Y => "Y",
            Register::U => "U",
            Register::S => "S",
            Register::Dp => "DP",
            Register::Cc => "CC",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Registers touched by one instruction. One bit per named register in
    /// [`Register`]; `D` is the union of `A` and `B`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct RegMask: u8 {
        const A  = 0b0000_0001;
        const B  = 0b0000_0010;
        const X  = 0b0000_0100;
        const Y  = 0b0000_1000;
        const U  = 0b0001_0000;
        const S  = 0b0010_0000;
        const DP = 0b0100_0000;
        const CC = 0b1000_0000;

        /// `D` aliases `A:B`; this is a derived constant, not a new bit.
        const D = Self::A.bits() | Self::B.bits();
    }
}

impl RegMask {
    pub fn contains_reg(self, r: Register) -> bool {
        self.contains(r.mask())
    }
}
