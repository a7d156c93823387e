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

//! A value the simulator may or may not be able to pin down, plus the
//! element-store index of the instruction that last produced it. Arithmetic
//! on two `PossiblyKnown` values follows Kleene logic (`known` iff both
//! operands are known), with the two documented shortcuts for bitwise `AND`
//! with a known zero and bitwise `OR` with a known all-ones value.

/// Implemented for the two widths the simulator tracks: 8-bit register/stack
/// values and 16-bit index-register values.
pub trait Wrapping: Copy + PartialEq + Default {
    fn wadd(self, other: Self) -> Self;
    fn wsub(self, other: Self) -> Self;
    fn wand(self, other: Self) -> Self;
    fn wor(self, other: Self) -> Self;
    fn wxor(self, other: Self) -> Self;
    fn is_zero(self) -> bool;
    fn all_ones() -> Self;
}

impl Wrapping for u8 {
    fn wadd(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn wsub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
    fn wand(self, other: Self) -> Self {
        self & other
    }
    fn wor(self, other: Self) -> Self {
        self | other
    }
    fn wxor(self, other: Self) -> Self {
        self ^ other
    }
    fn is_zero(self) -> bool {
        self == 0
    }
    fn all_ones() -> Self {
        0xFF
    }
}

impl Wrapping for u16 {
    fn wadd(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    fn wsub(self, other: Self) -> Self {
        self.wrapping_sub(other)
    }
    fn wand(self, other: Self) -> Self {
        self & other
    }
    fn wor(self, other: Self) -> Self {
        self | other
    }
    fn wxor(self, other: Self) -> Self {
        self ^ other
    }
    fn is_zero(self) -> bool {
        self == 0
    }
    fn all_ones() -> Self {
        0xFFFF
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PossiblyKnown<T> {
    pub value: T,
    pub known: bool,
    /// Element-store index of the instruction that produced this value.
    pub producer: Option<usize>,
    /// Second producer, for values assembled from two halves (e.g. a 16-bit
    /// value formed from two separately-pushed bytes).
    pub producer2: Option<usize>,
}

impl<T: Wrapping> PossiblyKnown<T> {
    pub fn unknown() -> Self {
        PossiblyKnown {
            value: T::default(),
            known: false,
            producer: None,
            producer2: None,
        }
    }

    pub fn known(value: T, producer: usize) -> Self {
        PossiblyKnown {
            value,
            known: true,
            producer: Some(producer),
            producer2: None,
        }
    }

    pub fn known_pair(value: T, producer: usize, producer2: usize) -> Self {
        PossiblyKnown {
            value,
            known: true,
            producer: Some(producer),
            producer2: Some(producer2),
        }
    }

    fn propagate(&self, other: &Self, value: T) -> Self {
        PossiblyKnown {
            value,
            known: self.known && other.known,
            producer: self.producer.or(other.producer),
            producer2: other.producer,
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        self.propagate(other, self.value.wadd(other.value))
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.propagate(other, self.value.wsub(other.value))
    }

    /// `AND` with a known zero is a known zero regardless of the other
    /// operand; otherwise ordinary Kleene propagation.
    pub fn and(&self, other: &Self) -> Self {
        if self.known && self.value.is_zero() {
            return PossiblyKnown::known(T::default(), self.producer.unwrap());
        }
        if other.known && other.value.is_zero() {
            return PossiblyKnown::known(T::default(), other.producer.unwrap());
        }
        self.propagate(other, self.value.wand(other.value))
    }

    /// `OR` with a known all-ones value is known all-ones regardless of the
    /// other operand.
    pub fn or(&self, other: &Self) -> Self {
        if self.known && self.value == T::all_ones() {
            return PossiblyKnown::known(T::all_ones(), self.producer.unwrap());
        }
        if other.known && other.value == T::all_ones() {
            return PossiblyKnown::known(T::all_ones(), other.producer.unwrap());
        }
        self.propagate(other, self.value.wor(other.value))
    }

    pub fn xor(&self, other: &Self) -> Self {
        self.propagate(other, self.value.wxor(other.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plus_unknown_is_unknown() {
        let a: PossiblyKnown<u8> = PossiblyKnown::unknown();
        let b: PossiblyKnown<u8> = PossiblyKnown::unknown();
        assert!(!a.add(&b).known);
    }

    #[test]
    fn known_and_zero_is_known_zero_even_if_other_unknown() {
        let zero = PossiblyKnown::known(0u8, 7);
        let unknown: PossiblyKnown<u8> = PossiblyKnown::unknown();
        let result = zero.and(&unknown);
        assert!(result.known);
        assert_eq!(result.value, 0);
    }

    #[test]
    fn known_or_all_ones_is_known_all_ones() {
        let ff = PossiblyKnown::known(0xFFu8, 3);
        let unknown: PossiblyKnown<u8> = PossiblyKnown::unknown();
        let result = unknown.or(&ff);
        assert!(result.known);
        assert_eq!(result.value, 0xFF);
    }

    #[test]
    fn addition_wraps_modulo_256() {
        let a = PossiblyKnown::known(0xFFu8, 1);
        let b = PossiblyKnown::known(0x02u8, 2);
        let result = a.add(&b);
        assert_eq!(result.value, 0x01);
        assert!(result.known);
    }

    #[test]
    fn u16_arithmetic_wraps_modulo_65536() {
        let a = PossiblyKnown::known(0xFFFFu16, 1);
        let b = PossiblyKnown::known(0x0001u16, 2);
        assert_eq!(a.add(&b).value, 0x0000);
    }
}
