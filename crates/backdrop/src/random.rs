//! Seeded scalar source used for every procedural layout.
//!
//! The generator is mulberry32: a 32-bit state advanced by a Weyl increment
//! and scrambled with two multiply/xorshift rounds. Two sources built from the
//! same seed yield bit-identical sequences for the same number of draws.

use rand::{Error as RandError, RngCore, SeedableRng};

const WEYL_INCREMENT: u32 = 0x6D2B_79F5;
const LARGEST_BELOW_ONE: f32 = 0.999_999_94;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next scalar in `[0, 1)`.
    pub fn next_unit(&mut self) -> f32 {
        let value = (self.next_word() as f64 / 4_294_967_296.0) as f32;
        // Values within half an ulp of 1.0 round up when narrowed.
        value.min(LARGEST_BELOW_ONE)
    }

    /// `base + next_unit() * span`, the shape most layout formulas use.
    pub fn span(&mut self, base: f32, span: f32) -> f32 {
        base + self.next_unit() * span
    }

    fn next_word(&mut self) -> u32 {
        self.state = self.state.wrapping_add(WEYL_INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        let low = self.next_word() as u64;
        let high = self.next_word() as u64;
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_word().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Mulberry32 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}
