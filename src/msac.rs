// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Component B: the multi-symbol arithmetic decoder (MSAC). This is the
//! decode-side counterpart to the teacher's `ec::Writer`: same byte-stream
//! model, same 15-bit probability scale, adaptive CDFs instead of a fixed
//! encode table.

use crate::bitreader::inv_recenter;

const PROB_BITS: u32 = 15;
pub const PROB_TOTAL: u16 = 1 << PROB_BITS;
const TOP: u32 = 1 << 24;

/// Cap on the adaptation counter; adaptation rate stops increasing once
/// a context has seen this many symbols (spec §4.B: "the step size halves
/// beyond thresholds (2, 4, 32 symbols)").
const COUNT_CAP: u16 = 32;

fn adapt_rate(count: u16) -> u32 {
    let mut rate = 3u32;
    if count > 2 {
        rate += 1;
    }
    if count > 4 {
        rate += 1;
    }
    if count > 32 {
        rate += 1;
    }
    rate
}

/// A single-probability CDF, used for `decode_bool_adapt`. `prob` is the
/// cumulative probability (out of [`PROB_TOTAL`]) that the decoded bit is
/// zero; `count` is the trailing adaptation counter of spec §4.B.
#[derive(Clone, Copy, Debug)]
pub struct BoolCdf {
    pub prob: u16,
    pub count: u16,
}

impl BoolCdf {
    pub const fn new(prob: u16) -> Self {
        BoolCdf { prob, count: 0 }
    }

    /// Averages this (post-parse) probability with `other`'s, rounding up
    /// (spec §4.C step 4, "average_cdf"). Leaves `count` as-is; only the
    /// probability is published.
    pub fn average_with(&mut self, other: &BoolCdf) {
        self.prob = ((self.prob as u32 + other.prob as u32 + 1) / 2) as u16;
    }
}

/// An `N`-symbol adaptive CDF. `freq[i]` is the cumulative probability
/// (out of [`PROB_TOTAL`]) that the decoded symbol is `<= i`; by
/// convention `freq[N - 1] == PROB_TOTAL` always (the implicit sentinel of
/// spec §4.B's "array of length N+1 ending in a sentinel" — the `+1` is
/// this crate's separate `count` field).
#[derive(Clone, Copy, Debug)]
pub struct Cdf<const N: usize> {
    pub freq: [u16; N],
    pub count: u16,
}

impl<const N: usize> Cdf<N> {
    pub const fn new(freq: [u16; N]) -> Self {
        Cdf { freq, count: 0 }
    }

    /// Averages this (post-parse) table with `other`'s entry-by-entry,
    /// rounding up (spec §4.C step 4, "average_cdf").
    pub fn average_with(&mut self, other: &Cdf<N>) {
        for (a, b) in self.freq.iter_mut().zip(other.freq.iter()) {
            *a = ((*a as u32 + *b as u32 + 1) / 2) as u16;
        }
    }
}

/// Range-coder state over a tile's compressed payload.
pub struct RangeCoder<'a> {
    buf: &'a [u8],
    pos: usize,
    code: u32,
    range: u32,
}

impl<'a> RangeCoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let mut rc = RangeCoder { buf, pos: 0, code: 0, range: 0xFFFF_FFFF };
        for _ in 0..4 {
            rc.code = (rc.code << 8) | rc.next_byte() as u32;
        }
        rc
    }

    fn next_byte(&mut self) -> u8 {
        let b = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    fn normalize(&mut self) {
        while self.range < TOP {
            self.code = (self.code << 8) | self.next_byte() as u32;
            self.range <<= 8;
        }
    }

    /// True once the coder has consumed past the end of its buffer; the
    /// tile's remaining symbols decode against zero-padded bytes.
    pub fn out_of_data(&self) -> bool {
        self.pos > self.buf.len()
    }

    /// `decode_bool(prob)`: non-adaptive single-probability branch. `prob`
    /// is the probability (out of [`PROB_TOTAL`]) that the bit is zero.
    pub fn decode_bool(&mut self, prob: u16) -> bool {
        let r = self.range >> PROB_BITS;
        let hi = r * prob as u32;
        let bit = if self.code < hi {
            self.range = hi;
            false
        } else {
            self.code -= hi;
            self.range -= hi;
            true
        };
        self.normalize();
        bit
    }

    /// `decode_bool_adapt(cdf[1+1])`: branch; adapts the one CDF entry
    /// with rate `rate(count)` after decode.
    pub fn decode_bool_adapt(&mut self, cdf: &mut BoolCdf) -> bool {
        let bit = self.decode_bool(cdf.prob);
        let rate = adapt_rate(cdf.count);
        if bit {
            cdf.prob -= cdf.prob >> rate;
        } else {
            cdf.prob += (PROB_TOTAL - cdf.prob) >> rate;
        }
        if cdf.count < COUNT_CAP {
            cdf.count += 1;
        }
        bit
    }

    /// `decode_symbol_adapt(cdf[N+1], N)`: multi-symbol; adapts all N
    /// entries proportionally.
    pub fn decode_symbol_adapt<const N: usize>(&mut self, cdf: &mut Cdf<N>) -> usize {
        debug_assert!(N >= 2);
        let r = self.range >> PROB_BITS;
        let mut sym = 0usize;
        let mut lo = 0u32;
        while sym < N - 1 {
            let hi = r * cdf.freq[sym] as u32;
            if self.code < hi {
                self.range = hi - lo;
                break;
            }
            lo = hi;
            sym += 1;
        }
        if sym == N - 1 {
            self.range -= lo;
        }
        self.code -= lo;
        self.normalize();

        let rate = adapt_rate(cdf.count);
        for (i, f) in cdf.freq.iter_mut().enumerate().take(N - 1) {
            if i < sym {
                *f -= *f >> rate;
            } else {
                *f += (PROB_TOTAL - *f) >> rate;
            }
        }
        if cdf.count < COUNT_CAP {
            cdf.count += 1;
        }
        sym
    }

    /// `decode_uniform(N)`: uniform decoding via raw bits from the range
    /// coder.
    pub fn decode_uniform(&mut self, n: u32) -> u32 {
        debug_assert!(n > 0);
        if n == 1 {
            return 0;
        }
        let l = floor_log2(n) + 1;
        let m = (1u32 << l) - n;
        let v = self.decode_bools(l - 1);
        if v < m {
            v
        } else {
            (v << 1) - m + self.decode_bools(1)
        }
    }

    /// `decode_bools(n)`: n uniform (equiprobable) bits.
    pub fn decode_bools(&mut self, n: u32) -> u32 {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 1) | self.decode_bool(PROB_TOTAL / 2) as u32;
        }
        v
    }

    /// `decode_subexp(ref, n, k)`: adaptive sub-exp decoding analogous to
    /// the bit-reader form but using [`RangeCoder::decode_bools`].
    pub fn decode_subexp(&mut self, r#ref: i32, n: u32, k: u32) -> i32 {
        let v = self.decode_subexp_u((r#ref + (1 << n)) as u32, 2 << n, k);
        v as i32 - (1 << n)
    }

    fn decode_subexp_u(&mut self, r#ref: u32, n: u32, k: u32) -> u32 {
        let mut v = 0u32;
        let mut i = 0i32;
        loop {
            let b: u32 = if i != 0 { k + i as u32 - 1 } else { k };
            if n < v + 3 * (1 << b) {
                v += self.decode_uniform(n - v + 1);
                break;
            }
            if self.decode_bools(1) == 0 {
                v += self.decode_bools(b);
                break;
            }
            v += 1 << b;
            i += 1;
        }
        if r#ref * 2 <= n {
            inv_recenter(r#ref, v)
        } else {
            n - inv_recenter(n - r#ref, v)
        }
    }
}

fn floor_log2(mut x: u32) -> u32 {
    debug_assert!(x > 0);
    let mut s = 0;
    while x > 1 {
        x >>= 1;
        s += 1;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_bool_adapt_converges_toward_observed_symbol() {
        let buf = [0u8; 64];
        let mut rc = RangeCoder::new(&buf);
        let mut cdf = BoolCdf::new(PROB_TOTAL / 2);
        for _ in 0..40 {
            rc.decode_bool_adapt(&mut cdf);
        }
        // All-zero input biases the decoded bit consistently; the CDF
        // should have moved away from its initial 50/50 split.
        assert_ne!(cdf.prob, PROB_TOTAL / 2);
        assert_eq!(cdf.count, 32);
    }

    #[test]
    fn decode_symbol_adapt_keeps_sentinel_invariant() {
        let buf = [0xAAu8; 64];
        let mut rc = RangeCoder::new(&buf);
        let mut cdf = Cdf::<4>::new([8192, 16384, 24576, PROB_TOTAL]);
        for _ in 0..10 {
            let s = rc.decode_symbol_adapt(&mut cdf);
            assert!(s < 4);
        }
        assert_eq!(cdf.freq[3], PROB_TOTAL);
    }

    #[test]
    fn decode_uniform_stays_in_range() {
        let buf = [0x5Au8; 32];
        let mut rc = RangeCoder::new(&buf);
        for _ in 0..20 {
            let v = rc.decode_uniform(11);
            assert!(v < 11);
        }
    }
}
