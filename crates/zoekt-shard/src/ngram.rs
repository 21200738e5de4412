// Copyright 2025 HyperZoekt Project
// Derived from sourcegraph/zoekt (https://github.com/sourcegraph/zoekt)
// Copyright 2016 Google Inc. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Trigram primitives.
//!
//! A trigram is three consecutive Unicode code points (not bytes), each
//! folded to a canonical lower-case form, packed as three 21-bit code
//! points into a u64. A document of N runes yields N-2 trigrams.

/// Packed trigram key. Three 21-bit code points, high bits zero.
pub type NGram = u64;

const RUNE_BITS: u32 = 21;

/// Fold a rune to its canonical lower-case form.
///
/// Uses the simple (rune-to-rune) part of Unicode case folding: runes whose
/// lower-case expansion is not a single rune are left alone. U+212A KELVIN
/// SIGN folds to `k`.
#[inline]
pub fn fold_rune(c: char) -> char {
    let mut it = c.to_lowercase();
    match (it.next(), it.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Pack three folded runes into a key.
#[inline]
pub fn ngram(a: char, b: char, c: char) -> NGram {
    ((fold_rune(a) as u64) << (2 * RUNE_BITS))
        | ((fold_rune(b) as u64) << RUNE_BITS)
        | fold_rune(c) as u64
}

/// Unpack a key back into its three folded runes.
pub fn ngram_runes(g: NGram) -> [char; 3] {
    let mask = (1u64 << RUNE_BITS) - 1;
    let a = char::from_u32(((g >> (2 * RUNE_BITS)) & mask) as u32).unwrap_or('\u{FFFD}');
    let b = char::from_u32(((g >> RUNE_BITS) & mask) as u32).unwrap_or('\u{FFFD}');
    let c = char::from_u32((g & mask) as u32).unwrap_or('\u{FFFD}');
    [a, b, c]
}

/// Render a key for diagnostics.
pub fn ngram_to_string(g: NGram) -> String {
    ngram_runes(g).iter().collect()
}

/// Trigrams of a folded string together with the byte offset of the first
/// rune of each window in the original string.
pub fn ngrams_with_offsets(text: &str) -> impl Iterator<Item = (NGram, u32)> + '_ {
    let mut window: [(u32, char); 3] = [(0, '\0'); 3];
    let mut filled = 0usize;
    text.char_indices().filter_map(move |(off, ch)| {
        if filled < 3 {
            window[filled] = (off as u32, ch);
            filled += 1;
        } else {
            window = [window[1], window[2], (off as u32, ch)];
        }
        if filled == 3 {
            Some((ngram(window[0].1, window[1].1, window[2].1), window[0].0))
        } else {
            None
        }
    })
}

/// Trigram keys of a string, without offsets.
pub fn ngrams(text: &str) -> impl Iterator<Item = NGram> + '_ {
    ngrams_with_offsets(text).map(|(g, _)| g)
}

/// Whether a case-insensitive literal admits fixed byte distances between
/// its trigrams.
///
/// A rune is distance-safe when every member of its fold class has the same
/// UTF-8 length. ASCII `k` and `s` are the exceptions (U+212A KELVIN SIGN
/// and U+017F LONG S fold into them at different widths); non-ASCII folds
/// are treated conservatively.
pub fn fold_stable(text: &str) -> bool {
    text.chars()
        .map(fold_rune)
        .all(|c| c.is_ascii() && c != 'k' && c != 's')
}

/// One rune of a scanned document.
pub(crate) struct ScannedRune {
    pub byte_off: u32,
    pub ch: char,
}

/// Single-pass document scan: emits trigrams with offsets, newline byte
/// offsets, and one case bit per byte starting an upper-case rune.
pub(crate) struct DocumentScan {
    pub ngrams: Vec<(NGram, u32)>,
    pub newlines: Vec<u32>,
    pub case_bits: Vec<u8>,
}

pub(crate) fn scan_document(text: &str) -> DocumentScan {
    let mut case_bits = vec![0u8; text.len().div_ceil(8)];
    let mut newlines = Vec::new();
    let mut ngrams = Vec::new();
    let mut window: [ScannedRune; 3] = [
        ScannedRune { byte_off: 0, ch: '\0' },
        ScannedRune { byte_off: 0, ch: '\0' },
        ScannedRune { byte_off: 0, ch: '\0' },
    ];
    let mut filled = 0usize;
    for (off, ch) in text.char_indices() {
        if ch == '\n' {
            newlines.push(off as u32);
        }
        if ch.is_uppercase() {
            case_bits[off / 8] |= 1 << (off % 8);
        }
        let r = ScannedRune { byte_off: off as u32, ch };
        if filled < 3 {
            window[filled] = r;
            filled += 1;
        } else {
            window.swap(0, 1);
            window.swap(1, 2);
            window[2] = r;
        }
        if filled == 3 {
            ngrams.push((
                ngram(window[0].ch, window[1].ch, window[2].ch),
                window[0].byte_off,
            ));
        }
    }
    DocumentScan { ngrams, newlines, case_bits }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let g = ngram('a', 'b', 'c');
        assert_eq!(ngram_runes(g), ['a', 'b', 'c']);
        assert_eq!(ngram_to_string(g), "abc");
    }

    #[test]
    fn folding_collides_kelvin_with_k() {
        assert_eq!(fold_rune('\u{212A}'), 'k');
        assert_eq!(ngram('\u{212A}', 'E', 'Y'), ngram('k', 'e', 'y'));
    }

    #[test]
    fn ascii_offsets() {
        let v: Vec<_> = ngrams_with_offsets("abcd").collect();
        assert_eq!(v, vec![(ngram('a', 'b', 'c'), 0), (ngram('b', 'c', 'd'), 1)]);
    }

    #[test]
    fn multibyte_offsets_are_byte_positions() {
        // é is two bytes; the second trigram starts at its byte offset.
        let v: Vec<_> = ngrams_with_offsets("aébc").collect();
        assert_eq!(v[0], (ngram('a', 'é', 'b'), 0));
        assert_eq!(v[1], (ngram('é', 'b', 'c'), 1));
    }

    #[test]
    fn short_input_has_no_trigrams() {
        assert_eq!(ngrams("ab").count(), 0);
        assert_eq!(ngrams("").count(), 0);
    }

    #[test]
    fn fold_stability() {
        assert!(fold_stable("water"));
        assert!(!fold_stable("kelvin"));
        assert!(!fold_stable("mussel"));
        assert!(!fold_stable("née"));
    }

    #[test]
    fn scan_collects_newlines_and_case_bits() {
        let s = scan_document("A\nbC");
        assert_eq!(s.newlines, vec![1]);
        // bytes 0 ('A') and 3 ('C') carry case bits
        assert_eq!(s.case_bits, vec![0b0000_1001]);
        assert_eq!(s.ngrams.len(), 2);
    }
}
