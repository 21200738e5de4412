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

//! Posting iterators and candidate generation for one literal.
//!
//! A literal of three or more runes is anchored on the trigram (or pair of
//! trigrams) with the lowest posting frequency. Candidates are byte offsets
//! into the concatenated content or name blob and always require
//! verification against the text.

use crate::error::{Error, Result};
use crate::ngram;
use crate::shard::ShardReader;
use crate::types::Stats;

/// Which blob a literal is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Content,
    FileName,
}

/// Lazy decoder over one delta-encoded posting list.
pub(crate) struct PostingCursor {
    buf: Vec<u8>,
    pos: usize,
    prev: u32,
    peeked: Option<u32>,
}

impl PostingCursor {
    pub(crate) fn new(buf: Vec<u8>) -> Self {
        PostingCursor { buf, pos: 0, prev: 0, peeked: None }
    }

    pub(crate) fn peek(&mut self) -> Result<Option<u32>> {
        if self.peeked.is_none() {
            if self.pos >= self.buf.len() {
                return Ok(None);
            }
            let mut shift = 0u32;
            let mut delta = 0u32;
            loop {
                let Some(&b) = self.buf.get(self.pos) else {
                    return Err(Error::CorruptShard("posting list truncated".into()));
                };
                self.pos += 1;
                delta |= ((b & 0x7F) as u32) << shift;
                if b & 0x80 == 0 {
                    break;
                }
                shift += 7;
                if shift >= 35 {
                    return Err(Error::CorruptShard("posting varint too long".into()));
                }
            }
            self.prev = self.prev.wrapping_add(delta);
            self.peeked = Some(self.prev);
        }
        Ok(self.peeked)
    }

    pub(crate) fn advance(&mut self) {
        self.peeked = None;
    }
}

/// Candidate generator for one substring atom.
pub(crate) enum CandidateSource {
    /// Pattern shorter than a trigram: every document is a candidate and
    /// verification scans the text.
    BruteForce,
    /// A required trigram has no postings; nothing can match.
    Empty,
    /// Single cheapest trigram. `stable` candidates are the anchor minus
    /// the trigram's byte offset in the pattern; unstable ones keep the
    /// raw anchor and are re-anchored by walking `runes_before` runes back
    /// during verification.
    Single {
        cursor: PostingCursor,
        byte_off: u32,
        runes_before: u32,
        stable: bool,
    },
    /// Two cheapest trigrams zipped at their exact byte distance.
    Distance {
        a: PostingCursor,
        b: PostingCursor,
        dist: u32,
        byte_off: u32,
    },
}

impl CandidateSource {
    /// Peek the next candidate as a global blob offset of the pattern
    /// anchor, in increasing order.
    fn peek(&mut self) -> Result<Option<u32>> {
        match self {
            CandidateSource::BruteForce | CandidateSource::Empty => Ok(None),
            CandidateSource::Single { cursor, byte_off, stable, .. } => loop {
                let Some(p) = cursor.peek()? else {
                    return Ok(None);
                };
                if *stable && p < *byte_off {
                    cursor.advance();
                    continue;
                }
                return Ok(Some(if *stable { p - *byte_off } else { p }));
            },
            CandidateSource::Distance { a, b, dist, byte_off } => loop {
                let Some(pa) = a.peek()? else { return Ok(None) };
                let Some(pb) = b.peek()? else { return Ok(None) };
                let target = pa.wrapping_add(*dist);
                if pb < target {
                    b.advance();
                } else if pb > target {
                    a.advance();
                } else if pa < *byte_off {
                    a.advance();
                    b.advance();
                } else {
                    return Ok(Some(pa - *byte_off));
                }
            },
        }
    }

    fn advance(&mut self) {
        match self {
            CandidateSource::BruteForce | CandidateSource::Empty => {}
            CandidateSource::Single { cursor, .. } => cursor.advance(),
            CandidateSource::Distance { a, b, .. } => {
                a.advance();
                b.advance();
            }
        }
    }

    pub(crate) fn is_brute_force(&self) -> bool {
        matches!(self, CandidateSource::BruteForce)
    }

    /// How anchors relate to the pattern start: stable anchors already
    /// point at it; unstable ones point at the chosen trigram and carry
    /// the rune count to walk back.
    pub(crate) fn anchor_info(&self) -> (bool, u32) {
        match self {
            CandidateSource::Single { stable, runes_before, .. } => (*stable, *runes_before),
            _ => (true, 0),
        }
    }

    /// Smallest candidate document at or after `min_doc`, without
    /// consuming its candidates.
    pub(crate) fn next_doc_at_least(
        &mut self,
        rdr: &ShardReader,
        scope: Scope,
        min_doc: u32,
    ) -> Result<Option<u32>> {
        if self.is_brute_force() {
            return Ok(Some(min_doc));
        }
        loop {
            let Some(off) = self.peek()? else {
                return Ok(None);
            };
            let doc = doc_of(rdr, scope, off);
            if doc >= min_doc {
                return Ok(Some(doc));
            }
            self.advance();
        }
    }

    /// Consume and return all anchor offsets (document-local) for `doc`.
    pub(crate) fn anchors_for_doc(
        &mut self,
        rdr: &ShardReader,
        scope: Scope,
        doc: u32,
        stats: &mut Stats,
    ) -> Result<Vec<u32>> {
        let start = match scope {
            Scope::Content => rdr.content_start(doc),
            Scope::FileName => rdr.name_start(doc),
        };
        let mut out = Vec::new();
        while let Some(off) = self.peek()? {
            let d = doc_of(rdr, scope, off);
            if d > doc {
                break;
            }
            if d == doc {
                out.push(off - start);
                stats.ngram_matches += 1;
            }
            self.advance();
        }
        Ok(out)
    }
}

fn doc_of(rdr: &ShardReader, scope: Scope, off: u32) -> u32 {
    match scope {
        Scope::Content => rdr.doc_from_content_offset(off),
        Scope::FileName => rdr.doc_from_name_offset(off),
    }
}

/// Build the candidate source for a literal, choosing the cheapest trigram
/// anchors by posting-list size.
pub(crate) fn build_source(
    rdr: &ShardReader,
    scope: Scope,
    pattern: &str,
    case_sensitive: bool,
    stats: &mut Stats,
) -> Result<CandidateSource> {
    let runes: Vec<(u32, char)> = pattern
        .char_indices()
        .map(|(i, c)| (i as u32, c))
        .collect();
    if runes.len() < 3 {
        return Ok(CandidateSource::BruteForce);
    }

    let table = match scope {
        Scope::Content => rdr.content_ngrams(),
        Scope::FileName => rdr.name_ngrams(),
    };

    // trigram i covers runes i..i+3 and starts at the byte offset of rune i
    let mut entries = Vec::with_capacity(runes.len() - 2);
    for i in 0..runes.len() - 2 {
        let g = ngram::ngram(runes[i].1, runes[i + 1].1, runes[i + 2].1);
        match table.get(g) {
            Some(e) => entries.push((i, runes[i].0, e)),
            None => return Ok(CandidateSource::Empty),
        }
    }

    let stable = case_sensitive || ngram::fold_stable(pattern);
    if !stable {
        // variable-width folds: anchor on the single cheapest trigram and
        // re-anchor by rune during verification
        let &(i, byte_off, e) = entries
            .iter()
            .min_by_key(|(_, _, e)| e.sz)
            .expect("at least one trigram");
        let buf = rdr.read_postings(table, e)?;
        stats.index_bytes_loaded += buf.len() as u64;
        return Ok(CandidateSource::Single {
            cursor: PostingCursor::new(buf),
            byte_off,
            runes_before: i as u32,
            stable: false,
        });
    }

    if entries.len() == 1 {
        let (_, byte_off, e) = entries[0];
        let buf = rdr.read_postings(table, e)?;
        stats.index_bytes_loaded += buf.len() as u64;
        return Ok(CandidateSource::Single {
            cursor: PostingCursor::new(buf),
            byte_off,
            runes_before: 0,
            stable: true,
        });
    }

    // two cheapest lists, kept in pattern order
    let mut by_cost: Vec<usize> = (0..entries.len()).collect();
    by_cost.sort_by_key(|&i| entries[i].2.sz);
    let (mut first, mut second) = (by_cost[0], by_cost[1]);
    if first > second {
        std::mem::swap(&mut first, &mut second);
    }
    let (_, off_a, ea) = entries[first];
    let (_, off_b, eb) = entries[second];
    let buf_a = rdr.read_postings(table, ea)?;
    let buf_b = rdr.read_postings(table, eb)?;
    stats.index_bytes_loaded += (buf_a.len() + buf_b.len()) as u64;
    Ok(CandidateSource::Distance {
        a: PostingCursor::new(buf_a),
        b: PostingCursor::new(buf_b),
        dist: off_b - off_a,
        byte_off: off_a,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::shard::MemFile;

    fn reader(contents: &[&str]) -> ShardReader {
        let mut b = IndexBuilder::new(None).unwrap();
        for (i, c) in contents.iter().enumerate() {
            b.add_file(format!("f{}", i), c.as_bytes()).unwrap();
        }
        let mut buf = Vec::new();
        b.write(&mut buf).unwrap();
        ShardReader::open(MemFile::new("t", buf)).unwrap()
    }

    #[test]
    fn distance_pairs_at_exact_gap() {
        let rdr = reader(&["abc bcdbcd cdecde abcabc def efg"]);
        let mut stats = Stats::default();
        let mut src =
            build_source(&rdr, Scope::Content, "abcdef", true, &mut stats).unwrap();
        // no "abc" is followed by "def" at the right distance
        assert_eq!(
            src.next_doc_at_least(&rdr, Scope::Content, 0).unwrap(),
            None
        );
    }

    #[test]
    fn distance_bails_cleanly_at_end_of_list() {
        let rdr = reader(&["AST AST AST UASH"]);
        let mut stats = Stats::default();
        let mut src =
            build_source(&rdr, Scope::Content, "uast", true, &mut stats).unwrap();
        assert_eq!(
            src.next_doc_at_least(&rdr, Scope::Content, 0).unwrap(),
            None
        );
    }

    #[test]
    fn anchors_are_doc_local() {
        let rdr = reader(&["xx banana xx", "yy banana banana"]);
        let mut stats = Stats::default();
        let mut src =
            build_source(&rdr, Scope::Content, "banana", true, &mut stats).unwrap();
        let d = src
            .next_doc_at_least(&rdr, Scope::Content, 0)
            .unwrap()
            .unwrap();
        assert_eq!(d, 0);
        let anchors = src
            .anchors_for_doc(&rdr, Scope::Content, 0, &mut stats)
            .unwrap();
        assert_eq!(anchors, vec![3]);
        let d = src
            .next_doc_at_least(&rdr, Scope::Content, 1)
            .unwrap()
            .unwrap();
        assert_eq!(d, 1);
        let anchors = src
            .anchors_for_doc(&rdr, Scope::Content, 1, &mut stats)
            .unwrap();
        assert_eq!(anchors, vec![3, 10]);
    }

    #[test]
    fn short_patterns_fall_back_to_brute_force() {
        let rdr = reader(&["xy"]);
        let mut stats = Stats::default();
        let src = build_source(&rdr, Scope::Content, "xy", false, &mut stats).unwrap();
        assert!(src.is_brute_force());
    }

    #[test]
    fn missing_trigram_is_empty() {
        let rdr = reader(&["banana"]);
        let mut stats = Stats::default();
        let mut src =
            build_source(&rdr, Scope::Content, "orange", false, &mut stats).unwrap();
        assert_eq!(
            src.next_doc_at_least(&rdr, Scope::Content, 0).unwrap(),
            None
        );
    }
}
