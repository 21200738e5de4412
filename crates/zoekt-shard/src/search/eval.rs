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

//! Query lowering and document-at-a-time evaluation.
//!
//! The query tree is lowered into an eval tree whose atoms hold candidate
//! iterators over the posting lists. The driver advances all positive
//! atoms to a common candidate document, verifies every atom against the
//! text, and assembles line matches from the verified fragments.

use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::candidates::{build_source, CandidateSource, Scope};
use super::Searcher;
use crate::error::{Error, Result};
use crate::ngram::{fold_rune, ngrams};
use crate::query::{simplify, Query, TypeKind};
use crate::regex_analyze::{required_literals, LiteralSet};
use crate::shard::ShardReader;
use crate::types::{
    CancellationToken, DocumentSection, FileMatch, LineFragmentMatch, LineMatch, SearchOptions,
    SearchResult, Stats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SymbolKind {
    /// The whole match must fall inside one symbol section.
    Contain,
    /// The match range must overlap a symbol section.
    Overlap,
}

pub(crate) struct SubstringEval {
    pattern: String,
    folded: String,
    pattern_case_bits: Vec<u8>,
    case_sensitive: bool,
    scope: Scope,
    symbol: Option<SymbolKind>,
    source: CandidateSource,
}

pub(crate) struct RegexpEval {
    re: Regex,
    scope: Scope,
    symbol: Option<SymbolKind>,
    gate: Option<Box<EvalNode>>,
}

pub(crate) enum EvalNode {
    And(Vec<EvalNode>),
    Or(Vec<EvalNode>),
    Not(Box<EvalNode>),
    Const(bool),
    Substring(SubstringEval),
    Regexp(RegexpEval),
    Branch { mask: u64 },
    Language { id: Option<u16>, name: String },
    Type { child: Box<EvalNode> },
}

/// A verified match range, before line assembly.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fragment {
    offset: u32,
    len: u32,
    scope: Scope,
    in_symbol: bool,
    exact_case: bool,
}

/// Per-document state shared by all atoms while evaluating one candidate.
pub(crate) struct DocContext<'a> {
    doc: u32,
    searcher: &'a Searcher,
    stats: &'a mut Stats,
    content: Option<Arc<Vec<u8>>>,
    name: Option<String>,
    case_bits: Option<Vec<u8>>,
    symbols: Option<Vec<DocumentSection>>,
    fragments: Vec<Fragment>,
}

impl<'a> DocContext<'a> {
    fn new(doc: u32, searcher: &'a Searcher, stats: &'a mut Stats) -> Self {
        DocContext {
            doc,
            searcher,
            stats,
            content: None,
            name: None,
            case_bits: None,
            symbols: None,
            fragments: Vec::new(),
        }
    }

    fn rdr(&self) -> &'a ShardReader {
        self.searcher.reader()
    }

    fn content(&mut self) -> Result<Arc<Vec<u8>>> {
        if self.content.is_none() {
            let data = self.searcher.cached_content(self.doc)?;
            self.stats.files_loaded += 1;
            self.stats.content_bytes_loaded += data.len() as u64;
            self.content = Some(data);
        }
        Ok(self.content.as_ref().unwrap().clone())
    }

    fn name(&mut self) -> Result<String> {
        if self.name.is_none() {
            self.name = Some(self.rdr().read_name(self.doc)?);
        }
        Ok(self.name.as_ref().unwrap().clone())
    }

    fn case_bits(&mut self) -> Result<&[u8]> {
        if self.case_bits.is_none() {
            self.case_bits = Some(self.rdr().read_case_bits(self.doc)?);
        }
        Ok(self.case_bits.as_ref().unwrap())
    }

    fn symbols(&mut self) -> Result<&[DocumentSection]> {
        if self.symbols.is_none() {
            let rdr = self.rdr();
            self.stats.content_bytes_loaded += rdr.doc_sections_size(self.doc) as u64;
            self.symbols = Some(rdr.read_symbols(self.doc)?);
        }
        Ok(self.symbols.as_ref().unwrap())
    }
}

fn fold_str(s: &str) -> String {
    s.chars().map(fold_rune).collect()
}

/// Compare folded pattern runes against the text from `start`; returns the
/// number of text bytes consumed on a match.
fn fold_compare(text: &str, folded_pattern: &str) -> Option<u32> {
    let mut bytes = 0u32;
    let mut tc = text.chars();
    for pc in folded_pattern.chars() {
        let c = tc.next()?;
        if fold_rune(c) != pc {
            return None;
        }
        bytes += c.len_utf8() as u32;
    }
    Some(bytes)
}

fn case_bit_template(pattern: &str) -> Vec<u8> {
    let mut bits = vec![0u8; pattern.len().div_ceil(8)];
    for (i, c) in pattern.char_indices() {
        if c.is_uppercase() {
            bits[i / 8] |= 1 << (i % 8);
        }
    }
    bits
}

fn bit(bits: &[u8], i: usize) -> bool {
    bits.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0)
}

/// Cheap pre-check for case-sensitive atoms: the stored case bits at the
/// candidate must agree with the pattern's. Runs before any content load.
fn case_bits_match(stored: &[u8], start: u32, template: &[u8], len: usize) -> bool {
    (0..len).all(|i| bit(stored, start as usize + i) == bit(template, i))
}

fn section_contains(s: &DocumentSection, start: u32, end: u32) -> bool {
    s.start <= start && end <= s.end
}

fn section_overlaps(s: &DocumentSection, start: u32, end: u32) -> bool {
    s.start < end && start < s.end
}

// ---------------------------------------------------------------------------
// Lowering

pub(crate) struct LowerCtx<'a> {
    pub rdr: &'a ShardReader,
    pub stats: &'a mut Stats,
    pub branch_query_mask: u64,
    pub has_branch_atom: bool,
}

/// Replace atoms decidable from shard metadata alone, so a non-matching
/// repo, language or branch short-circuits before any index bytes load.
pub(crate) fn resolve_shard_atoms(q: Query, rdr: &ShardReader) -> Result<Query> {
    Ok(match q {
        Query::And(cs) => Query::And(
            cs.into_iter()
                .map(|c| resolve_shard_atoms(c, rdr))
                .collect::<Result<_>>()?,
        ),
        Query::Or(cs) => Query::Or(
            cs.into_iter()
                .map(|c| resolve_shard_atoms(c, rdr))
                .collect::<Result<_>>()?,
        ),
        Query::Not(c) => Query::Not(Box::new(resolve_shard_atoms(*c, rdr)?)),
        Query::Symbol(c) => Query::Symbol(Box::new(resolve_shard_atoms(*c, rdr)?)),
        Query::Type { kind, child } => Query::Type {
            kind,
            child: Box::new(resolve_shard_atoms(*child, rdr)?),
        },
        Query::Repo { regex } => {
            let re = Regex::new(&regex)?;
            let repo = rdr.repository();
            let matched = re.is_match(&repo.name)
                || repo.sub_repo_map.values().any(|r| re.is_match(&r.name));
            Query::Const(matched)
        }
        Query::Language { language } => {
            if rdr.has_language_table() && rdr.language_id_by_name(&language).is_none() {
                Query::Const(false)
            } else {
                Query::Language { language }
            }
        }
        Query::Branch { pattern } => {
            if branch_pattern_mask(rdr, &pattern) == 0 {
                Query::Const(false)
            } else {
                Query::Branch { pattern }
            }
        }
        other => other,
    })
}

fn branch_pattern_mask(rdr: &ShardReader, pattern: &str) -> u64 {
    let mut mask = 0u64;
    for (i, b) in rdr.repository().branches.iter().enumerate() {
        if b.name.contains(pattern) {
            mask |= 1 << i;
        }
    }
    mask
}

fn make_substring(
    ctx: &mut LowerCtx<'_>,
    pattern: &str,
    case_sensitive: bool,
    scope: Scope,
    symbol: Option<SymbolKind>,
) -> Result<EvalNode> {
    let source = build_source(ctx.rdr, scope, pattern, case_sensitive, ctx.stats)?;
    Ok(EvalNode::Substring(SubstringEval {
        pattern: pattern.to_string(),
        folded: fold_str(pattern),
        pattern_case_bits: case_bit_template(pattern),
        case_sensitive,
        scope,
        symbol,
        source,
    }))
}

fn scopes_for(file_name: bool, content: bool, in_symbol: bool) -> Vec<Scope> {
    match (file_name, content) {
        (true, _) => vec![Scope::FileName],
        (false, true) => vec![Scope::Content],
        // symbols are content ranges; a default-scope atom under Symbol
        // only makes sense against content
        (false, false) if in_symbol => vec![Scope::Content],
        (false, false) => vec![Scope::FileName, Scope::Content],
    }
}

fn gate_from_literals(
    ctx: &mut LowerCtx<'_>,
    set: LiteralSet,
    case_sensitive: bool,
    scope: Scope,
) -> Result<Option<Box<EvalNode>>> {
    let node = match set {
        LiteralSet::None => return Ok(None),
        LiteralSet::Conj(lits) => {
            let mut atoms = Vec::with_capacity(lits.len());
            for l in lits {
                atoms.push(make_substring(ctx, &l, case_sensitive, scope, None)?);
            }
            match atoms.len() {
                1 => atoms.pop().unwrap(),
                _ => EvalNode::And(atoms),
            }
        }
        LiteralSet::Disj(branches) => {
            let mut ors = Vec::with_capacity(branches.len());
            for lits in branches {
                let mut atoms = Vec::with_capacity(lits.len());
                for l in lits {
                    atoms.push(make_substring(ctx, &l, case_sensitive, scope, None)?);
                }
                ors.push(match atoms.len() {
                    1 => atoms.pop().unwrap(),
                    _ => EvalNode::And(atoms),
                });
            }
            EvalNode::Or(ors)
        }
    };
    Ok(Some(Box::new(node)))
}

pub(crate) fn lower(q: &Query, ctx: &mut LowerCtx<'_>, in_symbol: bool) -> Result<EvalNode> {
    Ok(match q {
        Query::And(cs) => EvalNode::And(
            cs.iter()
                .map(|c| lower(c, ctx, in_symbol))
                .collect::<Result<_>>()?,
        ),
        Query::Or(cs) => EvalNode::Or(
            cs.iter()
                .map(|c| lower(c, ctx, in_symbol))
                .collect::<Result<_>>()?,
        ),
        Query::Not(c) => EvalNode::Not(Box::new(lower(c, ctx, in_symbol)?)),
        Query::Const(v) => EvalNode::Const(*v),
        Query::Symbol(c) => lower(c, ctx, true)?,
        Query::Type { kind: TypeKind::FileName, child } => EvalNode::Type {
            child: Box::new(lower(child, ctx, in_symbol)?),
        },
        Query::Branch { pattern } => {
            let mask = branch_pattern_mask(ctx.rdr, pattern);
            ctx.has_branch_atom = true;
            ctx.branch_query_mask |= mask;
            if mask == 0 {
                EvalNode::Const(false)
            } else {
                EvalNode::Branch { mask }
            }
        }
        Query::Repo { regex } => {
            let re = Regex::new(regex)?;
            let repo = ctx.rdr.repository();
            EvalNode::Const(
                re.is_match(&repo.name)
                    || repo.sub_repo_map.values().any(|r| re.is_match(&r.name)),
            )
        }
        Query::Language { language } => {
            if ctx.rdr.has_language_table() {
                match ctx.rdr.language_id_by_name(language) {
                    Some(id) => EvalNode::Language { id: Some(id), name: language.clone() },
                    None => EvalNode::Const(false),
                }
            } else {
                EvalNode::Language { id: None, name: language.to_lowercase() }
            }
        }
        Query::Substring { pattern, case_sensitive, file_name, content } => {
            if pattern.is_empty() {
                return Ok(EvalNode::Const(true));
            }
            let symbol = in_symbol.then_some(SymbolKind::Contain);
            let mut nodes = Vec::new();
            for scope in scopes_for(*file_name, *content, in_symbol) {
                nodes.push(make_substring(ctx, pattern, *case_sensitive, scope, symbol)?);
            }
            match nodes.len() {
                1 => nodes.pop().unwrap(),
                _ => EvalNode::Or(nodes),
            }
        }
        Query::Regexp { pattern, case_sensitive, file_name, content } => {
            let symbol = in_symbol.then_some(SymbolKind::Overlap);
            let lits = required_literals(pattern);
            let mut nodes = Vec::new();
            for scope in scopes_for(*file_name, *content, in_symbol) {
                let re = RegexBuilder::new(pattern)
                    .multi_line(true)
                    .case_insensitive(!case_sensitive)
                    .build()
                    .map_err(|e| Error::Query(e.to_string()))?;
                ctx.stats.regexps_considered += 1;
                let gate = gate_from_literals(ctx, lits.clone(), *case_sensitive, scope)?;
                nodes.push(EvalNode::Regexp(RegexpEval { re, scope, symbol, gate }));
            }
            match nodes.len() {
                1 => nodes.pop().unwrap(),
                _ => EvalNode::Or(nodes),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Evaluation

impl EvalNode {
    /// Smallest candidate document at or after `min_doc` this subtree could
    /// match. Negations and constants never drive the iteration.
    fn next_candidate_doc(&mut self, rdr: &ShardReader, min_doc: u32) -> Result<Option<u32>> {
        match self {
            EvalNode::Const(true) | EvalNode::Not(_) => Ok(Some(min_doc)),
            EvalNode::Const(false) => Ok(None),
            EvalNode::And(cs) => {
                let mut cur = min_doc;
                loop {
                    let mut max = cur;
                    for c in cs.iter_mut() {
                        match c.next_candidate_doc(rdr, cur)? {
                            None => return Ok(None),
                            Some(d) => max = max.max(d),
                        }
                    }
                    if max == cur {
                        return Ok(Some(cur));
                    }
                    cur = max;
                }
            }
            EvalNode::Or(cs) => {
                let mut best: Option<u32> = None;
                for c in cs.iter_mut() {
                    if let Some(d) = c.next_candidate_doc(rdr, min_doc)? {
                        best = Some(best.map_or(d, |b| b.min(d)));
                    }
                }
                Ok(best)
            }
            EvalNode::Substring(s) => s.source.next_doc_at_least(rdr, s.scope, min_doc),
            EvalNode::Regexp(r) => match &mut r.gate {
                Some(g) => g.next_candidate_doc(rdr, min_doc),
                None => Ok(Some(min_doc)),
            },
            EvalNode::Branch { mask } => {
                Ok((min_doc..rdr.doc_count()).find(|&d| rdr.branch_mask(d) & *mask != 0))
            }
            EvalNode::Language { id, name } => {
                for d in min_doc..rdr.doc_count() {
                    let ok = match id {
                        Some(i) => rdr.language_id(d) == *i,
                        None => rdr.language_name(d)?.eq_ignore_ascii_case(name),
                    };
                    if ok {
                        return Ok(Some(d));
                    }
                }
                Ok(None)
            }
            EvalNode::Type { child } => child.next_candidate_doc(rdr, min_doc),
        }
    }

    /// Verify this subtree against one candidate document, pushing verified
    /// fragments into the context.
    fn matches(&mut self, ctx: &mut DocContext<'_>) -> Result<bool> {
        match self {
            EvalNode::Const(v) => Ok(*v),
            EvalNode::And(cs) => {
                for c in cs.iter_mut() {
                    if !c.matches(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            EvalNode::Or(cs) => {
                let mut any = false;
                for c in cs.iter_mut() {
                    if c.matches(ctx)? {
                        any = true;
                    }
                }
                Ok(any)
            }
            EvalNode::Not(c) => {
                let mark = ctx.fragments.len();
                let r = c.matches(ctx)?;
                ctx.fragments.truncate(mark);
                Ok(!r)
            }
            EvalNode::Type { child } => {
                // the child only filters; its fragments are not reported
                let mark = ctx.fragments.len();
                let r = child.matches(ctx)?;
                ctx.fragments.truncate(mark);
                Ok(r)
            }
            EvalNode::Branch { mask } => Ok(ctx.rdr().branch_mask(ctx.doc) & *mask != 0),
            EvalNode::Language { id, name } => match id {
                Some(i) => Ok(ctx.rdr().language_id(ctx.doc) == *i),
                None => Ok(ctx.rdr().language_name(ctx.doc)?.eq_ignore_ascii_case(name)),
            },
            EvalNode::Substring(s) => s.verify(ctx),
            EvalNode::Regexp(r) => r.verify(ctx),
        }
    }
}

impl SubstringEval {
    fn verify(&mut self, ctx: &mut DocContext<'_>) -> Result<bool> {
        let doc = ctx.doc;
        let rdr = ctx.rdr();

        let anchors = if self.source.is_brute_force() {
            None
        } else {
            let mut a = self
                .source
                .anchors_for_doc(rdr, self.scope, doc, ctx.stats)?;
            if a.is_empty() {
                return Ok(false);
            }
            // candidate anchors carry the pattern start for stable
            // literals; re-anchor unstable ones by rune count
            if self.case_sensitive && self.scope == Scope::Content {
                let bits = ctx.case_bits()?;
                let template = &self.pattern_case_bits;
                let len = self.pattern.len();
                a.retain(|&start| case_bits_match(bits, start, template, len));
                if a.is_empty() {
                    return Ok(false);
                }
            }
            Some(a)
        };

        let text_arc;
        let name_text;
        let text: &str = match self.scope {
            Scope::Content => {
                text_arc = ctx.content()?;
                std::str::from_utf8(&text_arc)
                    .map_err(|_| Error::CorruptShard("content not UTF-8".into()))?
            }
            Scope::FileName => {
                name_text = ctx.name()?;
                &name_text
            }
        };

        let mut found = Vec::new();
        match anchors {
            None => {
                // brute-force scan for patterns below trigram length
                for (i, _) in text.char_indices() {
                    if self.case_sensitive {
                        if text[i..].starts_with(&self.pattern) {
                            found.push((i as u32, self.pattern.len() as u32, true));
                        }
                    } else if let Some(n) = fold_compare(&text[i..], &self.folded) {
                        let exact = text.as_bytes()[i..i + n as usize] == *self.pattern.as_bytes();
                        found.push((i as u32, n, exact));
                    }
                }
            }
            Some(anchors) => {
                let (stable, runes_before) = self.source.anchor_info();
                for anchor in anchors {
                    let start = if stable {
                        anchor as usize
                    } else {
                        // walk back over the runes preceding the anchored
                        // trigram in the pattern
                        let mut s = anchor as usize;
                        let mut ok = true;
                        for _ in 0..runes_before {
                            match text[..s].chars().next_back() {
                                Some(c) => s -= c.len_utf8(),
                                None => {
                                    ok = false;
                                    break;
                                }
                            }
                        }
                        if !ok {
                            continue;
                        }
                        s
                    };
                    if !text.is_char_boundary(start) {
                        continue;
                    }
                    if self.case_sensitive {
                        let end = start + self.pattern.len();
                        if end <= text.len()
                            && text.as_bytes()[start..end] == *self.pattern.as_bytes()
                        {
                            found.push((start as u32, self.pattern.len() as u32, true));
                        }
                    } else if let Some(n) = fold_compare(&text[start..], &self.folded) {
                        let exact =
                            text.as_bytes()[start..start + n as usize] == *self.pattern.as_bytes();
                        found.push((start as u32, n, exact));
                    }
                }
            }
        }

        if found.is_empty() {
            return Ok(false);
        }

        // symbol flags feed scoring even without a symbol constraint
        let sections: Vec<DocumentSection> = if self.scope == Scope::Content {
            ctx.symbols()?.to_vec()
        } else {
            Vec::new()
        };
        let mut any = false;
        for (start, len, exact) in found {
            let in_symbol = sections
                .iter()
                .any(|s| section_contains(s, start, start + len));
            if self.symbol.is_some() && !in_symbol {
                continue;
            }
            ctx.fragments.push(Fragment {
                offset: start,
                len,
                scope: self.scope,
                in_symbol,
                exact_case: self.case_sensitive || exact,
            });
            any = true;
        }
        Ok(any)
    }
}

impl RegexpEval {
    fn verify(&mut self, ctx: &mut DocContext<'_>) -> Result<bool> {
        if let Some(g) = &mut self.gate {
            let mark = ctx.fragments.len();
            let gated = g.matches(ctx)?;
            ctx.fragments.truncate(mark);
            if !gated {
                return Ok(false);
            }
        }

        let text_arc;
        let name_text;
        let text: &str = match self.scope {
            Scope::Content => {
                text_arc = ctx.content()?;
                std::str::from_utf8(&text_arc)
                    .map_err(|_| Error::CorruptShard("content not UTF-8".into()))?
            }
            Scope::FileName => {
                name_text = ctx.name()?;
                &name_text
            }
        };

        let mut found = Vec::new();
        for m in self.re.find_iter(text) {
            if m.start() == m.end() {
                continue;
            }
            found.push((m.start() as u32, (m.end() - m.start()) as u32));
        }
        if found.is_empty() {
            return Ok(false);
        }

        let sections: Vec<DocumentSection> = if self.scope == Scope::Content {
            ctx.symbols()?.to_vec()
        } else {
            Vec::new()
        };
        let mut any = false;
        for (start, len) in found {
            let in_symbol = match self.symbol {
                Some(SymbolKind::Overlap) | None => sections
                    .iter()
                    .any(|s| section_overlaps(s, start, start + len)),
                Some(SymbolKind::Contain) => sections
                    .iter()
                    .any(|s| section_contains(s, start, start + len)),
            };
            if self.symbol.is_some() && !in_symbol {
                continue;
            }
            ctx.fragments.push(Fragment {
                offset: start,
                len,
                scope: self.scope,
                in_symbol,
                exact_case: false,
            });
            any = true;
        }
        Ok(any)
    }
}

// ---------------------------------------------------------------------------
// Bloom gating

/// True when the blooms prove a required literal cannot be in this shard.
/// Only literals in a conjunctive position count; OR and NOT branches are
/// never required, so they contribute nothing.
fn bloom_rejects(rdr: &ShardReader, q: &Query) -> bool {
    fn literal_missing(rdr: &ShardReader, pattern: &str, file_name: bool, content: bool) -> bool {
        let folded: String = pattern.chars().map(fold_rune).collect();
        if folded.chars().count() < 3 {
            return false;
        }
        let content_miss = rdr
            .content_bloom()
            .is_some_and(|b| ngrams(&folded).any(|g| !b.may_contain(g)));
        let name_miss = rdr
            .name_bloom()
            .is_some_and(|b| ngrams(&folded).any(|g| !b.may_contain(g)));
        match (file_name, content) {
            (true, _) => name_miss,
            (false, true) => content_miss,
            // default scope: the literal may sit in either stream
            (false, false) => content_miss && name_miss,
        }
    }

    fn walk(rdr: &ShardReader, q: &Query) -> bool {
        match q {
            Query::And(cs) => cs.iter().any(|c| walk(rdr, c)),
            Query::Symbol(c) => walk(rdr, c),
            Query::Type { child, .. } => walk(rdr, child),
            Query::Substring { pattern, file_name, content, .. } => {
                literal_missing(rdr, pattern, *file_name, *content)
            }
            Query::Regexp { pattern, file_name, content, .. } => {
                match required_literals(pattern) {
                    LiteralSet::Conj(lits) => lits
                        .iter()
                        .any(|l| literal_missing(rdr, l, *file_name, *content)),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    walk(rdr, q)
}

// ---------------------------------------------------------------------------
// Driver

pub(crate) fn run_search(
    searcher: &Searcher,
    query: &Query,
    opts: &SearchOptions,
    token: &CancellationToken,
) -> Result<SearchResult> {
    let rdr = searcher.reader();
    let mut result = SearchResult {
        stats: Stats { shards_scanned: 1, ..Stats::default() },
        ..SearchResult::default()
    };
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let q = simplify(query.clone());
    let q = simplify(resolve_shard_atoms(q, rdr)?);
    if let Query::Const(false) = q {
        return Ok(result);
    }

    if !searcher.bloom_disabled() && bloom_rejects(rdr, &q) {
        tracing::debug!(shard = %rdr.name(), query = %q, "bloom filter skipped shard");
        result.stats.shards_skipped_filter = 1;
        return Ok(result);
    }

    let mut lctx = LowerCtx {
        rdr,
        stats: &mut result.stats,
        branch_query_mask: 0,
        has_branch_atom: false,
    };
    let mut tree = lower(&q, &mut lctx, false)?;
    let branch_query_mask = lctx.has_branch_atom.then_some(lctx.branch_query_mask);

    let scoring = opts.scoring;
    let doc_count = rdr.doc_count();
    let mut important = 0usize;
    let mut doc = 0u32;
    while doc < doc_count {
        if token.is_cancelled() {
            result.cancelled = true;
            break;
        }
        let Some(d) = tree.next_candidate_doc(rdr, doc)? else {
            break;
        };
        if d >= doc_count {
            break;
        }
        doc = d + 1;
        result.stats.files_considered += 1;
        if opts.estimate_doc_count {
            result.stats.shard_files_considered += 1;
            continue;
        }

        let mut ctx = DocContext::new(d, searcher, &mut result.stats);
        if !tree.matches(&mut ctx)? {
            continue;
        }
        let fm = assemble_file_match(searcher, ctx, branch_query_mask, &scoring)?;
        result.stats.match_count += fm.line_matches.len() as u64;
        result.stats.file_count += 1;
        let score = fm.score;
        record_repo_urls(&mut result, rdr, &fm);
        result.files.push(fm);
        if opts.shard_max_important_match > 0 && score >= scoring.important_threshold {
            important += 1;
            if important >= opts.shard_max_important_match {
                break;
            }
        }
    }

    result
        .files
        .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then(a.rank.cmp(&b.rank)));
    Ok(result)
}

fn record_repo_urls(result: &mut SearchResult, rdr: &ShardReader, fm: &FileMatch) {
    let repo = rdr.repository();
    let (name, src) = if fm.sub_repository_name.is_empty() {
        (repo.name.clone(), repo)
    } else {
        match repo.sub_repo_map.get(&fm.sub_repository_path) {
            Some(sub) => (sub.name.clone(), sub),
            None => (repo.name.clone(), repo),
        }
    };
    if !name.is_empty() {
        result
            .repo_urls
            .entry(name.clone())
            .or_insert_with(|| src.file_url_template.clone());
        result
            .line_fragments
            .entry(name)
            .or_insert_with(|| src.line_fragment_template.clone());
    }
}

fn assemble_file_match(
    searcher: &Searcher,
    ctx: DocContext<'_>,
    branch_query_mask: Option<u64>,
    scoring: &crate::types::Scoring,
) -> Result<FileMatch> {
    let rdr = searcher.reader();
    let doc = ctx.doc;
    let DocContext { fragments, content, name, stats, .. } = ctx;
    let file_name = match name {
        Some(n) => n,
        None => rdr.read_name(doc)?,
    };

    let fragment_score = |f: &Fragment| -> f64 {
        let mut s = 0.0;
        if f.in_symbol {
            s += scoring.symbol_bonus;
        }
        if f.exact_case {
            s += scoring.exact_case_bonus;
        }
        if f.scope == Scope::FileName {
            s += scoring.file_name_bonus;
        }
        s
    };

    let content_frags: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.scope == Scope::Content)
        .collect();
    let name_frags: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| f.scope == Scope::FileName)
        .collect();

    let mut line_matches = Vec::new();
    if !content_frags.is_empty() {
        let data = content.expect("content fragments imply loaded content");
        let text = std::str::from_utf8(&data)
            .map_err(|_| Error::CorruptShard("content not UTF-8".into()))?;
        let newlines = rdr.read_newlines(doc)?;
        stats.content_bytes_loaded += rdr.newlines_size(doc) as u64;

        // group per line, splitting fragments that span newlines
        let mut per_line: BTreeMap<u32, (Vec<LineFragmentMatch>, f64)> = BTreeMap::new();
        for f in &content_frags {
            let score = fragment_score(f);
            let end = f.offset + f.len;
            let mut off = f.offset;
            loop {
                let line_number = 1 + newlines.partition_point(|&n| n < off) as u32;
                let line_start = if line_number == 1 {
                    0
                } else {
                    newlines[line_number as usize - 2] + 1
                };
                let line_end = newlines
                    .get(line_number as usize - 1)
                    .copied()
                    .unwrap_or(text.len() as u32);
                let seg_end = end.min(line_end);
                if seg_end > off {
                    let entry = per_line.entry(line_number).or_default();
                    entry.0.push(LineFragmentMatch {
                        offset: off,
                        line_offset: off - line_start,
                        match_length: seg_end - off,
                    });
                    entry.1 = entry.1.max(score);
                }
                if end > line_end {
                    off = line_end + 1;
                    if off >= end {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        for (line_number, (mut frags, score)) in per_line {
            frags.sort_by_key(|f| f.offset);
            let line_start = if line_number == 1 {
                0
            } else {
                newlines[line_number as usize - 2] + 1
            };
            let line_end = newlines
                .get(line_number as usize - 1)
                .copied()
                .unwrap_or(text.len() as u32);
            line_matches.push(LineMatch {
                line: text.as_bytes()[line_start as usize..line_end as usize].to_vec(),
                line_start,
                line_end,
                line_number,
                file_name: false,
                line_fragments: frags,
                score,
            });
        }
    } else if !name_frags.is_empty() {
        let mut frags: Vec<LineFragmentMatch> = name_frags
            .iter()
            .map(|f| LineFragmentMatch {
                offset: f.offset,
                line_offset: f.offset,
                match_length: f.len,
            })
            .collect();
        frags.sort_by_key(|f| f.offset);
        let score = name_frags.iter().map(|f| fragment_score(f)).fold(0.0, f64::max);
        line_matches.push(LineMatch {
            line: file_name.as_bytes().to_vec(),
            line_start: 0,
            line_end: file_name.len() as u32,
            line_number: 0,
            file_name: true,
            line_fragments: frags,
            score,
        });
    } else {
        // pure metadata or type:filename match
        line_matches.push(LineMatch {
            line: file_name.as_bytes().to_vec(),
            line_start: 0,
            line_end: file_name.len() as u32,
            line_number: 0,
            file_name: true,
            line_fragments: Vec::new(),
            score: 0.0,
        });
    }

    let repo = rdr.repository();
    let doc_mask = rdr.branch_mask(doc);
    let effective = doc_mask & branch_query_mask.unwrap_or(u64::MAX);
    let mut branches = Vec::new();
    let mut version = String::new();
    for (i, b) in repo.branches.iter().enumerate() {
        if effective & (1 << i) != 0 {
            if branches.is_empty() {
                version = b.version.clone();
            }
            branches.push(b.name.clone());
        }
    }

    let (sub_name, sub_path) = sub_repository_for(repo, &file_name);

    let base = fragments.iter().map(|f| fragment_score(f)).fold(0.0, f64::max);
    let rank_bonus = scoring.rank_weight * (rdr.doc_count() - doc) as f64
        / rdr.doc_count().max(1) as f64;

    Ok(FileMatch {
        file_name,
        repository: repo.name.clone(),
        branches,
        version,
        language: rdr.language_name(doc)?,
        sub_repository_name: sub_name,
        sub_repository_path: sub_path,
        line_matches,
        score: base + rank_bonus,
        rank: doc,
    })
}

fn sub_repository_for(
    repo: &crate::types::Repository,
    file_name: &str,
) -> (String, String) {
    let mut best: Option<(&String, &crate::types::Repository)> = None;
    for (path, sub) in &repo.sub_repo_map {
        let is_prefix =
            file_name == path || file_name.starts_with(&format!("{}/", path));
        if is_prefix && best.map_or(true, |(p, _)| path.len() > p.len()) {
            best = Some((path, sub));
        }
    }
    match best {
        Some((path, sub)) => (sub.name.clone(), path.clone()),
        None => (String::new(), String::new()),
    }
}
