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

use fnv::FnvHashMap;
use std::io::Write;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::ngram::{scan_document, NGram};
use crate::types::{Document, DocumentSection, Repository};

/// Maximum number of distinct trigrams a document may contain.
pub const DEFAULT_MAX_TRIGRAM_COUNT: usize = 20_000;

const DEFAULT_MAX_DOCUMENT_SIZE: usize = 2 << 20;
const DEFAULT_CONTENT_BLOOM_BITS: u64 = 1 << 20;
const DEFAULT_NAME_BLOOM_BITS: u64 = 1 << 16;
const MAX_BRANCHES: usize = 64;

/// Validate document text before indexing.
///
/// Empty content is fine. Non-empty content shorter than one trigram, a NUL
/// byte in the first 1024 bytes, invalid UTF-8, or more than
/// `max_trigram_count` distinct trigrams reject the document.
pub fn check_text(content: &[u8], max_trigram_count: usize) -> Result<()> {
    if content.is_empty() {
        return Ok(());
    }
    if content.len() < 3 {
        return Err(Error::InvalidInput("content shorter than a trigram".into()));
    }
    let window = &content[..content.len().min(1024)];
    if window.contains(&0) {
        return Err(Error::InvalidInput("binary content: NUL byte".into()));
    }
    let text = std::str::from_utf8(content)
        .map_err(|_| Error::InvalidInput("content is not valid UTF-8".into()))?;
    let mut seen = fnv::FnvHashSet::default();
    for g in crate::ngram::ngrams(text) {
        seen.insert(g);
        if seen.len() > max_trigram_count {
            return Err(Error::InvalidInput("too many trigrams".into()));
        }
    }
    Ok(())
}

/// Per-document data kept until serialization.
pub(crate) struct DocEntry {
    pub newlines: Vec<u32>,
    pub sections: Vec<DocumentSection>,
    pub branch_mask: u64,
    pub lang_id: u16,
}

/// Accumulates documents and serializes them into one immutable shard.
///
/// Documents receive dense ids in insertion order. `write` consumes the
/// builder; a serialized shard can never be appended to.
pub struct IndexBuilder {
    pub(crate) repo: Repository,
    pub(crate) content: Vec<u8>,
    pub(crate) content_index: Vec<u32>,
    pub(crate) names: Vec<u8>,
    pub(crate) name_index: Vec<u32>,
    pub(crate) docs: Vec<DocEntry>,
    pub(crate) content_postings: FnvHashMap<NGram, Vec<u32>>,
    pub(crate) name_postings: FnvHashMap<NGram, Vec<u32>>,
    pub(crate) content_case_bits: Vec<u8>,
    pub(crate) content_case_bits_index: Vec<u32>,
    pub(crate) name_case_bits: Vec<u8>,
    pub(crate) name_case_bits_index: Vec<u32>,
    pub(crate) lang_names: Vec<String>,
    lang_ids: FnvHashMap<String, u16>,
    pub(crate) content_bloom: BloomFilter,
    pub(crate) name_bloom: BloomFilter,
    max_document_size: usize,
    max_trigram_count: usize,
}

impl IndexBuilder {
    /// Create a builder bound to `repo`, or an anonymous one.
    pub fn new(repo: Option<Repository>) -> Result<IndexBuilder> {
        let repo = repo.unwrap_or_default();
        if repo.branches.len() > MAX_BRANCHES {
            return Err(Error::InvalidInput(format!(
                "too many branches: {} > {}",
                repo.branches.len(),
                MAX_BRANCHES
            )));
        }
        Ok(IndexBuilder {
            repo,
            content: Vec::new(),
            content_index: vec![0],
            names: Vec::new(),
            name_index: vec![0],
            docs: Vec::new(),
            content_postings: FnvHashMap::default(),
            name_postings: FnvHashMap::default(),
            content_case_bits: Vec::new(),
            content_case_bits_index: vec![0],
            name_case_bits: Vec::new(),
            name_case_bits_index: vec![0],
            lang_names: vec![String::new()],
            lang_ids: FnvHashMap::default(),
            content_bloom: BloomFilter::with_bits(DEFAULT_CONTENT_BLOOM_BITS),
            name_bloom: BloomFilter::with_bits(DEFAULT_NAME_BLOOM_BITS),
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            max_trigram_count: DEFAULT_MAX_TRIGRAM_COUNT,
        })
    }

    pub fn max_document_size(mut self, sz: usize) -> Self {
        self.max_document_size = sz;
        self
    }

    pub fn max_trigram_count(mut self, n: usize) -> Self {
        self.max_trigram_count = n.max(1);
        self
    }

    /// Shrink or grow the bloom filters; sizes round up to a power of two.
    pub fn bloom_bits(mut self, content_bits: u64, name_bits: u64) -> Self {
        self.content_bloom = BloomFilter::with_bits(content_bits);
        self.name_bloom = BloomFilter::with_bits(name_bits);
        self
    }

    /// Running total of stored content and name bytes.
    pub fn content_size(&self) -> u64 {
        self.content.len() as u64 + self.names.len() as u64
    }

    pub fn doc_count(&self) -> u32 {
        self.docs.len() as u32
    }

    /// Convenience for name-and-content documents.
    pub fn add_file(&mut self, name: impl Into<String>, content: &[u8]) -> Result<()> {
        self.add(Document {
            name: name.into(),
            content: content.to_vec(),
            ..Document::default()
        })
    }

    /// Append one document. On error the builder state is unchanged.
    pub fn add(&mut self, doc: Document) -> Result<()> {
        if doc.content.len() > self.max_document_size {
            return Err(Error::InvalidInput(format!(
                "document too large: {} > {}",
                doc.content.len(),
                self.max_document_size
            )));
        }
        check_text(&doc.content, self.max_trigram_count)?;
        // check_text validated the encoding
        let text = std::str::from_utf8(&doc.content)
            .map_err(|_| Error::InvalidInput("content is not valid UTF-8".into()))?;
        validate_sections(text, &doc.symbols)?;
        let branch_mask = self.branch_mask(&doc.branches)?;
        self.validate_sub_repository(&doc)?;
        if self.content.len() + doc.content.len() > u32::MAX as usize
            || self.names.len() + doc.name.len() > u32::MAX as usize
        {
            return Err(Error::InvalidInput("shard content limit exceeded".into()));
        }

        let doc_start = self.content.len() as u32;
        let name_start = self.names.len() as u32;

        let scan = scan_document(text);
        for &(g, off) in &scan.ngrams {
            self.content_postings
                .entry(g)
                .or_default()
                .push(doc_start + off);
            self.content_bloom.insert(g);
        }
        self.content.extend_from_slice(&doc.content);
        self.content_index.push(self.content.len() as u32);
        self.content_case_bits.extend_from_slice(&scan.case_bits);
        self.content_case_bits_index
            .push(self.content_case_bits.len() as u32);

        let name_scan = scan_document(&doc.name);
        for &(g, off) in &name_scan.ngrams {
            self.name_postings
                .entry(g)
                .or_default()
                .push(name_start + off);
            self.name_bloom.insert(g);
        }
        self.names.extend_from_slice(doc.name.as_bytes());
        self.name_index.push(self.names.len() as u32);
        self.name_case_bits.extend_from_slice(&name_scan.case_bits);
        self.name_case_bits_index
            .push(self.name_case_bits.len() as u32);

        let lang_id = self.lang_id(doc.language.as_deref().unwrap_or(""));
        self.docs.push(DocEntry {
            newlines: scan.newlines,
            sections: doc.symbols,
            branch_mask,
            lang_id,
        });
        Ok(())
    }

    /// Serialize the shard. Consuming the builder makes shards write-once.
    pub fn write<W: Write>(self, w: &mut W) -> Result<()> {
        crate::shard::write_shard(self, w)
    }

    pub(crate) fn repository(&self) -> &Repository {
        &self.repo
    }

    fn branch_mask(&self, branches: &[String]) -> Result<u64> {
        let mut mask = 0u64;
        for b in branches {
            let bit = self
                .repo
                .branches
                .iter()
                .position(|rb| rb.name == *b)
                .ok_or_else(|| Error::InvalidInput(format!("unknown branch {:?}", b)))?;
            mask |= 1 << bit;
        }
        Ok(mask)
    }

    fn validate_sub_repository(&self, doc: &Document) -> Result<()> {
        let Some(path) = &doc.sub_repository_path else {
            return Ok(());
        };
        if !self.repo.sub_repo_map.contains_key(path) {
            return Err(Error::InvalidInput(format!(
                "unknown sub-repository {:?}",
                path
            )));
        }
        if doc.name != *path && !doc.name.starts_with(&format!("{}/", path)) {
            return Err(Error::InvalidInput(format!(
                "document {:?} is outside sub-repository {:?}",
                doc.name, path
            )));
        }
        Ok(())
    }

    fn lang_id(&mut self, lang: &str) -> u16 {
        if lang.is_empty() {
            return 0;
        }
        if let Some(&id) = self.lang_ids.get(lang) {
            return id;
        }
        let id = self.lang_names.len() as u16;
        self.lang_names.push(lang.to_string());
        self.lang_ids.insert(lang.to_string(), id);
        id
    }
}

fn validate_sections(text: &str, sections: &[DocumentSection]) -> Result<()> {
    let mut prev_end = 0u32;
    for s in sections {
        if s.start > s.end {
            return Err(Error::InvalidInput(format!(
                "inverted symbol section {}..{}",
                s.start, s.end
            )));
        }
        if s.start < prev_end {
            return Err(Error::InvalidInput(format!(
                "overlapping symbol section at {}",
                s.start
            )));
        }
        if s.end as usize > text.len() {
            return Err(Error::InvalidInput(format!(
                "symbol section {}..{} past end of document",
                s.start, s.end
            )));
        }
        if !text.is_char_boundary(s.start as usize) || !text.is_char_boundary(s.end as usize) {
            return Err(Error::InvalidInput(format!(
                "symbol section {}..{} not on rune boundary",
                s.start, s.end
            )));
        }
        prev_end = s.end;
    }
    Ok(())
}
