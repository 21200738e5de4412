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

use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::writer::ShardMetadata;
use super::{
    IndexFile, Section, SectionKind, FEATURE_VERSION, FOOTER_LEN, FORMAT_VERSION, HEADER_LEN,
    LANGUAGE_FEATURE_VERSION, MAGIC, TOC_ENTRY_LEN,
};
use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::ngram::NGram;
use crate::types::{DocumentSection, Repository};
use crate::varint::DeltaReader;

/// Format and feature versions of an opened shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub feature_version: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct NgramEntry {
    pub ngram: NGram,
    pub off: u32,
    pub sz: u32,
}

/// Sorted ngram table with the section holding its posting lists.
pub(crate) struct NgramTable {
    entries: Vec<NgramEntry>,
    postings: Section,
}

impl NgramTable {
    pub(crate) fn get(&self, g: NGram) -> Option<NgramEntry> {
        self.entries
            .binary_search_by_key(&g, |e| e.ngram)
            .ok()
            .map(|i| self.entries[i])
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Read-only view over one shard.
///
/// All data reaches the reader through the byte source; small tables are
/// decoded eagerly at open, content and posting lists stay on the source
/// until asked for.
pub struct ShardReader {
    src: Box<dyn IndexFile>,
    meta: IndexMetadata,
    doc_count: u32,
    content: Section,
    names: Section,
    content_index: Vec<u32>,
    name_index: Vec<u32>,
    newlines: Section,
    newlines_index: Vec<u32>,
    content_case_bits: Section,
    content_case_bits_index: Vec<u32>,
    name_case_bits: Section,
    name_case_bits_index: Vec<u32>,
    content_ngrams: NgramTable,
    name_ngrams: NgramTable,
    doc_sections: Section,
    doc_sections_index: Vec<u32>,
    branch_masks: Vec<u64>,
    lang_ids: Vec<u16>,
    lang_names: Vec<String>,
    has_language_table: bool,
    repository: Repository,
    raw_config_bits: u8,
    content_bloom: Option<BloomFilter>,
    name_bloom: Option<BloomFilter>,
    checksum: Option<[u8; 32]>,
}

fn read_u32(buf: &[u8], off: usize) -> Result<u32> {
    buf.get(off..off + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::CorruptShard("truncated u32".into()))
}

fn read_u64(buf: &[u8], off: usize) -> Result<u64> {
    buf.get(off..off + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::CorruptShard("truncated u64".into()))
}

fn section_bytes(src: &dyn IndexFile, sec: Section) -> Result<Vec<u8>> {
    if sec.sz > u32::MAX as u64 {
        return Err(Error::CorruptShard("section too large".into()));
    }
    Ok(src.read(sec.off, sec.sz as u32)?)
}

fn parse_footer(src: &dyn IndexFile) -> Result<(IndexMetadata, HashMap<u32, Section>)> {
    let size = src.size()?;
    if size < HEADER_LEN + FOOTER_LEN {
        return Err(Error::CorruptShard("file too small".into()));
    }
    let footer = src.read(size - FOOTER_LEN, FOOTER_LEN as u32)?;
    let toc_off = read_u64(&footer, 0)?;
    let toc_size = read_u32(&footer, 8)? as u64;
    let format_version = read_u32(&footer, 12)?;
    let feature_version = read_u32(&footer, 16)?;
    let magic = read_u32(&footer, 20)?;
    if magic != MAGIC {
        return Err(Error::CorruptShard("bad footer magic".into()));
    }
    if format_version > FORMAT_VERSION {
        return Err(Error::Unsupported(format!(
            "format version {} > {}",
            format_version, FORMAT_VERSION
        )));
    }
    if feature_version > FEATURE_VERSION {
        return Err(Error::Unsupported(format!(
            "feature version {} > {}",
            feature_version, FEATURE_VERSION
        )));
    }
    let head = src.read(0, 4)?;
    if read_u32(&head, 0)? != MAGIC {
        return Err(Error::CorruptShard("bad header magic".into()));
    }
    if toc_size % TOC_ENTRY_LEN != 0
        || toc_off < HEADER_LEN
        || toc_off + toc_size > size - FOOTER_LEN
    {
        return Err(Error::CorruptShard("inconsistent TOC bounds".into()));
    }

    let raw = src.read(toc_off, toc_size as u32)?;
    let mut toc = HashMap::new();
    for i in 0..(toc_size / TOC_ENTRY_LEN) as usize {
        let base = i * TOC_ENTRY_LEN as usize;
        let kind = read_u32(&raw, base)?;
        let off = read_u64(&raw, base + 4)?;
        let sz = read_u64(&raw, base + 12)?;
        if off + sz > size - FOOTER_LEN {
            return Err(Error::CorruptShard(format!(
                "section {} out of bounds",
                kind
            )));
        }
        // Skip kinds from newer feature versions.
        if let Some(k) = SectionKind::from_u32(kind) {
            toc.insert(k as u32, Section { off, sz });
        }
    }
    Ok((IndexMetadata { format_version, feature_version }, toc))
}

fn require(toc: &HashMap<u32, Section>, kind: SectionKind) -> Result<Section> {
    toc.get(&(kind as u32)).copied().ok_or_else(|| {
        Error::CorruptShard(format!("missing section {:?}", kind))
    })
}

fn parse_u32_index(src: &dyn IndexFile, sec: Section, what: &str) -> Result<Vec<u32>> {
    let raw = section_bytes(src, sec)?;
    if raw.len() % 4 != 0 {
        return Err(Error::CorruptShard(format!("misaligned {} index", what)));
    }
    let mut out = Vec::with_capacity(raw.len() / 4);
    let mut prev = 0u32;
    for chunk in raw.chunks_exact(4) {
        let v = u32::from_le_bytes(chunk.try_into().unwrap());
        if v < prev {
            return Err(Error::CorruptShard(format!("{} index not monotone", what)));
        }
        prev = v;
        out.push(v);
    }
    if out.is_empty() {
        return Err(Error::CorruptShard(format!("empty {} index", what)));
    }
    Ok(out)
}

fn parse_ngram_table(
    src: &dyn IndexFile,
    table: Section,
    postings: Section,
    what: &str,
) -> Result<NgramTable> {
    let raw = section_bytes(src, table)?;
    if raw.len() % 12 != 0 {
        return Err(Error::CorruptShard(format!("misaligned {} table", what)));
    }
    if postings.sz > u32::MAX as u64 {
        return Err(Error::CorruptShard(format!("{} postings too large", what)));
    }
    let mut entries = Vec::with_capacity(raw.len() / 12);
    let mut off = 0u64;
    let mut prev: Option<NGram> = None;
    for chunk in raw.chunks_exact(12) {
        let ngram = u64::from_le_bytes(chunk[..8].try_into().unwrap());
        let sz = u32::from_le_bytes(chunk[8..].try_into().unwrap());
        if prev.is_some_and(|p| p >= ngram) {
            return Err(Error::CorruptShard(format!("{} table unsorted", what)));
        }
        prev = Some(ngram);
        entries.push(NgramEntry { ngram, off: off as u32, sz });
        off += sz as u64;
        if off > postings.sz {
            return Err(Error::CorruptShard(format!(
                "{} postings overflow their section",
                what
            )));
        }
    }
    Ok(NgramTable { entries, postings })
}

impl ShardReader {
    pub fn open<F: IndexFile + 'static>(src: F) -> Result<ShardReader> {
        let src: Box<dyn IndexFile> = Box::new(src);
        let (meta, toc) = parse_footer(src.as_ref())?;

        let content = require(&toc, SectionKind::FileContents)?;
        let content_index =
            parse_u32_index(src.as_ref(), require(&toc, SectionKind::FileContentsIndex)?, "content")?;
        let doc_count = (content_index.len() - 1) as u32;

        let names = require(&toc, SectionKind::FileNames)?;
        let name_index =
            parse_u32_index(src.as_ref(), require(&toc, SectionKind::FileNamesIndex)?, "name")?;
        let newlines = require(&toc, SectionKind::Newlines)?;
        let newlines_index =
            parse_u32_index(src.as_ref(), require(&toc, SectionKind::NewlinesIndex)?, "newline")?;
        let content_case_bits = require(&toc, SectionKind::ContentCaseBits)?;
        let content_case_bits_index = parse_u32_index(
            src.as_ref(),
            require(&toc, SectionKind::ContentCaseBitsIndex)?,
            "content case-bit",
        )?;
        let name_case_bits = require(&toc, SectionKind::NameCaseBits)?;
        let name_case_bits_index = parse_u32_index(
            src.as_ref(),
            require(&toc, SectionKind::NameCaseBitsIndex)?,
            "name case-bit",
        )?;
        let doc_sections = require(&toc, SectionKind::DocSections)?;
        let doc_sections_index = parse_u32_index(
            src.as_ref(),
            require(&toc, SectionKind::DocSectionsIndex)?,
            "doc-section",
        )?;
        for (index, what) in [
            (&name_index, "name"),
            (&newlines_index, "newline"),
            (&content_case_bits_index, "content case-bit"),
            (&name_case_bits_index, "name case-bit"),
            (&doc_sections_index, "doc-section"),
        ] {
            if index.len() != content_index.len() {
                return Err(Error::CorruptShard(format!(
                    "{} index disagrees on document count",
                    what
                )));
            }
        }

        let content_ngrams = parse_ngram_table(
            src.as_ref(),
            require(&toc, SectionKind::ContentNgrams)?,
            require(&toc, SectionKind::ContentPostings)?,
            "content ngram",
        )?;
        let name_ngrams = parse_ngram_table(
            src.as_ref(),
            require(&toc, SectionKind::NameNgrams)?,
            require(&toc, SectionKind::NamePostings)?,
            "name ngram",
        )?;

        let mask_raw = section_bytes(src.as_ref(), require(&toc, SectionKind::BranchMasks)?)?;
        if mask_raw.len() != doc_count as usize * 8 {
            return Err(Error::CorruptShard("branch mask table size".into()));
        }
        let branch_masks = mask_raw
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let mut lang_ids = Vec::new();
        let mut lang_names = Vec::new();
        let mut has_language_table = false;
        if meta.feature_version >= LANGUAGE_FEATURE_VERSION {
            if let Some(&sec) = toc.get(&(SectionKind::Languages as u32)) {
                let raw = section_bytes(src.as_ref(), sec)?;
                let ids_len = doc_count as usize * 2;
                if raw.len() < ids_len + 2 {
                    return Err(Error::CorruptShard("language table size".into()));
                }
                for chunk in raw[..ids_len].chunks_exact(2) {
                    lang_ids.push(u16::from_le_bytes(chunk.try_into().unwrap()));
                }
                let mut off = ids_len;
                let n = u16::from_le_bytes(raw[off..off + 2].try_into().unwrap()) as usize;
                off += 2;
                for _ in 0..n {
                    let len = read_u16(&raw, off)? as usize;
                    off += 2;
                    let name = raw
                        .get(off..off + len)
                        .and_then(|b| std::str::from_utf8(b).ok())
                        .ok_or_else(|| Error::CorruptShard("language name".into()))?;
                    lang_names.push(name.to_string());
                    off += len;
                }
                if lang_ids.iter().any(|&id| id as usize >= lang_names.len()) {
                    return Err(Error::CorruptShard("language id out of range".into()));
                }
                has_language_table = true;
            }
        }

        let meta_raw = section_bytes(src.as_ref(), require(&toc, SectionKind::Metadata)?)?;
        let shard_meta: ShardMetadata = serde_json::from_slice(&meta_raw)
            .map_err(|e| Error::CorruptShard(format!("metadata decode: {}", e)))?;
        let mut repository = shard_meta.repository;
        if let Some(&sec) = toc.get(&(SectionKind::SubRepos as u32)) {
            let raw = section_bytes(src.as_ref(), sec)?;
            repository.sub_repo_map = serde_json::from_slice(&raw)
                .map_err(|e| Error::CorruptShard(format!("sub-repository decode: {}", e)))?;
        }

        let content_bloom = match toc.get(&(SectionKind::ContentBloom as u32)) {
            Some(&sec) => Some(
                BloomFilter::from_bytes(section_bytes(src.as_ref(), sec)?)
                    .ok_or_else(|| Error::CorruptShard("content bloom size".into()))?,
            ),
            None => None,
        };
        let name_bloom = match toc.get(&(SectionKind::NameBloom as u32)) {
            Some(&sec) => Some(
                BloomFilter::from_bytes(section_bytes(src.as_ref(), sec)?)
                    .ok_or_else(|| Error::CorruptShard("name bloom size".into()))?,
            ),
            None => None,
        };
        let checksum = match toc.get(&(SectionKind::Checksum as u32)) {
            Some(&sec) => {
                let raw = section_bytes(src.as_ref(), sec)?;
                let arr: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| Error::CorruptShard("checksum size".into()))?;
                Some(arr)
            }
            None => None,
        };

        tracing::debug!(
            shard = %src.name(),
            docs = doc_count,
            format = meta.format_version,
            feature = meta.feature_version,
            content_ngrams = content_ngrams.len(),
            "opened shard"
        );

        Ok(ShardReader {
            src,
            meta,
            doc_count,
            content,
            names,
            content_index,
            name_index,
            newlines,
            newlines_index,
            content_case_bits,
            content_case_bits_index,
            name_case_bits,
            name_case_bits_index,
            content_ngrams,
            name_ngrams,
            doc_sections,
            doc_sections_index,
            branch_masks,
            lang_ids,
            lang_names,
            has_language_table,
            repository,
            raw_config_bits: shard_meta.raw_config_bits,
            content_bloom,
            name_bloom,
            checksum,
        })
    }

    pub fn name(&self) -> &str {
        self.src.name()
    }

    pub fn metadata(&self) -> IndexMetadata {
        self.meta
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn raw_config_bits(&self) -> u8 {
        self.raw_config_bits
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Total size of the backing shard file.
    pub fn index_bytes(&self) -> u64 {
        self.src.size().unwrap_or(0)
    }

    pub fn content_bytes(&self) -> u64 {
        self.content.sz + self.names.sz
    }

    fn doc_slice(&self, sec: Section, index: &[u32], doc: u32) -> Result<Vec<u8>> {
        let d = doc as usize;
        if d + 1 >= index.len() {
            return Err(Error::CorruptShard(format!("doc {} out of range", doc)));
        }
        let start = index[d];
        let len = index[d + 1] - start;
        Ok(self.src.read(sec.off + start as u64, len)?)
    }

    pub fn read_content(&self, doc: u32) -> Result<Vec<u8>> {
        self.doc_slice(self.content, &self.content_index, doc)
    }

    pub fn content_len(&self, doc: u32) -> u32 {
        let d = doc as usize;
        self.content_index[d + 1] - self.content_index[d]
    }

    pub fn read_name(&self, doc: u32) -> Result<String> {
        let raw = self.doc_slice(self.names, &self.name_index, doc)?;
        String::from_utf8(raw).map_err(|_| Error::CorruptShard("file name not UTF-8".into()))
    }

    /// Byte offsets of `\n` within the document.
    pub fn read_newlines(&self, doc: u32) -> Result<Vec<u32>> {
        let raw = self.doc_slice(self.newlines, &self.newlines_index, doc)?;
        let mut r = DeltaReader::new(&raw);
        let n = r.read_raw()? as usize;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(r.read_delta()?);
        }
        if !r.is_empty() {
            return Err(Error::CorruptShard("trailing newline table bytes".into()));
        }
        Ok(out)
    }

    pub fn newlines_size(&self, doc: u32) -> u32 {
        let d = doc as usize;
        self.newlines_index[d + 1] - self.newlines_index[d]
    }

    /// One bit per content byte; set when the byte starts an upper-case
    /// rune.
    pub fn read_case_bits(&self, doc: u32) -> Result<Vec<u8>> {
        self.doc_slice(self.content_case_bits, &self.content_case_bits_index, doc)
    }

    pub fn read_name_case_bits(&self, doc: u32) -> Result<Vec<u8>> {
        self.doc_slice(self.name_case_bits, &self.name_case_bits_index, doc)
    }

    pub fn read_symbols(&self, doc: u32) -> Result<Vec<DocumentSection>> {
        let raw = self.doc_slice(self.doc_sections, &self.doc_sections_index, doc)?;
        let mut r = DeltaReader::new(&raw);
        let n = r.read_raw()? as usize;
        let mut out = Vec::with_capacity(n);
        let mut prev = 0u32;
        for _ in 0..n {
            let start = prev + r.read_raw()?;
            let end = start + r.read_raw()?;
            out.push(DocumentSection::new(start, end));
            prev = end;
        }
        if !r.is_empty() {
            return Err(Error::CorruptShard("trailing doc-section bytes".into()));
        }
        Ok(out)
    }

    pub fn doc_sections_size(&self, doc: u32) -> u32 {
        let d = doc as usize;
        self.doc_sections_index[d + 1] - self.doc_sections_index[d]
    }

    pub fn has_symbols(&self, doc: u32) -> bool {
        // a bare zero-count entry is a single varint byte
        self.doc_sections_size(doc) > 1
    }

    pub fn branch_mask(&self, doc: u32) -> u64 {
        self.branch_masks.get(doc as usize).copied().unwrap_or(0)
    }

    pub fn has_language_table(&self) -> bool {
        self.has_language_table
    }

    /// Stored language id of a document; 0 when untagged or the table is
    /// absent.
    pub fn language_id(&self, doc: u32) -> u16 {
        self.lang_ids.get(doc as usize).copied().unwrap_or(0)
    }

    /// Case-insensitive lookup in the shard's language table.
    pub fn language_id_by_name(&self, name: &str) -> Option<u16> {
        self.lang_names
            .iter()
            .position(|n| !n.is_empty() && n.eq_ignore_ascii_case(name))
            .map(|i| i as u16)
    }

    /// Language of a document, via the stored table or the extension
    /// fallback for legacy shards.
    pub fn language_name(&self, doc: u32) -> Result<String> {
        if self.has_language_table {
            let id = self.lang_ids[doc as usize] as usize;
            return Ok(self.lang_names[id].clone());
        }
        let name = self.read_name(doc)?;
        Ok(crate::lang::language_from_file_name(&name)
            .unwrap_or_default()
            .to_string())
    }

    pub fn content_ngram_count(&self) -> usize {
        self.content_ngrams.len()
    }

    pub fn name_ngram_count(&self) -> usize {
        self.name_ngrams.len()
    }

    /// Size in bytes of a content trigram's posting list, if present.
    pub fn content_ngram_frequency(&self, g: NGram) -> Option<u32> {
        self.content_ngrams.get(g).map(|e| e.sz)
    }

    /// Size in bytes of a name trigram's posting list, if present.
    pub fn name_ngram_frequency(&self, g: NGram) -> Option<u32> {
        self.name_ngrams.get(g).map(|e| e.sz)
    }

    pub(crate) fn content_ngrams(&self) -> &NgramTable {
        &self.content_ngrams
    }

    pub(crate) fn name_ngrams(&self) -> &NgramTable {
        &self.name_ngrams
    }

    /// Raw delta-encoded posting bytes for one table entry.
    pub(crate) fn read_postings(&self, table: &NgramTable, entry: NgramEntry) -> Result<Vec<u8>> {
        Ok(self
            .src
            .read(table.postings.off + entry.off as u64, entry.sz)?)
    }

    /// Document owning a byte offset into the concatenated content blob.
    pub(crate) fn doc_from_content_offset(&self, off: u32) -> u32 {
        (self.content_index[1..].partition_point(|&s| s <= off)) as u32
    }

    pub(crate) fn doc_from_name_offset(&self, off: u32) -> u32 {
        (self.name_index[1..].partition_point(|&s| s <= off)) as u32
    }

    pub(crate) fn content_start(&self, doc: u32) -> u32 {
        self.content_index[doc as usize]
    }

    pub(crate) fn name_start(&self, doc: u32) -> u32 {
        self.name_index[doc as usize]
    }

    pub fn content_bloom(&self) -> Option<&BloomFilter> {
        self.content_bloom.as_ref()
    }

    pub fn name_bloom(&self) -> Option<&BloomFilter> {
        self.name_bloom.as_ref()
    }

    /// Newline count per document without decoding the tables; used by
    /// listing stats.
    pub fn newline_count(&self, doc: u32) -> Result<u64> {
        let raw = self.doc_slice(self.newlines, &self.newlines_index, doc)?;
        let mut r = DeltaReader::new(&raw);
        Ok(r.read_raw()? as u64)
    }

    /// Recompute the content digest and compare against the stored one.
    pub fn verify_checksum(&self) -> Result<()> {
        let Some(want) = self.checksum else {
            return Ok(());
        };
        let raw = section_bytes(self.src.as_ref(), self.content)?;
        let got = Sha256::digest(&raw);
        if got.as_slice() != want {
            return Err(Error::CorruptShard("content checksum mismatch".into()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_language_fallback(&mut self) {
        self.has_language_table = false;
    }
}

fn read_u16(buf: &[u8], off: usize) -> Result<u16> {
    buf.get(off..off + 2)
        .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::CorruptShard("truncated u16".into()))
}

/// Parse only the footer, TOC and metadata sections; no index data is
/// loaded. For shard management tools that list repositories cheaply.
pub fn read_metadata(src: &dyn IndexFile) -> Result<(Repository, IndexMetadata)> {
    let (meta, toc) = parse_footer(src)?;
    let sec = require(&toc, SectionKind::Metadata)?;
    let raw = section_bytes(src, sec)?;
    let shard_meta: ShardMetadata = serde_json::from_slice(&raw)
        .map_err(|e| Error::CorruptShard(format!("metadata decode: {}", e)))?;
    let mut repository = shard_meta.repository;
    if let Some(&sec) = toc.get(&(SectionKind::SubRepos as u32)) {
        let raw = section_bytes(src, sec)?;
        repository.sub_repo_map = serde_json::from_slice(&raw)
            .map_err(|e| Error::CorruptShard(format!("sub-repository decode: {}", e)))?;
    }
    Ok((repository, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use crate::shard::MemFile;
    use crate::types::Document;

    fn shard_bytes() -> Vec<u8> {
        let mut b = IndexBuilder::new(None).unwrap();
        b.add(Document {
            name: "hello.h".into(),
            content: b"#include <stdio.h>\nint main() {}\n".to_vec(),
            language: Some("c".into()),
            ..Document::default()
        })
        .unwrap();
        let mut buf = Vec::new();
        b.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn language_table_and_fallback_agree() {
        let rdr = ShardReader::open(MemFile::new("t", shard_bytes())).unwrap();
        assert_eq!(rdr.language_name(0).unwrap(), "c");

        let mut legacy = ShardReader::open(MemFile::new("t", shard_bytes())).unwrap();
        legacy.force_language_fallback();
        assert_eq!(legacy.language_name(0).unwrap(), "c");
    }

    #[test]
    fn checksum_verifies() {
        let rdr = ShardReader::open(MemFile::new("t", shard_bytes())).unwrap();
        rdr.verify_checksum().unwrap();
    }

    #[test]
    fn corrupted_content_fails_checksum() {
        let mut bytes = shard_bytes();
        // content blob is the first section after the 12-byte header
        bytes[13] ^= 0xFF;
        let rdr = ShardReader::open(MemFile::new("t", bytes)).unwrap();
        assert!(matches!(
            rdr.verify_checksum(),
            Err(Error::CorruptShard(_))
        ));
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut bytes = shard_bytes();
        let n = bytes.len();
        // bump format version in the footer
        let off = n - 12;
        bytes[off] = 99;
        assert!(matches!(
            ShardReader::open(MemFile::new("t", bytes)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn truncated_shard_is_corrupt() {
        let bytes = shard_bytes();
        let cut = &bytes[..bytes.len() / 2];
        assert!(ShardReader::open(MemFile::new("t", cut.to_vec())).is_err());
    }
}
