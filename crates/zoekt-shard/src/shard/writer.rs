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

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;

use super::{Section, SectionKind, FEATURE_VERSION, FORMAT_VERSION, MAGIC};
use crate::error::{Error, Result};
use crate::index::IndexBuilder;
use crate::ngram::NGram;
use crate::types::{encode_raw_config, Repository};
use crate::varint;

/// Metadata JSON stored in its own section.
#[derive(Debug, Serialize, serde::Deserialize)]
pub(crate) struct ShardMetadata {
    pub repository: Repository,
    pub raw_config_bits: u8,
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    written: u64,
}

impl<'a, W: Write> CountingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        CountingWriter { inner, written: 0 }
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn section(
        &mut self,
        toc: &mut Vec<(SectionKind, Section)>,
        kind: SectionKind,
        bytes: &[u8],
    ) -> Result<()> {
        let off = self.written;
        self.emit(bytes)?;
        toc.push((kind, Section { off, sz: bytes.len() as u64 }));
        Ok(())
    }
}

fn u32s_le(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Serialize a sorted posting map into a fixed-size ngram table and a
/// concatenated delta-varint postings blob. Table entries are
/// `{ngram: u64, size: u32}`; list offsets accumulate in table order.
fn build_postings(
    map: &fnv::FnvHashMap<NGram, Vec<u32>>,
) -> (Vec<u8>, Vec<u8>) {
    let mut keys: Vec<NGram> = map.keys().copied().collect();
    keys.sort_unstable();
    let mut table = Vec::with_capacity(keys.len() * 12);
    let mut blob = Vec::new();
    for g in keys {
        let before = blob.len();
        varint::write_deltas(&mut blob, &map[&g]);
        table.extend_from_slice(&g.to_le_bytes());
        table.extend_from_slice(&((blob.len() - before) as u32).to_le_bytes());
    }
    (table, blob)
}

pub(crate) fn write_shard<W: Write>(b: IndexBuilder, w: &mut W) -> Result<()> {
    let mut out = CountingWriter::new(w);
    let mut toc: Vec<(SectionKind, Section)> = Vec::new();

    out.emit(&MAGIC.to_le_bytes())?;
    out.emit(&FORMAT_VERSION.to_le_bytes())?;
    out.emit(&FEATURE_VERSION.to_le_bytes())?;

    out.section(&mut toc, SectionKind::FileContents, &b.content)?;
    out.section(
        &mut toc,
        SectionKind::FileContentsIndex,
        &u32s_le(&b.content_index),
    )?;
    out.section(&mut toc, SectionKind::FileNames, &b.names)?;
    out.section(&mut toc, SectionKind::FileNamesIndex, &u32s_le(&b.name_index))?;

    // newline tables, delta encoded per document
    let mut nl_blob = Vec::new();
    let mut nl_index = vec![0u32];
    for d in &b.docs {
        varint::write_u32(&mut nl_blob, d.newlines.len() as u32);
        varint::write_deltas(&mut nl_blob, &d.newlines);
        nl_index.push(nl_blob.len() as u32);
    }
    out.section(&mut toc, SectionKind::Newlines, &nl_blob)?;
    out.section(&mut toc, SectionKind::NewlinesIndex, &u32s_le(&nl_index))?;

    out.section(&mut toc, SectionKind::ContentCaseBits, &b.content_case_bits)?;
    out.section(
        &mut toc,
        SectionKind::ContentCaseBitsIndex,
        &u32s_le(&b.content_case_bits_index),
    )?;
    out.section(&mut toc, SectionKind::NameCaseBits, &b.name_case_bits)?;
    out.section(
        &mut toc,
        SectionKind::NameCaseBitsIndex,
        &u32s_le(&b.name_case_bits_index),
    )?;

    let (content_table, content_blob) = build_postings(&b.content_postings);
    out.section(&mut toc, SectionKind::ContentNgrams, &content_table)?;
    out.section(&mut toc, SectionKind::ContentPostings, &content_blob)?;
    let (name_table, name_blob) = build_postings(&b.name_postings);
    out.section(&mut toc, SectionKind::NameNgrams, &name_table)?;
    out.section(&mut toc, SectionKind::NamePostings, &name_blob)?;

    // symbol sections, delta encoded (start gap, length) pairs
    let mut sec_blob = Vec::new();
    let mut sec_index = vec![0u32];
    let mut has_symbols = false;
    for d in &b.docs {
        has_symbols = has_symbols || !d.sections.is_empty();
        varint::write_u32(&mut sec_blob, d.sections.len() as u32);
        let mut prev = 0u32;
        for s in &d.sections {
            varint::write_u32(&mut sec_blob, s.start - prev);
            varint::write_u32(&mut sec_blob, s.end - s.start);
            prev = s.end;
        }
        sec_index.push(sec_blob.len() as u32);
    }
    out.section(&mut toc, SectionKind::DocSections, &sec_blob)?;
    out.section(&mut toc, SectionKind::DocSectionsIndex, &u32s_le(&sec_index))?;

    let mut masks = Vec::with_capacity(b.docs.len() * 8);
    for d in &b.docs {
        masks.extend_from_slice(&d.branch_mask.to_le_bytes());
    }
    out.section(&mut toc, SectionKind::BranchMasks, &masks)?;

    // language table: per-doc ids, then the id -> name list
    let mut langs = Vec::new();
    for d in &b.docs {
        langs.extend_from_slice(&d.lang_id.to_le_bytes());
    }
    langs.extend_from_slice(&(b.lang_names.len() as u16).to_le_bytes());
    for name in &b.lang_names {
        let nb = name.as_bytes();
        if nb.len() > u16::MAX as usize {
            return Err(Error::InvalidInput("language name too long".into()));
        }
        langs.extend_from_slice(&(nb.len() as u16).to_le_bytes());
        langs.extend_from_slice(nb);
    }
    out.section(&mut toc, SectionKind::Languages, &langs)?;

    if !b.repository().sub_repo_map.is_empty() {
        let json = serde_json::to_vec(&b.repository().sub_repo_map)
            .map_err(|e| Error::InvalidInput(format!("sub-repository encode: {}", e)))?;
        out.section(&mut toc, SectionKind::SubRepos, &json)?;
    }

    let mut repository = b.repository().clone();
    repository.has_symbols = has_symbols;
    repository.sub_repo_map.clear();
    let meta = ShardMetadata {
        raw_config_bits: encode_raw_config(&repository.raw_config),
        repository,
    };
    let json = serde_json::to_vec(&meta)
        .map_err(|e| Error::InvalidInput(format!("metadata encode: {}", e)))?;
    out.section(&mut toc, SectionKind::Metadata, &json)?;

    out.section(&mut toc, SectionKind::ContentBloom, b.content_bloom.as_bytes())?;
    out.section(&mut toc, SectionKind::NameBloom, b.name_bloom.as_bytes())?;

    let digest = Sha256::digest(&b.content);
    out.section(&mut toc, SectionKind::Checksum, digest.as_slice())?;

    let toc_off = out.written;
    for (kind, sec) in &toc {
        out.emit(&(*kind as u32).to_le_bytes())?;
        out.emit(&sec.off.to_le_bytes())?;
        out.emit(&sec.sz.to_le_bytes())?;
    }
    let toc_size = out.written - toc_off;

    out.emit(&toc_off.to_le_bytes())?;
    out.emit(&(toc_size as u32).to_le_bytes())?;
    out.emit(&FORMAT_VERSION.to_le_bytes())?;
    out.emit(&FEATURE_VERSION.to_le_bytes())?;
    out.emit(&MAGIC.to_le_bytes())?;
    out.inner.flush()?;

    tracing::debug!(
        docs = b.docs.len(),
        bytes = out.written,
        ngrams = b.content_postings.len(),
        "wrote shard"
    );
    Ok(())
}
