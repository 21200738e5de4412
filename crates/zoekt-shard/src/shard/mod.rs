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

//! On-disk shard format.
//!
//! A shard starts with `magic | format_version | feature_version`, carries
//! its sections in any order, and ends with the table of contents followed
//! by a fixed-size footer:
//!
//! ```text
//! toc_offset: u64 | toc_size: u32 | format_version: u32
//!                 | feature_version: u32 | magic: u32
//! ```
//!
//! TOC entries are fixed-size `{kind: u32, offset: u64, size: u64}`
//! records. Readers accept any format and feature version at or below
//! their own; unknown section kinds are skipped.

pub(crate) const MAGIC: u32 = 0x5a4f_454b; // 'ZOEK'
pub(crate) const FORMAT_VERSION: u32 = 1;
/// Feature 2 added the language table; readers fall back to the built-in
/// alias map below that.
pub(crate) const FEATURE_VERSION: u32 = 2;
pub(crate) const LANGUAGE_FEATURE_VERSION: u32 = 2;

pub(crate) const HEADER_LEN: u64 = 12;
pub(crate) const FOOTER_LEN: u64 = 24;
pub(crate) const TOC_ENTRY_LEN: u64 = 20;

/// Section kinds. The numeric values are part of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum SectionKind {
    FileContents = 0,
    FileContentsIndex = 1,
    FileNames = 2,
    FileNamesIndex = 3,
    Newlines = 4,
    NewlinesIndex = 5,
    ContentCaseBits = 6,
    ContentCaseBitsIndex = 7,
    NameCaseBits = 8,
    NameCaseBitsIndex = 9,
    ContentNgrams = 10,
    ContentPostings = 11,
    NameNgrams = 12,
    NamePostings = 13,
    DocSections = 14,
    DocSectionsIndex = 15,
    BranchMasks = 16,
    Languages = 17,
    SubRepos = 18,
    Metadata = 19,
    ContentBloom = 20,
    NameBloom = 21,
    Checksum = 22,
}

impl SectionKind {
    pub(crate) fn from_u32(v: u32) -> Option<SectionKind> {
        use SectionKind::*;
        Some(match v {
            0 => FileContents,
            1 => FileContentsIndex,
            2 => FileNames,
            3 => FileNamesIndex,
            4 => Newlines,
            5 => NewlinesIndex,
            6 => ContentCaseBits,
            7 => ContentCaseBitsIndex,
            8 => NameCaseBits,
            9 => NameCaseBitsIndex,
            10 => ContentNgrams,
            11 => ContentPostings,
            12 => NameNgrams,
            13 => NamePostings,
            14 => DocSections,
            15 => DocSectionsIndex,
            16 => BranchMasks,
            17 => Languages,
            18 => SubRepos,
            19 => Metadata,
            20 => ContentBloom,
            21 => NameBloom,
            22 => Checksum,
            _ => return None,
        })
    }
}

/// Offset and size of one stored section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Section {
    pub off: u64,
    pub sz: u64,
}

mod source;
pub use source::{IndexFile, MemFile, MmapFile};

mod writer;
pub(crate) use writer::write_shard;

mod reader;
pub use reader::{read_metadata, IndexMetadata, ShardReader};
