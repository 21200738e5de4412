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

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A named branch with an opaque version string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryBranch {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl RepositoryBranch {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        RepositoryBranch { name: name.into(), version: version.into() }
    }
}

/// Repository metadata stored in the shard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// URL template to a commit, e.g. `{url}/commit/{version}`.
    #[serde(default)]
    pub commit_url_template: String,
    /// URL template to a file at a version.
    #[serde(default)]
    pub file_url_template: String,
    /// Template for a line fragment within a file URL.
    #[serde(default)]
    pub line_fragment_template: String,
    /// Indexed branches, at most 64. Bit i of a document's branch mask
    /// refers to `branches[i]`.
    #[serde(default)]
    pub branches: Vec<RepositoryBranch>,
    /// Path prefix -> metadata of vendored sub-repositories.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_repo_map: BTreeMap<String, Repository>,
    /// Free-form key/value configuration; `public`, `fork` and `archived`
    /// also travel in the packed flag byte (see [`encode_raw_config`]).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_config: BTreeMap<String, String>,
    /// Whether any document in this shard carries symbol sections. Set by
    /// the builder at write time.
    #[serde(default)]
    pub has_symbols: bool,
}

/// A pre-computed byte range marking a symbol inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub start: u32,
    pub end: u32,
}

impl DocumentSection {
    pub fn new(start: u32, end: u32) -> Self {
        DocumentSection { start, end }
    }
}

/// One input document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub name: String,
    pub content: Vec<u8>,
    /// Pre-assigned language tag; language detection happens upstream.
    pub language: Option<String>,
    /// Key into the repository's `sub_repo_map`, when the document belongs
    /// to a vendored sub-repository.
    pub sub_repository_path: Option<String>,
    /// Branch names this document is visible on.
    pub branches: Vec<String>,
    /// Ordered, non-overlapping symbol ranges on rune boundaries.
    pub symbols: Vec<DocumentSection>,
}

/// A matched fragment within one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFragmentMatch {
    /// Byte offset of the fragment within the document (or file name).
    pub offset: u32,
    /// Byte offset within the line.
    pub line_offset: u32,
    /// Matched length in bytes.
    pub match_length: u32,
}

/// All fragments on one line of a matched document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineMatch {
    pub line: Vec<u8>,
    pub line_start: u32,
    pub line_end: u32,
    /// 1-based; 0 for file-name matches.
    pub line_number: u32,
    /// True when this record matched the file name rather than content.
    pub file_name: bool,
    pub line_fragments: Vec<LineFragmentMatch>,
    pub score: f64,
}

/// All matches within one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMatch {
    pub file_name: String,
    pub repository: String,
    /// Branches the match applies to. When the query carried branch atoms
    /// this is the masked subset, otherwise all branches of the document.
    pub branches: Vec<String>,
    /// Version of the first reported branch.
    pub version: String,
    pub language: String,
    pub sub_repository_name: String,
    pub sub_repository_path: String,
    pub line_matches: Vec<LineMatch>,
    pub score: f64,
    /// Document id within the shard; stable tie-break for equal scores.
    pub rank: u32,
}

/// Per-search statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub files_considered: u64,
    pub files_loaded: u64,
    pub content_bytes_loaded: u64,
    pub index_bytes_loaded: u64,
    pub ngram_matches: u64,
    pub match_count: u64,
    pub file_count: u64,
    pub shards_scanned: u64,
    pub shards_skipped_filter: u64,
    pub regexps_considered: u64,
    /// Candidate documents counted under `estimate_doc_count`.
    pub shard_files_considered: u64,
}

impl Stats {
    pub fn add(&mut self, o: &Stats) {
        self.files_considered += o.files_considered;
        self.files_loaded += o.files_loaded;
        self.content_bytes_loaded += o.content_bytes_loaded;
        self.index_bytes_loaded += o.index_bytes_loaded;
        self.ngram_matches += o.ngram_matches;
        self.match_count += o.match_count;
        self.file_count += o.file_count;
        self.shards_scanned += o.shards_scanned;
        self.shards_skipped_filter += o.shards_skipped_filter;
        self.regexps_considered += o.regexps_considered;
        self.shard_files_considered += o.shard_files_considered;
    }
}

/// Tunable scoring weights. The defaults follow the upstream order of
/// magnitude; callers override them through `SearchOptions`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    /// Fragment lies inside a symbol section.
    pub symbol_bonus: f64,
    /// Case-insensitive atom matched with the exact case of the pattern.
    pub exact_case_bonus: f64,
    /// Fragment matched the file name.
    pub file_name_bonus: f64,
    /// Weight of the doc-id derived rank added for stable ordering.
    pub rank_weight: f64,
    /// Files at or above this score count as important matches.
    pub important_threshold: f64,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring {
            symbol_bonus: 7000.0,
            exact_case_bonus: 250.0,
            file_name_bonus: 5.0,
            rank_weight: 1e-3,
            important_threshold: 1000.0,
        }
    }
}

/// Options for one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Stop the shard after this many important matches (0 = unlimited).
    pub shard_max_important_match: usize,
    /// Only count candidate documents; no content loads, no line matches.
    pub estimate_doc_count: bool,
    pub scoring: Scoring,
}

/// Cooperative cancellation token, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of one shard search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub files: Vec<FileMatch>,
    pub stats: Stats,
    /// Repository name -> file URL template, for every repository that
    /// produced a match.
    pub repo_urls: HashMap<String, String>,
    /// Repository name -> line fragment template.
    pub line_fragments: HashMap<String, String>,
    /// Set when the search stopped early on a cancellation token; the
    /// collected results are still valid.
    pub cancelled: bool,
}

/// Options for repository listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Return only the minimal id -> {branches, has_symbols} map.
    pub minimal: bool,
}

/// Aggregate stats for a repository's shards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStats {
    pub shards: u64,
    pub documents: u64,
    pub content_bytes: u64,
    pub index_bytes: u64,
    pub new_lines_count: u64,
    pub default_branch_new_lines_count: u64,
    pub other_branches_new_lines_count: u64,
}

impl RepoStats {
    pub fn add(&mut self, o: &RepoStats) {
        self.shards += o.shards;
        self.documents += o.documents;
        self.content_bytes += o.content_bytes;
        self.index_bytes += o.index_bytes;
        self.new_lines_count += o.new_lines_count;
        self.default_branch_new_lines_count += o.default_branch_new_lines_count;
        self.other_branches_new_lines_count += o.other_branches_new_lines_count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoListEntry {
    pub repository: Repository,
    pub stats: RepoStats,
}

/// Cut-down listing entry for high-fanout callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinimalRepoListEntry {
    pub has_symbols: bool,
    pub branches: Vec<RepositoryBranch>,
}

#[derive(Debug, Clone, Default)]
pub struct RepoList {
    pub repos: Vec<RepoListEntry>,
    pub minimal: HashMap<u32, MinimalRepoListEntry>,
    pub stats: RepoStats,
}

const FLAG_TRUE: u8 = 0b01;
const FLAG_FALSE: u8 = 0b00;
const FLAG_UNSET: u8 = 0b10;

const RAW_CONFIG_FLAGS: [&str; 3] = ["public", "fork", "archived"];

/// Pack the well-known raw-config flags into one byte.
///
/// Each flag takes a 2-bit pair (`public` lowest) so that an absent key is
/// distinguishable from an explicit false: unset=10, true=01, false=00.
pub fn encode_raw_config(raw: &BTreeMap<String, String>) -> u8 {
    let mut out = 0u8;
    for (i, key) in RAW_CONFIG_FLAGS.iter().enumerate() {
        let pair = match raw.get(*key).map(String::as_str) {
            None => FLAG_UNSET,
            Some("1") | Some("true") => FLAG_TRUE,
            Some(_) => FLAG_FALSE,
        };
        out |= pair << (2 * i);
    }
    out
}

/// Inverse of [`encode_raw_config`]; unset pairs produce no entry.
pub fn decode_raw_config(enc: u8) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (i, key) in RAW_CONFIG_FLAGS.iter().enumerate() {
        match (enc >> (2 * i)) & 0b11 {
            FLAG_TRUE => out.insert(key.to_string(), "1".to_string()),
            FLAG_FALSE => out.insert(key.to_string(), "0".to_string()),
            _ => None,
        };
    }
    out
}
