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

//! Immutable trigram index shards and the search core over them.
//!
//! A [`IndexBuilder`] ingests documents and serializes one write-once
//! shard; a [`ShardReader`] opens it over an abstract byte source; a
//! [`Searcher`] compiles [`Query`] trees and evaluates them against the
//! shard's posting lists, content, and metadata.

pub mod bloom;
pub mod error;
pub mod index;
mod lang;
pub mod ngram;
pub mod query;
pub mod regex_analyze;
pub mod search;
pub mod shard;
pub mod types;
mod varint;

pub use crate::error::{Error, Result};
pub use crate::index::{check_text, IndexBuilder};
pub use crate::query::{Query, TypeKind};
pub use crate::search::Searcher;
pub use crate::shard::{read_metadata, IndexFile, IndexMetadata, MemFile, MmapFile, ShardReader};
pub use crate::types::{
    CancellationToken, Document, DocumentSection, FileMatch, LineFragmentMatch, LineMatch,
    ListOptions, RepoList, Repository, RepositoryBranch, SearchOptions, SearchResult, Stats,
};

/// Build a shard in memory and open a searcher over it in one step.
pub fn searcher_for_documents(
    repo: Option<Repository>,
    docs: impl IntoIterator<Item = Document>,
) -> Result<Searcher> {
    let mut b = IndexBuilder::new(repo)?;
    for d in docs {
        b.add(d)?;
    }
    let mut buf = Vec::new();
    b.write(&mut buf)?;
    let rdr = ShardReader::open(MemFile::new("mem-shard", buf))?;
    Ok(Searcher::new(rdr))
}
