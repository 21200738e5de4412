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

//! Shard searching: query execution and repository listing.

mod candidates;
mod eval;
mod list;

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::Result;
use crate::query::Query;
use crate::shard::ShardReader;
use crate::types::{CancellationToken, ListOptions, RepoList, SearchOptions, SearchResult};

/// Environment variable disabling bloom-filter shard skipping.
pub const DISABLE_BLOOM_ENV: &str = "ZOEKT_DISABLE_BLOOM";

const CONTENT_CACHE_DOCS: usize = 256;

/// Executes queries against one shard.
///
/// Read-only and re-entrant: the per-document content cache is the only
/// shared state and sits behind its own lock.
pub struct Searcher {
    rdr: ShardReader,
    disable_bloom: bool,
    content_cache: Mutex<LruCache<u32, Arc<Vec<u8>>>>,
}

impl Searcher {
    /// The bloom switch is read from the environment here, at the
    /// boundary, and never again.
    pub fn new(rdr: ShardReader) -> Searcher {
        let disable_bloom =
            std::env::var_os(DISABLE_BLOOM_ENV).is_some_and(|v| !v.is_empty());
        Searcher::with_bloom_disabled(rdr, disable_bloom)
    }

    pub fn with_bloom_disabled(rdr: ShardReader, disable_bloom: bool) -> Searcher {
        Searcher {
            rdr,
            disable_bloom,
            content_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CONTENT_CACHE_DOCS).unwrap(),
            )),
        }
    }

    pub fn reader(&self) -> &ShardReader {
        &self.rdr
    }

    pub(crate) fn bloom_disabled(&self) -> bool {
        self.disable_bloom
    }

    pub(crate) fn cached_content(&self, doc: u32) -> Result<Arc<Vec<u8>>> {
        if let Some(data) = self.content_cache.lock().get(&doc) {
            return Ok(data.clone());
        }
        let data = Arc::new(self.rdr.read_content(doc)?);
        self.content_cache.lock().put(doc, data.clone());
        Ok(data)
    }

    pub fn search(&self, q: &Query, opts: &SearchOptions) -> Result<SearchResult> {
        eval::run_search(self, q, opts, &CancellationToken::new())
    }

    /// Like [`Searcher::search`], stopping between documents once `token`
    /// is cancelled. Collected results are returned with the `cancelled`
    /// flag set.
    pub fn search_with_cancel(
        &self,
        q: &Query,
        opts: &SearchOptions,
        token: &CancellationToken,
    ) -> Result<SearchResult> {
        eval::run_search(self, q, opts, token)
    }

    pub fn list(&self, q: &Query, opts: &ListOptions) -> Result<RepoList> {
        list::run_list(self, q, opts)
    }
}
