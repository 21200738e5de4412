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

//! Repository listing. A shard is included whole or excluded whole.

use super::eval::{resolve_shard_atoms, run_search};
use super::Searcher;
use crate::error::Result;
use crate::query::{simplify, Query};
use crate::types::{
    CancellationToken, ListOptions, MinimalRepoListEntry, RepoList, RepoListEntry, RepoStats,
    SearchOptions,
};

pub(crate) fn run_list(searcher: &Searcher, q: &Query, opts: &ListOptions) -> Result<RepoList> {
    let rdr = searcher.reader();
    let resolved = simplify(resolve_shard_atoms(simplify(q.clone()), rdr)?);
    let include = match &resolved {
        Query::Const(v) => *v,
        other => {
            // content-level queries include the shard only when something
            // actually matches
            let res = run_search(
                searcher,
                other,
                &SearchOptions::default(),
                &CancellationToken::new(),
            )?;
            !res.files.is_empty()
        }
    };

    let mut list = RepoList::default();
    if !include {
        return Ok(list);
    }

    let mut stats = RepoStats {
        shards: 1,
        documents: rdr.doc_count() as u64,
        content_bytes: rdr.content_bytes(),
        index_bytes: rdr.index_bytes(),
        ..RepoStats::default()
    };
    for d in 0..rdr.doc_count() {
        let n = rdr.newline_count(d)?;
        stats.new_lines_count += n;
        let mask = rdr.branch_mask(d);
        if mask & 1 != 0 {
            stats.default_branch_new_lines_count += n;
        }
        if mask & !1 != 0 {
            stats.other_branches_new_lines_count += n;
        }
    }

    let repo = rdr.repository().clone();
    if opts.minimal && repo.id != 0 {
        list.minimal.insert(
            repo.id,
            MinimalRepoListEntry {
                has_symbols: repo.has_symbols,
                branches: repo.branches.clone(),
            },
        );
    } else {
        // minimal listing falls back to the full entry when the repository
        // has no stable id to key on
        list.repos.push(RepoListEntry {
            repository: repo,
            stats: stats.clone(),
        });
    }
    list.stats = stats;
    Ok(list)
}
