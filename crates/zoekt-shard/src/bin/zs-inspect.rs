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

//! Dump shard metadata for debugging: repository, versions, per-document
//! names, languages and branch masks.

use anyhow::{Context, Result};
use zoekt_shard::{MmapFile, ShardReader};

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: zs-inspect <shard>")?;
    let src = MmapFile::open(&path).with_context(|| format!("open {}", path))?;
    let rdr = ShardReader::open(src).with_context(|| format!("parse {}", path))?;

    let meta = rdr.metadata();
    let repo = rdr.repository();
    println!(
        "shard {} format={} feature={}",
        path, meta.format_version, meta.feature_version
    );
    println!(
        "repo {:?} id={} branches={:?} raw_config_bits={:#08b}",
        repo.name,
        repo.id,
        repo.branches.iter().map(|b| &b.name).collect::<Vec<_>>(),
        rdr.raw_config_bits()
    );
    println!(
        "docs={} content_bytes={} index_bytes={}",
        rdr.doc_count(),
        rdr.content_bytes(),
        rdr.index_bytes()
    );
    for d in 0..rdr.doc_count() {
        println!(
            "  {:>4} {} lang={:?} mask={:#b} symbols={}",
            d,
            rdr.read_name(d)?,
            rdr.language_name(d)?,
            rdr.branch_mask(d),
            rdr.has_symbols(d),
        );
    }
    rdr.verify_checksum().context("checksum")?;
    println!("checksum ok");
    Ok(())
}
