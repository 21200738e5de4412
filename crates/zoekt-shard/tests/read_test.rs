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

mod common;

use common::{doc, searcher_for};
use std::io::Write;
use zoekt_shard::ngram::ngram;
use zoekt_shard::{
    read_metadata, Document, IndexBuilder, ListOptions, MemFile, MmapFile, Query, Repository,
    RepositoryBranch, SearchOptions, Searcher, ShardReader,
};

fn shard_for(repo: Option<Repository>, docs: &[Document]) -> Vec<u8> {
    let mut b = IndexBuilder::new(repo).unwrap();
    for d in docs {
        b.add(d.clone()).unwrap();
    }
    let mut buf = Vec::new();
    b.write(&mut buf).unwrap();
    buf
}

#[test]
fn read_write_content() {
    let buf = shard_for(None, &[doc("filename", b"abcde")]);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();

    assert_eq!(rdr.doc_count(), 1);
    assert_eq!(rdr.read_content(0).unwrap(), b"abcde".to_vec());
    assert_eq!(rdr.read_name(0).unwrap(), "filename");
    // "abcde" has the trigrams abc, bcd, cde
    assert_eq!(rdr.content_ngram_count(), 3);
    assert!(rdr.content_ngram_frequency(ngram('a', 'b', 'c')).is_some());
    assert_eq!(rdr.content_ngram_frequency(ngram('b', 'c', 'q')), None);
}

#[test]
fn read_write_names() {
    let buf = shard_for(None, &[doc("abCd", b"")]);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();

    assert_eq!(rdr.read_name(0).unwrap(), "abCd");
    // name trigrams are case folded
    assert!(rdr.name_ngram_frequency(ngram('b', 'c', 'd')).is_some());
    assert!(rdr.name_ngram_frequency(ngram('b', 'C', 'd')).is_some());
    // the original case survives in the name case bits (byte 2 = 'C')
    assert_eq!(rdr.read_name_case_bits(0).unwrap(), vec![0b0000_0100]);
}

#[test]
fn roundtrip_through_a_file() {
    let buf = shard_for(
        Some(Repository { name: "repo".into(), ..Repository::default() }),
        &[
            doc("f1", b"to carry water in the no later bla"),
            doc("f2", b"abc\ndef\n"),
        ],
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repo.zoekt");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(&buf).unwrap();
    drop(f);

    let mem = Searcher::new(ShardReader::open(MemFile::new("m", buf)).unwrap());
    let mapped = Searcher::new(ShardReader::open(MmapFile::open(&path).unwrap()).unwrap());

    let q = Query::substring("water");
    let a = mem.search(&q, &SearchOptions::default()).unwrap();
    let b = mapped.search(&q, &SearchOptions::default()).unwrap();
    assert_eq!(a.files, b.files);
    assert_eq!(a.files.len(), 1);

    mapped.reader().verify_checksum().unwrap();
}

#[test]
fn newline_and_symbol_tables_roundtrip() {
    let mut d = doc("f1", b"one\ntwo\nthree\n");
    d.symbols = vec![
        zoekt_shard::DocumentSection::new(0, 3),
        zoekt_shard::DocumentSection::new(4, 7),
    ];
    let buf = shard_for(None, &[d]);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();

    assert_eq!(rdr.read_newlines(0).unwrap(), vec![3, 7, 13]);
    assert_eq!(
        rdr.read_symbols(0).unwrap(),
        vec![
            zoekt_shard::DocumentSection::new(0, 3),
            zoekt_shard::DocumentSection::new(4, 7),
        ]
    );
    assert!(rdr.has_symbols(0));
    assert_eq!(rdr.newline_count(0).unwrap(), 3);
}

#[test]
fn branch_masks_roundtrip() {
    let repo = Repository {
        branches: vec![
            RepositoryBranch::new("main", "v1"),
            RepositoryBranch::new("dev", "v2"),
        ],
        ..Repository::default()
    };
    let docs = vec![
        Document { branches: vec!["main".into()], ..doc("f1", b"needle one") },
        Document { branches: vec!["main".into(), "dev".into()], ..doc("f2", b"needle two") },
    ];
    let buf = shard_for(Some(repo), &docs);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();
    assert_eq!(rdr.branch_mask(0), 0b01);
    assert_eq!(rdr.branch_mask(1), 0b11);
}

#[test]
fn metadata_without_index_data() {
    let repo = Repository {
        id: 77,
        name: "reponame".into(),
        ..Repository::default()
    };
    let buf = shard_for(
        Some(repo),
        &[doc("f1", b"bla the needle"), doc("f2", b"bla the needle")],
    );
    let f = MemFile::new("t", buf);
    let (got, meta) = read_metadata(&f).unwrap();
    assert_eq!(got.name, "reponame");
    assert_eq!(got.id, 77);
    assert!(meta.format_version >= 1);
}

#[test]
fn bloom_filter_skips_shard() {
    let docs = [doc("f1", b"reader derre errea")];
    let buf = shard_for(None, &docs);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();
    let s = Searcher::with_bloom_disabled(rdr, false);

    // "qqqx" has trigrams the shard's blooms cannot contain
    let q = Query::substring("qqqx");
    let res = s.search(&q, &SearchOptions::default()).unwrap();
    assert!(res.files.is_empty());
    assert_eq!(res.stats.shards_skipped_filter, 1);

    // with the filter disabled the ngram index answers instead
    let buf = shard_for(None, &docs);
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();
    let s = Searcher::with_bloom_disabled(rdr, true);
    let res = s.search(&q, &SearchOptions::default()).unwrap();
    assert!(res.files.is_empty());
    assert_eq!(res.stats.shards_skipped_filter, 0);
}

#[test]
fn bloom_skips_never_hide_matches() {
    // every indexed literal must survive the bloom gate
    let contents = ["to carry water", "func unmarshalGitiles", "x banana y"];
    let docs: Vec<Document> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| doc(&format!("f{}", i), c.as_bytes()))
        .collect();
    let s = searcher_for(None, &docs);
    for needle in ["water", "carry", "unmarshal", "banana", "Gitiles"] {
        let res = s
            .search(&Query::substring(needle), &SearchOptions::default())
            .unwrap();
        assert_eq!(res.stats.shards_skipped_filter, 0, "{}", needle);
        assert_eq!(res.files.len(), 1, "{}", needle);
    }
}

#[test]
fn list_repositories() {
    let content = b"bla the needle\n";
    let repo = Repository {
        name: "reponame".into(),
        branches: vec![
            RepositoryBranch::new("main", ""),
            RepositoryBranch::new("dev", ""),
        ],
        ..Repository::default()
    };
    let docs = vec![
        Document { branches: vec!["main".into(), "dev".into()], ..doc("f1", content) },
        Document { branches: vec!["main".into()], ..doc("f2", content) },
        Document { branches: vec!["dev".into()], ..doc("f2", content) },
        Document { branches: vec!["dev".into()], ..doc("f3", content) },
    ];
    let s = searcher_for(Some(repo), &docs);

    let q = Query::Repo { regex: "epo".into() };
    let res = s.list(&q, &ListOptions::default()).unwrap();
    assert_eq!(res.repos.len(), 1);
    let entry = &res.repos[0];
    assert_eq!(entry.repository.name, "reponame");
    assert_eq!(entry.stats.documents, 4);
    assert_eq!(entry.stats.shards, 1);
    assert_eq!(entry.stats.content_bytes, 60 + 8);
    assert_eq!(entry.stats.new_lines_count, 4);
    assert_eq!(entry.stats.default_branch_new_lines_count, 2);
    assert_eq!(entry.stats.other_branches_new_lines_count, 3);

    // a repo with no id keeps the full entry even under minimal listing
    let res = s.list(&q, &ListOptions { minimal: true }).unwrap();
    assert_eq!(res.repos.len(), 1);
    assert!(res.minimal.is_empty());

    let res = s
        .list(&Query::Repo { regex: "bla".into() }, &ListOptions::default())
        .unwrap();
    assert!(res.repos.is_empty());
    assert!(res.minimal.is_empty());
}

#[test]
fn minimal_listing_keyed_by_repo_id() {
    let repo = Repository {
        id: 1234,
        name: "reponame".into(),
        branches: vec![
            RepositoryBranch::new("main", ""),
            RepositoryBranch::new("dev", ""),
        ],
        ..Repository::default()
    };
    let s = searcher_for(Some(repo), &[doc("f1", b"bla the needle\n")]);

    let res = s
        .list(&Query::Repo { regex: "epo".into() }, &ListOptions { minimal: true })
        .unwrap();
    assert!(res.repos.is_empty());
    let entry = res.minimal.get(&1234).expect("minimal entry");
    assert!(!entry.has_symbols);
    assert_eq!(entry.branches.len(), 2);
    assert_eq!(res.stats.documents, 1);
}

#[test]
fn list_by_content_query() {
    let content = b"bla the needle";
    let repo = Repository { name: "reponame".into(), ..Repository::default() };
    let s = searcher_for(Some(repo), &[doc("f1", content), doc("f2", content)]);

    let res = s
        .list(&Query::substring("needle"), &ListOptions::default())
        .unwrap();
    assert_eq!(res.repos.len(), 1);
    assert_eq!(res.repos[0].stats.shards, 1);

    let res = s
        .list(&Query::substring("foo"), &ListOptions::default())
        .unwrap();
    assert!(res.repos.is_empty());
}

#[test]
fn has_symbols_recorded_in_metadata() {
    let mut d = doc("f1", b"func bla() blub");
    d.symbols = vec![zoekt_shard::DocumentSection::new(5, 8)];
    let buf = shard_for(
        Some(Repository { id: 9, name: "r".into(), ..Repository::default() }),
        &[d],
    );
    let rdr = ShardReader::open(MemFile::new("t", buf)).unwrap();
    assert!(rdr.repository().has_symbols);

    let s = Searcher::new(rdr);
    let res = s
        .list(&Query::Repo { regex: "r".into() }, &ListOptions { minimal: true })
        .unwrap();
    assert!(res.minimal.get(&9).unwrap().has_symbols);
}

#[test]
fn disable_bloom_env_is_read_at_construction() {
    let docs = [doc("f1", b"reader derre errea")];
    let buf = shard_for(None, &docs);

    std::env::set_var(zoekt_shard::search::DISABLE_BLOOM_ENV, "1");
    let s = Searcher::new(ShardReader::open(MemFile::new("t", buf)).unwrap());
    std::env::remove_var(zoekt_shard::search::DISABLE_BLOOM_ENV);

    let res = s
        .search(&Query::substring("qqqx"), &SearchOptions::default())
        .unwrap();
    assert_eq!(res.stats.shards_skipped_filter, 0);
}
