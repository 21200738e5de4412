#![allow(dead_code)]

use zoekt_shard::{
    Document, IndexBuilder, MemFile, Query, Repository, SearchOptions, SearchResult, Searcher,
    ShardReader,
};

pub fn doc(name: &str, content: &[u8]) -> Document {
    Document {
        name: name.to_string(),
        content: content.to_vec(),
        ..Document::default()
    }
}

pub fn builder_for(repo: Option<Repository>, docs: &[Document]) -> IndexBuilder {
    let mut b = IndexBuilder::new(repo).expect("new builder");
    for (i, d) in docs.iter().enumerate() {
        b.add(d.clone()).unwrap_or_else(|e| panic!("add {}: {}", i, e));
    }
    b
}

pub fn searcher_for(repo: Option<Repository>, docs: &[Document]) -> Searcher {
    let b = builder_for(repo, docs);
    let mut buf = Vec::new();
    b.write(&mut buf).expect("write shard");
    let rdr = ShardReader::open(MemFile::new("testshard", buf)).expect("open shard");
    Searcher::new(rdr)
}

pub fn search_for(repo: Option<Repository>, docs: &[Document], q: &Query) -> SearchResult {
    search_opts(repo, docs, q, &SearchOptions::default())
}

pub fn search_opts(
    repo: Option<Repository>,
    docs: &[Document],
    q: &Query,
    opts: &SearchOptions,
) -> SearchResult {
    let s = searcher_for(repo, docs);
    let mut res = s.search(q, opts).unwrap_or_else(|e| panic!("search {}: {}", q, e));
    clear_scores(&mut res);
    res
}

pub fn clear_scores(res: &mut SearchResult) {
    for f in &mut res.files {
        f.score = 0.0;
        for l in &mut f.line_matches {
            l.score = 0.0;
        }
    }
}
