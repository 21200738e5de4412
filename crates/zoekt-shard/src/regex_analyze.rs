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

//! Required-literal extraction from regex syntax.
//!
//! A required literal is a substring every match of the regex must contain.
//! The match engine turns these into substring atoms that gate regex
//! evaluation through the ngram index; a regex with no usable literals
//! falls back to scanning every candidate document.

use regex_syntax::hir::{Class, Hir, HirKind};
use std::collections::BTreeSet;

/// Boolean combination of required literal substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralSet {
    /// Every literal is required.
    Conj(Vec<String>),
    /// At least one branch's conjunction is required.
    Disj(Vec<Vec<String>>),
    /// No usable gating literals; the regex must scan its candidates.
    None,
}

const MIN_LITERAL_RUNES: usize = 3;

fn flush(cur: &mut String, out: &mut Vec<String>) {
    if cur.chars().count() >= MIN_LITERAL_RUNES {
        out.push(std::mem::take(cur));
    } else {
        cur.clear();
    }
}

fn singleton_char(class: &Class) -> Option<char> {
    match class {
        Class::Unicode(u) => {
            let mut it = u.iter();
            let r = it.next()?;
            if it.next().is_none() && r.start() == r.end() {
                Some(r.start())
            } else {
                None
            }
        }
        Class::Bytes(b) => {
            let mut it = b.iter();
            let r = it.next()?;
            if it.next().is_none() && r.start() == r.end() && r.start().is_ascii() {
                Some(r.start() as char)
            } else {
                None
            }
        }
    }
}

/// Walk a HIR node in concatenation order, extending the current literal
/// run and flushing completed runs into `out`.
fn walk(h: &Hir, cur: &mut String, out: &mut Vec<String>) {
    match h.kind() {
        // Zero-width nodes do not consume text; the run stays contiguous.
        HirKind::Empty | HirKind::Look(_) => {}
        HirKind::Literal(lit) => match std::str::from_utf8(&lit.0) {
            Ok(s) => cur.push_str(s),
            Err(_) => flush(cur, out),
        },
        HirKind::Class(class) => match singleton_char(class) {
            Some(c) => cur.push(c),
            None => flush(cur, out),
        },
        HirKind::Concat(children) => {
            for c in children {
                walk(c, cur, out);
            }
        }
        HirKind::Capture(cap) => walk(&cap.sub, cur, out),
        HirKind::Repetition(rep) => {
            flush(cur, out);
            if rep.min >= 1 {
                let mut inner = String::new();
                walk(&rep.sub, &mut inner, out);
                flush(&mut inner, out);
            }
        }
        HirKind::Alternation(branches) => {
            flush(cur, out);
            // Only literals required by every branch survive.
            let mut common: Option<BTreeSet<String>> = None;
            for b in branches {
                let set: BTreeSet<String> = branch_literals(b).into_iter().collect();
                common = Some(match common {
                    None => set,
                    Some(prev) => prev.intersection(&set).cloned().collect(),
                });
            }
            out.extend(common.unwrap_or_default());
        }
    }
}

fn branch_literals(h: &Hir) -> Vec<String> {
    let mut cur = String::new();
    let mut out = Vec::new();
    walk(h, &mut cur, &mut out);
    flush(&mut cur, &mut out);
    out.sort();
    out.dedup();
    out
}

/// Extract the required-literal combination for `pattern`.
///
/// Unparseable patterns yield `LiteralSet::None`; the caller surfaces the
/// parse error when it compiles the regex for evaluation.
pub fn required_literals(pattern: &str) -> LiteralSet {
    let hir = match regex_syntax::Parser::new().parse(pattern) {
        Ok(h) => h,
        Err(_) => return LiteralSet::None,
    };

    if let HirKind::Alternation(branches) = hir.kind() {
        let mut disj = Vec::with_capacity(branches.len());
        for b in branches {
            let lits = branch_literals(b);
            if lits.is_empty() {
                // An ungated branch makes the whole disjunction useless.
                return LiteralSet::None;
            }
            disj.push(lits);
        }
        return LiteralSet::Disj(disj);
    }

    let lits = branch_literals(&hir);
    if lits.is_empty() {
        LiteralSet::None
    } else {
        LiteralSet::Conj(lits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_literal() {
        assert_eq!(
            required_literals("fooBar"),
            LiteralSet::Conj(vec!["fooBar".into()])
        );
    }

    #[test]
    fn literals_around_gaps() {
        assert_eq!(
            required_literals("dle.*bla"),
            LiteralSet::Conj(vec!["bla".into(), "dle".into()])
        );
        assert_eq!(
            required_literals("final[,.]"),
            LiteralSet::Conj(vec!["final".into()])
        );
    }

    #[test]
    fn anchors_do_not_break_runs() {
        assert_eq!(
            required_literals("^package"),
            LiteralSet::Conj(vec!["package".into()])
        );
        assert_eq!(
            required_literals(r"\bint\b"),
            LiteralSet::Conj(vec!["int".into()])
        );
    }

    #[test]
    fn top_level_alternation() {
        assert_eq!(
            required_literals("apple|banana"),
            LiteralSet::Disj(vec![vec!["apple".into()], vec!["banana".into()]])
        );
        // one branch without literals poisons the disjunction
        assert_eq!(required_literals("apple|a.b"), LiteralSet::None);
    }

    #[test]
    fn nested_alternation_intersects() {
        // the branches share no exact literal, the surrounding runs remain
        assert_eq!(
            required_literals("pre(apple|orange)post"),
            LiteralSet::Conj(vec!["post".into(), "pre".into()])
        );
        // a run required by every branch survives the intersection
        assert_eq!(
            required_literals("x(foo.one|two.foo)y"),
            LiteralSet::Conj(vec!["foo".into()])
        );
    }

    #[test]
    fn required_repetition_contributes() {
        match required_literals("(foo){2}bar") {
            LiteralSet::Conj(v) => {
                assert!(v.contains(&"foo".to_string()));
                assert!(v.contains(&"bar".to_string()));
            }
            other => panic!("got {:?}", other),
        }
    }

    #[test]
    fn meta_only_patterns_have_no_literals() {
        assert_eq!(required_literals(r"\w+\d*"), LiteralSet::None);
        assert_eq!(required_literals("a.b"), LiteralSet::None);
        assert_eq!(required_literals("[^a]a"), LiteralSet::None);
        assert_eq!(required_literals("(b|d)c(d|b)"), LiteralSet::None);
    }

    #[test]
    fn optional_groups_are_skipped() {
        // "ab?c" requires neither "abc" nor "ac" specifically
        assert_eq!(required_literals("neeedle(xy)?"), LiteralSet::Conj(vec!["neeedle".into()]));
    }
}
