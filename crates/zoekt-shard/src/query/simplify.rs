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

use super::Query;

/// Normalize a query: fold constants, flatten nested AND/OR, drop neutral
/// elements, cancel double negation.
pub fn simplify(q: Query) -> Query {
    match q {
        Query::And(children) => {
            let mut out = Vec::with_capacity(children.len());
            for c in children {
                match simplify(c) {
                    Query::Const(false) => return Query::Const(false),
                    Query::Const(true) => {}
                    Query::And(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Query::Const(true),
                1 => out.pop().unwrap(),
                _ => Query::And(out),
            }
        }
        Query::Or(children) => {
            let mut out = Vec::with_capacity(children.len());
            for c in children {
                match simplify(c) {
                    Query::Const(true) => return Query::Const(true),
                    Query::Const(false) => {}
                    Query::Or(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => Query::Const(false),
                1 => out.pop().unwrap(),
                _ => Query::Or(out),
            }
        }
        Query::Not(child) => match simplify(*child) {
            Query::Const(v) => Query::Const(!v),
            Query::Not(inner) => *inner,
            other => Query::Not(Box::new(other)),
        },
        // A symbol query needs a text atom to produce a range; a bare
        // constant can never intersect a section.
        Query::Symbol(child) => match simplify(*child) {
            Query::Const(_) => Query::Const(false),
            other => Query::Symbol(Box::new(other)),
        },
        Query::Type { kind, child } => match simplify(*child) {
            c @ Query::Const(_) => c,
            other => Query::Type { kind, child: Box::new(other) },
        },
        other => other,
    }
}
