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

use std::fmt;

/// Result-shaping query wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Report the child's matches as file-name results without line bodies.
    FileName,
}

/// Compositional query tree.
///
/// `Substring` and `Regexp` atoms with neither `file_name` nor `content`
/// set match either stream; the compiler expands them into an OR of the two
/// scoped variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    Const(bool),
    Substring {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    Regexp {
        pattern: String,
        case_sensitive: bool,
        file_name: bool,
        content: bool,
    },
    /// Constrain the child's matches to document symbol sections.
    Symbol(Box<Query>),
    /// Branch name contains `pattern`.
    Branch { pattern: String },
    /// Repository name matches the regex.
    Repo { regex: String },
    /// Document language equals `language` (case-insensitive).
    Language { language: String },
    Type { kind: TypeKind, child: Box<Query> },
}

impl Query {
    pub fn and(children: impl IntoIterator<Item = Query>) -> Query {
        Query::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = Query>) -> Query {
        Query::Or(children.into_iter().collect())
    }

    pub fn not(child: Query) -> Query {
        Query::Not(Box::new(child))
    }

    /// Case-insensitive substring over both file names and content.
    pub fn substring(pattern: impl Into<String>) -> Query {
        Query::Substring {
            pattern: pattern.into(),
            case_sensitive: false,
            file_name: false,
            content: false,
        }
    }

    /// Case-insensitive regexp over both file names and content.
    pub fn regexp(pattern: impl Into<String>) -> Query {
        Query::Regexp {
            pattern: pattern.into(),
            case_sensitive: false,
            file_name: false,
            content: false,
        }
    }

    pub fn symbol(child: Query) -> Query {
        Query::Symbol(Box::new(child))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn scope(file_name: bool, content: bool) -> &'static str {
            match (file_name, content) {
                (true, false) => " file",
                (false, true) => " content",
                _ => "",
            }
        }
        match self {
            Query::And(cs) => {
                write!(f, "(and")?;
                for c in cs {
                    write!(f, " {}", c)?;
                }
                write!(f, ")")
            }
            Query::Or(cs) => {
                write!(f, "(or")?;
                for c in cs {
                    write!(f, " {}", c)?;
                }
                write!(f, ")")
            }
            Query::Not(c) => write!(f, "(not {})", c),
            Query::Const(v) => write!(f, "{}", v),
            Query::Substring { pattern, case_sensitive, file_name, content } => {
                write!(
                    f,
                    "(substr{}{} {:?})",
                    if *case_sensitive { " cs" } else { "" },
                    scope(*file_name, *content),
                    pattern
                )
            }
            Query::Regexp { pattern, case_sensitive, file_name, content } => {
                write!(
                    f,
                    "(regex{}{} {:?})",
                    if *case_sensitive { " cs" } else { "" },
                    scope(*file_name, *content),
                    pattern
                )
            }
            Query::Symbol(c) => write!(f, "(sym {})", c),
            Query::Branch { pattern } => write!(f, "(branch {:?})", pattern),
            Query::Repo { regex } => write!(f, "(repo {:?})", regex),
            Query::Language { language } => write!(f, "(lang {:?})", language),
            Query::Type { kind: TypeKind::FileName, child } => {
                write!(f, "(type:filename {})", child)
            }
        }
    }
}
