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

use std::fmt::{self, Display};

/// Typed errors for building, reading and searching shards.
///
/// Messages are short and stable; callers key off the variant.
#[derive(Debug)]
pub enum Error {
    /// A document was rejected by the builder (encoding, size, NUL byte,
    /// bad symbol ranges, too many branches).
    InvalidInput(String),
    /// The shard bytes are inconsistent (TOC, checksum, unsorted ngrams).
    CorruptShard(String),
    /// The shard was written by a newer format or feature version.
    Unsupported(String),
    /// Byte-source errors, wrapped verbatim.
    Io(std::io::Error),
    /// Malformed regex or invalid query atom.
    Query(String),
    /// Cooperative cancellation observed before any work was done.
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(s) => write!(f, "invalid input: {}", s),
            Error::CorruptShard(s) => write!(f, "corrupt shard: {}", s),
            Error::Unsupported(s) => write!(f, "unsupported shard: {}", s),
            Error::Io(e) => write!(f, "io: {}", e),
            Error::Query(s) => write!(f, "query: {}", s),
            Error::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Query(e.to_string())
    }
}
