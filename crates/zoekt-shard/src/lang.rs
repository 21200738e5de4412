//! Built-in language alias map.
//!
//! Shards written before the language table existed (feature version < 2)
//! still answer `Language` queries through this extension-based fallback.

pub(crate) fn language_from_file_name(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.').map(|(_, e)| e)?;
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "go" => "go",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "java" => "java",
        "cs" => "csharp",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "sh" | "bash" => "shell",
        "md" => "markdown",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "json" => "json",
        _ => return None,
    };
    Some(lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(language_from_file_name("hello.h"), Some("c"));
        assert_eq!(language_from_file_name("a/b/lib.rs"), Some("rust"));
        assert_eq!(language_from_file_name("Weird.TOML"), Some("toml"));
    }

    #[test]
    fn unknown_or_missing_extension() {
        assert_eq!(language_from_file_name("Makefile"), None);
        assert_eq!(language_from_file_name("foo.zz"), None);
    }
}
