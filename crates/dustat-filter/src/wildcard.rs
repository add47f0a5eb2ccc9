use regex::{Regex, RegexBuilder};

/// Translates a shell-style wildcard pattern (`*`, `?`, `[...]`) into an
/// anchored [`Regex`], the single translator both exclude rules and the
/// pattern/suffix ignore filter reuse (§4.5, §10.1).
pub fn wildcard_to_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!')) {
                    chars.next();
                    out.push('^');
                }
                for c2 in chars.by_ref() {
                    out.push(c2);
                    if c2 == ']' {
                        break;
                    }
                }
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    RegexBuilder::new(&out).case_insensitive(!case_sensitive).build()
}

/// Fast path for `*.ext` patterns where `ext` is alphanumeric (§4.5): a
/// plain `ends_with` comparator, cheaper than compiling a regex.
pub fn suffix_fast_path(pattern: &str) -> Option<&str> {
    let ext = pattern.strip_prefix("*.")?;
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let re = wildcard_to_regex("*.txt", true).unwrap();
        assert!(re.is_match("a.txt"));
        assert!(re.is_match("a/b.txt"));
        assert!(!re.is_match("a.txtx"));
    }

    #[test]
    fn case_insensitive_when_requested() {
        let re = wildcard_to_regex("*.TXT", false).unwrap();
        assert!(re.is_match("a.txt"));
    }

    #[test]
    fn suffix_fast_path_detects_simple_extension() {
        assert_eq!(suffix_fast_path("*.tmp"), Some("tmp"));
        assert_eq!(suffix_fast_path("*.tar.gz"), None);
        assert_eq!(suffix_fast_path("a*.tmp"), None);
    }
}
