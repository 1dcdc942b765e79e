//! Line and token helpers shared by the platform parsers.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static BLOCK_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\*+[ \t]*$").unwrap());

/// Captured output as text. Invalid UTF-8 is replaced rather than rejected.
pub(crate) fn stringify(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Turn `\r\n` (and the `\r\r\n` wmic emits) into `\n`.
pub(crate) fn normalize_eol(s: &str) -> Cow<'_, str> {
    if s.contains('\r') {
        Cow::Owned(s.replace("\r\r", "\r").replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(s)
    }
}

pub(crate) fn split_eol(s: &str) -> impl Iterator<Item = &str> {
    s.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Split on `n` consecutive line endings. Expects normalized input.
pub(crate) fn split_eol_n(s: &str, n: usize) -> Vec<&str> {
    s.split("\n".repeat(n).as_str()).collect()
}

/// Split on lines made only of `*`. Blank blocks are kept so positional sections survive.
pub(crate) fn split_blocks(s: &str) -> Vec<&str> {
    BLOCK_SEPARATOR.split(s).collect()
}

pub(crate) fn non_empty_lines(s: &str) -> impl Iterator<Item = &str> {
    split_eol(s).filter(|line| !line.trim().is_empty())
}

pub(crate) fn has_substr(s: &str, sub: &str) -> bool {
    s.contains(sub)
}

/// `Yes` / `No` as reported by diskutil.
pub(crate) fn yes_no(v: &str) -> Option<bool> {
    match v {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

/// `1` / `0` flags as reported by lsblk.
pub(crate) fn flag(v: &str) -> bool {
    v.trim().parse::<u64>().is_ok_and(|x| x != 0)
}

/// Last path segment of a device node: `/dev/sda1` is `sda1`.
pub(crate) fn node_id(node: &str) -> &str {
    node.split('/')
        .filter(|s| !s.trim().is_empty())
        .next_back()
        .unwrap_or(node)
}

/// First run of digits in `s`, e.g. `512` for `512 Bytes`.
pub(crate) fn leading_int(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits = &s[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

pub(crate) fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eol_splitting() {
        let lines: Vec<_> = split_eol("a\r\nb\nc").collect();
        assert_eq!(lines, ["a", "b", "c"]);

        let blocks = split_eol_n("a\na\n\nb\nb\n\nc", 2);
        assert_eq!(blocks, ["a\na", "b\nb", "c"]);

        assert_eq!(normalize_eol("a\r\r\nb\r\n"), "a\nb\n");
    }

    #[test]
    fn asterisk_blocks() {
        let blocks = split_blocks("one\n\n**********\n\ntwo\n**********\n");
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].contains("one"));
        assert!(blocks[1].contains("two"));
        assert!(blocks[2].trim().is_empty());

        let blocks = split_blocks("df\n\n**********\n\n\n**********\n\nlsblk");
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].trim().is_empty());
    }

    #[test]
    fn coercions() {
        assert_eq!(yes_no("Yes"), Some(true));
        assert_eq!(yes_no("No"), Some(false));
        assert_eq!(yes_no("foo"), None);
        assert!(flag("1"));
        assert!(!flag("0"));
        assert!(!flag(""));
        assert!(has_substr("Not applicable (no file system)", "Not applicable"));
    }

    #[test]
    fn tokens() {
        assert_eq!(node_id("/dev/sda1"), "sda1");
        assert_eq!(node_id("/dev/mapper/vg-root"), "vg-root");
        assert_eq!(node_id("udev"), "udev");
        assert_eq!(leading_int("512 Bytes"), Some(512));
        assert_eq!(leading_int("Bytes"), None);
        assert_eq!(non_empty("  "), None);
        assert_eq!(stringify(b"sda\xff"), "sda\u{fffd}");
    }
}
