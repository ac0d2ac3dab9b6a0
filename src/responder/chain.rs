//! Request target grammar for the redirect chain.
//!
//! ```text
//! target := "/" prefix "-" digits [ "/" rest ]
//! ```
//!
//! The prefix matches ASCII case-insensitively. `digits` is one or more
//! decimal digits (leading zeros allowed) that must fit a `u32`. Anything
//! after the digits must start with `/` and is carried verbatim from hop to
//! hop, including a lone trailing `/`.

/// A parsed `/<prefix>-<index>(/<rest>)?` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTarget<'a> {
    pub index: u32,
    /// Suffix after the digits, empty or starting with `/`.
    pub rest: &'a str,
}

impl<'a> ChainTarget<'a> {
    /// Parse `path` against `prefix`. Returns `None` when it does not match.
    pub fn parse(path: &'a str, prefix: &str) -> Option<Self> {
        let tail = path.strip_prefix('/')?;
        let head = tail.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }

        let tail = tail[prefix.len()..].strip_prefix('-')?;
        let digits_end = tail
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(tail.len());
        if digits_end == 0 {
            return None;
        }

        let (digits, rest) = tail.split_at(digits_end);
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }

        Some(Self {
            index: digits.parse().ok()?,
            rest,
        })
    }

    /// True when this hop accepts the upgrade.
    pub fn is_terminal(&self) -> bool {
        self.index == 0
    }

    /// The next hop down the chain, or `None` at index 0.
    pub fn descend(&self) -> Option<Self> {
        Some(Self {
            index: self.index.checked_sub(1)?,
            rest: self.rest,
        })
    }

    /// Render back into a path using `prefix`.
    pub fn to_path(&self, prefix: &str) -> String {
        format!("/{}-{}{}", prefix, self.index, self.rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str) -> Option<ChainTarget<'_>> {
        ChainTarget::parse(path, "websocket")
    }

    #[test]
    fn plain_index() {
        let target = parse("/websocket-5").unwrap();
        assert_eq!(target.index, 5);
        assert_eq!(target.rest, "");
        assert!(!target.is_terminal());
    }

    #[test]
    fn suffix_is_preserved_across_descent() {
        let target = parse("/websocket-2/room/7").unwrap();
        let next = target.descend().unwrap();
        assert_eq!(next.to_path("websocket"), "/websocket-1/room/7");
    }

    #[test]
    fn trailing_slash_is_kept() {
        let target = parse("/websocket-1/").unwrap();
        assert_eq!(target.rest, "/");
        assert_eq!(target.descend().unwrap().to_path("websocket"), "/websocket-0/");
    }

    #[test]
    fn leading_zeros_are_accepted() {
        let target = parse("/websocket-007").unwrap();
        assert_eq!(target.index, 7);
        assert_eq!(target.to_path("websocket"), "/websocket-7");
    }

    #[test]
    fn prefix_is_case_insensitive() {
        assert_eq!(parse("/WebSocket-3").map(|t| t.index), Some(3));
    }

    #[test]
    fn terminal_index_does_not_descend() {
        let target = parse("/websocket-0").unwrap();
        assert!(target.is_terminal());
        assert_eq!(target.descend(), None);
    }

    #[test]
    fn non_matching_targets() {
        for path in [
            "",
            "/",
            "websocket-1",
            "/websocket",
            "/websocket-",
            "/websocket-x",
            "/websocket-1x",
            "/websocket-1?x",
            "/websockets-1",
            "/givemeawebsocket/",
            "/websocket-99999999999",
            "/wé",
        ] {
            assert_eq!(parse(path), None, "{path:?}");
        }
    }
}
