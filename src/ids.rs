use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CardError;

pub const DEFAULT_ID_PREFIX: &str = "BC";

/// Card instance id allocator.
///
/// Ids are `prefix` followed by a base-36 sequence number, so they are unique
/// per allocator and safe to use unescaped in DOM ids and CSS selectors.
/// An allocator may be shared across threads. A build gives every page its
/// own [`CardIds::scoped`] allocator.
#[derive(Debug)]
pub struct CardIds {
    prefix: String,
    next: AtomicU64,
}

impl CardIds {
    pub fn new(prefix: &str) -> Result<Self, CardError> {
        if !is_valid_prefix(prefix) {
            return Err(CardError::InvalidIdPrefix(prefix.to_owned()));
        }
        Ok(CardIds {
            prefix: prefix.to_owned(),
            next: AtomicU64::new(0),
        })
    }

    /// Allocate the next instance id.
    pub fn allocate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, to_base36(n))
    }

    /// An allocator for one page of a build, `{prefix}{page}_{n}`.
    ///
    /// Ids of different pages never collide, and the ids of a page only
    /// depend on its position in the build, not on rendering order.
    pub fn scoped(&self, page: usize) -> CardIds {
        CardIds {
            prefix: format!("{}{}_", self.prefix, to_base36(page as u64)),
            next: AtomicU64::new(0),
        }
    }

    /// How many ids have been allocated so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for CardIds {
    fn default() -> Self {
        CardIds {
            prefix: DEFAULT_ID_PREFIX.to_owned(),
            next: AtomicU64::new(0),
        }
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = Vec::new();
    loop {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use rayon::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test_case("BC"; "default")]
    #[test_case("b"; "single letter")]
    #[test_case("card2"; "trailing digit")]
    fn test_valid_prefix(prefix: &str) {
        assert_eq!(CardIds::new(prefix).unwrap().allocate(), format!("{prefix}0"));
    }

    #[test_case(""; "empty")]
    #[test_case("1BC"; "leading digit")]
    #[test_case("B-C"; "dash")]
    #[test_case("B C"; "space")]
    #[test_case("卡片"; "non ascii")]
    fn test_invalid_prefix(prefix: &str) {
        assert!(matches!(
            CardIds::new(prefix),
            Err(CardError::InvalidIdPrefix(p)) if p == prefix
        ));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = CardIds::default();
        let allocated = (0..38).map(|_| ids.allocate()).collect::<Vec<_>>();
        assert_eq!(allocated[0], "BC0");
        assert_eq!(allocated[10], "BCa");
        assert_eq!(allocated[35], "BCz");
        assert_eq!(allocated[36], "BC10");
        assert_eq!(allocated[37], "BC11");
        assert_eq!(ids.allocated(), 38);
    }

    #[test]
    fn test_scoped_ids() {
        let ids = CardIds::default();
        let first = ids.scoped(0);
        let tenth = ids.scoped(10);
        assert_eq!(first.allocate(), "BC0_0");
        assert_eq!(first.allocate(), "BC0_1");
        assert_eq!(tenth.allocate(), "BCa_0");
        assert_eq!(first.allocated(), 2);
        assert_eq!(ids.allocated(), 0);

        // The `_` separator keeps page and sequence apart.
        let page_1 = ids.scoped(1);
        let allocated = (0..37).map(|_| page_1.allocate()).collect::<Vec<_>>();
        assert_eq!(allocated[36], "BC1_10");
        assert_eq!(ids.scoped(37).allocate(), "BC11_0");
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(CardIds::default());
        let allocated = (0..10_000)
            .into_par_iter()
            .map(|_| ids.allocate())
            .collect::<HashSet<_>>();
        assert_eq!(allocated.len(), 10_000);
    }
}
