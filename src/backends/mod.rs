//! Cache Backends
//!
//! Concrete [`CacheBackend`](crate::domain::CacheBackend) implementations:
//!
//! - [`LocalBackend`] - in-process fallback with watermark eviction
//! - [`MemcachedBackend`] - Memcached text protocol over TCP
//! - `RedisBackend` - Redis via a managed multiplexed connection (feature `redis`)

pub mod local;
pub mod memcached;
pub mod policy;
#[cfg(feature = "redis")]
pub mod redis;
pub mod shard;

pub use local::{LocalBackend, LocalConfig};
pub use memcached::{MemcachedBackend, MemcachedConfig};
pub use policy::EvictionPolicy;
#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConfig};

/// One element of a compiled glob pattern
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Any,
    Star,
    Class {
        negated: bool,
        ranges: Vec<(char, char)>,
    },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::Any => true,
            Token::Star => false,
            Token::Class { negated, ranges } => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)) != *negated
            }
        }
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => tokens.push(Token::Star),
            '?' => tokens.push(Token::Any),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                tokens.push(Token::Literal(chars[i]));
            }
            '[' => match parse_class(&chars[i + 1..]) {
                Some((class, consumed)) => {
                    tokens.push(class);
                    i += consumed;
                }
                // Unterminated: the bracket is literal
                None => tokens.push(Token::Literal('[')),
            },
            c => tokens.push(Token::Literal(c)),
        }
        i += 1;
    }
    tokens
}

/// Parse the body of a `[...]` class. Returns the class and the number of
/// chars consumed including the closing `]`.
fn parse_class(body: &[char]) -> Option<(Token, usize)> {
    let negated = body.first() == Some(&'^');
    let mut i = usize::from(negated);
    let mut ranges = Vec::new();

    while i < body.len() {
        let c = match body[i] {
            ']' => return Some((Token::Class { negated, ranges }, i + 1)),
            '\\' if i + 1 < body.len() => {
                i += 1;
                body[i]
            }
            c => c,
        };
        if i + 2 < body.len() && body[i + 1] == '-' && body[i + 2] != ']' {
            let hi = body[i + 2];
            ranges.push(if c <= hi { (c, hi) } else { (hi, c) });
            i += 3;
        } else {
            ranges.push((c, c));
            i += 1;
        }
    }
    None
}

/// Match a key against a glob pattern.
///
/// Same dialect as Redis `SCAN MATCH`: `*`, `?`, classes such as `[abc]`,
/// `[a-z]` and `[^0-9]`, and `\` to match the next char literally.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let tokens = tokenize(pattern);
    let k: Vec<char> = key.chars().collect();

    let (mut ti, mut ki) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ki < k.len() {
        match tokens.get(ti) {
            Some(Token::Star) => {
                star = Some(ti);
                mark = ki;
                ti += 1;
            }
            Some(token) if token.matches(k[ki]) => {
                ti += 1;
                ki += 1;
            }
            _ => match star {
                Some(s) => {
                    ti = s + 1;
                    mark += 1;
                    ki = mark;
                }
                None => return false,
            },
        }
    }

    while matches!(tokens.get(ti), Some(Token::Star)) {
        ti += 1;
    }
    ti == tokens.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("session:*", "session:1"));
        assert!(glob_match("session:*", "session:"));
        assert!(!glob_match("session:*", "sessions:1"));
        assert!(glob_match("user:?:profile", "user:7:profile"));
        assert!(!glob_match("user:?:profile", "user:42:profile"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("exact", "exact"));
    }

    #[test]
    fn test_glob_classes() {
        assert!(glob_match("user:[0-9]", "user:7"));
        assert!(!glob_match("user:[0-9]", "user:x"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(glob_match("h[ae]llo", "hello"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("v[z-a]", "vm"));
        assert!(glob_match("order:[0-9]*", "order:42:lines"));
        assert!(!glob_match("order:[0-9]*", "order:draft"));
    }

    #[test]
    fn test_glob_escapes() {
        assert!(glob_match(r"literal\*", "literal*"));
        assert!(!glob_match(r"literal\*", "literally"));
        assert!(glob_match(r"what\?", "what?"));
        assert!(!glob_match(r"what\?", "whats"));
        assert!(glob_match(r"\[tag]", "[tag]"));
        assert!(glob_match(r"[\]]", "]"));
        // Unterminated class matches the bracket literally
        assert!(glob_match("a[b", "a[b"));
    }
}
