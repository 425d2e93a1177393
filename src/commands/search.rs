//! Search commands (KEYS)

use super::{Command, CommandContext, CommandResult};
use crate::protocol::RespValue;

/// KEYS command - Find all keys matching a glob pattern
///
/// Syntax: KEYS pattern
///
/// Supported patterns:
/// - `*` : any run of bytes, including none
/// - `?` : exactly one byte
/// - `[abc]`, `[a-z]` : one byte from the class
/// - `[^a]`, `[!a]` : one byte not in the class
/// - `\x` : the literal byte `x`
pub struct KeysCommand;

impl Command for KeysCommand {
    fn execute(&self, ctx: &CommandContext<'_>) -> CommandResult {
        let pattern = ctx.arg(0)?;

        let mut matching = Vec::new();
        ctx.store().for_each(|key, _| {
            if glob_match(pattern, key) {
                matching.push(key.clone());
            }
            true
        });

        Ok(RespValue::array(matching))
    }

    fn name(&self) -> &'static str {
        "KEYS"
    }

    fn arity(&self) -> i32 {
        2
    }
}

/// Match `text` against a glob `pattern`, byte-wise
///
/// Backtracks only to the most recent `*`, so matching is linear in practice.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Pattern position after the last star, and the text position it resumes from
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next)) = match_class(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == b'[' {
                        // Unterminated class: treat '[' literally
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                b'\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                c => {
                    if c == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Evaluate the class starting at `pattern[start] == b'['` against `byte`.
///
/// Returns whether it matched and the pattern index just past `]`, or `None`
/// if the class is never closed.
fn match_class(pattern: &[u8], start: usize, byte: u8) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(pattern.get(i), Some(b'^') | Some(b'!'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let c = *pattern.get(i)?;
        if c == b']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        let lo = if c == b'\\' {
            i += 1;
            *pattern.get(i)?
        } else {
            c
        };

        if pattern.get(i + 1) == Some(&b'-') && pattern.get(i + 2).is_some_and(|&h| h != b']') {
            let mut hi_at = i + 2;
            if pattern[hi_at] == b'\\' {
                hi_at += 1;
            }
            let hi = *pattern.get(hi_at)?;
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if (lo..=hi).contains(&byte) {
                matched = true;
            }
            i = hi_at + 1;
        } else {
            if lo == byte {
                matched = true;
            }
            i += 1;
        }
    }
}
