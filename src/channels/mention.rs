//! Mention token resolution.
//!
//! Rewrites symbolic mentions into platform-native syntax in one linear
//! scan:
//!
//! - `@<numeric id>` becomes a role or user mention when the id is in the roster
//! - `@<display name>` becomes a mention of the first roster entry whose name
//!   matches (case-insensitive, whole-word); names may contain spaces
//! - already formatted mentions (`<@id>`, `<@!id>`, `<@&id>`, `<#id>`) pass
//!   through untouched
//!
//! Anything unmatched is left verbatim.

use super::platform::{Roster, RosterEntry};

/// Resolves mention tokens against a roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct MentionResolver;

impl MentionResolver {
    pub fn new() -> Self {
        Self
    }

    /// Replace every recognized mention token in `text`.
    pub fn resolve(&self, text: &str, roster: &Roster) -> String {
        let mut out = String::with_capacity(text.len());
        let mut replaced = 0usize;
        let mut i = 0;

        while i < text.len() {
            let rest = &text[i..];

            if let Some(len) = formatted_mention_len(rest) {
                out.push_str(&rest[..len]);
                i += len;
                continue;
            }

            if rest.starts_with('@') && starts_token(text, i) {
                let after = &rest[1..];
                if let Some((entry, len)) = match_id(after, roster).or_else(|| match_name(after, roster))
                {
                    out.push_str(&entry.mention());
                    replaced += 1;
                    i += 1 + len;
                    continue;
                }
            }

            // Non-empty by the loop condition.
            let ch = rest.chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8();
        }

        if replaced > 0 {
            tracing::debug!(replaced, "Resolved mention tokens");
        }
        out
    }

    /// Resolve a caller-supplied mention list into one normalized line.
    pub fn resolve_list(&self, list: &str, roster: &Roster) -> String {
        self.resolve(list.trim(), roster)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Length of an already formatted mention at the start of `s`.
fn formatted_mention_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let mut i = 1;
    match bytes.get(i) {
        Some(b'@') => {
            i += 1;
            if matches!(bytes.get(i), Some(b'!') | Some(b'&')) {
                i += 1;
            }
        }
        Some(b'#') => i += 1,
        _ => return None,
    }
    let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    i += digits;
    (bytes.get(i) == Some(&b'>')).then_some(i + 1)
}

fn match_id<'r>(after: &str, roster: &'r Roster) -> Option<(&'r RosterEntry, usize)> {
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || !ends_token(after, digits) {
        return None;
    }
    let id: u64 = after[..digits].parse().ok()?;
    roster.by_id(id).map(|entry| (entry, digits))
}

fn match_name<'r>(after: &str, roster: &'r Roster) -> Option<(&'r RosterEntry, usize)> {
    let mut found: Option<(&RosterEntry, usize)> = None;
    let mut also_matched = 0usize;

    for entry in &roster.entries {
        let name = entry.name.trim();
        if name.is_empty() {
            continue;
        }
        let Some(prefix) = after.get(..name.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(name) || !ends_token(after, name.len()) {
            continue;
        }
        match found {
            None => found = Some((entry, name.len())),
            Some((first, _)) if first.id != entry.id => also_matched += 1,
            Some(_) => {}
        }
    }

    if let Some((entry, len)) = found
        && also_matched > 0
    {
        tracing::warn!(
            token = &after[..len],
            chosen = entry.id,
            others = also_matched,
            "Ambiguous mention name; using first roster match"
        );
    }
    found
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters after which an `@` may open a mention.
const TOKEN_OPENERS: &[char] = &['(', '[', '{', '"', '\'', '*', '~', '>', ',', ';', '!', '?'];

/// Whether an `@` at byte `i` begins a token rather than sitting inside a
/// word, an address, or a link.
fn starts_token(text: &str, i: usize) -> bool {
    text[..i]
        .chars()
        .next_back()
        .is_none_or(|c| c.is_whitespace() || TOKEN_OPENERS.contains(&c))
}

fn ends_token(s: &str, len: usize) -> bool {
    s[len..].chars().next().is_none_or(|c| !is_word_char(c))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn roster() -> Roster {
        Roster::new(vec![
            RosterEntry::role(900, "General"),
            RosterEntry::role(901, "Event Team"),
            RosterEntry::user(123456, "ana"),
        ])
    }

    #[test]
    fn test_resolves_id_and_name_tokens() {
        let out = MentionResolver::new().resolve("@123456 please see @General", &roster());
        assert_eq!(out, "<@123456> please see <@&900>");
    }

    #[test]
    fn test_unmatched_tokens_stay_verbatim() {
        let out = MentionResolver::new().resolve("ping @NoSuchRole and @777", &roster());
        assert_eq!(out, "ping @NoSuchRole and @777");
    }

    #[test]
    fn test_formatted_mentions_pass_through() {
        let out = MentionResolver::new().resolve("<@&900> <@!5> <#42> <@x>", &roster());
        assert_eq!(out, "<@&900> <@!5> <#42> <@x>");
    }

    #[test]
    fn test_multi_word_names_and_case() {
        let out = MentionResolver::new().resolve("hey @event team, and @GENERAL!", &roster());
        assert_eq!(out, "hey <@&901>, and <@&900>!");
    }

    #[test]
    fn test_requires_word_boundaries() {
        let resolver = MentionResolver::new();
        assert_eq!(resolver.resolve("mail me@General.org", &roster()), "mail me@General.org");
        assert_eq!(resolver.resolve("@Generally speaking", &roster()), "@Generally speaking");
        assert_eq!(resolver.resolve("@1234567", &roster()), "@1234567");
    }

    #[test]
    fn test_links_containing_at_are_left_alone() {
        let resolver = MentionResolver::new();
        assert_eq!(
            resolver.resolve("see https://x.com/@General now", &roster()),
            "see https://x.com/@General now"
        );
        assert_eq!(
            resolver.resolve("https://x.org/?to=@123456 and mailto:@ana", &roster()),
            "https://x.org/?to=@123456 and mailto:@ana"
        );
        assert_eq!(resolver.resolve("(@General) **@ana**", &roster()), "(<@&900>) **<@123456>**");
    }

    #[test]
    fn test_ambiguous_name_uses_first_roster_entry() {
        let roster = Roster::new(vec![
            RosterEntry::role(1, "mods"),
            RosterEntry::user(2, "Mods"),
        ]);
        assert_eq!(MentionResolver::new().resolve("@mods", &roster), "<@&1>");
    }

    #[test]
    fn test_non_ascii_text_is_preserved() {
        let out = MentionResolver::new().resolve("¡Hola @ana! 🎉", &roster());
        assert_eq!(out, "¡Hola <@123456>! 🎉");
    }

    #[test]
    fn test_resolve_list_normalizes_whitespace() {
        let out = MentionResolver::new().resolve_list("  <@&900>   @Event Team  @ghost ", &roster());
        assert_eq!(out, "<@&900> <@&901> @ghost");
    }
}
