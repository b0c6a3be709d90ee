// SPDX-License-Identifier: MIT

//! Mention extraction helpers:
//! deciding whether a message is a direct address, a reply, or an
//! ambiguous mention of a given agent, and whether it is an `@all`-only
//! broadcast.

use crate::dispatch::MatchKind;

pub const BROADCAST_TOKEN: &str = "all";

/// An agent's base name: `alice.1` (a session fork) and `alice` share the
/// base `alice` for mention-matching purposes.
pub fn base_name(agent_id: &str) -> &str {
    agent_id.split_once('.').map(|(base, _)| base).unwrap_or(agent_id)
}

/// The leading run of whitespace-separated `@name` tokens at the start of
/// `body`, stopping at the first word that isn't an `@mention`: a message
/// beginning with `@agent` (possibly followed by additional @-mentions
/// before the first non-@ word) is a direct address to each `@x` in that
/// leading block.
pub fn leading_mentions(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in body.split_whitespace() {
        let Some(rest) = word.strip_prefix('@') else {
            break;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '.' || *c == '_' || *c == '-' || *c == '#')
            .collect();
        if name.is_empty() {
            break;
        }
        out.push(name);
    }
    out
}

/// True if `mentions` (the message's pre-extracted mention list) names the
/// broadcast token at all, regardless of position.
pub fn mentions_all_broadcast(mentions: &[String]) -> bool {
    mentions.iter().any(|m| m == BROADCAST_TOKEN)
}

/// Classify how `body` addresses `target_base`.
///
/// A leading `@target_base` (possibly with a fork suffix or `#session`) is
/// a direct address; otherwise a message replying to one of the target's
/// own messages is a reply; anything else is ambiguous and must be routed.
pub fn classify_match(body: &str, target_base: &str, is_reply_to_agent: bool) -> MatchKind {
    let leading = leading_mentions(body);
    let directly_addressed = leading.iter().any(|m| {
        let name = m.split('#').next().unwrap_or(m);
        base_name(name) == target_base
    });
    if directly_addressed {
        MatchKind::DirectAddress
    } else if is_reply_to_agent {
        MatchKind::ReplyToAgent
    } else {
        MatchKind::Ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_fork_suffix() {
        assert_eq!(base_name("alice.1"), "alice");
        assert_eq!(base_name("alice"), "alice");
    }

    #[test]
    fn leading_mentions_stops_at_first_non_mention_word() {
        assert_eq!(
            leading_mentions("@all @alice can you help"),
            vec!["all".to_string(), "alice".to_string()]
        );
        assert_eq!(leading_mentions("hey @alice"), Vec::<String>::new());
    }

    #[test]
    fn leading_mentions_strips_fork_session_suffix() {
        assert_eq!(leading_mentions("@alice#abc123 go"), vec!["alice#abc123".to_string()]);
    }

    #[test]
    fn direct_address_matches_base_name_through_fork() {
        let kind = classify_match("@alice.1 please help", "alice", false);
        assert_eq!(kind, MatchKind::DirectAddress);
    }

    #[test]
    fn broadcast_only_is_not_a_direct_address_to_an_unlisted_agent() {
        let kind = classify_match("@all good morning", "alice", false);
        assert_eq!(kind, MatchKind::Ambiguous);
        assert!(mentions_all_broadcast(&["all".to_string()]));
    }

    #[test]
    fn reply_without_leading_mention_is_reply_kind() {
        let kind = classify_match("sounds good", "alice", true);
        assert_eq!(kind, MatchKind::ReplyToAgent);
    }

    #[test]
    fn neither_direct_nor_reply_is_ambiguous() {
        let kind = classify_match("maybe alice knows", "alice", false);
        assert_eq!(kind, MatchKind::Ambiguous);
    }
}
