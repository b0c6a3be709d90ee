// SPDX-License-Identifier: MIT

//! Wake prompt construction: groups the trigger plus any flushed
//! pending mentions by home, picks a spawn-mode template, and falls back to
//! an inline prompt when no external template engine is configured.

use fray_adapters::SpawnMode;
use fray_core::{AgentId, Home, MessageId};
use std::collections::BTreeMap;

/// One message folded into a wake prompt: its id and where it was posted.
pub struct IncludedMention {
    pub msg_id: MessageId,
    pub home: Home,
}

pub struct WakePrompt {
    pub prompt: String,
    pub mode: SpawnMode,
    /// Every mention id folded into this spawn, trigger first; the caller
    /// advances the watermark past the last of these.
    pub all_mentions: Vec<MessageId>,
}

/// Build the wake prompt for `agent_id`, given the triggering message body
/// (used to detect a `/fly|/hop|/land|/hand` prefix) and every included
/// mention grouped by home. `template` is an optional external renderer;
/// on `None` or on any render failure the inline fallback is used.
pub fn build(
    agent_id: &AgentId,
    trigger_body: &str,
    included: &[IncludedMention],
    template: Option<&dyn Fn(&AgentId, SpawnMode, &[IncludedMention]) -> Option<String>>,
) -> WakePrompt {
    let mode = SpawnMode::detect(trigger_body);

    if let Some(render) = template {
        if let Some(prompt) = render(agent_id, mode, included) {
            return WakePrompt {
                prompt,
                mode,
                all_mentions: included.iter().map(|m| m.msg_id.clone()).collect(),
            };
        }
    }

    WakePrompt {
        prompt: inline_prompt(agent_id, mode, included),
        mode,
        all_mentions: included.iter().map(|m| m.msg_id.clone()).collect(),
    }
}

fn inline_prompt(agent_id: &AgentId, mode: SpawnMode, included: &[IncludedMention]) -> String {
    let mut by_home: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for mention in included {
        by_home
            .entry(mention.home.label())
            .or_default()
            .push(mention.msg_id.to_string());
    }

    let mut lines = vec![format!("You are @{agent_id}.")];
    for (home, ids) in &by_home {
        lines.push(format!("New mentions in {home}: {}", ids.join(", ")));
    }

    match mode {
        SpawnMode::Hop => {
            lines.push(
                "This is a /hop session: once you go idle the process terminates automatically."
                    .to_string(),
            );
        }
        SpawnMode::Land | SpawnMode::Hand => {
            lines.push(
                "This is a /land or /hand session: post a standup summarizing your work, then hand off before finishing."
                    .to_string(),
            );
        }
        SpawnMode::Fly | SpawnMode::Normal => {}
    }

    lines.push(
        "Post acknowledgements and progress to the log; your raw stdout is not user-visible."
            .to_string(),
    );

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_core::ThreadId;

    fn mention(id: &str, home: Home) -> IncludedMention {
        IncludedMention {
            msg_id: MessageId::new(id),
            home,
        }
    }

    #[test]
    fn falls_back_to_inline_when_no_template_given() {
        let agent = AgentId::new("alice");
        let included = vec![mention("m1", Home::Room)];
        let result = build(&agent, "@alice please help", &included, None);
        assert_eq!(result.mode, SpawnMode::Normal);
        assert!(result.prompt.contains("You are @alice"));
        assert!(result.prompt.contains("m1"));
    }

    #[test]
    fn hop_mode_mentions_auto_terminate_rule() {
        let agent = AgentId::new("alice");
        let included = vec![mention("m1", Home::Room)];
        let result = build(&agent, "@alice /hop look into this", &included, None);
        assert_eq!(result.mode, SpawnMode::Hop);
        assert!(result.prompt.contains("terminates automatically"));
    }

    #[test]
    fn groups_mentions_by_home() {
        let agent = AgentId::new("alice");
        let thread = ThreadId::new("t1");
        let included = vec![
            mention("m1", Home::Room),
            mention("m2", Home::Thread(thread)),
        ];
        let result = build(&agent, "@alice go", &included, None);
        assert!(result.prompt.contains("Room"));
        assert!(result.prompt.contains("Thread t1"));
    }

    #[test]
    fn template_failure_falls_back_to_inline() {
        let agent = AgentId::new("alice");
        let included = vec![mention("m1", Home::Room)];
        let always_fails: &dyn Fn(&AgentId, SpawnMode, &[IncludedMention]) -> Option<String> =
            &|_, _, _| None;
        let result = build(&agent, "@alice go", &included, Some(always_fails));
        assert!(result.prompt.contains("You are @alice"));
    }
}
