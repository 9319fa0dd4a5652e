//! Bounded conversation history
//!
//! A [`ConversationLog`] is the dialogue submitted to the completion provider.
//! It starts with a single system turn (the persona prompt) and is trimmed to
//! a fixed window after every user turn.

mod store;

use serde::{Deserialize, Serialize};

pub use store::{SessionStore, SharedLog};

/// Default number of turns kept in the window
pub const DEFAULT_WINDOW: usize = 10;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the dialogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How the window treats the anchoring system turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Keep the leading system turn and the most recent `n - 1` other turns
    #[default]
    PinSystem,
    /// Keep the last `n` turns counted from the end, system turn included
    Sliding,
}

impl WindowPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PinSystem => "pin-system",
            Self::Sliding => "sliding",
        }
    }
}

impl std::str::FromStr for WindowPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pin-system" | "pin_system" => Ok(Self::PinSystem),
            "sliding" => Ok(Self::Sliding),
            other => Err(crate::Error::Config(format!(
                "unknown window policy '{other}' (expected 'pin-system' or 'sliding')"
            ))),
        }
    }
}

/// Ordered dialogue history, oldest first
#[derive(Debug, Clone)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    policy: WindowPolicy,
}

impl ConversationLog {
    /// Create a log anchored by a system prompt
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, policy: WindowPolicy) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
            policy,
        }
    }

    /// Add a turn at the end
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Retain only the last `n` turns
    ///
    /// Under [`WindowPolicy::PinSystem`] a leading system turn is kept and
    /// counts toward `n`. Under [`WindowPolicy::Sliding`] the system turn is
    /// evicted like any other once the window fills. The newest turn always
    /// survives, so a window of zero is treated as one (two when pinned).
    pub fn truncate_to_window(&mut self, n: usize) {
        let pinned = self.policy == WindowPolicy::PinSystem
            && self.turns.first().is_some_and(|t| t.role == Role::System);

        let n = if pinned { n.max(2) } else { n.max(1) };
        if self.turns.len() <= n {
            return;
        }

        if pinned {
            // System turn plus the newest n - 1 of the rest
            let excess = self.turns.len() - n;
            self.turns.drain(1..=excess);
        } else {
            let excess = self.turns.len() - n;
            self.turns.drain(..excess);
        }
    }

    /// Full ordered sequence for submission to the provider
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// The anchoring system prompt, if it is still retained
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }
}
