//! User-agent to platform classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse platform label derived from a `User-Agent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Windows,
    Macos,
    Chromeos,
    Linux,
    Bot,
    Other,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Chromeos => "chromeos",
            Platform::Linux => "linux",
            Platform::Bot => "bot",
            Platform::Other => "other",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Order matters: mobile agents also advertise their desktop kernel
// ("like Mac OS X", "Linux; Android").
const RULES: &[(&[&str], Platform)] = &[
    (&["iPhone", "iPad", "iPod"], Platform::Ios),
    (&["Android"], Platform::Android),
    (&["Windows"], Platform::Windows),
    (&["Macintosh", "Mac OS X"], Platform::Macos),
    (&["CrOS"], Platform::Chromeos),
    (&["Linux", "X11"], Platform::Linux),
];

const BOT_MARKERS: &[&str] = &["bot", "crawler", "spider"];

/// Classify a raw user-agent string.
///
/// Operating-system rules are tried first; bot markers only apply to agents
/// that name no known OS.
pub fn classify(user_agent: &str) -> Platform {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return Platform::Unknown;
    }
    if let Some((_, platform)) = RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| ua.contains(n)))
    {
        return *platform;
    }
    let lowered = ua.to_ascii_lowercase();
    if BOT_MARKERS.iter().any(|m| lowered.contains(m)) {
        Platform::Bot
    } else {
        Platform::Other
    }
}
