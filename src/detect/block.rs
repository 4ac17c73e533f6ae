//! Detection of bot-check and access-denied interstitials.
//!
//! Matching is plain case-insensitive substring containment, so a product
//! page that merely mentions "blocked" near the top will be misread as an
//! interstitial.

/// Phrases that mark a challenge or denial page.
pub const BLOCK_PHRASES: &[&str] = &[
    "robot or human",
    "access denied",
    "blocked",
    "captcha",
    "verify you are human",
    "unusual traffic",
];

/// How much of the rendered body text is inspected.
pub const BLOCK_SCAN_CHARS: usize = 2000;

/// Why a page was classified as blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVerdict {
    /// The phrase that matched.
    pub phrase: &'static str,
    /// Whether it matched in the title (otherwise in the body prefix).
    pub in_title: bool,
}

/// Classify a page from its title and rendered text.
pub fn detect_block(title: &str, body_text: &str) -> Option<BlockVerdict> {
    let title = title.to_lowercase();
    let body: String = body_text.chars().take(BLOCK_SCAN_CHARS).collect();
    let body = body.to_lowercase();

    BLOCK_PHRASES.iter().find_map(|&phrase| {
        if title.contains(phrase) {
            Some(BlockVerdict {
                phrase,
                in_title: true,
            })
        } else if body.contains(phrase) {
            Some(BlockVerdict {
                phrase,
                in_title: false,
            })
        } else {
            None
        }
    })
}
