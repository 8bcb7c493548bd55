//! Emoji strings as stored on reminders → serenity reaction types.
//!
//! Accepted forms:
//! - unicode emoji: `✅`
//! - custom emoji markup: `<:name:123>` / `<a:name:123>`
//! - bare custom emoji ID: `123`

use serenity::model::channel::ReactionType;
use serenity::model::id::EmojiId;

/// Parse a stored emoji. `None` for blank input or a zero/invalid custom ID.
pub fn parse_reaction(emoji: &str) -> Option<ReactionType> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return None;
    }

    if let Some(inner) = emoji.strip_prefix('<').and_then(|e| e.strip_suffix('>')) {
        let (animated, rest) = match inner.strip_prefix("a:") {
            Some(rest) => (true, rest),
            None => (false, inner.strip_prefix(':')?),
        };
        let (name, id) = rest.rsplit_once(':')?;
        return Some(ReactionType::Custom {
            animated,
            id: emoji_id(id)?,
            name: (!name.is_empty()).then(|| name.to_string()),
        });
    }

    if emoji.bytes().all(|b| b.is_ascii_digit()) {
        return Some(ReactionType::Custom {
            animated: false,
            id: emoji_id(emoji)?,
            name: None,
        });
    }

    Some(ReactionType::Unicode(emoji.to_string()))
}

fn emoji_id(raw: &str) -> Option<EmojiId> {
    raw.parse::<u64>().ok().filter(|&id| id != 0).map(EmojiId::new)
}
