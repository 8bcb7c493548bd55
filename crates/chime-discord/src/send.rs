use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;

/// Maximum characters per Discord message (2000 is the limit; we use 1950 for safety).
const CHUNK_MAX: usize = 1950;

/// Split `text` into chunks of at most [`CHUNK_MAX`] bytes, preferring
/// newline then space boundaries and never cutting through a UTF-8 character.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > CHUNK_MAX {
        let mut limit = CHUNK_MAX;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

/// Send `text` to `channel_id` in ≤1950-byte chunks, returning the last
/// message so reactions land at the end of the reminder.
pub async fn send_chunked(
    http: &Http,
    channel_id: ChannelId,
    text: &str,
) -> Result<Message, serenity::Error> {
    let mut chunks = split_chunks(text).into_iter();
    let first = chunks.next().unwrap_or_default();
    let mut last = channel_id.say(http, &first).await?;
    for chunk in chunks {
        last = channel_id.say(http, &chunk).await?;
    }
    Ok(last)
}
