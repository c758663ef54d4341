//! Notice texts

use crate::queue_store::{MediaItem, QueueEntry};

/// Reaction added to the queued notice when the media could not be fetched.
pub const REACTION_FAILED: &str = "x";

/// `m:ss`, or `h:mm:ss` for an hour or more.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

pub fn queued_text(entry: &QueueEntry, media: &MediaItem, rank: usize, wait_seconds: i64) -> String {
    let who = if entry.added_automatically {
        "Auto-queued".to_string()
    } else {
        format!("{} queued", entry.owner_id)
    };
    let when = if rank == 0 {
        "up next".to_string()
    } else {
        format!(
            "position {}, starts in ~{}",
            rank + 1,
            format_duration(wait_seconds)
        )
    };
    format!(
        "{} *{}* ({}) {}",
        who,
        media.title,
        format_duration(media.duration_seconds),
        when
    )
}

pub fn now_playing_text(entry: &QueueEntry, media: &MediaItem) -> String {
    format!(
        "Now playing *{}* ({}), queued by {}",
        media.title,
        format_duration(media.duration_seconds),
        if entry.added_automatically {
            "autoplay"
        } else {
            entry.owner_id.as_str()
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_duration(-3), "0:00");
    }
}
