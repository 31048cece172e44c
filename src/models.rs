//! Core data models used throughout convtree.
//!
//! A [`Message`] is one of two full message formats or a missing
//! placeholder. Parsing extracts the id, author, reply target and mentions
//! once, at construction, and keeps the raw JSON so it round-trips to output
//! untouched.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snowflake;

/// Wire sentinel for a message that replies to nothing.
pub const NOT_A_REPLY: &str = "NOT_A_REPLY";

/// Wire value for author fields that the source format does not carry.
pub const UNAVAILABLE: &str = "UNAVAILABLE";

/// A user, as seen on a message or a mention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "screen_name")]
    pub handle: String,
    #[serde(rename = "user_id")]
    pub id: String,
}

impl Author {
    pub fn new(handle: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            id: id.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(UNAVAILABLE, UNAVAILABLE)
    }
}

/// The message a message replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub id: String,
    pub author: Author,
}

/// A full message in either source format.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: Author,
    pub reply_target: Option<ReplyTarget>,
    pub mentions: Vec<Author>,
    pub raw: Value,
}

/// Stand-in for a message that is referenced but not present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPlaceholder {
    #[serde(rename = "missing_tweet_id")]
    pub id: String,
    #[serde(rename = "screen_name", default = "unavailable")]
    pub author_handle: String,
    #[serde(rename = "user_id", default = "unavailable")]
    pub author_id: String,
}

fn unavailable() -> String {
    UNAVAILABLE.to_string()
}

impl MissingPlaceholder {
    pub fn new(id: impl Into<String>, author: &Author) -> Self {
        Self {
            id: id.into(),
            author_handle: author.handle.clone(),
            author_id: author.id.clone(),
        }
    }
}

/// A message record: activity-streams, original format, or placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Message {
    ActivityStreams(Post),
    Original(Post),
    Missing(MissingPlaceholder),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::ActivityStreams(p) | Message::Original(p) => &p.id,
            Message::Missing(m) => &m.id,
        }
    }

    pub fn author(&self) -> Author {
        match self {
            Message::ActivityStreams(p) | Message::Original(p) => p.author.clone(),
            Message::Missing(m) => Author::new(&m.author_handle, &m.author_id),
        }
    }

    /// Placeholders never carry a reply target.
    pub fn reply_target(&self) -> Option<&ReplyTarget> {
        match self {
            Message::ActivityStreams(p) | Message::Original(p) => p.reply_target.as_ref(),
            Message::Missing(_) => None,
        }
    }

    pub fn mentions(&self) -> &[Author] {
        match self {
            Message::ActivityStreams(p) | Message::Original(p) => &p.mentions,
            Message::Missing(_) => &[],
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Message::Missing(_))
    }

    pub fn as_missing(&self) -> Option<&MissingPlaceholder> {
        match self {
            Message::Missing(m) => Some(m),
            _ => None,
        }
    }

    /// Parse one input line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line).context("invalid JSON")?;
        Message::try_from(value)
    }
}

impl TryFrom<Value> for Message {
    type Error = anyhow::Error;

    fn try_from(raw: Value) -> Result<Self> {
        if raw.get("postedTime").is_some() {
            Ok(Message::ActivityStreams(parse_activity_streams(raw)?))
        } else if raw.get("created_at").is_some() {
            Ok(Message::Original(parse_original(raw)?))
        } else if raw.get("missing_tweet_id").is_some() {
            let placeholder: MissingPlaceholder =
                serde_json::from_value(raw).context("invalid missing placeholder")?;
            check_id(&placeholder.id)?;
            Ok(Message::Missing(placeholder))
        } else {
            bail!("unrecognized message format (no postedTime, created_at or missing_tweet_id)")
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Value {
        match message {
            Message::ActivityStreams(p) | Message::Original(p) => p.raw,
            Message::Missing(m) => serde_json::json!({
                "missing_tweet_id": m.id,
                "screen_name": m.author_handle,
                "user_id": m.author_id,
            }),
        }
    }
}

fn check_id(id: &str) -> Result<()> {
    if snowflake::parse_id(id).is_none() {
        bail!("message id '{}' is not numeric", id);
    }
    Ok(())
}

fn str_field<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn required<'a>(value: &'a Value, path: &[&str]) -> Result<&'a str> {
    str_field(value, path).ok_or_else(|| anyhow!("missing field {}", path.join(".")))
}

fn last_segment(s: &str, sep: char) -> &str {
    s.rsplit(sep).next().unwrap_or(s)
}

fn parse_mentions(raw: &Value, entities_key: &str) -> Vec<Author> {
    raw.get(entities_key)
        .and_then(|e| e.get("user_mentions"))
        .and_then(|m| m.as_array())
        .map(|mentions| {
            mentions
                .iter()
                .filter_map(|m| {
                    let handle = m.get("screen_name")?.as_str()?;
                    let id = m.get("id_str")?.as_str()?;
                    Some(Author::new(handle.to_lowercase(), id))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_activity_streams(raw: Value) -> Result<Post> {
    let id = last_segment(required(&raw, &["id"])?, ':').to_string();
    check_id(&id)?;

    let author = Author::new(
        required(&raw, &["actor", "preferredUsername"])?.to_lowercase(),
        last_segment(required(&raw, &["actor", "id"])?, ':'),
    );

    // link looks like http://twitter.com/<handle>/statuses/<id>
    let reply_target = match str_field(&raw, &["inReplyTo", "link"]) {
        Some(link) => {
            let parts: Vec<&str> = link.split('/').collect();
            if parts.len() < 3 {
                bail!("unparseable inReplyTo link '{}'", link);
            }
            let target_id = parts[parts.len() - 1].to_string();
            check_id(&target_id)?;
            let handle = parts[parts.len() - 3].trim_matches('\\').to_lowercase();
            Some(ReplyTarget {
                id: target_id,
                author: Author::new(handle, UNAVAILABLE),
            })
        }
        None => None,
    };

    let mentions = parse_mentions(&raw, "twitter_entities");
    Ok(Post {
        id,
        author,
        reply_target,
        mentions,
        raw,
    })
}

fn parse_original(raw: Value) -> Result<Post> {
    let id = required(&raw, &["id_str"])?.to_string();
    check_id(&id)?;

    let author = Author::new(
        required(&raw, &["user", "screen_name"])?.to_lowercase(),
        required(&raw, &["user", "id_str"])?,
    );

    let reply_target = match str_field(&raw, &["in_reply_to_status_id_str"]) {
        Some(target_id) if target_id != NOT_A_REPLY => {
            check_id(target_id)?;
            let handle = str_field(&raw, &["in_reply_to_screen_name"])
                .map(str::to_lowercase)
                .unwrap_or_else(|| UNAVAILABLE.to_string());
            let user_id = str_field(&raw, &["in_reply_to_user_id_str"]).unwrap_or(UNAVAILABLE);
            Some(ReplyTarget {
                id: target_id.to_string(),
                author: Author::new(handle, user_id),
            })
        }
        _ => None,
    };

    let mentions = parse_mentions(&raw, "entities");
    Ok(Post {
        id,
        author,
        reply_target,
        mentions,
        raw,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use super::Message;

    /// Original-format message; `reply_to` is `(id, handle, user_id)`.
    pub fn original(id: &str, handle: &str, user_id: &str, reply_to: Option<(&str, &str, &str)>) -> Message {
        let (rid, rname, ruid) = match reply_to {
            Some((a, b, c)) => (json!(a), json!(b), json!(c)),
            None => (json!(null), json!(null), json!(null)),
        };
        Message::try_from(json!({
            "created_at": "Wed Jul 13 15:31:15 +0000 2016",
            "id_str": id,
            "text": format!("message {}", id),
            "user": { "id_str": user_id, "screen_name": handle },
            "in_reply_to_status_id_str": rid,
            "in_reply_to_screen_name": rname,
            "in_reply_to_user_id_str": ruid,
            "entities": { "user_mentions": [] }
        }))
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_activity_streams_reply() {
        let msg = Message::try_from(json!({
            "postedTime": "2016-07-13T15:31:15.000Z",
            "id": "tag:search.twitter.com,2005:753250443924164608",
            "actor": { "id": "id:twitter.com:42", "preferredUsername": "Alice" },
            "inReplyTo": { "link": "http://twitter.com/Bob/statuses/753250000000000000" },
            "twitter_entities": { "user_mentions": [ { "screen_name": "Bob", "id_str": "7" } ] }
        }))
        .unwrap();

        assert!(matches!(msg, Message::ActivityStreams(_)));
        assert_eq!(msg.id(), "753250443924164608");
        assert_eq!(msg.author(), Author::new("alice", "42"));
        let target = msg.reply_target().unwrap();
        assert_eq!(target.id, "753250000000000000");
        assert_eq!(target.author, Author::new("bob", UNAVAILABLE));
        assert_eq!(msg.mentions(), &[Author::new("bob", "7")]);
    }

    #[test]
    fn parses_original_non_reply() {
        let msg = fixtures::original("100", "Carol", "9", None);
        assert!(matches!(msg, Message::Original(_)));
        assert_eq!(msg.author(), Author::new("carol", "9"));
        assert!(msg.reply_target().is_none());
    }

    #[test]
    fn sentinel_reply_target_is_not_a_reply() {
        let msg = Message::try_from(json!({
            "created_at": "Wed Jul 13 15:31:15 +0000 2016",
            "id_str": "100",
            "user": { "id_str": "9", "screen_name": "carol" },
            "in_reply_to_status_id_str": NOT_A_REPLY
        }))
        .unwrap();
        assert!(msg.reply_target().is_none());
    }

    #[test]
    fn placeholder_round_trips_through_json() {
        let msg = Message::Missing(MissingPlaceholder::new("55", &Author::new("dan", "3")));
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
        assert!(back.is_missing());
    }

    #[test]
    fn full_message_serializes_as_raw_payload() {
        let msg = fixtures::original("100", "carol", "9", None);
        let value: Value = msg.into();
        assert_eq!(value["text"], "message 100");
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(Message::parse_line("{\"foo\": 1}").is_err());
        assert!(Message::parse_line("not json").is_err());
        assert!(Message::parse_line("{\"created_at\": \"x\", \"id_str\": \"abc\"}").is_err());
    }
}
