//! Conversation payloads.
//!
//! A [`Conversation`] is one output line: the time-sorted `tweets` of a tree
//! (bodies or placeholders) with their parallel `depths`, the recovery
//! bookkeeping lists, and whatever statistics or foreign fields the payload
//! carries. Unknown fields are kept in [`Conversation::extra`] and written
//! back untouched.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Message;
use crate::snowflake;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub tweets: Vec<Message>,
    pub depths: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids_of_missing_tweets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_tweets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_missing_tweets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrecoverable_tweets: Option<Vec<String>>,
    /// Statistics and any fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    /// Build a payload from parallel entries, sorting them by id time.
    pub fn from_entries(mut entries: Vec<(Message, i64)>) -> Result<Self> {
        entries.sort_by_key(|(m, _)| snowflake::sort_key(m.id()));
        let (tweets, depths) = entries.into_iter().unzip();
        let conversation = Self {
            tweets,
            depths,
            ids_of_missing_tweets: None,
            recovered_tweets: None,
            new_missing_tweets: None,
            unrecoverable_tweets: None,
            extra: Map::new(),
        };
        conversation.validate()?;
        Ok(conversation)
    }

    /// Parse one payload line.
    pub fn parse_line(line: &str) -> Result<Self> {
        let conversation: Conversation =
            serde_json::from_str(line).context("invalid conversation payload")?;
        conversation.validate()?;
        Ok(conversation)
    }

    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize conversation payload")
    }

    pub fn validate(&self) -> Result<()> {
        if self.tweets.is_empty() {
            bail!("conversation has no tweets");
        }
        if self.tweets.len() != self.depths.len() {
            bail!(
                "conversation has {} tweets but {} depths",
                self.tweets.len(),
                self.depths.len()
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tweets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty()
    }

    /// Ids of placeholder entries, in payload order.
    pub fn missing_ids(&self) -> Vec<String> {
        self.tweets
            .iter()
            .filter(|t| t.is_missing())
            .map(|t| t.id().to_string())
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.tweets.iter().any(Message::is_missing)
    }

    pub fn ids(&self) -> Vec<String> {
        self.tweets.iter().map(|t| t.id().to_string()).collect()
    }

    /// Set a statistics field, replacing any earlier value.
    pub fn set_field(&mut self, key: &str, value: Value) {
        self.extra.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::original;
    use crate::models::{Author, MissingPlaceholder};
    use crate::snowflake::testing::id_at;

    #[test]
    fn entries_are_sorted_by_id_time() {
        let (a, b, c) = (id_at(1), id_at(2), id_at(3));
        let conv = Conversation::from_entries(vec![
            (original(&c, "u", "1", Some((b.as_str(), "u", "1"))), 2),
            (original(&a, "u", "1", None), 0),
            (
                Message::Missing(MissingPlaceholder::new(b.clone(), &Author::unavailable())),
                1,
            ),
        ])
        .unwrap();
        assert_eq!(conv.ids(), vec![a, b.clone(), c]);
        assert_eq!(conv.depths, vec![0, 1, 2]);
        assert_eq!(conv.missing_ids(), vec![b]);
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let line = serde_json::json!({
            "tweets": [{"missing_tweet_id": "5", "screen_name": "x", "user_id": "1"}],
            "depths": [0],
            "custom_label": "keep me",
            "recovered_tweets": []
        })
        .to_string();
        let conv = Conversation::parse_line(&line).unwrap();
        assert_eq!(conv.extra["custom_label"], "keep me");
        assert_eq!(conv.recovered_tweets, Some(vec![]));

        let back: Value = serde_json::from_str(&conv.to_line().unwrap()).unwrap();
        assert_eq!(back["custom_label"], "keep me");
        assert!(back.get("new_missing_tweets").is_none());
    }

    #[test]
    fn rejects_mismatched_depths() {
        let line = r#"{"tweets":[{"missing_tweet_id":"5"}],"depths":[0,1]}"#;
        assert!(Conversation::parse_line(line).is_err());
        assert!(Conversation::parse_line(r#"{"tweets":[],"depths":[]}"#).is_err());
        assert!(Conversation::parse_line(r#"{"depths":[0]}"#).is_err());
    }
}
