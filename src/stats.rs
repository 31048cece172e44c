//! Conversation statistics.
//!
//! Pure functions over a finished [`Conversation`]. [`enrich`] writes all of
//! them onto the payload; the brand fields are only written when a roster is
//! given. Times come from the id clock, so they work for placeholders too.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::brands::BrandRoster;
use crate::conversation::Conversation;
use crate::models::Author;
use crate::snowflake;

pub const NO_RESPONSE: &str = "NO_RESPONSE";
pub const UNDEFINED: &str = "UNDEFINED";

pub fn size_of_conversation(conversation: &Conversation) -> usize {
    conversation.len()
}

pub fn approx_depth(conversation: &Conversation) -> i64 {
    conversation.depths.iter().copied().max().unwrap_or(0)
}

pub fn root_user(conversation: &Conversation) -> Option<Author> {
    conversation.tweets.first().map(|t| t.author())
}

/// Time from the first tweet to the first tweet by a different user.
pub fn time_to_first_response(conversation: &Conversation) -> String {
    let Some(root) = conversation.tweets.first() else {
        return NO_RESPONSE.to_string();
    };
    let root_author = root.author();
    conversation
        .tweets
        .iter()
        .find(|t| {
            let author = t.author();
            author.id != root_author.id && author.handle != root_author.handle
        })
        .and_then(|t| snowflake::seconds_between(root.id(), t.id()))
        .map(format_hms)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

/// Time from the first to the last tweet.
pub fn duration_of_conversation(conversation: &Conversation) -> String {
    match (conversation.tweets.first(), conversation.tweets.last()) {
        (Some(first), Some(last)) if conversation.len() > 1 => {
            snowflake::seconds_between(first.id(), last.id())
                .map(format_hms)
                .unwrap_or_else(|| NO_RESPONSE.to_string())
        }
        _ => NO_RESPONSE.to_string(),
    }
}

pub fn ids_of_missing_tweets(conversation: &Conversation) -> Vec<String> {
    conversation.missing_ids()
}

fn root_is_brand(conversation: &Conversation, brands: &BrandRoster) -> bool {
    root_user(conversation).is_some_and(|a| brands.is_brand(&a))
}

/// Time from the first tweet to the first brand tweet.
pub fn time_to_first_brand_response(conversation: &Conversation, brands: &BrandRoster) -> String {
    if conversation.len() < 2 {
        return NO_RESPONSE.to_string();
    }
    if root_is_brand(conversation, brands) {
        return UNDEFINED.to_string();
    }
    let root = &conversation.tweets[0];
    conversation
        .tweets
        .iter()
        .find(|t| brands.is_brand(&t.author()))
        .and_then(|t| snowflake::seconds_between(root.id(), t.id()))
        .map(format_hms)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

/// The first brand tweet after the root, as its raw payload.
pub fn first_brand_response(conversation: &Conversation, brands: &BrandRoster) -> Value {
    if root_is_brand(conversation, brands) {
        return Value::String(UNDEFINED.to_string());
    }
    conversation
        .tweets
        .iter()
        .skip(1)
        .find(|t| brands.is_brand(&t.author()))
        .map(|t| Value::from(t.clone()))
        .unwrap_or_else(|| Value::String(NO_RESPONSE.to_string()))
}

fn tweeting(conversation: &Conversation, brands: &BrandRoster, want_brand: bool) -> Vec<Author> {
    conversation
        .tweets
        .iter()
        .map(|t| t.author())
        .filter(|a| brands.is_brand(a) == want_brand)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn mentioned(conversation: &Conversation, brands: &BrandRoster, want_brand: bool) -> Vec<Author> {
    conversation
        .tweets
        .iter()
        .flat_map(|t| t.mentions().iter().cloned())
        .filter(|a| brands.is_brand(a) == want_brand)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn brands_tweeting(conversation: &Conversation, brands: &BrandRoster) -> Vec<Author> {
    tweeting(conversation, brands, true)
}

pub fn nonbrands_tweeting(conversation: &Conversation, brands: &BrandRoster) -> Vec<Author> {
    tweeting(conversation, brands, false)
}

pub fn brands_mentioned(conversation: &Conversation, brands: &BrandRoster) -> Vec<Author> {
    mentioned(conversation, brands, true)
}

pub fn nonbrands_mentioned(conversation: &Conversation, brands: &BrandRoster) -> Vec<Author> {
    mentioned(conversation, brands, false)
}

/// Write every statistic onto the payload, replacing earlier values.
pub fn enrich(conversation: &mut Conversation, brands: Option<&BrandRoster>) {
    let size = size_of_conversation(conversation);
    let depth = approx_depth(conversation);
    let root = root_user(conversation);
    let first_response = time_to_first_response(conversation);
    let duration = duration_of_conversation(conversation);

    conversation.set_field("size_of_conversation", json!(size));
    conversation.set_field("approx_depth", json!(depth));
    conversation.set_field("root_user", json!(root));
    conversation.set_field("time_to_first_response", json!(first_response));
    conversation.set_field("duration_of_conversation", json!(duration));
    conversation.ids_of_missing_tweets = Some(ids_of_missing_tweets(conversation));

    if let Some(brands) = brands {
        let fields = [
            (
                "time_to_first_brand_response",
                json!(time_to_first_brand_response(conversation, brands)),
            ),
            ("first_brand_response", first_brand_response(conversation, brands)),
            ("brands_tweeting", json!(brands_tweeting(conversation, brands))),
            ("nonbrands_tweeting", json!(nonbrands_tweeting(conversation, brands))),
            ("brands_mentioned", json!(brands_mentioned(conversation, brands))),
            ("nonbrands_mentioned", json!(nonbrands_mentioned(conversation, brands))),
        ];
        for (key, value) in fields {
            conversation.set_field(key, value);
        }
    }
}

/// `HH:MM:SS`, hours not wrapped at 24.
fn format_hms(seconds: i64) -> String {
    let (m, s) = (seconds.div_euclid(60), seconds.rem_euclid(60));
    let (h, m) = (m.div_euclid(60), m.rem_euclid(60));
    format!("{:02}:{:02}:{:02}", h, m, s)
}
