//! Reply texts the bot sends back to Slack.
//!
//! All replies are plain text. User references use Slack's `<@U123>` mention
//! syntax so the client renders them as a clickable name.

pub const MESSAGE_REPLY: &str = "Haha, yeah.";

pub const READY_LINE: &str = "⚡️ calmbot is running!";

pub fn calm_reply(user_id: &str) -> String {
    format!("Thanks {}. I feel better now!", mention(user_id))
}

pub fn mention_greeting(user_id: &str) -> String {
    format!("Hi {}!", mention(user_id))
}

pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}
