use core::fmt::Write;

use heapless::String;

use crate::constants::TOPIC_CAPACITY;

pub type TopicName = String<TOPIC_CAPACITY>;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    EmptyChannel,
    TooLong,
}

/// `channels/<channel-id>/publish`, used by publishers and consumers alike.
///
/// The channel id is agreed out of band; there is no discovery.
pub fn publish_topic(channel_id: &str) -> Result<TopicName, Error> {
    if channel_id.is_empty() {
        return Err(Error::EmptyChannel);
    }

    let mut topic = TopicName::new();
    write!(topic, "channels/{}/publish", channel_id).map_err(|_| Error::TooLong)?;
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_token_channels() {
        assert_eq!(
            publish_topic("3150959").unwrap().as_str(),
            "channels/3150959/publish"
        );
        assert_eq!(publish_topic("test").unwrap().as_str(), "channels/test/publish");
    }

    #[test]
    fn rejects_empty_and_oversized_channels() {
        assert_eq!(publish_topic(""), Err(Error::EmptyChannel));

        let long = "x".repeat(TOPIC_CAPACITY);
        assert_eq!(publish_topic(&long), Err(Error::TooLong));
    }
}
