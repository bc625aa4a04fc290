//! Topic registration for MQTT modules.

use heapless::{String, Vec};

use super::traits::TopicCollector;
use crate::client::MAX_TOPIC_LEN;
use crate::packet::QoS;

/// Owned list of `(topic, qos)` pairs a module asked for, in order.
///
/// ```ignore
/// let mut registry = TopicRegistry::<8>::new();
/// module.register(&mut registry);
/// for (topic, qos) in registry.iter() {
///     client.subscribe(topic, qos).await?;
/// }
/// ```
#[derive(Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<(String<MAX_TOPIC_LEN>, QoS), MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `topic` into the registry.
    ///
    /// Returns `false` if the registry is full or the topic is too long.
    pub fn add_topic(&mut self, topic: &str, qos: QoS) -> bool {
        let mut owned = String::new();
        if owned.push_str(topic).is_err() {
            return false;
        }
        self.topics.push((owned, qos)).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.topics.iter().map(|(t, q)| (t.as_str(), *q))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

impl<const MAX_TOPICS: usize> TopicCollector for TopicRegistry<MAX_TOPICS> {
    fn add(&mut self, topic: &str, qos: QoS) -> bool {
        self.add_topic(topic, qos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_qos() {
        let mut registry = TopicRegistry::<2>::new();
        assert!(registry.add_topic("/topic/qos0", QoS::AtMostOnce));
        assert!(registry.add_topic("/topic/qos1", QoS::AtLeastOnce));
        assert!(!registry.add_topic("/topic/extra", QoS::AtMostOnce));

        let topics: std::vec::Vec<_> = registry.iter().collect();
        assert_eq!(
            topics,
            [
                ("/topic/qos0", QoS::AtMostOnce),
                ("/topic/qos1", QoS::AtLeastOnce)
            ]
        );
    }

    #[test]
    fn rejects_overlong_topics() {
        let mut registry = TopicRegistry::<1>::new();
        let long = [b'a'; MAX_TOPIC_LEN + 1];
        let long = core::str::from_utf8(&long).unwrap();
        assert!(!registry.add_topic(long, QoS::AtMostOnce));
        assert!(registry.is_empty());
    }
}
