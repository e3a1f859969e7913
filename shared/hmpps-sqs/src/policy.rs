//! Error visibility timeout policy
//!
//! When a message fails processing it is hidden for a number of seconds
//! before the provider delivers it again. The number comes from a schedule
//! indexed by the delivery attempt, picked from (most specific first) the
//! event type of the message, the queue, or the process wide default.

use std::collections::HashMap;

use serde_json::Value;

use crate::client::{MessageAttributes, EVENT_TYPE};
use crate::config::HmppsSqsProperties;

/// Per queue schedules, the queue default plus per event type overrides
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorVisibilityTimeouts {
    /// Schedule used for every event type without an override
    pub error_visibility_timeout: Vec<i32>,
    /// Overrides keyed by event type
    pub event_error_visibility_timeout: HashMap<String, Vec<i32>>,
}

/// Maps a failed delivery to the visibility timeout before the next one
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisibilityTimeoutPolicy {
    default_schedule: Vec<i32>,
}

impl VisibilityTimeoutPolicy {
    /// Creates a policy falling back to `default_schedule`
    #[must_use]
    pub const fn new(default_schedule: Vec<i32>) -> Self {
        Self { default_schedule }
    }

    /// Creates the policy for a configuration, falling back to its
    /// `default_error_visibility_timeout`
    #[must_use]
    pub fn from_properties(properties: &HmppsSqsProperties) -> Self {
        Self::new(properties.default_error_visibility_timeout.clone())
    }

    #[must_use]
    pub fn default_schedule(&self) -> &[i32] {
        &self.default_schedule
    }

    /// Picks the schedule that applies to an event type on a queue
    ///
    /// Empty schedules never win, they fall through to the next level.
    #[must_use]
    pub fn schedule_for<'a>(
        &'a self,
        timeouts: &'a ErrorVisibilityTimeouts,
        event_type: Option<&str>,
    ) -> &'a [i32] {
        event_type
            .and_then(|event_type| timeouts.event_error_visibility_timeout.get(event_type))
            .filter(|schedule| !schedule.is_empty())
            .or_else(|| {
                Some(&timeouts.error_visibility_timeout).filter(|schedule| !schedule.is_empty())
            })
            .unwrap_or(&self.default_schedule)
    }

    /// Seconds to hide a message that failed on its `receive_count`th delivery
    ///
    /// The last delivery before the provider moves the message to its DLQ
    /// (`receive_count == max_receive_count`) is never delayed.
    #[must_use]
    pub fn next_timeout(
        &self,
        timeouts: &ErrorVisibilityTimeouts,
        event_type: Option<&str>,
        receive_count: u32,
        max_receive_count: Option<u32>,
    ) -> i32 {
        if max_receive_count == Some(receive_count) {
            return 0;
        }

        let schedule = self.schedule_for(timeouts, event_type);
        let index = usize::try_from(receive_count.max(1) - 1).unwrap_or(usize::MAX);
        schedule
            .get(index)
            .or_else(|| schedule.last())
            .copied()
            .unwrap_or(0)
    }
}

/// Finds the event type of a message
///
/// Messages published through a topic without raw delivery carry the
/// attributes inside the body (`MessageAttributes.eventType.Value`); raw
/// messages carry them as provider message attributes. The body wins.
#[must_use]
pub fn extract_event_type(body: &str, message_attributes: &MessageAttributes) -> Option<String> {
    event_type_from_body(body).or_else(|| {
        message_attributes
            .get(EVENT_TYPE)
            .and_then(|value| value.string_value.clone())
    })
}

fn event_type_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("MessageAttributes")?
        .get(EVENT_TYPE)?
        .get("Value")?
        .as_str()
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::client::MessageAttributeValue;

    fn timeouts(queue: &[i32], events: &[(&str, &[i32])]) -> ErrorVisibilityTimeouts {
        ErrorVisibilityTimeouts {
            error_visibility_timeout: queue.to_vec(),
            event_error_visibility_timeout: events
                .iter()
                .map(|(event, schedule)| ((*event).to_string(), schedule.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_schedule_indexed_from_one() {
        let policy = VisibilityTimeoutPolicy::default();
        let timeouts = timeouts(&[1, 2], &[]);

        assert_eq!(policy.next_timeout(&timeouts, None, 1, None), 1);
        assert_eq!(policy.next_timeout(&timeouts, None, 2, None), 2);
    }

    #[test]
    fn test_schedule_clamps_to_last_element() {
        let policy = VisibilityTimeoutPolicy::default();
        let timeouts = timeouts(&[3, 7, 11], &[]);

        for receive_count in 3..50 {
            assert_eq!(policy.next_timeout(&timeouts, None, receive_count, None), 11);
        }
        assert_eq!(policy.next_timeout(&timeouts, None, u32::MAX, None), 11);
    }

    #[test]
    fn test_empty_schedules_give_zero() {
        let policy = VisibilityTimeoutPolicy::default();
        let timeouts = timeouts(&[], &[("X", &[])]);

        for receive_count in 1..5 {
            assert_eq!(policy.next_timeout(&timeouts, Some("X"), receive_count, None), 0);
            assert_eq!(policy.next_timeout(&timeouts, None, receive_count, None), 0);
        }
    }

    #[test]
    fn test_final_attempt_is_immediate() {
        let policy = VisibilityTimeoutPolicy::default();
        let timeouts = timeouts(&[1, 2], &[]);

        assert_eq!(policy.next_timeout(&timeouts, None, 1, Some(3)), 1);
        assert_eq!(policy.next_timeout(&timeouts, None, 2, Some(3)), 2);
        assert_eq!(policy.next_timeout(&timeouts, None, 3, Some(3)), 0);
    }

    #[test]
    fn test_event_schedule_wins() {
        let policy = VisibilityTimeoutPolicy::default();
        let timeouts = timeouts(&[5], &[("X", &[0, 1])]);

        assert_eq!(policy.next_timeout(&timeouts, Some("X"), 1, None), 0);
        assert_eq!(policy.next_timeout(&timeouts, Some("X"), 2, None), 1);
        assert_eq!(policy.next_timeout(&timeouts, Some("Y"), 1, None), 5);
        assert_eq!(policy.next_timeout(&timeouts, None, 1, None), 5);
    }

    #[test]
    fn test_default_schedule_used_last() {
        let policy = VisibilityTimeoutPolicy::new(vec![9, 10]);

        assert_eq!(policy.next_timeout(&timeouts(&[], &[]), None, 2, None), 10);
        assert_eq!(policy.next_timeout(&timeouts(&[4], &[]), None, 2, None), 4);
        assert_eq!(
            policy.next_timeout(&timeouts(&[], &[("X", &[])]), Some("X"), 1, None),
            9
        );
    }

    #[test]
    fn test_default_schedule_from_properties() {
        let properties =
            HmppsSqsProperties::from_toml("default_error_visibility_timeout = [42]").unwrap();
        let policy = VisibilityTimeoutPolicy::from_properties(&properties);

        assert_eq!(policy.default_schedule(), &[42]);
        assert_eq!(policy.next_timeout(&timeouts(&[], &[]), None, 1, None), 42);
        assert_eq!(policy.next_timeout(&timeouts(&[], &[]), Some("X"), 3, None), 42);
        assert_eq!(policy.next_timeout(&timeouts(&[7], &[]), None, 1, None), 7);
    }

    #[test]
    fn test_event_type_from_wrapped_body() {
        let body = r#"{"Type":"Notification","Message":"{}","MessageAttributes":{"eventType":{"Type":"String","Value":"prison-offender-events.prisoner.released"}}}"#;
        let mut attributes = MessageAttributes::new();
        attributes.insert(EVENT_TYPE.to_string(), MessageAttributeValue::string("other"));

        assert_eq!(
            extract_event_type(body, &attributes).as_deref(),
            Some("prison-offender-events.prisoner.released")
        );
    }

    #[test]
    fn test_event_type_from_message_attributes() {
        let mut attributes = MessageAttributes::new();
        attributes.insert(
            EVENT_TYPE.to_string(),
            MessageAttributeValue::string("prisoner.received"),
        );

        assert_eq!(
            extract_event_type(r#"{"id":1}"#, &attributes).as_deref(),
            Some("prisoner.received")
        );
        assert_eq!(
            extract_event_type("not json at all", &attributes).as_deref(),
            Some("prisoner.received")
        );
    }

    #[test]
    fn test_event_type_missing() {
        assert_eq!(extract_event_type("{}", &MessageAttributes::new()), None);
        assert_eq!(
            extract_event_type(
                r#"{"MessageAttributes":{"eventType":{"Value":42}}}"#,
                &MessageAttributes::new()
            ),
            None
        );
    }
}
