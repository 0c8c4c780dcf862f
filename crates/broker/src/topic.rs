//! Topics and topic filters
//!
//! Topics are `/`-separated levels (`prices/symbol/BTC`). Filters may use
//! `+` for exactly one level and a trailing `#` for the remaining levels,
//! including none, so `prices/#` matches `prices` itself.

use std::fmt;

use crate::error::ProtocolError;

const MAX_TOPIC_LEN: usize = 256;

fn check_common(raw: &str) -> Result<(), ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::InvalidTopic("empty".into()));
    }
    if raw.len() > MAX_TOPIC_LEN {
        return Err(ProtocolError::InvalidTopic(format!(
            "longer than {} bytes",
            MAX_TOPIC_LEN
        )));
    }
    if raw.contains('\0') {
        return Err(ProtocolError::InvalidTopic("contains NUL".into()));
    }
    Ok(())
}

/// Concrete topic a message is published on (no wildcards)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn new(raw: &str) -> Result<Self, ProtocolError> {
        check_common(raw)?;
        if raw.contains(['+', '#']) {
            return Err(ProtocolError::InvalidTopic(format!(
                "wildcard in publish topic {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(raw: &str) -> Result<Self, ProtocolError> {
        check_common(raw)?;
        let levels: Vec<&str> = raw.split('/').collect();
        for (i, level) in levels.iter().enumerate() {
            let is_last = i + 1 == levels.len();
            match *level {
                "#" if !is_last => {
                    return Err(ProtocolError::InvalidTopic(format!(
                        "'#' must be the last level in {:?}",
                        raw
                    )));
                }
                "#" | "+" => {}
                other if other.contains(['+', '#']) => {
                    return Err(ProtocolError::InvalidTopic(format!(
                        "wildcard must occupy a whole level in {:?}",
                        raw
                    )));
                }
                _ => {}
            }
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, topic: &Topic) -> bool {
        let mut filter = self.0.split('/');
        let mut levels = topic.0.split('/');
        loop {
            match (filter.next(), levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => {}
                (Some(f), Some(t)) if f == t => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> Topic {
        Topic::new(raw).unwrap()
    }

    fn f(raw: &str) -> TopicFilter {
        TopicFilter::new(raw).unwrap()
    }

    #[test]
    fn test_exact_match() {
        assert!(f("prices/update").matches(&t("prices/update")));
        assert!(!f("prices/update").matches(&t("prices/updates")));
        assert!(!f("prices/update").matches(&t("prices")));
        assert!(!f("prices").matches(&t("prices/update")));
    }

    #[test]
    fn test_single_level_wildcard() {
        assert!(f("prices/symbol/+").matches(&t("prices/symbol/BTC")));
        assert!(!f("prices/symbol/+").matches(&t("prices/symbol")));
        assert!(!f("prices/+").matches(&t("prices/symbol/BTC")));
        assert!(f("+/update").matches(&t("prices/update")));
    }

    #[test]
    fn test_multi_level_wildcard() {
        assert!(f("prices/#").matches(&t("prices/update")));
        assert!(f("prices/#").matches(&t("prices/symbol/BTC")));
        assert!(f("prices/#").matches(&t("prices")));
        assert!(f("#").matches(&t("anything/at/all")));
        assert!(!f("prices/#").matches(&t("news/update")));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(TopicFilter::new("").is_err());
        assert!(TopicFilter::new("prices/#/update").is_err());
        assert!(TopicFilter::new("prices/up+").is_err());
        assert!(TopicFilter::new("prices#").is_err());
    }

    #[test]
    fn test_publish_topic_rejects_wildcards() {
        assert!(Topic::new("prices/+").is_err());
        assert!(Topic::new("prices/#").is_err());
        assert!(Topic::new("").is_err());
        assert!(Topic::new("prices/update").is_ok());
    }
}
