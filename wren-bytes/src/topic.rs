//! Topic name and topic filter handling

/// Checks if a topic is valid for publishing.
///
/// Topic names must be non-empty and may not contain wildcards.
pub fn valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains('+') && !topic.contains('#')
}

/// Checks if a filter is valid for subscribing.
///
/// A `#` may only appear as the last character of the filter, alone in its
/// level. A `+` must occupy a whole level.
pub fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level == "#" {
            return levels.peek().is_none();
        }

        if level.len() > 1 && (level.contains('+') || level.contains('#')) {
            return false;
        }
    }

    true
}

/// Checks if the given topic matches the given filter.
///
/// Assumes that both the topic and the filter are valid.
pub fn matches(topic: &str, filter: &str) -> bool {
    // Topics starting with '$' are reserved and never match wildcard levels
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        let f = match filter_levels.next() {
            Some(f) => f,
            None => return topic_levels.next().is_none(),
        };

        if f == "#" {
            return true;
        }

        let t = match topic_levels.next() {
            Some(t) => t,
            None => return false,
        };

        if f != "+" && f != t {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_with_wildcards_are_invalid() {
        assert!(valid_topic("a/b/c"));
        assert!(!valid_topic(""));
        assert!(!valid_topic("a/+/c"));
        assert!(!valid_topic("a/b/#"));
    }

    #[test]
    fn wildcards_must_occupy_whole_levels() {
        assert!(valid_filter("a/b/c"));
        assert!(valid_filter("a/+/c"));
        assert!(valid_filter("a/b/#"));
        assert!(valid_filter("#"));
        assert!(valid_filter("+"));
        assert!(!valid_filter(""));
        assert!(!valid_filter("a/b#"));
        assert!(!valid_filter("a/#/c"));
        assert!(!valid_filter("a/b+/c"));
    }

    #[test]
    fn wildcard_matching() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(matches("a/b/c", "a/+/c"));
        assert!(matches("a/b/c", "a/#"));
        assert!(matches("a/b/c", "#"));
        assert!(matches("a", "a/#"));
        assert!(!matches("a/b/c", "a/b"));
        assert!(!matches("a/b", "a/b/c"));
        assert!(!matches("a/b/c", "a/+"));
    }

    #[test]
    fn reserved_topics_do_not_match_leading_wildcards() {
        assert!(!matches("$SYS/uptime", "#"));
        assert!(!matches("$SYS/uptime", "+/uptime"));
        assert!(matches("$SYS/uptime", "$SYS/uptime"));
        assert!(matches("$SYS/uptime", "$SYS/#"));
    }
}
