//! Topic name and filter validation
//!
//! Rules from MQTT 3.1.1 §4.7: names never contain wildcards; in filters
//! `#` must be alone on the last level and `+` must occupy a whole level.

/// Validate a topic name as used in PUBLISH.
pub fn validate_topic_name(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }
    if topic.len() > 65_535 {
        return Err("topic name exceeds maximum length");
    }
    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }
    if topic.contains('+') || topic.contains('#') {
        return Err("topic name cannot contain wildcards");
    }
    Ok(())
}

/// Validate a topic filter as used in SUBSCRIBE/UNSUBSCRIBE.
pub fn validate_topic_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty");
    }
    if filter.len() > 65_535 {
        return Err("topic filter exceeds maximum length");
    }
    if filter.contains('\0') {
        return Err("topic filter cannot contain null character");
    }

    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') {
            if level != "#" {
                return Err("multi-level wildcard must occupy entire level");
            }
            if levels.peek().is_some() {
                return Err("multi-level wildcard must be last level");
            }
        }
        if level.contains('+') && level != "+" {
            return Err("single-level wildcard must occupy entire level");
        }
    }
    Ok(())
}

/// Check whether a concrete topic name matches a filter.
///
/// `$`-prefixed topics are never matched by filters starting with a
/// wildcard.
pub fn match_topics(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (None, None) => return true,
            (None, Some(_)) => return false,
            (Some("#"), _) => return true,
            (Some(_), None) => return false,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(level)) => {
                if expected != level {
                    return false;
                }
            }
        }
    }
}
