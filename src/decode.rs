use crate::constants::KEY_VALUE_SEPARATOR;

/// Raw `key=value` segment at zero-based `index`.
///
/// Missing segments (fewer separators than `index`) come back empty; callers
/// treat an empty result as "field absent", never as zero.
pub fn segment(message: &str, separator: char, index: usize) -> &str {
    message.split(separator).nth(index).unwrap_or("")
}

/// Value of the segment at `index`, i.e. everything after its first `=`.
///
/// A segment without `=` yields an empty value.
pub fn value(message: &str, separator: char, index: usize) -> &str {
    split_pair(segment(message, separator, index))
        .map(|(_, value)| value)
        .unwrap_or("")
}

/// Value of the first segment whose key is `key`, for key-tagged messages.
pub fn tagged_value<'m>(message: &'m str, separator: char, key: &str) -> Option<&'m str> {
    pairs(message, separator).find_map(|(k, v)| (k == key).then_some(v))
}

/// Every well-formed `key=value` pair, in message order.
pub fn pairs(message: &str, separator: char) -> impl Iterator<Item = (&str, &str)> {
    message.split(separator).filter_map(split_pair)
}

fn split_pair(segment: &str) -> Option<(&str, &str)> {
    segment.split_once(KEY_VALUE_SEPARATOR)
}
