use proptest::prelude::*;

/// Strategy for message counts, including the empty case
pub fn message_count_strategy() -> impl Strategy<Value = u64> {
    0u64..120
}

/// Strategy for valid watermark pairs: `low < high`
pub fn watermark_strategy() -> impl Strategy<Value = (usize, usize)> {
    (2usize..40).prop_flat_map(|high| (Just(high), 0..high))
}

/// Strategy for topic names made of slash-separated levels
pub fn topic_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9]{0,7}", 1..4).prop_map(|levels| levels.join("/"))
}

/// Strategy for interleaved push (`true`) and pop (`false`) operations
pub fn push_pop_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..200)
}
