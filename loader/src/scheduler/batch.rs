/// Splits a tier's eligible ids into dispatch batches of at most `size`.
///
/// Order is preserved and every id lands in exactly one batch. A `size` of 0
/// yields no batches (the tier is forgone).
pub fn partition<T>(items: &[T], size: usize) -> Vec<&[T]> {
    if size == 0 {
        return Vec::new();
    }
    items.chunks(size).collect()
}
