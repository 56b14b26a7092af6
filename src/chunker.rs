//! Slicing a blob into payload-sized chunks and back.

/// Splits a blob into `⌈len / data_size⌉` chunks of at most `data_size`
/// bytes, left to right. The final chunk may be short; an empty blob yields
/// no chunks.
pub fn split(blob: &[u8], data_size: usize) -> Vec<Vec<u8>> {
    blob.chunks(data_size).map(<[u8]>::to_vec).collect()
}

/// Concatenates an ordered chunk list back into a blob. No padding is added
/// or removed; the blob's length is recovered from the chunks themselves.
pub fn join(chunks: &[Vec<u8>]) -> Vec<u8> {
    chunks.concat()
}
