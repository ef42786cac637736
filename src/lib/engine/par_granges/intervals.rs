use std::sync::Arc;

use noodles::sam;

use super::types::Bin;

/// Split every reference into consecutive bins of at most `bin_size` bases.
///
/// References with a non-positive length produce no bins. The last bin of a
/// reference may be shorter than `bin_size`.
pub fn partition_references<S: AsRef<str>>(references: &[(S, i64)], bin_size: u64) -> Vec<Bin> {
    let step = bin_size.max(1);
    let mut bins = Vec::new();
    for (tid, (name, length)) in references.iter().enumerate() {
        if *length <= 0 {
            continue;
        }
        let length = *length as u64;
        let contig: Arc<str> = Arc::from(name.as_ref());
        let mut start = 0u64;
        while start < length {
            let end = start.saturating_add(step).min(length);
            bins.push(Bin {
                tid,
                contig: Arc::clone(&contig),
                start,
                end,
            });
            start = end;
        }
    }
    bins
}

/// Reference names and lengths in header order.
pub fn header_references(header: &sam::Header) -> Vec<(String, i64)> {
    header
        .reference_sequences()
        .iter()
        .map(|(name, sequence)| {
            let contig = String::from_utf8_lossy(name.as_ref()).into_owned();
            let length = i64::try_from(sequence.length().get()).unwrap_or(i64::MAX);
            (contig, length)
        })
        .collect()
}
