//! Iterator helpers.

use std::iter::Zip;

/// Zips two iterators that are required to have the same length.
///
/// [`Iterator::zip`] silently stops at the end of the shorter iterator, which hides bugs when
/// copying landmark or tensor data between buffers of mismatched sizes. This function panics
/// instead.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "`zip_exact` called on iterators with different lengths"
    );

    a.zip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zips_equal_lengths() {
        let pairs = zip_exact([1, 2, 3], ['a', 'b', 'c']).collect::<Vec<_>>();
        assert_eq!(pairs, [(1, 'a'), (2, 'b'), (3, 'c')]);
    }

    #[test]
    #[should_panic(expected = "different lengths")]
    fn panics_on_length_mismatch() {
        zip_exact([1, 2, 3], [1, 2]).for_each(drop);
    }
}
