/// Panics unless every element of the vector matches the pattern at the same position, and the
/// vector has exactly as many elements as patterns were given
#[allow(unused)]
macro_rules! assert_vec_match {
    ($vector:expr, [$($pattern:pat),* $(,)*]) => {{
        let vector = &$vector;
        let mut index = 0usize;
        $(
            match vector.get(index) {
                Some($pattern) => (),
                other => panic!(
                    "Match failed on index {}: {:?} vs {}",
                    index,
                    other,
                    stringify!($pattern)
                ),
            }

            index += 1;
        )*

        if vector.len() != index {
            panic!(
                "Vector contained {} elements but {} were expected: {:?}",
                vector.len(),
                index,
                vector
            );
        }
    }};
}
