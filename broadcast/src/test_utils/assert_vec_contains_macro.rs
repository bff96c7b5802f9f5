/// Panics unless at least one element of the vector matches the pattern
macro_rules! assert_vec_contains {
    ($vector:expr, $pattern:pat if $cond:expr) => {{
        let vector = &$vector;
        let matched = vector.iter().any(|x| match x {
            $pattern if $cond => true,
            _ => false,
        });

        if !matched {
            panic!(
                "Vector had {} elements but none matched '{} if {}': {:?}",
                vector.len(),
                stringify!($pattern),
                stringify!($cond),
                vector
            );
        }
    }};

    ($vector:expr, $pattern:pat) => {
        assert_vec_contains!($vector, $pattern if true)
    };
}
