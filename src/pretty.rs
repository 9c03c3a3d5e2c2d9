pub(crate) fn human_readable<N: Into<u64>>(original: N) -> (f64, char) {
    let mut number = original.into() as f64;
    const SUFFIXES: [char; 7] = ['B', 'K', 'M', 'G', 'T', 'P', 'E'];
    let mut suffix_id = 0;
    while number >= 1024.0 && suffix_id < SUFFIXES.len() - 1 {
        number /= 1024.0;
        suffix_id += 1;
    }
    (number, SUFFIXES[suffix_id])
}

pub(crate) fn size_string<N: Into<u64>>(original: N) -> String {
    let (number, suffix) = human_readable(original);
    format!("{:.2}{}", number, suffix)
}
