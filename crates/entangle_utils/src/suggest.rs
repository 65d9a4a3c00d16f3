/// Closest candidate by edit distance, if any is near enough to be a plausible typo.
///
/// Comparison ignores a leading qualification (`ns::Type` matches `Type`).
pub fn find_best_match<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let target = unqualified(target);
    let threshold = if target.chars().count() < 4 { 1 } else { 3 };

    let mut best: Option<(usize, &'a str)> = None;
    for candidate in candidates {
        let distance = levenshtein_distance(target, unqualified(candidate));
        if distance > threshold {
            continue;
        }
        if best.is_none_or(|(best_distance, _)| distance < best_distance) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, candidate)| candidate)
}

fn unqualified(name: &str) -> &str {
    name.rsplit([':', '.'])
        .next()
        .filter(|tail| !tail.is_empty())
        .unwrap_or(name)
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let right: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];

    for (i, left_char) in s1.chars().enumerate() {
        current[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let cost = usize::from(left_char != *right_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}
