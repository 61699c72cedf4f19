//! Positional digit diffing.

/// Returns the ascending indices where `current` differs from `previous`.
///
/// With no previous observation every index counts as changed. A position
/// missing from a shorter `previous` also counts as changed.
pub fn diff(previous: Option<&[char]>, current: &[char]) -> Vec<usize> {
    match previous {
        None => (0..current.len()).collect(),
        Some(previous) => current
            .iter()
            .enumerate()
            .filter(|&(i, c)| previous.get(i) != Some(c))
            .map(|(i, _)| i)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BLANK;

    #[test]
    fn first_observation_changes_everything() {
        assert_eq!(diff(None, &['1', '2', '3', '4']), vec![0, 1, 2, 3]);
        assert!(diff(None, &[]).is_empty());
    }

    #[test]
    fn identical_sequences_have_no_changes() {
        let digits = [BLANK, '9', '0', '5'];
        assert!(diff(Some(&digits), &digits).is_empty());
    }

    #[test]
    fn only_differing_positions_are_reported() {
        let before = [BLANK, '9', '0', '5', '0', '7'];
        let after = [BLANK, '9', '0', '5', '0', '8'];
        assert_eq!(diff(Some(&before), &after), vec![5]);

        let before = [BLANK, '9', '5', '9', '5', '9'];
        let after = ['1', '0', '0', '0', '0', '0'];
        assert_eq!(diff(Some(&before), &after), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn changes_are_ascending() {
        let before = ['1', '2', '3', '4'];
        let after = ['9', '2', '9', '4'];
        assert_eq!(diff(Some(&before), &after), vec![0, 2]);
    }
}
