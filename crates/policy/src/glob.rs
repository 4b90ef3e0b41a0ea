/// Matches a dotted tool path against a rule pattern where `*` matches
/// exactly one segment and `**` matches any suffix of segments (§4.B).
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let path_segments: Vec<&str> = path.split('.').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            if pattern.len() == 1 {
                return true;
            }
            (0..=path.len()).any(|i| match_segments(&pattern[1..], &path[i..]))
        }
        Some(&"*") => {
            !path.is_empty() && match_segments(&pattern[1..], &path[1..])
        }
        Some(seg) => {
            !path.is_empty() && path[0] == *seg && match_segments(&pattern[1..], &path[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(path_matches("calendar.list", "calendar.list"));
        assert!(!path_matches("calendar.list", "calendar.update"));
    }

    #[test]
    fn single_segment_wildcard() {
        assert!(path_matches("calendar.*", "calendar.list"));
        assert!(!path_matches("calendar.*", "calendar.list.extra"));
    }

    #[test]
    fn suffix_wildcard() {
        assert!(path_matches("github.**", "github.issues.close"));
        assert!(path_matches("github.**", "github.issues"));
        assert!(path_matches("**", "anything.at.all"));
    }
}
