use std::path::Path;

/// Returns the first keyword contained in `candidate`, compared case-insensitively.
///
/// Keywords are expected to be lowercase already; empty keywords never match.
pub fn first_keyword_in<'k>(candidate: &str, keywords: &[&'k str]) -> Option<&'k str> {
    if candidate.is_empty() {
        return None;
    }
    let candidate_lower = candidate.to_lowercase();
    keywords
        .iter()
        .copied()
        .find(|keyword| !keyword.is_empty() && candidate_lower.contains(keyword))
}

/// Lowercased final component of an executable path.
///
/// Both `/` and `\` count as separators so Win32 paths split the same way on every host.
pub fn file_name_lower(path: &Path) -> Option<String> {
    let path = path.to_string_lossy();
    let name = path.rsplit(['/', '\\']).next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitive_substring() {
        let keywords = ["chrome", "code"];
        assert_eq!(
            first_keyword_in("index.html - Visual Studio Code", &keywords),
            Some("code")
        );
        assert_eq!(first_keyword_in("Google CHROME", &keywords), Some("chrome"));
        assert_eq!(first_keyword_in("Terminal", &keywords), None);
    }

    #[test]
    fn empty_inputs_never_match() {
        assert_eq!(first_keyword_in("", &["a"]), None);
        assert_eq!(first_keyword_in("anything", &[""]), None);
        assert_eq!(first_keyword_in("anything", &[]), None);
    }

    #[test]
    fn keyword_order_decides_between_hits() {
        assert_eq!(first_keyword_in("chrome code", &["code", "chrome"]), Some("code"));
    }

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(
            file_name_lower(Path::new(r"C:\Program Files\Google\Chrome.EXE")).as_deref(),
            Some("chrome.exe")
        );
        assert_eq!(
            file_name_lower(Path::new("/usr/share/code/code")).as_deref(),
            Some("code")
        );
        assert_eq!(file_name_lower(Path::new("")), None);
        assert_eq!(file_name_lower(Path::new("/opt/app/")), None);
    }
}
