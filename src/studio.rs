use reqwest::Url;

pub const DEFAULT_STUDIO_URL: &str = "http://localhost:8501";

const IMPORT_PLACEHOLDER: &str = "Imported Audio";

/// Builds a deep link into the companion studio editor for a generated
/// track. Pure: no state, no network; safe to call repeatedly. A blank
/// prompt falls back to the studio's import placeholder. Both values are
/// url-encoded by the query serializer, so reserved characters never leak
/// into the link.
pub fn build_studio_link(base: &Url, filename: &str, prompt: &str) -> Url {
    let prompt = prompt.trim();
    let prompt = if prompt.is_empty() { IMPORT_PLACEHOLDER } else { prompt };
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("file", filename).append_pair("prompt", prompt);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn studio_base() -> Url {
        Url::parse(DEFAULT_STUDIO_URL).expect("default studio URL parses")
    }

    #[test]
    fn handles_reserved_characters_are_escaped() {
        let url = build_studio_link(&studio_base(), "a b.wav", "jazz & blues");
        assert_eq!(url.as_str(), "http://localhost:8501/?file=a+b.wav&prompt=jazz+%26+blues");

        let query = url.query().expect("query present");
        assert!(!query.contains(' '), "space must be escaped");
        assert!(!query.contains("jazz &"), "ampersand must not survive unescaped");
    }

    #[test]
    fn handles_blank_prompt_falls_back_to_placeholder() {
        let url = build_studio_link(&studio_base(), "track_001.wav", "");
        assert_eq!(url.as_str(), "http://localhost:8501/?file=track_001.wav&prompt=Imported+Audio");

        let url = build_studio_link(&studio_base(), "track_001.wav", "   ");
        assert_eq!(url.query(), Some("file=track_001.wav&prompt=Imported+Audio"));
    }

    #[test]
    fn handles_empty_filename_still_links() {
        let url = build_studio_link(&studio_base(), "", "lofi beat");
        assert_eq!(url.query(), Some("file=&prompt=lofi+beat"));
    }

    #[test]
    fn handles_round_trip_decodes_to_inputs() {
        let url = build_studio_link(&studio_base(), "a b.wav", "jazz & blues");
        let pairs: Vec<(String, String)> =
            url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(
            pairs,
            vec![
                ("file".to_string(), "a b.wav".to_string()),
                ("prompt".to_string(), "jazz & blues".to_string()),
            ]
        );
    }
}
