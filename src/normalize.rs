//! Transaction description normalizer.
//!
//! Bank exports prefix descriptions with card-terminal noise ("PAGAMENTO POS
//! CRV* COFFEE SHOP"). The normalizer strips a fixed, ordered list of marker
//! patterns so the classifier sees only the merchant text.

use regex::Regex;

/// How a matched marker is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripMode {
    /// Remove every occurrence of the matched token itself.
    Token,
    /// Remove from the marker to the end of the string.
    ToEnd,
}

struct StripRule {
    regex: Regex,
    mode: StripMode,
}

/// Strips terminal noise from free-text transaction descriptions.
///
/// Rules apply in order, case-insensitively, each removing all of its
/// occurrences before the next rule runs. Whitespace runs collapse to a
/// single space and the result is trimmed; output may be empty, never fails.
pub struct DescriptionNormalizer {
    rules: Vec<StripRule>,
    whitespace: Regex,
}

impl DescriptionNormalizer {
    /// Build the normalizer with the default rule list.
    pub fn new() -> Self {
        // Keep this data, not control flow: extending coverage means adding
        // a (pattern, mode) pair, nothing else.
        let specs: &[(&str, StripMode)] = &[
            (r"pagamento tramite pos", StripMode::Token),
            (r"pagamento pos", StripMode::Token),
            (r"pagamento carta", StripMode::Token),
            (r"addebito diretto", StripMode::Token),
            (r"crv\*", StripMode::Token),
            (r"paypal \*", StripMode::Token),
            (r"sumup \*", StripMode::Token),
            (r"cod\.? ?operazione\b", StripMode::ToEnd),
            (r"data ora\b", StripMode::ToEnd),
            (r"carta n\.? ?\d*", StripMode::ToEnd),
        ];

        let rules = specs
            .iter()
            .map(|(pattern, mode)| StripRule {
                regex: Regex::new(&format!("(?i){pattern}")).expect("strip rule must compile"),
                mode: *mode,
            })
            .collect();

        Self {
            rules,
            whitespace: Regex::new(r"\s+").expect("whitespace rule must compile"),
        }
    }

    /// Normalize a raw description. Malformed or empty input is fine; it
    /// simply normalizes to itself (or to the empty string).
    pub fn normalize(&self, raw: &str) -> String {
        let mut text = raw.to_string();

        for rule in &self.rules {
            text = match rule.mode {
                StripMode::Token => rule.regex.replace_all(&text, "").into_owned(),
                StripMode::ToEnd => match rule.regex.find(&text) {
                    Some(m) => text[..m.start()].to_string(),
                    None => text,
                },
            };
        }

        self.whitespace.replace_all(&text, " ").trim().to_string()
    }
}

impl Default for DescriptionNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_pos_and_crv_markers() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize("PAGAMENTO POS CRV* COFFEE SHOP"), "COFFEE SHOP");
    }

    #[test]
    fn test_case_insensitive() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize("pagamento pos Crv* Bakery"), "Bakery");
    }

    #[test]
    fn test_to_end_rule_drops_trailing_noise() {
        let n = DescriptionNormalizer::new();
        assert_eq!(
            n.normalize("SUPERMARKET COD. OPERAZIONE 123456 DEL 01/02"),
            "SUPERMARKET"
        );
        assert_eq!(n.normalize("FUEL STATION CARTA N. 4421"), "FUEL STATION");
    }

    #[test]
    fn test_all_occurrences_removed() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize("CRV* FOO CRV* BAR"), "FOO BAR");
    }

    #[test]
    fn test_interior_whitespace_collapses() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize("FOO   PAGAMENTO POS   BAR"), "FOO BAR");
    }

    #[test]
    fn test_empty_and_noise_only_input() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("PAGAMENTO POS"), "");
    }

    #[test]
    fn test_clean_input_passes_through() {
        let n = DescriptionNormalizer::new();
        assert_eq!(n.normalize("Monthly rent"), "Monthly rent");
    }
}
