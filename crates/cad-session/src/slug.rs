pub const MAX_SLUG_LEN: usize = 40;
pub const FALLBACK_SLUG: &str = "model";

/// File-name stem derived from a prompt.
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9]` into one
/// `_`, trims separators from both ends and caps the length. The output only
/// contains characters the function keeps, so applying it twice changes nothing.
pub fn slugify(prompt: &str) -> String {
    let mut slug = String::with_capacity(prompt.len().min(MAX_SLUG_LEN));
    let mut separator = false;

    for ch in prompt.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if separator && !slug.is_empty() {
                if slug.len() + 1 >= MAX_SLUG_LEN {
                    break;
                }
                slug.push('_');
            }
            separator = false;
            slug.push(ch);
            if slug.len() >= MAX_SLUG_LEN {
                break;
            }
        } else {
            separator = true;
        }
    }

    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{FALLBACK_SLUG, MAX_SLUG_LEN, slugify};

    #[test]
    fn collapses_and_trims_separators() {
        assert_eq!(slugify("  A Phone--Stand!! "), "a_phone_stand");
        assert_eq!(slugify("bracket (v2) / 3mm"), "bracket_v2_3mm");
    }

    #[test]
    fn plate_prompt_is_capped() {
        let slug = slugify("a 10 by 20 by 2 plate with a 5 millimeter hole");
        assert_eq!(slug, "a_10_by_20_by_2_plate_with_a_5_millimete");
        assert_eq!(slug.len(), MAX_SLUG_LEN);
    }

    #[test]
    fn truncation_never_leaves_a_trailing_separator() {
        let prompt = format!("{} tail", "x".repeat(MAX_SLUG_LEN - 1));
        let slug = slugify(&prompt);
        assert_eq!(slug, "x".repeat(MAX_SLUG_LEN - 1));
    }

    #[test]
    fn empty_and_punctuation_fall_back() {
        assert_eq!(slugify(""), FALLBACK_SLUG);
        assert_eq!(slugify("?!// ...  --"), FALLBACK_SLUG);
        assert_eq!(slugify("日本語"), FALLBACK_SLUG);
    }

    #[test]
    fn is_idempotent() {
        for prompt in [
            "",
            "!!!",
            "a 10 by 20 by 2 plate with a 5 millimeter hole",
            "Gear__With   TEETH",
            "ünïcödé mixed 42",
        ] {
            let once = slugify(prompt);
            assert_eq!(slugify(&once), once, "prompt {prompt:?}");
        }
    }
}
