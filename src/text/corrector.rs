use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

use crate::text::rules::RuleSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrectorConfig {
    /// Also rewrite isolated prose letters into Greek symbols (` a ` to ` α `
    /// and similar). Only useful on pages that are mostly formulas.
    pub aggressive_symbol_fixes: bool,
}

static CAMEL_CASE: Lazy<RuleSet> =
    Lazy::new(|| RuleSet::patterns(&[("camel-case split", r"([a-z])([A-Z])", "$1 $2")]));

static WORD_FIXES: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::literals_longest_first(
        "word confusion",
        &[
            ("Itcontains", "It contains"),
            ("Ithas", "It has"),
            ("Itis", "It is"),
            ("Itwas", "It was"),
            ("multiine", "multiline"),
            ("rnulti", "multi"),
            ("sorne", "some"),
            ("frorn", "from"),
            ("tlie", "the"),
            ("witli", "with"),
            ("thern", "them"),
            ("exarnple", "example"),
        ],
    )
});

static SYMBOL_FIXES: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::literals_longest_first(
        "math symbol",
        &[
            ("N(u|", "N(μ|"),
            ("N(u ", "N(μ "),
            ("0,07)", "0,σ²)"),
            ("2g?", "2σ²"),
            ("1/0?", "1/σ²"),
            ("<9", "²"),
            ("x1,...,", "x₁,...,"),
            ("{21,", "{x₁,"),
            (",2v}", ",xₙ}"),
            ("21,...,2v", "x₁,...,xₙ"),
            (",...,2v", ",...,xₙ"),
            (" « ", " | "),
            ("(£)", "(e)"),
            ("x*t*", "x² +"),
            ("X*t*", "x² +"),
            ("/2a", "/ 2a"),
            ("V(", "√("),
            ("N16", "√16"),
            ("+ V", "+ √"),
            ("- V", "- √"),
        ],
    )
    .then(RuleSet::patterns(&[
        ("squared variable", r"\b([abnx])\?", "${1}²"),
        ("squared variable", r"\bx7\b", "x²"),
        ("squared function", r"\b(sin|cos|tan)\?", "${1}²"),
        ("limit arrow", r"lim\(\s*([a-zA-Z])\s*(?:->|—|–|-)", "lim(${1}→"),
    ]))
});

/// Rules that turn single letters of prose into symbols. They help on dense
/// formula pages and damage ordinary text, so they are opt-in.
static AGGRESSIVE_SYMBOL_FIXES: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::literals_longest_first(
        "aggressive symbol",
        &[
            ("Palo)", "p(μ|σ)"),
            ("ng?", "√(1/(2πσ²))"),
            ("XP", "exp"),
            ("pk | 1)", "p(x|μ) ="),
            ("pk |", "p(x|"),
            ("p(x| 1)", "p(x|μ) ="),
            ("pk)", "p(x)"),
            ("Mel)", "N(x|μ,1)"),
            ("((x-μ)² ²)", "exp(-½(x-μ)²)"),
            ("(² ²)", ""),
            (" ²)", "²)"),
            ("eer", "1/√(2π)"),
            ("ğe", "(x-μ)²"),
            (" 2v ", " xₙ "),
            ("x;", "xᵢ"),
            (" 1 =?", ""),
            ("2 1 =?", ""),
            ("exp 2σ²", "exp(-μ²/2σ²)"),
            ("σ ∑", "σ⁻²"),
            ("o ∑", "σ⁻²"),
            ("o-*", "σ⁻²"),
            ("p( |", "p(μ|"),
            ("p(|", "p(μ|"),
            ("p(j |", "p(μ|"),
            (" o)", " σ)"),
            (" o ", " σ "),
            (" a)", " α)"),
            (" &)", " α)"),
            ("0?", "σ²"),
            ("o?", "σ²"),
            ("# O", ""),
            ("p | |", "μ|α"),
            (". N", ". √"),
            ("T=", "π ="),
            ("T ", "π "),
            ("~ ", "∞ "),
            ("~)", "∞)"),
            ("J ", "∫ "),
            ("Jx", "∫x"),
            ("> ", "∑ "),
            (">(", "∑("),
            (" a ", " α "),
            (" B ", " β "),
            (" y ", " γ "),
            (" 5 ", " δ "),
            ("@ ", "θ "),
            ("9 ", "θ "),
        ],
    )
    // undo the alpha rewrite inside common phrases
    .then(RuleSet::literals_longest_first(
        "article repair",
        &[
            ("to α nicer", "to a nicer"),
            ("α nicer", "a nicer"),
            ("α set of", "a set of"),
            ("α set", "a set"),
        ],
    ))
});

static SPACING: Lazy<RuleSet> = Lazy::new(|| {
    RuleSet::patterns(&[
        // leading indentation is kept for code detection
        ("collapse spaces", r"([^ \n]) {2,}", "$1 "),
        ("space before punctuation", r" +([.,!?;:])", "$1"),
        ("space after punctuation", r"([.,!?;:])([A-Za-z])", "$1 $2"),
        ("blank lines", r"\n{3,}", "\n\n"),
    ])
});

/// Deterministic cleanup of raw OCR text before classification.
#[derive(Debug, Clone, Default)]
pub struct OcrTextCorrector {
    config: CorrectorConfig,
}

impl OcrTextCorrector {
    pub fn new(config: CorrectorConfig) -> Self {
        Self { config }
    }

    pub fn correct(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let text: String = raw.nfc().collect();
        let text = split_camel_case(&text);
        let text = WORD_FIXES.apply(&text);
        let mut text = SYMBOL_FIXES.apply(&text);
        if self.config.aggressive_symbol_fixes {
            text = AGGRESSIVE_SYMBOL_FIXES.apply(&text);
        }
        let text = normalize_spacing(&text);

        if text != raw {
            let changed = raw
                .split_whitespace()
                .zip(text.split_whitespace())
                .filter(|(a, b)| a != b)
                .count();
            info!(changed, "OCR post-processing corrected words");
        } else {
            debug!("OCR post-processing made no changes");
        }
        text
    }
}

pub fn split_camel_case(text: &str) -> String {
    CAMEL_CASE.apply(text)
}

/// Space collapsing, punctuation spacing and blank-line capping.
pub fn normalize_spacing(text: &str) -> String {
    SPACING.apply(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn correct(text: &str) -> String {
        OcrTextCorrector::default().correct(text)
    }

    #[test]
    fn splits_glued_words() {
        assert_eq!(correct("Itcontains sorne text"), "It contains some text");
        assert_eq!(split_camel_case("helloWorld"), "hello World");
    }

    #[test]
    fn fixes_squared_variables() {
        assert_eq!(correct("x7"), "x²");
        assert_eq!(correct("y = x? + b?"), "y = x² + b²");
        assert_eq!(correct("when?"), "when?");
        assert_eq!(correct("sin?(x)"), "sin²(x)");
    }

    #[test]
    fn restores_limit_arrow() {
        assert_eq!(correct("lim(x—0) sin(x)/x"), "lim(x→0) sin(x)/x");
        assert_eq!(correct("lim(x->0) f(x)"), "lim(x→0) f(x)");
    }

    #[test]
    fn cleans_spacing_and_punctuation() {
        assert_eq!(correct("one  two , three.Four"), "one two, three. Four");
        assert_eq!(correct("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(correct("    indented  code"), "    indented code");
    }

    #[test]
    fn aggressive_fixes_are_opt_in() {
        let text = "let a be T = 3";
        assert_eq!(correct(text), text);

        let aggressive = OcrTextCorrector::new(CorrectorConfig {
            aggressive_symbol_fixes: true,
        });
        assert_eq!(aggressive.correct(text), "let α be π = 3");
        assert_eq!(aggressive.correct("pick a set of"), "pick a set of");
    }

    #[test]
    fn spacing_steps_are_a_fixed_point() {
        let inputs = [
            "camelCase andMore",
            "x  .y  ,z",
            "one   two\n\n\n\nthree ;four",
            "  indent   with  gaps .End",
        ];
        for input in inputs {
            let split = split_camel_case(input);
            assert_eq!(split_camel_case(&split), split);

            let spaced = normalize_spacing(input);
            assert_eq!(normalize_spacing(&spaced), spaced);
        }
    }

    #[test]
    fn empty_text_stays_empty() {
        assert_eq!(correct(""), "");
    }
}
