//! Math line detection, classification and LaTeX rewriting.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::core::model::{Formula, FormulaKind};
use crate::text::rules::{Rule, RuleSet};

const MATH_CHARS: &[char] = &[
    '∫', '∑', '∏', '√', '∞', '∂', '≈', '≠', '≤', '≥', '±', '∈', '∉', '×', '÷', 'α', 'β', 'γ', 'δ',
    'ε', 'θ', 'λ', 'μ', 'π', 'σ', 'ω',
];

/// Unicode symbols and their LaTeX commands.
const SYMBOL_MAP: &[(&str, &str)] = &[
    ("α", r"\alpha "),
    ("β", r"\beta "),
    ("γ", r"\gamma "),
    ("δ", r"\delta "),
    ("ε", r"\epsilon "),
    ("θ", r"\theta "),
    ("λ", r"\lambda "),
    ("μ", r"\mu "),
    ("π", r"\pi "),
    ("σ", r"\sigma "),
    ("ω", r"\omega "),
    ("∫", r"\int "),
    ("∑", r"\sum "),
    ("∏", r"\prod "),
    ("√", r"\sqrt "),
    ("∞", r"\infty "),
    ("∂", r"\partial "),
    ("≈", r"\approx "),
    ("≠", r"\neq "),
    ("≤", r"\leq "),
    ("≥", r"\geq "),
    ("±", r"\pm "),
    ("∈", r"\in "),
    ("∉", r"\notin "),
    ("⊂", r"\subset "),
    ("⊃", r"\supset "),
    ("→", r"\rightarrow "),
    ("←", r"\leftarrow "),
    ("↔", r"\leftrightarrow "),
    ("⇒", r"\Rightarrow "),
    ("⇐", r"\Leftarrow "),
    ("×", r"\times "),
    ("÷", r"\div "),
    ("°", r"^\circ "),
    ("∅", r"\emptyset "),
];

static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z]\^?\d|[a-zA-Z][²³]").expect("Invalid script regex"));
static FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:sin|cos|tan|log|ln|exp|lim|int|sum)\b").expect("Invalid function regex")
});
static FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+/\d+|\w+/\w+").expect("Invalid fraction regex"));
static INTEGRAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bint\b").expect("Invalid integral regex"));
static SUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsum\b").expect("Invalid sum regex"));
static LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blim\b").expect("Invalid limit regex"));
static TRIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:sin|cos|tan)\b").expect("Invalid trigonometry regex"));
static ALGEBRA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z](?:\^?\d|[²³])").expect("Invalid algebra regex"));

/// Ordered rewrite from OCR math text to LaTeX. Symbol commands carry a
/// trailing space that the final whitespace pass collapses.
static LATEX_RULES: Lazy<RuleSet> = Lazy::new(|| {
    let symbols = RuleSet::new(
        SYMBOL_MAP
            .iter()
            .map(|&(symbol, command)| Rule::literal("symbol", symbol, command))
            .collect(),
    );
    let structure = RuleSet::patterns(&[
        ("superscript two", r"([a-zA-Z])²", "${1}^{2}"),
        ("superscript three", r"([a-zA-Z])³", "${1}^{3}"),
        ("caret exponent", r"([a-zA-Z])\^(\d+)", "${1}^{${2}}"),
        ("subscript", r"([a-zA-Z])_(\w+)", "${1}_{${2}}"),
        ("root of number", r"\\sqrt\s*(\d+)", r"\sqrt{${1}}"),
        ("root of group", r"\\sqrt\s*\(([^)]+)\)", r"\sqrt{${1}}"),
        (
            "simple fraction",
            r"(^|[^\\A-Za-z0-9{])([A-Za-z0-9]+)/([A-Za-z0-9]+)",
            r"${1}\frac{${2}}{${3}}",
        ),
    ]);
    let integrals: Vec<Rule> = Rule::pattern("differential spacing", r"\s*\bd([xyt])\b", r" \, d${1}")
        .map(|rule| rule.when(r"\int"))
        .into_iter()
        .collect();
    let limits_and_sums = RuleSet::patterns(&[
        (
            "limit",
            r"lim\s*\(\s*([a-zA-Z])\s*(?:→|\\rightarrow|->)\s*([^)\s]+)\s*\)",
            r"\lim_{${1} \to ${2}}",
        ),
        (
            "bounded sum",
            r"\\sum\s*\(\s*([a-z])\s*=\s*([^\s)]+)\s+to\s+\\infty\s*\)",
            r"\sum_{${1}=${2}}^{\infty}",
        ),
    ]);
    let spacing = RuleSet::patterns(&[
        ("operator spacing left", r"([a-zA-Z\d})])([+\-])", "${1} ${2} "),
        ("operator spacing right", r"([+\-])([a-zA-Z\d])", "${1} ${2}"),
        ("collapse whitespace", r"\s+", " "),
    ]);

    symbols
        .then(structure)
        .then(RuleSet::new(integrals))
        .then(limits_and_sums)
        .then(spacing)
});

pub fn contains_math(line: &str) -> bool {
    line.contains(MATH_CHARS)
        || SCRIPT.is_match(line)
        || FUNCTION.is_match(line)
        || FRACTION.is_match(line)
}

/// First match wins: equation, integral, sum, limit, trigonometry, algebra.
pub fn classify(line: &str) -> FormulaKind {
    if line.contains('=') {
        FormulaKind::Equation
    } else if line.contains('∫') || INTEGRAL.is_match(line) {
        FormulaKind::Integral
    } else if line.contains('∑') || SUM.is_match(line) {
        FormulaKind::Sum
    } else if LIMIT.is_match(line) {
        FormulaKind::Limit
    } else if TRIG.is_match(line) {
        FormulaKind::Trigonometry
    } else if ALGEBRA.is_match(line) {
        FormulaKind::Algebra
    } else {
        FormulaKind::Other
    }
}

pub fn to_latex(line: &str) -> String {
    LATEX_RULES.apply(line).trim().to_string()
}

#[derive(Debug, Clone, Default)]
pub struct MathFormulaRecognizer;

impl MathFormulaRecognizer {
    pub fn new() -> Self {
        Self
    }

    pub fn recognize_line(&self, index: usize, line: &str) -> Option<Formula> {
        if line.trim().is_empty() || !contains_math(line) {
            return None;
        }
        let kind = classify(line);
        Some(Formula {
            source_line_index: index,
            raw_text: line.to_string(),
            latex: to_latex(line),
            kind,
            inline: line.chars().count() < 80 && kind != FormulaKind::Equation,
        })
    }

    pub fn recognize(&self, text: &str) -> Vec<Formula> {
        let formulas: Vec<Formula> = text
            .split('\n')
            .enumerate()
            .filter_map(|(index, line)| self.recognize_line(index, line))
            .collect();
        debug!(count = formulas.len(), "math formulas recognized");
        formulas
    }
}

/// Replaces each formula's source line with its `$..$` or `$$..$$` form,
/// leaving every other line untouched.
pub fn format_for_markdown(formulas: &[Formula], text: &str) -> String {
    let by_line: HashMap<usize, &Formula> = formulas
        .iter()
        .map(|formula| (formula.source_line_index, formula))
        .collect();

    text.split('\n')
        .enumerate()
        .map(|(index, line)| match by_line.get(&index) {
            Some(formula) => render_formula(formula),
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_formula(formula: &Formula) -> String {
    if formula.latex.is_empty() {
        format!("*Math: {}*", formula.raw_text)
    } else if formula.inline {
        format!("${}$", formula.latex)
    } else {
        format!("$${}$$", formula.latex)
    }
}
