use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// One normalized piece of a free-text reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Number(u64),
    Word(String),
}

impl Token {
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Token::Word(w) => Some(w),
            Token::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            Token::Number(n) => Some(*n),
            Token::Word(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Word(w) => write!(f, "{w}"),
        }
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Word(s.to_string())
    }
}

impl From<u64> for Token {
    fn from(n: u64) -> Self {
        Token::Number(n)
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `.` is a separator inside words ("A.B" -> "AB"); everything else splits.
    PATTERN.get_or_init(|| Regex::new(r"\d+|[A-Z.]+").expect("invalid regex"))
}

/// Splits text into digit runs and letter runs, uppercased, in input order.
///
/// `"AA - AUG'17"` becomes `[AA, AUG, 17]`. Digit runs too long for a `u64`
/// are kept as words so the function never fails.
pub fn tokenize(text: &str) -> Vec<Token> {
    let upper = text.to_uppercase();
    token_pattern()
        .find_iter(&upper)
        .filter_map(|m| {
            let raw = m.as_str();
            if raw.as_bytes()[0].is_ascii_digit() {
                Some(
                    raw.parse::<u64>()
                        .map(Token::Number)
                        .unwrap_or_else(|_| Token::Word(raw.to_string())),
                )
            } else {
                let word = raw.replace('.', "");
                (!word.is_empty()).then_some(Token::Word(word))
            }
        })
        .collect()
}
