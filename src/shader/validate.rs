//! Structural shader checks: delimiter balance and `main()` presence.
//! Comments and preprocessor lines are ignored.

use std::fmt;

use serde::Serialize;

use super::tokenizer::{next_significant, tokenize, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShaderViolation {
    UnterminatedComment { offset: usize },
    /// Open and close counts of one delimiter pair differ.
    UnbalancedDelimiter { open: char, opened: usize, closed: usize },
    /// A closing delimiter with no matching opener.
    UnexpectedClosing { delimiter: char, offset: usize },
    MissingMain,
}

impl fmt::Display for ShaderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderViolation::UnterminatedComment { offset } => {
                write!(f, "unterminated block comment at byte {}", offset)
            }
            ShaderViolation::UnbalancedDelimiter { open, opened, closed } => {
                write!(f, "unbalanced '{}': {} opened, {} closed", open, opened, closed)
            }
            ShaderViolation::UnexpectedClosing { delimiter, offset } => {
                write!(f, "unexpected '{}' at byte {}", delimiter, offset)
            }
            ShaderViolation::MissingMain => write!(f, "no main() function"),
        }
    }
}

/// Opened/closed counts per delimiter pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DelimiterCounts {
    pub braces: (usize, usize),
    pub parens: (usize, usize),
    pub brackets: (usize, usize),
}

impl DelimiterCounts {
    fn from_tokens(tokens: &[Token]) -> Self {
        let mut counts = Self::default();
        for token in tokens.iter().filter(|t| t.kind == TokenKind::Punct) {
            match token.text.as_str() {
                "{" => counts.braces.0 += 1,
                "}" => counts.braces.1 += 1,
                "(" => counts.parens.0 += 1,
                ")" => counts.parens.1 += 1,
                "[" => counts.brackets.0 += 1,
                "]" => counts.brackets.1 += 1,
                _ => {}
            }
        }
        counts
    }
}

/// Delimiter counts outside comments and directives. `None` when the
/// source cannot be tokenized.
pub fn delimiter_counts(source: &str) -> Option<DelimiterCounts> {
    tokenize(source).ok().map(|t| DelimiterCounts::from_tokens(&t))
}

fn opener_of(close: &str) -> Option<char> {
    match close {
        "}" => Some('{'),
        ")" => Some('('),
        "]" => Some('['),
        _ => None,
    }
}

fn has_main(tokens: &[Token]) -> bool {
    tokens.iter().enumerate().any(|(i, t)| {
        t.is_ident("main")
            && next_significant(tokens, i + 1).is_some_and(|n| tokens[n].is_punct("("))
    })
}

/// Returns every structural problem found; empty means the shader passed.
pub fn validate_shader(source: &str) -> Vec<ShaderViolation> {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(super::tokenizer::TokenizeError::UnterminatedComment(offset)) => {
            return vec![ShaderViolation::UnterminatedComment { offset }];
        }
    };

    let mut violations = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut offset = 0;
    for token in &tokens {
        if token.kind == TokenKind::Punct {
            match token.text.as_str() {
                "{" | "(" | "[" => stack.extend(token.text.chars()),
                close => {
                    if let Some(open) = opener_of(close) {
                        if stack.last() == Some(&open) {
                            stack.pop();
                        } else {
                            violations.push(ShaderViolation::UnexpectedClosing {
                                delimiter: close.chars().next().unwrap_or(' '),
                                offset,
                            });
                        }
                    }
                }
            }
        }
        offset += token.text.len();
    }

    let counts = DelimiterCounts::from_tokens(&tokens);
    for (open, (opened, closed)) in [
        ('{', counts.braces),
        ('(', counts.parens),
        ('[', counts.brackets),
    ] {
        if opened != closed {
            violations.push(ShaderViolation::UnbalancedDelimiter { open, opened, closed });
        }
    }

    if !has_main(&tokens) {
        violations.push(ShaderViolation::MissingMain);
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_shader() {
        assert!(validate_shader("#version 300 es\nvoid main(){ float a[2]; }").is_empty());
    }

    #[test]
    fn test_missing_main() {
        assert_eq!(validate_shader("void other(){}"), vec![ShaderViolation::MissingMain]);
    }

    #[test]
    fn test_delimiters_in_comments_ignored() {
        assert!(validate_shader("// {{\n/* ) */\nvoid main(){}").is_empty());
    }

    #[test]
    fn test_unbalanced_brace() {
        let violations = validate_shader("void main(){");
        assert_eq!(
            violations,
            vec![ShaderViolation::UnbalancedDelimiter { open: '{', opened: 1, closed: 0 }]
        );
    }

    #[test]
    fn test_unexpected_closing() {
        let violations = validate_shader("void main()){}");
        assert!(violations.contains(&ShaderViolation::UnexpectedClosing { delimiter: ')', offset: 11 }));
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            validate_shader("void main(){} /*"),
            vec![ShaderViolation::UnterminatedComment { offset: 14 }]
        );
    }

    #[test]
    fn test_counts() {
        let counts = delimiter_counts("void main(){ a[0] = (1); }").unwrap();
        assert_eq!(counts.braces, (1, 1));
        assert_eq!(counts.parens, (2, 2));
        assert_eq!(counts.brackets, (1, 1));
        assert!(delimiter_counts("/*").is_none());
    }
}
