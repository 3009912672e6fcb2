//! Lossless GLSL tokenizer.
//!
//! Concatenating the text of every token reproduces the input exactly, so
//! passes can edit individual tokens and rebuild without disturbing the
//! surrounding layout.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    LineComment,
    BlockComment,
    /// A whole preprocessor line, without its trailing newline. Backslash
    /// continuations are part of the token.
    Directive,
    Identifier,
    Number,
    Punct,
    Other,
    /// Text added by a pass.
    Injected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn injected(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Injected, text)
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == word
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("Unterminated block comment starting at byte {0}")]
    UnterminatedComment(usize),
}

const MULTI_CHAR_PUNCT: &[&str] = &[
    "<<=", ">>=", "++", "--", "<=", ">=", "==", "!=", "&&", "||", "^^", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "<<", ">>",
];

/// Splits `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;
    // only whitespace seen since the last newline
    let mut line_start = true;

    while i < len {
        let start = i;
        let b = bytes[i];

        let kind = if b.is_ascii_whitespace() {
            while i < len && bytes[i].is_ascii_whitespace() {
                if bytes[i] == b'\n' {
                    line_start = true;
                }
                i += 1;
            }
            TokenKind::Whitespace
        } else if source[i..].starts_with("//") {
            i = source[i..].find('\n').map_or(len, |offset| i + offset);
            line_start = false;
            TokenKind::LineComment
        } else if source[i..].starts_with("/*") {
            match source[i + 2..].find("*/") {
                Some(offset) => i = i + 2 + offset + 2,
                None => return Err(TokenizeError::UnterminatedComment(start)),
            }
            line_start = false;
            TokenKind::BlockComment
        } else if b == b'#' && line_start {
            while i < len {
                if bytes[i] == b'\n' && !(i > start && bytes[i - 1] == b'\\') {
                    break;
                }
                i += 1;
            }
            line_start = false;
            TokenKind::Directive
        } else if b.is_ascii_alphabetic() || b == b'_' {
            while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            line_start = false;
            TokenKind::Identifier
        } else if b.is_ascii_digit() || (b == b'.' && i + 1 < len && bytes[i + 1].is_ascii_digit())
        {
            let hex = source[i..].starts_with("0x") || source[i..].starts_with("0X");
            while i < len {
                let c = bytes[i];
                if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' {
                    i += 1;
                } else if (c == b'+' || c == b'-')
                    && !hex
                    && matches!(bytes[i - 1], b'e' | b'E')
                {
                    i += 1;
                } else {
                    break;
                }
            }
            line_start = false;
            TokenKind::Number
        } else if b.is_ascii_punctuation() {
            i += MULTI_CHAR_PUNCT
                .iter()
                .find(|op| source[i..].starts_with(**op))
                .map_or(1, |op| op.len());
            line_start = false;
            TokenKind::Punct
        } else {
            i += source[i..].chars().next().map_or(1, char::len_utf8);
            line_start = false;
            TokenKind::Other
        };

        tokens.push(Token::new(kind, &source[start..i]));
    }

    Ok(tokens)
}

/// Concatenates token text.
pub fn rebuild(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.text.len()).sum());
    for token in tokens {
        out.push_str(&token.text);
    }
    out
}

/// Index of the next non-trivia token at or after `from`.
pub fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].is_trivia())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lossless() {
        let source = "#version 300 es\n// c\nprecision highp float; /* x */\nvoid main(){ a <<= 1.5e-3; }\n";
        assert_eq!(rebuild(&tokenize(source).unwrap()), source);
    }

    #[test]
    fn test_directive_excludes_newline() {
        let tokens = tokenize("#version 100\nvoid").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].text, "#version 100");
        assert_eq!(tokens[1].text, "\n");
    }

    #[test]
    fn test_directive_continuation() {
        let tokens = tokenize("#define A \\\n  1\nx").unwrap();
        assert_eq!(tokens[0].text, "#define A \\\n  1");
    }

    #[test]
    fn test_hash_mid_line_is_punct() {
        assert_eq!(
            kinds("a # b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Whitespace,
                TokenKind::Punct,
                TokenKind::Whitespace,
                TokenKind::Identifier
            ]
        );
    }

    #[test]
    fn test_numbers_and_operators() {
        let tokens = tokenize("x+=1.0e+2;").unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "+=", "1.0e+2", ";"]);
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            tokenize("void main(){} /* open"),
            Err(TokenizeError::UnterminatedComment(14))
        );
    }

    #[test]
    fn test_non_ascii_is_other() {
        let tokens = tokenize("é").unwrap();
        assert_eq!(tokens, vec![Token::new(TokenKind::Other, "é")]);
    }
}
