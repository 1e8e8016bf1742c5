use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum LexerError {
    #[error("invalid character '{ch}'")]
    InvalidCharacter { ch: char, offset: usize },
    #[error("integer literal \"{literal}\" is out of range")]
    InvalidNumber { literal: String, offset: usize },
}

impl LexerError {
    /// Byte offset of the offending character in the source.
    pub fn offset(&self) -> usize {
        match self {
            LexerError::InvalidCharacter { offset, .. } => *offset,
            LexerError::InvalidNumber { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TokenKind {
    Eof,
    Identifier(String),
    Constant(i64),
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Semicolon,
    Comma,

    // Operator
    Plus,        // +
    Minus,       // -
    Asterisk,    // *
    Slash,       // /
    Ampersand,   // &
    Assign,      // =
    Equal,       // ==
    NotEqual,    // !=
    LessThan,    // <
    LessOrEqual, // <=
    GreaterThan, // >
    GreaterOrEqual, // >=

    // Keywords
    KWReturn,
    KWIf,
    KWElse,
    KWWhile,
    KWFor,
}

impl TokenKind {
    pub fn from_string(string: &str) -> Self {
        match string {
            "return" => Self::KWReturn,
            "if" => Self::KWIf,
            "else" => Self::KWElse,
            "while" => Self::KWWhile,
            "for" => Self::KWFor,
            _ => Self::Identifier(string.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character in the source.
    pub offset: usize,
}

#[derive(Debug)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Scan the whole source into a token vector terminated by one Eof token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        // A single space is the only whitespace the grammar admits.
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }

        let offset = self.pos;

        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                offset,
            });
        };

        if ch.is_ascii_alphabetic() {
            return Ok(self.read_identifier(offset));
        }

        // Two-character operators win over their one-character prefixes.
        for (text, kind) in [
            ("==", TokenKind::Equal),
            ("!=", TokenKind::NotEqual),
            ("<=", TokenKind::LessOrEqual),
            (">=", TokenKind::GreaterOrEqual),
        ] {
            if self.starts_with(text) {
                self.pos += 2;
                return Ok(Token { kind, offset });
            }
        }

        let kind = match ch {
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Asterisk),
            b'/' => Some(TokenKind::Slash),
            b'(' => Some(TokenKind::OpenParen),
            b')' => Some(TokenKind::CloseParen),
            b'<' => Some(TokenKind::LessThan),
            b'>' => Some(TokenKind::GreaterThan),
            b'=' => Some(TokenKind::Assign),
            b';' => Some(TokenKind::Semicolon),
            b'{' => Some(TokenKind::OpenBrace),
            b'}' => Some(TokenKind::CloseBrace),
            b',' => Some(TokenKind::Comma),
            b'&' => Some(TokenKind::Ampersand),
            _ => None,
        };
        if let Some(kind) = kind {
            self.pos += 1;
            return Ok(Token { kind, offset });
        }

        if ch.is_ascii_digit() {
            return self.read_constant(offset);
        }

        let ch = self.src[self.pos..].chars().next().unwrap_or('\0');
        Err(LexerError::InvalidCharacter { ch, offset })
    }

    fn read_identifier(&mut self, offset: usize) -> Token {
        while self
            .peek()
            .is_some_and(|byte| byte.is_ascii_alphabetic())
        {
            self.pos += 1;
        }
        Token {
            kind: TokenKind::from_string(&self.src[offset..self.pos]),
            offset,
        }
    }

    fn read_constant(&mut self, offset: usize) -> Result<Token, LexerError> {
        while self.peek().is_some_and(|byte| byte.is_ascii_digit()) {
            self.pos += 1;
        }
        let literal = &self.src[offset..self.pos];
        let value: i64 = literal.parse().map_err(|_| LexerError::InvalidNumber {
            literal: literal.to_owned(),
            offset,
        })?;
        Ok(Token {
            kind: TokenKind::Constant(value),
            offset,
        })
    }
}
