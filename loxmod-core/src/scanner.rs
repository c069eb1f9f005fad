use phf::{phf_map, Map};

use crate::error::Error;
use crate::token::{Literal, Token, Type};

pub struct Scanner;

impl Scanner {
    const KEYWORDS: Map<&'static str, Type> = phf_map! {
        "and" => Type::And,
        "as" => Type::As,
        "break" => Type::Break,
        "class" => Type::Class,
        "const" => Type::Const,
        "continue" => Type::Continue,
        "def" => Type::Fun,
        "else" => Type::Else,
        "false" => Type::False,
        "for" => Type::For,
        "fun" => Type::Fun,
        "if" => Type::If,
        "import" => Type::Import,
        "lambda" => Type::Lambda,
        "nil" => Type::Nil,
        "or" => Type::Or,
        "print" => Type::Print,
        "return" => Type::Return,
        "super" => Type::Super,
        "this" => Type::This,
        "true" => Type::True,
        "var" => Type::Var,
        "while" => Type::While,
    };

    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Scanner
    }

    pub fn scan_tokens<'a, 'b>(&'a mut self, src: &'b str) -> TokenStream
    where
        'b: 'a,
    {
        TokenStream::new(src)
    }
}

pub struct TokenStream {
    src: Vec<char>,
    line: usize,

    // `start` and `current` points to the start and end of the token being scanned
    start: usize,
    current: usize,

    // This represents a token's index in the token stream
    index: usize,

    // This flag is set to `true` if the eof is reached and the eof token has been emitted.
    // This is required because the iterator needs to distinguish between when eof is reached but
    // the token is not emitted, and eof is reached and token has been emitted.
    eof: bool,

    // Errors do not stop the stream. They are collected here and the scanner moves on to the
    // next lexeme so that a single pass reports all of them.
    errors: Vec<Error>,
}

impl TokenStream {
    pub fn new(src: &str) -> Self {
        TokenStream {
            src: src.chars().collect(),
            line: 1,
            start: 0,
            current: 0,
            index: 0,
            eof: false,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    fn scan_token(&mut self) -> Result<Option<Token>, Error> {
        let c = self.advance();

        let token = match c {
            '(' => Some(self.make_token(Type::LeftParen)),
            ')' => Some(self.make_token(Type::RightParen)),
            '{' => Some(self.make_token(Type::LeftBrace)),
            '}' => Some(self.make_token(Type::RightBrace)),
            ',' => Some(self.make_token(Type::Comma)),
            '.' => Some(self.make_token(Type::Dot)),
            '-' => Some(self.make_token(Type::Minus)),
            '+' => Some(self.make_token(Type::Plus)),
            ';' => Some(self.make_token(Type::SemiColon)),
            '*' => Some(self.make_token(Type::Star)),
            '%' => Some(self.make_token(Type::Percent)),

            '!' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::BangEqual))
                } else {
                    Some(self.make_token(Type::Bang))
                }
            }

            '=' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::EqualEqual))
                } else {
                    Some(self.make_token(Type::Equal))
                }
            }

            '<' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::LessEqual))
                } else {
                    Some(self.make_token(Type::Less))
                }
            }

            '>' => {
                if self.match_char('=') {
                    Some(self.make_token(Type::GreaterEqual))
                } else {
                    Some(self.make_token(Type::Greater))
                }
            }

            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                    None
                } else if self.match_char('*') {
                    self.block_comment()?;
                    None
                } else {
                    Some(self.make_token(Type::Slash))
                }
            }

            '"' => Some(self.string()?),

            // White spaces, do nothing
            ' ' | '\t' | '\r' => None,

            '\n' => {
                self.line += 1;
                None
            }

            _ => {
                if c.is_ascii_digit() {
                    Some(self.number())
                } else if is_alpha(c) {
                    Some(self.identifier())
                } else {
                    return Err(Error::UnexpectedCharacter {
                        ch: c,
                        line: self.line,
                    });
                }
            }
        };

        Ok(token)
    }

    fn block_comment(&mut self) -> Result<(), Error> {
        while !self.is_at_end() {
            // Multi-line comments are allowed, so ensure to increment the line since
            // `advance()` doesn't increment line number
            let now = self.advance();
            if now == '\n' {
                self.line += 1;
            } else if now == '*' && self.peek() == '/' {
                self.advance();
                return Ok(());
            }
        }

        Err(Error::UnterminatedBlockComment { line: self.line })
    }

    fn string(&mut self) -> Result<Token, Error> {
        let mut value = String::new();
        let mut invalid = None;

        while self.peek() != '"' && !self.is_at_end() {
            let c = self.advance();
            match c {
                '\n' => {
                    self.line += 1;
                    value.push(c);
                }
                '\\' if !self.is_at_end() => {
                    let escaped = self.advance();
                    match escaped {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'b' => value.push('\u{8}'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        _ => {
                            if escaped == '\n' {
                                self.line += 1;
                            }
                            invalid.get_or_insert(Error::InvalidEscape {
                                ch: escaped,
                                line: self.line,
                            });
                        }
                    }
                }
                _ => value.push(c),
            }
        }

        if self.is_at_end() {
            return Err(Error::UnterminatedString { line: self.line });
        }

        // consume the closing "
        self.advance();

        // The string is still well-formed, so the token is kept and only the escape is reported.
        if let Some(err) = invalid {
            self.errors.push(err);
        }

        Ok(self.make_token_with_val(Type::String, Literal::from(value)))
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.text();
        let value = text.parse::<f64>().unwrap_or_default();
        self.make_token_with_val(Type::Number, Literal::Num(value))
    }

    fn identifier(&mut self) -> Token {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.advance();
        }

        let text = self.text();
        match Scanner::KEYWORDS.get(text.as_str()) {
            None => self.make_token(Type::Identifier),
            Some(Type::True) => self.make_token_with_val(Type::True, Literal::Bool(true)),
            Some(Type::False) => self.make_token_with_val(Type::False, Literal::Bool(false)),
            Some(keyword) => self.make_token(*keyword),
        }
    }

    fn text(&self) -> String {
        self.src[self.start..self.current].iter().collect()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.src[self.current]
        }
    }

    fn peek_next(&self) -> char {
        self.src.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let res = self.src[self.current];
        self.current += 1;
        res
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.is_at_end() || self.src[self.current] != c {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn make_token(&mut self, ty: Type) -> Token {
        self.make_token_with_val(ty, Literal::Nil)
    }

    fn make_token_with_val(&mut self, ty: Type, val: Literal) -> Token {
        let lexeme = match ty {
            Type::Eof => String::new(),
            _ => self.text(),
        };

        let token = Token::new(ty, lexeme, self.line, self.start, self.index, val);
        self.index += 1;
        token
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

impl Iterator for TokenStream {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof {
            return None;
        }

        while !self.is_at_end() {
            self.start = self.current;

            match self.scan_token() {
                Ok(None) => continue,
                Ok(Some(token)) => return Some(token),
                Err(err) => self.errors.push(err),
            }
        }

        self.start = self.current;
        self.eof = true;
        Some(self.make_token(Type::Eof))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::scanner::Scanner;
    use crate::token::{Literal, Token, Type};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_basic_scanning() {
        let source = "class fun {} var foo bar 12.45 \"hello\" true false nil // this is a comment";
        let mut scanner = Scanner::new();
        let stream = scanner.scan_tokens(source);

        assert_eq!(
            stream.collect::<Vec<Token>>(),
            vec![
                Token::new(Type::Class, String::from("class"), 1, 0, 0, Literal::Nil),
                Token::new(Type::Fun, String::from("fun"), 1, 6, 1, Literal::Nil),
                Token::new(Type::LeftBrace, String::from("{"), 1, 10, 2, Literal::Nil),
                Token::new(Type::RightBrace, String::from("}"), 1, 11, 3, Literal::Nil),
                Token::new(Type::Var, String::from("var"), 1, 13, 4, Literal::Nil),
                Token::new(Type::Identifier, String::from("foo"), 1, 17, 5, Literal::Nil),
                Token::new(Type::Identifier, String::from("bar"), 1, 21, 6, Literal::Nil),
                Token::new(Type::Number, String::from("12.45"), 1, 25, 7, Literal::Num(12.45)),
                Token::new(
                    Type::String,
                    String::from("\"hello\""),
                    1,
                    31,
                    8,
                    Literal::from("hello")
                ),
                Token::new(Type::True, String::from("true"), 1, 39, 9, Literal::Bool(true)),
                Token::new(Type::False, String::from("false"), 1, 44, 10, Literal::Bool(false)),
                Token::new(Type::Nil, String::from("nil"), 1, 50, 11, Literal::Nil),
                Token::new(Type::Eof, String::new(), 1, 74, 12, Literal::Nil),
            ]
        );
    }

    #[test]
    fn test_module_keywords() {
        let source = "import \"lib/math\" as m; const x = 1 % 2; def f() { break; continue; } lambda";
        let mut scanner = Scanner::new();
        let types: Vec<Type> = scanner.scan_tokens(source).map(|token| token.ty).collect();

        assert_eq!(
            types,
            vec![
                Type::Import,
                Type::String,
                Type::As,
                Type::Identifier,
                Type::SemiColon,
                Type::Const,
                Type::Identifier,
                Type::Equal,
                Type::Number,
                Type::Percent,
                Type::Number,
                Type::SemiColon,
                Type::Fun,
                Type::Identifier,
                Type::LeftParen,
                Type::RightParen,
                Type::LeftBrace,
                Type::Break,
                Type::SemiColon,
                Type::Continue,
                Type::SemiColon,
                Type::RightBrace,
                Type::Lambda,
                Type::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let mut scanner = Scanner::new();
        let tokens: Vec<Token> = scanner
            .scan_tokens(r#""tab\there\n\"quoted\" \\ it's""#)
            .collect();

        assert_eq!(
            tokens[0].value,
            Literal::from("tab\there\n\"quoted\" \\ it's")
        );
    }

    #[test]
    fn test_invalid_escape() {
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens("\"bad \\q\" 1");
        let tokens: Vec<Token> = stream.by_ref().collect();

        assert_eq!(tokens.len(), 3);
        assert_eq!(stream.errors(), &[Error::InvalidEscape { ch: 'q', line: 1 }]);
        assert_eq!(
            stream.errors()[0].to_string(),
            "Invalid escape sequence: '\\q'."
        );
    }

    #[test]
    fn test_multiline_comment() {
        let source = "/*\n\
            this is a multiline comment \n\
        */";
        let mut scanner = Scanner::new();
        let stream = scanner.scan_tokens(source);

        assert_eq!(
            stream.collect::<Vec<Token>>(),
            vec![Token::new(Type::Eof, String::new(), 3, source.len(), 0, Literal::Nil)]
        );
    }

    #[test]
    fn test_unterminated_multiline_comment() {
        let source = "/*";
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(source);
        stream.by_ref().last();

        assert_eq!(
            stream.errors(),
            &[Error::UnterminatedBlockComment { line: 1 }]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let source = "\"hello";
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens(source);
        stream.by_ref().last();

        assert_eq!(stream.errors(), &[Error::UnterminatedString { line: 1 }]);
    }

    #[test]
    fn test_errors_do_not_stop_scanning() {
        let mut scanner = Scanner::new();
        let mut stream = scanner.scan_tokens("var a = 1 @ 2;\n#");
        let types: Vec<Type> = stream.by_ref().map(|token| token.ty).collect();

        assert_eq!(
            types,
            vec![
                Type::Var,
                Type::Identifier,
                Type::Equal,
                Type::Number,
                Type::Number,
                Type::SemiColon,
                Type::Eof
            ]
        );
        assert_eq!(
            stream.into_errors(),
            vec![
                Error::UnexpectedCharacter { ch: '@', line: 1 },
                Error::UnexpectedCharacter { ch: '#', line: 2 },
            ]
        );
    }
}
