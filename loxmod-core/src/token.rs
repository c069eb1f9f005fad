#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    SemiColon,
    Slash,
    Star,
    Percent,

    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    Identifier,
    String,
    Number,

    And,
    As,
    Break,
    Class,
    Const,
    Continue,
    Else,
    False,
    For,
    Fun,
    If,
    Import,
    Lambda,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Nil,
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(String::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Num(value)
    }
}

/// Position of a token in its module's token stream. Indices are unique within one stream, so
/// the index of a name or keyword token identifies the AST node that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenIndex(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: Type,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
    pub idx: TokenIndex,
    pub value: Literal,
}

impl Token {
    pub fn new(
        ty: Type,
        lexeme: String,
        line: usize,
        col: usize,
        idx: usize,
        value: Literal,
    ) -> Self {
        Token {
            ty,
            lexeme,
            line,
            col,
            idx: TokenIndex(idx),
            value,
        }
    }
}
