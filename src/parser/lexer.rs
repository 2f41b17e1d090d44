//! Logos-based Go tokenizer.
//!
//! Trivia is lexed rather than skipped so the wrapper can apply Go's
//! automatic semicolon insertion rule: a newline (or a block comment
//! spanning one) terminates the statement when the previous significant
//! token could end one. Inserted semicolons are zero-length tokens.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Trivia — never emitted by `tokenize`.
    #[regex(r"[ \t\r]+")]
    Whitespace,
    #[token("\n")]
    Newline,
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*([^*]|\*[^/])*\*/")]
    BlockComment,

    #[regex(r"[\p{L}_][\p{L}\p{N}_]*")]
    Ident,

    // Literals. The exact numeric class is irrelevant downstream, so ints,
    // floats and imaginaries share a kind.
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?i?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?i?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+i?")]
    #[regex(r"0[xX][0-9a-fA-F_]+i?")]
    #[regex(r"0[bB][01_]+i?")]
    #[regex(r"0[oO][0-7_]+i?")]
    #[regex(r"[0-9][0-9_]*i?")]
    Number,
    #[regex(r"'([^'\\\n]|\\.)*'")]
    Char,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    Str,
    #[regex(r"`[^`]*`")]
    RawStr,

    // Keywords.
    #[token("break")]
    Break,
    #[token("case")]
    Case,
    #[token("chan")]
    Chan,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("default")]
    Default,
    #[token("defer")]
    Defer,
    #[token("else")]
    Else,
    #[token("fallthrough")]
    Fallthrough,
    #[token("for")]
    For,
    #[token("func")]
    Func,
    #[token("go")]
    Go,
    #[token("goto")]
    Goto,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("interface")]
    Interface,
    #[token("map")]
    Map,
    #[token("package")]
    Package,
    #[token("range")]
    Range,
    #[token("return")]
    Return,
    #[token("select")]
    Select,
    #[token("struct")]
    Struct,
    #[token("switch")]
    Switch,
    #[token("type")]
    Type,
    #[token("var")]
    Var,

    // Operators and delimiters.
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    And,
    #[token("|")]
    Or,
    #[token("^")]
    Caret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&^")]
    AndNot,
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<<=")]
    #[token(">>=")]
    #[token("&^=")]
    AssignOp,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<-")]
    Arrow,
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("=")]
    Assign,
    #[token("!")]
    Not,
    #[token(":=")]
    Define,
    #[token("...")]
    DotDotDot,
    #[token(".")]
    Period,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("@")]
    At,

    Error,
    /// Synthetic end-of-input marker; never produced by `tokenize`.
    Eof,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::Ident
                | TokenKind::Number
                | TokenKind::Char
                | TokenKind::Str
                | TokenKind::RawStr
        )
    }

    fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::Newline
                | TokenKind::LineComment
                | TokenKind::BlockComment
        )
    }

    /// Whether a statement may end right after this token (semicolon
    /// insertion rule).
    fn ends_statement(self) -> bool {
        self.is_literal()
            || matches!(
                self,
                TokenKind::Break
                    | TokenKind::Continue
                    | TokenKind::Fallthrough
                    | TokenKind::Return
                    | TokenKind::Inc
                    | TokenKind::Dec
                    | TokenKind::RParen
                    | TokenKind::RBrack
                    | TokenKind::RBrace
            )
    }

    /// Fixed source text of operator, delimiter and keyword tokens.
    pub fn static_text(self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Break => "break",
            TokenKind::Case => "case",
            TokenKind::Chan => "chan",
            TokenKind::Const => "const",
            TokenKind::Continue => "continue",
            TokenKind::Default => "default",
            TokenKind::Defer => "defer",
            TokenKind::Else => "else",
            TokenKind::Fallthrough => "fallthrough",
            TokenKind::For => "for",
            TokenKind::Func => "func",
            TokenKind::Go => "go",
            TokenKind::Goto => "goto",
            TokenKind::If => "if",
            TokenKind::Import => "import",
            TokenKind::Interface => "interface",
            TokenKind::Map => "map",
            TokenKind::Package => "package",
            TokenKind::Range => "range",
            TokenKind::Return => "return",
            TokenKind::Select => "select",
            TokenKind::Struct => "struct",
            TokenKind::Switch => "switch",
            TokenKind::Type => "type",
            TokenKind::Var => "var",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Caret => "^",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::AndNot => "&^",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Arrow => "<-",
            TokenKind::Inc => "++",
            TokenKind::Dec => "--",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::Assign => "=",
            TokenKind::Not => "!",
            TokenKind::Define => ":=",
            TokenKind::DotDotDot => "...",
            TokenKind::Period => ".",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrack => "[",
            TokenKind::RBrack => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::At => "@",
            _ => return None,
        })
    }
}

/// A significant token with its byte position. Inserted semicolons have
/// zero length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: u32,
    pub len: u32,
}

impl Token {
    pub fn end(&self) -> u32 {
        self.start + self.len
    }

    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        if self.len == 0 {
            return ";";
        }
        &src[self.start as usize..self.end() as usize]
    }

    /// Source text for literals, fixed text for everything else; used when
    /// reassembling an extracted expression.
    pub fn literal<'a>(&self, src: &'a str) -> &'a str {
        self.kind.static_text().unwrap_or_else(|| self.text(src))
    }
}

/// Tokenizes a whole buffer, dropping trivia and inserting semicolons at
/// newlines per the Go rule. Lex errors become `TokenKind::Error` tokens;
/// the parser decides how much to salvage.
pub fn tokenize(src: &str) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(src.len() / 4);
    let mut lexer = TokenKind::lexer(src);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let kind = result.unwrap_or(TokenKind::Error);
        if kind.is_trivia() {
            let breaks_line = kind == TokenKind::Newline
                || (kind == TokenKind::BlockComment && lexer.slice().contains('\n'));
            if breaks_line {
                if let Some(last) = out.last() {
                    if last.kind.ends_statement() {
                        out.push(Token {
                            kind: TokenKind::Semi,
                            start: span.start as u32,
                            len: 0,
                        });
                    }
                }
            }
            continue;
        }
        out.push(Token {
            kind,
            start: span.start as u32,
            len: (span.end - span.start) as u32,
        });
    }
    // The statement before EOF terminates too.
    if let Some(last) = out.last() {
        if last.kind.ends_statement() {
            out.push(Token {
                kind: TokenKind::Semi,
                start: src.len() as u32,
                len: 0,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn inserts_semicolon_after_ident_at_newline() {
        assert_eq!(
            kinds("x := 1\ny"),
            vec![
                TokenKind::Ident,
                TokenKind::Define,
                TokenKind::Number,
                TokenKind::Semi,
                TokenKind::Ident,
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn no_semicolon_after_operators() {
        assert_eq!(
            kinds("x +\ny"),
            vec![
                TokenKind::Ident,
                TokenKind::Plus,
                TokenKind::Ident,
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn semicolon_after_closing_delimiters_and_incdec() {
        assert_eq!(
            kinds("f()\n"),
            vec![
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Semi,
            ]
        );
        assert_eq!(
            kinds("i++\n"),
            vec![TokenKind::Ident, TokenKind::Inc, TokenKind::Semi]
        );
    }

    #[test]
    fn multiline_block_comment_acts_as_newline() {
        assert_eq!(
            kinds("x /* a\nb */ y"),
            vec![
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::Ident,
                TokenKind::Semi,
            ]
        );
        // Single-line block comments do not.
        assert_eq!(kinds("x /* a */ y"), vec![
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::Semi,
        ]);
    }

    #[test]
    fn scans_strings_and_numbers() {
        let src = r#"s := "he\"llo" + `raw` + 0x1f + 1.5e3"#;
        let toks = tokenize(src);
        let texts: Vec<&str> = toks.iter().map(|t| t.text(src)).collect();
        assert!(texts.contains(&"\"he\\\"llo\""));
        assert!(texts.contains(&"`raw`"));
        assert!(texts.contains(&"0x1f"));
        assert!(texts.contains(&"1.5e3"));
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(kinds("func")[0], TokenKind::Func);
        assert_eq!(kinds("funcs")[0], TokenKind::Ident);
    }

    #[test]
    fn compound_operators_lex_longest() {
        assert_eq!(
            kinds("a <<= 1"),
            vec![
                TokenKind::Ident,
                TokenKind::AssignOp,
                TokenKind::Number,
                TokenKind::Semi,
            ]
        );
        assert_eq!(kinds("a &^ b")[1], TokenKind::AndNot);
        assert_eq!(kinds("<-ch")[0], TokenKind::Arrow);
    }

    #[test]
    fn offsets_match_source() {
        let src = "ab cd";
        let toks = tokenize(src);
        assert_eq!(toks[0].start, 0);
        assert_eq!(toks[0].len, 2);
        assert_eq!(toks[1].start, 3);
        assert_eq!(toks[1].text(src), "cd");
    }
}
