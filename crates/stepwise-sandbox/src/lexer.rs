//! Tokenizer for the script language.

use thiserror::Error;

/// A parse-time failure. Displays as the bare message, V8 style.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    /// Raw source of a `${...}` substitution, parsed separately.
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Num(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Ident(String),
    Punct(&'static str),
    Regex {
        pattern: String,
        flags: String,
    },
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

// A `/` after one of these starts a regular expression literal.
const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "await", "yield",
];

// Longest first so that greedy matching picks `===` over `==`.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "**",
    "<<", ">>", "&=", "|=", "^=", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-",
    "*", "/", "%", "&", "|", "^", "!", "~", "?", ":", "=", ".",
];

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let line = self.line;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    line,
                    newline_before: true,
                });
                return Ok(tokens);
            };

            let tok = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if c == '`' {
                self.template()?
            } else if is_ident_start(c) {
                Tok::Ident(self.identifier())
            } else if c == '#' && self.peek_at(1).is_some_and(is_ident_start) {
                self.bump();
                Tok::Ident(format!("#{}", self.identifier()))
            } else if c == '/' && regex_allowed(tokens.last()) {
                self.regex()?
            } else {
                self.punctuator()?
            };

            tokens.push(Token {
                tok,
                line,
                newline_before,
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments. Returns whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, SyntaxError> {
        let mut newline = false;
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' || c == '\u{2028}' || c == '\u{2029}' {
                newline = true;
                self.bump();
            } else if c.is_whitespace() || c == '\u{feff}' {
                self.bump();
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if c == '/' && self.peek_at(1) == Some('*') {
                let start = self.line;
                self.pos += 2;
                loop {
                    match self.bump() {
                        Some('*') if self.peek() == Some('/') => {
                            self.bump();
                            break;
                        }
                        Some('\n') => newline = true,
                        Some(_) => {}
                        None => return Err(SyntaxError::new("Invalid or unexpected token", start)),
                    }
                }
            } else {
                break;
            }
        }
        Ok(newline)
    }

    fn identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_ident_part(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Result<Tok, SyntaxError> {
        let line = self.line;
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let mut digits = String::new();
                while let Some(c) = self.peek() {
                    if c.is_digit(radix) {
                        digits.push(c);
                    } else if c != '_' {
                        break;
                    }
                    self.bump();
                }
                let value = u64::from_str_radix(&digits, radix)
                    .map_err(|_| SyntaxError::new("Invalid or unexpected token", line))?;
                return Ok(Tok::Num(value as f64));
            }
        }

        let mut text = String::new();
        let mut seen_exp = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
            } else if c == '_' {
                // numeric separator
            } else if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                text.push(c);
                self.bump();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.bump();
                }
                continue;
            } else {
                break;
            }
            self.bump();
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(SyntaxError::new("Invalid or unexpected token", line));
        }
        text.parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| SyntaxError::new("Invalid or unexpected token", line))
    }

    fn escape(&mut self, line: usize) -> Result<Option<char>, SyntaxError> {
        let invalid = || SyntaxError::new("Invalid hexadecimal escape sequence", line);
        let Some(c) = self.bump() else {
            return Err(SyntaxError::new("Invalid or unexpected token", line));
        };
        Ok(Some(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            '\n' => return Ok(None),
            'x' => {
                let hex: String = (0..2).filter_map(|_| self.bump()).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(invalid)?
            }
            'u' => {
                let hex: String = if self.peek() == Some('{') {
                    self.bump();
                    let mut hex = String::new();
                    while let Some(c) = self.bump() {
                        if c == '}' {
                            break;
                        }
                        hex.push(c);
                    }
                    hex
                } else {
                    (0..4).filter_map(|_| self.bump()).collect()
                };
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\u{fffd}')
            }
            other => other,
        }))
    }

    fn string(&mut self, quote: char) -> Result<Tok, SyntaxError> {
        let line = self.line;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Tok::Str(out)),
                Some('\\') => {
                    if let Some(c) = self.escape(line)? {
                        out.push(c);
                    }
                }
                Some('\n') | None => {
                    return Err(SyntaxError::new("Invalid or unexpected token", line));
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<Tok, SyntaxError> {
        let line = self.line;
        self.bump();
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => {
                    chunks.push(TemplateChunk::Text(text));
                    return Ok(Tok::Template(chunks));
                }
                Some('\\') => {
                    if let Some(c) = self.escape(line)? {
                        text.push(c);
                    }
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    chunks.push(TemplateChunk::Expr(self.substitution(line)?));
                }
                Some(c) => text.push(c),
                None => return Err(SyntaxError::new("Unterminated template literal", line)),
            }
        }
    }

    /// Raw source up to the `}` closing a `${` substitution.
    fn substitution(&mut self, line: usize) -> Result<String, SyntaxError> {
        let mut depth = 0usize;
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new("Unterminated template literal", line));
            };
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(out),
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    out.push(c);
                    while let Some(inner) = self.bump() {
                        out.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                out.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            out.push(c);
        }
    }

    /// `/pattern/flags`; the pattern is kept verbatim, escapes included.
    fn regex(&mut self) -> Result<Tok, SyntaxError> {
        let line = self.line;
        let unterminated = || SyntaxError::new("Invalid regular expression: missing /", line);
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => return Err(unterminated()),
                Some('\\') => {
                    pattern.push('\\');
                    match self.bump() {
                        None | Some('\n') => return Err(unterminated()),
                        Some(c) => pattern.push(c),
                    }
                }
                Some('/') if !in_class => break,
                Some(c) => {
                    match c {
                        '[' => in_class = true,
                        ']' => in_class = false,
                        _ => {}
                    }
                    pattern.push(c);
                }
            }
        }
        let flags = self.identifier();
        Ok(Tok::Regex { pattern, flags })
    }

    fn punctuator(&mut self) -> Result<Tok, SyntaxError> {
        for p in PUNCTUATORS {
            let matches = p
                .chars()
                .enumerate()
                .all(|(i, pc)| self.peek_at(i) == Some(pc));
            if !matches {
                continue;
            }
            // `a?.5:b` is a conditional, not optional chaining.
            if *p == "?." && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            self.pos += p.len();
            return Ok(Tok::Punct(p));
        }
        let c = self.peek().unwrap_or(' ');
        Err(SyntaxError::new(format!("Invalid or unexpected token '{c}'"), self.line))
    }
}

/// Whether a `/` following `previous` begins a regular expression rather
/// than a division.
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous.map(|t| &t.tok) {
        None => true,
        Some(Tok::Punct(p)) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
        Some(Tok::Ident(word)) => KEYWORDS_BEFORE_EXPRESSION.contains(&word.as_str()),
        Some(_) => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn lexes_greedy_punctuators() {
        assert_eq!(
            toks("a === b ?? c"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("==="),
                Tok::Ident("b".into()),
                Tok::Punct("??"),
                Tok::Ident("c".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(toks("1_000 .5 0x1f 2e3")[..4], [
            Tok::Num(1000.0),
            Tok::Num(0.5),
            Tok::Num(31.0),
            Tok::Num(2000.0),
        ]);
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(toks(r#""a\nA""#)[0], Tok::Str("a\nA".into()));
    }

    #[test]
    fn lexes_template_substitutions() {
        assert_eq!(
            toks("`x=${ {a:1}.a }!`")[0],
            Tok::Template(vec![
                TemplateChunk::Text("x=".into()),
                TemplateChunk::Expr(" {a:1}.a ".into()),
                TemplateChunk::Text("!".into()),
            ])
        );
    }

    #[test]
    fn tracks_newlines_through_comments() {
        let tokens = Lexer::new("a /* \n */ b // c\nd").tokenize().unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert!(tokens[2].newline_before);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn slash_is_a_regex_only_where_an_expression_starts() {
        assert_eq!(
            toks("x = /a[/]b/gi")[2],
            Tok::Regex {
                pattern: "a[/]b".into(),
                flags: "gi".into(),
            }
        );
        assert_eq!(toks("a / b / c")[1], Tok::Punct("/"));
        assert_eq!(toks("f(x) / 2")[4], Tok::Punct("/"));
        assert_eq!(
            toks(r"return /\d+/.test(s)")[1],
            Tok::Regex {
                pattern: r"\d+".into(),
                flags: String::new(),
            }
        );
    }

    #[test]
    fn unterminated_regex_is_an_error() {
        let err = Lexer::new("x = /abc\n").tokenize().unwrap_err();
        assert_eq!(err.message, "Invalid regular expression: missing /");
    }

    #[test]
    fn private_names_lex_as_identifiers() {
        assert_eq!(toks("this.#count")[2], Tok::Ident("#count".into()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
