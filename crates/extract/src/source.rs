//! A small Go tokenizer and top-level parser.
//!
//! This is not a Go compiler front end. It understands exactly as much of the
//! language as is needed to load package metadata: comments (for build
//! constraints and documentation), the package clause, imports, and the
//! shape of top-level declarations. Bodies are skipped by bracket matching,
//! and statement ends follow Go's automatic semicolon rule.

use crate::constraint::{Expr, parse_go_build, parse_plus_build};
use crate::error::{ErrorKind, Result};

const KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough", "for", "func", "go",
    "goto", "if", "import", "interface", "map", "package", "range", "return", "select", "struct", "switch", "type",
    "var",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Ident(String),
    Str(String),
    Char,
    Number,
    IncDec,
    Op(char),
    Semi,
}

#[derive(Debug, Clone)]
struct Token {
    kind: Kind,
    start: usize,
    line: usize,
}

impl Token {
    fn is_ident(&self, text: &str) -> bool {
        matches!(&self.kind, Kind::Ident(s) if s == text)
    }

    fn is_op(&self, op: char) -> bool {
        self.kind == Kind::Op(op)
    }
}

#[derive(Debug, Clone)]
struct Comment {
    text: String,
    start: usize,
    start_line: usize,
    end_line: usize,
}

impl Comment {
    fn is_line(&self) -> bool {
        self.text.starts_with("//")
    }
}

/// Kind of a top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Var,
    Type,
    Func,
}

/// A top-level declaration with its documentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub kind: DeclKind,
    /// Declared names; a grouped `const (...)` declares several.
    pub names: Vec<String>,
    /// Receiver base type name, for methods.
    pub receiver: Option<String>,
    /// Declaration source text, without function bodies.
    pub signature: String,
    pub doc: String,
}

/// Everything the package loader needs from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub package: String,
    /// Package documentation comment, already stripped of comment markers.
    pub doc: String,
    pub imports: Vec<String>,
    pub constraint: Option<Expr>,
    pub decls: Vec<Decl>,
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn ends_statement(last: Option<&Token>) -> bool {
    match last.map(|t| &t.kind) {
        Some(Kind::Ident(word)) => {
            !is_keyword(word) || matches!(word.as_str(), "break" | "continue" | "fallthrough" | "return")
        },
        Some(Kind::Str(_) | Kind::Char | Kind::Number | Kind::IncDec) => true,
        Some(Kind::Op(')' | ']' | '}')) => true,
        _ => false,
    }
}

struct Lexer<'a> {
    file: &'a str,
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a str, src: &'a str) -> Self {
        Self { file, src, pos: 0, line: 1, tokens: Vec::new(), comments: Vec::new() }
    }

    fn error(&self, reason: &str) -> ErrorKind {
        ErrorKind::syntax(self.file, format!("line {}: {reason}", self.line))
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn current_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn push(&mut self, kind: Kind, start: usize, line: usize) {
        self.tokens.push(Token { kind, start, line });
    }

    fn newline(&mut self, at: usize) {
        if ends_statement(self.tokens.last()) {
            self.push(Kind::Semi, at, self.line);
        }
        self.line += 1;
    }

    fn run(mut self) -> Result<(Vec<Token>, Vec<Comment>)> {
        while let Some(b) = self.peek_byte(0) {
            let start = self.pos;
            match b {
                b'\n' => {
                    self.newline(start);
                    self.pos += 1;
                },
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek_byte(1) == Some(b'/') => {
                    let end = self.src[start..].find('\n').map_or(self.src.len(), |n| start + n);
                    self.comments.push(Comment {
                        text: self.src[start..end].to_string(),
                        start,
                        start_line: self.line,
                        end_line: self.line,
                    });
                    self.pos = end;
                },
                b'/' if self.peek_byte(1) == Some(b'*') => {
                    let Some(len) = self.src[start + 2..].find("*/") else {
                        exn::bail!(self.error("comment not terminated"));
                    };
                    let end = start + 2 + len + 2;
                    let text = &self.src[start..end];
                    let newlines = text.matches('\n').count();
                    let start_line = self.line;
                    if newlines > 0 && ends_statement(self.tokens.last()) {
                        self.push(Kind::Semi, start, self.line);
                    }
                    self.line += newlines;
                    self.comments.push(Comment { text: text.to_string(), start, start_line, end_line: self.line });
                    self.pos = end;
                },
                b'"' => {
                    let value = self.interpreted_string()?;
                    self.push(Kind::Str(value), start, self.line);
                },
                b'`' => {
                    let Some(len) = self.src[start + 1..].find('`') else {
                        exn::bail!(self.error("raw string literal not terminated"));
                    };
                    let value = &self.src[start + 1..start + 1 + len];
                    let line = self.line;
                    self.line += value.matches('\n').count();
                    self.push(Kind::Str(value.to_string()), start, line);
                    self.pos = start + len + 2;
                },
                b'\'' => {
                    self.rune()?;
                    self.push(Kind::Char, start, self.line);
                },
                b'0'..=b'9' => self.number(start),
                b'.' if self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) => self.number(start),
                b'+' if self.peek_byte(1) == Some(b'+') => {
                    self.pos += 2;
                    self.push(Kind::IncDec, start, self.line);
                },
                b'-' if self.peek_byte(1) == Some(b'-') => {
                    self.pos += 2;
                    self.push(Kind::IncDec, start, self.line);
                },
                _ if b.is_ascii_punctuation() && b != b'_' => {
                    self.pos += 1;
                    self.push(Kind::Op(char::from(b)), start, self.line);
                },
                _ => {
                    let Some(c) = self.current_char() else {
                        exn::bail!(self.error("unexpected end of input"));
                    };
                    if !(c == '_' || c.is_alphabetic()) {
                        exn::bail!(self.error(&format!("unexpected character {c:?}")));
                    }
                    let end = self.src[start..]
                        .char_indices()
                        .find(|(_, c)| !(*c == '_' || c.is_alphanumeric()))
                        .map_or(self.src.len(), |(n, _)| start + n);
                    self.pos = end;
                    self.push(Kind::Ident(self.src[start..end].to_string()), start, self.line);
                },
            }
        }
        if ends_statement(self.tokens.last()) {
            self.push(Kind::Semi, self.src.len(), self.line);
        }
        Ok((self.tokens, self.comments))
    }

    fn interpreted_string(&mut self) -> Result<String> {
        let mut value = String::new();
        self.pos += 1;
        loop {
            let Some(c) = self.current_char() else {
                exn::bail!(self.error("string literal not terminated"));
            };
            match c {
                '\n' => exn::bail!(self.error("string literal not terminated")),
                '"' => {
                    self.pos += 1;
                    return Ok(value);
                },
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.current_char() else {
                        exn::bail!(self.error("string literal not terminated"));
                    };
                    match escaped {
                        '"' | '\\' => value.push(escaped),
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        other => {
                            value.push('\\');
                            value.push(other);
                        },
                    }
                    self.pos += escaped.len_utf8();
                },
                other => {
                    value.push(other);
                    self.pos += other.len_utf8();
                },
            }
        }
    }

    fn rune(&mut self) -> Result<()> {
        self.pos += 1;
        loop {
            let Some(c) = self.current_char() else {
                exn::bail!(self.error("rune literal not terminated"));
            };
            match c {
                '\n' => exn::bail!(self.error("rune literal not terminated")),
                '\'' => {
                    self.pos += 1;
                    return Ok(());
                },
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.current_char() else {
                        exn::bail!(self.error("rune literal not terminated"));
                    };
                    self.pos += escaped.len_utf8();
                },
                other => self.pos += other.len_utf8(),
            }
        }
    }

    fn number(&mut self, start: usize) {
        let bytes = self.src.as_bytes();
        let mut end = start;
        while end < bytes.len() {
            let b = bytes[end];
            let exponent_sign = (b == b'+' || b == b'-') && matches!(bytes[end - 1], b'e' | b'E' | b'p' | b'P');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                end += 1;
            } else {
                break;
            }
        }
        self.pos = end;
        self.push(Kind::Number, start, self.line);
    }
}

/// Strip comment markers from a group of comments, the way `go doc` does:
/// directives are dropped, blank lines at either end are trimmed and runs of
/// blank lines collapse into one.
fn comment_text(group: &[&Comment]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for comment in group {
        if let Some(body) = comment.text.strip_prefix("//") {
            if is_directive(body) {
                continue;
            }
            lines.push(body.strip_prefix(' ').unwrap_or(body).trim_end().to_string());
        } else {
            let body = comment.text.trim_start_matches("/*").trim_end_matches("*/");
            lines.extend(body.lines().map(|line| line.trim_end().to_string()));
        }
    }
    let mut out: Vec<String> = Vec::new();
    for line in lines {
        if line.is_empty() && out.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    match out.is_empty() {
        true => String::new(),
        false => out.join("\n") + "\n",
    }
}

fn is_directive(body: &str) -> bool {
    body.starts_with("go:")
        || body.starts_with("line ")
        || body.starts_with("export ")
        || body.starts_with("extern ")
        || body.starts_with("nolint")
}

struct Parser<'a> {
    file: &'a str,
    src: &'a str,
    tokens: Vec<Token>,
    /// Comment groups that can serve as documentation (no trailing comments).
    groups: Vec<Vec<Comment>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> ErrorKind {
        let line = self.tokens.get(self.pos).map_or(0, |t| t.line);
        ErrorKind::syntax(self.file, format!("line {line}: {reason}"))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_semis(&mut self) {
        while self.peek().is_some_and(|t| t.kind == Kind::Semi) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.peek().map(|t| &t.kind) {
            Some(Kind::Ident(name)) if !is_keyword(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            },
            _ => exn::bail!(self.error("expected identifier")),
        }
    }

    /// Doc comment for a token on `line`: the group ending on the line above.
    fn doc_for(&self, line: usize) -> String {
        self.groups
            .iter()
            .find(|group| group.last().is_some_and(|c| c.end_line + 1 == line))
            .map(|group| comment_text(&group.iter().collect::<Vec<_>>()))
            .unwrap_or_default()
    }

    fn imports(&mut self) -> Result<Vec<String>> {
        let mut imports = Vec::new();
        loop {
            self.skip_semis();
            if !self.peek().is_some_and(|t| t.is_ident("import")) {
                return Ok(imports);
            }
            self.pos += 1;
            if self.peek().is_some_and(|t| t.is_op('(')) {
                self.pos += 1;
                loop {
                    self.skip_semis();
                    if self.peek().is_some_and(|t| t.is_op(')')) {
                        self.pos += 1;
                        break;
                    }
                    imports.push(self.import_spec()?);
                }
            } else {
                imports.push(self.import_spec()?);
            }
        }
    }

    fn import_spec(&mut self) -> Result<String> {
        if self.peek().is_some_and(|t| matches!(t.kind, Kind::Ident(_)) || t.is_op('.')) {
            self.pos += 1;
        }
        match self.peek().map(|t| &t.kind) {
            Some(Kind::Str(path)) => {
                let path = path.clone();
                self.pos += 1;
                Ok(path)
            },
            _ => exn::bail!(self.error("expected import path")),
        }
    }

    /// Index of the `Semi` ending the statement that starts at `from`.
    fn statement_end(&self, from: usize) -> Result<usize> {
        let mut depth: i32 = 0;
        for (i, token) in self.tokens.iter().enumerate().skip(from) {
            match token.kind {
                Kind::Op('(' | '[' | '{') => depth += 1,
                Kind::Op(')' | ']' | '}') => {
                    depth -= 1;
                    if depth < 0 {
                        exn::bail!(ErrorKind::syntax(self.file, format!("line {}: unbalanced brackets", token.line)));
                    }
                },
                Kind::Semi if depth == 0 => return Ok(i),
                _ => {},
            }
        }
        exn::bail!(ErrorKind::syntax(self.file, "unexpected end of file"))
    }

    fn decls(&mut self) -> Result<Vec<Decl>> {
        let mut decls = Vec::new();
        loop {
            self.skip_semis();
            let Some(token) = self.peek().cloned() else {
                return Ok(decls);
            };
            let kind = match &token.kind {
                Kind::Ident(word) if word == "func" => DeclKind::Func,
                Kind::Ident(word) if word == "type" => DeclKind::Type,
                Kind::Ident(word) if word == "var" => DeclKind::Var,
                Kind::Ident(word) if word == "const" => DeclKind::Const,
                Kind::Ident(word) if word == "import" => {
                    exn::bail!(self.error("imports must appear before other declarations"))
                },
                _ => exn::bail!(self.error("non-declaration statement outside function body")),
            };
            let end = self.statement_end(self.pos)?;
            let decl = match kind {
                DeclKind::Func => self.func_decl(&token, end)?,
                _ => self.gen_decl(kind, &token, end)?,
            };
            decls.push(decl);
            self.pos = end + 1;
        }
    }

    fn func_decl(&mut self, keyword: &Token, end: usize) -> Result<Decl> {
        self.pos += 1;
        let mut receiver = None;
        if self.peek().is_some_and(|t| t.is_op('(')) {
            let mut depth = 0;
            let mut names = Vec::new();
            while self.pos < end {
                match &self.tokens[self.pos].kind {
                    Kind::Op('(' | '[' | '{') => depth += 1,
                    Kind::Op(')' | ']' | '}') => depth -= 1,
                    Kind::Ident(name) if depth == 1 => names.push(name.clone()),
                    _ => {},
                }
                self.pos += 1;
                if depth == 0 {
                    break;
                }
            }
            if depth != 0 {
                exn::bail!(ErrorKind::syntax(self.file, format!("line {}: malformed receiver", keyword.line)));
            }
            receiver = names.pop();
        }
        if self.pos >= end {
            exn::bail!(self.error("expected function name"));
        }
        let name = self.ident()?;
        let mut depth = 0;
        let mut body = None;
        for token in &self.tokens[self.pos..end] {
            match token.kind {
                Kind::Op('(' | '[') => depth += 1,
                Kind::Op(')' | ']') => depth -= 1,
                Kind::Op('{') if depth == 0 => {
                    body = Some(token.start);
                    break;
                },
                _ => {},
            }
        }
        let sig_end = body.unwrap_or(self.tokens[end].start);
        Ok(Decl {
            kind: DeclKind::Func,
            names: vec![name],
            receiver,
            signature: self.src[keyword.start..sig_end].trim_end().to_string(),
            doc: self.doc_for(keyword.line),
        })
    }

    fn gen_decl(&mut self, kind: DeclKind, keyword: &Token, end: usize) -> Result<Decl> {
        self.pos += 1;
        let mut names = Vec::new();
        if self.peek().is_some_and(|t| t.is_op('(')) {
            self.pos += 1;
            loop {
                self.skip_semis();
                if self.pos >= end || self.peek().is_some_and(|t| t.is_op(')')) {
                    break;
                }
                self.spec_names(kind, &mut names)?;
                let spec_end = self.group_spec_end(end);
                self.pos = spec_end;
            }
        } else {
            self.spec_names(kind, &mut names)?;
        }
        Ok(Decl {
            kind,
            names,
            receiver: None,
            signature: self.src[keyword.start..self.tokens[end].start].trim_end().to_string(),
            doc: self.doc_for(keyword.line),
        })
    }

    fn spec_names(&mut self, kind: DeclKind, names: &mut Vec<String>) -> Result<()> {
        names.push(self.ident()?);
        if kind == DeclKind::Type {
            return Ok(());
        }
        while self.peek().is_some_and(|t| t.is_op(',')) {
            self.pos += 1;
            names.push(self.ident()?);
        }
        Ok(())
    }

    /// Position of the `Semi` or `)` ending the grouped spec at `self.pos`.
    fn group_spec_end(&self, limit: usize) -> usize {
        let mut depth = 0;
        for i in self.pos..limit {
            match self.tokens[i].kind {
                Kind::Op('(' | '[' | '{') => depth += 1,
                Kind::Op(')') if depth == 0 => return i,
                Kind::Op(')' | ']' | '}') => depth -= 1,
                Kind::Semi if depth == 0 => return i,
                _ => {},
            }
        }
        limit
    }
}

/// Group comments into runs on adjacent lines, leaving out comments that
/// trail code on the same line.
fn comment_groups(tokens: &[Token], comments: Vec<Comment>) -> Vec<Vec<Comment>> {
    let mut groups: Vec<Vec<Comment>> = Vec::new();
    for comment in comments {
        let before = tokens.partition_point(|t| t.start < comment.start);
        let trailing = before > 0 && {
            let prev = &tokens[before - 1];
            prev.kind != Kind::Semi && prev.line == comment.start_line
        };
        if trailing {
            continue;
        }
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|last| comment.start_line <= last.end_line + 1) => {
                group.push(comment)
            },
            _ => groups.push(vec![comment]),
        }
    }
    groups
}

/// Parse a Go source file far enough to load package metadata from it.
pub fn parse_file(file: &str, contents: &[u8]) -> Result<ParsedFile> {
    let Ok(src) = std::str::from_utf8(contents) else {
        exn::bail!(ErrorKind::syntax(file, "invalid UTF-8"));
    };
    let src = src.strip_prefix('\u{feff}').unwrap_or(src);
    let (tokens, comments) = Lexer::new(file, src).run()?;

    let Some(package_token) = tokens.iter().find(|t| t.kind != Kind::Semi).cloned() else {
        exn::bail!(ErrorKind::syntax(file, "expected package clause"));
    };
    if !package_token.is_ident("package") {
        exn::bail!(ErrorKind::syntax(file, format!("line {}: expected package clause", package_token.line)));
    }

    // Build constraints must come before the package clause, and must not be
    // part of the package doc comment (they are separated by a blank line).
    let groups = comment_groups(&tokens, comments);
    let doc_start = groups
        .iter()
        .find(|group| group.last().is_some_and(|c| c.end_line + 1 == package_token.line))
        .and_then(|group| group.first())
        .map_or(package_token.line, |c| c.start_line);
    let header = groups
        .iter()
        .flatten()
        .filter(|c| c.start < package_token.start && c.end_line < doc_start && c.is_line());
    let mut go_build = None;
    let mut plus_build = Vec::new();
    for comment in header {
        if let Some(rest) = comment.text.strip_prefix("//go:build") {
            if go_build.is_none() && (rest.is_empty() || rest.starts_with([' ', '\t'])) {
                go_build = Some(rest.trim().to_string());
            }
        } else if let Some(rest) = comment.text[2..].trim_start().strip_prefix("+build") {
            if rest.is_empty() || rest.starts_with([' ', '\t']) {
                plus_build.push(rest.trim().to_string());
            }
        }
    }
    let constraint = match go_build {
        Some(expr) => Some(parse_go_build(&expr)?),
        None => parse_plus_build(plus_build.iter().map(String::as_str))?,
    };

    let mut parser = Parser { file, src, tokens, groups, pos: 0 };
    parser.skip_semis();
    parser.pos += 1;
    let package = parser.ident()?;
    let doc = parser.doc_for(package_token.line);
    let imports = parser.imports()?;
    let decls = parser.decls()?;

    Ok(ParsedFile { package, doc, imports, constraint, decls })
}
