use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::syntax::{StartMarker, SyntaxConfig};
use crate::utils::{memchr, memstr, unescape};

/// Represents a token in the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Raw template data.
    TemplateData(&'a str),
    /// Variable block start.
    VariableStart,
    /// Variable block end.
    VariableEnd,
    /// Statement block start.
    BlockStart,
    /// Statement block end.
    BlockEnd,
    /// An identifier.
    Ident(&'a str),
    /// A string.
    Str(Cow<'a, str>),
    /// An integer (limited to i64)
    Int(i64),
    /// A float
    Float(f64),
    /// A plus (`+`) operator.
    Plus,
    /// A minus (`-`) operator.
    Minus,
    /// A mul (`*`) operator.
    Mul,
    /// A div (`/`) operator.
    Div,
    /// A floor division (`//`) operator.
    FloorDiv,
    /// Power operator (`**`).
    Pow,
    /// A mod (`%`) operator.
    Mod,
    /// A dot operator (`.`)
    Dot,
    /// The comma operator (`,`)
    Comma,
    /// The colon operator (`:`)
    Colon,
    /// The tilde operator (`~`)
    Tilde,
    /// The assignment operator (`=`)
    Assign,
    /// The pipe symbol.
    Pipe,
    /// `==` operator
    Eq,
    /// `!=` operator
    Ne,
    /// `>` operator
    Gt,
    /// `>=` operator
    Gte,
    /// `<` operator
    Lt,
    /// `<=` operator
    Lte,
    /// Open Bracket
    BracketOpen,
    /// Close Bracket
    BracketClose,
    /// Open Parenthesis
    ParenOpen,
    /// Close Parenthesis
    ParenClose,
    /// Open Brace
    BraceOpen,
    /// Close Brace
    BraceClose,
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TemplateData(_) => write!(f, "template-data"),
            Token::VariableStart => write!(f, "start of variable block"),
            Token::VariableEnd => write!(f, "end of variable block"),
            Token::BlockStart => write!(f, "start of block"),
            Token::BlockEnd => write!(f, "end of block"),
            Token::Ident(_) => write!(f, "identifier"),
            Token::Str(_) => write!(f, "string"),
            Token::Int(_) => write!(f, "integer"),
            Token::Float(_) => write!(f, "float"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Mul => write!(f, "`*`"),
            Token::Div => write!(f, "`/`"),
            Token::FloorDiv => write!(f, "`//`"),
            Token::Pow => write!(f, "`**`"),
            Token::Mod => write!(f, "`%`"),
            Token::Dot => write!(f, "`.`"),
            Token::Comma => write!(f, "`,`"),
            Token::Colon => write!(f, "`:`"),
            Token::Tilde => write!(f, "`~`"),
            Token::Assign => write!(f, "`=`"),
            Token::Pipe => write!(f, "`|`"),
            Token::Eq => write!(f, "`==`"),
            Token::Ne => write!(f, "`!=`"),
            Token::Gt => write!(f, "`>`"),
            Token::Gte => write!(f, "`>=`"),
            Token::Lt => write!(f, "`<`"),
            Token::Lte => write!(f, "`<=`"),
            Token::BracketOpen => write!(f, "`[`"),
            Token::BracketClose => write!(f, "`]`"),
            Token::ParenOpen => write!(f, "`(`"),
            Token::ParenClose => write!(f, "`)`"),
            Token::BraceOpen => write!(f, "`{{`"),
            Token::BraceClose => write!(f, "`}}`"),
        }
    }
}

/// Token span information
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " @ {}:{}-{}:{}",
            self.start_line, self.start_col, self.end_line, self.end_col
        )
    }
}

/// The whitespace handling configuration of the lexer.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceConfig {
    /// Remove the first newline after a block tag.
    pub trim_blocks: bool,
    /// Strip leading spaces and tabs from the start of a line to a block tag.
    pub lstrip_blocks: bool,
    /// Preserve the template-final newline.
    pub keep_trailing_newline: bool,
}

enum LexerState {
    Template,
    InVariable,
    InBlock,
    /// A line statement block; terminated by the end of the line instead of
    /// a block end delimiter.
    InLineStatement,
}

/// What whitespace to remove before handing out the next template data.
#[derive(Copy, Clone, PartialEq)]
enum PendingTrim {
    None,
    /// Strip all leading whitespace (a `-` before the closing delimiter).
    LeadingWhitespace,
    /// Strip a single leading newline (`trim_blocks`).
    Newline,
}

fn find_start_marker_memchr(a: &str) -> Option<(usize, bool)> {
    let bytes = a.as_bytes();
    let mut offset = 0;
    loop {
        let idx = match memchr(&bytes[offset..], b'{') {
            Some(idx) => idx,
            None => return None,
        };
        if let Some(b'{' | b'%' | b'#') = bytes.get(offset + idx + 1).copied() {
            return Some((
                offset + idx,
                bytes.get(offset + idx + 2).copied() == Some(b'-'),
            ));
        }
        offset += idx + 1;
    }
}

fn find_start_marker(a: &str, syntax_config: &SyntaxConfig) -> Option<(usize, bool)> {
    // If we have custom delimiters we need to use aho-corasick, otherwise
    // the internal memchr loop does the same job for the default syntax.
    match syntax_config.aho_corasick {
        Some(ref ac) => {
            let bytes = a.as_bytes();
            ac.find(bytes).map(|m| {
                (
                    m.start(),
                    bytes.get(m.start() + m.len()).copied() == Some(b'-'),
                )
            })
        }
        None => find_start_marker_memchr(a),
    }
}

fn match_start_marker(rest: &str, syntax_config: &SyntaxConfig) -> Option<(StartMarker, usize)> {
    if syntax_config.aho_corasick.is_none() {
        return match rest.get(..2) {
            Some("{{") => Some((StartMarker::Variable, 2)),
            Some("{%") => Some((StartMarker::Block, 2)),
            Some("{#") => Some((StartMarker::Comment, 2)),
            _ => None,
        };
    }

    for delimiter in syntax_config.start_delimiters_order {
        let marker = match delimiter {
            StartMarker::Variable => &syntax_config.syntax.variable_start as &str,
            StartMarker::Block => &syntax_config.syntax.block_start as &str,
            StartMarker::Comment => &syntax_config.syntax.comment_start as &str,
        };
        if rest.get(..marker.len()) == Some(marker) {
            return Some((delimiter, marker.len()));
        }
    }

    None
}

fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Matches a basic tag such as `{% raw %}` from the material after the block
/// start delimiter.  Returns the number of bytes skipped and whether the tag
/// ended with whitespace removal.
fn skip_basic_tag(block_str: &str, name: &str, block_end: &str) -> Option<(usize, bool)> {
    let mut ptr = block_str;
    let mut trim = false;

    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
    }
    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }

    ptr = match ptr.strip_prefix(name) {
        Some(ptr) => ptr,
        None => return None,
    };

    while let Some(rest) = ptr.strip_prefix(|x: char| x.is_ascii_whitespace()) {
        ptr = rest;
    }
    if let Some(rest) = ptr.strip_prefix('-') {
        ptr = rest;
        trim = true;
    }
    ptr = match ptr.strip_prefix(block_end) {
        Some(ptr) => ptr,
        None => return None,
    };

    Some((block_str.len() - ptr.len(), trim))
}

/// Strips trailing spaces and tabs back to the last newline.  Used by
/// `lstrip_blocks` which only removes whitespace at the start of a line.
fn lstrip_block_data(s: &str, at_line_start: bool) -> &str {
    let trimmed = s.trim_end_matches([' ', '\t']);
    if trimmed.ends_with(['\n', '\r']) || (trimmed.is_empty() && at_line_start) {
        trimmed
    } else {
        s
    }
}

/// Tokenizes template source into a token stream.
pub struct Tokenizer<'s> {
    rest: &'s str,
    stack: Vec<LexerState>,
    failed: bool,
    current_line: u32,
    current_col: u32,
    syntax_config: SyntaxConfig,
    ws_config: WhitespaceConfig,
    pending_trim: PendingTrim,
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    ///
    /// When `in_expr` is set the tokenizer starts out inside an expression
    /// rather than in template data.  This is used for standalone expression
    /// compilation.
    pub fn new(
        input: &'s str,
        in_expr: bool,
        syntax_config: SyntaxConfig,
        ws_config: WhitespaceConfig,
    ) -> Tokenizer<'s> {
        let mut source = input;
        if !ws_config.keep_trailing_newline {
            if let Some(stripped) = source.strip_suffix('\n') {
                source = stripped;
            }
            if let Some(stripped) = source.strip_suffix('\r') {
                source = stripped;
            }
        }
        Tokenizer {
            rest: source,
            stack: vec![if in_expr {
                LexerState::InVariable
            } else {
                LexerState::Template
            }],
            failed: false,
            current_line: 1,
            current_col: 0,
            syntax_config,
            ws_config,
            pending_trim: PendingTrim::None,
        }
    }

    /// Produces the next token or `None` at the end of input.
    pub fn next_token(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        loop {
            if self.rest.is_empty() || self.failed {
                // a line statement that runs to the end of input still needs
                // its closing block end token.
                if !self.failed {
                    if let Some(LexerState::InLineStatement) = self.stack.last() {
                        self.stack.pop();
                        let span = self.span(self.loc());
                        return Ok(Some((Token::BlockEnd, span)));
                    }
                }
                return Ok(None);
            }

            match self.stack.last() {
                Some(LexerState::Template) => {
                    if let Some(rv) = ok!(self.tokenize_template_data()) {
                        return Ok(Some(rv));
                    }
                }
                Some(LexerState::InLineStatement) => {
                    if let Some(rv) = ok!(self.tokenize_in_block(true)) {
                        return Ok(Some(rv));
                    }
                }
                Some(LexerState::InBlock) | Some(LexerState::InVariable) => {
                    if let Some(rv) = ok!(self.tokenize_in_block(false)) {
                        return Ok(Some(rv));
                    }
                }
                None => unreachable!("empty lexer state"),
            }
        }
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        for c in skipped.chars() {
            match c {
                '\n' => {
                    self.current_line += 1;
                    self.current_col = 0;
                }
                _ => self.current_col += 1,
            }
        }
        self.rest = new_rest;
        skipped
    }

    #[inline(always)]
    fn loc(&self) -> (u32, u32) {
        (self.current_line, self.current_col)
    }

    fn span(&self, start: (u32, u32)) -> Span {
        let (start_line, start_col) = start;
        Span {
            start_line,
            start_col,
            end_line: self.current_line,
            end_col: self.current_col,
        }
    }

    fn syntax_error(&mut self, msg: &'static str) -> Error {
        self.failed = true;
        Error::new(ErrorKind::Lexical, msg)
    }

    fn apply_pending_trim(&mut self) {
        match std::mem::replace(&mut self.pending_trim, PendingTrim::None) {
            PendingTrim::None => {}
            PendingTrim::LeadingWhitespace => {
                let skip = self
                    .rest
                    .chars()
                    .map_while(|c| c.is_whitespace().then(|| c.len_utf8()))
                    .sum::<usize>();
                if skip > 0 {
                    self.advance(skip);
                }
            }
            PendingTrim::Newline => {
                if self.rest.starts_with("\r\n") {
                    self.advance(2);
                } else if self.rest.starts_with('\n') {
                    self.advance(1);
                }
            }
        }
    }

    fn block_end_trim(&self, explicit_trim: bool) -> PendingTrim {
        if explicit_trim {
            PendingTrim::LeadingWhitespace
        } else if self.ws_config.trim_blocks {
            PendingTrim::Newline
        } else {
            PendingTrim::None
        }
    }

    /// Finds a line statement start: the prefix preceded only by spaces or
    /// tabs since the start of a line.  Returns (data_end, prefix_end).
    fn find_line_statement(&self) -> Option<(usize, usize)> {
        let prefix = some!(self.syntax_config.line_statement_prefix());
        let bytes = self.rest.as_bytes();
        let mut offset = 0;
        loop {
            let idx = some!(memstr(&bytes[offset..], prefix.as_bytes())) + offset;
            let line_start = match bytes[..idx].iter().rposition(|&c| c == b'\n') {
                Some(pos) => Some(pos + 1),
                None if self.current_col == 0 => Some(0),
                None => None,
            };
            if let Some(start) = line_start {
                if bytes[start..idx].iter().all(|&c| c == b' ' || c == b'\t') {
                    return Some((start, idx + prefix.len()));
                }
            }
            offset = idx + 1;
        }
    }

    fn find_line_comment(&self) -> Option<usize> {
        let prefix = some!(self.syntax_config.line_comment_prefix());
        memstr(self.rest.as_bytes(), prefix.as_bytes())
    }

    fn tokenize_template_data(&mut self) -> Result<Option<(Token<'s>, Span)>, Error> {
        self.apply_pending_trim();
        if self.rest.is_empty() {
            return Ok(None);
        }

        let old_loc = self.loc();
        let marker = find_start_marker(self.rest, &self.syntax_config);
        let line_stmt = self.find_line_statement();
        let line_comment = self.find_line_comment();

        // figure out which construct comes first
        let marker_pos = marker.map(|x| x.0).unwrap_or(usize::MAX);
        let line_stmt_pos = line_stmt.map(|x| x.0).unwrap_or(usize::MAX);
        let line_comment_pos = line_comment.unwrap_or(usize::MAX);

        if line_comment_pos < marker_pos && line_comment_pos < line_stmt_pos {
            let lead = &self.rest[..line_comment_pos];
            self.advance(line_comment_pos);
            let span = self.span(old_loc);
            let eol = memchr(self.rest.as_bytes(), b'\n').unwrap_or(self.rest.len());
            self.advance(eol);
            if !lead.is_empty() {
                return Ok(Some((Token::TemplateData(lead), span)));
            }
            return Ok(None);
        }

        if line_stmt_pos < marker_pos {
            let (data_end, prefix_end) = line_stmt.unwrap();
            if data_end > 0 {
                // hand out the data first; the next call finds the prefix at
                // the start of the line again and opens the block.
                let lead = &self.rest[..data_end];
                self.advance(data_end);
                return Ok(Some((Token::TemplateData(lead), self.span(old_loc))));
            }
            self.advance(prefix_end);
            self.stack.push(LexerState::InLineStatement);
            return Ok(Some((Token::BlockStart, self.span(old_loc))));
        }

        match marker.map(|(pos, _)| (pos, match_start_marker(&self.rest[pos..], &self.syntax_config))) {
            Some((0, Some((StartMarker::Comment, skip)))) => {
                let comment_end = &self.syntax_config.syntax.comment_end as &str;
                match memstr(&self.rest.as_bytes()[skip..], comment_end.as_bytes()) {
                    Some(end) => {
                        let explicit_trim = self
                            .rest
                            .as_bytes()
                            .get(end.saturating_sub(1) + skip)
                            .copied()
                            == Some(b'-');
                        self.advance(end + skip + comment_end.len());
                        self.pending_trim = if explicit_trim {
                            PendingTrim::LeadingWhitespace
                        } else {
                            self.block_end_trim(false)
                        };
                        Ok(None)
                    }
                    None => Err(self.syntax_error("unexpected end of comment")),
                }
            }
            Some((0, Some((StartMarker::Variable, skip)))) => {
                if self.rest.as_bytes().get(skip) == Some(&b'-') {
                    self.advance(skip + 1);
                } else {
                    self.advance(skip);
                }
                self.stack.push(LexerState::InVariable);
                Ok(Some((Token::VariableStart, self.span(old_loc))))
            }
            Some((0, Some((StartMarker::Block, skip)))) => {
                let block_start = self.syntax_config.syntax.block_start.to_string();
                let block_end = self.syntax_config.syntax.block_end.to_string();
                let block_start = block_start.as_str();
                let block_end = block_end.as_str();
                // raw blocks require special handling.  If we are at the
                // beginning of a raw block we want to skip everything until
                // {% endraw %} completely ignoring interior syntax and emit
                // the entire raw block as TemplateData.
                if let Some((raw, trim_start)) =
                    skip_basic_tag(&self.rest[skip..], "raw", block_end)
                {
                    self.advance(raw + skip);
                    let mut ptr = 0;
                    while let Some(block) =
                        memstr(&self.rest.as_bytes()[ptr..], block_start.as_bytes())
                    {
                        ptr += block + block_start.len();
                        let trim_end = self.rest.as_bytes().get(ptr) == Some(&b'-');
                        if let Some((endraw, trim_next)) =
                            skip_basic_tag(&self.rest[ptr..], "endraw", block_end)
                        {
                            let mut result = &self.rest[..ptr - block_start.len()];
                            if trim_start {
                                result = result.trim_start();
                            }
                            if trim_end {
                                result = result.trim_end();
                            }
                            self.advance(ptr + endraw);
                            self.pending_trim = self.block_end_trim(trim_next);
                            return Ok(Some((Token::TemplateData(result), self.span(old_loc))));
                        }
                    }
                    return Err(self.syntax_error("unexpected end of raw block"));
                }

                if self.rest.as_bytes().get(skip) == Some(&b'-') {
                    self.advance(skip + 1);
                } else {
                    self.advance(skip);
                }

                self.stack.push(LexerState::InBlock);
                Ok(Some((Token::BlockStart, self.span(old_loc))))
            }
            Some((_, _)) => {
                // template data up to the marker
                let (pos, hyphen) = marker.unwrap();
                let peeked = &self.rest[..pos];
                let lead = if hyphen {
                    peeked.trim_end()
                } else if self.ws_config.lstrip_blocks
                    && !matches!(
                        match_start_marker(&self.rest[pos..], &self.syntax_config),
                        Some((StartMarker::Variable, _))
                    )
                {
                    lstrip_block_data(peeked, old_loc.1 == 0)
                } else {
                    peeked
                };
                self.advance(lead.len());
                let span = self.span(old_loc);
                self.advance(peeked.len() - lead.len());
                if lead.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some((Token::TemplateData(lead), span)))
                }
            }
            None => {
                let lead = self.advance(self.rest.len());
                let span = self.span(old_loc);
                if lead.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some((Token::TemplateData(lead), span)))
                }
            }
        }
    }

    fn tokenize_in_block(
        &mut self,
        line_mode: bool,
    ) -> Result<Option<(Token<'s>, Span)>, Error> {
        let old_loc = self.loc();

        // in blocks whitespace is generally ignored; in line statements the
        // newline terminates the block instead.
        if line_mode {
            let skip = self
                .rest
                .as_bytes()
                .iter()
                .take_while(|&&c| c == b' ' || c == b'\t' || c == b'\r')
                .count();
            if skip > 0 {
                self.advance(skip);
            }
            if self.rest.is_empty() {
                self.stack.pop();
                return Ok(Some((Token::BlockEnd, self.span(old_loc))));
            }
            if self.rest.as_bytes()[0] == b'\n' {
                self.stack.pop();
                self.advance(1);
                return Ok(Some((Token::BlockEnd, self.span(old_loc))));
            }
        } else {
            match self
                .rest
                .as_bytes()
                .iter()
                .position(|&x| !x.is_ascii_whitespace())
            {
                Some(0) => {}
                None => {
                    self.advance(self.rest.len());
                    return Ok(None);
                }
                Some(offset) => {
                    self.advance(offset);
                    return Ok(None);
                }
            }

            // look out for the end of blocks
            if let Some(&LexerState::InBlock) = self.stack.last() {
                let block_end = &self.syntax_config.syntax.block_end as &str;
                if self.rest.get(..1) == Some("-")
                    && self.rest.get(1..block_end.len() + 1) == Some(block_end)
                {
                    self.stack.pop();
                    self.advance(block_end.len() + 1);
                    self.pending_trim = self.block_end_trim(true);
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
                if self.rest.get(..block_end.len()) == Some(block_end) {
                    self.stack.pop();
                    self.advance(block_end.len());
                    self.pending_trim = self.block_end_trim(false);
                    return Ok(Some((Token::BlockEnd, self.span(old_loc))));
                }
            } else {
                let variable_end = &self.syntax_config.syntax.variable_end as &str;
                if self.rest.get(..1) == Some("-")
                    && self.rest.get(1..variable_end.len() + 1) == Some(variable_end)
                {
                    self.stack.pop();
                    self.advance(variable_end.len() + 1);
                    self.pending_trim = PendingTrim::LeadingWhitespace;
                    return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                }
                if self.rest.get(..variable_end.len()) == Some(variable_end) {
                    self.stack.pop();
                    self.advance(variable_end.len());
                    return Ok(Some((Token::VariableEnd, self.span(old_loc))));
                }
            }
        }

        // two character operators
        let op = match self.rest.as_bytes().get(..2) {
            Some(b"//") => Some(Token::FloorDiv),
            Some(b"**") => Some(Token::Pow),
            Some(b"==") => Some(Token::Eq),
            Some(b"!=") => Some(Token::Ne),
            Some(b">=") => Some(Token::Gte),
            Some(b"<=") => Some(Token::Lte),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok(Some((op, self.span(old_loc))));
        }

        // single character operators (and strings)
        let op = match self.rest.as_bytes().first() {
            Some(b'+') => Some(Token::Plus),
            Some(b'-') => Some(Token::Minus),
            Some(b'*') => Some(Token::Mul),
            Some(b'/') => Some(Token::Div),
            Some(b'%') => Some(Token::Mod),
            Some(b'.') => Some(Token::Dot),
            Some(b',') => Some(Token::Comma),
            Some(b':') => Some(Token::Colon),
            Some(b'~') => Some(Token::Tilde),
            Some(b'|') => Some(Token::Pipe),
            Some(b'=') => Some(Token::Assign),
            Some(b'>') => Some(Token::Gt),
            Some(b'<') => Some(Token::Lt),
            Some(b'(') => Some(Token::ParenOpen),
            Some(b')') => Some(Token::ParenClose),
            Some(b'[') => Some(Token::BracketOpen),
            Some(b']') => Some(Token::BracketClose),
            Some(b'{') => Some(Token::BraceOpen),
            Some(b'}') => Some(Token::BraceClose),
            Some(b'\'') => return self.eat_string(b'\'').map(Some),
            Some(b'"') => return self.eat_string(b'"').map(Some),
            Some(c) if c.is_ascii_digit() => return self.eat_number().map(Some),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            return Ok(Some((op, self.span(old_loc))));
        }

        self.eat_identifier().map(Some)
    }

    fn eat_number(&mut self) -> Result<(Token<'s>, Span), Error> {
        #[derive(Copy, Clone)]
        enum State {
            Integer,      // 123
            Fraction,     // .123
            Exponent,     // E | e
            ExponentSign, // +|-
        }

        let old_loc = self.loc();
        let mut state = State::Integer;
        let mut num_len = self
            .rest
            .as_bytes()
            .iter()
            .take_while(|&c| c.is_ascii_digit())
            .count();
        for c in self.rest.as_bytes()[num_len..].iter().copied() {
            state = match (c, state) {
                (b'.', State::Integer) => State::Fraction,
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', state) => state,
                _ => break,
            };
            num_len += 1;
        }
        let is_float = !matches!(state, State::Integer);

        let num = self.advance(num_len);
        Ok((
            ok!(if is_float {
                num.parse()
                    .map(Token::Float)
                    .map_err(|_| self.syntax_error("invalid float"))
            } else {
                num.parse()
                    .map(Token::Int)
                    .map_err(|_| self.syntax_error("invalid integer"))
            }),
            self.span(old_loc),
        ))
    }

    fn eat_identifier(&mut self) -> Result<(Token<'s>, Span), Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            let old_loc = self.loc();
            let ident = self.advance(ident_len);
            Ok((Token::Ident(ident), self.span(old_loc)))
        } else {
            Err(self.syntax_error("unexpected character"))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<(Token<'s>, Span), Error> {
        let old_loc = self.loc();
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest
            .as_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest.as_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        Ok(if has_escapes {
            (
                Token::Str(Cow::Owned(match unescape(&s[1..s.len() - 1]) {
                    Ok(unescaped) => unescaped,
                    Err(err) => return Err(err),
                })),
                self.span(old_loc),
            )
        } else {
            (
                Token::Str(Cow::Borrowed(&s[1..s.len() - 1])),
                self.span(old_loc),
            )
        })
    }
}

/// Tokenizes the source into an iterator of tokens.
#[allow(unused)]
pub fn tokenize<'s>(
    input: &'s str,
    in_expr: bool,
    syntax_config: SyntaxConfig,
    ws_config: WhitespaceConfig,
) -> impl Iterator<Item = Result<(Token<'s>, Span), Error>> {
    let mut tokenizer = Tokenizer::new(input, in_expr, syntax_config, ws_config);
    std::iter::from_fn(move || tokenizer.next_token().transpose())
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_find_marker() {
        let syntax = SyntaxConfig::default();
        assert!(find_start_marker("{", &syntax).is_none());
        assert!(find_start_marker("foo", &syntax).is_none());
        assert!(find_start_marker("foo {", &syntax).is_none());
        assert_eq!(find_start_marker("foo {{", &syntax), Some((4, false)));
        assert_eq!(find_start_marker("foo {{-", &syntax), Some((4, true)));
    }

    #[test]
    fn test_is_basic_tag() {
        assert_eq!(skip_basic_tag(" raw %}", "raw", "%}"), Some((7, false)));
        assert_eq!(skip_basic_tag(" raw %}", "endraw", "%}"), None);
        assert_eq!(skip_basic_tag("  raw  %}", "raw", "%}"), Some((9, false)));
        assert_eq!(skip_basic_tag("-  raw  -%}", "raw", "%}"), Some((11, true)));
    }

    #[test]
    fn test_basic_identifiers() {
        fn assert_ident(s: &str) {
            match tokenize(s, true, Default::default(), Default::default()).next() {
                Some(Ok((Token::Ident(ident), _))) if ident == s => {}
                _ => panic!("did not get a matching token result: {s:?}"),
            }
        }

        fn assert_not_ident(s: &str) {
            let res = tokenize(s, true, Default::default(), Default::default())
                .collect::<Result<Vec<_>, _>>();
            if let Ok(tokens) = res {
                if let &[(Token::Ident(_), _)] = &tokens[..] {
                    panic!("got a single ident for {s:?}")
                }
            }
        }

        assert_ident("foo_bar_baz");
        assert_ident("_foo_bar_baz");
        assert_ident("_42world");
        assert_ident("_world42");
        assert_ident("world42");
        assert_not_ident("42world");
    }
}
