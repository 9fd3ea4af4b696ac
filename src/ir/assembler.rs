//! S-expression assembler and printer for method bodies.
//!
//! ```text
//! (
//!   (load-param-object v0)
//!   (.try_start c0)
//!   (invoke-virtual (v0) "LFoo;.bar:()V")
//!   (.try_end c0)
//!   (if-eqz v0 :done)
//!   (const v1 1)
//!   (:done)
//!   (return-void)
//!   (.catch (c0) "Ljava/lang/Exception;")
//!   (return-void)
//! )
//! ```
//!
//! | Form | Meaning |
//! |------|---------|
//! | `(op v.. operand)` | instruction; destination first when the opcode has one |
//! | `(:L)` / `(:L 3)` | branch target / switch case with key 3 |
//! | `(goto :L)` `(if-* v.. :L)` `(switch v (:a :b))` | branches |
//! | `(.try_start c)` `(.try_end c)` | try region handled by catch chain `c` |
//! | `(.catch (c next) "LT;")` | catch entry; type omitted for catch-all |
//! | `(.pos "method" "file" line)` | source position |
//! | `(.pos:p1 "method" "file" line p0)` | named position whose caller is `p0` |
//! | `(.src_block "method" id)` | source block |
//! | `(.dbg DBG_* ..)` | local-variable debug entry |
//!
//! Comments start with `;` and run to end of line.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::code::{frame_size_of, IRCode};
use super::entry::{
    BranchTarget, BranchTargetKind, CatchEntry, DexDebugInstruction, DexPosition,
    MethodItemEntry, SourceBlock, SourceBlockValue, TryEntry, TryEntryKind,
};
use super::instruction::{ArrayData, IRInstruction, Operand, Reg};
use super::list::{EntryId, IRList};
use super::opcode::{IROpcode, RefKind};
use crate::dex::{
    DexAccessFlags, DexError, DexFieldRef, DexMethod, DexMethodRef, DexString, DexType,
    ACC_CONSTRUCTOR, ACC_PRIVATE, ACC_STATIC,
};

/// Assembler error types
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblerError {
    /// Malformed token stream
    Lex { line: usize, message: String },
    /// Malformed s-expression structure
    Parse(String),
    /// Opcode spelling not recognized
    UnknownOpcode(String),
    /// Operand does not fit the opcode
    BadOperand { opcode: String, detail: String },
    /// Branch to a label that is never defined
    UndefinedLabel(String),
    /// Try or catch naming a catch that is never defined
    UndefinedCatch(String),
    /// Symbol construction failed
    Dex(DexError),
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex { line, message } => write!(f, "line {}: {}", line, message),
            Self::Parse(m) => write!(f, "Parse error: {}", m),
            Self::UnknownOpcode(op) => write!(f, "Unknown opcode: {}", op),
            Self::BadOperand { opcode, detail } => {
                write!(f, "Bad operand for {}: {}", opcode, detail)
            }
            Self::UndefinedLabel(l) => write!(f, "Undefined label: {}", l),
            Self::UndefinedCatch(c) => write!(f, "Undefined catch: {}", c),
            Self::Dex(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AssemblerError {}

impl From<DexError> for AssemblerError {
    fn from(e: DexError) -> Self {
        AssemblerError::Dex(e)
    }
}

pub type AssemblerResult<T> = Result<T, AssemblerError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Symbol(String),
    String(String),
    Integer(i64),
    Float(f64),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Symbol(s) => write!(f, "{}", s),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Float(fl) => write!(f, "{}", fl),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == ';' {
                while let Some(c) = self.advance() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> AssemblerError {
        AssemblerError::Lex {
            line: self.line,
            message: message.into(),
        }
    }

    fn read_string(&mut self) -> AssemblerResult<String> {
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.advance() {
            match ch {
                '"' => return Ok(result),
                '\\' => match self.advance() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some(c) => result.push(c),
                    None => return Err(self.error("Unexpected end of string")),
                },
                c => result.push(c),
            }
        }
        Err(self.error("Unclosed string literal"))
    }

    fn read_atom(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | '"' | ';') {
                break;
            }
            result.push(ch);
            self.advance();
        }
        result
    }

    pub fn next_token(&mut self) -> AssemblerResult<Token> {
        self.skip_whitespace_and_comments();
        match self.current() {
            None => Ok(Token::Eof),
            Some('(') => {
                self.advance();
                Ok(Token::LParen)
            }
            Some(')') => {
                self.advance();
                Ok(Token::RParen)
            }
            Some('"') => Ok(Token::String(self.read_string()?)),
            Some(_) => {
                let atom = self.read_atom();
                Ok(classify_atom(atom))
            }
        }
    }

    pub fn tokenize(&mut self) -> AssemblerResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn classify_atom(atom: String) -> Token {
    let (negative, digits) = match atom.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, atom.as_str()),
    };
    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok().map(|v| v as i64)
    } else if digits.starts_with(|c: char| c.is_ascii_digit()) {
        digits.parse::<i64>().ok()
    } else {
        None
    };
    if let Some(v) = parsed {
        return Token::Integer(if negative { v.wrapping_neg() } else { v });
    }
    if atom.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        if let Ok(f) = atom.parse::<f64>() {
            return Token::Float(f);
        }
    }
    Token::Symbol(atom)
}

/// Parsed s-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Atom(String),
    String(String),
    Integer(i64),
    Float(f64),
    List(Vec<SExpr>),
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SExpr::Atom(s) => write!(f, "{}", s),
            SExpr::String(s) => write!(f, "{:?}", s),
            SExpr::Integer(i) => write!(f, "{}", i),
            SExpr::Float(fl) => write!(f, "{}", fl),
            SExpr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub fn parse_sexpr(&mut self) -> AssemblerResult<SExpr> {
        match self.current().clone() {
            Token::LParen => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    match self.current() {
                        Token::RParen => {
                            self.advance();
                            break;
                        }
                        Token::Eof => return Err(AssemblerError::Parse("Unexpected EOF, expected )".into())),
                        _ => items.push(self.parse_sexpr()?),
                    }
                }
                Ok(SExpr::List(items))
            }
            Token::Symbol(s) => {
                self.advance();
                Ok(SExpr::Atom(s))
            }
            Token::String(s) => {
                self.advance();
                Ok(SExpr::String(s))
            }
            Token::Integer(i) => {
                self.advance();
                Ok(SExpr::Integer(i))
            }
            Token::Float(fl) => {
                self.advance();
                Ok(SExpr::Float(fl))
            }
            Token::RParen => Err(AssemblerError::Parse("Unexpected )".into())),
            Token::Eof => Err(AssemblerError::Parse("Unexpected end of input".into())),
        }
    }

    pub fn parse(&mut self) -> AssemblerResult<Vec<SExpr>> {
        let mut exprs = Vec::new();
        while self.current() != &Token::Eof {
            exprs.push(self.parse_sexpr()?);
        }
        Ok(exprs)
    }
}

pub fn parse_sexprs(input: &str) -> AssemblerResult<Vec<SExpr>> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse()
}

fn bad(opcode: &str, detail: impl Into<String>) -> AssemblerError {
    AssemblerError::BadOperand {
        opcode: opcode.to_string(),
        detail: detail.into(),
    }
}

fn parse_reg(expr: &SExpr) -> Option<Reg> {
    match expr {
        SExpr::Atom(a) => a.strip_prefix('v')?.parse().ok(),
        _ => None,
    }
}

fn parse_label(expr: &SExpr) -> Option<&str> {
    match expr {
        SExpr::Atom(a) if a.starts_with(':') => Some(a.as_str()),
        _ => None,
    }
}

fn opt_string(s: &str) -> Option<DexString> {
    if s.is_empty() {
        None
    } else {
        Some(DexString::make(s))
    }
}

#[derive(Default)]
struct Assembler {
    list: IRList,
    /// label name -> (placeholder, case key)
    labels: BTreeMap<String, (EntryId, Option<i32>)>,
    /// (branch entry, label, is switch case)
    label_refs: Vec<(EntryId, String, bool)>,
    catches: BTreeMap<String, EntryId>,
    catch_nexts: Vec<(EntryId, String)>,
    tries: Vec<(EntryId, TryEntryKind, String)>,
    placeholders: Vec<EntryId>,
    positions: BTreeMap<String, Arc<DexPosition>>,
}

impl Assembler {
    fn item(&mut self, expr: &SExpr) -> AssemblerResult<()> {
        let SExpr::List(items) = expr else {
            return Err(AssemblerError::Parse(format!("Expected a list, found {}", expr)));
        };
        let Some(SExpr::Atom(head)) = items.first() else {
            return Err(AssemblerError::Parse(format!("Expected an opcode in {}", expr)));
        };
        let args = &items[1..];
        if head.starts_with(':') {
            return self.label(head, args);
        }
        match head.as_str() {
            ".try_start" | ".try_end" => {
                let kind = if head == ".try_start" {
                    TryEntryKind::Start
                } else {
                    TryEntryKind::End
                };
                let name = match args.first() {
                    Some(SExpr::Atom(n)) => n.clone(),
                    _ => return Err(bad(head, "expected a catch name")),
                };
                let id = self.list.push_back(MethodItemEntry::Fallthrough);
                self.tries.push((id, kind, name));
                Ok(())
            }
            ".catch" => self.catch(args),
            _ if head == ".pos" || head.starts_with(".pos:") => {
                self.position(head.strip_prefix(".pos:"), args)
            }
            ".src_block" => self.source_block(args),
            ".dbg" => self.debug(args),
            _ => self.instruction(head, args),
        }
    }

    fn label(&mut self, name: &str, args: &[SExpr]) -> AssemblerResult<()> {
        let key = match args.first() {
            Some(SExpr::Integer(k)) => Some(*k as i32),
            None => None,
            Some(other) => return Err(bad(name, format!("bad case key {}", other))),
        };
        let id = self.list.push_back(MethodItemEntry::Fallthrough);
        self.placeholders.push(id);
        self.labels.insert(name.to_string(), (id, key));
        Ok(())
    }

    fn catch(&mut self, args: &[SExpr]) -> AssemblerResult<()> {
        let Some(SExpr::List(names)) = args.first() else {
            return Err(bad(".catch", "expected (name [next])"));
        };
        let name = match names.first() {
            Some(SExpr::Atom(n)) => n.clone(),
            _ => return Err(bad(".catch", "missing catch name")),
        };
        let catch_type = match args.get(1) {
            Some(SExpr::String(t)) => Some(DexType::make_checked(t)?),
            None => None,
            Some(other) => return Err(bad(".catch", format!("bad type {}", other))),
        };
        let id = self.list.push_back(MethodItemEntry::Catch(CatchEntry {
            catch_type,
            next: None,
        }));
        if let Some(SExpr::Atom(next)) = names.get(1) {
            self.catch_nexts.push((id, next.clone()));
        }
        self.catches.insert(name, id);
        Ok(())
    }

    fn position(&mut self, name: Option<&str>, args: &[SExpr]) -> AssemblerResult<()> {
        let (method, file, line) = match args {
            [SExpr::String(method), SExpr::String(file), SExpr::Integer(line), ..] => {
                (method, file, *line as u32)
            }
            _ => return Err(bad(".pos", "expected \"method\" \"file\" line [parent]")),
        };
        let mut pos = DexPosition::new(opt_string(method), opt_string(file), line);
        if let Some(SExpr::Atom(parent)) = args.get(3) {
            let parent = self
                .positions
                .get(parent)
                .ok_or_else(|| bad(".pos", format!("unknown parent {}", parent)))?;
            pos.parent = Some(Arc::clone(parent));
        }
        let pos = Arc::new(pos);
        if let Some(name) = name {
            self.positions.insert(name.to_string(), Arc::clone(&pos));
        }
        self.list.push_back(MethodItemEntry::Position(pos));
        Ok(())
    }

    fn source_block(&mut self, args: &[SExpr]) -> AssemblerResult<()> {
        let (src, id) = match args {
            [SExpr::String(src), SExpr::Integer(id), ..] => (DexString::make(src), *id as u32),
            _ => return Err(bad(".src_block", "expected \"method\" id")),
        };
        let mut block = SourceBlock::new(src, id);
        for val in args.iter().skip(2) {
            let value = match val {
                SExpr::List(pair) => match pair.as_slice() {
                    [v, a] => Some(SourceBlockValue {
                        val: number(v).ok_or_else(|| bad(".src_block", "bad value"))?,
                        appear100: number(a).ok_or_else(|| bad(".src_block", "bad value"))?,
                    }),
                    _ => return Err(bad(".src_block", "expected (val appear100)")),
                },
                SExpr::Atom(a) if a == "x" => None,
                other => return Err(bad(".src_block", format!("bad value {}", other))),
            };
            block.vals.push(value);
        }
        self.list
            .push_back(MethodItemEntry::SourceBlock(Box::new(block)));
        Ok(())
    }

    fn debug(&mut self, args: &[SExpr]) -> AssemblerResult<()> {
        let Some(SExpr::Atom(kind)) = args.first() else {
            return Err(bad(".dbg", "expected a DBG_ kind"));
        };
        let reg = || {
            args.get(1)
                .and_then(parse_reg)
                .ok_or_else(|| bad(".dbg", "expected a register"))
        };
        let dbg = match kind.as_str() {
            "DBG_START_LOCAL" => match args.get(2..4) {
                Some([SExpr::String(name), SExpr::String(ty)]) => DexDebugInstruction::StartLocal {
                    reg: reg()?,
                    name: DexString::make(name),
                    ty: DexType::make_checked(ty)?,
                },
                _ => return Err(bad(".dbg", "expected name and type")),
            },
            "DBG_END_LOCAL" => DexDebugInstruction::EndLocal { reg: reg()? },
            "DBG_RESTART_LOCAL" => DexDebugInstruction::RestartLocal { reg: reg()? },
            "DBG_SET_PROLOGUE_END" => DexDebugInstruction::SetPrologueEnd,
            "DBG_SET_EPILOGUE_BEGIN" => DexDebugInstruction::SetEpilogueBegin,
            "DBG_SET_FILE" => match args.get(1) {
                Some(SExpr::String(f)) => DexDebugInstruction::SetFile(opt_string(f)),
                _ => DexDebugInstruction::SetFile(None),
            },
            other => return Err(bad(".dbg", format!("unknown kind {}", other))),
        };
        self.list.push_back(MethodItemEntry::Debug(dbg));
        Ok(())
    }

    fn instruction(&mut self, name: &str, args: &[SExpr]) -> AssemblerResult<()> {
        let opcode = IROpcode::from_name(name).ok_or_else(|| AssemblerError::UnknownOpcode(name.into()))?;
        let mut insn = IRInstruction::new(opcode);
        let mut rest = args;

        if opcode.has_dest() {
            let dest = rest
                .first()
                .and_then(parse_reg)
                .ok_or_else(|| bad(name, "expected a destination register"))?;
            insn.set_dest(dest);
            rest = &rest[1..];
        }

        if opcode.is_invoke() || opcode == IROpcode::FilledNewArray {
            let Some(SExpr::List(regs)) = rest.first() else {
                return Err(bad(name, "expected a register list"));
            };
            let srcs = regs
                .iter()
                .map(|r| parse_reg(r).ok_or_else(|| bad(name, format!("bad register {}", r))))
                .collect::<AssemblerResult<Vec<_>>>()?;
            insn.set_srcs(srcs);
            rest = &rest[1..];
        } else {
            let mut srcs = Vec::new();
            while let Some(reg) = rest.first().and_then(parse_reg) {
                srcs.push(reg);
                rest = &rest[1..];
            }
            insn.set_srcs(srcs);
        }

        let mut labels: Vec<(String, bool)> = Vec::new();
        if opcode.is_goto() || opcode.is_conditional_branch() {
            let label = rest
                .first()
                .and_then(parse_label)
                .ok_or_else(|| bad(name, "expected a label"))?;
            labels.push((label.to_string(), false));
            rest = &rest[1..];
        } else if opcode.is_switch() {
            let Some(SExpr::List(cases)) = rest.first() else {
                return Err(bad(name, "expected a case list"));
            };
            for case in cases {
                let label = parse_label(case).ok_or_else(|| bad(name, "expected a label"))?;
                labels.push((label.to_string(), true));
            }
            rest = &rest[1..];
        }

        match opcode.ref_kind() {
            RefKind::None => {}
            RefKind::Literal => match rest.first() {
                Some(SExpr::Integer(v)) => insn.set_literal(*v),
                _ => return Err(bad(name, "expected a literal")),
            },
            RefKind::String => match rest.first() {
                Some(SExpr::String(s)) => insn.set_operand(Operand::String(DexString::make(s))),
                _ => return Err(bad(name, "expected a string")),
            },
            RefKind::Type => match rest.first() {
                Some(SExpr::String(t)) => insn.set_type(DexType::make_checked(t)?),
                _ => return Err(bad(name, "expected a type")),
            },
            RefKind::Field => match rest.first() {
                Some(SExpr::String(f)) => insn.set_field(DexFieldRef::make_from_descriptor(f)?),
                _ => return Err(bad(name, "expected a field")),
            },
            RefKind::Method => match rest.first() {
                Some(SExpr::String(m)) => insn.set_method(DexMethodRef::make_from_descriptor(m)?),
                _ => return Err(bad(name, "expected a method")),
            },
            RefKind::Data => insn = insn_with_data(insn, name, rest)?,
        }

        let id = self.list.push_back(MethodItemEntry::Opcode(insn));
        for (label, is_case) in labels {
            self.label_refs.push((id, label, is_case));
        }
        Ok(())
    }

    fn finish(mut self) -> AssemblerResult<IRList> {
        for (branch, label, is_case) in std::mem::take(&mut self.label_refs) {
            let (anchor, key) = *self
                .labels
                .get(&label)
                .ok_or_else(|| AssemblerError::UndefinedLabel(label.clone()))?;
            let kind = if is_case {
                BranchTargetKind::Multi(key.ok_or_else(|| bad("switch", format!("{} has no case key", label)))?)
            } else {
                BranchTargetKind::Simple
            };
            self.list.insert_before(
                anchor,
                MethodItemEntry::Target(BranchTarget { kind, src: branch }),
            );
        }
        for (id, next) in std::mem::take(&mut self.catch_nexts) {
            let next_id = *self
                .catches
                .get(&next)
                .ok_or_else(|| AssemblerError::UndefinedCatch(next.clone()))?;
            if let Some(MethodItemEntry::Catch(c)) = self.list.get_mut(id) {
                c.next = Some(next_id);
            }
        }
        for (id, kind, name) in std::mem::take(&mut self.tries) {
            let catch_start = *self
                .catches
                .get(&name)
                .ok_or_else(|| AssemblerError::UndefinedCatch(name.clone()))?;
            if let Some(entry) = self.list.get_mut(id) {
                *entry = MethodItemEntry::Try(TryEntry { kind, catch_start });
            }
        }
        for id in std::mem::take(&mut self.placeholders) {
            self.list.remove(id);
        }
        Ok(self.list)
    }
}

fn number(expr: &SExpr) -> Option<f32> {
    match expr {
        SExpr::Integer(i) => Some(*i as f32),
        SExpr::Float(f) => Some(*f as f32),
        _ => None,
    }
}

fn insn_with_data(insn: IRInstruction, name: &str, rest: &[SExpr]) -> AssemblerResult<IRInstruction> {
    let width = match rest.first() {
        Some(SExpr::Atom(w)) => w
            .strip_prefix('#')
            .and_then(|w| w.parse::<u16>().ok())
            .ok_or_else(|| bad(name, "expected #width"))?,
        _ => return Err(bad(name, "expected #width")),
    };
    let Some(SExpr::List(values)) = rest.get(1) else {
        return Err(bad(name, "expected an element list"));
    };
    let elements = values
        .iter()
        .map(|v| match v {
            SExpr::Integer(i) => Ok(*i as u64),
            other => Err(bad(name, format!("bad element {}", other))),
        })
        .collect::<AssemblerResult<Vec<_>>>()?;
    Ok(insn.with_data(ArrayData {
        element_width: width,
        elements,
    }))
}

/// The body items of a code s-expression: either `((op ..) ..)` or a bare
/// sequence of items.
fn body_items(exprs: &[SExpr]) -> &[SExpr] {
    match exprs {
        [SExpr::List(items)] if items.iter().all(|i| matches!(i, SExpr::List(_))) => items,
        _ => exprs,
    }
}

/// Assemble an entry list from parsed body items.
pub fn list_from_sexprs(items: &[SExpr]) -> AssemblerResult<IRList> {
    let mut asm = Assembler::default();
    for item in items {
        asm.item(item)?;
    }
    asm.finish()
}

/// Assemble a method body. The frame is sized to the registers mentioned.
pub fn ircode_from_string(input: &str) -> AssemblerResult<IRCode> {
    let exprs = parse_sexprs(input)?;
    let list = list_from_sexprs(body_items(&exprs))?;
    let registers_size = frame_size_of(list.instructions());
    Ok(IRCode::new(list, registers_size))
}

/// Assemble a method definition:
/// `(method (public static) "LFoo;.bar:(I)V" ( ..body.. ))`.
///
/// The method is virtual unless it is static, private or a constructor.
pub fn method_from_string(input: &str) -> AssemblerResult<DexMethod> {
    let exprs = parse_sexprs(input)?;
    let [SExpr::List(items)] = exprs.as_slice() else {
        return Err(AssemblerError::Parse("expected one (method ..) form".into()));
    };
    let (flags, descriptor, body) = match items.as_slice() {
        [SExpr::Atom(head), SExpr::List(flags), SExpr::String(desc), rest @ ..] if head == "method" => {
            (flags, desc, rest.first())
        }
        _ => return Err(AssemblerError::Parse("expected (method (flags) \"descriptor\" (body))".into())),
    };
    let mut access = DexAccessFlags::empty();
    for flag in flags {
        let SExpr::Atom(name) = flag else {
            return Err(AssemblerError::Parse(format!("bad access flag {}", flag)));
        };
        access |= DexAccessFlags::from_name(name)
            .ok_or_else(|| AssemblerError::Parse(format!("unknown access flag {}", name)))?;
    }
    let mref = DexMethodRef::make_from_descriptor(descriptor)?;
    let code = match body {
        Some(SExpr::List(items)) => {
            let list = list_from_sexprs(items)?;
            let registers_size = frame_size_of(list.instructions());
            Some(IRCode::new(list, registers_size))
        }
        None => None,
        Some(other) => return Err(AssemblerError::Parse(format!("bad method body {}", other))),
    };
    let is_virtual = !access.contains(ACC_STATIC)
        && !access.contains(ACC_PRIVATE)
        && !access.contains(ACC_CONSTRUCTOR);
    Ok(mref.make_concrete(access, code, is_virtual)?)
}

fn dbg_sexpr(dbg: &DexDebugInstruction) -> String {
    match dbg {
        DexDebugInstruction::StartLocal { reg, name, ty } => {
            format!("(.dbg DBG_START_LOCAL v{} {:?} \"{}\")", reg, name.as_str(), ty)
        }
        DexDebugInstruction::EndLocal { reg } => format!("(.dbg DBG_END_LOCAL v{})", reg),
        DexDebugInstruction::RestartLocal { reg } => format!("(.dbg DBG_RESTART_LOCAL v{})", reg),
        DexDebugInstruction::SetPrologueEnd => "(.dbg DBG_SET_PROLOGUE_END)".to_string(),
        DexDebugInstruction::SetEpilogueBegin => "(.dbg DBG_SET_EPILOGUE_BEGIN)".to_string(),
        DexDebugInstruction::SetFile(f) => format!(
            "(.dbg DBG_SET_FILE {:?})",
            f.map(|s| s.as_str()).unwrap_or("")
        ),
    }
}

fn source_block_sexpr(sb: &SourceBlock) -> String {
    let mut s = format!("(.src_block {:?} {}", sb.src.as_str(), sb.id);
    for v in &sb.vals {
        match v {
            Some(v) => s.push_str(&format!(" ({:?} {:?})", v.val, v.appear100)),
            None => s.push_str(" x"),
        }
    }
    s.push(')');
    s
}

/// Print an entry list in assembler syntax. Labels and catch names are
/// numbered in order of appearance.
pub fn to_s_expr(list: &IRList) -> String {
    let mut catch_names: BTreeMap<EntryId, String> = BTreeMap::new();
    let mut target_labels: BTreeMap<EntryId, String> = BTreeMap::new();
    let mut branch_labels: BTreeMap<EntryId, Vec<String>> = BTreeMap::new();
    for (id, entry) in list.iter() {
        match entry {
            MethodItemEntry::Catch(_) => {
                catch_names.insert(id, format!("c{}", catch_names.len()));
            }
            MethodItemEntry::Target(t) => {
                let label = format!(":L{}", target_labels.len());
                branch_labels.entry(t.src).or_default().push(label.clone());
                target_labels.insert(id, label);
            }
            _ => {}
        }
    }
    // Positions referenced as a parent get a name so children can point at them.
    let mut position_names: Vec<(Arc<DexPosition>, String)> = Vec::new();
    for (_, entry) in list.iter() {
        if let MethodItemEntry::Position(p) = entry {
            if let Some(parent) = &p.parent {
                if !position_names.iter().any(|(q, _)| Arc::ptr_eq(q, parent)) {
                    let name = format!("dbg{}", position_names.len());
                    position_names.push((Arc::clone(parent), name));
                }
            }
        }
    }
    let position_name = |p: &Arc<DexPosition>| {
        position_names
            .iter()
            .find(|(q, _)| Arc::ptr_eq(q, p))
            .map(|(_, n)| n.clone())
    };
    let catch_name = |id: EntryId| {
        catch_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("c?{}", id.index()))
    };

    let mut out = String::from("(\n");
    for (id, entry) in list.iter() {
        let line = match entry {
            MethodItemEntry::Opcode(insn) => {
                let text = insn.to_string();
                let op = insn.opcode();
                if op.is_branch() {
                    let labels = branch_labels.get(&id).cloned().unwrap_or_default();
                    let body = text.strip_suffix(')').unwrap_or(&text);
                    if op.is_switch() {
                        format!("{} ({}))", body, labels.join(" "))
                    } else {
                        format!("{} {})", body, labels.join(" "))
                    }
                } else {
                    text
                }
            }
            MethodItemEntry::DexOpcode(dex) => format!("; {}", dex),
            MethodItemEntry::Try(t) => {
                let kind = match t.kind {
                    TryEntryKind::Start => ".try_start",
                    TryEntryKind::End => ".try_end",
                };
                format!("({} {})", kind, catch_name(t.catch_start))
            }
            MethodItemEntry::Catch(c) => {
                let mut names = catch_name(id);
                if let Some(next) = c.next {
                    names.push(' ');
                    names.push_str(&catch_name(next));
                }
                match c.catch_type {
                    Some(t) => format!("(.catch ({}) \"{}\")", names, t),
                    None => format!("(.catch ({}))", names),
                }
            }
            MethodItemEntry::Target(t) => {
                let label = target_labels.get(&id).cloned().unwrap_or_default();
                match t.kind {
                    BranchTargetKind::Simple => format!("({})", label),
                    BranchTargetKind::Multi(k) => format!("({} {})", label, k),
                }
            }
            MethodItemEntry::Position(p) => {
                let head = match position_name(p) {
                    Some(name) => format!(".pos:{}", name),
                    None => ".pos".to_string(),
                };
                let mut text = format!(
                    "({} {:?} {:?} {}",
                    head,
                    p.method.map(|m| m.as_str()).unwrap_or(""),
                    p.file.map(|f| f.as_str()).unwrap_or(""),
                    p.line
                );
                if let Some(parent) = p.parent.as_ref().and_then(position_name) {
                    text.push(' ');
                    text.push_str(&parent);
                }
                text.push(')');
                text
            }
            MethodItemEntry::Debug(d) => dbg_sexpr(d),
            MethodItemEntry::SourceBlock(sb) => source_block_sexpr(sb),
            MethodItemEntry::Fallthrough => continue,
        };
        out.push_str("  ");
        out.push_str(&line);
        out.push('\n');
    }
    out.push(')');
    out
}
