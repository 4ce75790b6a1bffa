use crate::template::{extract, ResolveError, Template, TemplateError};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("unknown filter identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("invalid regex in filter: {0}")]
    InvalidRegex(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Matches,
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    Text(String),
    Number(f64),
    Ident(String),
}

#[derive(Debug, Clone)]
enum Operand {
    Template(Template),
    Number(f64),
    Bool(bool),
    Name,
    Source,
    IsDir,
}

#[derive(Debug, Clone)]
enum Node {
    Or(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Compare(Operand, CmpOp, Operand),
    Value(Operand),
}

#[derive(Debug, Clone, Copy)]
pub struct FilterScope<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct FilterExpr {
    source: String,
    root: Node,
}

impl FilterExpr {
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let lexemes = lex(input)?;
        let mut parser = Parser {
            lexemes,
            pos: 0,
        };
        let root = parser.or()?;
        if parser.pos < parser.lexemes.len() {
            return Err(FilterError::Syntax {
                pos: parser.pos,
                message: "unexpected trailing input".to_string(),
            });
        }
        Ok(Self {
            source: input.to_string(),
            root,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn evaluate(
        &self,
        scope: &FilterScope<'_>,
        render: &mut dyn FnMut(&Template) -> Result<String, ResolveError>,
    ) -> Result<bool, FilterError> {
        eval(&self.root, scope, render)
    }
}

fn eval(
    node: &Node,
    scope: &FilterScope<'_>,
    render: &mut dyn FnMut(&Template) -> Result<String, ResolveError>,
) -> Result<bool, FilterError> {
    match node {
        Node::Or(lhs, rhs) => Ok(eval(lhs, scope, render)? || eval(rhs, scope, render)?),
        Node::And(lhs, rhs) => Ok(eval(lhs, scope, render)? && eval(rhs, scope, render)?),
        Node::Not(inner) => Ok(!eval(inner, scope, render)?),
        Node::Value(operand) => {
            let value = operand_text(operand, scope, render)?;
            Ok(truthy(&value))
        }
        Node::Compare(lhs, op, rhs) => {
            let left = operand_text(lhs, scope, render)?;
            let right = operand_text(rhs, scope, render)?;
            compare(&left, *op, &right)
        }
    }
}

fn operand_text(
    operand: &Operand,
    scope: &FilterScope<'_>,
    render: &mut dyn FnMut(&Template) -> Result<String, ResolveError>,
) -> Result<String, FilterError> {
    let text = match operand {
        Operand::Template(template) => render(template)?,
        Operand::Number(n) => n.to_string(),
        Operand::Bool(b) => b.to_string(),
        Operand::Name => scope.name.to_string(),
        Operand::Source => scope.source.to_string(),
        Operand::IsDir => scope.is_dir.to_string(),
    };
    Ok(text)
}

fn truthy(value: &str) -> bool {
    !(value.is_empty() || value == "false" || value == "0")
}

fn compare(left: &str, op: CmpOp, right: &str) -> Result<bool, FilterError> {
    if op == CmpOp::Matches {
        let re = Regex::new(right).map_err(|err| FilterError::InvalidRegex(err.to_string()))?;
        return Ok(re.is_match(left));
    }

    let ordering = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else {
        return Ok(op == CmpOp::Ne);
    };

    Ok(match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Matches => unreachable!("handled above"),
    })
}

fn lex(input: &str) -> Result<Vec<Lexeme>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let syntax = |pos: usize, message: &str| FilterError::Syntax {
        pos,
        message: message.to_string(),
    };

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push(Lexeme::LParen);
                i += 1;
            }
            ')' => {
                out.push(Lexeme::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                out.push(Lexeme::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                out.push(Lexeme::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                out.push(Lexeme::Cmp(CmpOp::Eq));
                i += 2;
            }
            '=' if next == Some('~') => {
                out.push(Lexeme::Cmp(CmpOp::Matches));
                i += 2;
            }
            '!' if next == Some('=') => {
                out.push(Lexeme::Cmp(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                out.push(Lexeme::Not);
                i += 1;
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                let op = match (ch, or_equal) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    (_, true) => CmpOp::Ge,
                    (_, false) => CmpOp::Gt,
                };
                out.push(Lexeme::Cmp(op));
                i += if or_equal { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = ch;
                let start = i;
                i += 1;
                let mut text = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(syntax(start, "unterminated string")),
                        Some('\\') if chars.get(i + 1).is_some() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            i += 1;
                        }
                    }
                }
                out.push(Lexeme::Text(text));
            }
            '{' => {
                let start = i;
                let end = chars[i..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| i + offset)
                    .ok_or_else(|| syntax(start, "unterminated token"))?;
                out.push(Lexeme::Text(chars[start..=end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| syntax(start, "invalid number"))?;
                out.push(Lexeme::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                out.push(Lexeme::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(syntax(i, "unexpected character")),
        }
    }
    Ok(out)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn error(&self, message: &str) -> FilterError {
        FilterError::Syntax {
            pos: self.pos,
            message: message.to_string(),
        }
    }

    fn or(&mut self) -> Result<Node, FilterError> {
        let mut node = self.and()?;
        while self.peek() == Some(&Lexeme::Or) {
            self.pos += 1;
            node = Node::Or(Box::new(node), Box::new(self.and()?));
        }
        Ok(node)
    }

    fn and(&mut self) -> Result<Node, FilterError> {
        let mut node = self.unary()?;
        while self.peek() == Some(&Lexeme::And) {
            self.pos += 1;
            node = Node::And(Box::new(node), Box::new(self.unary()?));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, FilterError> {
        if self.peek() == Some(&Lexeme::Not) {
            self.pos += 1;
            return Ok(Node::Not(Box::new(self.unary()?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Node, FilterError> {
        if self.peek() == Some(&Lexeme::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            if self.peek() != Some(&Lexeme::RParen) {
                return Err(self.error("expected `)`"));
            }
            self.pos += 1;
            return Ok(inner);
        }

        let lhs = self.operand()?;
        if let Some(Lexeme::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.operand()?;
            return Ok(Node::Compare(lhs, op, rhs));
        }
        Ok(Node::Value(lhs))
    }

    fn operand(&mut self) -> Result<Operand, FilterError> {
        let lexeme = self
            .peek()
            .cloned()
            .ok_or_else(|| self.error("expected a value"))?;
        let operand = match lexeme {
            Lexeme::Text(text) => Operand::Template(extract(&text)?),
            Lexeme::Number(n) => Operand::Number(n),
            Lexeme::Ident(ident) => match ident.as_str() {
                "name" => Operand::Name,
                "source" => Operand::Source,
                "is_dir" => Operand::IsDir,
                "true" => Operand::Bool(true),
                "false" => Operand::Bool(false),
                _ => return Err(FilterError::UnknownIdentifier(ident)),
            },
            _ => return Err(self.error("expected a value")),
        };
        self.pos += 1;
        Ok(operand)
    }
}
