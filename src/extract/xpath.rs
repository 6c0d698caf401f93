//! A compact XPath 1.0 subset evaluated directly over `scraper` trees.
//!
//! Covers location paths (`/`, `//`, `.`, `..`, `@attr`, explicit axes),
//! node tests (name, `*`, `text()`, `node()`) and predicates built from
//! positions, `last()`, comparisons, `contains()`, `starts-with()`,
//! `normalize-space()`, `not()`, `and` and `or`.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use crate::error::ExtractError;

/// A node produced by evaluating an expression.
#[derive(Debug, Clone, Copy)]
pub enum XNode<'a> {
    /// The root above the top element.
    Root,
    Element(ElementRef<'a>),
    Text(&'a str),
    Attribute { name: &'a str, value: &'a str },
}

impl<'a> XNode<'a> {
    pub fn as_element(&self) -> Option<ElementRef<'a>> {
        match self {
            XNode::Element(el) => Some(*el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfNode,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(Operand, Operand),
    Ne(Operand, Operand),
    Contains(Operand, Operand),
    StartsWith(Operand, Operand),
    Exists(Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Attr(String),
    Text,
    Context,
    Child(String),
    Literal(String),
    Normalize(Box<Operand>),
}

/// A parsed expression, reusable across documents.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

impl XPath {
    pub fn parse(expression: &str) -> Result<Self, ExtractError> {
        let invalid = |reason: String| ExtractError::InvalidXPath {
            expression: expression.to_string(),
            reason,
        };
        let tokens = tokenize(expression).map_err(invalid)?;
        let absolute = matches!(tokens.first(), Some(Token::Slash | Token::DoubleSlash));
        let mut parser = Parser { tokens, pos: 0 };
        let steps = parser.location_path().map_err(invalid)?;
        if let Some(tok) = parser.peek() {
            return Err(invalid(format!("unexpected token {tok:?}")));
        }
        Ok(Self {
            source: expression.to_string(),
            absolute,
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates against a full document; `/html` addresses the root element.
    pub fn select_document<'a>(&self, document: &'a Html) -> Vec<XNode<'a>> {
        let tree = Tree { top: document.root_element() };
        tree.evaluate(self, XNode::Root)
    }

    /// Evaluates with `element` as both the context node and the only child
    /// of the root. Relative paths (`a`, `./a`) start at `element`; paths
    /// beginning with `/` or `//` start at the root above it.
    pub fn select_within<'a>(&self, element: ElementRef<'a>) -> Vec<XNode<'a>> {
        let tree = Tree { top: element };
        let start = if self.absolute { XNode::Root } else { XNode::Element(element) };
        tree.evaluate(self, start)
    }
}

/// Concatenated text content of a node.
pub fn string_value(node: &XNode<'_>, top: Option<ElementRef<'_>>) -> String {
    match node {
        XNode::Root => top.map(|el| el.text().collect()).unwrap_or_default(),
        XNode::Element(el) => el.text().collect(),
        XNode::Text(t) => (*t).to_string(),
        XNode::Attribute { value, .. } => (*value).to_string(),
    }
}

/// The root's only child is `top`; nothing above it is reachable.
struct Tree<'a> {
    top: ElementRef<'a>,
}

impl<'a> Tree<'a> {
    fn evaluate(&self, path: &XPath, start: XNode<'a>) -> Vec<XNode<'a>> {
        let mut context = vec![start];
        for step in &path.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for node in &context {
                for candidate in self.apply_step(node, step) {
                    if let XNode::Element(el) = candidate {
                        if !seen.insert(el.id()) {
                            continue;
                        }
                    }
                    next.push(candidate);
                }
            }
            context = next;
        }
        context
    }

    fn apply_step(&self, node: &XNode<'a>, step: &Step) -> Vec<XNode<'a>> {
        let candidates: Vec<XNode<'a>> = match step.axis {
            Axis::Child => self.children(node),
            Axis::Descendant => {
                let mut out = Vec::new();
                for child in self.children(node) {
                    self.collect_descendants(child, &mut out);
                }
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = Vec::new();
                self.collect_descendants(*node, &mut out);
                out
            }
            Axis::Parent => self.parent(node).into_iter().collect(),
            Axis::SelfNode => vec![*node],
            Axis::Attribute => match node {
                XNode::Element(el) => el
                    .value()
                    .attrs()
                    .map(|(name, value)| XNode::Attribute { name, value })
                    .collect(),
                _ => Vec::new(),
            },
        };

        let mut matched: Vec<XNode<'a>> = candidates
            .into_iter()
            .filter(|c| matches_test(c, &step.test, step.axis))
            .collect();

        for predicate in &step.predicates {
            matched = match predicate {
                Predicate::Position(n) => matched.get(n - 1).copied().into_iter().collect(),
                Predicate::Last => matched.last().copied().into_iter().collect(),
                Predicate::Expr(expr) => matched
                    .into_iter()
                    .filter(|c| self.eval_expr(expr, c))
                    .collect(),
            };
        }
        matched
    }

    fn children(&self, node: &XNode<'a>) -> Vec<XNode<'a>> {
        match node {
            XNode::Root => vec![XNode::Element(self.top)],
            XNode::Element(el) => child_nodes(*el),
            _ => Vec::new(),
        }
    }

    fn collect_descendants(&self, node: XNode<'a>, out: &mut Vec<XNode<'a>>) {
        out.push(node);
        for child in self.children(&node) {
            self.collect_descendants(child, out);
        }
    }

    fn parent(&self, node: &XNode<'a>) -> Option<XNode<'a>> {
        let XNode::Element(el) = node else {
            return None;
        };
        if *el == self.top {
            return Some(XNode::Root);
        }
        match el.parent().and_then(ElementRef::wrap) {
            Some(p) => Some(XNode::Element(p)),
            None => Some(XNode::Root),
        }
    }

    fn eval_expr(&self, expr: &Expr, node: &XNode<'a>) -> bool {
        match expr {
            Expr::Or(a, b) => self.eval_expr(a, node) || self.eval_expr(b, node),
            Expr::And(a, b) => self.eval_expr(a, node) && self.eval_expr(b, node),
            Expr::Not(inner) => !self.eval_expr(inner, node),
            Expr::Eq(a, b) => self.compare(a, b, node, |x, y| x == y),
            Expr::Ne(a, b) => self.compare(a, b, node, |x, y| x != y),
            Expr::Contains(a, b) => self.compare(a, b, node, |x, y| x.contains(y)),
            Expr::StartsWith(a, b) => self.compare(a, b, node, |x, y| x.starts_with(y)),
            Expr::Exists(op) => {
                let values = self.operand(op, node);
                match op {
                    Operand::Attr(_) | Operand::Child(_) => !values.is_empty(),
                    _ => values.iter().any(|v| !v.is_empty()),
                }
            }
        }
    }

    fn compare(
        &self,
        a: &Operand,
        b: &Operand,
        node: &XNode<'a>,
        op: impl Fn(&str, &str) -> bool,
    ) -> bool {
        let left = self.operand(a, node);
        let right = self.operand(b, node);
        left.iter().any(|x| right.iter().any(|y| op(x, y)))
    }

    /// Node-set operands yield one value per node; comparisons are existential.
    fn operand(&self, operand: &Operand, node: &XNode<'a>) -> Vec<String> {
        match operand {
            Operand::Literal(s) => vec![s.clone()],
            Operand::Context => vec![string_value(node, Some(self.top))],
            Operand::Attr(name) => node
                .as_element()
                .and_then(|el| el.value().attr(name))
                .map(str::to_string)
                .into_iter()
                .collect(),
            Operand::Text => vec![
                self.children(node)
                    .iter()
                    .filter_map(|c| match c {
                        XNode::Text(t) => Some(*t),
                        _ => None,
                    })
                    .collect(),
            ],
            Operand::Child(name) => self
                .children(node)
                .into_iter()
                .filter_map(|c| c.as_element())
                .filter(|el| el.value().name().eq_ignore_ascii_case(name))
                .map(|el| el.text().collect())
                .collect(),
            Operand::Normalize(inner) => self
                .operand(inner, node)
                .into_iter()
                .take(1)
                .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect(),
        }
    }
}

fn child_nodes(el: ElementRef<'_>) -> Vec<XNode<'_>> {
    el.children()
        .filter_map(|child| {
            if let Some(e) = ElementRef::wrap(child) {
                Some(XNode::Element(e))
            } else {
                child.value().as_text().map(|t| XNode::Text(&**t))
            }
        })
        .collect()
}

fn matches_test(node: &XNode<'_>, test: &NodeTest, axis: Axis) -> bool {
    match (test, node) {
        (NodeTest::Node, _) => true,
        (NodeTest::Text, XNode::Text(_)) => true,
        (NodeTest::Any, XNode::Element(_)) => axis != Axis::Attribute,
        (NodeTest::Any, XNode::Attribute { .. }) => axis == Axis::Attribute,
        (NodeTest::Name(n), XNode::Element(el)) => {
            axis != Axis::Attribute && el.value().name().eq_ignore_ascii_case(n)
        }
        (NodeTest::Name(n), XNode::Attribute { name, .. }) => {
            axis == Axis::Attribute && name.eq_ignore_ascii_case(n)
        }
        _ => false,
    }
}

// --- Lexer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DoubleDot,
    At,
    Star,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    AxisSep,
    Name(String),
    Literal(String),
    Number(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DoubleDot);
                i += 2;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::AxisSep);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '@' => { tokens.push(Token::At); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '[' => { tokens.push(Token::LBracket); i += 1; }
            ']' => { tokens.push(Token::RBracket); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            '=' => { tokens.push(Token::Eq); i += 1; }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| format!("unterminated string literal at {i}"))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}' at {i}")),
        }
    }
    Ok(tokens)
}

// --- Parser ---

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!("expected {expected:?}, found {tok:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn location_path(&mut self) -> Result<Vec<Step>, String> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                if self.peek().is_none() {
                    return Ok(steps);
                }
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                steps.push(descendant_or_self());
            }
            Some(_) => {}
            None => return Err("empty expression".to_string()),
        }

        loop {
            steps.push(self.step()?);
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(descendant_or_self());
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn step(&mut self) -> Result<Step, String> {
        let (axis, test) = match self.advance() {
            Some(Token::Dot) => (Axis::SelfNode, NodeTest::Node),
            Some(Token::DoubleDot) => (Axis::Parent, NodeTest::Node),
            Some(Token::At) => (Axis::Attribute, self.node_test()?),
            Some(Token::Name(name)) if self.peek() == Some(&Token::AxisSep) => {
                self.advance();
                let axis = match name.as_str() {
                    "child" => Axis::Child,
                    "descendant" => Axis::Descendant,
                    "descendant-or-self" => Axis::DescendantOrSelf,
                    "parent" => Axis::Parent,
                    "self" => Axis::SelfNode,
                    "attribute" => Axis::Attribute,
                    other => return Err(format!("unsupported axis '{other}'")),
                };
                (axis, self.node_test()?)
            }
            Some(_) => {
                self.pos -= 1;
                (Axis::Child, self.node_test()?)
            }
            None => return Err("expected a location step".to_string()),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.predicate()?);
            self.expect(Token::RBracket)?;
        }
        Ok(Step { axis, test, predicates })
    }

    fn node_test(&mut self) -> Result<NodeTest, String> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.advance();
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "text" => Ok(NodeTest::Text),
                    "node" => Ok(NodeTest::Node),
                    other => Err(format!("unsupported node test '{other}()'")),
                }
            }
            Some(Token::Name(name)) => Ok(NodeTest::Name(name)),
            Some(tok) => Err(format!("expected a node test, found {tok:?}")),
            None => Err("expected a node test, found end of expression".to_string()),
        }
    }

    fn predicate(&mut self) -> Result<Predicate, String> {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Number(n)), Some(Token::RBracket)) => {
                let n = n.clone();
                self.advance();
                let index: usize = n
                    .parse()
                    .map_err(|_| format!("invalid position '{n}'"))?;
                if index == 0 {
                    return Err("positions start at 1".to_string());
                }
                Ok(Predicate::Position(index))
            }
            (Some(Token::Name(name)), Some(Token::LParen))
                if name == "last" && self.peek_at(2) == Some(&Token::RParen) =>
            {
                self.pos += 3;
                Ok(Predicate::Last)
            }
            _ => Ok(Predicate::Expr(self.or_expr()?)),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "or") {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.primary()?;
        while matches!(self.peek(), Some(Token::Name(n)) if n == "and") {
            self.advance();
            let right = self.primary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.or_expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        if let (Some(Token::Name(name)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            match name.as_str() {
                "not" => {
                    self.pos += 2;
                    let inner = self.or_expr()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Not(Box::new(inner)));
                }
                "contains" | "starts-with" => {
                    self.pos += 2;
                    let a = self.operand()?;
                    self.expect(Token::Comma)?;
                    let b = self.operand()?;
                    self.expect(Token::RParen)?;
                    return Ok(if name == "contains" {
                        Expr::Contains(a, b)
                    } else {
                        Expr::StartsWith(a, b)
                    });
                }
                _ => {}
            }
        }

        let left = self.operand()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.advance();
                Ok(Expr::Eq(left, self.operand()?))
            }
            Some(Token::Ne) => {
                self.advance();
                Ok(Expr::Ne(left, self.operand()?))
            }
            _ => Ok(Expr::Exists(left)),
        }
    }

    fn operand(&mut self) -> Result<Operand, String> {
        match self.advance() {
            Some(Token::At) => match self.advance() {
                Some(Token::Name(name)) => Ok(Operand::Attr(name)),
                other => Err(format!("expected attribute name, found {other:?}")),
            },
            Some(Token::Dot) => Ok(Operand::Context),
            Some(Token::Literal(s)) | Some(Token::Number(s)) => Ok(Operand::Literal(s)),
            Some(Token::Name(name)) if self.peek() == Some(&Token::LParen) => {
                self.advance();
                match name.as_str() {
                    "text" => {
                        self.expect(Token::RParen)?;
                        Ok(Operand::Text)
                    }
                    "normalize-space" => {
                        let inner = if self.peek() == Some(&Token::RParen) {
                            Operand::Context
                        } else {
                            self.operand()?
                        };
                        self.expect(Token::RParen)?;
                        Ok(Operand::Normalize(Box::new(inner)))
                    }
                    other => Err(format!("unsupported function '{other}()'")),
                }
            }
            Some(Token::Name(name)) => Ok(Operand::Child(name)),
            Some(tok) => Err(format!("unexpected token {tok:?} in predicate")),
            None => Err("unexpected end of predicate".to_string()),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}
