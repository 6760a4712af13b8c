//! Parser for the analysis script emitted by the completion service.
//!
//! The script is line-oriented. Each line is one statement over the two
//! execution bindings, `df` (the table) and `plt` (the plotting surface):
//!
//! ```text
//! # comment
//! print(df.filter("age", ">", 30).mean("salary"))
//! df = df.sort("salary", "desc").head(10)
//! plt.bar("city", "salary")
//! plt.title("Salary by city")
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Print(Expr),
    /// `df = <frame expression>` rebinds the table for the rest of the turn.
    Assign(FrameExpr),
    Plot(PlotStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotStmt {
    Bar { label_col: String, value_col: String },
    Line { x_col: String, y_col: String },
    Scatter { x_col: String, y_col: String },
    Hist { col: String, bins: Option<usize> },
    Title(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Frame(FrameExpr),
    Scalar(ScalarExpr),
    Str(String),
    Num(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameExpr {
    /// The `df` binding itself.
    Source,
    Filter {
        inner: Box<FrameExpr>,
        column: String,
        op: CmpOp,
        value: Literal,
    },
    Sort {
        inner: Box<FrameExpr>,
        column: String,
        descending: bool,
    },
    Select {
        inner: Box<FrameExpr>,
        columns: Vec<String>,
    },
    Head {
        inner: Box<FrameExpr>,
        rows: usize,
    },
    GroupCount {
        inner: Box<FrameExpr>,
        by: String,
    },
    GroupAgg {
        inner: Box<FrameExpr>,
        by: String,
        func: AggFunc,
        column: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Agg {
        inner: FrameExpr,
        func: AggFunc,
        column: String,
    },
    Count(FrameExpr),
    Shape(FrameExpr),
    Columns(FrameExpr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Mean,
    Sum,
    Min,
    Max,
    Median,
    Std,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Mean => "mean",
            AggFunc::Sum => "sum",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
            AggFunc::Std => "std",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "mean" => Some(AggFunc::Mean),
            "sum" => Some(AggFunc::Sum),
            "min" => Some(AggFunc::Min),
            "max" => Some(AggFunc::Max),
            "median" => Some(AggFunc::Median),
            "std" => Some(AggFunc::Std),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            "=" | "==" => Some(CmpOp::Eq),
            "!=" | "<>" => Some(CmpOp::Ne),
            ">" => Some(CmpOp::Gt),
            "<" => Some(CmpOp::Lt),
            ">=" => Some(CmpOp::Ge),
            "<=" => Some(CmpOp::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
}

/// Parse a whole script into statements. Blank lines and `#` comments are
/// skipped; any malformed line fails the whole script.
pub fn parse_script(code: &str) -> Result<Vec<Stmt>, ScriptError> {
    let mut stmts = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens = tokenize(trimmed).map_err(|message| ScriptError {
            line: line_no,
            message,
        })?;
        let stmt = Parser::new(tokens)
            .parse_stmt()
            .map_err(|message| ScriptError {
                line: line_no,
                message,
            })?;
        stmts.push(stmt);
    }
    Ok(stmts)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    Comma,
    Dot,
    Assign,
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Assign);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' | '-' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| format!("invalid number literal '{}'", s))?;
                tokens.push(Token::Num(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            _ => return Err(format!("unexpected character '{}'", c)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        let head = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err("statement must start with print, df or plt".to_string()),
        };
        let stmt = match head.as_str() {
            "print" => {
                self.expect(Token::LParen, "expected '(' after print")?;
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "expected ')' to close print")?;
                Stmt::Print(expr)
            }
            "df" => match self.next() {
                Some(Token::Assign) => {
                    let frame = self.parse_frame_root()?;
                    Stmt::Assign(frame)
                }
                _ => return Err("a bare df expression must be wrapped in print(...)".to_string()),
            },
            "plt" => {
                self.expect(Token::Dot, "expected '.' after plt")?;
                let plot = self.parse_plot()?;
                Stmt::Plot(plot)
            }
            other => return Err(format!("unknown statement '{}'", other)),
        };
        if self.pos != self.tokens.len() {
            return Err("unexpected trailing tokens".to_string());
        }
        Ok(stmt)
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) if name == "df" => self.parse_chain(),
            _ => Err("expected a string, a number or a df expression".to_string()),
        }
    }

    /// A frame expression used where a scalar makes no sense (assignment).
    fn parse_frame_root(&mut self) -> Result<FrameExpr, String> {
        match self.next() {
            Some(Token::Ident(name)) if name == "df" => match self.parse_chain()? {
                Expr::Frame(frame) => Ok(frame),
                _ => Err("df can only be assigned a table expression".to_string()),
            },
            _ => Err("assignment must start with a df expression".to_string()),
        }
    }

    /// Method chain on `df`. Frame methods may keep chaining; a scalar
    /// method terminates the chain.
    fn parse_chain(&mut self) -> Result<Expr, String> {
        let mut frame = FrameExpr::Source;
        while self.peek() == Some(&Token::Dot) {
            self.next();
            let method = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err("expected a method name after '.'".to_string()),
            };
            self.expect(Token::LParen, "expected '(' after method name")?;
            match method.as_str() {
                "filter" => {
                    let column = self.string_arg("filter column")?;
                    self.expect(Token::Comma, "filter takes (column, op, value)")?;
                    let op_text = self.string_arg("filter operator")?;
                    let op = CmpOp::from_symbol(&op_text)
                        .ok_or_else(|| format!("unsupported operator '{}'", op_text))?;
                    self.expect(Token::Comma, "filter takes (column, op, value)")?;
                    let value = self.literal_arg("filter value")?;
                    self.expect(Token::RParen, "expected ')' to close filter")?;
                    frame = FrameExpr::Filter {
                        inner: Box::new(frame),
                        column,
                        op,
                        value,
                    };
                }
                "sort" => {
                    let column = self.string_arg("sort column")?;
                    let mut descending = false;
                    if self.peek() == Some(&Token::Comma) {
                        self.next();
                        let dir = self.string_arg("sort direction")?;
                        descending = match dir.as_str() {
                            "asc" => false,
                            "desc" => true,
                            other => {
                                return Err(format!(
                                    "sort direction must be \"asc\" or \"desc\", got \"{}\"",
                                    other
                                ))
                            }
                        };
                    }
                    self.expect(Token::RParen, "expected ')' to close sort")?;
                    frame = FrameExpr::Sort {
                        inner: Box::new(frame),
                        column,
                        descending,
                    };
                }
                "select" => {
                    let mut columns = vec![self.string_arg("select column")?];
                    while self.peek() == Some(&Token::Comma) {
                        self.next();
                        columns.push(self.string_arg("select column")?);
                    }
                    self.expect(Token::RParen, "expected ')' to close select")?;
                    frame = FrameExpr::Select {
                        inner: Box::new(frame),
                        columns,
                    };
                }
                "head" => {
                    let rows = match self.peek() {
                        Some(Token::Num(_)) => match self.next() {
                            Some(Token::Num(n)) if n >= 0.0 => n as usize,
                            _ => return Err("head takes a non-negative row count".to_string()),
                        },
                        _ => 5,
                    };
                    self.expect(Token::RParen, "expected ')' to close head")?;
                    frame = FrameExpr::Head {
                        inner: Box::new(frame),
                        rows,
                    };
                }
                "group_count" => {
                    let by = self.string_arg("group_count column")?;
                    self.expect(Token::RParen, "expected ')' to close group_count")?;
                    frame = FrameExpr::GroupCount {
                        inner: Box::new(frame),
                        by,
                    };
                }
                "group_mean" | "group_sum" | "group_min" | "group_max" => {
                    let func = match method.as_str() {
                        "group_mean" => AggFunc::Mean,
                        "group_sum" => AggFunc::Sum,
                        "group_min" => AggFunc::Min,
                        _ => AggFunc::Max,
                    };
                    let by = self.string_arg("group column")?;
                    self.expect(Token::Comma, "group aggregates take (by, column)")?;
                    let column = self.string_arg("aggregated column")?;
                    self.expect(Token::RParen, "expected ')' to close group aggregate")?;
                    frame = FrameExpr::GroupAgg {
                        inner: Box::new(frame),
                        by,
                        func,
                        column,
                    };
                }
                "count" => {
                    self.expect(Token::RParen, "count takes no arguments")?;
                    return Ok(Expr::Scalar(ScalarExpr::Count(frame)));
                }
                "shape" => {
                    self.expect(Token::RParen, "shape takes no arguments")?;
                    return Ok(Expr::Scalar(ScalarExpr::Shape(frame)));
                }
                "columns" => {
                    self.expect(Token::RParen, "columns takes no arguments")?;
                    return Ok(Expr::Scalar(ScalarExpr::Columns(frame)));
                }
                agg => {
                    let func = AggFunc::from_name(agg)
                        .ok_or_else(|| format!("unknown method '{}'", agg))?;
                    let column = self.string_arg(&format!("{} column", agg))?;
                    self.expect(Token::RParen, "expected ')' to close aggregate")?;
                    return Ok(Expr::Scalar(ScalarExpr::Agg {
                        inner: frame,
                        func,
                        column,
                    }));
                }
            }
        }
        Ok(Expr::Frame(frame))
    }

    fn parse_plot(&mut self) -> Result<PlotStmt, String> {
        let method = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err("expected a plt method name".to_string()),
        };
        self.expect(Token::LParen, "expected '(' after plt method")?;
        let plot = match method.as_str() {
            "bar" | "line" | "scatter" => {
                let first = self.string_arg("plot x column")?;
                self.expect(Token::Comma, "plot takes (x_column, y_column)")?;
                let second = self.string_arg("plot y column")?;
                match method.as_str() {
                    "bar" => PlotStmt::Bar {
                        label_col: first,
                        value_col: second,
                    },
                    "line" => PlotStmt::Line {
                        x_col: first,
                        y_col: second,
                    },
                    _ => PlotStmt::Scatter {
                        x_col: first,
                        y_col: second,
                    },
                }
            }
            "hist" => {
                let col = self.string_arg("hist column")?;
                let mut bins = None;
                if self.peek() == Some(&Token::Comma) {
                    self.next();
                    bins = match self.next() {
                        Some(Token::Num(n)) if n >= 1.0 => Some(n as usize),
                        _ => return Err("hist bin count must be a positive number".to_string()),
                    };
                }
                PlotStmt::Hist { col, bins }
            }
            "title" => {
                let text = self.string_arg("title text")?;
                PlotStmt::Title(text)
            }
            other => return Err(format!("unknown plt method '{}'", other)),
        };
        self.expect(Token::RParen, "expected ')' to close plt call")?;
        Ok(plot)
    }

    fn string_arg(&mut self, what: &str) -> Result<String, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(format!("expected a quoted string for {}", what)),
        }
    }

    fn literal_arg(&mut self, what: &str) -> Result<Literal, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Num(n)) => Ok(Literal::Num(n)),
            _ => Err(format!("expected a string or number for {}", what)),
        }
    }

    fn expect(&mut self, token: Token, message: &str) -> Result<(), String> {
        if self.next() == Some(token) {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
}
